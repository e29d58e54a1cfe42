//! Mars Climate Sounder data access.
//!
//! Readers parse single L1B / L2 files, loaders resolve date ranges into the
//! 4-hour files that cover them, and the preprocessors reduce L1B radiances
//! to standard viewing geometries.

pub mod config;
pub mod data;
pub mod error;
pub mod geom;
pub mod preprocess;
pub mod time;

pub use config::Config;
pub use data::loader::{L1BLoader, L2Loader, LoadOutcome};
pub use data::model::{RecordSet, Value};
pub use data::reader::{L1BReader, L2Reader, ReadOptions};
pub use data::schema::{Ddr, Level};
pub use error::{McsError, Result};
pub use preprocess::l1b::{L1BOnPlanetInTrack, L1BStandardInTrack};
