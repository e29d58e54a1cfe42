//! Preprocessing: L1B geometric selections, limb-sequence averaging and
//! radiance grids; on-planet pairing; L2 binning and half-orbit sections.

pub mod binning;
pub mod l1b;
pub mod l2;
pub mod onplanet;
pub mod pipeline;

pub use binning::{BinConfig, BinSpec};
pub use l1b::{preprocessor_by_name, L1BOnPlanetInTrack, L1BPreprocessor, L1BStandardInTrack};
pub use l2::{add_day_column, cross_section, half_orbit_profiles, SectionPoint};
pub use onplanet::OnPlanetFinder;
pub use pipeline::{radiance_grid, RadianceGrid};
