//! Data layer: file locations, readers, loaders and record-set operations.
//!
//! Architecture:
//! ```text
//!   date range / file stamp
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  source   │  stamp → local path or PDS URL
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  reader   │  one file → RecordSet
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  many files → LoadOutcome (records + unresolved files)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌────────────────┐
//!   │ filter / export │  predicates, CSV / Parquet
//!   └────────────────┘
//! ```

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod reader;
pub mod schema;
pub mod source;
pub mod synthetic;
