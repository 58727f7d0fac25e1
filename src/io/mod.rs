//! Input/output helpers.
//!
//! - delimited table ingest (`table`)
//! - output tables and JSON fit summaries (`export`)

pub mod export;
pub mod table;

pub use export::*;
pub use table::*;
