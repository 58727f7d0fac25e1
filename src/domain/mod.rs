//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`Units`, `SigmaMethod`, `ErrorMethod`)
//! - validated configuration structs (`RegressionConfig`, `ErrorConfig`)
//! - photometric inputs (`ObservationSet`)
//! - fit outputs (`LeavittFit`, `ErrorEstimate`)

pub mod types;

pub use types::*;
