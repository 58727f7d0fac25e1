//! Unit conversions applied to fitted distance moduli.
//!
//! Conversions are implemented as small, pure functions so that the fitting
//! code can stay unit-agnostic.

pub mod units;

pub use units::*;
