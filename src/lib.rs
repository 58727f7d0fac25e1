//! `leavitt` library crate.
//!
//! The binary (`leavitt`) is a thin wrapper around this library so that:
//!
//! - the regression core is testable without spawning processes
//! - `fit::sigma_clip` and `fit::monte_carlo` can be driven from other programs
//! - table I/O and presentation stay out of the numerical code

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
