//! Period-Luminosity fitting.
//!
//! Responsibilities:
//!
//! - build the joint distance/coefficient design matrix (`design`)
//! - iterate fit + outlier rejection until the inlier mask is stable (`sigma_clip`)
//! - propagate photometric errors by perturbed refits (`monte_carlo`)

pub mod design;
pub mod monte_carlo;
pub mod sigma_clip;

pub use design::*;
pub use monte_carlo::*;
pub use sigma_clip::*;
