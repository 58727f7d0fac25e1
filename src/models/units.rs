//! Distance modulus conversions.
//!
//! `μ = 5 log10(d_pc) - 5`, so `d_pc = 10^(μ/5 + 1)`.

use crate::domain::Units;

/// Convert a distance modulus to parsecs.
pub fn modulus_to_pc(mu: f64) -> f64 {
    10f64.powf(mu / 5.0 + 1.0)
}

/// Convert a distance modulus to kiloparsecs.
pub fn modulus_to_kpc(mu: f64) -> f64 {
    modulus_to_pc(mu) / 1000.0
}

/// Convert a distance in parsecs back to a distance modulus.
pub fn pc_to_modulus(pc: f64) -> f64 {
    5.0 * pc.log10() - 5.0
}

impl Units {
    /// Map a distance modulus into these units. NaN stays NaN.
    pub fn from_modulus(self, mu: f64) -> f64 {
        match self {
            Units::Modulus => mu,
            Units::Parsecs => modulus_to_pc(mu),
            Units::Kiloparsecs => modulus_to_kpc(mu),
        }
    }

    /// Inverse of [`Units::from_modulus`].
    pub fn to_modulus(self, value: f64) -> f64 {
        match self {
            Units::Modulus => value,
            Units::Parsecs => pc_to_modulus(value),
            Units::Kiloparsecs => pc_to_modulus(value * 1000.0),
        }
    }

    /// Apply [`Units::from_modulus`] to every element in place.
    pub fn convert_in_place(self, values: &mut [f64]) {
        if self == Units::Modulus {
            return;
        }
        for v in values.iter_mut() {
            *v = self.from_modulus(*v);
        }
    }
}
