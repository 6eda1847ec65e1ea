//! Contact material descriptors.
//!
//! A [`MaterialInfo`] holds every parameter a specfile may set for a surface.
//! [`MaterialInfo::create_material`] turns it into a [`ContactMaterial`] for a
//! given [`ContactMethod`], keeping only what that formulation uses. Materials
//! are pure values; pairs are combined with [`ContactMaterial::composite`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Contact formulation used by a terrain domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContactMethod {
    /// Smooth (penalty) contact.
    #[default]
    #[serde(rename = "SMC")]
    Smc,
    /// Non-smooth (complementarity) contact.
    #[serde(rename = "NSC")]
    Nsc,
}

impl fmt::Display for ContactMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smc => write!(f, "SMC"),
            Self::Nsc => write!(f, "NSC"),
        }
    }
}

/// Surface parameters as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialInfo {
    #[serde(rename = "Coefficient of friction")]
    pub mu: f64,
    #[serde(rename = "Coefficient of restitution")]
    pub cr: f64,
    #[serde(rename = "Young modulus")]
    pub young: f64,
    #[serde(rename = "Poisson ratio")]
    pub poisson: f64,
    #[serde(rename = "Kn")]
    pub kn: f64,
    #[serde(rename = "Gn")]
    pub gn: f64,
    #[serde(rename = "Kt")]
    pub kt: f64,
    #[serde(rename = "Gt")]
    pub gt: f64,
}

impl Default for MaterialInfo {
    fn default() -> Self {
        Self {
            mu: 0.8,
            cr: 0.01,
            young: 2e7,
            poisson: 0.3,
            kn: 2e5,
            gn: 40.0,
            kt: 2e5,
            gt: 20.0,
        }
    }
}

impl MaterialInfo {
    /// Build the material for the given contact method.
    pub fn create_material(&self, method: ContactMethod) -> ContactMaterial {
        match method {
            ContactMethod::Smc => ContactMaterial::Smc {
                friction: self.mu as f32,
                restitution: self.cr as f32,
                young_modulus: self.young as f32,
                poisson_ratio: self.poisson as f32,
                kn: self.kn as f32,
                gn: self.gn as f32,
                kt: self.kt as f32,
                gt: self.gt as f32,
            },
            ContactMethod::Nsc => ContactMaterial::Nsc {
                friction: self.mu as f32,
                restitution: self.cr as f32,
            },
        }
    }
}

/// A surface material tagged by its contact formulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContactMaterial {
    Smc {
        friction: f32,
        restitution: f32,
        young_modulus: f32,
        poisson_ratio: f32,
        kn: f32,
        gn: f32,
        kt: f32,
        gt: f32,
    },
    Nsc {
        friction: f32,
        restitution: f32,
    },
}

impl ContactMaterial {
    /// Default material for a contact method.
    pub fn default_for(method: ContactMethod) -> Self {
        MaterialInfo::default().create_material(method)
    }

    pub fn method(&self) -> ContactMethod {
        match self {
            Self::Smc { .. } => ContactMethod::Smc,
            Self::Nsc { .. } => ContactMethod::Nsc,
        }
    }

    pub fn friction(&self) -> f32 {
        match *self {
            Self::Smc { friction, .. } | Self::Nsc { friction, .. } => friction,
        }
    }

    pub fn restitution(&self) -> f32 {
        match *self {
            Self::Smc { restitution, .. } | Self::Nsc { restitution, .. } => restitution,
        }
    }

    /// Effective parameters for a contact between `self` and `other`.
    ///
    /// Friction and restitution take the minimum of the pair. Penalty
    /// coefficients combine in series (harmonic mean); the effective Young's
    /// modulus follows Hertz theory. A pair involving an NSC material has no
    /// penalty parameters.
    pub fn composite(&self, other: &ContactMaterial) -> CompositeMaterial {
        let friction = self.friction().min(other.friction()) as f64;
        let restitution = self.restitution().min(other.restitution()) as f64;

        let penalty = match (*self, *other) {
            (
                Self::Smc {
                    young_modulus: y1,
                    poisson_ratio: nu1,
                    kn: kn1,
                    gn: gn1,
                    kt: kt1,
                    gt: gt1,
                    ..
                },
                Self::Smc {
                    young_modulus: y2,
                    poisson_ratio: nu2,
                    kn: kn2,
                    gn: gn2,
                    kt: kt2,
                    gt: gt2,
                    ..
                },
            ) => {
                let inv_e = (1.0 - (nu1 as f64).powi(2)) / y1 as f64
                    + (1.0 - (nu2 as f64).powi(2)) / y2 as f64;
                Some(PenaltyParams {
                    effective_young: 1.0 / inv_e,
                    kn: series(kn1 as f64, kn2 as f64),
                    gn: series(gn1 as f64, gn2 as f64),
                    kt: series(kt1 as f64, kt2 as f64),
                    gt: series(gt1 as f64, gt2 as f64),
                })
            }
            _ => None,
        };

        CompositeMaterial {
            friction,
            restitution,
            penalty,
        }
    }
}

/// Penalty coefficients of a composite SMC material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyParams {
    pub effective_young: f64,
    pub kn: f64,
    pub gn: f64,
    pub kt: f64,
    pub gt: f64,
}

/// Parameters of a contact between two materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeMaterial {
    pub friction: f64,
    pub restitution: f64,
    pub penalty: Option<PenaltyParams>,
}

fn series(a: f64, b: f64) -> f64 {
    if a + b <= 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_material_by_method() {
        let info = MaterialInfo {
            mu: 0.6,
            cr: 0.1,
            ..Default::default()
        };

        let smc = info.create_material(ContactMethod::Smc);
        assert_eq!(smc.method(), ContactMethod::Smc);
        assert!((smc.friction() - 0.6).abs() < 1e-6);

        let nsc = info.create_material(ContactMethod::Nsc);
        assert_eq!(nsc.method(), ContactMethod::Nsc);
        assert!((nsc.restitution() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_composite_smc() {
        let a = ContactMaterial::default_for(ContactMethod::Smc);
        let b = MaterialInfo {
            mu: 0.4,
            ..Default::default()
        }
        .create_material(ContactMethod::Smc);

        let c = a.composite(&b);
        assert!((c.friction - 0.4).abs() < 1e-6);

        let p = c.penalty.unwrap();
        // identical stiffness in series keeps the value
        assert!((p.kn - 2e5).abs() < 1e-6);
        // two identical moduli: E* = E / (2 (1 - nu^2))
        let expected = 2e7 / (2.0 * (1.0 - 0.09));
        assert!((p.effective_young - expected).abs() / expected < 1e-5);
    }

    #[test]
    fn test_composite_with_nsc_has_no_penalty() {
        let a = ContactMaterial::default_for(ContactMethod::Smc);
        let b = ContactMaterial::default_for(ContactMethod::Nsc);
        assert!(a.composite(&b).penalty.is_none());
    }

    #[test]
    fn test_material_info_json_keys() {
        let info: MaterialInfo =
            serde_json::from_str(r#"{ "Coefficient of friction": 0.5, "Kn": 1e6 }"#).unwrap();
        assert_eq!(info.mu, 0.5);
        assert_eq!(info.kn, 1e6);
        assert_eq!(info.gn, MaterialInfo::default().gn);
    }
}
