//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::material::ContactMethod;
use crate::terrain_type::TerrainType;

/// Errors detected while reading or validating configuration.
///
/// All of these are fatal at setup time and are reported before any node
/// advances its physics.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A specfile could not be opened or read.
    #[error("could not open specfile {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A specfile is not valid JSON or does not match the expected layout.
    #[error("invalid specfile {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required member is absent from a specfile.
    #[error("specfile {path} does not specify {member}")]
    MissingMember { path: PathBuf, member: String },

    /// The terrain type string did not name a known formulation.
    #[error("unknown terrain type '{0}'")]
    UnknownTerrainType(String),

    /// A parameter is present but out of its valid range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A wheel index outside `[0, num_tires)` was used.
    #[error("wheel index {wheel} out of range (node has {num_tires} tires)")]
    WheelOutOfRange { wheel: usize, num_tires: usize },

    /// A mesh proxy was requested from a terrain that only hosts body proxies.
    #[error("terrain type {0} does not support the mesh interface")]
    UnsupportedInterface(TerrainType),

    /// The terrain formulation cannot use the requested contact method.
    #[error("terrain type {terrain} does not support contact method {method}")]
    UnsupportedContactMethod {
        terrain: TerrainType,
        method: ContactMethod,
    },

    /// The wheel-to-terrain layout is inconsistent.
    #[error("invalid terrain layout: {0}")]
    Layout(String),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Validate a strictly positive, finite parameter.
    pub fn require_positive(name: &str, value: f64) -> ConfigResult<f64> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::invalid(name, format!("must be positive, got {value}")))
        }
    }
}

/// Convenience result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;
