//! Terrain formulation tags.
//!
//! The tag is resolved once from configuration and selects both the concrete
//! terrain node and the kind of proxy it hosts. The string mapping is total:
//! any name that is not an exact, case-sensitive match resolves to
//! [`TerrainType::Unknown`], which callers must treat as a configuration error.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Supported terrain formulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainType {
    /// Rigid patch with rigid-body contact.
    Rigid,
    /// Soil Contact Model (deformable soil).
    Scm,
    /// Discrete granular media, multi-threaded CPU.
    GranularOmp,
    /// Discrete granular media, GPU engine.
    GranularGpu,
    /// Discrete granular media, distributed engine.
    GranularMpi,
    /// Continuum granular media (SPH).
    GranularSph,
    /// Unrecognized name. Never used to build a node.
    Unknown,
}

impl TerrainType {
    /// All tags that name a real formulation.
    pub const SUPPORTED: [TerrainType; 6] = [
        TerrainType::Rigid,
        TerrainType::Scm,
        TerrainType::GranularOmp,
        TerrainType::GranularGpu,
        TerrainType::GranularMpi,
        TerrainType::GranularSph,
    ];

    /// Name used in specfiles.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rigid => "RIGID",
            Self::Scm => "SCM",
            Self::GranularOmp => "GRANULAR_OMP",
            Self::GranularGpu => "GRANULAR_GPU",
            Self::GranularMpi => "GRANULAR_MPI",
            Self::GranularSph => "GRANULAR_SPH",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Resolve a specfile name. Unmatched names give [`TerrainType::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "RIGID" => Self::Rigid,
            "SCM" => Self::Scm,
            "GRANULAR_OMP" => Self::GranularOmp,
            "GRANULAR_GPU" => Self::GranularGpu,
            "GRANULAR_MPI" => Self::GranularMpi,
            "GRANULAR_SPH" => Self::GranularSph,
            _ => Self::Unknown,
        }
    }

    /// Read only the `"Type"` member of a terrain specfile.
    ///
    /// An unreadable file, invalid JSON or a missing/non-string `"Type"` member is
    /// an error. A present but unrecognized name is returned as `Unknown` so the
    /// caller can report it with context.
    pub fn from_specfile(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let doc = read_specfile(path)?;
        let name = doc
            .get("Type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConfigError::MissingMember {
                path: path.to_path_buf(),
                member: "terrain type (\"Type\")".into(),
            })?;

        let ty = Self::from_name(name);
        if ty == Self::Unknown {
            tracing::warn!("specfile {} names unknown terrain type '{name}'", path.display());
        }
        Ok(ty)
    }

    /// Whether this tag names one of the discrete-element granular engines.
    pub fn is_discrete_granular(self) -> bool {
        matches!(self, Self::GranularOmp | Self::GranularGpu | Self::GranularMpi)
    }
}

impl fmt::Display for TerrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read and parse a JSON specfile into a generic document.
pub fn read_specfile(path: &Path) -> ConfigResult<serde_json::Value> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_name_round_trip() {
        for ty in TerrainType::SUPPORTED {
            assert_eq!(TerrainType::from_name(ty.name()), ty);
        }
    }

    #[test]
    fn test_unrecognized_names() {
        assert_eq!(TerrainType::from_name("BOGUS"), TerrainType::Unknown);
        assert_eq!(TerrainType::from_name("scm"), TerrainType::Unknown);
        assert_eq!(TerrainType::from_name(" SCM"), TerrainType::Unknown);
        assert_eq!(TerrainType::from_name(""), TerrainType::Unknown);
        // UNKNOWN is a name for the error tag, not a formulation
        assert!(!TerrainType::SUPPORTED.contains(&TerrainType::from_name("UNKNOWN")));
    }

    #[test]
    fn test_discrete_granular() {
        let granular: Vec<_> = TerrainType::SUPPORTED
            .into_iter()
            .filter(|ty| ty.is_discrete_granular())
            .collect();
        assert_eq!(
            granular,
            [TerrainType::GranularOmp, TerrainType::GranularGpu, TerrainType::GranularMpi]
        );
        assert!(!TerrainType::Unknown.is_discrete_granular());
    }

    #[test]
    fn test_from_specfile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "Type": "GRANULAR_SPH", "Step size": 1e-4 }}"#).unwrap();
        assert_eq!(
            TerrainType::from_specfile(file.path()).unwrap(),
            TerrainType::GranularSph
        );
    }

    #[test]
    fn test_from_specfile_failures() {
        let missing = TerrainType::from_specfile("/nonexistent/terrain.json");
        assert!(matches!(missing, Err(ConfigError::Unreadable { .. })));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "{{ not json").unwrap();
        assert!(matches!(
            TerrainType::from_specfile(bad.path()),
            Err(ConfigError::InvalidJson { .. })
        ));

        let mut untyped = tempfile::NamedTempFile::new().unwrap();
        write!(untyped, r#"{{ "Step size": 1e-4 }}"#).unwrap();
        assert!(matches!(
            TerrainType::from_specfile(untyped.path()),
            Err(ConfigError::MissingMember { .. })
        ));

        let mut bogus = tempfile::NamedTempFile::new().unwrap();
        write!(bogus, r#"{{ "Type": "BOGUS" }}"#).unwrap();
        assert_eq!(
            TerrainType::from_specfile(bogus.path()).unwrap(),
            TerrainType::Unknown
        );
    }
}
