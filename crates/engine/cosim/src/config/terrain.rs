//! Terrain specfiles.
//!
//! Parsing is two-phase: the `"Type"` member is resolved first, so an
//! unknown formulation is rejected before any variant section is looked at;
//! then the common keys and the section of that variant are read.

use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use terracosim_core::terrain_type::read_specfile;
use terracosim_core::{ConfigError, ConfigResult, ContactMethod, MaterialInfo, TerrainType};
use terracosim_physics::{ScmParams, SphParams};
use tracing::debug;

/// Kind of proxy a terrain node hosts for every tire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterfaceType {
    /// One rigid body per tire.
    #[default]
    #[serde(rename = "BODY")]
    Body,
    /// One triangulated tread surface per tire.
    #[serde(rename = "MESH")]
    Mesh,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => f.write_str("BODY"),
            Self::Mesh => f.write_str("MESH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PatchDimensions {
    #[serde(rename = "Length")]
    pub length: f64,
    #[serde(rename = "Width")]
    pub width: f64,
}

impl Default for PatchDimensions {
    fn default() -> Self {
        Self {
            length: 4.0,
            width: 2.0,
        }
    }
}

/// SCM `"Soil parameters"` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SoilParameters {
    #[serde(rename = "Bekker Kphi")]
    pub bekker_kphi: f64,
    #[serde(rename = "Bekker Kc")]
    pub bekker_kc: f64,
    #[serde(rename = "Bekker n exponent")]
    pub bekker_n: f64,
    #[serde(rename = "Mohr cohesive limit")]
    pub mohr_cohesion: f64,
    #[serde(rename = "Mohr friction limit")]
    pub mohr_friction: f64,
    #[serde(rename = "Janosi shear coefficient")]
    pub janosi_shear: f64,
    #[serde(rename = "Elastic stiffness")]
    pub elastic_stiffness: f64,
    #[serde(rename = "Damping R")]
    pub damping_r: f64,
}

impl Default for SoilParameters {
    fn default() -> Self {
        let p = ScmParams::default();
        Self {
            bekker_kphi: p.bekker_kphi,
            bekker_kc: p.bekker_kc,
            bekker_n: p.bekker_n,
            mohr_cohesion: p.mohr_cohesion,
            mohr_friction: p.mohr_friction,
            janosi_shear: p.janosi_shear,
            elastic_stiffness: p.elastic_stiffness,
            damping_r: p.damping_r,
        }
    }
}

impl From<SoilParameters> for ScmParams {
    fn from(s: SoilParameters) -> Self {
        Self {
            bekker_kphi: s.bekker_kphi,
            bekker_kc: s.bekker_kc,
            bekker_n: s.bekker_n,
            mohr_cohesion: s.mohr_cohesion,
            mohr_friction: s.mohr_friction,
            janosi_shear: s.janosi_shear,
            elastic_stiffness: s.elastic_stiffness,
            damping_r: s.damping_r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScmSection {
    pub soil: SoilParameters,
    pub grid_spacing: f64,
}

/// `"Granular material"` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GranularMaterial {
    #[serde(rename = "Radius")]
    pub radius: f64,
    #[serde(rename = "Density")]
    pub density: f64,
}

impl Default for GranularMaterial {
    fn default() -> Self {
        Self {
            radius: 0.01,
            density: 2000.0,
        }
    }
}

/// `"Particle generation"` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParticleGeneration {
    #[serde(rename = "Number layers")]
    pub layers: usize,
    #[serde(rename = "Seed")]
    pub seed: u64,
    /// Time the bed settles under gravity before the first round.
    #[serde(rename = "Settling time")]
    pub settling_time: f64,
}

impl Default for ParticleGeneration {
    fn default() -> Self {
        Self {
            layers: 4,
            seed: 0,
            settling_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranularSection {
    pub material: GranularMaterial,
    pub generation: ParticleGeneration,
    /// Worker threads (GRANULAR_OMP only); `None` uses the global pool.
    pub threads: Option<usize>,
}

/// `"SPH"` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SphProperties {
    #[serde(rename = "Depth")]
    pub depth: f64,
    #[serde(rename = "Kinematic viscosity")]
    pub kinematic_viscosity: f64,
    #[serde(rename = "Sound speed factor")]
    pub sound_speed_factor: f64,
}

impl Default for SphProperties {
    fn default() -> Self {
        let p = SphParams::default();
        Self {
            depth: p.depth,
            kinematic_viscosity: p.kinematic_viscosity,
            sound_speed_factor: p.sound_speed_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphSection {
    pub material: GranularMaterial,
    pub properties: SphProperties,
}

impl SphSection {
    pub fn params(&self) -> SphParams {
        SphParams {
            radius: self.material.radius,
            density: self.material.density,
            depth: self.properties.depth,
            kinematic_viscosity: self.properties.kinematic_viscosity,
            sound_speed_factor: self.properties.sound_speed_factor,
        }
    }
}

/// Variant-specific part of a terrain specfile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerrainParams {
    Rigid,
    Scm(ScmSection),
    Granular(GranularSection),
    Sph(SphSection),
}

#[derive(Debug, Clone, Deserialize)]
struct CommonSection {
    #[serde(rename = "Contact method", default)]
    method: ContactMethod,
    #[serde(rename = "Step size")]
    step_size: f64,
    #[serde(rename = "Patch dimensions", default)]
    patch: PatchDimensions,
    #[serde(rename = "Interface", default)]
    interface: InterfaceType,
    #[serde(rename = "Fixed proxies", default)]
    fixed_proxies: bool,
    #[serde(rename = "Terrain material")]
    terrain_material: Option<MaterialInfo>,
    #[serde(rename = "Tire material", default)]
    tire_material: MaterialInfo,
}

/// Fully parsed terrain specfile.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSpec {
    pub terrain_type: TerrainType,
    pub method: ContactMethod,
    /// Largest internal sub-step.
    pub step_size: f64,
    pub patch: PatchDimensions,
    pub interface: InterfaceType,
    pub fixed_proxies: bool,
    /// Surface material; `None` selects the default material of `method`.
    pub terrain_material: Option<MaterialInfo>,
    /// Material given to every tire served by the node.
    pub tire_material: MaterialInfo,
    pub params: TerrainParams,
}

impl TerrainSpec {
    /// Read and validate a terrain specfile.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let doc = read_specfile(path)?;
        let spec = Self::from_value(&doc, path)?;
        debug!(
            "terrain specfile {}: {} ({}, {} interface)",
            path.display(),
            spec.terrain_type,
            spec.method,
            spec.interface
        );
        Ok(spec)
    }

    /// Parse an already loaded specfile; `path` is only used in errors.
    pub fn from_value(doc: &Value, path: &Path) -> ConfigResult<Self> {
        let name = doc
            .get("Type")
            .and_then(Value::as_str)
            .ok_or_else(|| missing(path, "terrain type (\"Type\")"))?;
        let terrain_type = TerrainType::from_name(name);
        if terrain_type == TerrainType::Unknown {
            return Err(ConfigError::UnknownTerrainType(name.to_string()));
        }

        let common: CommonSection =
            serde_json::from_value(doc.clone()).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        let params = match terrain_type {
            TerrainType::Rigid => TerrainParams::Rigid,
            TerrainType::Scm => TerrainParams::Scm(ScmSection {
                soil: section(doc, path, "Soil parameters")?,
                grid_spacing: section(doc, path, "Grid spacing")?,
            }),
            t if t.is_discrete_granular() => {
                let threads = match terrain_type {
                    TerrainType::GranularOmp => optional_section(doc, path, "Threads")?,
                    _ => None,
                };
                TerrainParams::Granular(GranularSection {
                    material: section(doc, path, "Granular material")?,
                    generation: optional_section(doc, path, "Particle generation")?
                        .unwrap_or_default(),
                    threads,
                })
            }
            TerrainType::GranularSph => TerrainParams::Sph(SphSection {
                material: section(doc, path, "Granular material")?,
                properties: section(doc, path, "SPH")?,
            }),
            _ => return Err(ConfigError::UnknownTerrainType(name.to_string())),
        };

        let spec = Self {
            terrain_type,
            method: common.method,
            step_size: common.step_size,
            patch: common.patch,
            interface: common.interface,
            fixed_proxies: common.fixed_proxies,
            terrain_material: common.terrain_material,
            tire_material: common.tire_material,
            params,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Terrain settings with default parameters for a formulation.
    pub fn with_defaults(terrain_type: TerrainType, step_size: f64) -> ConfigResult<Self> {
        let params = match terrain_type {
            TerrainType::Rigid => TerrainParams::Rigid,
            TerrainType::Scm => TerrainParams::Scm(ScmSection {
                soil: SoilParameters::default(),
                grid_spacing: 0.02,
            }),
            t if t.is_discrete_granular() => {
                TerrainParams::Granular(GranularSection {
                    material: GranularMaterial::default(),
                    generation: ParticleGeneration::default(),
                    threads: None,
                })
            }
            TerrainType::GranularSph => TerrainParams::Sph(SphSection {
                material: GranularMaterial::default(),
                properties: SphProperties::default(),
            }),
            _ => return Err(ConfigError::UnknownTerrainType(terrain_type.name().to_string())),
        };
        let spec = Self {
            terrain_type,
            method: ContactMethod::Smc,
            step_size,
            patch: PatchDimensions::default(),
            interface: InterfaceType::Body,
            fixed_proxies: false,
            terrain_material: None,
            tire_material: MaterialInfo::default(),
            params,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Range checks of the common keys and the variant section.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::require_positive("Step size", self.step_size)?;
        ConfigError::require_positive("Patch dimensions.Length", self.patch.length)?;
        ConfigError::require_positive("Patch dimensions.Width", self.patch.width)?;
        match &self.params {
            TerrainParams::Rigid => {}
            TerrainParams::Scm(scm) => {
                ConfigError::require_positive("Grid spacing", scm.grid_spacing)?;
            }
            TerrainParams::Granular(g) => {
                ConfigError::require_positive("Granular material.Radius", g.material.radius)?;
                ConfigError::require_positive("Granular material.Density", g.material.density)?;
                if g.generation.layers == 0 {
                    return Err(ConfigError::invalid(
                        "Particle generation.Number layers",
                        "must be at least 1",
                    ));
                }
                if g.threads == Some(0) {
                    return Err(ConfigError::invalid("Threads", "must be at least 1"));
                }
            }
            TerrainParams::Sph(sph) => {
                ConfigError::require_positive("Granular material.Radius", sph.material.radius)?;
                ConfigError::require_positive("Granular material.Density", sph.material.density)?;
                ConfigError::require_positive("SPH.Depth", sph.properties.depth)?;
                ConfigError::require_positive(
                    "SPH.Sound speed factor",
                    sph.properties.sound_speed_factor,
                )?;
            }
        }
        Ok(())
    }
}

fn missing(path: &Path, member: &str) -> ConfigError {
    ConfigError::MissingMember {
        path: path.to_path_buf(),
        member: member.to_string(),
    }
}

/// Deserialize a required member of `doc`.
pub(crate) fn section<T: DeserializeOwned>(
    doc: &Value,
    path: &Path,
    member: &str,
) -> ConfigResult<T> {
    optional_section(doc, path, member)?.ok_or_else(|| missing(path, member))
}

/// Deserialize a member of `doc` if present.
pub(crate) fn optional_section<T: DeserializeOwned>(
    doc: &Value,
    path: &Path,
    member: &str,
) -> ConfigResult<Option<T>> {
    doc.get(member)
        .map(|v| {
            serde_json::from_value(v.clone()).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })
        })
        .transpose()
}
