//! Top-level co-simulation file: timing, output and the terrain layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::{DQuat, DVec3};
use serde::Deserialize;
use terracosim_core::terrain_type::read_specfile;
use terracosim_core::{ConfigError, ConfigResult};
use tracing::info;

use super::terrain::TerrainSpec;
use super::vehicle::VehicleSpec;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSpec {
    #[serde(rename = "Directory")]
    pub directory: Option<PathBuf>,
    /// Output frames per simulated second.
    #[serde(rename = "FPS")]
    pub fps: f64,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            directory: None,
            fps: 100.0,
        }
    }
}

/// One terrain rank and the wheels it serves.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TerrainNodeSpec {
    #[serde(rename = "Specfile")]
    pub specfile: PathBuf,
    #[serde(rename = "Wheels")]
    pub wheels: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CosimSpec {
    #[serde(rename = "Sync step")]
    pub sync_step: f64,
    #[serde(rename = "End time")]
    pub end_time: f64,
    /// Transport receive timeout in seconds.
    #[serde(rename = "Timeout", default = "default_timeout")]
    pub timeout: f64,
    #[serde(rename = "Output", default)]
    pub output: OutputSpec,
    #[serde(rename = "Initial position", default)]
    pub initial_position: DVec3,
    /// Heading about global Z, degrees.
    #[serde(rename = "Initial yaw", default)]
    pub initial_yaw: f64,
    #[serde(rename = "Vehicle")]
    pub vehicle: PathBuf,
    #[serde(rename = "Terrain nodes")]
    pub terrain_nodes: Vec<TerrainNodeSpec>,
}

fn default_timeout() -> f64 {
    60.0
}

impl CosimSpec {
    /// Read a co-simulation file. Relative specfile and output paths are
    /// resolved against the directory of `path`.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let doc = read_specfile(path)?;
        let mut spec: Self =
            serde_json::from_value(doc).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        spec.vehicle = base.join(&spec.vehicle);
        for node in &mut spec.terrain_nodes {
            node.specfile = base.join(&node.specfile);
        }
        if let Some(dir) = spec.output.directory.take() {
            spec.output.directory = Some(base.join(dir));
        }
        spec.validate()?;
        info!(
            "co-simulation {}: sync step {}, end time {}, {} terrain nodes",
            path.display(),
            spec.sync_step,
            spec.end_time,
            spec.terrain_nodes.len()
        );
        Ok(spec)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::require_positive("Sync step", self.sync_step)?;
        ConfigError::require_positive("End time", self.end_time)?;
        ConfigError::require_positive("Timeout", self.timeout)?;
        Duration::try_from_secs_f64(self.timeout)
            .map_err(|e| ConfigError::invalid("Timeout", format!("{} s: {e}", self.timeout)))?;
        ConfigError::require_positive("Output.FPS", self.output.fps)?;
        if !self.initial_position.is_finite() || !self.initial_yaw.is_finite() {
            return Err(ConfigError::invalid("Initial position", "must be finite"));
        }
        if self.terrain_nodes.is_empty() {
            return Err(ConfigError::Layout("no terrain nodes".to_string()));
        }
        Ok(())
    }

    /// Number of synchronization rounds to reach the end time.
    pub fn num_rounds(&self) -> u64 {
        (self.end_time / self.sync_step - 1e-9).ceil().max(0.0) as u64
    }

    /// Receive timeout; values past `Duration::MAX` saturate.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }

    pub fn initial_rotation(&self) -> DQuat {
        DQuat::from_rotation_z(self.initial_yaw.to_radians())
    }

    /// Load the vehicle and every terrain specfile and check the layout
    /// against the vehicle's wheel count.
    pub fn load(&self) -> ConfigResult<LoadedCosim> {
        let vehicle = VehicleSpec::from_file(&self.vehicle)?;
        let terrains = self
            .terrain_nodes
            .iter()
            .map(|node| TerrainSpec::from_file(&node.specfile))
            .collect::<ConfigResult<Vec<_>>>()?;
        let layout = Layout::new(
            self.terrain_nodes.iter().map(|n| n.wheels.clone()).collect(),
            vehicle.wheels.len(),
        )?;
        Ok(LoadedCosim {
            vehicle,
            terrains,
            layout,
        })
    }
}

/// All specfiles of a run, parsed.
#[derive(Debug, Clone)]
pub struct LoadedCosim {
    pub vehicle: VehicleSpec,
    pub terrains: Vec<TerrainSpec>,
    pub layout: Layout,
}

/// Assignment of global wheel indices to terrain ranks.
///
/// Terrain node `k` runs on rank `k + 1`; within a node, wheel
/// `layout.wheels(k)[i]` is local tire `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    nodes: Vec<Vec<usize>>,
    num_wheels: usize,
}

impl Layout {
    /// Every wheel in `[0, num_wheels)` must appear exactly once.
    pub fn new(nodes: Vec<Vec<usize>>, num_wheels: usize) -> ConfigResult<Self> {
        let mut owner = vec![None; num_wheels];
        for (k, wheels) in nodes.iter().enumerate() {
            if wheels.is_empty() {
                return Err(ConfigError::Layout(format!("terrain node {k} serves no wheels")));
            }
            for &w in wheels {
                let slot = owner.get_mut(w).ok_or_else(|| {
                    ConfigError::Layout(format!(
                        "terrain node {k} lists wheel {w}, vehicle has {num_wheels}"
                    ))
                })?;
                if let Some(other) = slot.replace(k) {
                    return Err(ConfigError::Layout(format!(
                        "wheel {w} assigned to terrain nodes {other} and {k}"
                    )));
                }
            }
        }
        if let Some(w) = owner.iter().position(Option::is_none) {
            return Err(ConfigError::Layout(format!("wheel {w} has no terrain node")));
        }
        Ok(Self { nodes, num_wheels })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_wheels(&self) -> usize {
        self.num_wheels
    }

    /// Global wheel indices served by terrain node `node`.
    pub fn wheels(&self, node: usize) -> &[usize] {
        self.nodes.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transport rank of terrain node `node`.
    pub fn rank_of(node: usize) -> usize {
        node + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_validation() {
        let layout = Layout::new(vec![vec![0, 2], vec![1, 3]], 4).unwrap();
        assert_eq!(layout.num_nodes(), 2);
        assert_eq!(layout.wheels(1), &[1, 3]);
        assert_eq!(Layout::rank_of(1), 2);
        assert!(layout.wheels(5).is_empty());

        assert!(matches!(
            Layout::new(vec![vec![0, 1], vec![1]], 2),
            Err(ConfigError::Layout(_))
        ));
        assert!(matches!(Layout::new(vec![vec![0]], 2), Err(ConfigError::Layout(_))));
        assert!(matches!(Layout::new(vec![vec![0, 5]], 1), Err(ConfigError::Layout(_))));
        assert!(matches!(
            Layout::new(vec![vec![0], vec![]], 1),
            Err(ConfigError::Layout(_))
        ));
    }

    #[test]
    fn test_num_rounds() {
        let mut spec = CosimSpec {
            sync_step: 0.01,
            end_time: 0.05,
            timeout: 60.0,
            output: OutputSpec::default(),
            initial_position: DVec3::ZERO,
            initial_yaw: 0.0,
            vehicle: PathBuf::from("vehicle.json"),
            terrain_nodes: vec![TerrainNodeSpec {
                specfile: PathBuf::from("terrain.json"),
                wheels: vec![0],
            }],
        };
        assert_eq!(spec.num_rounds(), 5);
        spec.end_time = 0.051;
        assert_eq!(spec.num_rounds(), 6);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let mut spec = CosimSpec {
            sync_step: 0.01,
            end_time: 0.05,
            timeout: 1e20,
            output: OutputSpec::default(),
            initial_position: DVec3::ZERO,
            initial_yaw: 0.0,
            vehicle: PathBuf::from("vehicle.json"),
            terrain_nodes: vec![TerrainNodeSpec {
                specfile: PathBuf::from("terrain.json"),
                wheels: vec![0],
            }],
        };
        match spec.validate() {
            Err(ConfigError::InvalidParameter { .. }) => {}
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
        assert_eq!(spec.timeout(), Duration::MAX);

        spec.timeout = f64::INFINITY;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_paths_resolved_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vehicle.json"),
            r#"{ "Step size": 1e-3, "Wheels": [ { "Location": [0, 0, 0] } ] }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("rigid.json"),
            r#"{ "Type": "RIGID", "Step size": 1e-3 }"#,
        )
        .unwrap();
        let path = dir.path().join("cosim.json");
        std::fs::write(
            &path,
            r#"{
                "Sync step": 0.01,
                "End time": 0.1,
                "Initial yaw": 90.0,
                "Output": { "Directory": "out" },
                "Vehicle": "vehicle.json",
                "Terrain nodes": [ { "Specfile": "rigid.json", "Wheels": [0] } ]
            }"#,
        )
        .unwrap();

        let spec = CosimSpec::from_file(&path).unwrap();
        assert_eq!(spec.vehicle, dir.path().join("vehicle.json"));
        assert_eq!(spec.output.directory, Some(dir.path().join("out")));
        assert_eq!(spec.timeout(), Duration::from_secs(60));
        let heading = spec.initial_rotation() * DVec3::X;
        assert!((heading - DVec3::Y).length() < 1e-12);

        let loaded = spec.load().unwrap();
        assert_eq!(loaded.vehicle.wheels.len(), 1);
        assert_eq!(loaded.layout.wheels(0), &[0]);
    }
}
