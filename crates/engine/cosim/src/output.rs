//! Per-frame output of the nodes.
//!
//! Frames are written every `k` rounds so that the output rate approximates
//! the configured frames per second. Each node writes its own files:
//!
//! - `vehicle/chassis.csv`, `vehicle/wheels.csv`
//! - `terrain_<k>/forces.csv` and one `terrain_<k>/points_<frame>.csv` per frame
//!
//! A [`FrameHook`] sees the same data in memory, for rendering or inspection.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use glam::{DQuat, DVec3};
use terracosim_core::{TerrainForce, WheelState};
use tracing::debug;

use crate::error::Result;

/// Which rounds produce an output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchedule {
    every: u64,
}

impl OutputSchedule {
    pub fn new(fps: f64, sync_step: f64) -> Self {
        let every = (1.0 / (fps * sync_step)).round().max(1.0) as u64;
        Self { every }
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    /// Whether the state reached after `round` (0-based) is a frame.
    pub fn is_frame(&self, round: u64) -> bool {
        (round + 1) % self.every == 0
    }
}

/// Data of one node at one output frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub rank: usize,
    pub index: u64,
    pub time: f64,
    pub wheels: &'a [WheelState],
    pub forces: &'a [TerrainForce],
    pub points: &'a [DVec3],
}

/// Receives every output frame of a node.
pub trait FrameHook: Send {
    fn on_frame(&mut self, frame: &Frame<'_>);
}

fn writer(path: &Path) -> Result<csv::Writer<File>> {
    Ok(csv::Writer::from_path(path)?)
}

/// CSV writers of the vehicle node.
pub struct VehicleOutput {
    chassis: csv::Writer<File>,
    wheels: csv::Writer<File>,
}

impl VehicleOutput {
    pub fn create(root: &Path) -> Result<Self> {
        let dir = root.join("vehicle");
        fs::create_dir_all(&dir)?;
        let mut chassis = writer(&dir.join("chassis.csv"))?;
        chassis.write_record(["time", "x", "y", "z", "qw", "qx", "qy", "qz"])?;
        let mut wheels = writer(&dir.join("wheels.csv"))?;
        wheels.write_record([
            "time", "wheel", "x", "y", "z", "vx", "vy", "vz", "wx", "wy", "wz", "omega",
        ])?;
        debug!("vehicle output in {}", dir.display());
        Ok(Self { chassis, wheels })
    }

    pub fn write_frame(
        &mut self,
        time: f64,
        chassis: (DVec3, DQuat),
        wheels: &[WheelState],
    ) -> Result<()> {
        let (p, q) = chassis;
        self.chassis
            .serialize((time, p.x, p.y, p.z, q.w, q.x, q.y, q.z))?;
        for s in wheels {
            self.wheels.serialize((
                time, s.wheel, s.pos.x, s.pos.y, s.pos.z, s.lin_vel.x, s.lin_vel.y, s.lin_vel.z,
                s.ang_vel.x, s.ang_vel.y, s.ang_vel.z, s.omega,
            ))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.chassis.flush()?;
        self.wheels.flush()?;
        Ok(())
    }
}

/// CSV writers of one terrain node.
pub struct TerrainOutput {
    dir: PathBuf,
    forces: csv::Writer<File>,
}

impl TerrainOutput {
    pub fn create(root: &Path, node: usize) -> Result<Self> {
        let dir = root.join(format!("terrain_{node}"));
        fs::create_dir_all(&dir)?;
        let mut forces = writer(&dir.join("forces.csv"))?;
        forces.write_record(["time", "wheel", "fx", "fy", "fz", "mx", "my", "mz"])?;
        debug!("terrain output in {}", dir.display());
        Ok(Self { dir, forces })
    }

    pub fn write_frame(
        &mut self,
        frame: u64,
        time: f64,
        forces: &[TerrainForce],
        points: &[DVec3],
    ) -> Result<()> {
        for f in forces {
            self.forces.serialize((
                time, f.wheel, f.force.x, f.force.y, f.force.z, f.moment.x, f.moment.y, f.moment.z,
            ))?;
        }
        if !points.is_empty() {
            let mut out = writer(&self.dir.join(format!("points_{frame:05}.csv")))?;
            out.write_record(["x", "y", "z"])?;
            for p in points {
                out.serialize((p.x, p.y, p.z))?;
            }
            out.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.forces.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule() {
        let s = OutputSchedule::new(50.0, 0.005);
        assert_eq!(s.every(), 4);
        assert!(!s.is_frame(0));
        assert!(s.is_frame(3));
        assert!(s.is_frame(7));
        // faster than the sync rate: every round
        assert_eq!(OutputSchedule::new(1000.0, 0.01).every(), 1);
    }

    #[test]
    fn test_terrain_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = TerrainOutput::create(dir.path(), 2).unwrap();
        let forces = [TerrainForce {
            wheel: 1,
            force: DVec3::new(0.0, 0.0, 100.0),
            moment: DVec3::ZERO,
        }];
        out.write_frame(0, 0.01, &forces, &[DVec3::ZERO, DVec3::X]).unwrap();
        out.write_frame(1, 0.02, &forces, &[]).unwrap();
        out.flush().unwrap();

        let node_dir = dir.path().join("terrain_2");
        let text = fs::read_to_string(node_dir.join("forces.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(node_dir.join("points_00000.csv").exists());
        assert!(!node_dir.join("points_00001.csv").exists());
    }

    #[test]
    fn test_vehicle_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = VehicleOutput::create(dir.path()).unwrap();
        let wheels = [
            WheelState::at_rest(0, DVec3::Z, DQuat::IDENTITY),
            WheelState::at_rest(1, DVec3::Z, DQuat::IDENTITY),
        ];
        out.write_frame(0.01, (DVec3::ZERO, DQuat::IDENTITY), &wheels).unwrap();
        out.flush().unwrap();
        let text = fs::read_to_string(dir.path().join("vehicle/wheels.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("time,wheel"));
    }
}
