//! Fixed-topology triangle meshes.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Triangle mesh expressed in a body-local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriMesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriMesh {
    pub fn new(vertices: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> ConfigResult<Self> {
        let mesh = Self {
            vertices,
            triangles,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Closed cylinder around the local Y axis, the wheel spin axis.
    ///
    /// `divisions` is the number of segments around the circumference (at
    /// least 3).
    pub fn cylinder(radius: f64, width: f64, divisions: u32) -> Self {
        let n = divisions.max(3);
        let hw = 0.5 * width;
        let mut vertices = Vec::with_capacity(2 * n as usize + 2);

        for side in [-hw, hw] {
            for k in 0..n {
                let a = std::f64::consts::TAU * k as f64 / n as f64;
                vertices.push(DVec3::new(radius * a.cos(), side, radius * a.sin()));
            }
        }
        let left_center = vertices.len() as u32;
        vertices.push(DVec3::new(0.0, -hw, 0.0));
        let right_center = vertices.len() as u32;
        vertices.push(DVec3::new(0.0, hw, 0.0));

        let mut triangles = Vec::with_capacity(4 * n as usize);
        for k in 0..n {
            let k1 = (k + 1) % n;
            let (a, b) = (k, k1);
            let (c, d) = (k + n, k1 + n);
            // tread
            triangles.push([a, c, b]);
            triangles.push([b, c, d]);
            // side walls
            triangles.push([left_center, a, b]);
            triangles.push([right_center, d, c]);
        }

        Self {
            vertices,
            triangles,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Check that every triangle references existing vertices.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.triangles.is_empty() {
            return Err(ConfigError::invalid("mesh", "no triangles"));
        }
        let n = self.vertices.len() as u32;
        if let Some(t) = self.triangles.iter().find(|t| t.iter().any(|&i| i >= n)) {
            return Err(ConfigError::invalid(
                "mesh",
                format!("triangle {t:?} references a vertex beyond {n}"),
            ));
        }
        Ok(())
    }

    /// Vertices after the rigid transform `(pos, rot)`.
    pub fn transformed(&self, pos: DVec3, rot: DQuat) -> Vec<DVec3> {
        self.vertices.iter().map(|&v| pos + rot * v).collect()
    }

    /// Largest distance of a vertex from the local origin.
    pub fn bounding_radius(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f64::max)
    }
}
