//! Collider helpers for the rigid terrain domain.
//!
//! The ground is a thick slab whose top face lies at z = 0. Tire proxies are
//! either analytic cylinders (spin axis along local Y) or triangle meshes.
//! Friction and restitution come from the composite material of the pair and
//! are combined with `Min` so the tire side never raises them.

use crate::convert::to_point;
use crate::error::{SolverError, SolverResult};
use rapier3d::prelude::*;
use terracosim_core::TriMesh;

/// Slab thickness below the ground surface.
const GROUND_THICKNESS: Real = 1.0;

/// Create the ground slab for a patch of `length` x `width`.
///
/// # Arguments
/// * `length` - Patch extent along X
/// * `width` - Patch extent along Y
/// * `friction` - Coefficient of friction of the tire/terrain pair
/// * `restitution` - Coefficient of restitution of the pair
pub fn create_ground_collider(
    length: f64,
    width: f64,
    friction: f64,
    restitution: f64,
) -> Collider {
    let half_thickness = 0.5 * GROUND_THICKNESS;
    ColliderBuilder::cuboid(0.5 * length as Real, 0.5 * width as Real, half_thickness)
        .translation(vector![0.0, 0.0, -half_thickness])
        .friction(friction as Real)
        .friction_combine_rule(CoefficientCombineRule::Min)
        .restitution(restitution as Real)
        .restitution_combine_rule(CoefficientCombineRule::Min)
        .build()
}

/// Create a cylindrical tire collider around local Y.
///
/// # Arguments
/// * `radius` - Tire radius
/// * `width` - Tread width
pub fn create_wheel_collider(radius: f64, width: f64, friction: f64, restitution: f64) -> Collider {
    ColliderBuilder::cylinder(0.5 * width as Real, radius as Real)
        .friction(friction as Real)
        .friction_combine_rule(CoefficientCombineRule::Min)
        .restitution(restitution as Real)
        .restitution_combine_rule(CoefficientCombineRule::Min)
        .build()
}

/// Create a triangle mesh tire collider. The mesh is given in the tire frame.
///
/// Returns an error if Rapier rejects the mesh topology.
pub fn create_mesh_collider(
    mesh: &TriMesh,
    friction: f64,
    restitution: f64,
) -> SolverResult<Collider> {
    let vertices: Vec<Point<Real>> = mesh.vertices.iter().map(|v| to_point(*v)).collect();
    let indices = mesh.triangles.clone();

    let builder = ColliderBuilder::trimesh(vertices, indices).map_err(|e| SolverError::Setup {
        engine: "rigid",
        detail: format!("tire mesh rejected: {e:?}"),
    })?;

    Ok(builder
        .friction(friction as Real)
        .friction_combine_rule(CoefficientCombineRule::Min)
        .restitution(restitution as Real)
        .restitution_combine_rule(CoefficientCombineRule::Min)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_top_at_zero() {
        let collider = create_ground_collider(10.0, 4.0, 0.8, 0.0);
        let aabb = collider.compute_aabb();
        assert!(aabb.maxs.z.abs() < 1e-6);
        assert!((aabb.maxs.x - 5.0).abs() < 1e-6);
        assert!((aabb.mins.y + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_collider_is_cylinder() {
        let collider = create_wheel_collider(0.5, 0.3, 0.9, 0.1);
        let cyl = collider.shape().as_cylinder().unwrap();
        assert!((cyl.radius - 0.5).abs() < 1e-6);
        assert!((cyl.half_height - 0.15).abs() < 1e-6);
        assert!((collider.friction() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_mesh_collider() {
        let mesh = TriMesh::cylinder(0.5, 0.3, 24);
        let collider = create_mesh_collider(&mesh, 0.8, 0.0).unwrap();
        let trimesh = collider.shape().as_trimesh().unwrap();
        assert_eq!(trimesh.indices().len(), mesh.num_triangles());
    }
}
