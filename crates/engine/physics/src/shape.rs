//! Proxy geometry for the particle and soil engines.
//!
//! A [`KinematicProxy`] is a rigid shape whose pose is imposed from outside.
//! Between two pose updates it coasts with the last imposed velocity, unless
//! it is fixed. The engines query it for surface points near a particle and
//! for where a vertical line first enters it from below.

use glam::{DQuat, DVec3};
use terracosim_core::TriMesh;

/// Shape of a proxy in its local frame. Cylinders spin about local Y.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyShape {
    Cylinder { radius: f64, width: f64 },
    Mesh { mesh: TriMesh },
}

impl ProxyShape {
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Cylinder { radius, width } => (radius * radius + 0.25 * width * width).sqrt(),
            Self::Mesh { mesh } => mesh.bounding_radius(),
        }
    }
}

/// Closest point on a proxy surface to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Point on the surface, global frame.
    pub point: DVec3,
    /// Unit normal pointing from the surface towards the query point.
    pub normal: DVec3,
    /// Signed distance of the query point; negative inside the shape.
    pub distance: f64,
}

/// A rigid proxy driven by imposed states.
#[derive(Debug, Clone)]
pub struct KinematicProxy {
    shape: ProxyShape,
    pos: DVec3,
    rot: DQuat,
    lin_vel: DVec3,
    ang_vel: DVec3,
    fixed: bool,
    world_vertices: Vec<DVec3>,
    bounding_radius: f64,
}

impl KinematicProxy {
    /// Proxy at the origin with zero velocity.
    pub fn new(shape: ProxyShape, fixed: bool) -> Self {
        let bounding_radius = shape.bounding_radius();
        let mut proxy = Self {
            shape,
            pos: DVec3::ZERO,
            rot: DQuat::IDENTITY,
            lin_vel: DVec3::ZERO,
            ang_vel: DVec3::ZERO,
            fixed,
            world_vertices: Vec::new(),
            bounding_radius,
        };
        proxy.refresh_vertices();
        proxy
    }

    pub fn shape(&self) -> &ProxyShape {
        &self.shape
    }

    pub fn position(&self) -> DVec3 {
        self.pos
    }

    pub fn rotation(&self) -> DQuat {
        self.rot
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }

    /// Mesh vertices in the global frame (empty for cylinders).
    pub fn world_vertices(&self) -> &[DVec3] {
        &self.world_vertices
    }

    /// Impose pose and velocity.
    pub fn set_state(&mut self, pos: DVec3, rot: DQuat, lin_vel: DVec3, ang_vel: DVec3) {
        self.pos = pos;
        self.rot = rot.normalize();
        self.lin_vel = lin_vel;
        self.ang_vel = ang_vel;
        self.refresh_vertices();
    }

    /// Coast for `h` seconds with the imposed velocity.
    pub fn integrate(&mut self, h: f64) {
        if self.fixed {
            return;
        }
        self.pos += self.lin_vel * h;
        self.rot = (DQuat::from_scaled_axis(self.ang_vel * h) * self.rot).normalize();
        self.refresh_vertices();
    }

    /// Imposed (linear, angular) velocity; zero for fixed proxies.
    pub fn velocity(&self) -> (DVec3, DVec3) {
        if self.fixed {
            (DVec3::ZERO, DVec3::ZERO)
        } else {
            (self.lin_vel, self.ang_vel)
        }
    }

    /// Velocity of a point attached to the proxy. Fixed proxies do not move.
    pub fn point_velocity(&self, point: DVec3) -> DVec3 {
        if self.fixed {
            DVec3::ZERO
        } else {
            self.lin_vel + self.ang_vel.cross(point - self.pos)
        }
    }

    /// Axis-aligned bounds enclosing the proxy.
    pub fn aabb(&self) -> (DVec3, DVec3) {
        let r = DVec3::splat(self.bounding_radius);
        (self.pos - r, self.pos + r)
    }

    /// Surface points within `reach` of `p`, appended to `out`.
    ///
    /// A cylinder yields at most one point (which may be inside). A mesh
    /// yields one point per face closer than `reach`.
    pub fn surface_contacts(&self, p: DVec3, reach: f64, out: &mut Vec<SurfacePoint>) {
        if (p - self.pos).length_squared() > (self.bounding_radius + reach).powi(2) {
            return;
        }
        match &self.shape {
            ProxyShape::Cylinder { radius, width } => {
                let sp = self.cylinder_closest(p, *radius, *width);
                if sp.distance < reach {
                    out.push(sp);
                }
            }
            ProxyShape::Mesh { mesh } => {
                for t in &mesh.triangles {
                    let [a, b, c] = t.map(|i| self.world_vertices[i as usize]);
                    let q = closest_point_on_triangle(p, a, b, c);
                    let d = p - q;
                    let dist = d.length();
                    if dist >= reach {
                        continue;
                    }
                    let normal = if dist > 1e-12 {
                        d / dist
                    } else {
                        (b - a).cross(c - a).normalize_or_zero()
                    };
                    out.push(SurfacePoint {
                        point: q,
                        normal,
                        distance: dist,
                    });
                }
            }
        }
    }

    /// Height at which the vertical line through `(x, y)` first enters the
    /// proxy from below, if it intersects it at all.
    pub fn lowest_point_above(&self, x: f64, y: f64) -> Option<f64> {
        let dx = x - self.pos.x;
        let dy = y - self.pos.y;
        if dx * dx + dy * dy > self.bounding_radius * self.bounding_radius {
            return None;
        }
        match &self.shape {
            ProxyShape::Cylinder { radius, width } => {
                self.cylinder_vertical_hit(x, y, *radius, *width)
            }
            ProxyShape::Mesh { mesh } => mesh
                .triangles
                .iter()
                .filter_map(|t| {
                    let [a, b, c] = t.map(|i| self.world_vertices[i as usize]);
                    vertical_hit_triangle(x, y, a, b, c)
                })
                .reduce(f64::min),
        }
    }

    fn refresh_vertices(&mut self) {
        if let ProxyShape::Mesh { mesh } = &self.shape {
            self.world_vertices = mesh.transformed(self.pos, self.rot);
        }
    }

    fn cylinder_closest(&self, p: DVec3, radius: f64, width: f64) -> SurfacePoint {
        let hw = 0.5 * width;
        let q = self.rot.inverse() * (p - self.pos);
        let d = (q.x * q.x + q.z * q.z).sqrt();
        let radial = if d > 1e-12 {
            DVec3::new(q.x / d, 0.0, q.z / d)
        } else {
            DVec3::X
        };
        let dr = d - radius;
        let da = q.y.abs() - hw;

        let (closest, normal, distance) = if dr <= 0.0 && da <= 0.0 {
            if dr > da {
                (radial * radius + DVec3::new(0.0, q.y, 0.0), radial, dr)
            } else {
                let side = q.y.signum();
                (
                    DVec3::new(q.x, side * hw, q.z),
                    DVec3::new(0.0, side, 0.0),
                    da,
                )
            }
        } else {
            let closest = radial * d.min(radius) + DVec3::new(0.0, q.y.clamp(-hw, hw), 0.0);
            let diff = q - closest;
            let dist = diff.length();
            (closest, diff / dist.max(1e-12), dist)
        };

        SurfacePoint {
            point: self.pos + self.rot * closest,
            normal: self.rot * normal,
            distance,
        }
    }

    fn cylinder_vertical_hit(&self, x: f64, y: f64, radius: f64, width: f64) -> Option<f64> {
        let axis = self.rot * DVec3::Y;
        let hw = 0.5 * width;
        // point of the line at z = 0, relative to the center
        let w0 = DVec3::new(x - self.pos.x, y - self.pos.y, -self.pos.z);
        let w0p = w0 - axis * w0.dot(axis);
        let ezp = DVec3::Z - axis * axis.z;

        let mut best: Option<f64> = None;
        let qa = ezp.length_squared();
        if qa > 1e-12 {
            let qb = 2.0 * w0p.dot(ezp);
            let qc = w0p.length_squared() - radius * radius;
            let disc = qb * qb - 4.0 * qa * qc;
            if disc >= 0.0 {
                let s = disc.sqrt();
                for t in [(-qb - s) / (2.0 * qa), (-qb + s) / (2.0 * qa)] {
                    let axial = (w0 + DVec3::Z * t).dot(axis);
                    if axial.abs() <= hw {
                        best = min_option(best, t);
                    }
                }
            }
        }
        // end caps, only reachable when the axis is tilted out of the ground plane
        if axis.z.abs() > 1e-9 {
            for side in [-hw, hw] {
                let t = (side - w0.dot(axis)) / axis.z;
                let v = w0 + DVec3::Z * t;
                let radial = v - axis * v.dot(axis);
                if radial.length_squared() <= radius * radius {
                    best = min_option(best, t);
                }
            }
        }
        best
    }
}

fn min_option(best: Option<f64>, t: f64) -> Option<f64> {
    Some(best.map_or(t, |b| b.min(t)))
}

/// Closest point to `p` on triangle `abc` (Ericson, Real-Time Collision
/// Detection, 5.1.5).
pub(crate) fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Height of the triangle above `(x, y)`, if its projection contains it.
fn vertical_hit_triangle(x: f64, y: f64, a: DVec3, b: DVec3, c: DVec3) -> Option<f64> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < 1e-14 {
        return None;
    }
    let l1 = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / det;
    let l2 = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / det;
    let l3 = 1.0 - l1 - l2;
    if l1 < 0.0 || l2 < 0.0 || l3 < 0.0 {
        return None;
    }
    Some(l1 * a.z + l2 * b.z + l3 * c.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel(radius: f64, width: f64) -> KinematicProxy {
        let mut proxy = KinematicProxy::new(ProxyShape::Cylinder { radius, width }, false);
        proxy.set_state(DVec3::new(0.0, 0.0, 1.0), DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);
        proxy
    }

    #[test]
    fn test_cylinder_closest_outside() {
        let proxy = wheel(0.5, 0.2);
        let mut out = Vec::new();
        proxy.surface_contacts(DVec3::new(0.0, 0.0, 0.4), 0.2, &mut out);
        assert_eq!(out.len(), 1);
        let sp = out[0];
        assert!((sp.distance - 0.1).abs() < 1e-12);
        assert!((sp.normal - DVec3::NEG_Z).length() < 1e-12);
        assert!((sp.point - DVec3::new(0.0, 0.0, 0.5)).length() < 1e-12);
    }

    #[test]
    fn test_cylinder_closest_inside() {
        let proxy = wheel(0.5, 0.2);
        let mut out = Vec::new();
        proxy.surface_contacts(DVec3::new(0.0, 0.0, 0.55), 0.1, &mut out);
        assert_eq!(out.len(), 1);
        assert!((out[0].distance + 0.05).abs() < 1e-12);
        assert!((out[0].normal - DVec3::NEG_Z).length() < 1e-12);
    }

    #[test]
    fn test_cylinder_out_of_reach() {
        let proxy = wheel(0.5, 0.2);
        let mut out = Vec::new();
        proxy.surface_contacts(DVec3::new(0.0, 0.0, 0.2), 0.1, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_cylinder_vertical_hit() {
        let proxy = wheel(0.5, 0.2);
        let z = proxy.lowest_point_above(0.0, 0.0).unwrap();
        assert!((z - 0.5).abs() < 1e-12);
        let z = proxy.lowest_point_above(0.3, 0.05).unwrap();
        assert!((z - (1.0 - 0.4)).abs() < 1e-12);
        // beyond the tread width
        assert!(proxy.lowest_point_above(0.0, 0.15).is_none());
    }

    #[test]
    fn test_mesh_vertical_hit_close_to_cylinder() {
        let mesh = TriMesh::cylinder(0.5, 0.2, 72);
        let mut proxy = KinematicProxy::new(ProxyShape::Mesh { mesh }, false);
        proxy.set_state(DVec3::new(0.0, 0.0, 1.0), DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);
        let z = proxy.lowest_point_above(0.01, 0.0).unwrap();
        assert!((z - 0.5).abs() < 2e-3);
    }

    #[test]
    fn test_mesh_face_contacts() {
        let mesh = TriMesh::cylinder(0.5, 0.2, 16);
        let mut proxy = KinematicProxy::new(ProxyShape::Mesh { mesh }, false);
        proxy.set_state(DVec3::new(0.0, 0.0, 1.0), DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);
        let mut out = Vec::new();
        proxy.surface_contacts(DVec3::new(0.0, 0.0, 0.45), 0.1, &mut out);
        assert!(!out.is_empty());
        assert!(out.iter().all(|sp| sp.normal.z < 0.0));
    }

    #[test]
    fn test_integrate_and_fixed() {
        let mut proxy = wheel(0.5, 0.2);
        proxy.set_state(DVec3::ZERO, DQuat::IDENTITY, DVec3::X, DVec3::new(0.0, 1.0, 0.0));
        proxy.integrate(0.5);
        assert!((proxy.position() - DVec3::new(0.5, 0.0, 0.0)).length() < 1e-12);
        assert!((proxy.rotation().to_scaled_axis() - DVec3::new(0.0, 0.5, 0.0)).length() < 1e-9);

        let mut fixed = KinematicProxy::new(ProxyShape::Cylinder { radius: 0.5, width: 0.2 }, true);
        fixed.set_state(DVec3::ZERO, DQuat::IDENTITY, DVec3::X, DVec3::ZERO);
        fixed.integrate(1.0);
        assert_eq!(fixed.position(), DVec3::ZERO);
        assert_eq!(fixed.point_velocity(DVec3::Z), DVec3::ZERO);
        assert_eq!(fixed.velocity(), (DVec3::ZERO, DVec3::ZERO));
        assert_eq!(proxy.velocity(), (DVec3::X, DVec3::Y));
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let (a, b, c) = (DVec3::ZERO, DVec3::X, DVec3::Y);
        let cases = [
            // interior, vertex a, edge ab
            (DVec3::new(0.2, 0.2, 1.0), DVec3::new(0.2, 0.2, 0.0)),
            (DVec3::new(-1.0, -1.0, 0.0), a),
            (DVec3::new(0.5, -1.0, 0.0), DVec3::new(0.5, 0.0, 0.0)),
        ];
        for (p, expected) in cases {
            let q = closest_point_on_triangle(p, a, b, c);
            assert!((q - expected).length() < 1e-12, "{p:?} -> {q:?}");
        }
    }
}
