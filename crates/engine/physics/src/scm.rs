//! Soil Contact Model terrain.
//!
//! A regular grid of soil nodes over the patch, initially at height 0. Every
//! step each proxy is sampled with a vertical line through each node under
//! its footprint. Nodes where the proxy reaches below the node's unloaded
//! level carry a normal pressure (Bekker-Wong, limited by elastic unloading
//! and augmented with viscous damping) and a Janosi-Hanamoto shear stress
//! opposing the slip velocity.

use crate::domain::ProxyDomain;
use crate::error::{SolverError, SolverResult};
use crate::shape::KinematicProxy;
use crate::wrench::ContactWrench;
use glam::DVec3;
use tracing::trace;

const ENGINE: &str = "scm";

/// Soil parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScmParams {
    /// Frictional modulus, Pa/m^n.
    pub bekker_kphi: f64,
    /// Cohesive modulus, Pa/m^(n-1).
    pub bekker_kc: f64,
    /// Sinkage exponent.
    pub bekker_n: f64,
    /// Cohesion limit, Pa.
    pub mohr_cohesion: f64,
    /// Internal friction angle, degrees.
    pub mohr_friction: f64,
    /// Shear deformation modulus, m.
    pub janosi_shear: f64,
    /// Elastic unloading stiffness, Pa/m. Must exceed `bekker_kphi`.
    pub elastic_stiffness: f64,
    /// Vertical damping, Pa s/m.
    pub damping_r: f64,
}

impl Default for ScmParams {
    fn default() -> Self {
        Self {
            bekker_kphi: 0.2e6,
            bekker_kc: 0.0,
            bekker_n: 1.1,
            mohr_cohesion: 0.0,
            mohr_friction: 30.0,
            janosi_shear: 0.01,
            elastic_stiffness: 4e7,
            damping_r: 3e4,
        }
    }
}

impl ScmParams {
    pub fn validate(&self) -> SolverResult<()> {
        let fail = |detail: &str| {
            Err(SolverError::Setup {
                engine: ENGINE,
                detail: detail.to_string(),
            })
        };
        if self.bekker_kphi < 0.0 || self.bekker_kc < 0.0 {
            return fail("Bekker moduli must be non-negative");
        }
        if self.bekker_n <= 0.0 {
            return fail("Bekker exponent must be positive");
        }
        if self.janosi_shear <= 0.0 {
            return fail("Janosi shear coefficient must be positive");
        }
        if self.elastic_stiffness <= self.bekker_kphi {
            return fail("elastic stiffness must exceed Bekker Kphi");
        }
        if self.damping_r < 0.0 {
            return fail("damping must be non-negative");
        }
        Ok(())
    }

    /// Bekker-Wong pressure at sinkage `s` for contact patch width `b`.
    fn bekker_pressure(&self, s: f64, b: f64) -> f64 {
        let kc_term = if b > 0.0 { self.bekker_kc / b } else { 0.0 };
        (kc_term + self.bekker_kphi) * s.max(0.0).powf(self.bekker_n)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SoilNode {
    /// Current surface height.
    height: f64,
    /// Permanent sinkage below the initial surface.
    plastic: f64,
    /// Accumulated shear displacement while in contact.
    shear: f64,
}

/// Deformable heightfield terrain.
pub struct ScmSoil {
    params: ScmParams,
    origin: DVec3,
    spacing: f64,
    nx: usize,
    ny: usize,
    nodes: Vec<SoilNode>,
    proxies: Vec<KinematicProxy>,
    wrenches: Vec<ContactWrench>,
    contact_nodes: Vec<usize>,
    time: f64,
}

impl ScmSoil {
    /// Soil patch of `length` x `width` centered at the origin, nodes every
    /// `spacing`.
    pub fn new(length: f64, width: f64, spacing: f64, params: ScmParams) -> SolverResult<Self> {
        params.validate()?;
        if !(spacing > 0.0 && length > 0.0 && width > 0.0) {
            return Err(SolverError::Setup {
                engine: ENGINE,
                detail: format!("invalid grid {length} x {width} with spacing {spacing}"),
            });
        }
        let nx = (length / spacing).floor() as usize + 1;
        let ny = (width / spacing).floor() as usize + 1;
        Ok(Self {
            params,
            origin: DVec3::new(-0.5 * length, -0.5 * width, 0.0),
            spacing,
            nx,
            ny,
            nodes: vec![SoilNode::default(); nx * ny],
            proxies: Vec::new(),
            wrenches: Vec::new(),
            contact_nodes: Vec::new(),
            time: 0.0,
        })
    }

    pub fn params(&self) -> &ScmParams {
        &self.params
    }

    /// Position of node `(i, j)` at its current height.
    pub fn node_position(&self, i: usize, j: usize) -> DVec3 {
        let n = self.nodes[j * self.nx + i];
        DVec3::new(
            self.origin.x + i as f64 * self.spacing,
            self.origin.y + j as f64 * self.spacing,
            n.height,
        )
    }

    /// Number of nodes in contact with any proxy during the last step.
    pub fn num_contact_nodes(&self) -> usize {
        self.contact_nodes.len()
    }

    fn node_range(&self, lo: f64, hi: f64, origin: f64, n: usize) -> Option<(usize, usize)> {
        let a = ((lo - origin) / self.spacing).ceil();
        let b = ((hi - origin) / self.spacing).floor();
        if b < 0.0 || a > (n - 1) as f64 || a > b {
            return None;
        }
        Some((a.max(0.0) as usize, (b as usize).min(n - 1)))
    }

    fn proxy_wrench(&mut self, k: usize, h: f64) -> ContactWrench {
        let proxy = &self.proxies[k];
        let (lo, hi) = proxy.aabb();
        let (Some((i0, i1)), Some((j0, j1))) = (
            self.node_range(lo.x, hi.x, self.origin.x, self.nx),
            self.node_range(lo.y, hi.y, self.origin.y, self.ny),
        ) else {
            return ContactWrench::ZERO;
        };

        // footprint first, so the Bekker width is known
        let mut hits = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                let x = self.origin.x + i as f64 * self.spacing;
                let y = self.origin.y + j as f64 * self.spacing;
                let idx = j * self.nx + i;
                match proxy.lowest_point_above(x, y) {
                    Some(z) if z < -self.nodes[idx].plastic => {
                        hits.push((idx, DVec3::new(x, y, z)))
                    }
                    _ => {}
                }
            }
        }
        if hits.is_empty() {
            return ContactWrench::ZERO;
        }

        let area = self.spacing * self.spacing;
        let b = (hits.len() as f64 * area).sqrt();
        let tan_phi = self.params.mohr_friction.to_radians().tan();
        let center = proxy.position();

        let mut wrench = ContactWrench::ZERO;
        for &(idx, p) in &hits {
            let node = &mut self.nodes[idx];
            let v = proxy.point_velocity(p);
            let s = -p.z;

            let mut sigma = self.params.elastic_stiffness * (s - node.plastic);
            let yield_pressure = self.params.bekker_pressure(s, b);
            if sigma > yield_pressure {
                sigma = yield_pressure;
                node.plastic = node.plastic.max(s - sigma / self.params.elastic_stiffness);
            }
            sigma = (sigma - self.params.damping_r * v.z).max(0.0);
            node.height = p.z;

            let slip = DVec3::new(v.x, v.y, 0.0);
            let slip_speed = slip.length();
            node.shear += slip_speed * h;
            let tau = (self.params.mohr_cohesion + sigma * tan_phi)
                * (1.0 - (-node.shear / self.params.janosi_shear).exp());

            let mut force = DVec3::new(0.0, 0.0, sigma * area);
            if slip_speed > 1e-9 {
                force -= slip * (tau * area / slip_speed);
            }
            wrench += ContactWrench::at_point(force, p, center);
            self.contact_nodes.push(idx);
        }
        wrench
    }
}

impl ProxyDomain for ScmSoil {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn add_proxy(&mut self, proxy: KinematicProxy) -> usize {
        self.proxies.push(proxy);
        self.wrenches.push(ContactWrench::ZERO);
        self.proxies.len() - 1
    }

    fn num_proxies(&self) -> usize {
        self.proxies.len()
    }

    fn proxy_mut(&mut self, index: usize) -> SolverResult<&mut KinematicProxy> {
        self.proxies.get_mut(index).ok_or(SolverError::UnknownProxy {
            engine: ENGINE,
            index,
        })
    }

    fn step(&mut self, h: f64) -> SolverResult<()> {
        SolverError::check_step(ENGINE, h)?;
        for proxy in &mut self.proxies {
            proxy.integrate(h);
        }

        let previous: Vec<usize> = std::mem::take(&mut self.contact_nodes);
        for k in 0..self.proxies.len() {
            self.wrenches[k] = self.proxy_wrench(k, h);
        }

        // nodes released this step spring back to their plastic level
        let mut in_contact = vec![false; self.nodes.len()];
        for &idx in &self.contact_nodes {
            in_contact[idx] = true;
        }
        for idx in previous {
            if !in_contact[idx] {
                let node = &mut self.nodes[idx];
                node.height = -node.plastic;
                node.shear = 0.0;
            }
        }

        self.time += h;
        if self.wrenches.iter().any(|w| !w.is_finite()) {
            return Err(SolverError::NonFinite {
                engine: ENGINE,
                time: self.time,
            });
        }
        trace!(time = self.time, contacts = self.contact_nodes.len(), "scm step");
        Ok(())
    }

    fn contact_wrench(&self, index: usize) -> SolverResult<ContactWrench> {
        self.wrenches
            .get(index)
            .copied()
            .ok_or(SolverError::UnknownProxy {
                engine: ENGINE,
                index,
            })
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn surface_height(&self) -> f64 {
        0.0
    }

    fn output_points(&self) -> Vec<DVec3> {
        (0..self.ny)
            .flat_map(|j| (0..self.nx).map(move |i| (i, j)))
            .map(|(i, j)| self.node_position(i, j))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ProxyShape;
    use glam::DQuat;

    fn soil() -> ScmSoil {
        ScmSoil::new(2.0, 1.0, 0.02, ScmParams::default()).unwrap()
    }

    fn wheel_at(z: f64, lin_vel: DVec3) -> KinematicProxy {
        let mut proxy = KinematicProxy::new(
            ProxyShape::Cylinder {
                radius: 0.3,
                width: 0.2,
            },
            false,
        );
        proxy.set_state(DVec3::new(0.0, 0.0, z), DQuat::IDENTITY, lin_vel, DVec3::ZERO);
        proxy
    }

    #[test]
    fn test_no_contact_above_surface() {
        let mut soil = soil();
        soil.add_proxy(wheel_at(0.4, DVec3::ZERO));
        soil.step(1e-3).unwrap();
        assert_eq!(soil.contact_wrench(0).unwrap(), ContactWrench::ZERO);
        assert_eq!(soil.num_contact_nodes(), 0);
    }

    #[test]
    fn test_sinking_wheel_pushed_up() {
        let mut soil = soil();
        soil.add_proxy(wheel_at(0.28, DVec3::ZERO));
        soil.step(1e-3).unwrap();
        let w = soil.contact_wrench(0).unwrap();
        assert!(w.force.z > 0.0);
        assert!(w.force.x.abs() < 1e-6 * w.force.z);
        assert!(soil.num_contact_nodes() > 0);
        // the rut follows the wheel
        let min_height = soil.nodes.iter().map(|n| n.height).fold(f64::INFINITY, f64::min);
        assert!((min_height + 0.02).abs() < 1e-3);
    }

    #[test]
    fn test_deeper_sinkage_more_force() {
        let mut shallow = soil();
        shallow.add_proxy(wheel_at(0.29, DVec3::ZERO));
        shallow.step(1e-3).unwrap();
        let mut deep = soil();
        deep.add_proxy(wheel_at(0.27, DVec3::ZERO));
        deep.step(1e-3).unwrap();
        let deep_fz = deep.contact_wrench(0).unwrap().force.z;
        assert!(deep_fz > shallow.contact_wrench(0).unwrap().force.z);
    }

    #[test]
    fn test_shear_opposes_slip() {
        let mut soil = soil();
        soil.add_proxy(wheel_at(0.28, DVec3::new(1.0, 0.0, 0.0)));
        for _ in 0..5 {
            soil.step(1e-3).unwrap();
        }
        assert!(soil.contact_wrench(0).unwrap().force.x < 0.0);
    }

    #[test]
    fn test_plastic_rut_remains() {
        let mut soil = soil();
        let k = soil.add_proxy(wheel_at(0.27, DVec3::ZERO));
        soil.step(1e-3).unwrap();
        soil.proxy_mut(k)
            .unwrap()
            .set_state(DVec3::new(0.0, 0.0, 1.0), DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);
        soil.step(1e-3).unwrap();
        let min_height = soil.nodes.iter().map(|n| n.height).fold(f64::INFINITY, f64::min);
        assert!(min_height < 0.0);
        assert!(min_height > -0.03);
    }

    #[test]
    fn test_errors() {
        let mut soil = soil();
        assert!(matches!(soil.step(-1.0), Err(SolverError::InvalidStep { .. })));
        assert!(matches!(soil.contact_wrench(3), Err(SolverError::UnknownProxy { index: 3, .. })));
        let bad = ScmParams {
            elastic_stiffness: 1.0,
            ..ScmParams::default()
        };
        assert!(ScmSoil::new(1.0, 1.0, 0.1, bad).is_err());
    }
}
