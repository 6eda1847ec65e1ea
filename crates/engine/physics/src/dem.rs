//! Discrete-element granular bed.
//!
//! Monodisperse spheres without rotation in an open-top box. Contacts use a
//! Hertzian spring with a dashpot tuned from the coefficient of restitution
//! and a viscous-regularized Coulomb friction. Particle forces are computed
//! in parallel; proxy reactions are summed in a second pass over the
//! particles inside each proxy's bounds.

use crate::domain::ProxyDomain;
use crate::error::{SolverError, SolverResult};
use crate::grid::SpatialGrid;
use crate::shape::{KinematicProxy, SurfacePoint};
use crate::wrench::ContactWrench;
use crate::GRAVITY;
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use terracosim_core::material::CompositeMaterial;
use tracing::{debug, trace};

const ENGINE: &str = "dem";

/// Parameters of one contact pair type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactLaw {
    /// Effective Young's modulus of the pair (Hertz E*).
    pub effective_young: f64,
    pub restitution: f64,
    pub friction: f64,
}

impl ContactLaw {
    fn damping_ratio(&self) -> f64 {
        let e = self.restitution.clamp(1e-3, 0.999);
        let ln_e = e.ln();
        -ln_e / (std::f64::consts::PI.powi(2) + ln_e * ln_e).sqrt()
    }

    /// Force on a body whose surface overlaps another by `delta` along the
    /// unit normal `n` (pointing towards the body), with relative velocity
    /// `vrel` of the body with respect to the other.
    fn force(&self, delta: f64, n: DVec3, vrel: DVec3, r_eff: f64, m_eff: f64) -> DVec3 {
        let kh = 4.0 / 3.0 * self.effective_young * r_eff.sqrt();
        let k = kh * delta.sqrt();
        let c = 2.0 * self.damping_ratio() * (k * m_eff).sqrt();

        let vn = vrel.dot(n);
        let fn_ = (kh * delta.powf(1.5) - c * vn).max(0.0);

        let vt = vrel - n * vn;
        let slip = vt.length();
        let ft = if slip > 1e-12 {
            let magnitude = (self.friction * fn_).min(2.0 * (k * m_eff).sqrt() * slip);
            -vt * (magnitude / slip)
        } else {
            DVec3::ZERO
        };
        n * fn_ + ft
    }
}

/// Material and contact parameters of the bed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemParams {
    pub radius: f64,
    pub density: f64,
    /// Particle-particle and particle-container contacts.
    pub particle: ContactLaw,
    /// Particle-proxy contacts.
    pub proxy: ContactLaw,
}

impl DemParams {
    pub fn particle_mass(&self) -> f64 {
        self.density * 4.0 / 3.0 * std::f64::consts::PI * self.radius.powi(3)
    }
}

/// Initial arrangement of the particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleBed {
    pub length: f64,
    pub width: f64,
    pub layers: usize,
    pub seed: u64,
}

impl ParticleBed {
    /// Square lattice of layers stacked from the floor, jittered
    /// horizontally by a seeded generator.
    pub fn generate(&self, radius: f64) -> Vec<DVec3> {
        if self.length < 2.0 * radius || self.width < 2.0 * radius {
            return Vec::new();
        }
        let spacing = 2.01 * radius;
        let nx = ((self.length - 2.0 * radius) / spacing).floor() as usize + 1;
        let ny = ((self.width - 2.0 * radius) / spacing).floor() as usize + 1;
        let x0 = -0.5 * self.length + radius;
        let y0 = -0.5 * self.width + radius;
        let jitter = 0.004 * radius;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut points = Vec::with_capacity(nx * ny * self.layers);
        for layer in 0..self.layers {
            let z = radius + layer as f64 * spacing;
            for j in 0..ny {
                for i in 0..nx {
                    points.push(DVec3::new(
                        x0 + i as f64 * spacing + rng.random_range(-jitter..jitter),
                        y0 + j as f64 * spacing + rng.random_range(-jitter..jitter),
                        z,
                    ));
                }
            }
        }
        points
    }

    pub fn nominal_height(&self, radius: f64) -> f64 {
        2.0 * radius * self.layers as f64
    }
}

struct ForceContext<'a> {
    params: &'a DemParams,
    mass: f64,
    half: DVec3,
    pos: &'a [DVec3],
    vel: &'a [DVec3],
    grid: &'a SpatialGrid,
    proxies: &'a [KinematicProxy],
    proxy_laws: &'a [ContactLaw],
}

impl ForceContext<'_> {
    fn particle_force(&self, i: usize) -> DVec3 {
        let r = self.params.radius;
        let p = self.pos[i];
        let v = self.vel[i];
        let law = &self.params.particle;
        let mut f = DVec3::new(0.0, 0.0, -GRAVITY * self.mass);

        self.grid.for_each_neighbor(p, |j| {
            if j == i {
                return;
            }
            let d = p - self.pos[j];
            let dist = d.length();
            let delta = 2.0 * r - dist;
            if delta > 0.0 && dist > 1e-12 {
                f += law.force(delta, d / dist, v - self.vel[j], 0.5 * r, 0.5 * self.mass);
            }
        });

        // container: floor and four side walls
        let walls = [
            (p.z, DVec3::Z),
            (p.x + self.half.x, DVec3::X),
            (self.half.x - p.x, DVec3::NEG_X),
            (p.y + self.half.y, DVec3::Y),
            (self.half.y - p.y, DVec3::NEG_Y),
        ];
        for (gap, n) in walls {
            let delta = r - gap;
            if delta > 0.0 {
                f += law.force(delta, n, v, r, self.mass);
            }
        }

        let mut contacts = Vec::new();
        for (proxy, law) in self.proxies.iter().zip(self.proxy_laws) {
            contacts.clear();
            proxy.surface_contacts(p, r, &mut contacts);
            for sp in &contacts {
                f += self.proxy_force(i, proxy, law, sp);
            }
        }
        f
    }

    /// Force on particle `i` from one proxy surface point.
    fn proxy_force(
        &self,
        i: usize,
        proxy: &KinematicProxy,
        law: &ContactLaw,
        sp: &SurfacePoint,
    ) -> DVec3 {
        let delta = self.params.radius - sp.distance;
        if delta <= 0.0 {
            return DVec3::ZERO;
        }
        let vrel = self.vel[i] - proxy.point_velocity(sp.point);
        law.force(delta, sp.normal, vrel, self.params.radius, self.mass)
    }

    fn proxy_wrench(&self, proxy: &KinematicProxy, law: &ContactLaw) -> ContactWrench {
        let r = DVec3::splat(self.params.radius);
        let (lo, hi) = proxy.aabb();
        let center = proxy.position();
        let mut wrench = ContactWrench::ZERO;
        let mut contacts = Vec::new();
        self.grid.for_each_in_box(lo - r, hi + r, |i| {
            contacts.clear();
            proxy.surface_contacts(self.pos[i], self.params.radius, &mut contacts);
            for sp in &contacts {
                let f = self.proxy_force(i, proxy, law, sp);
                wrench += ContactWrench::at_point(-f, sp.point, center);
            }
        });
        wrench
    }
}

/// Granular bed simulated with the discrete element method.
pub struct DemSystem {
    params: DemParams,
    mass: f64,
    half: DVec3,
    pos: Vec<DVec3>,
    vel: Vec<DVec3>,
    grid: SpatialGrid,
    proxies: Vec<KinematicProxy>,
    proxy_laws: Vec<ContactLaw>,
    wrenches: Vec<ContactWrench>,
    pool: Option<rayon::ThreadPool>,
    surface_height: f64,
    time: f64,
}

impl DemSystem {
    /// Fill the bed. `threads` selects a dedicated pool; `None` uses the
    /// global rayon pool.
    pub fn new(params: DemParams, bed: &ParticleBed, threads: Option<usize>) -> SolverResult<Self> {
        if !(params.radius > 0.0 && params.density > 0.0) {
            return Err(SolverError::Setup {
                engine: ENGINE,
                detail: format!(
                    "invalid granular material radius {} density {}",
                    params.radius, params.density
                ),
            });
        }
        let pos = bed.generate(params.radius);
        if pos.is_empty() {
            return Err(SolverError::Setup {
                engine: ENGINE,
                detail: "no particles fit in the patch".to_string(),
            });
        }

        let pool = match threads {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| SolverError::Setup {
                        engine: ENGINE,
                        detail: format!("thread pool: {e}"),
                    })?,
            ),
            None => None,
        };

        let half = DVec3::new(0.5 * bed.length, 0.5 * bed.width, 0.0);
        let height = bed.nominal_height(params.radius);
        let grid = SpatialGrid::new(
            -half,
            DVec3::new(half.x, half.y, 2.0 * height + 4.0 * params.radius),
            2.0 * params.radius,
        );
        debug!(particles = pos.len(), threads = ?threads, "dem bed created");

        Ok(Self {
            mass: params.particle_mass(),
            params,
            half,
            vel: vec![DVec3::ZERO; pos.len()],
            pos,
            grid,
            proxies: Vec::new(),
            proxy_laws: Vec::new(),
            wrenches: Vec::new(),
            pool,
            surface_height: height,
            time: 0.0,
        })
    }

    pub fn params(&self) -> &DemParams {
        &self.params
    }

    pub fn num_particles(&self) -> usize {
        self.pos.len()
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.pos
    }

    /// Let the bed settle under gravity for `duration`, then take the
    /// highest particle top as the terrain height.
    pub fn settle(&mut self, duration: f64, h: f64) -> SolverResult<()> {
        SolverError::check_step(ENGINE, h)?;
        let steps = (duration / h).ceil() as usize;
        for _ in 0..steps {
            self.step(h)?;
        }
        self.time = 0.0;
        self.surface_height = self
            .pos
            .iter()
            .map(|p| p.z + self.params.radius)
            .fold(0.0, f64::max);
        Ok(())
    }

    /// Largest particle speed.
    pub fn max_speed(&self) -> f64 {
        self.vel.iter().map(|v| v.length()).fold(0.0, f64::max)
    }

    fn compute_forces(&self) -> (Vec<DVec3>, Vec<ContactWrench>) {
        let ctx = ForceContext {
            params: &self.params,
            mass: self.mass,
            half: self.half,
            pos: &self.pos,
            vel: &self.vel,
            grid: &self.grid,
            proxies: &self.proxies,
            proxy_laws: &self.proxy_laws,
        };
        let run = || {
            let forces: Vec<DVec3> = (0..ctx.pos.len())
                .into_par_iter()
                .map(|i| ctx.particle_force(i))
                .collect();
            let wrenches: Vec<ContactWrench> = ctx
                .proxies
                .par_iter()
                .zip(ctx.proxy_laws)
                .map(|(proxy, law)| ctx.proxy_wrench(proxy, law))
                .collect();
            (forces, wrenches)
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

impl ProxyDomain for DemSystem {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn add_proxy(&mut self, proxy: KinematicProxy) -> usize {
        self.proxies.push(proxy);
        self.proxy_laws.push(self.params.proxy);
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
        self.grid.rebuild(&self.pos);

        let (forces, wrenches) = self.compute_forces();
        self.wrenches = wrenches;

        let inv_mass = 1.0 / self.mass;
        for ((p, v), f) in self.pos.iter_mut().zip(self.vel.iter_mut()).zip(&forces) {
            *v += *f * (inv_mass * h);
            *p += *v * h;
        }
        self.time += h;

        if !self.pos.iter().all(|p| p.is_finite()) || self.wrenches.iter().any(|w| !w.is_finite()) {
            return Err(SolverError::NonFinite {
                engine: ENGINE,
                time: self.time,
            });
        }
        trace!(time = self.time, max_speed = self.max_speed(), "dem step");
        Ok(())
    }

    fn set_proxy_contact(
        &mut self,
        index: usize,
        material: &CompositeMaterial,
    ) -> SolverResult<()> {
        let law = self.proxy_laws.get_mut(index).ok_or(SolverError::UnknownProxy {
            engine: ENGINE,
            index,
        })?;
        law.friction = material.friction;
        law.restitution = material.restitution;
        if let Some(penalty) = material.penalty {
            law.effective_young = penalty.effective_young;
        }
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
        self.surface_height
    }

    fn output_points(&self) -> Vec<DVec3> {
        self.pos.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ProxyShape;
    use glam::DQuat;

    fn params() -> DemParams {
        let law = ContactLaw {
            effective_young: 1e7,
            restitution: 0.1,
            friction: 0.5,
        };
        DemParams {
            radius: 0.02,
            density: 2000.0,
            particle: law,
            proxy: law,
        }
    }

    fn bed() -> ParticleBed {
        ParticleBed {
            length: 0.4,
            width: 0.4,
            layers: 2,
            seed: 7,
        }
    }

    #[test]
    fn test_bed_generation_is_seeded() {
        let a = bed().generate(0.02);
        let b = bed().generate(0.02);
        assert_eq!(a, b);
        assert_eq!(a.len(), 9 * 9 * 2);
        assert!(a.iter().all(|p| p.x.abs() <= 0.2 && p.y.abs() <= 0.2));
    }

    #[test]
    fn test_bed_stays_in_container() {
        let mut dem = DemSystem::new(params(), &bed(), Some(2)).unwrap();
        dem.settle(0.02, 1e-4).unwrap();
        assert_eq!(dem.time(), 0.0);
        let r = 0.02;
        assert!(dem.positions().iter().all(|p| p.z > 0.5 * r));
        assert!(dem.surface_height() < 0.09);
        assert!(dem.surface_height() > 0.06);
    }

    #[test]
    fn test_pressed_wheel_pushed_up() {
        let mut dem = DemSystem::new(params(), &bed(), None).unwrap();
        let top = dem.surface_height();
        let mut proxy = KinematicProxy::new(
            ProxyShape::Cylinder {
                radius: 0.1,
                width: 0.1,
            },
            false,
        );
        proxy.set_state(
            DVec3::new(0.0, 0.0, top + 0.1 - 0.005),
            DQuat::IDENTITY,
            DVec3::ZERO,
            DVec3::ZERO,
        );
        let k = dem.add_proxy(proxy);
        dem.step(1e-4).unwrap();
        let w = dem.contact_wrench(k).unwrap();
        assert!(w.force.z > 0.0);
    }

    #[test]
    fn test_frictionless_proxy_law() {
        let mut dem = DemSystem::new(params(), &bed(), None).unwrap();
        let top = dem.surface_height();
        let mut proxy = KinematicProxy::new(
            ProxyShape::Cylinder {
                radius: 0.1,
                width: 0.1,
            },
            false,
        );
        proxy.set_state(
            DVec3::new(0.0, 0.0, top + 0.1 - 0.005),
            DQuat::IDENTITY,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::ZERO,
        );
        let k = dem.add_proxy(proxy);
        let frictionless = CompositeMaterial {
            friction: 0.0,
            restitution: 0.1,
            penalty: None,
        };
        dem.set_proxy_contact(k, &frictionless).unwrap();
        assert!(dem.set_proxy_contact(k + 1, &frictionless).is_err());
        dem.step(1e-4).unwrap();
        let w = dem.contact_wrench(k).unwrap();
        assert!(w.force.z > 0.0);
    }

    #[test]
    fn test_no_particles() {
        let tiny = ParticleBed {
            length: 0.01,
            width: 0.01,
            layers: 1,
            seed: 0,
        };
        assert!(matches!(
            DemSystem::new(params(), &tiny, None),
            Err(SolverError::Setup { .. })
        ));
    }

    #[test]
    fn test_restitution_damping_ratio() {
        let elastic = ContactLaw {
            effective_young: 1.0,
            restitution: 0.999,
            friction: 0.0,
        };
        assert!(elastic.damping_ratio() < 1e-3);
        let plastic = ContactLaw {
            restitution: 0.0,
            ..elastic
        };
        assert!(plastic.damping_ratio() > 0.9);
    }
}
