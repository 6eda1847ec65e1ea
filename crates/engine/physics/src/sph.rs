//! Weakly compressible SPH soil bed.
//!
//! Particles on a cubic lattice of spacing `2 r` fill the container up to the
//! requested depth. Density is summed with a cubic spline kernel, pressure
//! follows the Tait equation (clamped at zero, no tension) and Monaghan
//! artificial viscosity damps the flow. Container walls and proxies act on
//! particles through penalty forces.

use crate::domain::ProxyDomain;
use crate::error::{SolverError, SolverResult};
use crate::grid::SpatialGrid;
use crate::shape::{KinematicProxy, SurfacePoint};
use crate::wrench::ContactWrench;
use crate::GRAVITY;
use glam::DVec3;
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::{debug, trace};

const ENGINE: &str = "sph";
const TAIT_GAMMA: f64 = 7.0;
const SMOOTHING_RATIO: f64 = 1.3;
const MIN_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphParams {
    /// Particle radius; the lattice spacing is twice this.
    pub radius: f64,
    /// Rest density.
    pub density: f64,
    /// Soil depth filled at construction.
    pub depth: f64,
    pub kinematic_viscosity: f64,
    /// Sound speed as a multiple of the largest free-fall speed over the depth.
    pub sound_speed_factor: f64,
}

impl Default for SphParams {
    fn default() -> Self {
        Self {
            radius: 0.01,
            density: 2000.0,
            depth: 0.1,
            kinematic_viscosity: 1e-2,
            sound_speed_factor: 10.0,
        }
    }
}

impl SphParams {
    pub fn spacing(&self) -> f64 {
        2.0 * self.radius
    }

    pub fn smoothing_length(&self) -> f64 {
        SMOOTHING_RATIO * self.spacing()
    }

    pub fn particle_mass(&self) -> f64 {
        self.density * self.spacing().powi(3)
    }

    pub fn sound_speed(&self) -> f64 {
        self.sound_speed_factor * (2.0 * GRAVITY * self.depth).sqrt()
    }

    /// Largest stable step (acoustic CFL).
    pub fn max_step(&self) -> f64 {
        0.25 * self.smoothing_length() / self.sound_speed()
    }
}

/// Cubic spline kernel with support `2h`.
#[derive(Debug, Clone, Copy)]
struct Kernel {
    h: f64,
    sigma: f64,
}

impl Kernel {
    fn new(h: f64) -> Self {
        Self {
            h,
            sigma: 1.0 / (PI * h * h * h),
        }
    }

    fn value(&self, r: f64) -> f64 {
        let q = r / self.h;
        if q < 1.0 {
            self.sigma * (1.0 - 1.5 * q * q + 0.75 * q * q * q)
        } else if q < 2.0 {
            self.sigma * 0.25 * (2.0 - q).powi(3)
        } else {
            0.0
        }
    }

    /// dW/dr
    fn derivative(&self, r: f64) -> f64 {
        let q = r / self.h;
        if q < 1.0 {
            self.sigma / self.h * (-3.0 * q + 2.25 * q * q)
        } else if q < 2.0 {
            -self.sigma / self.h * 0.75 * (2.0 - q).powi(2)
        } else {
            0.0
        }
    }
}

struct Fluid<'a> {
    params: &'a SphParams,
    kernel: Kernel,
    mass: f64,
    c0: f64,
    alpha: f64,
    wall_stiffness: f64,
    wall_damping: f64,
    half: DVec3,
    pos: &'a [DVec3],
    vel: &'a [DVec3],
    grid: &'a SpatialGrid,
    proxies: &'a [KinematicProxy],
}

impl Fluid<'_> {
    fn density(&self, i: usize) -> f64 {
        let mut rho = 0.0;
        self.grid.for_each_neighbor(self.pos[i], |j| {
            rho += self.mass * self.kernel.value((self.pos[i] - self.pos[j]).length());
        });
        rho
    }

    fn pressure(&self, rho: f64) -> f64 {
        let b = self.params.density * self.c0 * self.c0 / TAIT_GAMMA;
        (b * ((rho / self.params.density).powf(TAIT_GAMMA) - 1.0)).max(0.0)
    }

    fn penalty(&self, gap: f64, n: DVec3, vrel: DVec3) -> DVec3 {
        let delta = self.params.radius - gap;
        if delta <= 0.0 {
            return DVec3::ZERO;
        }
        let fn_ = (self.wall_stiffness * delta - self.wall_damping * vrel.dot(n)).max(0.0);
        n * fn_
    }

    fn proxy_force(&self, i: usize, proxy: &KinematicProxy, sp: &SurfacePoint) -> DVec3 {
        self.penalty(sp.distance, sp.normal, self.vel[i] - proxy.point_velocity(sp.point))
    }

    fn acceleration(&self, i: usize, rho: &[f64], p: &[f64]) -> DVec3 {
        let xi = self.pos[i];
        let vi = self.vel[i];
        let h = self.kernel.h;
        let mut a = DVec3::new(0.0, 0.0, -GRAVITY);

        self.grid.for_each_neighbor(xi, |j| {
            if j == i {
                return;
            }
            let rij = xi - self.pos[j];
            let r = rij.length();
            if r < 1e-12 || r >= 2.0 * h {
                return;
            }
            let vij = vi - self.vel[j];
            let vr = vij.dot(rij);
            let viscous = if vr < 0.0 {
                let mu = h * vr / (r * r + 0.01 * h * h);
                -self.alpha * self.c0 * mu / (0.5 * (rho[i] + rho[j]))
            } else {
                0.0
            };
            let grad = rij * (self.kernel.derivative(r) / r);
            let pressure = p[i] / (rho[i] * rho[i]) + p[j] / (rho[j] * rho[j]);
            a -= grad * (self.mass * (pressure + viscous));
        });

        let walls = [
            (xi.z, DVec3::Z),
            (xi.x + self.half.x, DVec3::X),
            (self.half.x - xi.x, DVec3::NEG_X),
            (xi.y + self.half.y, DVec3::Y),
            (self.half.y - xi.y, DVec3::NEG_Y),
        ];
        let mut f = DVec3::ZERO;
        for (gap, n) in walls {
            f += self.penalty(gap, n, vi);
        }

        let mut contacts = Vec::new();
        for proxy in self.proxies {
            contacts.clear();
            proxy.surface_contacts(xi, self.params.radius, &mut contacts);
            for sp in &contacts {
                f += self.proxy_force(i, proxy, sp);
            }
        }
        a + f / self.mass
    }

    fn proxy_wrench(&self, proxy: &KinematicProxy) -> ContactWrench {
        let r = DVec3::splat(self.params.radius);
        let (lo, hi) = proxy.aabb();
        let center = proxy.position();
        let mut wrench = ContactWrench::ZERO;
        let mut contacts = Vec::new();
        self.grid.for_each_in_box(lo - r, hi + r, |i| {
            contacts.clear();
            proxy.surface_contacts(self.pos[i], self.params.radius, &mut contacts);
            for sp in &contacts {
                let force = self.proxy_force(i, proxy, sp);
                wrench += ContactWrench::at_point(-force, sp.point, center);
            }
        });
        wrench
    }
}

/// Continuum granular bed simulated with SPH.
pub struct SphSystem {
    params: SphParams,
    half: DVec3,
    pos: Vec<DVec3>,
    vel: Vec<DVec3>,
    rho: Vec<f64>,
    grid: SpatialGrid,
    proxies: Vec<KinematicProxy>,
    wrenches: Vec<ContactWrench>,
    time: f64,
}

impl SphSystem {
    /// Fill a `length` x `width` container to `params.depth`.
    pub fn new(length: f64, width: f64, params: SphParams) -> SolverResult<Self> {
        if !(params.radius > 0.0 && params.density > 0.0 && params.depth > 0.0) {
            return Err(SolverError::Setup {
                engine: ENGINE,
                detail: format!(
                    "invalid SPH material radius {} density {} depth {}",
                    params.radius, params.density, params.depth
                ),
            });
        }
        let s = params.spacing();
        let nx = (length / s).floor() as usize;
        let ny = (width / s).floor() as usize;
        let nz = (params.depth / s).round().max(1.0) as usize;
        if nx == 0 || ny == 0 {
            return Err(SolverError::Setup {
                engine: ENGINE,
                detail: "no particles fit in the patch".to_string(),
            });
        }

        let half = DVec3::new(0.5 * length, 0.5 * width, 0.0);
        let mut pos = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    pos.push(DVec3::new(
                        -half.x + (i as f64 + 0.5) * s,
                        -half.y + (j as f64 + 0.5) * s,
                        (k as f64 + 0.5) * s,
                    ));
                }
            }
        }
        let h = params.smoothing_length();
        let grid = SpatialGrid::new(
            -half,
            DVec3::new(half.x, half.y, 2.0 * params.depth + 2.0 * h),
            2.0 * h,
        );
        debug!(
            particles = pos.len(),
            sound_speed = params.sound_speed(),
            max_step = params.max_step(),
            "sph bed created"
        );

        Ok(Self {
            params,
            half,
            vel: vec![DVec3::ZERO; pos.len()],
            rho: vec![params.density; pos.len()],
            pos,
            grid,
            proxies: Vec::new(),
            wrenches: Vec::new(),
            time: 0.0,
        })
    }

    pub fn params(&self) -> &SphParams {
        &self.params
    }

    pub fn num_particles(&self) -> usize {
        self.pos.len()
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.pos
    }

    pub fn densities(&self) -> &[f64] {
        &self.rho
    }

    fn fluid(&self) -> Fluid<'_> {
        let mass = self.params.particle_mass();
        let c0 = self.params.sound_speed();
        let h = self.params.smoothing_length();
        let wall_stiffness = mass * c0 * c0 / (self.params.spacing() * self.params.spacing());
        Fluid {
            params: &self.params,
            kernel: Kernel::new(h),
            mass,
            c0,
            alpha: (8.0 * self.params.kinematic_viscosity / (c0 * h)).max(MIN_ALPHA),
            wall_stiffness,
            wall_damping: (wall_stiffness * mass).sqrt(),
            half: self.half,
            pos: &self.pos,
            vel: &self.vel,
            grid: &self.grid,
            proxies: &self.proxies,
        }
    }
}

impl ProxyDomain for SphSystem {
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
        if h > self.params.max_step() {
            return Err(SolverError::Unstable {
                engine: ENGINE,
                detail: format!("step {h} exceeds acoustic limit {}", self.params.max_step()),
            });
        }
        for proxy in &mut self.proxies {
            proxy.integrate(h);
        }
        self.grid.rebuild(&self.pos);

        let (accel, wrenches) = {
            let fluid = self.fluid();
            let n = fluid.pos.len();
            let rho: Vec<f64> = (0..n).into_par_iter().map(|i| fluid.density(i)).collect();
            let p: Vec<f64> = rho.iter().map(|&r| fluid.pressure(r)).collect();
            let accel: Vec<DVec3> = (0..n)
                .into_par_iter()
                .map(|i| fluid.acceleration(i, &rho, &p))
                .collect();
            let wrenches: Vec<ContactWrench> = fluid
                .proxies
                .par_iter()
                .map(|proxy| fluid.proxy_wrench(proxy))
                .collect();
            self.rho = rho;
            (accel, wrenches)
        };
        self.wrenches = wrenches;

        for ((x, v), a) in self.pos.iter_mut().zip(self.vel.iter_mut()).zip(&accel) {
            *v += *a * h;
            *x += *v * h;
        }
        self.time += h;

        if !self.pos.iter().all(|x| x.is_finite()) || self.wrenches.iter().any(|w| !w.is_finite()) {
            return Err(SolverError::NonFinite {
                engine: ENGINE,
                time: self.time,
            });
        }
        trace!(time = self.time, "sph step");
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
        self.params.depth
    }

    fn output_points(&self) -> Vec<DVec3> {
        self.pos.clone()
    }
}
