use crate::error::SolverResult;
use crate::shape::KinematicProxy;
use crate::wrench::ContactWrench;
use glam::DVec3;
use terracosim_core::material::CompositeMaterial;

/// A deformable terrain engine driven by kinematic proxies.
///
/// The owner re-poses proxies between calls to [`step`](Self::step); the
/// engine lets them coast with their imposed velocity inside a step and
/// reports the wrench it applied to each proxy during the last step.
pub trait ProxyDomain: Send {
    /// Short engine tag used in errors and logs.
    fn name(&self) -> &'static str;

    /// Register a proxy, returning its index.
    fn add_proxy(&mut self, proxy: KinematicProxy) -> usize;

    fn num_proxies(&self) -> usize;

    fn proxy_mut(&mut self, index: usize) -> SolverResult<&mut KinematicProxy>;

    /// Set the contact parameters between proxy `index` and the terrain.
    ///
    /// Engines whose contact law does not depend on the tire material
    /// ignore this.
    fn set_proxy_contact(
        &mut self,
        index: usize,
        material: &CompositeMaterial,
    ) -> SolverResult<()> {
        let _ = (index, material);
        Ok(())
    }

    /// Advance by `h` seconds.
    fn step(&mut self, h: f64) -> SolverResult<()>;

    /// Wrench on proxy `index` during the last step, moment about its center.
    fn contact_wrench(&self, index: usize) -> SolverResult<ContactWrench>;

    fn time(&self) -> f64;

    /// Height of the undisturbed terrain surface.
    fn surface_height(&self) -> f64;

    /// Points describing the current terrain state (grid nodes or particle
    /// centers), for output.
    fn output_points(&self) -> Vec<DVec3>;
}
