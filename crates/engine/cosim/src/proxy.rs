//! Terrain-side stand-ins for the tires.
//!
//! A node hosts one proxy per tire, all of the same kind: either a wheel body
//! or a tread mesh. Where the proxy lives (a rigid body in a Rapier world or
//! an index into a deformable engine) is recorded by its [`ProxyHandle`].

use terracosim_core::TriMesh;
use terracosim_physics::rapier3d::prelude::RigidBodyHandle;

use crate::config::InterfaceType;
use crate::error::{CosimError, Result};

/// Where a proxy is registered in the terrain engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyHandle {
    /// A dynamic body of the rigid terrain world.
    Body(RigidBodyHandle),
    /// A proxy index of a deformable terrain engine.
    Domain(usize),
}

/// Rigid wheel proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelProxy {
    pub handle: ProxyHandle,
    pub mass: f64,
    pub radius: f64,
    pub width: f64,
}

/// Tread surface proxy with a fixed topology.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshProxy {
    pub handle: ProxyHandle,
    pub mesh: TriMesh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProxyKind {
    Wheel(WheelProxy),
    Mesh(MeshProxy),
}

impl ProxyKind {
    pub fn handle(&self) -> ProxyHandle {
        match self {
            Self::Wheel(w) => w.handle,
            Self::Mesh(m) => m.handle,
        }
    }

    pub fn interface(&self) -> InterfaceType {
        match self {
            Self::Wheel(_) => InterfaceType::Body,
            Self::Mesh(_) => InterfaceType::Mesh,
        }
    }
}

/// Proxy of one tire on a terrain node.
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    /// Local tire index on the node.
    pub wheel: usize,
    pub kind: ProxyKind,
}

impl Proxy {
    pub fn new(wheel: usize, kind: ProxyKind) -> Self {
        Self { wheel, kind }
    }

    pub fn interface(&self) -> InterfaceType {
        self.kind.interface()
    }

    pub fn handle(&self) -> ProxyHandle {
        self.kind.handle()
    }

    pub fn as_wheel(&self) -> Result<&WheelProxy> {
        match &self.kind {
            ProxyKind::Wheel(w) => Ok(w),
            ProxyKind::Mesh(_) => Err(CosimError::precondition(format!(
                "proxy of tire {} is a mesh, not a wheel body",
                self.wheel
            ))),
        }
    }

    pub fn as_mesh(&self) -> Result<&MeshProxy> {
        match &self.kind {
            ProxyKind::Mesh(m) => Ok(m),
            ProxyKind::Wheel(_) => Err(CosimError::precondition(format!(
                "proxy of tire {} is a wheel body, not a mesh",
                self.wheel
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let wheel = Proxy::new(
            0,
            ProxyKind::Wheel(WheelProxy {
                handle: ProxyHandle::Domain(3),
                mass: 30.0,
                radius: 0.3,
                width: 0.2,
            }),
        );
        assert_eq!(wheel.interface(), InterfaceType::Body);
        assert_eq!(wheel.handle(), ProxyHandle::Domain(3));
        assert_eq!(wheel.as_wheel().unwrap().mass, 30.0);
        assert!(matches!(wheel.as_mesh(), Err(CosimError::Precondition(_))));

        let mesh = Proxy::new(
            1,
            ProxyKind::Mesh(MeshProxy {
                handle: ProxyHandle::Domain(0),
                mesh: TriMesh::cylinder(0.3, 0.2, 8),
            }),
        );
        assert_eq!(mesh.interface(), InterfaceType::Mesh);
        assert!(mesh.as_mesh().unwrap().mesh.num_triangles() > 0);
        assert!(mesh.as_wheel().is_err());
    }
}
