//! Terrain node scenarios
//!
//! Lifecycle of a terrain node against a vehicle node, without transport.

use std::path::Path;

use glam::{DQuat, DVec3};
use serde_json::json;
use terracosim::config::{InterfaceType, TerrainSpec, VehicleSpec};
use terracosim::{ConfigError, CosimError, TerrainNode, TerrainType, VehicleNode, WheelState};

fn terrain_spec(doc: serde_json::Value) -> TerrainSpec {
    TerrainSpec::from_value(&doc, Path::new("terrain.json")).expect("valid terrain specfile")
}

/// Front axle of the default vehicle.
fn two_wheeled() -> VehicleSpec {
    let mut spec = VehicleSpec::four_wheeled(1e-3);
    spec.wheels.truncate(2);
    spec
}

#[test]
fn test_scm_two_tires_one_round() {
    let spec = terrain_spec(json!({
        "Type": "SCM",
        "Step size": 1e-3,
        "Patch dimensions": { "Length": 4.0, "Width": 3.0 },
        "Soil parameters": {},
        "Grid spacing": 0.05
    }));
    let mut terrain = TerrainNode::from_spec(spec, 2).unwrap();
    let mut vehicle = VehicleNode::new(two_wheeled()).unwrap();

    terrain.set_tire_info(vehicle.tire_info()).unwrap();
    terrain.initialize().unwrap();
    assert_eq!(terrain.num_proxies(), 2);
    for wheel in 0..2 {
        let proxy = terrain.proxy(wheel).expect("proxy exists");
        assert_eq!(proxy.interface(), InterfaceType::Body);
    }

    // tires start 5 mm into the soil
    let z = terrain.terrain_height() + 0.28575 - 0.005;
    vehicle.initialize(DVec3::new(0.0, 0.0, z), DQuat::IDENTITY).unwrap();

    let states = vehicle.synchronize(0.0).unwrap();
    for state in &states {
        terrain.update_proxy(state.wheel, state).unwrap();
    }
    vehicle.advance(0.01).unwrap();
    terrain.advance(0.01).unwrap();

    assert!((vehicle.time() - 0.01).abs() < 1e-12);
    assert!((terrain.time() - 0.01).abs() < 1e-12);

    let forces: Vec<_> = (0..2)
        .map(|i| terrain.compute_contact_force(i).unwrap())
        .collect();
    assert_eq!(forces[0].wheel, 0);
    assert_eq!(forces[1].wheel, 1);
    for force in &forces {
        assert!(force.is_finite());
        assert!(force.force.z > 0.0, "soil should carry the tire: {force:?}");
    }
    vehicle.set_terrain_forces(&forces).unwrap();
}

#[test]
fn test_bogus_type_aborts_before_construct() {
    assert_eq!(TerrainType::from_name("BOGUS"), TerrainType::Unknown);

    let doc = json!({ "Type": "BOGUS", "Step size": 1e-3 });
    let err = TerrainSpec::from_value(&doc, Path::new("bogus.json")).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownTerrainType(ref name) if name == "BOGUS"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.json");
    std::fs::write(&path, r#"{ "Type": "BOGUS" }"#).unwrap();
    assert_eq!(TerrainType::from_specfile(&path).unwrap(), TerrainType::Unknown);

    // hand-built terrain settings with an unknown type are refused as well
    let mut spec = TerrainSpec::with_defaults(TerrainType::Rigid, 1e-3).unwrap();
    spec.terrain_type = TerrainType::Unknown;
    match TerrainNode::from_spec(spec, 1) {
        Err(CosimError::Config(ConfigError::UnknownTerrainType(_))) => {}
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("unknown terrain type accepted"),
    }
}

#[test]
fn test_body_only_terrain_rejects_mesh_proxy() {
    let sph = terrain_spec(json!({
        "Type": "GRANULAR_SPH",
        "Step size": 1e-4,
        "Interface": "MESH",
        "Patch dimensions": { "Length": 0.3, "Width": 0.3 },
        "Granular material": { "Radius": 0.01, "Density": 2000 },
        "SPH": { "Depth": 0.05 }
    }));
    let gpu = terrain_spec(json!({
        "Type": "GRANULAR_GPU",
        "Step size": 1e-4,
        "Interface": "MESH",
        "Patch dimensions": { "Length": 0.3, "Width": 0.3 },
        "Granular material": { "Radius": 0.02 },
        "Particle generation": { "Number layers": 1 }
    }));

    for spec in [sph, gpu] {
        let terrain_type = spec.terrain_type;
        let mut node = TerrainNode::from_spec(spec, 1).unwrap();
        assert!(!node.supports_mesh_interface());
        node.construct().unwrap();

        match node.create_proxy(0) {
            Err(CosimError::Config(ConfigError::UnsupportedInterface(t))) => {
                assert_eq!(t, terrain_type)
            }
            other => panic!("expected unsupported interface, got {:?}", other.err()),
        }
        assert!(node.proxy(0).is_none());
        assert_eq!(node.num_proxies(), 0);
    }
}

#[test]
fn test_update_without_advance_gives_zero_force() {
    let spec = TerrainSpec::with_defaults(TerrainType::Rigid, 1e-3).unwrap();
    let mut node = TerrainNode::from_spec(spec, 1).unwrap();
    node.initialize().unwrap();

    // deep in the ground, but nothing has been integrated yet
    let state = WheelState::at_rest(0, DVec3::new(0.0, 0.0, 0.1), DQuat::IDENTITY);
    node.update_proxy(0, &state).unwrap();
    let force = node.compute_contact_force(0).unwrap();
    assert_eq!(force.force, DVec3::ZERO);
    assert_eq!(force.moment, DVec3::ZERO);

    // an advance followed by a fresh update clears the accumulated load
    node.advance(0.005).unwrap();
    node.update_proxy(0, &state).unwrap();
    assert_eq!(node.compute_contact_force(0).unwrap().force, DVec3::ZERO);
}

#[test]
fn test_out_of_range_proxy_is_config_error() {
    let spec = TerrainSpec::with_defaults(TerrainType::Scm, 1e-3).unwrap();
    let mut node = TerrainNode::from_spec(spec, 3).unwrap();
    node.construct().unwrap();
    for wheel in 0..3 {
        node.create_proxy(wheel).unwrap();
        assert!(node.proxy(wheel).is_some());
    }
    assert!(matches!(
        node.create_proxy(3),
        Err(CosimError::Config(ConfigError::WheelOutOfRange { wheel: 3, num_tires: 3 }))
    ));
    assert_eq!(node.num_proxies(), 3);
}
