//! Benchmark for one synchronization round
//!
//! An SCM node with two tires: impose the wheel states, advance one round
//! and read back the contact forces.

use criterion::{criterion_group, criterion_main, Criterion};
use glam::{DQuat, DVec3};
use std::hint::black_box;
use terracosim::config::TerrainSpec;
use terracosim::{TerrainNode, TerrainType, TireInfo, WheelState};

const SYNC_STEP: f64 = 1e-2;

fn bench_scm_round(c: &mut Criterion) {
    let mut spec = TerrainSpec::with_defaults(TerrainType::Scm, 1e-3).unwrap();
    spec.patch.length = 3.0;
    spec.patch.width = 2.0;
    let mut node = TerrainNode::from_spec(spec, 2).unwrap();
    node.set_tire_info(vec![
        TireInfo::cylindrical(0, 30.0, 0.3, 0.2),
        TireInfo::cylindrical(1, 30.0, 0.3, 0.2),
    ])
    .unwrap();
    node.initialize().unwrap();

    // rolling forward, 2 cm into the soil
    let states: Vec<WheelState> = [-0.6, 0.6]
        .into_iter()
        .enumerate()
        .map(|(i, y)| {
            let mut state = WheelState::at_rest(i, DVec3::new(0.0, y, 0.28), DQuat::IDENTITY);
            state.lin_vel = DVec3::new(1.0, 0.0, 0.0);
            state.ang_vel = DVec3::new(0.0, 3.0, 0.0);
            state
        })
        .collect();

    c.bench_function("scm_round", |b| {
        b.iter(|| {
            for state in &states {
                node.update_proxy(state.wheel, state).unwrap();
            }
            node.advance(SYNC_STEP).unwrap();
            for i in 0..2 {
                black_box(node.compute_contact_force(i).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_scm_round);
criterion_main!(benches);
