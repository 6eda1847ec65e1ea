//! Rank orchestration.
//!
//! Rank 0 runs the vehicle, rank `k + 1` runs terrain node `k`. After a
//! one-time handshake (tire info out, terrain height back) every round is:
//!
//! 1. vehicle: `synchronize(t)`, send each terrain its wheel states
//! 2. terrain: receive states, `update_proxy` for each tire
//! 3. both: `advance(sync_step)`
//! 4. terrain: send `compute_contact_force` for each tire; vehicle receives
//!    and stores them for the next round
//!
//! Every message carries its round index. A rank that fails tells all others
//! to abort and the whole run ends with the first root-cause error.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use glam::{DQuat, DVec3};
use terracosim_core::TerrainForce;
use terracosim_network::{
    Communicator, CosimMessage, LocalHub, NetworkError, TransportConfig, TransportStats,
};
use tracing::{debug, error, info};

use crate::config::{CosimSpec, Layout, LoadedCosim};
use crate::error::{CosimError, Result};
use crate::output::{Frame, FrameHook, OutputSchedule, TerrainOutput, VehicleOutput};
use crate::terrain::TerrainNode;
use crate::vehicle::VehicleNode;

pub const VEHICLE_RANK: usize = 0;

/// Run-wide settings shared by every rank.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sync_step: f64,
    pub num_rounds: u64,
    pub transport: TransportConfig,
    pub output_dir: Option<PathBuf>,
    pub output_fps: f64,
    /// Chassis pose before it is lifted onto the terrain surface.
    pub initial_position: DVec3,
    pub initial_rotation: DQuat,
}

impl RunConfig {
    pub fn from_spec(spec: &CosimSpec) -> Self {
        Self {
            sync_step: spec.sync_step,
            num_rounds: spec.num_rounds(),
            transport: TransportConfig {
                recv_timeout: spec.timeout(),
            },
            output_dir: spec.output.directory.clone(),
            output_fps: spec.output.fps,
            initial_position: spec.initial_position,
            initial_rotation: spec.initial_rotation(),
        }
    }

    fn schedule(&self) -> OutputSchedule {
        OutputSchedule::new(self.output_fps, self.sync_step)
    }
}

/// Final state of one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RankReport {
    pub rank: usize,
    pub rounds: u64,
    /// Simulated time reached by the rank's node.
    pub time: f64,
    pub traffic: Traffic,
}

/// Messages and payload bytes one rank moved over the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Traffic {
    pub fn from_stats(stats: &TransportStats) -> Self {
        Self {
            messages_sent: stats.messages_sent(),
            messages_received: stats.messages_received(),
            bytes_sent: stats.bytes_sent(),
            bytes_received: stats.bytes_received(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rounds: u64,
    pub ranks: Vec<RankReport>,
    pub wall_clock: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rounds in {:.3} s wall clock",
            self.rounds,
            self.wall_clock.as_secs_f64()
        )?;
        for r in &self.ranks {
            let role = if r.rank == VEHICLE_RANK { "vehicle" } else { "terrain" };
            writeln!(
                f,
                "  rank {} ({role}): t = {:.6} s, {} msgs / {} B out, {} msgs / {} B in",
                r.rank,
                r.time,
                r.traffic.messages_sent,
                r.traffic.bytes_sent,
                r.traffic.messages_received,
                r.traffic.bytes_received
            )?;
        }
        Ok(())
    }
}

/// Vehicle side of the protocol.
pub fn run_vehicle_rank<C: Communicator + ?Sized>(
    comm: &C,
    config: &RunConfig,
    layout: &Layout,
    vehicle: &mut VehicleNode,
    mut hook: Option<Box<dyn FrameHook>>,
) -> Result<RankReport> {
    let tires = vehicle.tire_info();
    for node in 0..layout.num_nodes() {
        let served = layout
            .wheels(node)
            .iter()
            .filter_map(|&w| tires.get(w).cloned())
            .collect();
        comm.send(Layout::rank_of(node), &CosimMessage::TireInfo(served))?;
    }
    let mut heights = Vec::with_capacity(layout.num_nodes());
    for node in 0..layout.num_nodes() {
        let rank = Layout::rank_of(node);
        heights.push(comm.recv(rank)?.into_terrain_height(rank)?);
    }
    let height = heights.into_iter().reduce(f64::max).unwrap_or(0.0);
    vehicle.initialize(config.initial_position + DVec3::Z * height, config.initial_rotation)?;

    let mut files = config
        .output_dir
        .as_deref()
        .map(VehicleOutput::create)
        .transpose()?;
    let schedule = config.schedule();
    let mut frame = 0;

    for round in 0..config.num_rounds {
        let t = round as f64 * config.sync_step;
        let states = vehicle.synchronize(t)?;
        for node in 0..layout.num_nodes() {
            let served = layout
                .wheels(node)
                .iter()
                .filter_map(|&w| states.get(w).copied())
                .collect();
            comm.send(
                Layout::rank_of(node),
                &CosimMessage::WheelStates {
                    round,
                    states: served,
                },
            )?;
        }

        vehicle.advance(config.sync_step)?;

        let mut forces: Vec<TerrainForce> = Vec::with_capacity(layout.num_wheels());
        for node in 0..layout.num_nodes() {
            let rank = Layout::rank_of(node);
            forces.extend(comm.recv(rank)?.into_terrain_forces(rank, round)?);
        }
        vehicle.set_terrain_forces(&forces)?;
        debug!(round, time = vehicle.time(), "vehicle round complete");

        if schedule.is_frame(round) {
            let wheels = vehicle.wheel_states()?;
            if let Some(out) = files.as_mut() {
                out.write_frame(vehicle.time(), vehicle.chassis_pose()?, &wheels)?;
            }
            if let Some(hook) = hook.as_mut() {
                hook.on_frame(&Frame {
                    rank: comm.rank(),
                    index: frame,
                    time: vehicle.time(),
                    wheels: &wheels,
                    forces: &forces,
                    points: &[],
                });
            }
            frame += 1;
        }
    }

    if let Some(out) = files.as_mut() {
        out.flush()?;
    }
    Ok(RankReport {
        rank: comm.rank(),
        rounds: config.num_rounds,
        time: vehicle.time(),
        traffic: Traffic::default(),
    })
}

/// Terrain side of the protocol for terrain node `node_index`.
pub fn run_terrain_rank<C: Communicator + ?Sized>(
    comm: &C,
    config: &RunConfig,
    node_index: usize,
    node: &mut TerrainNode,
    mut hook: Option<Box<dyn FrameHook>>,
) -> Result<RankReport> {
    let tires = comm.recv(VEHICLE_RANK)?.into_tire_info(VEHICLE_RANK)?;
    node.set_tire_info(tires)?;
    node.initialize()?;
    comm.send(
        VEHICLE_RANK,
        &CosimMessage::TerrainReady {
            height: node.terrain_height(),
        },
    )?;

    // global wheel index of each local tire
    let served: Vec<usize> = node.tires().iter().map(|t| t.wheel).collect();

    let mut files = config
        .output_dir
        .as_deref()
        .map(|dir| TerrainOutput::create(dir, node_index))
        .transpose()?;
    let schedule = config.schedule();
    let mut frame = 0;

    for round in 0..config.num_rounds {
        let states = comm
            .recv(VEHICLE_RANK)?
            .into_wheel_states(VEHICLE_RANK, round)?;
        if states.len() != node.num_tires() {
            return Err(CosimError::precondition(format!(
                "round {round}: received {} wheel states for {} tires",
                states.len(),
                node.num_tires()
            )));
        }
        for state in &states {
            let local = served.iter().position(|&w| w == state.wheel).ok_or_else(|| {
                CosimError::precondition(format!("state for wheel {} not served here", state.wheel))
            })?;
            node.update_proxy(local, state)?;
        }

        node.advance(config.sync_step)?;

        let forces = (0..node.num_tires())
            .map(|i| node.compute_contact_force(i))
            .collect::<Result<Vec<_>>>()?;
        comm.send(
            VEHICLE_RANK,
            &CosimMessage::TerrainForces {
                round,
                forces: forces.clone(),
            },
        )?;
        debug!(round, time = node.time(), "terrain round complete");

        if schedule.is_frame(round) {
            let points = node.output_points();
            if let Some(out) = files.as_mut() {
                out.write_frame(frame, node.time(), &forces, &points)?;
            }
            if let Some(hook) = hook.as_mut() {
                hook.on_frame(&Frame {
                    rank: comm.rank(),
                    index: frame,
                    time: node.time(),
                    wheels: &states,
                    forces: &forces,
                    points: &points,
                });
            }
            frame += 1;
        }
    }

    if let Some(out) = files.as_mut() {
        out.flush()?;
    }
    Ok(RankReport {
        rank: comm.rank(),
        rounds: config.num_rounds,
        time: node.time(),
        traffic: Traffic::default(),
    })
}

/// Run a rank body; on failure tell every other rank to stop.
fn guarded<C: Communicator + ?Sized>(
    comm: &C,
    body: impl FnOnce() -> Result<RankReport>,
) -> Result<RankReport> {
    let result = body();
    if let Err(e) = &result {
        error!("rank {} failed: {e}", comm.rank());
        comm.abort(&e.to_string());
    }
    result
}

/// Errors that only echo another rank's failure.
fn is_secondary(e: &CosimError) -> bool {
    matches!(
        e,
        CosimError::Transport(NetworkError::Aborted { .. } | NetworkError::PeerDisconnected(_))
    )
}

/// Run every rank on its own thread over an in-process hub.
pub fn launch(config: &RunConfig, loaded: LoadedCosim) -> Result<RunSummary> {
    launch_with_hooks(config, loaded, |_| None)
}

/// [`launch`], with an optional frame hook per rank.
pub fn launch_with_hooks(
    config: &RunConfig,
    loaded: LoadedCosim,
    mut hooks: impl FnMut(usize) -> Option<Box<dyn FrameHook>>,
) -> Result<RunSummary> {
    let LoadedCosim {
        vehicle,
        terrains,
        layout,
    } = loaded;
    if terrains.len() != layout.num_nodes() {
        return Err(CosimError::precondition(format!(
            "{} terrain specfiles for {} terrain nodes",
            terrains.len(),
            layout.num_nodes()
        )));
    }

    // all configuration errors surface here, before any rank starts
    let mut vehicle = VehicleNode::new(vehicle)?;
    let mut nodes = terrains
        .into_iter()
        .enumerate()
        .map(|(k, spec)| TerrainNode::from_spec(spec, layout.wheels(k).len()))
        .collect::<Result<Vec<_>>>()?;

    let size = layout.num_nodes() + 1;
    let endpoints = LocalHub::new(size, config.transport.clone()).into_endpoints();
    let rank_hooks: Vec<_> = (0..size).map(&mut hooks).collect();
    info!(
        "launching {size} ranks: {} rounds of {} s",
        config.num_rounds, config.sync_step
    );

    let started = Instant::now();
    let layout = &layout;
    let results: Vec<Result<RankReport>> = thread::scope(|s| {
        let mut handles = Vec::with_capacity(size);
        let mut endpoints = endpoints.into_iter();
        let mut hooks = rank_hooks.into_iter();

        if let (Some(comm), Some(hook)) = (endpoints.next(), hooks.next()) {
            let vehicle = &mut vehicle;
            handles.push((
                VEHICLE_RANK,
                thread::Builder::new()
                    .name("rank-0-vehicle".to_string())
                    .spawn_scoped(s, move || {
                        guarded(&comm, || run_vehicle_rank(&comm, config, layout, vehicle, hook))
                            .map(|report| RankReport {
                                traffic: Traffic::from_stats(comm.stats()),
                                ..report
                            })
                    }),
            ));
        }
        for (k, ((comm, hook), node)) in endpoints.zip(hooks).zip(nodes.iter_mut()).enumerate() {
            let rank = Layout::rank_of(k);
            handles.push((
                rank,
                thread::Builder::new()
                    .name(format!("rank-{rank}-terrain"))
                    .spawn_scoped(s, move || {
                        guarded(&comm, || run_terrain_rank(&comm, config, k, node, hook))
                            .map(|report| RankReport {
                                traffic: Traffic::from_stats(comm.stats()),
                                ..report
                            })
                    }),
            ));
        }

        handles
            .into_iter()
            .map(|(rank, spawned)| match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(CosimError::Rank {
                        rank,
                        reason: "thread panicked".to_string(),
                    })
                }),
                Err(e) => Err(CosimError::Rank {
                    rank,
                    reason: format!("could not spawn thread: {e}"),
                }),
            })
            .collect()
    });

    let mut ranks = Vec::with_capacity(size);
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(report) => ranks.push(report),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        let root = errors
            .iter()
            .position(|e| !is_secondary(e))
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }

    let summary = RunSummary {
        rounds: config.num_rounds,
        ranks,
        wall_clock: started.elapsed(),
    };
    info!("co-simulation finished: {} rounds", summary.rounds);
    Ok(summary)
}
