//! Co-simulation message types.
//!
//! These are the only values that cross node boundaries. They are
//! transport-agnostic and serialized with bincode.

use serde::{Deserialize, Serialize};
use terracosim_core::{TerrainForce, TireInfo, WheelState};

use crate::error::{NetworkError, NetworkResult};

/// Messages exchanged between the vehicle rank and terrain ranks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CosimMessage {
    /// Vehicle -> terrain, once: tires served by the receiving terrain node.
    TireInfo(Vec<TireInfo>),

    /// Terrain -> vehicle, once: terrain surface height under the vehicle.
    TerrainReady { height: f64 },

    /// Vehicle -> terrain, every round.
    WheelStates { round: u64, states: Vec<WheelState> },

    /// Terrain -> vehicle, every round.
    TerrainForces {
        round: u64,
        forces: Vec<TerrainForce>,
    },

    /// Either direction: the sender failed and the run is over.
    Abort { reason: String },
}

impl CosimMessage {
    /// Short name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TireInfo(_) => "TireInfo",
            Self::TerrainReady { .. } => "TerrainReady",
            Self::WheelStates { .. } => "WheelStates",
            Self::TerrainForces { .. } => "TerrainForces",
            Self::Abort { .. } => "Abort",
        }
    }

    /// Unpack a `TireInfo` message.
    pub fn into_tire_info(self, source_rank: usize) -> NetworkResult<Vec<TireInfo>> {
        match self {
            Self::TireInfo(tires) => Ok(tires),
            other => Err(other.unexpected(source_rank, "TireInfo")),
        }
    }

    /// Unpack a `TerrainReady` message.
    pub fn into_terrain_height(self, source_rank: usize) -> NetworkResult<f64> {
        match self {
            Self::TerrainReady { height } => Ok(height),
            other => Err(other.unexpected(source_rank, "TerrainReady")),
        }
    }

    /// Unpack a `WheelStates` message, checking that it belongs to `round`.
    pub fn into_wheel_states(
        self,
        source_rank: usize,
        round: u64,
    ) -> NetworkResult<Vec<WheelState>> {
        match self {
            Self::WheelStates { round: got, states } => {
                check_round(source_rank, round, got)?;
                Ok(states)
            }
            other => Err(other.unexpected(source_rank, "WheelStates")),
        }
    }

    /// Unpack a `TerrainForces` message, checking that it belongs to `round`.
    pub fn into_terrain_forces(
        self,
        source_rank: usize,
        round: u64,
    ) -> NetworkResult<Vec<TerrainForce>> {
        match self {
            Self::TerrainForces { round: got, forces } => {
                check_round(source_rank, round, got)?;
                Ok(forces)
            }
            other => Err(other.unexpected(source_rank, "TerrainForces")),
        }
    }

    fn unexpected(&self, source_rank: usize, expected: &'static str) -> NetworkError {
        NetworkError::UnexpectedMessage {
            source_rank,
            expected,
            got: self.kind(),
        }
    }
}

fn check_round(source_rank: usize, expected: u64, got: u64) -> NetworkResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(NetworkError::RoundMismatch {
            source_rank,
            expected,
            got,
        })
    }
}

/// Serialize a message to bytes using bincode.
pub fn serialize<T: Serialize>(message: &T) -> NetworkResult<Vec<u8>> {
    bincode::serialize(message).map_err(|e| NetworkError::Serialization(e.to_string()))
}

/// Deserialize bytes to a message using bincode.
pub fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> NetworkResult<T> {
    bincode::deserialize(bytes).map_err(|e| NetworkError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};

    #[test]
    fn test_frame_preserves_wheel_states() {
        let mut state = WheelState::at_rest(1, DVec3::new(1.0, 2.0, 0.5), DQuat::IDENTITY);
        state.omega = -3.5;
        let msg = CosimMessage::WheelStates {
            round: 7,
            states: vec![state],
        };

        let bytes = serialize(&msg).unwrap();
        let back: CosimMessage = deserialize(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_round_check() {
        let msg = CosimMessage::TerrainForces {
            round: 3,
            forces: vec![TerrainForce::zero(0)],
        };
        let err = msg.clone().into_terrain_forces(1, 4).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::RoundMismatch {
                expected: 4,
                got: 3,
                ..
            }
        ));
        assert_eq!(msg.into_terrain_forces(1, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_kind() {
        let msg = CosimMessage::TerrainReady { height: 0.0 };
        let err = msg.into_tire_info(2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected TireInfo from rank 2, got TerrainReady"
        );
    }

    #[test]
    fn test_garbage_frame() {
        let result: NetworkResult<CosimMessage> = deserialize(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(matches!(result, Err(NetworkError::Deserialization(_))));
    }
}
