//! Session snapshot: state, data and generator position to/from JSON.
//!
//! Plain serde value for host-side save/restore. Not a versioned wire
//! format: a snapshot is only guaranteed to load into the same build.

use crate::{
    error::EngineResult,
    rng::RngState,
    state_machine::{GameState, GameStateData},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: GameState,
    pub data:  GameStateData,
    /// Generator position, so a restored session continues the same stream.
    pub rng:   RngState,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
