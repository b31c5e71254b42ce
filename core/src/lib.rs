//! Tumble, a cluster-pays cascading slot engine.
//!
//! The evaluator finds and pays clusters, the state machine tracks the
//! session, and `GameEngine` drives both from a single seeded generator.

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod grid;
pub mod history;
pub mod rng;
pub mod rtp;
pub mod snapshot;
pub mod state_machine;
pub mod types;

pub use config::GameConfig;
pub use engine::{GameEngine, SpinResult};
pub use error::{EngineError, EngineResult};
pub use rng::SeededRng;
