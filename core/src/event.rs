//! Engine notifications for presentation layers.
//!
//! RULE: the engine reports what happened only through EngineEvents.
//! Every subscriber sees every event, in subscription order, after the
//! engine has finished the step that produced it.

use crate::{
    engine::{AutoSpinStop, SpinResult},
    grid::WinResult,
    state_machine::{GameEvent, GameState},
    types::Credits,
};
use serde::{Deserialize, Serialize};

/// Variants are appended, never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        from:  GameState,
        to:    GameState,
        event: GameEvent,
    },
    SpinStarted {
        spin_index: u64,
        bet:        Credits,
        free_spin:  bool,
    },
    WinDetected {
        spin_index: u64,
        cascade:    u32,
        win:        WinResult,
    },
    FreeSpinsTriggered {
        spin_index: u64,
        awarded:    u32,
        remaining:  u32,
    },
    FreeSpinsCompleted {
        total_win: Credits,
    },
    BalanceUpdated {
        balance: Credits,
    },
    SpinCompleted {
        result: Box<SpinResult>,
    },
    AutoSpinStopped {
        spins_played: u32,
        reason:       AutoSpinStop,
    },
}

impl EngineEvent {
    /// Stable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChanged { .. }       => "state_changed",
            Self::SpinStarted { .. }        => "spin_started",
            Self::WinDetected { .. }        => "win_detected",
            Self::FreeSpinsTriggered { .. } => "free_spins_triggered",
            Self::FreeSpinsCompleted { .. } => "free_spins_completed",
            Self::BalanceUpdated { .. }     => "balance_updated",
            Self::SpinCompleted { .. }      => "spin_completed",
            Self::AutoSpinStopped { .. }    => "auto_spin_stopped",
        }
    }
}

pub type Subscriber = Box<dyn FnMut(&EngineEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Multi-subscriber publish list. Subscribing never displaces anyone.
#[derive(Default)]
pub struct EventBus {
    next_id:     u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EngineEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, event: &EngineEvent) {
        log::trace!("event: {}", event.kind());
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }
}
