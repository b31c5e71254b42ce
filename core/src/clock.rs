//! Pacing clock: presentation pauses between spin steps, speed control,
//! and cancellation.
//!
//! The core never needs these pauses; they exist so a host can let an
//! animation finish before the next step. With all delays at zero (the
//! default) every wait returns immediately, which is how simulations run.

use crate::config::EngineSettings;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Where in a spin the engine is about to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceStep {
    /// Reels spinning, before the first evaluation.
    Spin,
    /// A win is on show, before the tumble.
    Win,
    /// Symbols dropping in, before re-evaluation.
    Tumble,
    /// Between two auto-spins.
    AutoSpin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaceSpeed {
    Normal, // configured delays
    Turbo,  // a quarter of the configured delays
    Instant,
}

/// Shared stop flag. Clones observe the same flag; cancelling wakes
/// any wait in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-arm for the next run.
    pub fn reset(&self) {
        *self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = false;
    }

    /// Sleep up to `duration`, waking early on cancel.
    /// Returns false if cancelled before or during the wait.
    pub fn wait(&self, duration: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if duration.is_zero() {
            return !*cancelled;
        }
        let deadline = Instant::now() + duration;
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match wake.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        !*cancelled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pacer {
    speed:         PaceSpeed,
    spin_delay:    Duration,
    win_delay:     Duration,
    tumble_delay:  Duration,
    auto_delay:    Duration,
}

impl Pacer {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            speed:        PaceSpeed::Normal,
            spin_delay:   Duration::from_millis(settings.spin_delay_ms),
            win_delay:    Duration::from_millis(settings.win_delay_ms),
            tumble_delay: Duration::from_millis(settings.tumble_delay_ms),
            auto_delay:   Duration::from_millis(settings.auto_spin_delay_ms),
        }
    }

    pub fn set_speed(&mut self, speed: PaceSpeed) {
        self.speed = speed;
    }

    pub fn delay_for(&self, step: PaceStep) -> Duration {
        let base = match step {
            PaceStep::Spin     => self.spin_delay,
            PaceStep::Win      => self.win_delay,
            PaceStep::Tumble   => self.tumble_delay,
            PaceStep::AutoSpin => self.auto_delay,
        };
        match self.speed {
            PaceSpeed::Normal  => base,
            PaceSpeed::Turbo   => base / 4,
            PaceSpeed::Instant => Duration::ZERO,
        }
    }

    /// Pause for `step`. Returns false when the token was cancelled.
    pub fn pause(&self, step: PaceStep, token: &CancelToken) -> bool {
        token.wait(self.delay_for(step))
    }
}
