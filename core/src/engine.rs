//! The game engine: coordinator for one playing session.
//!
//! SPIN ORDER (fixed, never reordered):
//!   1. SPIN            : state machine takes the bet (or a free spin)
//!   2. fresh grid      : evaluator fills from the volatility-weighted pool
//!   3. SPIN_COMPLETE
//!   4. cascade loop    : evaluate; on a win: WIN_DETECTED,
//!                        WIN_ANIMATION_COMPLETE, remove + gravity + refill,
//!                        TUMBLE_COMPLETE, repeat; on a trigger:
//!                        FREE_SPINS_TRIGGERED, WIN_ANIMATION_COMPLETE, stop;
//!                        otherwise NO_WIN, stop
//!   5. settle          : credit the spin win (deferred inside free spins)
//!   6. close the round : FREE_SPINS_COMPLETE once the last free spin ends
//!
//! RULES:
//!   - The engine owns exactly one generator, one evaluator and one
//!     state machine. `spin` takes `&mut self`, so two spins can never
//!     interleave on the same engine.
//!   - All randomness flows through the engine's SeededRng, in the order
//!     above. Same seed + same calls = identical SpinResults.
//!   - A spin, once started, runs its whole cascade chain. Stopping
//!     auto-spin takes effect before the next spin.

use crate::{
    clock::{CancelToken, PaceSpeed, PaceStep, Pacer},
    command::{CommandOutcome, HostCommand, StateView},
    config::GameConfig,
    error::EngineResult,
    event::{EngineEvent, EventBus, SubscriptionId},
    grid::{Grid, GridEvaluator, WinResult},
    history::SpinHistory,
    rng::SeededRng,
    rtp::RtpReport,
    snapshot::SessionSnapshot,
    state_machine::{AutoSpinSettings, GameEvent, GameState, GameStateData, GameStateMachine, Transition},
    types::Credits,
};
use serde::{Deserialize, Serialize};

/// Everything one call to `spin` produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinResult {
    pub spin_index:         u64,
    pub bet:                Credits,
    /// Grid as it stood when the cascade chain ended.
    pub grid:               Grid,
    /// First cascade's outcome, or an empty result when nothing paid.
    pub win:                WinResult,
    /// Every paying or triggering cascade, in order.
    pub cascades:           Vec<WinResult>,
    pub total_win:          Credits,
    pub balance:            Credits,
    pub free_spins_awarded: u32,
    pub is_free_spin:       bool,
    pub state:              GameState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSpinStop {
    CountExhausted,
    InsufficientBalance,
    WinThreshold,
    LossThreshold,
    Cancelled,
    SpinUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSpinSummary {
    pub spins_played:      u32,
    pub free_spins_played: u32,
    pub total_won:         Credits,
    pub reason:            AutoSpinStop,
}

pub struct GameEngine {
    config:        GameConfig,
    seed:          String,
    rng:           SeededRng,
    evaluator:     GridEvaluator,
    state_machine: GameStateMachine,
    events:        EventBus,
    history:       SpinHistory,
    pacer:         Pacer,
    auto_spin:     CancelToken,
    /// Never cancelled; in-spin pauses always run their full length.
    spin_pause:    CancelToken,
    spins_started: u64,
}

impl GameEngine {
    pub fn new(config: GameConfig, seed: impl ToString) -> Self {
        let seed = seed.to_string();
        let settings = &config.settings;
        let data = GameStateData::new(settings.initial_balance, settings.default_bet);
        let history = SpinHistory::new(settings.history_capacity);
        let pacer = Pacer::new(settings);
        Self {
            rng:           SeededRng::new(&seed),
            evaluator:     GridEvaluator::from_config(&config),
            state_machine: GameStateMachine::new(data),
            events:        EventBus::new(),
            history,
            pacer,
            auto_spin:     CancelToken::new(),
            spin_pause:    CancelToken::new(),
            spins_started: 0,
            seed,
            config,
        }
    }

    /// Engine over the shipped paytable and default volatility preset.
    pub fn shipped(seed: impl ToString) -> EngineResult<Self> {
        Ok(Self::new(GameConfig::shipped()?, seed))
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn game_state(&self) -> GameState {
        self.state_machine.state()
    }

    /// Snapshot of the state data.
    pub fn state_data(&self) -> GameStateData {
        self.state_machine.data()
    }

    /// Snapshot of the grid.
    pub fn grid(&self) -> Grid {
        self.evaluator.grid().clone()
    }

    pub fn can_spin(&self) -> bool {
        self.state_machine.can_spin()
    }

    pub fn history(&self) -> &SpinHistory {
        &self.history
    }

    pub fn spin_history(&self) -> Vec<SpinResult> {
        self.history.to_vec()
    }

    pub fn state_view(&self) -> StateView {
        StateView {
            state:    self.game_state(),
            data:     self.state_data(),
            can_spin: self.can_spin(),
        }
    }

    // ── Subscriptions ──────────────────────────────────────────

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EngineEvent) + Send + 'static) -> SubscriptionId {
        self.events.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Raw state-machine listener; receives the data snapshot as well.
    pub fn on_transition(&mut self, listener: impl FnMut(&Transition) + Send + 'static) {
        self.state_machine.on_transition(listener);
    }

    // ── Host controls ──────────────────────────────────────────

    /// Accepted only for `0 < amount <= balance`.
    pub fn set_bet(&mut self, amount: Credits) -> bool {
        let balance = self.state_machine.data().balance;
        if !(amount > 0.0 && amount <= balance) {
            log::warn!("set_bet rejected: {amount} (balance {balance})");
            return false;
        }
        self.state_machine.set_bet(amount);
        true
    }

    pub fn add_balance(&mut self, amount: Credits) -> bool {
        if !(amount.is_finite() && amount > 0.0) {
            log::warn!("add_balance rejected: {amount}");
            return false;
        }
        self.state_machine.add_balance(amount);
        self.publish_balance();
        true
    }

    /// Back to IDLE from anywhere. Clears the grid and any auto-spin run;
    /// history is kept.
    pub fn reset(&mut self) -> bool {
        self.stop_auto_spin();
        self.evaluator.initialize_grid();
        self.fire(GameEvent::Reset).is_some()
    }

    pub fn set_seed(&mut self, seed: impl ToString) {
        self.seed = seed.to_string();
        self.rng.set_seed(&self.seed);
    }

    pub fn set_pace_speed(&mut self, speed: PaceSpeed) {
        self.pacer.set_speed(speed);
    }

    // ── Spin ───────────────────────────────────────────────────

    /// Play one spin (paid from IDLE, free inside a free-spin round).
    /// Returns `None` when spinning is not possible right now, including
    /// an IDLE spin the balance cannot cover (which ends in GAME_OVER).
    pub fn spin(&mut self) -> Option<SpinResult> {
        if !self.state_machine.can_spin() {
            log::warn!("spin rejected in state {:?}", self.game_state());
            return None;
        }

        let is_free_spin = self.game_state() == GameState::FreeSpins;
        self.fire(GameEvent::Spin)?;
        if self.game_state() == GameState::GameOver {
            log::info!("balance cannot cover bet; game over");
            return None;
        }

        let data = self.state_machine.data();
        let bet = data.bet;
        let in_free_spins = data.is_in_free_spins;
        self.spins_started += 1;
        let spin_index = self.spins_started;

        if !is_free_spin {
            self.publish_balance();
        }
        self.events.publish(&EngineEvent::SpinStarted { spin_index, bet, free_spin: is_free_spin });

        let preset = Some(self.evaluator.volatility());
        let pool = if in_free_spins {
            self.evaluator.generate_free_spin_pool(preset)
        } else {
            self.evaluator.generate_symbol_pool(preset)
        };
        self.evaluator.initialize_grid();
        self.evaluator.fill_empty_positions(&pool, &mut self.rng);
        self.pause(PaceStep::Spin);
        self.fire(GameEvent::SpinComplete);

        let max_cascades = self.config.paytable.max_cascades;
        let mut cascades: Vec<WinResult> = Vec::new();
        let mut spin_win = 0.0;
        let mut free_spins_awarded = 0;
        let mut depth = 0;

        loop {
            if depth >= max_cascades {
                log::debug!("spin={spin_index} cascade cap {max_cascades} reached");
                self.fire(GameEvent::NoWin);
                break;
            }

            let win = self.evaluator.evaluate_win(bet, in_free_spins, &mut self.rng);

            if win.triggers_free_spins() {
                spin_win += win.total_payout;
                self.state_machine.add_cascade_win(win.total_payout);
                self.state_machine.set_multiplier(win.multiplier);
                self.state_machine.award_free_spins(win.free_spins_awarded);
                free_spins_awarded += win.free_spins_awarded;

                log::debug!(
                    "spin={spin_index} cascade={} scatters={} free_spins={} payout={:.2}",
                    depth + 1,
                    win.scatter_count,
                    win.free_spins_awarded,
                    win.total_payout
                );

                self.fire(GameEvent::FreeSpinsTriggered);
                if win.is_win() {
                    self.state_machine.count_cascade();
                    self.events.publish(&EngineEvent::WinDetected {
                        spin_index,
                        cascade: depth + 1,
                        win: win.clone(),
                    });
                }
                self.events.publish(&EngineEvent::FreeSpinsTriggered {
                    spin_index,
                    awarded: win.free_spins_awarded,
                    remaining: self.state_machine.data().free_spins_remaining,
                });
                self.pause(PaceStep::Win);
                self.fire(GameEvent::WinAnimationComplete);
                cascades.push(win);
                break;
            }

            if !win.is_win() {
                self.fire(GameEvent::NoWin);
                break;
            }

            spin_win += win.total_payout;
            self.state_machine.add_cascade_win(win.total_payout);
            self.state_machine.set_multiplier(win.multiplier);
            depth += 1;

            log::debug!(
                "spin={spin_index} cascade={depth} clusters={} payout={:.2} multiplier={}",
                win.winning_clusters().count(),
                win.total_payout,
                win.multiplier
            );

            self.fire(GameEvent::WinDetected);
            self.events.publish(&EngineEvent::WinDetected { spin_index, cascade: depth, win: win.clone() });
            self.pause(PaceStep::Win);
            self.fire(GameEvent::WinAnimationComplete);

            self.evaluator.remove_winning_symbols(win.winning_clusters());
            self.evaluator.apply_gravity();
            self.evaluator.fill_empty_positions(&pool, &mut self.rng);
            self.pause(PaceStep::Tumble);
            self.fire(GameEvent::TumbleComplete);

            cascades.push(win);
        }

        self.state_machine.settle_spin(spin_win);
        if spin_win > 0.0 && !self.state_machine.data().is_in_free_spins {
            self.publish_balance();
        }
        self.finish_free_spins_if_done();

        let data = self.state_machine.data();
        let result = SpinResult {
            spin_index,
            bet,
            grid: self.evaluator.grid().clone(),
            win: cascades.first().cloned().unwrap_or_else(WinResult::empty),
            cascades,
            total_win: spin_win,
            balance: data.balance,
            free_spins_awarded,
            is_free_spin,
            state: self.game_state(),
        };

        log::debug!(
            "spin={spin_index} done: win={:.2} cascades={} balance={:.2} state={:?}",
            result.total_win,
            result.cascades.len(),
            result.balance,
            result.state
        );

        self.history.push(result.clone());
        self.events.publish(&EngineEvent::SpinCompleted { result: Box::new(result.clone()) });
        Some(result)
    }

    fn finish_free_spins_if_done(&mut self) {
        let data = self.state_machine.data();
        if self.game_state() != GameState::FreeSpins || data.free_spins_remaining > 0 {
            return;
        }
        let round_win = data.total_win;
        if self.fire(GameEvent::FreeSpinsComplete).is_some() {
            log::debug!("free spins complete: round win {round_win:.2}");
            self.events.publish(&EngineEvent::FreeSpinsCompleted { total_win: round_win });
            self.publish_balance();
        }
    }

    // ── Auto-spin ──────────────────────────────────────────────

    /// Spin repeatedly until a stop condition holds. Pending free spins
    /// are played without using up the auto-spin count.
    pub fn start_auto_spin(&mut self, settings: AutoSpinSettings) -> AutoSpinSummary {
        self.state_machine.configure_auto_spin(&settings);
        self.auto_spin.reset();

        let mut spins_played = 0;
        let mut free_spins_played = 0;
        let mut total_won = 0.0;

        let reason = loop {
            if self.auto_spin.is_cancelled() {
                break AutoSpinStop::Cancelled;
            }

            let free_spin_pending = self.game_state() == GameState::FreeSpins && self.can_spin();
            if !free_spin_pending && !self.state_machine.should_continue_auto_spin() {
                break self.auto_spin_stop_reason();
            }

            let Some(result) = self.spin() else {
                break AutoSpinStop::SpinUnavailable;
            };
            total_won += result.total_win;
            if result.is_free_spin {
                free_spins_played += 1;
            } else {
                spins_played += 1;
                self.state_machine.consume_auto_spin();
            }

            if !self.pacer.pause(PaceStep::AutoSpin, &self.auto_spin) {
                break AutoSpinStop::Cancelled;
            }
        };

        self.state_machine.clear_auto_spin();
        log::info!("auto-spin stopped after {spins_played} spins: {reason:?}");
        self.events.publish(&EngineEvent::AutoSpinStopped { spins_played, reason });

        AutoSpinSummary { spins_played, free_spins_played, total_won, reason }
    }

    /// Stop auto-spin before its next spin.
    pub fn stop_auto_spin(&mut self) {
        self.state_machine.clear_auto_spin();
        self.auto_spin.cancel();
    }

    /// Token that stops a running auto-spin from a subscriber or another
    /// thread. Re-armed each time auto-spin starts.
    pub fn auto_spin_token(&self) -> CancelToken {
        self.auto_spin.clone()
    }

    fn auto_spin_stop_reason(&self) -> AutoSpinStop {
        let d = self.state_machine.data();
        if d.auto_spin_count == 0 {
            AutoSpinStop::CountExhausted
        } else if d.balance < d.bet {
            AutoSpinStop::InsufficientBalance
        } else if d.stop_on_win && d.last_win_amount >= d.win_threshold {
            AutoSpinStop::WinThreshold
        } else {
            AutoSpinStop::LossThreshold
        }
    }

    // ── Simulation ─────────────────────────────────────────────

    /// RTP study at the current bet on a private evaluator and generator.
    /// The live grid and stream are untouched.
    pub fn simulate_rtp(&self, spins: u64) -> f64 {
        self.simulate_rtp_report(spins).rtp
    }

    pub fn simulate_rtp_report(&self, spins: u64) -> RtpReport {
        let mut evaluator = GridEvaluator::from_config(&self.config);
        let mut rng = SeededRng::new(format!("{}:rtp", self.seed));
        evaluator.simulate_rtp_report(spins, self.state_machine.data().bet, &mut rng)
    }

    // ── Session save/restore ───────────────────────────────────

    pub fn export_session(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.game_state(),
            data:  self.state_data(),
            rng:   self.rng.state(),
        }
    }

    pub fn import_session(&mut self, snapshot: SessionSnapshot) {
        let from = self.game_state();
        self.state_machine.restore(snapshot.state, snapshot.data);
        self.rng.set_state(snapshot.rng);
        self.evaluator.initialize_grid();
        log::info!("session imported: {from:?} -> {:?}", snapshot.state);
        self.publish_balance();
    }

    // ── Host commands ──────────────────────────────────────────

    pub fn apply(&mut self, command: HostCommand) -> CommandOutcome {
        match command {
            HostCommand::Spin => CommandOutcome::Spin { result: self.spin().map(Box::new) },
            HostCommand::SetBet { amount } => CommandOutcome::Accepted { accepted: self.set_bet(amount) },
            HostCommand::AddBalance { amount } => {
                CommandOutcome::Accepted { accepted: self.add_balance(amount) }
            }
            HostCommand::StartAutoSpin { settings } => {
                CommandOutcome::AutoSpin { summary: self.start_auto_spin(settings) }
            }
            HostCommand::StopAutoSpin => {
                self.stop_auto_spin();
                CommandOutcome::Accepted { accepted: true }
            }
            HostCommand::Reset => CommandOutcome::Accepted { accepted: self.reset() },
            HostCommand::GetState => CommandOutcome::State { view: self.state_view() },
            HostCommand::SimulateRtp { spins } => {
                CommandOutcome::Rtp { report: self.simulate_rtp_report(spins) }
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────

    fn fire(&mut self, event: GameEvent) -> Option<Transition> {
        let transition = self.state_machine.fire(event)?;
        self.events.publish(&EngineEvent::StateChanged {
            from:  transition.from,
            to:    transition.to,
            event: transition.event,
        });
        Some(transition)
    }

    fn pause(&self, step: PaceStep) {
        self.pacer.pause(step, &self.spin_pause);
    }

    fn publish_balance(&mut self) {
        let balance = self.state_machine.data().balance;
        self.events.publish(&EngineEvent::BalanceUpdated { balance });
    }
}
