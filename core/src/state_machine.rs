//! Game state machine.
//!
//! RULE: the state machine is the only owner of GameStateData.
//! Everyone else sees copies (`data()`, `Transition::data`) and changes
//! it through the named mutators below or by firing events.
//!
//! Transitions are a fixed, ordered table. For a (state, event) pair the
//! first row whose guard passes fires; no match means the event is
//! rejected: state untouched, no action, no listener called.

use crate::types::Credits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Idle,
    Spinning,
    Evaluating,
    Tumbling,
    ShowingWin,
    FreeSpinsTrigger,
    FreeSpins,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    Spin,
    SpinComplete,
    /// Reserved for hosts; no table row consumes it.
    EvaluationComplete,
    WinDetected,
    NoWin,
    TumbleComplete,
    WinAnimationComplete,
    FreeSpinsTriggered,
    FreeSpinsComplete,
    /// Reserved for hosts; no table row consumes it.
    BalanceInsufficient,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    pub balance:              Credits,
    pub bet:                  Credits,
    /// Spin win in the base game; running total across a free-spin round.
    pub total_win:            Credits,
    pub cascade_count:        u32,
    pub free_spins_remaining: u32,
    pub is_in_free_spins:     bool,
    pub multiplier:           u32,
    pub last_win_amount:      Credits,
    pub auto_spin_count:      u32,
    pub max_auto_spins:       u32,
    pub stop_on_win:          bool,
    pub stop_on_loss:         bool,
    pub win_threshold:        Credits,
    pub loss_threshold:       Credits,
}

impl GameStateData {
    pub fn new(balance: Credits, bet: Credits) -> Self {
        Self {
            balance,
            bet,
            total_win: 0.0,
            cascade_count: 0,
            free_spins_remaining: 0,
            is_in_free_spins: false,
            multiplier: 1,
            last_win_amount: 0.0,
            auto_spin_count: 0,
            max_auto_spins: 0,
            stop_on_win: false,
            stop_on_loss: false,
            win_threshold: 0.0,
            loss_threshold: 0.0,
        }
    }
}

/// What listeners receive: one record per successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from:  GameState,
    pub to:    GameState,
    pub event: GameEvent,
    pub data:  GameStateData,
}

type Guard = fn(&GameStateData) -> bool;
type Action = fn(&mut GameStateData);

struct Rule {
    from:   GameState,
    event:  GameEvent,
    guard:  Option<Guard>,
    action: Option<Action>,
    to:     GameState,
}

const fn rule(from: GameState, event: GameEvent, to: GameState) -> Rule {
    Rule { from, event, guard: None, action: None, to }
}

const fn guarded(from: GameState, event: GameEvent, guard: Guard, action: Option<Action>, to: GameState) -> Rule {
    Rule { from, event, guard: Some(guard), action, to }
}

const fn acting(from: GameState, event: GameEvent, action: Action, to: GameState) -> Rule {
    Rule { from, event, guard: None, action: Some(action), to }
}

use GameEvent as E;
use GameState as S;

/// ORDER MATTERS: same (from, event) rows are tried top to bottom.
const TRANSITIONS: &[Rule] = &[
    guarded(S::Idle, E::Spin, can_afford_bet, Some(start_paid_spin), S::Spinning),
    guarded(S::Idle, E::Spin, cannot_afford_bet, None, S::GameOver),
    rule(S::Spinning, E::SpinComplete, S::Evaluating),
    acting(S::Evaluating, E::WinDetected, count_cascade, S::ShowingWin),
    rule(S::Evaluating, E::FreeSpinsTriggered, S::FreeSpinsTrigger),
    guarded(S::Evaluating, E::NoWin, in_free_spins, Some(end_cascades), S::FreeSpins),
    acting(S::Evaluating, E::NoWin, end_cascades, S::Idle),
    rule(S::ShowingWin, E::WinAnimationComplete, S::Tumbling),
    rule(S::Tumbling, E::TumbleComplete, S::Evaluating),
    acting(S::FreeSpinsTrigger, E::WinAnimationComplete, enter_free_spins, S::FreeSpins),
    guarded(S::FreeSpins, E::Spin, has_free_spins, Some(start_free_spin), S::Spinning),
    acting(S::FreeSpins, E::FreeSpinsComplete, finish_free_spins, S::Idle),
    rule(S::Idle, E::Reset, S::Idle),
    rule(S::Spinning, E::Reset, S::Idle),
    rule(S::Evaluating, E::Reset, S::Idle),
    rule(S::Tumbling, E::Reset, S::Idle),
    rule(S::ShowingWin, E::Reset, S::Idle),
    rule(S::FreeSpinsTrigger, E::Reset, S::Idle),
    acting(S::FreeSpins, E::Reset, clear_free_spins, S::Idle),
    rule(S::GameOver, E::Reset, S::Idle),
];

// ── Guards ────────────────────────────────────────────────────

fn can_afford_bet(d: &GameStateData) -> bool {
    d.balance >= d.bet
}

fn cannot_afford_bet(d: &GameStateData) -> bool {
    d.balance < d.bet
}

fn in_free_spins(d: &GameStateData) -> bool {
    d.is_in_free_spins
}

fn has_free_spins(d: &GameStateData) -> bool {
    d.free_spins_remaining > 0
}

// ── Actions ───────────────────────────────────────────────────

fn start_paid_spin(d: &mut GameStateData) {
    d.balance -= d.bet;
    d.cascade_count = 0;
    d.total_win = 0.0;
    d.multiplier = 1;
}

fn count_cascade(d: &mut GameStateData) {
    d.cascade_count += 1;
}

fn enter_free_spins(d: &mut GameStateData) {
    d.is_in_free_spins = true;
}

fn end_cascades(d: &mut GameStateData) {
    d.cascade_count = 0;
    d.multiplier = 1;
}

fn start_free_spin(d: &mut GameStateData) {
    d.free_spins_remaining -= 1;
    d.cascade_count = 0;
}

fn finish_free_spins(d: &mut GameStateData) {
    d.is_in_free_spins = false;
    d.free_spins_remaining = 0;
    d.balance += d.total_win;
    d.total_win = 0.0;
}

fn clear_free_spins(d: &mut GameStateData) {
    d.is_in_free_spins = false;
    d.free_spins_remaining = 0;
}

pub type TransitionListener = Box<dyn FnMut(&Transition) + Send>;

pub struct GameStateMachine {
    state:     GameState,
    data:      GameStateData,
    listeners: Vec<TransitionListener>,
}

impl GameStateMachine {
    pub fn new(data: GameStateData) -> Self {
        Self { state: GameState::Idle, data, listeners: Vec::new() }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    /// Copy of the current data.
    pub fn data(&self) -> GameStateData {
        self.data.clone()
    }

    /// Listeners run synchronously, in registration order, once per
    /// successful transition.
    pub fn on_transition(&mut self, listener: impl FnMut(&Transition) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Fire an event. Returns the transition taken, or `None` when no
    /// row matches (logged, never fatal).
    pub fn fire(&mut self, event: GameEvent) -> Option<Transition> {
        let Some(matched) = TRANSITIONS.iter().find(|r| {
            r.from == self.state && r.event == event && r.guard.map_or(true, |guard| guard(&self.data))
        }) else {
            log::warn!("invalid transition: {event:?} from {:?}", self.state);
            return None;
        };

        if let Some(action) = matched.action {
            action(&mut self.data);
        }
        let from = self.state;
        self.state = matched.to;

        let transition = Transition { from, to: matched.to, event, data: self.data.clone() };
        log::debug!("transition: {from:?} --{event:?}--> {:?}", matched.to);
        for listener in &mut self.listeners {
            listener(&transition);
        }
        Some(transition)
    }

    pub fn can_spin(&self) -> bool {
        match self.state {
            GameState::Idle => true,
            GameState::FreeSpins => self.data.free_spins_remaining > 0,
            _ => false,
        }
    }

    pub fn should_continue_auto_spin(&self) -> bool {
        let d = &self.data;
        if d.auto_spin_count == 0 || d.balance < d.bet {
            return false;
        }
        if d.stop_on_win && d.last_win_amount >= d.win_threshold {
            return false;
        }
        if d.stop_on_loss && d.balance <= d.loss_threshold {
            return false;
        }
        true
    }

    // ── Data mutators ─────────────────────────────────────────

    /// Count a paying cascade that did not go through WinDetected
    /// (the scatter trigger path).
    pub fn count_cascade(&mut self) {
        count_cascade(&mut self.data);
    }

    /// Add one cascade's payout to the running win.
    pub fn add_cascade_win(&mut self, amount: Credits) {
        self.data.total_win += amount;
    }

    /// Close out a spin: remember its win and, outside free spins, pay
    /// it into the balance. Free-spin winnings wait for FreeSpinsComplete.
    pub fn settle_spin(&mut self, spin_win: Credits) {
        self.data.last_win_amount = spin_win;
        if !self.data.is_in_free_spins {
            self.data.balance += spin_win;
        }
    }

    pub fn award_free_spins(&mut self, spins: u32) {
        self.data.free_spins_remaining += spins;
    }

    pub fn set_multiplier(&mut self, multiplier: u32) {
        self.data.multiplier = multiplier;
    }

    pub fn add_balance(&mut self, amount: Credits) {
        self.data.balance += amount;
    }

    pub fn set_bet(&mut self, bet: Credits) {
        self.data.bet = bet;
    }

    pub fn configure_auto_spin(&mut self, settings: &AutoSpinSettings) {
        self.data.auto_spin_count = settings.count;
        self.data.max_auto_spins = settings.count;
        self.data.stop_on_win = settings.stop_on_win;
        self.data.stop_on_loss = settings.stop_on_loss;
        self.data.win_threshold = settings.win_threshold;
        self.data.loss_threshold = settings.loss_threshold;
    }

    pub fn consume_auto_spin(&mut self) {
        self.data.auto_spin_count = self.data.auto_spin_count.saturating_sub(1);
    }

    pub fn clear_auto_spin(&mut self) {
        self.data.auto_spin_count = 0;
    }

    /// Overwrite state and data wholesale (session import). Listeners stay.
    pub fn restore(&mut self, state: GameState, data: GameStateData) {
        self.state = state;
        self.data = data;
    }
}

/// Auto-spin request from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSpinSettings {
    pub count:          u32,
    #[serde(default)]
    pub stop_on_win:    bool,
    #[serde(default)]
    pub stop_on_loss:   bool,
    #[serde(default)]
    pub win_threshold:  Credits,
    #[serde(default)]
    pub loss_threshold: Credits,
}

impl AutoSpinSettings {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            stop_on_win: false,
            stop_on_loss: false,
            win_threshold: 0.0,
            loss_threshold: 0.0,
        }
    }
}
