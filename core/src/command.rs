use crate::{
    engine::{AutoSpinSummary, SpinResult},
    rtp::RtpReport,
    state_machine::{AutoSpinSettings, GameState, GameStateData},
    types::Credits,
};
use serde::{Deserialize, Serialize};

/// All host-issued commands.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostCommand {
    // ── Play ──────────────────────────────────────
    Spin,
    StartAutoSpin { settings: AutoSpinSettings },
    StopAutoSpin,

    // ── Wallet ────────────────────────────────────
    SetBet { amount: Credits },
    AddBalance { amount: Credits },

    // ── Session ───────────────────────────────────
    Reset,
    GetState,
    SimulateRtp { spins: u64 },
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// `None` when the spin was rejected.
    Spin { result: Option<Box<SpinResult>> },
    Accepted { accepted: bool },
    AutoSpin { summary: AutoSpinSummary },
    State { view: StateView },
    Rtp { report: RtpReport },
}

/// Read-only view for hosts polling the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    pub state:    GameState,
    pub data:     GameStateData,
    pub can_spin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let bet: HostCommand = serde_json::from_str(r#"{"cmd":"set_bet","amount":2.5}"#).unwrap();
        assert_eq!(bet, HostCommand::SetBet { amount: 2.5 });

        let auto: HostCommand =
            serde_json::from_str(r#"{"cmd":"start_auto_spin","settings":{"count":10,"stop_on_loss":true}}"#)
                .unwrap();
        let HostCommand::StartAutoSpin { settings } = auto else {
            panic!("expected start_auto_spin");
        };
        assert_eq!(settings.count, 10);
        assert!(settings.stop_on_loss);
        assert!(!settings.stop_on_win);

        assert!(serde_json::from_str::<HostCommand>(r#"{"cmd":"spin_twice"}"#).is_err());
    }
}
