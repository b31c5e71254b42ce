//! GameEngine: spin accounting, free-spin rounds, history, events,
//! host commands and session save/restore.

use std::sync::{Arc, Mutex};
use tumble_core::{
    command::{CommandOutcome, HostCommand},
    config::{EngineSettings, GameConfig},
    engine::GameEngine,
    event::EngineEvent,
    grid::WinResult,
    snapshot::SessionSnapshot,
    state_machine::{GameState, GameStateData},
};

const EPS: f64 = 1e-9;

fn engine(seed: &str) -> GameEngine {
    GameEngine::shipped(seed).expect("shipped config loads")
}

fn engine_with(settings: EngineSettings, seed: &str) -> GameEngine {
    let config = GameConfig::shipped().expect("shipped config loads").with_settings(settings);
    GameEngine::new(config, seed)
}

/// Play until the engine is back in IDLE (finishing any free-spin round).
fn play_round(engine: &mut GameEngine) {
    engine.spin().expect("spin");
    while engine.game_state() == GameState::FreeSpins {
        engine.spin().expect("free spin");
    }
}

#[test]
fn fresh_engine_is_idle_and_can_spin() {
    let engine = engine("fresh");
    assert_eq!(engine.game_state(), GameState::Idle);
    assert!(engine.can_spin());
    let data = engine.state_data();
    assert_eq!(data.balance, 1000.0);
    assert_eq!(data.bet, 1.0);
    assert!(engine.spin_history().is_empty());
}

#[test]
fn base_spin_settles_bet_and_win_into_balance() {
    let mut engine = engine("accounting");
    let mut checked = 0;

    for _ in 0..300 {
        if engine.game_state() != GameState::Idle {
            play_round(&mut engine);
            continue;
        }
        let before = engine.state_data().balance;
        let result = engine.spin().expect("spin");
        assert!(!result.is_free_spin);

        let cascade_sum: f64 = result.cascades.iter().map(|c| c.total_payout).sum();
        assert!((result.total_win - cascade_sum).abs() < EPS);
        assert!(result.cascades.len() <= engine.config().paytable.max_cascades as usize);
        match result.cascades.first() {
            Some(first) => assert_eq!(&result.win, first),
            None => assert_eq!(result.win, WinResult::empty()),
        }

        if result.free_spins_awarded == 0 {
            assert_eq!(result.state, GameState::Idle);
            assert!((result.balance - (before - 1.0 + result.total_win)).abs() < EPS);
            checked += 1;
        } else {
            assert_eq!(result.state, GameState::FreeSpins);
            assert!((result.balance - (before - 1.0)).abs() < EPS, "trigger spin win is deferred");
        }
    }
    assert!(checked > 100);
}

#[test]
fn free_spin_round_pays_out_at_the_end() {
    let mut engine = engine("free-round");
    let start = GameStateData {
        is_in_free_spins: true,
        free_spins_remaining: 3,
        ..GameStateData::new(100.0, 2.0)
    };
    let rng = engine.export_session().rng;
    engine.import_session(SessionSnapshot { state: GameState::FreeSpins, data: start, rng });

    let mut round_win = 0.0;
    let mut spins = 0;
    while engine.game_state() == GameState::FreeSpins {
        let result = engine.spin().expect("free spin");
        assert!(result.is_free_spin);
        round_win += result.total_win;
        spins += 1;
        if result.state == GameState::FreeSpins {
            assert_eq!(result.balance, 100.0, "mid-round balance is untouched");
        }
        assert!(spins < 500, "free-spin round never ended");
    }

    assert!(spins >= 3);
    assert_eq!(engine.game_state(), GameState::Idle);
    let data = engine.state_data();
    assert!((data.balance - (100.0 + round_win)).abs() < EPS);
    assert!(!data.is_in_free_spins);
    assert_eq!(data.free_spins_remaining, 0);
    assert_eq!(data.total_win, 0.0);
}

#[test]
fn spin_without_funds_ends_the_game() {
    let settings = EngineSettings { initial_balance: 0.5, ..EngineSettings::default() };
    let mut engine = engine_with(settings, "broke");

    assert!(engine.spin().is_none());
    assert_eq!(engine.game_state(), GameState::GameOver);
    assert_eq!(engine.state_data().balance, 0.5);
    assert!(!engine.can_spin());
    assert!(engine.spin().is_none());

    assert!(engine.reset());
    assert_eq!(engine.game_state(), GameState::Idle);
    assert!(engine.add_balance(10.0));
    assert!(engine.spin().is_some());
}

#[test]
fn set_bet_requires_positive_and_affordable() {
    let mut engine = engine("bets");
    assert!(!engine.set_bet(0.0));
    assert!(!engine.set_bet(-1.0));
    assert!(!engine.set_bet(1000.01));
    assert_eq!(engine.state_data().bet, 1.0);

    assert!(engine.set_bet(1000.0));
    assert_eq!(engine.state_data().bet, 1000.0);
    assert!(engine.set_bet(2.5));
    assert_eq!(engine.spin().expect("spin").bet, 2.5);
}

#[test]
fn add_balance_rejects_non_positive_amounts() {
    let mut engine = engine("wallet");
    assert!(!engine.add_balance(0.0));
    assert!(!engine.add_balance(-5.0));
    assert!(!engine.add_balance(f64::NAN));
    assert!(engine.add_balance(25.0));
    assert_eq!(engine.state_data().balance, 1025.0);
}

#[test]
fn history_keeps_only_the_newest_results() {
    let settings = EngineSettings { history_capacity: 5, ..EngineSettings::default() };
    let mut engine = engine_with(settings, "history");

    for _ in 0..12 {
        engine.spin().expect("spin");
    }
    let history = engine.spin_history();
    assert_eq!(history.len(), 5);
    let indices: Vec<u64> = history.iter().map(|r| r.spin_index).collect();
    assert_eq!(indices, vec![8, 9, 10, 11, 12]);
    assert_eq!(engine.history().latest().map(|r| r.spin_index), Some(12));
}

#[test]
fn every_subscriber_sees_the_same_events() {
    let mut engine = engine("events");
    let first: Arc<Mutex<Vec<EngineEvent>>> = Arc::default();
    let second: Arc<Mutex<Vec<EngineEvent>>> = Arc::default();
    let transitions = Arc::new(Mutex::new(0usize));

    let sink = Arc::clone(&first);
    engine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    let sink = Arc::clone(&second);
    let id = engine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    let counter = Arc::clone(&transitions);
    engine.on_transition(move |_| *counter.lock().unwrap() += 1);

    let result = engine.spin().expect("spin");

    let events = first.lock().unwrap().clone();
    assert_eq!(events, *second.lock().unwrap());
    assert!(matches!(
        events.first(),
        Some(EngineEvent::StateChanged { from: GameState::Idle, to: GameState::Spinning, .. })
    ));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::SpinStarted { spin_index: 1, free_spin: false, .. })));
    match events.last() {
        Some(EngineEvent::SpinCompleted { result: published }) => assert_eq!(**published, result),
        other => panic!("expected spin_completed last, got {other:?}"),
    }

    let state_changes = events.iter().filter(|e| matches!(e, EngineEvent::StateChanged { .. })).count();
    assert_eq!(state_changes, *transitions.lock().unwrap());

    let wins = events.iter().filter(|e| matches!(e, EngineEvent::WinDetected { .. })).count();
    let paying = result.cascades.iter().filter(|c| c.is_win()).count();
    assert_eq!(wins, paying);

    assert!(engine.unsubscribe(id));
    assert!(!engine.unsubscribe(id));
    let before = second.lock().unwrap().len();
    engine.spin();
    assert_eq!(second.lock().unwrap().len(), before, "unsubscribed listener stays quiet");
}

#[test]
fn exported_session_continues_the_same_stream() {
    let mut original = engine("session");
    for _ in 0..5 {
        original.spin();
    }
    let json = original.export_session().to_json().expect("serialize");
    let snapshot = SessionSnapshot::from_json(&json).expect("parse");
    assert_eq!(
        snapshot.data.balance.to_bits(),
        original.state_data().balance.to_bits(),
        "balance must survive the JSON round-trip bit for bit"
    );

    let mut restored = engine("a different seed");
    restored.import_session(snapshot);
    assert_eq!(restored.game_state(), original.game_state());
    assert_eq!(restored.state_data(), original.state_data());

    for i in 0..10 {
        let a = original.spin().expect("original spin");
        let b = restored.spin().expect("restored spin");
        assert_eq!(a.grid, b.grid, "grid diverged at spin {i}");
        assert_eq!(a.cascades, b.cascades, "cascades diverged at spin {i}");
        assert_eq!(a.balance.to_bits(), b.balance.to_bits());
        assert_eq!(a.state, b.state);
    }
}

#[test]
fn rtp_study_leaves_the_live_stream_alone() {
    let mut studied = engine("study");
    let mut plain = engine("study");

    let rtp = studied.simulate_rtp(2_000);
    assert!(rtp > 0.0);

    let a = studied.spin().expect("spin");
    let b = plain.spin().expect("spin");
    assert_eq!(a, b);
}

#[test]
fn host_commands_drive_the_engine() {
    let mut engine = engine("commands");

    let outcome = engine.apply(HostCommand::SetBet { amount: 2.0 });
    assert_eq!(outcome, CommandOutcome::Accepted { accepted: true });
    let outcome = engine.apply(HostCommand::SetBet { amount: 0.0 });
    assert_eq!(outcome, CommandOutcome::Accepted { accepted: false });

    let CommandOutcome::Spin { result: Some(result) } = engine.apply(HostCommand::Spin) else {
        panic!("spin command should spin");
    };
    assert_eq!(result.bet, 2.0);

    let CommandOutcome::State { view } = engine.apply(HostCommand::GetState) else {
        panic!("get_state should report state");
    };
    assert_eq!(view.state, engine.game_state());
    assert_eq!(view.data, engine.state_data());

    let outcome = engine.apply(HostCommand::Reset);
    assert_eq!(outcome, CommandOutcome::Accepted { accepted: true });
    assert_eq!(engine.game_state(), GameState::Idle);

    let json = serde_json::to_string(&engine.apply(HostCommand::GetState)).expect("serialize");
    assert!(json.contains(r#""outcome":"state""#));
}

#[test]
fn reset_clears_the_grid_and_keeps_history() {
    let mut engine = engine("reset");
    engine.spin();
    assert!(engine.grid().iter().flatten().any(Option::is_some));

    assert!(engine.reset());
    assert!(engine.grid().iter().flatten().all(Option::is_none));
    assert_eq!(engine.spin_history().len(), 1);
}

fn rich_engine(seed: &str) -> GameEngine {
    let settings = EngineSettings { initial_balance: 1_000_000.0, ..EngineSettings::default() };
    engine_with(settings, seed)
}

fn capped_engine(max_cascades: u32, seed: &str) -> GameEngine {
    let mut config = GameConfig::shipped().expect("shipped config loads");
    config.paytable.max_cascades = max_cascades;
    GameEngine::new(config, seed)
}

#[test]
fn paying_trigger_spin_defers_its_win_to_the_end_of_the_round() {
    let mut engine = rich_engine("trigger-search");
    let bet = engine.state_data().bet;

    let mut found = None;
    for _ in 0..50_000 {
        if engine.game_state() == GameState::FreeSpins {
            engine.spin().expect("free spin");
            continue;
        }
        let before = engine.state_data().balance;
        let result = engine.spin().expect("spin");
        if result.free_spins_awarded > 0 && result.total_win > 0.0 {
            found = Some((before, result));
            break;
        }
    }
    let (before, trigger) = found.expect("no paying trigger spin in 50k spins");

    // The trigger closes the chain: it is the last cascade and the only one.
    assert_eq!(trigger.state, GameState::FreeSpins);
    let last = trigger.cascades.last().expect("trigger spin has cascades");
    assert!(last.triggers_free_spins());
    assert_eq!(trigger.cascades.iter().filter(|c| c.triggers_free_spins()).count(), 1);

    assert!((trigger.balance - (before - bet)).abs() < EPS, "trigger win is not paid yet");
    let data = engine.state_data();
    assert!((data.total_win - trigger.total_win).abs() < EPS);
    assert!(data.is_in_free_spins);
    assert_eq!(data.free_spins_remaining, trigger.free_spins_awarded);
    let paying = trigger.cascades.iter().filter(|c| c.is_win()).count();
    assert_eq!(data.cascade_count as usize, paying, "a paying trigger cascade is counted");

    let mut round_win = 0.0;
    while engine.game_state() == GameState::FreeSpins {
        let result = engine.spin().expect("free spin");
        assert!(result.is_free_spin);
        round_win += result.total_win;
        if result.state == GameState::FreeSpins {
            assert!((result.balance - (before - bet)).abs() < EPS);
        }
    }

    assert_eq!(engine.game_state(), GameState::Idle);
    let expected = before - bet + trigger.total_win + round_win;
    assert!(
        (engine.state_data().balance - expected).abs() < 1e-6,
        "balance {} != expected {expected}",
        engine.state_data().balance
    );
}

#[test]
fn retrigger_adds_to_remaining_free_spins() {
    let mut engine = engine("retrigger");
    let start = GameStateData {
        is_in_free_spins: true,
        free_spins_remaining: 5_000,
        ..GameStateData::new(100.0, 1.0)
    };
    let rng = engine.export_session().rng;
    engine.import_session(SessionSnapshot { state: GameState::FreeSpins, data: start, rng });

    for _ in 0..5_000 {
        let remaining = engine.state_data().free_spins_remaining;
        let result = engine.spin().expect("free spin");
        let data = engine.state_data();
        if result.free_spins_awarded > 0 {
            assert_eq!(result.state, GameState::FreeSpins);
            assert!(data.is_in_free_spins);
            assert_eq!(data.free_spins_remaining, remaining - 1 + result.free_spins_awarded);
            return;
        }
        assert_eq!(data.free_spins_remaining, remaining - 1);
    }
    panic!("no retrigger in 5000 free spins");
}

#[test]
fn cascade_cap_closes_the_chain_after_the_allowed_cascades() {
    let mut checked = 0;

    for n in 0..2_000 {
        let seed = format!("cap-{n}");
        let mut uncapped = engine(&seed);
        let full = uncapped.spin().expect("spin");
        if full.cascades.len() < 2 {
            continue;
        }

        let mut capped = capped_engine(1, &seed);
        let result = capped.spin().expect("capped spin");
        let first = &full.cascades[0];

        assert_eq!(result.cascades, vec![first.clone()]);
        assert_eq!(result.total_win, first.total_payout);
        assert_eq!(result.free_spins_awarded, 0);
        assert_eq!(result.state, GameState::Idle);
        assert_eq!(capped.game_state(), GameState::Idle);
        assert!((result.balance - (1000.0 - 1.0 + first.total_payout)).abs() < EPS);
        assert!(capped.can_spin());

        checked += 1;
        if checked == 20 {
            break;
        }
    }
    assert!(checked > 0, "no multi-cascade spin among the seeds");
}

#[test]
fn zero_cascade_cap_never_evaluates() {
    let mut engine = capped_engine(0, "no-cascades");
    for _ in 0..200 {
        let before = engine.state_data().balance;
        let result = engine.spin().expect("spin");
        assert!(result.cascades.is_empty());
        assert_eq!(result.win, WinResult::empty());
        assert_eq!(result.total_win, 0.0);
        assert_eq!(result.free_spins_awarded, 0);
        assert_eq!(result.state, GameState::Idle);
        assert!((result.balance - (before - 1.0)).abs() < EPS);
    }
}
