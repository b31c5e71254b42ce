//! Standalone RTP simulation.
//!
//! Runs the base-game cascade loop through the evaluator and a borrowed
//! generator only. No state machine, no engine, no pacing. This is the
//! statistical check for a paytable + volatility preset.

use crate::{
    grid::{GridEvaluator, SCATTER_TRIGGER_COUNT},
    rng::SeededRng,
    types::Credits,
};
use serde::{Deserialize, Serialize};

/// Progress is logged this many times over a study.
const PROGRESS_STEPS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpReport {
    pub spins:              u64,
    pub total_wagered:      Credits,
    pub total_paid:         Credits,
    /// Percentage, e.g. 96.5.
    pub rtp:                f64,
    /// Fraction of spins that paid anything.
    pub hit_frequency:      f64,
    /// Spins whose opening grid held enough scatters to trigger.
    pub free_spin_triggers: u64,
    pub biggest_win:        Credits,
}

impl GridEvaluator {
    /// RTP percentage over `spins` base-game spins at `bet`.
    pub fn simulate_rtp(&mut self, spins: u64, bet: Credits, rng: &mut SeededRng) -> f64 {
        self.simulate_rtp_report(spins, bet, rng).rtp
    }

    pub fn simulate_rtp_report(&mut self, spins: u64, bet: Credits, rng: &mut SeededRng) -> RtpReport {
        let pool = self.generate_symbol_pool(Some(self.volatility()));
        let max_cascades = self.paytable().max_cascades;
        let progress_every = (spins / PROGRESS_STEPS).max(1);

        let mut total_wagered = 0.0;
        let mut total_paid = 0.0;
        let mut hits = 0u64;
        let mut free_spin_triggers = 0u64;
        let mut biggest_win: Credits = 0.0;

        for spin in 0..spins {
            self.initialize_grid();
            self.fill_empty_positions(&pool, rng);
            total_wagered += bet;

            let mut spin_win = 0.0;
            let mut cascades = 0;
            while cascades < max_cascades {
                let win = self.evaluate_win(bet, false, rng);
                if cascades == 0 && win.scatter_count >= SCATTER_TRIGGER_COUNT {
                    free_spin_triggers += 1;
                }
                if !win.is_win() {
                    break;
                }

                total_paid += win.total_payout;
                spin_win += win.total_payout;

                self.remove_winning_symbols(win.winning_clusters());
                self.apply_gravity();
                self.fill_empty_positions(&pool, rng);
                cascades += 1;
            }

            if spin_win > 0.0 {
                hits += 1;
            }
            biggest_win = biggest_win.max(spin_win);

            let done = spin + 1;
            if done % progress_every == 0 {
                log::info!(
                    "rtp: {done}/{spins} spins, running rtp={:.3}%",
                    percentage(total_paid, total_wagered)
                );
            }
        }

        let rtp = percentage(total_paid, total_wagered);
        log::info!("rtp: finished {spins} spins at bet {bet}: {rtp:.3}%");

        RtpReport {
            spins,
            total_wagered,
            total_paid,
            rtp,
            hit_frequency: if spins == 0 { 0.0 } else { hits as f64 / spins as f64 },
            free_spin_triggers,
            biggest_win,
        }
    }
}

fn percentage(paid: Credits, wagered: Credits) -> f64 {
    if wagered <= 0.0 {
        0.0
    } else {
        paid / wagered * 100.0
    }
}
