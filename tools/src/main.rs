//! spin-runner: headless RTP studies and IPC host for the tumble engine.
//!
//! Usage:
//!   spin-runner --seed 42 --spins 100000 --bet 1 --volatility medium
//!   spin-runner --seed 42 --spins 20000 --studies 8
//!   spin-runner --seed 42 --ipc-mode

use anyhow::{bail, Result};
use std::env;
use std::io::{self, BufRead, Write};
use tumble_core::{
    command::{CommandOutcome, HostCommand, StateView},
    config::{GameConfig, DEFAULT_VOLATILITY},
    engine::GameEngine,
    grid::GridEvaluator,
    rng::{SeedBank, SeededRng},
    rtp::RtpReport,
};

#[derive(serde::Serialize)]
struct IpcReply {
    outcome: CommandOutcome,
    state:   StateView,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let spins = parse_arg(&args, "--spins", 100_000u64);
    let bet = parse_arg(&args, "--bet", 1.0f64);
    let studies = parse_arg(&args, "--studies", 1u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let volatility = str_arg(&args, "--volatility", DEFAULT_VOLATILITY);
    let data_dir = str_arg(&args, "--data-dir", "./data");

    let config = GameConfig::load(data_dir, volatility)?;

    if ipc_mode {
        let engine = GameEngine::new(config, seed);
        return run_ipc_loop(engine);
    }

    if !(bet > 0.0) {
        bail!("--bet must be positive, got {bet}");
    }

    println!("Tumble: spin-runner");
    println!("  seed:       {seed}");
    println!("  spins:      {spins}");
    println!("  bet:        {bet}");
    println!("  volatility: {volatility}");
    println!("  data_dir:   {data_dir}");
    println!("  studies:    {studies}");
    println!();

    if studies <= 1 {
        let mut evaluator = GridEvaluator::from_config(&config);
        let mut rng = SeededRng::new(seed);
        let report = evaluator.simulate_rtp_report(spins, bet, &mut rng);
        print_summary(&config, &report);
    } else {
        run_studies(&config, seed, spins, bet, studies);
    }

    Ok(())
}

fn run_ipc_loop(mut engine: GameEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let line: serde_json::Value = match serde_json::from_str(&buffer) {
            Ok(v) => v,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };
        if line["cmd"] == "quit" {
            break;
        }

        let command: HostCommand = match serde_json::from_value(line) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        log::debug!("ipc command: {command:?}");
        let reply = IpcReply {
            outcome: engine.apply(command),
            state:   engine.state_view(),
        };
        writeln!(stdout, "{}", serde_json::to_string(&reply)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn write_error(out: &mut impl Write, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(out, "{err_json}")?;
    out.flush()?;
    Ok(())
}

fn run_studies(config: &GameConfig, master_seed: u64, spins: u64, bet: f64, studies: u64) {
    let bank = SeedBank::new(master_seed);
    let mut rtps = Vec::with_capacity(studies as usize);

    println!("=== STUDIES ===");
    for index in 0..studies {
        let mut evaluator = GridEvaluator::from_config(config);
        let mut rng = bank.for_study(index);
        let report = evaluator.simulate_rtp_report(spins, bet, &mut rng);
        println!(
            "  #{index:<3} seed {:>20} | RTP {:>7.3}% | hit {:>5.1}% | {}",
            bank.study_seed(index),
            report.rtp,
            report.hit_frequency * 100.0,
            band_label(config, report.rtp)
        );
        rtps.push(report.rtp);
    }

    let mean = rtps.iter().sum::<f64>() / rtps.len() as f64;
    let variance = rtps.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rtps.len() as f64;
    let within = rtps.iter().filter(|r| config.rtp_within_target(**r)).count();

    println!();
    println!("=== AGGREGATE ===");
    println!("  mean RTP:       {mean:.3}%");
    println!("  std dev:        {:.3}", variance.sqrt());
    println!("  within target:  {within}/{studies}");
}

fn print_summary(config: &GameConfig, report: &RtpReport) {
    let paytable = &config.paytable;
    println!("=== RTP SUMMARY ===");
    println!("  spins:          {}", report.spins);
    println!("  wagered:        {:.2}", report.total_wagered);
    println!("  paid:           {:.2}", report.total_paid);
    println!("  RTP:            {:.3}%", report.rtp);
    println!("  target:         {:.1}% ± {:.1}", paytable.target_rtp, paytable.rtp_tolerance);
    println!("  verdict:        {}", band_label(config, report.rtp));
    println!("  hit frequency:  {:.2}%", report.hit_frequency * 100.0);
    println!("  fs triggers:    {}", report.free_spin_triggers);
    println!("  biggest win:    {:.2}", report.biggest_win);
}

fn band_label(config: &GameConfig, rtp: f64) -> &'static str {
    if config.rtp_within_target(rtp) {
        "within target"
    } else {
        "OUT OF BAND"
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .unwrap_or(default)
}
