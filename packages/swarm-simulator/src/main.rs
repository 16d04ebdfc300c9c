//! main.rs — swarm-sim entry point
//!
//! Two subcommands:
//!   run   TDMA slot simulation with spoofing detection, writes the slot log
//!   mlat  offline closed-form multilateration bench, writes fixes vs truth
//!         and the anchor trace

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use swarm_simulator::multilateration;
use swarm_simulator::scenarios::Scenario;
use swarm_simulator::{CsvSink, SimConfig, Simulation};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "swarm-sim", about = "TDoA swarm localization and GPS-spoofing detection simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the slot simulation
    Run(RunArgs),
    /// Run the moving-anchor multilateration experiment
    Mlat(MlatArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Config file path (built-in defaults if missing)
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Preset: gps-spoof, baseline, early-spoof, indoor, obstructed
    #[arg(short, long)]
    scenario: Option<String>,
    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the simulated horizon (s)
    #[arg(long)]
    horizon: Option<f64>,
    /// Override the CSV output path
    #[arg(short, long)]
    out: Option<String>,
}

#[derive(Args, Debug)]
struct MlatArgs {
    /// Fixes over one lap of the anchor constellation
    #[arg(long, default_value = "400")]
    steps: usize,
    /// Half-width of the uniform pseudorange noise (m)
    #[arg(long, default_value = "0.1")]
    noise: f64,
    #[arg(long, default_value = "1234")]
    seed: u64,
    #[arg(short, long, default_value = "mlat_results_din.csv")]
    out: String,
    /// Per-step anchor positions
    #[arg(long, default_value = "anchors_trace.csv")]
    anchors_out: String,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarm_simulator=info,swarm_sim=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Mlat(args) => mlat(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut cfg = SimConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config))?;

    if let Some(name) = &args.scenario {
        let scenario = Scenario::from_name(name)?;
        scenario.apply(&mut cfg);
        info!("Scenario '{}' applied", scenario.name());
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(horizon) = args.horizon {
        cfg.simulation.horizon_s = horizon;
    }
    if let Some(out) = args.out {
        cfg.output.csv_path = out;
    }

    let csv_path = cfg.output.csv_path.clone();
    let mut sim = Simulation::new(cfg).context("invalid simulation settings")?;
    let mut sink = CsvSink::create(&csv_path).with_context(|| format!("creating {csv_path}"))?;

    let summary = sim.run(&mut sink).with_context(|| format!("writing {csv_path}"))?;

    info!("Slot log written to {csv_path}");
    info!("Summary: {}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn mlat(args: MlatArgs) -> Result<()> {
    let report = multilateration::run_experiment(args.steps, args.noise, args.seed);

    let mut writer = csv::Writer::from_path(&args.out)
        .with_context(|| format!("creating {}", args.out))?;
    for sample in &report.samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;

    let mut anchors = csv::Writer::from_path(&args.anchors_out)
        .with_context(|| format!("creating {}", args.anchors_out))?;
    anchors.write_record(multilateration::anchor_trace_header())?;
    for constellation in &report.anchor_trace {
        let row = multilateration::anchor_trace_row(constellation);
        anchors.write_record(row.iter().map(f64::to_string))?;
    }
    anchors.flush()?;

    info!(
        "{} / {} fixes, RMS error {:.3} m, mean solve time {:.2} us -> {}, {}",
        report.samples.len(),
        report.steps,
        report.rms_error_m,
        report.mean_solve_us,
        args.out,
        args.anchors_out
    );
    Ok(())
}
