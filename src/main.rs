use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use f1_history::{
    build_replay_series, AnalysisConfig, DatasetStore, JoinEngine, PlottingVariable, RaceName,
    ReplayEngine, SeasonAnalyzer,
};

/// Runs the analysis pipeline once over a directory of F1 CSV datasets.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding races.csv, drivers.csv, ... (overrides the config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Season to analyse
    #[arg(long, default_value_t = 2021)]
    season: i32,

    /// Race to replay: australia or turkey
    #[arg(long, default_value = "australia")]
    race: RaceName,

    /// Replay metric: position or gap-to-first
    #[arg(long, default_value = "gap-to-first")]
    metric: PlottingVariable,

    /// Number of drivers in the replay (defaults to the config value)
    #[arg(long)]
    drivers: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AnalysisConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if args.drivers.is_some() {
        config.replay_driver_limit = args.drivers;
    }
    config.validate()?;

    let store = DatasetStore::from_config(&config)?;
    let joins = JoinEngine::from_config(&store, &config);
    let analyzer = SeasonAnalyzer::new(&joins);

    let driver_standings = joins
        .build_driver_standings()
        .context("building driver standings")?;
    let constructor_standings = joins
        .build_constructor_standings()
        .context("building constructor standings")?;

    for (label, standings) in [("Drivers'", &driver_standings), ("Constructors'", &constructor_standings)] {
        match analyzer.find_deciding_race(standings, args.season)? {
            Some(race) => println!("The {} {label} championship was decided at the {race}", args.season),
            None => println!("The {} {label} championship went to the final race", args.season),
        }
    }

    let replay = ReplayEngine::new(&joins);
    let reference = match replay.load_reference_lap_times(args.race, args.season) {
        Ok(table) => table,
        Err(e) if e.is_not_found() => {
            warn!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let series = build_replay_series(&reference, args.metric, config.replay_driver_limit)?;
    if let Some((lo, hi)) = series.value_range() {
        println!("\n--- {} {}: {} from {lo} to {hi} ---", args.season, args.race, args.metric);
    }
    series.to_table()?.write_csv(io::stdout().lock())?;
    Ok(())
}
