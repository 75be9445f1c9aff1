use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use soma::config::{self, SimConfig};
use soma::error::SnapshotError;
use soma::save_load;
use soma::stats::{Census, SimStats};
use soma::terrain::NoiseTerrain;
use soma::Environment;

const DEFAULT_SEED: u64 = 42;

#[derive(Parser, Debug)]
#[command(name = "soma", version, about = "Headless evolving soft-body simulation")]
struct Args {
    /// World seed for a new run. Defaults to 42.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of steps to run.
    #[arg(long, default_value_t = 6_000)]
    ticks: u64,

    /// JSON configuration for a new run.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot written at every report interval and on exit.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Resume from a snapshot. Its seed and configuration are used as saved.
    #[arg(long, conflicts_with_all = ["seed", "config"])]
    load: Option<PathBuf>,
}

/// Resume from `--load`, or seed a fresh population.
fn open_environment(args: &Args) -> Result<Environment, SnapshotError> {
    if let Some(path) = &args.load {
        let snapshot = save_load::read_snapshot(path)?;
        let terrain = NoiseTerrain::new(snapshot.seed() as u32, config::TERRAIN_SCALE);
        let env = snapshot.restore(Box::new(terrain))?;
        info!(
            path = %path.display(),
            seed = env.seed(),
            tick = env.tick_count(),
            organisms = env.len(),
            "snapshot loaded"
        );
        return Ok(env);
    }

    let sim_config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    let mut env = Environment::with_noise_terrain(sim_config, args.seed.unwrap_or(DEFAULT_SEED));
    env.populate(config::INITIAL_POPULATION, &[]);
    Ok(env)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut env = match open_environment(&args) {
        Ok(env) => env,
        Err(e) => {
            error!(error = %e, "could not start simulation");
            return ExitCode::FAILURE;
        }
    };

    info!(seed = env.seed(), ticks = args.ticks, organisms = env.len(), "simulation starting");

    let mut stats = SimStats::new(1000, config::REPORT_INTERVAL);
    for _ in 0..args.ticks {
        let report = env.step();
        let census = Census::of(&env);
        if stats.record(&census, &report) {
            info!(
                tick = env.tick_count(),
                population = census.population,
                mean_energy = census.mean_energy,
                mean_generation = census.mean_generation,
                max_generation = census.max_generation,
                births = stats.births.last().unwrap_or(0.0),
                deaths = stats.deaths.last().unwrap_or(0.0),
                "population"
            );
            if let Some(path) = &args.save {
                if let Err(e) = save_load::save_to_file(&env, path) {
                    warn!(path = %path.display(), error = %e, "autosave failed");
                }
            }
        }
        if env.is_empty() {
            warn!(tick = env.tick_count(), "population extinct");
            break;
        }
    }

    let totals = stats.lifetime;
    info!(
        tick = env.tick_count(),
        organisms = env.len(),
        births = totals.births,
        sexual_births = totals.sexual_births,
        deaths = totals.deaths,
        construction_failures = totals.construction_failures,
        incompatible_pairings = totals.incompatible_pairings,
        "simulation finished"
    );

    if let Some(path) = &args.save {
        if let Err(e) = save_load::save_to_file(&env, path) {
            error!(path = %path.display(), error = %e, "save failed");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
