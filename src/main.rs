//! Lifeline - Entry Point
//!
//! Loads a module directory and lookup tables, simulates a population and
//! writes the JSON report to stdout or a file.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use lifeline::core::config::Settings;
use lifeline::core::error::Result;
use lifeline::engine::CancelFlag;
use lifeline::population::Population;
use lifeline::registry::ModuleRegistry;

/// Simulate synthetic patients through clinical modules
#[derive(Parser, Debug)]
#[command(name = "lifeline")]
#[command(about = "Run a synthetic population through clinical modules")]
struct Args {
    /// Directory of module JSON files (sub-directories hold sub-modules)
    #[arg(long, default_value = "modules")]
    modules: PathBuf,

    /// Directory of lookup table CSV files
    #[arg(long)]
    lookup_tables: Option<PathBuf>,

    /// TOML settings file with [engine] and [population] sections
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Population size (overrides settings)
    #[arg(long, short = 'p')]
    population: Option<usize>,

    /// Run seed (overrides settings)
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Worker threads, 0 for one per core (overrides settings)
    #[arg(long)]
    workers: Option<usize>,

    /// Module key to run; repeat for several (overrides settings)
    #[arg(long = "module", short = 'm')]
    module_keys: Vec<String>,

    /// Horizon year (overrides settings)
    #[arg(long)]
    end_year: Option<i32>,

    /// Compile every registered module before simulating
    #[arg(long)]
    preload: bool,

    /// Write the report here instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lifeline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(size) = args.population {
        settings.population.size = size;
    }
    if let Some(seed) = args.seed {
        settings.population.seed = seed;
    }
    if let Some(workers) = args.workers {
        settings.population.workers = workers;
    }
    if let Some(end_year) = args.end_year {
        settings.population.end_year = end_year;
    }
    if !args.module_keys.is_empty() {
        settings.population.modules = args.module_keys.clone();
    }
    settings.validate()?;

    let registry = ModuleRegistry::new(settings.engine.clone());
    if let Some(dir) = &args.lookup_tables {
        registry.load_lookup_tables(dir)?;
    }
    registry.load_directory(&args.modules)?;
    if args.preload {
        registry.preload()?;
    }

    let population = Population::new(Arc::new(registry), settings.population);
    let report = population.run(&CancelFlag::new())?;
    let json = report.to_json()?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!("Report {} written to {}", report.run_id, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
