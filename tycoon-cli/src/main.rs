//! Tycoon CLI - policy training harness
//!
//! Modes:
//! - --train: evaluate a population each generation and drive an optimizer
//! - --test: score one genome against baseline opponents
//! - --encode: print the feature vector of a state snapshot

mod config;
mod inspect;
mod test_cmd;
mod train;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

use crate::config::HarnessConfig;

#[derive(Parser, Debug)]
#[command(name = "tycoon")]
#[command(about = "Evaluate board-game policies through an external engine")]
#[command(group(ArgGroup::new("mode").required(true).args(["train", "test", "encode"])))]
pub struct Cli {
    /// Run the training loop
    #[arg(long)]
    pub train: bool,

    /// Evaluate a single genome
    #[arg(long)]
    pub test: bool,

    /// Encode a state snapshot JSON file and print the vector
    #[arg(long, value_name = "FILE")]
    pub encode: Option<PathBuf>,

    /// Number of generations to run
    #[arg(long, default_value = "50")]
    pub generations: u32,

    /// Baseline opponents per match in flat mode
    #[arg(long, default_value = "2")]
    pub opponents: usize,

    /// Matches per agent (flat) or per group (tournament)
    #[arg(long = "num-games", alias = "num_games", default_value = "50")]
    pub num_games: usize,

    /// Checkpoint root directory
    #[arg(long, value_name = "DIR", default_value = "checkpoints")]
    pub checkpoint: PathBuf,

    /// Genome file for --test
    #[arg(long, value_name = "FILE")]
    pub genome: Option<PathBuf>,

    /// Run matches on a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Grouped tournament instead of flat evaluation against baselines
    #[arg(long)]
    pub tournament: bool,

    /// Harness configuration JSON
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of *.genome files re-evaluated every generation
    #[arg(long, value_name = "DIR")]
    pub population: Option<PathBuf>,

    /// External optimizer command (ask/tell protocol)
    #[arg(long, value_name = "CMD")]
    pub optimizer: Option<String>,

    /// Agents per tournament group
    #[arg(long, default_value = "4")]
    pub group_size: usize,

    /// Master seed for shuffles and match seeds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output directory for results
    #[arg(long, value_name = "DIR", default_value = "output")]
    pub output: PathBuf,

    /// Override the engine path from the config file
    #[arg(long, value_name = "FILE")]
    pub engine: Option<PathBuf>,

    /// Override the turn cap from the config file
    #[arg(long)]
    pub max_turns: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.encode {
        return inspect::run(path, cli.json);
    }

    let config = load_config(&cli)?;
    if cli.train {
        train::run(&cli, &config)
    } else {
        test_cmd::run(&cli, &config)
    }
}

/// Config file (or defaults) with command-line overrides, validated
fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load_or_default(cli.config.as_deref())?;
    if let Some(engine) = &cli.engine {
        config.engine_path = engine.clone();
    }
    if let Some(max_turns) = cli.max_turns {
        config.max_turns = max_turns;
    }
    config.validate()?;
    Ok(config)
}
