//! Test command - score a single genome against baseline opponents
//!
//! Level 1 - Orchestration

use anyhow::{Context, Result};
use serde::Serialize;

use tycoon_tournament::{AgentIdentity, EvalSession, FitnessRecord, TournamentEvaluator};

use crate::config::HarnessConfig;
use crate::train::baseline_opponents;
use crate::Cli;

#[derive(Serialize)]
struct TestReport<'a> {
    genome: String,
    opponents: usize,
    games_scheduled: usize,
    win_rate: f64,
    avg_score: f64,
    avg_opponent_score: f64,
    avg_penalty: f64,
    avg_turns: f64,
    record: &'a FitnessRecord,
}

/// Evaluate `--genome` in slot 0 for `--num-games` matches
pub fn run(cli: &Cli, config: &HarnessConfig) -> Result<()> {
    let path = cli
        .genome
        .as_ref()
        .context("--test needs --genome PATH")?;
    let genome = std::fs::read(path)
        .with_context(|| format!("Failed to read genome {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "genome".to_string());

    let evaluator = TournamentEvaluator::new(config.eval_config(cli.parallel))
        .context("Failed to build match worker pool")?;
    let mut session = EvalSession::new(cli.seed.unwrap_or(42));
    session.begin_generation();

    let focal = AgentIdentity::learned(0, name.clone(), &config.learned_adapter, genome, &config.policy_config);
    let opponents = baseline_opponents(config, cli.opponents);

    tracing::info!(
        "Testing {} against {} opponents over {} games",
        name,
        opponents.len(),
        cli.num_games
    );
    let record = evaluator
        .evaluate_flat(&mut session, &focal, &opponents, cli.num_games)
        .context("Evaluation failed")?;

    let report = TestReport {
        genome: path.display().to_string(),
        opponents: opponents.len(),
        games_scheduled: cli.num_games,
        win_rate: record.win_rate(),
        avg_score: record.avg_score(),
        avg_opponent_score: record.avg_opponent_score(),
        avg_penalty: record.avg_penalty(),
        avg_turns: record.avg_turns(),
        record: &record,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &TestReport<'_>) {
    let record = report.record;
    println!("\n=== Test Results: {} ===", report.genome);
    println!("Opponents:       {}", report.opponents);
    println!(
        "Games:           {} completed, {} failed",
        record.games, record.failed_matches
    );
    println!("Wins:            {} ({:.1}%)", record.wins, report.win_rate * 100.0);
    println!("Avg score:       {:.1} (opponents {:.1})", report.avg_score, report.avg_opponent_score);
    println!("Avg penalty:     {:.2}", report.avg_penalty);
    println!("Avg turns:       {:.1}", report.avg_turns);
    println!("Fitness:         {:.3}", record.fitness);
}
