//! Training command - generation loop around an external optimizer
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_optimizer(), evaluate_generation(), save_results()
//! - Level 3: Optimizer implementations, checkpoint writers
//! - Level 4: genome file I/O, formatting utilities

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use tycoon_tournament::{
    AgentId, AgentIdentity, EvalSession, FitnessRecord, GenerationSummary, TournamentEvaluator,
};

use crate::config::HarnessConfig;
use crate::Cli;

/// Genome file extension inside population directories
const GENOME_EXT: &str = "genome";

/// Agent ids for baseline opponents start here, clear of any population
const BASELINE_ID_BASE: AgentId = 1_000_000;

/// Per-generation records keyed by agent id
type Records = BTreeMap<AgentId, FitnessRecord>;

// ============================================================================
// OPTIMIZER SEAM (Level 3)
// ============================================================================

/// One genome offered for evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: AgentId,
    pub name: String,
    pub genome: Vec<u8>,
}

/// Ask/tell interface to whatever evolves the genomes
pub trait Optimizer {
    /// Candidates to evaluate this generation
    fn ask(&mut self, generation: u32) -> Result<Vec<Candidate>>;

    /// Report fitness for the candidates returned by the last `ask`
    fn tell(&mut self, generation: u32, fitness: &[(AgentId, f64)]) -> Result<()>;
}

/// Fixed population directory, re-evaluated every generation
pub struct StaticPopulation {
    candidates: Vec<Candidate>,
}

impl StaticPopulation {
    pub fn load(dir: &Path) -> Result<Self> {
        let candidates = load_genomes(dir)?;
        if candidates.is_empty() {
            anyhow::bail!("No .{} files found in {}", GENOME_EXT, dir.display());
        }
        tracing::info!("Loaded {} genomes from {}", candidates.len(), dir.display());
        Ok(Self { candidates })
    }
}

impl Optimizer for StaticPopulation {
    fn ask(&mut self, _generation: u32) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }

    fn tell(&mut self, generation: u32, fitness: &[(AgentId, f64)]) -> Result<()> {
        tracing::debug!(generation, evaluated = fitness.len(), "static population, nothing to update");
        Ok(())
    }
}

/// External optimizer process driven through a population directory
///
/// `<cmd> ask <gen> <dir>` must leave `*.genome` files in `<dir>`;
/// `<cmd> tell <gen> <fitness.json>` receives a `{name: fitness}` map.
pub struct CommandOptimizer {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    asked: Vec<Candidate>,
}

impl CommandOptimizer {
    pub fn new(command: &str, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .context("Optimizer command is empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
            work_dir: work_dir.into(),
            asked: Vec::new(),
        })
    }

    fn generation_dir(&self, generation: u32) -> PathBuf {
        self.work_dir.join(format!("gen-{generation}"))
    }

    fn invoke(&self, verb: &str, generation: u32, target: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(verb)
            .arg(generation.to_string())
            .arg(target)
            .status()
            .with_context(|| format!("Failed to launch optimizer {}", self.program))?;
        if !status.success() {
            anyhow::bail!("Optimizer `{} {}` exited with {}", self.program, verb, status);
        }
        Ok(())
    }
}

impl Optimizer for CommandOptimizer {
    fn ask(&mut self, generation: u32) -> Result<Vec<Candidate>> {
        let dir = self.generation_dir(generation);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create population directory {}", dir.display()))?;
        self.invoke("ask", generation, &dir)?;

        let candidates = load_genomes(&dir)?;
        if candidates.is_empty() {
            anyhow::bail!("Optimizer produced no genomes in {}", dir.display());
        }
        self.asked = candidates.clone();
        Ok(candidates)
    }

    fn tell(&mut self, generation: u32, fitness: &[(AgentId, f64)]) -> Result<()> {
        let by_name: serde_json::Map<String, serde_json::Value> = fitness
            .iter()
            .filter_map(|(id, f)| {
                self.asked
                    .iter()
                    .find(|c| c.id == *id)
                    .map(|c| (c.name.clone(), serde_json::json!(f)))
            })
            .collect();

        let path = self.generation_dir(generation).join("fitness.json");
        std::fs::write(&path, serde_json::to_string_pretty(&by_name)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.invoke("tell", generation, &path)
    }
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Best genome seen so far
#[derive(Clone, Debug)]
struct Champion {
    name: String,
    genome: Vec<u8>,
    fitness: f64,
    generation: u32,
}

/// Run the training loop
///
/// 1. Build the optimizer and evaluator
/// 2. For each generation: ask, evaluate, tell, record, checkpoint
/// 3. Save the best genome
pub fn run(cli: &Cli, config: &HarnessConfig) -> Result<()> {
    let mut optimizer = build_optimizer(cli)?;
    let evaluator = TournamentEvaluator::new(config.eval_config(cli.parallel))
        .context("Failed to build match worker pool")?;
    let mut session = EvalSession::new(cli.seed.unwrap_or(42));
    let opponents = baseline_opponents(config, cli.opponents);

    std::fs::create_dir_all(&cli.output).context("Failed to create output directory")?;
    let history = cli.output.join("fitness_history.csv");
    start_history(&history)?;

    tracing::info!(
        "Starting training: gen={}, games={}, mode={}, parallel={}",
        cli.generations,
        cli.num_games,
        if cli.tournament { "tournament" } else { "flat" },
        cli.parallel
    );

    let progress = progress_bar(cli.generations as u64, cli.json)?;
    let mut champion: Option<Champion> = None;
    let mut summaries = Vec::new();

    for _ in 0..cli.generations {
        let generation = session.begin_generation();
        let candidates = optimizer.ask(generation)?;
        let agents = to_agents(&candidates, config);

        let (records, summary) =
            evaluate_generation(&evaluator, &mut session, cli, &agents, &opponents)?;
        let fitness: Vec<(AgentId, f64)> = candidates
            .iter()
            .map(|c| (c.id, records.get(&c.id).map_or(0.0, |r| r.fitness)))
            .collect();
        optimizer.tell(generation, &fitness)?;

        update_champion(&mut champion, &candidates, &fitness, generation);
        append_history(&history, &summary)?;

        if config.checkpoint_interval > 0 && generation % config.checkpoint_interval == 0 {
            write_checkpoint(&cli.checkpoint, &session, &candidates, &records, &summary, champion.as_ref())?;
        }

        progress.set_message(format!("best {:.1}", summary.max));
        progress.inc(1);
        summaries.push(summary);
    }
    progress.finish_and_clear();

    save_results(cli, champion.as_ref(), &summaries)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn build_optimizer(cli: &Cli) -> Result<Box<dyn Optimizer>> {
    match (&cli.optimizer, &cli.population) {
        (Some(command), _) => {
            let work_dir = cli.output.join("population");
            Ok(Box::new(CommandOptimizer::new(command, work_dir)?))
        }
        (None, Some(dir)) => Ok(Box::new(StaticPopulation::load(dir)?)),
        (None, None) => anyhow::bail!("Training needs --population DIR or --optimizer CMD"),
    }
}

/// Evaluate one generation, tournament or flat
fn evaluate_generation(
    evaluator: &TournamentEvaluator,
    session: &mut EvalSession,
    cli: &Cli,
    agents: &[AgentIdentity],
    opponents: &[AgentIdentity],
) -> Result<(Records, GenerationSummary)> {
    if cli.tournament {
        let report = evaluator
            .evaluate_batch(session, agents, cli.group_size, cli.num_games)
            .context("Tournament evaluation failed")?;
        let records = agents
            .iter()
            .filter_map(|a| report.records.get(&a.id).map(|r| (a.id, r.clone())))
            .collect();
        return Ok((records, report.summary));
    }

    let mut records = Records::new();
    let mut valid = 0usize;
    let mut failed = 0usize;
    for agent in agents {
        let record = evaluator
            .evaluate_flat(session, agent, opponents, cli.num_games)
            .with_context(|| format!("Flat evaluation of {} failed", agent.name))?;
        valid += record.games as usize;
        failed += record.failed_matches as usize;
        records.insert(agent.id, record);
    }

    let summary = GenerationSummary::from_fitness(
        session.generation(),
        agents.iter().filter_map(|a| records.get(&a.id)).map(|r| r.fitness),
        valid,
        failed,
    );
    summary.log();
    Ok((records, summary))
}

/// Write the best genome and report
fn save_results(cli: &Cli, champion: Option<&Champion>, summaries: &[GenerationSummary]) -> Result<()> {
    if let Some(best) = champion {
        let path = cli.output.join("best_genome.bin");
        std::fs::write(&path, &best.genome).context("Failed to write best genome")?;
        tracing::info!("Saved best genome {} to {}", best.name, path.display());
    }

    if cli.json {
        print_json_results(champion, summaries)?;
    } else {
        print_summary(champion, summaries, &cli.output);
    }
    Ok(())
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

fn to_agents(candidates: &[Candidate], config: &HarnessConfig) -> Vec<AgentIdentity> {
    candidates
        .iter()
        .map(|c| {
            AgentIdentity::learned(
                c.id,
                c.name.clone(),
                &config.learned_adapter,
                c.genome.clone(),
                &config.policy_config,
            )
        })
        .collect()
}

pub fn baseline_opponents(config: &HarnessConfig, count: usize) -> Vec<AgentIdentity> {
    (0..count)
        .map(|i| {
            AgentIdentity::scripted(
                BASELINE_ID_BASE + i as AgentId,
                format!("Opponent{}", i + 1),
                &config.baseline_adapter,
            )
        })
        .collect()
}

fn update_champion(
    champion: &mut Option<Champion>,
    candidates: &[Candidate],
    fitness: &[(AgentId, f64)],
    generation: u32,
) {
    for (candidate, &(_, f)) in candidates.iter().zip(fitness) {
        let better = champion.as_ref().map_or(true, |c| f > c.fitness);
        if better {
            *champion = Some(Champion {
                name: candidate.name.clone(),
                genome: candidate.genome.clone(),
                fitness: f,
                generation,
            });
        }
    }
}

#[derive(Serialize)]
struct CheckpointMeta<'a> {
    generation: u32,
    timestamp: chrono::DateTime<chrono::Utc>,
    seed: u64,
    summary: &'a GenerationSummary,
    best_name: Option<&'a str>,
    best_fitness: Option<f64>,
}

fn write_checkpoint(
    root: &Path,
    session: &EvalSession,
    candidates: &[Candidate],
    records: &Records,
    summary: &GenerationSummary,
    champion: Option<&Champion>,
) -> Result<()> {
    let dir = root.join(format!("gen-{}", session.generation()));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create checkpoint directory {}", dir.display()))?;

    for candidate in candidates {
        let path = dir.join(format!("{}.{}", candidate.name, GENOME_EXT));
        std::fs::write(&path, &candidate.genome)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let fitness: serde_json::Map<String, serde_json::Value> = candidates
        .iter()
        .filter_map(|c| {
            let record = records.get(&c.id)?;
            serde_json::to_value(record).ok().map(|v| (c.name.clone(), v))
        })
        .collect();
    std::fs::write(dir.join("fitness.json"), serde_json::to_string_pretty(&fitness)?)
        .context("Failed to write checkpoint fitness")?;

    let meta = CheckpointMeta {
        generation: session.generation(),
        timestamp: chrono::Utc::now(),
        seed: session.seed(),
        summary,
        best_name: champion.map(|c| c.name.as_str()),
        best_fitness: champion.map(|c| c.fitness),
    };
    std::fs::write(dir.join("metadata.json"), serde_json::to_string_pretty(&meta)?)
        .context("Failed to write checkpoint metadata")?;

    tracing::info!("Checkpoint saved to {}", dir.display());
    Ok(())
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

/// Read every `*.genome` file in a directory, sorted by file name
pub fn load_genomes(dir: &Path) -> Result<Vec<Candidate>> {
    if !dir.is_dir() {
        anyhow::bail!("Population directory does not exist: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read population directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == GENOME_EXT))
        .collect();
    paths.sort();

    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let genome = std::fs::read(path)
                .with_context(|| format!("Failed to read genome {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("genome-{i}"));
            Ok(Candidate {
                id: i as AgentId,
                name,
                genome,
            })
        })
        .collect()
}

fn start_history(path: &Path) -> Result<()> {
    std::fs::write(path, "generation,max_fitness,mean_fitness,min_fitness,valid_matches,failed_matches\n")
        .context("Failed to write fitness history")
}

fn append_history(path: &Path, summary: &GenerationSummary) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .context("Failed to open fitness history")?;
    writeln!(
        file,
        "{},{:.4},{:.4},{:.4},{},{}",
        summary.generation,
        summary.max,
        summary.mean,
        summary.min,
        summary.valid_matches,
        summary.failed_matches
    )
    .context("Failed to append fitness history")
}

fn progress_bar(len: u64, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} gen {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    Ok(bar)
}

fn print_json_results(champion: Option<&Champion>, summaries: &[GenerationSummary]) -> Result<()> {
    #[derive(Serialize)]
    struct JsonOutput<'a> {
        generations_run: usize,
        best_name: Option<&'a str>,
        best_fitness: Option<f64>,
        best_generation: Option<u32>,
        history: &'a [GenerationSummary],
    }

    let output = JsonOutput {
        generations_run: summaries.len(),
        best_name: champion.map(|c| c.name.as_str()),
        best_fitness: champion.map(|c| c.fitness),
        best_generation: champion.map(|c| c.generation),
        history: summaries,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_summary(champion: Option<&Champion>, summaries: &[GenerationSummary], output: &Path) {
    println!("\n=== Training Complete ===");
    println!("Generations: {}", summaries.len());
    if let Some(last) = summaries.last() {
        println!("Final max/mean/min: {:.2} / {:.2} / {:.2}", last.max, last.mean, last.min);
    }
    if let Some(best) = champion {
        println!("Best genome: {} (fitness {:.2}, generation {})", best.name, best.fitness, best.generation);
    }
    println!("Output directory: {}", output.display());
}
