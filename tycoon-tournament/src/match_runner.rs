//! Match runner - one engine process per match
//!
//! Level 3 - Step-level implementation
//!
//! Every per-match artifact (agent configs, genome blobs, captured stdout)
//! lives in a `tempfile` guard, so the scratch directory is left clean on
//! every exit path: success, engine failure, timeout or panic.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::agent::AgentIdentity;
use crate::config::MatchConfig;
use crate::error::TournamentError;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// How a match ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStatus {
    Completed { exit_code: i32 },
    TimedOut,
    Failed { reason: String },
    Unparsable,
}

/// Outcome of a single match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: u64,
    /// Winning seat; `-1` on the wire for none
    #[serde(with = "winner_sentinel")]
    pub winner: Option<usize>,
    pub turns: u32,
    /// One entry per seat
    pub scores: Vec<f64>,
    /// One entry per seat
    pub penalties: Vec<f64>,
    pub status: MatchStatus,
}

impl MatchResult {
    /// No-winner sentinel for a match that did not complete
    pub fn failed(match_id: u64, seats: usize, status: MatchStatus) -> Self {
        Self {
            match_id,
            winner: None,
            turns: 0,
            scores: vec![0.0; seats],
            penalties: vec![0.0; seats],
            status,
        }
    }

    /// Only completed matches count towards fitness
    pub fn is_valid(&self) -> bool {
        matches!(self.status, MatchStatus::Completed { .. })
    }

    pub fn score(&self, slot: usize) -> f64 {
        self.scores.get(slot).copied().unwrap_or(0.0)
    }

    pub fn penalty(&self, slot: usize) -> f64 {
        self.penalties.get(slot).copied().unwrap_or(0.0)
    }

    /// Mean score of every seat except `slot` (zero when alone)
    pub fn mean_opponent_score(&self, slot: usize) -> f64 {
        let others: Vec<f64> = self
            .scores
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != slot)
            .map(|(_, s)| *s)
            .collect();
        if others.is_empty() {
            0.0
        } else {
            others.iter().sum::<f64>() / others.len() as f64
        }
    }
}

mod winner_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(winner: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        match winner {
            Some(w) => s.serialize_i64(*w as i64),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(d)?;
        Ok(usize::try_from(raw).ok())
    }
}

// ============================================================================
// RESULT LINE PARSING
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPenalties {
    List(Vec<f64>),
    /// Keyed by seat index as a string
    Map(BTreeMap<String, f64>),
}

#[derive(Deserialize)]
struct RawResult {
    winner: i64,
    #[serde(default)]
    turns: Option<u32>,
    #[serde(default)]
    player_scores: Vec<f64>,
    #[serde(default)]
    penalties: Option<RawPenalties>,
}

/// Parsed and normalized engine result
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedResult {
    pub winner: Option<usize>,
    pub turns: u32,
    pub scores: Vec<f64>,
    pub penalties: Vec<f64>,
}

/// Find and parse the engine's result line
///
/// The result is the first stdout line starting with `{` that mentions
/// `"winner"`. Score and penalty lists are resized to `seats`; a winner
/// outside `[0, seats)` becomes no winner.
pub fn parse_result_line(stdout: &str, seats: usize) -> Option<ParsedResult> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with('{') && l.contains("\"winner\""))?;
    let raw: RawResult = serde_json::from_str(line).ok()?;

    let winner = usize::try_from(raw.winner).ok().filter(|&w| w < seats);

    let mut scores = raw.player_scores;
    scores.resize(seats, 0.0);

    let mut penalties = vec![0.0; seats];
    match raw.penalties {
        Some(RawPenalties::List(list)) => {
            for (slot, value) in list.into_iter().take(seats).enumerate() {
                penalties[slot] = value;
            }
        }
        Some(RawPenalties::Map(map)) => {
            for (key, value) in map {
                if let Some(slot) = key.trim().parse::<usize>().ok().filter(|&s| s < seats) {
                    penalties[slot] = value;
                }
            }
        }
        None => {}
    }

    Some(ParsedResult {
        winner,
        turns: raw.turns.unwrap_or(0),
        scores,
        penalties,
    })
}

// ============================================================================
// MATCH RUNNER
// ============================================================================

/// Launches and supervises engine processes
#[derive(Clone, Debug)]
pub struct MatchRunner {
    config: MatchConfig,
}

/// Scratch files backing one seat; removed on drop
struct SeatArtifacts {
    config: NamedTempFile,
    _genome: Option<NamedTempFile>,
}

impl MatchRunner {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Play one match. Never fails: problems come back as a no-winner result.
    pub fn run_match(&self, agents: &[AgentIdentity], match_id: u64, seed: u64) -> MatchResult {
        match self.try_run_match(agents, match_id, seed) {
            Ok(result) => result,
            Err(e) => MatchResult::failed(
                match_id,
                agents.len(),
                MatchStatus::Failed { reason: e.to_string() },
            ),
        }
    }

    fn try_run_match(
        &self,
        agents: &[AgentIdentity],
        match_id: u64,
        seed: u64,
    ) -> Result<MatchResult, TournamentError> {
        let scratch = self.config.scratch_dir();
        std::fs::create_dir_all(&scratch)?;

        let seats = agents
            .iter()
            .enumerate()
            .map(|(slot, agent)| write_seat(&scratch, match_id, slot, agent))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stdout = tempfile::Builder::new()
            .prefix(&format!("match-{match_id}-stdout-"))
            .suffix(".log")
            .tempfile_in(&scratch)?;

        let mut command = Command::new(&self.config.engine_path);
        command
            .arg(match_id.to_string())
            .arg(seed.to_string())
            .arg(self.config.max_turns.to_string());
        for (agent, seat) in agents.iter().zip(&seats) {
            command
                .arg("--agent")
                .arg(&agent.adapter_path)
                .arg(seat.config.path())
                .arg(&agent.name);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.reopen()?))
            .stderr(Stdio::null());

        tracing::debug!(match_id, seed, seats = agents.len(), "spawning engine");
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(MatchResult::failed(
                    match_id,
                    agents.len(),
                    MatchStatus::Failed { reason: format!("spawn failed: {e}") },
                ))
            }
        };

        let status = match self.wait_with_timeout(child)? {
            Some(status) => status,
            None => return Ok(MatchResult::failed(match_id, agents.len(), MatchStatus::TimedOut)),
        };

        let exit_code = match status.code() {
            Some(0) => 0,
            Some(code) => {
                return Ok(MatchResult::failed(
                    match_id,
                    agents.len(),
                    MatchStatus::Failed { reason: format!("engine exited with code {code}") },
                ))
            }
            None => {
                return Ok(MatchResult::failed(
                    match_id,
                    agents.len(),
                    MatchStatus::Failed { reason: "engine terminated by signal".to_string() },
                ))
            }
        };

        let output = read_all(stdout.as_file_mut())?;
        let result = match parse_result_line(&output, agents.len()) {
            Some(parsed) => MatchResult {
                match_id,
                winner: parsed.winner,
                turns: parsed.turns,
                scores: parsed.scores,
                penalties: parsed.penalties,
                status: MatchStatus::Completed { exit_code },
            },
            None => MatchResult::failed(match_id, agents.len(), MatchStatus::Unparsable),
        };

        drop(seats);
        Ok(result)
    }

    /// Poll until exit or timeout; `None` means the child was killed
    fn wait_with_timeout(&self, mut child: Child) -> Result<Option<ExitStatus>, TournamentError> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) if Instant::now() >= deadline => {
                    kill_and_reap(&mut child);
                    return Ok(None);
                }
                Ok(None) => std::thread::sleep(self.config.poll_interval),
                Err(e) => {
                    kill_and_reap(&mut child);
                    return Err(e.into());
                }
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    // Both fail only if the process is already gone
    let _ = child.kill();
    let _ = child.wait();
}

fn write_seat(
    scratch: &std::path::Path,
    match_id: u64,
    slot: usize,
    agent: &AgentIdentity,
) -> Result<SeatArtifacts, TournamentError> {
    let genome = match agent.genome() {
        Some(bytes) => {
            let mut file = tempfile::Builder::new()
                .prefix(&format!("match-{match_id}-slot-{slot}-genome-"))
                .suffix(".bin")
                .tempfile_in(scratch)?;
            file.write_all(bytes)?;
            file.flush()?;
            Some(file)
        }
        None => None,
    };

    let mut config = tempfile::Builder::new()
        .prefix(&format!("match-{match_id}-slot-{slot}-config-"))
        .suffix(".json")
        .tempfile_in(scratch)?;
    let value = agent.config_json(genome.as_ref().map(|g| g.path()));
    serde_json::to_writer(&mut config, &value)?;
    config.flush()?;

    Ok(SeatArtifacts {
        config,
        _genome: genome,
    })
}

fn read_all(file: &mut File) -> Result<String, TournamentError> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
