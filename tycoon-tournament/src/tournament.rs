//! Tournament evaluation - grouped and flat batch formats
//!
//! Level 1 - Orchestration and Level 2 - Phases
//!
//! Matches are scheduled into an explicit task queue, executed on a bounded
//! rayon pool (or sequentially), and reduced single-threaded in task order.

use std::sync::Arc;

use rand::prelude::*;
use rayon::prelude::*;
use rayon::ThreadPool;
use rustc_hash::FxHashMap;

use crate::agent::{AgentId, AgentIdentity};
use crate::config::EvalConfig;
use crate::error::TournamentError;
use crate::fitness::{FitnessRecord, GenerationSummary};
use crate::match_runner::{MatchResult, MatchRunner};
use crate::session::EvalSession;

/// One scheduled engine run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTask {
    pub group: usize,
    pub match_index: usize,
    pub match_id: u64,
    pub seed: u64,
}

/// A seat in a group: which agent, and whether its result counts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seat {
    /// Index into the evaluated agent slice
    pub agent: usize,
    /// False for padding seats
    pub recorded: bool,
}

/// Agents that play their matches together
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub seats: Vec<Seat>,
    /// Rotate seating between matches so nobody keeps the same slot
    pub rotate: bool,
}

impl Group {
    /// Seat order for the `match_index`-th match of this group
    pub fn seating(&self, match_index: usize) -> Vec<Seat> {
        let mut seats = self.seats.clone();
        if self.rotate && !seats.is_empty() {
            let shift = match_index % seats.len();
            seats.rotate_left(shift);
        }
        seats
    }

    pub fn recorded(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter().filter(|s| s.recorded)
    }
}

/// Records for every evaluated agent plus the batch roll-up
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub records: FxHashMap<AgentId, FitnessRecord>,
    pub summary: GenerationSummary,
}

/// Runs batches of matches and turns them into fitness
#[derive(Clone, Debug)]
pub struct TournamentEvaluator {
    config: EvalConfig,
    runner: MatchRunner,
    /// Shared by every batch; `None` in sequential mode
    pool: Option<Arc<ThreadPool>>,
}

// ============================================================================
// Level 1 - Orchestration
// ============================================================================

impl TournamentEvaluator {
    pub fn new(config: EvalConfig) -> Result<Self, TournamentError> {
        let runner = MatchRunner::new(config.match_config.clone());
        let pool = if config.parallel {
            let threads = config.worker_threads();
            tracing::debug!(threads, "Building match worker pool");
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("match-worker-{i}"))
                .build()?;
            Some(Arc::new(pool))
        } else {
            None
        };
        Ok(Self { config, runner, pool })
    }

    /// Worker threads serving this evaluator (0 when sequential)
    pub fn worker_threads(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.current_num_threads())
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Grouped tournament (Level 1 orchestration)
    ///
    /// Agents are shuffled and split into groups of `group_size`; a short
    /// last group is padded with agents resampled from earlier groups. Each
    /// group plays `matches_per_group` matches. Only genuine members are
    /// recorded, so the report has exactly one record per agent.
    pub fn evaluate_batch(
        &self,
        session: &mut EvalSession,
        agents: &[AgentIdentity],
        group_size: usize,
        matches_per_group: usize,
    ) -> Result<BatchReport, TournamentError> {
        if group_size == 0 {
            return Err(TournamentError::InvalidGroupSize(group_size));
        }
        if agents.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut order: Vec<usize> = (0..agents.len()).collect();
        order.shuffle(session.rng());
        let groups = form_groups(&order, group_size, session.rng());
        let tasks = schedule(session, groups.len(), matches_per_group);

        tracing::info!(
            generation = session.generation(),
            agents = agents.len(),
            groups = groups.len(),
            matches = tasks.len(),
            "Evaluating batch"
        );

        let results = self.run_tasks(agents, &groups, &tasks);
        let report = self.aggregate(session.generation(), agents, &groups, &tasks, results);
        report.summary.log();
        Ok(report)
    }

    /// Flat evaluation: `focal` in slot 0 against a fixed opponent line-up
    ///
    /// Only the focal agent is recorded.
    pub fn evaluate_flat(
        &self,
        session: &mut EvalSession,
        focal: &AgentIdentity,
        opponents: &[AgentIdentity],
        matches: usize,
    ) -> Result<FitnessRecord, TournamentError> {
        let mut agents = Vec::with_capacity(opponents.len() + 1);
        agents.push(focal.clone());
        agents.extend_from_slice(opponents);

        let mut seats = vec![Seat { agent: 0, recorded: true }];
        seats.extend((1..agents.len()).map(|agent| Seat { agent, recorded: false }));
        let groups = vec![Group { seats, rotate: false }];

        let tasks = schedule(session, 1, matches);
        let results = self.run_tasks(&agents, &groups, &tasks);
        let mut report = self.aggregate(session.generation(), &agents, &groups, &tasks, results);

        Ok(report.records.remove(&focal.id).unwrap_or_default())
    }

    // ========================================================================
    // Level 2 - Phases
    // ========================================================================

    /// Execute the queue; results come back in task order
    fn run_tasks(
        &self,
        agents: &[AgentIdentity],
        groups: &[Group],
        tasks: &[MatchTask],
    ) -> Vec<MatchResult> {
        let run = |task: &MatchTask| {
            let seated: Vec<AgentIdentity> = groups[task.group]
                .seating(task.match_index)
                .iter()
                .map(|seat| agents[seat.agent].clone())
                .collect();
            self.runner.run_match(&seated, task.match_id, task.seed)
        };

        match &self.pool {
            Some(pool) => pool.install(|| tasks.par_iter().map(run).collect()),
            None => tasks.iter().map(run).collect(),
        }
    }

    /// Single-threaded reduction of match results into records
    fn aggregate(
        &self,
        generation: u32,
        agents: &[AgentIdentity],
        groups: &[Group],
        tasks: &[MatchTask],
        results: Vec<MatchResult>,
    ) -> BatchReport {
        let mut records: FxHashMap<AgentId, FitnessRecord> = FxHashMap::default();
        for seat in groups.iter().flat_map(|g| g.recorded()) {
            records.entry(agents[seat.agent].id).or_default();
        }

        let mut valid = 0usize;
        let mut failed = 0usize;
        for (task, result) in tasks.iter().zip(&results) {
            let seating = groups[task.group].seating(task.match_index);
            let recorded = seating
                .iter()
                .enumerate()
                .filter(|(_, seat)| seat.recorded);

            if result.is_valid() {
                valid += 1;
                for (slot, seat) in recorded {
                    if let Some(record) = records.get_mut(&agents[seat.agent].id) {
                        record.record_match(result, slot);
                    }
                }
            } else {
                failed += 1;
                tracing::warn!(match_id = result.match_id, status = ?result.status, "Match failed");
                for (_, seat) in recorded {
                    if let Some(record) = records.get_mut(&agents[seat.agent].id) {
                        record.record_failure();
                    }
                }
            }
        }

        for record in records.values_mut() {
            record.finalize(&self.config.weights);
        }

        // Summarize in group order so the float sums do not depend on hashing
        let fitness: Vec<f64> = groups
            .iter()
            .flat_map(|g| g.recorded())
            .filter_map(|seat| records.get(&agents[seat.agent].id))
            .map(|r| r.fitness)
            .collect();
        let summary = GenerationSummary::from_fitness(generation, fitness, valid, failed);

        BatchReport { records, summary }
    }
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// Split a shuffled order into groups of `group_size`, padding the last one
pub fn form_groups<R: Rng + ?Sized>(order: &[usize], group_size: usize, rng: &mut R) -> Vec<Group> {
    if group_size == 0 {
        return Vec::new();
    }

    let mut groups = Vec::with_capacity(order.len().div_ceil(group_size));
    for (i, chunk) in order.chunks(group_size).enumerate() {
        let mut seats: Vec<Seat> = chunk
            .iter()
            .map(|&agent| Seat { agent, recorded: true })
            .collect();

        let missing = group_size - chunk.len();
        if missing > 0 {
            let start = i * group_size;
            if start >= missing {
                // Distinct agents from the groups already formed
                let extra = order[..start].choose_multiple(rng, missing);
                seats.extend(extra.map(|&agent| Seat { agent, recorded: false }));
            } else {
                // Population smaller than one group: repeat members
                for _ in 0..missing {
                    if let Some(&agent) = order.choose(rng) {
                        seats.push(Seat { agent, recorded: false });
                    }
                }
            }
        }

        groups.push(Group { seats, rotate: true });
    }
    groups
}

/// Task queue: `matches_per_group` tasks per group with fresh ids and seeds
fn schedule(session: &mut EvalSession, groups: usize, matches_per_group: usize) -> Vec<MatchTask> {
    let ids = session.allocate_match_ids(groups * matches_per_group);
    let mut tasks = Vec::with_capacity(groups * matches_per_group);
    for (n, match_id) in ids.enumerate() {
        tasks.push(MatchTask {
            group: n / matches_per_group,
            match_index: n % matches_per_group,
            match_id,
            seed: session.next_seed(),
        });
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use rand_chacha::ChaCha8Rng;

    fn population(n: u32) -> Vec<AgentIdentity> {
        (0..n)
            .map(|i| AgentIdentity::learned(i, format!("g{i}"), "learned.so", vec![i as u8; 8], "policy.cfg"))
            .collect()
    }

    fn missing_engine(scratch: &std::path::Path) -> EvalConfig {
        EvalConfig::new(
            MatchConfig::new(scratch.join("missing-engine")).with_scratch_dir(scratch),
        )
        .with_parallel(false)
    }

    #[test]
    fn test_form_groups_pads_last_group() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let order: Vec<usize> = (0..10).collect();
        let groups = form_groups(&order, 4, &mut rng);

        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.seats.len() == 4));

        let recorded: Vec<usize> = groups.iter().flat_map(|g| g.recorded()).map(|s| s.agent).collect();
        assert_eq!(recorded.len(), 10);
        let mut sorted = recorded.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10);

        let last = &groups[2];
        let pads: Vec<usize> = last.seats.iter().filter(|s| !s.recorded).map(|s| s.agent).collect();
        assert_eq!(pads.len(), 2);
        assert_ne!(pads[0], pads[1]);
        assert!(pads.iter().all(|p| !last.recorded().any(|s| s.agent == *p)));
    }

    #[test]
    fn test_form_groups_small_population() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let groups = form_groups(&[0, 1], 4, &mut rng);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].seats.len(), 4);
        assert_eq!(groups[0].recorded().count(), 2);
    }

    #[test]
    fn test_seating_rotates() {
        let group = Group {
            seats: (0..3).map(|agent| Seat { agent, recorded: true }).collect(),
            rotate: true,
        };
        let agents = |m| group.seating(m).iter().map(|s| s.agent).collect::<Vec<_>>();
        assert_eq!(agents(0), vec![0, 1, 2]);
        assert_eq!(agents(1), vec![1, 2, 0]);
        assert_eq!(agents(3), vec![0, 1, 2]);
    }

    #[test]
    fn test_schedule_assigns_unique_ids() {
        let mut session = EvalSession::new(3);
        let tasks = schedule(&mut session, 3, 2);
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[3].group, 1);
        assert_eq!(tasks[3].match_index, 1);
        let ids: Vec<u64> = tasks.iter().map(|t| t.match_id).collect();
        assert_eq!(ids, (0..6).collect::<Vec<_>>());

        let next = schedule(&mut session, 1, 1);
        assert_eq!(next[0].match_id, 6);
    }

    #[test]
    fn test_batch_gives_one_record_per_agent() {
        let scratch = tempfile::tempdir().unwrap();
        let evaluator = TournamentEvaluator::new(missing_engine(scratch.path())).unwrap();
        let mut session = EvalSession::new(11);
        session.begin_generation();

        let report = evaluator.evaluate_batch(&mut session, &population(10), 4, 3).unwrap();
        assert_eq!(report.records.len(), 10);
        for record in report.records.values() {
            assert_eq!(record.scheduled(), 3);
            assert_eq!(record.games, 0);
            assert_eq!(record.fitness, 0.0);
        }
        assert_eq!(report.summary.generation, 1);
        assert_eq!(report.summary.valid_matches, 0);
        assert_eq!(report.summary.failed_matches, 9);
    }

    #[test]
    fn test_batch_rejects_zero_group_size() {
        let evaluator = TournamentEvaluator::new(EvalConfig::default()).unwrap();
        let mut session = EvalSession::default();
        let err = evaluator.evaluate_batch(&mut session, &population(3), 0, 1);
        assert!(matches!(err, Err(TournamentError::InvalidGroupSize(0))));
    }

    #[test]
    fn test_empty_population() {
        let evaluator = TournamentEvaluator::new(EvalConfig::default()).unwrap();
        let mut session = EvalSession::default();
        let report = evaluator.evaluate_batch(&mut session, &[], 4, 10).unwrap();
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_pool_built_once_and_shared() {
        let sequential = TournamentEvaluator::new(EvalConfig::default().with_parallel(false)).unwrap();
        assert_eq!(sequential.worker_threads(), 0);

        let config = EvalConfig::default().with_parallel(true);
        let expected = config.worker_threads();
        let evaluator = TournamentEvaluator::new(config).unwrap();
        assert_eq!(evaluator.worker_threads(), expected);

        let copy = evaluator.clone();
        match (&evaluator.pool, &copy.pool) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("parallel evaluator has no pool"),
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        /// Engine where slot 0 always wins with 100 points to 50
        fn slot_zero_engine(dir: &std::path::Path) -> std::path::PathBuf {
            let path = dir.join("engine.sh");
            std::fs::write(
                &path,
                "#!/bin/sh\necho '{\"winner\": 0, \"turns\": 40, \"player_scores\": [100, 50, 50]}'\n",
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn config(dir: &std::path::Path, parallel: bool) -> EvalConfig {
            EvalConfig::new(
                MatchConfig::new(slot_zero_engine(dir))
                    .with_scratch_dir(dir.join("scratch"))
                    .with_timeout(Duration::from_secs(10))
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .with_parallel(parallel)
        }

        #[test]
        fn test_flat_focal_always_slot_zero() {
            let dir = tempfile::tempdir().unwrap();
            let evaluator = TournamentEvaluator::new(config(dir.path(), true)).unwrap();
            let mut session = EvalSession::new(1);

            let focal = AgentIdentity::learned(7, "focal", "learned.so", vec![1u8], "policy.cfg");
            let opponents = vec![
                AgentIdentity::scripted(100, "base-1", "baseline.so"),
                AgentIdentity::scripted(101, "base-2", "baseline.so"),
            ];

            let record = evaluator.evaluate_flat(&mut session, &focal, &opponents, 4).unwrap();
            assert_eq!(record.games, 4);
            assert_eq!(record.wins, 4);
            // 1.0 * 1000 + (100 - 50) / 10
            assert!((record.fitness - 1005.0).abs() < 1e-9);
        }

        /// Engine whose duration, winner, scores and penalties vary per match
        ///
        /// Earlier match ids sleep longer, so parallel runs finish out of order.
        fn varied_engine(dir: &std::path::Path) -> std::path::PathBuf {
            let path = dir.join("varied.sh");
            let body = r#"#!/bin/sh
id=$1
s=1${2#"${2%???}"}
sleep 0.0$(( 9 - id % 10 ))
echo "{\"winner\": $(( s % 5 - 1 )), \"turns\": $(( id + 10 )), \"player_scores\": [$(( s % 97 )), $(( s % 89 )), $(( s % 83 )), $(( s % 79 ))], \"penalties\": [$(( s % 3 )), 0, $(( id % 2 )), 1]}"
"#;
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_parallel_matches_sequential_report() {
            let dir = tempfile::tempdir().unwrap();
            let engine = varied_engine(dir.path());
            let evaluate = |parallel: bool| {
                let config = EvalConfig::new(
                    MatchConfig::new(&engine)
                        .with_scratch_dir(dir.path().join("scratch"))
                        .with_timeout(Duration::from_secs(10))
                        .with_poll_interval(Duration::from_millis(2)),
                )
                .with_parallel(parallel)
                .with_parallel_fraction(1.0);
                let evaluator = TournamentEvaluator::new(config).unwrap();
                let mut session = EvalSession::new(9);
                session.begin_generation();
                evaluator.evaluate_batch(&mut session, &population(10), 4, 5).unwrap()
            };

            let sequential = evaluate(false);
            let parallel = evaluate(true);

            assert_eq!(sequential.summary.valid_matches, 15);
            assert_eq!(sequential.summary.failed_matches, 0);
            assert_eq!(sequential.records.len(), 10);
            assert_eq!(parallel.records, sequential.records);
            assert_eq!(parallel.summary, sequential.summary);
        }

        #[test]
        fn test_batch_wins_match_seat_zero() {
            let dir = tempfile::tempdir().unwrap();
            let evaluator = TournamentEvaluator::new(config(dir.path(), false)).unwrap();
            let mut session = EvalSession::new(2);

            // Three agents in one group of three: every match has one recorded winner
            let report = evaluator.evaluate_batch(&mut session, &population(3), 3, 6).unwrap();
            let wins: u32 = report.records.values().map(|r| r.wins).sum();
            assert_eq!(wins, 6);
            // Rotation spreads seat zero evenly
            assert!(report.records.values().all(|r| r.wins == 2 && r.games == 6));
            assert_eq!(report.summary.valid_matches, 6);
        }
    }
}
