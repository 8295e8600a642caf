//! Fitness aggregation - match statistics to one scalar per agent
//!
//! Level 3 - Step-level implementation

use serde::{Deserialize, Serialize};

use crate::config::FitnessWeights;
use crate::match_runner::MatchResult;

/// Accumulated statistics for one agent over a batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    pub wins: u32,
    /// Completed matches played
    pub games: u32,
    /// Scheduled matches that did not complete
    pub failed_matches: u32,
    pub total_score: f64,
    /// Sum over games of the mean score of the other seats
    pub total_opponent_score: f64,
    pub total_penalty: f64,
    pub total_turns: u64,
    /// Derived from the totals by [`compute_fitness`]
    pub fitness: f64,
}

impl FitnessRecord {
    /// Fold in one completed match from the point of view of `slot`
    ///
    /// A completed draw (no winner) still counts as a game.
    pub fn record_match(&mut self, result: &MatchResult, slot: usize) {
        self.games += 1;
        if result.winner == Some(slot) {
            self.wins += 1;
        }
        self.total_score += result.score(slot);
        self.total_opponent_score += result.mean_opponent_score(slot);
        self.total_penalty += result.penalty(slot);
        self.total_turns += result.turns as u64;
    }

    pub fn record_failure(&mut self) {
        self.failed_matches += 1;
    }

    /// Matches scheduled for this agent, completed or not
    pub fn scheduled(&self) -> u32 {
        self.games + self.failed_matches
    }

    pub fn win_rate(&self) -> f64 {
        self.per_game(self.wins as f64)
    }

    pub fn avg_score(&self) -> f64 {
        self.per_game(self.total_score)
    }

    pub fn avg_opponent_score(&self) -> f64 {
        self.per_game(self.total_opponent_score)
    }

    pub fn avg_penalty(&self) -> f64 {
        self.per_game(self.total_penalty)
    }

    pub fn avg_turns(&self) -> f64 {
        self.per_game(self.total_turns as f64)
    }

    /// Recompute and store the derived fitness
    pub fn finalize(&mut self, weights: &FitnessWeights) {
        self.fitness = compute_fitness(self, weights);
    }

    fn per_game(&self, total: f64) -> f64 {
        if self.games == 0 {
            0.0
        } else {
            total / self.games as f64
        }
    }
}

/// Fitness of an accumulated record
///
/// Zero games gives zero. The win term only applies once the agent has won.
pub fn compute_fitness(record: &FitnessRecord, weights: &FitnessWeights) -> f64 {
    if record.games == 0 {
        return 0.0;
    }

    let win_rate = record.win_rate();
    let win_term = if win_rate > 0.0 {
        win_rate * weights.win_weight
    } else {
        0.0
    };

    let margin = record.avg_score() - record.avg_opponent_score();
    let margin_term = if weights.score_divisor != 0.0 {
        margin / weights.score_divisor
    } else {
        0.0
    };

    win_term + margin_term - weights.penalty_weight * record.avg_penalty()
}

/// Per-generation roll-up, always logged
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u32,
    pub max: f64,
    pub mean: f64,
    pub min: f64,
    pub valid_matches: usize,
    pub failed_matches: usize,
}

impl GenerationSummary {
    pub fn from_fitness<I>(generation: u32, fitness: I, valid_matches: usize, failed_matches: usize) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for f in fitness {
            count += 1;
            sum += f;
            max = max.max(f);
            min = min.min(f);
        }

        if count == 0 {
            return Self {
                generation,
                valid_matches,
                failed_matches,
                ..Default::default()
            };
        }

        Self {
            generation,
            max,
            mean: sum / count as f64,
            min,
            valid_matches,
            failed_matches,
        }
    }

    pub fn log(&self) {
        tracing::info!(
            generation = self.generation,
            max = self.max,
            mean = self.mean,
            min = self.min,
            valid = self.valid_matches,
            failed = self.failed_matches,
            "Generation summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_runner::MatchStatus;

    fn completed(winner: Option<usize>, scores: Vec<f64>, penalties: Vec<f64>) -> MatchResult {
        MatchResult {
            match_id: 0,
            winner,
            turns: 100,
            scores,
            penalties,
            status: MatchStatus::Completed { exit_code: 0 },
        }
    }

    #[test]
    fn test_draw_counts_as_game() {
        let weights = FitnessWeights::default();
        let mut record = FitnessRecord::default();
        record.record_match(&completed(None, vec![300.0, 100.0, 200.0], vec![0.0; 3]), 0);
        record.record_match(&completed(Some(0), vec![500.0, 100.0, 100.0], vec![0.0; 3]), 0);
        record.finalize(&weights);

        assert_eq!(record.games, 2);
        assert_eq!(record.wins, 1);
        assert_eq!(record.failed_matches, 0);
        assert_eq!(record.win_rate(), 0.5);
        assert_eq!(record.avg_score(), 400.0);
        // 0.5 * 1000 + (400 - 125) / 10
        assert!((record.fitness - 527.5).abs() < 1e-9);
    }

    #[test]
    fn test_fitness_arithmetic() {
        let record = FitnessRecord {
            wins: 6,
            games: 10,
            total_score: 12_000.0,
            total_opponent_score: 9_000.0,
            ..Default::default()
        };
        let weights = FitnessWeights {
            win_weight: 1000.0,
            score_divisor: 10.0,
            penalty_weight: 0.0,
        };
        let fitness = compute_fitness(&record, &weights);
        assert!((fitness - (0.6 * 1000.0 + 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_games_is_zero() {
        let record = FitnessRecord {
            failed_matches: 10,
            ..Default::default()
        };
        assert_eq!(compute_fitness(&record, &FitnessWeights::default()), 0.0);
    }

    #[test]
    fn test_no_wins_uses_margin_and_penalty() {
        let record = FitnessRecord {
            games: 4,
            total_score: 400.0,
            total_opponent_score: 800.0,
            total_penalty: 2.0,
            ..Default::default()
        };
        // (100 - 200) / 10 - 5 * 0.5
        let fitness = compute_fitness(&record, &FitnessWeights::default());
        assert!((fitness - (-12.5)).abs() < 1e-9);
    }

    #[test]
    fn test_record_match_uses_mean_opponent_score() {
        let mut record = FitnessRecord::default();
        record.record_match(&completed(Some(1), vec![500.0, 1200.0, 700.0], vec![0.0, 0.5, 0.0]), 1);
        record.record_match(&completed(Some(0), vec![900.0, 300.0, 100.0], vec![0.0; 3]), 1);
        record.record_failure();

        assert_eq!(record.games, 2);
        assert_eq!(record.wins, 1);
        assert_eq!(record.scheduled(), 3);
        assert_eq!(record.total_score, 1500.0);
        assert_eq!(record.total_opponent_score, 600.0 + 500.0);
        assert_eq!(record.avg_penalty(), 0.25);
        assert_eq!(record.avg_turns(), 100.0);
    }

    #[test]
    fn test_finalize_stores_fitness() {
        let mut record = FitnessRecord::default();
        record.record_match(&completed(Some(0), vec![10.0, 10.0], vec![0.0; 2]), 0);
        record.finalize(&FitnessWeights::default());
        assert_eq!(record.fitness, 1000.0);
    }

    #[test]
    fn test_generation_summary() {
        let summary = GenerationSummary::from_fitness(3, vec![10.0, -5.0, 25.0], 12, 1);
        assert_eq!(summary.generation, 3);
        assert_eq!(summary.max, 25.0);
        assert_eq!(summary.min, -5.0);
        assert!((summary.mean - 10.0).abs() < 1e-9);
        assert_eq!(summary.failed_matches, 1);

        let empty = GenerationSummary::from_fitness(0, Vec::new(), 0, 0);
        assert_eq!(empty.max, 0.0);
        assert_eq!(empty.mean, 0.0);
    }
}
