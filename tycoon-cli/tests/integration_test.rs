//! End-to-end runs of the `tycoon` binary against shell-script engines

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const WINNING_ENGINE: &str = r#"echo "game $1 seed $2 turns $3"
echo '{"winner": 0, "turns": 120, "player_scores": [900, 400, 300], "penalties": [0, 1, 0]}'"#;

struct Harness {
    dir: TempDir,
    config: PathBuf,
    scratch: PathBuf,
}

impl Harness {
    fn new(engine_body: &str, timeout_secs: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let engine = root.join("engine.sh");
        std::fs::write(&engine, format!("#!/bin/sh\n{engine_body}\n")).unwrap();
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::fs::write(root.join("policy.so"), b"").unwrap();
        std::fs::write(root.join("policy_config.txt"), b"layers=2\n").unwrap();

        let scratch = root.join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();

        let population = root.join("population");
        std::fs::create_dir_all(&population).unwrap();
        for (i, name) in ["alpha", "beta", "gamma"].iter().enumerate() {
            std::fs::write(population.join(format!("{name}.genome")), vec![i as u8; 16]).unwrap();
        }

        let config = root.join("harness.json");
        let json = serde_json::json!({
            "engine_path": engine,
            "learned_adapter": root.join("policy.so"),
            "baseline_adapter": root.join("policy.so"),
            "policy_config": root.join("policy_config.txt"),
            "max_turns": 200,
            "timeout_secs": timeout_secs,
            "checkpoint_interval": 1,
            "scratch_dir": scratch,
        });
        std::fs::write(&config, serde_json::to_string_pretty(&json).unwrap()).unwrap();

        Self { dir, config, scratch }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tycoon"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env("RUST_LOG", "warn")
            .output()
            .unwrap()
    }

    fn path_arg(&self, name: &str) -> String {
        self.root().join(name).to_string_lossy().into_owned()
    }
}

#[test]
fn test_train_flat_writes_outputs() {
    let harness = Harness::new(WINNING_ENGINE, 5.0);
    let output = harness.run(&[
        "--train",
        "--generations",
        "2",
        "--num-games",
        "2",
        "--population",
        &harness.path_arg("population"),
        "--checkpoint",
        &harness.path_arg("checkpoints"),
        "--output",
        &harness.path_arg("out"),
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let out = harness.root().join("out");
    assert_eq!(std::fs::read(out.join("best_genome.bin")).unwrap().len(), 16);

    let history = std::fs::read_to_string(out.join("fitness_history.csv")).unwrap();
    assert_eq!(history.lines().count(), 3);
    assert!(history.starts_with("generation,max_fitness"));

    for generation in 1..=2 {
        let dir = harness.root().join(format!("checkpoints/gen-{generation}"));
        assert!(dir.join("metadata.json").exists());
        assert!(dir.join("alpha.genome").exists());
    }

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["generations_run"], 2);
    // Focal seat wins every game: 1000 + (900 - 350) / 10 - 5 * 0
    assert_eq!(report["best_fitness"], 1055.0);
}

#[test]
fn test_train_tournament_groups() {
    let harness = Harness::new(WINNING_ENGINE, 5.0);
    let output = harness.run(&[
        "--train",
        "--tournament",
        "--group-size",
        "2",
        "--generations",
        "1",
        "--num-games",
        "2",
        "--seed",
        "7",
        "--population",
        &harness.path_arg("population"),
        "--checkpoint",
        &harness.path_arg("checkpoints"),
        "--output",
        &harness.path_arg("out"),
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let history = report["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["failed_matches"], 0);
    assert!(history[0]["valid_matches"].as_u64().unwrap() >= 4);
}

#[test]
fn test_test_mode_json_report() {
    let harness = Harness::new(WINNING_ENGINE, 5.0);
    let output = harness.run(&[
        "--test",
        "--genome",
        &harness.path_arg("population/alpha.genome"),
        "--num_games",
        "3",
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["games_scheduled"], 3);
    assert_eq!(report["opponents"], 2);
    assert_eq!(report["win_rate"], 1.0);
    assert_eq!(report["avg_score"], 900.0);
    assert_eq!(report["avg_opponent_score"], 350.0);
}

#[test]
fn test_missing_engine_is_reported() {
    let harness = Harness::new(WINNING_ENGINE, 5.0);
    let missing = harness.path_arg("no-such-engine");
    let output = harness.run(&[
        "--test",
        "--genome",
        &harness.path_arg("population/alpha.genome"),
        "--engine",
        &missing,
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no-such-engine"), "stderr: {stderr}");
}

#[test]
fn test_hung_engine_times_out_and_cleans_up() {
    let harness = Harness::new("exec sleep 10", 0.3);
    let output = harness.run(&[
        "--test",
        "--genome",
        &harness.path_arg("population/alpha.genome"),
        "--num-games",
        "2",
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["record"]["games"], 0);
    assert_eq!(report["record"]["failed_matches"], 2);
    assert_eq!(report["record"]["fitness"], 0.0);

    let leftovers: Vec<_> = std::fs::read_dir(&harness.scratch).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_encode_snapshot() {
    let harness = Harness::new(WINNING_ENGINE, 5.0);
    let snapshot = harness.root().join("state.json");
    std::fs::write(
        &snapshot,
        r#"{"game_id": 9, "current_player_index": 1,
            "players": [{"player_index": 0, "cash": 1500}, {"player_index": 1, "cash": 20, "in_jail": true}]}"#,
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tycoon"))
        .arg("--encode")
        .arg(&snapshot)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["focus"], 1);
    assert_eq!(report["length"], 128);
    // In jail, no card, cash below the fine
    assert_eq!(report["baseline_action"]["action_type"], 11);
}
