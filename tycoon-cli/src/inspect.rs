//! Encode command - show what a policy sees for a state snapshot
//!
//! Level 1 - Orchestration

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use tycoon_core::{
    Decision, DecisionContext, Encoder, EncoderSchema, GameStateSnapshot, Policy, ScriptedPolicy,
};

#[derive(Serialize)]
struct EncodeReport {
    game_id: u64,
    focus: u32,
    schema: &'static str,
    length: usize,
    values: Vec<f32>,
    baseline_action: serde_json::Value,
}

/// Encode the snapshot for its current player and show the baseline's move
pub fn run(path: &Path, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let state = GameStateSnapshot::from_json(&content)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    let report = build_report(&state);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n=== Game {} / player {} ===", report.game_id, report.focus);
        println!("Schema:   {} ({} features)", report.schema, report.length);
        for (row, chunk) in report.values.chunks(8).enumerate() {
            let line: Vec<String> = chunk.iter().map(|v| format!("{:6.3}", v)).collect();
            println!("[{:3}] {}", row * 8, line.join(" "));
        }
        println!("Baseline: {}", report.baseline_action);
    }
    Ok(())
}

fn build_report(state: &GameStateSnapshot) -> EncodeReport {
    let focus = state.current_player_index;
    let features = Encoder::new(EncoderSchema::Full).encode(state, focus, None);
    let context = infer_context(state, focus);
    let action = ScriptedPolicy::default().decide(&Decision::new(state, focus, context));

    EncodeReport {
        game_id: state.game_id,
        focus,
        schema: features.schema.name(),
        length: features.len(),
        values: features.values,
        baseline_action: action.to_wire(),
    }
}

/// Jail first, then an unowned property under the player, else a free turn
fn infer_context(state: &GameStateSnapshot, focus: u32) -> DecisionContext<'static> {
    let Some(player) = state.player(focus) else {
        return DecisionContext::FreeTurn;
    };
    if player.in_jail {
        return DecisionContext::InJail;
    }
    match state.property_at(player.position) {
        Some(property) if !property.is_owned() => DecisionContext::LandedOnUnownedProperty {
            property_id: property.property_id,
        },
        _ => DecisionContext::FreeTurn,
    }
}
