use crate::output::{print_json, print_table};
use anyhow::Context;
use llms_core::{
    config::Config, lock::RunLock, registry::Registry, state::WorkflowTracker, types::WorkflowState,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct DerivedRow {
    document_id: String,
    character_limit: usize,
    category: String,
    priority_tier: String,
    priority_score: u8,
    completion_status: String,
    state: WorkflowState,
    chars: usize,
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry = Registry::load(root, &config).context("failed to load documents")?;
    let tracker = WorkflowTracker::load(root).context("failed to load state")?;

    let rows: Vec<DerivedRow> = registry
        .derived()
        .map(|doc| {
            let key = doc.key();
            DerivedRow {
                document_id: doc.document_id.clone(),
                character_limit: doc.character_limit,
                category: doc.category.clone(),
                priority_tier: doc.priority_tier.to_string(),
                priority_score: doc.priority_score,
                completion_status: doc.completion_status.to_string(),
                state: tracker.state_of(&key),
                chars: doc.content_len(),
                path: registry.location(&key).map(Path::to_path_buf),
                last_error: tracker.get(&key).and_then(|t| t.last_error.clone()),
            }
        })
        .collect();
    let lock = RunLock::holder(root);

    if json {
        print_json(&serde_json::json!({
            "sources": registry.list_sources().len(),
            "limits": config.effective_limits(),
            "documents": rows,
            "lock": lock,
        }))?;
        return Ok(());
    }

    println!(
        "{} source(s), limits {:?}",
        registry.list_sources().len(),
        config.effective_limits()
    );
    println!(
        "{} synced, {} awaiting commit, {} failed",
        tracker.count(WorkflowState::Synced),
        tracker.count(WorkflowState::ContentGenerated),
        tracker.count(WorkflowState::Failed)
    );
    if let Some(lock) = &lock {
        let minutes = chrono::Utc::now()
            .signed_duration_since(lock.acquired_at)
            .num_minutes();
        println!(
            "sync running: pid {} since {} ({minutes}m)",
            lock.pid,
            lock.acquired_at.to_rfc3339()
        );
    }
    if rows.is_empty() {
        println!("No derived documents yet. Run `llms sync`.");
        return Ok(());
    }
    println!();
    print_table(
        &["DOCUMENT", "LIMIT", "CHARS", "TIER", "SCORE", "STATE"],
        rows.iter()
            .map(|r| {
                vec![
                    r.document_id.clone(),
                    r.character_limit.to_string(),
                    r.chars.to_string(),
                    r.priority_tier.clone(),
                    r.priority_score.to_string(),
                    r.state.to_string(),
                ]
            })
            .collect(),
    );
    for r in rows.iter().filter(|r| r.last_error.is_some()) {
        println!(
            "\n{}@{}: {}",
            r.document_id,
            r.character_limit,
            r.last_error.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}
