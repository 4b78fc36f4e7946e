use crate::output::{print_json, short_id};
use anyhow::Context;
use llms_core::{
    config::Config,
    git::GitCli,
    summarize,
    sync::{SyncMode, SyncOrchestrator, SyncOutcome, SyncRun},
};
use std::path::Path;
use std::time::Duration;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    execute(root, SyncMode::Commit, json)
}

/// Shared by `sync` and `generate`.
pub fn execute(root: &Path, mode: SyncMode, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let git = GitCli::new(root, config.sync.timeout_seconds, config.sync.no_verify)?;
    let summarizer = summarize::from_config(
        &config.summarizer,
        root,
        Duration::from_secs(config.generation.timeout_seconds.max(1)),
    );

    let run = SyncOrchestrator::new(root, &config, &git, summarizer)
        .with_mode(mode)
        .run();

    if json {
        print_json(&run)?;
    } else {
        print_human(&run);
    }

    if let Some(failure) = &run.failure {
        anyhow::bail!("sync failed during {}: {}", failure.phase, failure.message);
    }
    Ok(())
}

fn print_human(run: &SyncRun) {
    if let Some(g) = &run.generation {
        println!(
            "generated {} / unchanged {} / failed {} / pruned {} ({} jobs)",
            g.generated, g.unchanged, g.failed, g.pruned, g.attempted
        );
        for f in &g.failures {
            println!("  failed: {} ({})", f.document, f.error);
        }
    }
    match run.outcome {
        SyncOutcome::Skipped => println!("HEAD is a sync commit; nothing to do."),
        SyncOutcome::NoChange => println!("Derived documents are up to date."),
        SyncOutcome::Uncommitted => {
            println!("{} path(s) changed (not committed):", run.changed_paths.len());
            for p in &run.changed_paths {
                println!("  {}", p.display());
            }
        }
        SyncOutcome::Committed => {
            println!(
                "Committed {} path(s) in {}.",
                run.committed_paths.len(),
                short_id(run.commit_id.as_deref())
            );
            for p in &run.committed_paths {
                println!("  {}", p.display());
            }
        }
        SyncOutcome::Failed => {}
    }
}
