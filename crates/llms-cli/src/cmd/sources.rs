use crate::output::{print_json, print_table};
use anyhow::Context;
use llms_core::{config::Config, score, source::SourceDocument};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct SourceRow {
    id: String,
    title: String,
    category: String,
    path: PathBuf,
    priority_score: u8,
    priority_tier: String,
    priority_override: bool,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let sources = SourceDocument::discover(root, &config).context("failed to discover sources")?;

    let mut rows: Vec<SourceRow> = sources
        .iter()
        .map(|s| {
            let p = score::score(s, &config.priority);
            SourceRow {
                id: s.id.clone(),
                title: s.title.clone(),
                category: s.category.clone(),
                path: s.path.clone(),
                priority_score: p.score,
                priority_tier: p.tier.to_string(),
                priority_override: s.priority_override.is_some(),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.priority_score.cmp(&a.priority_score).then_with(|| a.id.cmp(&b.id)));

    if json {
        print_json(&rows)?;
        return Ok(());
    }
    if rows.is_empty() {
        println!("No sources found under {}/.", config.sources.dir.display());
        return Ok(());
    }
    print_table(
        &["ID", "CATEGORY", "SCORE", "TIER", "PATH"],
        rows.iter()
            .map(|r| {
                let score = if r.priority_override {
                    format!("{}*", r.priority_score)
                } else {
                    r.priority_score.to_string()
                };
                vec![
                    r.id.clone(),
                    r.category.clone(),
                    score,
                    r.priority_tier.clone(),
                    r.path.display().to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}
