use anyhow::Context;
use llms_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, hook: bool) -> anyhow::Result<()> {
    let project_name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing llms in: {}", root.display());

    let llms_dir = paths::llms_dir(root);
    io::ensure_dir(&llms_dir).with_context(|| format!("failed to create {}", llms_dir.display()))?;

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config.yaml")?
    } else {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let sources = root.join(&config.sources.dir);
    if sources.is_dir() {
        println!("  exists:  {}/", config.sources.dir.display());
    } else {
        io::ensure_dir(&sources).with_context(|| format!("failed to create {}", sources.display()))?;
        println!("  created: {}/", config.sources.dir.display());
    }

    // Tracker state and the run lock are per-clone bookkeeping.
    for entry in [paths::STATE_FILE, paths::LOCK_FILE] {
        io::ensure_gitignore_entry(root, entry).context("failed to update .gitignore")?;
    }

    if hook {
        println!();
        super::hook::install(root)?;
    }

    println!("\nllms initialized.");
    println!(
        "Next: add documents under {}/ and run `llms sync`",
        config.sources.dir.display()
    );
    Ok(())
}
