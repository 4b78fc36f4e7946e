use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use llms_core::{config::Config, git::GitCli};
use std::path::{Path, PathBuf};

/// Delimits the managed block inside `.git/hooks/post-commit`, so an existing
/// hook keeps working alongside ours.
pub const HOOK_BLOCK_START: &str = "# llms:start";
pub const HOOK_BLOCK_END: &str = "# llms:end";

const HOOK_NAME: &str = "post-commit";

#[derive(Subcommand)]
pub enum HookSubcommand {
    /// Install the post-commit hook that runs `llms sync`
    Install,
    /// Remove the managed block from the post-commit hook
    Uninstall,
    /// Show whether the hook is installed
    Status,
}

pub fn run(root: &Path, subcmd: HookSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        HookSubcommand::Install => install(root),
        HookSubcommand::Uninstall => uninstall(root),
        HookSubcommand::Status => status(root, json),
    }
}

fn hook_path(root: &Path) -> anyhow::Result<PathBuf> {
    let timeout = Config::load(root)
        .map(|c| c.sync.timeout_seconds)
        .unwrap_or(60);
    let git = GitCli::new(root, timeout, true)?;
    if !git.is_repository() {
        anyhow::bail!("{} is not inside a git repository", root.display());
    }
    Ok(git.hooks_dir().context("failed to locate hooks directory")?.join(HOOK_NAME))
}

fn managed_block(root: &Path) -> anyhow::Result<String> {
    let exe = std::env::current_exe().context("failed to locate the llms executable")?;
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    Ok(format!(
        "{HOOK_BLOCK_START}\n\"{}\" sync --root \"{}\" || true\n{HOOK_BLOCK_END}\n",
        exe.display(),
        root.display()
    ))
}

/// Text outside the managed block, or `None` if no block is present.
fn without_block(text: &str) -> Option<String> {
    let start = text.find(HOOK_BLOCK_START)?;
    let end = text[start..].find(HOOK_BLOCK_END)? + start + HOOK_BLOCK_END.len();
    let rest = text[end..].strip_prefix('\n').unwrap_or(&text[end..]);
    Some(format!("{}{}", &text[..start], rest))
}

pub fn install(root: &Path) -> anyhow::Result<()> {
    let path = hook_path(root)?;
    let block = managed_block(root)?;

    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    let base = match without_block(&existing) {
        Some(rest) => rest,
        None if existing.trim().is_empty() => "#!/bin/sh\n".to_string(),
        None => existing.clone(),
    };
    let mut text = base;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&block);

    if text == existing {
        println!("  exists:  {}", path.display());
        return Ok(());
    }
    llms_core::io::atomic_write(&path, text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    make_executable(&path)?;
    println!("  installed: {}", path.display());
    Ok(())
}

fn uninstall(root: &Path) -> anyhow::Result<()> {
    let path = hook_path(root)?;
    let Ok(existing) = std::fs::read_to_string(&path) else {
        println!("No post-commit hook installed.");
        return Ok(());
    };
    let Some(rest) = without_block(&existing) else {
        println!("Post-commit hook has no llms block; left unchanged.");
        return Ok(());
    };

    let only_shebang = rest.lines().all(|l| l.trim().is_empty() || l.starts_with("#!"));
    if only_shebang {
        std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        println!("  removed: {}", path.display());
    } else {
        llms_core::io::atomic_write(&path, rest.as_bytes())?;
        make_executable(&path)?;
        println!("  updated: {}", path.display());
    }
    Ok(())
}

fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = hook_path(root)?;
    let installed = std::fs::read_to_string(&path)
        .map(|t| t.contains(HOOK_BLOCK_START))
        .unwrap_or(false);

    if json {
        print_json(&serde_json::json!({
            "installed": installed,
            "path": path,
        }))?;
    } else if installed {
        println!("installed: {}", path.display());
    } else {
        println!("not installed ({})", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
