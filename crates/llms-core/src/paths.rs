use crate::error::{LlmsError, Result};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LLMS_DIR: &str = ".llms";
pub const CONFIG_FILE: &str = ".llms/config.yaml";
pub const STATE_FILE: &str = ".llms/state.yaml";
pub const LOCK_FILE: &str = ".llms/sync.lock";

pub const DEFAULT_SOURCE_DIR: &str = "docs";
pub const DEFAULT_OUTPUT_DIR: &str = "llms";
pub const INDEX_FILE: &str = "llms.txt";
pub const DERIVED_EXTENSION: &str = "md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn llms_dir(root: &Path) -> PathBuf {
    root.join(LLMS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Repo-relative location of one derived document:
/// `<output>/<category>/<document_id>.<limit>.md`.
pub fn derived_rel_path(output_dir: &Path, category: &str, document_id: &str, limit: usize) -> PathBuf {
    output_dir
        .join(category)
        .join(format!("{document_id}.{limit}.{DERIVED_EXTENSION}"))
}

pub fn index_rel_path(output_dir: &Path) -> PathBuf {
    output_dir.join(INDEX_FILE)
}

/// Render a repo-relative path the way git expects it (forward slashes).
pub fn to_git_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True if `path` is a relative path contained in `dir` with no `..` escapes.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    path.starts_with(dir) && path != dir
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();
static NON_SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

fn non_slug_re() -> &'static Regex {
    NON_SLUG_RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap())
}

/// Lowercase, replace anything outside `[a-z0-9]` with `-`, collapse runs,
/// trim leading and trailing dashes.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();
    non_slug_re()
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

pub fn validate_slug(field: &'static str, slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 128 || !slug_re().is_match(slug) {
        return Err(LlmsError::InvalidValue {
            field,
            value: slug.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("api/Auth_Login"), "api-auth-login");
        assert_eq!(slugify("--weird!!name--"), "weird-name");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn validate_slug_rules() {
        for slug in ["intro", "a", "api-auth-2"] {
            validate_slug("id", slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
        for slug in ["", "-x", "x-", "Upper", "a.b"] {
            assert!(validate_slug("id", slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn derived_path_layout() {
        let p = derived_rel_path(Path::new("llms"), "guides", "intro", 1000);
        assert_eq!(p, PathBuf::from("llms/guides/intro.1000.md"));
        assert_eq!(to_git_path(&p), "llms/guides/intro.1000.md");
    }

    #[test]
    fn within_checks() {
        let out = Path::new("llms");
        assert!(is_within(Path::new("llms/a/b.md"), out));
        assert!(!is_within(Path::new("llms"), out));
        assert!(!is_within(Path::new("docs/a.md"), out));
        assert!(!is_within(Path::new("llms/../docs/a.md"), out));
        assert!(!is_within(Path::new("/llms/a.md"), out));
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/.llms/config.yaml"));
        assert_eq!(state_path(root), PathBuf::from("/tmp/proj/.llms/state.yaml"));
        assert_eq!(lock_path(root), PathBuf::from("/tmp/proj/.llms/sync.lock"));
    }
}
