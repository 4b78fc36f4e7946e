use llms_core::sync::SyncMode;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    super::sync::execute(root, SyncMode::GenerateOnly, json)
}
