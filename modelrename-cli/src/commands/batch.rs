use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use modelrename::RenameRequest;

/// Apply a JSON array of rename requests, e.g.
/// `[{"kind": "table", "old_name": "tbl_Sales", "new_name": "Fact Sales"}]`
pub async fn run(requests_file: PathBuf, preview: bool, project: PathBuf, format: &crate::OutputFormat) -> Result<()> {
    let contents = fs::read_to_string(&requests_file)
        .with_context(|| format!("Failed to read requests file: {}", requests_file.display()))?;
    let requests: Vec<RenameRequest> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse requests file: {}", requests_file.display()))?;

    tracing::info!("Loaded {} rename requests from {}", requests.len(), requests_file.display());
    super::rename::execute(&requests, preview, &project, format)
}
