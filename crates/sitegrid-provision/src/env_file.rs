//! Backend `.env` merging.
//!
//! Managed keys are replaced in place when present and appended when not.
//! Every other line (comments, blanks, the application's own settings) is
//! preserved in order.

use std::path::Path;

use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};

/// Merge `vars` into the dotenv text `existing`.
pub fn merge_env(existing: &str, vars: &[(&str, String)]) -> String {
    let mut seen = vec![false; vars.len()];
    let mut lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let key = line.split_once('=').map(|(k, _)| env_key(k));
        match key.and_then(|k| vars.iter().position(|(name, _)| *name == k)) {
            Some(i) => {
                // Keep only the first occurrence of a managed key.
                if !seen[i] {
                    seen[i] = true;
                    lines.push(format!("{}={}", vars[i].0, vars[i].1));
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    for (i, (name, value)) in vars.iter().enumerate() {
        if !seen[i] {
            lines.push(format!("{name}={value}"));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Key part of an assignment, with any shell `export` prefix dropped.
fn env_key(lhs: &str) -> &str {
    let lhs = lhs.trim();
    lhs.strip_prefix("export")
        .filter(|rest| rest.starts_with([' ', '\t']))
        .map_or(lhs, str::trim_start)
}

/// Merge `vars` into the file at `path`, creating it (and its directory)
/// if needed.
pub async fn write_env_file(path: &Path, vars: &[(&str, String)]) -> ProvisionResult<()> {
    let io_err = |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let existing = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(e)),
    };
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    }
    tokio::fs::write(path, merge_env(&existing, vars))
        .await
        .map_err(io_err)?;

    debug!(path = %path.display(), keys = vars.len(), "env file written");
    Ok(())
}
