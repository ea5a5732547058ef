use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

/// Reduce the candidate set to files git does not track: everything whose
/// short status is untracked (`?`) or ignored (`!`). A missing git binary or
/// a non-zero exit is fatal; a wrong result here would silently repack
/// tracked content.
pub fn untracked_files(root: &Path, candidates: &BTreeSet<String>) -> Result<BTreeSet<String>> {
    let output = Command::new("git")
        .args(["status", "--untracked-files=all", "--short", "--ignored", "."])
        .current_dir(root)
        .output()
        .context("run git (is it installed and on PATH?)")?;
    if !output.status.success() {
        bail!("git status exited with {}", output.status);
    }
    let mut kept = BTreeSet::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        if (line.starts_with('!') || line.starts_with('?')) && line.len() > 3 {
            let path = &line[3..];
            if candidates.contains(path) {
                kept.insert(path.to_string());
            }
        }
    }
    Ok(kept)
}
