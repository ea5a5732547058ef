use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::wildcard::{is_included, Wildcard};

fn rel_name(root: &Path, path: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}

/// Walk the root and collect the candidate set: root-relative names of every
/// regular file the pattern list selects. Directories that fail the pattern
/// list as directory candidates are pruned without descending.
pub fn find_files(root: &Path, wildcards: &[Wildcard]) -> Result<BTreeSet<String>> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        is_included(wildcards, &rel_name(root, e.path()), false)
    });
    let mut out = BTreeSet::new();
    for ent in walker {
        let ent = ent.with_context(|| format!("walk {}", root.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = rel_name(root, ent.path());
        if is_included(wildcards, &rel, true) {
            out.insert(rel);
        }
    }
    Ok(out)
}

/// Expand ignore/patch/reuse locations into concrete manifest files. Each
/// item is a file (taken as-is), a directory (scanned top-level with the
/// default mask), or a directory-plus-mask spelled as a non-existent path
/// whose final component is the mask.
pub fn locate_manifests(items: &[PathBuf], default_mask: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for item in items {
        if item.as_os_str().is_empty() {
            continue;
        }
        if item.is_dir() {
            out.extend(find_by_mask(item, default_mask)?);
        } else if item.is_file() {
            out.push(item.clone());
        } else {
            let dir = match item.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let mask = item
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| default_mask.to_string());
            out.extend(find_by_mask(&dir, &mask)?);
        }
    }
    Ok(out)
}

fn find_by_mask(dir: &Path, mask: &str) -> Result<Vec<PathBuf>> {
    let glob = globset::Glob::new(mask)
        .with_context(|| format!("bad manifest mask {mask:?}"))?
        .compile_matcher();
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if glob.is_match(Path::new(&entry.file_name())) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}
