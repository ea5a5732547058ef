use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::path::Path;

use crate::dedup::ShardedMap;
use crate::manifest::{name_key, BlobRecord, FileRecord, Manifest, PackRecord};

/// Drop every name the manifest lists from the candidate set, regardless of
/// content. Used to skip files some other packer run already owns.
pub fn remove_ignored_files(manifest_path: &Path, candidates: &mut BTreeSet<String>) -> Result<()> {
    let manifest = Manifest::read(manifest_path)?;
    let ignored: BTreeSet<String> = manifest.files.iter().map(|f| name_key(&f.name)).collect();
    candidates.retain(|name| !ignored.contains(&name_key(name)));
    Ok(())
}

/// Patch a prior manifest against the freshly hashed working set. A file
/// whose hash still matches is unchanged: it leaves the working set (no
/// repack) and stays in the manifest. A file that hashed differently is
/// dropped from the manifest so it gets repacked as new content. Entries for
/// names outside the working set are kept as-is. The manifest document is
/// rewritten in place only when entries were dropped; that rewrite is eager
/// and is not rolled back if a later stage fails.
pub fn remove_unchanged_files(manifest_path: &Path, files: &ShardedMap<FileRecord>) -> Result<()> {
    let mut manifest = Manifest::read(manifest_path)?;
    let mut retained: Vec<FileRecord> = Vec::new();
    for item in &manifest.files {
        let key = name_key(&item.name);
        match files.get(&key) {
            Some(current) => {
                if current.hash == item.hash {
                    files.remove(&key);
                    retained.push(item.clone());
                }
            }
            None => retained.push(item.clone()),
        }
    }
    if retained.len() != manifest.files.len() {
        manifest.files = retained;
        manifest.write(manifest_path)?;
    }
    Ok(())
}

/// Adopt pack placements from a prior manifest: any still-unpacked working
/// blob whose hash the manifest knows takes over the manifest's record (pack
/// hash and offset) instead of being repacked. Every adopted pack hash must
/// resolve in the same manifest's pack list; anything unresolved means the
/// document is internally inconsistent, which is fatal before any pack
/// writing starts.
pub fn adopt_packed_blobs(
    manifest_path: &Path,
    blobs: &ShardedMap<BlobRecord>,
    packs: &ShardedMap<PackRecord>,
) -> Result<()> {
    let manifest = Manifest::read(manifest_path)?;
    let mut required: BTreeSet<Option<String>> = BTreeSet::new();
    for item in &manifest.blobs {
        let mut adopted = false;
        blobs.update(&item.hash, |blob| {
            if blob.pack_hash.is_none() {
                *blob = item.clone();
                adopted = true;
            }
        });
        if adopted {
            required.insert(item.pack_hash.clone());
        }
    }
    for item in &manifest.packs {
        if required.remove(&Some(item.hash.clone())) {
            packs.insert_if_absent(&item.hash, item.clone());
        }
    }
    if !required.is_empty() {
        bail!("found broken manifest file: {}", manifest_path.display());
    }
    Ok(())
}
