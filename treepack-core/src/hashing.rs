use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use crate::dedup::ShardedMap;
use crate::manifest::{name_key, BlobRecord, FileRecord};
use crate::permissions;
use crate::pool::{run_workers, WorkQueue};
use crate::progress::Progress;

/// Content hash plus byte length of one file.
pub fn hash_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let len = f.metadata().with_context(|| format!("stat {}", path.display()))?.len();
    let mut hasher = blake3::Hasher::new();
    if len > 0 {
        let mmap = unsafe { Mmap::map(&f) }.with_context(|| format!("map {}", path.display()))?;
        hasher.update(&mmap);
    }
    Ok((hasher.finalize().to_hex().to_string(), len))
}

/// Hashing and dedup phase. A bounded pool drains the candidate queue; each
/// worker hashes one file, inserts its FileRecord keyed by case-folded name,
/// and only when that insert wins inserts a fresh unpacked BlobRecord keyed
/// by content hash. Two files with identical bytes race on the blob insert;
/// the records are content-identical, so the losing insert carries nothing.
pub fn generate_blob_records(
    root: &Path,
    candidates: &BTreeSet<String>,
    threads: usize,
    files: &ShardedMap<FileRecord>,
    blobs: &ShardedMap<BlobRecord>,
    progress: &Progress,
) -> Result<()> {
    progress.set_stage("Hashing", candidates.len());
    let queue = WorkQueue::new(candidates.iter().cloned());
    run_workers(threads, || {
        while let Some(name) = queue.pop() {
            let full = root.join(&name);
            let is_executable = permissions::is_executable(&full)?;
            let (hash, size) = hash_file(&full)?;
            progress.inc_file();
            progress.add_bytes(size as usize);
            let record = FileRecord { name: name.clone(), hash: hash.clone(), is_executable };
            if files.insert_if_absent(&name_key(&name), record) {
                let blob = BlobRecord { hash: hash.clone(), size, pack_hash: None, pack_offset: 0 };
                blobs.insert_if_absent(&hash, blob);
            }
        }
        Ok(())
    })
}
