use anyhow::Result;
use std::path::PathBuf;

use crate::dedup::ShardedMap;
use crate::git;
use crate::hashing;
use crate::manifest::{BlobRecord, FileRecord, Manifest, PackRecord};
use crate::pack::{self, PackConfig};
use crate::progress::Progress;
use crate::reconcile;
use crate::scan;
use crate::wildcard::Wildcard;

/// Default filename mask when an ignore/patch/reuse location is a directory.
pub const MANIFEST_MASK: &str = "*.manifest.json";

pub struct RunConfig {
    pub root: PathBuf,
    /// Output manifest path.
    pub target: PathBuf,
    /// Directory receiving hash-named pack files.
    pub storage: PathBuf,
    pub base_url: Option<String>,
    pub remote_path: Option<String>,
    pub ignore_proxy: bool,
    /// Restrict the candidate set to files git does not track.
    pub ignore_git: bool,
    /// Manifest files whose file lists are dropped from the candidate set.
    pub ignore: Vec<PathBuf>,
    /// Manifest files patched against the working set (unchanged files skip
    /// repacking; stale entries are rewritten out).
    pub patch: Vec<PathBuf>,
    /// Manifest files whose pack placements are adopted for matching blobs.
    pub reuse: Vec<PathBuf>,
    pub optimal_size: u64,
    pub threads: usize,
    pub wildcards: Vec<Wildcard>,
}

/// One full packer run: selection, hashing/dedup, reconciliation, packing,
/// manifest assembly. Stages run strictly in that order; each pool phase
/// joins before the next stage starts. The target manifest is only written
/// when everything before it succeeded.
pub fn run(cfg: &RunConfig, progress: &Progress) -> Result<Manifest> {
    eprintln!("Search files...");
    let mut candidates = scan::find_files(&cfg.root, &cfg.wildcards)?;
    if cfg.ignore_git {
        eprintln!("Remove git-tracked files...");
        candidates = git::untracked_files(&cfg.root, &candidates)?;
    }
    for item in &cfg.ignore {
        eprintln!("Remove ignored files from {}...", item.display());
        reconcile::remove_ignored_files(item, &mut candidates)?;
    }

    eprintln!("Calculate blob information ({} files)...", candidates.len());
    let files: ShardedMap<FileRecord> = ShardedMap::new();
    let blobs: ShardedMap<BlobRecord> = ShardedMap::new();
    hashing::generate_blob_records(&cfg.root, &candidates, cfg.threads, &files, &blobs, progress)?;

    for item in &cfg.patch {
        eprintln!("Patch manifest {}...", item.display());
        reconcile::remove_unchanged_files(item, &files)?;
    }
    let packs: ShardedMap<PackRecord> = ShardedMap::new();
    for item in &cfg.reuse {
        eprintln!("Reuse packs from {}...", item.display());
        reconcile::adopt_packed_blobs(item, &blobs, &packs)?;
    }

    eprintln!("Generate pack files...");

    let pack_cfg = PackConfig {
        storage: cfg.storage.clone(),
        optimal_size: cfg.optimal_size,
        threads: cfg.threads,
        remote_path: cfg.remote_path.clone(),
    };
    pack::write_pack_files(&pack_cfg, &cfg.root, &files, &blobs, &packs, progress)?;

    eprintln!("Write manifest file...");
    let manifest =
        Manifest::assemble(cfg.base_url.clone(), cfg.ignore_proxy, &files, &blobs, &packs)?;
    manifest.write(&cfg.target)?;
    Ok(manifest)
}
