use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use treepack_core::engine::{self, RunConfig, MANIFEST_MASK};
use treepack_core::progress::Progress;
use treepack_core::scan;
use treepack_core::wildcard::Wildcard;

#[derive(Parser)]
#[command(
    name = "treepack",
    version,
    about = "Pack a file tree into content-addressed, deduplicated, compressed containers",
    after_help = "Pattern examples:\n  \
        '**/Binaries/'        include all files under any Binaries directory\n  \
        'Build/Win64/Inc/'    include all files under Build/Win64/Inc\n  \
        'Build/**/*.lib'      include all *.lib files under Build\n  \
        '!**/*.pdb'           exclude all *.pdb files everywhere"
)]
struct Cli {
    /// Path of the package root to scan
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Output manifest file
    #[arg(long, default_value = "treepack.manifest.json")]
    target: PathBuf,
    /// Directory for created pack files
    #[arg(long, default_value = "packs")]
    storage: PathBuf,
    /// Base url of the storage directory, recorded in the manifest
    #[arg(long)]
    base_url: Option<String>,
    /// Remote path recorded on created packs
    #[arg(long)]
    remote_path: Option<String>,
    /// Record the ignore-proxy flag in the manifest
    #[arg(long, default_value_t = false)]
    ignore_proxy: bool,
    /// Skip files tracked by git
    #[arg(long, default_value_t = false)]
    ignore_git: bool,
    /// Manifest file or directory listing files to drop from the candidate set
    #[arg(long)]
    ignore: Vec<PathBuf>,
    /// Manifest file or directory to patch against the working set
    #[arg(long)]
    patch: Vec<PathBuf>,
    /// Manifest file or directory whose pack placements are reused
    #[arg(long)]
    reuse: Vec<PathBuf>,
    /// Optimal pack size in MiB
    #[arg(long, default_value_t = 10)]
    optimal: u64,
    /// Worker thread count
    #[arg(long, default_value_t = 4)]
    threads: usize,
    /// Print periodic status lines while hashing and packing
    #[arg(long, default_value_t = false)]
    progress: bool,
    /// Include/exclude wildcard patterns; prefix with '!' to exclude
    patterns: Vec<String>,
}

fn log_files(message: &str, files: &[PathBuf]) {
    eprintln!("{}{}", message, if files.is_empty() { " none" } else { "" });
    for item in files {
        eprintln!("  - {}", item.display());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let wildcards =
        cli.patterns.iter().map(|p| Wildcard::parse(p)).collect::<Result<Vec<_>>>()?;
    let ignore = scan::locate_manifests(&cli.ignore, MANIFEST_MASK)?;
    let patch = scan::locate_manifests(&cli.patch, MANIFEST_MASK)?;
    let reuse = scan::locate_manifests(&cli.reuse, MANIFEST_MASK)?;

    eprintln!("Current options:");
    eprintln!("  Content root: {}", cli.root.display());
    eprintln!("  Target manifest: {}", cli.target.display());
    eprintln!("  Pack storage path: {}", cli.storage.display());
    eprintln!("  Base url: {}", cli.base_url.as_deref().unwrap_or("default"));
    eprintln!("  Remote path: {}", cli.remote_path.as_deref().unwrap_or("none"));
    eprintln!("  Ignore proxy flag: {}", cli.ignore_proxy);
    log_files("  Ignore already packed files from:", &ignore);
    log_files("  Patch already packed file list in:", &patch);
    log_files("  Reuse pack files from:", &reuse);
    eprintln!("  Optimal pack size: {} MiB", cli.optimal);
    eprintln!("  Worker threads: {}", cli.threads);
    eprintln!();

    let cfg = RunConfig {
        root: cli.root,
        target: cli.target,
        storage: cli.storage,
        base_url: cli.base_url,
        remote_path: cli.remote_path,
        ignore_proxy: cli.ignore_proxy,
        ignore_git: cli.ignore_git,
        ignore,
        patch,
        reuse,
        optimal_size: cli.optimal * 1024 * 1024,
        threads: cli.threads.max(1),
        wildcards,
    };

    let progress = Progress::new(cli.progress);
    progress.start();
    let result = engine::run(&cfg, &progress);
    progress.stop();
    let manifest = result?;
    eprintln!(
        "Done: {} file(s), {} blob(s), {} pack(s) -> {}",
        manifest.files.len(),
        manifest.blobs.len(),
        manifest.packs.len(),
        cfg.target.display()
    );
    Ok(())
}
