use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::dedup::ShardedMap;
use crate::manifest::{BlobRecord, FileRecord, PackRecord};
use crate::pool::{run_workers, WorkQueue};
use crate::progress::Progress;

/// First bytes of every pack's uncompressed stream.
pub const PACK_SIGNATURE: &[u8; 8] = b"TREEPK00";

pub struct PackConfig {
    pub storage: PathBuf,
    /// Stop filling a pack once its on-disk size passes this.
    pub optimal_size: u64,
    pub threads: usize,
    pub remote_path: Option<String>,
}

/// Thin write decorator tracking the byte position of an output sink.
pub struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, written: 0 }
    }

    pub fn position(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Uncompressed-side view of one pack under construction. Bytes written here
/// are hashed and counted before the zstd encoder compresses them onto the
/// sink, whose own position is the on-disk size so far.
struct PackStream<W: Write> {
    encoder: zstd::stream::write::Encoder<'static, CountingWriter<W>>,
    hasher: blake3::Hasher,
    written: u64,
}

impl<W: Write> PackStream<W> {
    fn new(sink: W) -> Result<Self> {
        let encoder =
            zstd::stream::write::Encoder::new(CountingWriter::new(sink), zstd::DEFAULT_COMPRESSION_LEVEL)
                .context("open zstd stream")?;
        Ok(PackStream { encoder, hasher: blake3::Hasher::new(), written: 0 })
    }

    fn uncompressed_position(&self) -> u64 {
        self.written
    }

    fn compressed_position(&self) -> u64 {
        self.encoder.get_ref().position()
    }

    /// Finalize the compression stream; returns the content hash of the
    /// uncompressed stream plus its uncompressed and on-disk sizes.
    fn finish(self) -> Result<(String, u64, u64)> {
        let mut sink = self.encoder.finish().context("finish zstd stream")?;
        sink.flush().context("flush pack")?;
        Ok((self.hasher.finalize().to_hex().to_string(), self.written, sink.position()))
    }
}

impl<W: Write> Write for PackStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.encoder.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Bin-packing phase: order the unpacked blobs largest-first (ties by hash)
/// into one shared queue and let each pool worker greedily fill containers
/// from it until the queue runs dry. Workers never coordinate, so container
/// boundaries depend on the pool size; the file-to-hash mapping does not.
pub fn write_pack_files(
    cfg: &PackConfig,
    root: &Path,
    files: &ShardedMap<FileRecord>,
    blobs: &ShardedMap<BlobRecord>,
    packs: &ShardedMap<PackRecord>,
    progress: &Progress,
) -> Result<()> {
    // One representative source path per content hash.
    let mut blob_to_file: BTreeMap<String, PathBuf> = BTreeMap::new();
    for file in files.values() {
        blob_to_file.entry(file.hash.clone()).or_insert_with(|| root.join(&file.name));
    }
    let mut unpacked: Vec<BlobRecord> = blobs
        .values()
        .into_iter()
        .filter(|b| b.pack_hash.is_none() && blob_to_file.contains_key(&b.hash))
        .collect();
    unpacked.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.hash.cmp(&b.hash)));
    progress.set_stage("Packing", unpacked.len());

    std::fs::create_dir_all(&cfg.storage)
        .with_context(|| format!("create storage dir {}", cfg.storage.display()))?;

    let queue = WorkQueue::new(unpacked);
    run_workers(cfg.threads, || {
        while let Some(first) = queue.pop() {
            build_pack(first, &queue, &blob_to_file, cfg, blobs, packs, progress)?;
        }
        Ok(())
    })
}

/// Build and commit one container, starting from an already-claimed blob.
fn build_pack(
    first: BlobRecord,
    queue: &WorkQueue<BlobRecord>,
    blob_to_file: &BTreeMap<String, PathBuf>,
    cfg: &PackConfig,
    blobs: &ShardedMap<BlobRecord>,
    packs: &ShardedMap<PackRecord>,
    progress: &Progress,
) -> Result<()> {
    // The temp file is deleted on every exit path: dropped on error,
    // renamed or discarded on commit.
    let tmp = NamedTempFile::new_in(&cfg.storage)
        .with_context(|| format!("create temp pack in {}", cfg.storage.display()))?;
    let mut stream = PackStream::new(tmp.as_file())?;
    stream.write_all(PACK_SIGNATURE).context("write pack signature")?;

    let mut packed: Vec<(String, u64)> = Vec::new();
    let mut blob = first;
    loop {
        let offset = stream.uncompressed_position();
        let source = blob_to_file
            .get(&blob.hash)
            .with_context(|| format!("no source file for blob {}", blob.hash))?;
        let mut input =
            File::open(source).with_context(|| format!("open {}", source.display()))?;
        io::copy(&mut input, &mut stream)
            .with_context(|| format!("pack {}", source.display()))?;
        packed.push((blob.hash.clone(), offset));
        progress.inc_file();
        progress.add_bytes(blob.size as usize);

        if stream.compressed_position() > cfg.optimal_size {
            break;
        }
        match queue.pop() {
            Some(next) => blob = next,
            None => break,
        }
    }

    let (hash, size, compressed_size) = stream.finish()?;
    let pack_path = cfg.storage.join(&hash);
    match tmp.persist_noclobber(&pack_path) {
        Ok(_) => {}
        // A pack with identical content is already committed; ours is
        // redundant and the temp copy goes away with the handle.
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => drop(e.file),
        Err(e) => {
            return Err(e.error)
                .with_context(|| format!("commit pack {}", pack_path.display()))
        }
    }

    // Publish the pack linkage only after the durable commit.
    for (blob_hash, offset) in packed {
        blobs.update(&blob_hash, |b| {
            b.pack_hash = Some(hash.clone());
            b.pack_offset = offset;
        });
    }
    let record = PackRecord {
        hash: hash.clone(),
        size,
        compressed_size,
        remote_path: cfg.remote_path.clone(),
    };
    packs.insert_if_absent(&hash, record);
    Ok(())
}
