use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::dedup::ShardedMap;

/// One selected path under the root. `name` keeps the original case;
/// lookups go through [`name_key`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct FileRecord {
    pub name: String,
    pub hash: String,
    pub is_executable: bool,
}

/// One unique content payload. Unpacked until `pack_hash` is set.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct BlobRecord {
    pub hash: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pack_hash: Option<String>,
    #[serde(default)]
    pub pack_offset: u64,
}

/// One compressed container. `hash` covers the uncompressed payload
/// (signature + blob bytes), so it is stable across compression settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct PackRecord {
    pub hash: String,
    pub size: u64,
    pub compressed_size: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remote_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub ignore_proxy: bool,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub blobs: Vec<BlobRecord>,
    #[serde(default)]
    pub packs: Vec<PackRecord>,
}

/// Map key for a file name. Names compare case-insensitively; records keep
/// the original case.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Manifest> {
        let f = File::open(path).with_context(|| format!("open manifest {}", path.display()))?;
        serde_json::from_reader(f).with_context(|| format!("parse manifest {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let f = File::create(path).with_context(|| format!("create manifest {}", path.display()))?;
        serde_json::to_writer_pretty(f, self)
            .with_context(|| format!("write manifest {}", path.display()))
    }

    /// Collapse the working maps into the minimal closure the manifest needs:
    /// every surviving file, each file's blob, each packed blob's pack.
    /// Collections come out deduplicated and sorted by key.
    pub fn assemble(
        base_url: Option<String>,
        ignore_proxy: bool,
        files: &ShardedMap<FileRecord>,
        blobs: &ShardedMap<BlobRecord>,
        packs: &ShardedMap<PackRecord>,
    ) -> Result<Manifest> {
        let mut out_files: BTreeMap<String, FileRecord> = BTreeMap::new();
        let mut out_blobs: BTreeMap<String, BlobRecord> = BTreeMap::new();
        let mut out_packs: BTreeMap<String, PackRecord> = BTreeMap::new();
        for file in files.values() {
            let blob = blobs
                .get(&file.hash)
                .with_context(|| format!("no blob record for file {}", file.name))?;
            if !out_blobs.contains_key(&blob.hash) {
                let pack_hash = match &blob.pack_hash {
                    Some(h) => h.clone(),
                    None => bail!("blob {} was never packed", blob.hash),
                };
                if !out_packs.contains_key(&pack_hash) {
                    let pack = packs
                        .get(&pack_hash)
                        .with_context(|| format!("no pack record for pack {}", pack_hash))?;
                    out_packs.insert(pack_hash, pack);
                }
                out_blobs.insert(blob.hash.clone(), blob);
            }
            out_files.insert(name_key(&file.name), file);
        }
        Ok(Manifest {
            created_utc: Some(chrono::Utc::now().to_rfc3339()),
            base_url,
            ignore_proxy,
            files: out_files.into_values().collect(),
            blobs: out_blobs.into_values().collect(),
            packs: out_packs.into_values().collect(),
        })
    }
}
