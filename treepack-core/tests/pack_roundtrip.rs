use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::path::Path;

use treepack_core::dedup::ShardedMap;
use treepack_core::hashing;
use treepack_core::manifest::{BlobRecord, FileRecord, PackRecord};
use treepack_core::pack::{write_pack_files, PackConfig, PACK_SIGNATURE};
use treepack_core::progress::Progress;
use treepack_core::scan;

struct Built {
    files: ShardedMap<FileRecord>,
    blobs: ShardedMap<BlobRecord>,
    packs: ShardedMap<PackRecord>,
}

fn hash_and_pack(root: &Path, storage: &Path, optimal: u64, threads: usize) -> Built {
    let candidates = scan::find_files(root, &[]).unwrap();
    let files: ShardedMap<FileRecord> = ShardedMap::new();
    let blobs: ShardedMap<BlobRecord> = ShardedMap::new();
    hashing::generate_blob_records(root, &candidates, threads, &files, &blobs, &Progress::new(false))
        .unwrap();
    let packs: ShardedMap<PackRecord> = ShardedMap::new();
    let cfg = PackConfig {
        storage: storage.to_path_buf(),
        optimal_size: optimal,
        threads,
        remote_path: None,
    };
    write_pack_files(&cfg, root, &files, &blobs, &packs, &Progress::new(false)).unwrap();
    Built { files, blobs, packs }
}

fn small_tree(root: &Path) {
    fs::write(root.join("a.txt"), b"alpha alpha alpha").unwrap();
    fs::write(root.join("b.txt"), b"bravo").unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/twin.txt"), b"alpha alpha alpha").unwrap();
    fs::write(root.join("sub/empty.bin"), b"").unwrap();
}

#[test]
fn every_blob_ends_up_packed() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    small_tree(&root);
    let storage = td.path().join("packs");
    let built = hash_and_pack(&root, &storage, 10 * 1024 * 1024, 3);

    assert_eq!(built.files.len(), 4);
    assert_eq!(built.blobs.len(), 3); // twin dedups into a.txt's blob
    for blob in built.blobs.values() {
        let pack_hash = blob.pack_hash.expect("blob left unpacked");
        assert!(built.packs.get(&pack_hash).is_some());
        assert!(storage.join(&pack_hash).is_file());
    }
    // Nothing but hash-named packs in the storage directory.
    for entry in fs::read_dir(&storage).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert_eq!(name.len(), 64, "unexpected storage entry {name}");
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn offsets_slice_back_to_original_bytes() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    small_tree(&root);
    let storage = td.path().join("packs");
    let built = hash_and_pack(&root, &storage, 10 * 1024 * 1024, 2);

    for pack in built.packs.values() {
        let raw = zstd::decode_all(File::open(storage.join(&pack.hash)).unwrap()).unwrap();
        assert_eq!(raw.len() as u64, pack.size);
        assert_eq!(&raw[..8], &PACK_SIGNATURE[..]);
        assert_eq!(blake3::hash(&raw).to_hex().to_string(), pack.hash);
        let on_disk = fs::metadata(storage.join(&pack.hash)).unwrap().len();
        assert_eq!(on_disk, pack.compressed_size);
    }
    for file in built.files.values() {
        let blob = built.blobs.get(&file.hash).unwrap();
        let pack_hash = blob.pack_hash.unwrap();
        let raw = zstd::decode_all(File::open(storage.join(&pack_hash)).unwrap()).unwrap();
        let start = blob.pack_offset as usize;
        let end = start + blob.size as usize;
        let original = fs::read(root.join(&file.name)).unwrap();
        assert_eq!(&raw[start..end], &original[..], "mismatch for {}", file.name);
    }
}

#[test]
fn pack_hashes_are_stable_for_identical_input() {
    let td = tempfile::tempdir().unwrap();
    for run in ["one", "two"] {
        let root = td.path().join(run).join("data");
        fs::create_dir_all(&root).unwrap();
        small_tree(&root);
    }
    let s1 = td.path().join("one/packs");
    let s2 = td.path().join("two/packs");
    let b1 = hash_and_pack(&td.path().join("one/data"), &s1, 10 * 1024 * 1024, 1);
    let b2 = hash_and_pack(&td.path().join("two/data"), &s2, 10 * 1024 * 1024, 1);

    let mut h1: Vec<String> = b1.packs.values().into_iter().map(|p| p.hash).collect();
    let mut h2: Vec<String> = b2.packs.values().into_iter().map(|p| p.hash).collect();
    h1.sort();
    h2.sort();
    assert_eq!(h1, h2);
}

#[test]
fn optimal_size_closes_packs() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    // Incompressible payloads so the on-disk size tracks the input.
    let mut rng = rand::rngs::StdRng::seed_from_u64(4242);
    for name in ["r1.bin", "r2.bin", "r3.bin"] {
        let mut buf = vec![0u8; 300 * 1024];
        rng.fill(&mut buf[..]);
        fs::write(root.join(name), &buf).unwrap();
    }
    let storage = td.path().join("packs");
    let built = hash_and_pack(&root, &storage, 1, 1);

    // A one-byte optimal size closes every container after its first blob.
    assert_eq!(built.packs.len(), 3);
    for blob in built.blobs.values() {
        assert_eq!(blob.pack_offset, 8);
    }
}

#[test]
fn committing_an_already_existing_pack_discards_the_temp_copy() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    small_tree(&root);
    let storage = td.path().join("packs");

    let first = hash_and_pack(&root, &storage, 10 * 1024 * 1024, 1);
    let count_before = fs::read_dir(&storage).unwrap().count();
    // Same tree again into the same storage: every container already exists.
    let second = hash_and_pack(&root, &storage, 10 * 1024 * 1024, 1);
    let count_after = fs::read_dir(&storage).unwrap().count();

    assert_eq!(count_before, count_after);
    let mut h1: Vec<String> = first.packs.values().into_iter().map(|p| p.hash).collect();
    let mut h2: Vec<String> = second.packs.values().into_iter().map(|p| p.hash).collect();
    h1.sort();
    h2.sort();
    assert_eq!(h1, h2);
    // No temp files survive the discard path.
    for entry in fs::read_dir(&storage).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(!name.starts_with(".tmp"), "leftover temp file {name}");
    }
}
