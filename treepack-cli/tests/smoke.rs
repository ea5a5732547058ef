use assert_cmd::prelude::*;
use predicates::prelude::*;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;

fn write_random_file(path: &Path, size: usize, seed: u64) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; size];
    rng.fill(&mut buf[..]);
    let mut f = File::create(path).unwrap();
    f.write_all(&buf).unwrap();
}

#[test]
fn end_to_end_pack_and_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::create_dir_all(root.join("logs")).unwrap();
    write_random_file(&root.join("bin/app.bin"), 200 * 1024, 1);
    fs::copy(root.join("bin/app.bin"), root.join("bin/app-copy.bin")).unwrap();
    fs::write(root.join("logs/run.log"), b"noise").unwrap();

    let target = tmp.path().join("out.manifest.json");
    let storage = tmp.path().join("packs");
    let mut cmd = Command::cargo_bin("treepack").unwrap();
    cmd.args([
        "--root",
        root.to_str().unwrap(),
        "--target",
        target.to_str().unwrap(),
        "--storage",
        storage.to_str().unwrap(),
        "--threads",
        "2",
        "--base-url",
        "https://cdn.example.com/p",
        "bin/",
        "!**/*.log",
    ]);
    cmd.assert().success().stderr(predicate::str::contains("Current options:"));

    let manifest: serde_json::Value =
        serde_json::from_reader(File::open(&target).unwrap()).unwrap();
    let files = manifest["Files"].as_array().unwrap();
    let names: Vec<&str> = files.iter().map(|f| f["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["bin/app-copy.bin", "bin/app.bin"]);
    // Identical content, one blob.
    assert_eq!(manifest["Blobs"].as_array().unwrap().len(), 1);
    assert_eq!(manifest["BaseUrl"].as_str().unwrap(), "https://cdn.example.com/p");

    // The referenced pack exists and decompresses back to the file bytes.
    let blob = &manifest["Blobs"][0];
    let pack_hash = blob["PackHash"].as_str().unwrap();
    let raw = zstd::decode_all(File::open(storage.join(pack_hash)).unwrap()).unwrap();
    let start = blob["PackOffset"].as_u64().unwrap() as usize;
    let end = start + blob["Size"].as_u64().unwrap() as usize;
    let original = fs::read(root.join("bin/app.bin")).unwrap();
    assert_eq!(&raw[start..end], &original[..]);
}

#[test]
fn second_run_with_reuse_writes_no_packs() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir_all(&root).unwrap();
    write_random_file(&root.join("a.bin"), 50 * 1024, 7);

    let target1 = tmp.path().join("first.manifest.json");
    let storage1 = tmp.path().join("packs1");
    Command::cargo_bin("treepack")
        .unwrap()
        .args([
            "--root",
            root.to_str().unwrap(),
            "--target",
            target1.to_str().unwrap(),
            "--storage",
            storage1.to_str().unwrap(),
        ])
        .assert()
        .success();

    let target2 = tmp.path().join("second.manifest.json");
    let storage2 = tmp.path().join("packs2");
    Command::cargo_bin("treepack")
        .unwrap()
        .args([
            "--root",
            root.to_str().unwrap(),
            "--target",
            target2.to_str().unwrap(),
            "--storage",
            storage2.to_str().unwrap(),
            "--reuse",
            target1.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert_eq!(fs::read_dir(&storage2).unwrap().count(), 0);
    let m1: serde_json::Value = serde_json::from_reader(File::open(&target1).unwrap()).unwrap();
    let m2: serde_json::Value = serde_json::from_reader(File::open(&target2).unwrap()).unwrap();
    assert_eq!(m1["Packs"], m2["Packs"]);
}

#[test]
fn broken_reuse_manifest_aborts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.bin"), vec![1u8; 1024]).unwrap();

    // Hand-made reuse manifest: the blob points at a pack the list omits.
    let hash = blake3::hash(&vec![1u8; 1024]).to_hex().to_string();
    let broken = serde_json::json!({
        "IgnoreProxy": false,
        "Files": [],
        "Blobs": [ { "Hash": hash, "Size": 1024, "PackHash": "feed", "PackOffset": 8 } ],
        "Packs": []
    });
    let broken_path = tmp.path().join("broken.manifest.json");
    fs::write(&broken_path, serde_json::to_string_pretty(&broken).unwrap()).unwrap();

    let storage = tmp.path().join("packs");
    Command::cargo_bin("treepack")
        .unwrap()
        .args([
            "--root",
            root.to_str().unwrap(),
            "--target",
            tmp.path().join("out.manifest.json").to_str().unwrap(),
            "--storage",
            storage.to_str().unwrap(),
            "--reuse",
            broken_path.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken manifest"));
    assert!(!storage.exists());
}
