// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use assert_cmd::Command;
use predicates::prelude::*;

use cellgate_core::io::write_numpy;

fn cellgate() -> Command {
    Command::cargo_bin("cellgate").unwrap()
}

#[test]
fn test_help_lists_commands() {
    cellgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("worker"))
        .stdout(predicate::str::contains("segment"));
}

#[test]
fn test_worker_misconfigured_envelope() {
    let base = tempfile::tempdir().unwrap();
    let image = base.path().join("image.npy");
    write_numpy(&image, vec![0u8, 1, 2, 3], vec![2, 2]).unwrap();

    cellgate()
        .env_remove("RUST_LOG")
        .args(["worker", "--image"])
        .arg(&image)
        .args(["--model_type", "CellposeSAM", "--model_name", "cpsam", "--base-dir"])
        .arg(base.path())
        .assert()
        .success()
        .stdout(predicate::eq(
            "{\"status\":\"error\",\"message\":\"Server Error: Model misconfigured.\"}\n",
        ));
}

#[test]
fn test_worker_rejects_unknown_family() {
    cellgate()
        .args([
            "worker",
            "--image",
            "image.png",
            "--model_type",
            "Cellpose2",
            "--model_name",
            "cyto",
        ])
        .assert()
        .failure();
}

#[test]
fn test_models_json_listing() {
    let base = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(base.path().join("models").join("CellposeSAM").join("tuned")).unwrap();

    cellgate()
        .args(["models", "--json", "--base-dir"])
        .arg(base.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"CellposeSAM\": [\n    \"tuned\"\n  ]"))
        .stdout(predicate::str::contains("\"Cellpose3.1\": []"));
}

#[test]
fn test_mask2outlines_text() {
    let dir = tempfile::tempdir().unwrap();
    let mask = dir.path().join("mask.npy");
    let output = dir.path().join("mask.txt");

    let mut labels = vec![0u32; 64];
    for y in 0..3 {
        for x in 0..3 {
            labels[y * 8 + x] = 1;
            labels[(y + 4) * 8 + x + 4] = 2;
        }
    }
    write_numpy(&mask, labels, vec![8, 8]).unwrap();

    cellgate()
        .args(["utils", "mask2outlines", "--mask"])
        .arg(&mask)
        .arg("--output")
        .arg(&output)
        .arg("--rois")
        .assert()
        .success();

    let text = std::fs::read_to_string(&output).unwrap();

    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("0,0,"));
    assert!(lines[1].starts_with("4,4,"));
    assert!(dir.path().join("mask_rois.zip").is_file());
}

#[test]
fn test_mask2outlines_rejects_bad_extension() {
    let dir = tempfile::tempdir().unwrap();

    cellgate()
        .args(["utils", "mask2outlines", "--mask", "mask.npy", "--output"])
        .arg(dir.path().join("outlines.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid file extension"));
}
