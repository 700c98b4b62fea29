mod fixtures;

use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

fn write_sample(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    File::create(&path).unwrap().write_all(bytes).unwrap();
    path
}

fn lines(output: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn it_dumps_a_store_as_json() {
    let d = tempdir().unwrap();
    let sample = write_sample(&d, "sample.bin", &sample_store());

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args([arg(&sample)]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"ab\""))
        .stdout(predicate::str::contains("notepad.exe"))
        .stdout(predicate::str::contains("D5CDD505-2E9C-101B-9397-08002B2CF9AE"));
}

#[test]
fn it_writes_one_line_per_input_in_order() {
    let d = tempdir().unwrap();
    let first = write_sample(&d, "a.bin", &sample_store());
    let second = write_sample(&d, "b.bin", &[4, 0, 0, 0]);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args(["-o", "jsonl", "-t", "2", arg(&first), arg(&second)]);
    let output = cmd.output().unwrap();
    assert!(output.status.success());

    let records = lines(&output.stdout);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["source"], arg(&first));
    assert_eq!(records[0]["storages"].as_array().unwrap().len(), 2);
    assert_eq!(records[1]["source"], arg(&second));
    assert_eq!(records[1]["storages"].as_array().unwrap().len(), 0);
}

#[test]
fn it_expands_glob_patterns() {
    let d = tempdir().unwrap();
    write_sample(&d, "one.bin", &sample_store());
    write_sample(&d, "two.bin", &sample_store());
    write_sample(&d, "ignored.txt", b"not a store");

    let pattern = d.path().join("*.bin");
    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args(["-o", "jsonl", arg(&pattern)]);
    let output = cmd.output().unwrap();
    assert!(output.status.success());

    assert_eq!(lines(&output.stdout).len(), 2);
}

#[test]
fn it_supports_stdin_input_with_dash() {
    let d = tempdir().unwrap();
    let sample = write_sample(&d, "sample.bin", &sample_store());

    let mut cmd_file = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd_file.args(["-o", "jsonl", arg(&sample)]);
    let out_file = cmd_file.output().unwrap();
    assert!(out_file.status.success());

    let mut cmd_stdin = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd_stdin.args(["-o", "jsonl", "-"]);
    cmd_stdin.stdin(File::open(&sample).unwrap());
    let out_stdin = cmd_stdin.output().unwrap();
    assert!(out_stdin.status.success());

    let mut from_file = lines(&out_file.stdout);
    let mut from_stdin = lines(&out_stdin.stdout);
    assert_eq!(from_stdin[0]["source"], "-");
    from_file[0]["source"] = serde_json::Value::Null;
    from_stdin[0]["source"] = serde_json::Value::Null;
    assert_eq!(from_file, from_stdin);
}

#[test]
fn it_decodes_at_a_hex_offset() {
    let d = tempdir().unwrap();
    let mut bytes = vec![0xEE; 16];
    bytes.extend(sample_store());
    let sample = write_sample(&d, "embedded.bin", &bytes);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args(["-o", "jsonl", "--offset", "0x10", arg(&sample)]);
    let output = cmd.output().unwrap();
    assert!(output.status.success());
    assert_eq!(lines(&output.stdout)[0]["storages"].as_array().unwrap().len(), 2);
}

#[test]
fn it_fails_on_a_truncated_store() {
    let d = tempdir().unwrap();
    let mut bytes = sample_store();
    bytes.truncate(bytes.len() / 2);
    let sample = write_sample(&d, "truncated.bin", &bytes);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args([arg(&sample)]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to decode property store"));
}

#[test]
fn it_fails_on_a_missing_input() {
    let d = tempdir().unwrap();
    let missing = d.path().join("missing.bin");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args([arg(&missing)]);

    cmd.assert().failure().code(1);
}

#[test]
fn it_respects_directory_output() {
    let d = tempdir().unwrap();
    let f = d.as_ref().join("nested").join("test.out");
    let sample = write_sample(&d, "sample.bin", &sample_store());

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args(["-f", &f.to_string_lossy(), arg(&sample)]);

    assert!(
        cmd.output().unwrap().stdout.is_empty(),
        "Expected output to be printed to file, but was printed to stdout"
    );

    let mut expected = vec![];
    File::open(&f).unwrap().read_to_end(&mut expected).unwrap();
    assert!(
        !expected.is_empty(),
        "Expected output to be printed to file"
    )
}

#[test]
fn test_it_refuses_to_overwrite_directory() {
    let d = tempdir().unwrap();
    let sample = write_sample(&d, "sample.bin", &sample_store());

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args(["-f", &d.path().to_string_lossy(), arg(&sample)]);

    cmd.assert().failure().code(1);
}

#[test]
fn test_it_overwrites_file_anyways_if_passed_flag() {
    let d = tempdir().unwrap();
    let f = d.as_ref().join("test.out");
    fs::write(&f, b"I'm a file!").unwrap();
    let sample = write_sample(&d, "sample.bin", &sample_store());

    let mut cmd = Command::new(assert_cmd::cargo_bin!("wps_dump"));
    cmd.args([
        "-f",
        &f.to_string_lossy(),
        "--no-confirm-overwrite",
        arg(&sample),
    ]);

    cmd.assert().success();

    let written = fs::read_to_string(&f).unwrap();
    assert!(written.contains("\"storages\""));
}
