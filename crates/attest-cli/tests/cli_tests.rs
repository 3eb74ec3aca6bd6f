use assert_cmd::Command;
use attest_core::encoding::CompactEncoding;
use attest_core::request::TreeCheckpoint;
use attest_core::{text, LogRequest, PublicKey};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const PASSWORD: &str = "correct-password";

fn keys_dir() -> TempDir {
    let dir = tempdir().unwrap();
    let settings = serde_json::json!({ "kdf": { "custom": { "ops": 1, "mem": 65536 } } });
    fs::write(dir.path().join("settings.json"), settings.to_string()).unwrap();
    dir
}

fn attest(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("attest").unwrap();
    cmd.arg("--keys-dir")
        .arg(dir)
        .env_remove("ATTEST_KEYS_DIR")
        .env_remove("ATTEST_PASSWORD")
        .env_remove("ATTEST_PASSWORD_CONFIRM")
        .env_remove("ATTEST_NEW_PASSWORD")
        .env_remove("ATTEST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

fn generate(dir: &Path, name: &str) -> String {
    stdout_of(
        attest(dir)
            .args(["generate", "--name", name])
            .env("ATTEST_PASSWORD", PASSWORD),
    )
    .trim()
    .to_string()
}

fn request_for(signers: &[&str]) -> String {
    let request = LogRequest {
        version: 2,
        key: [5u8; 32],
        fork: 0,
        length: 12,
        tree_hash: [6u8; 32],
        content: Some(TreeCheckpoint {
            length: 3,
            tree_hash: [7u8; 32],
        }),
        signers: signers
            .iter()
            .map(|k| PublicKey::from_base64(k).unwrap())
            .collect(),
    };
    text::encode(request.to_bytes())
}

fn sign(dir: &Path, request: &str, id: &str) -> String {
    stdout_of(
        attest(dir)
            .args(["sign", request, "-i", id, "--yes"])
            .env("ATTEST_PASSWORD", PASSWORD),
    )
    .trim()
    .to_string()
}

#[test]
fn generate_writes_key_pair_and_prints_public_key() {
    let dir = keys_dir();
    let public_key = generate(dir.path(), "default");
    assert!(PublicKey::from_base64(&public_key).is_ok());
    assert!(dir.path().join("default").is_file());
    let on_disk = fs::read_to_string(dir.path().join("default.public")).unwrap();
    assert_eq!(on_disk.trim(), public_key);

    attest(dir.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains(public_key.as_str()));
}

#[test]
fn generate_refuses_existing_key() {
    let dir = keys_dir();
    let first = generate(dir.path(), "default");
    attest(dir.path())
        .args(["generate", "--name", "default"])
        .env("ATTEST_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("already exists"));
    let on_disk = fs::read_to_string(dir.path().join("default.public")).unwrap();
    assert_eq!(on_disk.trim(), first);
}

#[test]
fn generate_rejects_short_password() {
    let dir = keys_dir();
    attest(dir.path())
        .arg("generate")
        .env("ATTEST_PASSWORD", "short")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8"));
    assert!(!dir.path().join("default").exists());
}

#[test]
fn generate_rejects_confirmation_mismatch() {
    let dir = keys_dir();
    attest(dir.path())
        .arg("generate")
        .env("ATTEST_PASSWORD", PASSWORD)
        .env("ATTEST_PASSWORD_CONFIRM", "different-password")
        .assert()
        .failure()
        .stderr(predicate::str::contains("do not match"));
    assert!(!dir.path().join("default").exists());
}

#[test]
fn sign_then_verify_with_literal_key() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let request = request_for(&[&key]);
    let response = sign(dir.path(), &request, "default");

    attest(dir.path())
        .args(["verify", &response, &request, &key])
        .assert()
        .success()
        .stdout(predicate::str::contains("Drive signing request (v2)"))
        .stderr(predicate::str::contains("The signature is valid."));
}

#[test]
fn verify_against_all_known_keys() {
    let dir = keys_dir();
    let _other = generate(dir.path(), "other");
    let key = generate(dir.path(), "release");
    let request = request_for(&[&key]);
    let response = sign(dir.path(), &request, "release");

    attest(dir.path())
        .args(["verify", &response, &request])
        .assert()
        .success()
        .stdout(predicate::str::contains(key.as_str()));
}

#[test]
fn verify_with_key_file_and_id() {
    let dir = keys_dir();
    let key = generate(dir.path(), "release");
    let request = request_for(&[&key]);
    let response = sign(dir.path(), &request, "release");

    attest(dir.path())
        .args(["verify", &response, &request, "-i", "release.public"])
        .assert()
        .success();

    let file = dir.path().join("release.public");
    attest(dir.path())
        .args(["verify", &response, &request, file.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn verify_with_wrong_key_fails() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let other = generate(dir.path(), "other");
    let request = request_for(&[&key]);
    let response = sign(dir.path(), &request, "default");

    attest(dir.path())
        .args(["verify", &response, &request, &other])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Public key does not match"));
}

#[test]
fn verify_tampered_response_fails() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let request = request_for(&[&key]);
    let response = sign(dir.path(), &request, "default");

    let mut raw = text::decode(&response).unwrap();
    let last = raw.len() - 2;
    raw[last] ^= 0x01;
    let tampered = text::encode(raw);

    attest(dir.path())
        .args(["verify", &tampered, &request, &key])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn sign_with_wrong_password_prints_nothing() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let request = request_for(&[&key]);

    attest(dir.path())
        .args(["sign", &request, "--yes"])
        .env("ATTEST_PASSWORD", "wrong-password")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Key decryption failed"));
}

#[test]
fn sign_refuses_request_for_other_signers() {
    let dir = keys_dir();
    let _key = generate(dir.path(), "default");
    let other = generate(dir.path(), "other");
    let request = request_for(&[&other]);

    attest(dir.path())
        .args(["sign", &request, "--yes"])
        .env("ATTEST_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("not a signer"));
}

#[test]
fn sign_declined_at_confirmation() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let request = request_for(&[&key]);

    attest(dir.path())
        .args(["sign", &request])
        .env("ATTEST_PASSWORD", PASSWORD)
        .write_stdin("n\n")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("request rejected"));

    attest(dir.path())
        .args(["sign", &request])
        .env("ATTEST_PASSWORD", PASSWORD)
        .write_stdin("maybe\ny\n")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn malformed_request_rejected() {
    let dir = keys_dir();
    generate(dir.path(), "default");
    attest(dir.path())
        .args(["sign", "!!not-base64!!", "--yes"])
        .env("ATTEST_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not decode the signing request"));
}

#[test]
fn passwd_rotates_password() {
    let dir = keys_dir();
    let key = generate(dir.path(), "default");
    let request = request_for(&[&key]);

    attest(dir.path())
        .arg("passwd")
        .env("ATTEST_PASSWORD", PASSWORD)
        .env("ATTEST_NEW_PASSWORD", "rotated-password")
        .assert()
        .success();

    attest(dir.path())
        .args(["sign", &request, "--yes"])
        .env("ATTEST_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key decryption failed"));

    let response = stdout_of(
        attest(dir.path())
            .args(["sign", &request, "--yes"])
            .env("ATTEST_PASSWORD", "rotated-password"),
    );
    attest(dir.path())
        .args(["verify", response.trim(), &request, &key])
        .assert()
        .success();
}

#[test]
fn passwd_with_wrong_current_password_keeps_key() {
    let dir = keys_dir();
    generate(dir.path(), "default");
    let before = fs::read(dir.path().join("default")).unwrap();

    attest(dir.path())
        .arg("passwd")
        .env("ATTEST_PASSWORD", "wrong-password")
        .env("ATTEST_NEW_PASSWORD", "rotated-password")
        .assert()
        .failure();
    assert_eq!(fs::read(dir.path().join("default")).unwrap(), before);
}
