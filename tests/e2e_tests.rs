//! End-to-end tests for eix
//! These tests verify the complete system can be built and run
#![allow(deprecated)]

use assert_cmd::cargo::CommandCargoExt;
use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Helper to create a test manifest file
fn create_test_manifest(dir: &TempDir, content: &str) -> PathBuf {
    let manifest_path = dir.path().join("eix.xml");
    let mut file = File::create(&manifest_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    manifest_path
}

fn free_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Kills the server when the test ends, even on failure
struct Server(Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn test_binary_exists() {
    let _cmd = Command::cargo_bin("eix").unwrap();
}

#[test]
fn test_missing_manifest_fails() {
    AssertCommand::cargo_bin("eix")
        .unwrap()
        .arg("/nonexistent/eix.xml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Manifest file not found"));
}

#[test]
fn test_with_invalid_xml() {
    let temp_dir = TempDir::new().unwrap();
    let manifest_path = create_test_manifest(&temp_dir, "not valid xml");

    AssertCommand::cargo_bin("eix")
        .unwrap()
        .arg(manifest_path.to_str().unwrap())
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_with_invalid_permission() {
    let temp_dir = TempDir::new().unwrap();
    let xml = r#"<manifest>
    <principal>
        <id>editor</id>
        <key>secret</key>
        <permission>everything</permission>
    </principal>
</manifest>"#;
    let manifest_path = create_test_manifest(&temp_dir, xml);

    AssertCommand::cargo_bin("eix")
        .unwrap()
        .arg(manifest_path.to_str().unwrap())
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid permissions for principal 'editor'"));
}

#[test]
fn test_serves_collection() {
    let temp_dir = TempDir::new().unwrap();
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
    <route>
        <uri>/notes/?</uri>
        <responder>notes</responder>
    </route>
    <collection>
        <name>notes</name>
        <field>
            <name>title</name>
        </field>
    </collection>
</manifest>"#;
    let manifest_path = create_test_manifest(&temp_dir, xml);
    let address = free_address();

    let mut cmd = Command::cargo_bin("eix").unwrap();
    cmd.arg(manifest_path.to_str().unwrap())
        .env("BIND_ADDRESS", &address);
    let _server = Server(cmd.spawn().unwrap());

    let client = reqwest::blocking::Client::new();
    let url = format!("http://{}/notes/", address);
    let started = Instant::now();
    let response = loop {
        match client.get(&url).header("Accept", "application/json").send() {
            Ok(response) => break response,
            Err(_) if started.elapsed() < Duration::from_secs(10) => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => panic!("Server did not come up: {}", e),
        }
    };

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().unwrap(), "[]");
}
