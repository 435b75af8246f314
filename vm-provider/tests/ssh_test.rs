//! Tests for the SSH executor against a fake `ssh` that runs the command locally.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use tempfile::TempDir;
use vm_provider::{ProviderError, RemoteExecutor, SshConfig, SshExecutor};

/// Writes a fake `ssh` that logs its arguments and executes its last one.
fn fake_ssh(dir: &TempDir) -> String {
    let log = dir.path().join("ssh.log");
    let script = format!(
        "#!/bin/sh\n\
         echo \"$*\" >> '{}'\n\
         for last; do :; done\n\
         exec sh -c \"$last\"\n",
        log.display()
    );
    let path = dir.path().join("ssh");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn executor(dir: &TempDir, command_timeout_secs: u64) -> SshExecutor {
    SshExecutor::new(SshConfig {
        ssh_path: fake_ssh(dir),
        user: "admin".to_string(),
        host_suffix: ".vms.local".to_string(),
        command_timeout_secs,
        ..Default::default()
    })
    .expect("fake ssh should be found")
}

#[tokio::test]
async fn test_run_returns_trimmed_output() {
    let dir = TempDir::new().unwrap();
    let ssh = executor(&dir, 10);

    let out = ssh.run("db01", "printf '  ready\\n'").await.unwrap();
    assert_eq!(out, "ready");

    let log = fs::read_to_string(dir.path().join("ssh.log")).unwrap();
    assert!(log.contains("BatchMode=yes"));
    assert!(log.contains("-- admin@db01.vms.local"));
}

#[tokio::test]
async fn test_nonzero_exit_is_remote_exit() {
    let dir = TempDir::new().unwrap();
    let ssh = executor(&dir, 10);

    let err = ssh.run("db01", "echo 'no such package' >&2; exit 100").await.unwrap_err();
    match &err {
        ProviderError::RemoteExit { host, code, stderr } => {
            assert_eq!(host, "db01.vms.local");
            assert_eq!(*code, Some(100));
            assert_eq!(stderr, "no such package");
        }
        other => panic!("Expected RemoteExit, got {other:?}"),
    }
    assert!(!err.is_unreachable());
}

#[tokio::test]
async fn test_status_255_is_connection_failure() {
    let dir = TempDir::new().unwrap();
    let ssh = executor(&dir, 10);

    let err = ssh
        .run("db01", "echo 'ssh: connect to host db01 port 22: Connection refused' >&2; exit 255")
        .await
        .unwrap_err();
    assert!(err.is_unreachable());
    assert!(err.to_string().contains("Connection refused"));
}

#[tokio::test]
async fn test_command_timeout() {
    let dir = TempDir::new().unwrap();
    let ssh = executor(&dir, 1);

    let err = ssh.run("db01", "sleep 5").await.unwrap_err();
    assert!(matches!(err, ProviderError::RemoteTimeout { secs: 1, .. }));
    assert!(err.is_unreachable());
}

#[tokio::test]
async fn test_invalid_host_is_rejected_before_ssh() {
    let dir = TempDir::new().unwrap();
    let ssh = executor(&dir, 10);

    let err = ssh.run("db01 -oProxyCommand=x", "true").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidInput(_)));
    assert!(!dir.path().join("ssh.log").exists());
}
