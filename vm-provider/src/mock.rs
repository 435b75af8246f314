//! In-memory stand-ins for the hypervisor and the remote hosts.
//!
//! `MockRemoteExecutor` behaves like a small MariaDB host: it understands the
//! commands `DatabaseBootstrapper` sends and keeps per-host state, so tests
//! can check the end state and the idempotency of a bootstrap, not just the
//! command strings.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use vm_core::error::VmError;

use crate::error::{ProviderError, Result};
use crate::hypervisor::{DiskSource, Hypervisor, VmDescriptor, VmState};
use crate::remote::RemoteExecutor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervisorCall {
    Create(String),
    Delete(String),
    List,
}

#[derive(Default)]
struct MockHypervisorState {
    vms: Vec<VmDescriptor>,
    calls: Vec<HypervisorCall>,
    create_failure: Option<String>,
    delete_failure: Option<String>,
    list_failure: Option<String>,
    create_delay: Option<Duration>,
}

/// Hypervisor that keeps its VMs in memory.
#[derive(Default)]
pub struct MockHypervisor {
    state: Mutex<MockHypervisorState>,
}

fn command_failure(command: String, stderr: String) -> VmError {
    VmError::CommandFailed {
        command,
        code: Some(1),
        stderr,
    }
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockHypervisorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-register a VM.
    pub fn with_vm(self, name: &str, state: VmState) -> Self {
        self.lock().vms.push(VmDescriptor {
            name: name.to_string(),
            state,
        });
        self
    }

    pub fn fail_create(&self, reason: &str) {
        self.lock().create_failure = Some(reason.to_string());
    }

    pub fn fail_delete(&self, reason: &str) {
        self.lock().delete_failure = Some(reason.to_string());
    }

    pub fn fail_list(&self, reason: &str) {
        self.lock().list_failure = Some(reason.to_string());
    }

    /// Make `create_vm` take this long before doing anything.
    pub fn set_create_delay(&self, delay: Duration) {
        self.lock().create_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<HypervisorCall> {
        self.lock().calls.clone()
    }

    pub fn descriptor(&self, name: &str) -> VmDescriptor {
        self.lock()
            .vms
            .iter()
            .find(|vm| vm.name == name)
            .cloned()
            .unwrap_or_else(|| VmDescriptor {
                name: name.to_string(),
                state: VmState::Absent,
            })
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_vm(&self, name: &str, _disk: &DiskSource) -> Result<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(HypervisorCall::Create(name.to_string()));
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let command = format!("VBoxManage createvm --name {name} --register");
        if let Some(reason) = &state.create_failure {
            return Err(ProviderError::hypervisor(
                "register VM",
                command_failure(command, reason.clone()),
            ));
        }
        if state.vms.iter().any(|vm| vm.name == name) {
            return Err(ProviderError::hypervisor(
                "register VM",
                command_failure(
                    command,
                    format!("VBoxManage: error: Machine settings file '{name}.vbox' already exists"),
                ),
            ));
        }

        state.vms.push(VmDescriptor {
            name: name.to_string(),
            state: VmState::Running,
        });
        Ok(())
    }

    async fn delete_vm(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(HypervisorCall::Delete(name.to_string()));

        let command = format!("VBoxManage unregistervm {name} --delete");
        if let Some(reason) = &state.delete_failure {
            return Err(ProviderError::hypervisor(
                "unregister VM",
                command_failure(command, reason.clone()),
            ));
        }

        // Power-off failures on stopped VMs are ignored; only unregister counts.
        let before = state.vms.len();
        state.vms.retain(|vm| vm.name != name);
        if state.vms.len() == before {
            return Err(ProviderError::hypervisor(
                "unregister VM",
                command_failure(
                    command,
                    format!("VBoxManage: error: Could not find a registered machine named '{name}'"),
                ),
            ));
        }
        Ok(())
    }

    async fn list_vms(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.calls.push(HypervisorCall::List);
        if let Some(reason) = &state.list_failure {
            return Err(ProviderError::hypervisor(
                "list VMs",
                command_failure("VBoxManage list vms".to_string(), reason.clone()),
            ));
        }
        Ok(state.vms.iter().map(|vm| vm.name.clone()).collect())
    }
}

/// What a mock host looks like after the commands it has accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    pub engine_installed: bool,
    pub service_running: bool,
    pub databases: BTreeSet<String>,
    /// user -> password
    pub users: BTreeMap<String, String>,
    /// (user, database)
    pub grants: BTreeSet<(String, String)>,
    pub flushes: usize,
}

impl HostState {
    pub fn has_full_privileges(&self, user: &str, database: &str) -> bool {
        self.grants
            .contains(&(user.to_string(), database.to_string()))
    }
}

#[derive(Default)]
struct MockRemoteState {
    hosts: HashMap<String, HostState>,
    attempts: HashMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    unreachable_for: HashMap<String, usize>,
    failures: Vec<(String, String)>,
}

static CREATE_DB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CREATE DATABASE (IF NOT EXISTS )?`(\w+)`;$").expect("static regex is valid")
});
static CREATE_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CREATE USER (IF NOT EXISTS )?'(\w+)'@'%' IDENTIFIED BY '(.*)';$")
        .expect("static regex is valid")
});
static GRANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^GRANT ALL PRIVILEGES ON `(\w+)`\.\* TO '(\w+)'@'%';$")
        .expect("static regex is valid")
});

/// Undo `shell_quote` for a single argument.
fn shell_unquote(arg: &str) -> String {
    match arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')) {
        Some(inner) => inner.replace("'\"'\"'", "'"),
        None => arg.to_string(),
    }
}

fn sql_unescape(literal: &str) -> String {
    literal.replace("''", "'").replace("\\\\", "\\")
}

/// Remote executor backed by in-memory hosts.
#[derive(Default)]
pub struct MockRemoteExecutor {
    state: Mutex<MockRemoteState>,
}

impl MockRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockRemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call to `host` fails with a connection error.
    pub fn set_unreachable(&self, host: &str) {
        self.lock().unreachable.insert(host.to_string());
    }

    /// The first `attempts` calls to `host` fail with a connection error.
    pub fn set_unreachable_for(&self, host: &str, attempts: usize) {
        self.lock()
            .unreachable_for
            .insert(host.to_string(), attempts);
    }

    /// Any command containing `pattern` exits 1 with `stderr`.
    pub fn fail_commands_containing(&self, pattern: &str, stderr: &str) {
        self.lock()
            .failures
            .push((pattern.to_string(), stderr.to_string()));
    }

    /// Every command sent to `host`, including failed attempts.
    pub fn attempts(&self, host: &str) -> Vec<String> {
        self.lock().attempts.get(host).cloned().unwrap_or_default()
    }

    pub fn host_state(&self, host: &str) -> HostState {
        self.lock().hosts.get(host).cloned().unwrap_or_default()
    }

    pub fn total_attempts(&self) -> usize {
        self.lock().attempts.values().map(Vec::len).sum()
    }
}

fn exit(host: &str, stderr: &str) -> ProviderError {
    ProviderError::RemoteExit {
        host: host.to_string(),
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

fn apply_sql(host_name: &str, host: &mut HostState, sql: &str) -> Result<()> {
    if let Some(caps) = CREATE_DB.captures(sql) {
        let name = caps[2].to_string();
        if caps.get(1).is_none() && host.databases.contains(&name) {
            return Err(exit(
                host_name,
                &format!("ERROR 1007 (HY000): Can't create database '{name}'; database exists"),
            ));
        }
        host.databases.insert(name);
        return Ok(());
    }

    if let Some(caps) = CREATE_USER.captures(sql) {
        let user = caps[2].to_string();
        if host.users.contains_key(&user) {
            if caps.get(1).is_none() {
                return Err(exit(
                    host_name,
                    &format!("ERROR 1396 (HY000): Operation CREATE USER failed for '{user}'@'%'"),
                ));
            }
            return Ok(());
        }
        host.users.insert(user, sql_unescape(&caps[3]));
        return Ok(());
    }

    if let Some(caps) = GRANT.captures(sql) {
        let (database, user) = (caps[1].to_string(), caps[2].to_string());
        if !host.databases.contains(&database) {
            return Err(exit(
                host_name,
                &format!("ERROR 1049 (42000): Unknown database '{database}'"),
            ));
        }
        if !host.users.contains_key(&user) {
            return Err(exit(
                host_name,
                "ERROR 1133 (28000): Can't find any matching row in the user table",
            ));
        }
        host.grants.insert((user, database));
        return Ok(());
    }

    if sql == "FLUSH PRIVILEGES;" {
        host.flushes += 1;
        return Ok(());
    }

    Err(exit(
        host_name,
        "ERROR 1064 (42000): You have an error in your SQL syntax",
    ))
}

#[async_trait]
impl RemoteExecutor for MockRemoteExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<String> {
        let mut state = self.lock();
        state
            .attempts
            .entry(host.to_string())
            .or_default()
            .push(command.to_string());

        let remaining = state.unreachable_for.get(host).copied().unwrap_or(0);
        if state.unreachable.contains(host) || remaining > 0 {
            if remaining > 0 {
                state.unreachable_for.insert(host.to_string(), remaining - 1);
            }
            return Err(ProviderError::Connection {
                host: host.to_string(),
                reason: "ssh: connect to host port 22: No route to host".to_string(),
            });
        }

        if let Some((_, stderr)) = state
            .failures
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Err(exit(host, stderr));
        }

        let host_state = state.hosts.entry(host.to_string()).or_default();

        if command.starts_with("dpkg -s ") {
            host_state.engine_installed = true;
            return Ok(String::new());
        }

        if command.starts_with("systemctl ") {
            if !host_state.engine_installed {
                return Err(exit(host, "Failed to start mariadb.service: Unit not found."));
            }
            host_state.service_running = true;
            return Ok(String::new());
        }

        if let Some(quoted) = command.strip_prefix("sudo mysql -e ") {
            if !host_state.service_running {
                return Err(exit(
                    host,
                    "ERROR 2002 (HY000): Can't connect to local server through socket",
                ));
            }
            apply_sql(host, host_state, &shell_unquote(quoted))?;
            return Ok(String::new());
        }

        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseBootstrapper, DatabaseCredential};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_hypervisor_lifecycle() {
        let hv = MockHypervisor::new().with_vm("old", VmState::Stopped);

        hv.create_vm("db01", &DiskSource::default()).await.unwrap();
        assert_eq!(hv.descriptor("db01").state, VmState::Running);
        assert_eq!(hv.list_vms().await.unwrap(), vec!["old", "db01"]);

        // Stopped VMs delete cleanly.
        hv.delete_vm("old").await.unwrap();
        assert_eq!(hv.descriptor("old").state, VmState::Absent);

        let err = hv.create_vm("db01", &DiskSource::default()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_mock_executor_tracks_database_state() {
        let executor = Arc::new(MockRemoteExecutor::new());
        let bootstrapper = DatabaseBootstrapper::new(executor.clone(), Default::default());
        let credential = DatabaseCredential::new("app", "appuser", "o'brien\\1");

        bootstrapper
            .bootstrap("db01", Some(&credential))
            .await
            .unwrap();

        let host = executor.host_state("db01");
        assert!(host.engine_installed);
        assert!(host.service_running);
        assert!(host.databases.contains("app"));
        assert_eq!(host.users.get("appuser").map(String::as_str), Some("o'brien\\1"));
        assert!(host.has_full_privileges("appuser", "app"));
        assert_eq!(host.flushes, 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_sql_is_rejected_by_mock() {
        let executor = MockRemoteExecutor::new();
        executor.run("h", "dpkg -s x").await.unwrap();
        executor.run("h", "systemctl start x").await.unwrap();
        executor
            .run("h", "sudo mysql -e 'CREATE DATABASE `app`;'")
            .await
            .unwrap();
        let err = executor
            .run("h", "sudo mysql -e 'CREATE DATABASE `app`;'")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("database exists"));
    }

    #[tokio::test]
    async fn test_unreachable_for_recovers() {
        let executor = MockRemoteExecutor::new();
        executor.set_unreachable_for("db01", 2);

        assert!(executor.run("db01", "true").await.unwrap_err().is_unreachable());
        assert!(executor.run("db01", "true").await.unwrap_err().is_unreachable());
        assert!(executor.run("db01", "true").await.is_ok());
        assert_eq!(executor.attempts("db01").len(), 3);
    }
}
