//! MariaDB bootstrap over the remote executor.
//!
//! Every command is phrased as "if missing" / "if not exists" so running the
//! whole bootstrap again against a configured host changes nothing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vm_core::validation::validate_sql_identifier;

use crate::error::{ProviderError, Result};
use crate::remote::{shell_quote, RemoteExecutor};

/// Database name plus the user that gets full privileges on it.
///
/// The password is supplied by the caller for one workflow and is never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredential {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DatabaseCredential {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_sql_identifier("Database name", &self.database)?;
        validate_sql_identifier("Database user", &self.username)?;
        if self.password.is_empty() {
            return Err(ProviderError::InvalidInput(
                "Database password required".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredential")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Package and service names of the engine to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseEngineConfig {
    pub package: String,
    pub service: String,
}

impl Default for DatabaseEngineConfig {
    fn default() -> Self {
        Self {
            package: "mariadb-server".to_string(),
            service: "mariadb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    InstallEngine,
    StartService,
    CreateDatabase,
    CreateUser,
    GrantPrivileges,
    FlushPrivileges,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InstallEngine => "install database engine",
            Self::StartService => "start database service",
            Self::CreateDatabase => "create database",
            Self::CreateUser => "create database user",
            Self::GrantPrivileges => "grant privileges",
            Self::FlushPrivileges => "flush privileges",
        };
        f.write_str(label)
    }
}

/// Escape a value for a single-quoted SQL string literal.
fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn mysql_exec(sql: &str) -> String {
    format!("sudo mysql -e {}", shell_quote(sql))
}

pub struct DatabaseBootstrapper {
    executor: Arc<dyn RemoteExecutor>,
    engine: DatabaseEngineConfig,
}

impl DatabaseBootstrapper {
    pub fn new(executor: Arc<dyn RemoteExecutor>, engine: DatabaseEngineConfig) -> Self {
        Self { executor, engine }
    }

    /// The ordered remote commands for a bootstrap.
    ///
    /// Without a credential only the engine is installed and started.
    pub fn plan(&self, credential: Option<&DatabaseCredential>) -> Result<Vec<(BootstrapStep, String)>> {
        let package = shell_quote(&self.engine.package);
        let service = shell_quote(&self.engine.service);

        let mut steps = vec![
            (
                BootstrapStep::InstallEngine,
                format!(
                    "dpkg -s {package} >/dev/null 2>&1 || \
                     (sudo apt-get update -qq && \
                     sudo DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {package})"
                ),
            ),
            (
                BootstrapStep::StartService,
                format!("systemctl is-active --quiet {service} || sudo systemctl start {service}"),
            ),
        ];

        if let Some(credential) = credential {
            credential.validate()?;
            let database = &credential.database;
            let user = sql_string(&credential.username);
            let password = sql_string(&credential.password);

            steps.push((
                BootstrapStep::CreateDatabase,
                mysql_exec(&format!("CREATE DATABASE IF NOT EXISTS `{database}`;")),
            ));
            steps.push((
                BootstrapStep::CreateUser,
                mysql_exec(&format!(
                    "CREATE USER IF NOT EXISTS {user}@'%' IDENTIFIED BY {password};"
                )),
            ));
            steps.push((
                BootstrapStep::GrantPrivileges,
                mysql_exec(&format!("GRANT ALL PRIVILEGES ON `{database}`.* TO {user}@'%';")),
            ));
            steps.push((
                BootstrapStep::FlushPrivileges,
                mysql_exec("FLUSH PRIVILEGES;"),
            ));
        }

        Ok(steps)
    }

    /// Ensure the engine is installed and running on `host` and, when a
    /// credential is given, that its database and user exist.
    pub async fn bootstrap(&self, host: &str, credential: Option<&DatabaseCredential>) -> Result<()> {
        let steps = self.plan(credential)?;
        info!("Bootstrapping {} on {}", self.engine.package, host);

        for (step, command) in steps {
            debug!(host, %step, "Running bootstrap step");
            self.executor
                .run(host, &command)
                .await
                .map_err(|source| ProviderError::Bootstrap {
                    step,
                    source: Box::new(source),
                })?;
        }

        if let Some(credential) = credential {
            info!(
                "Database {} and user {} ready on {}",
                credential.database, credential.username, host
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl RemoteExecutor for RecordingExecutor {
        async fn run(&self, host: &str, command: &str) -> Result<String> {
            let mut commands = self.commands.lock().unwrap();
            if self.fail_at == Some(commands.len()) {
                return Err(ProviderError::RemoteExit {
                    host: host.to_string(),
                    code: Some(1),
                    stderr: "ERROR 1396 (HY000)".to_string(),
                });
            }
            commands.push(command.to_string());
            Ok(String::new())
        }
    }

    fn credential() -> DatabaseCredential {
        DatabaseCredential::new("app", "appuser", "secret")
    }

    #[test]
    fn test_plan_without_credential_only_ensures_engine() {
        let bootstrapper =
            DatabaseBootstrapper::new(Arc::new(RecordingExecutor::default()), Default::default());
        let plan = bootstrapper.plan(None).unwrap();

        let steps: Vec<_> = plan.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![BootstrapStep::InstallEngine, BootstrapStep::StartService]);
        assert!(plan[0].1.starts_with("dpkg -s mariadb-server >/dev/null 2>&1 ||"));
        assert_eq!(
            plan[1].1,
            "systemctl is-active --quiet mariadb || sudo systemctl start mariadb"
        );
    }

    #[test]
    fn test_plan_statements_are_idempotent() {
        let bootstrapper =
            DatabaseBootstrapper::new(Arc::new(RecordingExecutor::default()), Default::default());
        let plan = bootstrapper.plan(Some(&credential())).unwrap();

        assert_eq!(plan.len(), 6);
        assert_eq!(
            plan[2].1,
            "sudo mysql -e 'CREATE DATABASE IF NOT EXISTS `app`;'"
        );
        assert_eq!(
            plan[3].1,
            "sudo mysql -e 'CREATE USER IF NOT EXISTS '\"'\"'appuser'\"'\"'@'\"'\"'%'\"'\"' \
             IDENTIFIED BY '\"'\"'secret'\"'\"';'"
        );
        assert!(plan[4].1.contains("GRANT ALL PRIVILEGES ON `app`.* TO"));
        assert_eq!(plan[5].1, "sudo mysql -e 'FLUSH PRIVILEGES;'");
    }

    #[test]
    fn test_plan_escapes_password() {
        let bootstrapper =
            DatabaseBootstrapper::new(Arc::new(RecordingExecutor::default()), Default::default());
        let cred = DatabaseCredential::new("app", "appuser", r"it's\x");
        let plan = bootstrapper.plan(Some(&cred)).unwrap();
        // SQL doubles the quote and the backslash before shell quoting wraps it.
        assert!(plan[3].1.contains("it'\"'\"''\"'\"'s\\\\x"));
    }

    #[test]
    fn test_plan_rejects_unsafe_identifiers() {
        let bootstrapper =
            DatabaseBootstrapper::new(Arc::new(RecordingExecutor::default()), Default::default());

        let bad_db = DatabaseCredential::new("app`; DROP DATABASE mysql; --", "u", "p");
        assert!(matches!(
            bootstrapper.plan(Some(&bad_db)),
            Err(ProviderError::InvalidInput(_))
        ));

        let no_password = DatabaseCredential::new("app", "appuser", "");
        assert!(bootstrapper.plan(Some(&no_password)).is_err());
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let debug = format!("{:?}", credential());
        assert!(debug.contains("appuser"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_bootstrap_stops_at_first_failure() {
        let executor = Arc::new(RecordingExecutor {
            fail_at: Some(3),
            ..Default::default()
        });
        let bootstrapper = DatabaseBootstrapper::new(executor.clone(), Default::default());

        let err = bootstrapper
            .bootstrap("db01", Some(&credential()))
            .await
            .unwrap_err();

        match &err {
            ProviderError::Bootstrap { step, .. } => assert_eq!(*step, BootstrapStep::CreateUser),
            other => panic!("Expected Bootstrap error, got {other:?}"),
        }
        assert!(err.to_string().starts_with("create database user failed:"));
        assert_eq!(executor.commands.lock().unwrap().len(), 3);
    }
}
