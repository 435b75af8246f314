use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vm_core::validation::{validate_sql_identifier, validate_vm_name};
use vm_provider::DatabaseCredential;

use crate::error::{ErrorKind, Result, WorkflowError};

/// Declarative "create VM X, optionally with database Y" request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProvisionRequest {
    pub vm_name: String,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub database_user: Option<String>,
    #[serde(default)]
    pub database_password: Option<String>,
}

impl fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("vm_name", &self.vm_name)
            .field("database_name", &self.database_name)
            .field("database_user", &self.database_user)
            .field(
                "database_password",
                &self.database_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProvisionRequest {
    pub fn vm_only(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            ..Default::default()
        }
    }

    pub fn with_database(
        vm_name: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            database_name: Some(database.into()),
            database_user: Some(user.into()),
            database_password: Some(password.into()),
        }
    }

    /// The requested database, if any; empty strings count as absent.
    pub fn database(&self) -> Option<&str> {
        non_empty(&self.database_name)
    }

    /// Check the request and extract the credential for the bootstrap step.
    pub fn validate(&self) -> Result<Option<DatabaseCredential>> {
        validate_vm_name(&self.vm_name)?;

        let user = non_empty(&self.database_user);
        let password = non_empty(&self.database_password);

        let Some(database) = self.database() else {
            if user.is_some() || password.is_some() {
                return Err(WorkflowError::InvalidRequest(
                    "Database name required when database credentials are given".to_string(),
                ));
            }
            return Ok(None);
        };

        let user = user.ok_or_else(|| {
            WorkflowError::InvalidRequest("Database user required".to_string())
        })?;
        let password = password.ok_or_else(|| {
            WorkflowError::InvalidRequest("Database password required".to_string())
        })?;

        validate_sql_identifier("Database name", database)?;
        validate_sql_identifier("Database user", user)?;

        Ok(Some(DatabaseCredential::new(database, user, password)))
    }
}

/// Result of one workflow invocation.
///
/// Built in one piece at the end of a workflow: either a success with an
/// optional payload, or the first failure's message and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl WorkflowOutcome {
    pub fn succeeded(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(kind),
        }
    }
}

impl From<WorkflowError> for WorkflowOutcome {
    fn from(err: WorkflowError) -> Self {
        Self::failed(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_vm_only() {
        let request = ProvisionRequest::vm_only("web01");
        assert_eq!(request.validate().unwrap(), None);
    }

    #[test]
    fn test_validate_empty_vm_name() {
        let err = ProvisionRequest::vm_only("").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "VM name required");
    }

    #[test]
    fn test_validate_with_database() {
        let request = ProvisionRequest::with_database("db01", "app", "appuser", "secret");
        let credential = request.validate().unwrap().expect("credential");
        assert_eq!(credential.database, "app");
        assert_eq!(credential.username, "appuser");
        assert_eq!(credential.password, "secret");
    }

    #[test]
    fn test_empty_database_name_means_vm_only() {
        let request = ProvisionRequest {
            vm_name: "db01".to_string(),
            database_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(request.validate().unwrap(), None);
    }

    #[test]
    fn test_database_requires_credentials() {
        let mut request = ProvisionRequest::with_database("db01", "app", "appuser", "secret");
        request.database_password = None;
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "Database password required"
        );

        request.database_user = Some(String::new());
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "Database user required"
        );
    }

    #[test]
    fn test_credentials_without_database_rejected() {
        let request = ProvisionRequest {
            vm_name: "db01".to_string(),
            database_user: Some("appuser".to_string()),
            ..Default::default()
        };
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_unsafe_database_name_rejected() {
        let request = ProvisionRequest::with_database("db01", "app;drop", "appuser", "secret");
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_debug_redacts_password() {
        let request = ProvisionRequest::with_database("db01", "app", "appuser", "hunter2");
        let debug = format!("{request:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_outcome_json_shape() {
        let ok = WorkflowOutcome::succeeded("VMs listed", Some(json!(["alpha", "beta"])));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "message": "VMs listed", "data": ["alpha", "beta"]})
        );

        let failed: WorkflowOutcome =
            WorkflowError::InvalidRequest("VM name required".to_string()).into();
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "message": "VM name required", "error": "invalid_request"})
        );
    }
}
