use std::fmt;

use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;
use utoipa::ToSchema;
use vm_orchestrator::{ErrorKind, ProvisionRequest, WorkflowOutcome};

pub fn routes() -> Router<AppState> {
    Router::new().route("/command", post(handle_command))
}

/// Body of `POST /command`.
#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct CommandRequest {
    /// One of `create`, `delete` or `view`.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub vm_name: String,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("action", &self.action)
            .field("vm_name", &self.vm_name)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl From<CommandRequest> for ProvisionRequest {
    fn from(req: CommandRequest) -> Self {
        ProvisionRequest {
            vm_name: req.vm_name,
            database_name: req.db_name,
            database_user: req.db_user,
            database_password: req.db_password,
        }
    }
}

/// Run one workflow and report its outcome.
///
/// Workflow failures are returned with status 200 and `success = false`;
/// only a body that cannot be parsed yields 400.
#[utoipa::path(
    post,
    path = "/command",
    tag = "vm-api",
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Workflow outcome", body = WorkflowOutcome),
        (status = 400, description = "Invalid JSON"),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn handle_command(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> ApiResult<Json<WorkflowOutcome>> {
    let Json(req) = payload?;

    let outcome = match req.action.as_str() {
        "create" => state.orchestrator.provision(req.into()).await,
        "delete" => state.orchestrator.decommission(&req.vm_name).await,
        "view" => state.orchestrator.enumerate().await,
        other => {
            warn!("Unknown action '{}'", other);
            WorkflowOutcome::failed(ErrorKind::InvalidRequest, "Unknown action")
        }
    };

    Ok(Json(outcome))
}
