use utoipa::OpenApi;
use vm_orchestrator::{ErrorKind, WorkflowOutcome};

use crate::routes::command::CommandRequest;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::command::handle_command,
    ),
    components(schemas(CommandRequest, WorkflowOutcome, ErrorKind)),
    tags(
        (name = "vm-api", description = "Database VM provisioning API")
    )
)]
pub struct ApiDoc;
