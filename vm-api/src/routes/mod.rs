pub mod command;
pub mod health;

use crate::{api_docs::ApiDoc, state::AppState};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vm_orchestrator::ProvisioningOrchestrator;

pub fn create_app(orchestrator: ProvisioningOrchestrator) -> Router {
    let state = AppState::new(orchestrator);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(health::routes())
        .merge(command::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
