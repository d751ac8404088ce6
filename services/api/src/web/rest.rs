//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(status_handler),
    components(schemas(StatusResponse)),
    tags(
        (name = "Job Board API", description = "Service status. Sessions and data reads go over the /ws WebSocket.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

/// The service's current view of backend reachability.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Whether the document store answered the latest probe.
    pub online: bool,
    /// Which backend is serving data (`postgres` or `memory`).
    pub backend: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Report connectivity to the document store.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Current connectivity", body = StatusResponse)
    )
)]
pub async fn status_handler(State(app_state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        online: app_state.connectivity.is_online(),
        backend: app_state.identity.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use job_board_core::connectivity::NetworkEvent;

    #[tokio::test]
    async fn status_tracks_connectivity() {
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        let state = Arc::new(AppState::from_config(config).await.unwrap());

        let Json(status) = status_handler(State(state.clone())).await;
        assert!(status.online);
        assert_eq!(status.backend, "memory");

        state.connectivity.handle(NetworkEvent::Offline);
        let Json(status) = status_handler(State(state)).await;
        assert!(!status.online);
    }

    #[test]
    fn openapi_lists_the_status_route() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/status"));
    }
}
