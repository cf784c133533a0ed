use crate::handlers;
use axum::Router as AxumRouter;
use axum::routing::{any, get, post};
use std::sync::Arc;
use veil_core::VeilConfig;
use veil_proxy::Pipeline;
use veil_store::UserStore;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VeilConfig>,
    pub users: Arc<UserStore>,
    pub pipeline: Arc<Pipeline>,
}

/// Build the axum router with all routes.
///
/// Everything that is not the Swagger fetch or the provisioning endpoint
/// falls into the `/{version}/{*rest}` proxy entry — the permuted surface
/// always leads with its `/v{seed}/` segment.
pub fn build_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/swagger.json", get(handlers::swagger::swagger_json))
        .route("/api/user-update", post(handlers::provision::user_update))
        .route("/{version}/{*rest}", any(handlers::proxy::proxy))
        .with_state(state)
}
