pub mod admin;
pub mod consents;
pub mod handles;
pub mod health;
pub mod templates;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::require_tenant;
use crate::services::Services;

pub type AppState = Arc<Services>;

/// Full HTTP surface. Tenant-scoped groups sit behind `require_tenant`.
pub fn app(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .merge(template_routes())
        .merge(handle_routes())
        .merge(consent_routes())
        .route("/api/admin/audit/:collection", get(admin::audit))
        .route_layer(from_fn_with_state(state.clone(), require_tenant));

    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/api/admin/sweep", post(admin::sweep))
        .merge(tenant_routes)
        .layer(CorsLayer::permissive());

    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn template_routes() -> Router<AppState> {
    Router::new()
        .route("/api/templates", post(templates::create))
        .route("/api/templates/:id", get(templates::get).put(templates::update))
        .route("/api/templates/:id/history", get(templates::history))
        .route("/api/templates/:id/versions/:version", get(templates::version))
        .route("/api/templates/:id/publish", post(templates::publish))
        .route("/api/templates/:id/archive", post(templates::archive))
}

fn handle_routes() -> Router<AppState> {
    Router::new()
        .route("/api/consent-handles", post(handles::create))
        .route("/api/consent-handles/:id", get(handles::get))
        .route("/api/consent-handles/:id/reject", post(handles::reject))
}

fn consent_routes() -> Router<AppState> {
    Router::new()
        .route("/api/consents", post(consents::create))
        .route("/api/consents/:id", get(consents::get))
        .route("/api/consents/:id/history", get(consents::history))
        .route("/api/consents/:id/versions/:version", get(consents::version))
        .route("/api/consents/:id/preferences", put(consents::update_preferences))
        .route("/api/consents/:id/status", put(consents::update_status))
}
