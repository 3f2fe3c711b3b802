use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::api::{ApiResponse, ApiResult};
use crate::models::{Consent, ConsentStatus, PreferenceStatus};
use crate::services::ConsentRequest;
use crate::tenancy::{with_tenant, TenantId};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PreferencesBody {
    pub preferences: Vec<PreferenceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: ConsentStatus,
}

/// POST /api/consents - consumes the handle
pub async fn create(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(request): Json<ConsentRequest>,
) -> ApiResult<Consent> {
    let consent = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.create_from_handle(&scope, request).await
    })
    .await?;
    Ok(ApiResponse::created(consent))
}

/// GET /api/consents/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Consent> {
    let consent = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.get_active(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(consent))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Consent>> {
    let versions = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.history(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(versions))
}

pub async fn version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((id, version)): Path<(String, u32)>,
) -> ApiResult<Consent> {
    let consent = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.get_version(&scope, &id, version).await
    })
    .await?;
    Ok(ApiResponse::success(consent))
}

/// PUT /api/consents/:id/preferences - creates the next version
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
    Json(body): Json<PreferencesBody>,
) -> ApiResult<Consent> {
    let consent = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.update_preferences(&scope, &id, body.preferences).await
    })
    .await?;
    Ok(ApiResponse::success(consent))
}

/// PUT /api/consents/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Consent> {
    let consent = with_tenant(tenant, state.deadline(), |scope| async move {
        state.consents.update_status(&scope, &id, body.status).await
    })
    .await?;
    Ok(ApiResponse::success(consent))
}
