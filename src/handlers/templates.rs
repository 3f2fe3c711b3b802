use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::{ApiResponse, ApiResult};
use crate::models::ConsentTemplate;
use crate::services::{TemplateChanges, TemplateDraft};
use crate::tenancy::{with_tenant, TenantId};

use super::AppState;

/// POST /api/templates
pub async fn create(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(draft): Json<TemplateDraft>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.create_template(&scope, draft).await
    })
    .await?;
    Ok(ApiResponse::created(template))
}

/// GET /api/templates/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.get_active(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(template))
}

/// PUT /api/templates/:id - creates the next version
pub async fn update(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
    Json(changes): Json<TemplateChanges>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.update_template(&scope, &id, changes).await
    })
    .await?;
    Ok(ApiResponse::success(template))
}

/// GET /api/templates/:id/history
pub async fn history(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ConsentTemplate>> {
    let versions = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.history(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(versions))
}

/// GET /api/templates/:id/versions/:version
pub async fn version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((id, version)): Path<(String, u32)>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.get_version(&scope, &id, version).await
    })
    .await?;
    Ok(ApiResponse::success(template))
}

/// POST /api/templates/:id/publish
pub async fn publish(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.publish_template(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(template))
}

/// POST /api/templates/:id/archive
pub async fn archive(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<ConsentTemplate> {
    let template = with_tenant(tenant, state.deadline(), |scope| async move {
        state.templates.archive_template(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(template))
}
