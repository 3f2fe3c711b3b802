use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::{ApiResponse, ApiResult};
use crate::models::ConsentHandle;
use crate::services::HandleRequest;
use crate::tenancy::{with_tenant, TenantId};

use super::AppState;

/// POST /api/consent-handles
pub async fn create(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(request): Json<HandleRequest>,
) -> ApiResult<ConsentHandle> {
    let handle = with_tenant(tenant, state.deadline(), |scope| async move {
        state.handles.create_handle(&scope, request).await
    })
    .await?;
    Ok(ApiResponse::created(handle))
}

/// GET /api/consent-handles/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<ConsentHandle> {
    let handle = with_tenant(tenant, state.deadline(), |scope| async move {
        state.handles.get_handle(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(handle))
}

/// POST /api/consent-handles/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<ConsentHandle> {
    let handle = with_tenant(tenant, state.deadline(), |scope| async move {
        state.handles.reject_handle(&scope, &id).await
    })
    .await?;
    Ok(ApiResponse::success(handle))
}
