use axum::{
    extract::{Path, State},
    Extension,
};

use crate::api::{ApiResponse, ApiResult};
use crate::database::Collection;
use crate::error::ApiError;
use crate::integrity::AuditReport;
use crate::services::SweepReport;
use crate::tenancy::{with_tenant, TenantId};

use super::AppState;

/// POST /api/admin/sweep - run one expiry pass across all tenants
pub async fn sweep(State(state): State<AppState>) -> ApiResult<SweepReport> {
    let report = state.sweeper.run_once(state.clock.now()).await?;
    Ok(ApiResponse::success(report))
}

/// GET /api/admin/audit/:collection - findings without document ids
pub async fn audit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(collection): Path<String>,
) -> ApiResult<AuditReport> {
    let collection = Collection::parse(&collection)
        .ok_or_else(|| ApiError::not_found(format!("Unknown collection '{}'", collection)))?;

    let report = with_tenant(tenant, state.deadline(), |scope| async move {
        state
            .validator
            .audit(&state.router, &scope, collection, state.clock.now())
            .await
    })
    .await?;
    Ok(ApiResponse::success(report.redacted()))
}
