use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::tenancy::TenantId;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolve `X-Tenant-ID` to a provisioned tenant and inject the `TenantId`.
/// Requests without the header never reach the core.
pub async fn require_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = request
        .headers()
        .get(TENANT_HEADER)
        .ok_or_else(|| ApiError::bad_request("Missing X-Tenant-ID header"))?
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid X-Tenant-ID header"))?;

    let tenant = TenantId::parse(raw)?;
    if !state.router.partition_exists(&tenant).await? {
        tracing::warn!("Tenant validation failed: no partition for tenant '{}'", tenant);
        return Err(ApiError::not_found(format!("Tenant '{}' does not exist", tenant)));
    }

    tracing::debug!("Tenant validation successful: {}", tenant);
    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}
