use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Opaque tenant identifier, as asserted by the calling layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Validate an identifier arriving from outside (header, CLI flag).
    /// Partition names are built from it, so only `[A-Za-z0-9_-]` is accepted.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::no_tenant_context());
        }
        if trimmed.len() > 64 {
            return Err(CoreError::invalid_input("Tenant id must be at most 64 characters"));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(CoreError::invalid_input(
                "Tenant id can only contain letters, numbers, hyphens, and underscores",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct ScopeState {
    tenant_id: Option<TenantId>,
    deadline: Duration,
    bound: AtomicBool,
}

/// Handle to a tenant binding. Cheap to clone and pass down the call chain;
/// every clone stops yielding the tenant once the owning `with_tenant` call
/// has returned, unwound, or been cancelled.
#[derive(Debug, Clone)]
pub struct TenantScope {
    state: Arc<ScopeState>,
}

impl TenantScope {
    /// A scope with no tenant. Tenant-bound document kinds fail closed under it.
    pub fn unbound(deadline: Duration) -> Self {
        Self {
            state: Arc::new(ScopeState {
                tenant_id: None,
                deadline,
                bound: AtomicBool::new(false),
            }),
        }
    }

    pub fn tenant_id(&self) -> CoreResult<&TenantId> {
        if !self.state.bound.load(Ordering::Acquire) {
            return Err(CoreError::no_tenant_context());
        }
        self.state.tenant_id.as_ref().ok_or_else(CoreError::no_tenant_context)
    }

    pub fn is_bound(&self) -> bool {
        self.tenant_id().is_ok()
    }

    /// Caller-supplied deadline applied to each store operation
    pub fn deadline(&self) -> Duration {
        self.state.deadline
    }
}

/// Clears the binding on drop, including during unwinding
struct ScopeGuard(Arc<ScopeState>);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.bound.store(false, Ordering::Release);
    }
}

/// Request-scoped carrier for the current tenant
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant_id: TenantId,
    deadline: Duration,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, deadline: Duration) -> Self {
        Self { tenant_id, deadline }
    }

    /// Execute `f` with the tenant bound for exactly the duration of the call
    pub async fn with_tenant<F, Fut, T>(self, f: F) -> T
    where
        F: FnOnce(TenantScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let state = Arc::new(ScopeState {
            tenant_id: Some(self.tenant_id),
            deadline: self.deadline,
            bound: AtomicBool::new(true),
        });
        let _guard = ScopeGuard(state.clone());
        f(TenantScope { state }).await
    }
}

/// Shorthand for `TenantContext::new(tenant_id, deadline).with_tenant(f)`
pub async fn with_tenant<F, Fut, T>(tenant_id: TenantId, deadline: Duration, f: F) -> T
where
    F: FnOnce(TenantScope) -> Fut,
    Fut: Future<Output = T>,
{
    TenantContext::new(tenant_id, deadline).with_tenant(f).await
}
