// Error taxonomy for the consent store and its HTTP mapping
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::database::StorageError;

/// Stable, machine-readable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NoActiveVersion,
    MultipleActiveVersions,
    ImmutableFieldViolation,
    UpdateFrequencyExceeded,
    ConcurrentVersionCreation,
    TenantIsolationViolation,
    NoTenantContext,
    HandleAlreadyUsed,
    HandleExpired,
    NotFound,
    InvalidStatusTransition,
    InvalidInput,
    /// Deadline elapsed; the write may or may not have landed
    Timeout,
    Storage,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NoActiveVersion => "NO_ACTIVE_VERSION",
            ErrorKind::MultipleActiveVersions => "MULTIPLE_ACTIVE_VERSIONS",
            ErrorKind::ImmutableFieldViolation => "IMMUTABLE_FIELD_VIOLATION",
            ErrorKind::UpdateFrequencyExceeded => "UPDATE_FREQUENCY_EXCEEDED",
            ErrorKind::ConcurrentVersionCreation => "CONCURRENT_VERSION_CREATION",
            ErrorKind::TenantIsolationViolation => "TENANT_ISOLATION_VIOLATION",
            ErrorKind::NoTenantContext => "NO_TENANT_CONTEXT",
            ErrorKind::HandleAlreadyUsed => "HANDLE_ALREADY_USED",
            ErrorKind::HandleExpired => "HANDLE_EXPIRED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }

    /// Kinds a caller may resolve with backoff-and-retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::UpdateFrequencyExceeded | ErrorKind::ConcurrentVersionCreation | ErrorKind::Timeout
        )
    }
}

/// Operator-facing diagnostic detail. Never rendered to end users.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub tenant: Option<String>,
    pub logical_id: Option<String>,
    pub document_ids: Vec<String>,
    pub versions: Vec<u32>,
    pub count: Option<u64>,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Box<ErrorContext>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Box::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn no_tenant_context() -> Self {
        Self::new(ErrorKind::NoTenantContext, "No tenant bound to the current operation")
    }

    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::new(
            ErrorKind::InvalidStatusTransition,
            format!("Status transition {:?} -> {:?} is not allowed", from, to),
        )
    }

    pub fn with_logical_id(mut self, logical_id: impl Into<String>) -> Self {
        self.context.logical_id = Some(logical_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.context.tenant = Some(tenant.into());
        self
    }

    pub fn with_documents(mut self, ids: Vec<String>, versions: Vec<u32>) -> Self {
        self.context.document_ids = ids;
        self.context.versions = versions;
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.context.count = Some(count);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(key) => CoreError::new(
                ErrorKind::ConcurrentVersionCreation,
                "Another version was written concurrently; retry the update",
            )
            .with_documents(vec![key], Vec::new()),
            StorageError::Timeout => CoreError::new(
                ErrorKind::Timeout,
                "Store operation timed out; outcome unknown",
            ),
            StorageError::PartitionNotFound(name) => {
                CoreError::not_found("Tenant partition does not exist").with_tenant(name)
            }
            other => {
                tracing::error!("Storage error: {}", other);
                CoreError::new(ErrorKind::Storage, "Storage failure")
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // Anything raised by the core
    Core { status: StatusCode, code: &'static str, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Core { status, .. } => *status,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Core { message, .. } => message,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Core { code, .. } => code,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NoTenantContext | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::TenantIsolationViolation => StatusCode::FORBIDDEN,
        ErrorKind::ImmutableFieldViolation
        | ErrorKind::InvalidStatusTransition
        | ErrorKind::HandleAlreadyUsed
        | ErrorKind::ConcurrentVersionCreation => StatusCode::CONFLICT,
        ErrorKind::HandleExpired => StatusCode::GONE,
        ErrorKind::UpdateFrequencyExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::NoActiveVersion | ErrorKind::MultipleActiveVersions | ErrorKind::Storage => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        // Context stays in the logs; clients only get kind and message
        match err.kind {
            ErrorKind::NotFound => {}
            ErrorKind::MultipleActiveVersions | ErrorKind::TenantIsolationViolation | ErrorKind::Storage => {
                tracing::error!(code = err.kind.code(), context = ?err.context, "{}", err.message);
            }
            _ => {
                tracing::warn!(code = err.kind.code(), context = ?err.context, "{}", err.message);
            }
        }
        ApiError::Core {
            status: status_for(err.kind),
            code: err.kind.code(),
            message: err.message,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
