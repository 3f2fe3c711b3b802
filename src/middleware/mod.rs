pub mod validate_tenant;

pub use validate_tenant::{require_tenant, TENANT_HEADER};
