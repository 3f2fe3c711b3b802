pub mod context;
pub mod router;

pub use context::{with_tenant, TenantContext, TenantId, TenantScope};
pub use router::{Partition, TenantRouter};
