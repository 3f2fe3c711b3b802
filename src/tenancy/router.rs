use std::sync::Arc;

use crate::config::TenancyConfig;
use crate::database::{Collection, DocumentStore};
use crate::error::{CoreError, CoreResult};
use crate::tenancy::context::{TenantId, TenantScope};

/// Handle to an isolated storage partition. Only `TenantRouter` constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    name: String,
    shared: bool,
}

impl Partition {
    pub(crate) fn new(name: impl Into<String>, shared: bool) -> Self {
        Self {
            name: name.into(),
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resolves tenants to their partitions
#[derive(Clone)]
pub struct TenantRouter {
    store: Arc<dyn DocumentStore>,
    prefix: String,
    shared: String,
}

impl TenantRouter {
    pub fn new(store: Arc<dyn DocumentStore>, config: &TenancyConfig) -> Self {
        Self {
            store,
            prefix: config.partition_prefix.clone(),
            shared: config.shared_partition.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix><tenant_id>`; an empty id falls back to the shared partition.
    /// Does not check that the partition exists.
    pub fn resolve_partition(&self, tenant_id: &str) -> Partition {
        if tenant_id.trim().is_empty() {
            tracing::warn!("Tenant context lost: empty tenant id resolved to shared partition");
            return self.resolve_shared_partition();
        }
        Partition::new(format!("{}{}", self.prefix, tenant_id), false)
    }

    pub fn resolve_shared_partition(&self) -> Partition {
        Partition::new(self.shared.clone(), true)
    }

    /// Partition for `collection` under `scope`. Tenant-bound collections fail
    /// closed when no tenant is bound; only collections declared tenant
    /// independent may use the shared partition.
    pub fn resolve_for(&self, scope: &TenantScope, collection: Collection) -> CoreResult<Partition> {
        match scope.tenant_id() {
            Ok(tenant) => Ok(self.resolve_partition(tenant.as_str())),
            Err(_) if collection.allows_shared() => {
                tracing::debug!("No tenant bound; {} routed to shared partition", collection);
                Ok(self.resolve_shared_partition())
            }
            Err(err) => {
                tracing::warn!("Rejected {} access without tenant context", collection);
                Err(err)
            }
        }
    }

    pub async fn partition_exists(&self, tenant_id: &TenantId) -> CoreResult<bool> {
        let partition = self.resolve_partition(tenant_id.as_str());
        Ok(self.store.partition_exists(partition.name()).await?)
    }

    /// Tenants with a partition under the configured prefix
    pub async fn list_tenant_partitions(&self) -> CoreResult<Vec<TenantId>> {
        let names = self.store.list_partitions(&self.prefix).await?;
        let mut tenants = Vec::with_capacity(names.len());
        for name in names {
            let Some(raw) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            match TenantId::parse(raw) {
                Ok(tenant) => tenants.push(tenant),
                Err(_) => tracing::warn!("Skipping partition with unusable tenant suffix: {}", name),
            }
        }
        tenants.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(tenants)
    }

    /// Create the partition for a new tenant
    pub async fn provision(&self, tenant_id: &TenantId) -> CoreResult<Partition> {
        let partition = self.resolve_partition(tenant_id.as_str());
        if self.store.partition_exists(partition.name()).await? {
            return Err(CoreError::invalid_input("Tenant already provisioned").with_tenant(tenant_id.as_str()));
        }
        self.store.create_partition(partition.name()).await?;
        tracing::info!("Provisioned partition {} for tenant {}", partition, tenant_id);
        Ok(partition)
    }

    /// Create the shared partition if it is missing. Run once at startup.
    pub async fn ensure_shared_partition(&self) -> CoreResult<Partition> {
        let partition = self.resolve_shared_partition();
        if !self.store.partition_exists(partition.name()).await? {
            self.store.create_partition(partition.name()).await?;
            tracing::info!("Created shared partition {}", partition);
        }
        Ok(partition)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}
