mod common;

use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use consent_vault::database::Collection;
use consent_vault::error::ErrorKind;
use consent_vault::models::VersionStatus;
use consent_vault::tenancy::{TenantId, TenantScope};

use common::{draft, Harness, BUSINESS};

#[tokio::test]
async fn colliding_logical_ids_stay_in_their_tenant() -> Result<()> {
    let h = Harness::new().await?;
    let alpha = h.tenant("alpha").await?;
    let beta = h.tenant("beta").await?;

    let template = h.published_template(&alpha).await?;
    let shared_id = template.meta.logical_id.clone();

    // Same logical id, written directly into beta's partition for beta
    h.raw_insert(
        &h.partition(&beta),
        Collection::ConsentTemplates,
        json!({
            "logicalId": shared_id,
            "documentId": "beta-doc-1",
            "version": 1,
            "versionStatus": "ACTIVE",
            "tenantId": "beta",
            "createdAt": 0,
            "updatedAt": 0,
            "businessId": BUSINESS,
            "name": "Beta banner",
            "status": "DRAFT",
            "preferences": [],
            "content": {},
            "uiConfig": {}
        }),
    )
    .await?;

    let services = h.services.clone();
    let id = shared_id.clone();
    let from_alpha = h
        .scoped(&alpha, |scope| async move { services.templates.get_active(&scope, &id).await })
        .await?;
    let services = h.services.clone();
    let id = shared_id.clone();
    let from_beta = h
        .scoped(&beta, |scope| async move { services.templates.get_active(&scope, &id).await })
        .await?;

    assert_eq!(from_alpha.name, "Cookie banner");
    assert_eq!(from_alpha.meta.tenant_id, "alpha");
    assert_eq!(from_beta.name, "Beta banner");
    assert_eq!(from_beta.meta.tenant_id, "beta");
    Ok(())
}

#[tokio::test]
async fn records_of_other_tenants_are_never_returned() -> Result<()> {
    let h = Harness::new().await?;
    let alpha = h.tenant("alpha").await?;
    let beta = h.tenant("beta").await?;

    // A document that claims alpha but sits in beta's partition
    h.raw_insert(
        &h.partition(&beta),
        Collection::ConsentTemplates,
        json!({
            "logicalId": "misfiled",
            "documentId": "misfiled-1",
            "version": 1,
            "versionStatus": "ACTIVE",
            "tenantId": alpha.as_str(),
            "createdAt": 0,
            "updatedAt": 0,
            "businessId": BUSINESS,
            "name": "Misfiled",
            "status": "DRAFT",
            "preferences": [],
            "content": {},
            "uiConfig": {}
        }),
    )
    .await?;

    let services = h.services.clone();
    let err = h
        .scoped(&beta, |scope| async move { services.templates.get_active(&scope, "misfiled").await })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TenantIsolationViolation);

    let services = h.services.clone();
    let report = h
        .scoped(&beta, |scope| async move {
            services
                .validator
                .audit(&services.router, &scope, Collection::ConsentTemplates, services.clock.now())
                .await
        })
        .await?;
    assert!(!report.is_clean());
    assert!(report.violations().any(|f| f.kind == Some(ErrorKind::TenantIsolationViolation)));

    let services = h.services.clone();
    let missing = h
        .scoped(&alpha, |scope| async move { services.templates.get_active(&scope, "misfiled").await })
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn tenant_bound_collections_fail_closed_without_context() -> Result<()> {
    let h = Harness::new().await?;
    h.tenant("alpha").await?;

    let scope = TenantScope::unbound(Duration::from_secs(1));
    let err = h.services.templates.create_template(&scope, draft("Orphan")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTenantContext);

    let err = h.services.consents.get_active(&scope, "anything").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTenantContext);

    let shared = h.services.router.resolve_for(&scope, Collection::SigningKeys)?;
    assert!(shared.is_shared());

    // Nothing was written to the shared partition
    let leaked = h
        .raw_find(&h.services.router.resolve_shared_partition(), Collection::ConsentTemplates, json!({}))
        .await?;
    assert!(leaked.is_empty());
    Ok(())
}

#[tokio::test]
async fn scope_is_released_when_the_context_ends() -> Result<()> {
    let h = Harness::new().await?;
    let alpha = h.tenant("alpha").await?;

    let escaped = h.scoped(&alpha, |scope| async move { scope.clone() }).await;
    assert!(!escaped.is_bound());

    let err = h.services.templates.create_template(&escaped, draft("Late")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTenantContext);
    Ok(())
}

#[tokio::test]
async fn concurrent_scopes_do_not_bleed() -> Result<()> {
    let h = Harness::new().await?;
    let tenants: Vec<TenantId> = vec![
        h.tenant("alpha").await?,
        h.tenant("beta").await?,
        h.tenant("gamma").await?,
    ];

    let mut tasks = Vec::new();
    for tenant in tenants.clone() {
        let services = h.services.clone();
        tasks.push(tokio::spawn(async move {
            consent_vault::tenancy::with_tenant(tenant.clone(), Duration::from_secs(5), |scope| async move {
                let mut created = Vec::new();
                for n in 0..5 {
                    tokio::task::yield_now().await;
                    created.push(services.templates.create_template(&scope, draft(&format!("t{}", n))).await?);
                }
                Ok::<_, consent_vault::error::CoreError>(created)
            })
            .await
        }));
    }

    for (tenant, task) in tenants.iter().zip(tasks) {
        let created = task.await??;
        assert_eq!(created.len(), 5);
        for template in created {
            assert_eq!(&template.meta.tenant_id, tenant.as_str());
            assert_eq!(template.meta.version_status, VersionStatus::Active);
        }
        let stored = h.raw_find(&h.partition(tenant), Collection::ConsentTemplates, json!({})).await?;
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|d| d["tenantId"] == tenant.as_str()));
    }
    Ok(())
}
