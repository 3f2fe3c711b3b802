mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use consent_vault::database::Collection;
use consent_vault::error::ErrorKind;
use consent_vault::models::VersionStatus;
use consent_vault::services::TemplateChanges;
use consent_vault::tenancy::with_tenant;

use common::{draft, FlakyStore, Harness};

fn rename(name: &str) -> TemplateChanges {
    TemplateChanges {
        name: Some(name.to_string()),
        ..TemplateChanges::default()
    }
}

/// Template at version 2, with v1 outside the race window
async fn template_at_v2(h: &Harness, tenant: &consent_vault::tenancy::TenantId) -> Result<String> {
    let services = h.services.clone();
    let id = h
        .scoped(tenant, |scope| {
            let services = services.clone();
            async move { services.templates.create_template(&scope, draft("Banner")).await }
        })
        .await?
        .meta
        .logical_id;
    h.advance_minutes(10);
    let lid = id.clone();
    h.scoped(tenant, |scope| async move { services.templates.update_template(&scope, &lid, rename("v2")).await })
        .await?;
    Ok(id)
}

#[tokio::test]
async fn exactly_one_of_two_concurrent_writers_wins() -> Result<()> {
    let store = FlakyStore::new();
    let h = Harness::over(Arc::new(store.clone())).await?;
    let acme = h.tenant("acme").await?;
    let id = template_at_v2(&h, &acme).await?;

    store.interleave.store(true, Ordering::SeqCst);
    let write = |name: &'static str| {
        let services = h.services.clone();
        let tenant = acme.clone();
        let id = id.clone();
        async move {
            with_tenant(tenant, Duration::from_secs(5), |scope| async move {
                services.templates.update_template(&scope, &id, rename(name)).await
            })
            .await
        }
    };
    let (a, b) = tokio::join!(write("writer-a"), write("writer-b"));
    store.interleave.store(false, Ordering::SeqCst);

    let outcomes = [a, b];
    let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    let losers: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(winners.len(), 1, "exactly one writer should succeed");
    assert_eq!(winners[0].meta.version, 3);
    assert_eq!(losers.len(), 1);
    assert_eq!(losers[0].kind(), ErrorKind::ConcurrentVersionCreation);
    assert!(losers[0].is_retryable());

    let services = h.services.clone();
    let history = h
        .scoped(&acme, |scope| async move { services.templates.history(&scope, &id).await })
        .await?;
    let versions: Vec<u32> = history.iter().map(|t| t.meta.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
    assert_eq!(
        history.iter().filter(|t| t.meta.version_status == VersionStatus::Active).count(),
        1
    );
    assert_eq!(history[0].name, winners[0].name);
    Ok(())
}

#[tokio::test]
async fn many_concurrent_writers_produce_one_version() -> Result<()> {
    let store = FlakyStore::new();
    let h = Harness::over(Arc::new(store.clone())).await?;
    let acme = h.tenant("acme").await?;
    let id = template_at_v2(&h, &acme).await?;

    store.interleave.store(true, Ordering::SeqCst);
    let writers = (0..5).map(|n| {
        let services = h.services.clone();
        let tenant = acme.clone();
        let id = id.clone();
        async move {
            with_tenant(tenant, Duration::from_secs(5), |scope| async move {
                services.templates.update_template(&scope, &id, rename(&format!("w{}", n))).await
            })
            .await
        }
    });
    let outcomes = futures::future::join_all(writers).await;
    store.interleave.store(false, Ordering::SeqCst);

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for err in outcomes.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::ConcurrentVersionCreation);
    }
    let active = h
        .raw_find(
            &h.partition(&acme),
            Collection::ConsentTemplates,
            serde_json::json!({ "logicalId": id, "versionStatus": "ACTIVE" }),
        )
        .await?;
    assert_eq!(active.len(), 1);
    Ok(())
}

#[tokio::test]
async fn half_finished_promotion_is_detected_not_healed() -> Result<()> {
    let store = FlakyStore::new();
    let h = Harness::over(Arc::new(store.clone())).await?;
    let acme = h.tenant("acme").await?;
    let id = template_at_v2(&h, &acme).await?;
    h.advance_minutes(10);

    store.fail_promotion.store(true, Ordering::SeqCst);
    let services = h.services.clone();
    let lid = id.clone();
    let failed = h
        .scoped(&acme, |scope| async move { services.templates.update_template(&scope, &lid, rename("v3")).await })
        .await
        .unwrap_err();
    store.fail_promotion.store(false, Ordering::SeqCst);
    assert_eq!(failed.kind(), ErrorKind::Storage);

    // v2 and v3 are both ACTIVE now
    let services = h.services.clone();
    let lid = id.clone();
    let read = h
        .scoped(&acme, |scope| async move { services.templates.get_active(&scope, &lid).await })
        .await
        .unwrap_err();
    assert_eq!(read.kind(), ErrorKind::MultipleActiveVersions);
    assert!(!read.is_retryable());

    h.advance_minutes(10);
    let services = h.services.clone();
    let lid = id.clone();
    let next = h
        .scoped(&acme, |scope| async move { services.templates.update_template(&scope, &lid, rename("v4")).await })
        .await
        .unwrap_err();
    assert_eq!(next.kind(), ErrorKind::MultipleActiveVersions);
    assert_eq!(next.context.count, Some(2));

    let services = h.services.clone();
    let report = h
        .scoped(&acme, |scope| async move {
            services
                .validator
                .audit(&services.router, &scope, Collection::ConsentTemplates, services.clock.now())
                .await
        })
        .await?;
    let finding = report
        .violations()
        .find(|f| f.kind == Some(ErrorKind::MultipleActiveVersions))
        .ok_or_else(|| anyhow::anyhow!("audit missed the double-active state"))?;
    assert_eq!(finding.logical_id, id);
    assert_eq!(finding.document_ids.len(), 2);

    // Nothing was repaired behind our back
    let active = h
        .raw_find(
            &h.partition(&acme),
            Collection::ConsentTemplates,
            serde_json::json!({ "logicalId": id, "versionStatus": "ACTIVE" }),
        )
        .await?;
    assert_eq!(active.len(), 2);
    Ok(())
}

#[tokio::test]
async fn stalled_writes_time_out_as_retryable() -> Result<()> {
    let store = FlakyStore::new();
    let h = Harness::over(Arc::new(store.clone())).await?;
    let acme = h.tenant("acme").await?;
    let id = template_at_v2(&h, &acme).await?;
    h.advance_minutes(10);

    store.stall_promotion.store(true, Ordering::SeqCst);
    let services = h.services.clone();
    let err = with_tenant(acme.clone(), Duration::from_millis(50), |scope| async move {
        services.templates.update_template(&scope, &id, rename("slow")).await
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());
    Ok(())
}
