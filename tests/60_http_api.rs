mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use consent_vault::handlers::app;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use consent_vault::services::TemplateChanges;

use common::{draft, FlakyStore, Harness};

async fn call(h: &Harness, method: Method, uri: &str, tenant: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header("X-Tenant-ID", tenant);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app(h.services.clone()).oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let payload = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, payload))
}

#[tokio::test]
async fn health_needs_no_tenant() -> Result<()> {
    let h = Harness::new().await?;
    let (status, payload) = call(&h, Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn tenant_header_is_required_and_must_resolve() -> Result<()> {
    let h = Harness::new().await?;
    h.tenant("acme").await?;

    let (status, payload) = call(&h, Method::GET, "/api/templates/x", None, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"], true);

    let (status, _) = call(&h, Method::GET, "/api/templates/x", Some("nobody"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, payload) = call(&h, Method::GET, "/api/templates/x", Some("acme"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn consent_flow_over_http() -> Result<()> {
    let h = Harness::new().await?;
    h.tenant("acme").await?;
    let tenant = Some("acme");

    let draft = json!({
        "businessId": common::BUSINESS,
        "name": "Cookie banner",
        "preferences": draft("unused").preferences,
        "content": { "en": { "title": "Privacy", "description": "Pick" } },
        "uiConfig": {}
    });
    let (status, created) = call(&h, Method::POST, "/api/templates", tenant, Some(draft)).await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", created);
    let template_id = created["data"]["logicalId"].as_str().unwrap_or_default().to_string();
    assert_eq!(created["data"]["version"], 1);
    assert_eq!(created["data"]["versionStatus"], "ACTIVE");

    let (status, _) = call(&h, Method::POST, &format!("/api/templates/{}/publish", template_id), tenant, None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, handle) = call(
        &h,
        Method::POST,
        "/api/consent-handles",
        tenant,
        Some(json!({ "templateId": template_id, "customerIdentifier": "c-1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "handle failed: {}", handle);
    assert_eq!(handle["data"]["status"], "PENDING");
    let handle_id = handle["data"]["documentId"].as_str().unwrap_or_default().to_string();

    let consent_body = json!({
        "handleId": handle_id,
        "preferences": [
            { "purposeId": "essential", "status": "ACCEPTED" },
            { "purposeId": "marketing", "status": "NOTACCEPTED" }
        ]
    });
    let (status, consent) = call(&h, Method::POST, "/api/consents", tenant, Some(consent_body.clone())).await?;
    assert_eq!(status, StatusCode::CREATED, "consent failed: {}", consent);
    assert_eq!(consent["data"]["status"], "ACTIVE");
    let consent_id = consent["data"]["logicalId"].as_str().unwrap_or_default().to_string();

    let (status, reused) = call(&h, Method::POST, "/api/consents", tenant, Some(consent_body)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(reused["code"], "HANDLE_ALREADY_USED");

    h.advance_minutes(10);
    let (status, updated) = call(
        &h,
        Method::PUT,
        &format!("/api/consents/{}/preferences", consent_id),
        tenant,
        Some(json!({ "preferences": [{ "purposeId": "marketing", "status": "ACCEPTED" }] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "update failed: {}", updated);
    assert_eq!(updated["data"]["version"], 2);

    let (status, v1) = call(&h, Method::GET, &format!("/api/consents/{}/versions/1", consent_id), tenant, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v1["data"]["versionStatus"], "UPDATED");

    let (status, history) = call(&h, Method::GET, &format!("/api/consents/{}/history", consent_id), tenant, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"].as_array().map(Vec::len), Some(2));

    let (status, revoked) = call(
        &h,
        Method::PUT,
        &format!("/api/consents/{}/status", consent_id),
        tenant,
        Some(json!({ "status": "REVOKED" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revoked["data"]["status"], "REVOKED");

    let (status, audit) = call(&h, Method::GET, "/api/admin/audit/consents", tenant, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["data"]["logicalIdsChecked"], 1);

    let (status, sweep) = call(&h, Method::POST, "/api/admin/sweep", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sweep["data"]["transitioned"], 0);
    Ok(())
}

#[tokio::test]
async fn other_tenants_cannot_see_records() -> Result<()> {
    let h = Harness::new().await?;
    let alpha = h.tenant("alpha").await?;
    h.tenant("beta").await?;
    let template = h.published_template(&alpha).await?;
    let uri = format!("/api/templates/{}", template.meta.logical_id);

    let (status, _) = call(&h, Method::GET, &uri, Some("alpha"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, payload) = call(&h, Method::GET, &uri, Some("beta"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["success"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn unknown_audit_collection_is_not_found() -> Result<()> {
    let h = Harness::new().await?;
    h.tenant("acme").await?;
    let (status, _) = call(&h, Method::GET, "/api/admin/audit/users", Some("acme"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // Handles are not versioned
    let (status, payload) = call(&h, Method::GET, "/api/admin/audit/cookie_consent_handles", Some("acme"), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["code"], "INVALID_INPUT");
    Ok(())
}

#[tokio::test]
async fn corrupted_version_state_is_not_described_to_clients() -> Result<()> {
    let store = FlakyStore::new();
    let h = Harness::over(Arc::new(store.clone())).await?;
    let acme = h.tenant("acme").await?;
    let template = h.published_template(&acme).await?;
    let id = template.meta.logical_id.clone();
    h.advance_minutes(10);

    // Leave two ACTIVE versions behind
    store.fail_promotion.store(true, Ordering::SeqCst);
    let services = h.services.clone();
    let lid = id.clone();
    let changes = TemplateChanges {
        name: Some("Half written".to_string()),
        ..TemplateChanges::default()
    };
    let failed = h
        .scoped(&acme, |scope| async move { services.templates.update_template(&scope, &lid, changes).await })
        .await;
    store.fail_promotion.store(false, Ordering::SeqCst);
    assert!(failed.is_err());
    h.advance_minutes(10);

    let document_ids: Vec<String> = h
        .raw_find(&h.partition(&acme), consent_vault::database::Collection::ConsentTemplates, json!({ "logicalId": id }))
        .await?
        .iter()
        .filter_map(|d| d.get("documentId").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(document_ids.len(), 2);

    let (status, payload) = call(
        &h,
        Method::PUT,
        &format!("/api/templates/{}", id),
        Some("acme"),
        Some(json!({ "name": "Third try" })),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(payload["code"], "MULTIPLE_ACTIVE_VERSIONS");
    let body = payload.to_string();
    assert!(!body.contains(&id), "logical id leaked: {}", body);
    assert!(!body.contains("2 active"), "count leaked: {}", body);

    let (status, audit) = call(&h, Method::GET, "/api/admin/audit/consent_templates", Some("acme"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let body = audit.to_string();
    for document_id in &document_ids {
        assert!(!body.contains(document_id.as_str()), "document id leaked: {}", body);
    }
    assert!(body.contains("Version state is corrupted"));
    Ok(())
}
