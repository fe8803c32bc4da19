use serde_json::json;

use super::*;
use crate::client::fake::FakeClient;
use crate::data::projection::test_support::{connected_context, drain, offline_context};

fn locale(ctx: ProjectionContext) -> ObjectProjection {
    ObjectProjection::new("Locale", r"^/riotclient/region-locale$", ObjectRule::MergeKeys(&["locale"]), ctx).unwrap()
}

fn replace(ctx: ProjectionContext) -> ObjectProjection {
    ObjectProjection::new("Auth", r"^/auth$", ObjectRule::Replace, ctx).unwrap()
}

#[tokio::test]
async fn update_ignored_until_started() {
    let proj = replace(offline_context());
    proj.update(Opcode::Create, &[], Some(json!({"a": 1}))).await;
    assert!(proj.snapshot().await.is_none());

    proj.start().await;
    proj.update(Opcode::Create, &[], Some(json!({"a": 1}))).await;
    assert_eq!(proj.snapshot().await, Some(json!({"a": 1})));
}

#[tokio::test]
async fn replace_overwrites_and_broadcasts() {
    let ctx = offline_context();
    let (_id, mut rx) = ctx.hub.add_connection();
    let proj = replace(ctx);
    proj.start().await;

    proj.update(Opcode::Create, &[], Some(json!({"a": 1, "b": 2}))).await;
    proj.update(Opcode::Update, &[], Some(json!({"c": 3}))).await;

    assert_eq!(proj.snapshot().await, Some(json!({"c": 3})));
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], json!({"eventType": "Auth", "data": {"c": 3}}));
}

#[tokio::test]
async fn merge_keeps_only_listed_keys() {
    let proj = locale(offline_context());
    proj.start().await;

    proj.update(Opcode::Update, &[], Some(json!({"locale": "en_US", "region": "NA"}))).await;
    assert_eq!(proj.snapshot().await, Some(json!({"locale": "en_US"})));

    proj.update(Opcode::Update, &[], Some(json!({"region": "EU"}))).await;
    assert_eq!(proj.snapshot().await, Some(json!({"locale": "en_US"})));

    proj.update(Opcode::Update, &[], Some(json!({"locale": "de_DE"}))).await;
    assert_eq!(proj.snapshot().await, Some(json!({"locale": "de_DE"})));
}

#[tokio::test]
async fn delete_resets_and_announces_empty() {
    let ctx = offline_context();
    let (_id, mut rx) = ctx.hub.add_connection();
    let proj = replace(ctx);
    proj.start().await;
    proj.update(Opcode::Create, &[], Some(json!({"a": 1}))).await;
    drain(&mut rx);

    proj.update(Opcode::Delete, &[], None).await;

    assert!(proj.snapshot().await.is_none());
    assert_eq!(drain(&mut rx), vec![json!({"eventType": "Auth", "data": {}})]);
}

#[tokio::test]
async fn non_object_payload_ignored() {
    let proj = replace(offline_context());
    proj.start().await;
    proj.update(Opcode::Create, &[], Some(json!([1, 2]))).await;
    proj.update(Opcode::Create, &[], None).await;
    assert!(proj.snapshot().await.is_none());
}

#[tokio::test]
async fn stop_discards_state() {
    let proj = replace(offline_context());
    proj.start().await;
    proj.update(Opcode::Create, &[], Some(json!({"a": 1}))).await;
    proj.stop().await;

    assert!(!proj.is_running());
    assert!(proj.snapshot().await.is_none());

    proj.start().await;
    assert!(proj.snapshot().await.is_none());
}

#[tokio::test]
async fn unknown_state_fetched_lazily() {
    let fake = FakeClient::start().await;
    fake.insert_session("abc", json!({"productId": "valorant"}));
    let proj = replace(connected_context(&fake)).with_fetch("/product-session/v1/sessions/abc");
    proj.start().await;

    assert_eq!(proj.snapshot().await, Some(json!({"productId": "valorant"})));
}

#[tokio::test]
async fn error_responses_not_cached() {
    let fake = FakeClient::start().await;
    let proj = replace(connected_context(&fake)).with_fetch("/product-session/v1/sessions/missing");
    proj.start().await;

    assert!(proj.snapshot().await.is_none());
}

#[test]
fn matches_requires_full_path() {
    let proj = locale(offline_context());
    assert!(proj.matches("/riotclient/region-locale").is_some());
    assert!(proj.matches("/riotclient/region-locale/extra").is_none());
    assert!(proj.matches("/prefix/riotclient/region-locale").is_none());
}

#[test]
fn deep_merge_recurses_into_objects() {
    let mut target = json!({"a": {"x": 1, "y": 2}, "b": 1});
    deep_merge(&mut target, json!({"a": {"y": 3, "z": 4}, "b": [1]}));
    assert_eq!(target, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": [1]}));
}

#[tokio::test]
async fn auth_challenges_are_inspected_and_stored() {
    let proj = replace(offline_context()).with_inspect(log_auth_challenges);
    proj.start().await;

    let payload = json!({
        "type": "multifactor",
        "multifactor": {"email": "a***@example.com", "method": "email"},
        "captcha": {"type": "hcaptcha", "hcaptcha": {"key": "k"}},
        "error": null,
    });
    proj.update(Opcode::Create, &[], Some(payload.clone())).await;

    assert_eq!(proj.snapshot().await, Some(payload));
}
