use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::*;
use crate::client::fake::{FakeClient, fast_upstream};
use crate::data::managers::{Managers, standard_engine};
use crate::data::projection::test_support::offline_context;

fn client_with(config: UpstreamConfig) -> (EventStreamClient, Arc<DataEngine>, Managers) {
    let (engine, managers) = standard_engine(&offline_context()).unwrap();
    let engine = Arc::new(engine);
    (EventStreamClient::new(config, None, engine.clone()), engine, managers)
}

fn closed_signal() -> (ClosedCallback, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move || {
            let _ = tx.send(());
        }),
        rx,
    )
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[test]
fn subscribe_frame_shape() {
    assert_eq!(subscribe_frame("OnJsonApiEvent"), r#"[5,"OnJsonApiEvent"]"#);
}

#[tokio::test]
async fn connects_with_auth_and_subscribes() {
    let fake = FakeClient::start().await;
    let (client, _engine, _m) = client_with(fast_upstream());
    let session = Arc::new(fake.session("abc123"));
    let (on_closed, _rx) = closed_signal();

    client.start(session, on_closed);
    wait_for(|| !fake.ws_received().is_empty()).await;

    assert_eq!(fake.ws_received()[0], r#"[5,"OnJsonApiEvent"]"#);
    assert_eq!(fake.state.ws_auth.lock().unwrap().as_deref(), Some("Basic cmlvdDphYmMxMjM="));
    assert!(client.is_running());
    client.stop();
}

#[tokio::test]
async fn pushed_frames_reach_projections() {
    let fake = FakeClient::start().await;
    let (client, engine, managers) = client_with(fast_upstream());
    engine.start().await;
    let (on_closed, _rx) = closed_signal();

    client.start(Arc::new(fake.session("s")), on_closed);
    wait_for(|| fake.ws_connections() == 1).await;

    fake.push_frame(
        r#"[8,"OnJsonApiEvent",{"eventType":"Create","uri":"/product-session/v1/sessions/abc123","data":{"productId":"valorant"}}]"#,
    );
    fake.push_frame("not a frame");
    wait_for(|| managers.product_sessions.len() == 1).await;

    assert_eq!(managers.product_sessions.to_json(), json!({"abc123": {"productId": "valorant"}}));
    client.stop();
}

#[tokio::test]
async fn peer_close_fires_callback() {
    let fake = FakeClient::start().await;
    let (client, _engine, _m) = client_with(fast_upstream());
    let (on_closed, rx) = closed_signal();

    client.start(Arc::new(fake.session("s")), on_closed);
    wait_for(|| fake.ws_connections() == 1).await;
    fake.close_sockets();

    timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_failure_fires_callback() {
    let port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let (client, _engine, _m) = client_with(fast_upstream());
    let (on_closed, rx) = closed_signal();

    client.start(Arc::new(Session::new("riot", port, "s")), on_closed);

    timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_does_not_fire_callback() {
    let fake = FakeClient::start().await;
    let (client, _engine, _m) = client_with(fast_upstream());
    let (on_closed, rx) = closed_signal();

    client.start(Arc::new(fake.session("s")), on_closed);
    wait_for(|| fake.ws_connections() == 1).await;
    client.stop();

    wait_for(|| fake.ws_connections() == 0).await;
    // The callback is dropped unfired: the receiver sees either nothing or
    // a closed channel, never a value.
    let outcome = timeout(Duration::from_millis(100), rx).await;
    assert!(!matches!(outcome, Ok(Ok(()))));
    assert!(!client.is_running());
}

#[tokio::test]
async fn keepalive_sends_empty_frames() {
    let fake = FakeClient::start().await;
    let config = UpstreamConfig { event_keepalive: Duration::from_millis(30), ..fast_upstream() };
    let (client, _engine, _m) = client_with(config);
    let (on_closed, _rx) = closed_signal();

    client.start(Arc::new(fake.session("s")), on_closed);
    wait_for(|| fake.ws_received().iter().filter(|m| m.is_empty()).count() >= 2).await;
    client.stop();
}
