use super::*;

#[test]
fn auth_header_is_basic_principal_secret() {
    assert_eq!(auth_header("riot", "secret"), "Basic cmlvdDpzZWNyZXQ=");
    assert_eq!(auth_header("riot", "abc123"), "Basic cmlvdDphYmMxMjM=");
}

#[test]
fn session_derives_token_from_secret() {
    let session = Session::new("riot", 4444, "abc123");
    assert_eq!(session.port, 4444);
    assert_eq!(session.secret, "abc123");
    assert_eq!(session.auth_token, "Basic cmlvdDphYmMxMjM=");
}

#[test]
fn generated_secrets_are_hex_and_unique() {
    let a = generate_secret();
    let b = generate_secret();
    assert_eq!(a.len(), 32);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}

#[tokio::test]
async fn free_port_is_bindable_after_release() {
    let port = find_free_port(Duration::from_millis(10)).await.unwrap();
    assert_ne!(port, 0);
    let rebound = tokio::net::TcpListener::bind(("127.0.0.1", port)).await;
    assert!(rebound.is_ok());
}

#[test]
fn store_swaps_whole_sessions() {
    let store = SessionStore::new();
    assert!(store.snapshot().is_none());

    store.set(Arc::new(Session::new("riot", 1, "one")));
    let first = store.snapshot().unwrap();
    store.set(Arc::new(Session::new("riot", 2, "two")));

    assert_eq!(first.port, 1);
    assert_eq!(first.secret, "one");
    let second = store.snapshot().unwrap();
    assert_eq!(second.port, 2);
    assert_eq!(second.auth_token, auth_header("riot", "two"));

    store.clear();
    assert!(store.snapshot().is_none());
}
