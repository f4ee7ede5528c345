//! Adapter conformance: memory and file adapters must be behaviorally
//! indistinguishable through the `SessionStore` surface.

use std::sync::Arc;

use tempfile::TempDir;

use warden::{
    FixedClock,
    clock::Clock,
    session::{FileAdapter, MemoryAdapter, SessionStore, SessionToken},
};

struct AdapterCase {
    name: &'static str,
    store: SessionStore,
    clock: Arc<FixedClock>,
    // Keeps the file adapter's directory alive for the test's duration.
    _dir: Option<TempDir>,
}

fn adapter_cases() -> Vec<AdapterCase> {
    let memory_clock = Arc::new(FixedClock::new(1_000_000));
    let memory_dyn: Arc<dyn Clock> = memory_clock.clone();
    let memory = AdapterCase {
        name: "memory",
        store: SessionStore::new(
            Arc::new(MemoryAdapter::new(memory_dyn.clone())),
            memory_dyn,
        ),
        clock: memory_clock,
        _dir: None,
    };

    let dir = TempDir::new().unwrap();
    let file_clock = Arc::new(FixedClock::new(1_000_000));
    let file_dyn: Arc<dyn Clock> = file_clock.clone();
    let file = AdapterCase {
        name: "file",
        store: SessionStore::new(
            Arc::new(FileAdapter::new(dir.path().to_path_buf(), file_dyn.clone())),
            file_dyn,
        ),
        clock: file_clock,
        _dir: Some(dir),
    };

    vec![memory, file]
}

fn token(key: &str, password: &str, expires: u64) -> SessionToken {
    SessionToken {
        user_id: "u1".to_string(),
        key: key.to_string(),
        password: password.to_string(),
        issued: 1_000_000,
        expires,
        provider: "local".to_string(),
        roles: vec!["user".to_string()],
    }
}

#[tokio::test]
async fn token_roundtrip_and_confirmation() {
    for case in adapter_cases() {
        let t = token("k1", "pw1", 2_000_000);
        case.store.store_token(&t).await.unwrap();

        let fetched = case.store.fetch_token("k1").await.unwrap();
        assert_eq!(fetched, t, "{}", case.name);

        let view = case.store.confirm_token("k1", "pw1").await.unwrap();
        assert_eq!(view.user_id, "u1", "{}", case.name);
        assert_eq!(view.key, "k1", "{}", case.name);
        assert_eq!(view.roles, vec!["user"], "{}", case.name);
    }
}

#[tokio::test]
async fn confirmation_rejects_wrong_password_and_unknown_keys() {
    for case in adapter_cases() {
        case.store
            .store_token(&token("k1", "pw1", 2_000_000))
            .await
            .unwrap();

        let err = case.store.confirm_token("k1", "wrong").await.unwrap_err();
        assert!(err.is_unauthorized(), "{}", case.name);

        let err = case.store.confirm_token("nope", "pw1").await.unwrap_err();
        assert!(err.is_unauthorized(), "{}", case.name);
    }
}

#[tokio::test]
async fn expired_tokens_are_never_returned() {
    for case in adapter_cases() {
        case.store
            .store_token(&token("k1", "pw1", 2_000_000))
            .await
            .unwrap();

        case.clock.set(2_000_000);
        assert!(
            case.store.fetch_token("k1").await.is_err(),
            "{}",
            case.name
        );
        assert!(
            case.store.confirm_token("k1", "pw1").await.is_err(),
            "{}",
            case.name
        );
    }
}

#[tokio::test]
async fn deleted_tokens_fail_confirmation() {
    for case in adapter_cases() {
        case.store
            .store_token(&token("k1", "pw1", 2_000_000))
            .await
            .unwrap();
        case.store
            .delete_tokens(&["k1".to_string()])
            .await
            .unwrap();

        let err = case.store.confirm_token("k1", "pw1").await.unwrap_err();
        assert!(err.is_unauthorized(), "{}", case.name);
    }
}

#[tokio::test]
async fn named_keys_roundtrip_with_ttl() {
    for case in adapter_cases() {
        case.store
            .store_key("invite_code:abc", 10_000, "some-user-id")
            .await
            .unwrap();
        assert_eq!(
            case.store.get_key("invite_code:abc").await.unwrap().as_deref(),
            Some("some-user-id"),
            "{}",
            case.name
        );

        case.store
            .delete_keys(&["invite_code:abc".to_string()])
            .await
            .unwrap();
        assert!(
            case.store.get_key("invite_code:abc").await.unwrap().is_none(),
            "{}",
            case.name
        );
    }
}

#[tokio::test]
async fn named_keys_expire_by_ttl() {
    for case in adapter_cases() {
        case.store
            .store_key("invite_code:abc", 10, "value")
            .await
            .unwrap();
        case.clock.advance_secs(11);
        assert!(
            case.store.get_key("invite_code:abc").await.unwrap().is_none(),
            "{}",
            case.name
        );
    }
}

#[tokio::test]
async fn quit_is_graceful() {
    for case in adapter_cases() {
        case.store.quit().await.unwrap();
    }
}
