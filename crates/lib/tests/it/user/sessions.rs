//! Session issuance, confirmation, refresh, and garbage collection.

use serde_json::json;

use crate::helpers::{harness, harness_with, request_from, signup_form};
use warden::{
    config::ProfileField,
    store::DocumentStore,
    user::{ProviderAccount, UserDoc},
};

#[tokio::test]
async fn create_session_returns_a_complete_payload() {
    let h = harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["test".to_string()];
    })
    .await;

    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("9.9.9.9"))
        .await
        .unwrap();

    let session = h
        .service
        .create_session(&user.id, "local", &request_from("9.9.9.9"))
        .await
        .unwrap();

    assert_eq!(session.user_id, user.id);
    assert_eq!(session.user_email.as_deref(), Some("alice@example.com"));
    assert_eq!(session.roles, vec!["user"]);
    assert_eq!(session.provider, "local");
    assert_eq!(session.ip.as_deref(), Some("9.9.9.9"));
    assert_eq!(
        session.expires,
        session.issued + 86_400 * 1000
    );

    let db_url = &session.user_dbs["test"];
    assert_eq!(
        *db_url,
        format!(
            "http://{}:{}@localhost:5984/userdb_test${}",
            session.token, session.password, user.id
        )
    );
}

#[tokio::test]
async fn session_token_is_stored_authorized_and_recorded() {
    let h = harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["test".to_string()];
    })
    .await;

    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();
    let session = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    // Token record matches the response.
    let token = h.service.sessions().fetch_token(&session.token).await.unwrap();
    assert_eq!(token.expires, session.expires);
    assert_eq!(token.user_id, user.id);

    // Credential exists in the DB auth store, hashed at rest.
    let record = h.server.auth_key(&session.token).await.unwrap();
    assert_eq!(record.user_id, user.id);
    assert_ne!(record.derived_key, session.password);
    assert_eq!(record.expires, session.expires);

    // The user document carries the session with matching expiry.
    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    let session_ref = &doc.session[&session.token];
    assert_eq!(session_ref.expires, session.expires);
    assert_eq!(session_ref.provider, "local");

    // And the key is a member of the personal database.
    use warden::db_auth::DatabaseServer;
    let security = h
        .server
        .get_security(&format!("userdb_test${}", user.id))
        .await
        .unwrap();
    assert!(security.members.names.contains(&session.token));

    assert_eq!(h.event_names(), vec!["signup", "login"]);
}

#[tokio::test]
async fn confirm_session_roundtrip() {
    let h = harness().await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();
    let session = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    let view = h
        .service
        .confirm_session(&session.token, &session.password)
        .await
        .unwrap();
    assert_eq!(view.user_id, user.id);
    assert_eq!(view.roles, vec!["user"]);

    assert!(
        h.service
            .confirm_session(&session.token, "wrong")
            .await
            .unwrap_err()
            .is_unauthorized()
    );
}

#[tokio::test]
async fn refresh_extends_expiry_and_leaves_other_sessions_untouched() {
    let h = harness().await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let first = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();
    let second = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    h.clock.advance_secs(3_600);
    let refreshed = h.service.refresh_session(&second.token).await.unwrap();
    assert_eq!(refreshed.expires, second.expires + 3_600 * 1000);

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert_eq!(doc.session[&second.token].expires, refreshed.expires);
    assert_eq!(doc.session[&first.token].expires, first.expires);

    assert!(h.event_names().contains(&"refresh".to_string()));
}

#[tokio::test]
async fn expired_sessions_are_garbage_collected_on_the_next_login() {
    let h = harness().await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let stale = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    h.clock.advance_secs(86_401);
    let fresh = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert!(!doc.session.contains_key(&stale.token));
    assert!(doc.session.contains_key(&fresh.token));
    assert!(h.server.auth_key(&stale.token).await.is_none());
}

#[tokio::test]
async fn local_session_resets_lockout_counters() {
    let h = harness_with(|config| {
        config.security.max_failed_logins = Some(3);
    })
    .await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    h.service
        .handle_failed_login(&user.id, &request_from("1.1.1.1"))
        .await
        .unwrap();

    h.service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    let local = doc.local.unwrap();
    assert_eq!(local.failed_login_attempts, Some(0));
    assert!(local.locked_until.is_none());
}

#[tokio::test]
async fn profile_mapping_prefers_providers_in_declared_order() {
    let h = harness_with(|config| {
        config.session.profile_mapping = vec![
            ProfileField {
                name: "displayName".to_string(),
                providers: vec!["twitter".to_string(), "github".to_string()],
            },
            ProfileField {
                name: "avatar".to_string(),
                providers: vec!["github".to_string()],
            },
        ];
    })
    .await;

    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    // Attach provider profiles directly; the mapping only reads them.
    let mut doc: UserDoc = h.service.get("alice@example.com").await.unwrap().unwrap();
    doc.oauth.insert(
        "github".to_string(),
        ProviderAccount {
            auth: json!({}),
            profile: json!({"displayName": "Octo Alice", "avatar": "gh.png"}),
        },
    );
    doc.oauth.insert(
        "twitter".to_string(),
        ProviderAccount {
            auth: json!({}),
            profile: json!({"displayName": "@alice"}),
        },
    );
    h.store.put(&mut doc).await.unwrap();

    let session = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();

    let profile = session.profile.unwrap();
    assert_eq!(profile["displayName"], json!("@alice"));
    assert_eq!(profile["avatar"], json!("gh.png"));
}
