//! Session revocation: single, others, and all.

use crate::helpers::{harness_with, request_from, signup_form};
use warden::{
    db_auth::DatabaseServer,
    user::{LogoutTarget, SessionResponse, UserDoc},
};

async fn user_with_sessions(
    h: &crate::helpers::Harness,
    n: usize,
) -> (UserDoc, Vec<SessionResponse>) {
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let mut sessions = Vec::new();
    for _ in 0..n {
        sessions.push(
            h.service
                .create_session(&user.id, "local", &request_from("1.1.1.1"))
                .await
                .unwrap(),
        );
    }
    (user, sessions)
}

async fn sessions_harness() -> crate::helpers::Harness {
    harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["test".to_string()];
    })
    .await
}

#[tokio::test]
async fn logout_session_revokes_exactly_one() {
    let h = sessions_harness().await;
    let (user, sessions) = user_with_sessions(&h, 2).await;

    h.service.logout_session(&sessions[0].token).await.unwrap();

    assert!(
        h.service
            .confirm_session(&sessions[0].token, &sessions[0].password)
            .await
            .is_err()
    );
    assert!(
        h.service
            .confirm_session(&sessions[1].token, &sessions[1].password)
            .await
            .is_ok()
    );

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert!(!doc.session.contains_key(&sessions[0].token));
    assert!(doc.session.contains_key(&sessions[1].token));

    // DB auth cleanup: credential gone, membership revoked.
    assert!(h.server.auth_key(&sessions[0].token).await.is_none());
    let security = h
        .server
        .get_security(&format!("userdb_test${}", user.id))
        .await
        .unwrap();
    assert!(!security.members.names.contains(&sessions[0].token));
    assert!(security.members.names.contains(&sessions[1].token));

    assert!(h.event_names().contains(&"logout".to_string()));
}

#[tokio::test]
async fn logout_others_preserves_only_the_current_session() {
    let h = sessions_harness().await;
    let (_, sessions) = user_with_sessions(&h, 3).await;

    h.service.logout_others(&sessions[1].token).await.unwrap();

    assert!(
        h.service
            .confirm_session(&sessions[1].token, &sessions[1].password)
            .await
            .is_ok()
    );
    for other in [&sessions[0], &sessions[2]] {
        assert!(
            h.service
                .confirm_session(&other.token, &other.password)
                .await
                .is_err()
        );
    }

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert_eq!(doc.session.len(), 1);
    assert!(doc.session.contains_key(&sessions[1].token));
}

#[tokio::test]
async fn logout_user_clears_every_session_and_store() {
    let h = sessions_harness().await;
    let (user, sessions) = user_with_sessions(&h, 2).await;

    h.service
        .logout_user(LogoutTarget::User(&user.id))
        .await
        .unwrap();

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert!(doc.session.is_empty());

    for session in &sessions {
        assert!(
            h.service
                .confirm_session(&session.token, &session.password)
                .await
                .is_err()
        );
        assert!(h.server.auth_key(&session.token).await.is_none());
    }

    let security = h
        .server
        .get_security(&format!("userdb_test${}", user.id))
        .await
        .unwrap();
    assert!(security.members.names.is_empty());

    let events = h.event_names();
    assert!(events.contains(&"logout".to_string()));
    assert!(events.contains(&"logout-all".to_string()));
}

#[tokio::test]
async fn logout_user_resolves_by_session_key_too() {
    let h = sessions_harness().await;
    let (_, sessions) = user_with_sessions(&h, 2).await;

    h.service
        .logout_user(LogoutTarget::Session(&sessions[0].token))
        .await
        .unwrap();

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert!(doc.session.is_empty());
}

#[tokio::test]
async fn logout_of_an_unknown_session_still_cleans_the_stores() {
    let h = sessions_harness().await;
    // No user owns this key; must not error.
    h.service.logout_session("orphan-key").await.unwrap();
}
