//! Per-user database provisioning and account removal.

use crate::helpers::{harness_with, request_from, signup_form};
use warden::{
    clock::Clock,
    config::{DbModelConfig, DbType},
    db_auth::DatabaseServer,
    user::LogoutTarget,
};

#[tokio::test]
async fn default_dbs_are_provisioned_on_signup() {
    let h = harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["notes".to_string()];
        config.user_dbs.default_dbs.shared = vec!["board".to_string()];
    })
    .await;

    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let private = format!("userdb_notes${}", user.id);
    assert!(h.server.db_exists(&private).await.unwrap());
    assert!(h.server.db_exists("board").await.unwrap());

    // The key is the physical name; `name` holds the logical name.
    assert_eq!(user.personal_dbs[&private].name, "notes");
    assert_eq!(user.personal_dbs[&private].db_type, DbType::Private);
    assert_eq!(user.personal_dbs["board"].name, "board");
    assert_eq!(user.personal_dbs["board"].db_type, DbType::Shared);
}

#[tokio::test]
async fn add_user_db_records_and_emits() {
    let h = harness_with(|config| {
        config.user_dbs.model.insert(
            "extra".to_string(),
            DbModelConfig {
                member_roles: vec!["extra-member".to_string()],
                ..Default::default()
            },
        );
    })
    .await;

    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let physical = h
        .service
        .add_user_db(&user.id, "extra", None, None, None, None)
        .await
        .unwrap();
    assert_eq!(physical, format!("userdb_extra${}", user.id));

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    let entry = &doc.personal_dbs[&physical];
    assert_eq!(entry.name, "extra");
    // Permissions were not explicitly supplied, so they are resolved
    // from configuration at session time rather than persisted.
    assert!(entry.permissions.is_none());

    let security = h.server.get_security(&physical).await.unwrap();
    assert!(security.members.roles.contains(&"extra-member".to_string()));

    assert!(h.event_names().contains(&"user-db-added".to_string()));
}

#[tokio::test]
async fn explicit_permissions_are_persisted() {
    let h = harness_with(|_| {}).await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let physical = h
        .service
        .add_user_db(
            &user.id,
            "projects",
            Some(DbType::Private),
            Some(vec!["_reader".to_string(), "_writer".to_string()]),
            None,
            None,
        )
        .await
        .unwrap();

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert_eq!(
        doc.personal_dbs[&physical].permissions,
        Some(vec!["_reader".to_string(), "_writer".to_string()])
    );
}

#[tokio::test]
async fn remove_user_db_destroys_only_when_asked() {
    let h = harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["notes".to_string(), "drafts".to_string()];
    })
    .await;
    let user = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let notes = format!("userdb_notes${}", user.id);
    let drafts = format!("userdb_drafts${}", user.id);

    // Without the destroy flag the physical database survives.
    h.service
        .remove_user_db(&user.id, "notes", false, false)
        .await
        .unwrap();
    assert!(h.server.db_exists(&notes).await.unwrap());

    h.service
        .remove_user_db(&user.id, "drafts", true, false)
        .await
        .unwrap();
    assert!(!h.server.db_exists(&drafts).await.unwrap());

    let doc = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert!(!doc.personal_dbs.contains_key(&notes));
    assert!(!doc.personal_dbs.contains_key(&drafts));
    assert!(h.event_names().contains(&"user-db-removed".to_string()));
}

#[tokio::test]
async fn remove_account_revokes_sessions_and_optionally_destroys_dbs() {
    let h = harness_with(|config| {
        config.user_dbs.default_dbs.private = vec!["notes".to_string()];
        config.user_dbs.default_dbs.shared = vec!["board".to_string()];
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

    h.service.remove(&user.id, true).await.unwrap();

    assert!(h.service.get("alice@example.com").await.unwrap().is_none());
    assert!(
        h.service
            .confirm_session(&session.token, &session.password)
            .await
            .is_err()
    );
    assert!(h.server.auth_key(&session.token).await.is_none());

    let private = format!("userdb_notes${}", user.id);
    assert!(!h.server.db_exists(&private).await.unwrap());
    // Shared databases are never destroyed on account removal.
    assert!(h.server.db_exists("board").await.unwrap());
}

#[tokio::test]
async fn expired_auth_keys_are_swept() {
    let h = harness_with(|_| {}).await;
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

    h.clock.advance_secs(86_401);
    let removed = h
        .service
        .db_auth()
        .remove_expired_keys(h.clock.now_millis())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(h.server.auth_key(&session.token).await.is_none());

    // The logout path also works for users resolved by a live session.
    let fresh = h
        .service
        .create_session(&user.id, "local", &request_from("1.1.1.1"))
        .await
        .unwrap();
    h.service
        .logout_user(LogoutTarget::Session(&fresh.token))
        .await
        .unwrap();
}
