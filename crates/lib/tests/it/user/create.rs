//! Account creation: ids, invite codes, confirmation email, and
//! transformation pipelines.

use serde_json::json;

use crate::helpers::{harness, harness_with, request_from, signup_form};
use warden::{
    user::{UserDoc, transform},
    util,
};

#[tokio::test]
async fn create_with_uuid_ids_keeps_email_and_drops_username() {
    let h = harness_with(|config| {
        config.local.uuid_as_id = true;
    })
    .await;

    let doc = h
        .service
        .create(signup_form("superuser@example2.com", "secret"), &request_from("1.2.3.4"))
        .await
        .unwrap();

    assert_eq!(doc.email.as_deref(), Some("superuser@example2.com"));
    assert_eq!(doc.id.len(), 32);
    assert!(doc.id.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(doc.username.is_none());
    assert_eq!(doc.providers, vec!["local"]);
    assert!(doc.local.is_some());
    assert_eq!(h.event_names(), vec!["signup"]);
}

#[tokio::test]
async fn create_without_uuid_ids_renames_login_into_id() {
    let h = harness_with(|config| {
        config.local.uuid_as_id = false;
    })
    .await;

    let doc = h
        .service
        .create(signup_form("superuser@example2.com", "secret"), &request_from("1.2.3.4"))
        .await
        .unwrap();

    assert_eq!(doc.id, "superuser@example2.com");
    assert!(doc.username.is_none());
    assert_eq!(doc.email.as_deref(), Some("superuser@example2.com"));
}

#[tokio::test]
async fn created_password_verifies() {
    let h = harness().await;
    let doc = h
        .service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let local = doc.local.unwrap();
    assert!(util::verify_password("hunter22", &local.derived_key).is_ok());
    assert!(util::verify_password("wrong", &local.derived_key).is_err());
    assert!(!local.salt.is_empty());
}

#[tokio::test]
async fn create_then_get_resolves_every_enabled_login_key() {
    let h = harness().await;
    h.service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let by_email = h.service.get("alice@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.email.as_deref(), Some("alice@example.com"));

    // The id doubles as the username key value after the rename.
    let by_username = h.service.get("alice@example.com").await.unwrap();
    assert!(by_username.is_some());
}

#[tokio::test]
async fn duplicate_email_is_a_validation_failure() {
    let h = harness().await;
    h.service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let err = h
        .service
        .create(signup_form("alice@example.com", "other66"), &request_from("1.1.1.1"))
        .await
        .unwrap_err();

    let body = err.to_body();
    assert_eq!(body.key, "validation_failed");
    assert_eq!(body.status, 400);
    let messages = &body.validation_errors.unwrap()["email"];
    assert!(messages.iter().any(|m| m.contains("already in use")));
}

#[tokio::test]
async fn mismatched_confirmation_fails_validation() {
    let h = harness().await;
    let mut form = signup_form("alice@example.com", "hunter22");
    form.insert("confirmPassword".to_string(), json!("different"));

    let err = h.service.create(form, &request_from("1.1.1.1")).await.unwrap_err();
    let errors = err.to_body().validation_errors.unwrap();
    assert!(errors["confirmPassword"][0].contains("does not match"));
}

#[tokio::test]
async fn invite_gate_adopts_reserved_id_and_consumes_the_code() {
    let h = harness_with(|config| {
        config.security.invite_only_registration = true;
        config.local.uuid_as_id = true;
    })
    .await;

    let reserved = util::uuid32();
    h.service
        .sessions()
        .store_key("invite_code:abc123", 10_000, &reserved)
        .await
        .unwrap();

    let mut form = signup_form("bob@example.com", "hunter22");
    form.insert("inviteCode".to_string(), json!("abc123"));
    let doc = h.service.create(form, &request_from("1.1.1.1")).await.unwrap();

    assert_eq!(doc.id, reserved);
    assert!(
        h.service
            .sessions()
            .get_key("invite_code:abc123")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn missing_or_unknown_invite_code_rejects() {
    let h = harness_with(|config| {
        config.security.invite_only_registration = true;
    })
    .await;

    let err = h
        .service
        .create(signup_form("bob@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap_err();
    assert_eq!(err.key(), "missing_invite_code");

    let mut form = signup_form("bob@example.com", "hunter22");
    form.insert("inviteCode".to_string(), json!("never-stored"));
    let err = h.service.create(form, &request_from("1.1.1.1")).await.unwrap_err();
    assert_eq!(err.key(), "missing_invite_code");
}

#[tokio::test]
async fn validation_failure_never_burns_an_invite_code() {
    let h = harness_with(|config| {
        config.security.invite_only_registration = true;
    })
    .await;

    h.service
        .sessions()
        .store_key("invite_code:abc123", 10_000, "reserved")
        .await
        .unwrap();

    let mut form = signup_form("bob@example.com", "short");
    form.insert("inviteCode".to_string(), json!("abc123"));
    assert!(h.service.create(form, &request_from("1.1.1.1")).await.is_err());

    assert_eq!(
        h.service
            .sessions()
            .get_key("invite_code:abc123")
            .await
            .unwrap()
            .as_deref(),
        Some("reserved")
    );
}

#[tokio::test]
async fn confirm_email_flow_parks_the_address_until_verified() {
    let h = harness_with(|config| {
        config.local.send_confirm_email = true;
    })
    .await;

    let doc = h
        .service
        .create(signup_form("carol@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    assert!(doc.email.is_none());
    let unverified = doc.unverified_email.clone().unwrap();
    assert_eq!(unverified.email, "carol@example.com");

    let sent = h.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "confirmEmail");
    assert_eq!(sent[0].1, "carol@example.com");
    assert_eq!(sent[0].2["token"], json!(unverified.token));

    let verified = h
        .service
        .verify_email(&unverified.token, &request_from("1.1.1.1"))
        .await
        .unwrap();
    assert_eq!(verified.email.as_deref(), Some("carol@example.com"));
    assert!(verified.unverified_email.is_none());
}

#[tokio::test]
async fn on_create_transforms_fold_sequentially() {
    let mut h = harness().await;
    h.service.register_on_create(transform(
        |mut doc: UserDoc, _req| async move {
            doc.roles.push("beta".to_string());
            Ok(doc)
        },
    ));
    h.service.register_on_create(transform(
        |mut doc: UserDoc, _req| async move {
            // Must observe the first transformation's output.
            assert!(doc.roles.contains(&"beta".to_string()));
            doc.extra
                .insert("greeting".to_string(), json!("hello"));
            Ok(doc)
        },
    ));

    let doc = h
        .service
        .create(signup_form("dave@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    assert!(doc.roles.contains(&"beta".to_string()));
    assert_eq!(doc.extra["greeting"], json!("hello"));

    // The transformed fields were persisted, not just returned.
    let stored = h.service.get("dave@example.com").await.unwrap().unwrap();
    assert_eq!(stored.extra["greeting"], json!("hello"));
}

#[tokio::test]
async fn activity_log_is_capped_and_newest_first() {
    let h = harness_with(|config| {
        config.security.user_activity_log_size = Some(3);
    })
    .await;

    let doc = h
        .service
        .create(signup_form("erin@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    for n in 0..5 {
        h.service
            .log_activity(&doc.id, &format!("probe-{n}"), "test", &request_from("1.1.1.1"))
            .await
            .unwrap();
    }

    let doc = h.service.get("erin@example.com").await.unwrap().unwrap();
    let actions: Vec<&str> = doc.activity.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["probe-4", "probe-3", "probe-2"]);

    let stamps: Vec<&str> = doc.activity.iter().map(|a| a.timestamp.as_str()).collect();
    assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
}
