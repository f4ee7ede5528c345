//! Lockout state machine and authentication strategies.

use crate::helpers::{harness_with, request_from, signup_form};
use warden::{
    strategies::{self, AuthOutcome, BearerOutcome},
    user::RequestInfo,
};

async fn locked_harness() -> crate::helpers::Harness {
    harness_with(|config| {
        config.security.max_failed_logins = Some(3);
        config.security.lockout_time = 60;
    })
    .await
}

fn rejected_key(outcome: AuthOutcome) -> String {
    match outcome {
        AuthOutcome::Rejected(failure) => failure.key,
        AuthOutcome::Authenticated(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn four_bad_logins_lock_the_account() {
    let h = locked_harness().await;
    h.service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let req = request_from("1.1.1.1");
    for _ in 0..3 {
        let outcome = strategies::local(&h.service, "alice@example.com", "wrong", &req)
            .await
            .unwrap();
        assert_eq!(rejected_key(outcome), "failed_login");
    }

    let outcome = strategies::local(&h.service, "alice@example.com", "wrong", &req)
        .await
        .unwrap();
    match outcome {
        AuthOutcome::Rejected(failure) => {
            assert_eq!(failure.key, "locked");
            assert!(failure.locked);
            assert!(failure.message.contains("60"));
        }
        AuthOutcome::Authenticated(_) => panic!("expected lockout"),
    }

    // Fifth attempt inside the lockout window, even with the correct
    // password.
    let outcome = strategies::local(&h.service, "alice@example.com", "hunter22", &req)
        .await
        .unwrap();
    assert_eq!(rejected_key(outcome), "soft_locked");
}

#[tokio::test]
async fn lockout_expires_with_time() {
    let h = locked_harness().await;
    h.service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let req = request_from("1.1.1.1");
    for _ in 0..4 {
        strategies::local(&h.service, "alice@example.com", "wrong", &req)
            .await
            .unwrap();
    }

    h.clock.advance_secs(61);
    let outcome = strategies::local(&h.service, "alice@example.com", "hunter22", &req)
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Authenticated(_)));
}

#[tokio::test]
async fn soft_lock_requires_a_captcha() {
    let h = harness_with(|config| {
        config.security.max_failed_logins = Some(1);
        config.security.lockout_time = 60;
        config.security.soft_lock = true;
    })
    .await;
    h.service
        .create(signup_form("alice@example.com", "hunter22"), &request_from("1.1.1.1"))
        .await
        .unwrap();

    let req = request_from("1.1.1.1");
    for _ in 0..2 {
        strategies::local(&h.service, "alice@example.com", "wrong", &req)
            .await
            .unwrap();
    }

    let outcome = strategies::local(&h.service, "alice@example.com", "hunter22", &req)
        .await
        .unwrap();
    assert_eq!(rejected_key(outcome), "missing_captcha");

    let mut with_captcha = RequestInfo::with_ip("1.1.1.1");
    with_captcha.captcha_passed = true;
    let outcome =
        strategies::local(&h.service, "alice@example.com", "hunter22", &with_captcha)
            .await
            .unwrap();
    assert!(matches!(outcome, AuthOutcome::Authenticated(_)));
}

#[tokio::test]
async fn unknown_user_and_unconfirmed_email_reject() {
    let h = harness_with(|config| {
        config.local.send_confirm_email = true;
        config.local.require_email_confirm = true;
    })
    .await;

    let req = request_from("1.1.1.1");
    let outcome = strategies::local(&h.service, "ghost@example.com", "whatever", &req)
        .await
        .unwrap();
    assert_eq!(rejected_key(outcome), "failed_login");

    h.service
        .create(signup_form("alice@example.com", "hunter22"), &req)
        .await
        .unwrap();
    let outcome = strategies::local(&h.service, "alice@example.com", "hunter22", &req)
        .await
        .unwrap();
    assert_eq!(rejected_key(outcome), "email_unconfirmed");
}

#[tokio::test]
async fn bearer_strategy_parses_and_confirms() {
    let h = locked_harness().await;
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

    let outcome = strategies::bearer(&h.service, "malformed-credential")
        .await
        .unwrap();
    match outcome {
        BearerOutcome::Rejected(failure) => assert_eq!(failure.message, "invalid token"),
        BearerOutcome::Authenticated(_) => panic!("expected rejection"),
    }

    let credentials = format!("{}:{}", session.token, session.password);
    let outcome = strategies::bearer(&h.service, &credentials).await.unwrap();
    match outcome {
        BearerOutcome::Authenticated(view) => assert_eq!(view.user_id, user.id),
        BearerOutcome::Rejected(_) => panic!("expected authentication"),
    }

    h.service.logout_session(&session.token).await.unwrap();
    let outcome = strategies::bearer(&h.service, &credentials).await.unwrap();
    assert!(matches!(outcome, BearerOutcome::Rejected(_)));
}
