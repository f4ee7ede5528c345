//! Lifecycle event fan-out.
//!
//! The emitter is an injected collaborator, not process-global state.
//! Hooks are notified after the triggering operation has persisted its
//! effects; hook failures are logged and never alter operation results.

use std::sync::Arc;

use tracing::error;

/// Catalogue of lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    Signup {
        user_id: String,
        provider: String,
    },
    Login {
        user_id: String,
        provider: String,
    },
    Refresh {
        user_id: String,
        key: String,
    },
    Logout {
        user_id: String,
    },
    LogoutAll {
        user_id: String,
    },
    PasswordReset {
        user_id: String,
    },
    PasswordChange {
        user_id: String,
    },
    ForgotPassword {
        user_id: String,
    },
    EmailVerified {
        user_id: String,
    },
    EmailChanged {
        user_id: String,
    },
    PhoneChanged {
        user_id: String,
    },
    UserDbAdded {
        user_id: String,
        db_name: String,
    },
    UserDbRemoved {
        user_id: String,
        db_name: String,
    },
}

impl AuthEvent {
    /// Stable event name as documented in the catalogue.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::Signup { .. } => "signup",
            AuthEvent::Login { .. } => "login",
            AuthEvent::Refresh { .. } => "refresh",
            AuthEvent::Logout { .. } => "logout",
            AuthEvent::LogoutAll { .. } => "logout-all",
            AuthEvent::PasswordReset { .. } => "password-reset",
            AuthEvent::PasswordChange { .. } => "password-change",
            AuthEvent::ForgotPassword { .. } => "forgot-password",
            AuthEvent::EmailVerified { .. } => "email-verified",
            AuthEvent::EmailChanged { .. } => "email-changed",
            AuthEvent::PhoneChanged { .. } => "phone-changed",
            AuthEvent::UserDbAdded { .. } => "user-db-added",
            AuthEvent::UserDbRemoved { .. } => "user-db-removed",
        }
    }
}

/// A lifecycle event subscriber.
///
/// Implementations must not block for long and must not raise back into
/// the core; panics are the implementor's bug.
pub trait EventHook: Send + Sync {
    fn on_event(&self, event: &AuthEvent);
}

impl<F: Fn(&AuthEvent) + Send + Sync> EventHook for F {
    fn on_event(&self, event: &AuthEvent) {
        self(event)
    }
}

/// A collection of event hooks executed in registration order.
#[derive(Default, Clone)]
pub struct EventEmitter {
    hooks: Vec<Arc<dyn EventHook>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.push(hook);
    }

    /// Notify every hook. A panicking hook is caught and logged so
    /// subscribers cannot fail the triggering operation.
    pub fn emit(&self, event: &AuthEvent) {
        for hook in &self.hooks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                hook.on_event(event);
            }));
            if result.is_err() {
                error!(event = event.name(), "event hook panicked");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
