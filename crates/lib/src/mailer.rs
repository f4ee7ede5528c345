//! Outbound mail seam.
//!
//! Transactional delivery is an external collaborator: the core calls
//! `send_email(template_key, to, context)` and nothing else. Template
//! registrations live in configuration under `emails.<key>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{Result, config::Config};

/// The consumed mail interface.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the named template to `to` with the given context.
    async fn send_email(&self, template_key: &str, to: &str, context: &Value) -> Result<()>;
}

/// Mailer that reports success without sending. Used when
/// `test_mode.no_email` is set or no real mailer is wired in.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send_email(&self, template_key: &str, to: &str, _context: &Value) -> Result<()> {
        debug!(template_key, to, "mail suppressed");
        Ok(())
    }
}

/// Wrap a mailer according to configuration: `test_mode.no_email`
/// short-circuits delivery.
pub fn effective_mailer(config: &Config, mailer: Arc<dyn Mailer>) -> Arc<dyn Mailer> {
    if config.test_mode.no_email {
        Arc::new(NullMailer)
    } else {
        mailer
    }
}
