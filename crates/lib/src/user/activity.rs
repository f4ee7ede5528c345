//! Activity auditing.
//!
//! A capped, newest-first audit list embedded in the user document.
//! Logging is disabled entirely when `security.user_activity_log_size`
//! is unset.

use super::{UserService, types::ActivityEntry, types::RequestInfo, types::UserDoc};
use crate::Result;

impl UserService {
    /// Prepend an audit entry and trim to the configured size.
    /// No-op when activity logging is disabled.
    pub(crate) fn push_activity(
        &self,
        doc: &mut UserDoc,
        action: &str,
        provider: &str,
        ip: Option<&str>,
    ) {
        let Some(size) = self.config().security.user_activity_log_size else {
            return;
        };

        doc.activity.insert(
            0,
            ActivityEntry {
                timestamp: self.clock().now_rfc3339(),
                action: action.to_string(),
                provider: provider.to_string(),
                ip: ip.map(str::to_string),
            },
        );
        doc.activity.truncate(size);
    }

    /// Record an audit entry on a stored user document and persist it.
    pub async fn log_activity(
        &self,
        user_id: &str,
        action: &str,
        provider: &str,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let action = action.to_string();
        let provider = provider.to_string();
        let ip = req.ip.clone();
        self.update_with_retry(user_id, |doc| {
            self.push_activity(doc, &action, &provider, ip.as_deref());
            Ok(())
        })
        .await
    }
}
