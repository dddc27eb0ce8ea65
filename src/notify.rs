//! Desktop notification hook for the `AlertEngine` (SPEC_FULL.md §1), gated
//! by `alerts.notifications.system_notify` in config.

use crate::domain::{Alert, Severity};
use tracing::warn;

/// Builds the `Notifier` closure passed to `AlertEngine::new`. Returns `None`
/// when notifications are disabled, so the engine simply skips the hook.
#[must_use]
pub fn notifier(enabled: bool) -> Option<crate::analytics::Notifier> {
    if !enabled {
        return None;
    }
    Some(Box::new(|alert: &Alert| {
        let urgency = match alert.severity {
            Severity::Warning => notify_rust::Urgency::Normal,
            Severity::Critical => notify_rust::Urgency::Critical,
        };
        let result = notify_rust::Notification::new()
            .summary(&format!("aiwatch: {}", alert.rule_name))
            .body(&alert.message)
            .urgency(urgency)
            .show();
        if let Err(err) = result {
            warn!(%err, "failed to show desktop notification");
        }
    }))
}
