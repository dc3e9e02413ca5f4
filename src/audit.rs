//! Security/admin audit events.
//!
//! Fire-and-forget structured tracing events with fixed targets so the
//! external log pipeline can route them. Failure to deliver a log line
//! never blocks the money path.

use tracing::{info, warn};

/// Record a security-relevant rejection (signature failures and the like).
/// Emitted before the error is returned to the webhook caller.
pub fn log_security_event(kind: &str, provider: &str, client_ip: &str, detail: &str) {
    warn!(
        target: "kamipay::security",
        kind,
        provider,
        client_ip,
        detail,
        "Security event"
    );
}

/// Record an administrator action against money or alerts.
pub fn log_admin_action(admin_id: i64, action: &str, detail: &str) {
    info!(
        target: "kamipay::admin",
        admin_id,
        action,
        detail,
        "Admin action"
    );
}
