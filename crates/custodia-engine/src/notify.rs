//! Notifier implementations: a tracing-backed sink and a no-op.

use custodia_core::notify::{Notification, Notifier};
use tracing::info;

/// Emits every notification as a structured tracing event. The default
/// sink when no external subscriber is wired up.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn publish(&self, notification: Notification) {
    info!(
      kind = notification.kind.as_str(),
      tenant_id = %notification.tenant_id,
      payload = %notification.payload,
      "notification"
    );
  }
}

/// Discards everything.
#[derive(Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
  fn publish(&self, _notification: Notification) {}
}
