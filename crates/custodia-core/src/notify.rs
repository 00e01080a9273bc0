//! The observability sink contract.
//!
//! Notifications are fire-and-forget signals for external SIEM or
//! monitoring subscribers. The `publish` signature is infallible on
//! purpose: a failing subscriber must never fail the calling operation, so
//! implementations log and swallow their own errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Named event kinds emitted by the assurance core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
  AuditLogCreated,
  AuditIntegrityViolation,
  RetentionJobStarted,
  RetentionJobCompleted,
  RetentionJobFailed,
  DeletionEventCreated,
  DeletionBlockedLegalHold,
  SodViolationBlocked,
  SodApprovalDecided,
}

impl NotificationKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::AuditLogCreated => "AUDIT_LOG_CREATED",
      Self::AuditIntegrityViolation => "AUDIT_INTEGRITY_VIOLATION",
      Self::RetentionJobStarted => "RETENTION_JOB_STARTED",
      Self::RetentionJobCompleted => "RETENTION_JOB_COMPLETED",
      Self::RetentionJobFailed => "RETENTION_JOB_FAILED",
      Self::DeletionEventCreated => "DELETION_EVENT_CREATED",
      Self::DeletionBlockedLegalHold => "DELETION_BLOCKED_LEGAL_HOLD",
      Self::SodViolationBlocked => "SOD_VIOLATION_BLOCKED",
      Self::SodApprovalDecided => "SOD_APPROVAL_DECIDED",
    }
  }
}

/// One emitted event with a small structured payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub kind:      NotificationKind,
  pub tenant_id: Uuid,
  pub payload:   Value,
}

impl Notification {
  pub fn new(kind: NotificationKind, tenant_id: Uuid, payload: Value) -> Self {
    Self { kind, tenant_id, payload }
  }
}

/// Abstraction over the observability sink. Must not block and must not
/// fail the caller.
pub trait Notifier: Send + Sync {
  fn publish(&self, notification: Notification);
}
