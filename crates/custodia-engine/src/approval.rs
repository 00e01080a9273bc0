//! [`ApprovalGate`] — separation-of-duties checks and four-eyes approval
//! decisions.

use std::sync::Arc;

use chrono::Utc;
use custodia_core::{
  approval::{ApprovalDecision, ApprovalRequest, ApprovalStatus},
  job::ActorType,
  ledger::NewLedgerEvent,
  notify::{Notification, NotificationKind, Notifier},
  store::AssuranceStore,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{Error, Result, ledger::HashChainLedger};

/// A sensitive action about to happen: `actor_id` wants to perform the
/// action governed by `rule_id` on a resource created by `creator_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SodCheckRequest {
  pub tenant_id:  Uuid,
  /// Catalog slug of the governing rule, e.g. `"response_publish"`.
  pub rule_id:    String,
  pub scope_type: String,
  pub scope_id:   Uuid,
  pub actor_id:   Uuid,
  pub creator_id: Uuid,
  /// Optional context recorded on the approval request when one is created.
  pub reason:     Option<String>,
}

/// Verdict of a SoD check. When `allowed` is false a pending approval
/// request exists and the action must wait for another user's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SodCheck {
  pub allowed:       bool,
  pub violated_rule: Option<String>,
  pub approval_id:   Option<Uuid>,
}

impl SodCheck {
  fn allowed() -> Self {
    Self { allowed: true, violated_rule: None, approval_id: None }
  }
}

pub struct ApprovalGate<S> {
  store:    S,
  ledger:   HashChainLedger<S>,
  notifier: Arc<dyn Notifier>,
}

impl<S: AssuranceStore + Clone> ApprovalGate<S> {
  pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
    Self {
      ledger: HashChainLedger::new(store.clone(), Arc::clone(&notifier)),
      store,
      notifier,
    }
  }

  /// Evaluate a SoD rule for an imminent action.
  ///
  /// Fails open on configuration: a disabled tenant policy, a disabled
  /// rule, or a rule id not in the catalog all allow the action. A missing
  /// tenant policy row counts as enabled. The only blocking condition is
  /// the four-eyes violation itself — the actor is the creator.
  pub async fn check(&self, request: SodCheckRequest) -> Result<SodCheck> {
    let policy_enabled = self
      .store
      .sod_policy(request.tenant_id)
      .await
      .map_err(Error::store)?
      .map_or(true, |policy| policy.enabled);
    if !policy_enabled {
      return Ok(SodCheck::allowed());
    }

    let Some(rule) = self
      .store
      .sod_rule(request.tenant_id, &request.rule_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(SodCheck::allowed());
    };
    if !rule.enabled {
      return Ok(SodCheck::allowed());
    }

    if request.actor_id != request.creator_id {
      return Ok(SodCheck::allowed());
    }

    let reason = request.reason.clone().unwrap_or_else(|| {
      format!(
        "{}: actor {} is the creator of {} {}",
        rule.name, request.actor_id, request.scope_type, request.scope_id
      )
    });
    let approval = ApprovalRequest::pending(
      request.tenant_id,
      &request.scope_type,
      request.scope_id,
      request.actor_id,
      reason,
    );
    self
      .store
      .insert_approval(approval.clone())
      .await
      .map_err(Error::store)?;

    let mut event = NewLedgerEvent::system(
      request.tenant_id,
      &request.scope_type,
      "SOD_VIOLATION",
    );
    event.entity_id = Some(request.scope_id.to_string());
    event.actor_id = Some(request.actor_id);
    event.actor_type = ActorType::User;
    event.diff = serde_json::json!({
      "rule_id":     rule.id,
      "approval_id": approval.id,
    });
    self.ledger.append(event).await?;

    self.notifier.publish(Notification::new(
      NotificationKind::SodViolationBlocked,
      request.tenant_id,
      serde_json::json!({
        "rule_id":     rule.id,
        "approval_id": approval.id,
        "actor_id":    request.actor_id,
      }),
    ));

    info!(
      tenant_id = %request.tenant_id,
      rule_id = %rule.id,
      approval_id = %approval.id,
      "sod violation blocked, approval request created"
    );

    Ok(SodCheck {
      allowed:       false,
      violated_rule: Some(rule.id),
      approval_id:   Some(approval.id),
    })
  }

  /// Decide a pending approval request.
  ///
  /// The requester can never decide their own request — that holds even
  /// when the tenant's SoD policy is disabled, because it is the gate's
  /// own invariant rather than a configurable rule.
  pub async fn decide(
    &self,
    tenant_id: Uuid,
    approval_id: Uuid,
    deciding_user: Uuid,
    decision: ApprovalDecision,
    reason: Option<String>,
  ) -> Result<ApprovalRequest> {
    let Some(mut request) = self
      .store
      .get_approval(approval_id)
      .await
      .map_err(Error::store)?
    else {
      return Err(Error::ApprovalNotFound(approval_id));
    };
    // Tenant isolation: a foreign approval id is indistinguishable from a
    // missing one.
    if request.tenant_id != tenant_id {
      return Err(Error::ApprovalNotFound(approval_id));
    }
    if request.status != ApprovalStatus::Pending {
      return Err(Error::ApprovalNotPending(approval_id));
    }
    if deciding_user == request.requested_by {
      return Err(Error::SelfApproval(deciding_user));
    }

    let status = decision.terminal_status();
    let decided_at = Utc::now();
    self
      .store
      .record_decision(approval_id, status, deciding_user, decided_at, reason.clone())
      .await
      .map_err(Error::store)?;

    let mut event = NewLedgerEvent::system(
      tenant_id,
      &request.scope_type,
      "SOD_APPROVAL_DECIDED",
    );
    event.entity_id = Some(request.scope_id.to_string());
    event.actor_id = Some(deciding_user);
    event.actor_type = ActorType::User;
    event.diff = serde_json::json!({
      "approval_id": approval_id,
      "status":      status.as_str(),
    });
    self.ledger.append(event).await?;

    self.notifier.publish(Notification::new(
      NotificationKind::SodApprovalDecided,
      tenant_id,
      serde_json::json!({
        "approval_id": approval_id,
        "status":      status.as_str(),
        "decided_by":  deciding_user,
      }),
    ));

    request.status = status;
    request.approved_by = Some(deciding_user);
    request.approved_at = Some(decided_at);
    if let Some(reason) = reason {
      request.reason = reason;
    }
    Ok(request)
  }

  /// Pending requests for a tenant.
  pub async fn pending(&self, tenant_id: Uuid) -> Result<Vec<ApprovalRequest>> {
    self
      .store
      .pending_approvals(tenant_id)
      .await
      .map_err(Error::store)
  }
}
