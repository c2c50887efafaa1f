//! Approval gate for proposed actions.
//!
//! Every proposal goes through one state machine:
//!
//! ```text
//! Pending ──approve──▶ Approved
//!    │
//!    ├────deny────────▶ Denied
//!    │
//!    └──deadline/abandon──▶ TimedOut
//! ```
//!
//! All three outcomes are terminal. The gate owns the only copy of this state;
//! approvers ([`ConsoleApprover`], [`QueuedApprover`]) and the HTTP API move
//! records through it but never hold their own.

mod console;
mod queued;

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rebal_fleet::{ActionKind, BusId, FleetSnapshot, ProposedAction};
use rebal_id::{ActionId, PassId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

pub use console::ConsoleApprover;
pub use queued::QueuedApprover;

/// Result type for gate operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;

/// Which side of a decision a bus id was given for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRole {
    Current,
    Nearby,
}

impl fmt::Display for BusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Current => "Current",
            Self::Nearby => "Nearby",
        })
    }
}

/// Errors raised by the gate. None of them change gate state.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("{role} bus with ID {id} not found.")]
    BusNotFound { role: BusRole, id: BusId },

    #[error("action {0} not found")]
    ActionNotFound(ActionId),

    #[error("no pending {kind} action for Bus {current} and Bus {nearby}")]
    NoPendingAction {
        current: BusId,
        nearby: BusId,
        kind: ActionKind,
    },

    #[error("action {id} is already {status}")]
    AlreadyResolved { id: ActionId, status: ActionStatus },

    #[error("no fleet snapshot has been loaded yet")]
    NoSnapshot,

    #[error("approval prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Lifecycle state of a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Denied,
    /// Denied because no decision arrived before the deadline or the admin
    /// session ended.
    TimedOut,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::TimedOut => "timed out",
        })
    }
}

/// An admin's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Deny,
}

impl Verdict {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Self::Approve
        } else {
            Self::Deny
        }
    }

    fn status(self) -> ActionStatus {
        match self {
            Self::Approve => ActionStatus::Approved,
            Self::Deny => ActionStatus::Denied,
        }
    }
}

/// A proposal as tracked by the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub action_id: ActionId,
    pub pass_id: PassId,
    #[serde(flatten)]
    pub proposal: ProposedAction,
    pub status: ActionStatus,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.expires_at
    }
}

/// Outcome of [`ApprovalGate::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub record: ActionRecord,
    /// False when an identical proposal was already pending and was reused.
    pub created: bool,
}

/// Resolves a pending action to a terminal state.
///
/// Implementations differ in where the decision comes from, not in what they
/// do with it: every path ends in [`ApprovalGate::resolve`] or
/// [`ApprovalGate::time_out`], and the terminal record is returned.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn decide(&self, gate: &ApprovalGate, record: &ActionRecord)
        -> ApprovalResult<ActionRecord>;
}

/// Treat losing a resolution race as success: whoever got there first decided,
/// and the caller gets that record.
fn settled(
    gate: &ApprovalGate,
    result: ApprovalResult<ActionRecord>,
) -> ApprovalResult<ActionRecord> {
    match result {
        Err(ApprovalError::AlreadyResolved { id, .. }) => {
            gate.get(id).ok_or(ApprovalError::ActionNotFound(id))
        }
        other => other,
    }
}

#[derive(Default)]
struct GateState {
    records: HashMap<ActionId, ActionRecord>,
    /// Submission order.
    order: Vec<ActionId>,
}

/// Store and state machine for proposed actions.
pub struct ApprovalGate {
    state: Mutex<GateState>,
    timeout: TimeDelta,
    changes: watch::Sender<u64>,
}

impl ApprovalGate {
    /// Create a gate whose pending actions expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(GateState::default()),
            timeout: TimeDelta::from_std(timeout).unwrap_or(TimeDelta::days(365)),
            changes,
        }
    }

    /// Receiver that ticks whenever any record changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // Every update is a single insert or field write, so a poisoned map is
        // still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Record a proposal as pending.
    ///
    /// If the same (current, nearby, kind) triple is already pending, the
    /// existing record is returned instead of opening a second one.
    pub fn submit(&self, pass_id: PassId, proposal: ProposedAction) -> Submission {
        let mut state = self.lock();

        if let Some(existing) = state.order.iter().rev().find_map(|id| {
            state.records.get(id).filter(|r| {
                r.is_pending()
                    && r.proposal.concerns(
                        &proposal.current_bus_id,
                        &proposal.nearby_bus_id,
                        proposal.kind,
                    )
            })
        }) {
            debug!(action_id = %existing.action_id, "Proposal already pending");
            return Submission {
                record: existing.clone(),
                created: false,
            };
        }

        let now = Utc::now();
        let record = ActionRecord {
            action_id: ActionId::new(),
            pass_id,
            proposal,
            status: ActionStatus::Pending,
            submitted_at: now,
            expires_at: now + self.timeout,
            resolved_at: None,
        };
        state.order.push(record.action_id);
        state.records.insert(record.action_id, record.clone());
        drop(state);

        info!(
            action_id = %record.action_id,
            action = %record.proposal.kind,
            current_bus_id = %record.proposal.current_bus_id,
            nearby_bus_id = %record.proposal.nearby_bus_id,
            "Action awaiting approval"
        );
        self.bump();

        Submission {
            record,
            created: true,
        }
    }

    pub fn get(&self, id: ActionId) -> Option<ActionRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Records in submission order, optionally filtered by status.
    pub fn list(&self, status: Option<ActionStatus>) -> Vec<ActionRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect()
    }

    pub fn pending(&self) -> Vec<ActionRecord> {
        self.list(Some(ActionStatus::Pending))
    }

    /// The pending record for a bus pair, if any.
    pub fn find_pending(
        &self,
        current: &BusId,
        nearby: &BusId,
        kind: ActionKind,
    ) -> Option<ActionRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .find(|r| r.is_pending() && r.proposal.concerns(current, nearby, kind))
            .cloned()
    }

    /// The most recent record for a bus pair in any state.
    fn find_latest(&self, current: &BusId, nearby: &BusId, kind: ActionKind) -> Option<ActionRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .find(|r| r.proposal.concerns(current, nearby, kind))
            .cloned()
    }

    fn transition(&self, id: ActionId, to: ActionStatus) -> ApprovalResult<ActionRecord> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&id)
            .ok_or(ApprovalError::ActionNotFound(id))?;

        if record.status.is_terminal() {
            return Err(ApprovalError::AlreadyResolved {
                id,
                status: record.status,
            });
        }

        record.status = to;
        record.resolved_at = Some(Utc::now());
        let resolved = record.clone();
        drop(state);

        info!(action_id = %id, status = %to, "Action resolved");
        self.bump();
        Ok(resolved)
    }

    /// Apply an admin verdict to a pending action.
    pub fn resolve(&self, id: ActionId, verdict: Verdict) -> ApprovalResult<ActionRecord> {
        self.transition(id, verdict.status())
    }

    /// Mark a pending action as denied by timeout.
    pub fn time_out(&self, id: ActionId) -> ApprovalResult<ActionRecord> {
        self.transition(id, ActionStatus::TimedOut)
    }

    /// Find the pending action a pair-addressed decision refers to.
    ///
    /// Both ids must exist in `fleet`; the current bus is checked first. A
    /// pair whose latest action is already terminal yields `AlreadyResolved`.
    pub fn locate_pending(
        &self,
        fleet: &FleetSnapshot,
        current: &BusId,
        nearby: &BusId,
        kind: ActionKind,
    ) -> ApprovalResult<ActionRecord> {
        if fleet.get(current).is_none() {
            return Err(ApprovalError::BusNotFound {
                role: BusRole::Current,
                id: current.clone(),
            });
        }
        if fleet.get(nearby).is_none() {
            return Err(ApprovalError::BusNotFound {
                role: BusRole::Nearby,
                id: nearby.clone(),
            });
        }

        if let Some(record) = self.find_pending(current, nearby, kind) {
            return Ok(record);
        }
        match self.find_latest(current, nearby, kind) {
            Some(record) => Err(ApprovalError::AlreadyResolved {
                id: record.action_id,
                status: record.status,
            }),
            None => Err(ApprovalError::NoPendingAction {
                current: current.clone(),
                nearby: nearby.clone(),
                kind,
            }),
        }
    }

    /// Apply a verdict addressed by bus pair rather than action id.
    pub fn resolve_pair(
        &self,
        fleet: &FleetSnapshot,
        current: &BusId,
        nearby: &BusId,
        kind: ActionKind,
        verdict: Verdict,
    ) -> ApprovalResult<ActionRecord> {
        let record = self.locate_pending(fleet, current, nearby, kind)?;
        self.resolve(record.action_id, verdict)
    }

    /// Time out every pending action whose deadline has passed.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<ActionRecord> {
        let overdue: Vec<ActionId> = self
            .pending()
            .into_iter()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.action_id)
            .collect();
        overdue
            .into_iter()
            .filter_map(|id| self.time_out(id).ok())
            .collect()
    }

    /// Time out everything still pending, e.g. when the admin session ends.
    pub fn abandon_pending(&self) -> Vec<ActionRecord> {
        let pending: Vec<ActionId> = self.pending().into_iter().map(|r| r.action_id).collect();
        pending
            .into_iter()
            .filter_map(|id| self.time_out(id).ok())
            .collect()
    }
}

impl fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ApprovalGate")
            .field("records", &state.order.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rebal_fleet::{Bus, Candidate, DistanceBasis, GeoPoint, SeekMode};

    pub(crate) fn bus(id: u32, capacity: u32, attendance: u32) -> Bus {
        Bus {
            id: BusId::from(id),
            driver: format!("Driver {id}"),
            phone: None,
            seating_capacity: capacity,
            current_attendance: attendance,
            position: GeoPoint::new(13.0, 80.0),
        }
    }

    pub(crate) fn proposal(current: u32, nearby: u32) -> ProposedAction {
        let origin = bus(current, 50, 50);
        let other = bus(nearby, 40, 10);
        ProposedAction::new(
            &origin,
            Candidate {
                bus: &other,
                distance_km: 1.0,
            },
            SeekMode::EmptySeats,
            DistanceBasis::Estimated,
        )
    }

    fn fleet() -> FleetSnapshot {
        FleetSnapshot::new(vec![bus(1, 50, 50), bus(2, 40, 10), bus(3, 30, 5)]).unwrap()
    }

    #[test]
    fn test_submit_then_approve() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let submitted = gate.submit(PassId::new(), proposal(1, 2));
        assert!(submitted.created);
        assert_eq!(gate.pending().len(), 1);

        let approved = gate
            .resolve(submitted.record.action_id, Verdict::Approve)
            .unwrap();
        assert_eq!(approved.status, ActionStatus::Approved);
        assert!(approved.resolved_at.is_some());
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn test_terminal_records_never_change() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let id = gate.submit(PassId::new(), proposal(1, 2)).record.action_id;
        gate.resolve(id, Verdict::Deny).unwrap();

        let err = gate.resolve(id, Verdict::Approve).unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::AlreadyResolved {
                status: ActionStatus::Denied,
                ..
            }
        ));
        assert!(gate.time_out(id).is_err());
        assert_eq!(gate.get(id).unwrap().status, ActionStatus::Denied);
    }

    #[test]
    fn test_duplicate_pending_proposal_reused() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let first = gate.submit(PassId::new(), proposal(1, 2));
        let second = gate.submit(PassId::new(), proposal(1, 2));
        assert!(!second.created);
        assert_eq!(first.record.action_id, second.record.action_id);

        gate.resolve(first.record.action_id, Verdict::Deny).unwrap();
        let third = gate.submit(PassId::new(), proposal(1, 2));
        assert!(third.created);
        assert_eq!(gate.list(None).len(), 2);
    }

    #[test]
    fn test_resolve_pair_unknown_bus_mutates_nothing() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        gate.submit(PassId::new(), proposal(1, 2));
        let fleet = fleet();

        let err = gate
            .resolve_pair(&fleet, &BusId::from(99), &BusId::from(2), ActionKind::Reallocate, Verdict::Approve)
            .unwrap_err();
        assert_eq!(err.to_string(), "Current bus with ID 99 not found.");

        let err = gate
            .resolve_pair(&fleet, &BusId::from(1), &BusId::from(42), ActionKind::Reallocate, Verdict::Approve)
            .unwrap_err();
        assert_eq!(err.to_string(), "Nearby bus with ID 42 not found.");

        assert_eq!(gate.pending().len(), 1);
    }

    #[test]
    fn test_resolve_pair() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        gate.submit(PassId::new(), proposal(1, 2));
        let fleet = fleet();

        let err = gate
            .resolve_pair(&fleet, &BusId::from(1), &BusId::from(3), ActionKind::Reallocate, Verdict::Approve)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::NoPendingAction { .. }));

        let record = gate
            .resolve_pair(&fleet, &BusId::from(1), &BusId::from(2), ActionKind::Reallocate, Verdict::Approve)
            .unwrap();
        assert_eq!(record.status, ActionStatus::Approved);

        let err = gate
            .resolve_pair(&fleet, &BusId::from(1), &BusId::from(2), ActionKind::Reallocate, Verdict::Deny)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved { .. }));
    }

    #[test]
    fn test_expire_overdue_only_touches_late_actions() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let a = gate.submit(PassId::new(), proposal(1, 2)).record;
        let b = gate.submit(PassId::new(), proposal(3, 2)).record;
        gate.resolve(b.action_id, Verdict::Approve).unwrap();

        assert!(gate.expire_overdue(Utc::now()).is_empty());

        let expired = gate.expire_overdue(a.expires_at + TimeDelta::seconds(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, ActionStatus::TimedOut);
        assert_eq!(gate.get(b.action_id).unwrap().status, ActionStatus::Approved);
    }

    #[test]
    fn test_abandon_pending() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        gate.submit(PassId::new(), proposal(1, 2));
        gate.submit(PassId::new(), proposal(3, 2));
        assert_eq!(gate.abandon_pending().len(), 2);
        assert!(gate.pending().is_empty());
        assert!(gate
            .list(Some(ActionStatus::TimedOut))
            .iter()
            .all(|r| r.resolved_at.is_some()));
    }

    #[test]
    fn test_list_keeps_submission_order() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let ids: Vec<_> = (1..=5)
            .map(|i| gate.submit(PassId::new(), proposal(i, 10 + i)).record.action_id)
            .collect();
        let listed: Vec<_> = gate.pending().into_iter().map(|r| r.action_id).collect();
        assert_eq!(ids, listed);
    }

    #[test]
    fn test_record_serializes_flat() {
        let gate = ApprovalGate::new(Duration::from_secs(60));
        let record = gate.submit(PassId::new(), proposal(1, 2)).record;
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["current_bus_id"], 1);
        assert_eq!(value["action"], "Reallocation");
        assert_eq!(value["status"], "pending");
        assert!(value["action_id"].as_str().unwrap().starts_with("act_"));
        assert!(value.get("resolved_at").is_none());
    }
}
