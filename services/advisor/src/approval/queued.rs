//! Submit-and-poll approval for decisions that arrive out of band.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::{settled, ActionRecord, ApprovalError, ApprovalGate, ApprovalResult, Approver};

/// Waits for someone else (the HTTP API, `rebalctl`) to resolve an action.
///
/// Wakes on every gate change and at least once per `poll_interval`. Once the
/// record's deadline passes it is timed out.
#[derive(Debug, Clone)]
pub struct QueuedApprover {
    poll_interval: Duration,
}

impl QueuedApprover {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl Approver for QueuedApprover {
    async fn decide(
        &self,
        gate: &ApprovalGate,
        record: &ActionRecord,
    ) -> ApprovalResult<ActionRecord> {
        let id = record.action_id;
        let mut changes = gate.subscribe();

        loop {
            let current = gate.get(id).ok_or(ApprovalError::ActionNotFound(id))?;
            if current.status.is_terminal() {
                debug!(action_id = %id, status = %current.status, "Action settled");
                return Ok(current);
            }

            let now = Utc::now();
            if current.is_overdue(now) {
                warn!(action_id = %id, "Approval deadline passed, timing out");
                return settled(gate, gate.time_out(id));
            }

            let until_deadline = (current.expires_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let wait = until_deadline.min(self.poll_interval);

            tokio::select! {
                _ = changes.changed() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
