use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::approval::ApprovalGate;

/// Periodically times out pending actions whose deadline has passed.
///
/// Follow-up tasks already time out their own action at the deadline; the
/// sweep covers actions nobody is waiting on, such as those left behind by a
/// console session.
pub struct ExpiryWorker {
    gate: Arc<ApprovalGate>,
    interval: Duration,
}

impl ExpiryWorker {
    pub fn new(gate: Arc<ApprovalGate>, interval: Duration) -> Self {
        Self { gate, interval }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting expiry worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Expiry worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn sweep(&self) -> usize {
        let expired = self.gate.expire_overdue(Utc::now());
        if !expired.is_empty() {
            info!(expired = expired.len(), "Timed out overdue actions");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ActionStatus;
    use crate::approval::tests::proposal;
    use rebal_id::PassId;

    #[tokio::test]
    async fn test_sweep_times_out_overdue() {
        let gate = Arc::new(ApprovalGate::new(Duration::ZERO));
        let id = gate.submit(PassId::new(), proposal(1, 2)).record.action_id;

        let worker = ExpiryWorker::new(gate.clone(), Duration::from_secs(1));
        assert_eq!(worker.sweep(), 1);
        assert_eq!(gate.get(id).unwrap().status, ActionStatus::TimedOut);
        assert_eq!(worker.sweep(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));
        let worker = ExpiryWorker::new(gate, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
