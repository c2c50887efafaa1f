//! The rebalancing pipeline.
//!
//! A pass loads a fresh snapshot, walks it in order, and for every bus that is
//! full or underfilled looks for the nearest compatible partner. Each match
//! becomes a pending action in the [`ApprovalGate`]. What happens next depends
//! on how the advisor runs:
//!
//! - console mode settles each proposal inline through a [`ConsoleApprover`]
//! - server mode spawns one follow-up task per proposal that waits on a
//!   [`QueuedApprover`] while decisions arrive over HTTP
//!
//! Drivers are notified exactly once per approved action, by whichever path
//! performs or first observes the approval.
//!
//! [`ConsoleApprover`]: crate::approval::ConsoleApprover
//! [`QueuedApprover`]: crate::approval::QueuedApprover

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rebal_fleet::{
    classify, select_candidate, ActionKind, Bus, BusId, DistanceBasis, FleetSnapshot, Occupancy,
    ProposedAction,
};
use rebal_id::{ActionId, PassId};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::approval::{
    ActionRecord, ActionStatus, ApprovalError, ApprovalGate, ApprovalResult, Approver, Verdict,
};
use crate::distance::{lookup_with_fallback, DistanceSource};
use crate::loader::{FleetLoader, LoadError};
use crate::notify::{deliver, DeliveryReport, Notifier};

/// Terminal outcome tallies for proposals settled during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcomes {
    pub approved: usize,
    pub denied: usize,
    pub timed_out: usize,
}

impl Outcomes {
    pub fn record(&mut self, status: ActionStatus) {
        match status {
            ActionStatus::Approved => self.approved += 1,
            ActionStatus::Denied => self.denied += 1,
            ActionStatus::TimedOut => self.timed_out += 1,
            ActionStatus::Pending => {}
        }
    }
}

/// Summary of one pass over the fleet.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: PassId,
    pub fleet_size: usize,
    pub full: usize,
    pub underfilled: usize,
    pub normal: usize,
    /// Newly opened actions, in snapshot order.
    pub proposals: Vec<ActionRecord>,
    /// Matches that reused an action still pending from an earlier pass.
    pub already_pending: Vec<ActionId>,
    /// Buses that needed a partner but had no eligible one.
    pub no_candidate: Vec<BusId>,
    /// Lookups answered by the estimator instead of the distance service.
    pub estimated_lookups: usize,
    /// Only filled in when proposals are settled inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Outcomes>,
}

impl PassReport {
    fn new(pass_id: PassId, fleet_size: usize) -> Self {
        Self {
            pass_id,
            fleet_size,
            full: 0,
            underfilled: 0,
            normal: 0,
            proposals: Vec::new(),
            already_pending: Vec::new(),
            no_candidate: Vec::new(),
            estimated_lookups: 0,
            outcomes: None,
        }
    }
}

/// A terminal record together with the notifications it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub record: ActionRecord,
    /// Present only when this call delivered the notifications.
    pub delivery: Option<DeliveryReport>,
}

pub struct Advisor {
    loader: Arc<dyn FleetLoader>,
    distances: Arc<dyn DistanceSource>,
    gate: Arc<ApprovalGate>,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
    snapshot: RwLock<Option<Arc<FleetSnapshot>>>,
    /// Approved actions whose drivers have been (or are being) notified.
    notified: Mutex<HashSet<ActionId>>,
}

impl Advisor {
    pub fn new(
        loader: Arc<dyn FleetLoader>,
        distances: Arc<dyn DistanceSource>,
        gate: Arc<ApprovalGate>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            loader,
            distances,
            gate,
            notifier,
            notify_timeout,
            snapshot: RwLock::new(None),
            notified: Mutex::new(HashSet::new()),
        }
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// The most recently loaded snapshot.
    pub fn snapshot(&self) -> Option<Arc<FleetSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Load a new snapshot. On failure the previous one stays in place.
    pub async fn refresh(&self) -> Result<Arc<FleetSnapshot>, LoadError> {
        let snapshot = Arc::new(self.loader.load().await?);
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Reload the fleet and propose actions for it.
    pub async fn run_pass(&self) -> Result<PassReport, LoadError> {
        let snapshot = self.refresh().await?;
        Ok(self.propose(&snapshot).await)
    }

    /// Walk `snapshot` in order and submit a proposal for every bus that needs
    /// a partner and has one.
    #[instrument(skip_all, fields(pass_id = tracing::field::Empty, buses = snapshot.len()))]
    pub async fn propose(&self, snapshot: &FleetSnapshot) -> PassReport {
        let pass_id = PassId::new();
        tracing::Span::current().record("pass_id", tracing::field::display(pass_id));
        let mut report = PassReport::new(pass_id, snapshot.len());

        for bus in snapshot.buses() {
            let occupancy = classify(bus);
            match occupancy {
                Occupancy::Full => {
                    report.full += 1;
                    info!(bus_id = %bus.id, "Bus is full, looking for a nearby bus with free seats");
                }
                Occupancy::Underfilled => {
                    report.underfilled += 1;
                    info!(bus_id = %bus.id, "Bus has low attendance, looking for a nearby bus to combine with");
                }
                Occupancy::Normal => {
                    report.normal += 1;
                    continue;
                }
            }
            let Some(mode) = occupancy.seek_mode() else {
                continue;
            };

            let candidates: Vec<&Bus> = snapshot.others(&bus.id).collect();
            let distances = lookup_with_fallback(self.distances.as_ref(), bus, &candidates).await;
            if distances.basis == DistanceBasis::Estimated {
                report.estimated_lookups += 1;
            }

            let Some(candidate) =
                select_candidate(bus, candidates.iter().copied(), &distances.km, mode)
            else {
                info!(bus_id = %bus.id, ?mode, "No suitable nearby bus found");
                report.no_candidate.push(bus.id.clone());
                continue;
            };

            debug!(
                bus_id = %bus.id,
                nearby_bus_id = %candidate.bus.id,
                distance_km = candidate.distance_km,
                "Selected nearby bus"
            );
            let proposal = ProposedAction::new(bus, candidate, mode, distances.basis);
            let submission = self.gate.submit(pass_id, proposal);
            if submission.created {
                report.proposals.push(submission.record);
            } else {
                report.already_pending.push(submission.record.action_id);
            }
        }

        info!(
            full = report.full,
            underfilled = report.underfilled,
            proposals = report.proposals.len(),
            no_candidate = report.no_candidate.len(),
            estimated_lookups = report.estimated_lookups,
            "Pass complete"
        );
        report
    }

    fn claim_notification(&self, id: ActionId) -> bool {
        self.notified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id)
    }

    fn release_notification(&self, id: ActionId) {
        self.notified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    async fn notify_drivers(&self, record: &ActionRecord) -> DeliveryReport {
        let proposal = &record.proposal;
        info!(
            action_id = %record.action_id,
            current_driver = %proposal.current_bus_details.driver,
            nearby_driver = %proposal.nearby_bus_details.driver,
            "Request approved, notifying drivers"
        );
        let report = deliver(
            self.notifier.as_ref(),
            &proposal.notices(),
            self.notify_timeout,
        )
        .await;
        if report.failed > 0 {
            error!(
                action_id = %record.action_id,
                failed = report.failed,
                "Some drivers could not be notified"
            );
        }
        report
    }

    /// Act on a terminal record. Approved actions notify their drivers unless
    /// that already happened.
    pub async fn conclude(&self, record: &ActionRecord) -> Option<DeliveryReport> {
        match record.status {
            ActionStatus::Approved if self.claim_notification(record.action_id) => {
                Some(self.notify_drivers(record).await)
            }
            ActionStatus::Approved => None,
            ActionStatus::Denied => {
                info!(action_id = %record.action_id, "Request denied by admin");
                None
            }
            ActionStatus::TimedOut => {
                warn!(action_id = %record.action_id, "Request timed out without a decision");
                None
            }
            ActionStatus::Pending => None,
        }
    }

    /// Wait for `approver` to settle `record`, then act on the outcome.
    #[instrument(skip_all, fields(action_id = %record.action_id))]
    pub async fn settle(
        &self,
        approver: &dyn Approver,
        record: &ActionRecord,
    ) -> ApprovalResult<Decision> {
        let record = approver.decide(&self.gate, record).await?;
        let delivery = self.conclude(&record).await;
        Ok(Decision { record, delivery })
    }

    /// Apply an admin verdict by action id.
    #[instrument(skip(self))]
    pub async fn decide(&self, id: ActionId, verdict: Verdict) -> ApprovalResult<Decision> {
        // Claim before resolving so a waiting follow-up cannot notify first.
        let claimed = verdict == Verdict::Approve && self.claim_notification(id);
        let record = match self.gate.resolve(id, verdict) {
            Ok(record) => record,
            Err(e) => {
                if claimed {
                    self.release_notification(id);
                }
                return Err(e);
            }
        };

        let delivery = if claimed {
            Some(self.notify_drivers(&record).await)
        } else {
            self.conclude(&record).await
        };
        Ok(Decision { record, delivery })
    }

    /// Apply an admin verdict addressed by bus pair.
    #[instrument(skip(self))]
    pub async fn decide_pair(
        &self,
        current: &BusId,
        nearby: &BusId,
        kind: ActionKind,
        verdict: Verdict,
    ) -> ApprovalResult<Decision> {
        let snapshot = self.snapshot().ok_or(ApprovalError::NoSnapshot)?;
        let record = self
            .gate
            .locate_pending(&snapshot, current, nearby, kind)?;
        self.decide(record.action_id, verdict).await
    }

    /// Spawn one task per record that waits for its decision and concludes it.
    pub fn spawn_follow_ups(
        self: &Arc<Self>,
        approver: Arc<dyn Approver>,
        records: &[ActionRecord],
    ) -> Vec<JoinHandle<()>> {
        records
            .iter()
            .cloned()
            .map(|record| {
                let advisor = Arc::clone(self);
                let approver = Arc::clone(&approver);
                tokio::spawn(async move {
                    match advisor.settle(approver.as_ref(), &record).await {
                        Ok(decision) => debug!(
                            action_id = %record.action_id,
                            status = %decision.record.status,
                            "Follow-up finished"
                        ),
                        Err(e) => error!(
                            action_id = %record.action_id,
                            error = %e,
                            "Follow-up failed"
                        ),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rebal_fleet::GeoPoint;

    use super::*;
    use crate::approval::QueuedApprover;
    use crate::distance::DistanceError;
    use crate::notify::tests::RecordingNotifier;

    struct StaticLoader(Vec<Bus>);

    #[async_trait]
    impl FleetLoader for StaticLoader {
        async fn load(&self) -> Result<FleetSnapshot, LoadError> {
            Ok(FleetSnapshot::new(self.0.clone())?)
        }

        fn describe(&self) -> String {
            "static".into()
        }
    }

    struct Unavailable;

    #[async_trait]
    impl DistanceSource for Unavailable {
        async fn distances_km(
            &self,
            _origin: GeoPoint,
            _destinations: &[GeoPoint],
        ) -> Result<Vec<f64>, DistanceError> {
            Err(DistanceError::MissingCredential)
        }
    }

    /// Distances taken from a fixed list per call, in candidate order.
    struct Fixed(Vec<f64>);

    #[async_trait]
    impl DistanceSource for Fixed {
        async fn distances_km(
            &self,
            _origin: GeoPoint,
            destinations: &[GeoPoint],
        ) -> Result<Vec<f64>, DistanceError> {
            Ok(self.0.iter().copied().take(destinations.len()).collect())
        }
    }

    fn bus(id: u32, capacity: u32, attendance: u32, lat: f64, lng: f64) -> Bus {
        Bus {
            id: BusId::from(id),
            driver: format!("Driver {id}"),
            phone: None,
            seating_capacity: capacity,
            current_attendance: attendance,
            position: GeoPoint::new(lat, lng),
        }
    }

    fn advisor(
        buses: Vec<Bus>,
        distances: Arc<dyn DistanceSource>,
    ) -> (Arc<Advisor>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let advisor = Advisor::new(
            Arc::new(StaticLoader(buses)),
            distances,
            Arc::new(ApprovalGate::new(Duration::from_secs(60))),
            notifier.clone(),
            Duration::from_secs(1),
        );
        (Arc::new(advisor), notifier)
    }

    #[tokio::test]
    async fn test_full_bus_goes_to_nearest_with_free_seats() {
        let (advisor, _) = advisor(
            vec![
                bus(1, 50, 50, 13.00, 80.00),
                bus(2, 40, 10, 13.01, 80.01),
                bus(3, 30, 5, 13.10, 80.10),
            ],
            Arc::new(Unavailable),
        );

        let report = advisor.run_pass().await.unwrap();
        assert_eq!(report.full, 1);
        assert_eq!(report.estimated_lookups, report.full + report.underfilled);

        let first = &report.proposals[0];
        assert_eq!(first.proposal.current_bus_id, BusId::from(1));
        assert_eq!(first.proposal.nearby_bus_id, BusId::from(2));
        assert_eq!(first.proposal.kind, ActionKind::Reallocate);
        assert_eq!(first.proposal.distance_basis, DistanceBasis::Estimated);
    }

    #[tokio::test]
    async fn test_service_distances_override_geometry() {
        // Bus 3 is geometrically farther but the service says it is closer.
        let (advisor, _) = advisor(
            vec![
                bus(1, 50, 50, 13.00, 80.00),
                bus(2, 40, 20, 13.01, 80.01),
                bus(3, 30, 20, 13.10, 80.10),
            ],
            Arc::new(Fixed(vec![9.0, 2.0])),
        );

        let report = advisor.run_pass().await.unwrap();
        let first = &report.proposals[0];
        assert_eq!(first.proposal.nearby_bus_id, BusId::from(3));
        assert_eq!(first.proposal.distance_basis, DistanceBasis::Service);
        assert_eq!(report.estimated_lookups, 0);
    }

    #[tokio::test]
    async fn test_no_candidate_is_reported() {
        let (advisor, _) = advisor(
            vec![bus(1, 50, 50, 13.0, 80.0), bus(2, 40, 40, 13.01, 80.01)],
            Arc::new(Unavailable),
        );

        let report = advisor.run_pass().await.unwrap();
        assert!(report.proposals.is_empty());
        assert_eq!(report.no_candidate, vec![BusId::from(1), BusId::from(2)]);
    }

    #[tokio::test]
    async fn test_second_pass_reuses_pending_actions() {
        let (advisor, _) = advisor(
            vec![bus(1, 50, 50, 13.0, 80.0), bus(2, 40, 25, 13.01, 80.01)],
            Arc::new(Unavailable),
        );

        let first = advisor.run_pass().await.unwrap();
        assert_eq!(first.proposals.len(), 1);
        let second = advisor.run_pass().await.unwrap();
        assert!(second.proposals.is_empty());
        assert_eq!(second.already_pending, vec![first.proposals[0].action_id]);
    }

    #[tokio::test]
    async fn test_approval_notifies_both_drivers_once() {
        let (advisor, notifier) = advisor(
            vec![bus(1, 50, 50, 13.0, 80.0), bus(2, 40, 25, 13.01, 80.01)],
            Arc::new(Unavailable),
        );
        let report = advisor.run_pass().await.unwrap();
        let record = report.proposals[0].clone();

        let decision = advisor
            .decide(record.action_id, Verdict::Approve)
            .await
            .unwrap();
        assert_eq!(decision.record.status, ActionStatus::Approved);
        assert_eq!(decision.delivery.unwrap().delivered, 2);

        // A follow-up that only now observes the approval stays quiet.
        let late = advisor
            .settle(&QueuedApprover::new(Duration::from_millis(10)), &record)
            .await
            .unwrap();
        assert!(late.delivery.is_none());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].message,
            "Your bus is full. Students will be allocated to Bus 2."
        );
        assert_eq!(sent[1].message, "Please pick up additional students from Bus 1.");
    }

    #[tokio::test]
    async fn test_follow_up_notifies_after_remote_approval() {
        let (advisor, notifier) = advisor(
            vec![bus(1, 50, 50, 13.0, 80.0), bus(2, 40, 25, 13.01, 80.01)],
            Arc::new(Unavailable),
        );
        let report = advisor.run_pass().await.unwrap();
        let handles = advisor.spawn_follow_ups(
            Arc::new(QueuedApprover::new(Duration::from_millis(10))),
            &report.proposals,
        );

        // Resolved straight on the gate, as a second process sharing it would.
        advisor
            .gate()
            .resolve(report.proposals[0].action_id, Verdict::Approve)
            .unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_denial_and_unknown_bus_do_not_notify() {
        let (advisor, notifier) = advisor(
            vec![bus(1, 50, 50, 13.0, 80.0), bus(2, 40, 25, 13.01, 80.01)],
            Arc::new(Unavailable),
        );
        advisor.run_pass().await.unwrap();

        let err = advisor
            .decide_pair(
                &BusId::from(7),
                &BusId::from(2),
                ActionKind::Reallocate,
                Verdict::Approve,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::BusNotFound { .. }));
        assert_eq!(advisor.gate().pending().len(), 1);

        let decision = advisor
            .decide_pair(
                &BusId::from(1),
                &BusId::from(2),
                ActionKind::Reallocate,
                Verdict::Deny,
            )
            .await
            .unwrap();
        assert_eq!(decision.record.status, ActionStatus::Denied);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decide_pair_before_any_pass() {
        let (advisor, _) = advisor(vec![bus(1, 50, 50, 13.0, 80.0)], Arc::new(Unavailable));
        let err = advisor
            .decide_pair(
                &BusId::from(1),
                &BusId::from(2),
                ActionKind::Reallocate,
                Verdict::Approve,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::NoSnapshot));
    }

    #[test]
    fn test_outcomes_tally() {
        let mut outcomes = Outcomes::default();
        for status in [
            ActionStatus::Approved,
            ActionStatus::Denied,
            ActionStatus::TimedOut,
            ActionStatus::Approved,
        ] {
            outcomes.record(status);
        }
        assert_eq!(
            outcomes,
            Outcomes {
                approved: 2,
                denied: 1,
                timed_out: 1
            }
        );
    }
}
