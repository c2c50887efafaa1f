//! Driver notification channels.
//!
//! A notification is best effort. Delivery is bounded by a timeout, failures
//! are logged and counted, and nothing is retried. The approval that caused a
//! notification is never rolled back because a driver could not be reached.

mod call;
mod log;
mod speech;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rebal_fleet::{BusId, DriverNotice};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

pub use call::{CallNotifier, TwilioConfig, DEFAULT_TWILIO_URL};
pub use log::LogNotifier;
pub use speech::SpeechNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no phone number on record for {driver} (Bus {bus_id})")]
    MissingContact { bus_id: BusId, driver: String },

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("call request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("call provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("notification timed out after {0:?}")]
    TimedOut(Duration),
}

/// One way of reaching a driver.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs and reports.
    fn channel(&self) -> &'static str;

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError>;

    /// Upper bound for one `notify` call when a single attempt gets `timeout`.
    fn budget(&self, timeout: Duration) -> Duration {
        timeout
    }
}

/// Text read out to a driver, by voice or by call.
pub fn spoken_text(notice: &DriverNotice) -> String {
    format!("Notification for {}. {}", notice.driver, notice.message)
}

/// Delivers every notice on every configured channel.
///
/// Channels are tried in order and independently; one failing does not stop
/// the rest. The first error is returned after all channels have been tried.
pub struct FanoutNotifier {
    channels: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl FanoutNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    pub fn channels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.channels.iter().map(|c| c.channel())
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    fn channel(&self) -> &'static str {
        "fanout"
    }

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError> {
        let mut first_error = None;
        for channel in &self.channels {
            if let Err(e) = notify_within(channel.as_ref(), notice, self.timeout).await {
                log_failure(channel.channel(), notice, &e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Channels run one after another, each with its own timeout.
    fn budget(&self, _timeout: Duration) -> Duration {
        let channels = u32::try_from(self.channels.len().max(1)).unwrap_or(u32::MAX);
        self.timeout.saturating_mul(channels)
    }
}

async fn notify_within(
    notifier: &dyn Notifier,
    notice: &DriverNotice,
    timeout: Duration,
) -> Result<(), NotifyError> {
    tokio::time::timeout(timeout, notifier.notify(notice))
        .await
        .map_err(|_| NotifyError::TimedOut(timeout))?
}

fn log_failure(channel: &str, notice: &DriverNotice, err: &NotifyError) {
    match err {
        NotifyError::MissingContact { .. } => warn!(
            channel,
            bus_id = %notice.bus_id,
            driver = %notice.driver,
            "Skipping notification: {err}"
        ),
        _ => error!(
            channel,
            bus_id = %notice.bus_id,
            driver = %notice.driver,
            error = %err,
            "Failed to notify driver"
        ),
    }
}

/// Outcome of notifying the drivers of one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send every notice, logging failures instead of returning them.
pub async fn deliver(
    notifier: &dyn Notifier,
    notices: &[DriverNotice],
    timeout: Duration,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    let budget = notifier.budget(timeout);
    for notice in notices {
        match notify_within(notifier, notice, budget).await {
            Ok(()) => {
                info!(
                    channel = notifier.channel(),
                    bus_id = %notice.bus_id,
                    driver = %notice.driver,
                    "Driver notified"
                );
                report.delivered += 1;
            }
            Err(e) => {
                log_failure(notifier.channel(), notice, &e);
                report.failed += 1;
            }
        }
    }
    report
}
