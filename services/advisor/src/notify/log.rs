use async_trait::async_trait;
use rebal_fleet::DriverNotice;
use tracing::info;

use super::{Notifier, NotifyError};

/// Writes each notice to the structured log. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError> {
        info!(
            bus_id = %notice.bus_id,
            driver = %notice.driver,
            phone = notice.phone.as_deref().unwrap_or(""),
            message = %notice.message,
            "Notifying driver"
        );
        Ok(())
    }
}
