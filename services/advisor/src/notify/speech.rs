use std::process::Stdio;

use async_trait::async_trait;
use rebal_fleet::DriverNotice;
use tokio::process::Command;
use tracing::debug;

use super::{spoken_text, Notifier, NotifyError};

/// Speaks each notice through a text-to-speech command such as `espeak`.
///
/// The command receives the spoken text as its single argument.
#[derive(Debug, Clone)]
pub struct SpeechNotifier {
    command: String,
}

impl SpeechNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Notifier for SpeechNotifier {
    fn channel(&self) -> &'static str {
        "speech"
    }

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError> {
        let text = spoken_text(notice);
        debug!(command = %self.command, text = %text, "Speaking notification");

        let status = Command::new(&self.command)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| NotifyError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::CommandFailed {
                command: self.command.clone(),
                status: status.to_string(),
            })
        }
    }
}
