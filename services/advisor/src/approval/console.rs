//! Prompt-and-wait approval on a terminal.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rebal_fleet::ActionKind;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{settled, ActionRecord, ApprovalGate, ApprovalResult, Approver, Verdict};

struct Console<R, W> {
    reader: R,
    writer: W,
}

/// Asks an operator on a line-oriented console and blocks until they answer.
///
/// `yes` (any case) approves; any other answer denies. End of input, or no
/// answer before the action's deadline, times the action out.
pub struct ConsoleApprover<R, W> {
    console: Mutex<Console<R, W>>,
}

impl ConsoleApprover<BufReader<Stdin>, Stdout> {
    /// Approver bound to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> ConsoleApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            console: Mutex::new(Console { reader, writer }),
        }
    }

    /// Print the prompt and read one answer. `None` means no answer arrived.
    async fn ask(&self, record: &ActionRecord, wait: Duration) -> io::Result<Option<Verdict>> {
        let proposal = &record.proposal;
        let request = match proposal.kind {
            ActionKind::Reallocate => format!(
                "Requesting admin approval to reallocate students from Bus {} to Bus {}.\n",
                proposal.current_bus_id, proposal.nearby_bus_id
            ),
            ActionKind::Combine => format!(
                "Requesting admin approval to combine Bus {} with Bus {}.\n",
                proposal.current_bus_id, proposal.nearby_bus_id
            ),
        };
        let question = format!(
            "Does the admin approve the {} action? (yes/no): ",
            proposal.kind.verb()
        );

        let mut console = self.console.lock().await;
        let Console { reader, writer } = &mut *console;
        writer.write_all(request.as_bytes()).await?;
        writer.write_all(question.as_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        match tokio::time::timeout(wait, reader.read_line(&mut line)).await {
            Err(_) => {
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok(None)
            }
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(_)) => Ok(Some(Verdict::from_approved(
                line.trim().eq_ignore_ascii_case("yes"),
            ))),
            Ok(Err(e)) => Err(e),
        }
    }
}

#[async_trait]
impl<R, W> Approver for ConsoleApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn decide(
        &self,
        gate: &ApprovalGate,
        record: &ActionRecord,
    ) -> ApprovalResult<ActionRecord> {
        let id = record.action_id;
        if let Some(current) = gate.get(id).filter(|r| r.status.is_terminal()) {
            return Ok(current);
        }

        let wait = (record.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        match self.ask(record, wait).await? {
            Some(verdict) => {
                info!(action_id = %id, ?verdict, "Admin answered");
                settled(gate, gate.resolve(id, verdict))
            }
            None => {
                warn!(action_id = %id, "No answer from admin, timing out");
                settled(gate, gate.time_out(id))
            }
        }
    }
}
