//! Bus rebalancing advisor.
//!
//! Loads the fleet, proposes reallocations for full buses and combinations
//! for underfilled ones, waits for an admin decision on each, and notifies the
//! drivers of approved actions. Runs either as an HTTP service (decisions
//! arrive over the API) or as a one-shot console session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rebal_advisor::{
    advisor::{Advisor, Outcomes},
    api,
    approval::{ApprovalGate, ConsoleApprover, QueuedApprover},
    config::{ApprovalMode, Config, LogFormat, NotifyChannel, NotifyConfig},
    distance::DistanceMatrixClient,
    expiry::ExpiryWorker,
    loader::{FileFleetLoader, FleetLoader},
    notify::{CallNotifier, FanoutNotifier, LogNotifier, Notifier, SpeechNotifier},
    state::AppState,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    info!("Starting bus rebalancing advisor");
    info!(
        fleet_path = %config.fleet_path.display(),
        approval_mode = ?config.approval_mode,
        "Configuration loaded"
    );

    let loader: Arc<dyn FleetLoader> = Arc::new(FileFleetLoader::new(&config.fleet_path));
    let distances = DistanceMatrixClient::new(
        config.distance.url.clone(),
        config.distance.api_key.clone(),
        config.distance.timeout,
    )
    .context("failed to build distance client")?;
    if !distances.has_credential() {
        warn!("GOOGLE_MAPS_API_KEY is not set; distances will be estimated");
    }

    let notifier = build_notifier(&config.notify)?;
    let gate = Arc::new(ApprovalGate::new(config.approval_timeout));
    let advisor = Arc::new(Advisor::new(
        loader,
        Arc::new(distances),
        gate,
        notifier,
        config.notify.timeout,
    ));

    match config.approval_mode {
        ApprovalMode::Console => run_console(advisor).await,
        ApprovalMode::Queued => serve(config, advisor).await,
    }
}

fn init_tracing(config: &Config) {
    // Prefer RUST_LOG, fall back to REBAL_LOG_LEVEL. Logs go to stderr so
    // console prompts own stdout.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn build_notifier(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::with_capacity(config.channels.len());
    for channel in &config.channels {
        match channel {
            NotifyChannel::Log => channels.push(Arc::new(LogNotifier)),
            NotifyChannel::Speech => {
                channels.push(Arc::new(SpeechNotifier::new(config.speech_command.clone())))
            }
            NotifyChannel::Call => {
                let twilio = config
                    .twilio
                    .clone()
                    .context("call channel enabled without Twilio credentials")?;
                channels.push(Arc::new(
                    CallNotifier::new(twilio, config.timeout)
                        .context("failed to build call client")?,
                ));
            }
        }
    }

    let fanout = FanoutNotifier::new(channels, config.timeout);
    info!(channels = ?fanout.channels().collect::<Vec<_>>(), "Notification channels ready");
    Ok(Arc::new(fanout))
}

/// One pass, one prompt per proposal, then print the report and exit.
async fn run_console(advisor: Arc<Advisor>) -> Result<()> {
    let mut report = advisor
        .run_pass()
        .await
        .context("failed to load the fleet")?;

    let approver = ConsoleApprover::stdio();
    let mut outcomes = Outcomes::default();
    for record in &report.proposals {
        match advisor.settle(&approver, record).await {
            Ok(decision) => outcomes.record(decision.record.status),
            Err(e) => {
                error!(action_id = %record.action_id, error = %e, "Approval prompt failed");
                break;
            }
        }
    }

    for record in advisor.gate().abandon_pending() {
        warn!(action_id = %record.action_id, "Admin session ended before a decision");
        outcomes.record(record.status);
    }

    info!(
        proposals = report.proposals.len(),
        approved = outcomes.approved,
        denied = outcomes.denied,
        timed_out = outcomes.timed_out,
        "Console session complete"
    );
    report.outcomes = Some(outcomes);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Startup pass, then serve decisions over HTTP until ctrl-c.
async fn serve(config: Config, advisor: Arc<Advisor>) -> Result<()> {
    let follow_up: Arc<QueuedApprover> = Arc::new(QueuedApprover::new(config.approval_poll));

    let report = advisor
        .run_pass()
        .await
        .context("failed to load the fleet")?;
    let mut follow_ups = advisor.spawn_follow_ups(follow_up.clone(), &report.proposals);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let expiry_worker = ExpiryWorker::new(advisor.gate().clone(), config.expiry_sweep);
    let expiry_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            expiry_worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(
        advisor.clone(),
        follow_up,
        config.distance.api_key.clone(),
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    let abandoned = advisor.gate().abandon_pending();
    if !abandoned.is_empty() {
        warn!(count = abandoned.len(), "Timed out actions still pending at shutdown");
    }

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = Duration::from_secs(10);
    if tokio::time::timeout(shutdown_timeout, expiry_handle)
        .await
        .is_err()
    {
        warn!("Expiry worker did not shut down in time");
    }
    follow_ups.retain(|h| !h.is_finished());
    for handle in follow_ups {
        if tokio::time::timeout(shutdown_timeout, handle).await.is_err() {
            warn!("Follow-up task did not finish in time");
        }
    }

    info!("Advisor shutdown complete");
    Ok(())
}
