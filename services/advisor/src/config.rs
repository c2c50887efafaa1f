use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::distance::DEFAULT_DISTANCE_MATRIX_URL;
use crate::notify::{TwilioConfig, DEFAULT_TWILIO_URL};

/// How proposals get their admin decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Serve HTTP and wait for decisions to arrive there.
    Queued,
    /// Run one pass, prompt on stdin for each proposal, then exit.
    Console,
}

impl FromStr for ApprovalMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "http" => Ok(Self::Queued),
            "console" | "interactive" => Ok(Self::Console),
            other => bail!("unknown approval mode '{other}' (expected queued or console)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => bail!("unknown log format '{other}' (expected json or pretty)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyChannel {
    Log,
    Speech,
    Call,
}

impl FromStr for NotifyChannel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "speech" | "tts" => Ok(Self::Speech),
            "call" | "twilio" => Ok(Self::Call),
            other => bail!("unknown notification channel '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub channels: Vec<NotifyChannel>,
    pub timeout: Duration,
    pub speech_command: String,
    pub twilio: Option<TwilioConfig>,
}

#[derive(Debug, Clone)]
pub struct DistanceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub fleet_path: PathBuf,
    pub approval_mode: ApprovalMode,
    pub approval_timeout: Duration,
    pub approval_poll: Duration,
    pub expiry_sweep: Duration,
    pub notify: NotifyConfig,
    pub distance: DistanceConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = get("REBAL_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("REBAL_LISTEN_ADDR")?;

        let fleet_path = get("REBAL_FLEET_PATH")
            .unwrap_or_else(|| "buses.json".to_string())
            .into();

        let approval_mode = parse_or(get("REBAL_APPROVAL_MODE"), "REBAL_APPROVAL_MODE", ApprovalMode::Queued)?;
        let approval_timeout = secs(get("REBAL_APPROVAL_TIMEOUT_SECS"), "REBAL_APPROVAL_TIMEOUT_SECS", 900)?;
        let approval_poll = Duration::from_millis(parse_or(
            get("REBAL_APPROVAL_POLL_MS"),
            "REBAL_APPROVAL_POLL_MS",
            500,
        )?);
        let expiry_sweep = secs(get("REBAL_EXPIRY_SWEEP_SECS"), "REBAL_EXPIRY_SWEEP_SECS", 30)?;
        for (key, value) in [
            ("REBAL_APPROVAL_TIMEOUT_SECS", approval_timeout),
            ("REBAL_APPROVAL_POLL_MS", approval_poll),
            ("REBAL_EXPIRY_SWEEP_SECS", expiry_sweep),
        ] {
            if value.is_zero() {
                bail!("{key} must be positive");
            }
        }

        let channels = match get("REBAL_NOTIFY_CHANNELS") {
            Some(list) => list
                .split(',')
                .filter(|c| !c.trim().is_empty())
                .map(NotifyChannel::from_str)
                .collect::<Result<Vec<_>>>()
                .context("REBAL_NOTIFY_CHANNELS")?,
            None => vec![NotifyChannel::Log],
        };
        if channels.is_empty() {
            bail!("REBAL_NOTIFY_CHANNELS lists no channels");
        }

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
                base_url: get("REBAL_TWILIO_URL").unwrap_or_else(|| DEFAULT_TWILIO_URL.to_string()),
            }),
            _ => None,
        };
        if channels.contains(&NotifyChannel::Call) && twilio.is_none() {
            bail!(
                "the call channel needs TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER"
            );
        }

        let notify_timeout = secs(get("REBAL_NOTIFY_TIMEOUT_SECS"), "REBAL_NOTIFY_TIMEOUT_SECS", 10)?;
        if notify_timeout.is_zero() {
            bail!("REBAL_NOTIFY_TIMEOUT_SECS must be positive");
        }

        let notify = NotifyConfig {
            channels,
            timeout: notify_timeout,
            speech_command: get("REBAL_SPEECH_COMMAND").unwrap_or_else(|| "espeak".to_string()),
            twilio,
        };

        let distance = DistanceConfig {
            url: get("REBAL_DISTANCE_URL")
                .unwrap_or_else(|| DEFAULT_DISTANCE_MATRIX_URL.to_string()),
            api_key: get("GOOGLE_MAPS_API_KEY"),
            timeout: secs(get("REBAL_DISTANCE_TIMEOUT_SECS"), "REBAL_DISTANCE_TIMEOUT_SECS", 10)?,
        };

        let log_level = get("REBAL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = parse_or(get("REBAL_LOG_FORMAT"), "REBAL_LOG_FORMAT", LogFormat::Json)?;

        Ok(Self {
            listen_addr,
            fleet_path,
            approval_mode,
            approval_timeout,
            approval_poll,
            expiry_sweep,
            notify,
            distance,
            log_level,
            log_format,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}: invalid value '{v}': {e}")),
        None => Ok(default),
    }
}

fn secs(value: Option<String>, key: &str, default: u64) -> Result<Duration> {
    parse_or(value, key, default).map(Duration::from_secs)
}
