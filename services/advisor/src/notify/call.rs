use std::time::Duration;

use async_trait::async_trait;
use rebal_fleet::DriverNotice;
use serde::Deserialize;
use tracing::{debug, info};

use super::{spoken_text, Notifier, NotifyError};

/// Public Twilio REST endpoint.
pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";

/// Credentials and caller id for the voice call provider.
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub base_url: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Places a voice call that reads the notice to the driver.
#[derive(Debug, Clone)]
pub struct CallNotifier {
    client: reqwest::Client,
    config: TwilioConfig,
}

#[derive(Debug, Deserialize)]
struct CallCreated {
    sid: String,
}

impl CallNotifier {
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

/// TwiML that says `message` once.
pub(crate) fn twiml(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    format!("<Response><Say>{escaped}</Say></Response>")
}

#[async_trait]
impl Notifier for CallNotifier {
    fn channel(&self) -> &'static str {
        "call"
    }

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError> {
        let Some(phone) = notice.phone.as_deref() else {
            return Err(NotifyError::MissingContact {
                bus_id: notice.bus_id.clone(),
                driver: notice.driver.clone(),
            });
        };

        debug!(to = %phone, bus_id = %notice.bus_id, "Placing call");
        let twiml = twiml(&spoken_text(notice));
        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", phone),
                ("From", self.config.from_number.as_str()),
                ("Twiml", twiml.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Provider { status, body });
        }

        let created: CallCreated = response.json().await?;
        info!(to = %phone, call_sid = %created.sid, "Call initiated");
        Ok(())
    }
}
