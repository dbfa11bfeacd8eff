//! callturn-dial - place a test call through the Exotel connect API
//!
//! The call is routed to the virtual number, whose flow hits the bot's
//! webhook. Reads `EXOTEL_*` settings from the environment (or `.env`); an
//! optional first argument overrides the recipient number.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_EXOTEL_HOST: &str = "api.exotel.com";
const STATUS_CALLBACK_EVENTS: &str = "initiated,ringing,answered,completed";

#[derive(Debug, Error)]
enum DialError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exotel returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone)]
struct DialConfig {
    host: String,
    account_sid: String,
    api_key: String,
    api_token: String,
    /// Virtual number; its flow answers the call
    virtual_number: String,
    recipient: String,
    status_callback: Option<String>,
}

impl DialConfig {
    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        recipient_override: Option<String>,
    ) -> Result<Self, DialError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(DialError::MissingVar(key));

        let recipient = match recipient_override {
            Some(number) => number,
            None => require("TEST_RECIPIENT_NUMBER")?,
        };

        Ok(Self {
            host: get("EXOTEL_HOST").unwrap_or_else(|| DEFAULT_EXOTEL_HOST.to_string()),
            account_sid: require("EXOTEL_ACCOUNT_SID")?,
            api_key: require("EXOTEL_API_KEY")?,
            api_token: require("EXOTEL_API_TOKEN")?,
            virtual_number: require("EXOTEL_FROM_NUMBER")?,
            recipient,
            status_callback: get("PUBLIC_BASE_URL")
                .map(|base| format!("{}/exotel/status", base.trim_end_matches('/'))),
        })
    }

    fn connect_url(&self) -> String {
        format!(
            "https://{}/v1/Accounts/{}/Calls/connect.json",
            self.host, self.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "https://{}/v1/Accounts/{}/Calls/{call_sid}.json",
            self.host, self.account_sid
        )
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("From", self.recipient.clone()),
            ("To", self.virtual_number.clone()),
            ("CallerId", self.virtual_number.clone()),
            ("CallType", "trans".to_string()),
        ];
        if let Some(callback) = &self.status_callback {
            form.push(("StatusCallback", callback.clone()));
            form.push(("StatusCallbackEvents", STATUS_CALLBACK_EVENTS.to_string()));
        }
        form
    }
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    #[serde(rename = "Call")]
    call: Option<CallInfo>,
}

#[derive(Debug, Deserialize)]
struct CallInfo {
    #[serde(rename = "Sid")]
    sid: Option<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
}

async fn dial(config: &DialConfig) -> Result<ConnectResponse, DialError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .post(config.connect_url())
        .basic_auth(&config.api_key, Some(&config.api_token))
        .form(&config.form())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DialError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callturn_dial=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config =
        DialConfig::from_lookup(|key| std::env::var(key).ok(), std::env::args().nth(1))?;
    tracing::info!(to = %config.virtual_number, from = %config.recipient, "Placing call");

    let response = dial(&config).await?;
    match response.call.and_then(|call| call.sid.map(|sid| (sid, call.status))) {
        Some((sid, status)) => {
            tracing::info!(
                call_sid = %sid,
                status = ?status,
                monitor = %config.call_url(&sid),
                "Call initiated"
            );
        }
        None => tracing::warn!("Call accepted but no call sid was returned"),
    }
    Ok(())
}
