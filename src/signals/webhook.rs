use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config::Config;
use crate::models::{Direction, TradeSignal};
use crate::signals::{SignalAck, SignalSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Numbers arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(f64),
    Text(String),
}

impl WireNumber {
    fn value(&self) -> Option<f64> {
        match self {
            WireNumber::Number(n) => Some(*n),
            WireNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    signal: Option<String>,
    entry: Option<WireNumber>,
    sl: Option<WireNumber>,
    tp1: Option<WireNumber>,
    tp2: Option<WireNumber>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    page_id: Option<String>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn price_level(field: &Option<WireNumber>, name: &str) -> Result<f64> {
    let value = field
        .as_ref()
        .and_then(WireNumber::value)
        .with_context(|| format!("missing or non-numeric '{}'", name))?;
    anyhow::ensure!(value != 0.0, "missing required price level '{}'", name);
    anyhow::ensure!(
        value.is_finite() && value > 0.0,
        "price level '{}' must be a positive finite number, got {}",
        name,
        value
    );
    Ok(value)
}

/// Parses a webhook body. An empty body, `null` or `{}` means no signal is
/// waiting. A payload without `page_id` gets a generated id.
pub fn parse_signal(body: &str, now_unix: u64) -> Result<Option<TradeSignal>> {
    let body = body.trim();
    if body.is_empty() || body == "null" || body == "{}" {
        return Ok(None);
    }

    let wire: WirePayload = serde_json::from_str(body).context("Failed to parse signal JSON")?;

    let direction: Direction = wire
        .signal
        .as_deref()
        .context("JSON missing 'signal' field")?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let entry = price_level(&wire.entry, "entry")?;
    let stop_loss = price_level(&wire.sl, "sl")?;
    let take_profit1 = price_level(&wire.tp1, "tp1")?;
    let take_profit2 = price_level(&wire.tp2, "tp2")?;

    let id = match wire.page_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("{}_{}", now_unix, direction.order_label()),
    };

    Ok(Some(TradeSignal {
        id,
        direction,
        entry,
        stop_loss,
        take_profit1,
        take_profit2,
        timestamp: wire.timestamp.unwrap_or_default(),
    }))
}

fn authorized_get(client: &Client, url: &str, token: &str) -> RequestBuilder {
    client
        .get(url)
        .query(&[("timestamp", unix_now().to_string())])
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", token))
        .timeout(REQUEST_TIMEOUT)
}

/// Polls an HTTP endpoint for the latest signal.
pub struct WebhookSignalSource {
    client: Client,
    url: String,
    token: String,
}

impl WebhookSignalSource {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            url: cfg.webhook_get_url.clone(),
            token: cfg.webhook_token.clone(),
        }
    }
}

#[async_trait]
impl SignalSource for WebhookSignalSource {
    async fn poll(&mut self) -> Result<Option<TradeSignal>> {
        let resp = authorized_get(&self.client, &self.url, &self.token)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Webhook request failed with code: {}", status);
        }

        let body = resp.text().await.context("Failed to read webhook body")?;
        debug!("Received response: {}", body);
        parse_signal(&body, unix_now())
    }
}

/// Tells the signal server that a signal has been consumed.
pub struct WebhookAck {
    client: Client,
    url: String,
    token: String,
}

impl WebhookAck {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            url: cfg.webhook_update_url.clone(),
            token: cfg.webhook_token.clone(),
        }
    }
}

#[async_trait]
impl SignalAck for WebhookAck {
    async fn acknowledge(&self, signal: &TradeSignal) -> Result<()> {
        let resp = authorized_get(&self.client, &self.url, &self.token)
            .query(&[("signal_id", signal.id.as_str())])
            .send()
            .await
            .context("Signal update request failed")?;
        let status = resp.status();
        anyhow::ensure!(status.is_success(), "Signal update rejected: {}", status);
        debug!("Sent update for signal {}", signal.id);
        Ok(())
    }
}
