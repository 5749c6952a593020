use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::exchange::QuoteFeed;
use crate::models::Quote;

const BASE_URL: &str = "https://api.coinbase.com";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct JwtClaims {
    sub: String,
    iss: String,
    nbf: u64,
    exp: u64,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    best_bid: String,
    #[serde(default)]
    best_ask: String,
}

/// Best bid/ask for one product. Requests are signed when API credentials
/// are configured and sent anonymously otherwise.
pub struct CoinbaseQuoteFeed {
    client: Client,
    api_key: String,
    api_secret: String,
    symbol: String,
    last_request: Option<Instant>,
}

impl CoinbaseQuoteFeed {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: cfg.coinbase_api_key.clone(),
            api_secret: cfg.coinbase_api_secret.clone(),
            symbol: cfg.symbol.clone(),
            last_request: None,
        }
    }

    fn generate_jwt(&self, method: &str, path: &str) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let claims = JwtClaims {
            sub: self.api_key.clone(),
            iss: "cdp".to_string(),
            nbf: now,
            exp: now + 120,
            uri: format!("{} {}{}", method, "api.coinbase.com", path),
        };

        let key = EncodingKey::from_ec_pem(self.api_secret.as_bytes())
            .context("Failed to parse API secret as EC key")?;

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.api_key.clone());
        header.typ = Some("JWT".to_string());

        encode(&header, &claims, &key).context("Failed to encode JWT")
    }

    async fn rate_limit(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    pub async fn get_quote(&mut self) -> Result<Quote> {
        self.rate_limit().await;

        let path = format!("/api/v3/brokerage/market/products/{}/ticker", self.symbol);

        let mut req = self
            .client
            .get(format!("{}{}", BASE_URL, path))
            .query(&[("limit", "1")]);
        if !self.api_key.is_empty() {
            let jwt = self.generate_jwt("GET", &path)?;
            req = req.header("Authorization", format!("Bearer {}", jwt));
        }

        let resp = req.send().await.context("Failed to fetch ticker")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Coinbase ticker error {}: {}", status, body);
        }

        let data: TickerResponse = resp.json().await.context("Failed to parse ticker")?;
        parse_quote(&data)
    }
}

fn parse_quote(data: &TickerResponse) -> Result<Quote> {
    let bid: f64 = data.best_bid.parse().context("No best bid in ticker response")?;
    let ask: f64 = data.best_ask.parse().context("No best ask in ticker response")?;
    anyhow::ensure!(bid > 0.0 && ask >= bid, "Crossed or empty book: {} / {}", bid, ask);
    Ok(Quote::new(bid, ask))
}

#[async_trait]
impl QuoteFeed for CoinbaseQuoteFeed {
    async fn get_quote(&mut self) -> Result<Quote> {
        self.get_quote().await
    }
}
