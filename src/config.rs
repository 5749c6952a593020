use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Ten years. Longer resting orders are treated as a configuration mistake.
pub const MAX_ORDER_EXPIRATION_HOURS: u32 = 24 * 365 * 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Instrument
    pub symbol: String,
    /// Minimum price increment of the instrument (paper venue only; a real
    /// venue reports its own).
    pub price_increment: f64,

    // Trading
    pub quantity_per_leg: f64,
    pub slippage_points: u32,
    pub magic_number: u64,

    // Scale-out
    /// Extra distance beyond TP1 for the third leg, in price increments.
    pub tp3_offset: f64,
    pub enable_trailing_stops: bool,

    // Order management
    /// Zero disables expiration of pending orders.
    pub order_expiration_hours: u32,
    /// true = resting limit orders, false = immediate execution.
    pub use_pending_orders: bool,

    // Webhook
    pub enable_webhook_mode: bool,
    pub webhook_get_url: String,
    pub webhook_update_url: String,
    pub webhook_token: String,
    pub signal_check_interval_secs: u64,
    pub tick_interval_secs: u64,

    // Quote feed
    pub coinbase_api_key: String,
    pub coinbase_api_secret: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let flag = |key: &str, default: bool| -> bool {
            match std::env::var(key) {
                Ok(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
                Err(_) => default,
            }
        };

        let log_level = if flag("ENABLE_LOGGING", true) {
            env("LOG_LEVEL", "INFO")
        } else {
            "off".to_string()
        };

        Config {
            symbol: env("SYMBOL", "BTC-USD"),
            price_increment: env("PRICE_INCREMENT", "0.01").parse().unwrap_or(0.01),
            quantity_per_leg: env("LOT_SIZE", "0.01").parse().unwrap_or(0.01),
            slippage_points: env("SLIPPAGE_POINTS", "30").parse().unwrap_or(30),
            magic_number: env("MAGIC_NUMBER", "123456").parse().unwrap_or(123456),
            tp3_offset: env("TP3_OFFSET", "5.0").parse().unwrap_or(5.0),
            enable_trailing_stops: flag("ENABLE_TRAILING_STOPS", true),
            order_expiration_hours: env("ORDER_EXPIRATION_HOURS", "24").parse().unwrap_or(24),
            use_pending_orders: flag("USE_PENDING_ORDERS", true),
            enable_webhook_mode: flag("WEBHOOK_MODE", true),
            webhook_get_url: env("WEBHOOK_GET_URL", "http://localhost:9000/webhook"),
            webhook_update_url: env("WEBHOOK_UPDATE_URL", "http://localhost:9000/update"),
            webhook_token: env("WEBHOOK_TOKEN", "your_secret_token"),
            signal_check_interval_secs: env("SIGNAL_CHECK_INTERVAL", "5").parse().unwrap_or(5),
            tick_interval_secs: env("TICK_INTERVAL", "1").parse().unwrap_or(1),
            coinbase_api_key: env("COINBASE_API_KEY", ""),
            coinbase_api_secret: env("COINBASE_API_SECRET", "").replace("\\n", "\n"),
            log_level,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.quantity_per_leg > 0.0,
            "LOT_SIZE must be positive, got {}",
            self.quantity_per_leg
        );
        ensure!(
            self.tp3_offset >= 0.0,
            "TP3_OFFSET must be non-negative, got {}",
            self.tp3_offset
        );
        ensure!(
            self.price_increment > 0.0,
            "PRICE_INCREMENT must be positive, got {}",
            self.price_increment
        );
        ensure!(
            self.order_expiration_hours <= MAX_ORDER_EXPIRATION_HOURS,
            "ORDER_EXPIRATION_HOURS must be at most {}, got {}",
            MAX_ORDER_EXPIRATION_HOURS,
            self.order_expiration_hours
        );
        ensure!(self.signal_check_interval_secs > 0, "SIGNAL_CHECK_INTERVAL must be > 0");
        ensure!(self.tick_interval_secs > 0, "TICK_INTERVAL must be > 0");
        Ok(())
    }

    pub fn order_mode(&self) -> &'static str {
        if self.use_pending_orders {
            "PENDING (limit) ORDERS"
        } else {
            "IMMEDIATE (market) ORDERS"
        }
    }
}
