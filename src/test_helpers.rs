use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::models::{Direction, TradeSignal};
use crate::signals::SignalAck;

/// Long signal: entry 100, stop 95, targets 105 and 110.
pub fn long_signal(id: &str) -> TradeSignal {
    TradeSignal {
        id: id.to_string(),
        direction: Direction::Long,
        entry: 100.0,
        stop_loss: 95.0,
        take_profit1: 105.0,
        take_profit2: 110.0,
        timestamp: String::new(),
    }
}

/// Short signal: entry 100, stop 105, targets 95 and 90.
pub fn short_signal(id: &str) -> TradeSignal {
    TradeSignal {
        id: id.to_string(),
        direction: Direction::Short,
        entry: 100.0,
        stop_loss: 105.0,
        take_profit1: 95.0,
        take_profit2: 90.0,
        timestamp: String::new(),
    }
}

/// Records acknowledged signal ids, optionally failing every call.
#[derive(Default, Clone)]
pub struct RecordingAck {
    pub seen: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingAck {
    pub fn failing() -> Self {
        Self {
            seen: Arc::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl SignalAck for RecordingAck {
    async fn acknowledge(&self, signal: &TradeSignal) -> Result<()> {
        anyhow::ensure!(!self.fail, "signal server unavailable");
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(signal.id.clone());
        }
        Ok(())
    }
}

/// A Config suitable for testing: unit price increment, no network endpoints.
pub fn default_test_config() -> Config {
    Config {
        symbol: "TEST-USD".to_string(),
        price_increment: 1.0,
        quantity_per_leg: 1.0,
        slippage_points: 0,
        magic_number: 1,
        tp3_offset: 2.0,
        enable_trailing_stops: true,
        order_expiration_hours: 24,
        use_pending_orders: true,
        enable_webhook_mode: false,
        webhook_get_url: String::new(),
        webhook_update_url: String::new(),
        webhook_token: String::new(),
        signal_check_interval_secs: 5,
        tick_interval_secs: 1,
        coinbase_api_key: String::new(),
        coinbase_api_secret: String::new(),
        log_level: "ERROR".to_string(),
    }
}
