use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::{Direction, TradeSignal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGroupPlan {
    pub signal: TradeSignal,
    pub tp3: f64,
    /// `None` when expiration is disabled or orders execute immediately.
    pub expiration: Option<DateTime<Utc>>,
}

impl OrderGroupPlan {
    /// Take-profit for each leg, in placement order.
    pub fn take_profits(&self) -> [f64; 3] {
        [self.signal.take_profit1, self.signal.take_profit2, self.tp3]
    }
}

/// Third target: `tp3_offset` price increments past TP1.
pub fn derive_tp3(direction: Direction, tp1: f64, tp3_offset: f64, price_increment: f64) -> f64 {
    direction.offset(tp1, tp3_offset * price_increment)
}

/// `None` when `hours` is zero, or so large the deadline is past the last
/// representable instant; both mean good-till-cancelled.
pub fn expiration_after(now: DateTime<Utc>, hours: u32) -> Option<DateTime<Utc>> {
    if hours == 0 {
        return None;
    }
    Duration::try_hours(i64::from(hours)).and_then(|d| now.checked_add_signed(d))
}

pub struct OrderGroupPlanner {
    pub tp3_offset: f64,
    pub expiration_hours: u32,
    pub use_pending_orders: bool,
}

impl OrderGroupPlanner {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tp3_offset: cfg.tp3_offset,
            expiration_hours: cfg.order_expiration_hours,
            use_pending_orders: cfg.use_pending_orders,
        }
    }

    pub fn plan(
        &self,
        signal: &TradeSignal,
        price_increment: f64,
        now: DateTime<Utc>,
    ) -> OrderGroupPlan {
        let tp3 = derive_tp3(
            signal.direction,
            signal.take_profit1,
            self.tp3_offset,
            price_increment,
        );
        let expiration = if self.use_pending_orders {
            expiration_after(now, self.expiration_hours)
        } else {
            None
        };
        OrderGroupPlan {
            signal: signal.clone(),
            tp3,
            expiration,
        }
    }
}
