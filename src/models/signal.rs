use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// A fully parsed trading signal. The source guarantees every field is
/// populated; geometry is checked separately by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub id: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit1: f64,
    pub take_profit2: f64,
    #[serde(default)]
    pub timestamp: String,
}

impl TradeSignal {
    pub fn summary(&self) -> String {
        format!(
            "{} {} entry={} sl={} tp1={} tp2={}",
            self.id, self.direction, self.entry, self.stop_loss, self.take_profit1, self.take_profit2
        )
    }
}
