use thiserror::Error;

use crate::models::{Direction, TradeSignal};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid {direction} signal levels: {detail}")]
    BadGeometry { direction: Direction, detail: String },

    #[error("{direction} pending entry {entry} is on the wrong side of market {market}")]
    BadEntryRelativeToMarket {
        direction: Direction,
        entry: f64,
        market: f64,
    },
}

/// Checks that the signal's levels are ordered for its direction and, for
/// resting orders, that the entry sits away from the market.
///
/// Long: `stop_loss < entry < tp1 < tp2`, and `entry < market` when pending.
/// Short is the mirror image.
pub fn validate(
    signal: &TradeSignal,
    current_price: f64,
    using_pending_orders: bool,
) -> Result<(), ValidationError> {
    let d = signal.direction;
    let checks = [
        ("entry", signal.entry, "stop loss", signal.stop_loss),
        ("tp1", signal.take_profit1, "entry", signal.entry),
        ("tp2", signal.take_profit2, "tp1", signal.take_profit1),
    ];

    // NaN fails every comparison, so it lands here too.
    for (name, value, ref_name, reference) in checks {
        if !d.is_beyond(value, reference) {
            let relation = match d {
                Direction::Long => "above",
                Direction::Short => "below",
            };
            return Err(ValidationError::BadGeometry {
                direction: d,
                detail: format!(
                    "{} {} must be {} {} {}",
                    name, value, relation, ref_name, reference
                ),
            });
        }
    }

    if using_pending_orders && !d.is_beyond(current_price, signal.entry) {
        return Err(ValidationError::BadEntryRelativeToMarket {
            direction: d,
            entry: signal.entry,
            market: current_price,
        });
    }

    Ok(())
}
