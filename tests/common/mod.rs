use scaleout_engine::config::Config;
use scaleout_engine::exchange::PaperVenue;
use scaleout_engine::models::{Direction, Quote, TradeSignal};
use scaleout_engine::signals::NoopAck;
use scaleout_engine::trading::SignalLifecycleController;

pub type Engine = SignalLifecycleController<PaperVenue>;

/// Unit price increment, TP3 two increments past TP1, resting orders.
pub fn test_config() -> Config {
    Config {
        symbol: "TEST-USD".to_string(),
        price_increment: 1.0,
        quantity_per_leg: 1.0,
        slippage_points: 0,
        magic_number: 42,
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

pub fn signal(id: &str, direction: Direction, levels: (f64, f64, f64, f64)) -> TradeSignal {
    let (entry, stop_loss, take_profit1, take_profit2) = levels;
    TradeSignal {
        id: id.to_string(),
        direction,
        entry,
        stop_loss,
        take_profit1,
        take_profit2,
        timestamp: "2024-01-15T12:00:00Z".to_string(),
    }
}

/// Long: entry 100, stop 95, targets 105 / 110.
pub fn long_signal(id: &str) -> TradeSignal {
    signal(id, Direction::Long, (100.0, 95.0, 105.0, 110.0))
}

/// Short: entry 100, stop 105, targets 95 / 90.
pub fn short_signal(id: &str) -> TradeSignal {
    signal(id, Direction::Short, (100.0, 105.0, 95.0, 90.0))
}

pub fn engine_at(cfg: &Config, bid: f64, ask: f64) -> Engine {
    let venue = PaperVenue::new(cfg, Quote::new(bid, ask));
    SignalLifecycleController::new(cfg, venue, Box::new(NoopAck))
}

/// Current stop-loss of each leg that is still an open position.
pub fn leg_stops(engine: &Engine) -> Vec<Option<f64>> {
    engine
        .status()
        .slots
        .iter()
        .map(|s| engine.venue().position(s.ticket).map(|p| p.stop_loss))
        .collect()
}
