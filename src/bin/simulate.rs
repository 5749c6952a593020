use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use scaleout_engine::config::Config;
use scaleout_engine::exchange::PaperVenue;
use scaleout_engine::models::{Direction, Quote, TradeSignal};
use scaleout_engine::signals::NoopAck;
use scaleout_engine::trading::SignalLifecycleController;

/// Bid/ask path for a long trade: rest above entry, fill, run through TP1
/// and TP2, then fall back onto the trailed stop of the third leg.
const PRICE_PATH: [(f64, f64); 10] = [
    (2355.0, 2355.5),
    (2352.0, 2352.5),
    (2349.5, 2350.0),
    (2354.0, 2354.5),
    (2360.5, 2361.0),
    (2366.0, 2366.5),
    (2370.5, 2371.0),
    (2368.0, 2368.5),
    (2362.0, 2362.5),
    (2359.5, 2360.0),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut cfg = Config::from_env();
    cfg.use_pending_orders = true;
    cfg.price_increment = 0.5;
    cfg.tp3_offset = 30.0;
    cfg.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          SCALE-OUT ENGINE  SIMULATION                    ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let start = Utc::now();
    let (bid, ask) = PRICE_PATH[0];
    let mut venue = PaperVenue::new(&cfg, Quote::new(bid, ask));
    venue.sim_time = Some(start);

    let mut engine = SignalLifecycleController::new(&cfg, venue, Box::new(NoopAck));
    engine.sim_time = Some(start);

    let signal = TradeSignal {
        id: format!("sim_{}", start.timestamp()),
        direction: Direction::Long,
        entry: 2350.0,
        stop_loss: 2340.0,
        take_profit1: 2360.0,
        take_profit2: 2370.0,
        timestamp: start.to_rfc3339(),
    };
    info!("Sample signal: {}", signal.summary());

    let outcome = engine.on_signal(signal).await;
    info!("Signal outcome: {:?}", outcome);
    if !outcome.is_accepted() {
        anyhow::bail!("sample signal was not accepted: {:?}", outcome);
    }

    for (step, &(bid, ask)) in PRICE_PATH.iter().enumerate() {
        let now = start + Duration::minutes(step as i64 + 1);
        let quote = Quote::new(bid, ask);

        engine.sim_time = Some(now);
        engine.venue_mut().sim_time = Some(now);
        for event in engine.venue_mut().set_quote(quote) {
            info!("[{}] venue: {:?}", step + 1, event);
        }

        let tick = engine.on_tick(quote).await;
        for event in &tick.events {
            info!("[{}] group: {}", step + 1, serde_json::to_string(event)?);
        }
        for adj in &tick.adjustments {
            info!("[{}] trailing: {}", step + 1, serde_json::to_string(adj)?);
        }
        for e in &tick.errors {
            info!("[{}] venue error: {}", step + 1, e);
        }
        if tick.released {
            info!("[{}] group released at bid {} ask {}", step + 1, bid, ask);
            break;
        }
    }

    let status = engine.status();
    println!();
    println!("{}", serde_json::to_string_pretty(&status)?);

    let history = &engine.venue().trade_history;
    let pnl: f64 = history.iter().map(|p| p.pnl).sum();
    println!();
    for pos in history {
        println!(
            "  {} {} {} -> {:?} ({}) PnL {:+.2}",
            pos.ticket, pos.direction, pos.entry_price, pos.exit_price, pos.status, pos.pnl
        );
    }
    println!("  Total PnL: {:+.2}", pnl);

    Ok(())
}
