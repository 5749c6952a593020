use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use scaleout_engine::config::Config;
use scaleout_engine::exchange::{PaperVenue, QuoteFeed};
use scaleout_engine::models::Quote;
use scaleout_engine::signals::{SignalAck, SignalSource};
use scaleout_engine::trading::{SignalLifecycleController, SignalOutcome, TickOutcome};

pub struct ScaleOutBot {
    controller: SignalLifecycleController<PaperVenue>,
    source: Option<Box<dyn SignalSource>>,
    feed: Box<dyn QuoteFeed>,

    tick_interval: Duration,
    signal_check_interval: Duration,
    last_signal_check: Option<Instant>,
}

impl ScaleOutBot {
    pub async fn new(
        cfg: &Config,
        mut feed: Box<dyn QuoteFeed>,
        source: Option<Box<dyn SignalSource>>,
        ack: Box<dyn SignalAck>,
    ) -> Result<Self> {
        info!("{}", "=".repeat(60));
        info!("Scale-out order engine starting up");
        info!("Symbol: {}", cfg.symbol);
        info!("Order mode: {}", cfg.order_mode());
        info!("Lot size per leg: {}", cfg.quantity_per_leg);
        info!("Magic number: {}", cfg.magic_number);
        info!("TP3 offset: {} increments", cfg.tp3_offset);
        if cfg.use_pending_orders {
            if cfg.order_expiration_hours > 0 {
                info!("Order expiration: {} hours", cfg.order_expiration_hours);
            } else {
                info!("Order expiration: none");
            }
        }
        info!(
            "Trailing stops: {}",
            if cfg.enable_trailing_stops { "enabled" } else { "disabled" }
        );
        match &source {
            Some(_) => info!("Signal source: webhook {}", cfg.webhook_get_url),
            None => warn!("Webhook mode disabled, no signals will be received"),
        }
        info!("{}", "=".repeat(60));

        let quote = feed.get_quote().await?;
        let venue = PaperVenue::new(cfg, quote);
        let controller = SignalLifecycleController::new(cfg, venue, ack);

        Ok(Self {
            controller,
            source,
            feed,
            tick_interval: Duration::from_secs(cfg.tick_interval_secs),
            signal_check_interval: Duration::from_secs(cfg.signal_check_interval_secs),
            last_signal_check: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Engine is now running. Press Ctrl+C to stop.");
        self.print_status();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown();
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        match self.feed.get_quote().await {
            Ok(quote) => self.on_quote(quote).await,
            Err(e) => warn!("Quote refresh failed: {:#}", e),
        }

        let due = self
            .last_signal_check
            .map_or(true, |t| t.elapsed() >= self.signal_check_interval);
        if due && self.controller.is_idle() {
            self.check_for_signal().await;
            self.last_signal_check = Some(Instant::now());
        }

        tokio::time::sleep(self.tick_interval).await;
    }

    async fn on_quote(&mut self, quote: Quote) {
        for event in self.controller.venue_mut().set_quote(quote) {
            debug!("Venue: {:?}", event);
        }

        let outcome = self.controller.on_tick(quote).await;
        log_tick(&outcome);
        if outcome.released {
            self.print_status();
        }
    }

    async fn check_for_signal(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };

        let signal = match source.poll().await {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(e) => {
                warn!("Signal poll failed: {:#}", e);
                return;
            }
        };

        info!("Received {}", signal.summary());
        match self.controller.on_signal(signal).await {
            SignalOutcome::Accepted { id, tickets } => {
                info!(
                    "Signal {} live with tickets {}, {}, {}",
                    id, tickets[0], tickets[1], tickets[2]
                );
                self.print_status();
            }
            SignalOutcome::Busy | SignalOutcome::Duplicate => {}
            SignalOutcome::Rejected(e) => warn!("Signal rejected: {}", e),
            SignalOutcome::PlacementFailed(e) => error!("Signal placement failed: {}", e),
            SignalOutcome::VenueUnavailable(e) => error!("Venue unavailable: {}", e),
        }
    }

    fn print_status(&self) {
        let status = self.controller.status();
        info!(
            "State: {} | Phase: {} | Last signal: {}",
            status.state,
            status.phase,
            status.last_processed_id.as_deref().unwrap_or("-")
        );
        for (i, slot) in status.slots.iter().enumerate() {
            info!(
                "  Leg {}: {} tp={} active={} filled={} be={} tp1_lock={}",
                i + 1,
                slot.ticket,
                slot.take_profit,
                slot.active,
                slot.filled,
                slot.sl_moved_to_entry,
                slot.sl_moved_to_tp1
            );
        }
        let pnl: f64 = self.controller.venue().trade_history.iter().map(|p| p.pnl).sum();
        info!(
            "Closed trades: {} | PnL: {:+.2}",
            self.controller.venue().trade_history.len(),
            pnl
        );
    }

    fn shutdown(&self) {
        info!("Shutting down...");
        if !self.controller.is_idle() {
            warn!("Order group still live; orders and positions are left at the venue");
        }
        self.print_status();
        info!("Engine stopped.");
    }
}

fn log_tick(outcome: &TickOutcome) {
    for event in &outcome.events {
        debug!("Tracker: {:?}", event);
    }
    for adj in &outcome.adjustments {
        debug!("Trailing: {:?}", adj);
    }
    for e in &outcome.errors {
        warn!("Venue error during tick: {}", e);
    }
}
