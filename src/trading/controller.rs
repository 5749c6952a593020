use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::{validate, OrderGroupPlanner, ValidationError};
use crate::exchange::{ExecutionVenue, VenueError};
use crate::models::{
    GroupPhase, LifecycleState, OrderGroupSnapshot, Quote, Ticket, TradeSignal, LEG_COUNT,
};
use crate::signals::SignalAck;
use crate::trading::tracker::{CancelOutcome, OrderGroupTracker, PlacementError, TrackerEvent};
use crate::trading::trailing::{StopAdjustment, TrailingStopEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Accepted { id: String, tickets: [Ticket; LEG_COUNT] },
    /// A group is already live; the signal was ignored.
    Busy,
    /// Same id as the last signal that produced a group.
    Duplicate,
    Rejected(ValidationError),
    PlacementFailed(PlacementError),
    /// The market price could not be read, so the signal was not evaluated.
    VenueUnavailable(VenueError),
}

impl SignalOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SignalOutcome::Accepted { .. })
    }
}

#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<TrackerEvent>,
    pub adjustments: Vec<StopAdjustment>,
    pub errors: Vec<VenueError>,
    /// The group finished and the engine is idle again.
    pub released: bool,
}

impl TickOutcome {
    pub fn is_quiet(&self) -> bool {
        self.events.is_empty() && self.adjustments.is_empty() && self.errors.is_empty()
    }
}

/// Process-wide state: lifecycle plus the single-slot dedup ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub lifecycle: LifecycleState,
    pub last_processed_id: Option<String>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::Idle,
            last_processed_id: None,
        }
    }
}

/// Turns signals into order groups and drives the live group on each tick.
/// Events are handled one at a time through `&mut self`; wrap the controller
/// in a single mutex or actor if it is ever shared between tasks.
pub struct SignalLifecycleController<V: ExecutionVenue> {
    venue: V,
    ack: Box<dyn SignalAck>,
    planner: OrderGroupPlanner,
    tracker: OrderGroupTracker,
    trailing: TrailingStopEngine,
    use_pending_orders: bool,
    enable_trailing_stops: bool,
    state: EngineState,
    /// When set, used instead of Utc::now() for planning (simulation)
    pub sim_time: Option<DateTime<Utc>>,
}

impl<V: ExecutionVenue> SignalLifecycleController<V> {
    pub fn new(cfg: &Config, venue: V, ack: Box<dyn SignalAck>) -> Self {
        let trailing = TrailingStopEngine::new(venue.price_increment());
        Self {
            venue,
            ack,
            planner: OrderGroupPlanner::new(cfg),
            tracker: OrderGroupTracker::new(cfg),
            trailing,
            use_pending_orders: cfg.use_pending_orders,
            enable_trailing_stops: cfg.enable_trailing_stops,
            state: EngineState::default(),
            sim_time: None,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.sim_time.unwrap_or_else(Utc::now)
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.lifecycle == LifecycleState::Idle
    }

    pub async fn on_signal(&mut self, signal: TradeSignal) -> SignalOutcome {
        if self.state.lifecycle == LifecycleState::GroupActive {
            debug!("Signal {} ignored: a group is already live", signal.id);
            return SignalOutcome::Busy;
        }
        if self.state.last_processed_id.as_deref() == Some(signal.id.as_str()) {
            info!("Signal {} already processed", signal.id);
            return SignalOutcome::Duplicate;
        }

        let side = signal.direction.entry_side();
        let market = match self.venue.current_price(side).await {
            Ok(p) => p,
            Err(e) => {
                error!("Cannot read {} price for signal {}: {}", side, signal.id, e);
                return SignalOutcome::VenueUnavailable(e);
            }
        };

        if let Err(e) = validate(&signal, market, self.use_pending_orders) {
            warn!("Invalid signal {}: {}", signal.id, e);
            return SignalOutcome::Rejected(e);
        }

        let plan = self
            .planner
            .plan(&signal, self.venue.price_increment(), self.now());
        info!(
            "Processing new {} signal (ID: {}): {} orders at {} sl={} tp1={} tp2={} tp3={}",
            signal.direction.order_label(),
            signal.id,
            if self.use_pending_orders { "LIMIT" } else { "MARKET" },
            signal.entry,
            signal.stop_loss,
            signal.take_profit1,
            signal.take_profit2,
            plan.tp3
        );

        match self.tracker.place_group(&plan, &mut self.venue).await {
            Ok(tickets) => {
                self.state.last_processed_id = Some(signal.id.clone());
                self.state.lifecycle = LifecycleState::GroupActive;
                info!("Signal {} processed successfully", signal.id);

                if let Err(e) = self.ack.acknowledge(&signal).await {
                    warn!("Signal update for {} failed: {:#}", signal.id, e);
                }

                SignalOutcome::Accepted {
                    id: signal.id,
                    tickets,
                }
            }
            Err(e) => {
                error!("Failed to process signal {}: {}", signal.id, e);
                SignalOutcome::PlacementFailed(e)
            }
        }
    }

    /// Advances the live group against `quote`. Long groups are marked at
    /// the bid and short groups at the ask.
    pub async fn on_tick(&mut self, quote: Quote) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state.lifecycle == LifecycleState::Idle {
            return outcome;
        }

        let report = self.tracker.on_tick(&mut self.venue).await;
        outcome.events = report.events;
        outcome.errors = report.errors;

        if report.released || self.tracker.phase() == GroupPhase::Empty {
            self.state.lifecycle = LifecycleState::Idle;
            outcome.released = true;
            info!("Order group released. Ready for new signal.");
            return outcome;
        }

        if !self.enable_trailing_stops {
            return outcome;
        }
        if let Some(group) = self.tracker.group_mut() {
            if group.any_filled() {
                let price = quote.price(group.signal.direction.exit_side());
                let trail = self.trailing.apply(group, price, &mut self.venue).await;
                outcome.adjustments = trail.adjustments;
                outcome.errors.extend(trail.errors);
            }
        }

        outcome
    }

    /// Manual intervention: flattens the live group and returns to idle.
    /// The dedup ledger is kept.
    pub async fn cancel_all(&mut self) -> CancelOutcome {
        let outcome = self.tracker.cancel_all(&mut self.venue).await;
        self.state.lifecycle = LifecycleState::Idle;
        outcome
    }

    pub fn status(&self) -> OrderGroupSnapshot {
        let group = self.tracker.group();
        OrderGroupSnapshot {
            state: self.state.lifecycle,
            phase: self.tracker.phase(),
            signal_id: group.map(|g| g.signal.id.clone()),
            direction: group.map(|g| g.signal.direction),
            tp3: group.map(|g| g.tp3),
            expiration: group.and_then(|g| g.expiration),
            slots: group.map(|g| g.slots.to_vec()).unwrap_or_default(),
            last_processed_id: self.state.last_processed_id.clone(),
        }
    }
}
