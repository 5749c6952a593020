use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::OrderGroupPlan;
use crate::exchange::{ExecutionVenue, OrderRequest, VenueError};
use crate::models::{GroupPhase, OrderGroup, OrderSlot, Ticket, LEG_COUNT};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("leg {leg} placement failed: {source} ({rolled_back} leg(s) rolled back, {rollback_failures} rollback failure(s))")]
    LegFailed {
        leg: usize,
        source: VenueError,
        rolled_back: usize,
        rollback_failures: usize,
    },

    #[error("an order group is already live (phase {0})")]
    GroupAlreadyLive(GroupPhase),
}

/// Slot transitions observed during a tick. Legs are numbered 1 to 3.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    Filled { leg: usize, ticket: Ticket },
    Expired { leg: usize, ticket: Ticket },
    Closed { leg: usize, ticket: Ticket },
    /// Every slot is inactive and the group has been dropped.
    Released { had_fills: bool },
}

#[derive(Debug, Default)]
pub struct TrackerReport {
    pub events: Vec<TrackerEvent>,
    pub errors: Vec<VenueError>,
    pub released: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CancelOutcome {
    pub closed: Vec<Ticket>,
    pub cancelled: Vec<Ticket>,
    #[serde(skip)]
    pub errors: Vec<VenueError>,
}

/// Owns the live order group and moves it through its phases.
pub struct OrderGroupTracker {
    group: Option<OrderGroup>,
    quantity: f64,
    use_pending_orders: bool,
    magic_number: u64,
    slippage_points: u32,
}

impl OrderGroupTracker {
    pub fn new(cfg: &Config) -> Self {
        Self {
            group: None,
            quantity: cfg.quantity_per_leg,
            use_pending_orders: cfg.use_pending_orders,
            magic_number: cfg.magic_number,
            slippage_points: cfg.slippage_points,
        }
    }

    pub fn group(&self) -> Option<&OrderGroup> {
        self.group.as_ref()
    }

    pub fn group_mut(&mut self) -> Option<&mut OrderGroup> {
        self.group.as_mut()
    }

    pub fn phase(&self) -> GroupPhase {
        self.group.as_ref().map_or(GroupPhase::Empty, |g| g.phase)
    }

    /// Places the three legs in order. If a leg fails, the legs already
    /// placed are cancelled (or closed, for immediate execution) before the
    /// error is returned, and no group is recorded.
    pub async fn place_group(
        &mut self,
        plan: &OrderGroupPlan,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<[Ticket; LEG_COUNT], PlacementError> {
        if let Some(group) = &self.group {
            return Err(PlacementError::GroupAlreadyLive(group.phase));
        }

        let signal = &plan.signal;
        let take_profits = plan.take_profits();
        let mut placed: Vec<Ticket> = Vec::with_capacity(LEG_COUNT);

        for (i, &take_profit) in take_profits.iter().enumerate() {
            let leg = i + 1;
            let request = OrderRequest {
                direction: signal.direction,
                quantity: self.quantity,
                entry: signal.entry,
                stop_loss: signal.stop_loss,
                take_profit,
                expiration: plan.expiration,
                comment: format!("TP{} leg", leg),
                magic_number: self.magic_number,
                slippage_points: self.slippage_points,
            };

            let result = if self.use_pending_orders {
                venue.place_pending_order(&request).await
            } else {
                venue.open_position(&request).await
            };

            match result {
                Ok(ticket) => {
                    debug!("Leg {} placed: {} tp={}", leg, ticket, take_profit);
                    placed.push(ticket);
                }
                Err(e) => {
                    error!("Failed to place leg {}: {}", leg, e);
                    let rollback_failures = self.roll_back(&placed, venue).await;
                    return Err(PlacementError::LegFailed {
                        leg,
                        source: e,
                        rolled_back: placed.len() - rollback_failures,
                        rollback_failures,
                    });
                }
            }
        }

        let filled = !self.use_pending_orders;
        let slots = [
            OrderSlot::new(placed[0], take_profits[0], filled),
            OrderSlot::new(placed[1], take_profits[1], filled),
            OrderSlot::new(placed[2], take_profits[2], filled),
        ];
        let group = OrderGroup {
            signal: signal.clone(),
            slots,
            tp3: plan.tp3,
            expiration: plan.expiration,
            phase: GroupPhase::Placed,
        };
        let tickets = group.tickets();
        self.group = Some(group);

        info!(
            "Placed 3 legs: {}, {}, {}",
            tickets[0], tickets[1], tickets[2]
        );
        Ok(tickets)
    }

    async fn roll_back(&self, placed: &[Ticket], venue: &mut dyn ExecutionVenue) -> usize {
        let mut failures = 0;
        for &ticket in placed {
            let result = if self.use_pending_orders {
                venue.cancel_order(ticket).await
            } else {
                venue.close_position(ticket).await
            };
            match result {
                Ok(()) => info!("Rolled back {}", ticket),
                Err(e) => {
                    failures += 1;
                    error!("Rollback of {} failed: {}", ticket, e);
                }
            }
        }
        failures
    }

    /// Detects fills, expirations and closures, then recomputes the phase.
    /// A slot whose venue query fails keeps its state until the next tick.
    pub async fn on_tick(&mut self, venue: &mut dyn ExecutionVenue) -> TrackerReport {
        let mut report = TrackerReport::default();
        let Some(group) = self.group.as_mut() else {
            return report;
        };

        let mut just_filled = [false; LEG_COUNT];

        for (i, slot) in group.slots.iter_mut().enumerate() {
            if !slot.is_pending() {
                continue;
            }
            let leg = i + 1;
            match venue.is_order_pending(slot.ticket).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Leg {} order check failed: {}", leg, e);
                    report.errors.push(e);
                    continue;
                }
            }
            match venue.is_position_open(slot.ticket).await {
                Ok(true) => {
                    slot.filled = true;
                    just_filled[i] = true;
                    info!("Leg {} filled, now a position: {}", leg, slot.ticket);
                    report.events.push(TrackerEvent::Filled { leg, ticket: slot.ticket });
                }
                Ok(false) => {
                    slot.active = false;
                    info!("Leg {} expired or cancelled: {}", leg, slot.ticket);
                    report.events.push(TrackerEvent::Expired { leg, ticket: slot.ticket });
                }
                Err(e) => {
                    warn!("Leg {} position check failed: {}", leg, e);
                    report.errors.push(e);
                }
            }
        }

        for (i, slot) in group.slots.iter_mut().enumerate() {
            if !slot.is_open_position() || just_filled[i] {
                continue;
            }
            let leg = i + 1;
            match venue.is_position_open(slot.ticket).await {
                Ok(true) => {}
                Ok(false) => {
                    slot.active = false;
                    info!("Leg {} position closed: {}", leg, slot.ticket);
                    report.events.push(TrackerEvent::Closed { leg, ticket: slot.ticket });
                }
                Err(e) => {
                    warn!("Leg {} position check failed: {}", leg, e);
                    report.errors.push(e);
                }
            }
        }

        let before = group.phase;
        group.phase = group.derive_phase();
        if group.phase != before {
            info!("Group {} phase: {} -> {}", group.signal.id, before, group.phase);
        }

        if group.phase == GroupPhase::Closed {
            let had_fills = group.any_filled();
            if had_fills {
                info!("All positions closed. Ready for new signal.");
            } else {
                info!("All pending orders expired or cancelled without a fill.");
            }
            report.events.push(TrackerEvent::Released { had_fills });
            report.released = true;
            self.group = None;
        }

        report
    }

    /// Closes open legs and cancels pending ones, then drops the group
    /// whatever the venue answered.
    pub async fn cancel_all(&mut self, venue: &mut dyn ExecutionVenue) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();
        let Some(group) = self.group.take() else {
            return outcome;
        };

        for slot in group.slots.iter().filter(|s| s.active) {
            if slot.filled {
                match venue.close_position(slot.ticket).await {
                    Ok(()) => outcome.closed.push(slot.ticket),
                    Err(e) => {
                        error!("Failed to close {}: {}", slot.ticket, e);
                        outcome.errors.push(e);
                    }
                }
            } else {
                match venue.cancel_order(slot.ticket).await {
                    Ok(()) => outcome.cancelled.push(slot.ticket),
                    Err(e) => {
                        error!("Failed to cancel {}: {}", slot.ticket, e);
                        outcome.errors.push(e);
                    }
                }
            }
        }

        info!(
            "All positions and orders closed/cancelled manually ({} closed, {} cancelled, {} errors)",
            outcome.closed.len(),
            outcome.cancelled.len(),
            outcome.errors.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::core::OrderGroupPlanner;
    use crate::exchange::PaperVenue;
    use crate::models::Quote;
    use crate::test_helpers::{default_test_config, long_signal, short_signal};

    fn plan_for(cfg: &Config, signal: &crate::models::TradeSignal) -> OrderGroupPlan {
        OrderGroupPlanner::new(cfg).plan(signal, 1.0, Utc::now())
    }

    fn venue() -> PaperVenue {
        PaperVenue::with_increment(1.0, Quote::new(101.0, 101.5))
    }

    #[tokio::test]
    async fn places_three_pending_legs() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();

        let tickets = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        let group = tracker.group().unwrap();
        assert_eq!(group.phase, GroupPhase::Placed);
        assert!(group.slots.iter().all(|s| s.active && !s.filled));
        assert_eq!(group.slots[2].take_profit, 107.0);
        assert_eq!(venue.pending_orders().count(), 3);
        assert_eq!(tickets, group.tickets());
    }

    #[tokio::test]
    async fn immediate_legs_are_filled_from_the_start() {
        let mut cfg = default_test_config();
        cfg.use_pending_orders = false;
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();

        tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        // Every placement starts out Placed; the first tick sees the fills.
        assert_eq!(tracker.phase(), GroupPhase::Placed);
        assert!(tracker.group().unwrap().slots.iter().all(|s| s.filled));
        assert_eq!(venue.open_positions().count(), 3);

        let report = tracker.on_tick(&mut venue).await;
        assert!(report.events.is_empty());
        assert_eq!(tracker.phase(), GroupPhase::Filled);
    }

    #[tokio::test]
    async fn third_leg_failure_rolls_back_first_two() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        venue.reject_placement(3);

        let err = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlacementError::LegFailed { leg: 3, rolled_back: 2, rollback_failures: 0, .. }
        ));
        assert_eq!(tracker.phase(), GroupPhase::Empty);
        assert_eq!(venue.open_ticket_count(), 0);
    }

    #[tokio::test]
    async fn failed_rollback_is_counted_and_keeps_leg_error() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        venue.reject_placement(3);
        venue.reject_cancellation(1);

        let err = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap_err();

        match err {
            PlacementError::LegFailed { leg, source, rolled_back, rollback_failures } => {
                assert_eq!(leg, 3);
                assert!(matches!(source, VenueError::Rejected { .. }));
                assert_eq!(rolled_back, 1);
                assert_eq!(rollback_failures, 1);
            }
            other => panic!("expected leg failure, got {:?}", other),
        }
        assert_eq!(tracker.phase(), GroupPhase::Empty);
        // Leg 1 could not be cancelled and is left at the venue.
        let orphans: Vec<Ticket> = venue.pending_orders().map(|o| o.ticket).collect();
        assert_eq!(orphans, vec![Ticket(1000)]);
    }

    #[tokio::test]
    async fn immediate_mode_rollback_closes_positions() {
        let mut cfg = default_test_config();
        cfg.use_pending_orders = false;
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        venue.reject_placement(2);

        let err = tracker
            .place_group(&plan_for(&cfg, &short_signal("a")), &mut venue)
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::LegFailed { leg: 2, rolled_back: 1, .. }));
        assert_eq!(venue.open_ticket_count(), 0);
        assert_eq!(venue.trade_history.len(), 1);
    }

    #[tokio::test]
    async fn refuses_second_group() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        let plan = plan_for(&cfg, &long_signal("a"));
        tracker.place_group(&plan, &mut venue).await.unwrap();

        let err = tracker.place_group(&plan, &mut venue).await.unwrap_err();
        assert_eq!(err, PlacementError::GroupAlreadyLive(GroupPhase::Placed));
        assert_eq!(venue.pending_orders().count(), 3);
    }

    #[tokio::test]
    async fn fills_are_reported_in_leg_order() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        let tickets = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        venue.fill_order(tickets[2]);
        venue.fill_order(tickets[0]);
        let report = tracker.on_tick(&mut venue).await;

        assert_eq!(
            report.events,
            vec![
                TrackerEvent::Filled { leg: 1, ticket: tickets[0] },
                TrackerEvent::Filled { leg: 3, ticket: tickets[2] },
            ]
        );
        assert_eq!(tracker.phase(), GroupPhase::PartiallyFilled);

        venue.fill_order(tickets[1]);
        tracker.on_tick(&mut venue).await;
        assert_eq!(tracker.phase(), GroupPhase::Filled);
    }

    #[tokio::test]
    async fn all_expired_without_fill_releases_group() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        let tickets = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        for t in tickets {
            venue.expire_order(t);
        }
        let report = tracker.on_tick(&mut venue).await;

        assert!(report.released);
        assert_eq!(report.events.last(), Some(&TrackerEvent::Released { had_fills: false }));
        assert_eq!(tracker.phase(), GroupPhase::Empty);
    }

    #[tokio::test]
    async fn partial_fill_then_everything_closes() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        let tickets = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        venue.fill_order(tickets[0]);
        venue.expire_order(tickets[1]);
        venue.expire_order(tickets[2]);
        let report = tracker.on_tick(&mut venue).await;
        assert!(!report.released);
        assert_eq!(tracker.phase(), GroupPhase::PartiallyFilled);

        venue.stop_out(tickets[0]);
        let report = tracker.on_tick(&mut venue).await;
        assert_eq!(
            report.events,
            vec![
                TrackerEvent::Closed { leg: 1, ticket: tickets[0] },
                TrackerEvent::Released { had_fills: true },
            ]
        );
        assert_eq!(tracker.phase(), GroupPhase::Empty);
    }

    #[tokio::test]
    async fn venue_outage_preserves_state() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();

        venue.set_unreachable(true);
        let report = tracker.on_tick(&mut venue).await;

        assert_eq!(report.errors.len(), 3);
        assert!(report.events.is_empty());
        let group = tracker.group().unwrap();
        assert!(group.slots.iter().all(|s| s.active && !s.filled));
    }

    #[tokio::test]
    async fn cancel_all_closes_positions_and_cancels_orders() {
        let cfg = default_test_config();
        let mut tracker = OrderGroupTracker::new(&cfg);
        let mut venue = venue();
        let tickets = tracker
            .place_group(&plan_for(&cfg, &long_signal("a")), &mut venue)
            .await
            .unwrap();
        venue.fill_order(tickets[0]);
        tracker.on_tick(&mut venue).await;

        let outcome = tracker.cancel_all(&mut venue).await;

        assert_eq!(outcome.closed, vec![tickets[0]]);
        assert_eq!(outcome.cancelled, vec![tickets[1], tickets[2]]);
        assert!(outcome.errors.is_empty());
        assert_eq!(tracker.phase(), GroupPhase::Empty);
        assert_eq!(venue.open_ticket_count(), 0);
    }
}
