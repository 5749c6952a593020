use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::exchange::{ExecutionVenue, VenueError};
use crate::models::{Direction, OrderGroup, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTarget {
    Breakeven,
    Tp1,
}

impl fmt::Display for StopTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopTarget::Breakeven => write!(f, "breakeven"),
            StopTarget::Tp1 => write!(f, "tp1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SlChange {
    /// Already at the target, or the target would loosen the stop.
    Unchanged { current: f64 },
    Moved { from: f64, to: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopAdjustment {
    pub leg: usize,
    pub ticket: Ticket,
    pub target: StopTarget,
    pub change: SlChange,
}

#[derive(Debug, Default)]
pub struct TrailReport {
    pub adjustments: Vec<StopAdjustment>,
    pub errors: Vec<VenueError>,
}

/// Ratchets the stops of legs 2 and 3 as price passes the signal's targets:
/// TP1 moves both to entry, TP2 moves leg 3 to TP1. Stops only ever tighten.
pub struct TrailingStopEngine {
    price_epsilon: f64,
}

impl TrailingStopEngine {
    pub fn new(price_epsilon: f64) -> Self {
        Self { price_epsilon }
    }

    /// Moves a position's stop to `new_sl` unless it is already there or the
    /// move would loosen it; both of those count as success.
    pub async fn modify_stop_loss(
        &self,
        venue: &mut dyn ExecutionVenue,
        ticket: Ticket,
        direction: Direction,
        new_sl: f64,
    ) -> Result<SlChange, VenueError> {
        let current = venue.position_stop_loss(ticket).await?;

        if (current - new_sl).abs() < self.price_epsilon {
            return Ok(SlChange::Unchanged { current });
        }
        if !direction.is_beyond(new_sl, current) {
            debug!(
                "{} stop {} already tighter than {}, leaving it",
                ticket, current, new_sl
            );
            return Ok(SlChange::Unchanged { current });
        }

        venue.modify_stop_loss(ticket, new_sl).await?;
        Ok(SlChange::Moved { from: current, to: new_sl })
    }

    /// Applies whichever ratchets `price` has triggered. Triggers are level
    /// based, so a failed modification is tried again on the next call while
    /// price stays past the level.
    pub async fn apply(
        &self,
        group: &mut OrderGroup,
        price: f64,
        venue: &mut dyn ExecutionVenue,
    ) -> TrailReport {
        let mut report = TrailReport::default();
        let direction = group.signal.direction;
        let entry = group.signal.entry;
        let tp1 = group.signal.take_profit1;
        let tp2 = group.signal.take_profit2;

        if direction.reached(price, tp1)
            && !group.slots[1].sl_moved_to_entry
            && !group.slots[2].sl_moved_to_entry
        {
            for idx in [1, 2] {
                let slot = &mut group.slots[idx];
                if !slot.is_open_position() {
                    continue;
                }
                let leg = idx + 1;
                match self.modify_stop_loss(venue, slot.ticket, direction, entry).await {
                    Ok(change) => {
                        slot.sl_moved_to_entry = true;
                        info!(
                            "{}: moved SL to breakeven for leg {} ({})",
                            direction.order_label(),
                            leg,
                            slot.ticket
                        );
                        report.adjustments.push(StopAdjustment {
                            leg,
                            ticket: slot.ticket,
                            target: StopTarget::Breakeven,
                            change,
                        });
                    }
                    Err(e) => {
                        warn!("Breakeven move for leg {} failed: {}", leg, e);
                        report.errors.push(e);
                    }
                }
            }
        }

        if direction.reached(price, tp2) && !group.slots[2].sl_moved_to_tp1 {
            let slot = &mut group.slots[2];
            if slot.is_open_position() {
                match self.modify_stop_loss(venue, slot.ticket, direction, tp1).await {
                    Ok(change) => {
                        slot.sl_moved_to_tp1 = true;
                        info!(
                            "{}: moved SL to TP1 for leg 3 ({})",
                            direction.order_label(),
                            slot.ticket
                        );
                        report.adjustments.push(StopAdjustment {
                            leg: 3,
                            ticket: slot.ticket,
                            target: StopTarget::Tp1,
                            change,
                        });
                    }
                    Err(e) => {
                        warn!("TP1 move for leg 3 failed: {}", e);
                        report.errors.push(e);
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::OrderGroupPlanner;
    use crate::exchange::PaperVenue;
    use crate::models::{Quote, TradeSignal};
    use crate::test_helpers::{default_test_config, long_signal, short_signal};
    use crate::trading::tracker::OrderGroupTracker;
    use chrono::Utc;

    /// Places a group and fills every leg.
    async fn filled_group(cfg: &Config, signal: TradeSignal) -> (OrderGroupTracker, PaperVenue) {
        let mut venue = PaperVenue::with_increment(1.0, Quote::new(100.0, 100.0));
        let mut tracker = OrderGroupTracker::new(cfg);
        let plan = OrderGroupPlanner::new(cfg).plan(&signal, 1.0, Utc::now());
        let tickets = tracker.place_group(&plan, &mut venue).await.unwrap();
        for t in tickets {
            venue.fill_order(t);
        }
        tracker.on_tick(&mut venue).await;
        (tracker, venue)
    }

    #[tokio::test]
    async fn tp1_moves_legs_two_and_three_to_entry() {
        let cfg = default_test_config();
        let (mut tracker, mut venue) = filled_group(&cfg, long_signal("a")).await;
        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();
        let tickets = group.tickets();

        let report = engine.apply(group, 106.0, &mut venue).await;

        assert_eq!(report.adjustments.len(), 2);
        assert!(group.slots[1].sl_moved_to_entry && group.slots[2].sl_moved_to_entry);
        assert!(!group.slots[0].sl_moved_to_entry);
        assert_eq!(venue.position(tickets[0]).unwrap().stop_loss, 95.0);
        assert_eq!(venue.position(tickets[1]).unwrap().stop_loss, 100.0);
        assert_eq!(venue.position(tickets[2]).unwrap().stop_loss, 100.0);
    }

    #[tokio::test]
    async fn tp2_moves_leg_three_to_tp1() {
        let cfg = default_test_config();
        let (mut tracker, mut venue) = filled_group(&cfg, long_signal("a")).await;
        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();
        let tickets = group.tickets();

        engine.apply(group, 106.0, &mut venue).await;
        let report = engine.apply(group, 111.0, &mut venue).await;

        assert_eq!(report.adjustments.len(), 1);
        assert_eq!(report.adjustments[0].target, StopTarget::Tp1);
        assert!(group.slots[2].sl_moved_to_tp1);
        assert_eq!(venue.position(tickets[2]).unwrap().stop_loss, 105.0);
        assert_eq!(venue.position(tickets[1]).unwrap().stop_loss, 100.0);
    }

    #[tokio::test]
    async fn short_ratchets_mirror_long() {
        let cfg = default_test_config();
        let (mut tracker, mut venue) = filled_group(&cfg, short_signal("s")).await;
        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();
        let tickets = group.tickets();

        let report = engine.apply(group, 96.0, &mut venue).await;
        assert!(report.adjustments.is_empty());

        engine.apply(group, 89.0, &mut venue).await;
        assert_eq!(venue.position(tickets[1]).unwrap().stop_loss, 100.0);
        assert_eq!(venue.position(tickets[2]).unwrap().stop_loss, 95.0);
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_reissue_modifications() {
        let cfg = default_test_config();
        let (mut tracker, mut venue) = filled_group(&cfg, long_signal("a")).await;
        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();

        engine.apply(group, 106.0, &mut venue).await;
        let calls = venue.modify_calls;
        for _ in 0..5 {
            let report = engine.apply(group, 107.0, &mut venue).await;
            assert!(report.adjustments.is_empty());
        }
        assert_eq!(venue.modify_calls, calls);
    }

    #[tokio::test]
    async fn failed_modification_is_retried_next_tick() {
        let cfg = default_test_config();
        let (mut tracker, mut venue) = filled_group(&cfg, long_signal("a")).await;
        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();

        venue.reject_modifications(true);
        let report = engine.apply(group, 106.0, &mut venue).await;
        assert_eq!(report.errors.len(), 2);
        assert!(!group.slots[1].sl_moved_to_entry);

        venue.reject_modifications(false);
        let report = engine.apply(group, 106.0, &mut venue).await;
        assert_eq!(report.adjustments.len(), 2);
        assert!(group.slots[1].sl_moved_to_entry);
    }

    #[tokio::test]
    async fn guard_never_loosens_a_stop() {
        let cfg = default_test_config();
        let (tracker, mut venue) = filled_group(&cfg, long_signal("a")).await;
        let engine = TrailingStopEngine::new(1.0);
        let ticket = tracker.group().unwrap().slots[2].ticket;

        venue.modify_stop_loss(ticket, 104.0).await.unwrap();
        let calls = venue.modify_calls;
        let change = engine
            .modify_stop_loss(&mut venue, ticket, Direction::Long, 100.0)
            .await
            .unwrap();

        assert_eq!(change, SlChange::Unchanged { current: 104.0 });
        assert_eq!(venue.position(ticket).unwrap().stop_loss, 104.0);
        assert_eq!(venue.modify_calls, calls);
    }

    #[tokio::test]
    async fn guard_treats_sub_increment_difference_as_done() {
        let cfg = default_test_config();
        let (tracker, mut venue) = filled_group(&cfg, short_signal("s")).await;
        let engine = TrailingStopEngine::new(1.0);
        let ticket = tracker.group().unwrap().slots[1].ticket;

        let change = engine
            .modify_stop_loss(&mut venue, ticket, Direction::Short, 104.5)
            .await
            .unwrap();
        assert_eq!(change, SlChange::Unchanged { current: 105.0 });
    }

    #[tokio::test]
    async fn unfilled_legs_are_skipped() {
        let cfg = default_test_config();
        let mut venue = PaperVenue::with_increment(1.0, Quote::new(101.0, 101.0));
        let mut tracker = OrderGroupTracker::new(&cfg);
        let plan = OrderGroupPlanner::new(&cfg).plan(&long_signal("a"), 1.0, Utc::now());
        let tickets = tracker.place_group(&plan, &mut venue).await.unwrap();
        venue.fill_order(tickets[2]);
        tracker.on_tick(&mut venue).await;

        let engine = TrailingStopEngine::new(1.0);
        let group = tracker.group_mut().unwrap();
        let report = engine.apply(group, 106.0, &mut venue).await;

        assert_eq!(report.adjustments.len(), 1);
        assert_eq!(report.adjustments[0].leg, 3);
        assert!(!group.slots[1].sl_moved_to_entry);
    }
}
