use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::TradeSignal;

pub const LEG_COUNT: usize = 3;

/// Opaque venue identifier for an order. A pending order keeps the same
/// ticket once it turns into a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPhase {
    Empty,
    Placed,
    PartiallyFilled,
    Filled,
    Closed,
}

impl fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupPhase::Empty => write!(f, "empty"),
            GroupPhase::Placed => write!(f, "placed"),
            GroupPhase::PartiallyFilled => write!(f, "partially_filled"),
            GroupPhase::Filled => write!(f, "filled"),
            GroupPhase::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    GroupActive,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::GroupActive => write!(f, "group_active"),
        }
    }
}

/// One leg of the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSlot {
    pub ticket: Ticket,
    pub take_profit: f64,
    pub active: bool,
    /// The pending order has turned into a position.
    pub filled: bool,
    pub sl_moved_to_entry: bool,
    pub sl_moved_to_tp1: bool,
}

impl OrderSlot {
    pub fn new(ticket: Ticket, take_profit: f64, filled: bool) -> Self {
        Self {
            ticket,
            take_profit,
            active: true,
            filled,
            sl_moved_to_entry: false,
            sl_moved_to_tp1: false,
        }
    }

    pub fn is_open_position(&self) -> bool {
        self.active && self.filled
    }

    pub fn is_pending(&self) -> bool {
        self.active && !self.filled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub signal: TradeSignal,
    pub slots: [OrderSlot; LEG_COUNT],
    pub tp3: f64,
    pub expiration: Option<DateTime<Utc>>,
    pub phase: GroupPhase,
}

impl OrderGroup {
    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.filled).count()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn any_filled(&self) -> bool {
        self.slots.iter().any(|s| s.filled)
    }

    pub fn tickets(&self) -> [Ticket; LEG_COUNT] {
        [self.slots[0].ticket, self.slots[1].ticket, self.slots[2].ticket]
    }

    /// Phase implied by the slot flags. `Empty` is never returned here: a
    /// group with no active slots is `Closed` and is released by the tracker.
    pub fn derive_phase(&self) -> GroupPhase {
        if self.active_count() == 0 {
            return GroupPhase::Closed;
        }
        match self.filled_count() {
            0 => GroupPhase::Placed,
            LEG_COUNT => GroupPhase::Filled,
            _ => GroupPhase::PartiallyFilled,
        }
    }
}

/// Read-only view of the engine for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGroupSnapshot {
    pub state: LifecycleState,
    pub phase: GroupPhase,
    pub signal_id: Option<String>,
    pub direction: Option<crate::models::Direction>,
    pub tp3: Option<f64>,
    pub expiration: Option<DateTime<Utc>>,
    pub slots: Vec<OrderSlot>,
    pub last_processed_id: Option<String>,
}

impl OrderGroupSnapshot {
    pub fn has_active_group(&self) -> bool {
        self.phase != GroupPhase::Empty
    }
}
