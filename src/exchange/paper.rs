use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::config::Config;
use crate::exchange::{ExecutionVenue, OrderRequest, VenueError};
use crate::models::{Direction, Quote, Side, Ticket};

const FIRST_TICKET: u64 = 1000;
const RETCODE_REJECTED: u32 = 10006;
const RETCODE_INVALID_STOPS: u32 = 10016;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    ClosedTp,
    ClosedSl,
    ClosedManual,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "open"),
            PositionStatus::ClosedTp => write!(f, "closed_tp"),
            PositionStatus::ClosedSl => write!(f, "closed_sl"),
            PositionStatus::ClosedManual => write!(f, "closed_manual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub ticket: Ticket,
    pub direction: Direction,
    pub quantity: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub expiration: Option<DateTime<Utc>>,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    pub ticket: Ticket,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: String,
    pub status: PositionStatus,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<String>,
    #[serde(default)]
    pub pnl: f64,
}

/// What happened to the book on a price update.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperEvent {
    OrderFilled { ticket: Ticket, price: f64 },
    OrderExpired { ticket: Ticket },
    PositionClosed { ticket: Ticket, status: PositionStatus, price: f64, pnl: f64 },
}

/// In-memory venue. Pending orders fill when the market trades through
/// their entry, and positions exit on their stop-loss or take-profit.
/// Tickets are shared between an order and the position it turns into.
pub struct PaperVenue {
    quote: Quote,
    price_increment: f64,
    orders: BTreeMap<Ticket, PaperOrder>,
    positions: BTreeMap<Ticket, PaperPosition>,
    pub trade_history: Vec<PaperPosition>,
    next_ticket: u64,
    /// When set, used instead of Utc::now() for timestamps and expirations
    pub sim_time: Option<DateTime<Utc>>,

    placement_count: usize,
    rejected_placements: HashSet<usize>,
    cancellation_count: usize,
    rejected_cancellations: HashSet<usize>,
    reject_modifications: bool,
    unreachable: bool,
    pub modify_calls: usize,
}

impl PaperVenue {
    pub fn new(cfg: &Config, quote: Quote) -> Self {
        Self::with_increment(cfg.price_increment, quote)
    }

    pub fn with_increment(price_increment: f64, quote: Quote) -> Self {
        Self {
            quote,
            price_increment,
            orders: BTreeMap::new(),
            positions: BTreeMap::new(),
            trade_history: Vec::new(),
            next_ticket: FIRST_TICKET,
            sim_time: None,
            placement_count: 0,
            rejected_placements: HashSet::new(),
            cancellation_count: 0,
            rejected_cancellations: HashSet::new(),
            reject_modifications: false,
            unreachable: false,
            modify_calls: 0,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.sim_time.unwrap_or_else(Utc::now)
    }

    /// Reject the `n`-th placement call from now on (1 = the next one).
    pub fn reject_placement(&mut self, n: usize) {
        self.rejected_placements.insert(self.placement_count + n);
    }

    /// Reject the `n`-th cancel or close call from now on (1 = the next one).
    pub fn reject_cancellation(&mut self, n: usize) {
        self.rejected_cancellations.insert(self.cancellation_count + n);
    }

    pub fn reject_modifications(&mut self, reject: bool) {
        self.reject_modifications = reject;
    }

    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &PaperOrder> {
        self.orders.values()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &PaperPosition> {
        self.positions.values()
    }

    pub fn position(&self, ticket: Ticket) -> Option<&PaperPosition> {
        self.positions.get(&ticket)
    }

    /// Number of live tickets (pending orders plus open positions).
    pub fn open_ticket_count(&self) -> usize {
        self.orders.len() + self.positions.len()
    }

    /// Force a pending order into a position at its entry price, regardless
    /// of the current quote.
    pub fn fill_order(&mut self, ticket: Ticket) -> bool {
        match self.orders.remove(&ticket) {
            Some(order) => {
                let price = order.entry;
                self.open_from_order(order, price);
                true
            }
            None => false,
        }
    }

    /// Remove a pending order as if the venue expired it.
    pub fn expire_order(&mut self, ticket: Ticket) -> bool {
        self.orders.remove(&ticket).is_some()
    }

    /// Close a position at the current exit price as if its stop was hit.
    pub fn stop_out(&mut self, ticket: Ticket) -> Option<f64> {
        let pos = self.positions.get(&ticket)?;
        let price = self.quote.price(pos.direction.exit_side());
        Some(self.settle(ticket, price, PositionStatus::ClosedSl))
    }

    /// Move the market and run the book against the new prices.
    pub fn set_quote(&mut self, quote: Quote) -> Vec<PaperEvent> {
        self.quote = quote;
        let mut events = Vec::new();
        let now = self.now();

        let expired: Vec<Ticket> = self
            .orders
            .values()
            .filter(|o| o.expiration.map_or(false, |exp| now >= exp))
            .map(|o| o.ticket)
            .collect();
        for ticket in expired {
            self.orders.remove(&ticket);
            debug!("Paper order {} expired", ticket);
            events.push(PaperEvent::OrderExpired { ticket });
        }

        let triggered: Vec<Ticket> = self
            .orders
            .values()
            .filter(|o| match o.direction {
                Direction::Long => quote.ask <= o.entry,
                Direction::Short => quote.bid >= o.entry,
            })
            .map(|o| o.ticket)
            .collect();
        for ticket in triggered {
            if let Some(order) = self.orders.remove(&ticket) {
                let price = order.entry;
                self.open_from_order(order, price);
                events.push(PaperEvent::OrderFilled { ticket, price });
            }
        }

        let exits: Vec<(Ticket, f64, PositionStatus)> = self
            .positions
            .values()
            .filter_map(|p| {
                let mark = quote.price(p.direction.exit_side());
                let hit_sl = match p.direction {
                    Direction::Long => mark <= p.stop_loss,
                    Direction::Short => mark >= p.stop_loss,
                };
                if hit_sl {
                    // Exit at stop loss price (simulating stop order fill)
                    return Some((p.ticket, p.stop_loss, PositionStatus::ClosedSl));
                }
                if p.direction.reached(mark, p.take_profit) {
                    return Some((p.ticket, p.take_profit, PositionStatus::ClosedTp));
                }
                None
            })
            .collect();
        for (ticket, price, status) in exits {
            let pnl = self.settle(ticket, price, status);
            events.push(PaperEvent::PositionClosed { ticket, status, price, pnl });
        }

        events
    }

    fn open_from_order(&mut self, order: PaperOrder, price: f64) {
        let pos = PaperPosition {
            ticket: order.ticket,
            direction: order.direction,
            quantity: order.quantity,
            entry_price: price,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            entry_time: self.now().to_rfc3339(),
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            pnl: 0.0,
        };
        info!(
            "Paper position {} opened: {} {} @ {}",
            pos.ticket, pos.direction, pos.quantity, price
        );
        self.positions.insert(pos.ticket, pos);
    }

    fn settle(&mut self, ticket: Ticket, exit_price: f64, status: PositionStatus) -> f64 {
        let now_str = self.now().to_rfc3339();
        let Some(mut pos) = self.positions.remove(&ticket) else {
            return 0.0;
        };
        let pnl = match pos.direction {
            Direction::Long => (exit_price - pos.entry_price) * pos.quantity,
            Direction::Short => (pos.entry_price - exit_price) * pos.quantity,
        };
        pos.exit_price = Some(exit_price);
        pos.exit_time = Some(now_str);
        pos.status = status;
        pos.pnl = round2(pnl);
        info!(
            "Paper position {} {}: {} -> {} PnL {:+.2}",
            ticket, status, pos.entry_price, exit_price, pos.pnl
        );
        let pnl = pos.pnl;
        self.trade_history.push(pos);
        pnl
    }

    fn reachable(&self) -> Result<(), VenueError> {
        if self.unreachable {
            return Err(VenueError::Unreachable("paper venue offline".to_string()));
        }
        Ok(())
    }

    fn admit_placement(&mut self, request: &OrderRequest) -> Result<Ticket, VenueError> {
        self.reachable()?;
        self.placement_count += 1;
        if self.rejected_placements.remove(&self.placement_count) {
            return Err(VenueError::Rejected {
                code: RETCODE_REJECTED,
                reason: format!("{} rejected", request.comment),
            });
        }
        if request.quantity <= 0.0 {
            return Err(VenueError::Rejected {
                code: RETCODE_REJECTED,
                reason: format!("invalid volume {}", request.quantity),
            });
        }
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        Ok(ticket)
    }

    fn admit_cancellation(&mut self, ticket: Ticket) -> Result<(), VenueError> {
        self.reachable()?;
        self.cancellation_count += 1;
        if self.rejected_cancellations.remove(&self.cancellation_count) {
            return Err(VenueError::Rejected {
                code: RETCODE_REJECTED,
                reason: format!("cancel/close of {} rejected", ticket),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    fn price_increment(&self) -> f64 {
        self.price_increment
    }

    async fn place_pending_order(&mut self, request: &OrderRequest) -> Result<Ticket, VenueError> {
        let ticket = self.admit_placement(request)?;
        self.orders.insert(
            ticket,
            PaperOrder {
                ticket,
                direction: request.direction,
                quantity: request.quantity,
                entry: request.entry,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                expiration: request.expiration,
                comment: request.comment.clone(),
            },
        );
        debug!(
            "Paper order {} placed: {} (magic {})",
            ticket, request.comment, request.magic_number
        );
        Ok(ticket)
    }

    async fn open_position(&mut self, request: &OrderRequest) -> Result<Ticket, VenueError> {
        let ticket = self.admit_placement(request)?;
        let price = self.quote.price(request.direction.entry_side());
        let order = PaperOrder {
            ticket,
            direction: request.direction,
            quantity: request.quantity,
            entry: request.entry,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            expiration: None,
            comment: request.comment.clone(),
        };
        self.open_from_order(order, price);
        Ok(ticket)
    }

    async fn cancel_order(&mut self, ticket: Ticket) -> Result<(), VenueError> {
        self.admit_cancellation(ticket)?;
        self.orders
            .remove(&ticket)
            .map(|_| ())
            .ok_or(VenueError::UnknownTicket(ticket))
    }

    async fn close_position(&mut self, ticket: Ticket) -> Result<(), VenueError> {
        self.admit_cancellation(ticket)?;
        let direction = self
            .positions
            .get(&ticket)
            .map(|p| p.direction)
            .ok_or(VenueError::UnknownTicket(ticket))?;
        let price = self.quote.price(direction.exit_side());
        self.settle(ticket, price, PositionStatus::ClosedManual);
        Ok(())
    }

    async fn modify_stop_loss(&mut self, ticket: Ticket, new_sl: f64) -> Result<(), VenueError> {
        self.reachable()?;
        self.modify_calls += 1;
        if self.reject_modifications {
            return Err(VenueError::Rejected {
                code: RETCODE_INVALID_STOPS,
                reason: "invalid stops".to_string(),
            });
        }
        let pos = self
            .positions
            .get_mut(&ticket)
            .ok_or(VenueError::UnknownTicket(ticket))?;
        pos.stop_loss = new_sl;
        Ok(())
    }

    async fn position_stop_loss(&mut self, ticket: Ticket) -> Result<f64, VenueError> {
        self.reachable()?;
        self.positions
            .get(&ticket)
            .map(|p| p.stop_loss)
            .ok_or(VenueError::UnknownTicket(ticket))
    }

    async fn is_order_pending(&mut self, ticket: Ticket) -> Result<bool, VenueError> {
        self.reachable()?;
        Ok(self.orders.contains_key(&ticket))
    }

    async fn is_position_open(&mut self, ticket: Ticket) -> Result<bool, VenueError> {
        self.reachable()?;
        Ok(self.positions.contains_key(&ticket))
    }

    async fn current_price(&mut self, side: Side) -> Result<f64, VenueError> {
        self.reachable()?;
        Ok(self.quote.price(side))
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
