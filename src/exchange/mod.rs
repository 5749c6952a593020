pub mod coinbase;
pub mod paper;

pub use coinbase::CoinbaseQuoteFeed;
pub use paper::PaperVenue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Direction, Quote, Side, Ticket};

/// Parameters for one leg, shared by pending and immediate placement.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub direction: Direction,
    pub quantity: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Ignored for immediate execution. `None` means good-till-cancelled.
    pub expiration: Option<DateTime<Utc>>,
    pub comment: String,
    /// Tags every order of this engine on shared accounts.
    pub magic_number: u64,
    /// Maximum deviation accepted for immediate execution, in price increments.
    pub slippage_points: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("request rejected (code {code}): {reason}")]
    Rejected { code: u32, reason: String },

    #[error("ticket {0} not found")]
    UnknownTicket(Ticket),

    #[error("venue unreachable: {0}")]
    Unreachable(String),
}

impl VenueError {
    /// The venue cannot be talked to at all, as opposed to refusing one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VenueError::Unreachable(_))
    }
}

/// The broker or exchange holding orders and positions for the traded
/// instrument. Every call is a single attempt; callers decide what a
/// failure means.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Minimum price increment of the instrument.
    fn price_increment(&self) -> f64;

    async fn place_pending_order(&mut self, request: &OrderRequest) -> Result<Ticket, VenueError>;
    async fn open_position(&mut self, request: &OrderRequest) -> Result<Ticket, VenueError>;
    async fn cancel_order(&mut self, ticket: Ticket) -> Result<(), VenueError>;
    async fn close_position(&mut self, ticket: Ticket) -> Result<(), VenueError>;
    async fn modify_stop_loss(&mut self, ticket: Ticket, new_sl: f64) -> Result<(), VenueError>;

    /// Stop-loss currently attached to an open position.
    async fn position_stop_loss(&mut self, ticket: Ticket) -> Result<f64, VenueError>;

    async fn is_order_pending(&mut self, ticket: Ticket) -> Result<bool, VenueError>;
    async fn is_position_open(&mut self, ticket: Ticket) -> Result<bool, VenueError>;
    async fn current_price(&mut self, side: Side) -> Result<f64, VenueError>;
}

/// Source of live top-of-book prices for the driver loop.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    async fn get_quote(&mut self) -> anyhow::Result<Quote>;
}
