use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    /// Accepts both the venue wording ("BUY"/"SELL") and "long"/"short".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(Direction::Long),
            "sell" | "short" => Ok(Direction::Short),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

impl Direction {
    /// Venue-facing label, as used in generated signal ids.
    pub fn order_label(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    /// Side of the book a new order in this direction executes against.
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Ask,
            Direction::Short => Side::Bid,
        }
    }

    /// Side of the book an open position in this direction is marked at.
    pub fn exit_side(&self) -> Side {
        match self {
            Direction::Long => Side::Bid,
            Direction::Short => Side::Ask,
        }
    }

    /// True when `price` has reached or passed `level` in the profitable direction.
    pub fn reached(&self, price: f64, level: f64) -> bool {
        match self {
            Direction::Long => price >= level,
            Direction::Short => price <= level,
        }
    }

    /// True when `candidate` is strictly further in the profitable direction than `reference`.
    pub fn is_beyond(&self, candidate: f64, reference: f64) -> bool {
        match self {
            Direction::Long => candidate > reference,
            Direction::Short => candidate < reference,
        }
    }

    /// Moves `price` by `distance` in the profitable direction.
    pub fn offset(&self, price: f64, distance: f64) -> f64 {
        match self {
            Direction::Long => price + distance,
            Direction::Short => price - distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Top of book for the traded instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    pub fn price(&self, side: Side) -> f64 {
        match side {
            Side::Bid => self.bid,
            Side::Ask => self.ask,
        }
    }
}
