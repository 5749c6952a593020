pub mod direction;
pub mod order_group;
pub mod signal;

pub use direction::*;
pub use order_group::*;
pub use signal::TradeSignal;
