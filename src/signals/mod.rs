pub mod webhook;

pub use webhook::{WebhookAck, WebhookSignalSource};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TradeSignal;

/// Delivers parsed signals. Malformed payloads are rejected here, before
/// the engine ever sees them.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Latest signal, or `None` when nothing is waiting.
    async fn poll(&mut self) -> Result<Option<TradeSignal>>;
}

/// Told when a signal has been turned into a live order group.
#[async_trait]
pub trait SignalAck: Send + Sync {
    async fn acknowledge(&self, signal: &TradeSignal) -> Result<()>;
}

pub struct NoopAck;

#[async_trait]
impl SignalAck for NoopAck {
    async fn acknowledge(&self, _signal: &TradeSignal) -> Result<()> {
        Ok(())
    }
}
