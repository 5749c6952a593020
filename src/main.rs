mod bot;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use scaleout_engine::config::Config;
use scaleout_engine::exchange::CoinbaseQuoteFeed;
use scaleout_engine::signals::{NoopAck, SignalAck, SignalSource, WebhookAck, WebhookSignalSource};

use crate::bot::ScaleOutBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    cfg.validate()?;

    let feed = Box::new(CoinbaseQuoteFeed::new(&cfg));
    let mut source: Option<Box<dyn SignalSource>> = None;
    let mut ack: Box<dyn SignalAck> = Box::new(NoopAck);
    if cfg.enable_webhook_mode {
        source = Some(Box::new(WebhookSignalSource::new(&cfg)));
        ack = Box::new(WebhookAck::new(&cfg));
    }

    let mut bot = ScaleOutBot::new(&cfg, feed, source, ack).await?;
    bot.run().await?;

    Ok(())
}
