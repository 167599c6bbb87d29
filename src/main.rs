use anyhow::Result;
use async_trait::async_trait;
use otelnats::{BatchConsumer, ConsumeError, NatsReceiver, Signal, TelemetryBatch};
use std::sync::Arc;
use tracing::info;

/// Downstream consumer that logs a summary of each received batch.
struct LogConsumer;

#[async_trait]
impl BatchConsumer for LogConsumer {
    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ConsumeError> {
        info!(
            signal = %batch.signal(),
            items = batch.item_count(),
            "received batch"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "otelnats=info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "otelnats.toml".to_string());
    let config = otelnats::config::load_receiver_config(&config_path)?;
    config.validate()?;

    let consumer: Arc<dyn BatchConsumer> = Arc::new(LogConsumer);

    // One receiver per configured signal
    let mut receivers = Vec::new();
    for signal in Signal::ALL {
        if config.signal(signal).enabled() {
            let mut receiver = NatsReceiver::new(config.clone(), signal, consumer.clone());
            receiver.start().await?;
            receivers.push(receiver);
        }
    }

    info!("otelnats running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    for mut receiver in receivers {
        receiver.shutdown().await?;
    }

    Ok(())
}
