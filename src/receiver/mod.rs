// Ingress adapter: subscribes to telemetry subjects and forwards decoded
// batches to a downstream consumer.
//
// A receiver instance serves exactly one signal. Delivery mode is chosen
// once at start: a JetStream block on the signal selects durable
// at-least-once pull consumption, otherwise core NATS push delivery
// (at-most-once, optionally load-balanced via a queue group).

mod core;
mod jetstream;

use crate::codec::{self, Encoding, HEADER_CONTENT_TYPE};
use crate::config::{ReceiverConfig, SignalConfig};
use crate::error::{CodecError, ConsumeError};
use crate::lifecycle::Lifecycle;
use crate::nats;
use crate::signal::{Signal, TelemetryBatch};
use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Downstream consumer of decoded telemetry batches.
///
/// An error return means the batch was not processed. In durable mode the
/// message is negatively acknowledged and redelivered, so consumers must
/// tolerate duplicate batches; in broadcast mode the error is logged and
/// the batch dropped.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ConsumeError>;
}

/// Delivery guarantee of a subscription, fixed at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Core NATS push delivery. No acknowledgment round-trip.
    AtMostOnce,
    /// JetStream durable pull consumption with explicit acknowledgment.
    AtLeastOnce,
}

impl DeliveryMode {
    pub fn for_signal(config: &SignalConfig) -> Self {
        if config.jetstream.is_some() {
            DeliveryMode::AtLeastOnce
        } else {
            DeliveryMode::AtMostOnce
        }
    }
}

/// A running subscription. Two concrete implementations exist, one per
/// delivery mode; the variant is chosen once, at start.
#[async_trait]
trait Subscription: Send {
    /// Consumes messages until the shutdown token fires, then releases
    /// the subscription.
    async fn run(self: Box<Self>);
}

/// NATS receiver for one telemetry signal.
pub struct NatsReceiver {
    config: ReceiverConfig,
    signal: Signal,
    consumer: Arc<dyn BatchConsumer>,
    lifecycle: Lifecycle,
    client: Option<Client>,
    started: bool,
}

impl NatsReceiver {
    pub fn new(config: ReceiverConfig, signal: Signal, consumer: Arc<dyn BatchConsumer>) -> Self {
        Self {
            config,
            signal,
            consumer,
            lifecycle: Lifecycle::new(),
            client: None,
            started: false,
        }
    }

    /// Host lifecycle: validate, connect, and begin consuming.
    ///
    /// A failed start leaves no dangling subscription or connection.
    pub async fn start(&mut self) -> Result<()> {
        anyhow::ensure!(!self.started, "receiver is already started");
        self.config
            .validate()
            .context("invalid receiver configuration")?;

        let signal_config = self.config.signal(self.signal).clone();
        anyhow::ensure!(
            signal_config.enabled(),
            "no subject configured for {} batches",
            self.signal
        );

        let client = nats::connect(&self.config.client).await?;

        let subscription = match self.build_subscription(&client, &signal_config).await {
            Ok(subscription) => subscription,
            Err(err) => {
                // Tear the fresh connection down so nothing dangles
                drop(client);
                return Err(err);
            }
        };

        self.lifecycle.spawn(subscription.run());
        self.client = Some(client);
        self.started = true;

        info!(
            signal = %self.signal,
            subject = %signal_config.subject,
            mode = ?DeliveryMode::for_signal(&signal_config),
            "NATS receiver started"
        );
        Ok(())
    }

    async fn build_subscription(
        &self,
        client: &Client,
        signal_config: &SignalConfig,
    ) -> Result<Box<dyn Subscription>> {
        match &signal_config.jetstream {
            Some(js_config) => {
                let subscriber = jetstream::JetStreamSubscriber::bind(
                    client,
                    self.signal,
                    signal_config,
                    js_config,
                    self.consumer.clone(),
                    &self.lifecycle,
                )
                .await?;
                Ok(Box::new(subscriber))
            }
            None => {
                let queue_group = self
                    .config
                    .queue_group_for(self.signal)
                    .map(str::to_string);
                let subscriber = core::CoreSubscriber::subscribe(
                    client,
                    self.signal,
                    signal_config.subject.clone(),
                    queue_group,
                    self.consumer.clone(),
                    &self.lifecycle,
                )
                .await?;
                Ok(Box::new(subscriber))
            }
        }
    }

    /// Host lifecycle: stop intake, drain in-flight handlers bounded by
    /// the drain deadline, then close the connection.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        info!(signal = %self.signal, "NATS receiver draining");
        if !self.lifecycle.drain(self.config.client.drain_timeout()).await {
            warn!(
                signal = %self.signal,
                in_flight = self.lifecycle.in_flight(),
                "drain deadline elapsed, abandoning in-flight handlers"
            );
        }

        // Push out any pending acks before the connection drops
        if let Err(err) = client.flush().await {
            warn!(error = %err, "failed to flush connection during shutdown");
        }

        info!(signal = %self.signal, "NATS receiver stopped");
        Ok(())
    }
}

/// Decodes a message payload using the encoding named by its
/// content-type header (absent or unrecognized markers mean protobuf).
fn decode_message(signal: Signal, message: &async_nats::Message) -> Result<TelemetryBatch, CodecError> {
    let content_type = message
        .headers
        .as_ref()
        .and_then(|headers| headers.get(HEADER_CONTENT_TYPE))
        .map(|value| value.as_str());
    codec::decode(signal, Encoding::from_content_type(content_type), &message.payload)
}
