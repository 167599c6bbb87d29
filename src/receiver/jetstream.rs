// JetStream durable pull subscription: at-least-once delivery with
// explicit acknowledgment, rate-limited fetches, and redelivery on
// downstream failure.

use super::{decode_message, BatchConsumer, Subscription};
use crate::config::{JetStreamConfig, SignalConfig};
use crate::error::ConsumeError;
use crate::lifecycle::Lifecycle;
use crate::rate_limit::RateLimiter;
use crate::signal::Signal;
use anyhow::{Context, Result};
use async_nats::jetstream::consumer::{pull, PullConsumer};
use async_nats::jetstream::{self, AckKind};
use async_nats::Client;
use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a fetch waits for messages before returning what it has.
/// Separate from `ack_wait`: the ack clock only starts once a message is
/// delivered.
const FETCH_EXPIRES: Duration = Duration::from_secs(5);

/// Backoff after a failed fetch, so a broken consumer does not spin.
const FETCH_RETRY_WAIT: Duration = Duration::from_secs(1);

pub(super) struct JetStreamSubscriber {
    consumer: PullConsumer,
    limiter: Option<RateLimiter>,
    fetch_size: usize,
    signal: Signal,
    downstream: Arc<dyn BatchConsumer>,
    shutdown: CancellationToken,
}

impl JetStreamSubscriber {
    /// Binds to (or creates) the durable consumer on the configured
    /// stream. An auto-generated consumer name is unique per instance;
    /// configure an explicit name to share one consumer across instances.
    pub(super) async fn bind(
        client: &Client,
        signal: Signal,
        signal_config: &SignalConfig,
        js_config: &JetStreamConfig,
        downstream: Arc<dyn BatchConsumer>,
        lifecycle: &Lifecycle,
    ) -> Result<Self> {
        let context = jetstream::new(client.clone());
        let stream = context
            .get_stream(&js_config.stream)
            .await
            .with_context(|| format!("failed to get JetStream stream '{}'", js_config.stream))?;

        let durable_name = js_config
            .consumer
            .clone()
            .unwrap_or_else(|| format!("otel-{}-{}", signal, Uuid::new_v4()));

        let mut consumer_config = pull::Config {
            durable_name: Some(durable_name.clone()),
            filter_subject: signal_config.subject.clone(),
            ..Default::default()
        };
        if js_config.ack_wait_secs > 0 {
            consumer_config.ack_wait = js_config.ack_wait();
        }

        let consumer = stream
            .get_or_create_consumer(&durable_name, consumer_config)
            .await
            .with_context(|| format!("failed to bind durable consumer '{durable_name}'"))?;

        let limiter = (js_config.rate_limit > 0)
            .then(|| RateLimiter::new(js_config.rate_limit, js_config.rate_burst));

        info!(
            signal = %signal,
            stream = %js_config.stream,
            consumer = %durable_name,
            subject = %signal_config.subject,
            rate_limit = js_config.rate_limit,
            "bound durable consumer in JetStream mode"
        );

        Ok(Self {
            consumer,
            limiter,
            fetch_size: js_config.fetch_batch_size().max(1),
            signal,
            downstream,
            shutdown: lifecycle.shutdown_token(),
        })
    }

    /// Pulls up to `fetch_size` messages, waiting at most
    /// [`FETCH_EXPIRES`] for the first to arrive.
    async fn fetch_batch(&self) -> Result<Vec<jetstream::Message>> {
        let mut stream = self
            .consumer
            .fetch()
            .max_messages(self.fetch_size)
            .expires(FETCH_EXPIRES)
            .messages()
            .await
            .context("fetch request failed")?;

        let mut messages = Vec::new();
        while let Some(next) = stream.next().await {
            match next {
                Ok(message) => messages.push(message),
                Err(err) => {
                    warn!(error = %err, "error receiving fetched message");
                    break;
                }
            }
        }
        Ok(messages)
    }

    async fn handle_message(&self, message: jetstream::Message) {
        let subject = message.subject.to_string();

        let batch = match decode_message(self.signal, &message) {
            Ok(batch) => batch,
            Err(err) => {
                // Leave unacknowledged: the broker redelivers after
                // ack_wait rather than silently dropping the data
                error!(
                    subject = %subject,
                    error = %err,
                    "failed to decode message, leaving unacknowledged for redelivery"
                );
                return;
            }
        };

        match self.downstream.consume(batch).await {
            Ok(()) => {
                if let Err(err) = message.ack().await {
                    warn!(subject = %subject, error = %err, "failed to acknowledge message");
                }
            }
            Err(err) => {
                match &err {
                    ConsumeError::Downstream(_) => warn!(
                        subject = %subject,
                        error = %err,
                        "downstream consumer rejected batch, redelivering"
                    ),
                    ConsumeError::Other(_) => error!(
                        subject = %subject,
                        error = %err,
                        "consumer failed, redelivering"
                    ),
                }
                if let Err(nak_err) = message.ack_with(AckKind::Nak(None)).await {
                    warn!(
                        subject = %subject,
                        error = %nak_err,
                        "failed to negatively acknowledge message"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl Subscription for JetStreamSubscriber {
    async fn run(self: Box<Self>) {
        loop {
            // Tokens are acquired before the fetch so limiter waits never
            // eat into the acknowledgment deadline
            if let Some(limiter) = &self.limiter {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = limiter.acquire(self.fetch_size as u32) => {}
                }
            } else if self.shutdown.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                fetched = self.fetch_batch() => fetched,
            };

            let messages = match fetched {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(error = %err, "fetch failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(FETCH_RETRY_WAIT) => {}
                    }
                    continue;
                }
            };

            // Fetched messages are in flight: finish the batch even if
            // shutdown fires meanwhile. Unprocessed messages dropped by a
            // cancelled fetch redeliver after ack_wait.
            join_all(messages.into_iter().map(|m| self.handle_message(m))).await;
        }

        debug!(signal = %self.signal, "durable consumer loop stopped");
    }
}
