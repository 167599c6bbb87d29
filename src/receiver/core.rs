// Core NATS push subscription: at-most-once delivery, one handler task
// per inbound message, optional queue-group load balancing.

use super::{decode_message, BatchConsumer, Subscription};
use crate::lifecycle::Lifecycle;
use crate::signal::Signal;
use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

pub(super) struct CoreSubscriber {
    subscriber: async_nats::Subscriber,
    signal: Signal,
    downstream: Arc<dyn BatchConsumer>,
    handlers: TaskTracker,
    shutdown: CancellationToken,
}

impl CoreSubscriber {
    /// Subscribes to the signal's subject, joining the queue group if one
    /// is set so the broker delivers each message to one group member.
    pub(super) async fn subscribe(
        client: &Client,
        signal: Signal,
        subject: String,
        queue_group: Option<String>,
        downstream: Arc<dyn BatchConsumer>,
        lifecycle: &Lifecycle,
    ) -> Result<Self> {
        let subscriber = match &queue_group {
            Some(group) => client.queue_subscribe(subject.clone(), group.clone()).await,
            None => client.subscribe(subject.clone()).await,
        }
        .with_context(|| format!("failed to subscribe to '{subject}'"))?;

        info!(
            signal = %signal,
            subject = %subject,
            queue_group = queue_group.as_deref().unwrap_or(""),
            "subscribed in core NATS mode"
        );

        Ok(Self {
            subscriber,
            signal,
            downstream,
            handlers: lifecycle.tracker(),
            shutdown: lifecycle.shutdown_token(),
        })
    }
}

#[async_trait]
impl Subscription for CoreSubscriber {
    async fn run(mut self: Box<Self>) {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.subscriber.next() => match next {
                    Some(message) => message,
                    // Subscription stream ended: connection is gone
                    None => break,
                },
            };

            let signal = self.signal;
            let downstream = self.downstream.clone();
            self.handlers.spawn(async move {
                handle_message(signal, downstream, message).await;
            });
        }

        if let Err(err) = self.subscriber.unsubscribe().await {
            debug!(error = %err, "unsubscribe failed during shutdown");
        }
        debug!(signal = %self.signal, "core subscription released");
    }
}

async fn handle_message(
    signal: Signal,
    downstream: Arc<dyn BatchConsumer>,
    message: async_nats::Message,
) {
    let batch = match decode_message(signal, &message) {
        Ok(batch) => batch,
        Err(err) => {
            error!(
                subject = %message.subject,
                error = %err,
                "failed to decode message, dropping"
            );
            return;
        }
    };

    if let Err(err) = downstream.consume(batch).await {
        // At-most-once: there is nothing to redeliver
        error!(
            subject = %message.subject,
            error = %err,
            "downstream consumer failed, batch dropped"
        );
    }
}
