// Egress adapter: encodes telemetry batches and publishes them to
// signal-routed NATS subjects.

use crate::codec::{self, Encoding, HEADER_CONTENT_TYPE, HEADER_SIGNAL};
use crate::config::ExporterConfig;
use crate::error::PublishError;
use crate::nats::{self, connection, subject};
use crate::signal::TelemetryBatch;
use anyhow::{Context, Result};
use async_nats::{Client, HeaderMap};
use tracing::{debug, error, info, warn};

/// NATS exporter for telemetry batches.
///
/// Batches are routed by their own signal tag: the matching signal's
/// subject template is expanded against the batch's first-resource
/// attributes. The exporter performs no retries; transient transport
/// errors are surfaced for the caller's retry policy.
pub struct NatsExporter {
    config: ExporterConfig,
    client: Option<Client>,
}

impl NatsExporter {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Host lifecycle: validate the configuration and connect.
    ///
    /// Configuration and initial-connect failures are returned to the
    /// caller; nothing is left behind on error.
    pub async fn start(&mut self) -> Result<()> {
        anyhow::ensure!(self.client.is_none(), "exporter is already started");
        self.config.validate().context("invalid exporter configuration")?;

        let client = nats::connect(&self.config.client).await?;
        self.client = Some(client);

        info!(
            url = %connection::redact_url(&self.config.client.url),
            "NATS exporter started"
        );
        Ok(())
    }

    /// Publishes one batch.
    ///
    /// Encode and subject-resolution failures are permanent: the batch
    /// must not be retried. Transport failures are transient.
    pub async fn publish(&self, batch: TelemetryBatch) -> Result<(), PublishError> {
        let client = self.client.as_ref().ok_or(PublishError::NotStarted)?;
        let (resolved, encoding, payload) = self.prepare(&batch)?;

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_TYPE, encoding.content_type());
        headers.insert(HEADER_SIGNAL, batch.signal().as_str());

        let bytes = payload.len();
        client
            .publish_with_headers(resolved.clone(), headers, payload.into())
            .await
            .map_err(|source| {
                error!(subject = %resolved, error = %source, "failed to publish batch");
                PublishError::Transport {
                    subject: resolved.clone(),
                    source,
                }
            })?;

        debug!(
            subject = %resolved,
            signal = %batch.signal(),
            items = batch.item_count(),
            bytes = bytes,
            "published batch"
        );
        Ok(())
    }

    /// Encodes the batch and resolves its outgoing subject.
    fn prepare(&self, batch: &TelemetryBatch) -> Result<(String, Encoding, Vec<u8>), PublishError> {
        let signal = batch.signal();
        let signal_config = self.config.signal(signal);
        if !signal_config.enabled() {
            return Err(PublishError::SignalNotConfigured(signal));
        }

        let encoding = Encoding::Protobuf;
        let payload = codec::encode(batch, encoding)
            .map_err(|source| PublishError::Encode { signal, source })?;

        let attrs = batch.resource_attributes();
        let resolved = subject::expand_subject(&signal_config.subject, signal, &attrs);
        if subject::contains_wildcard(&resolved) {
            return Err(PublishError::WildcardSubject(resolved));
        }

        Ok((resolved, encoding, payload))
    }

    /// Host lifecycle: flush all accepted publishes to the transport,
    /// bounded by the drain deadline, then close the connection.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.config.client.drain_timeout(), client.flush()).await {
            Ok(result) => result.context("failed to flush pending publishes")?,
            Err(_) => {
                warn!("flush did not complete within the drain deadline, pending publishes abandoned")
            }
        }

        info!("NATS exporter stopped");
        Ok(())
    }
}
