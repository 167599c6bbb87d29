// End-to-end adapter tests against a live broker.
//
// These bind to a local `nats-server -js` (or $NATS_URL) and are ignored
// by default so the suite passes without one:
//
//   nats-server -js &
//   cargo test -- --ignored

use async_trait::async_trait;
use otelnats::config::{ClientConfig, JetStreamConfig, ReceiverConfig};
use otelnats::{
    BatchConsumer, ConsumeError, ExporterConfig, NatsExporter, NatsReceiver, Signal,
    TelemetryBatch,
};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string())
}

fn client_config() -> ClientConfig {
    ClientConfig {
        url: nats_url(),
        ..ClientConfig::default()
    }
}

/// Unique dot-free token so concurrent test runs do not collide.
fn unique_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn logs_batch(attrs: &[(&str, &str)], records: usize) -> TelemetryBatch {
    TelemetryBatch::Logs(LogsData {
        resource_logs: vec![ResourceLogs {
            resource: Some(Resource {
                attributes: attrs
                    .iter()
                    .map(|(k, v)| KeyValue {
                        key: k.to_string(),
                        value: Some(AnyValue {
                            value: Some(any_value::Value::StringValue(v.to_string())),
                        }),
                    })
                    .collect(),
                ..Default::default()
            }),
            scope_logs: vec![ScopeLogs {
                log_records: (0..records).map(|_| LogRecord::default()).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    })
}

fn receiver_config(subject: &str, queue_group: &str) -> ReceiverConfig {
    let mut config = ReceiverConfig {
        client: client_config(),
        ..ReceiverConfig::default()
    };
    config.queue_group = queue_group.to_string();
    config.traces.subject.clear();
    config.metrics.subject.clear();
    config.logs.subject = subject.to_string();
    config
}

fn exporter_config(subject: &str) -> ExporterConfig {
    let mut config = ExporterConfig {
        client: client_config(),
        ..ExporterConfig::default()
    };
    config.logs.subject = subject.to_string();
    config
}

// ── Test consumers ───────────────────────────────────────────────────────

/// Forwards every batch into a channel.
struct ChannelConsumer {
    tx: mpsc::Sender<TelemetryBatch>,
}

#[async_trait]
impl BatchConsumer for ChannelConsumer {
    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ConsumeError> {
        self.tx
            .send(batch)
            .await
            .map_err(|e| ConsumeError::Other(anyhow::anyhow!(e)))
    }
}

/// Rejects the first `failures` batches with a downstream error, then
/// forwards to a channel. Counts every attempt.
struct FlakyConsumer {
    failures: usize,
    attempts: AtomicUsize,
    tx: mpsc::Sender<TelemetryBatch>,
}

#[async_trait]
impl BatchConsumer for FlakyConsumer {
    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ConsumeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(ConsumeError::Downstream(anyhow::anyhow!(
                "pipeline not ready"
            )));
        }
        self.tx
            .send(batch)
            .await
            .map_err(|e| ConsumeError::Other(anyhow::anyhow!(e)))
    }
}

/// Sleeps before completing, to keep handlers in flight during shutdown.
struct SlowConsumer {
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl BatchConsumer for SlowConsumer {
    async fn consume(&self, _batch: TelemetryBatch) -> Result<(), ConsumeError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for(counter: &AtomicUsize, target: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while counter.load(Ordering::SeqCst) < target {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for counter");
}

// ── Broadcast mode ───────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn broadcast_subscriber_receives_published_batch() {
    let subject = format!("e2e.cast.{}.logs", unique_token());

    let (tx, mut rx) = mpsc::channel(8);
    let mut receiver = NatsReceiver::new(
        receiver_config(&subject, ""),
        Signal::Logs,
        Arc::new(ChannelConsumer { tx }),
    );
    receiver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut exporter = NatsExporter::new(exporter_config(&subject));
    exporter.start().await.unwrap();
    exporter
        .publish(logs_batch(&[("service.name", "e2e")], 3))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for batch")
        .expect("channel closed");
    assert_eq!(received.signal(), Signal::Logs);
    assert_eq!(received.item_count(), 3);
    assert_eq!(
        received.resource_attributes().get("service.name").map(String::as_str),
        Some("e2e")
    );

    exporter.shutdown().await.unwrap();
    receiver.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn queue_group_members_split_the_stream() {
    let subject = format!("e2e.qg.{}.logs", unique_token());
    let group = format!("e2e-workers-{}", unique_token());
    let total = 20;

    let (tx_a, mut rx_a) = mpsc::channel(64);
    let (tx_b, mut rx_b) = mpsc::channel(64);
    let mut receiver_a = NatsReceiver::new(
        receiver_config(&subject, &group),
        Signal::Logs,
        Arc::new(ChannelConsumer { tx: tx_a }),
    );
    let mut receiver_b = NatsReceiver::new(
        receiver_config(&subject, &group),
        Signal::Logs,
        Arc::new(ChannelConsumer { tx: tx_b }),
    );
    receiver_a.start().await.unwrap();
    receiver_b.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut exporter = NatsExporter::new(exporter_config(&subject));
    exporter.start().await.unwrap();
    for i in 0..total {
        exporter
            .publish(logs_batch(&[("idx", &i.to_string())], 1))
            .await
            .unwrap();
    }

    // Collect until every published message arrived somewhere
    let mut indices = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while indices.len() < total {
        let next = tokio::select! {
            Some(batch) = rx_a.recv() => batch,
            Some(batch) = rx_b.recv() => batch,
            _ = tokio::time::sleep_until(deadline) => panic!("timed out: {}/{total} received", indices.len()),
        };
        indices.push(next.resource_attributes()["idx"].clone());
    }

    // Disjoint subsets whose union is the full set
    indices.sort();
    indices.dedup();
    assert_eq!(indices.len(), total, "each message delivered exactly once");

    exporter.shutdown().await.unwrap();
    receiver_a.shutdown().await.unwrap();
    receiver_b.shutdown().await.unwrap();
}

// ── Durable mode ─────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn durable_consumer_redelivers_after_downstream_failure() {
    let token = unique_token();
    let subject = format!("e2e.durable.{token}.logs");
    let stream_name = format!("E2E_{token}");

    // The stream must exist before the receiver binds to it
    let admin = async_nats::connect(nats_url()).await.unwrap();
    let jetstream = async_nats::jetstream::new(admin.clone());
    jetstream
        .create_stream(async_nats::jetstream::stream::Config {
            name: stream_name.clone(),
            subjects: vec![subject.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let flaky = Arc::new(FlakyConsumer {
        failures: 1,
        attempts: AtomicUsize::new(0),
        tx,
    });

    let mut config = receiver_config(&subject, "");
    config.logs.jetstream = Some(JetStreamConfig {
        stream: stream_name.clone(),
        consumer: Some(format!("e2e-worker-{token}")),
        ack_wait_secs: 30,
        backlog_size: 10,
        rate_limit: 0,
        rate_burst: 0,
    });
    let mut receiver = NatsReceiver::new(config, Signal::Logs, flaky.clone());
    receiver.start().await.unwrap();

    let mut exporter = NatsExporter::new(exporter_config(&subject));
    exporter.start().await.unwrap();
    exporter
        .publish(logs_batch(&[("idx", "0")], 1))
        .await
        .unwrap();

    // First attempt fails and is negatively acknowledged; the redelivered
    // message must reach the consumer and succeed
    let received = tokio::time::timeout(Duration::from_secs(15), rx.recv())
        .await
        .expect("timed out waiting for redelivered batch")
        .expect("channel closed");
    assert_eq!(received.item_count(), 1);
    assert!(flaky.attempts.load(Ordering::SeqCst) >= 2);

    exporter.shutdown().await.unwrap();
    receiver.shutdown().await.unwrap();
    jetstream.delete_stream(&stream_name).await.unwrap();
}

// ── Drain semantics ──────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn shutdown_waits_for_in_flight_handlers() {
    let subject = format!("e2e.drain.{}.logs", unique_token());
    let total = 5;

    let started = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let mut receiver = NatsReceiver::new(
        receiver_config(&subject, ""),
        Signal::Logs,
        Arc::new(SlowConsumer {
            started: started.clone(),
            completed: completed.clone(),
        }),
    );
    receiver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut exporter = NatsExporter::new(exporter_config(&subject));
    exporter.start().await.unwrap();
    for _ in 0..total {
        exporter.publish(logs_batch(&[], 1)).await.unwrap();
    }
    exporter.shutdown().await.unwrap();

    // All handlers dispatched and still sleeping when shutdown begins
    wait_for(&started, total).await;
    receiver.shutdown().await.unwrap();

    assert_eq!(
        completed.load(Ordering::SeqCst),
        total,
        "shutdown must block until every in-flight handler finishes"
    );
}
