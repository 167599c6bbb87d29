// Adapter configuration: shared NATS client settings plus per-signal
// subject/queue-group/JetStream blocks for the receiver and exporter.
//
// Durations are unit-suffixed integer fields (seconds). Defaults mirror
// the upstream NATS client conventions: 10s connect timeout, 2s reconnect
// wait, unlimited reconnect attempts.

pub mod validation;

use crate::signal::Signal;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENCODING: &str = "otlp_proto";
pub const DEFAULT_TRACES_SUBJECT: &str = "otel.traces";
pub const DEFAULT_METRICS_SUBJECT: &str = "otel.metrics";
pub const DEFAULT_LOGS_SUBJECT: &str = "otel.logs";
pub const DEFAULT_QUEUE_GROUP: &str = "otel-collector";

/// NATS client configuration shared between the receiver and the exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server URL. Comma-separated URLs are accepted for clusters.
    #[serde(default = "default_url")]
    pub url: String,

    /// TLS material for secure connections.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Authentication. At most one method may be configured.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Timeout for the initial connection attempt.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Wait between reconnection attempts after a dropped connection.
    #[serde(default = "default_reconnect_wait_secs")]
    pub reconnect_wait_secs: u64,

    /// Maximum reconnection attempts. -1 means unlimited.
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: i64,

    /// Maximum time shutdown waits for in-flight work before abandoning it.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_connection_timeout_secs() -> u64 {
    10
}

fn default_reconnect_wait_secs() -> u64 {
    2
}

fn default_max_reconnects() -> i64 {
    -1 // unlimited
}

fn default_drain_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            tls: None,
            auth: AuthConfig::default(),
            connection_timeout_secs: default_connection_timeout_secs(),
            reconnect_wait_secs: default_reconnect_wait_secs(),
            max_reconnects: default_max_reconnects(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_secs(self.reconnect_wait_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Reconnect attempt cap in the form the transport expects.
    pub fn max_reconnects_cap(&self) -> Option<usize> {
        if self.max_reconnects < 0 {
            None
        } else {
            Some(self.max_reconnects as usize)
        }
    }
}

/// TLS client material. Paths are read at connect time.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Authentication options. At most one method may be configured; none
/// means an unauthenticated connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Username/password authentication.
    #[serde(default)]
    pub user_info: Option<UserInfoAuth>,

    /// Token authentication.
    #[serde(default)]
    pub token: Option<String>,

    /// Path to an NKey seed file.
    #[serde(default)]
    pub nkey_file: Option<String>,

    /// Path to a credentials file (JWT + NKey).
    #[serde(default)]
    pub credentials_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoAuth {
    pub username: String,
    pub password: String,
}

/// Per-signal configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Subject to subscribe to (receiver, literal, wildcards allowed) or
    /// publish to (exporter, template with `${signal}` / `${attr:key}`).
    /// Empty disables the signal.
    #[serde(default)]
    pub subject: String,

    /// Queue group for load-balanced core-NATS consumption. Empty means
    /// broadcast. Receiver-only; ignored in JetStream mode and on the
    /// exporter.
    #[serde(default)]
    pub queue_group: String,

    /// Payload encoding tag. Only `otlp_proto` is supported.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Durable at-least-once consumption. Absent means core NATS
    /// (at-most-once) delivery.
    #[serde(default)]
    pub jetstream: Option<JetStreamConfig>,
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            subject: String::new(),
            queue_group: String::new(),
            encoding: default_encoding(),
            jetstream: None,
        }
    }
}

impl SignalConfig {
    fn with_subject(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..Self::default()
        }
    }

    pub fn enabled(&self) -> bool {
        !self.subject.is_empty()
    }
}

/// JetStream-specific settings for a signal.
#[derive(Debug, Clone, Deserialize)]
pub struct JetStreamConfig {
    /// Stream to consume from. Required.
    pub stream: String,

    /// Durable consumer name. Auto-generated per instance when absent;
    /// set it explicitly to share one consumer across instances.
    #[serde(default)]
    pub consumer: Option<String>,

    /// Acknowledgment deadline; unacknowledged messages are redelivered
    /// after this elapses.
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,

    /// Fetch batch size when no rate limit is active.
    #[serde(default = "default_backlog_size")]
    pub backlog_size: usize,

    /// Rate limit in messages/second. 0 disables rate limiting.
    #[serde(default)]
    pub rate_limit: u32,

    /// Token bucket capacity; also the fetch batch size while rate
    /// limiting is active. Must be > 0 whenever `rate_limit` is set.
    #[serde(default)]
    pub rate_burst: u32,
}

fn default_ack_wait_secs() -> u64 {
    30
}

fn default_backlog_size() -> usize {
    100
}

impl JetStreamConfig {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    /// Messages requested per pull. The rate burst bounds each pull while
    /// limiting is active; otherwise the backlog buffer size applies.
    pub fn fetch_batch_size(&self) -> usize {
        if self.rate_limit > 0 {
            self.rate_burst as usize
        } else {
            self.backlog_size
        }
    }
}

/// Ingress adapter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    #[serde(flatten)]
    pub client: ClientConfig,

    /// Connection-level default queue group, overridden by a signal's own
    /// `queue_group`. Empty means broadcast.
    #[serde(default = "default_receiver_queue_group")]
    pub queue_group: String,

    #[serde(default = "default_traces_config")]
    pub traces: SignalConfig,

    #[serde(default = "default_metrics_config")]
    pub metrics: SignalConfig,

    #[serde(default = "default_logs_config")]
    pub logs: SignalConfig,
}

fn default_receiver_queue_group() -> String {
    DEFAULT_QUEUE_GROUP.to_string()
}

fn default_traces_config() -> SignalConfig {
    SignalConfig::with_subject(DEFAULT_TRACES_SUBJECT)
}

fn default_metrics_config() -> SignalConfig {
    SignalConfig::with_subject(DEFAULT_METRICS_SUBJECT)
}

fn default_logs_config() -> SignalConfig {
    SignalConfig::with_subject(DEFAULT_LOGS_SUBJECT)
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            queue_group: default_receiver_queue_group(),
            traces: default_traces_config(),
            metrics: default_metrics_config(),
            logs: default_logs_config(),
        }
    }
}

impl ReceiverConfig {
    pub fn signal(&self, signal: Signal) -> &SignalConfig {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Metrics => &self.metrics,
            Signal::Logs => &self.logs,
        }
    }

    /// Effective queue group for a signal in core-NATS mode.
    ///
    /// The signal's own setting wins; the connection-level default applies
    /// otherwise. `None` means broadcast delivery.
    pub fn queue_group_for(&self, signal: Signal) -> Option<&str> {
        let sig = self.signal(signal);
        let group = if sig.queue_group.is_empty() {
            &self.queue_group
        } else {
            &sig.queue_group
        };
        if group.is_empty() {
            None
        } else {
            Some(group)
        }
    }
}

/// Egress adapter configuration. Signal `queue_group`/`jetstream` blocks
/// are receiver concerns and are ignored here.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(flatten)]
    pub client: ClientConfig,

    #[serde(default = "default_traces_config")]
    pub traces: SignalConfig,

    #[serde(default = "default_metrics_config")]
    pub metrics: SignalConfig,

    #[serde(default = "default_logs_config")]
    pub logs: SignalConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            traces: default_traces_config(),
            metrics: default_metrics_config(),
            logs: default_logs_config(),
        }
    }
}

impl ExporterConfig {
    pub fn signal(&self, signal: Signal) -> &SignalConfig {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Metrics => &self.metrics,
            Signal::Logs => &self.logs,
        }
    }
}

/// Load receiver configuration from a TOML file.
pub fn load_receiver_config(path: &str) -> Result<ReceiverConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{path}'"))?;
    let config: ReceiverConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file '{path}'"))?;
    Ok(config)
}

/// Load exporter configuration from a TOML file.
pub fn load_exporter_config(path: &str) -> Result<ExporterConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{path}'"))?;
    let config: ExporterConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file '{path}'"))?;
    Ok(config)
}
