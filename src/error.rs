use crate::signal::Signal;
use thiserror::Error;

/// Configuration errors, detected before any connection is attempted.
///
/// Messages are field-qualified so an operator can map them back to the
/// offending TOML key.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("url is required")]
    MissingUrl,

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("url scheme must be nats, tls, or nats+tls, got '{0}'")]
    UnsupportedScheme(String),

    #[error("auth: only one authentication method can be configured")]
    AmbiguousAuth,

    #[error("at least one signal subject must be configured")]
    NoSignalSubject,

    #[error("{signal}.encoding: only '{supported}' is supported, got '{value}'")]
    UnsupportedEncoding {
        signal: Signal,
        supported: &'static str,
        value: String,
    },

    #[error("{signal}.subject '{subject}' contains invalid characters")]
    InvalidSubject { signal: Signal, subject: String },

    #[error("{signal}.jetstream.stream is required when jetstream is enabled")]
    MissingStream { signal: Signal },

    #[error("{signal}.jetstream.rate_burst must be greater than zero when rate_limit is set")]
    MissingRateBurst { signal: Signal },
}

/// Payload encode/decode errors. Always permanent: a batch that cannot be
/// (de)serialized will not succeed on retry.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode {signal} protobuf payload: {source}")]
    ProtoDecode {
        signal: Signal,
        #[source]
        source: prost::DecodeError,
    },

    #[error("failed to decode {signal} JSON payload: {source}")]
    JsonDecode {
        signal: Signal,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {signal} JSON payload: {source}")]
    JsonEncode {
        signal: Signal,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned by [`NatsExporter::publish`](crate::NatsExporter::publish).
///
/// Callers own retry policy: transient errors may be retried, permanent
/// errors must not be.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("exporter is not started")]
    NotStarted,

    #[error("no subject configured for {0} batches")]
    SignalNotConfigured(Signal),

    #[error("failed to encode {signal} batch: {source}")]
    Encode {
        signal: Signal,
        #[source]
        source: CodecError,
    },

    #[error("resolved subject '{0}' contains wildcards, cannot publish")]
    WildcardSubject(String),

    #[error("failed to publish to '{subject}': {source}")]
    Transport {
        subject: String,
        #[source]
        source: async_nats::PublishError,
    },
}

impl PublishError {
    /// Whether retrying the same batch can ever succeed.
    ///
    /// Only transport failures are transient; everything else is a property
    /// of the batch or the configuration.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, PublishError::Transport { .. })
    }
}

/// Error returned by a downstream [`BatchConsumer`](crate::BatchConsumer).
///
/// In durable mode any variant leaves the message unacknowledged so the
/// broker redelivers it; the variant only selects the log severity.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Downstream pipeline pushback (queue full, temporary refusal).
    /// Recoverable; logged at a lower severity in durable mode where
    /// redelivery will retry it.
    #[error("downstream consumer rejected batch: {0}")]
    Downstream(#[source] anyhow::Error),

    /// Any other consumer failure.
    #[error("consumer failed: {0}")]
    Other(#[source] anyhow::Error),
}
