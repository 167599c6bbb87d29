// NATS adapters for OTLP telemetry batches: an ingress receiver
// (broker → pipeline) and an egress exporter (pipeline → broker).

// Signal tags and the telemetry batch union
pub mod signal;

// Error taxonomy
pub mod error;

// Configuration schema and validation
pub mod config;

// Payload codec negotiation
pub mod codec;

// NATS connection and subject handling
pub mod nats;

// Token-bucket admission control for durable consumption
pub mod rate_limit;

// Shutdown and in-flight handler coordination
pub mod lifecycle;

// Egress adapter
pub mod exporter;

// Ingress adapter
pub mod receiver;

pub use config::{ClientConfig, ExporterConfig, ReceiverConfig};
pub use error::{CodecError, ConfigError, ConsumeError, PublishError};
pub use exporter::NatsExporter;
pub use receiver::{BatchConsumer, DeliveryMode, NatsReceiver};
pub use signal::{Signal, TelemetryBatch};
