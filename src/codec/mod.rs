// Payload codec selection and wire headers.
//
// The OTLP object model and its serializers are external: protobuf via
// prost, OTLP/JSON via serde. This module only negotiates which one a
// message uses and tags outgoing messages accordingly.

use crate::error::CodecError;
use crate::signal::{Signal, TelemetryBatch};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use prost::Message;

/// Header carrying the payload encoding marker.
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Header carrying the signal type of the payload.
pub const HEADER_SIGNAL: &str = "otel-signal";

pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Wire encoding of a telemetry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Protobuf,
    Json,
}

impl Encoding {
    /// Selects the encoding from a content-type header value.
    ///
    /// The JSON marker selects JSON; anything else, including an absent
    /// header, defaults to protobuf.
    pub fn from_content_type(value: Option<&str>) -> Self {
        match value {
            Some(CONTENT_TYPE_JSON) => Encoding::Json,
            _ => Encoding::Protobuf,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Protobuf => CONTENT_TYPE_PROTOBUF,
            Encoding::Json => CONTENT_TYPE_JSON,
        }
    }
}

/// Decodes payload bytes into a typed batch for the given signal.
///
/// Failures are permanent: the same bytes will never decode on retry.
/// Callers attach the originating subject when reporting the error.
pub fn decode(signal: Signal, encoding: Encoding, payload: &[u8]) -> Result<TelemetryBatch, CodecError> {
    match (signal, encoding) {
        (Signal::Traces, Encoding::Protobuf) => TracesData::decode(payload)
            .map(TelemetryBatch::Traces)
            .map_err(|source| CodecError::ProtoDecode { signal, source }),
        (Signal::Metrics, Encoding::Protobuf) => MetricsData::decode(payload)
            .map(TelemetryBatch::Metrics)
            .map_err(|source| CodecError::ProtoDecode { signal, source }),
        (Signal::Logs, Encoding::Protobuf) => LogsData::decode(payload)
            .map(TelemetryBatch::Logs)
            .map_err(|source| CodecError::ProtoDecode { signal, source }),
        (Signal::Traces, Encoding::Json) => serde_json::from_slice(payload)
            .map(TelemetryBatch::Traces)
            .map_err(|source| CodecError::JsonDecode { signal, source }),
        (Signal::Metrics, Encoding::Json) => serde_json::from_slice(payload)
            .map(TelemetryBatch::Metrics)
            .map_err(|source| CodecError::JsonDecode { signal, source }),
        (Signal::Logs, Encoding::Json) => serde_json::from_slice(payload)
            .map(TelemetryBatch::Logs)
            .map_err(|source| CodecError::JsonDecode { signal, source }),
    }
}

/// Encodes a typed batch into payload bytes.
pub fn encode(batch: &TelemetryBatch, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
    match encoding {
        Encoding::Protobuf => Ok(match batch {
            TelemetryBatch::Traces(td) => td.encode_to_vec(),
            TelemetryBatch::Metrics(md) => md.encode_to_vec(),
            TelemetryBatch::Logs(ld) => ld.encode_to_vec(),
        }),
        Encoding::Json => {
            let signal = batch.signal();
            match batch {
                TelemetryBatch::Traces(td) => serde_json::to_vec(td),
                TelemetryBatch::Metrics(md) => serde_json::to_vec(md),
                TelemetryBatch::Logs(ld) => serde_json::to_vec(ld),
            }
            .map_err(|source| CodecError::JsonEncode { signal, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traces_payload() -> TelemetryBatch {
        TelemetryBatch::Traces(TracesData {
            resource_spans: vec![Default::default()],
        })
    }

    #[test]
    fn content_type_negotiation() {
        assert_eq!(
            Encoding::from_content_type(Some(CONTENT_TYPE_JSON)),
            Encoding::Json
        );
        assert_eq!(
            Encoding::from_content_type(Some(CONTENT_TYPE_PROTOBUF)),
            Encoding::Protobuf
        );
        // Absent or unknown markers default to protobuf
        assert_eq!(Encoding::from_content_type(None), Encoding::Protobuf);
        assert_eq!(
            Encoding::from_content_type(Some("text/plain")),
            Encoding::Protobuf
        );
    }

    #[test]
    fn protobuf_roundtrip() {
        let batch = traces_payload();
        let bytes = encode(&batch, Encoding::Protobuf).unwrap();
        let decoded = decode(Signal::Traces, Encoding::Protobuf, &bytes).unwrap();
        assert_eq!(decoded.signal(), Signal::Traces);
        assert!(matches!(decoded, TelemetryBatch::Traces(td) if td.resource_spans.len() == 1));
    }

    #[test]
    fn json_roundtrip() {
        let batch = traces_payload();
        let bytes = encode(&batch, Encoding::Json).unwrap();
        let decoded = decode(Signal::Traces, Encoding::Json, &bytes).unwrap();
        assert_eq!(decoded.signal(), Signal::Traces);
    }

    #[test]
    fn garbage_payload_fails_permanently() {
        let err = decode(Signal::Metrics, Encoding::Json, b"{not json").unwrap_err();
        assert!(matches!(
            err,
            CodecError::JsonDecode {
                signal: Signal::Metrics,
                ..
            }
        ));
    }
}
