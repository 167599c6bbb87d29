use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::metric;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use std::collections::HashMap;
use std::fmt;

/// Telemetry signal type. Each adapter behavior that differs per signal
/// (subject, queue group, JetStream block, codec entry point) is selected
/// by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded telemetry batch, tagged by signal.
///
/// The payload types come from the external OTLP object model; this crate
/// never inspects them beyond resource attributes and item counts.
#[derive(Debug, Clone)]
pub enum TelemetryBatch {
    Traces(TracesData),
    Metrics(MetricsData),
    Logs(LogsData),
}

impl TelemetryBatch {
    pub fn signal(&self) -> Signal {
        match self {
            TelemetryBatch::Traces(_) => Signal::Traces,
            TelemetryBatch::Metrics(_) => Signal::Metrics,
            TelemetryBatch::Logs(_) => Signal::Logs,
        }
    }

    /// Number of spans, data points, or log records in the batch.
    pub fn item_count(&self) -> usize {
        match self {
            TelemetryBatch::Traces(td) => td
                .resource_spans
                .iter()
                .flat_map(|rs| &rs.scope_spans)
                .map(|ss| ss.spans.len())
                .sum(),
            TelemetryBatch::Metrics(md) => md
                .resource_metrics
                .iter()
                .flat_map(|rm| &rm.scope_metrics)
                .flat_map(|sm| &sm.metrics)
                .map(|m| match &m.data {
                    Some(metric::Data::Gauge(g)) => g.data_points.len(),
                    Some(metric::Data::Sum(s)) => s.data_points.len(),
                    Some(metric::Data::Histogram(h)) => h.data_points.len(),
                    Some(metric::Data::ExponentialHistogram(e)) => e.data_points.len(),
                    Some(metric::Data::Summary(s)) => s.data_points.len(),
                    None => 0,
                })
                .sum(),
            TelemetryBatch::Logs(ld) => ld
                .resource_logs
                .iter()
                .flat_map(|rl| &rl.scope_logs)
                .map(|sl| sl.log_records.len())
                .sum(),
        }
    }

    /// Attributes of the batch's first resource entry, stringified.
    ///
    /// Used as the substitution source for `${attr:key}` subject template
    /// placeholders. Composite attribute values (arrays, kvlists, bytes)
    /// are skipped: they cannot appear in a subject.
    pub fn resource_attributes(&self) -> HashMap<String, String> {
        let attrs = match self {
            TelemetryBatch::Traces(td) => td
                .resource_spans
                .first()
                .and_then(|rs| rs.resource.as_ref())
                .map(|r| &r.attributes),
            TelemetryBatch::Metrics(md) => md
                .resource_metrics
                .first()
                .and_then(|rm| rm.resource.as_ref())
                .map(|r| &r.attributes),
            TelemetryBatch::Logs(ld) => ld
                .resource_logs
                .first()
                .and_then(|rl| rl.resource.as_ref())
                .map(|r| &r.attributes),
        };

        attrs
            .map(|attrs| stringify_attributes(attrs))
            .unwrap_or_default()
    }
}

fn stringify_attributes(attrs: &[KeyValue]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for kv in attrs {
        let value = match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(any_value::Value::StringValue(s)) => s.clone(),
            Some(any_value::Value::BoolValue(b)) => b.to_string(),
            Some(any_value::Value::IntValue(i)) => i.to_string(),
            Some(any_value::Value::DoubleValue(d)) => d.to_string(),
            _ => continue,
        };
        out.insert(kv.key.clone(), value);
    }
    out
}
