//! Shared OTLP payload extraction (spec.md §4.4), used by both the gRPc and
//! HTTP transports so the two listeners implement one logical protocol.

use crate::domain::{Event, Metric, SessionId, Timestamp};
use crate::pricing::PricingTable;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value::Value as AnyValue, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{metric::Data, number_data_point::Value as NumberValue};
use std::collections::HashMap;

/// One extracted metric or log record, bound to the session that emitted it.
pub enum ExtractedRecord {
    Metric { session_id: SessionId, metric: Metric },
    Event { session_id: SessionId, event: Event },
    /// Dropped because no session-id attribute was present (spec.md §4.4 step 3).
    MissingSessionId,
}

/// Extract metric data points from an `ExportMetricsServiceRequest`.
#[must_use]
pub fn extract_metrics(
    request: &ExportMetricsServiceRequest,
    session_attr_key: &str,
    pricing: &PricingTable,
) -> Vec<ExtractedRecord> {
    let mut out = Vec::new();

    for resource_metrics in &request.resource_metrics {
        let resource_attrs = resource_metrics
            .resource
            .as_ref()
            .map(|r| attrs_to_map(&r.attributes))
            .unwrap_or_default();

        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                let Some(data) = &metric.data else { continue };
                for point in number_data_points(data) {
                    let mut attrs = resource_attrs.clone();
                    attrs.extend(attrs_to_map(&point.attributes));

                    let Some(session_id) = attrs.get(session_attr_key).cloned() else {
                        out.push(ExtractedRecord::MissingSessionId);
                        continue;
                    };

                    let value = match point.value {
                        Some(NumberValue::AsDouble(v)) => v,
                        Some(NumberValue::AsInt(v)) => v as f64,
                        None => 0.0,
                    };

                    let timestamp = Timestamp::from_secs(point.time_unix_nano as f64 / 1e9);

                    // Backfill cost when the point carries tokens but no price, by
                    // emitting a sibling `cost_usd` metric rather than mutating this
                    // one — `SessionStore::cost_contribution` only recognizes a
                    // metric whose name is literally "cost_usd".
                    if metric.name.ends_with("_tokens") && !attrs.contains_key("cost_usd") {
                        if let Some(model) = attrs.get("model") {
                            if let Some(estimated) = pricing.estimate_cost(model, &metric.name, value) {
                                out.push(ExtractedRecord::Metric {
                                    session_id: SessionId::from(session_id.clone()),
                                    metric: Metric {
                                        name: "cost_usd".to_string(),
                                        value: estimated,
                                        attributes: attrs.clone(),
                                        timestamp,
                                    },
                                });
                            }
                        }
                    }

                    out.push(ExtractedRecord::Metric {
                        session_id: SessionId::from(session_id),
                        metric: Metric {
                            name: metric.name.clone(),
                            value,
                            attributes: attrs,
                            timestamp,
                        },
                    });
                }
            }
        }
    }

    out
}

fn number_data_points(
    data: &Data,
) -> Vec<&opentelemetry_proto::tonic::metrics::v1::NumberDataPoint> {
    match data {
        Data::Gauge(gauge) => gauge.data_points.iter().collect(),
        Data::Sum(sum) => sum.data_points.iter().collect(),
        _ => Vec::new(),
    }
}

/// Extract log records from an `ExportLogsServiceRequest`.
#[must_use]
pub fn extract_logs(request: &ExportLogsServiceRequest, session_attr_key: &str) -> Vec<ExtractedRecord> {
    let mut out = Vec::new();

    for resource_logs in &request.resource_logs {
        let resource_attrs = resource_logs
            .resource
            .as_ref()
            .map(|r| attrs_to_map(&r.attributes))
            .unwrap_or_default();

        for scope_logs in &resource_logs.scope_logs {
            for record in &scope_logs.log_records {
                let mut attrs = resource_attrs.clone();
                attrs.extend(attrs_to_map(&record.attributes));

                let Some(session_id) = attrs.get(session_attr_key).cloned() else {
                    out.push(ExtractedRecord::MissingSessionId);
                    continue;
                };

                // `LogRecord` carries no dedicated event-name field; the short
                // event type lives in the `event.name` attribute instead.
                let name = attrs.get("event.name").cloned().unwrap_or_else(|| "unknown".to_string());

                out.push(ExtractedRecord::Event {
                    session_id: SessionId::from(session_id),
                    event: Event {
                        name,
                        attributes: attrs,
                        timestamp: Timestamp::from_secs(record.time_unix_nano as f64 / 1e9),
                    },
                });
            }
        }
    }

    out
}

fn attrs_to_map(kvs: &[KeyValue]) -> HashMap<String, String> {
    kvs.iter()
        .filter_map(|kv| {
            let value = kv.value.as_ref()?.value.as_ref()?;
            Some((kv.key.clone(), any_value_to_string(value)))
        })
        .collect()
}

fn any_value_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::StringValue(s) => s.clone(),
        AnyValue::BoolValue(b) => b.to_string(),
        AnyValue::IntValue(i) => i.to_string(),
        AnyValue::DoubleValue(d) => d.to_string(),
        AnyValue::ArrayValue(_) | AnyValue::KvlistValue(_) | AnyValue::BytesValue(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue as ProtoAnyValue, KeyValue};
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
    use opentelemetry_proto::tonic::metrics::v1::{
        metric::Data as ProtoData, Gauge, Metric as ProtoMetric, NumberDataPoint, ResourceMetrics,
        ScopeMetrics,
    };
    use std::collections::HashMap as StdHashMap;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(ProtoAnyValue { value: Some(any_value::Value::StringValue(value.to_string())) }),
        }
    }

    fn token_metrics_request(name: &str, model: &str, tokens: f64) -> ExportMetricsServiceRequest {
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![ProtoMetric {
                        name: name.to_string(),
                        data: Some(ProtoData::Gauge(Gauge {
                            data_points: vec![NumberDataPoint {
                                attributes: vec![kv("session.id", "sess-1"), kv("model", model)],
                                value: Some(NumberValue::AsDouble(tokens)),
                                ..Default::default()
                            }],
                        })),
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn extract_logs_drops_records_without_session_id() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: None,
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![LogRecord { attributes: vec![kv("foo", "bar")], ..Default::default() }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };
        let extracted = extract_logs(&request, "session.id");
        assert_eq!(extracted.len(), 1);
        assert!(matches!(extracted[0], ExtractedRecord::MissingSessionId));
    }

    #[test]
    fn extract_logs_binds_session_id_from_attributes() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: None,
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![LogRecord {
                        attributes: vec![kv("session.id", "sess-abc"), kv("event.name", "api_error")],
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };
        let extracted = extract_logs(&request, "session.id");
        assert_eq!(extracted.len(), 1);
        match &extracted[0] {
            ExtractedRecord::Event { session_id, event } => {
                assert_eq!(session_id, &SessionId::from("sess-abc"));
                assert_eq!(event.name, "api_error");
            }
            _ => panic!("expected Event"),
        }
    }

    #[test]
    fn extract_metrics_backfills_cost_as_sibling_metric() {
        let mut prices = StdHashMap::new();
        prices.insert(
            "claude-opus".to_string(),
            crate::pricing::ModelPrice { input_per_1k: 0.015, output_per_1k: 0.075 },
        );
        let pricing = PricingTable::new(prices);
        let request = token_metrics_request("input_tokens", "claude-opus", 2000.0);

        let extracted = extract_metrics(&request, "session.id", &pricing);
        assert_eq!(extracted.len(), 2);

        let names: Vec<&str> = extracted
            .iter()
            .filter_map(|r| match r {
                ExtractedRecord::Metric { metric, .. } => Some(metric.name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"input_tokens"));
        assert!(names.contains(&"cost_usd"));

        let cost = extracted.iter().find_map(|r| match r {
            ExtractedRecord::Metric { metric, .. } if metric.name == "cost_usd" => Some(metric.value),
            _ => None,
        });
        assert!((cost.unwrap() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn extract_metrics_skips_cost_backfill_for_unpriced_model() {
        let pricing = PricingTable::default();
        let request = token_metrics_request("input_tokens", "unknown-model", 2000.0);
        let extracted = extract_metrics(&request, "session.id", &pricing);
        assert_eq!(extracted.len(), 1);
    }
}
