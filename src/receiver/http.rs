//! HTTP transport for the Receiver (spec.md §4.4, §6): `/v1/metrics` and
//! `/v1/logs`, the OTLP/HTTP-protobuf endpoints.

use crate::domain::Port;
use crate::receiver::otlp::{extract_logs, extract_metrics};
use crate::receiver::Receiver;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use prost::Message;
use std::net::SocketAddr;
use std::sync::Arc;

pub fn router(receiver: Arc<Receiver>) -> Router {
    Router::new()
        .route("/v1/metrics", post(handle_metrics))
        .route("/v1/logs", post(handle_logs))
        .with_state(receiver)
}

async fn handle_metrics(
    State(receiver): State<Arc<Receiver>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> Result<StatusCode, StatusCode> {
    let payload =
        ExportMetricsServiceRequest::decode(body).map_err(|_| StatusCode::BAD_REQUEST)?;
    receiver.debug_dump(&payload);
    let records = extract_metrics(&payload, &receiver.session_attr_key, &receiver.pricing);
    receiver.ingest_metrics(records, Some(Port(addr.port()))).await;
    Ok(StatusCode::OK)
}

async fn handle_logs(
    State(receiver): State<Arc<Receiver>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> Result<StatusCode, StatusCode> {
    let payload = ExportLogsServiceRequest::decode(body).map_err(|_| StatusCode::BAD_REQUEST)?;
    let records = extract_logs(&payload, &receiver.session_attr_key);
    receiver.ingest_events(records, Some(Port(addr.port()))).await;
    Ok(StatusCode::OK)
}
