//! `Receiver` (spec.md §4.4): accepts OTLP payloads on gRPC and HTTP,
//! routes extracted records into the `SessionStore`, and reports every
//! distinct source port to the `Correlator`. The `SessionStore`'s own
//! `on_event` subscription (wired up by the caller) is what feeds the
//! `EventRingBuffer` — this module no longer touches the ring buffer
//! directly.

pub mod format;
mod grpc;
mod http;
pub mod otlp;

use crate::correlator::Correlator;
use crate::domain::{Port, SessionId};
use crate::pricing::PricingTable;
use crate::store::SessionStore;
use otlp::ExtractedRecord;
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::LogsServiceServer;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::MetricsServiceServer;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Receiver {
    store: Arc<SessionStore>,
    correlator: Arc<Correlator>,
    pub session_attr_key: String,
    pub pricing: PricingTable,
    dropped_without_session: AtomicU64,
    debug_sink: Option<StdMutex<std::fs::File>>,
}

impl Receiver {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        correlator: Arc<Correlator>,
        session_attr_key: String,
        pricing: PricingTable,
        debug_path: Option<&std::path::Path>,
    ) -> std::io::Result<Self> {
        let debug_sink = debug_path
            .map(|p| std::fs::OpenOptions::new().create(true).append(true).open(p))
            .transpose()?
            .map(StdMutex::new);

        Ok(Self {
            store,
            correlator,
            session_attr_key,
            pricing,
            dropped_without_session: AtomicU64::new(0),
            debug_sink,
        })
    }

    #[must_use]
    pub fn dropped_without_session(&self) -> u64 {
        self.dropped_without_session.load(Ordering::Relaxed)
    }

    /// Appends the raw payload as a JSON line when `--debug <path>` is set (spec.md §6).
    pub fn debug_dump<T: serde::Serialize>(&self, payload: &T) {
        let Some(sink) = &self.debug_sink else { return };
        let Ok(line) = serde_json::to_string(payload) else { return };
        if let Ok(mut file) = sink.lock() {
            let _ = writeln!(file, "{line}");
        }
    }

    /// Records the source port's session binding. `Correlator::record_connection`
    /// is itself idempotent under connection reuse (spec.md §4.4 step 5), so no
    /// additional dedup is needed here.
    fn record_connection_once(&self, source_port: Option<Port>, session_id: &SessionId) {
        let Some(port) = source_port else { return };
        self.correlator.record_connection(port, session_id.clone());
    }

    pub async fn ingest_metrics(&self, records: Vec<ExtractedRecord>, source_port: Option<Port>) {
        for record in records {
            match record {
                ExtractedRecord::Metric { session_id, metric } => {
                    self.record_connection_once(source_port, &session_id);
                    self.store.add_metric(session_id, metric).await;
                }
                ExtractedRecord::MissingSessionId => {
                    self.dropped_without_session.fetch_add(1, Ordering::Relaxed);
                }
                ExtractedRecord::Event { .. } => {}
            }
        }
    }

    pub async fn ingest_events(&self, records: Vec<ExtractedRecord>, source_port: Option<Port>) {
        for record in records {
            match record {
                ExtractedRecord::Event { session_id, event } => {
                    self.record_connection_once(source_port, &session_id);
                    self.store.add_event(session_id, event).await;
                }
                ExtractedRecord::MissingSessionId => {
                    self.dropped_without_session.fetch_add(1, Ordering::Relaxed);
                }
                ExtractedRecord::Metric { .. } => {}
            }
        }
    }

    /// Binds both listeners and serves until `cancel` fires, draining
    /// in-flight requests for up to 5s before forcing closure (spec.md §4.4, §5).
    pub async fn start(
        self: Arc<Self>,
        grpc_addr: SocketAddr,
        http_addr: SocketAddr,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let grpc_cancel = cancel.clone();
        let grpc_receiver = self.clone();
        let grpc_task = tokio::spawn(async move {
            let metrics_svc = MetricsServiceServer::new(grpc::MetricsGrpcService { receiver: grpc_receiver.clone() });
            let logs_svc = LogsServiceServer::new(grpc::LogsGrpcService { receiver: grpc_receiver });
            let result = tonic::transport::Server::builder()
                .add_service(metrics_svc)
                .add_service(logs_svc)
                .serve_with_shutdown(grpc_addr, grpc_cancel.cancelled())
                .await;
            if let Err(err) = result {
                error!(%err, "gRPC receiver exited with error");
            }
        });

        let http_cancel = cancel.clone();
        let http_router = http::router(self.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        let http_task = tokio::spawn(async move {
            let result = axum::serve(listener, http_router)
                .with_graceful_shutdown(async move { http_cancel.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(%err, "HTTP receiver exited with error");
            }
        });

        info!(%grpc_addr, %http_addr, "receiver listening");
        cancel.cancelled().await;

        let drain = Duration::from_secs(5);
        let _ = tokio::time::timeout(drain, async {
            let _ = grpc_task.await;
            let _ = http_task.await;
        })
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Metric, Timestamp};
    use std::collections::HashMap;

    fn receiver() -> Receiver {
        Receiver::new(
            Arc::new(SessionStore::new()),
            Arc::new(Correlator::new(Port(4317), 10.0)),
            "session.id".to_string(),
            PricingTable::default(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_session_id_increments_dropped_counter() {
        let r = receiver();
        r.ingest_metrics(vec![ExtractedRecord::MissingSessionId], None).await;
        assert_eq!(r.dropped_without_session(), 1);
    }

    #[tokio::test]
    async fn metric_with_session_id_reaches_store() {
        let r = receiver();
        let metric = Metric {
            name: "cost_usd".to_string(),
            value: 0.5,
            attributes: HashMap::new(),
            timestamp: Timestamp::now(),
        };
        r.ingest_metrics(
            vec![ExtractedRecord::Metric { session_id: SessionId::from("sess-1"), metric }],
            Some(Port(5000)),
        )
        .await;
        let session = r.store.get_session(&SessionId::from("sess-1")).await.unwrap();
        assert!((session.total_cost - 0.5).abs() < 1e-9);
    }
}
