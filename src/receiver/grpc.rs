//! gRPC transport for the Receiver (spec.md §4.4, §6).

use crate::domain::Port;
use crate::receiver::otlp::{extract_logs, extract_metrics};
use crate::receiver::Receiver;
use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_server::LogsService, ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_server::MetricsService, ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct MetricsGrpcService {
    pub receiver: Arc<Receiver>,
}

#[tonic::async_trait]
impl MetricsService for MetricsGrpcService {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let source_port = source_port_of(&request);
        let payload = request.into_inner();
        self.receiver.debug_dump(&payload);

        let records = extract_metrics(&payload, &self.receiver.session_attr_key, &self.receiver.pricing);
        self.receiver.ingest_metrics(records, source_port).await;

        Ok(Response::new(ExportMetricsServiceResponse { partial_success: None }))
    }
}

pub struct LogsGrpcService {
    pub receiver: Arc<Receiver>,
}

#[tonic::async_trait]
impl LogsService for LogsGrpcService {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let source_port = source_port_of(&request);
        let payload = request.into_inner();

        let records = extract_logs(&payload, &self.receiver.session_attr_key);
        self.receiver.ingest_events(records, source_port).await;

        Ok(Response::new(ExportLogsServiceResponse { partial_success: None }))
    }
}

fn source_port_of<T>(request: &Request<T>) -> Option<Port> {
    request.remote_addr().map(|addr| Port(addr.port()))
}

