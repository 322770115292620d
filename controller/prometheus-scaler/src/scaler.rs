//! External scaler gRPC service
//!
//! Maps the four contract operations onto a [`MetricSource`]. Synchronous
//! calls surface query failures as `Internal` statuses; streams swallow them
//! and keep polling.

use crate::metrics::Metrics;
use crate::proto::external_scaler_server::{ExternalScaler, ExternalScalerServer};
use crate::proto::{
    GetMetricSpecResponse, GetMetricsRequest, GetMetricsResponse, IsActiveResponse, MetricSpec,
    MetricValue, ScaledObjectRef,
};
use crate::query::{MetricSignal, MetricSource, QueryExecutor};
use crate::watch::{ActivityWatch, STREAM_POLL_INTERVAL};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info_span, Instrument, Span};

/// Metric name reported by GetMetricSpec
pub const METRIC_SPEC_NAME: &str = "Prometheus Query Target";
/// Target value per replica reported by GetMetricSpec
pub const METRIC_TARGET_SIZE: i64 = 3;
/// Metric name reported by GetMetrics
pub const METRIC_VALUE_NAME: &str = "Prometheus Metric";

const STREAM_BUFFER: usize = 4;

/// gRPC implementation of the external scaler contract
pub struct ScalerService<S = QueryExecutor> {
    source: Arc<S>,
    span: Span,
    metrics: Metrics,
}

impl<S: MetricSource + 'static> ScalerService<S> {
    /// Create a service logging under a `prometheus_scaler` span
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            span: info_span!("prometheus_scaler"),
            metrics: Metrics,
        }
    }

    /// Route this service's logs through `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> ExternalScalerServer<Self> {
        ExternalScalerServer::new(self)
    }

    async fn evaluate(&self, operation: &'static str) -> Result<MetricSignal, Status> {
        let started = Instant::now();

        match self.source.execute().await {
            Ok(signal) => {
                self.metrics
                    .record_query(operation, "ok", started.elapsed());
                debug!(value = signal.value(), "Prometheus query evaluated");
                Ok(signal)
            }
            Err(e) => {
                self.metrics
                    .record_query(operation, e.kind(), started.elapsed());
                error!(error_kind = e.kind(), error = %e, "error executing prometheus query");
                Err(Status::internal(e.to_string()))
            }
        }
    }

    fn call_span(&self, operation: &'static str, target: Option<&ScaledObjectRef>) -> Span {
        info_span!(
            parent: &self.span,
            "scaler_call",
            operation = operation,
            target_name = %describe(target)
        )
    }
}

/// `namespace/name` of the scaled object, for logs only
fn describe(target: Option<&ScaledObjectRef>) -> String {
    match target {
        Some(t) if t.namespace.is_empty() => t.name.clone(),
        Some(t) => format!("{}/{}", t.namespace, t.name),
        None => "<unknown>".to_string(),
    }
}

#[tonic::async_trait]
impl<S: MetricSource + 'static> ExternalScaler for ScalerService<S> {
    async fn is_active(
        &self,
        request: Request<ScaledObjectRef>,
    ) -> Result<Response<IsActiveResponse>, Status> {
        let span = self.call_span("is_active", Some(request.get_ref()));

        async {
            let signal = self.evaluate("is_active").await?;
            Ok::<_, Status>(Response::new(IsActiveResponse {
                result: signal.is_active(),
            }))
        }
        .instrument(span)
        .await
    }

    type StreamIsActiveStream = ReceiverStream<Result<IsActiveResponse, Status>>;

    async fn stream_is_active(
        &self,
        request: Request<ScaledObjectRef>,
    ) -> Result<Response<Self::StreamIsActiveStream>, Status> {
        let target = describe(Some(request.get_ref()));
        let span = self.call_span("stream_is_active", Some(request.get_ref()));

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let watch = ActivityWatch::new(
            self.source.clone(),
            STREAM_POLL_INTERVAL,
            tx,
            target.clone(),
            self.metrics.clone(),
        );

        span.in_scope(|| self.metrics.record_stream_opened(&target));
        tokio::spawn(watch.run().instrument(span));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_metric_spec(
        &self,
        _request: Request<ScaledObjectRef>,
    ) -> Result<Response<GetMetricSpecResponse>, Status> {
        Ok(Response::new(GetMetricSpecResponse {
            metric_specs: vec![MetricSpec {
                metric_name: METRIC_SPEC_NAME.to_string(),
                target_size: METRIC_TARGET_SIZE,
            }],
        }))
    }

    async fn get_metrics(
        &self,
        request: Request<GetMetricsRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let span = self.call_span("get_metrics", request.get_ref().scaled_object_ref.as_ref());

        async {
            let signal = self.evaluate("get_metrics").await?;
            Ok::<_, Status>(Response::new(GetMetricsResponse {
                metric_values: vec![MetricValue {
                    metric_name: METRIC_VALUE_NAME.to_string(),
                    metric_value: signal.value() as i64,
                }],
            }))
        }
        .instrument(span)
        .await
    }
}
