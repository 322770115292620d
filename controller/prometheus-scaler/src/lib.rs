//! Prometheus External Scaler - drives autoscaling decisions from a Prometheus query
//!
//! This service implements the external scaler gRPC contract (IsActive,
//! GetMetricSpec, GetMetrics, StreamIsActive). Every call evaluates one
//! configured query against the Prometheus HTTP API and translates the single
//! sample it returns into the contract's response shape.

pub mod config;
pub mod metrics;
pub mod query;
pub mod scaler;
pub mod server;
pub mod watch;

#[cfg(test)]
mod testing;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("externalscaler");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("externalscaler_descriptor");
}

pub use config::{BackendConfig, Config};
pub use metrics::Metrics;
pub use query::{MetricSignal, MetricSource, QueryError, QueryExecutor};
pub use scaler::ScalerService;
pub use watch::{ActivityWatch, WatchState, STREAM_POLL_INTERVAL};
