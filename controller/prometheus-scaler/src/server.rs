//! gRPC host shell
//!
//! Mounts the external scaler service and gRPC reflection on a tonic server.

use crate::proto::FILE_DESCRIPTOR_SET;
use crate::query::MetricSource;
use crate::scaler::ScalerService;
use anyhow::{Context, Result};
use std::future::Future;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

/// Serve the scaler on an already-bound listener until `shutdown` resolves
pub async fn serve<S, F>(listener: TcpListener, scaler: ScalerService<S>, shutdown: F) -> Result<()>
where
    S: MetricSource + 'static,
    F: Future<Output = ()>,
{
    let reflection_v1 = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .context("Failed to build gRPC reflection service")?;
    let reflection_v1alpha = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1alpha()
        .context("Failed to build gRPC reflection service")?;

    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(%addr, "External scaler listening");

    Server::builder()
        .add_service(reflection_v1)
        .add_service(reflection_v1alpha)
        .add_service(scaler.into_service())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .context("gRPC server failed")?;

    info!("External scaler stopped");
    Ok(())
}
