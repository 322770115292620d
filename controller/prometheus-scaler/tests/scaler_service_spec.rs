//! End-to-end tests for the external scaler gRPC service
//!
//! A wiremock server stands in for Prometheus; the scaler runs on an
//! in-process tonic server and is driven through the generated client.

use prometheus_scaler::proto::external_scaler_client::ExternalScalerClient;
use prometheus_scaler::proto::{GetMetricsRequest, ScaledObjectRef};
use prometheus_scaler::{server, BackendConfig, QueryExecutor, ScalerService};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

struct Harness {
    client: ExternalScalerClient<Channel>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    async fn start(prometheus: &MockServer, query: &str) -> Self {
        let backend = BackendConfig::new(&prometheus.uri(), query).unwrap();
        let executor = QueryExecutor::new(backend, Duration::from_secs(5)).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(server::serve(listener, ScalerService::new(executor), async {
            let _ = rx.await;
        }));

        let client = ExternalScalerClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        Self {
            client,
            shutdown,
            server,
        }
    }

    async fn stop(self) {
        drop(self.client);
        let _ = self.shutdown.send(());
        self.server.await.unwrap().unwrap();
    }
}

fn scaled_object() -> ScaledObjectRef {
    ScaledObjectRef {
        name: "worker".to_string(),
        namespace: "default".to_string(),
        scaler_metadata: Default::default(),
    }
}

async fn mount_result(prometheus: &MockServer, result: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", "up"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "vector", "result": result}
        })))
        .mount(prometheus)
        .await;
}

#[tokio::test]
async fn test_single_sample_scenario() {
    let prometheus = MockServer::start().await;
    mount_result(
        &prometheus,
        json!([{"metric": {}, "value": [1700000000, "1"]}]),
    )
    .await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let active = harness
        .client
        .is_active(scaled_object())
        .await
        .unwrap()
        .into_inner();
    assert!(active.result);

    let metrics = harness
        .client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(scaled_object()),
            metric_name: "Prometheus Metric".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(metrics.metric_values.len(), 1);
    assert_eq!(metrics.metric_values[0].metric_name, "Prometheus Metric");
    assert_eq!(metrics.metric_values[0].metric_value, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_empty_result_scenario() {
    let prometheus = MockServer::start().await;
    mount_result(&prometheus, json!([])).await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let active = harness
        .client
        .is_active(scaled_object())
        .await
        .unwrap()
        .into_inner();
    assert!(!active.result);

    let metrics = harness
        .client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(scaled_object()),
            metric_name: String::new(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(metrics.metric_values[0].metric_value, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_metric_spec_needs_no_backend() {
    let prometheus = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&prometheus)
        .await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let spec = harness
        .client
        .get_metric_spec(scaled_object())
        .await
        .unwrap()
        .into_inner();
    assert_eq!(spec.metric_specs.len(), 1);
    assert_eq!(spec.metric_specs[0].metric_name, "Prometheus Query Target");
    assert_eq!(spec.metric_specs[0].target_size, 3);

    harness.stop().await;
}

#[tokio::test]
async fn test_backend_failure_is_internal_status() {
    let prometheus = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&prometheus)
        .await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let status = harness
        .client
        .is_active(scaled_object())
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);
    assert!(status.message().contains("500"));
    assert!(status.message().contains("boom"));

    let status = harness
        .client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(scaled_object()),
            metric_name: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);

    harness.stop().await;
}

#[tokio::test]
async fn test_ambiguous_result_is_internal_status() {
    let prometheus = MockServer::start().await;
    mount_result(
        &prometheus,
        json!([
            {"metric": {"pod": "a"}, "value": [1700000000, "1"]},
            {"metric": {"pod": "b"}, "value": [1700000000, "3"]}
        ]),
    )
    .await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let status = harness
        .client
        .is_active(scaled_object())
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);
    assert!(status.message().contains("multiple elements"));

    harness.stop().await;
}

#[tokio::test]
async fn test_stream_opens_and_closes_cleanly() {
    let prometheus = MockServer::start().await;
    mount_result(
        &prometheus,
        json!([{"metric": {}, "value": [1700000000, "5"]}]),
    )
    .await;

    let mut harness = Harness::start(&prometheus, "up").await;

    let mut stream = harness
        .client
        .stream_is_active(scaled_object())
        .await
        .unwrap()
        .into_inner();

    // The first poll is an hour away, so nothing arrives yet.
    let next = tokio::time::timeout(Duration::from_millis(200), stream.message()).await;
    assert!(next.is_err());

    drop(stream);
    harness.stop().await;

    let requests = prometheus.received_requests().await.unwrap();
    assert!(requests.is_empty());
}
