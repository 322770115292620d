//! Prometheus query execution
//!
//! [`QueryExecutor`] evaluates the configured query against the instant-query
//! API and reduces the response to a single [`MetricSignal`]. Nothing is
//! cached: every call issues a fresh request stamped with the current time.

use crate::config::BackendConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Numeric value reported alongside a failed query.
pub const ERROR_SENTINEL: f64 = -1.0;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Prometheus request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("prometheus query api returned error. status: {status} response: {body}")]
    Backend { status: u16, body: String },

    #[error("Invalid Prometheus response format: {source}")]
    MalformedResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("prometheus query {query} returned multiple elements ({count} series)")]
    AmbiguousResult { query: String, count: usize },

    #[error("Failed to convert prometheus value {value:?}: {source}")]
    ValueParse {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

impl QueryError {
    /// Short stable label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Transport { .. } => "transport",
            QueryError::Backend { .. } => "backend",
            QueryError::MalformedResponse { .. } => "malformed_response",
            QueryError::AmbiguousResult { .. } => "ambiguous_result",
            QueryError::ValueParse { .. } => "value_parse",
        }
    }
}

/// Signal derived from one query evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSignal {
    /// The single returned series carried a parseable value.
    Value(f64),
    /// The query matched no series.
    NoData,
    /// The single returned series had no value string.
    Unknown,
}

impl MetricSignal {
    /// Flat numeric view: no data reads as 0, an unknown value as -1.
    pub fn value(self) -> f64 {
        match self {
            MetricSignal::Value(v) => v,
            MetricSignal::NoData => 0.0,
            MetricSignal::Unknown => ERROR_SENTINEL,
        }
    }

    pub fn is_active(self) -> bool {
        self.value() > 0.0
    }
}

/// Instant-query response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub status: String,
    #[serde(default)]
    pub data: QueryData,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    #[serde(default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Series>,
}

/// One series of a vector result
#[derive(Debug, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    pub value: Sample,
}

/// `[<unix timestamp>, "<value>"]`
#[derive(Debug, Deserialize)]
pub struct Sample(pub f64, pub Option<String>);

impl QueryResult {
    pub fn from_slice(body: &[u8]) -> Result<Self, QueryError> {
        serde_json::from_slice(body).map_err(|source| QueryError::MalformedResponse { source })
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Error text reported by Prometheus for a non-success envelope
    pub fn error_text(&self) -> String {
        match (&self.error_type, &self.error) {
            (Some(kind), Some(message)) => format!("{}: {}", kind, message),
            (None, Some(message)) => message.clone(),
            _ => format!("status {}", self.status),
        }
    }

    /// Reduce the result set to a single signal.
    ///
    /// Zero series is a valid "no data" reading. More than one series means the
    /// query is not scalar and is rejected.
    pub fn into_signal(self, query: &str) -> Result<MetricSignal, QueryError> {
        let mut series = self.data.result;

        match series.len() {
            0 => Ok(MetricSignal::NoData),
            1 => {
                let Sample(_, raw) = series.remove(0).value;
                match raw {
                    Some(raw) => raw.parse::<f64>().map(MetricSignal::Value).map_err(|source| {
                        warn!(prometheus_value = %raw, error = %source, "Error converting prometheus value");
                        QueryError::ValueParse { value: raw, source }
                    }),
                    None => Ok(MetricSignal::Unknown),
                }
            }
            count => Err(QueryError::AmbiguousResult {
                query: query.to_string(),
                count,
            }),
        }
    }
}

/// Source of the scaling signal - implemented by [`QueryExecutor`], faked in tests
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Evaluate the signal once, as of now
    async fn execute(&self) -> Result<MetricSignal, QueryError>;
}

/// Executes the configured query against Prometheus
pub struct QueryExecutor {
    backend: BackendConfig,
    client: reqwest::Client,
}

impl QueryExecutor {
    /// Create an executor whose HTTP client enforces `timeout` per request
    pub fn new(backend: BackendConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(backend, client))
    }

    pub fn with_client(backend: BackendConfig, client: reqwest::Client) -> Self {
        Self { backend, client }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Run the query with a freshly stamped evaluation time
    pub async fn execute(&self) -> Result<MetricSignal, QueryError> {
        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let query = self.backend.query();

        debug!(query = %query, time = %time, "Executing prometheus query");

        let response = self
            .client
            .get(self.backend.query_endpoint())
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|source| QueryError::Transport { source })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| QueryError::Transport { source })?;

        if !status.is_success() {
            return Err(QueryError::Backend {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let result = QueryResult::from_slice(&body)?;
        if !result.is_success() {
            return Err(QueryError::Backend {
                status: status.as_u16(),
                body: result.error_text(),
            });
        }

        debug!(
            result_type = %result.data.result_type,
            series = result.data.result.len(),
            "Prometheus query returned"
        );

        result.into_signal(query)
    }
}

#[async_trait]
impl MetricSource for QueryExecutor {
    async fn execute(&self) -> Result<MetricSignal, QueryError> {
        QueryExecutor::execute(self).await
    }
}
