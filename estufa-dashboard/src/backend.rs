//! Client side of the greenhouse HTTP backend.
//!
//! The poller and the chat session only see the [`TelemetrySource`] and
//! [`AssistantBackend`] traits; [`HttpBackend`] is the `reqwest`
//! implementation talking to `/dados`, `/series`, `/analise`, `/chat` and
//! `/seed` under a configured base URL.

use crate::config::BackendConf;
use crate::error::BackendError;
use crate::models::{self, AnalysisReport, ChatReply, ChatRequest, SeriesResponse, TelemetryBatch};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Where the poller gets its telemetry from.
pub trait TelemetrySource: Send + Sync {
    /// Lightweight readiness check gating the first poll cycle.
    fn probe(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Latest points from `/dados`, at most `limit` of them.
    fn fetch_batch(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<TelemetryBatch, BackendError>> + Send;

    /// Latest points from `/series` (temperature and humidity only).
    fn fetch_series(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<TelemetryBatch, BackendError>> + Send;

    /// Backend-side statistics from `/analise`.
    fn fetch_analysis(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<AnalysisReport, BackendError>> + Send;
}

/// Remote conversational assistant.
pub trait AssistantBackend: Send + Sync {
    fn chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatReply, BackendError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BackendError::Network(format!("invalid base url {}: {}", base_url, e)))?;
        // keep any path prefix when joining endpoint names
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("estufa-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(cfg: &BackendConf) -> Result<Self, BackendError> {
        Self::new(&cfg.base_url, cfg.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::Network(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Absolute link to the CSV export.
    pub fn export_url(&self, report_path: &str) -> String {
        self.resolve(report_path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| report_path.to_string())
    }

    /// Ask the backend to generate `n` demo points. The response body is ignored.
    pub async fn seed(&self, n: u32, interval_ms: u64) -> Result<(), BackendError> {
        let url = self.resolve("/seed")?;
        let resp = self
            .client
            .post(url)
            .query(&[("n", n.to_string()), ("interval_ms", interval_ms.to_string())])
            .send()
            .await?;
        check_status(&resp)?;
        debug!("seed request accepted (n={}, interval_ms={})", n, interval_ms);
        Ok(())
    }

    async fn get_json(&self, path: &str, limit: usize) -> Result<Value, BackendError> {
        let url = self.resolve(path)?;
        debug!("GET {} limit={}", url, limit);
        let resp = self.client.get(url).query(&[("limit", limit)]).send().await?;
        read_json(resp).await
    }
}

impl TelemetrySource for HttpBackend {
    async fn probe(&self) -> Result<(), BackendError> {
        let body = self.get_json("/dados", 1).await?;
        if body.is_array() {
            Ok(())
        } else {
            Err(BackendError::shape("probe: /dados did not return an array"))
        }
    }

    async fn fetch_batch(&self, limit: usize) -> Result<TelemetryBatch, BackendError> {
        let body = self.get_json("/dados", limit).await?;
        models::parse_batch(&body)
    }

    async fn fetch_series(&self, limit: usize) -> Result<TelemetryBatch, BackendError> {
        let body = self.get_json("/series", limit).await?;
        let series: SeriesResponse = serde_json::from_value(body)?;
        series.into_batch()
    }

    async fn fetch_analysis(&self, limit: usize) -> Result<AnalysisReport, BackendError> {
        let body = self.get_json("/analise", limit).await?;
        if !body.is_object() {
            return Err(BackendError::shape("/analise did not return an object"));
        }
        Ok(serde_json::from_value(body)?)
    }
}

impl AssistantBackend for HttpBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, BackendError> {
        let url = self.resolve("/chat")?;
        let resp = self.client.post(url).json(&request).send().await?;
        let body = read_json(resp).await?;
        if !body.is_object() {
            return Err(BackendError::shape("/chat did not return an object"));
        }
        Ok(serde_json::from_value(body)?)
    }
}

fn check_status(resp: &Response) -> Result<(), BackendError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(BackendError::Status { status: status.as_u16() })
    }
}

async fn read_json(resp: Response) -> Result<Value, BackendError> {
    check_status(&resp)?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
