use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub backend: BackendConf,
    pub polling: PollingConf,
    pub view: ViewConf,
    pub chat: ChatConf,
    pub seed: SeedConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConf {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

/// Which endpoint feeds each poll cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchSource {
    Dados,
    Series,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConf {
    pub interval_ms: u64,
    pub recovery_interval_ms: u64,
    pub batch_limit: usize,
    pub source: BatchSource,
    pub fetch_analysis: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ViewConf {
    pub chart_points: usize,
    /// Minutes east of UTC for time labels; unset = host local time.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConf {
    pub report_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SeedConf {
    pub n: u32,
    pub interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub listen: String,
}

impl Default for BackendConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for PollingConf {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            recovery_interval_ms: 5_000,
            batch_limit: 20,
            source: BatchSource::Dados,
            fetch_analysis: false,
        }
    }
}

impl Default for ViewConf {
    fn default() -> Self {
        Self { chart_points: 20, utc_offset_minutes: None }
    }
}

impl Default for ChatConf {
    fn default() -> Self {
        Self { report_path: "/export.csv".into() }
    }
}

impl Default for SeedConf {
    fn default() -> Self {
        Self { n: 40, interval_ms: 120 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8090".into() }
    }
}

impl PollingConf {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }
}

impl BackendConf {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.backend.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.backend.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::BaseUrl {
                url: self.backend.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "backend.request_timeout_ms" });
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Zero { field: "polling.interval_ms" });
        }
        if self.polling.recovery_interval_ms == 0 {
            return Err(ConfigError::Zero { field: "polling.recovery_interval_ms" });
        }
        if !(1..=1000).contains(&self.polling.batch_limit) {
            return Err(ConfigError::BatchLimit(self.polling.batch_limit));
        }
        if self.view.chart_points == 0 {
            return Err(ConfigError::Zero { field: "view.chart_points" });
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .listen
            .parse()
            .map_err(|_| ConfigError::ListenAddr(self.http.listen.clone()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var("ESTUFA_API_BASE") {
            self.backend.base_url = base;
        }
        if let Ok(listen) = std::env::var("ESTUFA_LISTEN") {
            self.http.listen = listen;
        }
    }
}

/// Read `ESTUFA_DASHBOARD_CONFIG` (default `dashboard.yaml`), falling back to
/// defaults when the file is absent or unreadable. Env overrides apply last.
pub async fn load_config() -> DashboardConfig {
    let path = std::env::var("ESTUFA_DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            DashboardConfig::default()
        } else {
            parse_config(&txt).unwrap_or_else(|e| {
                warn!("invalid config {}: {}, using defaults", path, e);
                DashboardConfig::default()
            })
        }
    } else {
        warn!("no {} found, using default config", path);
        DashboardConfig::default()
    };
    cfg.apply_env_overrides();
    cfg
}

pub fn parse_config(txt: &str) -> Result<DashboardConfig, serde_yaml::Error> {
    serde_yaml::from_str(txt)
}
