//! Smoke test against a running greenhouse backend.
//!
//! Usage: test-integration [BASE_URL]   (default http://localhost:5000,
//! or ESTUFA_API_BASE)

use anyhow::{bail, Context, Result};
use estufa_dashboard::models::ChatRequest;
use estufa_dashboard::{AssistantBackend, HttpBackend, TelemetrySource};
use log::{error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

const DEFAULT_BASE: &str = "http://localhost:5000";
const LIMIT: usize = 20;

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
    millis: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let base = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ESTUFA_API_BASE").ok())
        .unwrap_or_else(|| DEFAULT_BASE.to_string());
    info!("🚀 Smoke testing greenhouse backend at {}", base);

    let backend = HttpBackend::new(&base, Duration::from_secs(10)).context("invalid base url")?;
    let mut checks = Vec::new();

    checks.push(timed("probe", async {
        backend.probe().await?;
        Ok::<_, anyhow::Error>("backend ready".to_string())
    }).await);

    checks.push(timed("dados", async {
        let batch = backend.fetch_batch(LIMIT).await?;
        Ok::<_, anyhow::Error>(format!("{} points", batch.len()))
    }).await);

    checks.push(timed("series", async {
        let batch = backend.fetch_series(LIMIT).await?;
        Ok::<_, anyhow::Error>(format!("{} points", batch.len()))
    }).await);

    checks.push(timed("analise", async {
        let report = backend.fetch_analysis(LIMIT).await?;
        Ok::<_, anyhow::Error>(match report.erro {
            Some(erro) => format!("no statistics: {}", erro),
            None => format!("mean temperature {:?}", report.mean_temperature()),
        })
    }).await);

    checks.push(timed("chat session", async {
        let first = backend
            .chat(ChatRequest { mensagem: "olá".into(), session_id: None })
            .await?;
        let Some(session_id) = first.session_id else {
            bail!("first reply carried no session_id");
        };
        let second = backend
            .chat(ChatRequest {
            mensagem: "qual a temperatura média?".into(),
            session_id: Some(session_id.clone()),
        })
            .await?;
        match second.session_id {
            Some(id) if id != session_id => warn!("⚠️ session changed {} -> {}", session_id, id),
            _ => {}
        }
        Ok::<_, anyhow::Error>(format!("session {} kept across two turns", session_id))
    }).await);

    let failed = checks.iter().filter(|c| !c.ok).count();
    println!("{}", serde_json::to_string_pretty(&checks)?);

    if failed > 0 {
        error!("❌ {}/{} checks failed", failed, checks.len());
        std::process::exit(1);
    }
    info!("✅ All {} checks passed", checks.len());
    Ok(())
}

async fn timed<F>(name: &'static str, check: F) -> Check
where
    F: std::future::Future<Output = Result<String>>,
{
    let started = Instant::now();
    let result = check.await;
    let millis = started.elapsed().as_millis();
    match result {
        Ok(detail) => {
            info!("✅ {} ({} ms): {}", name, millis, detail);
            Check { name, ok: true, detail, millis }
        }
        Err(e) => {
            error!("❌ {} ({} ms): {:#}", name, millis, e);
            Check { name, ok: false, detail: format!("{:#}", e), millis }
        }
    }
}
