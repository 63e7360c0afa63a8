//! # Asynx
//!
//! Wires the eight component crates into one runnable binary-facing config
//! object. `asynx-server` and `asynx-worker` both start from [`AsynxConfig`]
//! and [`build_queue`] — the server exposes `TaskQueue` over HTTP, the
//! worker drains the `DelayedExecutor` and calls `TaskQueue::dispatch`.

use anyhow::{Context, Result};
use asynx_delayed_executor::RedisDelayedExecutor;
use asynx_keystore::{KeyStore, RedisKeyStore};
use asynx_taskqueue::{LoggingReportSink, NoopReportSink, TaskQueue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration, loaded from a TOML file at binary startup and
/// overridable by CLI flags / environment (see the `Args` structs in
/// `bin/server.rs` and `bin/worker.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsynxConfig {
    pub redis_url: String,
    pub app: String,
    pub queue: String,
    /// IANA zone name, e.g. `"America/Chicago"`. Used to localize naive
    /// `eta` timestamps passed to `add_task`.
    pub localzone: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub report_sink: ReportSinkKind,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSinkKind {
    #[default]
    None,
    Log,
}

impl AsynxConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parsing AsynxConfig TOML")
    }

    pub async fn load(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {path}"))?;
        Self::from_toml_str(&raw)
    }

    fn tz(&self) -> Result<chrono_tz::Tz> {
        Ok(asynx_timesource::parse_zone(&self.localzone)?)
    }
}

/// Connects to Redis and builds the `KeyStore` + `DelayedExecutor` pair
/// every binary needs, then hands back a ready `TaskQueue`.
pub async fn build_queue(config: &AsynxConfig) -> Result<TaskQueue> {
    let store: Arc<dyn KeyStore> = Arc::new(
        RedisKeyStore::connect(&config.redis_url)
            .await
            .context("connecting KeyStore to redis")?,
    );
    let executor = Arc::new(
        RedisDelayedExecutor::connect(
            &config.redis_url,
            Duration::from_millis(config.poll_interval_ms),
        )
        .await
        .context("connecting DelayedExecutor to redis")?,
    );

    let tz = config.tz()?;
    let mut queue = TaskQueue::new(config.app.clone(), config.queue.clone(), tz, store, executor);
    queue = match config.report_sink {
        ReportSinkKind::None => queue.with_report_sink(Arc::new(NoopReportSink)),
        ReportSinkKind::Log => queue.with_report_sink(Arc::new(LoggingReportSink)),
    };
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let raw = r#"
            redis_url = "redis://localhost:6379"
            app = "billing"
            queue = "invoices"
            localzone = "America/Chicago"
        "#;
        let config = AsynxConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(matches!(config.report_sink, ReportSinkKind::None));
        assert_eq!(config.poll_interval_ms, 250);
    }

    #[test]
    fn rejects_bad_zone() {
        let raw = r#"
            redis_url = "redis://localhost:6379"
            app = "billing"
            queue = "invoices"
            localzone = "Not/AZone"
        "#;
        let config = AsynxConfig::from_toml_str(raw).unwrap();
        assert!(config.tz().is_err());
    }
}
