//! # Asynx TaskQueue
//!
//! Owns one `(appname, queuename, localzone)` key space inside a `KeyStore`
//! and implements every task lifecycle operation on top of it: add, get,
//! list, iter, delete, the internal status CAS, and the dispatch/callback
//! chain. This is the orchestration layer — it holds no state of its own
//! beyond its collaborators; all task state lives in the store.

mod dispatch;
mod encode;
pub mod error;
mod iter;
mod keys;
mod ops;
mod report;

pub use error::{Error, Result};
pub use iter::TaskIter;
pub use report::{LoggingReportSink, NoopReportSink, ReportSink};

use asynx_codec::{Codec, JsonCodec};
use asynx_delayed_executor::DelayedExecutor;
use asynx_http_fetcher::{HTTPFetcher, ReqwestFetcher};
use asynx_keystore::KeyStore;
use asynx_task::Task;
use asynx_timesource::{SystemTimeSource, TimeSource};
use chrono_tz::Tz;
use std::sync::Arc;

/// Owns the collaborators for one `(appname, queuename)` pair. Construct
/// one per queue a process serves; cheap to clone the `Arc` collaborators
/// into a new instance if a process serves many queues with the same
/// backing store.
pub struct TaskQueue {
    appname: String,
    queuename: String,
    localzone: Tz,
    store: Arc<dyn KeyStore>,
    codec: Arc<dyn Codec>,
    time: Arc<dyn TimeSource>,
    fetcher: Arc<dyn HTTPFetcher>,
    executor: Arc<dyn DelayedExecutor>,
    report_sink: Arc<dyn ReportSink>,
}

impl TaskQueue {
    /// Build a queue with the default collaborators (`JsonCodec`,
    /// `SystemTimeSource`, `ReqwestFetcher`, `NoopReportSink`) over the
    /// given store and executor. Use the `with_*` methods to override any
    /// of them — tests typically swap in a fixed clock and a fake fetcher.
    pub fn new(
        appname: impl Into<String>,
        queuename: impl Into<String>,
        localzone: Tz,
        store: Arc<dyn KeyStore>,
        executor: Arc<dyn DelayedExecutor>,
    ) -> Self {
        Self {
            appname: appname.into(),
            queuename: queuename.into(),
            localzone,
            store,
            codec: Arc::new(JsonCodec),
            time: Arc::new(SystemTimeSource),
            fetcher: Arc::new(ReqwestFetcher),
            executor,
            report_sink: Arc::new(NoopReportSink),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn HTTPFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_report_sink(mut self, report_sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = report_sink;
        self
    }

    pub fn appname(&self) -> &str {
        &self.appname
    }

    pub fn queuename(&self) -> &str {
        &self.queuename
    }

    async fn load_task(&self, id: u64) -> Result<Task> {
        let meta_key = keys::meta_key(&self.appname, &self.queuename, id);
        let fields = self.store.hgetall(&meta_key).await?;
        if fields.is_empty() {
            return Err(Error::NotFound);
        }
        encode::decode_task(id, fields, self.codec.as_ref())
    }

    async fn resolve_uuid(&self, uuid: &str) -> Result<u64> {
        let key = keys::uuid_index_key(&self.appname, &self.queuename);
        let score = self.store.zscore(&key, uuid).await?.ok_or(Error::NotFound)?;
        Ok(score as u64)
    }

    async fn resolve_cname(&self, cname: &str) -> Result<u64> {
        let key = keys::cname_key(&self.appname, &self.queuename, cname);
        let bytes = self.store.get(&key).await?.ok_or(Error::NotFound)?;
        String::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(Error::NotFound)
    }
}
