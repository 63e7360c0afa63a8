//! # Asynx DelayedExecutor
//!
//! Accepts `(appname, queuename, task_id, delay_seconds)` and, once the
//! delay elapses, makes the submission available for the dispatch
//! entrypoint to be invoked with the same `task_id` — at least once, since
//! a `task_id` may be delivered more than once (status CAS at dispatch
//! time is the deduplication mechanism, not this trait).
//!
//! Submission (`submit`) and consumption (`next_due`) are split so the
//! caller — `asynx-worker`'s poll loop in production, a test harness in
//! unit tests — owns the decision of when and how often to call back into
//! `TaskQueue::dispatch`.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),
}

/// `(appname, queuename, task_id)` — a submission whose delay has
/// elapsed and is ready for dispatch.
pub type DueSubmission = (String, String, u64);

#[async_trait]
pub trait DelayedExecutor: Send + Sync {
    /// Hand a task to the broker; returns the submission id that becomes
    /// the task's `uuid`.
    async fn submit(
        &self,
        appname: &str,
        queuename: &str,
        task_id: u64,
        delay_seconds: f64,
    ) -> Result<String, ExecutorError>;

    /// Block until the next due submission is available.
    async fn next_due(&self) -> Option<DueSubmission>;
}

const DELAY_KEY: &str = "AX:DELAYQ";

/// Redis-backed executor: submissions go into a sorted set keyed by
/// due-at-unix-timestamp; `next_due` polls it until an entry is due, then
/// atomically claims (`ZREM`s) it so concurrent pollers never double-claim
/// the same submission.
pub struct RedisDelayedExecutor {
    conn: redis::aio::ConnectionManager,
    poll_interval: Duration,
}

impl RedisDelayedExecutor {
    pub async fn connect(redis_url: &str, poll_interval: Duration) -> Result<Self, ExecutorError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| ExecutorError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ExecutorError::Connection(e.to_string()))?;
        Ok(Self { conn, poll_interval })
    }
}

#[async_trait]
impl DelayedExecutor for RedisDelayedExecutor {
    async fn submit(
        &self,
        appname: &str,
        queuename: &str,
        task_id: u64,
        delay_seconds: f64,
    ) -> Result<String, ExecutorError> {
        let mut conn = self.conn.clone();
        let submission_id = Uuid::new_v4().to_string();
        let due_at = chrono::Utc::now().timestamp() as f64 + delay_seconds;
        let entry = encode_entry(appname, queuename, task_id);
        let _: () = conn
            .zadd(DELAY_KEY, &entry, due_at)
            .await
            .map_err(|e| ExecutorError::Command(e.to_string()))?;
        Ok(submission_id)
    }

    async fn next_due(&self) -> Option<DueSubmission> {
        let mut conn = self.conn.clone();
        loop {
            let now = chrono::Utc::now().timestamp();
            let due: Result<Vec<String>, redis::RedisError> =
                conn.zrangebyscore(DELAY_KEY, "-inf", now as f64).await;
            match due {
                Ok(entries) => {
                    for entry in entries {
                        let removed: Result<i64, redis::RedisError> =
                            conn.zrem(DELAY_KEY, &entry).await;
                        if let Ok(1) = removed {
                            if let Some(submission) = decode_entry(&entry) {
                                return Some(submission);
                            }
                        }
                    }
                }
                Err(e) => warn!("delayed-executor poll failed: {}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn encode_entry(appname: &str, queuename: &str, task_id: u64) -> String {
    format!("{}\u{1}{}\u{1}{}", appname, queuename, task_id)
}

fn decode_entry(entry: &str) -> Option<DueSubmission> {
    let mut parts = entry.split('\u{1}');
    let app = parts.next()?.to_string();
    let queue = parts.next()?.to_string();
    let id: u64 = parts.next()?.parse().ok()?;
    Some((app, queue, id))
}

/// In-process executor backed by an mpsc channel. `submit` spawns a
/// `tokio::time::sleep` and pushes the submission once it elapses;
/// `next_due` drains the channel. Does not survive process restart, unlike
/// [`RedisDelayedExecutor`] — suitable for tests and single-process
/// deployments.
pub struct InMemoryDelayedExecutor {
    tx: mpsc::UnboundedSender<DueSubmission>,
    rx: Mutex<mpsc::UnboundedReceiver<DueSubmission>>,
}

impl InMemoryDelayedExecutor {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }
}

impl Default for InMemoryDelayedExecutor {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl DelayedExecutor for InMemoryDelayedExecutor {
    async fn submit(
        &self,
        appname: &str,
        queuename: &str,
        task_id: u64,
        delay_seconds: f64,
    ) -> Result<String, ExecutorError> {
        let submission_id = Uuid::new_v4().to_string();
        let tx = self.tx.clone();
        let appname = appname.to_string();
        let queuename = queuename.to_string();
        let delay = Duration::from_secs_f64(delay_seconds.max(0.0));
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send((appname, queuename, task_id));
        });
        Ok(submission_id)
    }

    async fn next_due(&self) -> Option<DueSubmission> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_executor_delivers_after_delay() {
        let executor = InMemoryDelayedExecutor::new();
        executor.submit("app", "q", 7, 0.01).await.unwrap();
        let due = executor.next_due().await;
        assert_eq!(due, Some(("app".to_string(), "q".to_string(), 7)));
    }

    #[test]
    fn entry_round_trips() {
        let entry = encode_entry("app", "q", 42);
        assert_eq!(
            decode_entry(&entry),
            Some(("app".to_string(), "q".to_string(), 42))
        );
    }
}
