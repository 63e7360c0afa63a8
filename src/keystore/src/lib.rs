//! # Asynx KeyStore
//!
//! Thin abstraction over a Redis-compatible KV store: hashes, sorted sets,
//! pipelining, and optimistic transactions (`WATCH`/`MULTI`/`EXEC`). This
//! is the sole coordination mechanism in the system — no in-process global
//! lock backs any `TaskQueue` operation.

mod inmemory;
mod redis_store;

pub use inmemory::InMemoryKeyStore;
pub use redis_store::RedisKeyStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),
}

/// A single queued write, applied atomically by
/// [`KeyStoreTransaction::exec`] or best-effort by
/// [`KeyStore::pipeline_apply`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    HSet {
        key: String,
        fields: Vec<(String, Vec<u8>)>,
    },
    Set {
        key: String,
        value: Vec<u8>,
    },
    Del {
        keys: Vec<String>,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
}

/// A handle over one `WATCH`ed set of keys. Reads through this handle are
/// consistent with the watch; `exec` performs `MULTI`/`EXEC` and reports
/// whether the watch held.
#[async_trait]
pub trait KeyStoreTransaction: Send {
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;
    async fn hgetall(&mut self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError>;
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;
    async fn exists(&mut self, key: &str) -> Result<bool, KeyStoreError>;

    /// Apply `ops` atomically provided no watched key changed since this
    /// transaction began. `Ok(false)` is a `WATCH` conflict: the caller
    /// decides whether to retry (re-reading first) or surface
    /// `StatusNotMatched`/`AlreadyExists` to its own caller.
    async fn exec(self: Box<Self>, ops: Vec<WriteOp>) -> Result<bool, KeyStoreError>;
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError>;
    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<Vec<u8>>>, KeyStoreError>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, KeyStoreError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, KeyStoreError>;
    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, KeyStoreError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KeyStoreError>;
    async fn zcard(&self, key: &str) -> Result<i64, KeyStoreError>;

    /// Fetches `HGETALL` for every key in `keys` as a single pipelined
    /// round trip, in the same order as `keys`. A missing hash yields an
    /// empty `Vec` at that position rather than shortening the result.
    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<Vec<(String, Vec<u8>)>>, KeyStoreError>;

    /// Best-effort pipelined writes with no atomicity guarantee — used for
    /// the uuid-index accelerator writes in `_dispatch_task`, which
    /// spec.md §5 explicitly allows to be momentarily stale.
    async fn pipeline_apply(&self, ops: Vec<WriteOp>) -> Result<(), KeyStoreError>;

    /// Begin a `WATCH` over `watch_keys`.
    async fn begin_transaction(
        &self,
        watch_keys: &[String],
    ) -> Result<Box<dyn KeyStoreTransaction>, KeyStoreError>;
}

/// Outcome of one attempt inside [`run_optimistic`].
pub enum TxnOutcome<T> {
    /// Apply `ops` and, if the watch held, return `value`.
    Apply(Vec<WriteOp>, T),
    /// Don't write anything; return `value` immediately (e.g. the
    /// precondition already failed, such as a cname that's taken).
    Abort(T),
}

/// Run an optimistic read-decide-write cycle, retrying automatically on
/// `WATCH` conflicts. `attempt` is called with a fresh transaction handle
/// each time; it reads through the handle, decides what to write, and
/// returns a [`TxnOutcome`]. `max_attempts` bounds retries so a
/// perpetually-contended key can't spin forever.
pub async fn run_optimistic<T, F, Fut>(
    store: &dyn KeyStore,
    watch_keys: &[String],
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, KeyStoreError>
where
    F: FnMut(&mut (dyn KeyStoreTransaction + '_)) -> Fut,
    Fut: std::future::Future<Output = Result<TxnOutcome<T>, KeyStoreError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let mut txn = store.begin_transaction(watch_keys).await?;
        let outcome = attempt(txn.as_mut()).await?;
        match outcome {
            TxnOutcome::Abort(value) => return Ok(value),
            TxnOutcome::Apply(ops, value) => {
                let committed = txn.exec(ops).await?;
                if committed {
                    return Ok(value);
                }
                if tries >= max_attempts {
                    return Err(KeyStoreError::Command(
                        "exceeded max optimistic-transaction attempts".to_string(),
                    ));
                }
                // Watch conflict: loop and re-read.
            }
        }
    }
}
