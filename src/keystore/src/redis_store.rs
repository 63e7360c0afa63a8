//! Redis-backed [`KeyStore`]. Grounded in the teacher's
//! `layer5::integration::IntegrationManager` (`ConnectionManager` +
//! `AsyncCommands`) and `bin/router.rs` (`redis::cmd(...).query_async`).

use crate::{KeyStore, KeyStoreError, KeyStoreTransaction, WriteOp};
use async_trait::async_trait;
use redis::aio::{Connection, ConnectionManager};
use redis::AsyncCommands;

/// Plain (non-transactional) reads and writes go through a shared,
/// auto-reconnecting [`ConnectionManager`]. Optimistic transactions need
/// `WATCH` to be scoped to one connection for their whole lifetime, so
/// [`RedisKeyStore::begin_transaction`] opens a dedicated connection
/// instead of reusing the manager.
pub struct RedisKeyStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisKeyStore {
    pub async fn connect(redis_url: &str) -> Result<Self, KeyStoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| KeyStoreError::Connection(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| KeyStoreError::Connection(e.to_string()))?;
        Ok(Self { client, manager })
    }
}

fn cmd_err(e: redis::RedisError) -> KeyStoreError {
    KeyStoreError::Command(e.to_string())
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.hget(key, field).await.map_err(cmd_err)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError> {
        let mut conn = self.manager.clone();
        let map: std::collections::HashMap<String, Vec<u8>> =
            conn.hgetall(key).await.map_err(cmd_err)?;
        Ok(map.into_iter().collect())
    }

    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<Vec<u8>>>, KeyStoreError> {
        let mut conn = self.manager.clone();
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        conn.hget(key, fields.to_vec()).await.map_err(cmd_err)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.hincr(key, field, delta).await.map_err(cmd_err)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(cmd_err)
    }

    async fn exists(&self, key: &str) -> Result<bool, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.exists(key).await.map_err(cmd_err)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, KeyStoreError> {
        let mut conn = self.manager.clone();
        let flat: Vec<(String, f64)> = conn
            .zrange_withscores(key, start as isize, stop as isize)
            .await
            .map_err(cmd_err)?;
        Ok(flat)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.zscore(key, member).await.map_err(cmd_err)
    }

    async fn zcard(&self, key: &str) -> Result<i64, KeyStoreError> {
        let mut conn = self.manager.clone();
        conn.zcard(key).await.map_err(cmd_err)
    }

    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<Vec<(String, Vec<u8>)>>, KeyStoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key);
        }
        let maps: Vec<std::collections::HashMap<String, Vec<u8>>> =
            pipe.query_async(&mut conn).await.map_err(cmd_err)?;
        Ok(maps.into_iter().map(|m| m.into_iter().collect()).collect())
    }

    async fn pipeline_apply(&self, ops: Vec<WriteOp>) -> Result<(), KeyStoreError> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for op in ops {
            queue_op(&mut pipe, op);
        }
        pipe.query_async(&mut conn).await.map_err(cmd_err)
    }

    async fn begin_transaction(
        &self,
        watch_keys: &[String],
    ) -> Result<Box<dyn KeyStoreTransaction>, KeyStoreError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| KeyStoreError::Connection(e.to_string()))?;
        if !watch_keys.is_empty() {
            let mut watch_cmd = redis::cmd("WATCH");
            for key in watch_keys {
                watch_cmd.arg(key);
            }
            watch_cmd
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(cmd_err)?;
        }
        Ok(Box::new(RedisTransaction { conn }))
    }
}

fn queue_op(pipe: &mut redis::Pipeline, op: WriteOp) {
    match op {
        WriteOp::HSet { key, fields } => {
            pipe.hset_multiple(key, &fields).ignore();
        }
        WriteOp::Set { key, value } => {
            pipe.set(key, value).ignore();
        }
        WriteOp::Del { keys } => {
            pipe.del(keys).ignore();
        }
        WriteOp::ZAdd { key, member, score } => {
            pipe.zadd(key, member, score).ignore();
        }
        WriteOp::ZRem { key, member } => {
            pipe.zrem(key, member).ignore();
        }
    }
}

struct RedisTransaction {
    conn: Connection,
}

#[async_trait]
impl KeyStoreTransaction for RedisTransaction {
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        self.conn.hget(key, field).await.map_err(cmd_err)
    }

    async fn hgetall(&mut self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError> {
        let map: std::collections::HashMap<String, Vec<u8>> =
            self.conn.hgetall(key).await.map_err(cmd_err)?;
        Ok(map.into_iter().collect())
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        self.conn.get(key).await.map_err(cmd_err)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, KeyStoreError> {
        self.conn.exists(key).await.map_err(cmd_err)
    }

    async fn exec(mut self: Box<Self>, ops: Vec<WriteOp>) -> Result<bool, KeyStoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            queue_op(&mut pipe, op);
        }
        let result: Option<()> = pipe.query_async(&mut self.conn).await.map_err(cmd_err)?;
        Ok(result.is_some())
    }
}
