//! Redis-backed metadata cache (the provisioned ElastiCache cluster)

use crate::backend::MetadataCache;
use crate::error::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;

pub const REDIS_PORT: u16 = 6379;

pub fn redis_url(host: &str) -> String {
    format!("redis://{}:{}/", host, REDIS_PORT)
}

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(host: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url(host))?;
        let connection = client.get_multiplexed_async_connection().await?;
        tracing::debug!("Connected to redis at {}", host);
        Ok(Self { connection })
    }
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        Ok(conn.hgetall(key).await?)
    }
}
