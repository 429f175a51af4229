// Redis engine for the cache contract (feature = "redis")

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

use crate::cache::Cache;
use crate::metrics;

/// Cache engine backed by Redis. Values are bincode-encoded; every write carries `SET EX`.
#[derive(Clone)]
pub struct RedisCache<T> {
    conn: ConnectionManager,
    namespace: String,
    ttl_seconds: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RedisCache<T> {
    pub async fn connect(url: &str, namespace: &str, ttl_seconds: u64) -> Result<Self> {
        let client = Client::open(url).context("Failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        info!("Redis cache '{}' connected to {}", namespace, url);
        Ok(Self {
            conn,
            namespace: namespace.to_string(),
            ttl_seconds: ttl_seconds.max(1),
            _marker: PhantomData,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl<T> Cache<T> for RedisCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.full_key(key);
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(&full_key)
            .await
            .context("Failed to read from Redis")?;

        match bytes {
            Some(bytes) => {
                let value: T = bincode::deserialize(bytes.as_slice())
                    .context("Failed to deserialize cached value with bincode")?;
                metrics::increment_cache_hit(&self.namespace);
                Ok(Some(value))
            }
            None => {
                debug!("Redis cache miss for {}", full_key);
                metrics::increment_cache_miss(&self.namespace);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: T) -> Result<()> {
        let full_key = self.full_key(key);
        let bytes = bincode::serialize(&value).context("Failed to serialize value with bincode")?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&full_key, bytes, self.ttl_seconds)
            .await
            .context("Failed to write to Redis")?;
        Ok(())
    }
}
