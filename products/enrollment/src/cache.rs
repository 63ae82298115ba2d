//! Injectable read-through cache for computed reports.
//!
//! Entries remember when they were stored; a read compares that timestamp
//! against the TTL. There is no process-wide instance: callers own the cache
//! and can swap in a shared store for multi-instance deployments.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    async fn put(&self, key: &str, value: V);
    async fn invalidate_all(&self);
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct InMemoryCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (DateTime<Utc>, V)>>,
    clock: Clock,
}

impl<V> InMemoryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

#[async_trait]
impl<V> Cache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        let (stored_at, value) = entries.get(key)?;
        if now - *stored_at < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    async fn put(&self, key: &str, value: V) {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| now - *stored_at < self.ttl);
        entries.insert(key.to_string(), (now, value));
    }

    async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}
