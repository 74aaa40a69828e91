//! Redis implementation of [`CacheBackend`].
//!
//! Readiness is tracked explicitly: a transport failure on any command flips the
//! backend to not-ready, and a background probe reconnects and flips it back. While
//! not ready the response cache short-circuits, so requests never wait on Redis.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, CacheError};

use super::redis::{escape_glob, is_transport_error};

const SOURCE: &str = "infra::cache";
const SCAN_COUNT: usize = 200;
const DEL_CHUNK: usize = 500;

pub struct RedisCacheBackend {
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    ready: AtomicBool,
    connect_timeout: Duration,
}

impl RedisCacheBackend {
    pub fn new(client: Client, connect_timeout: Duration) -> Self {
        Self {
            client,
            connection: RwLock::new(None),
            ready: AtomicBool::new(false),
            connect_timeout,
        }
    }

    /// Try to establish the managed connection. Failure leaves the backend not ready.
    pub async fn connect(&self) -> bool {
        let attempt = timeout(self.connect_timeout, ConnectionManager::new(self.client.clone())).await;
        match attempt {
            Ok(Ok(manager)) => {
                *self.connection.write().await = Some(manager);
                self.mark_ready();
                true
            }
            Ok(Err(err)) => {
                warn!(target = SOURCE, error = %err, "redis cache connection failed");
                self.mark_unready();
                false
            }
            Err(_) => {
                warn!(
                    target = SOURCE,
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "redis cache connection timed out"
                );
                self.mark_unready();
                false
            }
        }
    }

    /// Periodically verify the connection until `shutdown` flips to true.
    pub fn spawn_probe(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.probe().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(target = SOURCE, "redis cache probe exited");
        })
    }

    async fn probe(&self) {
        let current = self.connection.read().await.clone();
        let Some(mut connection) = current else {
            self.connect().await;
            return;
        };

        let ping = timeout(
            self.connect_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut connection),
        )
        .await;
        match ping {
            Ok(Ok(_)) => self.mark_ready(),
            Ok(Err(err)) => {
                debug!(target = SOURCE, error = %err, "redis cache ping failed");
                self.mark_unready();
            }
            Err(_) => {
                debug!(target = SOURCE, "redis cache ping timed out");
                self.mark_unready();
            }
        }
    }

    fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            info!(target = SOURCE, "redis cache ready");
        }
    }

    fn mark_unready(&self) {
        if self.ready.swap(false, Ordering::AcqRel) {
            warn!(target = SOURCE, "redis cache unavailable; serving without cache");
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotReady)
    }

    fn fail(&self, err: RedisError) -> CacheError {
        if is_transport_error(&err) {
            self.mark_unready();
        }
        CacheError::backend(err)
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|err| self.fail(err))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| self.fail(err))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|err| self.fail(err))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let mut removed = 0;
        for chunk in keys.chunks(DEL_CHUNK) {
            removed += conn
                .del::<_, u64>(chunk)
                .await
                .map_err(|err| self.fail(err))?;
        }
        Ok(removed)
    }
}
