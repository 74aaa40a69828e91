//! Invalidation consumer.
//!
//! Reads change notifications from the event log through a consumer group and evicts
//! every cached feed page for each one. Two tasks cooperate:
//!
//! - the **read loop** issues one bounded `XREADGROUP ... COUNT 1 BLOCK` per iteration
//!   while the link is connected, and idles on a fixed interval otherwise;
//! - the **reconnect supervisor** owns (re)connection with capped linear backoff and
//!   never gives up while the consumer is running.
//!
//! An entry is acknowledged after its eviction attempt, whatever the outcome, so
//! delivery is at-least-once and eviction is idempotent.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ConsumerConfig;
use super::events::{EventLog, GroupCreation, StreamEntry, StreamError};
use super::keys::FEEDS_PREFIX;
use super::link::{ConnectionState, Link};
use super::store::{EvictOutcome, ResponseCache};

const SOURCE: &str = "cache::consumer";

/// Slack on top of the server-side block timeout before a read with no reply is
/// treated as a dead connection.
pub const READ_REPLY_GRACE: Duration = Duration::from_secs(2);

pub const STREAM_MESSAGES_TOTAL: &str = "feedline_stream_messages_total";
pub const STREAM_RECONNECT_TOTAL: &str = "feedline_stream_reconnect_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// Started and connected.
    Running,
    /// Started but waiting for the link to come back.
    Paused,
    Stopped,
}

impl ConsumerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsumerStatus::Running => "running",
            ConsumerStatus::Paused => "paused",
            ConsumerStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct InvalidationConsumer {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    log: Arc<dyn EventLog>,
    cache: ResponseCache,
    config: ConsumerConfig,
    link: Link,
    running: watch::Sender<bool>,
    group_ready: AtomicBool,
}

impl InvalidationConsumer {
    pub fn new(log: Arc<dyn EventLog>, cache: ResponseCache, config: ConsumerConfig) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                log,
                cache,
                config,
                link: Link::new(),
                running,
                group_ready: AtomicBool::new(false),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the reconnect supervisor and the read loop. Calling it while running is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if *self.inner.running.borrow() {
            return;
        }
        tasks.retain(|task| !task.is_finished());
        self.inner.running.send_replace(true);

        info!(
            target = SOURCE,
            stream = %self.inner.config.stream,
            group = %self.inner.config.group,
            consumer = %self.inner.config.consumer,
            "invalidation consumer starting"
        );

        let supervisor = Arc::clone(&self.inner);
        tasks.push(tokio::spawn(async move { supervisor.supervise().await }));
        let reader = Arc::clone(&self.inner);
        tasks.push(tokio::spawn(async move { reader.read_loop().await }));
    }

    /// Stop cooperatively: the in-flight read finishes within its block timeout (plus
    /// [`READ_REPLY_GRACE`] when the server never answers) and any
    /// entry already received is evicted and acknowledged before the tasks exit.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        if !self.inner.running.send_replace(false) && tasks.is_empty() {
            return;
        }

        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                error!(target = SOURCE, error = %err, "invalidation consumer task failed");
            }
        }

        self.inner.log.close().await;
        self.inner.link.on_close();
        info!(target = SOURCE, "invalidation consumer stopped");
    }

    pub fn status(&self) -> ConsumerStatus {
        if !*self.inner.running.borrow() {
            ConsumerStatus::Stopped
        } else if self.inner.link.is_connected() {
            ConsumerStatus::Running
        } else {
            ConsumerStatus::Paused
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.link.state()
    }

    pub fn is_group_ready(&self) -> bool {
        self.inner.group_ready.load(Ordering::Acquire)
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    async fn supervise(self: Arc<Self>) {
        let mut running = self.running.subscribe();
        let mut state = self.link.subscribe();
        let mut attempt: u32 = 0;
        let mut first = true;

        loop {
            if !*running.borrow_and_update() {
                break;
            }

            if *state.borrow_and_update() == ConnectionState::Connected {
                tokio::select! {
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = running.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            if !first {
                attempt = attempt.saturating_add(1);
                let delay = self.config.backoff.delay(attempt);
                self.link.on_reconnecting();
                counter!(STREAM_RECONNECT_TOTAL).increment(1);
                warn!(
                    target = SOURCE,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "event log disconnected; scheduling reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = running.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if !self.is_running() {
                    break;
                }
            }
            first = false;

            match self.log.connect().await {
                Ok(()) => {
                    // The backoff keeps growing until the group is confirmed too.
                    if !self.group_ready.load(Ordering::Acquire)
                        && let Err(err) = self.ensure_group().await
                    {
                        self.handle_error("create_group", &err);
                        continue;
                    }
                    self.link.on_ready();
                    if attempt > 0 {
                        info!(target = SOURCE, attempt, "event log reconnected");
                    }
                    attempt = 0;
                }
                Err(err) => {
                    warn!(target = SOURCE, attempt, error = %err, "event log connect failed");
                    self.link.on_close();
                }
            }
        }

        debug!(target = SOURCE, "reconnect supervisor exited");
    }

    async fn read_loop(self: Arc<Self>) {
        let mut running = self.running.subscribe();

        while self.is_running() {
            if !self.link.is_connected() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_poll) => {}
                    changed = running.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            if !self.group_ready.load(Ordering::Acquire)
                && let Err(err) = self.ensure_group().await
            {
                self.handle_error("create_group", &err);
                self.idle().await;
                continue;
            }

            match self.read_next().await {
                Ok(Some(entry)) => self.handle_entry(entry).await,
                Ok(None) => {}
                Err(err) => {
                    self.handle_error("read_group", &err);
                    if !err.is_transport() {
                        self.idle().await;
                    }
                }
            }
        }

        debug!(target = SOURCE, "read loop exited");
    }

    /// One blocking read, bounded on the client side as well. A reply that never comes
    /// (half-open connection) drops the connection and counts as a transport error.
    async fn read_next(&self) -> Result<Option<StreamEntry>, StreamError> {
        let deadline = self.config.block_timeout + READ_REPLY_GRACE;
        let read = self.log.read_group(
            &self.config.stream,
            &self.config.group,
            &self.config.consumer,
            self.config.block_timeout,
        );
        match tokio::time::timeout(deadline, read).await {
            Ok(result) => result,
            Err(_) => {
                self.log.close().await;
                Err(StreamError::Transport(format!(
                    "no reply to read within {} ms",
                    deadline.as_millis()
                )))
            }
        }
    }

    async fn ensure_group(&self) -> Result<(), StreamError> {
        let created = self
            .log
            .create_group(&self.config.stream, &self.config.group)
            .await?;
        match created {
            GroupCreation::Created => info!(
                target = SOURCE,
                stream = %self.config.stream,
                group = %self.config.group,
                "consumer group created"
            ),
            GroupCreation::AlreadyExists => debug!(
                target = SOURCE,
                group = %self.config.group,
                "consumer group already exists"
            ),
        }
        self.group_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn handle_entry(&self, entry: StreamEntry) {
        let started_at = Instant::now();
        let payload_id = entry.payload_id();
        info!(
            target = SOURCE,
            message_id = %entry.id,
            payload_id = payload_id.as_deref().unwrap_or("-"),
            "feed change received"
        );

        match self.cache.evict_prefix(FEEDS_PREFIX).await {
            EvictOutcome::Evicted(removed) => info!(
                target = SOURCE,
                message_id = %entry.id,
                prefix = FEEDS_PREFIX,
                removed,
                "feed cache invalidated"
            ),
            EvictOutcome::Skipped => warn!(
                target = SOURCE,
                message_id = %entry.id,
                prefix = FEEDS_PREFIX,
                "cache unavailable; invalidation skipped"
            ),
            EvictOutcome::Failed(reason) => error!(
                target = SOURCE,
                message_id = %entry.id,
                prefix = FEEDS_PREFIX,
                reason = %reason,
                "feed cache invalidation failed"
            ),
        }

        match self
            .log
            .ack(&self.config.stream, &self.config.group, &entry.id)
            .await
        {
            Ok(()) => counter!(STREAM_MESSAGES_TOTAL, "outcome" => "acked").increment(1),
            Err(err) => {
                counter!(STREAM_MESSAGES_TOTAL, "outcome" => "ack_failed").increment(1);
                self.handle_error("ack", &err);
            }
        }

        debug!(
            target = SOURCE,
            message_id = %entry.id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "feed change handled"
        );
    }

    fn handle_error(&self, operation: &'static str, err: &StreamError) {
        match err {
            StreamError::Transport(_) => {
                warn!(target = SOURCE, operation, error = %err, "event log connection lost");
                self.link.on_close();
            }
            StreamError::NoGroup(_) => {
                warn!(target = SOURCE, operation, error = %err, "consumer group missing; recreating");
                self.group_ready.store(false, Ordering::Release);
            }
            StreamError::Command(_) => {
                error!(target = SOURCE, operation, error = %err, "event log command failed");
            }
        }
    }

    async fn idle(&self) {
        let mut running = self.running.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.config.idle_poll) => {}
            _ = running.changed() => {}
        }
    }
}
