#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::time::Instant;

use feedline::application::repos::{FeedItemsRepo, FeedQuery, RepoError};
use feedline::cache::{
    CacheBackend, CacheError, EventLog, GroupCreation, MemoryCacheBackend, StreamEntry,
    StreamError,
};
use feedline::domain::feed::{Direction, FeedItem};

pub fn item(id: i64, created_at: OffsetDateTime, tags: &[&str]) -> FeedItem {
    FeedItem {
        id,
        summary: format!("summary {id}"),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        channel: "newsroom".to_string(),
        link: format!("https://example.com/feeds/{id}"),
        published_at: created_at,
        created_at,
    }
}

/// In-memory store that answers queries with the same ordering and filtering rules as
/// the Postgres repository.
#[derive(Default)]
pub struct InMemoryRepo {
    items: Vec<FeedItem>,
    calls: AtomicUsize,
    fail: AtomicBool,
    queries: Mutex<Vec<FeedQuery>>,
}

impl InMemoryRepo {
    pub fn new(items: Vec<FeedItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<FeedQuery> {
        self.queries.lock().expect("lock").clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedItemsRepo for InMemoryRepo {
    async fn query_feed(&self, query: &FeedQuery) -> Result<Vec<FeedItem>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().expect("lock").push(query.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("store offline".to_string()));
        }

        let mut matching = self
            .items
            .iter()
            .filter(|item| match query.direction {
                Direction::Before => item.created_at < query.cursor,
                Direction::After => item.created_at > query.cursor,
            })
            .filter(|item| {
                query.tags.is_empty()
                    || item
                        .tags
                        .iter()
                        .any(|tag| query.tags.iter().any(|wanted| wanted == tag.as_str()))
            })
            .cloned()
            .collect::<Vec<_>>();

        matching.sort_by_key(|item| (item.created_at, item.id));
        if query.direction == Direction::Before {
            matching.reverse();
        }
        matching.truncate(query.limit as usize);
        Ok(matching)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RepoError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Memory backend with switches for readiness and per-operation failures.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryCacheBackend,
    unready: AtomicBool,
    fail_reads: AtomicBool,
    fail_scans: AtomicBool,
    fail_deletes: AtomicBool,
    sets: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.unready.store(!ready, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    fn is_ready(&self) -> bool {
        !self.unready.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::backend("connection reset by peer"));
        }
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set_ex(key, value, ttl).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(CacheError::backend("SCAN failed"));
        }
        self.inner.keys_with_prefix(prefix).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::backend("DEL failed"));
        }
        self.inner.del(keys).await
    }
}

/// Scripted event log. Entries are delivered once each; reads without pending entries
/// wait out the block timeout like a real `XREADGROUP ... BLOCK`.
#[derive(Default)]
pub struct ScriptedLog {
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    refuse_connects: usize,
    connect_attempts: Vec<Instant>,
    connected: bool,
    groups: HashSet<(String, String)>,
    group_creations: usize,
    pending: VecDeque<StreamEntry>,
    read_errors: VecDeque<StreamError>,
    acked: Vec<String>,
    ack_errors: VecDeque<StreamError>,
    group_errors: VecDeque<StreamError>,
    stalled_reads: usize,
    reads: usize,
}

impl ScriptedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect attempts with a refused connection.
    pub fn refuse_connects(&self, count: usize) {
        self.state.lock().expect("lock").refuse_connects = count;
    }

    pub fn with_group(self, stream: &str, group: &str) -> Self {
        self.state
            .lock()
            .expect("lock")
            .groups
            .insert((stream.to_string(), group.to_string()));
        self
    }

    pub fn push_entry(&self, id: &str, data: &str) {
        let fields = HashMap::from([("data".to_string(), data.to_string())]);
        self.state
            .lock()
            .expect("lock")
            .pending
            .push_back(StreamEntry::new(id, fields));
    }

    pub fn push_read_error(&self, error: StreamError) {
        self.state.lock().expect("lock").read_errors.push_back(error);
    }

    pub fn push_ack_error(&self, error: StreamError) {
        self.state.lock().expect("lock").ack_errors.push_back(error);
    }

    /// Fail the next group creations with `error`, `count` times.
    pub fn fail_group_creation(&self, count: usize, error: impl Fn() -> StreamError) {
        let mut state = self.state.lock().expect("lock");
        for _ in 0..count {
            state.group_errors.push_back(error());
        }
    }

    /// The next `count` reads are accepted by the server and never answered.
    pub fn stall_reads(&self, count: usize) {
        self.state.lock().expect("lock").stalled_reads = count;
    }

    /// Simulate the group (and stream) being deleted out from under the consumer.
    pub fn drop_groups(&self) {
        self.state.lock().expect("lock").groups.clear();
    }

    /// Simulate the server going away: the connection drops and later connects are refused.
    pub fn disconnect(&self, refuse_next: usize) {
        let mut state = self.state.lock().expect("lock");
        state.connected = false;
        state.refuse_connects = refuse_next;
    }

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().expect("lock").connect_attempts.clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.state.lock().expect("lock").acked.clone()
    }

    pub fn group_creations(&self) -> usize {
        self.state.lock().expect("lock").group_creations
    }

    pub fn pending(&self) -> usize {
        self.state.lock().expect("lock").pending.len()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().expect("lock").reads
    }
}

#[async_trait]
impl EventLog for ScriptedLog {
    async fn connect(&self) -> Result<(), StreamError> {
        let mut state = self.state.lock().expect("lock");
        state.connect_attempts.push(Instant::now());
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            state.connected = false;
            return Err(StreamError::Transport("Connection refused (os error 111)".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation, StreamError> {
        let mut state = self.state.lock().expect("lock");
        if !state.connected {
            return Err(StreamError::Transport("not connected".into()));
        }
        if let Some(error) = state.group_errors.pop_front() {
            return Err(error);
        }
        state.group_creations += 1;
        if state.groups.insert((stream.to_string(), group.to_string())) {
            Ok(GroupCreation::Created)
        } else {
            Ok(GroupCreation::AlreadyExists)
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError> {
        let stalled = {
            let mut state = self.state.lock().expect("lock");
            state.reads += 1;
            if !state.connected {
                return Err(StreamError::Transport("Connection refused (os error 111)".into()));
            }
            if let Some(error) = state.read_errors.pop_front() {
                if error.is_transport() {
                    state.connected = false;
                }
                return Err(error);
            }
            if !state
                .groups
                .contains(&(stream.to_string(), group.to_string()))
            {
                return Err(StreamError::NoGroup(
                    "NOGROUP No such key or consumer group".into(),
                ));
            }
            if let Some(entry) = state.pending.pop_front() {
                return Ok(Some(entry));
            }
            if state.stalled_reads > 0 {
                state.stalled_reads -= 1;
                true
            } else {
                false
            }
        };

        if stalled {
            return std::future::pending().await;
        }
        tokio::time::sleep(block).await;
        Ok(None)
    }

    async fn ack(&self, _stream: &str, _group: &str, id: &str) -> Result<(), StreamError> {
        let mut state = self.state.lock().expect("lock");
        if let Some(error) = state.ack_errors.pop_front() {
            return Err(error);
        }
        state.acked.push(id.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().expect("lock").connected = false;
    }
}

/// Yield until `condition` holds, advancing paused time in small steps.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
