//! Redis Streams implementation of [`EventLog`].
//!
//! Holds one dedicated multiplexed connection, separate from the cache connection,
//! because every read parks it in `XREADGROUP ... BLOCK`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisError, Value,
    aio::MultiplexedConnection,
    streams::{StreamReadOptions, StreamReadReply},
};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::cache::{EventLog, GroupCreation, StreamEntry, StreamError};

use super::redis::is_transport_error;

const SOURCE: &str = "infra::stream";
const GROUP_START_ID: &str = "0";
const NEW_ENTRIES_ID: &str = ">";

pub struct RedisEventLog {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
}

impl RedisEventLog {
    pub fn new(client: Client, connect_timeout: Duration) -> Self {
        Self {
            client,
            connection: Mutex::new(None),
            connect_timeout,
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StreamError> {
        self.connection
            .lock()
            .await
            .clone()
            .ok_or_else(|| StreamError::Transport("event log not connected".to_string()))
    }

    async fn classify(&self, err: RedisError) -> StreamError {
        if err.code() == Some("NOGROUP") {
            return StreamError::NoGroup(err.to_string());
        }
        if is_transport_error(&err) {
            self.connection.lock().await.take();
            return StreamError::Transport(err.to_string());
        }
        StreamError::Command(err.to_string())
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn connect(&self) -> Result<(), StreamError> {
        let connection = timeout(
            self.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| StreamError::Transport("connect timed out".to_string()))?
        .map_err(|err| StreamError::Transport(err.to_string()))?;

        *self.connection.lock().await = Some(connection);
        debug!(target = SOURCE, "event log connected");
        Ok(())
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation, StreamError> {
        let mut conn = self.connection().await?;
        match conn
            .xgroup_create_mkstream::<_, _, _, ()>(stream, group, GROUP_START_ID)
            .await
        {
            Ok(()) => Ok(GroupCreation::Created),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(GroupCreation::AlreadyExists),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError> {
        let mut conn = self.connection().await?;
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block.as_millis() as usize);

        let reply = conn
            .xread_options::<_, _, Option<StreamReadReply>>(&[stream], &[NEW_ENTRIES_ID], &options)
            .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => return Err(self.classify(err).await),
        };

        let Some(entry) = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next()
        else {
            return Ok(None);
        };

        let fields = entry
            .map
            .into_iter()
            .filter_map(|(field, value)| field_text(&value).map(|text| (field, text)))
            .collect::<HashMap<_, _>>();
        Ok(Some(StreamEntry::new(entry.id, fields)))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.connection().await?;
        match conn.xack::<_, _, _, u64>(stream, group, &[id]).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn close(&self) {
        if self.connection.lock().await.take().is_some() {
            debug!(target = SOURCE, "event log connection closed");
        }
    }
}

fn field_text(value: &Value) -> Option<String> {
    redis::from_redis_value::<String>(value).ok()
}
