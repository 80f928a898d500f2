use super::{ListStore, StoreError};
use crate::config::Config;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};

/// Redis-backed list store. A connection is opened for every operation.
#[derive(Clone)]
pub struct RedisListStore {
    client: redis::Client,
}

impl RedisListStore {
    /// Store connecting with the configured host, port, database, and password.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.redis_host.clone(), config.redis_port),
            redis: RedisConnectionInfo {
                db: config.redis_db,
                password: config.redis_password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(map_redis_error)?;
        tracing::info!(
            host = %config.redis_host,
            port = config.redis_port,
            db = config.redis_db,
            "Redis list store configured"
        );
        Ok(Self { client })
    }

    async fn connect(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)
    }
}

fn map_redis_error(error: RedisError) -> StoreError {
    if error.is_io_error() || error.is_connection_refusal() || error.is_timeout() {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Command(error.to_string())
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push_back(&self, list: &str, value: String) -> Result<(), StoreError> {
        let mut connection = self.connect().await?;
        let _: usize = connection
            .rpush(list, value)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn pop_front(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connect().await?;
        connection.lpop(list, None).await.map_err(map_redis_error)
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        let mut connection = self.connect().await?;
        connection.llen(list).await.map_err(map_redis_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_store() -> RedisListStore {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp("127.0.0.1".into(), 1),
            redis: RedisConnectionInfo::default(),
        };
        RedisListStore {
            client: redis::Client::open(info).expect("client"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let store = unreachable_store();
        assert!(matches!(
            store.len("task_queue").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.push_back("task_queue", "{}".into()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
