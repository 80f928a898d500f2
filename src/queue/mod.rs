//! FIFO task queue over a named list in an external key-value store.
//!
//! The gateway adds validation and nothing else: ordering and atomicity come from the store's
//! list primitive, and store failures are reported to the caller without retries.

mod redis_store;

pub use redis_store::RedisListStore;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a list store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Queue store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected a command.
    #[error("Queue store command failed: {0}")]
    Command(String),
}

/// Errors surfaced by [`QueueGateway`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The pushed item was absent or malformed.
    #[error("{0}")]
    Validation(String),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Minimal list primitive the queue is built on.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append `value` to the tail of `list`.
    async fn push_back(&self, list: &str, value: String) -> Result<(), StoreError>;

    /// Remove and return the head of `list`, if any.
    async fn pop_front(&self, list: &str) -> Result<Option<String>, StoreError>;

    /// Number of items in `list`.
    async fn len(&self, list: &str) -> Result<usize, StoreError>;
}

/// Outcome of a pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    /// The head item, in the string form it was pushed as.
    Item(String),
    /// The queue was empty.
    Empty,
}

/// Push/pop/length over one fixed list.
#[derive(Clone)]
pub struct QueueGateway {
    store: Arc<dyn ListStore>,
    list: String,
}

impl QueueGateway {
    /// Gateway over `list` in `store`.
    pub fn new(store: Arc<dyn ListStore>, list: impl Into<String>) -> Self {
        Self {
            store,
            list: list.into(),
        }
    }

    /// Enqueue a JSON object, stored in its compact string form.
    pub async fn push(&self, item: Option<&Value>) -> Result<(), QueueError> {
        let object = match item {
            None | Some(Value::Null) => {
                return Err(QueueError::Validation("No data provided".into()));
            }
            Some(Value::Object(object)) => object,
            Some(_) => {
                return Err(QueueError::Validation(
                    "Queue items must be JSON objects".into(),
                ));
            }
        };
        if object.is_empty() {
            return Err(QueueError::Validation("No data provided".into()));
        }

        let encoded = Value::Object(object.clone()).to_string();
        self.store.push_back(&self.list, encoded).await?;
        tracing::debug!(list = %self.list, "Item queued");
        Ok(())
    }

    /// Dequeue the oldest item.
    pub async fn pop(&self) -> Result<Popped, QueueError> {
        let popped = match self.store.pop_front(&self.list).await? {
            Some(item) => Popped::Item(item),
            None => Popped::Empty,
        };
        Ok(popped)
    }

    /// Number of queued items.
    pub async fn length(&self) -> Result<usize, QueueError> {
        Ok(self.store.len(&self.list).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// In-process list store.
    #[derive(Default)]
    pub(crate) struct MemoryListStore {
        lists: Mutex<HashMap<String, VecDeque<String>>>,
    }

    #[async_trait]
    impl ListStore for MemoryListStore {
        async fn push_back(&self, list: &str, value: String) -> Result<(), StoreError> {
            self.lists
                .lock()
                .unwrap()
                .entry(list.to_string())
                .or_default()
                .push_back(value);
            Ok(())
        }

        async fn pop_front(&self, list: &str) -> Result<Option<String>, StoreError> {
            Ok(self
                .lists
                .lock()
                .unwrap()
                .get_mut(list)
                .and_then(VecDeque::pop_front))
        }

        async fn len(&self, list: &str) -> Result<usize, StoreError> {
            Ok(self
                .lists
                .lock()
                .unwrap()
                .get(list)
                .map_or(0, VecDeque::len))
        }
    }

    /// Store whose every operation fails as if the server were down.
    pub(crate) struct DownListStore;

    #[async_trait]
    impl ListStore for DownListStore {
        async fn push_back(&self, _list: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn pop_front(&self, _list: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn len(&self, _list: &str) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{DownListStore, MemoryListStore};
    use super::*;
    use serde_json::json;

    fn gateway() -> QueueGateway {
        QueueGateway::new(Arc::new(MemoryListStore::default()), "task_queue")
    }

    #[tokio::test]
    async fn push_then_pop_returns_the_item() {
        let queue = gateway();
        queue.push(Some(&json!({ "a": 1 }))).await.expect("push");

        assert_eq!(queue.length().await.expect("length"), 1);
        assert_eq!(
            queue.pop().await.expect("pop"),
            Popped::Item(r#"{"a":1}"#.into())
        );
        assert_eq!(queue.pop().await.expect("pop"), Popped::Empty);
        assert_eq!(queue.length().await.expect("length"), 0);
    }

    #[tokio::test]
    async fn items_come_out_in_push_order() {
        let queue = gateway();
        for n in 0..3 {
            queue.push(Some(&json!({ "n": n }))).await.expect("push");
        }

        for n in 0..3 {
            assert_eq!(
                queue.pop().await.expect("pop"),
                Popped::Item(format!(r#"{{"n":{n}}}"#))
            );
        }
    }

    #[tokio::test]
    async fn absent_or_empty_items_are_rejected() {
        let queue = gateway();
        for item in [None, Some(json!(null)), Some(json!({})), Some(json!([1, 2]))] {
            assert!(matches!(
                queue.push(item.as_ref()).await,
                Err(QueueError::Validation(_))
            ));
        }
        assert_eq!(queue.length().await.expect("length"), 0);
    }

    #[tokio::test]
    async fn store_failures_are_surfaced() {
        let queue = QueueGateway::new(Arc::new(DownListStore), "task_queue");

        assert!(matches!(
            queue.push(Some(&json!({ "a": 1 }))).await,
            Err(QueueError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            queue.pop().await,
            Err(QueueError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            queue.length().await,
            Err(QueueError::Store(StoreError::Unavailable(_)))
        ));
    }
}
