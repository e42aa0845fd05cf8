//! Capability interfaces over the object store and queue primitives.
//!
//! The workflow never talks to a concrete storage SDK; it is written against
//! [`ObjectStore`] and [`QueueStore`] so production backends, the in-memory
//! backend, and test doubles are interchangeable. Queue semantics are
//! at-least-once: a dequeued message that is not handled to completion is
//! requeued by the worker runtime until its dequeue count reaches the
//! configured ceiling.

mod memory;

pub use memory::InMemoryStorage;

use async_trait::async_trait;
use mediaflow_common::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical layout of a stored object. Only simple, randomly-addressable
/// block objects can be ingested into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Block,
    Append,
    Page,
}

/// Metadata handle for a stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Full address of the object.
    pub url: String,
    /// Container the object lives in.
    pub container: String,
    /// Object name within its container.
    pub name: String,
    /// Physical layout of the object.
    pub kind: ObjectKind,
    /// Byte length of the object's content.
    pub content_length: u64,
}

/// A message delivered from a queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: Uuid,
    pub body: String,
    /// How many times this message has been dequeued, including the delivery
    /// that produced this value.
    pub dequeue_count: u32,
}

/// Object store primitives: resolve, find-or-create container, upload,
/// server-side copy, metadata fetch, delete.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve an object address to its metadata handle.
    async fn resolve_object(&self, url: &str) -> Result<StoredObject>;

    /// Create the container if it does not exist. Returns whether it was
    /// created by this call. `public_read` grants anonymous read access to
    /// the container's objects when the container is created.
    async fn ensure_container(&self, name: &str, public_read: bool) -> Result<bool>;

    /// Upload an object into an existing container.
    async fn upload_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject>;

    /// Server-side copy of an object into an existing container.
    async fn copy_object(&self, source_url: &str, dest_container: &str, dest_name: &str)
        -> Result<()>;

    /// Fetch the metadata of an object by container and name.
    async fn object_metadata(&self, container: &str, name: &str) -> Result<StoredObject>;

    /// Delete an object by address.
    async fn delete_object(&self, url: &str) -> Result<()>;
}

/// Queue primitives: find-or-create, enqueue, dequeue, requeue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Create the queue if it does not exist.
    async fn ensure_queue(&self, name: &str) -> Result<()>;

    /// Append a new message to the queue.
    async fn enqueue(&self, queue: &str, body: &str) -> Result<()>;

    /// Take the next message off the queue, incrementing its dequeue count.
    /// Returns `None` when the queue is empty or absent.
    async fn dequeue(&self, queue: &str) -> Result<Option<QueueMessage>>;

    /// Put a previously dequeued message back, preserving its dequeue count.
    /// Also used to park messages in a poison queue.
    async fn requeue(&self, queue: &str, message: QueueMessage) -> Result<()>;
}
