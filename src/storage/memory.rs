//! In-memory object store and queue backend.
//!
//! Backs local development runs and the test suite. Container and queue
//! state lives behind `parking_lot` locks; no await points hold a lock.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use mediaflow_common::{Error, Result};
use parking_lot::RwLock;
use url::Url;
use uuid::Uuid;

use super::{ObjectKind, ObjectStore, QueueMessage, QueueStore, StoredObject};

#[derive(Debug, Clone)]
struct ObjectRecord {
    kind: ObjectKind,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct ContainerRecord {
    public_read: bool,
    objects: HashMap<String, ObjectRecord>,
}

/// In-memory implementation of [`ObjectStore`] and [`QueueStore`].
pub struct InMemoryStorage {
    authority: String,
    containers: RwLock<HashMap<String, ContainerRecord>>,
    queues: RwLock<HashMap<String, VecDeque<QueueMessage>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_authority("storage.mediaflow.local")
    }

    /// Use a custom host in generated object addresses.
    pub fn with_authority(authority: &str) -> Self {
        Self {
            authority: authority.to_string(),
            containers: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
        }
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!("https://{}/{}/{}", self.authority, container, name)
    }

    /// Split an object address into (container, name).
    fn parse_url(&self, url: &str) -> Result<(String, String)> {
        let parsed =
            Url::parse(url).map_err(|e| Error::storage(format!("invalid object url {url}: {e}")))?;
        let mut segments = parsed
            .path_segments()
            .ok_or_else(|| Error::storage(format!("object url has no path: {url}")))?;
        let container = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::storage(format!("object url has no container: {url}")))?;
        let name = segments.collect::<Vec<_>>().join("/");
        if name.is_empty() {
            return Err(Error::storage(format!("object url has no object name: {url}")));
        }
        Ok((container.to_string(), name))
    }

    fn stored_object(&self, container: &str, name: &str, record: &ObjectRecord) -> StoredObject {
        StoredObject {
            url: self.object_url(container, name),
            container: container.to_string(),
            name: name.to_string(),
            kind: record.kind,
            content_length: record.bytes.len() as u64,
        }
    }

    /// Insert an object with an explicit kind, creating the container if
    /// needed. Returns the object's address. Used to seed fixtures.
    pub fn insert_object(
        &self,
        container: &str,
        name: &str,
        kind: ObjectKind,
        bytes: Vec<u8>,
    ) -> String {
        let mut containers = self.containers.write();
        containers
            .entry(container.to_string())
            .or_default()
            .objects
            .insert(name.to_string(), ObjectRecord { kind, bytes });
        self.object_url(container, name)
    }

    /// Byte length of an object, if present.
    pub fn object_len(&self, container: &str, name: &str) -> Option<u64> {
        let containers = self.containers.read();
        containers
            .get(container)?
            .objects
            .get(name)
            .map(|r| r.bytes.len() as u64)
    }

    /// Truncate a stored object's content to `len` bytes. Used by tests to
    /// simulate a corrupted server-side copy.
    pub fn truncate_object(&self, container: &str, name: &str, len: usize) {
        let mut containers = self.containers.write();
        if let Some(record) = containers
            .get_mut(container)
            .and_then(|c| c.objects.get_mut(name))
        {
            record.bytes.truncate(len);
        }
    }

    /// Whether a container grants anonymous read access. `None` when the
    /// container does not exist.
    pub fn container_is_public(&self, name: &str) -> Option<bool> {
        let containers = self.containers.read();
        containers.get(name).map(|c| c.public_read)
    }

    /// Number of messages currently sitting in a queue.
    pub fn queue_len(&self, queue: &str) -> usize {
        let queues = self.queues.read();
        queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStorage {
    async fn resolve_object(&self, url: &str) -> Result<StoredObject> {
        let (container, name) = self.parse_url(url)?;
        let containers = self.containers.read();
        let record = containers
            .get(&container)
            .and_then(|c| c.objects.get(&name))
            .ok_or_else(|| Error::not_found(format!("object {url}")))?;
        Ok(self.stored_object(&container, &name, record))
    }

    async fn ensure_container(&self, name: &str, public_read: bool) -> Result<bool> {
        let mut containers = self.containers.write();
        if containers.contains_key(name) {
            return Ok(false);
        }
        containers.insert(
            name.to_string(),
            ContainerRecord {
                public_read,
                objects: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn upload_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject> {
        let mut containers = self.containers.write();
        let record = ObjectRecord {
            kind: ObjectKind::Block,
            bytes,
        };
        let stored = self.stored_object(container, name, &record);
        containers
            .get_mut(container)
            .ok_or_else(|| Error::storage(format!("container not found: {container}")))?
            .objects
            .insert(name.to_string(), record);
        Ok(stored)
    }

    async fn copy_object(
        &self,
        source_url: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<()> {
        let (src_container, src_name) = self.parse_url(source_url)?;
        let mut containers = self.containers.write();
        let record = containers
            .get(&src_container)
            .and_then(|c| c.objects.get(&src_name))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("object {source_url}")))?;
        containers
            .get_mut(dest_container)
            .ok_or_else(|| Error::storage(format!("container not found: {dest_container}")))?
            .objects
            .insert(dest_name.to_string(), record);
        Ok(())
    }

    async fn object_metadata(&self, container: &str, name: &str) -> Result<StoredObject> {
        let containers = self.containers.read();
        let record = containers
            .get(container)
            .and_then(|c| c.objects.get(name))
            .ok_or_else(|| Error::not_found(format!("object {container}/{name}")))?;
        Ok(self.stored_object(container, name, record))
    }

    async fn delete_object(&self, url: &str) -> Result<()> {
        let (container, name) = self.parse_url(url)?;
        let mut containers = self.containers.write();
        let removed = containers
            .get_mut(&container)
            .and_then(|c| c.objects.remove(&name));
        if removed.is_none() {
            return Err(Error::not_found(format!("object {url}")));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for InMemoryStorage {
    async fn ensure_queue(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.write();
        queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn enqueue(&self, queue: &str, body: &str) -> Result<()> {
        let mut queues = self.queues.write();
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(QueueMessage {
                id: Uuid::new_v4(),
                body: body.to_string(),
                dequeue_count: 0,
            });
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<QueueMessage>> {
        let mut queues = self.queues.write();
        let Some(messages) = queues.get_mut(queue) else {
            return Ok(None);
        };
        Ok(messages.pop_front().map(|mut m| {
            m.dequeue_count += 1;
            m
        }))
    }

    async fn requeue(&self, queue: &str, message: QueueMessage) -> Result<()> {
        let mut queues = self.queues.write();
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_resolve_copy_delete() {
        let store = InMemoryStorage::new();
        store.ensure_container("uploads", false).await.unwrap();
        let obj = store
            .upload_object("uploads", "video.mp4", vec![1, 2, 3, 4])
            .await
            .unwrap();
        assert_eq!(obj.content_length, 4);
        assert_eq!(obj.kind, ObjectKind::Block);

        let resolved = store.resolve_object(&obj.url).await.unwrap();
        assert_eq!(resolved.container, "uploads");
        assert_eq!(resolved.name, "video.mp4");

        store.ensure_container("staging", true).await.unwrap();
        store
            .copy_object(&obj.url, "staging", "video.mp4")
            .await
            .unwrap();
        let copy = store.object_metadata("staging", "video.mp4").await.unwrap();
        assert_eq!(copy.content_length, 4);

        store.delete_object(&obj.url).await.unwrap();
        assert!(store.resolve_object(&obj.url).await.is_err());
        // The copy survives deletion of the source
        assert!(store.object_metadata("staging", "video.mp4").await.is_ok());
    }

    #[tokio::test]
    async fn ensure_container_reports_creation_once() {
        let store = InMemoryStorage::new();
        assert!(store.ensure_container("c", true).await.unwrap());
        assert!(!store.ensure_container("c", true).await.unwrap());
    }

    #[tokio::test]
    async fn container_access_level_is_set_at_creation() {
        let store = InMemoryStorage::new();
        store.ensure_container("open", true).await.unwrap();
        store.ensure_container("closed", false).await.unwrap();

        assert_eq!(store.container_is_public("open"), Some(true));
        assert_eq!(store.container_is_public("closed"), Some(false));
        assert_eq!(store.container_is_public("missing"), None);

        // The access level is fixed by the creating call.
        store.ensure_container("closed", true).await.unwrap();
        assert_eq!(store.container_is_public("closed"), Some(false));
    }

    #[tokio::test]
    async fn copy_into_missing_container_fails() {
        let store = InMemoryStorage::new();
        let url = store.insert_object("uploads", "a.mp4", ObjectKind::Block, vec![0; 8]);
        let err = store.copy_object(&url, "nowhere", "a.mp4").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn dequeue_counts_deliveries() {
        let store = InMemoryStorage::new();
        store.ensure_queue("q").await.unwrap();
        store.enqueue("q", "hello").await.unwrap();

        let msg = store.dequeue("q").await.unwrap().unwrap();
        assert_eq!(msg.dequeue_count, 1);
        assert_eq!(msg.body, "hello");

        store.requeue("q", msg).await.unwrap();
        let msg = store.dequeue("q").await.unwrap().unwrap();
        assert_eq!(msg.dequeue_count, 2);

        assert!(store.dequeue("q").await.unwrap().is_none());
        assert!(store.dequeue("missing").await.unwrap().is_none());
    }
}
