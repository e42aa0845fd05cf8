//! Upload entry point: push a local file into the upload container and
//! enqueue its address for the worker.

use std::path::Path;
use std::sync::Arc;

use mediaflow_common::{Error, Result};
use tracing::info;

use crate::config::Config;
use crate::storage::{ObjectStore, QueueStore};

pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    queues: Arc<dyn QueueStore>,
    config: Arc<Config>,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queues: Arc<dyn QueueStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            queues,
            config,
        }
    }

    /// Upload a file and enqueue its address (as plain text) on the upload
    /// queue. Returns the address of the uploaded object.
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::validation(format!("invalid file path: {path:?}")))?
            .to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::validation(format!("cannot read {path:?}: {e}")))?;

        let container = &self.config.storage.upload_container;
        self.store.ensure_container(container, false).await?;
        let object = self.store.upload_object(container, &name, bytes).await?;

        let queue = &self.config.storage.upload_queue;
        self.queues.ensure_queue(queue).await?;
        self.queues.enqueue(queue, &object.url).await?;

        info!(url = %object.url, queue = %queue, "file uploaded and enqueued");
        Ok(object.url)
    }
}
