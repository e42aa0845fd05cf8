//! Ingestion of newly uploaded objects into the engine's staging area.

use std::sync::Arc;

use chrono::{Duration, Utc};
use mediaflow_common::{Error, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::engine::{
    AccessPermission, AccessPolicy, AssetFile, Locator, LocatorKind, ProcessingAsset,
    TranscodingEngine,
};
use crate::storage::{ObjectKind, ObjectStore, StoredObject};

/// Write grants used during the copy live for one hour.
const WRITE_GRANT_HOURS: i64 = 1;

/// Copies uploaded objects into engine assets, verifying integrity.
pub struct IngestionHandler {
    engine: Arc<dyn TranscodingEngine>,
    store: Arc<dyn ObjectStore>,
}

impl IngestionHandler {
    pub fn new(engine: Arc<dyn TranscodingEngine>, store: Arc<dyn ObjectStore>) -> Self {
        Self { engine, store }
    }

    /// Produce a [`ProcessingAsset`] holding an exact copy of the source
    /// object, then remove the source and the transient grant used for the
    /// copy.
    ///
    /// The source object is deleted only after the copy has been verified
    /// byte-for-byte, so any earlier failure leaves the trigger message safe
    /// to redeliver.
    pub async fn ingest_object(&self, source_url: &str) -> Result<ProcessingAsset> {
        let source = self.store.resolve_object(source_url).await?;
        if source.kind != ObjectKind::Block {
            return Err(Error::validation(format!(
                "only block objects can be ingested, {source_url} is {:?}",
                source.kind
            )));
        }

        let mut asset = self.engine.create_asset(&source.name).await?;
        debug!(asset_id = %asset.id, name = %asset.name, "created staging asset");

        let write_policy = self
            .engine
            .create_access_policy(
                &format!("ingest-write-{}", asset.id),
                Duration::hours(WRITE_GRANT_HOURS),
                AccessPermission::Write,
            )
            .await?;
        let write_locator = self
            .engine
            .create_locator(
                LocatorKind::Sas,
                &asset.id,
                &write_policy.id,
                Utc::now(),
                &format!("ingest-locator-{}", asset.id),
            )
            .await?;

        // The transient write grant is released whether or not the copy
        // succeeded; only the verified result decides what happens next.
        let copy_result = self.copy_into_staging(&source, &mut asset, &write_locator).await;
        self.release_write_grant(&write_locator, &write_policy).await;
        let bytes = copy_result?;

        // Non-idempotent terminal action, ordered strictly after the
        // verified copy.
        self.store.delete_object(&source.url).await?;
        self.engine.persist_asset(&asset).await?;

        info!(
            asset_id = %asset.id,
            source_url = %source.url,
            bytes,
            "object ingested"
        );
        Ok(asset)
    }

    /// Steps 4–7: destination container, file registration, server-side
    /// copy, byte-length verification. Returns the verified length.
    async fn copy_into_staging(
        &self,
        source: &StoredObject,
        asset: &mut ProcessingAsset,
        write_locator: &Locator,
    ) -> Result<u64> {
        let container = destination_container(&write_locator.path)?;
        let created = self.store.ensure_container(&container, true).await?;
        if created {
            debug!(container = %container, "created staging container with public read");
        }

        self.engine.add_asset_file(&asset.id, &source.name).await?;

        self.store
            .copy_object(&source.url, &container, &source.name)
            .await?;

        let destination = self.store.object_metadata(&container, &source.name).await?;
        if destination.content_length != source.content_length {
            return Err(Error::Integrity {
                expected: source.content_length,
                actual: destination.content_length,
            });
        }

        asset.files = vec![AssetFile {
            name: source.name.clone(),
            content_length: destination.content_length,
        }];
        Ok(destination.content_length)
    }

    /// Release the transient write grant. Failures here are logged, not
    /// propagated: they must not mask the copy outcome.
    async fn release_write_grant(&self, locator: &Locator, policy: &AccessPolicy) {
        if let Err(e) = self.engine.delete_locator(&locator.id).await {
            warn!(locator_id = %locator.id, error = %e, "failed to delete transient write locator");
        }
        if let Err(e) = self.engine.delete_access_policy(&policy.id).await {
            warn!(policy_id = %policy.id, error = %e, "failed to delete transient write policy");
        }
    }
}

/// The staging container is the first path segment of the write grant's
/// address.
fn destination_container(locator_path: &str) -> Result<String> {
    let url = Url::parse(locator_path)
        .map_err(|e| Error::storage(format!("invalid locator path {locator_path}: {e}")))?;
    url.path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::storage(format!("locator path has no container: {locator_path}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_comes_from_first_path_segment() {
        let container =
            destination_container("https://storage.mediaflow.local/asset-abc123?sv=1&sig=xyz")
                .unwrap();
        assert_eq!(container, "asset-abc123");
    }

    #[test]
    fn rejects_locator_path_without_container() {
        assert!(destination_container("https://storage.mediaflow.local/").is_err());
        assert!(destination_container("not a url").is_err());
    }
}
