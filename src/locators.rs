//! Idempotent cache of long-lived read grants (locators).
//!
//! Notification delivery is at-least-once, so publication can run more than
//! once for the same finished job. Grants are keyed by a deterministic
//! (purpose, asset) name and looked up before creation, so repeated runs
//! reuse the existing grant instead of accumulating duplicates.

use std::sync::Arc;

use chrono::{Duration, Utc};
use mediaflow_common::{AssetId, Error, Result};
use tracing::debug;

use crate::engine::{AccessPermission, Locator, LocatorKind, ProcessingAsset, TranscodingEngine};

/// Validity window of a read grant: effectively permanent.
const READ_GRANT_DAYS: i64 = 100 * 365;

/// Backdating applied to grant start times, tolerating clock skew between
/// the grant issuer and the first consumer.
const STREAMING_BACKDATE_MINUTES: i64 = 5;
const SAS_BACKDATE_MINUTES: i64 = 10;

fn streaming_locator_name(asset: &AssetId) -> String {
    format!("streaming-locator-{asset}")
}

fn sas_locator_name(asset: &AssetId) -> String {
    format!("sas-locator-{asset}")
}

/// Find-or-create access to read grants for output assets.
pub struct LocatorCache {
    engine: Arc<dyn TranscodingEngine>,
}

impl LocatorCache {
    pub fn new(engine: Arc<dyn TranscodingEngine>) -> Self {
        Self { engine }
    }

    /// Get the streaming-origin grant for a streamable asset.
    pub async fn streaming_locator(&self, asset: &ProcessingAsset) -> Result<Locator> {
        if !asset.streamable {
            return Err(Error::validation(format!(
                "asset {} cannot be streamed",
                asset.id
            )));
        }

        let name = streaming_locator_name(&asset.id);
        if let Some(locator) = self.engine.find_locator(&name).await? {
            debug!(asset_id = %asset.id, "reusing existing streaming locator");
            return Ok(locator);
        }

        let policy = self
            .engine
            .create_access_policy(
                &format!("streaming-policy-{}", asset.id),
                Duration::days(READ_GRANT_DAYS),
                AccessPermission::Read,
            )
            .await?;

        self.engine
            .create_locator(
                LocatorKind::OnDemandOrigin,
                &asset.id,
                &policy.id,
                Utc::now() - Duration::minutes(STREAMING_BACKDATE_MINUTES),
                &name,
            )
            .await
    }

    /// Get the SAS read grant for a non-streamable asset's files.
    pub async fn sas_locator(&self, asset: &ProcessingAsset) -> Result<Locator> {
        let name = sas_locator_name(&asset.id);
        if let Some(locator) = self.engine.find_locator(&name).await? {
            debug!(asset_id = %asset.id, "reusing existing SAS locator");
            return Ok(locator);
        }

        let policy = self
            .engine
            .create_access_policy(
                &format!("sas-policy-{}", asset.id),
                Duration::days(READ_GRANT_DAYS),
                AccessPermission::Read,
            )
            .await?;

        self.engine
            .create_locator(
                LocatorKind::Sas,
                &asset.id,
                &policy.id,
                Utc::now() - Duration::minutes(SAS_BACKDATE_MINUTES),
                &name,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_names_are_deterministic_per_asset() {
        let a = AssetId::new();
        let b = AssetId::new();

        assert_eq!(streaming_locator_name(&a), streaming_locator_name(&a));
        assert_ne!(streaming_locator_name(&a), streaming_locator_name(&b));
        assert_ne!(streaming_locator_name(&a), sas_locator_name(&a));
    }
}
