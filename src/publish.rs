//! Publication of a finished job's outputs as streamable URLs.

use std::sync::Arc;

use mediaflow_common::{Error, JobId, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{JobState, ProcessingAsset, TranscodingEngine};
use crate::locators::LocatorCache;

/// Poster images follow the engine's thumbnail naming convention.
const POSTER_EXTENSION: &str = ".jpg";

/// The externally visible outcome of a finished job. Recomputed fresh on
/// every publication run; safe to recompute because the locator cache
/// beneath it is idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptiveStreamingInfo {
    pub smooth_streaming_url: Option<String>,
    pub mpeg_dash_url: Option<String>,
    pub hls_url: Option<String>,
    pub posters: Vec<String>,
}

/// An output asset classified once by how it is published.
enum OutputKind {
    /// Served through a streaming origin in the adaptive formats.
    Streamable(ProcessingAsset),
    /// Plain files served individually through a SAS grant.
    Files(ProcessingAsset),
}

impl OutputKind {
    fn classify(asset: ProcessingAsset) -> Self {
        if asset.streamable {
            Self::Streamable(asset)
        } else {
            Self::Files(asset)
        }
    }
}

/// Builds [`AdaptiveStreamingInfo`] for finished jobs.
pub struct Publisher {
    engine: Arc<dyn TranscodingEngine>,
    locators: LocatorCache,
}

impl Publisher {
    pub fn new(engine: Arc<dyn TranscodingEngine>) -> Self {
        let locators = LocatorCache::new(engine.clone());
        Self { engine, locators }
    }

    /// Publish the outputs of a finished job.
    ///
    /// A job that cannot be found or is not actually finished is a not-ready
    /// error: it implies a logic or race condition upstream and is surfaced
    /// to the caller rather than retried.
    pub async fn prepare_adaptive_streaming(&self, job_id: &JobId) -> Result<AdaptiveStreamingInfo> {
        let job = self
            .engine
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::not_ready(format!("job {job_id} not found")))?;

        if job.state != JobState::Finished {
            return Err(Error::not_ready(format!(
                "job {job_id} is not finished (state: {})",
                job.state
            )));
        }

        let mut info = AdaptiveStreamingInfo::default();

        for asset_id in &job.output_asset_ids {
            let asset = self
                .engine
                .get_asset(asset_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("output asset {asset_id}")))?;

            match OutputKind::classify(asset) {
                OutputKind::Streamable(asset) => {
                    let locator = self.locators.streaming_locator(&asset).await?;
                    let manifest = manifest_file_name(&asset);
                    debug!(asset_id = %asset.id, manifest = %manifest, "publishing streaming asset");

                    let smooth = format!("{}/{}/manifest", locator.base_uri, manifest);
                    info.mpeg_dash_url = Some(format!("{smooth}(format=mpd-time-csf)"));
                    info.hls_url = Some(format!("{smooth}(format=m3u8-aapl)"));
                    info.smooth_streaming_url = Some(smooth);
                }
                OutputKind::Files(asset) => {
                    let locator = self.locators.sas_locator(&asset).await?;
                    for file in asset.files.iter().filter(|f| f.name.ends_with(POSTER_EXTENSION)) {
                        info.posters.push(format!(
                            "{}/{}{}",
                            locator.base_uri, file.name, locator.content_access_component
                        ));
                    }
                }
            }
        }

        Ok(info)
    }
}

/// The .ism manifest registered under the asset, falling back to the asset
/// name when the engine did not register one.
fn manifest_file_name(asset: &ProcessingAsset) -> String {
    asset
        .files
        .iter()
        .find(|f| f.name.ends_with(".ism"))
        .map(|f| f.name.clone())
        .unwrap_or_else(|| format!("{}.ism", asset.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AssetFile;
    use mediaflow_common::AssetId;

    fn asset(files: &[&str], streamable: bool) -> ProcessingAsset {
        ProcessingAsset {
            id: AssetId::new(),
            name: "video".to_string(),
            files: files
                .iter()
                .map(|n| AssetFile {
                    name: n.to_string(),
                    content_length: 1,
                })
                .collect(),
            streamable,
        }
    }

    #[test]
    fn manifest_prefers_registered_ism() {
        let a = asset(&["video_0650kbps.mp4", "video.ism"], true);
        assert_eq!(manifest_file_name(&a), "video.ism");

        let a = asset(&["video_0650kbps.mp4"], true);
        assert_eq!(manifest_file_name(&a), "video.ism");
    }

    #[test]
    fn classification_follows_streamable_flag() {
        assert!(matches!(
            OutputKind::classify(asset(&[], true)),
            OutputKind::Streamable(_)
        ));
        assert!(matches!(
            OutputKind::classify(asset(&[], false)),
            OutputKind::Files(_)
        ));
    }
}
