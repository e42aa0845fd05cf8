//! Workflow progress events broadcast to in-process observers.
//!
//! The worker host owns a broadcast channel and the queue handlers emit one
//! event per completed workflow step. Subscribers (tests, future status
//! surfaces) can watch a workflow move end to end without scraping logs.

use mediaflow_common::{AssetId, JobId};
use serde::{Deserialize, Serialize};

use crate::publish::AdaptiveStreamingInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A new object was copied into the engine's staging area.
    ObjectIngested {
        asset_id: AssetId,
        source_url: String,
        bytes: u64,
    },
    /// An encoding job was accepted by the engine.
    JobSubmitted { job_id: JobId, asset_id: AssetId },
    /// A finished job's outputs were published.
    AssetsPublished {
        job_id: JobId,
        info: AdaptiveStreamingInfo,
    },
}

impl WorkflowEvent {
    pub fn object_ingested(asset_id: AssetId, source_url: String, bytes: u64) -> Self {
        Self::ObjectIngested {
            asset_id,
            source_url,
            bytes,
        }
    }

    pub fn job_submitted(job_id: JobId, asset_id: AssetId) -> Self {
        Self::JobSubmitted { job_id, asset_id }
    }

    pub fn assets_published(job_id: JobId, info: AdaptiveStreamingInfo) -> Self {
        Self::AssetsPublished { job_id, info }
    }
}
