//! Capability interface over the external transcoding engine.
//!
//! The engine is a black box that owns assets, accepts job descriptions, and
//! reports state changes by enqueuing `JobStateChange` messages onto the
//! queue a job's notification endpoint is bound to. Everything the workflow
//! needs from it is expressed on [`TranscodingEngine`]; the in-memory
//! implementation in [`memory`] simulates execution for local runs and tests.

mod memory;

pub use memory::InMemoryEngine;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mediaflow_common::{AssetId, EndpointId, JobId, LocatorId, PolicyId, Result};
use serde::{Deserialize, Serialize};

/// One file registered under a processing asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetFile {
    pub name: String,
    pub content_length: u64,
}

/// A named unit of ingested or produced media held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingAsset {
    pub id: AssetId,
    pub name: String,
    pub files: Vec<AssetFile>,
    /// Whether the asset can be served through a streaming origin.
    pub streamable: bool,
}

/// Permission carried by an access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPermission {
    Read,
    Write,
}

/// A time-bounded permission object backing one or more locators.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub id: PolicyId,
    pub name: String,
    pub duration: Duration,
    pub permission: AccessPermission,
}

/// How a locator exposes its asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    /// Shared-access-signature URL straight into the asset's container.
    Sas,
    /// Streaming origin endpoint serving adaptive formats.
    OnDemandOrigin,
}

/// An access grant binding a policy to an asset, yielding public URLs.
#[derive(Debug, Clone)]
pub struct Locator {
    pub id: LocatorId,
    pub name: String,
    pub kind: LocatorKind,
    pub asset_id: AssetId,
    /// Full address of the grant, including any access-token query. The
    /// first path segment names the asset's container.
    pub path: String,
    /// Address prefix public URLs are built from.
    pub base_uri: String,
    /// Access-token suffix appended to per-file URLs; empty for origin
    /// locators.
    pub content_access_component: String,
    pub start: DateTime<Utc>,
}

/// An installed engine-side processor, versioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProcessor {
    pub id: String,
    pub name: String,
    pub version: String,
}

/// Endpoint through which the engine delivers job notifications to a queue.
#[derive(Debug, Clone)]
pub struct NotificationEndpoint {
    pub id: EndpointId,
    pub name: String,
    pub queue_name: String,
}

/// Which job state transitions a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    /// Every state transition.
    All,
    /// Only transitions into a terminal state.
    FinalStatesOnly,
}

/// A job's subscription to state-change notifications.
#[derive(Debug, Clone, Copy)]
pub struct NotificationSubscription {
    pub endpoint: EndpointId,
    pub target: NotificationTarget,
}

/// Engine-side lifecycle state of a job. Observed only through
/// notifications; this system never polls for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Scheduled,
    Processing,
    Finished,
    Error,
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Canceled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "Queued",
            Self::Scheduled => "Scheduled",
            Self::Processing => "Processing",
            Self::Finished => "Finished",
            Self::Error => "Error",
            Self::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

/// One task to attach to a job at submission time. The task consumes the
/// job's input asset and produces a freshly created output asset.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub profile: String,
    pub output_asset_name: String,
}

/// A complete job description handed to the engine.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub processor_id: String,
    pub input_asset: AssetId,
    pub tasks: Vec<TaskSpec>,
    pub subscription: NotificationSubscription,
}

/// A task as recorded on a submitted job.
#[derive(Debug, Clone)]
pub struct EncodingTask {
    pub name: String,
    pub profile: String,
    pub input_asset_ids: Vec<AssetId>,
    pub output_asset_id: AssetId,
}

/// A submitted unit of work. Immutable once submitted except for
/// engine-driven state transitions.
#[derive(Debug, Clone)]
pub struct EncodingJob {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub tasks: Vec<EncodingTask>,
    pub input_asset_ids: Vec<AssetId>,
    pub output_asset_ids: Vec<AssetId>,
    pub subscription: NotificationSubscription,
}

#[async_trait]
pub trait TranscodingEngine: Send + Sync {
    /// Create an empty asset with the given display name.
    async fn create_asset(&self, name: &str) -> Result<ProcessingAsset>;

    /// Register a file (zero-length until persisted) under an asset.
    async fn add_asset_file(&self, asset: &AssetId, file_name: &str) -> Result<()>;

    /// Write back an asset's updated state (files, lengths, streamability).
    async fn persist_asset(&self, asset: &ProcessingAsset) -> Result<()>;

    /// Look up an asset by ID.
    async fn get_asset(&self, id: &AssetId) -> Result<Option<ProcessingAsset>>;

    /// Resolve the latest installed version of a named processor.
    async fn latest_processor_by_name(&self, name: &str) -> Result<Option<MediaProcessor>>;

    /// Create a new access policy.
    async fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permission: AccessPermission,
    ) -> Result<AccessPolicy>;

    /// Delete an access policy. Deleting an absent policy is a no-op so
    /// redelivered cleanup is safe.
    async fn delete_access_policy(&self, id: &PolicyId) -> Result<()>;

    /// Create a locator binding a policy to an asset. Creation is idempotent
    /// on the locator name: if a locator with this name already exists it is
    /// returned unchanged.
    async fn create_locator(
        &self,
        kind: LocatorKind,
        asset: &AssetId,
        policy: &PolicyId,
        start: DateTime<Utc>,
        name: &str,
    ) -> Result<Locator>;

    /// Look up a locator by name.
    async fn find_locator(&self, name: &str) -> Result<Option<Locator>>;

    /// Delete a locator. Deleting an absent locator is a no-op.
    async fn delete_locator(&self, id: &LocatorId) -> Result<()>;

    /// Find or create a notification endpoint bound to a queue.
    async fn ensure_notification_endpoint(
        &self,
        name: &str,
        queue_name: &str,
    ) -> Result<NotificationEndpoint>;

    /// Submit a job for asynchronous execution. Returns as soon as the
    /// engine has accepted the job; completion is reported through the
    /// subscribed notification queue.
    async fn submit_job(&self, spec: JobSpec) -> Result<EncodingJob>;

    /// Look up a job by ID.
    async fn get_job(&self, id: &JobId) -> Result<Option<EncodingJob>>;
}
