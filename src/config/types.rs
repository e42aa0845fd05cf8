use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub media_service: MediaServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queues: QueueRuntimeConfig,

    #[serde(default)]
    pub encoding: EncodingConfig,
}

/// Credentials for the external transcoding engine. Read once at startup and
/// passed by reference into every component; no ambient lookup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaServiceConfig {
    /// Account name of the transcoding engine tenant.
    #[serde(default)]
    pub name: String,

    /// Access key for the transcoding engine tenant.
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Connection string for the object store / queue account.
    #[serde(default = "default_connection")]
    pub connection: String,

    /// Container new uploads land in.
    #[serde(default = "default_upload_container")]
    pub upload_container: String,

    /// Queue carrying new-object pointer messages.
    #[serde(default = "default_upload_queue")]
    pub upload_queue: String,

    /// Queue the engine reports job state changes to.
    #[serde(default = "default_progress_queue")]
    pub progress_queue: String,
}

fn default_connection() -> String {
    "memory://local".to_string()
}
fn default_upload_container() -> String {
    "uploads".to_string()
}
fn default_upload_queue() -> String {
    "upload".to_string()
}
fn default_progress_queue() -> String {
    "job-progress".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            upload_container: default_upload_container(),
            upload_queue: default_upload_queue(),
            progress_queue: default_progress_queue(),
        }
    }
}

/// Queue runtime policy: polling cadence, in-flight bound, and the redelivery
/// ceiling before a message is parked in the poison queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueRuntimeConfig {
    /// Maximum interval between queue polls, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of delivery attempts before a message is moved to the poison
    /// queue.
    #[serde(default = "default_max_dequeue_count")]
    pub max_dequeue_count: u32,

    /// Maximum number of concurrently in-flight messages per worker instance.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_max_dequeue_count() -> u32 {
    5
}
fn default_max_in_flight() -> usize {
    5
}

impl Default for QueueRuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_dequeue_count: default_max_dequeue_count(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl QueueRuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncodingConfig {
    /// Name of the engine-side media processor to run tasks against. The
    /// latest installed version is resolved at submission time.
    #[serde(default = "default_processor")]
    pub processor: String,

    /// Encoding profile for the adaptive-bitrate task.
    #[serde(default = "default_multibitrate_profile")]
    pub multibitrate_profile: String,

    /// Encoding profile for the thumbnail/poster task.
    #[serde(default = "default_thumbnail_profile")]
    pub thumbnail_profile: String,

    /// Whether to attach the thumbnail task alongside the adaptive-bitrate
    /// task.
    #[serde(default = "default_generate_thumbnails")]
    pub generate_thumbnails: bool,
}

fn default_processor() -> String {
    "Media Encoder Standard".to_string()
}
fn default_multibitrate_profile() -> String {
    "H264 Adaptive Bitrate MP4 Set 720p".to_string()
}
fn default_thumbnail_profile() -> String {
    "Thumbnail Best Frame".to_string()
}
fn default_generate_thumbnails() -> bool {
    true
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            processor: default_processor(),
            multibitrate_profile: default_multibitrate_profile(),
            thumbnail_profile: default_thumbnail_profile(),
            generate_thumbnails: default_generate_thumbnails(),
        }
    }
}
