//! Encoding job submission.

use std::sync::Arc;

use mediaflow_common::{Error, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::engine::{
    EncodingJob, JobSpec, NotificationSubscription, NotificationTarget, ProcessingAsset, TaskSpec,
    TranscodingEngine,
};
use crate::storage::QueueStore;

/// Name under which the notification endpoint is found or created. One
/// endpoint is shared by every job reporting to the same queue.
const NOTIFICATION_ENDPOINT_NAME: &str = "job-progress-endpoint";

/// Builds and submits encoding jobs wired to a notification queue.
pub struct JobSubmissionManager {
    engine: Arc<dyn TranscodingEngine>,
    queues: Arc<dyn QueueStore>,
    config: Arc<Config>,
}

impl JobSubmissionManager {
    pub fn new(
        engine: Arc<dyn TranscodingEngine>,
        queues: Arc<dyn QueueStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            queues,
            config,
        }
    }

    /// Submit one adaptive-bitrate encoding job for the asset, subscribed to
    /// report every state transition to `notification_queue`.
    ///
    /// Returns as soon as the engine has accepted the job; completion
    /// arrives later through the notification queue.
    pub async fn submit(
        &self,
        asset: &ProcessingAsset,
        notification_queue: &str,
    ) -> Result<EncodingJob> {
        let encoding = &self.config.encoding;

        let processor = self
            .engine
            .latest_processor_by_name(&encoding.processor)
            .await?
            .ok_or_else(|| {
                Error::configuration(format!("unknown media processor: {}", encoding.processor))
            })?;
        debug!(
            processor = %processor.name,
            version = %processor.version,
            "resolved media processor"
        );

        let mut tasks = vec![TaskSpec {
            name: "Multibitrate".to_string(),
            profile: encoding.multibitrate_profile.clone(),
            output_asset_name: format!("Multibitrate output for {}", asset.name),
        }];
        if encoding.generate_thumbnails {
            tasks.push(TaskSpec {
                name: "Thumbnails".to_string(),
                profile: encoding.thumbnail_profile.clone(),
                output_asset_name: format!("Thumbnail output for {}", asset.name),
            });
        }

        self.queues.ensure_queue(notification_queue).await?;
        let endpoint = self
            .engine
            .ensure_notification_endpoint(NOTIFICATION_ENDPOINT_NAME, notification_queue)
            .await?;

        let job = self
            .engine
            .submit_job(JobSpec {
                name: format!("Multibitrate generation for {}", asset.name),
                processor_id: processor.id,
                input_asset: asset.id,
                tasks,
                subscription: NotificationSubscription {
                    endpoint: endpoint.id,
                    target: NotificationTarget::All,
                },
            })
            .await?;

        info!(
            job_id = %job.id,
            asset_id = %asset.id,
            tasks = job.tasks.len(),
            "encoding job submitted"
        );
        Ok(job)
    }
}
