//! In-memory transcoding engine.
//!
//! Backs local development runs and the test suite. Submitted jobs are
//! simulated by a spawned task that walks the job through its lifecycle,
//! materializes output assets per task, and delivers `JobStateChange`
//! notifications to the subscribed queue, exactly as the real engine would.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use mediaflow_common::{AssetId, EndpointId, Error, JobId, LocatorId, PolicyId, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notify::JobStateNotification;
use crate::storage::QueueStore;

use super::{
    AccessPermission, AccessPolicy, AssetFile, EncodingJob, EncodingTask, JobSpec, JobState,
    Locator, LocatorKind, MediaProcessor, NotificationEndpoint, NotificationTarget,
    ProcessingAsset, TranscodingEngine,
};

use async_trait::async_trait;

#[derive(Default)]
struct EngineState {
    assets: HashMap<AssetId, ProcessingAsset>,
    policies: HashMap<PolicyId, AccessPolicy>,
    locators: HashMap<LocatorId, Locator>,
    endpoints: Vec<NotificationEndpoint>,
    jobs: HashMap<JobId, EncodingJob>,
    processors: Vec<MediaProcessor>,
}

/// In-memory implementation of [`TranscodingEngine`].
pub struct InMemoryEngine {
    state: Arc<RwLock<EngineState>>,
    queues: Arc<dyn QueueStore>,
    step_delay: StdDuration,
}

impl InMemoryEngine {
    /// Create an engine that delivers notifications through `queues`. Comes
    /// seeded with two versions of the default "Media Encoder Standard"
    /// processor.
    pub fn new(queues: Arc<dyn QueueStore>) -> Self {
        let engine = Self {
            state: Arc::new(RwLock::new(EngineState::default())),
            queues,
            step_delay: StdDuration::from_millis(25),
        };
        engine.register_processor("Media Encoder Standard", "1.0");
        engine.register_processor("Media Encoder Standard", "1.1");
        engine
    }

    /// Override the delay between simulated job state transitions.
    pub fn with_step_delay(mut self, delay: StdDuration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Install a processor version.
    pub fn register_processor(&self, name: &str, version: &str) {
        let mut state = self.state.write();
        state.processors.push(MediaProcessor {
            id: format!("processor-{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            version: version.to_string(),
        });
    }
}

fn version_key(version: &str) -> Vec<u32> {
    version.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}

fn sas_token() -> String {
    format!("?sv=2015-07-08&sig={}", Uuid::new_v4().simple())
}

#[async_trait]
impl TranscodingEngine for InMemoryEngine {
    async fn create_asset(&self, name: &str) -> Result<ProcessingAsset> {
        let asset = ProcessingAsset {
            id: AssetId::new(),
            name: name.to_string(),
            files: Vec::new(),
            streamable: false,
        };
        let mut state = self.state.write();
        state.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn add_asset_file(&self, asset: &AssetId, file_name: &str) -> Result<()> {
        let mut state = self.state.write();
        let asset = state
            .assets
            .get_mut(asset)
            .ok_or_else(|| Error::not_found(format!("asset {asset}")))?;
        asset.files.push(AssetFile {
            name: file_name.to_string(),
            content_length: 0,
        });
        Ok(())
    }

    async fn persist_asset(&self, asset: &ProcessingAsset) -> Result<()> {
        let mut state = self.state.write();
        if !state.assets.contains_key(&asset.id) {
            return Err(Error::not_found(format!("asset {}", asset.id)));
        }
        state.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<ProcessingAsset>> {
        let state = self.state.read();
        Ok(state.assets.get(id).cloned())
    }

    async fn latest_processor_by_name(&self, name: &str) -> Result<Option<MediaProcessor>> {
        let state = self.state.read();
        Ok(state
            .processors
            .iter()
            .filter(|p| p.name == name)
            .max_by_key(|p| version_key(&p.version))
            .cloned())
    }

    async fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permission: AccessPermission,
    ) -> Result<AccessPolicy> {
        let policy = AccessPolicy {
            id: PolicyId::new(),
            name: name.to_string(),
            duration,
            permission,
        };
        let mut state = self.state.write();
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn delete_access_policy(&self, id: &PolicyId) -> Result<()> {
        let mut state = self.state.write();
        state.policies.remove(id);
        Ok(())
    }

    async fn create_locator(
        &self,
        kind: LocatorKind,
        asset: &AssetId,
        policy: &PolicyId,
        start: DateTime<Utc>,
        name: &str,
    ) -> Result<Locator> {
        let mut state = self.state.write();
        if let Some(existing) = state.locators.values().find(|l| l.name == name) {
            return Ok(existing.clone());
        }
        if !state.assets.contains_key(asset) {
            return Err(Error::not_found(format!("asset {asset}")));
        }
        if !state.policies.contains_key(policy) {
            return Err(Error::not_found(format!("access policy {policy}")));
        }

        let id = LocatorId::new();
        let locator = match kind {
            LocatorKind::Sas => {
                let container = format!("asset-{asset}");
                let token = sas_token();
                Locator {
                    id,
                    name: name.to_string(),
                    kind,
                    asset_id: *asset,
                    path: format!("https://storage.mediaflow.local/{container}{token}"),
                    base_uri: format!("https://storage.mediaflow.local/{container}"),
                    content_access_component: token,
                    start,
                }
            }
            LocatorKind::OnDemandOrigin => {
                let base = format!(
                    "https://origin.mediaflow.local/{}",
                    Uuid::from(id).simple()
                );
                Locator {
                    id,
                    name: name.to_string(),
                    kind,
                    asset_id: *asset,
                    path: base.clone(),
                    base_uri: base,
                    content_access_component: String::new(),
                    start,
                }
            }
        };
        state.locators.insert(id, locator.clone());
        Ok(locator)
    }

    async fn find_locator(&self, name: &str) -> Result<Option<Locator>> {
        let state = self.state.read();
        Ok(state.locators.values().find(|l| l.name == name).cloned())
    }

    async fn delete_locator(&self, id: &LocatorId) -> Result<()> {
        let mut state = self.state.write();
        state.locators.remove(id);
        Ok(())
    }

    async fn ensure_notification_endpoint(
        &self,
        name: &str,
        queue_name: &str,
    ) -> Result<NotificationEndpoint> {
        let mut state = self.state.write();
        if let Some(existing) = state.endpoints.iter().find(|e| e.name == name) {
            return Ok(existing.clone());
        }
        let endpoint = NotificationEndpoint {
            id: EndpointId::new(),
            name: name.to_string(),
            queue_name: queue_name.to_string(),
        };
        state.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    async fn submit_job(&self, spec: JobSpec) -> Result<EncodingJob> {
        if spec.tasks.is_empty() {
            return Err(Error::validation("a job needs at least one task"));
        }

        let job = {
            let mut state = self.state.write();
            if !state.assets.contains_key(&spec.input_asset) {
                return Err(Error::not_found(format!("asset {}", spec.input_asset)));
            }
            let queue_name = state
                .endpoints
                .iter()
                .find(|e| e.id == spec.subscription.endpoint)
                .map(|e| e.queue_name.clone())
                .ok_or_else(|| {
                    Error::engine(format!(
                        "unknown notification endpoint {}",
                        spec.subscription.endpoint
                    ))
                })?;

            // Output asset shells are created at submission time; the
            // simulation fills them in when the job finishes.
            let mut tasks = Vec::with_capacity(spec.tasks.len());
            let mut output_asset_ids = Vec::with_capacity(spec.tasks.len());
            for task in &spec.tasks {
                let output = ProcessingAsset {
                    id: AssetId::new(),
                    name: task.output_asset_name.clone(),
                    files: Vec::new(),
                    streamable: false,
                };
                output_asset_ids.push(output.id);
                state.assets.insert(output.id, output.clone());
                tasks.push(EncodingTask {
                    name: task.name.clone(),
                    profile: task.profile.clone(),
                    input_asset_ids: vec![spec.input_asset],
                    output_asset_id: output.id,
                });
            }

            let job = EncodingJob {
                id: JobId::new(),
                name: spec.name.clone(),
                state: JobState::Queued,
                tasks,
                input_asset_ids: vec![spec.input_asset],
                output_asset_ids,
                subscription: spec.subscription,
            };
            state.jobs.insert(job.id, job.clone());

            let simulation = JobSimulation {
                state: self.state.clone(),
                queues: self.queues.clone(),
                job_id: job.id,
                queue_name,
                target: spec.subscription.target,
                step_delay: self.step_delay,
            };
            tokio::spawn(simulation.run());

            job
        };

        debug!(job_id = %job.id, name = %job.name, "job accepted");
        Ok(job)
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<EncodingJob>> {
        let state = self.state.read();
        Ok(state.jobs.get(id).cloned())
    }
}

/// Walks a submitted job through its lifecycle and delivers notifications.
struct JobSimulation {
    state: Arc<RwLock<EngineState>>,
    queues: Arc<dyn QueueStore>,
    job_id: JobId,
    queue_name: String,
    target: NotificationTarget,
    step_delay: StdDuration,
}

impl JobSimulation {
    async fn run(self) {
        const TRANSITIONS: [(JobState, JobState); 3] = [
            (JobState::Queued, JobState::Scheduled),
            (JobState::Scheduled, JobState::Processing),
            (JobState::Processing, JobState::Finished),
        ];

        for (old, new) in TRANSITIONS {
            tokio::time::sleep(self.step_delay).await;

            if new == JobState::Finished {
                self.materialize_outputs();
            }

            {
                let mut state = self.state.write();
                match state.jobs.get_mut(&self.job_id) {
                    Some(job) => job.state = new,
                    None => return,
                }
            }

            let deliver = matches!(self.target, NotificationTarget::All) || new.is_terminal();
            if !deliver {
                continue;
            }

            match state_change_message(&self.job_id, old, new) {
                Ok(body) => {
                    if let Err(e) = self.queues.enqueue(&self.queue_name, &body).await {
                        warn!(
                            job_id = %self.job_id,
                            queue = %self.queue_name,
                            error = %e,
                            "failed to deliver job notification"
                        );
                    }
                }
                Err(e) => {
                    warn!(job_id = %self.job_id, error = %e, "failed to encode job notification");
                }
            }
        }
    }

    /// Fill in the output asset shells: adaptive-bitrate tasks yield a
    /// streamable asset with an .ism manifest plus bitrate renditions,
    /// thumbnail tasks a plain asset with poster images.
    fn materialize_outputs(&self) {
        let mut state = self.state.write();
        let Some(job) = state.jobs.get(&self.job_id).cloned() else {
            return;
        };
        let input_name = job
            .input_asset_ids
            .first()
            .and_then(|id| state.assets.get(id))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "output".to_string());
        let stem = input_name
            .rsplit_once('.')
            .map(|(s, _)| s.to_string())
            .unwrap_or(input_name);

        for task in &job.tasks {
            let Some(asset) = state.assets.get_mut(&task.output_asset_id) else {
                continue;
            };
            if task.profile.to_ascii_lowercase().contains("thumbnail") {
                asset.streamable = false;
                asset.files = vec![
                    AssetFile {
                        name: format!("{stem}_000001.jpg"),
                        content_length: 24_576,
                    },
                    AssetFile {
                        name: format!("{stem}_000002.jpg"),
                        content_length: 24_576,
                    },
                ];
            } else {
                asset.streamable = true;
                asset.files = vec![
                    AssetFile {
                        name: format!("{stem}.ism"),
                        content_length: 2_048,
                    },
                    AssetFile {
                        name: format!("{stem}_0650kbps.mp4"),
                        content_length: 4_194_304,
                    },
                    AssetFile {
                        name: format!("{stem}_1400kbps.mp4"),
                        content_length: 8_388_608,
                    },
                ];
            }
        }
    }
}

fn state_change_message(job_id: &JobId, old: JobState, new: JobState) -> Result<String> {
    let mut properties = HashMap::new();
    properties.insert("JobId".to_string(), serde_json::json!(job_id.to_string()));
    properties.insert("OldState".to_string(), serde_json::json!(old.to_string()));
    properties.insert("NewState".to_string(), serde_json::json!(new.to_string()));

    let notification = JobStateNotification {
        message_version: "1.0".to_string(),
        event_type: "JobStateChange".to_string(),
        e_tag: Uuid::new_v4().simple().to_string(),
        time_stamp: Utc::now().to_rfc3339(),
        properties,
    };

    serde_json::to_string(&notification)
        .map_err(|e| Error::engine(format!("failed to encode notification: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NotificationSubscription, TaskSpec};
    use crate::storage::InMemoryStorage;

    fn setup() -> (Arc<InMemoryStorage>, InMemoryEngine) {
        let storage = Arc::new(InMemoryStorage::new());
        let engine = InMemoryEngine::new(storage.clone() as Arc<dyn QueueStore>)
            .with_step_delay(StdDuration::from_millis(2));
        (storage, engine)
    }

    async fn submit_test_job(
        engine: &InMemoryEngine,
        target: NotificationTarget,
    ) -> EncodingJob {
        let asset = engine.create_asset("video.mp4").await.unwrap();
        let endpoint = engine
            .ensure_notification_endpoint("progress", "job-progress")
            .await
            .unwrap();
        engine
            .submit_job(JobSpec {
                name: "test job".into(),
                processor_id: "processor-0".into(),
                input_asset: asset.id,
                tasks: vec![TaskSpec {
                    name: "Multibitrate".into(),
                    profile: "H264 Adaptive Bitrate MP4 Set 720p".into(),
                    output_asset_name: "Multibitrate output".into(),
                }],
                subscription: NotificationSubscription {
                    endpoint: endpoint.id,
                    target,
                },
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn latest_processor_picks_highest_version() {
        let (_, engine) = setup();
        engine.register_processor("Media Encoder Standard", "2.0");
        let processor = engine
            .latest_processor_by_name("Media Encoder Standard")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(processor.version, "2.0");

        assert!(engine
            .latest_processor_by_name("No Such Encoder")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn simulation_delivers_all_transitions() {
        let (storage, engine) = setup();
        storage.ensure_queue("job-progress").await.unwrap();
        let job = submit_test_job(&engine, NotificationTarget::All).await;

        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert_eq!(storage.queue_len("job-progress"), 3);
        let finished = engine.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(finished.state, JobState::Finished);

        // The output asset was materialized as streamable with a manifest
        let output = engine
            .get_asset(&finished.output_asset_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert!(output.streamable);
        assert!(output.files.iter().any(|f| f.name.ends_with(".ism")));
    }

    #[tokio::test]
    async fn final_states_only_delivers_one_message() {
        let (storage, engine) = setup();
        storage.ensure_queue("job-progress").await.unwrap();
        submit_test_job(&engine, NotificationTarget::FinalStatesOnly).await;

        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert_eq!(storage.queue_len("job-progress"), 1);
        let msg = storage.dequeue("job-progress").await.unwrap().unwrap();
        let parsed: JobStateNotification = serde_json::from_str(&msg.body).unwrap();
        assert_eq!(parsed.properties["NewState"], "Finished");
    }

    #[tokio::test]
    async fn locator_creation_is_idempotent_on_name() {
        let (_, engine) = setup();
        let asset = engine.create_asset("video.mp4").await.unwrap();
        let policy = engine
            .create_access_policy("read", Duration::days(1), AccessPermission::Read)
            .await
            .unwrap();

        let first = engine
            .create_locator(
                LocatorKind::Sas,
                &asset.id,
                &policy.id,
                Utc::now(),
                "sas-locator-test",
            )
            .await
            .unwrap();
        let second = engine
            .create_locator(
                LocatorKind::Sas,
                &asset.id,
                &policy.id,
                Utc::now(),
                "sas-locator-test",
            )
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            first.content_access_component,
            second.content_access_component
        );
    }

    #[tokio::test]
    async fn submit_rejects_empty_task_list() {
        let (_, engine) = setup();
        let asset = engine.create_asset("video.mp4").await.unwrap();
        let endpoint = engine
            .ensure_notification_endpoint("progress", "job-progress")
            .await
            .unwrap();
        let err = engine
            .submit_job(JobSpec {
                name: "empty".into(),
                processor_id: "processor-0".into(),
                input_asset: asset.id,
                tasks: vec![],
                subscription: NotificationSubscription {
                    endpoint: endpoint.id,
                    target: NotificationTarget::All,
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
