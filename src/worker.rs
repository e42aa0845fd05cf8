//! Queue-driven worker runtime.
//!
//! One [`QueuePump`] per queue drains messages into a [`MessageHandler`],
//! bounding the number of in-flight messages per worker instance. Delivery
//! is at-least-once: a failed message is requeued until its dequeue count
//! reaches the configured ceiling and is then parked in `<queue>-poison`
//! for manual inspection. There are no ordering guarantees across messages
//! and no shared mutable state between them; correctness under redelivery
//! rests on the idempotence of the external operations, not on locks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaflow_common::Result;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, QueueRuntimeConfig};
use crate::engine::TranscodingEngine;
use crate::events::WorkflowEvent;
use crate::ingest::IngestionHandler;
use crate::jobs::JobSubmissionManager;
use crate::notify::{NotificationHandler, Outcome};
use crate::publish::Publisher;
use crate::storage::{ObjectStore, QueueMessage, QueueStore};

/// Capacity of the workflow event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pause before re-checking the semaphore when all permits are taken.
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(50);

/// Handles one queue message. Implementations must be safe to invoke again
/// for a redelivered message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &QueueMessage) -> Result<()>;
}

/// Drains one queue into a handler under the queue runtime policy.
pub struct QueuePump {
    queues: Arc<dyn QueueStore>,
    queue: String,
    handler: Arc<dyn MessageHandler>,
    settings: QueueRuntimeConfig,
    shutdown_rx: mpsc::Receiver<()>,
}

impl QueuePump {
    pub fn new(
        queues: Arc<dyn QueueStore>,
        queue: String,
        handler: Arc<dyn MessageHandler>,
        settings: QueueRuntimeConfig,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            queues,
            queue,
            handler,
            settings,
            shutdown_rx,
        }
    }

    /// Run until a shutdown signal arrives, then drain in-flight work.
    pub async fn run(mut self) {
        if let Err(e) = self.queues.ensure_queue(&self.queue).await {
            error!(queue = %self.queue, error = %e, "failed to create queue; pump not started");
            return;
        }

        info!(
            queue = %self.queue,
            max_in_flight = self.settings.max_in_flight,
            max_dequeue_count = self.settings.max_dequeue_count,
            "queue pump started"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_in_flight));
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                break;
            }

            in_flight.retain(|handle| !handle.is_finished());

            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    if self.wait_or_shutdown(BACKPRESSURE_WAIT).await {
                        break;
                    }
                    continue;
                }
            };

            let message = match self.queues.dequeue(&self.queue).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    drop(permit);
                    if self.wait_or_shutdown(self.settings.poll_interval()).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    warn!(queue = %self.queue, error = %e, "dequeue failed");
                    if self.wait_or_shutdown(self.settings.poll_interval()).await {
                        break;
                    }
                    continue;
                }
            };

            let queues = self.queues.clone();
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let settings = self.settings.clone();
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                dispatch(queues, &queue, &settings, handler, message).await;
            }));
        }

        futures::future::join_all(in_flight).await;
        info!(queue = %self.queue, "queue pump stopped");
    }

    /// Sleep for `duration`, returning true if shutdown was requested first.
    async fn wait_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

/// Apply the retry/poison policy to one message.
async fn dispatch(
    queues: Arc<dyn QueueStore>,
    queue: &str,
    settings: &QueueRuntimeConfig,
    handler: Arc<dyn MessageHandler>,
    message: QueueMessage,
) {
    debug!(
        queue = %queue,
        message_id = %message.id,
        attempt = message.dequeue_count,
        "processing message"
    );

    let result = handler.handle(&message).await;

    match result {
        Ok(()) => {}
        Err(e) if e.is_retriable() && message.dequeue_count < settings.max_dequeue_count => {
            warn!(
                queue = %queue,
                message_id = %message.id,
                attempt = message.dequeue_count,
                error = %e,
                "message failed; requeueing"
            );
            if let Err(re) = queues.requeue(queue, message).await {
                error!(queue = %queue, error = %re, "failed to requeue message");
            }
        }
        Err(e) => {
            error!(
                queue = %queue,
                message_id = %message.id,
                attempt = message.dequeue_count,
                error = %e,
                "message failed permanently; parking in poison queue"
            );
            let poison = poison_queue_name(queue);
            if let Err(pe) = queues.ensure_queue(&poison).await {
                error!(queue = %poison, error = %pe, "failed to create poison queue");
                return;
            }
            if let Err(pe) = queues.requeue(&poison, message).await {
                error!(queue = %poison, error = %pe, "failed to park message in poison queue");
            }
        }
    }
}

pub fn poison_queue_name(queue: &str) -> String {
    format!("{queue}-poison")
}

/// Handles new-object pointer messages: ingest the object, submit the
/// encoding job.
pub struct UploadHandler {
    ingest: IngestionHandler,
    jobs: JobSubmissionManager,
    progress_queue: String,
    events: broadcast::Sender<WorkflowEvent>,
}

impl UploadHandler {
    pub fn new(
        ingest: IngestionHandler,
        jobs: JobSubmissionManager,
        progress_queue: String,
        events: broadcast::Sender<WorkflowEvent>,
    ) -> Self {
        Self {
            ingest,
            jobs,
            progress_queue,
            events,
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if self.events.send(event).is_err() {
            debug!("no subscribers for workflow event");
        }
    }
}

#[async_trait]
impl MessageHandler for UploadHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        let source_url = message.body.trim();
        info!(source_url = %source_url, "new object received");

        let asset = self.ingest.ingest_object(source_url).await?;
        let bytes = asset.files.iter().map(|f| f.content_length).sum();
        self.emit(WorkflowEvent::object_ingested(
            asset.id,
            source_url.to_string(),
            bytes,
        ));

        let job = self.jobs.submit(&asset, &self.progress_queue).await?;
        self.emit(WorkflowEvent::job_submitted(job.id, asset.id));

        info!(job_id = %job.id, "the job has been submitted");
        Ok(())
    }
}

/// Handles job-state-change messages through the notification state machine.
pub struct ProgressHandler {
    notifications: NotificationHandler,
    events: broadcast::Sender<WorkflowEvent>,
}

impl ProgressHandler {
    pub fn new(notifications: NotificationHandler, events: broadcast::Sender<WorkflowEvent>) -> Self {
        Self {
            notifications,
            events,
        }
    }
}

#[async_trait]
impl MessageHandler for ProgressHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        match self.notifications.handle_message(&message.body).await? {
            Outcome::Published { job_id, info } => {
                if self
                    .events
                    .send(WorkflowEvent::assets_published(job_id, info))
                    .is_err()
                {
                    debug!("no subscribers for workflow event");
                }
            }
            Outcome::Ignored => {}
        }
        Ok(())
    }
}

/// Runs the upload and progress pumps for one worker instance.
pub struct WorkerHost {
    shutdown_txs: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkerHost {
    /// Wire the workflow components and spawn both pumps.
    pub fn start(
        store: Arc<dyn ObjectStore>,
        queues: Arc<dyn QueueStore>,
        engine: Arc<dyn TranscodingEngine>,
        config: Arc<Config>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let upload_handler = Arc::new(UploadHandler::new(
            IngestionHandler::new(engine.clone(), store),
            JobSubmissionManager::new(engine.clone(), queues.clone(), config.clone()),
            config.storage.progress_queue.clone(),
            events.clone(),
        ));
        let progress_handler = Arc::new(ProgressHandler::new(
            NotificationHandler::new(Arc::new(Publisher::new(engine))),
            events.clone(),
        ));

        let mut shutdown_txs = Vec::new();
        let mut handles = Vec::new();

        for (queue, handler) in [
            (
                config.storage.upload_queue.clone(),
                upload_handler as Arc<dyn MessageHandler>,
            ),
            (
                config.storage.progress_queue.clone(),
                progress_handler as Arc<dyn MessageHandler>,
            ),
        ] {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let pump = QueuePump::new(
                queues.clone(),
                queue,
                handler,
                config.queues.clone(),
                shutdown_rx,
            );
            shutdown_txs.push(shutdown_tx);
            handles.push(tokio::spawn(pump.run()));
        }

        Self {
            shutdown_txs,
            handles,
            events,
        }
    }

    /// Subscribe to workflow progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Signal both pumps and wait for in-flight work to drain.
    pub async fn shutdown(self) {
        for tx in &self.shutdown_txs {
            let _ = tx.send(()).await;
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("worker host stopped");
    }
}
