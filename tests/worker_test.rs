mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaflow::config::QueueRuntimeConfig;
use mediaflow::storage::{QueueMessage, QueueStore};
use mediaflow::worker::{poison_queue_name, MessageHandler, QueuePump};
use mediaflow_common::{Error, Result};
use tokio::sync::mpsc;

use common::TestHarness;

struct CountingHandler {
    attempts: AtomicU32,
    error: Option<fn() -> Error>,
}

impl CountingHandler {
    fn failing(error: fn() -> Error) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            error: Some(error),
        })
    }

    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            error: None,
        })
    }

    fn count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, _message: &QueueMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

fn fast_settings(max_dequeue_count: u32) -> QueueRuntimeConfig {
    QueueRuntimeConfig {
        poll_interval_secs: 0,
        max_dequeue_count,
        max_in_flight: 2,
    }
}

async fn wait_for_poisoned(harness: &TestHarness, queue: &str) {
    let poison = poison_queue_name(queue);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.storage.queue_len(&poison) == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "message never reached the poison queue"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn retriable_failure_is_retried_up_to_the_ceiling_then_poisoned() {
    let harness = TestHarness::new();
    let queue = "work";
    harness.queues().ensure_queue(queue).await.unwrap();
    harness.queues().enqueue(queue, "payload").await.unwrap();

    let handler = CountingHandler::failing(|| Error::storage("transient outage"));
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let pump = QueuePump::new(
        harness.queues(),
        queue.to_string(),
        handler.clone(),
        fast_settings(3),
        shutdown_rx,
    );
    let pump_handle = tokio::spawn(pump.run());

    wait_for_poisoned(&harness, queue).await;

    // Exactly the ceiling, never a further attempt.
    assert_eq!(handler.count(), 3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.count(), 3);

    assert_eq!(harness.storage.queue_len(queue), 0);
    assert_eq!(harness.storage.queue_len(&poison_queue_name(queue)), 1);

    shutdown_tx.send(()).await.unwrap();
    pump_handle.await.unwrap();
}

#[tokio::test]
async fn non_retriable_failure_is_poisoned_on_first_attempt() {
    let harness = TestHarness::new();
    let queue = "work";
    harness.queues().ensure_queue(queue).await.unwrap();
    harness.queues().enqueue(queue, "payload").await.unwrap();

    let handler = CountingHandler::failing(|| Error::not_ready("job not finished"));
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let pump = QueuePump::new(
        harness.queues(),
        queue.to_string(),
        handler.clone(),
        fast_settings(5),
        shutdown_rx,
    );
    let pump_handle = tokio::spawn(pump.run());

    wait_for_poisoned(&harness, queue).await;
    assert_eq!(handler.count(), 1);

    shutdown_tx.send(()).await.unwrap();
    pump_handle.await.unwrap();
}

#[tokio::test]
async fn successful_message_is_handled_once_and_consumed() {
    let harness = TestHarness::new();
    let queue = "work";
    harness.queues().ensure_queue(queue).await.unwrap();
    harness.queues().enqueue(queue, "payload").await.unwrap();

    let handler = CountingHandler::succeeding();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let pump = QueuePump::new(
        harness.queues(),
        queue.to_string(),
        handler.clone(),
        fast_settings(5),
        shutdown_rx,
    );
    let pump_handle = tokio::spawn(pump.run());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handler.count() == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "message was never handled"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.count(), 1);
    assert_eq!(harness.storage.queue_len(queue), 0);
    assert_eq!(harness.storage.queue_len(&poison_queue_name(queue)), 0);

    shutdown_tx.send(()).await.unwrap();
    pump_handle.await.unwrap();
}
