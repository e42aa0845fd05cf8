//! Shared test harness: in-memory backends wired the way the worker host
//! wires them, with timings tightened for tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mediaflow::config::Config;
use mediaflow::engine::{InMemoryEngine, TranscodingEngine};
use mediaflow::storage::{InMemoryStorage, ObjectStore, QueueStore};

pub struct TestHarness {
    pub storage: Arc<InMemoryStorage>,
    pub engine: Arc<InMemoryEngine>,
    pub config: Arc<Config>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        // Poll eagerly so tests do not sit out the production cadence.
        config.queues.poll_interval_secs = 0;

        let storage = Arc::new(InMemoryStorage::new());
        let engine = Arc::new(
            InMemoryEngine::new(storage.clone() as Arc<dyn QueueStore>)
                .with_step_delay(Duration::from_millis(5)),
        );

        Self {
            storage,
            engine,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.storage.clone()
    }

    pub fn queues(&self) -> Arc<dyn QueueStore> {
        self.storage.clone()
    }

    pub fn engine(&self) -> Arc<dyn TranscodingEngine> {
        self.engine.clone()
    }
}
