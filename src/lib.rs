//! Mediaflow: queue-driven orchestration for asynchronous media transcoding.
//!
//! An object landing in the upload container is ingested into the transcoding
//! engine's staging area, submitted as an encoding job, and published as
//! streamable URLs once the engine reports completion through a notification
//! queue. Storage, queues, and the engine itself are modeled as capability
//! traits; in-memory implementations back local runs and tests.

pub mod config;
pub mod engine;
pub mod events;
pub mod ingest;
pub mod jobs;
pub mod locators;
pub mod notify;
pub mod publish;
pub mod storage;
pub mod upload;
pub mod worker;
