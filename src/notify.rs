//! Job-state notification decoding and the state machine driven by it.
//!
//! The engine reports every state transition of a subscribed job as a JSON
//! message on the progress queue. The wire shape is a string-keyed property
//! bag; [`JobStateNotification::classify`] turns it into a typed
//! [`JobEvent`] exactly once, and [`NotificationHandler`] decides what each
//! event means for the workflow.
//!
//! Policy for incomplete messages: a state-change event is acted on only
//! when both `OldState` and `NewState` are present, and a `Finished` event
//! additionally requires `JobId`. Anything missing is logged and discarded
//! as a success so the queue does not spin on a message that can never be
//! completed. Only payloads that fail to decode at all fail the message,
//! leaving them to the retry/poison policy of the queue runtime.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use mediaflow_common::{Error, JobId, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::publish::{AdaptiveStreamingInfo, Publisher};

/// Wire shape of one engine notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobStateNotification {
    pub message_version: String,
    pub event_type: String,
    #[serde(default)]
    pub e_tag: String,
    pub time_stamp: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// A notification classified into the event kinds this workflow understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A job moved from one state to another.
    StateChanged {
        old_state: String,
        new_state: String,
        /// Present when the engine included the job identity. Required for
        /// acting on `Finished`.
        job_id: Option<String>,
    },
    /// Tagged as a state change but missing a required property.
    IncompleteStateChange { missing: &'static str },
    /// Any event type this workflow does not act on.
    Unrecognized { event_type: String },
}

impl JobStateNotification {
    const STATE_CHANGE_EVENT: &'static str = "JobStateChange";

    /// Classify the property bag into a typed event.
    pub fn classify(&self) -> JobEvent {
        if self.event_type != Self::STATE_CHANGE_EVENT {
            return JobEvent::Unrecognized {
                event_type: self.event_type.clone(),
            };
        }

        let Some(old_state) = self.property("OldState") else {
            return JobEvent::IncompleteStateChange { missing: "OldState" };
        };
        let Some(new_state) = self.property("NewState") else {
            return JobEvent::IncompleteStateChange { missing: "NewState" };
        };

        JobEvent::StateChanged {
            old_state,
            new_state,
            job_id: self.property("JobId"),
        }
    }

    fn property(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }
}

/// What handling a notification amounted to.
#[derive(Debug)]
pub enum Outcome {
    /// The job finished and its outputs were published.
    Published {
        job_id: JobId,
        info: AdaptiveStreamingInfo,
    },
    /// The message required no action.
    Ignored,
}

/// Consumes job-state-change messages and triggers publication on terminal
/// "Finished" states.
pub struct NotificationHandler {
    publisher: Arc<Publisher>,
}

impl NotificationHandler {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }

    /// Decode and act on one raw queue message body.
    ///
    /// Errors returned here fail the message, handing it to the queue
    /// runtime's retry/poison policy.
    pub async fn handle_message(&self, body: &str) -> Result<Outcome> {
        let notification: JobStateNotification = serde_json::from_str(body)
            .map_err(|e| Error::validation(format!("undecodable notification payload: {e}")))?;

        match notification.classify() {
            JobEvent::Unrecognized { event_type } => {
                debug!(event_type = %event_type, "ignoring unrecognized notification event");
                Ok(Outcome::Ignored)
            }
            JobEvent::IncompleteStateChange { missing } => {
                warn!(missing = missing, "discarding incomplete state-change notification");
                Ok(Outcome::Ignored)
            }
            JobEvent::StateChanged {
                old_state,
                new_state,
                job_id,
            } => {
                info!(
                    old_state = %old_state,
                    new_state = %new_state,
                    "job state has changed"
                );
                self.handle_state_change(&new_state, job_id).await
            }
        }
    }

    async fn handle_state_change(
        &self,
        new_state: &str,
        job_id: Option<String>,
    ) -> Result<Outcome> {
        match new_state {
            "Finished" => {
                let Some(job_id) = job_id else {
                    warn!("discarding Finished notification without JobId");
                    return Ok(Outcome::Ignored);
                };
                let job_id = JobId::from_str(&job_id).map_err(|e| {
                    Error::validation(format!("malformed JobId in notification: {e}"))
                })?;

                let info = self.publisher.prepare_adaptive_streaming(&job_id).await?;
                info!(
                    job_id = %job_id,
                    smooth_streaming_url = ?info.smooth_streaming_url,
                    posters = info.posters.len(),
                    "assets published for adaptive streaming"
                );
                Ok(Outcome::Published { job_id, info })
            }
            "Error" | "Canceled" => {
                // Terminal but nothing to publish; the poison queue is not
                // involved since the message itself was well-formed.
                warn!(new_state = %new_state, "job reached terminal state without publication");
                Ok(Outcome::Ignored)
            }
            _ => Ok(Outcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(event_type: &str, properties: &[(&str, &str)]) -> String {
        let properties: HashMap<String, serde_json::Value> = properties
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect();
        serde_json::to_string(&JobStateNotification {
            message_version: "1.0".to_string(),
            event_type: event_type.to_string(),
            e_tag: "etag-1".to_string(),
            time_stamp: "2015-09-21T12:00:00Z".to_string(),
            properties,
        })
        .unwrap()
    }

    #[test]
    fn decodes_pascal_case_wire_format() {
        let raw = r#"{
            "MessageVersion": "1.0",
            "EventType": "JobStateChange",
            "ETag": "abc",
            "TimeStamp": "2015-09-21T12:00:00Z",
            "Properties": { "OldState": "Processing", "NewState": "Finished" }
        }"#;
        let parsed: JobStateNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.event_type, "JobStateChange");
        assert_eq!(parsed.e_tag, "abc");
        assert_eq!(parsed.properties["NewState"], "Finished");
    }

    #[test]
    fn classifies_state_change() {
        let raw = notification(
            "JobStateChange",
            &[
                ("OldState", "Processing"),
                ("NewState", "Finished"),
                ("JobId", "d94bf3e0-6f41-4a4b-8f5e-0123456789ab"),
            ],
        );
        let parsed: JobStateNotification = serde_json::from_str(&raw).unwrap();
        match parsed.classify() {
            JobEvent::StateChanged {
                old_state,
                new_state,
                job_id,
            } => {
                assert_eq!(old_state, "Processing");
                assert_eq!(new_state, "Finished");
                assert!(job_id.is_some());
            }
            other => panic!("expected StateChanged, got {other:?}"),
        }
    }

    #[test]
    fn classifies_missing_states_as_incomplete() {
        let raw = notification("JobStateChange", &[("NewState", "Finished")]);
        let parsed: JobStateNotification = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed.classify(),
            JobEvent::IncompleteStateChange { missing: "OldState" }
        );
    }

    #[test]
    fn classifies_other_event_types_as_unrecognized() {
        let raw = notification("TaskProgress", &[("Progress", "42")]);
        let parsed: JobStateNotification = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed.classify(),
            JobEvent::Unrecognized {
                event_type: "TaskProgress".to_string()
            }
        );
    }

    #[test]
    fn non_string_property_counts_as_missing() {
        let raw = r#"{
            "MessageVersion": "1.0",
            "EventType": "JobStateChange",
            "TimeStamp": "2015-09-21T12:00:00Z",
            "Properties": { "OldState": 3, "NewState": "Finished" }
        }"#;
        let parsed: JobStateNotification = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed.classify(),
            JobEvent::IncompleteStateChange { missing: "OldState" }
        );
    }
}
