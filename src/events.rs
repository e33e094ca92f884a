use async_trait::async_trait;
use kube::{
  runtime::events::{Event, EventType, Recorder, Reporter},
  Client, Resource,
};
use log::warn;

use crate::S3Bucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Normal,
  Warning,
}

/// Publishes Kubernetes events about an `S3Bucket`. Best effort: failures are logged, never returned.
#[async_trait]
pub trait EventRecorder: Send + Sync {
  async fn publish(&self, on: &S3Bucket, kind: EventKind, reason: &str, note: String);
}

pub struct KubeRecorder {
  client: Client,
  reporter: Reporter,
}

impl KubeRecorder {
  pub fn new(client: Client, controller: impl Into<String>) -> Self {
    Self {
      client,
      reporter: Reporter {
        controller: controller.into(),
        instance: std::env::var("HOSTNAME").ok(),
      },
    }
  }
}

#[async_trait]
impl EventRecorder for KubeRecorder {
  async fn publish(&self, on: &S3Bucket, kind: EventKind, reason: &str, note: String) {
    let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), on.object_ref(&()));
    let event = Event {
      type_: match kind {
        EventKind::Normal => EventType::Normal,
        EventKind::Warning => EventType::Warning,
      },
      reason: reason.to_string(),
      note: Some(note),
      action: "Reconcile".to_string(),
      secondary: None,
    };
    if let Err(e) = recorder.publish(event).await {
      warn!("Failed to publish {} event: {}", reason, e);
    }
  }
}
