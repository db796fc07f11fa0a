//! Recording bus adapter.
//!
//! Stands in for a live robot bus connection: published commands are
//! logged and kept in the outbox for the API, and subscription changes are
//! tracked so their effect can be inspected. Telemetry enters through the
//! API's ingest endpoint rather than a subscription.

use std::time::Duration;

use roverlink_core::config::TopicsConfig;
use roverlink_core::telemetry::PathStream;
use roverlink_services::{BusCommand, BusOutbox, RobotBus};

pub struct RecordingBus {
    topics: TopicsConfig,
    outbox: BusOutbox,
    image_throttle: Option<Duration>,
}

impl RecordingBus {
    pub fn new(topics: TopicsConfig, outbox: BusOutbox) -> Self {
        Self {
            topics,
            outbox,
            image_throttle: None,
        }
    }

    pub fn image_throttle(&self) -> Option<Duration> {
        self.image_throttle
    }

    pub fn path_topic(&self, stream: PathStream) -> &str {
        match stream {
            PathStream::Local => &self.topics.local_path,
            PathStream::Global => &self.topics.global_path,
        }
    }
}

impl RobotBus for RecordingBus {
    fn publish(&mut self, cmd: BusCommand) {
        tracing::debug!(?cmd, "bus publish");
        self.outbox.push(cmd);
    }

    fn subscribe_images(&mut self, throttle: Duration) {
        tracing::info!(
            topic = %self.topics.image,
            throttle_ms = throttle.as_millis() as u64,
            "image subscription started"
        );
        self.image_throttle = Some(throttle);
    }

    fn unsubscribe_images(&mut self) {
        tracing::info!(topic = %self.topics.image, "image subscription stopped");
        self.image_throttle = None;
    }

    fn retarget_path(&mut self, stream: PathStream, topic: &str) {
        let slot = match stream {
            PathStream::Local => &mut self.topics.local_path,
            PathStream::Global => &mut self.topics.global_path,
        };
        tracing::info!(?stream, from = %slot, to = %topic, "path stream retargeted");
        *slot = topic.to_string();
    }
}
