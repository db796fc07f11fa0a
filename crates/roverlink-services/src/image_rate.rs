//! Image subscription rate controller.
//!
//! Throttle period = per_subscriber × subscribers + per_connection ×
//! connections − offset, floored at zero. Any membership change tears the
//! subscription down and, if anyone still wants images, rebuilds it with
//! the new period.

use std::time::{Duration, Instant};

use roverlink_core::config::ImageConfig;

use crate::registry::ClientId;

/// What the bus must do after a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionChange {
    pub unsubscribe: bool,
    pub subscribe: Option<Duration>,
}

#[derive(Debug)]
pub struct ImageRateController {
    per_subscriber: Duration,
    per_connection: Duration,
    offset: Duration,
    subscribers: Vec<ClientId>,
    active: Option<Duration>,
    last_delivery: Option<Instant>,
}

impl ImageRateController {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            per_subscriber: Duration::from_millis(config.per_subscriber_delay_ms),
            per_connection: Duration::from_millis(config.per_connection_delay_ms),
            offset: Duration::from_millis(config.fixed_offset_ms),
            subscribers: Vec::new(),
            active: None,
            last_delivery: None,
        }
    }

    pub fn throttle(&self, connections: usize) -> Duration {
        let grow = self.per_subscriber * self.subscribers.len() as u32
            + self.per_connection * connections as u32;
        grow.saturating_sub(self.offset)
    }

    /// Returns true if `id` was not already subscribed.
    pub fn enable(&mut self, id: ClientId) -> bool {
        if self.subscribers.contains(&id) {
            return false;
        }
        self.subscribers.push(id);
        true
    }

    /// Returns true if `id` was subscribed.
    pub fn disable(&mut self, id: ClientId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|&s| s != id);
        self.subscribers.len() != before
    }

    pub fn is_subscribed(&self, id: ClientId) -> bool {
        self.subscribers.contains(&id)
    }

    pub fn subscribers(&self) -> &[ClientId] {
        &self.subscribers
    }

    /// The period currently subscribed with, if any.
    pub fn active(&self) -> Option<Duration> {
        self.active
    }

    /// Recompute after a membership or connection-count change.
    pub fn recompute(&mut self, connections: usize) -> SubscriptionChange {
        let unsubscribe = self.active.take().is_some();
        let subscribe = if self.subscribers.is_empty() {
            None
        } else {
            Some(self.throttle(connections))
        };
        self.active = subscribe;
        SubscriptionChange {
            unsubscribe,
            subscribe,
        }
    }

    /// Gate one image arriving at `now` against the active period.
    pub fn admit(&mut self, now: Instant) -> bool {
        let Some(period) = self.active else {
            return false;
        };
        match self.last_delivery {
            Some(last) if now.saturating_duration_since(last) < period => false,
            _ => {
                self.last_delivery = Some(now);
                true
            }
        }
    }
}
