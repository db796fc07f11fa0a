//! The single task that owns the gateway.
//!
//! Every event and timer tick is applied here in arrival order, so the
//! gateway needs no locking. After anything that changes what the API
//! reports, the status snapshot and client table are republished.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};

use roverlink_core::config::GatewayConfig;
use roverlink_services::{
    ClientTable, Gateway, GatewayEvent, GatewayStatus, ProcessLauncher, RobotBus,
};

pub struct Dispatcher<B, L> {
    gateway: Gateway<B, L>,
    events: mpsc::UnboundedReceiver<GatewayEvent>,
    status: watch::Sender<GatewayStatus>,
    clients: ClientTable,
    transform_interval: Duration,
    param_pump_interval: Duration,
    stats_interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

fn ticker(period: Duration) -> Interval {
    let mut t = interval(period.max(Duration::from_millis(1)));
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

impl<B: RobotBus, L: ProcessLauncher> Dispatcher<B, L> {
    pub fn new(
        gateway: Gateway<B, L>,
        events: mpsc::UnboundedReceiver<GatewayEvent>,
        status: watch::Sender<GatewayStatus>,
        clients: ClientTable,
        config: &GatewayConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            gateway,
            events,
            status,
            clients,
            transform_interval: config.transform_interval(),
            param_pump_interval: config.param_pump_interval(),
            stats_interval: config.stats_interval(),
            shutdown,
        }
    }

    /// Runs until shutdown or until every event sender is gone. Hands the
    /// gateway back for inspection.
    pub async fn run(mut self) -> Result<Gateway<B, L>> {
        let mut transforms = ticker(self.transform_interval);
        let mut param_pump = ticker(self.param_pump_interval);
        let mut stats = ticker(self.stats_interval);
        self.publish();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    break;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("event channel closed");
                        break;
                    };
                    tracing::trace!(event = event.name(), "event");
                    let membership = event.changes_membership();
                    self.gateway.handle(event);
                    if membership {
                        self.publish();
                    }
                }

                _ = transforms.tick() => self.gateway.on_transform_tick(),

                _ = param_pump.tick() => self.gateway.on_param_pump(),

                _ = stats.tick() => {
                    self.gateway.on_stats_tick();
                    self.publish();
                }
            }
        }

        Ok(self.gateway)
    }

    fn publish(&self) {
        self.gateway.publish_clients(&self.clients);
        self.status.send_replace(self.gateway.status());
    }
}
