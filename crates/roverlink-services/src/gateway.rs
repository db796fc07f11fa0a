//! Gateway: the single owner of all mutable gateway state.
//!
//! Everything that happens arrives as a `GatewayEvent` or a timer tick and
//! is handled to completion before the next one. Sockets, processes and the
//! bus are reached only through the collaborator traits, so every call here
//! returns without waiting on I/O.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use roverlink_core::config::{GatewayConfig, ParamsConfig, RoverlinkConfig};
use roverlink_core::params::{parse_dynparam_dump, ParamRequest};
use roverlink_core::telemetry::{
    CompressedImage, GridSnapshot, GridStream, GridUpdate, PathFrame, PathStream, TelemetryMessage,
};
use roverlink_core::wire::{self, Command, PacketKind};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::collaborator::{
    BusCommand, JobId, JobKind, ProcessJob, ProcessLauncher, ProcessOutcome, RobotBus,
};
use crate::goal::GoalTracker;
use crate::grid_store::GridStreamStore;
use crate::image_rate::ImageRateController;
use crate::param_queue::ParamQueue;
use crate::registry::{ClientId, ClientInfo, ClientTable, Registry};
use crate::sink::{ClientSink, Outbound};
use crate::stats::{StatsAggregator, StatsSample};
use crate::transforms::TransformTable;

// ── Events ────────────────────────────────────────────────────────────────────

pub enum GatewayEvent {
    Telemetry(TelemetryMessage),
    ClientConnected {
        id: ClientId,
        peer: String,
        sink: Box<dyn ClientSink>,
    },
    ClientDisconnected {
        id: ClientId,
    },
    /// One inbound command packet.
    Inbound {
        id: ClientId,
        bytes: Bytes,
    },
    /// A stream client's writer finished one write.
    WriteComplete {
        id: ClientId,
        bytes: usize,
    },
    ProcessOutput {
        job: JobId,
        text: String,
    },
    ProcessExited {
        job: JobId,
        outcome: ProcessOutcome,
        stdout: String,
    },
    RetargetPath {
        stream: PathStream,
        topic: String,
    },
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Telemetry(_) => "telemetry",
            GatewayEvent::ClientConnected { .. } => "client_connected",
            GatewayEvent::ClientDisconnected { .. } => "client_disconnected",
            GatewayEvent::Inbound { .. } => "inbound",
            GatewayEvent::WriteComplete { .. } => "write_complete",
            GatewayEvent::ProcessOutput { .. } => "process_output",
            GatewayEvent::ProcessExited { .. } => "process_exited",
            GatewayEvent::RetargetPath { .. } => "retarget_path",
        }
    }

    /// Events after which the client list may have changed.
    pub fn changes_membership(&self) -> bool {
        matches!(
            self,
            GatewayEvent::ClientConnected { .. } | GatewayEvent::ClientDisconnected { .. }
        )
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Point-in-time summary for the API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayStatus {
    pub connections: usize,
    pub missed_packets: u64,
    pub current_mbps: f32,
    pub average_mbps: f32,
    pub param_queue_depth: usize,
    pub param_running: bool,
    pub image_subscribers: usize,
    pub image_throttle_ms: Option<u64>,
    pub static_transforms: usize,
    pub dynamic_transforms: usize,
    pub grid_streams: Vec<GridStream>,
}

// ── Parameter dump ────────────────────────────────────────────────────────────

/// One get-params run: a list job, then one get job per node.
#[derive(Debug, Default)]
struct ParamDump {
    list_job: JobId,
    pending: HashMap<JobId, String>,
    nodes: Map<String, Value>,
}

// ── Gateway ───────────────────────────────────────────────────────────────────

pub struct Gateway<B, L> {
    config: GatewayConfig,
    params_config: ParamsConfig,
    registry: Registry,
    grids: GridStreamStore,
    transforms: TransformTable,
    goals: GoalTracker,
    params: ParamQueue,
    dump: Option<ParamDump>,
    images: ImageRateController,
    stats: StatsAggregator,
    bus: B,
    launcher: L,
    next_job: JobId,
}

impl<B: RobotBus, L: ProcessLauncher> Gateway<B, L> {
    pub fn new(config: &RoverlinkConfig, bus: B, launcher: L) -> Self {
        Self {
            config: config.gateway.clone(),
            params_config: config.params.clone(),
            registry: Registry::new(),
            grids: GridStreamStore::new(),
            transforms: TransformTable::new(),
            goals: GoalTracker::new(),
            params: ParamQueue::new(),
            dump: None,
            images: ImageRateController::new(&config.images),
            stats: StatsAggregator::new(
                config.gateway.stats_interval(),
                config.gateway.stats_window,
                config.gateway.missed_reset_ticks,
            ),
            bus,
            launcher,
            next_job: 1,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn grids(&self) -> &GridStreamStore {
        &self.grids
    }

    pub fn param_queue(&self) -> &ParamQueue {
        &self.params
    }

    pub fn images(&self) -> &ImageRateController {
        &self.images
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.clients()
    }

    pub fn publish_clients(&self, table: &ClientTable) {
        self.registry.publish_to(table);
    }

    pub fn status(&self) -> GatewayStatus {
        let sample = self.stats.last();
        GatewayStatus {
            connections: self.registry.len(),
            missed_packets: self.registry.missed(),
            current_mbps: sample.current_mbps,
            average_mbps: sample.average_mbps,
            param_queue_depth: self.params.depth(),
            param_running: self.params.is_running(),
            image_subscribers: self.images.subscribers().len(),
            image_throttle_ms: self.images.active().map(|d| d.as_millis() as u64),
            static_transforms: self.transforms.static_len(),
            dynamic_transforms: self.transforms.dynamic_len(),
            grid_streams: GridStream::ALL
                .into_iter()
                .filter(|&s| {
                    self.grids
                        .baselines(s)
                        .is_some_and(|b| b.received.is_some())
                })
                .collect(),
        }
    }

    pub fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Telemetry(msg) => self.on_telemetry(msg),
            GatewayEvent::ClientConnected { id, peer, sink } => self.on_connect(id, peer, sink),
            GatewayEvent::ClientDisconnected { id } => self.on_disconnect(id),
            GatewayEvent::Inbound { id, bytes } => self.on_inbound(id, &bytes),
            GatewayEvent::WriteComplete { id, bytes } => self.registry.write_completed(id, bytes),
            GatewayEvent::ProcessOutput { job, text } => {
                tracing::info!(job, %text, "process output");
                self.send_text(PacketKind::SetParamsResponse, &text);
            }
            GatewayEvent::ProcessExited {
                job,
                outcome,
                stdout,
            } => self.on_process_exit(job, outcome, stdout),
            GatewayEvent::RetargetPath { stream, topic } => {
                tracing::info!(?stream, %topic, "retargeting path stream");
                self.bus.retarget_path(stream, &topic);
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    /// Full dynamic transform set, every transform interval.
    pub fn on_transform_tick(&mut self) {
        if !self.registry.at_least_one_ready() {
            return;
        }
        if let Some(batch) = self.transforms.encode_dynamic() {
            self.broadcast(Outbound::single(batch), false);
        }
    }

    /// Start the next queued parameter apply if nothing is in flight.
    pub fn on_param_pump(&mut self) {
        if self.params.is_running() || self.params.depth() == 0 {
            return;
        }
        let job = self.alloc_job();
        let Some(cmd) = self.params.start_next(job) else {
            return;
        };
        tracing::info!(job, "{}", cmd.describe());

        let mut args = self.params_config.set_args.clone();
        args.extend([
            cmd.node.clone(),
            cmd.param_name.clone(),
            cmd.param_val.as_arg(),
        ]);
        self.launcher.launch(ProcessJob {
            id: job,
            kind: JobKind::ParamSet(cmd),
            program: self.params_config.program.clone(),
            args,
            timeout: self.params_config.apply_timeout(),
            forward_output: true,
        });
    }

    /// Close one stats period.
    pub fn on_stats_tick(&mut self) -> StatsSample {
        let bytes = self.registry.take_period_bytes();
        let sample = self.stats.tick(bytes);
        if sample.reset_missed {
            self.registry.reset_missed();
        }
        if self.registry.at_least_one_ready() {
            let packet = wire::encode_misc_stats(
                self.registry.len(),
                sample.current_mbps,
                sample.average_mbps,
            );
            self.broadcast(Outbound::single(packet), false);
        }
        tracing::debug!(
            bytes,
            current_mbps = sample.current_mbps,
            average_mbps = sample.average_mbps,
            "stats period closed"
        );
        sample
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    fn on_telemetry(&mut self, msg: TelemetryMessage) {
        match msg {
            TelemetryMessage::Grid { stream, grid } => self.on_grid(stream, grid),
            TelemetryMessage::GridUpdate { stream, update } => self.on_grid_update(stream, &update),
            TelemetryMessage::Scan { scan } => {
                if self.registry.at_least_one_ready() {
                    self.broadcast(Outbound::single(wire::encode_scan(&scan)), false);
                }
            }
            TelemetryMessage::Transforms {
                is_static,
                transforms,
            } => self.transforms.update(is_static, transforms),
            TelemetryMessage::Path { stream, path } => self.on_path(stream, &path),
            TelemetryMessage::GoalStatus { statuses } => {
                self.goals.update_statuses(statuses);
                if self.registry.at_least_one_ready() {
                    self.broadcast(Outbound::single(self.goals.encode()), false);
                }
            }
            TelemetryMessage::GoalSent { goal } => self.goals.goal_sent(goal),
            TelemetryMessage::Image { image } => self.on_image(image),
        }
    }

    fn on_grid(&mut self, stream: GridStream, grid: GridSnapshot) {
        if !self.grids.record_received(stream, grid) {
            return;
        }
        if !self.registry.at_least_one_ready() {
            tracing::trace!(?stream, "no client ready, grid not sent");
            return;
        }
        let Some(frame) = self.grids.pending_frame(stream) else {
            return;
        };
        // A full grid only goes out when nobody would miss it; otherwise the
        // sent baseline would run ahead of a lagging client.
        if !self.registry.all_ready() {
            tracing::debug!(?stream, "client lagging, grid held back");
            return;
        }
        match frame.encode() {
            Ok(packet) => {
                self.broadcast(Outbound::single(packet), false);
                self.grids.mark_sent(stream);
                tracing::debug!(?stream, changes = frame.changes.len(), reset = frame.reset, "grid sent");
            }
            Err(e) => tracing::warn!(?stream, error = %e, "grid packet rejected"),
        }
    }

    fn on_grid_update(&mut self, stream: GridStream, update: &GridUpdate) {
        let frame = match self.grids.apply_update(stream, update) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!(error = %e, "grid update dropped");
                return;
            }
        };
        if frame.changes.is_empty()
            || !self.registry.at_least_one_ready()
            || !self.registry.all_ready()
        {
            return;
        }
        match frame.encode() {
            Ok(packet) => {
                self.broadcast(Outbound::single(packet), false);
                self.grids.mark_update_sent(&frame);
            }
            Err(e) => tracing::warn!(?stream, error = %e, "grid update packet rejected"),
        }
    }

    fn on_path(&mut self, stream: PathStream, path: &PathFrame) {
        if !self.registry.at_least_one_ready() {
            return;
        }
        match wire::encode_path(stream, path) {
            Ok(packet) => self.broadcast(Outbound::single(packet), false),
            Err(e) => tracing::warn!(?stream, error = %e, "path packet rejected"),
        }
    }

    fn on_image(&mut self, image: CompressedImage) {
        if !self.images.admit(Instant::now()) {
            tracing::trace!("image throttled");
            return;
        }
        let header = match wire::encode_image_header(image.format, image.data.len()) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "image rejected");
                return;
            }
        };
        let out = Outbound::from_parts(vec![header, image.data]);
        let images = &self.images;
        let report = self
            .registry
            .broadcast_where(&out, false, |id| images.is_subscribed(id));
        self.forget_clients(report.dropped);
    }

    // ── Clients ──────────────────────────────────────────────────────────────

    fn on_connect(&mut self, id: ClientId, peer: String, sink: Box<dyn ClientSink>) {
        self.registry.register(id, peer, sink);

        // Grids first, in stream order, then static transforms.
        let mut catch_up = Outbound::default();
        for frame in self.grids.catch_up() {
            match frame.encode() {
                Ok(packet) => catch_up.push(packet),
                Err(e) => {
                    tracing::warn!(stream = ?frame.stream, error = %e, "catch-up grid rejected")
                }
            }
        }
        if let Some(batch) = self.transforms.encode_static() {
            catch_up.push(batch);
        }
        if !catch_up.is_empty() {
            tracing::debug!(client = id, bytes = catch_up.len(), "sending catch-up");
            if self.registry.send_to(id, catch_up).is_err() {
                self.forget_clients(vec![id]);
                return;
            }
        }
        self.refresh_image_subscription();
    }

    fn on_disconnect(&mut self, id: ClientId) {
        if self.registry.unregister(id) || self.images.is_subscribed(id) {
            self.forget_clients(vec![id]);
        }
    }

    /// Drop image membership for clients that are gone and resubscribe.
    fn forget_clients(&mut self, ids: Vec<ClientId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.images.disable(id);
        }
        self.refresh_image_subscription();
    }

    fn refresh_image_subscription(&mut self) {
        let change = self.images.recompute(self.registry.len());
        if change.unsubscribe {
            self.bus.unsubscribe_images();
        }
        if let Some(throttle) = change.subscribe {
            tracing::debug!(throttle_ms = throttle.as_millis() as u64, "image subscription");
            self.bus.subscribe_images(throttle);
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    fn on_inbound(&mut self, id: ClientId, bytes: &[u8]) {
        let cmd = match wire::decode_command(bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(client = id, error = %e, "bad command packet");
                return;
            }
        };
        tracing::debug!(client = id, kind = ?cmd.kind(), "command");

        match cmd {
            Command::Velocity { linear, angular } => {
                let scale = self.config.velocity_scale;
                self.bus.publish(BusCommand::Velocity {
                    linear: linear * scale,
                    angular: angular * scale,
                });
            }
            Command::Goal(pose) => self.bus.publish(BusCommand::Goal {
                frame_id: self.config.goal_frame.clone(),
                pose,
            }),
            Command::Stop => self.stop(),
            Command::ClearMaps => self.clear_maps(),
            Command::EnableImage => {
                if self.images.enable(id) {
                    self.refresh_image_subscription();
                }
            }
            Command::DisableImage => {
                if self.images.disable(id) {
                    self.refresh_image_subscription();
                }
            }
            Command::GetParams => self.start_param_dump(),
            Command::SetParams(text) => match ParamRequest::parse(&text) {
                ParamRequest::Apply(cmds) => {
                    tracing::info!(client = id, count = cmds.len(), "parameter changes queued");
                    self.params.enqueue(cmds);
                }
                ParamRequest::Diagnostic(text) => {
                    self.send_text(PacketKind::SetParamsResponse, &text)
                }
                ParamRequest::Invalid(msg) => {
                    tracing::warn!(client = id, "{msg}");
                    self.send_text(PacketKind::SetParamsResponse, &msg);
                }
            },
        }
    }

    fn stop(&mut self) {
        let Some(goals) = self.goals.cancellable() else {
            tracing::info!("stop requested before any goal status arrived");
            return;
        };
        tracing::info!(count = goals.len(), "cancelling goals");
        for goal_id in goals {
            self.bus.publish(BusCommand::CancelGoal { goal_id });
        }
    }

    fn clear_maps(&mut self) {
        tracing::info!("clearing maps");
        self.grids.clear();
        let restarted = self.launcher.restart_managed();
        self.bus.publish(BusCommand::ClearCostmaps);
        let text = if restarted.is_empty() {
            "Cleared costmaps".to_string()
        } else {
            format!("Restarted {}", restarted.join(" and "))
        };
        self.send_text(PacketKind::SetParamsResponse, &text);
    }

    // ── Parameter dump ───────────────────────────────────────────────────────

    fn start_param_dump(&mut self) {
        if self.dump.is_some() {
            tracing::info!("parameter dump restarted");
        }
        let job = self.alloc_job();
        self.dump = Some(ParamDump {
            list_job: job,
            ..ParamDump::default()
        });
        self.launcher.launch(ProcessJob {
            id: job,
            kind: JobKind::ParamList,
            program: self.params_config.program.clone(),
            args: self.params_config.list_args.clone(),
            timeout: self.params_config.list_timeout(),
            forward_output: false,
        });
    }

    fn on_process_exit(&mut self, job: JobId, outcome: ProcessOutcome, stdout: String) {
        if let Some(line) = self.params.finish(job, &outcome) {
            tracing::info!(job, "{line}");
            self.send_text(PacketKind::SetParamsResponse, &line);
            return;
        }

        let Some(dump) = self.dump.as_mut() else {
            tracing::debug!(job, ?outcome, "exit of untracked job");
            return;
        };

        if job == dump.list_job {
            let nodes: Vec<String> = stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            tracing::info!(?outcome, nodes = nodes.len(), "parameter node list");
            if nodes.is_empty() {
                self.dump = None;
                return;
            }
            for node in nodes {
                let id = self.alloc_job();
                let mut args = self.params_config.get_args.clone();
                args.push(node.clone());
                if let Some(dump) = self.dump.as_mut() {
                    dump.pending.insert(id, node.clone());
                }
                self.launcher.launch(ProcessJob {
                    id,
                    kind: JobKind::ParamGet { node },
                    program: self.params_config.program.clone(),
                    args,
                    timeout: self.params_config.list_timeout(),
                    forward_output: false,
                });
            }
            return;
        }

        let Some(node) = dump.pending.remove(&job) else {
            tracing::debug!(job, "exit of untracked job");
            return;
        };
        let key = node.strip_prefix('/').unwrap_or(&node).to_string();
        if stdout.trim().is_empty() {
            tracing::info!(%node, ?outcome, "no parameters returned");
        } else {
            match parse_dynparam_dump(&stdout) {
                Ok(value) => {
                    dump.nodes.insert(key, value);
                }
                Err(e) => tracing::warn!(%node, error = %e, "unparseable parameter dump"),
            }
        }
        tracing::debug!(%node, remaining = dump.pending.len(), "parameter get finished");

        if dump.pending.is_empty() {
            let nodes = std::mem::take(&mut dump.nodes);
            self.dump = None;
            tracing::info!(nodes = nodes.len(), "parameter dump complete");
            match serde_json::to_string_pretty(&Value::Object(nodes)) {
                Ok(text) => self.send_text(PacketKind::GetParamsResponse, &text),
                Err(e) => tracing::warn!(error = %e, "parameter dump not serializable"),
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn alloc_job(&mut self) -> JobId {
        let id = self.next_job;
        self.next_job += 1;
        id
    }

    fn broadcast(&mut self, out: Outbound, override_ready: bool) {
        let report = self.registry.broadcast(&out, override_ready);
        self.forget_clients(report.dropped);
    }

    /// Text responses go to every client regardless of readiness.
    fn send_text(&mut self, kind: PacketKind, text: &str) {
        match wire::encode_text(kind, text) {
            Ok(packet) => self.broadcast(Outbound::single(packet), true),
            Err(e) => tracing::warn!(error = %e, "text packet rejected"),
        }
    }
}
