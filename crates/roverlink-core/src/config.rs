//! Configuration system for roverlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ROVERLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/roverlink/config.toml
//!   3. ~/.config/roverlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverlinkConfig {
    pub network: NetworkConfig,
    pub gateway: GatewayConfig,
    pub params: ParamsConfig,
    pub images: ImageConfig,
    pub topics: TopicsConfig,
    pub managed: Vec<ManagedProcess>,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP port; browser clients upgrade to WebSocket at /ws.
    pub http_port: u16,
    /// Raw byte-stream port for desktop and phone clients.
    pub stream_port: u16,
    /// Local JSON API port, bound to loopback only.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Applied to both linear and angular joystick values before publishing.
    pub velocity_scale: f32,
    /// Frame id stamped on goals sent from clients.
    pub goal_frame: String,
    pub transform_interval_ms: u64,
    pub param_pump_interval_ms: u64,
    pub stats_interval_ms: u64,
    /// Rolling bandwidth window length, in stats periods.
    pub stats_window: usize,
    /// Missed-packet counter is zeroed every this many stats periods.
    pub missed_reset_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    /// Program that applies, lists and reads node parameters.
    pub program: String,
    pub set_args: Vec<String>,
    pub list_args: Vec<String>,
    pub get_args: Vec<String>,
    pub apply_timeout_secs: u64,
    pub list_timeout_secs: u64,
}

/// Image throttle: per_subscriber × subscribers + per_connection × connections − offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub per_subscriber_delay_ms: u64,
    pub per_connection_delay_ms: u64,
    pub fixed_offset_ms: u64,
}

/// Source topics. The bus adapter owns subscriptions; these are what it
/// is told to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub map: String,
    pub global_costmap: String,
    pub local_costmap: String,
    pub scan: String,
    pub local_path: String,
    pub global_path: String,
    pub image: String,
}

/// A long-running process restarted by the clear-maps command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedProcess {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Directory served at `/`. None = no static files.
    pub root: Option<PathBuf>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            stream_port: 4000,
            api_port: 7070,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            velocity_scale: 1.4,
            goal_frame: "map".to_string(),
            transform_interval_ms: 30,
            param_pump_interval_ms: 100,
            stats_interval_ms: 1000,
            stats_window: 10,
            missed_reset_ticks: 10,
        }
    }
}

impl Default for ParamsConfig {
    fn default() -> Self {
        let dynparam = |verb: &str| {
            vec![
                "dynamic_reconfigure".to_string(),
                "dynparam".to_string(),
                verb.to_string(),
            ]
        };
        Self {
            program: "rosrun".to_string(),
            set_args: dynparam("set"),
            list_args: dynparam("list"),
            get_args: dynparam("get"),
            apply_timeout_secs: 20,
            list_timeout_secs: 3,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            per_subscriber_delay_ms: 100,
            per_connection_delay_ms: 50,
            fixed_offset_ms: 100,
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            map: "/map".to_string(),
            global_costmap: "/move_base/global_costmap/costmap".to_string(),
            local_costmap: "/move_base/local_costmap/costmap".to_string(),
            scan: "/front/scan".to_string(),
            local_path: "/move_base/TrajectoryPlannerROS/local_plan".to_string(),
            global_path: "/move_base/NavfnROS/plan".to_string(),
            image: "/camera/image_raw/compressed".to_string(),
        }
    }
}

/// SLAM and navigation, as launched on the reference robot.
pub fn default_managed() -> Vec<ManagedProcess> {
    vec![
        ManagedProcess {
            name: "gmapping".to_string(),
            program: "rosrun".to_string(),
            args: ["gmapping", "slam_gmapping", "scan:=front/scan", "_delta:=0.05"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
        ManagedProcess {
            name: "jackal_navigation".to_string(),
            program: "roslaunch".to_string(),
            args: vec!["jackal_navigation".to_string(), "move_base.launch".to_string()],
        },
    ]
}

impl GatewayConfig {
    pub fn transform_interval(&self) -> Duration {
        Duration::from_millis(self.transform_interval_ms)
    }

    pub fn param_pump_interval(&self) -> Duration {
        Duration::from_millis(self.param_pump_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

impl ParamsConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("roverlink")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RoverlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RoverlinkConfig::with_defaults()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus the default managed process list. `Default` leaves the
    /// list empty so a config file can opt out of managed processes.
    pub fn with_defaults() -> Self {
        Self {
            managed: default_managed(),
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ROVERLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RoverlinkConfig::with_defaults())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply ROVERLINK_* overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(p) = lookup("ROVERLINK_NETWORK__HTTP_PORT").and_then(|v| v.parse().ok()) {
            self.network.http_port = p;
        }
        if let Some(p) = lookup("ROVERLINK_NETWORK__STREAM_PORT").and_then(|v| v.parse().ok()) {
            self.network.stream_port = p;
        }
        if let Some(p) = lookup("ROVERLINK_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(s) = lookup("ROVERLINK_GATEWAY__VELOCITY_SCALE").and_then(|v| v.parse().ok()) {
            self.gateway.velocity_scale = s;
        }
        if let Some(root) = lookup("ROVERLINK_WEB__ROOT") {
            self.web.root = if root.is_empty() {
                None
            } else {
                Some(PathBuf::from(root))
            };
        }
    }
}
