use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18990;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Fallback context window when neither the model nor config declares one.
pub const DEFAULT_CONTEXT_TOKENS: u64 = 80_000;
/// Quiet gap that closes an inbound burst into one agent turn.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_500;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30 * 60 * 1000;

/// Top-level config (nexus.toml + NEXUS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NexusConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub heartbeat: HeartbeatDefaults,
    #[serde(default)]
    pub inbound: InboundConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory for process-lifetime state (restart sentinel lives here).
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            state_dir: default_state_dir(),
        }
    }
}

/// Agent-level defaults applied when a model declares nothing itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_context_tokens")]
    pub context_tokens: u64,
    /// Share of the context window history may occupy before pruning.
    #[serde(default = "default_history_share")]
    pub history_share: f64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            context_tokens: default_context_tokens(),
            history_share: default_history_share(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatDefaults {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    /// Misses tolerated before an agent is reported unhealthy.
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,
}

impl Default for HeartbeatDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_heartbeat_interval_ms(),
            miss_threshold: default_miss_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Telephony provider to activate (e.g. "twilio").
    #[serde(default)]
    pub provider: Option<String>,
    /// Terminal call records older than this are purged.
    #[serde(default = "default_call_retention_secs")]
    pub call_retention_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            call_retention_secs: default_call_retention_secs(),
        }
    }
}

impl NexusConfig {
    /// Load from `config_path` (explicit path > `NEXUS_CONFIG` env >
    /// `~/.nexus/nexus.toml`), with `NEXUS_*` env vars overriding file values.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: NexusConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NEXUS_").split("_"))
            .extract()
            .map_err(|e| crate::error::NexusError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.nexus/nexus.toml")
}

fn default_state_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.nexus/state")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_context_tokens() -> u64 {
    DEFAULT_CONTEXT_TOKENS
}

fn default_history_share() -> f64 {
    0.5
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_miss_threshold() -> u32 {
    3
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_call_retention_secs() -> u64 {
    24 * 60 * 60
}

fn bool_true() -> bool {
    true
}
