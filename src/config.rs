//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `monitor.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - BrokerConfig: Where the sensor network publishes and how to connect.
//!     - StorageConfig: Directory and keys for the persisted sensor cache.
//!     - HistoryConfig: Rolling history bound per sensor.
//!     - ServerConfig: Local dashboard / api listener.
//!     - AssistantConfig: Completion api credentials and generation knobs.
//!     - LoggingConfig: Log level and per-reading output.
//!
//! every section has defaults, so a partial file only overrides what it names.
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// env var that overrides `[assistant] api_key`
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    /// full websocket url, e.g. wss://broker.hivemq.com:8884/mqtt
    pub url: String,
    pub port: u16,
    /// multi-level wildcard under the sensor root
    pub topic: String,
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub clean_session: bool,
    /// delay before the supervisor opens a fresh connection after a loss
    pub reconnect_delay_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "wss://broker.hivemq.com:8884/mqtt".to_string(),
            port: 8884,
            topic: "sensorestcc/#".to_string(),
            client_id_prefix: "asmaapp".to_string(),
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            clean_session: true,
            reconnect_delay_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
    pub latest_key: String,
    pub history_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
            latest_key: "@asma/sensors:last".to_string(),
            history_key: "@asma/sensors:history".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_len: crate::store::DEFAULT_HISTORY_MAX }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            embedding_model: "models/text-embedding-004".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.35,
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
Você é um assistente de saúde respiratória para um usuário asmático.
- Use linguagem clara e objetiva, evitando alarmismo.
- Quando o usuário pedir avaliação do \"ambiente\" ou \"sintomas\", considere o contexto dos sensores se fornecido (temperatura, umidade, AQI, O3, NO2, SO2, PM2.5/PM10, batimentos, SpO2).
- Se os sensores não estiverem disponíveis, explique de forma neutra como o usuário pode monitorá-los.
- Inclua recomendações práticas e sinais de alerta que exijam buscar atendimento.
- NÃO faça diagnóstico médico; deixe claro que é suporte informativo.";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: MonitorConfig = toml::from_str(content).context("Failed to parse config")?;
        config.apply_env();
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("monitor.toml"),
            std::path::PathBuf::from("..").join("config").join("monitor.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        warn!("[CONFIG] No config file found - using defaults");
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.assistant.api_key = key;
            }
        }
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        info!("broker: {} (topic {})", self.broker.url, self.broker.topic);
        info!("storage: {} | history bound: {}", self.storage.dir, self.history.max_len);
        info!("dashboard: http://{}", self.server.bind);
        info!(
            "assistant: {} (model {}, key {})",
            if self.assistant.enabled { "enabled" } else { "disabled" },
            self.assistant.model,
            if self.assistant.api_key.is_empty() { "missing" } else { "set" }
        );
    }
}
