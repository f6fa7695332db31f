use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

pub const MIN_SCALE_FACTOR: f64 = 0.1;
pub const MAX_SCALE_FACTOR: f64 = 1.0;
/// Upper bound for the per-action delay and the post-action settle wait.
pub const MAX_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), ProviderEntry::default());
        Self {
            active_provider: "anthropic".to_string(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env vars take precedence).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            display_name: "Anthropic".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            api_key: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}

/// Operator-tunable settings for a session. Edits apply from the next action or capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Ratio of model-space pixels to native pixels, `[0.1, 1.0]`.
    pub scale_factor: f64,
    pub max_iterations: u32,
    /// Seconds between the end of one OS action and the start of the next.
    pub min_action_delay: f64,
    /// Seconds to let the screen settle before the trailing capture.
    pub post_action_wait: f64,
    /// JPEG quality, `[1, 100]`.
    pub encode_quality: u8,
    pub teleport_pointer: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scale_factor: 0.5,
            max_iterations: 20,
            min_action_delay: 0.5,
            post_action_wait: 1.0,
            encode_quality: 60,
            teleport_pointer: false,
        }
    }
}

impl SessionSettings {
    /// Clamps the scale factor and quality into range and rejects values that cannot be clamped.
    pub fn validate(mut self) -> DeskPilotResult<Self> {
        self.scale_factor = clamp_scale_factor(self.scale_factor)?;
        self.encode_quality = self.encode_quality.clamp(1, 100);
        if self.max_iterations == 0 {
            return Err(DeskPilotError::Config(
                "max_iterations must be a positive integer".into(),
            ));
        }
        for (name, value) in [
            ("min_action_delay", self.min_action_delay),
            ("post_action_wait", self.post_action_wait),
        ] {
            if !value.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&value) {
                return Err(DeskPilotError::Config(format!(
                    "{name} must be between 0 and {MAX_DELAY_SECS} seconds, got {value}"
                )));
            }
        }
        Ok(self)
    }
}

/// Clamps a scale factor into `[0.1, 1.0]`. NaN and infinities cannot be clamped.
pub fn clamp_scale_factor(value: f64) -> DeskPilotResult<f64> {
    if !value.is_finite() {
        return Err(DeskPilotError::Config(format!(
            "scale_factor must be a finite number, got {value}"
        )));
    }
    Ok(value.clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR))
}

/// Session settings shared between the operator surface and the running loop.
#[derive(Debug, Clone)]
pub struct SharedSettings(Arc<RwLock<SessionSettings>>);

impl SharedSettings {
    pub fn new(settings: SessionSettings) -> DeskPilotResult<Self> {
        Ok(Self(Arc::new(RwLock::new(settings.validate()?))))
    }

    pub fn snapshot(&self) -> SessionSettings {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn update(&self, settings: SessionSettings) -> DeskPilotResult<()> {
        let settings = settings.validate()?;
        tracing::info!(
            scale = settings.scale_factor,
            max_iterations = settings.max_iterations,
            quality = settings.encode_quality,
            "session settings updated"
        );
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = settings;
        Ok(())
    }
}

/// Knobs for the loop, executor and capture service beyond the session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub capture_interval_ms: u64,
    pub pointer_animation_ms: u64,
    pub max_wait_secs: f64,
    pub rate_limit_backoff_secs: f64,
    pub rate_limit_retries: u32,
    /// Screenshots kept in the request view of the conversation.
    pub image_history_limit: usize,
    pub completion_phrases: Vec<String>,
    /// Key chord toggling the keyboard layout around text injection; empty disables it.
    pub layout_toggle: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: 500,
            pointer_animation_ms: 500,
            max_wait_secs: 60.0,
            rate_limit_backoff_secs: 60.0,
            rate_limit_retries: 3,
            image_history_limit: 3,
            completion_phrases: default_completion_phrases(),
            layout_toggle: Vec::new(),
        }
    }
}

fn default_completion_phrases() -> Vec<String> {
    [
        "task completed",
        "successfully completed",
        "finished the task",
        "task is done",
        "completed successfully",
        "mission accomplished",
        "we have completed",
        "i have completed",
        "task has been completed",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in working directory");
            return Some(candidate);
        }
    }

    let candidate = dirs::config_dir()?.join("deskpilot").join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in user config dir");
        return Some(candidate);
    }
    None
}

/// Loads `config.toml` from the first location that has one, or defaults when none does.
pub fn load_config() -> DeskPilotResult<AppConfig> {
    match resolve_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::info!("no config.toml found; using defaults");
            Ok(AppConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> DeskPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    config.session = config.session.validate()?;
    tracing::info!(
        path = %path.display(),
        provider = %config.llm.active_provider,
        scale = config.session.scale_factor,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
