use crate::error::{FarmSmartError, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "farmsmart.toml";
pub const ENV_PREFIX: &str = "FARMSMART_";
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";

/// Defaults, then `farmsmart.toml`, then `FARMSMART_*` variables with `__`
/// between section and field (`FARMSMART_COMPLETION__TEXT_MODEL`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmSmartConfig {
    pub completion: CompletionConfig,
    pub chat: ChatConfig,
    pub analytics: AnalyticsConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub api_base: String,
    /// Never written back out; falls back to `OPENAI_API_KEY` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub text_model: String,
    pub vision_model: String,
    pub chat_temperature: f32,
    pub analysis_temperature: f32,
    pub chart_temperature: f32,
    pub max_tokens: u32,
    pub analysis_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            text_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            chat_temperature: 0.7,
            analysis_temperature: 0.0,
            chart_temperature: 0.0,
            max_tokens: 1000,
            analysis_max_tokens: 2000,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("chat_temperature", &self.chat_temperature)
            .field("analysis_temperature", &self.analysis_temperature)
            .field("chart_temperature", &self.chart_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("analysis_max_tokens", &self.analysis_max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How many of the most recent log messages accompany a free-chat request.
    pub max_context_messages: usize,
    pub fallback_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 50,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsMode {
    /// Ask the model for chart JSON, fall back to parsing the analysis text.
    #[default]
    ModelWithTextFallback,
    /// Skip the extraction call and parse the analysis text only.
    TextOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub mode: AnalyticsMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub max_write_retries: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".farmsmart"),
            max_write_retries: 3,
        }
    }
}

impl FarmSmartConfig {
    /// defaults -> `farmsmart.toml` in the working directory -> env
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if path.exists() {
            debug!("Loading config from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let mut config: Self = figment
            .extract()
            .map_err(|e| FarmSmartError::Config(e.to_string()))?;

        if config.completion.api_key.is_none() {
            config.completion.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let completion = &self.completion;
        for (name, value) in [
            ("chat_temperature", completion.chat_temperature),
            ("analysis_temperature", completion.analysis_temperature),
            ("chart_temperature", completion.chart_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(FarmSmartError::Config(format!(
                    "completion.{} must be between 0.0 and 2.0, got {}",
                    name, value
                )));
            }
        }

        if completion.timeout_secs == 0 {
            return Err(FarmSmartError::Config(
                "completion.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if completion.max_tokens == 0 || completion.analysis_max_tokens == 0 {
            return Err(FarmSmartError::Config(
                "completion token limits must be greater than 0".to_string(),
            ));
        }

        if self.chat.max_context_messages == 0 {
            return Err(FarmSmartError::Config(
                "chat.max_context_messages must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
