use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default)]
    pub llm: LlmSection,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: default_upload_dir(),
            llm: LlmSection::default(),
        }
    }
}

/// Which extraction strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI-compatible hosted API; needs an API key in the environment.
    #[default]
    Remote,
    /// Local Ollama server speaking the OpenAI chat API.
    Ollama,
    /// Regex rules only, no model call.
    Heuristics,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    /// Text longer than this many characters is cut before sending.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "EndpointConfig::remote")]
    pub remote: EndpointConfig,
    #[serde(default = "EndpointConfig::ollama")]
    pub ollama: EndpointConfig,
}

fn default_max_chars() -> usize {
    12_000
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            max_chars: default_max_chars(),
            remote: EndpointConfig::remote(),
            ollama: EndpointConfig::ollama(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    /// Name of the env var holding the API key. `None` means no key is needed.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl EndpointConfig {
    fn remote() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            text_model: "gpt-3.5-turbo".to_string(),
            vision_model: "gpt-4o".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }

    fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            text_model: "llama3.1".to_string(),
            vision_model: "llava".to_string(),
            api_key_env: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like `load`, but a missing file yields the built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
