use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StartupError;
use crate::util::{chat_completions_url, is_local_endpoint_url, parse_bool_str};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TWO_PASS_TIMEOUT_SECS: u64 = 60;
const SINGLE_PASS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STRICT_RETRIES: u32 = 1;
const DEFAULT_AMBIGUITY_MARGIN: u8 = 20;

/// What selecting a tab that is still processing does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReselectPolicy {
    /// Selection is a no-op; the in-flight pipeline keeps running.
    #[default]
    Ignore,
    /// Cancel the in-flight request and start the tab over.
    CancelInFlight,
}

impl ReselectPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" | "keep" | "none" => Some(Self::Ignore),
            "cancel" | "restart" | "cancel_in_flight" => Some(Self::CancelInFlight),
            _ => None,
        }
    }
}

/// Tunables for the per-tab pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub two_pass: bool,
    /// Strict first-pass reissues before falling back to a single pass.
    pub strict_retries: u32,
    /// Ambiguities whose top two readings are within this many percentage
    /// points keep the original wording.
    pub ambiguity_margin: u8,
    pub reselect: ReselectPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            two_pass: true,
            strict_retries: DEFAULT_STRICT_RETRIES,
            ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
            reselect: ReselectPolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub styles_dir: PathBuf,
    pub session_file: PathBuf,
    pub timeout_secs: u64,
    pub pipeline: PipelineSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = env_string("RESTYLE_API_URL")
            .map(|url| chat_completions_url(&url))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = env_string("RESTYLE_API_KEY");
        let model = env_string("RESTYLE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let config_root = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("restyle");
        let styles_dir = env_string("RESTYLE_STYLES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| config_root.join("styles"));
        let session_file = env_string("RESTYLE_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| config_root.join("session.json"));

        let mut pipeline = PipelineSettings::default();
        if let Some(raw) = env_string("RESTYLE_TWO_PASS") {
            let Some(two_pass) = parse_bool_str(&raw) else {
                bail!("Invalid RESTYLE_TWO_PASS '{raw}': expected true or false");
            };
            pipeline.two_pass = two_pass;
        }
        if let Some(retries) = env_parse::<u32>("RESTYLE_STRICT_RETRIES")? {
            pipeline.strict_retries = retries;
        }
        if let Some(margin) = env_parse::<u8>("RESTYLE_AMBIGUITY_MARGIN")? {
            pipeline.ambiguity_margin = margin;
        }
        if let Some(raw) = env_string("RESTYLE_RESELECT_POLICY") {
            let Some(policy) = ReselectPolicy::parse(&raw) else {
                bail!("Invalid RESTYLE_RESELECT_POLICY '{raw}': expected 'ignore' or 'cancel'");
            };
            pipeline.reselect = policy;
        }

        let timeout_secs = env_parse::<u64>("RESTYLE_TIMEOUT_SECS")?.unwrap_or(if pipeline.two_pass
        {
            TWO_PASS_TIMEOUT_SECS
        } else {
            SINGLE_PASS_TIMEOUT_SECS
        });

        Ok(Self {
            api_key,
            model,
            api_url,
            styles_dir,
            session_file,
            timeout_secs,
            pipeline,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid RESTYLE_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            return Err(StartupError::ConfigMissing(format!(
                "RESTYLE_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            ))
            .into());
        }

        if self.model.trim().is_empty() {
            bail!("RESTYLE_MODEL must not be empty");
        }

        if self.timeout_secs == 0 {
            bail!("RESTYLE_TIMEOUT_SECS must be greater than zero");
        }

        if self.pipeline.ambiguity_margin > 100 {
            bail!(
                "RESTYLE_AMBIGUITY_MARGIN is {} but must be between 0 and 100",
                self.pipeline.ambiguity_margin
            );
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("Invalid {key} '{raw}': expected a non-negative integer"),
        },
        None => Ok(None),
    }
}
