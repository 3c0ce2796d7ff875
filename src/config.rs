use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Generation service settings.
///
/// Layered as defaults, then an optional YAML file, then environment
/// variables, then CLI flags. The API key is only ever read from the
/// environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub retries: usize,
    pub initial_backoff_ms: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: 120,
            retries: 3,
            initial_backoff_ms: 500,
            api_key: None,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        let env_file = read_env_file(dotenvy::dotenv_iter());
        config.apply_env(|key| std::env::var(key).ok().or_else(|| env_file.get(key).cloned()));
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = var("BEDTIME_OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model = model;
        }
        if let Some(base_url) = var("BEDTIME_OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
    }

    pub fn with_overrides(mut self, model: Option<&str>, base_url: Option<&str>) -> Self {
        if let Some(model) = model {
            self.model = model.to_owned();
        }
        if let Some(base_url) = base_url {
            self.base_url = base_url.to_owned();
        }
        self
    }
}

/// Variables from a `.env` file. They never override the process
/// environment; a missing file is an empty map.
fn read_env_file(iter: dotenvy::Result<dotenvy::Iter<File>>) -> HashMap<String, String> {
    let Ok(iter) = iter else {
        return HashMap::new();
    };
    iter.filter_map(|item| match item {
        Ok(pair) => Some(pair),
        Err(err) => {
            tracing::warn!(error = %err, "skipping unreadable .env line");
            None
        }
    })
    .collect()
}
