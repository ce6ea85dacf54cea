use crate::api::AiProvider;
use crate::core::config::data::Config;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8100/api";
pub const BASE_URL_ENV: &str = "FLEXGPT_API_BASE_URL";

impl Config {
    /// Base URL precedence: environment, then config file, then the local
    /// development default.
    pub fn api_base_url(&self) -> String {
        resolve_base_url(std::env::var(BASE_URL_ENV).ok(), self)
    }

    pub fn provider_or_default(&self) -> AiProvider {
        self.default_provider.unwrap_or_default()
    }

    pub fn set_base_url(&mut self, value: &str) {
        let normalized = normalize_base_url(value);
        self.base_url = (!normalized.is_empty()).then_some(normalized);
    }
}

pub(crate) fn resolve_base_url(env_value: Option<String>, config: &Config) -> String {
    env_value
        .as_deref()
        .or(config.base_url.as_deref())
        .map(normalize_base_url)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}
