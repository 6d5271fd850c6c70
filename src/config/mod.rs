use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "https://api.jikan.moe/v4";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Configuration {
    pub backend: BackendConfig,
    pub account: Option<AccountConfig>,
    pub catalog: Option<CatalogConfig>,
    pub realtime: Option<RealtimeConfig>,
    pub binge: Option<BingeConfig>,
    #[serde(rename = "shareBaseUrl")]
    pub share_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(rename = "anonKey")]
    pub anon_key: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealtimeConfig {
    pub seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BingeConfig {
    #[serde(rename = "episodeLength")]
    pub episode_length: u32,
}

/// Credentials resolved from the config file and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Configuration {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Configuration = serde_yaml::from_str(content)?;
        if config.backend.url.trim().is_empty() {
            anyhow::bail!("backend.url must not be empty");
        }
        url::Url::parse(&config.backend.url)?;
        Ok(config)
    }

    pub fn backend_url(&self) -> &str {
        self.backend.url.trim_end_matches('/')
    }

    pub fn catalog_url(&self) -> &str {
        self.catalog
            .as_ref()
            .and_then(|c| c.base_url.as_deref())
            .unwrap_or(DEFAULT_CATALOG_URL)
            .trim_end_matches('/')
    }

    pub fn realtime_interval(&self) -> Duration {
        Duration::from_secs(
            self.realtime
                .as_ref()
                .map(|r| r.seconds.max(1))
                .unwrap_or(10)
        )
    }

    pub fn episode_length(&self) -> u32 {
        self.binge
            .as_ref()
            .map(|b| b.episode_length)
            .filter(|l| *l > 0)
            .unwrap_or(crate::aggregate::DEFAULT_EPISODE_LENGTH)
    }

    /// Environment variables win over the file so passwords can stay out of it.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    fn credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
        let account = self.account.clone().unwrap_or_default();
        let email = env("ANILOG_EMAIL").or(account.email)?;
        let password = env("ANILOG_PASSWORD").or(account.password)?;
        Some(Credentials { email, password })
    }
}
