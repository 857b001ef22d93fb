//! Backend endpoint configuration from environment variables.

use thiserror::Error;

/// Startup configuration: where the hosted backend lives and the public
/// API key to present. Both are required; there is no partial operation.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CLIENTHUB_BACKEND_URL is not set")]
    MissingUrl,
    #[error("CLIENTHUB_API_KEY is not set")]
    MissingKey,
}

impl ApiConfig {
    /// Read `CLIENTHUB_BACKEND_URL` and `CLIENTHUB_API_KEY`, loading a
    /// `.env` file when present. Fails fast if either is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url =
            std::env::var("CLIENTHUB_BACKEND_URL").map_err(|_| ConfigError::MissingUrl)?;
        let api_key = std::env::var("CLIENTHUB_API_KEY").map_err(|_| ConfigError::MissingKey)?;

        let config = Self::new(base_url, api_key);
        tracing::debug!(
            "backend = {}, api key (masked) = {}",
            config.base_url,
            config.masked_key()
        );
        Ok(config)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn masked_key(&self) -> String {
        if self.api_key.len() <= 16 {
            return "***".to_string();
        }
        format!(
            "{}...{}",
            &self.api_key[..8],
            &self.api_key[self.api_key.len() - 8..]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let config = ApiConfig::new("https://backend.example.com/", "key");
        assert_eq!(config.base_url, "https://backend.example.com");
    }

    #[test]
    fn short_keys_are_fully_masked() {
        let config = ApiConfig::new("https://x", "shortkey");
        assert_eq!(config.masked_key(), "***");
    }
}
