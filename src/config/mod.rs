pub mod providers;

use crate::error::{Error, Result};

/// Application settings loaded from environment variables.
///
/// `dotenv` is loaded by the binary before this is read, so a local `.env`
/// works in development while deployments set real environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub database_name: String,

    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub env: String,

    /// Development-mode fallbacks when a session carries no preferences.
    pub ai_api_key: Option<String>,
    pub ai_provider: String,
    pub ai_model: Option<String>,

    /// When false the pipeline skips embedding generation entirely
    /// (development without an embeddings quota); retrieval then falls
    /// back to lexical scoring for that repository.
    pub use_remote_embeddings: bool,
    pub embedding_dimension: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::InvalidInput("DATABASE_URL is not set".into()))?;

        Ok(Settings {
            database_url,
            database_name: env_or("DATABASE_NAME", "github_explorer"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 9999),
            debug: env_parse("DEBUG", true),
            env: env_or("ENV", "development"),
            ai_api_key: std::env::var("AI_API_KEY").ok().filter(|k| !k.is_empty()),
            ai_provider: env_or("AI_PROVIDER", "openai"),
            ai_model: std::env::var("AI_MODEL").ok().filter(|m| !m.is_empty()),
            use_remote_embeddings: env_parse("USE_REMOTE_EMBEDDINGS", true),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", 768),
        })
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("REPOGRAPH_TEST_PORT", "not-a-number");
        let port: u16 = env_parse("REPOGRAPH_TEST_PORT", 9999);
        assert_eq!(port, 9999);
    }
}
