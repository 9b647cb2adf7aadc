//! AI provider registry.
//!
//! Every provider is reached through an OpenAI-compatible API surface, so
//! switching providers only changes the base URL and the embedding model.

use crate::error::{Error, Result};

/// Vector dimension requested from every provider that supports explicit
/// dimension selection.
pub const EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    pub embedding_model: &'static str,
    /// Whether the embeddings endpoint accepts an explicit `dimensions`.
    pub supports_dimensions: bool,
}

const PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        embedding_model: "text-embedding-3-small",
        supports_dimensions: true,
    },
    ProviderConfig {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        embedding_model: "text-embedding-004",
        supports_dimensions: false,
    },
];

pub fn provider_config(provider: &str) -> Result<&'static ProviderConfig> {
    let wanted = provider.to_lowercase();
    PROVIDERS
        .iter()
        .find(|p| p.name == wanted)
        .ok_or_else(|| {
            let available: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
            Error::InvalidInput(format!(
                "unknown provider '{provider}', available: {}",
                available.join(", ")
            ))
        })
}

/// Default chat model used when neither the session nor the environment
/// names one.
pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "gemini" => "gemini-1.5-flash",
        _ => "gpt-4o-mini",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_resolve() {
        assert_eq!(provider_config("openai").unwrap().embedding_model, "text-embedding-3-small");
        assert_eq!(provider_config("GEMINI").unwrap().name, "gemini");
        assert!(provider_config("mystery").is_err());
    }
}
