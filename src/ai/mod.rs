//! Clients for the OpenAI-compatible provider APIs (chat completions and
//! embeddings) and the reasoning-tag filter applied to model output.

pub mod client;
pub mod embeddings;
pub mod think;

pub use client::{ChatMessage, LlmClient, Tool, ToolCall};
pub use embeddings::EmbeddingClient;

use crate::config::{providers, Settings};
use crate::error::{Error, Result};
use crate::models::Session;

/// Provider, model, and clients resolved for one request or pipeline run.
///
/// Selection order: session preferences first; environment defaults only
/// in development mode. The credential always comes from the caller, with
/// a development-mode fallback to the environment.
pub struct AiContext {
    pub provider: String,
    pub model: String,
    pub llm: LlmClient,
    pub embeddings: EmbeddingClient,
}

impl AiContext {
    pub fn new(
        settings: &Settings,
        session: Option<&Session>,
        api_key: String,
    ) -> Result<Self> {
        let (provider, model) = resolve_selection(settings, session)?;
        let config = providers::provider_config(&provider)?;
        let model =
            model.unwrap_or_else(|| providers::default_model(config.name).to_string());

        Ok(Self {
            llm: LlmClient::new(config.base_url, api_key.clone(), model.clone()),
            embeddings: EmbeddingClient::new(config, api_key),
            provider: config.name.to_string(),
            model,
        })
    }
}

fn resolve_selection(
    settings: &Settings,
    session: Option<&Session>,
) -> Result<(String, Option<String>)> {
    match session {
        Some(session) => {
            let preferences = session.preferences.as_ref();
            match preferences.and_then(|p| p.ai_provider.clone()) {
                Some(provider) => {
                    let model = preferences.and_then(|p| p.ai_model.clone());
                    Ok((provider, model))
                }
                None if settings.is_development() => {
                    Ok((settings.ai_provider.clone(), settings.ai_model.clone()))
                }
                None => Err(Error::InvalidInput(
                    "session preferences not set; configure AI provider and model".to_string(),
                )),
            }
        }
        None if settings.is_development() => {
            Ok((settings.ai_provider.clone(), settings.ai_model.clone()))
        }
        None => Err(Error::InvalidInput(
            "session not found and environment fallback is development-only".to_string(),
        )),
    }
}

/// Credential from the calling layer, falling back to the environment in
/// development mode only.
pub fn resolve_credential(settings: &Settings, api_key: Option<String>) -> Result<String> {
    match api_key.filter(|k| !k.is_empty()) {
        Some(key) => Ok(key),
        None if settings.is_development() => settings.ai_api_key.clone().ok_or_else(|| {
            Error::InvalidInput("API key required: no credential supplied and none in env".into())
        }),
        None => Err(Error::InvalidInput(
            "API key required: provide the X-API-Key credential".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionPreferences;

    fn settings(env: &str) -> Settings {
        Settings {
            database_url: "postgres://localhost/test".to_string(),
            database_name: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9999,
            debug: true,
            env: env.to_string(),
            ai_api_key: Some("env-key".to_string()),
            ai_provider: "openai".to_string(),
            ai_model: None,
            use_remote_embeddings: true,
            embedding_dimension: 768,
        }
    }

    fn session_with(provider: Option<&str>, model: Option<&str>) -> Session {
        Session {
            session_id: "session-1".to_string(),
            preferences: Some(SessionPreferences {
                ai_provider: provider.map(String::from),
                ai_model: model.map(String::from),
            }),
        }
    }

    #[test]
    fn session_preferences_win_over_environment() {
        let context = AiContext::new(
            &settings("production"),
            Some(&session_with(Some("gemini"), Some("gemini-2.0-flash"))),
            "key".to_string(),
        )
        .unwrap();
        assert_eq!(context.provider, "gemini");
        assert_eq!(context.model, "gemini-2.0-flash");
    }

    #[test]
    fn missing_preferences_fall_back_only_in_development() {
        assert!(AiContext::new(
            &settings("development"),
            Some(&session_with(None, None)),
            "key".to_string()
        )
        .is_ok());
        assert!(AiContext::new(
            &settings("production"),
            Some(&session_with(None, None)),
            "key".to_string()
        )
        .is_err());
    }

    #[test]
    fn missing_model_uses_provider_default() {
        let context = AiContext::new(
            &settings("production"),
            Some(&session_with(Some("openai"), None)),
            "key".to_string(),
        )
        .unwrap();
        assert_eq!(context.model, "gpt-4o-mini");
    }

    #[test]
    fn credential_fallback_is_development_only() {
        assert_eq!(
            resolve_credential(&settings("development"), None).unwrap(),
            "env-key"
        );
        assert!(resolve_credential(&settings("production"), None).is_err());
        assert_eq!(
            resolve_credential(&settings("production"), Some("user-key".to_string())).unwrap(),
            "user-key"
        );
    }
}
