//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars,
//! direct keys), and instantiates the appropriate adapter for each
//! configured provider.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use dw_domain::config::{LlmConfig, LlmStartupPolicy, ProviderKind};
use dw_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Holds all instantiated LLM providers, keyed by their config id.
///
/// When the startup policy is `allow_none`, the registry also records
/// initialization errors so they can be surfaced at the `/healthz` and
/// config-doctor surfaces.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message, so raw secrets never leak into logs or the doctor output.
pub fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize are logged and skipped rather than
    /// aborting startup, unless `startup_policy` is `require_one` and every
    /// configured provider fails.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Anthropic => AnthropicProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Lorem => Self::build_lorem(pc),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: format!("{:?}", pc.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            match config.startup_policy {
                LlmStartupPolicy::RequireOne => {
                    return Err(Error::Config(
                        "all configured LLM providers failed to initialize \
                         (startup_policy = require_one)"
                            .into(),
                    ));
                }
                LlmStartupPolicy::AllowNone => {
                    tracing::warn!(
                        failed_providers = init_errors.len(),
                        "no LLM providers initialized (startup_policy = allow_none); \
                         the engine will boot but turn creation will fail until a \
                         provider is configured"
                    );
                }
            }
        }

        Ok(Self {
            providers,
            init_errors,
        })
    }

    #[cfg(any(test, feature = "testing"))]
    fn build_lorem(pc: &dw_domain::config::ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
        crate::lorem::LoremProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
    }

    #[cfg(not(any(test, feature = "testing")))]
    fn build_lorem(_pc: &dw_domain::config::ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
        Err(Error::Config(
            "the lorem provider kind is only available in builds compiled with \
             the 'testing' feature"
                .into(),
        ))
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Iterate over all registered providers.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_redacts_long_token() {
        let msg = "request failed with key sk-abcdefghijklmnopqrstuvwxyz in header";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(masked.contains("sk-a...wxyz"));
    }

    #[test]
    fn mask_secrets_leaves_short_words_alone() {
        let msg = "HTTP 401 - invalid request";
        assert_eq!(mask_secrets(msg), msg);
    }
}
