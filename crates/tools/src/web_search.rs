//! `web_search` variants.
//!
//! Selected at startup from [`dw_domain::config::WebSearchConfig`] the same
//! way `dw-providers`'s `ProviderRegistry` resolves an LLM adapter by kind —
//! one trait, one concrete implementation per backend, chosen once and
//! shared behind an `Arc` thereafter.

use dw_domain::config::{WebSearchConfig, WebSearchProvider};
use serde_json::Value;

#[async_trait::async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: Option<u32>,
        topic: Option<&str>,
    ) -> Result<Value, String>;
}

/// Build the configured client, reading its API key from the configured
/// environment variable. Returns an error (not a panic) if the env var is
/// unset — startup treats a missing web-search key as a soft failure the
/// same way a missing LLM provider credential is, not a hard abort.
pub fn build_client(config: &WebSearchConfig) -> Result<Box<dyn WebSearchClient>, String> {
    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        format!(
            "environment variable '{}' is not set for the web_search tool",
            config.api_key_env
        )
    })?;
    let http = reqwest::Client::new();
    Ok(match config.provider {
        WebSearchProvider::Tavily => Box::new(TavilyClient { api_key, http }),
        WebSearchProvider::Brave => Box::new(BraveClient { api_key, http }),
        WebSearchProvider::Serper => Box::new(SerperClient { api_key, http }),
        WebSearchProvider::Exa => Box::new(ExaClient { api_key, http }),
    })
}

pub struct TavilyClient {
    api_key: String,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl WebSearchClient for TavilyClient {
    async fn search(&self, query: &str, max_results: Option<u32>, topic: Option<&str>) -> Result<Value, String> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results.unwrap_or(5),
            "topic": topic.unwrap_or("general"),
        });
        let resp = self
            .http
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("tavily request failed: {e}"))?;
        parse_response(resp).await
    }
}

pub struct BraveClient {
    api_key: String,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl WebSearchClient for BraveClient {
    async fn search(&self, query: &str, max_results: Option<u32>, _topic: Option<&str>) -> Result<Value, String> {
        let resp = self
            .http
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("count", max_results.unwrap_or(5).to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("brave request failed: {e}"))?;
        parse_response(resp).await
    }
}

pub struct SerperClient {
    api_key: String,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl WebSearchClient for SerperClient {
    async fn search(&self, query: &str, max_results: Option<u32>, _topic: Option<&str>) -> Result<Value, String> {
        let body = serde_json::json!({
            "q": query,
            "num": max_results.unwrap_or(5),
        });
        let resp = self
            .http
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("serper request failed: {e}"))?;
        parse_response(resp).await
    }
}

pub struct ExaClient {
    api_key: String,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl WebSearchClient for ExaClient {
    async fn search(&self, query: &str, max_results: Option<u32>, _topic: Option<&str>) -> Result<Value, String> {
        let body = serde_json::json!({
            "query": query,
            "numResults": max_results.unwrap_or(5),
        });
        let resp = self
            .http
            .post("https://api.exa.ai/search")
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("exa request failed: {e}"))?;
        parse_response(resp).await
    }
}

async fn parse_response(resp: reqwest::Response) -> Result<Value, String> {
    let status = resp.status();
    let value: Value = resp
        .json()
        .await
        .map_err(|e| format!("failed to parse response body: {e}"))?;
    if !status.is_success() {
        return Err(format!("request failed with status {status}: {value}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_errors_on_missing_env_var() {
        let config = WebSearchConfig {
            provider: WebSearchProvider::Tavily,
            api_key_env: "DW_TEST_WEB_SEARCH_KEY_NOT_SET".into(),
        };
        std::env::remove_var("DW_TEST_WEB_SEARCH_KEY_NOT_SET");
        assert!(build_client(&config).is_err());
    }
}
