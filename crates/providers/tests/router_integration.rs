//! Integration tests for provider registry construction and the lorem mock
//! provider's streaming contract, exercised from outside the crate.
//!
//! Requires the `testing` feature (the lorem provider kind is compiled out
//! otherwise), so the whole file is gated on it.
#![cfg(feature = "testing")]

use dw_domain::config::{AuthConfig, LlmConfig, LlmStartupPolicy, ProviderConfig, ProviderKind};
use dw_domain::stream::StreamEvent;
use dw_providers::registry::ProviderRegistry;
use dw_providers::traits::ChatRequest;
use futures_util::StreamExt;

fn lorem_provider(id: &str, word_count: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        id: id.into(),
        kind: ProviderKind::Lorem,
        base_url: String::new(),
        auth: AuthConfig::default(),
        default_model: word_count.map(String::from),
    }
}

#[test]
fn registry_initializes_lorem_providers_without_credentials() {
    let config = LlmConfig {
        providers: vec![lorem_provider("a", None), lorem_provider("b", Some("3"))],
        ..LlmConfig::default()
    };
    let registry = ProviderRegistry::from_config(&config).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.list_providers(), vec!["a".to_string(), "b".to_string()]);
    assert!(registry.init_errors().is_empty());
}

#[test]
fn require_one_policy_fails_closed_when_all_providers_fail() {
    // An openai_compat provider with no base_url fails to initialize; with
    // no lorem fallback and `RequireOne`, the whole registry build errors.
    let config = LlmConfig {
        startup_policy: LlmStartupPolicy::RequireOne,
        providers: vec![ProviderConfig {
            id: "broken".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: String::new(),
            auth: AuthConfig::default(),
            default_model: None,
        }],
        ..LlmConfig::default()
    };
    assert!(ProviderRegistry::from_config(&config).is_err());
}

#[tokio::test]
async fn registered_lorem_provider_streams_through_the_trait_object() {
    let config = LlmConfig {
        providers: vec![lorem_provider("lorem", Some("4"))],
        ..LlmConfig::default()
    };
    let registry = ProviderRegistry::from_config(&config).unwrap();
    let provider = registry.get("lorem").expect("lorem provider registered");

    let mut stream = provider
        .chat_stream(ChatRequest::default())
        .await
        .unwrap();

    let mut deltas = 0;
    let mut got_metadata = false;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::BlockDelta { .. } => deltas += 1,
            StreamEvent::Metadata(m) => {
                got_metadata = true;
                assert_eq!(m.output_tokens, 4);
            }
            _ => {}
        }
    }
    assert_eq!(deltas, 4);
    assert!(got_metadata);
}
