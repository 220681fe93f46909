//! Deterministic, no-network mock provider.
//!
//! Exists only so integration tests can drive the full turn executor — block
//! accumulator, stream hub, store — without a real LLM credential. Never
//! registered outside the `testing` feature; `Config::validate` still
//! exempts it from the URL/credential checks other provider kinds require,
//! since a lorem entry in a shared config file shouldn't need either.

use crate::traits::{ChatRequest, LlmProvider};
use dw_domain::block::{BlockContent, BlockType, ExecutionSide, TurnBlock};
use dw_domain::capability::ProviderCapabilities;
use dw_domain::config::ProviderConfig;
use dw_domain::error::Result;
use dw_domain::stream::{BlockStartMeta, BoxStream, DeltaType, StreamEvent, StreamMetadata};
use uuid::Uuid;

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
];

pub struct LoremProvider {
    id: String,
    capabilities: ProviderCapabilities,
    /// Word count of the canned response, derived from `default_model` so
    /// tests can vary output length without a new config field (e.g.
    /// `default_model = "12"` streams 12 words).
    word_count: usize,
}

impl LoremProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let word_count = cfg
            .default_model
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(24);

        Ok(Self {
            id: cfg.id.clone(),
            capabilities: ProviderCapabilities {
                streaming: true,
                tool_calling: false,
                thinking: false,
                server_side_tools: false,
            },
            word_count,
        })
    }

    fn canned_text(&self) -> String {
        (0..self.word_count)
            .map(|i| LOREM_WORDS[i % LOREM_WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait::async_trait]
impl LlmProvider for LoremProvider {
    async fn chat_stream(
        &self,
        _req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let text = self.canned_text();
        let words: Vec<String> = text.split(' ').map(String::from).collect();
        let model = self.id.clone();

        let stream = async_stream::stream! {
            for (i, word) in words.iter().enumerate() {
                let payload = if i == 0 { word.clone() } else { format!(" {word}") };
                let start = if i == 0 {
                    Some(BlockStartMeta {
                        block_type: BlockType::Text,
                        tool_use_id: None,
                        tool_name: None,
                        execution_side: Some(ExecutionSide::Server),
                        provider_data: None,
                    })
                } else {
                    None
                };
                yield Ok(StreamEvent::BlockDelta {
                    block_index: 0,
                    delta_type: DeltaType::Text,
                    payload,
                    start,
                });
            }

            yield Ok(StreamEvent::Block {
                block_index: 0,
                block: TurnBlock {
                    turn_id: Uuid::nil(),
                    sequence: 0,
                    block_type: BlockType::Text,
                    text_content: Some(text.clone()),
                    content: BlockContent::default(),
                    provider_data: None,
                    execution_side: Some(ExecutionSide::Server),
                },
            });

            yield Ok(StreamEvent::Metadata(StreamMetadata {
                stop_reason: "stop".into(),
                input_tokens: 8,
                output_tokens: words.len() as u32,
                response_metadata: None,
                model,
            }));
        };

        Ok(Box::pin(stream))
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn cfg(word_count: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: "lorem".into(),
            kind: dw_domain::config::ProviderKind::Lorem,
            base_url: String::new(),
            auth: Default::default(),
            default_model: word_count.map(String::from),
        }
    }

    #[tokio::test]
    async fn streams_requested_word_count() {
        let provider = LoremProvider::from_config(&cfg(Some("5"))).unwrap();
        let mut stream = provider.chat_stream(ChatRequest::default()).await.unwrap();

        let mut text_deltas = 0;
        let mut saw_metadata = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::BlockDelta { .. } => text_deltas += 1,
                StreamEvent::Metadata(m) => {
                    saw_metadata = true;
                    assert_eq!(m.output_tokens, 5);
                }
                _ => {}
            }
        }
        assert_eq!(text_deltas, 5);
        assert!(saw_metadata);
    }

    #[tokio::test]
    async fn default_word_count_is_24() {
        let provider = LoremProvider::from_config(&cfg(None)).unwrap();
        assert_eq!(provider.word_count, 24);
    }
}
