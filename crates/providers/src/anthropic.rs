//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API streaming contract: content block
//! start/delta/stop events are translated into the engine's block-centric
//! [`StreamEvent`] vocabulary, with system messages lifted into the
//! top-level `system` field the way Anthropic's wire format requires.

use crate::traits::{ChatRequest, HistoryTurn, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};
use dw_domain::block::{BlockContent, BlockType, ExecutionSide, TurnBlock};
use dw_domain::capability::ProviderCapabilities;
use dw_domain::config::ProviderConfig;
use dw_domain::error::{Error, ProviderErrorCategory, Result};
use dw_domain::stream::{BlockStartMeta, BoxStream, DeltaType, StreamEvent, StreamMetadata};
use dw_domain::tool::ResolvedTool;
use dw_domain::turn::TurnRole;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: ProviderCapabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-20250514".into());

        let capabilities = ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            thinking: true,
            server_side_tools: true,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            capabilities,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let model = req
            .params
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let api_messages: Vec<Value> = req.history.iter().map(turn_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": true,
        });

        if let Some(ref system) = req.system_prompt {
            if !system.is_empty() {
                body["system"] = Value::String(system.clone());
            }
        }

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
            body["tools"] = Value::Array(tools);
        }

        if let Some(temp) = req.params.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = req.params.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(top_k) = req.params.top_k {
            body["top_k"] = serde_json::json!(top_k);
        }
        if !req.params.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(req.params.stop);
        }
        if req.params.thinking_enabled {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": thinking_budget(req.params.thinking_level.as_deref()),
            });
        }
        let max_tokens = req.params.max_tokens.unwrap_or(4096);
        body["max_tokens"] = serde_json::json!(max_tokens);

        body
    }
}

fn thinking_budget(level: Option<&str>) -> u32 {
    match level {
        Some("low") => 2_048,
        Some("high") => 32_000,
        _ => 8_000,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn turn_to_anthropic(turn: &HistoryTurn) -> Value {
    let role = match turn.role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
    };

    let content: Vec<Value> = turn
        .blocks
        .iter()
        .filter_map(block_to_anthropic_content)
        .collect();

    serde_json::json!({
        "role": role,
        "content": content,
    })
}

fn block_to_anthropic_content(block: &TurnBlock) -> Option<Value> {
    match block.block_type {
        BlockType::Text | BlockType::Reference | BlockType::PartialReference => {
            let text = block.text_content.clone().unwrap_or_default();
            if text.is_empty() {
                return None;
            }
            Some(serde_json::json!({"type": "text", "text": text}))
        }
        BlockType::Thinking => {
            let text = block.text_content.clone().unwrap_or_default();
            Some(serde_json::json!({
                "type": "thinking",
                "thinking": text,
                "signature": block.content.signature.clone().unwrap_or_default(),
            }))
        }
        BlockType::ToolUse => Some(serde_json::json!({
            "type": "tool_use",
            "id": block.content.tool_use_id.clone().unwrap_or_default(),
            "name": block.content.tool_name.clone().unwrap_or_default(),
            "input": block.content.tool_input.clone().unwrap_or(Value::Object(Default::default())),
        })),
        BlockType::ToolResult => Some(serde_json::json!({
            "type": "tool_result",
            "tool_use_id": block.content.tool_use_id.clone().unwrap_or_default(),
            "content": block.text_content.clone().unwrap_or_default(),
            "is_error": block.content.is_error.unwrap_or(false),
        })),
        BlockType::Image => Some(serde_json::json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": block.content.media_type.clone().unwrap_or_else(|| "image/png".into()),
                "data": block.content.image_url.clone().unwrap_or_default(),
            }
        })),
        BlockType::WebSearchUse | BlockType::WebSearchResult => None,
    }
}

fn tool_to_anthropic(tool: &ResolvedTool) -> Value {
    serde_json::json!({
        "name": tool.schema.name,
        "description": tool.schema.description,
        "input_schema": tool.schema.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-block-index accumulator the adapter keeps so it can finalize a full
/// [`TurnBlock`] on `content_block_stop`. `turn_id` and `sequence` are
/// placeholders — the block accumulator stamps the real values when it
/// persists the block.
struct BlockAcc {
    block_type: BlockType,
    tool_use_id: Option<String>,
    tool_name: Option<String>,
    execution_side: Option<ExecutionSide>,
    text: String,
    json_buf: String,
    signature: String,
}

struct StreamState {
    blocks: HashMap<u32, BlockAcc>,
    model: String,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<String>,
    terminal_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            terminal_emitted: false,
        }
    }
}

fn anthropic_block_type(wire_type: &str) -> (BlockType, Option<ExecutionSide>) {
    match wire_type {
        "text" => (BlockType::Text, Some(ExecutionSide::Server)),
        "thinking" => (BlockType::Thinking, Some(ExecutionSide::Server)),
        "tool_use" => (BlockType::ToolUse, Some(ExecutionSide::Client)),
        "server_tool_use" => (BlockType::WebSearchUse, Some(ExecutionSide::Server)),
        "web_search_tool_result" => (BlockType::WebSearchResult, Some(ExecutionSide::Server)),
        _ => (BlockType::Text, Some(ExecutionSide::Server)),
    }
}

fn categorize_anthropic_error(error_type: &str) -> ProviderErrorCategory {
    match error_type {
        "rate_limit_error" => ProviderErrorCategory::RateLimit,
        "authentication_error" | "permission_error" => ProviderErrorCategory::Auth,
        "invalid_request_error" => ProviderErrorCategory::InvalidRequest,
        "overloaded_error" => ProviderErrorCategory::Overloaded,
        "api_error" => ProviderErrorCategory::Transient,
        _ => ProviderErrorCategory::Fatal,
    }
}

fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match event_type {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.model = msg
                    .get("model")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if let Some(usage) = msg.get("usage") {
                    state.input_tokens = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                }
            }
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            if let Some(block) = v.get("content_block") {
                let wire_type = block.get("type").and_then(|v| v.as_str()).unwrap_or("text");
                let (block_type, execution_side) = anthropic_block_type(wire_type);

                let tool_use_id = block.get("id").and_then(|v| v.as_str()).map(String::from);
                let tool_name = block.get("name").and_then(|v| v.as_str()).map(String::from);

                state.blocks.insert(
                    idx,
                    BlockAcc {
                        block_type,
                        tool_use_id: tool_use_id.clone(),
                        tool_name: tool_name.clone(),
                        execution_side,
                        text: String::new(),
                        json_buf: String::new(),
                        signature: String::new(),
                    },
                );

                let delta_type = match block_type {
                    BlockType::ToolUse | BlockType::WebSearchUse => DeltaType::JsonInput,
                    BlockType::Thinking => DeltaType::Thinking,
                    _ => DeltaType::Text,
                };

                events.push(Ok(StreamEvent::BlockDelta {
                    block_index: idx,
                    delta_type,
                    payload: String::new(),
                    start: Some(BlockStartMeta {
                        block_type,
                        tool_use_id,
                        tool_name,
                        execution_side,
                        provider_data: None,
                    }),
                }));
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            if let Some(delta) = v.get("delta") {
                let delta_type = delta.get("type").and_then(|v| v.as_str()).unwrap_or("");
                let acc = state.blocks.get_mut(&idx);

                match delta_type {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                            if let Some(acc) = acc {
                                acc.text.push_str(text);
                            }
                            events.push(Ok(StreamEvent::BlockDelta {
                                block_index: idx,
                                delta_type: DeltaType::Text,
                                payload: text.to_string(),
                                start: None,
                            }));
                        }
                    }
                    "thinking_delta" => {
                        if let Some(text) = delta.get("thinking").and_then(|v| v.as_str()) {
                            if let Some(acc) = acc {
                                acc.text.push_str(text);
                            }
                            events.push(Ok(StreamEvent::BlockDelta {
                                block_index: idx,
                                delta_type: DeltaType::Thinking,
                                payload: text.to_string(),
                                start: None,
                            }));
                        }
                    }
                    "signature_delta" => {
                        if let Some(sig) = delta.get("signature").and_then(|v| v.as_str()) {
                            if let Some(acc) = acc {
                                acc.signature.push_str(sig);
                            }
                            events.push(Ok(StreamEvent::BlockDelta {
                                block_index: idx,
                                delta_type: DeltaType::Signature,
                                payload: sig.to_string(),
                                start: None,
                            }));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                            if let Some(acc) = acc {
                                acc.json_buf.push_str(partial);
                            }
                            events.push(Ok(StreamEvent::BlockDelta {
                                block_index: idx,
                                delta_type: DeltaType::JsonInput,
                                payload: partial.to_string(),
                                start: None,
                            }));
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            if let Some(acc) = state.blocks.remove(&idx) {
                let block = finalize_block(idx, acc);
                events.push(Ok(StreamEvent::Block {
                    block_index: idx,
                    block,
                }));
            }
        }

        "message_delta" => {
            if let Some(usage) = v.get("usage") {
                if let Some(out) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
                    state.output_tokens = out as u32;
                }
            }
            if let Some(sr) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
            {
                state.stop_reason = Some(normalize_stop_reason(sr));
            }
        }

        "message_stop" => {
            state.terminal_emitted = true;
            events.push(Ok(StreamEvent::Metadata(StreamMetadata {
                stop_reason: state.stop_reason.clone().unwrap_or_else(|| "stop".into()),
                input_tokens: state.input_tokens,
                output_tokens: state.output_tokens,
                response_metadata: None,
                model: state.model.clone(),
            })));
        }

        "error" => {
            let error_obj = v.get("error");
            let error_type = error_obj
                .and_then(|e| e.get("type"))
                .and_then(|v| v.as_str())
                .unwrap_or("api_error");
            let msg = error_obj
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            state.terminal_emitted = true;
            events.push(Ok(StreamEvent::Error {
                category: categorize_anthropic_error(error_type),
                message: msg.to_string(),
            }));
        }

        _ => {
            // ping, or unknown future event types.
        }
    }

    events
}

fn normalize_stop_reason(raw: &str) -> String {
    match raw {
        "end_turn" => "stop".into(),
        "tool_use" => "tool_use".into(),
        "max_tokens" => "max_tokens".into(),
        other => other.to_string(),
    }
}

fn finalize_block(idx: u32, acc: BlockAcc) -> TurnBlock {
    let text_content = match acc.block_type {
        BlockType::Text | BlockType::Thinking | BlockType::Reference | BlockType::PartialReference => {
            if acc.text.is_empty() { None } else { Some(acc.text) }
        }
        _ => None,
    };

    let tool_input = if matches!(acc.block_type, BlockType::ToolUse | BlockType::WebSearchUse) && !acc.json_buf.is_empty() {
        serde_json::from_str(&acc.json_buf).ok()
    } else {
        None
    };

    let content = BlockContent {
        tool_use_id: acc.tool_use_id,
        tool_name: acc.tool_name,
        tool_input,
        signature: if acc.signature.is_empty() { None } else { Some(acc.signature) },
        ..BlockContent::default()
    };

    TurnBlock {
        turn_id: Uuid::nil(),
        sequence: idx,
        block_type: acc.block_type,
        text_content,
        content,
        provider_data: None,
        execution_side: acc.execution_side,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req);
        let provider_id = self.id.clone();

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: provider_id,
                category: ProviderErrorCategory::Transient,
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
