//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract.

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

/// Block index reserved for the assistant's running text content. Tool
/// calls each get `tool_call_index + TEXT_BLOCK_RESERVED`, since OpenAI's
/// `delta.tool_calls[].index` starts at 0 and would otherwise collide.
const TEXT_BLOCK_RESERVED: u32 = 1;

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: ProviderCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into());

        let capabilities = ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            thinking: false,
            server_side_tools: false,
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
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.params
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(ref system) = req.system_prompt {
            if !system.is_empty() {
                messages.push(serde_json::json!({"role": "system", "content": system}));
            }
        }
        for turn in &req.history {
            messages.extend(turn_to_openai(turn));
        }

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.params.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = req.params.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max) = req.params.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if !req.params.stop.is_empty() {
            body["stop"] = serde_json::json!(req.params.stop);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn turn_to_openai(turn: &HistoryTurn) -> Vec<Value> {
    match turn.role {
        TurnRole::User => vec![user_turn_to_openai(turn)],
        TurnRole::Assistant => assistant_turn_to_openai(turn),
    }
}

fn user_turn_to_openai(turn: &HistoryTurn) -> Value {
    // Tool results on a user turn become separate `role: tool` messages
    // ahead of the user's own text, matching OpenAI's flat message list.
    let text: String = turn
        .blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Text)
        .filter_map(|b| b.text_content.clone())
        .collect::<Vec<_>>()
        .join("\n");
    serde_json::json!({"role": "user", "content": text})
}

fn assistant_turn_to_openai(turn: &HistoryTurn) -> Vec<Value> {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut tool_results: Vec<Value> = Vec::new();

    for block in &turn.blocks {
        match block.block_type {
            BlockType::Text => {
                if let Some(t) = &block.text_content {
                    text_parts.push(t.clone());
                }
            }
            BlockType::ToolUse => {
                tool_calls.push(serde_json::json!({
                    "id": block.content.tool_use_id.clone().unwrap_or_default(),
                    "type": "function",
                    "function": {
                        "name": block.content.tool_name.clone().unwrap_or_default(),
                        "arguments": block
                            .content
                            .tool_input
                            .clone()
                            .unwrap_or(Value::Object(Default::default()))
                            .to_string(),
                    }
                }));
            }
            BlockType::ToolResult => {
                tool_results.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": block.content.tool_use_id.clone().unwrap_or_default(),
                    "content": block.text_content.clone().unwrap_or_default(),
                }));
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    let mut assistant_msg = serde_json::json!({"role": "assistant"});
    assistant_msg["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        assistant_msg["tool_calls"] = Value::Array(tool_calls);
    }
    out.push(assistant_msg);
    out.extend(tool_results);
    out
}

fn tool_to_openai(tool: &ResolvedTool) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.schema.name,
            "description": tool.schema.description,
            "parameters": tool.schema.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ToolAcc {
    tool_use_id: String,
    tool_name: String,
    json_buf: String,
    started: bool,
}

struct StreamState {
    model: String,
    text_started: bool,
    tool_calls: HashMap<u32, ToolAcc>,
    input_tokens: u32,
    output_tokens: u32,
    terminal_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            model: String::new(),
            text_started: false,
            tool_calls: HashMap::new(),
            input_tokens: 0,
            output_tokens: 0,
            terminal_emitted: false,
        }
    }
}

fn parse_openai_usage(v: &Value) -> (u32, u32) {
    let prompt = v.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let completion = v.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    (prompt, completion)
}

fn parse_sse_data(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    if data.trim() == "[DONE]" {
        if !state.terminal_emitted {
            state.terminal_emitted = true;
            events.push(Ok(StreamEvent::Metadata(StreamMetadata {
                stop_reason: "stop".into(),
                input_tokens: state.input_tokens,
                output_tokens: state.output_tokens,
                response_metadata: None,
                model: state.model.clone(),
            })));
        }
        return events;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    if let Some(model) = v.get("model").and_then(|v| v.as_str()) {
        state.model = model.to_string();
    }

    if let Some(usage) = v.get("usage") {
        let (prompt, completion) = parse_openai_usage(usage);
        state.input_tokens = prompt;
        state.output_tokens = completion;
    }

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    let Some(choice) = choice else { return events };
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            let start = if !state.text_started {
                state.text_started = true;
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
            events.push(Ok(StreamEvent::BlockDelta {
                block_index: 0,
                delta_type: DeltaType::Text,
                payload: text.to_string(),
                start,
            }));
        }
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let block_index = idx + TEXT_BLOCK_RESERVED;

            let id = tc.get("id").and_then(|v| v.as_str());
            let name = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str());

            if id.is_some() || name.is_some() {
                let entry = state.tool_calls.entry(idx).or_insert_with(|| ToolAcc {
                    tool_use_id: id.unwrap_or_default().to_string(),
                    tool_name: name.unwrap_or_default().to_string(),
                    json_buf: String::new(),
                    started: false,
                });
                if !entry.started {
                    entry.started = true;
                    events.push(Ok(StreamEvent::BlockDelta {
                        block_index,
                        delta_type: DeltaType::JsonInput,
                        payload: String::new(),
                        start: Some(BlockStartMeta {
                            block_type: BlockType::ToolUse,
                            tool_use_id: Some(entry.tool_use_id.clone()),
                            tool_name: Some(entry.tool_name.clone()),
                            execution_side: Some(ExecutionSide::Client),
                            provider_data: None,
                        }),
                    }));
                }
            }

            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                if let Some(entry) = state.tool_calls.get_mut(&idx) {
                    entry.json_buf.push_str(args);
                }
                events.push(Ok(StreamEvent::BlockDelta {
                    block_index,
                    delta_type: DeltaType::JsonInput,
                    payload: args.to_string(),
                    start: None,
                }));
            }
        }
    }

    if let Some(finish_reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        // Finalize any still-open tool call blocks.
        let finished: Vec<u32> = state.tool_calls.keys().copied().collect();
        for idx in finished {
            if let Some(acc) = state.tool_calls.remove(&idx) {
                let tool_input = serde_json::from_str(&acc.json_buf).ok();
                let block = TurnBlock {
                    turn_id: Uuid::nil(),
                    sequence: idx + TEXT_BLOCK_RESERVED,
                    block_type: BlockType::ToolUse,
                    text_content: None,
                    content: BlockContent {
                        tool_use_id: Some(acc.tool_use_id),
                        tool_name: Some(acc.tool_name),
                        tool_input,
                        ..BlockContent::default()
                    },
                    provider_data: None,
                    execution_side: Some(ExecutionSide::Client),
                };
                events.push(Ok(StreamEvent::Block {
                    block_index: idx + TEXT_BLOCK_RESERVED,
                    block,
                }));
            }
        }

        state.terminal_emitted = true;
        events.push(Ok(StreamEvent::Metadata(StreamMetadata {
            stop_reason: normalize_finish_reason(finish_reason),
            input_tokens: state.input_tokens,
            output_tokens: state.output_tokens,
            response_metadata: None,
            model: state.model.clone(),
        })));
    }

    events
}

fn normalize_finish_reason(raw: &str) -> String {
    match raw {
        "stop" => "stop".into(),
        "tool_calls" => "tool_use".into(),
        "length" => "max_tokens".into(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);
        let provider_id = self.id.clone();

        tracing::debug!(provider = %self.id, url = %url, "openai_compat stream request");

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
            parse_sse_data(data, &mut state)
        }))
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
