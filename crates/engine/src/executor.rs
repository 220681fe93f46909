//! Turn Executor — one instance per assistant turn, driving the provider
//! stream, the tool loop, and the terminal status transition.
//!
//! Grounded on `gateway/runtime/turn.rs`'s run loop: resolve history, call
//! the provider, fold deltas, detect `tool_use`, dispatch tools, loop back
//! into the provider with the extended history, and write a terminal status
//! with a cancel/timeout fast-exit checked between every awaited step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use uuid::Uuid;

use dw_domain::block::{BlockContent, BlockType, TurnBlock};
use dw_domain::config::EngineConfig;
use dw_domain::error::{Error, Result};
use dw_domain::stream::{DeltaType, StreamEvent};
use dw_domain::tool::{ResolvedTool, ToolCall};
use dw_domain::trace::TraceEvent;
use dw_domain::turn::{Turn, TurnMetadataUpdate, TurnStatus};
use dw_providers::registry::ProviderRegistry;
use dw_providers::traits::{ChatRequest, HistoryTurn};
use dw_store::Store;
use dw_tools::ToolDispatcher;

use crate::accumulator::{BlockAccumulator, DeltaOutcome};
use crate::cancel::{CancelRegistry, CancelToken};
use crate::event::TurnEvent;
use crate::hub::StreamHub;
use crate::registry::StreamRegistry;

/// Built-in tools every turn gets regardless of what the client declared,
/// per the document/search/web-search surface this engine ships with.
const BUILTIN_TOOL_NAMES: &[&str] = &["doc_view", "doc_tree", "doc_search"];

pub struct TurnExecutor {
    store: Arc<Store>,
    hubs: Arc<StreamRegistry>,
    providers: Arc<ProviderRegistry>,
    tools: ToolDispatcher,
    cancels: Arc<CancelRegistry>,
    config: EngineConfig,
    web_search_enabled: bool,
}

impl TurnExecutor {
    pub fn new(
        store: Arc<Store>,
        hubs: Arc<StreamRegistry>,
        providers: Arc<ProviderRegistry>,
        tools: ToolDispatcher,
        cancels: Arc<CancelRegistry>,
        config: EngineConfig,
        web_search_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hubs,
            providers,
            tools,
            cancels,
            config,
            web_search_enabled,
        })
    }

    /// Start running `turn_id` on a background task and return its cancel
    /// token immediately. `turn_id` must already exist in the store as a
    /// pending assistant turn. `system_prompt` is the caller-merged prompt
    /// (project + chat + selected skills) — this crate has no notion of
    /// those sources itself, only of assembling the final request.
    pub fn spawn(self: &Arc<Self>, turn_id: Uuid, system_prompt: Option<String>) -> CancelToken {
        let token = self.cancels.register(turn_id);
        let exec = self.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            exec.run(turn_id, system_prompt, task_token).await;
        });
        token
    }

    async fn run(&self, turn_id: Uuid, system_prompt: Option<String>, cancel: CancelToken) {
        let hub = self.hubs.get_or_create(turn_id);
        hub.publish(TurnEvent::TurnStart {
            turn_id,
            model: self.store.get_turn(turn_id).ok().and_then(|t| t.model),
        });

        if let Err(e) = self.store.update_turn_metadata(
            turn_id,
            TurnMetadataUpdate {
                status: Some(TurnStatus::Streaming),
                ..Default::default()
            },
        ) {
            self.finish_with_error(turn_id, &hub, e);
            self.cancels.remove(turn_id);
            return;
        }

        let outcome = self.drive(turn_id, system_prompt, &hub, &cancel).await;

        match outcome {
            Ok(()) => {}
            Err(e) if matches!(e, Error::Cancelled) => self.finish_cancelled(turn_id, &hub),
            Err(e) => self.finish_with_error(turn_id, &hub, e),
        }

        self.cancels.remove(turn_id);
    }

    /// The provider loop plus tool loop, as one cancel/timeout-checked
    /// unit. Returns `Ok(())` once the turn has reached `complete` and had
    /// its metadata written; any other outcome is mapped to a terminal
    /// status by the caller.
    async fn drive(
        &self,
        turn_id: Uuid,
        system_prompt: Option<String>,
        hub: &Arc<StreamHub>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(self.config.turn_timeout_secs);
        let turn = self.store.get_turn(turn_id)?;
        let provider = self.resolve_provider(&turn)?;

        let mut request = self.build_request(&turn, system_prompt)?;
        let mut iteration = 0usize;

        loop {
            let mut acc = BlockAccumulator::new();
            let request_started = Instant::now();
            let stream_result = provider.chat_stream(request.clone()).await;
            TraceEvent::ProviderRequest {
                provider: provider.provider_id().to_string(),
                model: request.params.model.clone().unwrap_or_default(),
                streaming: true,
                duration_ms: request_started.elapsed().as_millis() as u64,
            }
            .emit();
            let mut stream = stream_result?;

            let stop_reason = loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    self.persist_partials(turn_id, hub, &mut acc);
                    return Err(Error::Timeout(format!(
                        "turn exceeded {}s",
                        self.config.turn_timeout_secs
                    )));
                }

                let next = match tokio::time::timeout(remaining, stream.next()).await {
                    Err(_) => {
                        self.persist_partials(turn_id, hub, &mut acc);
                        return Err(Error::Timeout(format!(
                            "turn exceeded {}s",
                            self.config.turn_timeout_secs
                        )));
                    }
                    Ok(next) => next,
                };

                if cancel.is_cancelled() {
                    self.persist_partials(turn_id, hub, &mut acc);
                    return Err(Error::Cancelled);
                }

                let event = match next {
                    Some(event) => event?,
                    None => break "stop".to_string(),
                };

                match event {
                    StreamEvent::BlockDelta { block_index, delta_type, payload, start } => {
                        let outcome = acc.on_delta(block_index, delta_type, &payload, start);
                        if let DeltaOutcome::Started(block_type) = outcome {
                            hub.publish(TurnEvent::BlockStart {
                                block_index,
                                block_type: Some(block_type),
                            });
                        }
                        hub.publish(TurnEvent::BlockDelta {
                            block_index,
                            delta_type,
                            text_delta: matches!(delta_type, DeltaType::Text | DeltaType::Thinking)
                                .then(|| payload.clone()),
                            json_delta: matches!(delta_type, DeltaType::JsonInput).then(|| payload.clone()),
                            signature_delta: matches!(delta_type, DeltaType::Signature).then_some(payload),
                        });
                    }
                    StreamEvent::Block { block_index, block } => {
                        acc.discard(block_index);
                        let store = &self.store;
                        hub.persist_and_clear(block_index, || {
                            store.create_blocks(turn_id, vec![block]).map(|_| ())
                        })?;
                        hub.publish(TurnEvent::BlockStop { block_index });
                    }
                    StreamEvent::Metadata(meta) => {
                        self.store.update_turn_metadata(
                            turn_id,
                            TurnMetadataUpdate {
                                model: Some(meta.model),
                                input_tokens: Some(meta.input_tokens),
                                output_tokens: Some(meta.output_tokens),
                                stop_reason: Some(meta.stop_reason.clone()),
                                response_metadata: meta.response_metadata,
                                ..Default::default()
                            },
                        )?;
                        break meta.stop_reason;
                    }
                    StreamEvent::Error { category, message } => {
                        return Err(Error::Provider {
                            provider: provider.provider_id().to_string(),
                            category,
                            message,
                        });
                    }
                }
            };

            if stop_reason != "tool_use" {
                self.finish_complete(turn_id, hub);
                return Ok(());
            }

            iteration += 1;
            if iteration > self.config.max_tool_iterations {
                return Err(Error::ToolLoopExhausted(self.config.max_tool_iterations));
            }

            self.store.update_turn_metadata(
                turn_id,
                TurnMetadataUpdate {
                    status: Some(TurnStatus::WaitingTools),
                    ..Default::default()
                },
            )?;

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.run_tool_batch(turn_id, hub, cancel).await?;

            self.store.update_turn_metadata(
                turn_id,
                TurnMetadataUpdate {
                    status: Some(TurnStatus::Streaming),
                    ..Default::default()
                },
            )?;

            request = self.build_request(&self.store.get_turn(turn_id)?, request.system_prompt.clone())?;
        }
    }

    /// Execute every unmatched client-side `tool_use` block on this turn,
    /// in sequence order, appending a `tool_result` block for each.
    async fn run_tool_batch(&self, turn_id: Uuid, hub: &Arc<StreamHub>, cancel: &CancelToken) -> Result<()> {
        let blocks = self.store.get_blocks(turn_id)?;
        let answered: std::collections::HashSet<&str> = blocks
            .iter()
            .filter(|b| b.block_type == BlockType::ToolResult)
            .filter_map(|b| b.content.tool_use_id.as_deref())
            .collect();

        let pending: Vec<&TurnBlock> = blocks
            .iter()
            .filter(|b| b.block_type == BlockType::ToolUse)
            .filter(|b| {
                b.content
                    .tool_use_id
                    .as_deref()
                    .is_some_and(|id| !answered.contains(id))
            })
            .collect();

        for block in pending {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let call = ToolCall {
                tool_use_id: block.content.tool_use_id.clone().unwrap_or_default(),
                tool_name: block.content.tool_name.clone().unwrap_or_default(),
                input: block.content.tool_input.clone().unwrap_or_default(),
            };

            let dispatch_started = Instant::now();
            let result = match tokio::time::timeout(
                Duration::from_secs(self.config.tool_timeout_secs),
                self.tools.dispatch(&call),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => dw_domain::tool::ToolResult {
                    tool_use_id: call.tool_use_id.clone(),
                    is_error: true,
                    content: format!("tool '{}' timed out", call.tool_name),
                },
            };
            TraceEvent::ToolDispatched {
                tool_name: call.tool_name.clone(),
                turn_id: turn_id.to_string(),
                duration_ms: dispatch_started.elapsed().as_millis() as u64,
                is_error: result.is_error,
            }
            .emit();

            let result_block = TurnBlock {
                turn_id,
                sequence: 0,
                block_type: BlockType::ToolResult,
                text_content: Some(result.content.clone()),
                content: BlockContent {
                    tool_use_id: Some(result.tool_use_id.clone()),
                    is_error: Some(result.is_error),
                    ..Default::default()
                },
                provider_data: None,
                execution_side: Some(dw_domain::block::ExecutionSide::Client),
            };

            let stored = self.store.create_blocks(turn_id, vec![result_block])?;
            // Tool results never stream incrementally — synthesize the same
            // start/delta/stop sequence a reconnecting client would get from
            // the catch-up serializer, so live and replayed viewers agree.
            for b in &stored {
                for event in crate::catchup::serialize_block(b) {
                    hub.publish(event);
                }
            }
        }

        Ok(())
    }

    fn resolve_provider(&self, turn: &Turn) -> Result<Arc<dyn dw_providers::traits::LlmProvider>> {
        let provider_id = turn
            .model
            .as_deref()
            .ok_or_else(|| Error::Validation("turn has no provider id set".into()))?;
        self.providers
            .get(provider_id)
            .ok_or_else(|| Error::NotFound(format!("provider '{provider_id}'")))
    }

    /// Load the ancestor path, flatten it into provider history, merge tool
    /// schemas, and assemble the request. Called once up front and again
    /// before every re-invocation in the tool loop, since the freshly
    /// appended `tool_result` blocks must be visible to the next call.
    fn build_request(&self, turn: &Turn, system_prompt: Option<String>) -> Result<ChatRequest> {
        let anchor = turn.prev_turn_id.unwrap_or(turn.id);
        let path = self.store.get_path(anchor)?;
        let turn_ids: Vec<Uuid> = path.iter().map(|t| t.id).collect();
        let mut blocks_by_turn = self.store.get_blocks_for_turns(&turn_ids);

        // This turn's own in-progress blocks (tool_use/tool_result appended
        // across tool-loop iterations) aren't on the ancestor path yet.
        let own_blocks = self.store.get_blocks(turn.id).unwrap_or_default();

        let mut history: Vec<HistoryTurn> = path
            .iter()
            .map(|t| HistoryTurn {
                role: t.role,
                blocks: blocks_by_turn.remove(&t.id).unwrap_or_default(),
            })
            .collect();

        if !own_blocks.is_empty() {
            history.push(HistoryTurn {
                role: turn.role,
                blocks: own_blocks,
            });
        }

        let params = turn.request_params.clone().unwrap_or_default();
        let tools = self.merge_tools(&params.tools);

        Ok(ChatRequest {
            system_prompt,
            history,
            tools,
            params,
        })
    }

    /// The union of the built-in document tools (plus web_search, if
    /// configured) and whatever the client declared, client declarations
    /// taking precedence on a name collision.
    fn merge_tools(&self, declared: &[dw_domain::tool::ToolDefinition]) -> Vec<ResolvedTool> {
        let mut merged: HashMap<String, ResolvedTool> = HashMap::new();

        for name in BUILTIN_TOOL_NAMES {
            if let Some(resolved) = dw_domain::tool::catalog::lookup(name) {
                merged.insert(name.to_string(), resolved);
            }
        }
        if self.web_search_enabled {
            if let Some(resolved) = dw_domain::tool::catalog::lookup("web_search") {
                merged.insert("web_search".to_string(), resolved);
            }
        }

        for def in declared {
            if let Some(resolved) = def.resolve() {
                merged.insert(def.name().to_string(), resolved);
            }
        }

        merged.into_values().collect()
    }

    fn persist_partials(&self, turn_id: Uuid, hub: &Arc<StreamHub>, acc: &mut BlockAccumulator) {
        for (index, block) in acc.snapshot_incomplete() {
            if !block.has_content() {
                continue;
            }
            let store = &self.store;
            let persisted = hub.persist_and_clear(index, || {
                store.create_blocks(turn_id, vec![block]).map(|_| ())
            });
            if persisted.is_ok() {
                hub.publish(TurnEvent::BlockStop { block_index: index });
            }
        }
    }

    fn finish_complete(&self, turn_id: Uuid, hub: &Arc<StreamHub>) {
        let update = self.store.update_turn_metadata(
            turn_id,
            TurnMetadataUpdate {
                status: Some(TurnStatus::Complete),
                mark_completed: true,
                ..Default::default()
            },
        );
        hub.mark_status(crate::hub::HubStatus::Completed);
        match update {
            Ok(turn) => hub.publish(TurnEvent::TurnComplete {
                turn_id,
                stop_reason: turn.stop_reason.unwrap_or_default(),
                input_tokens: turn.input_tokens.unwrap_or(0),
                output_tokens: turn.output_tokens.unwrap_or(0),
                response_metadata: turn.response_metadata,
            }),
            Err(e) => hub.publish(TurnEvent::TurnError {
                turn_id,
                error: e.to_string(),
                is_cancelled: false,
                last_block_index: None,
            }),
        };
    }

    fn finish_cancelled(&self, turn_id: Uuid, hub: &Arc<StreamHub>) {
        let _ = self.store.update_turn_metadata(
            turn_id,
            TurnMetadataUpdate {
                status: Some(TurnStatus::Cancelled),
                mark_completed: true,
                ..Default::default()
            },
        );
        hub.mark_status(crate::hub::HubStatus::Completed);
        hub.publish(TurnEvent::TurnError {
            turn_id,
            error: "turn was cancelled".into(),
            is_cancelled: true,
            last_block_index: None,
        });
    }

    fn finish_with_error(&self, turn_id: Uuid, hub: &Arc<StreamHub>, error: Error) {
        let message = error.to_string();
        let _ = self.store.update_turn_metadata(
            turn_id,
            TurnMetadataUpdate {
                status: Some(TurnStatus::Error),
                mark_completed: true,
                response_metadata: Some(serde_json::json!({ "error": message })),
                ..Default::default()
            },
        );
        hub.mark_status(crate::hub::HubStatus::Errored);
        hub.publish(TurnEvent::TurnError {
            turn_id,
            error: message,
            is_cancelled: false,
            last_block_index: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dw_domain::config::{AuthConfig, LlmConfig, ProviderConfig, ProviderKind};
    use dw_providers::registry::ProviderRegistry;
    use dw_tools::documents::FsDocumentService;
    use dw_tools::search::FsSearchService;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn lorem_registry(word_count: &str) -> Arc<ProviderRegistry> {
        let cfg = LlmConfig {
            default_timeout_ms: 1000,
            startup_policy: Default::default(),
            providers: vec![ProviderConfig {
                id: "lorem".into(),
                kind: ProviderKind::Lorem,
                base_url: String::new(),
                auth: AuthConfig::default(),
                default_model: Some(word_count.into()),
            }],
        };
        Arc::new(ProviderRegistry::from_config(&cfg).unwrap())
    }

    fn executor(tmp: &TempDir, word_count: &str) -> (Arc<TurnExecutor>, Arc<Store>) {
        let store = Arc::new(Store::open(tmp.path()).unwrap());
        let hubs = StreamRegistry::new(1000);
        let providers = lorem_registry(word_count);
        let docs = Arc::new(FsDocumentService::new(tmp.path().to_path_buf(), 5));
        let search = Arc::new(FsSearchService::new(tmp.path().to_path_buf(), 25));
        let tools = ToolDispatcher::new(docs, search, None);
        let cancels = CancelRegistry::new();
        let exec = TurnExecutor::new(
            store.clone(),
            hubs,
            providers,
            tools,
            cancels,
            EngineConfig {
                turn_timeout_secs: 5,
                ..Default::default()
            },
            false,
        );
        (exec, store)
    }

    fn seeded_turn(store: &Store) -> Uuid {
        let chat = store.create_chat(dw_domain::chat::Chat::new(Uuid::new_v4(), Uuid::new_v4())).unwrap();
        let user_turn = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        store
            .create_blocks(user_turn.id, vec![TurnBlock::text(user_turn.id, 0, "hello")])
            .unwrap();
        let mut assistant = Turn::new_assistant_pending(chat.id, Some(user_turn.id), Some("lorem".into()));
        assistant.request_params = Some(Default::default());
        store.create_turn(assistant).unwrap().id
    }

    #[tokio::test]
    async fn simple_text_turn_completes() {
        let tmp = TempDir::new().unwrap();
        let (exec, store) = executor(&tmp, "3");
        let turn_id = seeded_turn(&store);

        let token = exec.spawn(turn_id, Some("be terse".into()));
        assert!(!token.is_cancelled());

        for _ in 0..50 {
            if store.get_turn(turn_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let turn = store.get_turn(turn_id).unwrap();
        assert_eq!(turn.status, TurnStatus::Complete);
        let blocks = store.get_blocks(turn_id).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_type, BlockType::Text);
    }

    #[tokio::test]
    async fn unknown_provider_errors_the_turn() {
        let tmp = TempDir::new().unwrap();
        let (exec, store) = executor(&tmp, "3");
        let chat = store.create_chat(dw_domain::chat::Chat::new(Uuid::new_v4(), Uuid::new_v4())).unwrap();
        let user_turn = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let assistant = Turn::new_assistant_pending(chat.id, Some(user_turn.id), Some("nonexistent".into()));
        let turn_id = store.create_turn(assistant).unwrap().id;

        exec.spawn(turn_id, None);

        for _ in 0..50 {
            if store.get_turn(turn_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let turn = store.get_turn(turn_id).unwrap();
        assert_eq!(turn.status, TurnStatus::Error);
        assert!(turn.response_metadata.unwrap()["error"].as_str().unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    async fn cancelling_before_stream_starts_marks_turn_cancelled() {
        let tmp = TempDir::new().unwrap();
        let (exec, store) = executor(&tmp, "500");
        let turn_id = seeded_turn(&store);

        let token = exec.spawn(turn_id, None);
        token.cancel();

        for _ in 0..100 {
            if store.get_turn(turn_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let turn = store.get_turn(turn_id).unwrap();
        assert_eq!(turn.status, TurnStatus::Cancelled);
    }
}
