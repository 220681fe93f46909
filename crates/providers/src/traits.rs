use dw_domain::block::TurnBlock;
use dw_domain::capability::ProviderCapabilities;
use dw_domain::error::Result;
use dw_domain::stream::{BoxStream, StreamEvent};
use dw_domain::tool::ResolvedTool;
use dw_domain::turn::{RequestParams, TurnRole};

/// One turn's worth of history handed to a provider, already resolved to
/// its persisted blocks. The adapter translates this into its own wire
/// message shape (Anthropic's `content` array, OpenAI's `tool_calls`/`tool`
/// messages).
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub blocks: Vec<TurnBlock>,
}

/// A provider-agnostic request to generate (and stream) the next turn.
///
/// `history` is the root-to-leaf path the turn executor resolved via the
/// store's `GetPath`/`GetBlocksForTurns` operations; it never includes the
/// pending assistant turn being generated.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system_prompt: Option<String>,
    pub history: Vec<HistoryTurn>,
    pub tools: Vec<ResolvedTool>,
    pub params: RequestParams,
}

/// Trait every LLM adapter implements. The turn engine is streaming-only —
/// there is no non-streaming `chat()` entry point, since every assistant
/// turn is driven block-by-block through the stream hub.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Begin a streaming turn and return the event stream. The returned
    /// stream must eventually yield a terminal [`StreamEvent::Metadata`] or
    /// [`StreamEvent::Error`]; the turn executor treats either as turn end.
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// The advertised capabilities of this provider/model combination.
    fn capabilities(&self) -> &ProviderCapabilities;

    /// A unique identifier for this provider instance (its config id).
    fn provider_id(&self) -> &str;
}
