use serde::Serialize;

/// Structured domain events emitted across the turn engine, distinct from
/// human-readable `tracing` log lines — these are the events an analytics
/// or debugging consumer would want to subscribe to independent of log
/// formatting.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnCreated {
        chat_id: String,
        turn_id: String,
        role: String,
    },
    TurnStatusChanged {
        turn_id: String,
        from: String,
        to: String,
    },
    BlockPersisted {
        turn_id: String,
        sequence: u32,
        block_type: String,
    },
    HubCreated {
        turn_id: String,
    },
    HubEvicted {
        turn_id: String,
        reason: String,
    },
    CatchupServed {
        turn_id: String,
        last_event_id: Option<u64>,
        replayed_blocks: usize,
        buffered_events: usize,
    },
    ToolDispatched {
        tool_name: String,
        turn_id: String,
        duration_ms: u64,
        is_error: bool,
    },
    ProviderRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "engine_event");
    }
}
