use serde::{Deserialize, Serialize};

/// Tunables for the turn executor, stream hub, and registry. Defaults match
/// the sane-default values called out in the design notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long an idle terminal hub is kept around before the registry
    /// sweeper evicts it, in seconds.
    #[serde(default = "d_retention_secs")]
    pub hub_retention_secs: u64,
    /// Rolling event buffer size per hub.
    #[serde(default = "d_buffer_size")]
    pub hub_buffer_size: usize,
    #[serde(default = "d_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Fail-safe wall-clock budget for a single turn, in seconds.
    #[serde(default = "d_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    /// Per-tool-call timeout, in seconds.
    #[serde(default = "d_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// How often the registry sweeper runs, in seconds.
    #[serde(default = "d_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Gate for `GET /api/chats/{chat_id}/tree` — disabled builds return 404
    /// regardless of what the client requests.
    #[serde(default = "d_true")]
    pub chat_tree_endpoint_enabled: bool,
    /// Safety cap on ancestor-path depth (`GetPath`) and chat-tree descent.
    #[serde(default = "d_max_path_depth")]
    pub max_path_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hub_retention_secs: d_retention_secs(),
            hub_buffer_size: d_buffer_size(),
            max_tool_iterations: d_max_tool_iterations(),
            turn_timeout_secs: d_turn_timeout_secs(),
            tool_timeout_secs: d_tool_timeout_secs(),
            sweep_interval_secs: d_sweep_interval_secs(),
            chat_tree_endpoint_enabled: d_true(),
            max_path_depth: d_max_path_depth(),
        }
    }
}

fn d_retention_secs() -> u64 {
    600
}
fn d_buffer_size() -> usize {
    1000
}
fn d_max_tool_iterations() -> usize {
    10
}
fn d_turn_timeout_secs() -> u64 {
    300
}
fn d_tool_timeout_secs() -> u64 {
    30
}
fn d_sweep_interval_secs() -> u64 {
    60
}
fn d_true() -> bool {
    true
}
fn d_max_path_depth() -> usize {
    100
}
