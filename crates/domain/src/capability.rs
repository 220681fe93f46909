use serde::{Deserialize, Serialize};

/// Feature flags a provider adapter advertises about the model it backs.
/// The executor consults this before attaching tool schemas or a thinking
/// config the provider can't honor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    pub thinking: bool,
    pub server_side_tools: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            tool_calling: true,
            thinking: false,
            server_side_tools: false,
        }
    }
}
