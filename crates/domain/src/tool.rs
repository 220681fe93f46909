use serde::{Deserialize, Serialize};

use crate::block::ExecutionSide;

/// A tool declaration attached to a turn's request params.
///
/// Clients may send either the minimal `{"name": "doc_view"}` shorthand —
/// resolved against [`catalog::lookup`] at request-build time — or a full
/// OpenAI-style function schema, which passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolDefinition {
    Minimal {
        name: String,
    },
    Full {
        #[serde(rename = "type")]
        kind: String,
        function: ToolFunctionSchema,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Minimal { name } => name,
            ToolDefinition::Full { function, .. } => &function.name,
        }
    }

    /// Resolve this declaration into a full schema, consulting the static
    /// catalog when only a bare name was supplied.
    pub fn resolve(&self) -> Option<ResolvedTool> {
        match self {
            ToolDefinition::Minimal { name } => catalog::lookup(name),
            ToolDefinition::Full { function, .. } => Some(ResolvedTool {
                schema: ToolFunctionSchema {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    parameters: function.parameters.clone(),
                },
                execution_side: ExecutionSide::Client,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub schema: ToolFunctionSchema,
    pub execution_side: ExecutionSide,
}

/// A tool invocation requested by the model, already normalized to the
/// engine's provider-agnostic shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// The result of executing one tool call. `is_error = true` is still a
/// valid, non-fatal result — the model is expected to react to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub is_error: bool,
    pub content: String,
}

/// Static catalog mapping minimal tool names to full schemas and their
/// execution side. Server-side variants (the `web_search` family) all
/// resolve to the same canonical schema; the concrete external API is
/// chosen by name at dispatch time, not here.
pub mod catalog {
    use super::*;

    pub fn lookup(name: &str) -> Option<ResolvedTool> {
        let (description, parameters, side) = match name {
            "doc_view" => (
                "Read the content of a document, or list a folder's contents.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Document or folder path"}
                    },
                    "required": ["path"]
                }),
                ExecutionSide::Client,
            ),
            "doc_tree" => (
                "Return a bounded-depth subtree of folder/document metadata.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "folder": {"type": "string"},
                        "depth": {"type": "integer", "minimum": 1, "maximum": 5}
                    }
                }),
                ExecutionSide::Client,
            ),
            "doc_search" => (
                "Search documents by query, optionally scoped to a folder.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "folder": {"type": "string"},
                        "limit": {"type": "integer"},
                        "offset": {"type": "integer"}
                    },
                    "required": ["query"]
                }),
                ExecutionSide::Client,
            ),
            "web_search" | "tavily_web_search" | "brave_web_search" | "serper_web_search"
            | "exa_web_search" => (
                "Search the web for current information.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "max_results": {"type": "integer"},
                        "topic": {"type": "string"}
                    },
                    "required": ["query"]
                }),
                ExecutionSide::Client,
            ),
            _ => return None,
        };
        Some(ResolvedTool {
            schema: ToolFunctionSchema {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
            execution_side: side,
        })
    }

    /// Every tool name this catalog can resolve, used to validate incoming
    /// minimal tool declarations up front rather than failing deep inside
    /// request construction.
    pub const KNOWN_NAMES: &[&str] = &[
        "doc_view",
        "doc_tree",
        "doc_search",
        "web_search",
        "tavily_web_search",
        "brave_web_search",
        "serper_web_search",
        "exa_web_search",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_definition_resolves_known_tool() {
        let def = ToolDefinition::Minimal { name: "doc_view".into() };
        let resolved = def.resolve().expect("doc_view should resolve");
        assert_eq!(resolved.schema.name, "doc_view");
    }

    #[test]
    fn minimal_definition_unknown_tool_does_not_resolve() {
        let def = ToolDefinition::Minimal { name: "not_a_tool".into() };
        assert!(def.resolve().is_none());
    }

    #[test]
    fn web_search_variants_share_canonical_schema_shape() {
        let a = catalog::lookup("tavily_web_search").unwrap();
        let b = catalog::lookup("brave_web_search").unwrap();
        assert_eq!(a.schema.parameters, b.schema.parameters);
    }

    #[test]
    fn full_definition_passes_through() {
        let def = ToolDefinition::Full {
            kind: "function".into(),
            function: ToolFunctionSchema {
                name: "custom_tool".into(),
                description: "does a thing".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        };
        let resolved = def.resolve().unwrap();
        assert_eq!(resolved.schema.name, "custom_tool");
    }

    #[test]
    fn name_reads_through_both_variants() {
        let minimal = ToolDefinition::Minimal { name: "doc_search".into() };
        assert_eq!(minimal.name(), "doc_search");
    }
}
