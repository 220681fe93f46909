mod engine;
mod llm;
mod server;
mod storage;
mod tools;

pub use engine::*;
pub use llm::*;
pub use server::*;
pub use storage::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the bearer token required on all
    /// `/api/*` routes. If unset, auth is not enforced (dev mode).
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            api_token_env: d_api_token_env(),
        }
    }
}

fn d_api_token_env() -> String {
    "ENGINE_API_TOKEN".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Startup
    /// should abort only when at least one issue is `Error` severity.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.llm.providers.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.kind != ProviderKind::Lorem {
                if provider.base_url.is_empty() {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].base_url"),
                        message: "provider base_url must not be empty".into(),
                    });
                } else if !provider.base_url.starts_with("http://")
                    && !provider.base_url.starts_with("https://")
                {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].base_url"),
                        message: format!(
                            "base_url must start with http:// or https:// (got \"{}\")",
                            provider.base_url
                        ),
                    });
                }
            }

            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }

            let needs_credentials =
                matches!(provider.auth.mode, AuthMode::ApiKey) && provider.kind != ProviderKind::Lorem;
            if needs_credentials {
                let has_env = provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
                let has_key = provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
                if !has_env && !has_key {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].auth"),
                        message: format!(
                            "provider \"{}\" uses api_key auth but has no auth.env or auth.key configured",
                            provider.id
                        ),
                    });
                }
            }
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        if self.engine.max_tool_iterations == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "engine.max_tool_iterations".into(),
                message: "max_tool_iterations must be greater than 0".into(),
            });
        }
        if self.engine.hub_buffer_size == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "engine.hub_buffer_size".into(),
                message: "hub_buffer_size must be greater than 0".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8080,
                host: "127.0.0.1".into(),
                ..ServerConfig::default()
            },
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "anthropic".into(),
                    kind: ProviderKind::Anthropic,
                    base_url: "https://api.anthropic.com".into(),
                    auth: AuthConfig {
                        mode: AuthMode::ApiKey,
                        env: Some("ANTHROPIC_API_KEY".into()),
                        ..AuthConfig::default()
                    },
                    default_model: None,
                }],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find<'a>(issues: &'a [ConfigIssue], field_prefix: &str) -> Option<&'a ConfigIssue> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_has_no_errors() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert_eq!(find(&issues, "server.port").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn no_providers_is_warning_only() {
        let mut cfg = valid_config();
        cfg.llm.providers.clear();
        let issues = cfg.validate();
        let issue = find(&issues, "llm.providers").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn provider_missing_credentials_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth.env = None;
        cfg.llm.providers[0].auth.key = None;
        let issues = cfg.validate();
        assert_eq!(find(&issues, "llm.providers[0].auth").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn lorem_provider_never_needs_credentials_or_url() {
        let mut cfg = valid_config();
        cfg.llm.providers[0] = ProviderConfig {
            id: "lorem".into(),
            kind: ProviderKind::Lorem,
            base_url: String::new(),
            auth: AuthConfig { mode: AuthMode::ApiKey, env: None, key: None },
            default_model: None,
        };
        let issues = cfg.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn duplicate_provider_ids_warn() {
        let mut cfg = valid_config();
        let dup = cfg.llm.providers[0].clone();
        cfg.llm.providers.push(dup);
        let issues = cfg.validate();
        let dups: Vec<_> = issues.iter().filter(|e| e.message.contains("duplicate")).collect();
        assert_eq!(dups.len(), 1);
    }

    #[test]
    fn zero_max_tool_iterations_is_error() {
        let mut cfg = valid_config();
        cfg.engine.max_tool_iterations = 0;
        let issues = cfg.validate();
        assert_eq!(find(&issues, "engine.max_tool_iterations").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn config_issue_display_format() {
        let err = ConfigIssue {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }

    #[test]
    fn default_engine_config_matches_documented_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_tool_iterations, 10);
        assert_eq!(cfg.hub_buffer_size, 1000);
        assert_eq!(cfg.hub_retention_secs, 600);
    }
}
