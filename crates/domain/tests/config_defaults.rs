use dw_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn explicit_overrides_parse_over_defaults() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3210);
    // Sections omitted from the TOML still fall back to their defaults.
    assert_eq!(config.engine.max_tool_iterations, 10);
    assert!(config.llm.providers.is_empty());
}

#[test]
fn empty_toml_document_round_trips_to_full_defaults() {
    let config: Config = toml::from_str("").unwrap();
    let default = Config::default();
    assert_eq!(config.server.host, default.server.host);
    assert_eq!(config.server.port, default.server.port);
}

#[test]
fn default_config_has_only_a_warning_for_missing_providers() {
    let issues = Config::default().validate();
    assert!(issues
        .iter()
        .all(|i| i.severity == dw_domain::config::ConfigSeverity::Warning));
    assert!(issues.iter().any(|i| i.field == "llm.providers"));
}
