mod api;
mod chat_lock;
mod cli;
mod error;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use dw_domain::config::{Config, ConfigSeverity};
use dw_engine::{CancelRegistry, StreamRegistry, TurnExecutor};
use dw_providers::registry::ProviderRegistry;
use dw_store::Store;
use dw_tools::{
    build_web_search_client, FsDocumentService, FsSearchService, ToolDispatcher,
};

use crate::cli::{Cli, Command, ConfigCommand};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path)?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("dwgateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dw_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("dwgateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let store = Arc::new(Store::open(&config.storage.root).context("opening turn/block store")?);
    tracing::info!(root = %config.storage.root.display(), "turn store ready");

    let providers =
        Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — turn creation will fail until configured");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    let documents = Arc::new(FsDocumentService::new(
        config.tools.documents_root.clone(),
        config.tools.doc_tree_max_depth,
    ));
    let search = Arc::new(FsSearchService::new(
        config.tools.documents_root.clone(),
        config.tools.doc_search_results_cap,
    ));
    let web_search = match build_web_search_client(&config.tools.web_search) {
        Ok(client) => Some(Arc::from(client)),
        Err(e) => {
            tracing::warn!(error = %e, "web_search tool disabled");
            None
        }
    };
    let web_search_enabled = web_search.is_some();
    let tools = ToolDispatcher::new(documents, search, web_search);
    tracing::info!(web_search_enabled, "tool dispatcher ready");

    let hubs = StreamRegistry::new(config.engine.hub_buffer_size);
    hubs.spawn_sweeper(
        std::time::Duration::from_secs(config.engine.hub_retention_secs),
        std::time::Duration::from_secs(config.engine.sweep_interval_secs),
    );
    tracing::info!("stream registry ready, sweeper running");

    let cancels = CancelRegistry::new();

    let chat_locks = Arc::new(crate::chat_lock::ChatLockMap::new());
    tracing::info!("per-chat turn-creation lock ready");
    {
        let chat_locks = chat_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                config.engine.sweep_interval_secs,
            ));
            loop {
                interval.tick().await;
                chat_locks.prune_idle();
            }
        });
    }

    let executor = TurnExecutor::new(
        store.clone(),
        hubs.clone(),
        providers.clone(),
        tools,
        cancels.clone(),
        config.engine.clone(),
        web_search_enabled,
    );
    tracing::info!("turn executor ready");

    let api_token_env = &config.admin.api_token_env;
    let api_token_hash = std::env::var(api_token_env)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|token| Sha256::digest(token.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!(
            env = %api_token_env,
            "no API token configured — /api routes are unauthenticated (dev mode)"
        );
    }

    let state = AppState {
        config: config.clone(),
        store,
        providers,
        hubs,
        cancels,
        executor,
        chat_locks,
        api_token_hash,
    };

    let cors_layer = build_cors_layer(&config.server.cors);
    let app = api::router::router(state).layer(cors_layer);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "dwgateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// carry a trailing `:*` wildcard port (e.g. `http://localhost:*`).
fn build_cors_layer(cors: &dw_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|p| origin_str.starts_with(p.as_str()))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
