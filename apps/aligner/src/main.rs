mod alignment;
mod cache;
mod cli;
mod config;
mod errors;
mod grounding;
mod llm_client;
mod models;
mod routes;
mod schema;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::alignment::AnalysisOrchestrator;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging before anything can warn. Logs go to
    // stderr so CLI reports stay clean on stdout.
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(log_filter(cli.log_level.as_deref()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Analyze {
            resume,
            job,
            cover_letter,
            tailor,
            output_dir,
        } => cli::run_analyze(&config, &resume, &job, cover_letter, tailor, output_dir).await,
        Commands::Verify { resume, text } => cli::run_verify(&resume, &text).await,
        Commands::Report { artifact } => cli::run_report(&artifact).await,
    }
}

const DEFAULT_LOG_LEVEL: &str = "info";

/// `--log-level` wins, then `RUST_LOG`, then `aligner=info`.
fn log_filter(cli_level: Option<&str>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(crate_directive(level)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(crate_directive(DEFAULT_LOG_LEVEL))),
    }
}

fn crate_directive(level: &str) -> String {
    format!("{}={}", env!("CARGO_PKG_NAME"), level)
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    info!("Starting Aligner API v{}", env!("CARGO_PKG_VERSION"));

    // Backend is chosen lazily on the first model call
    let orchestrator = AnalysisOrchestrator::from_config(&config)?;
    info!(
        "Orchestrator initialized (hosted: {}, local: {} at {}, cache: {})",
        if config.openai_api_key.is_some() { config.hosted_model.as_str() } else { "disabled" },
        config.local_model,
        config.local_llm_url,
        config
            .cache_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "memory only".to_string())
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", port.unwrap_or(config.port)).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_targets_this_crate() {
        assert_eq!(crate_directive("debug"), "aligner=debug");
        assert_eq!(log_filter(Some("warn")).to_string(), "aligner=warn");
    }
}
