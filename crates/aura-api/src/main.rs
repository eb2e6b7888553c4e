//! Axum API server binary: load config, build providers and shared state,
//! wire the router, then serve. Graceful shutdown runs through
//! `ShutdownOrchestrator` rather than `axum::serve`'s bare shutdown future,
//! so active jobs get a chance to settle before the listener stops.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use aura_encoder::{FfmpegVideoEncoderProvider, PROVIDER_NAME as FFMPEG_PROVIDER_NAME};
use aura_orchestrator::{EngineConfig, Providers, ShutdownOrchestrator};
use aura_process::ProcessSupervisor;
use aura_providers::reference::{
    MockVideoEncoderProvider, NullTtsProvider, PlaceholderImageProvider, RuleBasedLlmProvider,
};
use aura_providers::registry::ProviderRegistryBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aura_api::{create_router, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT").map(|v| v.to_lowercase() == "json").unwrap_or(false);
    let env_filter = EnvFilter::from_default_env().add_directive("aura=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(env_filter).init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true).with_file(false).with_line_number(false))
            .with(env_filter)
            .init();
    }

    info!("starting aura-api");

    let api_config = ApiConfig::from_env();
    let engine_config = EngineConfig::from_env();
    info!(host = %api_config.host, port = api_config.port, "api config loaded");

    std::fs::create_dir_all(&engine_config.work_dir).ok();
    std::fs::create_dir_all(&engine_config.logs_dir).ok();

    let supervisor = ProcessSupervisor::new();
    let providers = Arc::new(build_providers(&engine_config, &supervisor));

    let metrics_enabled = std::env::var("METRICS_ENABLED").map(|v| v == "true" || v == "1").unwrap_or(true);
    let metrics_handle = if metrics_enabled {
        info!("prometheus metrics enabled at /metrics");
        Some(aura_api::metrics::init_metrics())
    } else {
        None
    };

    let shutdown_timeout = engine_config.graceful_shutdown_timeout;
    let state = AppState::new(api_config.clone(), engine_config, providers, supervisor.clone());
    let shutdown = Arc::new(ShutdownOrchestrator::new(
        state.orchestrator.store.clone(),
        state.events.clone(),
        supervisor,
        shutdown_timeout,
    ));

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port)
        .parse()
        .expect("invalid bind address");
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("server error");

    info!("server shutdown complete");
}

/// Builds the Free-tier reference registry every stage can always fall
/// back onto, plus a real ffmpeg-backed encoder when the binary is
/// reachable on `PATH`. Absent providers are represented by absence, never
/// a null entry, so `detect` simply isn't registered when ffmpeg can't be
/// found.
fn build_providers(engine_config: &EngineConfig, supervisor: &ProcessSupervisor) -> Providers {
    let mut encoder_builder: ProviderRegistryBuilder<dyn aura_providers::traits::VideoEncoderProvider> =
        ProviderRegistryBuilder::new();
    match FfmpegVideoEncoderProvider::detect(
        supervisor.clone(),
        PathBuf::from(&engine_config.work_dir),
        PathBuf::from(&engine_config.logs_dir),
    ) {
        Some(ffmpeg) => {
            encoder_builder = encoder_builder.register(FFMPEG_PROVIDER_NAME, Arc::new(ffmpeg));
        }
        None => {
            warn!("ffmpeg not found on PATH, falling back to the mock encoder for the render stage");
            encoder_builder = encoder_builder.register("mock", Arc::new(MockVideoEncoderProvider::new()));
        }
    }

    Providers {
        llm: ProviderRegistryBuilder::new()
            .register("rule-based", Arc::new(RuleBasedLlmProvider::new()))
            .build(),
        tts: ProviderRegistryBuilder::new()
            .register("null", Arc::new(NullTtsProvider::new()))
            .build(),
        image: ProviderRegistryBuilder::new()
            .register("placeholder", Arc::new(PlaceholderImageProvider::new()))
            .build(),
        encoder: encoder_builder.build(),
    }
}

/// Waits for Ctrl+C, then drives the ordered teardown before letting
/// `axum::serve` actually stop accepting connections.
async fn shutdown_signal(shutdown: Arc<ShutdownOrchestrator>) {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    info!("received shutdown signal");
    shutdown.run().await;
}
