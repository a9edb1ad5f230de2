use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use lims_core::config::{
    custom_tests_dir_from_env_value, recompute_mode_from_env_value, rest_addr_from_env_value,
};
use lims_core::{LimsConfig, ProfileRegistry};

/// Main entry point for the LIMS server.
///
/// Resolves configuration once, builds the profile registry and serves the REST API.
///
/// # Environment Variables
/// - `LIMS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LIMS_CUSTOM_TESTS_DIR`: directory of per-tenant custom test files (optional)
/// - `LIMS_RECOMPUTE_MODE`: `single_pass` (default) or `converge`
///
/// # Errors
/// Returns an error if configuration is invalid, the built-in catalog fails to load, the
/// address cannot be bound, or the server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lims_run=info".parse()?)
                .add_directive("lims_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = LimsConfig::new(
        rest_addr_from_env_value(std::env::var("LIMS_REST_ADDR").ok()),
        custom_tests_dir_from_env_value(std::env::var("LIMS_CUSTOM_TESTS_DIR").ok()),
        recompute_mode_from_env_value(std::env::var("LIMS_RECOMPUTE_MODE").ok())?,
    )?;

    let mut registry = ProfileRegistry::builtin()?;
    if let Some(dir) = cfg.custom_tests_dir() {
        registry = registry.load_custom_tests_dir(dir)?;
    }

    let app = api_rest::router(AppState::new(Arc::new(registry), cfg.recompute_mode()));

    tracing::info!(
        "++ Starting LIMS REST on {} (recompute mode: {})",
        cfg.rest_addr(),
        cfg.recompute_mode()
    );

    let listener = tokio::net::TcpListener::bind(cfg.rest_addr()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
