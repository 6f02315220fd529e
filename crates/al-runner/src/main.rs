//! Action-list runner
//!
//! Loads a project file, starts its autostart sequences and ticks the
//! engine until nothing is running or Ctrl-C is pressed.
//!
//! ```text
//! actionlist [project.yaml]
//! ```

mod runner;

use anyhow::{Context, Result};
use runner::Runner;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_PROJECT: &str = "project.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
    let project = al_config::load_project(&path)
        .with_context(|| format!("failed to load project {}", path))?;

    // RUST_LOG wins over the project's filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&project.engine.log_filter))
        .context("invalid log filter")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(project = %path, "Starting action-list runner");

    let mut runner = Runner::from_project(&project)?;
    if project.autostart.is_empty() {
        warn!("No autostart sequences, nothing to run");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let summary = runner.run(shutdown).await;

    info!(
        reason = ?summary.reason,
        live = runner.context().scheduler.len(),
        "Shutting down..."
    );
    Ok(())
}
