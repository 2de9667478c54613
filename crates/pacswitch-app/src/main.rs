//! Pacswitch - rule-driven proxy policy engine.
//!
//! This binary wires the pieces together: it opens the settings
//! database, spawns the apply worker against a policy target (a PAC
//! file on disk, or memory-only), performs the startup apply, and
//! serves the HTTP command API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use pacswitch_proxy::{MemoryTarget, PacFileTarget, PolicyTarget};
use pacswitch_server::{
    AppState, ApplyTrigger, Server, ServerConfig, StaticTabProvider, DEFAULT_PORT,
};
use pacswitch_storage::Database;

/// Pacswitch - rule-driven proxy policy engine
#[derive(Parser, Debug)]
#[command(name = "pacswitch", version, about)]
struct Args {
    /// Port for the command API
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host for the command API
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Database path (defaults to the platform data directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Write the effective policy as a PAC file at this path
    #[arg(long)]
    pac_file: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Initialize console logging.
fn init_logging(args: &Args) {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pacswitch={log_level},warn")));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Default PAC file path under the platform data directory.
fn default_pac_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "pacswitch", "pacswitch")
        .map(|dirs| dirs.data_dir().join("proxy.pac"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let db = match &args.db {
        Some(path) => Database::with_path(path).context("failed to open database")?,
        None => Database::new().context("failed to open database")?,
    };

    let target: Arc<dyn PolicyTarget> = match args.pac_file.clone().or_else(default_pac_path) {
        Some(path) => {
            tracing::info!("writing effective policy to {:?}", path);
            Arc::new(PacFileTarget::new(path).on_error(|message| {
                tracing::warn!("policy target error: {message}");
            }))
        }
        None => {
            tracing::warn!("no PAC file path available, policy kept in memory only");
            Arc::new(MemoryTarget::new())
        }
    };

    let state = AppState::new(db, target, Arc::new(StaticTabProvider::new()));

    // Startup apply: re-derive and install the policy before serving
    state.apply.trigger(ApplyTrigger::Startup);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        db_path: None,
    };

    let server = Server::with_state(config, state).context("failed to build server")?;
    server.run().await.context("server exited with an error")?;

    Ok(())
}
