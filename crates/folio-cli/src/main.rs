//! folio - terminal client for the bookstore.
//!
//! Signs in against the bookstore API and keeps the session alive by renewing
//! the session credential ahead of its expiry.

mod app;
mod navigator;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use folio_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Bookstore client session tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,

        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and clear the local session
    Logout {
        /// Also forget the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show the current session and its expiry
    Status,
    /// Renew the session if it is about to expire
    Refresh,
    /// Keep the session alive while working under a route
    Watch {
        /// Route the session is used on, e.g. /admin/inventory
        #[arg(short, long, default_value = "/")]
        route: String,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "folio.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let log_dir = if cli.log_file {
        let dir = config.cache_dir()?;
        std::fs::create_dir_all(&dir)?;
        Some(dir)
    } else {
        None
    };
    let _guard = init_tracing(log_dir.as_deref());
    info!(api = %config.api_base_url, "folio starting");

    let route = match &cli.command {
        Command::Watch { route } => route.clone(),
        _ => "/".to_string(),
    };
    let mut app = App::new(config, &route)?;

    match cli.command {
        Command::Login { username, remember } => app.login(username, remember).await?,
        Command::Logout { forget } => app.logout(forget).await?,
        Command::Status => app.status(),
        Command::Refresh => app.refresh().await?,
        Command::Watch { .. } => app.watch().await?,
    }

    Ok(())
}
