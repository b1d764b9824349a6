//! Lock Verify Server Binary
//!
//! Listens for lock transitions from `lock-stress-test` processes and reports
//! any overlapping holds. Runs until Ctrl-C or until `--max-events` events
//! have been verified, then exits with status 2 if any violation was seen.

use clap::Parser;
use indexstore::network::LockVerifyServer;
use tracing_subscriber::{fmt, EnvFilter};

/// Lock verification server
#[derive(Parser, Debug)]
#[command(name = "lock-verify-server")]
#[command(about = "Detects mutual exclusion violations between lock clients")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long)]
    port: u16,

    /// Stop after this many lock events
    #[arg(long)]
    max_events: Option<u64>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,indexstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("indexstore lock verify server v{}", indexstore::VERSION);

    let mut server = match LockVerifyServer::bind((args.host.as_str(), args.port)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(max) = args.max_events {
        server = server.with_max_events(max);
    }

    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping verifier...");
        shutdown.shutdown();
    }) {
        tracing::error!("Failed to set Ctrl-C handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    let violations = server.violations();
    if violations > 0 {
        tracing::error!("{} lock violations detected", violations);
        std::process::exit(2);
    }
    tracing::info!("No lock violations in {} events", server.events());
}
