//! # relcount
//!
//! Command-line tool for per-vertex relationship count caches over a
//! redb-backed property graph.
//!
//! ## Usage
//!
//! ```bash
//! relcount init
//! relcount apply -f changes.json
//! relcount count --vertex 1 -l KNOWS -d out -t kind=friend
//! relcount inspect --vertex 1
//! relcount status --json-mode
//! ```
//!
//! `RELCOUNT_LOG_FORMAT=json` switches logs to JSON lines; `RUST_LOG`
//! overrides the default filter.

use clap::Parser;
use relcount::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    let log_format = std::env::var("RELCOUNT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "relcount=debug,relcount_core=debug"
    } else {
        "relcount=info,relcount_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!("relcount v{}  relationship count cache", env!("CARGO_PKG_VERSION"));
    println!();
}
