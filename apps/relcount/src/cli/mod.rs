//! # relcount CLI Module
//!
//! Command-line front end over a redb-backed graph with relationship count
//! caches kept in its vertex properties.
//!
//! ## Available Commands
//!
//! - `init` - Create an empty database
//! - `apply` - Apply a JSON file of edge changes, updating caches
//! - `count` - Count the relationships of a vertex
//! - `inspect` - List the cached entries of a vertex
//! - `rebuild` - Rebuild every cache from the edges
//! - `evict` - Drop the cache of one vertex
//! - `status` - Show cache metrics
//! - `export` / `import` / `verify` - Canonical cache snapshots
//! - `hash` - Checksum and BLAKE3 hash of all caches

mod changes;
mod commands;

use crate::config::CliConfig;
use clap::{Parser, Subcommand};
use relcount_core::{CountCache, RelcountError};
use std::path::PathBuf;

pub use changes::{ChangeRecord, MAX_CHANGES_PER_FILE, parse_changes};
pub use commands::*;

/// Database used when neither `--database` nor the config file names one.
pub const DEFAULT_DATABASE: &str = "relcount.redb";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// relcount - relationship count caches for property graphs
#[derive(Parser, Debug)]
#[command(name = "relcount")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file (defaults to ./relcount.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Apply edge changes from a JSON file
    Apply {
        /// Path to the change file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Count the relationships of a vertex
    Count {
        /// Vertex to count at
        #[arg(long)]
        vertex: u64,

        /// Relationship label
        #[arg(short, long)]
        label: String,

        /// Direction: out, in or both
        #[arg(short, long, default_value = "out")]
        direction: String,

        /// Tag constraint as key=value (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Tag key that may take any value (repeatable)
        #[arg(short, long = "any")]
        any: Vec<String>,

        /// Count edges with exactly these tags and no others
        #[arg(long)]
        literal: bool,
    },

    /// List the cached entries of a vertex
    Inspect {
        /// Vertex to inspect
        #[arg(long)]
        vertex: u64,
    },

    /// Rebuild every cache from the stored edges
    Rebuild,

    /// Remove the cache of one vertex
    Evict {
        /// Vertex to evict
        #[arg(long)]
        vertex: u64,
    },

    /// Show cache metrics
    Status,

    /// Export every cache in canonical format
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Restore caches from a canonical export
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check the stored caches against a canonical export
    Verify {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compute checksum and BLAKE3 hash of all caches
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), RelcountError> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
    let json_mode = cli.json_mode;

    if let Some(Commands::Init { force }) = cli.command {
        return cmd_init(&db_path, force);
    }

    let cache = CountCache::new(config.cache)?;
    let ctx = Context {
        db_path,
        cache,
        json_mode,
    };

    match cli.command {
        Some(Commands::Apply { file }) => cmd_apply(&ctx, &file),
        Some(Commands::Count {
            vertex,
            label,
            direction,
            tags,
            any,
            literal,
        }) => {
            let request = CountRequest::parse(vertex, &label, &direction, &tags, &any, literal)?;
            cmd_count(&ctx, &request)
        }
        Some(Commands::Inspect { vertex }) => cmd_inspect(&ctx, vertex),
        Some(Commands::Rebuild) => cmd_rebuild(&ctx),
        Some(Commands::Evict { vertex }) => cmd_evict(&ctx, vertex),
        Some(Commands::Export { output }) => cmd_export(&ctx, &output),
        Some(Commands::Import { input }) => cmd_import(&ctx, &input),
        Some(Commands::Verify { input }) => cmd_verify(&ctx, &input),
        Some(Commands::Hash) => cmd_hash(&ctx),
        Some(Commands::Status) | Some(Commands::Init { .. }) | None => cmd_status(&ctx),
    }
}
