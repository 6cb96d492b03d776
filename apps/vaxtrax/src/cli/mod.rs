//! # VaxTrax CLI Module
//!
//! This module implements the CLI interface for VaxTrax.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `create` - Register a batch
//! - `scan` - Record a checkpoint scan
//! - `override` - Manually change status and/or stage
//! - `proceed` - Accept a proceed recommendation
//! - `halt` - Halt a batch
//! - `show` - Show one batch
//! - `history` - Show a batch's ledger, newest first
//! - `list` - List batches
//! - `export` - Export a batch in canonical format
//! - `verify` - Check an exported file

mod commands;

use crate::api::{CreateBatchRequest, OverrideSubmission, ScanSubmission};
use crate::config::{AppConfig, Backend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaxtrax_core::{RequestContext, VaxtraxError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// VaxTrax - vaccine cold-chain custody ledger
///
/// Records checkpoint temperature scans per batch, classifies them and
/// gates custody hand-offs on the result.
#[derive(Parser, Debug)]
#[command(name = "vaxtrax")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file (default: vaxtrax.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the batch database (overrides config)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "memory" or "redb" (overrides config)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Operator recorded on ledger entries
    #[arg(long, global = true)]
    pub operator: Option<String>,

    /// Device recorded on ledger entries
    #[arg(long, global = true, default_value = "CLI")]
    pub device: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Register a new batch
    Create {
        /// Origin location
        #[arg(short, long)]
        location: String,

        /// Starting stage (default: factory)
        #[arg(short, long)]
        stage: Option<String>,

        /// Lower temperature limit in °C
        #[arg(long, allow_hyphen_values = true)]
        temp_min: Option<f64>,

        /// Upper temperature limit in °C
        #[arg(long, allow_hyphen_values = true)]
        temp_max: Option<f64>,
    },

    /// Record a checkpoint scan
    Scan {
        /// Batch id (e.g. VAX-2025-001)
        id: String,

        /// Manual reading in °C
        #[arg(short, long, allow_hyphen_values = true)]
        temperature: Option<f64>,

        /// Raw NFC payload text
        #[arg(long)]
        payload: Option<String>,

        /// Checkpoint location (default: batch's current location)
        #[arg(short, long)]
        location: Option<String>,

        /// Checkpoint stage (default: batch's current stage)
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Manually change status and/or stage
    Override {
        /// Batch id
        id: String,

        /// New status (safe, at-risk, unsafe)
        #[arg(long)]
        status: Option<String>,

        /// New stage
        #[arg(long)]
        stage: Option<String>,
    },

    /// Accept a proceed recommendation
    Proceed {
        /// Batch id
        id: String,
    },

    /// Halt a batch
    Halt {
        /// Batch id
        id: String,
    },

    /// Show one batch
    Show {
        /// Batch id
        id: String,

        /// View: operator, company or public
        #[arg(short, long, default_value = "operator")]
        view: String,
    },

    /// Show a batch's ledger, newest first
    History {
        /// Batch id
        id: String,

        /// View: operator, company or public
        #[arg(short, long, default_value = "operator")]
        view: String,
    },

    /// List batches
    List {
        /// View: operator, company or public
        #[arg(short, long, default_value = "operator")]
        view: String,
    },

    /// Export a batch in canonical format
    Export {
        /// Batch id
        id: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verify an exported file, optionally against the stored batch
    Verify {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Compare with this stored batch
        #[arg(long)]
        against: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), VaxtraxError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    let mut ctx = RequestContext::now().with_device(cli.device);
    ctx.operator = cli.operator;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Create {
            location,
            stage,
            temp_min,
            temp_max,
        }) => {
            let request = CreateBatchRequest {
                location,
                stage,
                temp_min,
                temp_max,
            };
            cmd_create(&config, &ctx, json_mode, &request)
        }
        Some(Commands::Scan {
            id,
            temperature,
            payload,
            location,
            stage,
        }) => {
            let submission = ScanSubmission {
                temperature,
                payload,
                location,
                stage,
                ..ScanSubmission::default()
            };
            cmd_scan(&config, &ctx, json_mode, &id, submission)
        }
        Some(Commands::Override { id, status, stage }) => {
            let submission = OverrideSubmission { status, stage };
            cmd_override(&config, &ctx, json_mode, &id, &submission)
        }
        Some(Commands::Proceed { id }) => cmd_proceed(&config, &ctx, json_mode, &id),
        Some(Commands::Halt { id }) => cmd_halt(&config, &ctx, json_mode, &id),
        Some(Commands::Show { id, view }) => cmd_show(&config, json_mode, &id, &view),
        Some(Commands::History { id, view }) => cmd_history(&config, json_mode, &id, &view),
        Some(Commands::List { view }) => cmd_list(&config, json_mode, &view),
        Some(Commands::Export { id, output }) => cmd_export(&config, &id, &output),
        Some(Commands::Verify { input, against }) => {
            cmd_verify(&config, json_mode, &input, against.as_deref())
        }
        None => cmd_list(&config, json_mode, "operator"),
    }
}
