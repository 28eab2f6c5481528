//! # CLI Interface
//!
//! Defines the command-line argument structure for `chess-node` using
//! `clap` derive. Subcommands: `run`, `init`, `token`, `audit`, and
//! `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::logging::LogFormat;

/// CHESS Map ledger node.
///
/// Serves the coin ledger over JSON-RPC, REST, and a WebSocket event feed,
/// and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "chess-node",
    about = "CHESS Map coin ledger node",
    version,
    propagate_version = true
)]
pub struct ChessNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "CHESS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ledger node.
    Run(RunArgs),
    /// Initialize a data directory and seed the first master admin.
    Init(InitArgs),
    /// Mint a development bearer token for a user.
    Token(TokenArgs),
    /// Check every wallet against its ledger. Exits non-zero on mismatch.
    Audit(AuditArgs),
    /// Print version information and exit.
    Version,
}

/// Location of the ledger store. Shared by every subcommand that opens it.
#[derive(Args, Debug, Clone)]
pub struct DataDirArg {
    /// Path to the data directory holding the sled store.
    ///
    /// Created on first use if it does not exist.
    #[arg(long, short = 'd', env = "CHESS_DATA_DIR", default_value = "~/.chess-ledger")]
    pub data_dir: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: DataDirArg,

    /// Port for the JSON-RPC, REST, and WebSocket API.
    #[arg(long, env = "CHESS_RPC_PORT", default_value_t = 8741)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CHESS_METRICS_PORT", default_value_t = 8742)]
    pub metrics_port: u16,

    /// Shared HS256 secret used to verify bearer tokens.
    #[arg(long, env = "CHESS_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub store: DataDirArg,

    /// User id of the first master admin.
    #[arg(long)]
    pub admin: Uuid,

    /// Display name for the master admin.
    #[arg(long)]
    pub name: String,

    /// Opening coin grant credited to the master admin.
    #[arg(long)]
    pub grant: Option<u64>,
}

/// Arguments for the `token` subcommand.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// User id to put in the token's `sub` claim.
    #[arg(long)]
    pub user: Uuid,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = 3600)]
    pub ttl: u64,

    /// Shared HS256 secret used to sign the token.
    #[arg(long, env = "CHESS_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
}

/// Arguments for the `audit` subcommand.
#[derive(Parser, Debug)]
pub struct AuditArgs {
    #[command(flatten)]
    pub store: DataDirArg,
}
