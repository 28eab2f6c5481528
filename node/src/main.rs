// Copyright (c) 2026 CHESS Map Contributors. MIT License.
// See LICENSE for details.

//! # CHESS Map Ledger Node
//!
//! Entry point for the `chess-node` binary. Parses CLI arguments, initializes
//! logging and metrics, opens the ledger store, and serves the HTTP/WS API.
//!
//! The binary supports five subcommands:
//!
//! - `run`     — serve the ledger API and metrics
//! - `init`    — create the data directory and seed the first master admin
//! - `token`   — mint a development bearer token
//! - `audit`   — check every wallet against its ledger
//! - `version` — print build version information

mod api;
mod auth;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use chess_ledger::{LedgerDB, LedgerService, Principal, Role};

use auth::JwtValidator;
use cli::{ChessNodeCli, Commands};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
/// 256 is large enough to absorb short bursts without dropping events
/// for connected WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_LOG_FILTER: &str = "chess_node=info,chess_ledger=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ChessNodeCli::parse();
    logging::init_logging(DEFAULT_LOG_FILTER, cli.log_format);

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Token(args) => mint_token(args),
        Commands::Audit(args) => audit_store(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Expands a leading `~` to `$HOME`.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Opens (creating if needed) the ledger store under `data_dir`.
fn open_store(data_dir: &Path) -> Result<LedgerDB> {
    let db_path = expand_home(data_dir).join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = LedgerDB::open(&db_path)
        .with_context(|| format!("failed to open ledger store at {}", db_path.display()))?;
    tracing::info!(
        path = %db_path.display(),
        schema_version = db.schema_version()?,
        "ledger store opened"
    );
    Ok(db)
}

/// Serves the API and metrics endpoints until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.store.data_dir.display(),
        "starting chess-node"
    );

    let db = open_store(&args.store.data_dir)?;
    let auth = JwtValidator::new(args.jwt_secret).context("invalid JWT secret")?;
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let app_state = api::AppState {
        version: format!(
            "{} (ledger {})",
            env!("CARGO_PKG_VERSION"),
            chess_ledger::config::LEDGER_VERSION,
        ),
        service: LedgerService::new(db.clone()),
        auth: Arc::new(auth),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("failed to flush ledger store")?;
    tracing::info!("chess-node stopped");
    Ok(())
}

/// Creates the data directory, applies migrations, and seeds the first
/// master admin with an optional opening grant.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = expand_home(&args.store.data_dir);
    tracing::info!(data_dir = %data_dir.display(), admin = %args.admin, "initializing node");

    let db = open_store(&data_dir)?;
    let service = LedgerService::new(db.clone());

    service
        .bootstrap_master_admin(args.admin, &args.name)
        .context("failed to seed master admin")?;

    let admin = Principal::new(args.admin, Role::MasterAdmin);
    if let Some(amount) = args.grant {
        service
            .grant_coins(&admin, args.admin, amount, Some("opening grant".into()))
            .context("failed to credit opening grant")?;
    }
    let wallet = service.get_my_wallet(&admin)?;
    db.flush().context("failed to flush ledger store")?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Schema version : {}", db.schema_version()?);
    println!("  Master admin   : {} ({})", args.admin, args.name.trim());
    println!("  Admin balance  : {}", wallet.balance);

    Ok(())
}

/// Prints a signed bearer token for `args.user` to stdout.
fn mint_token(args: cli::TokenArgs) -> Result<()> {
    let auth = JwtValidator::new(args.jwt_secret).context("invalid JWT secret")?;
    let token = auth
        .generate_token(args.user, args.ttl)
        .context("failed to sign token")?;
    println!("{}", token);
    Ok(())
}

/// Recomputes every balance from the ledger. Fails if any wallet disagrees.
fn audit_store(args: cli::AuditArgs) -> Result<()> {
    let db = open_store(&args.store.data_dir)?;
    let service = LedgerService::new(db);
    let mismatches = service.audit().context("ledger audit failed")?;

    if mismatches.is_empty() {
        println!(
            "Ledger consistent: {} wallets, {} entries.",
            service.db().wallet_count(),
            service.db().entry_count()
        );
        return Ok(());
    }

    for m in &mismatches {
        println!(
            "MISMATCH user={} balance={} ledger_sum={}",
            m.user_id, m.balance, m.ledger_sum
        );
    }
    bail!("{} wallet(s) disagree with the ledger", mismatches.len())
}

/// Prints version information to stdout.
fn print_version() {
    println!("chess-node {}", env!("CARGO_PKG_VERSION"));
    println!("ledger     {}", chess_ledger::config::LEDGER_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
