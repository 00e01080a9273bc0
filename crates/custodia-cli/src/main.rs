//! `custodia` — server binary and operator commands for the Custodia
//! assurance core.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and either serves the JSON API or runs a
//! one-off operator command against the same store.
//!
//! # Usage
//!
//! ```
//! custodia serve
//! custodia verify --tenant-id <uuid>
//! custodia retention run --tenant-id <uuid>
//! custodia retention export --tenant-id <uuid> --output events.csv
//! custodia approvals list --tenant-id <uuid>
//! custodia approvals decide --tenant-id <uuid> --id <uuid> --by <uuid>
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use custodia_api::AppState;
use custodia_core::{approval::ApprovalDecision, job::ActorType, notify::Notifier};
use custodia_engine::{
  blob::FsBlobStore, export::deletion_events_csv, lock::JobLockManager,
  notify::LogNotifier,
};
use custodia_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "custodia", about = "Compliance assurance core", version)]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API over HTTP.
  Serve,

  /// Verify a tenant's audit chain and print the report.
  Verify {
    #[arg(long)]
    tenant_id: Uuid,
  },

  /// Retention operations.
  Retention {
    #[command(subcommand)]
    command: RetentionCommand,
  },

  /// Approval requests.
  Approvals {
    #[command(subcommand)]
    command: ApprovalsCommand,
  },
}

#[derive(Subcommand)]
enum RetentionCommand {
  /// Run one deletion pass for a tenant.
  Run {
    #[arg(long)]
    tenant_id: Uuid,

    /// Attribute the run to this user instead of the system.
    #[arg(long)]
    user_id: Option<Uuid>,

    /// Evaluate retention cutoffs against this RFC 3339 instant instead of
    /// the current time.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
  },

  /// Export deletion events as CSV.
  Export {
    #[arg(long)]
    tenant_id: Uuid,

    /// Restrict to a single deletion job.
    #[arg(long)]
    job_id: Option<Uuid>,

    /// Write to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum ApprovalsCommand {
  /// List pending approval requests for a tenant.
  List {
    #[arg(long)]
    tenant_id: Uuid,
  },

  /// Decide a pending approval request.
  Decide {
    #[arg(long)]
    tenant_id: Uuid,

    /// The approval request id.
    #[arg(long)]
    id: Uuid,

    /// The deciding user. Must differ from the requester.
    #[arg(long)]
    by: Uuid,

    /// Reject instead of approve.
    #[arg(long)]
    reject: bool,

    #[arg(long)]
    reason: Option<String>,
  },
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Shape of the TOML config file, overridable via `CUSTODIA_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host: String,
  #[serde(default = "default_port")]
  port: u16,
  #[serde(default = "default_store_path")]
  store_path: String,
  #[serde(default = "default_blob_root")]
  blob_root: String,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8086 }
fn default_store_path() -> String { "custodia.db".into() }
fn default_blob_root() -> String { "blobs".into() }

fn load_config(path: &PathBuf) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path.clone()).required(false))
    .add_source(config::Environment::with_prefix("CUSTODIA"))
    .build()
    .context("failed to read config")?;
  settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}

async fn open_state(
  cfg: &ServerConfig,
) -> anyhow::Result<Arc<AppState<SqliteStore, FsBlobStore>>> {
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {}", cfg.store_path))?;
  let blobs = FsBlobStore::new(&cfg.blob_root)
    .await
    .with_context(|| format!("failed to open blob root at {}", cfg.blob_root))?;
  let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
  Ok(Arc::new(AppState::new(
    store,
    blobs,
    JobLockManager::new(),
    notifier,
  )))
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = load_config(&cli.config)?;
  let state = open_state(&cfg).await?;

  match cli.command {
    Command::Serve => serve(cfg, state).await,
    Command::Verify { tenant_id } => {
      let report = state.ledger.verify(tenant_id).await?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      if !report.valid {
        std::process::exit(1);
      }
      Ok(())
    }
    Command::Retention { command } => retention(command, state).await,
    Command::Approvals { command } => approvals(command, state).await,
  }
}

async fn serve(
  cfg: ServerConfig,
  state: Arc<AppState<SqliteStore, FsBlobStore>>,
) -> anyhow::Result<()> {
  let app = custodia_api::api_router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn retention(
  command: RetentionCommand,
  state: Arc<AppState<SqliteStore, FsBlobStore>>,
) -> anyhow::Result<()> {
  match command {
    RetentionCommand::Run { tenant_id, user_id, as_of } => {
      let triggered_by = if user_id.is_some() {
        ActorType::User
      } else {
        ActorType::System
      };
      let job = state
        .retention
        .run_deletion_job(tenant_id, triggered_by, user_id, as_of)
        .await?;
      println!("{}", serde_json::to_string_pretty(&job)?);
      Ok(())
    }
    RetentionCommand::Export { tenant_id, job_id, output } => {
      use custodia_core::store::AssuranceStore as _;
      let events = state.store.deletion_events(tenant_id, job_id).await?;
      let csv = deletion_events_csv(&events);
      match output {
        Some(path) => {
          tokio::fs::write(&path, csv)
            .await
            .with_context(|| format!("failed to write {path:?}"))?;
          tracing::info!("wrote {} events to {path:?}", events.len());
        }
        None => print!("{csv}"),
      }
      Ok(())
    }
  }
}

async fn approvals(
  command: ApprovalsCommand,
  state: Arc<AppState<SqliteStore, FsBlobStore>>,
) -> anyhow::Result<()> {
  match command {
    ApprovalsCommand::List { tenant_id } => {
      let pending = state.gate.pending(tenant_id).await?;
      println!("{}", serde_json::to_string_pretty(&pending)?);
      Ok(())
    }
    ApprovalsCommand::Decide { tenant_id, id, by, reject, reason } => {
      let decision = if reject {
        ApprovalDecision::Reject
      } else {
        ApprovalDecision::Approve
      };
      let decided = state.gate.decide(tenant_id, id, by, decision, reason).await?;
      println!("{}", serde_json::to_string_pretty(&decided)?);
      Ok(())
    }
  }
}
