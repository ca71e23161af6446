use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{eyre, Result};
use serde::Serialize;
use uuid::Uuid;

use captable::adapters::{sink_from_config, StaticDirectory};
use captable::common_utils::get_current_date;
use captable::configure::{self, AppConfig, StorageBackend};
use captable::db::scylla_store;
use captable::db::sled_store::open_db;
use captable::db::{
    LedgerDb, MemoryLedgerDb, MemorySnapshotDb, ScyllaLedgerDb, ScyllaSnapshotDb, SledLedgerDb,
    SledSnapshotDb, SnapshotDb,
};
use captable::engine::{PostingRequest, SplitRequest, TransferRequest};
use captable::logger::setup_logger;
use captable::models::TransactionKind;
use captable::{CapTable, Collaborators};

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "Post share movements and inspect positions")]
struct Cli {
    /// Config file base name (without extension)
    #[arg(long, default_value = "config/captable")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a single entry
    Post {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        security: String,
        /// e.g. deposit, withdrawal, original_issuance
        #[arg(long)]
        kind: String,
        #[arg(long)]
        quantity: u64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        restriction: Option<String>,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Move shares between two holders
    Transfer {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
        #[arg(long)]
        security: String,
        #[arg(long)]
        quantity: u64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        restriction: Option<String>,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Convert units into Class A and Right/Warrant shares
    Split {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        units: u64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        /// Print the plan without posting
        #[arg(long)]
        dry_run: bool,
    },
    /// Replay a holding as of a date
    Balance {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        security: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List every entry of a holding, voided ones included
    History {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        security: String,
    },
    /// Void one entry
    Void {
        #[arg(long)]
        entry: Uuid,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Recompute the cached snapshot for a date (and later cached dates)
    Refresh {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        security: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compare cached snapshots with the ledger and fix divergent rows
    Reconcile {
        #[arg(long)]
        issuer: u64,
        #[arg(long)]
        shareholder: u64,
        #[arg(long)]
        security: String,
    },
}

fn report(err: anyhow::Error) -> eyre::Report {
    eyre!("{:#}", err)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_stores(config: &AppConfig) -> Result<(Arc<dyn LedgerDb>, Arc<dyn SnapshotDb>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            log::warn!("Memory backend selected: nothing persists past this command");
            Ok((Arc::new(MemoryLedgerDb::new()), Arc::new(MemorySnapshotDb::new())))
        }
        StorageBackend::Sled => {
            let db = open_db(&config.storage.sled_path).map_err(report)?;
            let ledger = SledLedgerDb::new(&db).map_err(report)?;
            let snapshots = SledSnapshotDb::new(&db).map_err(report)?;
            Ok((Arc::new(ledger), Arc::new(snapshots)))
        }
        StorageBackend::Scylla => {
            let session = scylla_store::connect(&config.storage.scylla).await.map_err(report)?;
            Ok((
                Arc::new(ScyllaLedgerDb::new(session.clone())),
                Arc::new(ScyllaSnapshotDb::new(session)),
            ))
        }
    }
}

fn load_directory(config: &AppConfig) -> Result<Arc<StaticDirectory>> {
    if Path::new(&config.registry_path).exists() {
        Ok(Arc::new(StaticDirectory::load(&config.registry_path).map_err(report)?))
    } else {
        log::warn!(
            "Registry {} not found; postings will fail directory checks",
            config.registry_path
        );
        Ok(Arc::new(StaticDirectory::new()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = configure::load_config_from(&cli.config)?;
    if let Err(e) = setup_logger(&config) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let (ledger_db, snapshot_db) = open_stores(&config).await?;
    let directory = load_directory(&config)?;
    let (events, forwarder) = sink_from_config(config.event_sink, config.event_channel_capacity);
    let cap_table = CapTable::new(
        ledger_db,
        snapshot_db,
        Collaborators {
            securities: directory.clone(),
            shareholders: directory.clone(),
            split_configs: directory,
            events,
        },
        config.split_naming.clone(),
    );

    let result = run(cli.command, &cap_table).await;

    // Dropping the last publisher lets the forwarder drain and stop
    drop(cap_table);
    if let Some(forwarder) = forwarder {
        match forwarder.await {
            Ok(forwarded) => log::debug!("Forwarded {} posting event(s)", forwarded),
            Err(e) => log::warn!("Event forwarder failed: {}", e),
        }
    }
    result
}

async fn run(command: Commands, cap_table: &CapTable) -> Result<()> {
    match command {
        Commands::Post {
            issuer,
            shareholder,
            security,
            kind,
            quantity,
            date,
            restriction,
            note,
            actor,
        } => {
            let kind = TransactionKind::parse(&kind)?;
            let mut request = PostingRequest::new(
                issuer,
                shareholder,
                &security,
                kind,
                quantity,
                date.unwrap_or_else(get_current_date),
            );
            request.restriction_id = restriction;
            request.note = note;
            request.actor = actor;
            let outcome = cap_table.postings.post(request).await?;
            print_json(&outcome.summary())?;
        }
        Commands::Transfer {
            issuer,
            from,
            to,
            security,
            quantity,
            date,
            restriction,
            note,
            actor,
        } => {
            let outcome = cap_table
                .postings
                .transfer(TransferRequest {
                    issuer_id: issuer,
                    from_shareholder: from,
                    to_shareholder: to,
                    security_id: security,
                    quantity,
                    transaction_date: date.unwrap_or_else(get_current_date),
                    restriction_id: restriction,
                    note,
                    actor,
                })
                .await?;
            print_json(&outcome.summary())?;
        }
        Commands::Split {
            issuer,
            shareholder,
            units,
            date,
            note,
            actor,
            dry_run,
        } => {
            let mut request =
                SplitRequest::new(issuer, shareholder, units, date.unwrap_or_else(get_current_date));
            request.note = note;
            request.actor = actor;
            if dry_run {
                let plan = cap_table.splits.plan(&request).await?;
                print_json(&plan)?;
            } else {
                let outcome = cap_table.splits.execute(request).await?;
                print_json(&outcome.summary())?;
            }
        }
        Commands::Balance {
            issuer,
            shareholder,
            security,
            date,
        } => {
            let as_of = date.unwrap_or_else(get_current_date);
            let balance = cap_table
                .engine
                .balance_as_of(issuer, shareholder, &security, as_of)
                .await?;
            println!("{} {} as of {}: {}", shareholder, security, as_of, balance);
        }
        Commands::History {
            issuer,
            shareholder,
            security,
        } => {
            let entries = cap_table.ledger.history(issuer, shareholder, &security).await?;
            print_json(&entries)?;
        }
        Commands::Void { entry, actor } => {
            let outcome = cap_table.postings.void(entry, actor).await?;
            print_json(&outcome.summary())?;
        }
        Commands::Refresh {
            issuer,
            shareholder,
            security,
            date,
        } => {
            let snapshots = cap_table
                .snapshots
                .refresh_from(issuer, shareholder, &security, date.unwrap_or_else(get_current_date))
                .await?;
            print_json(&snapshots)?;
        }
        Commands::Reconcile {
            issuer,
            shareholder,
            security,
        } => {
            let diverged = cap_table.snapshots.reconcile(issuer, shareholder, &security).await?;
            if diverged.is_empty() {
                println!("Snapshots match the ledger");
            } else {
                println!("Overwrote {} divergent snapshot(s)", diverged.len());
                print_json(&diverged)?;
            }
        }
    }

    Ok(())
}
