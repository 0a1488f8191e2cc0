use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use rentops_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{Event, EventSender},
    handlers::AppServices,
    models::DEFAULT_LOCATION_ID,
    services::inventory::{run_reconciliation_pass, stock_level_for},
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rentops-cli", version, about = "Operational commands for the RentOps backend")]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Mark past-due rentals as late
    ScanOverdue {
        /// Evaluate as of this date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Run one pass over the stock reconciliation queue
    ReconcileStock {
        #[arg(long, default_value_t = 100)]
        batch_size: u64,
    },
    /// Show the fee summary of a rental
    RentalFees {
        transaction_id: Uuid,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Show the workflow of a return
    ReturnWorkflow { return_id: Uuid },
    /// Show on-hand, available and on-rent stock of an item
    StockLevel {
        item_id: Uuid,
        #[arg(long)]
        location_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::ScanOverdue { as_of } => {
            let report = context
                .services
                .rentals
                .mark_overdue_rentals(as_of.unwrap_or_else(today))
                .await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Scanned {} rentals as of {}: {} marked late, {} skipped, {} failed",
                    report.scanned,
                    report.as_of,
                    report.marked.len(),
                    report.skipped,
                    report.failures.len()
                );
                for mark in &report.marked {
                    println!("- {} • {} → {}", mark.transaction_id, mark.from, mark.to);
                }
                for failure in &report.failures {
                    println!("! {} • {}", failure.transaction_id, failure.error);
                }
            }
        }
        Commands::ReconcileStock { batch_size } => {
            let (report, events) = run_reconciliation_pass(
                &context.db,
                context.services.ledger.as_ref(),
                context.config.returns.reconciliation_max_attempts,
                batch_size,
            )
            .await?;
            context.event_sender.publish_all(events).await;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Processed {} reconciliation tasks: {} resolved, {} retrying, {} failed",
                    report.processed, report.resolved, report.retried, report.failed
                );
            }
        }
        Commands::RentalFees {
            transaction_id,
            as_of,
        } => {
            let summary = context
                .services
                .rentals
                .calculate_fees(transaction_id, as_of.unwrap_or_else(today))
                .await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!("{}", serde_json::to_string(&summary)?);
            }
        }
        Commands::ReturnWorkflow { return_id } => {
            let workflow = context.services.returns.get_workflow(return_id).await?;
            if cli.json {
                print_json(&workflow)?;
            } else {
                println!(
                    "Return {} ({}) is {}",
                    workflow.return_id, workflow.return_type, workflow.current_state
                );
                let next: Vec<String> = workflow
                    .allowed_next_states
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("Next: {}", next.join(", "));
                for entry in &workflow.history {
                    println!(
                        "- {} {} → {}",
                        entry.created_at,
                        entry
                            .from_state
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        entry.to_state
                    );
                }
            }
        }
        Commands::StockLevel {
            item_id,
            location_id,
        } => {
            let location_id = location_id.unwrap_or(DEFAULT_LOCATION_ID);
            match stock_level_for(&context.db, item_id, location_id).await? {
                Some(level) if cli.json => print_json(&serde_json::json!({
                    "item_id": level.item_id,
                    "location_id": level.location_id,
                    "quantity_on_hand": level.quantity_on_hand,
                    "quantity_available": level.quantity_available,
                    "quantity_on_rent": level.quantity_on_rent,
                }))?,
                Some(level) => println!(
                    "Item {} at {}: {} on hand, {} available, {} on rent",
                    level.item_id,
                    level.location_id,
                    level.quantity_on_hand,
                    level.quantity_available,
                    level.quantity_on_rent
                ),
                None => println!("No stock recorded for item {} at {}", item_id, location_id),
            }
        }
    }

    context.shutdown().await
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = Arc::new(EventSender::new(event_tx));

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "rentops_cli", event = ?event, "received async event");
            }
        });

        let services = AppServices::new(db.clone(), event_sender.clone(), &config.returns);

        Ok(Self {
            config,
            db,
            event_sender,
            services,
        })
    }
}

impl CliContext {
    /// Drops the services so the pool is uniquely owned, then closes it.
    async fn shutdown(self) -> Result<()> {
        let Self { db, services, .. } = self;
        drop(services);
        if let Ok(pool) = Arc::try_unwrap(db) {
            db::close_pool(pool).await?;
        }
        Ok(())
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
