use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;

use roombook::audit::AuditLog;
use roombook::config::EngineConfig;
use roombook::engine::ReservationStore;
use roombook::model::{RoomId, UserId};

/// roombook - inspect and maintain room reservation journals
#[derive(Debug, Parser)]
#[command(name = "roombook")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the journals
    #[arg(long, env = "ROOMBOOK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print committed reservations as JSON
    Reservations {
        /// Only this room
        #[arg(long)]
        room: Option<RoomId>,

        /// Only this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print a user's notification records as JSON, newest first
    Notifications {
        #[arg(long)]
        user: UserId,
    },
    /// Rewrite both journals, dropping days and notifications past retention
    Compact,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    match cli.command {
        Command::Reservations { room, date } => {
            let store = ReservationStore::open(&config.reservations_path())?;
            let rows: Vec<_> = store
                .all_reservations()
                .await
                .into_iter()
                .filter(|r| room.is_none_or(|id| r.room_id == id))
                .filter(|r| date.is_none_or(|d| r.date == d))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Notifications { user } => {
            let audit = AuditLog::open(&config.notifications_path())?;
            println!("{}", serde_json::to_string_pretty(&audit.for_user(user))?);
        }
        Command::Compact => {
            let keep_from = config.retention_cutoff(Local::now().date_naive());
            let store = ReservationStore::open(&config.reservations_path())?;
            let appends = store.appends_since_compact().await;
            store.compact(keep_from).await?;
            AuditLog::open(&config.notifications_path())?
                .compact(keep_from)
                .await?;
            info!(
                data_dir = %config.data_dir.display(),
                appends,
                %keep_from,
                "journals compacted"
            );
        }
    }
    Ok(())
}
