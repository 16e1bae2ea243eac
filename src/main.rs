use chrono::{NaiveDate, NaiveTime, TimeDelta};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use meetslot::compactor;
use meetslot::config::Config;
use meetslot::engine::{BookingRequest, Engine};
use meetslot::store::WalStore;

fn parse_month(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
}

fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

#[derive(Subcommand)]
enum Command {
    /// Create a single-use share link for an owner
    Link {
        #[arg(long)]
        owner: String,
    },
    /// List the slots of one day
    Slots {
        #[arg(long)]
        owner: String,
        /// YYYY-MM-DD
        #[arg(long)]
        day: NaiveDate,
        /// Meeting length in minutes
        #[arg(long, default_value = "30")]
        duration: i64,
    },
    /// Show a share link's owner and how busy they are this month
    Open {
        #[arg(long)]
        link: Uuid,
    },
    /// Book a slot through a share link
    Book {
        #[arg(long)]
        link: Uuid,
        /// YYYY-MM-DD
        #[arg(long)]
        day: NaiveDate,
        /// HH:MM, owner local time
        #[arg(long, value_parser = parse_time)]
        from: NaiveTime,
        #[arg(long, default_value = "30")]
        duration: i64,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Show an owner's meetings in a month
    Agenda {
        #[arg(long)]
        owner: String,
        /// YYYY-MM
        #[arg(long, value_parser = parse_month)]
        month: NaiveDate,
    },
    /// List public holidays of a year
    Holidays {
        #[arg(long)]
        year: i32,
    },
    /// List the days of a month open for booking
    Days {
        /// YYYY-MM
        #[arg(long, value_parser = parse_month)]
        month: NaiveDate,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn print(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    meetslot::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = WalStore::open(config.wal_path())?;
    info!(data_dir = %config.data_dir.display(), "store ready");
    let engine = Engine::new(store.clone());

    match cli.command {
        Command::Link { owner } => {
            let link = engine.create_share_link(&owner).await?;
            print(&json!({ "link": link.id, "owner": link.owner_id }))?;
        }
        Command::Slots {
            owner,
            day,
            duration,
        } => {
            let duration = TimeDelta::try_minutes(duration).ok_or("duration out of range")?;
            let slots = engine
                .generate_slots(&owner, day, duration, engine.today())
                .await?;
            print(&slots)?;
        }
        Command::Open { link } => {
            print(&engine.open_link(link).await?)?;
        }
        Command::Book {
            link,
            day,
            from,
            duration,
            first_name,
            last_name,
        } => {
            let result = match engine.open_link(link).await {
                Ok(view) => {
                    let request = BookingRequest {
                        owner_id: view.link.owner_id,
                        link_id: link,
                        day,
                        from,
                        duration_minutes: duration,
                        guest_first_name: first_name,
                        guest_last_name: last_name,
                    };
                    engine.try_book(request).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(appointment) => print(&appointment)?,
                Err(e) => {
                    print(&json!({ "error": e.code(), "message": e.to_string() }))?;
                    return Err(e.into());
                }
            }
        }
        Command::Agenda { owner, month } => {
            print(&engine.month_agenda(&owner, month).await?)?;
        }
        Command::Holidays { year } => {
            let table = engine.holidays(year);
            let rows: Vec<_> = table
                .iter()
                .map(|(date, name)| json!({ "date": date, "name": name }))
                .collect();
            print(&rows)?;
        }
        Command::Days { month } => {
            print(&engine.bookable_days(month))?;
        }
    }

    compactor::compact_if_needed(&store, config.compact_threshold).await?;
    Ok(())
}
