mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{account, cycle, setup, watch};

#[derive(Parser)]
#[command(name = "seatwatch", version, about = "Seat watch and auto-reservation for fitness classes")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one watch cycle and print its summary as JSON
    RunOnce,
    /// Run watch cycles on the configured schedule until Ctrl-C
    Daemon,
    /// Write a config template and create the database
    Init,
    /// Store booking-site credentials for a user and reset the login breaker
    Link {
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Manage watch entries
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage the lesson catalog
    Lesson {
        #[command(subcommand)]
        action: LessonAction,
    },
    /// Read-only calls against a linked booking account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum WatchAction {
    /// Create a watch entry, or re-arm the existing one
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        lesson: i64,
        #[arg(long)]
        auto_reserve: bool,
        /// Preferred seats in priority order, e.g. 12,3
        #[arg(long, value_delimiter = ',')]
        seats: Vec<u32>,
    },
    Remove {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Set (or with an empty value, clear) the push address
    SetAddress {
        #[arg(long)]
        user: String,
        #[arg(long)]
        address: String,
    },
}

#[derive(Subcommand)]
enum LessonAction {
    /// Import lessons from a schedule JSON file
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum AccountAction {
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Profile {
        #[arg(long)]
        user: String,
    },
    Tickets {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(seatwatch_core::config::default_config_path);

    match cli.command {
        Commands::Init => setup::init(&config_path),
        Commands::RunOnce => cycle::run_once(&config_path).await,
        Commands::Daemon => cycle::daemon(&config_path).await,
        Commands::Link {
            user,
            email,
            password,
        } => setup::link(&config_path, &user, &email, &password),
        Commands::User {
            action: UserAction::SetAddress { user, address },
        } => setup::set_address(&config_path, &user, &address),
        Commands::Lesson {
            action: LessonAction::Import { file },
        } => setup::import_lessons(&config_path, &file),
        Commands::Watch { action } => match action {
            WatchAction::Add {
                user,
                lesson,
                auto_reserve,
                seats,
            } => watch::add(&config_path, &user, lesson, auto_reserve, seats),
            WatchAction::Remove { id } => watch::remove(&config_path, id),
        },
        Commands::Account { action } => match action {
            AccountAction::History { user, page } => account::history(&config_path, &user, page).await,
            AccountAction::Profile { user } => account::profile(&config_path, &user).await,
            AccountAction::Tickets { user } => account::tickets(&config_path, &user).await,
        },
    }
}
