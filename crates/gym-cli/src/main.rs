//! gymctl - command-line client for the gym API.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing::debug;

/// gymctl - Sign in and track workouts from the terminal.
#[derive(Parser)]
#[command(name = "gymctl")]
#[command(about = "Command-line client for the gym API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true, env = "GYMAPP_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Logout and clear the stored session
    Logout,

    /// Check authentication status
    Status,

    /// Create an account and log in
    Signup,

    /// List muscle groups
    Groups,

    /// List exercises for a muscle group
    Exercises {
        /// Group name
        group: String,
    },

    /// Show exercise details
    Exercise {
        /// Exercise ID
        id: String,
    },

    /// Show workout history
    History,

    /// Mark an exercise as done
    MarkDone {
        /// Exercise ID
        id: String,
    },

    /// Change your display name
    Rename {
        /// New name
        name: String,
    },

    /// Change your password
    Passwd,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = commands::connect(cli.log_level.as_deref()).await?;
    let format = &cli.format;

    match cli.command {
        Commands::Login { email } => commands::login(&client, email, format).await,
        Commands::Logout => commands::logout(&client, format).await,
        Commands::Status => commands::status(&client, format).await,
        Commands::Signup => commands::signup(&client, format).await,
        Commands::Groups => commands::groups(&client, format).await,
        Commands::Exercises { group } => commands::exercises(&client, &group, format).await,
        Commands::Exercise { id } => commands::exercise(&client, &id, format).await,
        Commands::History => commands::history(&client, format).await,
        Commands::MarkDone { id } => commands::mark_done(&client, &id, format).await,
        Commands::Rename { name } => commands::rename(&client, &name, format).await,
        Commands::Passwd => commands::passwd(&client, format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        debug!(error = ?e, "Command failed");
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
