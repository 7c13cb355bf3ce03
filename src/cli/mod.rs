use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod account;
pub mod chat;
pub mod history;
pub mod init;
pub mod migrate;
pub mod serve;

use crate::api;
use crate::core::{AppConfig, logging};

#[derive(Subcommand)]
enum Command {
    /// Create the database
    Init {},
    /// Migrate the db schema
    Migrate {},
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start an interactive chat session
    Chat {
        /// Persona that seeds the system message, "none" for no
        /// system message
        #[arg(long)]
        persona: Option<String>,
        /// Log in to save and search conversations
        #[arg(long)]
        handle: Option<String>,
    },
    /// Create an account or reset its password
    Account {
        #[arg(long)]
        handle: String,
    },
    /// List saved conversations
    History {
        #[arg(long)]
        handle: String,
    },
    /// Search saved conversations
    Search {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        keyword: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Interactive and one-shot commands only surface warnings so their
/// output stays readable.
fn log_filter(command: &Option<Command>) -> &'static str {
    match command {
        Some(Command::Serve { .. }) => api::LOG_FILTER,
        _ => "palaver=warn",
    }
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    // Before loading config so that config problems get logged
    logging::init(log_filter(&args.command));
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Init {}) => {
            init::run(&config.db_path).await?;
        }
        Some(Command::Migrate {}) => {
            migrate::run(&config.db_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat { persona, handle }) => {
            chat::run(config, persona, handle).await?;
        }
        Some(Command::Account { handle }) => {
            account::run(&handle, &config.db_path).await?;
        }
        Some(Command::History { handle }) => {
            history::list(&handle, &config.db_path).await?;
        }
        Some(Command::Search { handle, keyword }) => {
            history::search(&handle, &keyword, &config.db_path).await?;
        }
        None => {}
    }

    Ok(())
}
