//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod chat_loop;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::core::engine::ConversationEngine;

#[derive(Parser)]
#[command(name = "deepchat")]
#[command(about = "A terminal chat client for the DeepSeek completion API")]
#[command(
    long_about = "Deepchat is a terminal chat client that connects to the DeepSeek completion \
API and keeps every conversation in named, persistent sessions.\n\n\
Configuration:\n\
  Settings (API key, model, sampling parameters) live in config.json and can\n\
  be edited with 'deepchat config set' or the /set command inside the shell.\n\n\
Shell commands:\n\
  /sessions         List sessions\n\
  /new [name]       Create a session (named, or timestamped if no name given)\n\
  /switch <name>    Switch to a session\n\
  /delete <name>    Delete a session\n\
  /history          Show the current session transcript\n\
  /edit <n> <text>  Replace the content of message n\n\
  /remove <n>       Delete message n\n\
  /config           Show the configuration\n\
  /set <key> <val>  Update one configuration value\n\
  /help             Show the command list\n\
  /quit             Exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config.json (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to sessions.json (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub sessions: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat shell (default)
    Chat,
    /// Print or update configuration values
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_key, model, temperature, max_tokens,
        /// top_p, frequency_penalty, presence_penalty)
        key: String,
        /// Value to set for the key
        value: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);
    let sessions_path = args.sessions.unwrap_or_else(default_sessions_path);
    let mut engine = ConversationEngine::new(config_path, sessions_path);

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat_loop::run(&mut engine).await,
        Commands::Config { action } => {
            match action.unwrap_or(ConfigAction::Show) {
                ConfigAction::Show => print_config(engine.config()),
                ConfigAction::Set { key, value } => match engine.update_config(&key, &value) {
                    Ok(()) => println!("✅ Set {key}"),
                    Err(e) => {
                        eprintln!("❌ {e}");
                        std::process::exit(1);
                    }
                },
            }
            Ok(())
        }
    }
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("org", "permacommons", "deepchat")
        .map(|dirs| dirs.config_dir().join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

fn default_sessions_path() -> PathBuf {
    ProjectDirs::from("org", "permacommons", "deepchat")
        .map(|dirs| dirs.data_dir().join("sessions.json"))
        .unwrap_or_else(|| PathBuf::from("sessions.json"))
}

pub(crate) fn print_config(config: &Config) {
    println!("api_key: {}", mask_api_key(&config.api_key));
    println!("model: {}", config.model);
    println!("temperature: {}", config.temperature);
    println!("max_tokens: {}", config.max_tokens);
    println!("top_p: {}", config.top_p);
    println!("frequency_penalty: {}", config.frequency_penalty);
    println!("presence_penalty: {}", config.presence_penalty);
}

/// Mask the API key for display, keeping only the last four characters.
pub(crate) fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}
