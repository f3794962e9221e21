//! # sender-cli
//!
//! CLI tool for testing the SenderSDK link protocol.
//!
//! ## Commands
//!
//! - `encode`: Build a wire frame from field values
//! - `decode`: Parse a wire frame and print it as JSON
//! - `simulate`: Run a scripted session against the mock radio
//! - `service-id`: Print the service record UUID
//!
//! ## Example
//!
//! ```bash
//! # Build a frame
//! sender-cli encode --id 1 --action SYNC --battery-percentage 80
//!
//! # Inspect a frame
//! sender-cli decode '1#SYNC#u1#true#false#[a,b]#80#12#'
//!
//! # Watch the session state through a whole connection
//! sender-cli --log-level debug simulate --frames '1#SYNC#u1#true#false#[a,b]#80#12#'
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sender_types::Message;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{frame, simulate};
use config::Config;

/// CLI tool for testing the SenderSDK link protocol.
#[derive(Parser, Debug)]
#[command(name = "sender-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (e.g. sender.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a wire frame from field values
    Encode(Fields),

    /// Parse a wire frame and print the record as JSON
    Decode {
        /// The frame, e.g. '1#SYNC#u1#true#false#[a,b]#80#12#'
        frame: String,
    },

    /// Run a scripted session against the mock radio
    Simulate {
        /// Address of the simulated peer
        #[arg(long, default_value = "00:11:22:33:44:55")]
        peer: String,

        /// Frames the peer sends after the connection is established
        #[arg(long, num_args = 0..)]
        frames: Vec<String>,

        /// Fail the socket after the last frame
        #[arg(long)]
        interrupt: bool,
    },

    /// Print the service record UUID
    ServiceId,
}

/// Message fields, all optional.
#[derive(Args, Debug)]
struct Fields {
    #[arg(long, default_value = "")]
    id: String,
    #[arg(long, default_value = "")]
    action: String,
    #[arg(long, default_value = "")]
    user_id: String,
    #[arg(long, default_value = "")]
    is_started: String,
    #[arg(long, default_value = "")]
    is_finished: String,
    #[arg(long, default_value = "")]
    messages: String,
    #[arg(long, default_value = "")]
    battery_percentage: String,
    #[arg(long, default_value = "")]
    free_storage_gb: String,
}

impl From<Fields> for Message {
    fn from(f: Fields) -> Self {
        Message {
            id: f.id,
            action: f.action,
            user_id: f.user_id,
            is_started: f.is_started,
            is_finished: f.is_finished,
            messages: f.messages,
            battery_percentage: f.battery_percentage,
            free_storage_gb: f.free_storage_gb,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let link = config.link_config()?;

    match cli.command {
        Commands::Encode(fields) => {
            frame::run_encode(&fields.into());
        }
        Commands::Decode { frame } => {
            frame::run_decode(&frame)?;
        }
        Commands::Simulate {
            peer,
            frames,
            interrupt,
        } => {
            simulate::run(link, &peer, &frames, interrupt).await?;
        }
        Commands::ServiceId => {
            println!("{}", link.service_id);
        }
    }

    Ok(())
}
