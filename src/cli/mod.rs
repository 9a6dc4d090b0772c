//! CLI module for Switchyard
//!
//! Provides commands:
//! - `send`: Route one prompt through the provider fallback chain
//! - `status`: Circuit, statistics and quota health per provider
//! - `quota`: Spend and request-window usage per provider
//! - `providers`: List configured providers

use crate::app::{init_app, load_config};
use clap::{Parser, Subcommand};

pub mod providers;
pub mod quota;
pub mod send;
pub mod status;

/// Switchyard CLI
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Resilient multi-provider AI request routing")]
#[command(version)]
pub struct Cli {
    /// Emit JSON logs
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt, falling back across providers
    Send(send::SendArgs),
    /// Show provider health
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show quota usage
    Quota {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Refresh every two seconds
        #[arg(long)]
        watch: bool,
    },
    /// List configured providers
    Providers,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config()?;
    let app = init_app(&config, |var| std::env::var(var).ok()).await?;

    match command {
        Commands::Send(args) => send::run(&app, args).await,
        Commands::Status { json } => status::run(&app, json).await,
        Commands::Quota { json, watch } => quota::run(&app, json, watch).await,
        Commands::Providers => providers::run(&app),
    }
}
