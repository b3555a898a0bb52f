use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::gateway::LocalGateway;
use crate::session::NoteSession;

pub mod commands;

use self::commands::ShellArgs;

#[derive(Parser, Debug)]
#[command(
    name = "notelive",
    version,
    about = "Note-taking client with live subscription-driven sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTELIVE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Act as this user instead of the configured profile
    #[arg(long)]
    pub username: Option<String>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive note shell (default)
    Shell(ShellArgs),
    /// Print the resolved configuration locations
    Paths,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTELIVE_CONFIG", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;

    let command = cli.command.unwrap_or(Commands::Shell(ShellArgs::default()));
    match command {
        Commands::Shell(args) => {
            let username = cli.username.unwrap_or_else(|| config.username.clone());
            let gateway = LocalGateway::new(&username);
            gateway.seed(config.seed_notes.iter().cloned());
            let session = NoteSession::start(Arc::new(gateway.clone()), &gateway)
                .context("starting note session")?;
            commands::run_shell(session, gateway, args)
        }
        Commands::Paths => {
            let paths = loader.paths();
            println!("config  {}", paths.config_file.display());
            println!("state   {}", paths.state_dir.display());
            println!("logs    {}", paths.log_dir.display());
            Ok(())
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
