use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, STATE_ENV};

pub mod commands;

use self::commands::{ListArgs, SourceOverride};

#[derive(Parser, Debug)]
#[command(
    name = "goaltl",
    version,
    about = "Chronological goal timeline for the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// User whose goals are shown (falls back to source.default_user)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// GraphQL endpoint to fetch goals from
    #[arg(long, global = true, conflicts_with = "file")]
    pub endpoint: Option<String>,

    /// Read goals from a JSON file instead ("-" reads piped stdin)
    #[arg(long, global = true)]
    pub file: Option<PathBuf>,

    /// Override the config file location (takes precedence over GOALTL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the state directory (takes precedence over GOALTL_STATE)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Launch the interactive timeline (default)
    Tui,
    /// Print the filtered timeline
    List(ListArgs),
    /// Print the years present in the user's goals
    Years,
    /// Print the users the source knows about
    Users,
}

enum LogTarget {
    Stderr,
    File(PathBuf),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.state_dir {
        env::set_var(STATE_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.clone().unwrap_or(Commands::Tui);
    // keep the alternate screen clean while the interactive view is up
    let target = match command {
        Commands::Tui => LogTarget::File(paths.log_file()),
        _ => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, &target)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);

    let overrides = SourceOverride {
        endpoint: cli.endpoint.clone(),
        file: cli.file.clone(),
    };
    let source = commands::build_source(&config.source, &overrides)?;
    let user_id = cli
        .user
        .clone()
        .or_else(|| config.source.default_user.clone());

    match command {
        Commands::Tui => {
            let mut app = App::new(config.clone(), source, user_id)?;
            commands::run_tui(&mut app)
        }
        Commands::List(args) => {
            commands::list_goals(&config, source.as_ref(), user_id.as_deref(), &args)
        }
        Commands::Years => commands::list_years(&config, source.as_ref(), user_id.as_deref()),
        Commands::Users => commands::list_users(source.as_ref()),
    }
}

fn init_tracing(level: &str, target: &LogTarget) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match target {
            LogTarget::Stderr => fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init(),
            LogTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
        }
        Ok::<_, anyhow::Error>(())
    })
    .map(|_| ())
}
