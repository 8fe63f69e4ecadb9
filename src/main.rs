use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::ConfigLoader;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(
    version,
    about = "Resilient session-continuity proxy for session-authenticated chat backends"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, help = "Load this config file instead of the global/project chain")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay
    Serve {
        #[arg(long, help = "Bind address (default: server.host)")]
        host: Option<String>,
        #[arg(long, short, help = "Listen port (default: server.port)")]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect the credential source chain
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
}

#[derive(Subcommand)]
enum CredentialsAction {
    /// Obtain a credential pair and report the result
    Check {
        #[arg(long, help = "Bypass override and cache, harvest fresh credentials")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mchatrelay encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let load_config = || match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };

    match &cli.command {
        Commands::Serve { host, port } => {
            let config = load_config()?;
            let rt = Runtime::new()?;
            rt.block_on(chatrelay::cli::commands::serve::run(
                config,
                host.clone(),
                *port,
            ))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let config = load_config()?;
                chatrelay::cli::commands::config::show(&config, format)?;
            }
            ConfigAction::Path => {
                chatrelay::cli::commands::config::path()?;
            }
        },
        Commands::Credentials { action } => match action {
            CredentialsAction::Check { force } => {
                let config = load_config()?;
                let rt = Runtime::new()?;
                rt.block_on(chatrelay::cli::commands::credentials::check(&config, *force))?;
            }
        },
    }

    Ok(())
}
