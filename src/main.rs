mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::commands::Command;
use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "sk",
    about = "Start, stop and cost-track a cloud-hosted game server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Shorthand for JSON output
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the idle monitor and accept commands on stdin
    Run,
    /// Start the instance
    Start,
    /// Back up the world and stop the instance
    Stop,
    /// Show instance state, players and session cost
    Status,
    /// Show month-to-date costs from the billing export
    Costs,
    /// Show the current hourly rates
    Rates,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the config file location
    Path,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sk=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A broken file must not stop `sk config check` from reporting it.
    let config = match cli.command {
        Commands::Config { .. } => AppConfig::load().unwrap_or_default(),
        _ => AppConfig::load()?,
    };
    let output_opts = cli::output::OutputOptions::resolve(
        cli.json,
        cli.pretty,
        cli.no_color,
        &config.settings,
    );

    match cli.command {
        Commands::Run => cli::daemon::run(&config, &output_opts).await?,
        Commands::Start => cli::commands::run(Command::Start, &config, &output_opts).await?,
        Commands::Stop => cli::commands::run(Command::Stop, &config, &output_opts).await?,
        Commands::Status => cli::commands::run(Command::Status, &config, &output_opts).await?,
        Commands::Costs => cli::commands::run(Command::Costs, &config, &output_opts).await?,
        Commands::Rates => cli::commands::run(Command::Rates, &config, &output_opts).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Path => cli::config_cmd::path(&output_opts)?,
        },
    }

    Ok(())
}
