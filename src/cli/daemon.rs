use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info};

use crate::cli::commands::{self, Command};
use crate::cli::output::OutputOptions;
use crate::core::config::AppConfig;
use crate::core::lifecycle::Controller;
use crate::core::monitor::IdleScheduler;

const HELP: &str = "Commands: start, stop, status, costs, rates, help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Run(Command),
    Help,
    Empty,
    Unknown,
}

/// Parse one stdin line. Leading `!` and case are ignored so chat-style
/// commands (`!Start`) work too.
pub fn parse_line(line: &str) -> Line {
    let word = line.trim().trim_start_matches('!').to_lowercase();
    match word.as_str() {
        "" => Line::Empty,
        "start" => Line::Run(Command::Start),
        "stop" => Line::Run(Command::Stop),
        "status" => Line::Run(Command::Status),
        "costs" | "cost" => Line::Run(Command::Costs),
        "rates" => Line::Run(Command::Rates),
        "help" | "?" => Line::Help,
        _ => Line::Unknown,
    }
}

/// Run a command in its own task so a long stop does not block the prompt.
fn dispatch(controller: &Arc<Controller>, command: Command, opts: &OutputOptions) {
    let controller = controller.clone();
    let opts = opts.clone();
    tokio::spawn(async move {
        match commands::execute(&controller, command, &opts).await {
            Ok(output) => println!("{}", output),
            Err(e) => eprintln!("{}", e),
        }
    });
}

/// Refuse to start the long-running loop on a config `sk config check` rejects.
fn ensure_runnable(config: &AppConfig) -> Result<()> {
    let issues = config.validate();
    if !issues.is_empty() {
        anyhow::bail!(
            "Config issues found in {}:\n  - {}",
            AppConfig::config_path().display(),
            issues.join("\n  - ")
        );
    }
    Ok(())
}

/// `sk run`: idle monitor plus stdin command loop, until Ctrl-C.
pub async fn run(config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    ensure_runnable(config)?;

    let controller = commands::build_controller(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = IdleScheduler::new(controller.clone(), &config.monitor);
    let monitor = tokio::spawn(scheduler.run(shutdown_rx));

    info!(
        instance = %config.instance.name,
        zone = %config.instance.zone,
        "serverkeeper running"
    );
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Line::Run(command) => dispatch(&controller, command, opts),
                    Line::Help => println!("{}", HELP),
                    Line::Empty => {}
                    Line::Unknown => println!("Unknown command '{}'. {}", line.trim(), HELP),
                },
                Ok(None) => {
                    info!("stdin closed, monitor keeps running until Ctrl-C");
                    stdin_open = false;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor.await {
        error!(error = %e, "idle monitor task failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_loosely() {
        assert_eq!(parse_line("start"), Line::Run(Command::Start));
        assert_eq!(parse_line("  !Stop \n"), Line::Run(Command::Stop));
        assert_eq!(parse_line("STATUS"), Line::Run(Command::Status));
        assert_eq!(parse_line("cost"), Line::Run(Command::Costs));
        assert_eq!(parse_line("rates"), Line::Run(Command::Rates));
        assert_eq!(parse_line("?"), Line::Help);
        assert_eq!(parse_line("   "), Line::Empty);
        assert_eq!(parse_line("reboot"), Line::Unknown);
    }

    #[test]
    fn invalid_config_is_refused_before_monitor_starts() {
        let mut config = AppConfig::default();
        config.instance.project = "craft-123".to_string();
        assert!(ensure_runnable(&config).is_ok());

        config.monitor.poll_interval_secs = 0;
        let err = ensure_runnable(&config).unwrap_err().to_string();
        assert!(err.contains("monitor.poll_interval_secs must be greater than 0"));
    }

    #[tokio::test]
    async fn zero_interval_config_never_reaches_the_scheduler() {
        let mut config = AppConfig::default();
        config.instance.project = "craft-123".to_string();
        config.monitor.poll_interval_secs = 0;
        let opts = OutputOptions::resolve(false, false, true, &config.settings);

        // Returns the validation error instead of spawning a panicking ticker.
        let err = run(&config, &opts).await.unwrap_err().to_string();
        assert!(err.contains("poll_interval_secs"));
    }
}
