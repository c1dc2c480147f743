use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::AppConfig;
use crate::core::lifecycle::Controller;
use crate::core::models::status::StopReason;
use crate::core::providers::Collaborators;

/// One controller operation, shared by the one-shot CLI and the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Costs,
    Rates,
}

#[derive(Serialize)]
struct StartPayload<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct RatesPayload<'a> {
    currency: &'a str,
    #[serde(flatten)]
    rates: crate::core::models::rates::RateSnapshot,
}

pub fn build_controller(config: &AppConfig) -> Result<Arc<Controller>> {
    let collaborators =
        Collaborators::from_config(config).context("Failed to set up cloud clients")?;
    Ok(Arc::new(Controller::new(collaborators, config)))
}

fn emit<T: Serialize>(opts: &OutputOptions, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    match opts.format {
        OutputFormat::Json => Ok(opts.to_json(value)?),
        OutputFormat::Text => Ok(text()),
    }
}

/// Run `command` and render its result for `opts`.
///
/// Controller failures come back as `Err` carrying the readable message.
pub async fn execute(controller: &Controller, command: Command, opts: &OutputOptions) -> Result<String> {
    let color = opts.use_color;
    match command {
        Command::Start => {
            let address = controller.request_start().await?;
            emit(opts, &StartPayload { address: &address }, || {
                renderer::render_start(&address, color)
            })
        }
        Command::Stop => {
            let outcome = controller.request_stop(StopReason::Manual).await?;
            emit(opts, &outcome, || renderer::render_stop(&outcome, color))
        }
        Command::Status => {
            let report = controller.request_status().await?;
            emit(opts, &report, || renderer::render_status(&report, color))
        }
        Command::Costs => {
            let report = controller.request_monthly_cost().await?;
            emit(opts, &report, || renderer::render_monthly(&report, color))
        }
        Command::Rates => {
            let rates = controller.current_rates().await;
            let currency = controller.currency();
            emit(opts, &RatesPayload { currency, rates }, || {
                renderer::render_rates(&rates, currency, color)
            })
        }
    }
}

/// One-shot entry point for `sk start|stop|status|costs|rates`.
pub async fn run(command: Command, config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let controller = build_controller(config)?;
    match execute(&controller, command, opts).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::fakes::{FakeBackup, FakeLifecycle, FakeProbe, Harness};
    use chrono::Utc;

    fn text() -> OutputOptions {
        OutputOptions {
            format: OutputFormat::Text,
            pretty: false,
            use_color: false,
        }
    }

    fn json() -> OutputOptions {
        OutputOptions {
            format: OutputFormat::Json,
            ..text()
        }
    }

    fn controller(h: &Harness) -> Controller {
        Controller::new(h.collaborators.clone(), &AppConfig::default())
    }

    #[tokio::test]
    async fn status_renders_text_and_json() {
        let h = Harness::new(
            FakeLifecycle::running(Utc::now()),
            FakeProbe::players(2),
            FakeBackup::ok(),
        );
        let c = controller(&h);

        let output = execute(&c, Command::Status, &text()).await.unwrap();
        assert!(output.contains("2/20"));

        let output = execute(&c, Command::Status, &json()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["running"], true);
        assert_eq!(value["players"]["players_online"], 2);
    }

    #[tokio::test]
    async fn stop_json_is_tagged() {
        let h = Harness::new(FakeLifecycle::stopped(), FakeProbe::players(0), FakeBackup::ok());
        let output = execute(&controller(&h), Command::Stop, &json()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["outcome"], "already_stopped");
    }

    #[tokio::test]
    async fn rates_json_carries_currency() {
        let h = Harness::new(FakeLifecycle::stopped(), FakeProbe::players(0), FakeBackup::ok());
        let output = execute(&controller(&h), Command::Rates, &json()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["currency"], "JPY");
        assert_eq!(value["source"], "live");
        assert!((value["instance_hourly"].as_f64().unwrap() - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn start_failure_is_an_error() {
        let lifecycle = FakeLifecycle::stopped();
        *lifecycle.start_result.lock().unwrap() = Err(
            crate::core::error::KeeperError::Provision("ZONE_RESOURCE_POOL_EXHAUSTED".to_string()),
        );
        let h = Harness::new(lifecycle, FakeProbe::players(0), FakeBackup::ok());
        let err = execute(&controller(&h), Command::Start, &text())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ZONE_RESOURCE_POOL_EXHAUSTED"));
    }
}
