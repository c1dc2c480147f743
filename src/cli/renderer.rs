use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{format_backup, format_money, format_runtime};
use crate::core::models::cost::MonthlyCostReport;
use crate::core::models::rates::{RateSnapshot, RateSource};
use crate::core::models::status::{BackupOutcome, StatusReport, StopOutcome};

/// Render the server status block.
///
/// Layout:
/// ```text
///  Server   Running
///   Address  34.84.10.20
///   Players  3/20 (12 ms)
///   Uptime   1:30:00
///   Cost     ¥18.45
/// ```
pub fn render_status(report: &StatusReport, use_color: bool) -> String {
    control::set_override(use_color);

    let state: ColoredString = if report.running {
        "Running".green()
    } else {
        "Stopped".dimmed()
    };
    let mut lines = vec![format!(" {}   {}", "Server".bold(), state)];
    if !report.running {
        return lines.join("\n");
    }

    if let Some(address) = &report.address {
        lines.push(format!("  {}  {}", "Address".cyan(), address));
    }
    let players = match &report.players {
        Some(ping) => format!(
            "{}/{} ({} ms)",
            ping.players_online, ping.players_max, ping.latency_ms
        )
        .normal(),
        None => "not responding".yellow(),
    };
    lines.push(format!("  {}  {}", "Players".cyan(), players));

    if let Some(session) = &report.session {
        lines.push(format!(
            "  {}   {}",
            "Uptime".cyan(),
            format_runtime(session.runtime())
        ));
        lines.push(format!(
            "  {}     {}",
            "Cost".cyan(),
            format_money(session.session_cost, &report.currency)
        ));
    }
    lines.join("\n")
}

pub fn render_start(address: &str, use_color: bool) -> String {
    control::set_override(use_color);
    format!(" {} at {}", "Server started".green().bold(), address)
}

pub fn render_stop(outcome: &StopOutcome, use_color: bool) -> String {
    control::set_override(use_color);

    let report = match outcome {
        StopOutcome::AlreadyInProgress => {
            return format!(" {}", "A stop is already in progress".yellow())
        }
        StopOutcome::AlreadyStopped => return format!(" {}", "Server is already stopped".dimmed()),
        StopOutcome::Stopped(report) => report,
    };

    let mut lines = vec![format!(
        " {} ({})",
        "Server stopped".bold(),
        report.reason
    )];
    let backup_text = format_backup(&report.backup);
    let backup = match report.backup {
        BackupOutcome::Stored(_) => backup_text.green(),
        BackupOutcome::Failed(_) => backup_text.red(),
        BackupOutcome::Disabled => backup_text.dimmed(),
    };
    lines.push(format!("  {}    {}", "Backup".cyan(), backup));

    match &report.session {
        Some(session) => {
            lines.push(format!(
                "  {}   {}",
                "Runtime".cyan(),
                format_runtime(session.runtime())
            ));
            lines.push(format!(
                "  {}      {}",
                "Cost".cyan(),
                format_money(session.session_cost, &report.currency)
            ));
        }
        None => lines.push(format!("  {}      {}", "Cost".cyan(), "unavailable".dimmed())),
    }
    if let Some(total) = report.month_to_date {
        lines.push(format!(
            "  {}     {}",
            "Month".cyan(),
            format_money(total, &report.currency)
        ));
    }
    lines.join("\n")
}

pub fn render_monthly(report: &MonthlyCostReport, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(
        " {} {} to {}",
        "Costs".bold(),
        report.window_start.format("%b %d"),
        report.window_end.format("%b %d")
    )];
    for (service, cost) in &report.by_service {
        lines.push(format!(
            "    {:<24} {}",
            service,
            format_money(*cost, &report.currency)
        ));
    }
    lines.push(format!(
        "  {}     {}",
        "Total".cyan(),
        format_money(report.total_cost, &report.currency).bold()
    ));
    lines.push(
        format!("  1 USD = {:.2} {}", report.exchange_rate, report.currency)
            .dimmed()
            .to_string(),
    );
    lines.join("\n")
}

pub fn render_rates(rates: &RateSnapshot, currency: &str, use_color: bool) -> String {
    control::set_override(use_color);

    let source = match rates.source {
        RateSource::Live => "live".green(),
        RateSource::Fallback => "fallback".yellow(),
    };
    [
        format!(" {} ({})", "Hourly rates".bold(), source),
        format!(
            "  {}  {}",
            "Instance".cyan(),
            format_money(rates.instance_hourly, currency)
        ),
        format!(
            "  {}      {}",
            "Disk".cyan(),
            format_money(rates.disk_hourly, currency)
        ),
        format!(
            "  {}     {}",
            "Total".cyan(),
            format_money(rates.hourly_total(), currency)
        ),
        format!(
            "  1 USD = {:.2} {}, as of {}",
            rates.exchange_rate,
            currency,
            rates.computed_at.format("%Y-%m-%d %H:%M UTC")
        )
        .dimmed()
        .to_string(),
    ]
    .join("\n")
}
