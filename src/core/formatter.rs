use chrono::Duration;

use crate::core::models::cost::MonthlyCostReport;
use crate::core::models::rates::{RateSnapshot, RateSource};
use crate::core::models::status::{BackupOutcome, StatusReport, StopReport};

/// Returns "H:MM:SS"; hours are not wrapped at 24. Negative durations clamp to zero.
pub fn format_runtime(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

pub fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency.to_uppercase().as_str() {
        "JPY" | "CNY" => Some("¥"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        _ => None,
    }
}

/// Returns "¥18.00", or "18.00 CHF" for currencies without a known symbol.
pub fn format_money(amount: f64, currency: &str) -> String {
    match currency_symbol(currency) {
        Some(symbol) => format!("{}{:.2}", symbol, amount),
        None => format!("{:.2} {}", amount, currency.to_uppercase()),
    }
}

pub fn format_start_message(address: &str) -> String {
    format!("Server started. Address: {}", address)
}

pub fn format_backup(outcome: &BackupOutcome) -> String {
    match outcome {
        BackupOutcome::Stored(object) => format!("stored as {}", object),
        BackupOutcome::Failed(reason) => format!("FAILED ({})", reason),
        BackupOutcome::Disabled => "disabled".to_string(),
    }
}

/// Multi-line summary sent once a stop sequence completes.
pub fn format_stop_summary(report: &StopReport) -> String {
    let mut lines = vec![
        format!("Server stopped ({}).", report.reason),
        format!("Backup: {}", format_backup(&report.backup)),
    ];
    match &report.session {
        Some(session) => {
            lines.push(format!("Runtime: {}", format_runtime(session.runtime())));
            lines.push(format!(
                "Session cost: {}",
                format_money(session.session_cost, &report.currency)
            ));
        }
        None => lines.push("Session cost: unavailable".to_string()),
    }
    if let Some(total) = report.month_to_date {
        lines.push(format!(
            "Month to date: {}",
            format_money(total, &report.currency)
        ));
    }
    lines.join("\n")
}

pub fn format_status_message(report: &StatusReport) -> String {
    if !report.running {
        return "Server is stopped.".to_string();
    }

    let mut lines = vec![format!(
        "Server is running at {}",
        report.address.as_deref().unwrap_or("(no address)")
    )];
    match (&report.players, report.reachable) {
        (Some(ping), true) => lines.push(format!(
            "Players: {}/{} ({} ms)",
            ping.players_online, ping.players_max, ping.latency_ms
        )),
        _ => lines.push("Game server is not responding.".to_string()),
    }
    if let Some(session) = &report.session {
        lines.push(format!("Uptime: {}", format_runtime(session.runtime())));
        lines.push(format!(
            "Session cost: {}",
            format_money(session.session_cost, &report.currency)
        ));
    }
    lines.join("\n")
}

pub fn format_monthly_message(report: &MonthlyCostReport) -> String {
    let mut lines = vec![format!(
        "Costs since {} (1 USD = {:.2} {}):",
        report.window_start.format("%Y-%m-%d"),
        report.exchange_rate,
        report.currency
    )];
    for (service, cost) in &report.by_service {
        lines.push(format!("  {}: {}", service, format_money(*cost, &report.currency)));
    }
    lines.push(format!(
        "Total: {}",
        format_money(report.total_cost, &report.currency)
    ));
    lines.join("\n")
}

pub fn format_rates_message(rates: &RateSnapshot, currency: &str) -> String {
    let source = match rates.source {
        RateSource::Live => "live",
        RateSource::Fallback => "fallback",
    };
    format!(
        "Instance: {}/h\nDisk: {}/h\nTotal: {}/h ({} rates, 1 USD = {:.2} {})",
        format_money(rates.instance_hourly, currency),
        format_money(rates.disk_hourly, currency),
        format_money(rates.hourly_total(), currency),
        source,
        rates.exchange_rate,
        currency
    )
}
