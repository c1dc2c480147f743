use anyhow::Result;
use std::path::Path;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match write_default(&path) {
        Ok(()) => {
            println!("Generated config at {}", path.display());
            println!("  Set instance.project before running `sk run`.");
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    AppConfig::default().save_to(path)
}

pub fn path(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    match opts.format {
        OutputFormat::Json => println!(
            "{}",
            opts.to_json(&serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists(),
            }))?
        ),
        OutputFormat::Text => println!("{}", path.display()),
    }
    Ok(())
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `sk config init` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let issues = config.validate();
    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        println!(
            "  Instance {} in {}/{}",
            config.instance.name, config.instance.project, config.instance.zone
        );
        println!(
            "  Idle shutdown after {}s, polling every {}s",
            config.monitor.idle_threshold_secs, config.monitor.poll_interval_secs
        );
        if config.backup.enabled {
            println!("  Backups to gs://{}", config.backup_bucket());
        } else {
            println!("  Backups disabled.");
        }
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sk").join("config.toml");
        write_default(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.monitor.idle_threshold_secs, 300);
        assert_eq!(loaded.game.port, 25565);
        assert_eq!(loaded.rates.currency, "JPY");
    }
}
