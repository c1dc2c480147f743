use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Run a command with arguments and a timeout, returning trimmed stdout.
///
/// The child is killed if the timeout elapses first.
pub async fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(cmd)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .with_context(|| format!("Command `{}` timed out after {}s", cmd, timeout.as_secs()))?
    .with_context(|| format!("Failed to execute `{}`", cmd))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("`{}` exited with {}: {}", cmd, output.status, stderr.trim());
    }

    let stdout =
        String::from_utf8(output.stdout).with_context(|| format!("Non-UTF8 output from `{}`", cmd))?;
    Ok(stdout.trim().to_string())
}

/// Check if a binary exists in PATH. Returns the full path if found.
pub fn which(binary: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(binary))
            .find(|p| p.is_file())
    })
}

/// Like [`which`], but explains what is missing.
pub fn require(binary: &str, purpose: &str) -> Result<PathBuf> {
    which(binary).with_context(|| format!("`{}` not found in PATH (needed for {})", binary, purpose))
}

/// Quote `value` for a POSIX shell running on the remote side of `ssh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_existing_binary() {
        assert!(which("sh").is_some());
    }

    #[test]
    fn require_names_missing_binary() {
        let err = require("totally_nonexistent_binary_xyz", "backups").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("totally_nonexistent_binary_xyz"));
        assert!(msg.contains("backups"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/minecraft/server"), "'/minecraft/server'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn run_command_returns_trimmed_stdout() {
        let result = run_command("sh", &["-c", "echo '  ya29.token  '"], Duration::from_secs(5)).await;
        assert_eq!(result.unwrap(), "ya29.token");
    }

    #[tokio::test]
    async fn run_command_reports_stderr_on_failure() {
        let err = run_command("sh", &["-c", "echo denied >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn run_command_times_out() {
        let err = run_command("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
