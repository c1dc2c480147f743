use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::auth::AccessTokenSource;
use crate::core::config::BackupConfig;
use crate::core::error::{chain, KeeperError};
use crate::core::process::{require, run_command, shell_quote};
use crate::core::providers::fetch::send_json;
use crate::core::providers::minecraft::split_address;
use crate::core::providers::BackupService;

const UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1";
const REMOTE_ARCHIVE: &str = "/tmp/world_backup.tar.gz";
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(900);

const SSH_OPTIONS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"];

#[derive(Deserialize)]
struct UploadedObject {
    name: String,
}

pub fn object_name(at: chrono::DateTime<Utc>) -> String {
    format!("world_backup_{}.tar.gz", at.format("%Y%m%d_%H%M%S"))
}

/// Remote command that packs the world directory into [`REMOTE_ARCHIVE`].
fn archive_command(world_dir: &str, world_name: &str) -> String {
    format!(
        "cd {} && tar -czf {} {}",
        shell_quote(world_dir),
        REMOTE_ARCHIVE,
        shell_quote(world_name)
    )
}

/// Tar the world over ssh, pull it with scp, and upload it to Cloud Storage.
pub struct WorldBackup {
    client: reqwest::Client,
    tokens: Arc<AccessTokenSource>,
    ssh_user: String,
    world_dir: String,
    world_name: String,
    bucket: String,
    staging_dir: PathBuf,
}

impl WorldBackup {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<AccessTokenSource>,
        config: &BackupConfig,
        bucket: String,
    ) -> Self {
        Self {
            client,
            tokens,
            ssh_user: config.ssh_user.clone(),
            world_dir: config.world_dir.clone(),
            world_name: config.world_name.clone(),
            bucket,
            staging_dir: std::env::temp_dir(),
        }
    }

    async fn pull_archive(&self, host: &str, local: &std::path::Path) -> Result<()> {
        require("ssh", "world backups")?;
        require("scp", "world backups")?;
        let target = format!("{}@{}", self.ssh_user, host);

        let remote_cmd = archive_command(&self.world_dir, &self.world_name);
        let mut ssh_args: Vec<&str> = SSH_OPTIONS.to_vec();
        ssh_args.extend([target.as_str(), remote_cmd.as_str()]);
        run_command("ssh", &ssh_args, TRANSFER_TIMEOUT)
            .await
            .context("Failed to archive world on server")?;

        let source = format!("{}:{}", target, REMOTE_ARCHIVE);
        let local_str = local.to_string_lossy();
        let mut scp_args: Vec<&str> = SSH_OPTIONS.to_vec();
        scp_args.extend([source.as_str(), &*local_str]);
        run_command("scp", &scp_args, TRANSFER_TIMEOUT)
            .await
            .context("Failed to copy world archive")?;
        Ok(())
    }

    async fn upload(&self, local: &std::path::Path, object: &str) -> Result<String> {
        let bytes = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read {}", local.display()))?;
        let token = self.tokens.token().await?;
        let uploaded: UploadedObject = send_json(
            self.client
                .post(format!("{}/b/{}/o", UPLOAD_API, self.bucket))
                .query(&[("uploadType", "media"), ("name", object)])
                .bearer_auth(token)
                .header("Content-Type", "application/gzip")
                .timeout(UPLOAD_TIMEOUT)
                .body(bytes),
            "Cloud Storage upload",
        )
        .await?;
        Ok(uploaded.name)
    }

    async fn backup(&self, address: &str) -> Result<String> {
        let (host, _) = split_address(address, 0);
        let object = object_name(Utc::now());
        let local = self.staging_dir.join(&object);

        let result = async {
            self.pull_archive(&host, &local).await?;
            self.upload(&local, &object).await
        }
        .await;

        if local.exists() {
            if let Err(e) = tokio::fs::remove_file(&local).await {
                warn!(path = %local.display(), error = %e, "failed to remove staged backup");
            }
        }
        result
    }
}

#[async_trait]
impl BackupService for WorldBackup {
    async fn run(&self, address: &str) -> Result<String, KeeperError> {
        let name = self
            .backup(address)
            .await
            .map_err(|e| KeeperError::Backup(chain(&e)))?;
        info!(bucket = %self.bucket, object = %name, "world backup uploaded");
        Ok(name)
    }
}
