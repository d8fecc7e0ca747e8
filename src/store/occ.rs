//! Nextcloud's `occ` command line, driven as a subprocess.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use super::DomainStore;
use crate::config::Config;
use crate::error::{CharmError, Result};
use crate::exec::{CommandSpec, Runner};

const TRUSTED_DOMAINS: &str = "trusted_domains";

/// Subset of `occ status --output=json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OccStatus {
    pub installed: bool,
    #[serde(default)]
    pub versionstring: String,
    #[serde(default)]
    pub maintenance: bool,
}

pub struct Occ {
    runner: Arc<dyn Runner>,
    occ: PathBuf,
    install_dir: PathBuf,
    php: String,
    run_as: Option<String>,
}

impl Occ {
    pub fn new(runner: Arc<dyn Runner>, cfg: &Config) -> Self {
        Self {
            runner,
            occ: cfg.occ_path(),
            install_dir: cfg.install_dir.clone(),
            php: cfg.php.clone(),
            run_as: cfg.run_as.clone(),
        }
    }

    /// `occ <args..>`, wrapped in `sudo -u <user>` when configured.
    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let occ = self.occ.to_string_lossy().into_owned();
        let cmd = match &self.run_as {
            Some(user) => CommandSpec::new("sudo").args(["-u", user.as_str(), self.php.as_str()]),
            None => CommandSpec::new(self.php.as_str()),
        };
        cmd.arg(occ).args(args).current_dir(&self.install_dir)
    }

    async fn run(&self, cmd: CommandSpec) -> Result<String> {
        let out = self.runner.run_checked(&cmd).await?;
        Ok(out.stdout)
    }

    pub async fn db_add_missing_indices(&self) -> Result<String> {
        info!("Adding missing database indices");
        self.run(self.command(["db:add-missing-indices"])).await
    }

    pub async fn db_convert_filecache_bigint(&self) -> Result<String> {
        info!("Converting filecache columns to bigint");
        self.run(self.command(["db:convert-filecache-bigint", "--no-interaction"]))
            .await
    }

    pub async fn maintenance_mode(&self, enable: bool) -> Result<String> {
        let flag = if enable { "--on" } else { "--off" };
        info!("Setting maintenance mode {}", flag);
        self.run(self.command(["maintenance:mode", flag])).await
    }

    pub async fn status(&self) -> Result<OccStatus> {
        let cmd = self.command(["status", "--output=json", "--no-warnings"]);
        let stdout = self.run(cmd.clone()).await?;
        // occ may print PHP notices ahead of the JSON document.
        let json = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| CharmError::external(&cmd, "empty status output"))?;
        serde_json::from_str(json.trim())
            .map_err(|e| CharmError::external(&cmd, format!("unparsable status: {}", e)))
    }
}

#[async_trait]
impl DomainStore for Occ {
    async fn read(&self) -> Result<Vec<String>> {
        let cmd = self.command(["config:system:get", TRUSTED_DOMAINS]);
        let out = self.runner.run(&cmd).await?;
        // An unset key exits 1 without printing anything.
        if out.code == Some(1) && out.stdout.trim().is_empty() && out.stderr.trim().is_empty() {
            debug!("trusted_domains is unset");
            return Ok(Vec::new());
        }
        let out = out.check(&cmd)?;
        Ok(out.stdout.split_whitespace().map(str::to_string).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.run(self.command(["config:system:delete", TRUSTED_DOMAINS]))
            .await
            .map(drop)
    }

    async fn set(&self, domain: &str, index: usize) -> Result<()> {
        debug!("trusted_domains[{}] = {}", index, domain);
        let cmd = self.command([
            "config:system:set".to_string(),
            TRUSTED_DOMAINS.to_string(),
            index.to_string(),
            format!("--value={}", domain),
        ]);
        self.run(cmd).await.map(drop)
    }
}
