use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CharmConfig, DataBag, Host};
use crate::error::{CharmError, Result};
use crate::exec::{CommandSpec, Runner};
use crate::types::Status;

/// [`Host`] backed by the hook tools Juju puts on `PATH` for the duration
/// of a hook or action.
pub struct HookTools {
    runner: Arc<dyn Runner>,
    unit: String,
}

impl HookTools {
    pub fn new(runner: Arc<dyn Runner>, unit: impl Into<String>) -> Self {
        Self {
            runner,
            unit: unit.into(),
        }
    }

    pub fn from_env(runner: Arc<dyn Runner>) -> anyhow::Result<Self> {
        let unit = std::env::var("JUJU_UNIT_NAME")
            .map_err(|_| anyhow::anyhow!("JUJU_UNIT_NAME is not set; not running under Juju?"))?;
        Ok(Self::new(runner, unit))
    }

    async fn run(&self, cmd: CommandSpec) -> Result<String> {
        Ok(self.runner.run_checked(&cmd).await?.stdout)
    }

    async fn run_json<T: DeserializeOwned>(&self, cmd: CommandSpec) -> Result<T> {
        let cmd = cmd.arg("--format=json");
        let stdout = self.run(cmd.clone()).await?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| CharmError::external(&cmd, format!("unparsable output: {}", e)))
    }
}

/// `network-get --ingress-address` prints a list when the binding has
/// more than one address.
#[derive(Deserialize)]
#[serde(untagged)]
enum Addresses {
    One(String),
    Many(Vec<String>),
}

fn key_values(data: &DataBag) -> impl Iterator<Item = String> + '_ {
    data.iter().map(|(k, v)| format!("{}={}", k, v))
}

#[async_trait]
impl Host for HookTools {
    fn unit_name(&self) -> &str {
        &self.unit
    }

    async fn is_leader(&self) -> Result<bool> {
        self.run_json(CommandSpec::new("is-leader")).await
    }

    async fn relation_ids(&self, relation: &str) -> Result<Vec<String>> {
        let ids: Option<Vec<String>> = self
            .run_json(CommandSpec::new("relation-ids").arg(relation))
            .await?;
        Ok(ids.unwrap_or_default())
    }

    async fn relation_units(&self, relation_id: &str) -> Result<Vec<String>> {
        let units: Option<Vec<String>> = self
            .run_json(CommandSpec::new("relation-list").args(["-r", relation_id]))
            .await?;
        Ok(units.unwrap_or_default())
    }

    async fn relation_get(&self, relation_id: &str, unit: &str) -> Result<DataBag> {
        let bag: Option<DataBag> = self
            .run_json(CommandSpec::new("relation-get").args(["-r", relation_id, "-", unit]))
            .await?;
        Ok(bag.unwrap_or_default())
    }

    async fn relation_get_app(&self, relation_id: &str) -> Result<DataBag> {
        let app = self.app_name().to_string();
        let bag: Option<DataBag> = self
            .run_json(
                CommandSpec::new("relation-get").args(["-r", relation_id, "--app", "-", app.as_str()]),
            )
            .await?;
        Ok(bag.unwrap_or_default())
    }

    async fn relation_set_app(&self, relation_id: &str, data: &DataBag) -> Result<()> {
        // A whole config.php can exceed the kernel's per-argument limit, so
        // the bag goes over stdin. relation-set reads YAML, and JSON is YAML.
        let cmd = CommandSpec::new("relation-set")
            .args(["-r", relation_id, "--app", "--file", "-"])
            .stdin(serde_json::to_string(data)?);
        debug!("relation-set -r {} --app {:?}", relation_id, data.keys());
        self.run(cmd).await.map(drop)
    }

    async fn ingress_address(&self, binding: &str) -> Result<String> {
        let cmd = CommandSpec::new("network-get").args([binding, "--ingress-address"]);
        let addresses: Addresses = self.run_json(cmd.clone()).await?;
        let first = match addresses {
            Addresses::One(address) => Some(address),
            Addresses::Many(list) => list.into_iter().next(),
        };
        first
            .filter(|a| !a.is_empty())
            .ok_or_else(|| CharmError::external(&cmd, "no ingress address"))
    }

    async fn config_get(&self) -> Result<CharmConfig> {
        self.run_json(CommandSpec::new("config-get")).await
    }

    async fn status_set(&self, status: &Status) -> Result<()> {
        let cmd = CommandSpec::new("status-set").args([status.name(), status.message()]);
        self.run(cmd).await.map(drop)
    }

    async fn set_workload_version(&self, version: &str) -> Result<()> {
        self.run(CommandSpec::new("application-version-set").arg(version))
            .await
            .map(drop)
    }

    async fn open_port(&self, port: u16, protocol: &str) -> Result<()> {
        self.run(CommandSpec::new("open-port").arg(format!("{}/{}", port, protocol)))
            .await
            .map(drop)
    }

    async fn action_get(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let params: Option<serde_json::Map<String, serde_json::Value>> =
            self.run_json(CommandSpec::new("action-get")).await?;
        Ok(params.unwrap_or_default())
    }

    async fn action_set(&self, results: &DataBag) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        self.run(CommandSpec::new("action-set").args(key_values(results)))
            .await
            .map(drop)
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        warn!("Action failed: {}", message);
        self.run(CommandSpec::new("action-fail").arg(message))
            .await
            .map(drop)
    }
}
