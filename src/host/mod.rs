//! The Juju side of the charm: leadership, relation data, status and
//! action plumbing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::types::Status;

pub mod juju;
pub use juju::HookTools;

/// Relation data bag of a single unit or application.
pub type DataBag = BTreeMap<String, String>;

/// Charm options from `config.yaml` that the handlers look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CharmConfig {
    #[serde(default)]
    pub fqdn: Option<String>,
}

impl CharmConfig {
    /// The configured public hostname, ignoring an empty string.
    pub fn fqdn(&self) -> Option<&str> {
        self.fqdn.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait Host: Send + Sync {
    fn unit_name(&self) -> &str;

    /// Application name, i.e. the unit name without its `/N` suffix.
    fn app_name(&self) -> &str {
        let unit = self.unit_name();
        unit.split_once('/').map(|(app, _)| app).unwrap_or(unit)
    }

    async fn is_leader(&self) -> Result<bool>;

    async fn relation_ids(&self, relation: &str) -> Result<Vec<String>>;

    async fn relation_units(&self, relation_id: &str) -> Result<Vec<String>>;

    async fn relation_get(&self, relation_id: &str, unit: &str) -> Result<DataBag>;

    async fn relation_get_app(&self, relation_id: &str) -> Result<DataBag>;

    /// Leader only.
    async fn relation_set_app(&self, relation_id: &str, data: &DataBag) -> Result<()>;

    async fn ingress_address(&self, binding: &str) -> Result<String>;

    async fn config_get(&self) -> Result<CharmConfig>;

    async fn status_set(&self, status: &Status) -> Result<()>;

    async fn set_workload_version(&self, version: &str) -> Result<()>;

    async fn open_port(&self, port: u16, protocol: &str) -> Result<()>;

    async fn action_get(&self) -> Result<serde_json::Map<String, serde_json::Value>>;

    async fn action_set(&self, results: &DataBag) -> Result<()>;

    async fn action_fail(&self, message: &str) -> Result<()>;
}
