//! Unit-local state that outlives a single hook invocation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ClusterPhase, Event};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitState {
    pub phase: ClusterPhase,
    /// SHA-256 of the snapshot this follower last wrote to `config.php`.
    pub applied_digest: Option<String>,
    /// SHA-256 of the snapshot this leader last published.
    pub published_digest: Option<String>,
    /// Trusted domains as last written by this unit.
    pub trusted_domains: Vec<String>,
    /// Entries the last successful leader sync kept ahead of the peers.
    pub fixed_domains: Vec<String>,
    /// Domains added through `add-trusted-domain`, kept after the peers.
    pub extra_domains: Vec<String>,
    pub maintenance: bool,
    pub deferred: Vec<Event>,
}

impl UnitState {
    /// Queues `event` unless an identical one is already waiting.
    pub fn defer(&mut self, event: Event) {
        if !self.deferred.contains(&event) {
            self.deferred.push(event);
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<UnitState>;
    async fn save(&self, state: &UnitState) -> Result<()>;
}

/// Keeps [`UnitState`] as pretty JSON in a single file.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<UnitState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No unit state at {}, starting fresh", self.path.display());
                Ok(UnitState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &UnitState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
