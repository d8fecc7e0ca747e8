//! Leader to follower propagation of `config.php`.
//!
//! The leader reconciles trusted domains, then puts the whole `config.php`
//! into the peer relation's application data bag. Followers copy whatever
//! snapshot they last saw there into their own `config.php`. Delivery is
//! at least once; a follower may skip intermediate snapshots but always
//! ends on the newest one it is shown.

use std::path::Path;

use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::host::{DataBag, Host};
use crate::peers::PeerSource;
use crate::reconcile::{Reconciler, FIXED_ENTRIES};
use crate::state::UnitState;
use crate::store::DomainStore;
use crate::types::{ClusterPhase, HookOutcome};

/// Application data key holding the leader's `config.php`.
pub const SNAPSHOT_KEY: &str = "config-php";

pub fn snapshot_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub struct Propagator<'a> {
    host: &'a dyn Host,
    store: &'a dyn DomainStore,
    peers: &'a dyn PeerSource,
    config_php: &'a Path,
    peer_relation: &'a str,
}

impl<'a> Propagator<'a> {
    pub fn new(
        host: &'a dyn Host,
        store: &'a dyn DomainStore,
        peers: &'a dyn PeerSource,
        config_php: &'a Path,
        peer_relation: &'a str,
    ) -> Self {
        Self {
            host,
            store,
            peers,
            config_php,
            peer_relation,
        }
    }

    /// Reconcile trusted domains and publish the resulting `config.php`.
    pub async fn leader_sync(&self, state: &mut UnitState) -> Result<HookOutcome> {
        if !tokio::fs::try_exists(self.config_php).await? {
            state.phase = ClusterPhase::Unconfigured;
            return Ok(HookOutcome::Defer(format!(
                "{} does not exist yet",
                self.config_php.display()
            )));
        }

        state.phase = ClusterPhase::Reconciling;
        let peers = self.peers.peer_addresses().await?;
        let prefix = self.fixed_prefix(state, &peers).await?;

        // Operator-added domains ride after the peers.
        let mut tail = peers;
        for extra in &state.extra_domains {
            if !tail.contains(extra) && !prefix.contains(extra) {
                tail.push(extra.clone());
            }
        }

        let domains = Reconciler::new(self.store).reconcile(&prefix, &tail).await?;
        state.fixed_domains = prefix;
        state.trusted_domains = domains;

        self.publish(state).await?;
        Ok(HookOutcome::Done)
    }

    /// Snapshot `config.php` into every instance of the peer relation.
    /// Overwrites whatever was published before.
    pub async fn publish(&self, state: &mut UnitState) -> Result<()> {
        let content = tokio::fs::read_to_string(self.config_php).await?;
        let digest = snapshot_digest(&content);

        let mut data = DataBag::new();
        data.insert(SNAPSHOT_KEY.to_string(), content);
        for relation_id in self.host.relation_ids(self.peer_relation).await? {
            self.host.relation_set_app(&relation_id, &data).await?;
        }

        if state.published_digest.as_deref() != Some(digest.as_str()) {
            info!("Published config snapshot {}", &digest[..12]);
        }
        state.published_digest = Some(digest);
        state.phase = ClusterPhase::Published;
        Ok(())
    }

    /// Copy the leader's snapshot into place, or ask to be retried if the
    /// leader has not published one yet.
    pub async fn follower_apply(&self, relation_id: &str, state: &mut UnitState) -> Result<HookOutcome> {
        let app_data = self.host.relation_get_app(relation_id).await?;
        let Some(content) = app_data.get(SNAPSHOT_KEY) else {
            if state.applied_digest.is_none() {
                state.phase = ClusterPhase::AwaitingConfig;
            }
            return Ok(HookOutcome::Defer("leader has not published a config snapshot".into()));
        };

        let digest = snapshot_digest(content);
        if state.applied_digest.as_deref() == Some(digest.as_str()) {
            debug!("Config snapshot {} already applied", &digest[..12]);
            state.phase = ClusterPhase::Applied;
            return Ok(HookOutcome::Done);
        }

        tokio::fs::write(self.config_php, content).await?;
        info!(
            "Applied config snapshot {} to {}",
            &digest[..12],
            self.config_php.display()
        );
        state.applied_digest = Some(digest);
        state.phase = ClusterPhase::Applied;
        Ok(HookOutcome::Done)
    }

    /// `["localhost", fqdn]` when the fqdn option is set. Otherwise the
    /// fixed entries of the last successful sync, which survive a store
    /// left half written. Only a unit that never synced looks at the
    /// store, and a peer address found there is not a fixed entry.
    async fn fixed_prefix(&self, state: &UnitState, peers: &[String]) -> Result<Vec<String>> {
        let config = self.host.config_get().await?;
        if let Some(fqdn) = config.fqdn() {
            return Ok(vec!["localhost".to_string(), fqdn.to_string()]);
        }
        if !state.fixed_domains.is_empty() {
            return Ok(state.fixed_domains.clone());
        }
        let current = self.store.read().await?;
        Ok(current
            .into_iter()
            .take(FIXED_ENTRIES)
            .filter(|d| !peers.contains(d))
            .collect())
    }
}
