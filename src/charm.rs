//! Event dispatch for the Nextcloud charm.
//!
//! One [`Event`] is handled per process. Hooks first replay whatever was
//! deferred by earlier invocations, then handle the current event; the
//! unit state is saved only when everything succeeded. Actions run on
//! their own and report through `action-set`/`action-fail`.

use log::{debug, error, info, warn};

use crate::cluster::Propagator;
use crate::config::Config;
use crate::error::{CharmError, Result};
use crate::host::{DataBag, Host};
use crate::peers::RelationPeers;
use crate::state::{StateStore, UnitState};
use crate::store::{DomainStore, Occ};
use crate::types::{Action, ClusterPhase, Event, HookOutcome, Status};

pub struct Charm<'a> {
    cfg: &'a Config,
    host: &'a dyn Host,
    occ: &'a Occ,
    state_store: &'a dyn StateStore,
    peers: RelationPeers<'a>,
}

impl<'a> Charm<'a> {
    pub fn new(cfg: &'a Config, host: &'a dyn Host, occ: &'a Occ, state_store: &'a dyn StateStore) -> Self {
        Self {
            cfg,
            host,
            occ,
            state_store,
            peers: RelationPeers::new(host, &cfg.peer_relation, cfg.peer_order),
        }
    }

    fn propagator(&self) -> Propagator<'_> {
        Propagator::new(
            self.host,
            self.occ,
            &self.peers,
            &self.cfg.config_php,
            &self.cfg.peer_relation,
        )
    }

    pub async fn dispatch(&self, event: Event) -> Result<()> {
        let mut state = self.state_store.load().await?;

        let result = match event {
            Event::Action(action) => self.run_action(&mut state, &action).await,
            hook => self.run_hook(&mut state, hook).await,
        };

        if let Err(e) = result {
            error!("Handler failed: {}", e);
            if let Err(status_err) = self.host.status_set(&Status::Blocked(e.to_string())).await {
                warn!("Could not report failure through status-set: {}", status_err);
            }
            return Err(e);
        }

        self.state_store.save(&state).await?;
        self.host.status_set(&evaluate_status(&state)).await
    }

    async fn run_hook(&self, state: &mut UnitState, event: Event) -> Result<()> {
        for deferred in std::mem::take(&mut state.deferred) {
            info!("Re-emitting deferred {}", deferred);
            if let HookOutcome::Defer(reason) = self.handle(state, &deferred).await? {
                debug!("{} deferred again: {}", deferred, reason);
                state.defer(deferred);
            }
        }

        info!("Handling {}", event);
        if let HookOutcome::Defer(reason) = self.handle(state, &event).await? {
            info!("Deferring {}: {}", event, reason);
            state.defer(event);
        }
        Ok(())
    }

    async fn handle(&self, state: &mut UnitState, event: &Event) -> Result<HookOutcome> {
        let leader = self.host.is_leader().await?;
        if !leader {
            demote(state);
        }

        match event {
            Event::Start => {
                self.host.open_port(self.cfg.http_port, "tcp").await?;
                self.sync_if_leader(leader, state).await
            }
            Event::ConfigChanged
            | Event::LeaderElected
            | Event::PeerJoined(_)
            | Event::PeerDeparted(_) => self.sync_if_leader(leader, state).await,
            Event::PeerChanged(relation) => {
                if leader {
                    return self.propagator().leader_sync(state).await;
                }
                let live = self.host.relation_ids(&self.cfg.peer_relation).await?;
                if !live.contains(&relation.id) {
                    debug!("Relation {} is gone, dropping event", relation.id);
                    return Ok(HookOutcome::Done);
                }
                self.propagator().follower_apply(&relation.id, state).await
            }
            Event::UpdateStatus => {
                if !leader {
                    self.resync_follower(state).await?;
                }
                self.refresh_workload(state).await?;
                Ok(HookOutcome::Done)
            }
            Event::Install | Event::UpgradeCharm | Event::LeaderSettingsChanged => {
                debug!("Nothing to do for {}", event);
                Ok(HookOutcome::Done)
            }
            Event::Unhandled { name } => {
                info!("Ignoring unhandled hook {}", name);
                Ok(HookOutcome::Done)
            }
            // Actions are never queued.
            Event::Action(_) => Ok(HookOutcome::Done),
        }
    }

    async fn sync_if_leader(&self, leader: bool, state: &mut UnitState) -> Result<HookOutcome> {
        if leader {
            self.propagator().leader_sync(state).await
        } else {
            Ok(HookOutcome::Done)
        }
    }

    /// Re-applies the leader's snapshot unless it is already in place, e.g.
    /// after a local maintenance toggle cleared `applied_digest`.
    async fn resync_follower(&self, state: &mut UnitState) -> Result<()> {
        for relation_id in self.host.relation_ids(&self.cfg.peer_relation).await? {
            if let HookOutcome::Defer(reason) = self.propagator().follower_apply(&relation_id, state).await? {
                debug!("Nothing to resync from {}: {}", relation_id, reason);
            }
        }
        Ok(())
    }

    async fn refresh_workload(&self, state: &mut UnitState) -> Result<()> {
        if !tokio::fs::try_exists(&self.cfg.config_php).await? {
            return Ok(());
        }
        let status = self.occ.status().await?;
        if status.installed && !status.versionstring.is_empty() {
            self.host.set_workload_version(&status.versionstring).await?;
        }
        state.maintenance = status.maintenance;
        Ok(())
    }

    /// Reads the action's parameters and turns `name` into an event.
    /// Bad parameters fail the action and yield `None`.
    pub async fn action_event(&self, name: &str) -> Result<Option<Event>> {
        let params = self.host.action_get().await?;
        match parse_action(name, &params) {
            Ok(action) => Ok(Some(Event::Action(action))),
            Err(e) => {
                self.host.action_fail(&e.to_string()).await?;
                Ok(None)
            }
        }
    }

    async fn run_action(&self, state: &mut UnitState, action: &Action) -> Result<()> {
        info!("Running action {:?}", action);
        match self.perform(state, action).await {
            Ok(results) => self.host.action_set(&results).await,
            Err(e) => self.host.action_fail(&e.to_string()).await,
        }
    }

    async fn perform(&self, state: &mut UnitState, action: &Action) -> Result<DataBag> {
        let mut results = DataBag::new();
        match action {
            Action::AddTrustedDomain { domain } => {
                self.require_leader("add-trusted-domain").await?;
                let mut domains = self.occ.read().await?;
                let added = !domains.contains(domain);
                if added {
                    domains.push(domain.clone());
                    self.occ.write_all(&domains).await?;
                    state.extra_domains.push(domain.clone());
                    self.after_domain_change(state, domains).await?;
                }
                results.insert("added".into(), added.to_string());
            }
            Action::RemoveTrustedDomain { domain } => {
                self.require_leader("remove-trusted-domain").await?;
                state.extra_domains.retain(|d| d != domain);
                let mut domains = self.occ.read().await?;
                let position = domains.iter().position(|d| d == domain);
                if let Some(index) = position {
                    domains.remove(index);
                    self.occ.write_all(&domains).await?;
                    self.after_domain_change(state, domains).await?;
                }
                results.insert("removed".into(), position.is_some().to_string());
            }
            Action::ListTrustedDomains => {
                let domains = self.occ.read().await?;
                results.insert("domains".into(), domains.join(" "));
            }
            Action::AddMissingIndices => {
                let output = self.occ.db_add_missing_indices().await?;
                results.insert("output".into(), output.trim().to_string());
            }
            Action::ConvertFilecacheBigint => {
                let output = self.occ.db_convert_filecache_bigint().await?;
                results.insert("output".into(), output.trim().to_string());
            }
            Action::Maintenance { enable } => {
                let output = self.occ.maintenance_mode(*enable).await?;
                state.maintenance = *enable;
                if self.host.is_leader().await? {
                    self.publish_if_configured(state).await?;
                } else {
                    // config.php no longer matches the leader's snapshot.
                    state.applied_digest = None;
                }
                let mode = if *enable { "on" } else { "off" };
                results.insert("maintenance".into(), mode.into());
                results.insert("output".into(), output.trim().to_string());
            }
        }
        Ok(results)
    }

    /// Followers get the edited `config.php` through a fresh snapshot.
    async fn after_domain_change(&self, state: &mut UnitState, domains: Vec<String>) -> Result<()> {
        state.trusted_domains = domains;
        self.publish_if_configured(state).await
    }

    async fn publish_if_configured(&self, state: &mut UnitState) -> Result<()> {
        if tokio::fs::try_exists(&self.cfg.config_php).await? {
            self.propagator().publish(state).await?;
        }
        Ok(())
    }

    /// Only the leader's `config.php` is published; an edit anywhere else
    /// would be overwritten by the next snapshot.
    async fn require_leader(&self, action: &'static str) -> Result<()> {
        if self.host.is_leader().await? {
            Ok(())
        } else {
            Err(CharmError::NotLeader(action))
        }
    }
}

/// A unit that lost leadership stops presenting itself as the publisher.
fn demote(state: &mut UnitState) {
    if matches!(state.phase, ClusterPhase::Reconciling | ClusterPhase::Published) {
        state.phase = if state.applied_digest.is_some() {
            ClusterPhase::Applied
        } else {
            ClusterPhase::AwaitingConfig
        };
    }
}

pub fn evaluate_status(state: &UnitState) -> Status {
    if state.maintenance {
        return Status::Maintenance("Nextcloud is in maintenance mode".into());
    }
    match state.phase {
        ClusterPhase::Unconfigured => Status::Waiting("Waiting for Nextcloud to be installed".into()),
        ClusterPhase::Reconciling => Status::Maintenance("Updating trusted domains".into()),
        ClusterPhase::AwaitingConfig => Status::Waiting("Waiting for configuration from the leader".into()),
        ClusterPhase::Published | ClusterPhase::Applied => Status::Active("Ready".into()),
    }
}

pub fn parse_action(name: &str, params: &serde_json::Map<String, serde_json::Value>) -> Result<Action> {
    let string_param = |key: &str| -> Result<String> {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CharmError::InvalidParams(format!("`{}` requires a non-empty `{}`", name, key)))
    };

    match name {
        "add-trusted-domain" => Ok(Action::AddTrustedDomain {
            domain: single_token(string_param("domain")?)?,
        }),
        "remove-trusted-domain" => Ok(Action::RemoveTrustedDomain {
            domain: single_token(string_param("domain")?)?,
        }),
        "list-trusted-domains" => Ok(Action::ListTrustedDomains),
        "add-missing-indices" => Ok(Action::AddMissingIndices),
        "convert-filecache-bigint" => Ok(Action::ConvertFilecacheBigint),
        "maintenance" => {
            let enable = params
                .get("enable")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| CharmError::InvalidParams("`maintenance` requires boolean `enable`".into()))?;
            Ok(Action::Maintenance { enable })
        }
        other => Err(CharmError::InvalidParams(format!("unknown action `{}`", other))),
    }
}

/// The trusted-domain list is read back by splitting on whitespace, so a
/// domain containing whitespace could never be found again.
fn single_token(domain: String) -> Result<String> {
    if domain.split_whitespace().count() > 1 {
        return Err(CharmError::InvalidParams(format!(
            "domain `{}` must not contain whitespace",
            domain
        )));
    }
    Ok(domain)
}
