//! Data structures shared by the hook handlers.
//!
//! [`Event`] is the closed set of things Juju can ask this binary to do.
//! It is serialised into the unit state when a handler defers, so a
//! deferred relation event keeps the relation id and remote unit it was
//! first delivered with.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRef {
    /// Juju relation id, e.g. `cluster:3`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<String>,
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote_unit {
            Some(unit) => write!(f, "{}, {}", self.id, unit),
            None => write!(f, "{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    Install,
    Start,
    ConfigChanged,
    UpdateStatus,
    UpgradeCharm,
    LeaderElected,
    LeaderSettingsChanged,
    PeerJoined(RelationRef),
    PeerChanged(RelationRef),
    PeerDeparted(RelationRef),
    Action(Action),
    Unhandled { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    AddTrustedDomain { domain: String },
    RemoveTrustedDomain { domain: String },
    ListTrustedDomains,
    AddMissingIndices,
    ConvertFilecacheBigint,
    Maintenance { enable: bool },
}

impl Event {
    /// Maps a hook name to an event. `relation` carries `JUJU_RELATION_ID`
    /// and `JUJU_REMOTE_UNIT` for relation hooks.
    pub fn from_hook(name: &str, peer_relation: &str, relation: Option<RelationRef>) -> Self {
        match name {
            "install" => Event::Install,
            "start" => Event::Start,
            "config-changed" => Event::ConfigChanged,
            "update-status" => Event::UpdateStatus,
            "upgrade-charm" => Event::UpgradeCharm,
            "leader-elected" => Event::LeaderElected,
            "leader-settings-changed" => Event::LeaderSettingsChanged,
            _ => {
                let Some(suffix) = name
                    .strip_prefix(peer_relation)
                    .and_then(|rest| rest.strip_prefix("-relation-"))
                else {
                    return Event::Unhandled { name: name.to_string() };
                };
                let Some(relation) = relation else {
                    return Event::Unhandled { name: name.to_string() };
                };
                match suffix {
                    "joined" => Event::PeerJoined(relation),
                    "changed" => Event::PeerChanged(relation),
                    "departed" => Event::PeerDeparted(relation),
                    _ => Event::Unhandled { name: name.to_string() },
                }
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Install => write!(f, "install"),
            Event::Start => write!(f, "start"),
            Event::ConfigChanged => write!(f, "config-changed"),
            Event::UpdateStatus => write!(f, "update-status"),
            Event::UpgradeCharm => write!(f, "upgrade-charm"),
            Event::LeaderElected => write!(f, "leader-elected"),
            Event::LeaderSettingsChanged => write!(f, "leader-settings-changed"),
            Event::PeerJoined(r) => write!(f, "peer-joined({})", r),
            Event::PeerChanged(r) => write!(f, "peer-changed({})", r),
            Event::PeerDeparted(r) => write!(f, "peer-departed({})", r),
            Event::Action(a) => write!(f, "action {:?}", a),
            Event::Unhandled { name } => write!(f, "unhandled {}", name),
        }
    }
}

/// Result of a handler that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Done,
    /// Re-queue the event for the next dispatch.
    Defer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterPhase {
    /// No `config.php` yet, nothing to publish.
    #[default]
    Unconfigured,
    Reconciling,
    /// Leader wrote the current snapshot to the peer relation.
    Published,
    AwaitingConfig,
    /// Follower copied the leader's snapshot into place.
    Applied,
}

/// Workload status as understood by `status-set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Active(String),
    Maintenance(String),
    Waiting(String),
    Blocked(String),
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Status::Active(_) => "active",
            Status::Maintenance(_) => "maintenance",
            Status::Waiting(_) => "waiting",
            Status::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Status::Active(m) | Status::Maintenance(m) | Status::Waiting(m) | Status::Blocked(m) => m,
        }
    }
}
