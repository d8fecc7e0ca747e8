//! Hook and action entry point for the Nextcloud charm.

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};

mod charm;
mod cluster;
mod config;
mod error;
mod exec;
mod host;
mod peers;
mod reconcile;
mod state;
mod store;
mod types;

#[cfg(test)]
mod testing;

use charm::Charm;
use config::Config;
use exec::{ProcessRunner, Runner};
use host::HookTools;
use state::JsonStateStore;
use store::Occ;
use types::{Event, RelationRef};

/// What Juju asked us to run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Dispatch {
    Hook(String),
    Action(String),
}

impl Dispatch {
    /// `JUJU_DISPATCH_PATH` is `hooks/<name>` or `actions/<name>`. Older
    /// agents only set `JUJU_ACTION_NAME` for actions or invoke the hook
    /// through a symlink named after it.
    fn detect(dispatch_path: Option<&str>, action_name: Option<&str>, argv0: &str) -> Self {
        if let Some(path) = dispatch_path {
            if let Some(name) = path.strip_prefix("actions/") {
                return Dispatch::Action(name.to_string());
            }
            if let Some(name) = path.strip_prefix("hooks/") {
                return Dispatch::Hook(name.to_string());
            }
        }
        if let Some(name) = action_name {
            return Dispatch::Action(name.to_string());
        }
        let name = Path::new(argv0)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Dispatch::Hook(name)
    }
}

fn relation_from_env() -> Option<RelationRef> {
    let id = std::env::var("JUJU_RELATION_ID").ok().filter(|s| !s.is_empty())?;
    Some(RelationRef {
        id,
        remote_unit: std::env::var("JUJU_REMOTE_UNIT").ok().filter(|s| !s.is_empty()),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Juju collects stderr into the unit log.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::load()?;

    let dispatch_path = std::env::var("JUJU_DISPATCH_PATH").ok();
    let action_name = std::env::var("JUJU_ACTION_NAME").ok();
    let argv0 = std::env::args().next().unwrap_or_default();
    let dispatch = Dispatch::detect(dispatch_path.as_deref(), action_name.as_deref(), &argv0);
    info!("Dispatching {:?}", dispatch);

    let runner: Arc<dyn Runner> = Arc::new(ProcessRunner);
    let host = HookTools::from_env(runner.clone())?;
    let occ = Occ::new(runner, &cfg);
    let state_store = JsonStateStore::new(&cfg.state_file);
    debug!("Unit state lives in {}", state_store.path().display());
    let charm = Charm::new(&cfg, &host, &occ, &state_store);

    let event = match dispatch {
        Dispatch::Hook(name) => Event::from_hook(&name, &cfg.peer_relation, relation_from_env()),
        Dispatch::Action(name) => match charm.action_event(&name).await? {
            Some(event) => event,
            None => return Ok(()),
        },
    };

    if let Err(e) = charm.dispatch(event).await {
        error!("Giving up on this event: {}", e);
        return Err(e.into());
    }
    Ok(())
}
