//! In-memory stand-ins for occ, the Juju hook tools and the state file.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CharmError, Result};
use crate::exec::{CommandOutput, CommandSpec, Runner};
use crate::host::{CharmConfig, DataBag, Host};
use crate::state::{StateStore, UnitState};
use crate::types::Status;

/// Records every command and answers from a queue, defaulting to an empty
/// successful run.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Mutex<VecDeque<CommandOutput>>,
}

impl ScriptedRunner {
    pub fn push(&self, output: CommandOutput) {
        self.responses.lock().unwrap().push_back(output);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

#[derive(Default)]
struct OccState {
    domains: BTreeMap<usize, String>,
    calls: Vec<CommandSpec>,
    queued: VecDeque<CommandOutput>,
    sets_left: Option<usize>,
}

/// Behaves like `occ config:system:{get,set,delete} trusted_domains`
/// against an index map that, like config.php, may have gaps.
#[derive(Default)]
pub struct FakeOcc {
    inner: Mutex<OccState>,
}

impl FakeOcc {
    pub fn with_domains(domains: &[&str]) -> Self {
        let fake = Self::default();
        for (i, d) in domains.iter().enumerate() {
            fake.set_raw(i, d);
        }
        fake
    }

    pub fn set_raw(&self, index: usize, domain: &str) {
        self.inner
            .lock()
            .unwrap()
            .domains
            .insert(index, domain.to_string());
    }

    pub fn domains(&self) -> Vec<String> {
        self.inner.lock().unwrap().domains.values().cloned().collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.inner.lock().unwrap().domains.keys().copied().collect()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// The next command gets `output` instead of the simulated result.
    pub fn respond_next(&self, output: CommandOutput) {
        self.inner.lock().unwrap().queued.push_back(output);
    }

    /// Let `n` more `config:system:set` calls succeed, then fail the rest.
    pub fn fail_set_after(&self, n: usize) {
        self.inner.lock().unwrap().sets_left = Some(n);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().sets_left = None;
    }
}

#[async_trait]
impl Runner for FakeOcc {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(cmd.clone());
        if let Some(output) = inner.queued.pop_front() {
            return Ok(output);
        }

        let Some(pos) = cmd.args.iter().position(|a| a.starts_with("config:system:")) else {
            return Ok(CommandOutput::ok(""));
        };
        let rest = &cmd.args[pos + 1..];
        match cmd.args[pos].as_str() {
            "config:system:get" => {
                if inner.domains.is_empty() {
                    return Ok(CommandOutput {
                        code: Some(1),
                        ..CommandOutput::default()
                    });
                }
                let mut stdout = String::new();
                for d in inner.domains.values() {
                    stdout.push_str(d);
                    stdout.push('\n');
                }
                Ok(CommandOutput::ok(stdout))
            }
            "config:system:delete" => {
                inner.domains.clear();
                Ok(CommandOutput::ok(""))
            }
            "config:system:set" => {
                let sets_left = inner.sets_left;
                match sets_left {
                    Some(0) => {
                        return Ok(CommandOutput {
                            code: Some(1),
                            stdout: String::new(),
                            stderr: "injected failure".into(),
                        })
                    }
                    Some(n) => inner.sets_left = Some(n - 1),
                    None => {}
                }
                let index: usize = rest[1].parse().expect("numeric index");
                let value = rest[2].strip_prefix("--value=").expect("--value=");
                inner.domains.insert(index, value.to_string());
                Ok(CommandOutput::ok(""))
            }
            other => panic!("unexpected occ command {}", other),
        }
    }
}

struct HostState {
    leader: bool,
    ingress: String,
    config: CharmConfig,
    relations: BTreeMap<String, Vec<(String, DataBag)>>,
    app_data: BTreeMap<String, DataBag>,
    statuses: Vec<Status>,
    workload_version: Option<String>,
    opened_ports: Vec<String>,
    action_params: serde_json::Map<String, serde_json::Value>,
    action_results: DataBag,
    action_failure: Option<String>,
}

pub struct FakeHost {
    unit: String,
    inner: Mutex<HostState>,
}

impl FakeHost {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            inner: Mutex::new(HostState {
                leader: false,
                ingress: String::new(),
                config: CharmConfig::default(),
                relations: BTreeMap::new(),
                app_data: BTreeMap::new(),
                statuses: Vec::new(),
                workload_version: None,
                opened_ports: Vec::new(),
                action_params: serde_json::Map::new(),
                action_results: DataBag::new(),
                action_failure: None,
            }),
        }
    }

    pub fn as_leader(self) -> Self {
        self.set_leader(true);
        self
    }

    pub fn with_ingress(self, address: &str) -> Self {
        self.inner.lock().unwrap().ingress = address.to_string();
        self
    }

    pub fn with_fqdn(self, fqdn: &str) -> Self {
        self.inner.lock().unwrap().config.fqdn = Some(fqdn.to_string());
        self
    }

    pub fn with_action_params(self, params: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = params {
            self.inner.lock().unwrap().action_params = map;
        }
        self
    }

    pub fn set_leader(&self, leader: bool) {
        self.inner.lock().unwrap().leader = leader;
    }

    pub fn add_peer(&self, relation_id: &str, unit: &str, address: Option<&str>) {
        let mut data = DataBag::new();
        if let Some(address) = address {
            data.insert("ingress-address".into(), address.into());
        }
        self.inner
            .lock()
            .unwrap()
            .relations
            .entry(relation_id.to_string())
            .or_default()
            .push((unit.to_string(), data));
    }

    pub fn remove_peer(&self, relation_id: &str, unit: &str) {
        if let Some(units) = self.inner.lock().unwrap().relations.get_mut(relation_id) {
            units.retain(|(u, _)| u != unit);
        }
    }

    pub fn set_app_data(&self, relation_id: &str, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.relations.entry(relation_id.to_string()).or_default();
        inner
            .app_data
            .entry(relation_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn app_data(&self, relation_id: &str) -> DataBag {
        self.inner
            .lock()
            .unwrap()
            .app_data
            .get(relation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_status(&self) -> Option<Status> {
        self.inner.lock().unwrap().statuses.last().cloned()
    }

    pub fn workload_version(&self) -> Option<String> {
        self.inner.lock().unwrap().workload_version.clone()
    }

    pub fn opened_ports(&self) -> Vec<String> {
        self.inner.lock().unwrap().opened_ports.clone()
    }

    pub fn action_results(&self) -> DataBag {
        self.inner.lock().unwrap().action_results.clone()
    }

    pub fn action_failure(&self) -> Option<String> {
        self.inner.lock().unwrap().action_failure.clone()
    }
}

#[async_trait]
impl Host for FakeHost {
    fn unit_name(&self) -> &str {
        &self.unit
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.inner.lock().unwrap().leader)
    }

    async fn relation_ids(&self, relation: &str) -> Result<Vec<String>> {
        let prefix = format!("{}:", relation);
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relations
            .keys()
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn relation_units(&self, relation_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relations
            .get(relation_id)
            .map(|units| units.iter().map(|(u, _)| u.clone()).collect())
            .unwrap_or_default())
    }

    async fn relation_get(&self, relation_id: &str, unit: &str) -> Result<DataBag> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relations
            .get(relation_id)
            .and_then(|units| units.iter().find(|(u, _)| u == unit))
            .map(|(_, data)| data.clone())
            .unwrap_or_default())
    }

    async fn relation_get_app(&self, relation_id: &str) -> Result<DataBag> {
        Ok(self.app_data(relation_id))
    }

    async fn relation_set_app(&self, relation_id: &str, data: &DataBag) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.leader {
            return Err(CharmError::external(
                "relation-set --app",
                "cannot write application data: not the leader",
            ));
        }
        inner
            .app_data
            .entry(relation_id.to_string())
            .or_default()
            .extend(data.clone());
        Ok(())
    }

    async fn ingress_address(&self, _binding: &str) -> Result<String> {
        Ok(self.inner.lock().unwrap().ingress.clone())
    }

    async fn config_get(&self) -> Result<CharmConfig> {
        Ok(self.inner.lock().unwrap().config.clone())
    }

    async fn status_set(&self, status: &Status) -> Result<()> {
        self.inner.lock().unwrap().statuses.push(status.clone());
        Ok(())
    }

    async fn set_workload_version(&self, version: &str) -> Result<()> {
        self.inner.lock().unwrap().workload_version = Some(version.to_string());
        Ok(())
    }

    async fn open_port(&self, port: u16, protocol: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .opened_ports
            .push(format!("{}/{}", port, protocol));
        Ok(())
    }

    async fn action_get(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        Ok(self.inner.lock().unwrap().action_params.clone())
    }

    async fn action_set(&self, results: &DataBag) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .action_results
            .extend(results.clone());
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        self.inner.lock().unwrap().action_failure = Some(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<UnitState>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn state(&self) -> UnitState {
        self.state.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<UnitState> {
        Ok(self.state())
    }

    async fn save(&self, state: &UnitState) -> Result<()> {
        *self.state.lock().unwrap() = state.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
