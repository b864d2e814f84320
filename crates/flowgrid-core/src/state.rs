// ── Controller state ──
//
// All mutable state lives here and is owned by the single control-loop
// task; every mutation goes through the message channel, so none of
// these structures need locks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

use serde::Serialize;
use serde_json::Value;

use flowgrid_api::Dpid;

use crate::bootstrap::BootstrapState;
use crate::classify::Classification;
use crate::conn::SwitchHandle;
use crate::model::{AllowedPair, HostRecord, RouterPorts, SwitchRole};

/// Serializable view of the topology for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub known: Vec<String>,
    pub routers: Vec<String>,
    pub router_names: BTreeMap<String, String>,
    pub bootstrap: BTreeMap<String, String>,
    pub connected: usize,
    pub allowed_pairs: usize,
}

#[derive(Debug, Default)]
pub struct ControllerState {
    /// Live switch connections.
    switches: HashMap<Dpid, SwitchHandle>,
    /// Switches the topology service reports.
    known: BTreeSet<Dpid>,
    /// Subset classified as routers.
    routers: BTreeSet<Dpid>,
    router_names: BTreeMap<Dpid, String>,
    /// Discovered ports, cached once a bootstrap succeeds.
    router_ports: HashMap<Dpid, RouterPorts>,
    bootstrap: HashMap<Dpid, BootstrapState>,
    allowed_pairs: BTreeSet<AllowedPair>,
    /// Registered hosts, keyed by address.
    hosts: BTreeMap<Ipv4Addr, HostRecord>,
    /// Raw per-router configuration documents, keyed by router name.
    router_cfg: BTreeMap<String, Value>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Connections ─────────────────────────────────────────────────

    pub fn attach(&mut self, handle: SwitchHandle) {
        self.switches.insert(handle.dpid, handle);
    }

    pub fn detach(&mut self, dpid: Dpid) -> Option<SwitchHandle> {
        self.switches.remove(&dpid)
    }

    pub fn handle(&self, dpid: Dpid) -> Option<&SwitchHandle> {
        self.switches.get(&dpid)
    }

    pub fn connected_count(&self) -> usize {
        self.switches.len()
    }

    pub fn connected_dpids(&self) -> impl Iterator<Item = Dpid> + '_ {
        self.switches.keys().copied()
    }

    // ── Topology ────────────────────────────────────────────────────

    pub fn role(&self, dpid: Dpid) -> SwitchRole {
        if self.routers.contains(&dpid) {
            SwitchRole::Router
        } else {
            SwitchRole::Access
        }
    }

    pub fn known(&self) -> &BTreeSet<Dpid> {
        &self.known
    }

    pub fn routers(&self) -> &BTreeSet<Dpid> {
        &self.routers
    }

    pub fn router_name(&self, dpid: Dpid) -> Option<&str> {
        self.router_names.get(&dpid).map(String::as_str)
    }

    /// Merge a classification pass into the state.
    ///
    /// Returns the routers that have no bootstrap record yet; the
    /// caller starts a bootstrap task for each. Switches that vanished
    /// from the topology keep their bootstrap records so a transient
    /// topology blip does not restart provisioning.
    pub fn apply_classification(&mut self, c: Classification) -> Vec<Dpid> {
        self.known = c.known;
        self.routers = c.routers;
        self.router_names = c.names;

        self.routers
            .iter()
            .copied()
            .filter(|dpid| !self.bootstrap.contains_key(dpid))
            .collect()
    }

    // ── Bootstrap tracking ──────────────────────────────────────────

    pub fn bootstrap_state(&self, dpid: Dpid) -> Option<BootstrapState> {
        self.bootstrap.get(&dpid).copied()
    }

    pub fn set_bootstrap_state(&mut self, dpid: Dpid, state: BootstrapState) {
        self.bootstrap.insert(dpid, state);
    }

    /// Drop an `Abandoned` record so the next classification re-arms
    /// the bootstrap. Used when a router reconnects.
    pub fn rearm_bootstrap(&mut self, dpid: Dpid) {
        if self.bootstrap.get(&dpid) == Some(&BootstrapState::Abandoned) {
            self.bootstrap.remove(&dpid);
        }
    }

    pub fn router_ports(&self, dpid: Dpid) -> Option<&RouterPorts> {
        self.router_ports.get(&dpid)
    }

    pub fn set_router_ports(&mut self, dpid: Dpid, ports: RouterPorts) {
        self.router_ports.insert(dpid, ports);
    }

    // ── Policy ──────────────────────────────────────────────────────

    pub fn allowed_pairs(&self) -> &BTreeSet<AllowedPair> {
        &self.allowed_pairs
    }

    pub fn replace_allowed_pairs(&mut self, pairs: BTreeSet<AllowedPair>) {
        self.allowed_pairs = pairs;
    }

    /// `true` if the pair was not already present.
    pub fn add_allowed_pair(&mut self, pair: AllowedPair) -> bool {
        self.allowed_pairs.insert(pair)
    }

    /// `true` if the pair existed and was removed.
    pub fn remove_allowed_pair(&mut self, pair: &AllowedPair) -> bool {
        self.allowed_pairs.remove(pair)
    }

    // ── Hosts ───────────────────────────────────────────────────────

    /// Insert or replace the record for `record.ip`. One record per
    /// address; re-registering an address overwrites it.
    pub fn register_host(&mut self, record: HostRecord) {
        self.hosts.insert(record.ip, record);
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.values()
    }

    // ── Router configuration documents ──────────────────────────────

    /// Merge `update` into the named router's configuration.
    ///
    /// Object documents merge key-by-key with existing keys preserved
    /// unless overwritten; any other shape replaces the document.
    pub fn merge_router_config(&mut self, name: &str, update: Value) {
        match (self.router_cfg.get_mut(name), update) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k, v);
                }
            }
            (_, update) => {
                self.router_cfg.insert(name.to_owned(), update);
            }
        }
    }

    pub fn router_config(&self, name: &str) -> Option<&Value> {
        self.router_cfg.get(name)
    }

    pub fn router_configs(&self) -> &BTreeMap<String, Value> {
        &self.router_cfg
    }

    // ── Snapshot ────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            known: self.known.iter().map(|d| d.hex16()).collect(),
            routers: self.routers.iter().map(|d| d.hex16()).collect(),
            router_names: self
                .router_names
                .iter()
                .map(|(d, n)| (d.hex16(), n.clone()))
                .collect(),
            bootstrap: self
                .bootstrap
                .iter()
                .map(|(d, s)| (d.hex16(), s.to_string()))
                .collect(),
            connected: self.switches.len(),
            allowed_pairs: self.allowed_pairs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::BTreeSet;

    fn classification(routers: &[u64], known: &[u64]) -> Classification {
        let routers: BTreeSet<Dpid> = routers.iter().map(|d| Dpid(*d)).collect();
        let names = routers
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, format!("router{}", i + 1)))
            .collect();
        Classification {
            known: known.iter().map(|d| Dpid(*d)).collect(),
            routers,
            names,
        }
    }

    #[test]
    fn classification_reports_only_new_routers() {
        let mut state = ControllerState::new();
        let fresh = state.apply_classification(classification(&[1], &[1, 2]));
        assert_eq!(fresh, vec![Dpid(1)]);

        state.set_bootstrap_state(Dpid(1), BootstrapState::Discovering);
        let fresh = state.apply_classification(classification(&[1, 3], &[1, 2, 3]));
        assert_eq!(fresh, vec![Dpid(3)]);
    }

    #[test]
    fn rearm_only_clears_abandoned() {
        let mut state = ControllerState::new();
        state.set_bootstrap_state(Dpid(1), BootstrapState::Abandoned);
        state.set_bootstrap_state(Dpid(2), BootstrapState::PolicyInstalled);

        state.rearm_bootstrap(Dpid(1));
        state.rearm_bootstrap(Dpid(2));

        assert_eq!(state.bootstrap_state(Dpid(1)), None);
        assert_eq!(
            state.bootstrap_state(Dpid(2)),
            Some(BootstrapState::PolicyInstalled)
        );
    }

    #[test]
    fn reregistering_an_address_replaces_the_record() {
        let mut state = ControllerState::new();
        let ip: Ipv4Addr = "10.0.1.5".parse().unwrap();
        state.register_host(HostRecord {
            ip,
            port: 8000,
            hostname: "web-old".to_owned(),
            router: None,
        });
        state.register_host(HostRecord {
            ip,
            port: 9000,
            hostname: "web-new".to_owned(),
            router: None,
        });

        let hosts: Vec<_> = state.hosts().collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].hostname, "web-new");
        assert_eq!(hosts[0].port, 9000);
    }

    #[test]
    fn router_config_merges_objects() {
        let mut state = ControllerState::new();
        state.merge_router_config("router1", serde_json::json!({"a": 1, "b": 2}));
        state.merge_router_config("router1", serde_json::json!({"b": 3, "c": 4}));

        let cfg = state.router_config("router1").unwrap();
        assert_eq!(cfg, &serde_json::json!({"a": 1, "b": 3, "c": 4}));
    }
}
