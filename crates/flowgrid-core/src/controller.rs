// ── Control loop ──
//
// Single-writer design: one task owns `ControllerState` and processes
// every event and command in arrival order through one channel. Switch
// frontends, bootstrap tasks, and API consumers all talk to that task
// via `ControlMsg`; nothing else ever touches the state, so no mutation
// can interleave with a policy resync.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowgrid_api::{Dpid, RoutingClient};

use crate::bootstrap::{self, BootstrapFailure, BootstrapState};
use crate::classify;
use crate::config::{ControllerConfig, LanId};
use crate::conn::{SwitchConn, SwitchHandle};
use crate::error::CoreError;
use crate::flows::FlowProgrammer;
use crate::l2::L2LearningTable;
use crate::model::{
    AllowedPair, FlowAction, HostRecord, MacAddr, PacketOut, PortRef, RouterPorts, SwitchRole,
};
use crate::policy::PolicyEngine;
use crate::state::{ControllerState, TopologySnapshot};

const CHANNEL_CAPACITY: usize = 64;

// ── Messages ────────────────────────────────────────────────────────

/// A packet punted to the controller by an access switch.
#[derive(Debug, Clone)]
pub struct PacketIn {
    pub dpid: Dpid,
    pub in_port: u32,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    /// LLDP frames belong to topology discovery, not L2 learning.
    pub lldp: bool,
    pub buffer_id: Option<u32>,
    pub data: Bytes,
}

/// Datapath and lifecycle events feeding the loop.
pub enum Event {
    SwitchConnected {
        dpid: Dpid,
        conn: Arc<dyn SwitchConn>,
    },
    /// Handshake complete; the switch accepts flow mods.
    SwitchReady { dpid: Dpid },
    SwitchDisconnected { dpid: Dpid },
    PacketIn(PacketIn),
    /// Periodic re-classification tick.
    TopologyRefresh,
    BootstrapPhase {
        dpid: Dpid,
        state: BootstrapState,
    },
    BootstrapOutcome {
        dpid: Dpid,
        outcome: Result<RouterPorts, BootstrapFailure>,
    },
}

/// Control-plane requests with replies.
#[derive(Debug)]
pub enum Command {
    ReplaceAllowedPairs(Vec<AllowedPair>),
    AddAllowedPair(AllowedPair),
    RemoveAllowedPair(AllowedPair),
    ListAllowedPairs,
    RegisterHost(HostRecord),
    ListHosts,
    SetRouterConfig { name: String, config: Value },
    GetRouterConfig { name: String },
    ListRouterConfigs,
    Snapshot,
}

#[derive(Debug)]
pub enum CommandResult {
    Done,
    /// The request was a no-op (e.g. adding a pair already present).
    Unchanged,
    Pairs(Vec<AllowedPair>),
    Hosts(Vec<HostRecord>),
    Config(Option<Value>),
    Configs(BTreeMap<String, Value>),
    Snapshot(TopologySnapshot),
}

pub struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}

pub enum ControlMsg {
    Event(Event),
    Command(CommandEnvelope),
}

// ── Handle ──────────────────────────────────────────────────────────

/// Cloneable entry point into the control loop.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlMsg>,
}

impl ControlHandle {
    /// Feed a datapath event into the loop.
    pub async fn event(&self, event: Event) -> Result<(), CoreError> {
        self.tx
            .send(ControlMsg::Event(event))
            .await
            .map_err(|_| CoreError::ControllerStopped)
    }

    async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ControlMsg::Command(CommandEnvelope {
                command,
                response_tx,
            }))
            .await
            .map_err(|_| CoreError::ControllerStopped)?;
        response_rx
            .await
            .map_err(|_| CoreError::ControllerStopped)?
    }

    pub async fn replace_allowed_pairs(
        &self,
        pairs: Vec<AllowedPair>,
    ) -> Result<(), CoreError> {
        self.execute(Command::ReplaceAllowedPairs(pairs)).await?;
        Ok(())
    }

    /// `Ok(true)` when the pair was new.
    pub async fn add_allowed_pair(&self, pair: AllowedPair) -> Result<bool, CoreError> {
        match self.execute(Command::AddAllowedPair(pair)).await? {
            CommandResult::Unchanged => Ok(false),
            _ => Ok(true),
        }
    }

    pub async fn remove_allowed_pair(&self, pair: AllowedPair) -> Result<(), CoreError> {
        self.execute(Command::RemoveAllowedPair(pair)).await?;
        Ok(())
    }

    pub async fn list_allowed_pairs(&self) -> Result<Vec<AllowedPair>, CoreError> {
        match self.execute(Command::ListAllowedPairs).await? {
            CommandResult::Pairs(pairs) => Ok(pairs),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn register_host(&self, record: HostRecord) -> Result<(), CoreError> {
        self.execute(Command::RegisterHost(record)).await?;
        Ok(())
    }

    pub async fn list_hosts(&self) -> Result<Vec<HostRecord>, CoreError> {
        match self.execute(Command::ListHosts).await? {
            CommandResult::Hosts(hosts) => Ok(hosts),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn set_router_config(&self, name: &str, config: Value) -> Result<(), CoreError> {
        self.execute(Command::SetRouterConfig {
            name: name.to_owned(),
            config,
        })
        .await?;
        Ok(())
    }

    pub async fn router_config(&self, name: &str) -> Result<Option<Value>, CoreError> {
        match self
            .execute(Command::GetRouterConfig {
                name: name.to_owned(),
            })
            .await?
        {
            CommandResult::Config(config) => Ok(config),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn router_configs(&self) -> Result<BTreeMap<String, Value>, CoreError> {
        match self.execute(Command::ListRouterConfigs).await? {
            CommandResult::Configs(configs) => Ok(configs),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn snapshot(&self) -> Result<TopologySnapshot, CoreError> {
        match self.execute(Command::Snapshot).await? {
            CommandResult::Snapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── Controller ──────────────────────────────────────────────────────

pub struct Controller {
    config: ControllerConfig,
    client: RoutingClient,
    tx: mpsc::Sender<ControlMsg>,
    rx: mpsc::Receiver<ControlMsg>,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let client = RoutingClient::new(
            config.rest.base_url.clone(),
            config.rest.timeout,
            config.rest.retry,
        )?;
        Ok(Self::with_client(config, client))
    }

    /// Construct with a pre-built client (tests inject wiremock here).
    pub fn with_client(config: ControllerConfig, client: RoutingClient) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            config,
            client,
            tx,
            rx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled. Consumes the controller; keep a
    /// [`ControlHandle`] and the cancellation token before calling.
    pub async fn run(self) {
        let Self {
            config,
            client,
            tx,
            mut rx,
            cancel,
        } = self;

        if let Some(period) = config.topology_refresh {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // immediate first tick
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            if tx.send(ControlMsg::Event(Event::TopologyRefresh)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        let flows = FlowProgrammer::new(
            config.priorities,
            config.cookies,
            config.plan.clone(),
            config.interlan_override,
        );
        let engine = PolicyEngine::new(config.plan.clone());
        let l2 = L2LearningTable::new(config.l2_capacity);
        let mut inner = Loop {
            config,
            client,
            flows,
            engine,
            l2,
            state: ControllerState::new(),
            tx,
            cancel: cancel.clone(),
        };

        info!("control loop started");
        // Initial classification so routers found at startup begin
        // bootstrapping before any switch connects.
        inner.refresh_classification().await;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(ControlMsg::Event(event)) => inner.handle_event(event).await,
                    Some(ControlMsg::Command(envelope)) => inner.handle_command(envelope),
                    None => break,
                },
            }
        }
        info!("control loop stopped");
    }
}

// ── Loop internals ──────────────────────────────────────────────────

struct Loop {
    config: ControllerConfig,
    client: RoutingClient,
    flows: FlowProgrammer,
    engine: PolicyEngine,
    l2: L2LearningTable,
    state: ControllerState,
    tx: mpsc::Sender<ControlMsg>,
    cancel: CancellationToken,
}

impl Loop {
    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::SwitchConnected { dpid, conn } => {
                info!(%dpid, "switch connected");
                self.state.attach(SwitchHandle::new(dpid, conn));
                // A reconnect is a fresh chance for a previously
                // abandoned router.
                self.state.rearm_bootstrap(dpid);
            }
            Event::SwitchReady { dpid } => {
                self.refresh_classification().await;
                self.provision_switch(dpid);
            }
            Event::SwitchDisconnected { dpid } => {
                info!(%dpid, "switch disconnected");
                self.state.detach(dpid);
                self.l2.forget_switch(dpid);
            }
            Event::PacketIn(pkt) => self.handle_packet_in(pkt),
            Event::TopologyRefresh => self.refresh_classification().await,
            Event::BootstrapPhase { dpid, state } => {
                debug!(%dpid, %state, "bootstrap phase");
                self.state.set_bootstrap_state(dpid, state);
            }
            Event::BootstrapOutcome { dpid, outcome } => match outcome {
                Ok(ports) => {
                    info!(%dpid, "router bootstrap complete");
                    self.state.set_router_ports(dpid, ports);
                    self.state
                        .set_bootstrap_state(dpid, BootstrapState::PolicyInstalled);
                    self.install_router_dataplane(dpid);
                }
                Err(failure) => {
                    error!(%dpid, %failure, "router bootstrap abandoned");
                    self.state
                        .set_bootstrap_state(dpid, BootstrapState::Abandoned);
                }
            },
        }
    }

    /// Re-query topology; on failure keep the previous classification.
    async fn refresh_classification(&mut self) {
        match classify::classify(&self.client, &self.config.plan.transit_marker).await {
            Ok(classification) => {
                let fresh = self.state.apply_classification(classification);
                for dpid in fresh {
                    self.spawn_bootstrap(dpid);
                }
            }
            Err(err) => {
                warn!(%err, "topology refresh failed; keeping previous classification");
            }
        }
    }

    fn spawn_bootstrap(&mut self, dpid: Dpid) {
        info!(%dpid, "starting router bootstrap");
        self.state
            .set_bootstrap_state(dpid, BootstrapState::Discovering);
        tokio::spawn(bootstrap::run(
            self.client.clone(),
            self.config.plan.clone(),
            self.config.bootstrap,
            dpid,
            self.tx.clone(),
            self.cancel.child_token(),
        ));
    }

    /// Wipe and reinstall everything a ready switch should carry.
    fn provision_switch(&mut self, dpid: Dpid) {
        let role = self.state.role(dpid);
        let Some(switch) = self.state.handle(dpid) else {
            debug!(%dpid, "switch ready but not connected; skipping provisioning");
            return;
        };

        self.flows.remove_by_cookie(switch, self.flows.cookies().base);
        self.flows.install_base_flows(switch, role);

        match role {
            SwitchRole::Router => self.install_router_dataplane(dpid),
            SwitchRole::Access => {
                self.engine
                    .synchronize(&self.state, &self.flows, [dpid].iter());
            }
        }
    }

    /// Transit plumbing, gateway ARP capture, and a policy flush on a
    /// bootstrapped router. No-op until both the connection and the
    /// discovered ports are available; whichever arrives last triggers
    /// the install.
    fn install_router_dataplane(&mut self, dpid: Dpid) {
        let Some(ports) = self.state.router_ports(dpid).copied() else {
            debug!(%dpid, "router ports not yet discovered; deferring dataplane");
            return;
        };
        let Some(switch) = self.state.handle(dpid) else {
            debug!(%dpid, "router not connected; deferring dataplane");
            return;
        };

        self.flows.install_transit_flows(switch, &ports);
        if let Some(side) = self.config.plan.side_of_cidr(ports.lan_cidr) {
            let rp = self.config.plan.router_plan(side);
            self.flows
                .install_arp_capture(switch, rp.gateway.addr, rp.transit_addr.addr);
        }
        self.engine
            .synchronize(&self.state, &self.flows, [dpid].iter());
    }

    fn handle_packet_in(&mut self, pkt: PacketIn) {
        if pkt.lldp {
            return;
        }
        if self.state.role(pkt.dpid) == SwitchRole::Router {
            // Router pipelines forward normally; nothing to learn here.
            return;
        }
        let Some(switch) = self.state.handle(pkt.dpid) else {
            return;
        };

        if let Some(moved_from) = self.l2.learn(pkt.dpid, pkt.eth_src, pkt.in_port) {
            debug!(dpid = %pkt.dpid, mac = %pkt.eth_src, moved_from, "MAC moved ports");
        }

        let out = match self.l2.lookup(pkt.dpid, pkt.eth_dst) {
            Some(port) => {
                self.flows
                    .install_l2_unicast(switch, pkt.in_port, pkt.eth_src, pkt.eth_dst, port);
                PortRef::Physical(port)
            }
            None => PortRef::Flood,
        };

        // A buffered packet is replayed from the switch's buffer; only
        // unbuffered packets carry the frame back out.
        let data = if pkt.buffer_id.is_some() {
            None
        } else {
            Some(pkt.data)
        };
        switch.send_packet_out(PacketOut {
            in_port: pkt.in_port,
            actions: vec![FlowAction::Output(out)],
            data,
            buffer_id: pkt.buffer_id,
        });
    }

    fn handle_command(&mut self, envelope: CommandEnvelope) {
        let result = self.dispatch(envelope.command);
        if envelope.response_tx.send(result).is_err() {
            debug!("command caller went away before the reply");
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<CommandResult, CoreError> {
        match command {
            Command::ReplaceAllowedPairs(pairs) => {
                self.state.replace_allowed_pairs(pairs.into_iter().collect());
                self.resync_all();
                Ok(CommandResult::Done)
            }
            Command::AddAllowedPair(pair) => {
                if self.state.add_allowed_pair(pair) {
                    self.resync_all();
                    Ok(CommandResult::Done)
                } else {
                    Ok(CommandResult::Unchanged)
                }
            }
            Command::RemoveAllowedPair(pair) => {
                if self.state.remove_allowed_pair(&pair) {
                    self.resync_all();
                    Ok(CommandResult::Done)
                } else {
                    Err(CoreError::PairNotFound {
                        src: pair.src().to_owned(),
                        dst: pair.dst().to_owned(),
                    })
                }
            }
            Command::ListAllowedPairs => Ok(CommandResult::Pairs(
                self.state.allowed_pairs().iter().cloned().collect(),
            )),
            Command::RegisterHost(mut record) => {
                if record.router.is_none() {
                    record.router = self
                        .config
                        .plan
                        .lan_of(record.ip)
                        .and_then(|lan| self.router_name_for_lan(lan));
                }
                info!(host = %record.hostname, ip = %record.ip, "host registered");
                self.state.register_host(record);
                Ok(CommandResult::Done)
            }
            Command::ListHosts => Ok(CommandResult::Hosts(
                self.state.hosts().cloned().collect(),
            )),
            Command::SetRouterConfig { name, config } => {
                self.state.merge_router_config(&name, config);
                Ok(CommandResult::Done)
            }
            Command::GetRouterConfig { name } => Ok(CommandResult::Config(
                self.state.router_config(&name).cloned(),
            )),
            Command::ListRouterConfigs => {
                Ok(CommandResult::Configs(self.state.router_configs().clone()))
            }
            Command::Snapshot => Ok(CommandResult::Snapshot(self.state.snapshot())),
        }
    }

    fn resync_all(&mut self) {
        // A topology snapshot can transiently miss a connected switch;
        // policy updates must still revoke its rules, so target the
        // union of reported and connected switches.
        let targets: BTreeSet<Dpid> = self
            .state
            .known()
            .iter()
            .copied()
            .chain(self.state.connected_dpids())
            .collect();
        let targets: Vec<Dpid> = targets.into_iter().collect();
        self.engine
            .synchronize(&self.state, &self.flows, targets.iter());
    }

    fn router_name_for_lan(&self, lan: LanId) -> Option<String> {
        let cidr = self.config.plan.lan(lan);
        self.state
            .routers()
            .iter()
            .find(|dpid| {
                self.state
                    .router_ports(**dpid)
                    .is_some_and(|ports| ports.lan_cidr == cidr)
            })
            .and_then(|dpid| self.state.router_name(*dpid))
            .map(str::to_owned)
    }
}
