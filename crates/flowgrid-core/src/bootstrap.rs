// ── Router bootstrap ──
//
// Each newly classified router gets its own bootstrap task: poll port
// descriptors until both the LAN and transit ports are visible, then
// provision gateway/transit interfaces and the cross-LAN route. The
// outcome flows back into the control loop as an event; the loop never
// blocks on a bootstrap.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowgrid_api::{Dpid, RoutingClient};

use crate::classify::extract_router_ports;
use crate::config::{BootstrapSettings, NetworkPlan};
use crate::controller::{ControlMsg, Event};
use crate::model::RouterPorts;

/// Lifecycle of one router's bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Polling for the router's ports to appear.
    Discovering,
    /// Ports found; provisioning interfaces and routes.
    Configuring,
    /// Fully provisioned and policy-ready.
    PolicyInstalled,
    /// Gave up; re-armed only when the switch reconnects.
    Abandoned,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovering => f.write_str("discovering"),
            Self::Configuring => f.write_str("configuring"),
            Self::PolicyInstalled => f.write_str("policy-installed"),
            Self::Abandoned => f.write_str("abandoned"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapFailure {
    #[error("router ports not discoverable after {attempts} attempts")]
    DiscoveryExhausted { attempts: usize },

    #[error("router LAN {lan_cidr} is not one of the managed networks")]
    UnknownLan { lan_cidr: ipnetwork::Ipv4Network },

    #[error("provisioning failed: {0}")]
    Provisioning(#[from] flowgrid_api::Error),
}

/// Drive one router from discovery to provisioned.
///
/// Sends `Event::BootstrapPhase` on the discovery/configure boundary
/// and exactly one `Event::BootstrapOutcome` at the end, unless
/// cancelled first.
pub(crate) async fn run(
    client: RoutingClient,
    plan: NetworkPlan,
    settings: BootstrapSettings,
    dpid: Dpid,
    tx: mpsc::Sender<ControlMsg>,
    cancel: CancellationToken,
) {
    let ports = match discover(&client, &plan, settings, dpid, &cancel).await {
        Ok(Some(ports)) => ports,
        Ok(None) => return, // cancelled
        Err(failure) => {
            send(&tx, Event::BootstrapOutcome {
                dpid,
                outcome: Err(failure),
            })
            .await;
            return;
        }
    };

    send(&tx, Event::BootstrapPhase {
        dpid,
        state: BootstrapState::Configuring,
    })
    .await;

    let outcome = configure(&client, &plan, dpid, ports).await;
    send(&tx, Event::BootstrapOutcome { dpid, outcome }).await;
}

async fn discover(
    client: &RoutingClient,
    plan: &NetworkPlan,
    settings: BootstrapSettings,
    dpid: Dpid,
    cancel: &CancellationToken,
) -> Result<Option<RouterPorts>, BootstrapFailure> {
    for attempt in 1..=settings.max_attempts {
        match client.port_descriptors(dpid).await {
            Ok(ports) => {
                if let Some(found) = extract_router_ports(&ports, plan) {
                    info!(%dpid, attempt, "router ports discovered");
                    return Ok(Some(found));
                }
                debug!(%dpid, attempt, "router ports incomplete; retrying");
            }
            Err(err) => {
                debug!(%dpid, attempt, %err, "port descriptor query failed; retrying");
            }
        }

        if attempt < settings.max_attempts {
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(settings.delay) => {}
            }
        }
    }

    warn!(%dpid, attempts = settings.max_attempts, "abandoning router bootstrap");
    Err(BootstrapFailure::DiscoveryExhausted {
        attempts: settings.max_attempts,
    })
}

async fn configure(
    client: &RoutingClient,
    plan: &NetworkPlan,
    dpid: Dpid,
    ports: RouterPorts,
) -> Result<RouterPorts, BootstrapFailure> {
    let side = plan
        .side_of_cidr(ports.lan_cidr)
        .ok_or(BootstrapFailure::UnknownLan {
            lan_cidr: ports.lan_cidr,
        })?;
    let rp = plan.router_plan(side);

    client
        .ensure_interface(dpid, ports.lan_port, &rp.gateway.to_string())
        .await?;
    client
        .ensure_interface(dpid, ports.transit_port, &rp.transit_addr.to_string())
        .await?;
    client
        .ensure_route(dpid, &rp.route_dest.to_string(), &rp.next_hop.to_string())
        .await?;

    info!(%dpid, side = %side, "router provisioned");
    Ok(ports)
}

async fn send(tx: &mpsc::Sender<ControlMsg>, event: Event) {
    // The loop outlives every bootstrap task except during shutdown,
    // where a dropped event is harmless.
    if tx.send(ControlMsg::Event(event)).await.is_err() {
        debug!("control loop gone; dropping bootstrap event");
    }
}
