// ── Switch classification ──
//
// A switch is a router iff any of its port names carries the transit
// marker substring. Names are assigned deterministically by ascending
// DPID so `router1` / `router2` stay stable across refreshes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use flowgrid_api::{Dpid, PortDesc, RoutingClient};

use crate::config::NetworkPlan;
use crate::error::CoreError;
use crate::model::{MacAddr, RouterPorts};

/// One pass over the topology service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Every switch the topology service reports.
    pub known: BTreeSet<Dpid>,
    /// The subset carrying a transit-overlay port.
    pub routers: BTreeSet<Dpid>,
    /// Stable names for the routers, ascending DPID order.
    pub names: BTreeMap<Dpid, String>,
}

/// Case-insensitive transit-marker test over a port list.
pub fn has_transit_port(ports: &[PortDesc], marker: &str) -> bool {
    let marker = marker.to_ascii_lowercase();
    ports
        .iter()
        .any(|p| p.name.to_ascii_lowercase().contains(&marker))
}

fn router_names(routers: &BTreeSet<Dpid>) -> BTreeMap<Dpid, String> {
    routers
        .iter()
        .enumerate()
        .map(|(i, dpid)| (*dpid, format!("router{}", i + 1)))
        .collect()
}

/// Extract the LAN-facing and transit-facing ports of a router.
///
/// Port naming convention: the transit port carries the marker
/// substring, the LAN port name contains `router` and `link`, or the
/// LAN id (`lan1`/`lan2`) directly. Returns `None` until every field
/// can be resolved; bootstrap keeps polling in that case.
pub fn extract_router_ports(ports: &[PortDesc], plan: &NetworkPlan) -> Option<RouterPorts> {
    let marker = plan.transit_marker.to_ascii_lowercase();
    let mut lan_port: Option<u32> = None;
    let mut lan_mac: Option<MacAddr> = None;
    let mut transit_port: Option<u32> = None;
    let mut lan_cidr = None;

    for port in ports {
        let name = port.name.to_ascii_lowercase();
        let Some(number) = port.port_no.as_ref().and_then(|n| n.as_number()) else {
            continue;
        };
        if port.port_no.as_ref().is_some_and(|n| n.is_local()) {
            continue;
        }

        if name.contains(&marker) {
            transit_port = Some(number);
        } else if (name.contains("router") && name.contains("link"))
            || name.contains("lan1")
            || name.contains("lan2")
        {
            lan_port = Some(number);
            lan_mac = port.hw_addr.as_deref().and_then(|m| m.parse().ok());
            if name.contains('1') {
                lan_cidr = Some(plan.lan1);
            } else if name.contains('2') {
                lan_cidr = Some(plan.lan2);
            }
        }
    }

    Some(RouterPorts {
        lan_port: lan_port?,
        lan_mac: lan_mac?,
        transit_port: transit_port?,
        lan_cidr: lan_cidr?,
    })
}

/// Query the topology service and classify every reported switch.
///
/// A per-switch port-descriptor failure demotes that switch to
/// unclassified-as-router rather than failing the whole pass; a
/// topology failure is an error so the caller can keep its previous
/// view instead of forgetting every switch.
pub async fn classify(client: &RoutingClient, marker: &str) -> Result<Classification, CoreError> {
    let dpids = client.topology_switches().await?;

    let mut known = BTreeSet::new();
    let mut routers = BTreeSet::new();
    for dpid in dpids {
        known.insert(dpid);
        let ports = match client.port_descriptors(dpid).await {
            Ok(ports) => ports,
            Err(err) => {
                warn!(%dpid, %err, "port descriptors unavailable; classifying as access");
                Vec::new()
            }
        };
        if has_transit_port(&ports, marker) {
            routers.insert(dpid);
        }
    }

    let names = router_names(&routers);
    debug!(
        known = known.len(),
        routers = routers.len(),
        "classification pass complete"
    );
    Ok(Classification {
        known,
        routers,
        names,
    })
}
