// Topology and port-descriptor queries.
//
// These back switch classification and router port discovery. The
// topology endpoint reports hex DPIDs; port descriptors are keyed by the
// decimal DPID string. Malformed entries are skipped, never fatal.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::client::RoutingClient;
use crate::error::Error;
use crate::models::{Dpid, PortDesc};

#[derive(Debug, Deserialize)]
struct TopologySwitch {
    dpid: String,
}

impl RoutingClient {
    /// List every switch known to the topology service.
    pub async fn topology_switches(&self) -> Result<Vec<Dpid>, Error> {
        let raw: Vec<TopologySwitch> = self.get_json("/v1.0/topology/switches").await?;
        let dpids: Vec<Dpid> = raw
            .iter()
            .filter_map(|sw| {
                let parsed = Dpid::from_hex(&sw.dpid);
                if parsed.is_none() {
                    debug!(dpid = %sw.dpid, "skipping unparsable topology DPID");
                }
                parsed
            })
            .collect();
        Ok(dpids)
    }

    /// Fetch the port descriptors of one switch.
    ///
    /// An empty list means the switch's ports are not yet known; callers
    /// treat that the same as a failed query (not ready, retry later).
    pub async fn port_descriptors(&self, dpid: Dpid) -> Result<Vec<PortDesc>, Error> {
        let mut keyed: HashMap<String, Vec<PortDesc>> = self
            .get_json(&format!("/stats/portdesc/{dpid}"))
            .await?;
        Ok(keyed.remove(&dpid.to_string()).unwrap_or_default())
    }
}
