// Idempotent provisioning against `/router/{dpid}`.
//
// The routing service is not guaranteed to accept duplicate POSTs
// cheaply, so each ensure call reads current state first and only POSTs
// when the entry is genuinely absent. A concurrent writer can still race
// us into a duplicate POST; the 400/409-as-applied rule in `post_json`
// absorbs that case.

use serde_json::{Value, json};
use tracing::info;

use crate::client::{Applied, RoutingClient};
use crate::error::Error;
use crate::models::{Dpid, collect_interfaces, collect_routes};

/// Outcome of an ensure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure {
    /// The entry already existed; nothing was sent.
    AlreadyPresent,
    /// The entry was created (or the service reported it as duplicate).
    Applied,
}

impl RoutingClient {
    fn router_path(dpid: Dpid) -> String {
        format!("/router/{}", dpid.hex16())
    }

    /// Current raw router configuration, `[]` if unreachable.
    pub async fn router_config(&self, dpid: Dpid) -> Value {
        self.get_json_or(&Self::router_path(dpid), Value::Array(Vec::new()))
            .await
    }

    /// Ensure an L3 interface `address` exists on `port` of `dpid`.
    pub async fn ensure_interface(
        &self,
        dpid: Dpid,
        port: u32,
        address: &str,
    ) -> Result<Ensure, Error> {
        let path = Self::router_path(dpid);
        let current = self.router_config(dpid).await;

        let present = collect_interfaces(&current)
            .iter()
            .any(|entry| entry.address == address);
        if present {
            info!(%dpid, address, port, "interface already present; skipping POST");
            return Ok(Ensure::AlreadyPresent);
        }

        let payload = json!({ "address": address, "port": port });
        match self.post_json(&path, &payload).await? {
            Applied::Created => Ok(Ensure::Applied),
            Applied::AlreadyApplied => Ok(Ensure::AlreadyPresent),
        }
    }

    /// Ensure a static route to `destination` via `gateway` on `dpid`.
    pub async fn ensure_route(
        &self,
        dpid: Dpid,
        destination: &str,
        gateway: &str,
    ) -> Result<Ensure, Error> {
        let path = Self::router_path(dpid);
        let current = self.router_config(dpid).await;

        let present = collect_routes(&current)
            .iter()
            .any(|entry| entry.destination == destination && entry.gateway == gateway);
        if present {
            info!(%dpid, destination, gateway, "route already present; skipping POST");
            return Ok(Ensure::AlreadyPresent);
        }

        let payload = json!({ "destination": destination, "gateway": gateway });
        match self.post_json(&path, &payload).await? {
            Applied::Created => Ok(Ensure::Applied),
            Applied::AlreadyApplied => Ok(Ensure::AlreadyPresent),
        }
    }
}
