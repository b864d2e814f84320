// ── Switch connection seam ──
//
// The control loop never talks OpenFlow wire format itself; it hands
// `FlowMod` / `PacketOut` values to whatever implements `SwitchConn`.
// Tests plug in a recording implementation.

use std::fmt;
use std::sync::Arc;

use flowgrid_api::Dpid;

use crate::model::{FlowMod, PacketOut};

/// Transport to one connected switch.
pub trait SwitchConn: Send + Sync {
    fn send_flow_mod(&self, msg: FlowMod);
    fn send_packet_out(&self, msg: PacketOut);
}

/// A switch identity plus its live connection.
#[derive(Clone)]
pub struct SwitchHandle {
    pub dpid: Dpid,
    conn: Arc<dyn SwitchConn>,
}

impl SwitchHandle {
    pub fn new(dpid: Dpid, conn: Arc<dyn SwitchConn>) -> Self {
        Self { dpid, conn }
    }

    pub fn send_flow_mod(&self, msg: FlowMod) {
        self.conn.send_flow_mod(msg);
    }

    pub fn send_packet_out(&self, msg: PacketOut) {
        self.conn.send_packet_out(msg);
    }
}

impl fmt::Debug for SwitchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchHandle")
            .field("dpid", &self.dpid)
            .finish_non_exhaustive()
    }
}
