// Flow-table vocabulary: matches, actions, and the mod/packet-out
// messages the controller hands to a switch connection.

use std::net::Ipv4Addr;

use bytes::Bytes;
use ipnetwork::Ipv4Network;

use super::common::MacAddr;

/// Ethertypes the controller matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthType {
    Ipv4,
    Arp,
}

impl EthType {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Arp => 0x0806,
        }
    }
}

/// An IPv4 match operand: a single host or a whole network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Selector {
    Host(Ipv4Addr),
    Net(Ipv4Network),
}

/// Match fields for a flow rule. Unset fields are wildcarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowMatch {
    pub in_port: Option<u32>,
    pub eth_type: Option<EthType>,
    pub eth_src: Option<MacAddr>,
    pub eth_dst: Option<MacAddr>,
    pub ipv4_src: Option<Ipv4Selector>,
    pub ipv4_dst: Option<Ipv4Selector>,
    /// ARP target protocol address (host or network).
    pub arp_tpa: Option<Ipv4Selector>,
}

impl FlowMatch {
    pub fn in_port(mut self, port: u32) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn eth_type(mut self, ty: EthType) -> Self {
        self.eth_type = Some(ty);
        self
    }

    pub fn eth_src(mut self, mac: MacAddr) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn eth_dst(mut self, mac: MacAddr) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    pub fn ipv4_src(mut self, sel: Ipv4Selector) -> Self {
        self.ipv4_src = Some(sel);
        self
    }

    pub fn ipv4_dst(mut self, sel: Ipv4Selector) -> Self {
        self.ipv4_dst = Some(sel);
        self
    }

    pub fn arp_tpa(mut self, sel: Ipv4Selector) -> Self {
        self.arp_tpa = Some(sel);
        self
    }
}

/// Output targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRef {
    Physical(u32),
    /// The switch's normal L2/L3 pipeline.
    Normal,
    Flood,
    Controller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Output(PortRef),
}

/// The action side of a rule.
///
/// `Drop` and `Apply(vec![])` would serialize identically on most
/// datapaths, but keeping them as distinct variants stops a dropped
/// action list from being mistaken for an intentional discard rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowActions {
    /// Explicitly discard matching traffic.
    Drop,
    Apply(Vec<FlowAction>),
}

impl FlowActions {
    pub fn output(port: PortRef) -> Self {
        Self::Apply(vec![FlowAction::Output(port)])
    }
}

/// A complete rule to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowIntent {
    pub table: u8,
    pub priority: u16,
    pub cookie: u64,
    pub matches: FlowMatch,
    pub actions: FlowActions,
}

/// Cookie mask selecting an exact cookie value.
pub const COOKIE_MASK_ALL: u64 = u64::MAX;

/// Flow-table modification messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMod {
    Add(FlowIntent),
    /// Delete every flow whose cookie matches under `cookie_mask`.
    DeleteByCookie {
        /// `None` deletes across all tables.
        table: Option<u8>,
        cookie: u64,
        cookie_mask: u64,
    },
}

/// A packet injected back into the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub in_port: u32,
    pub actions: Vec<FlowAction>,
    /// Raw frame; `None` when the switch buffered the original packet.
    pub data: Option<Bytes>,
    pub buffer_id: Option<u32>,
}
