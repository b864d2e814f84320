//! Domain types shared across the core modules.

mod common;
mod flow;
mod policy;

pub use common::{MacAddr, MacAddrParseError, RouterPorts, SwitchRole};
pub use flow::{
    COOKIE_MASK_ALL, EthType, FlowAction, FlowActions, FlowIntent, FlowMatch, FlowMod,
    Ipv4Selector, PacketOut, PortRef,
};
pub use policy::{AllowedPair, HostRecord};
