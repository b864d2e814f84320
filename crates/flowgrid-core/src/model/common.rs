use std::fmt;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use thiserror::Error;

/// An IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address: {0}")]
pub struct MacAddrParseError(String);

impl MacAddr {
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| MacAddrParseError(s.to_owned()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| MacAddrParseError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(MacAddrParseError(s.to_owned()));
        }
        Ok(Self(octets))
    }
}

/// How a switch participates in the managed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRole {
    /// Carries a transit-overlay port; runs L3 between the LANs.
    Router,
    /// Everything else; hosts attach here.
    Access,
}

/// Ports discovered on a router switch during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterPorts {
    /// OpenFlow port facing the LAN.
    pub lan_port: u32,
    /// MAC of the LAN-facing port; gratuitous-ARP and gateway rules key on it.
    pub lan_mac: MacAddr,
    /// OpenFlow port facing the transit overlay.
    pub transit_port: u32,
    /// The LAN this router serves.
    pub lan_cidr: Ipv4Network,
}
