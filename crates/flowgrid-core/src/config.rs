// ── Runtime configuration for the controller core ──
//
// These types are deliberately free of any file-format concern; the
// `flowgrid-config` crate handles TOML/env loading and produces a
// validated `ControllerConfig`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use url::Url;

use flowgrid_api::RetryPolicy;

// ── Addressing ──────────────────────────────────────────────────────

/// An interface address in CIDR notation, e.g. `10.0.1.254/24`.
///
/// Unlike [`Ipv4Network`] this keeps the full host address rather than
/// the masked network, which is what the routing service expects for
/// interface provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrAddr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl CidrAddr {
    pub const fn new(addr: Ipv4Addr, prefix: u8) -> Self {
        Self { addr, prefix }
    }
}

impl fmt::Display for CidrAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for CidrAddr {
    type Err = ipnetwork::IpNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Reuse ipnetwork's parser for validation, but keep the host bits.
        let net: Ipv4Network = s.parse()?;
        Ok(Self {
            addr: net.ip(),
            prefix: net.prefix(),
        })
    }
}

// ── Network plan ────────────────────────────────────────────────────

/// The two tenant-facing LAN segments the controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanId {
    Lan1,
    Lan2,
}

impl LanId {
    /// The other side of the pair.
    pub fn peer(self) -> Self {
        match self {
            Self::Lan1 => Self::Lan2,
            Self::Lan2 => Self::Lan1,
        }
    }
}

impl fmt::Display for LanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lan1 => f.write_str("lan1"),
            Self::Lan2 => f.write_str("lan2"),
        }
    }
}

/// Everything a router bootstrap needs to provision one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterPlan {
    /// LAN-facing gateway interface address.
    pub gateway: CidrAddr,
    /// Transit-facing interface address.
    pub transit_addr: CidrAddr,
    /// Remote LAN to route towards.
    pub route_dest: Ipv4Network,
    /// Transit address of the peer router.
    pub next_hop: Ipv4Addr,
}

/// Static description of the managed topology: two LANs joined by a
/// transit segment between their routers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    pub lan1: Ipv4Network,
    pub lan1_gateway: CidrAddr,
    pub lan2: Ipv4Network,
    pub lan2_gateway: CidrAddr,
    pub transit: Ipv4Network,
    /// Transit endpoint of the lan1-side router.
    pub transit_a: CidrAddr,
    /// Transit endpoint of the lan2-side router.
    pub transit_b: CidrAddr,
    /// Substring identifying transit-overlay port names, e.g. `vxlan`.
    pub transit_marker: String,
}

impl NetworkPlan {
    pub fn lan(&self, id: LanId) -> Ipv4Network {
        match id {
            LanId::Lan1 => self.lan1,
            LanId::Lan2 => self.lan2,
        }
    }

    /// Which LAN contains `addr`, if any.
    pub fn lan_of(&self, addr: Ipv4Addr) -> Option<LanId> {
        if self.lan1.contains(addr) {
            Some(LanId::Lan1)
        } else if self.lan2.contains(addr) {
            Some(LanId::Lan2)
        } else {
            None
        }
    }

    /// Whether both endpoints live inside the managed LANs.
    pub fn pair_in_scope(&self, a: Ipv4Addr, b: Ipv4Addr) -> bool {
        self.lan_of(a).is_some() && self.lan_of(b).is_some()
    }

    /// Which LAN a router's access-side network corresponds to.
    pub fn side_of_cidr(&self, net: Ipv4Network) -> Option<LanId> {
        if net == self.lan1 {
            Some(LanId::Lan1)
        } else if net == self.lan2 {
            Some(LanId::Lan2)
        } else {
            None
        }
    }

    /// The provisioning plan for the router serving `side`.
    pub fn router_plan(&self, side: LanId) -> RouterPlan {
        match side {
            LanId::Lan1 => RouterPlan {
                gateway: self.lan1_gateway,
                transit_addr: self.transit_a,
                route_dest: self.lan2,
                next_hop: self.transit_b.addr,
            },
            LanId::Lan2 => RouterPlan {
                gateway: self.lan2_gateway,
                transit_addr: self.transit_b,
                route_dest: self.lan1,
                next_hop: self.transit_a.addr,
            },
        }
    }
}

#[allow(clippy::unwrap_used)] // literals below are valid by inspection
impl Default for NetworkPlan {
    fn default() -> Self {
        Self {
            lan1: "10.0.1.0/24".parse().unwrap(),
            lan1_gateway: "10.0.1.254/24".parse().unwrap(),
            lan2: "10.0.2.0/24".parse().unwrap(),
            lan2_gateway: "10.0.2.254/24".parse().unwrap(),
            transit: "10.30.30.0/24".parse().unwrap(),
            transit_a: "10.30.30.11/24".parse().unwrap(),
            transit_b: "10.30.30.12/24".parse().unwrap(),
            transit_marker: "vxlan".to_owned(),
        }
    }
}

// ── Flow table knobs ────────────────────────────────────────────────

/// Priority bands for the policy-controlled rules. The strict ordering
/// `allow > drop > arp > miss` is what makes ALLOW rules win over the
/// segment-wide DROPs while ARP and table-miss stay underneath both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priorities {
    pub allow: u16,
    pub drop: u16,
    pub arp: u16,
    pub miss: u16,
}

impl Priorities {
    pub fn is_strictly_ordered(&self) -> bool {
        self.allow > self.drop && self.drop > self.arp && self.arp > self.miss
    }
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            allow: 80,
            drop: 70,
            arp: 10,
            miss: 0,
        }
    }
}

/// Cookie values tagging flow ownership, used for scoped bulk deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieTags {
    /// Baseline flows (table-miss, ARP handling, transit plumbing).
    pub base: u64,
    /// Policy-derived flows (pair ALLOWs and segment DROPs).
    pub policy: u64,
}

impl Default for CookieTags {
    fn default() -> Self {
        Self {
            base: 0x2,
            policy: 0x0A11_0ED,
        }
    }
}

// ── Service settings ────────────────────────────────────────────────

/// How to reach the routing/topology REST service.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub base_url: Url,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

#[allow(clippy::unwrap_used)] // literal URL is valid by inspection
impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8080").unwrap(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Router bootstrap pacing.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapSettings {
    /// Discovery attempts before the router is abandoned.
    pub max_attempts: usize,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub rest: RestSettings,
    pub plan: NetworkPlan,
    pub priorities: Priorities,
    pub cookies: CookieTags,
    pub bootstrap: BootstrapSettings,
    /// Per-switch cap on learned MAC entries.
    pub l2_capacity: usize,
    /// Optional periodic topology re-classification.
    pub topology_refresh: Option<Duration>,
    /// Also steer own-LAN traffic out the router's LAN port. Off by
    /// default; the normal pipeline already delivers those frames.
    pub interlan_override: bool,
}

pub const DEFAULT_L2_CAPACITY: usize = 1024;

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            rest: RestSettings::default(),
            plan: NetworkPlan::default(),
            priorities: Priorities::default(),
            cookies: CookieTags::default(),
            bootstrap: BootstrapSettings::default(),
            l2_capacity: DEFAULT_L2_CAPACITY,
            topology_refresh: None,
            interlan_override: false,
        }
    }
}
