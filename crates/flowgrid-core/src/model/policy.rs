use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// A directional host pair permitted to communicate.
///
/// Stored as the operator supplied it (strings, not parsed addresses):
/// entries that do not resolve to in-scope IPv4 hosts are simply never
/// rendered into flow rules, but they stay in the list so the operator
/// can see and fix them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllowedPair {
    src: String,
    dst: String,
}

impl AllowedPair {
    /// `None` when either side is empty after trimming.
    pub fn new(src: &str, dst: &str) -> Option<Self> {
        let src = src.trim();
        let dst = dst.trim();
        if src.is_empty() || dst.is_empty() {
            return None;
        }
        Some(Self {
            src: src.to_owned(),
            dst: dst.to_owned(),
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dst(&self) -> &str {
        &self.dst
    }
}

impl fmt::Display for AllowedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// A registered host endpoint, keyed by address in the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub hostname: String,
    /// Router name (`router1`/`router2`) serving this host, if known.
    pub router: Option<String>,
}
