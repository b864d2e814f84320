// Wire models for the routing service, plus the tolerant-parsing layer.
//
// The service's `/router/{dpid}` responses differ across deployments:
// interfaces and routes appear under varying container keys and with
// several historical field names. `collect_interfaces`/`collect_routes`
// normalize every known shape into one canonical record type each, so the
// rest of the system never branches on response shape.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Switch identity ──────────────────────────────────────────────────

/// Datapath identifier of a switch.
///
/// Displays as decimal (the form used by `/stats/portdesc/{dpid}`);
/// [`hex16`](Self::hex16) renders the 16-digit zero-padded hex form used
/// by `/router/{dpid}` and by the topology endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Dpid(pub u64);

impl Dpid {
    /// 16-digit zero-padded lowercase hex, e.g. `0000000000000001`.
    pub fn hex16(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a hex DPID string as returned by the topology endpoint.
    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s.trim(), 16).ok().map(Self)
    }
}

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Dpid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ── Port descriptors ─────────────────────────────────────────────────

/// OpenFlow port number 0xfffffffe, the switch-local port.
const OFPP_LOCAL: u32 = 0xffff_fffe;

/// A port number as reported by `/stats/portdesc`: numeric for ordinary
/// ports, a string (`"LOCAL"`) for reserved ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortNo {
    Number(u32),
    Named(String),
}

impl PortNo {
    /// The numeric port number, if this is (or parses as) one.
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Named(s) => s.parse().ok(),
        }
    }

    /// Whether this is the switch-local port.
    pub fn is_local(&self) -> bool {
        match self {
            Self::Number(n) => *n == OFPP_LOCAL,
            Self::Named(s) => s == "LOCAL",
        }
    }
}

/// One entry from `/stats/portdesc/{dpid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PortDesc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port_no: Option<PortNo>,
    #[serde(default)]
    pub hw_addr: Option<String>,
}

// ── Canonical router-config records ──────────────────────────────────

/// An L3 interface entry, normalized from whatever shape the service
/// returned it in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InterfaceEntry {
    pub address: String,
    pub port: Option<u64>,
}

/// A static route entry, normalized from whatever shape the service
/// returned it in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: String,
}

/// Collect every interface entry reachable anywhere inside `value`.
///
/// Accepts lists of `{address, port}` objects, lists of bare address
/// strings, and objects nesting either under arbitrary container keys
/// (`addresses`, `interfaces`, `data`, `body`, ...).
pub fn collect_interfaces(value: &Value) -> Vec<InterfaceEntry> {
    let mut out = BTreeSet::new();
    walk_interfaces(value, &mut out);
    out.into_iter().collect()
}

fn walk_interfaces(value: &Value, out: &mut BTreeSet<InterfaceEntry>) {
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(map) => {
                        if let Some(address) = map.get("address").and_then(string_field) {
                            out.insert(InterfaceEntry {
                                address,
                                port: map.get("port").and_then(number_field),
                            });
                        }
                        walk_interfaces(item, out);
                    }
                    Value::String(s) => {
                        let trimmed = s.trim();
                        if !trimmed.is_empty() {
                            out.insert(InterfaceEntry {
                                address: trimmed.to_string(),
                                port: None,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            for nested in map.values() {
                if matches!(nested, Value::Array(_) | Value::Object(_)) {
                    walk_interfaces(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Collect every route entry reachable anywhere inside `value`.
///
/// Destination may appear as `destination`, `dst`, or `network`; the
/// next hop as `gateway`, `nexthop`, or `gw`.
pub fn collect_routes(value: &Value) -> Vec<RouteEntry> {
    let mut out = BTreeSet::new();
    walk_routes(value, &mut out);
    out.into_iter().collect()
}

fn walk_routes(value: &Value, out: &mut BTreeSet<RouteEntry>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Value::Object(map) = item {
                    let destination = ["destination", "dst", "network"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(string_field));
                    let gateway = ["gateway", "nexthop", "gw"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(string_field));
                    if let (Some(destination), Some(gateway)) = (destination, gateway) {
                        out.insert(RouteEntry {
                            destination,
                            gateway,
                        });
                    }
                    walk_routes(item, out);
                }
            }
        }
        Value::Object(map) => {
            for nested in map.values() {
                if matches!(nested, Value::Array(_) | Value::Object(_)) {
                    walk_routes(nested, out);
                }
            }
        }
        _ => {}
    }
}

fn string_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn dpid_formats() {
        let dpid = Dpid(1);
        assert_eq!(dpid.to_string(), "1");
        assert_eq!(dpid.hex16(), "0000000000000001");
        assert_eq!(Dpid::from_hex("0000000000000001"), Some(Dpid(1)));
        assert_eq!(Dpid::from_hex(" ff "), Some(Dpid(255)));
        assert_eq!(Dpid::from_hex("not-hex"), None);
    }

    #[test]
    fn port_no_tolerates_local_marker() {
        let numeric: PortNo = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(numeric.as_number(), Some(3));
        assert!(!numeric.is_local());

        let local: PortNo = serde_json::from_value(json!("LOCAL")).unwrap();
        assert!(local.is_local());
        assert_eq!(local.as_number(), None);

        let stringy: PortNo = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(stringy.as_number(), Some(7));

        let reserved: PortNo = serde_json::from_value(json!(4_294_967_294u32)).unwrap();
        assert!(reserved.is_local());
    }

    #[test]
    fn collects_interfaces_from_flat_list() {
        let value = json!([
            { "address": "10.0.1.254/24", "port": 1 },
            { "address": " 10.30.30.11/24 ", "port": "2" },
            "10.0.2.254/24"
        ]);
        let entries = collect_interfaces(&value);
        assert_eq!(
            entries,
            vec![
                InterfaceEntry {
                    address: "10.0.1.254/24".into(),
                    port: Some(1)
                },
                InterfaceEntry {
                    address: "10.0.2.254/24".into(),
                    port: None
                },
                InterfaceEntry {
                    address: "10.30.30.11/24".into(),
                    port: Some(2)
                },
            ]
        );
    }

    #[test]
    fn collects_interfaces_under_nested_containers() {
        let value = json!({
            "internal_network": [{
                "interface": [
                    { "address": "10.0.1.254/24", "port": 1 }
                ]
            }]
        });
        let entries = collect_interfaces(&value);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "10.0.1.254/24");
    }

    #[test]
    fn collects_routes_under_any_field_name() {
        let value = json!({
            "routes": [
                { "destination": "10.0.2.0/24", "gateway": "10.30.30.12" },
                { "dst": "10.0.1.0/24", "nexthop": "10.30.30.11" },
                { "network": "10.0.3.0/24", "gw": "10.30.30.13" },
                { "destination": "10.0.4.0/24" }
            ]
        });
        let entries = collect_routes(&value);
        assert_eq!(entries.len(), 3);
        assert!(entries.contains(&RouteEntry {
            destination: "10.0.1.0/24".into(),
            gateway: "10.30.30.11".into()
        }));
        assert!(entries.contains(&RouteEntry {
            destination: "10.0.3.0/24".into(),
            gateway: "10.30.30.13".into()
        }));
    }

    #[test]
    fn ignores_scalars_and_duplicates() {
        let value = json!([
            { "address": "10.0.1.254/24", "port": 1 },
            { "address": "10.0.1.254/24", "port": 1 },
            42,
            null
        ]);
        assert_eq!(collect_interfaces(&value).len(), 1);
    }
}
