//! Configuration for the flowgrid controller daemon.
//!
//! TOML file + `FLOWGRID_`-prefixed environment overrides, validated and
//! translated to `flowgrid_core::ControllerConfig`. The file is optional:
//! with no file and no environment the defaults describe the reference
//! two-LAN deployment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowgrid_api::RetryPolicy;
use flowgrid_core::{
    AllowedPair, BootstrapSettings, CidrAddr, ControllerConfig, CookieTags, NetworkPlan,
    Priorities, RestSettings,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level file configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub rest: RestSection,

    #[serde(default)]
    pub networks: NetworksSection,

    #[serde(default)]
    pub priorities: PrioritiesSection,

    #[serde(default)]
    pub cookies: CookiesSection,

    #[serde(default)]
    pub bootstrap: BootstrapSection,

    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub policy: PolicySection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RestSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_retry_attempts() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    300
}

/// Addressing of the managed topology.
#[derive(Debug, Deserialize, Serialize)]
pub struct NetworksSection {
    #[serde(default = "default_lan1")]
    pub lan1: String,

    #[serde(default = "default_lan1_gateway")]
    pub lan1_gateway: String,

    #[serde(default = "default_lan2")]
    pub lan2: String,

    #[serde(default = "default_lan2_gateway")]
    pub lan2_gateway: String,

    #[serde(default = "default_transit")]
    pub transit: String,

    #[serde(default = "default_transit_a")]
    pub transit_a: String,

    #[serde(default = "default_transit_b")]
    pub transit_b: String,

    /// Substring identifying transit-overlay port names.
    #[serde(default = "default_transit_marker")]
    pub transit_marker: String,
}

impl Default for NetworksSection {
    fn default() -> Self {
        Self {
            lan1: default_lan1(),
            lan1_gateway: default_lan1_gateway(),
            lan2: default_lan2(),
            lan2_gateway: default_lan2_gateway(),
            transit: default_transit(),
            transit_a: default_transit_a(),
            transit_b: default_transit_b(),
            transit_marker: default_transit_marker(),
        }
    }
}

fn default_lan1() -> String {
    "10.0.1.0/24".into()
}
fn default_lan1_gateway() -> String {
    "10.0.1.254/24".into()
}
fn default_lan2() -> String {
    "10.0.2.0/24".into()
}
fn default_lan2_gateway() -> String {
    "10.0.2.254/24".into()
}
fn default_transit() -> String {
    "10.30.30.0/24".into()
}
fn default_transit_a() -> String {
    "10.30.30.11/24".into()
}
fn default_transit_b() -> String {
    "10.30.30.12/24".into()
}
fn default_transit_marker() -> String {
    "vxlan".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PrioritiesSection {
    #[serde(default = "default_allow")]
    pub allow: u16,

    #[serde(default = "default_drop")]
    pub drop: u16,

    #[serde(default = "default_arp")]
    pub arp: u16,

    #[serde(default)]
    pub miss: u16,
}

impl Default for PrioritiesSection {
    fn default() -> Self {
        Self {
            allow: default_allow(),
            drop: default_drop(),
            arp: default_arp(),
            miss: 0,
        }
    }
}

fn default_allow() -> u16 {
    80
}
fn default_drop() -> u16 {
    70
}
fn default_arp() -> u16 {
    10
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CookiesSection {
    #[serde(default = "default_base_cookie")]
    pub base: u64,

    #[serde(default = "default_policy_cookie")]
    pub policy: u64,
}

impl Default for CookiesSection {
    fn default() -> Self {
        Self {
            base: default_base_cookie(),
            policy: default_policy_cookie(),
        }
    }
}

fn default_base_cookie() -> u64 {
    0x2
}
fn default_policy_cookie() -> u64 {
    0x0A11_0ED
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BootstrapSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_delay")]
    pub delay_secs: u64,
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay(),
        }
    }
}

fn default_max_attempts() -> usize {
    10
}
fn default_delay() -> u64 {
    1
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ControllerSection {
    #[serde(default = "default_l2_capacity")]
    pub l2_capacity: usize,

    /// Periodic topology re-classification, disabled when absent.
    pub topology_refresh_secs: Option<u64>,

    /// Steer own-LAN traffic out the router's LAN port instead of the
    /// normal pipeline.
    #[serde(default)]
    pub interlan_override: bool,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            l2_capacity: default_l2_capacity(),
            topology_refresh_secs: None,
            interlan_override: false,
        }
    }
}

fn default_l2_capacity() -> usize {
    flowgrid_core::DEFAULT_L2_CAPACITY
}

/// Initial allowed pairs, applied once at startup.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PolicySection {
    #[serde(default)]
    pub pairs: Vec<PairEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PairEntry {
    pub src: String,
    pub dst: String,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "flowgrid", "flowgrid").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("flowgrid");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load configuration from `path` (or the canonical path) plus
/// `FLOWGRID_`-prefixed environment variables.
///
/// Environment keys use `__` as the section separator, e.g.
/// `FLOWGRID_REST__BASE_URL` overrides `[rest] base_url`.
pub fn load(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("FLOWGRID_").split("__"));

    let config: FileConfig = figment.extract()?;
    Ok(config)
}

// ── Validation and translation ──────────────────────────────────────

impl FileConfig {
    /// Validate and translate into the core controller configuration.
    pub fn to_controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let base_url: url::Url = self
            .rest
            .base_url
            .parse()
            .map_err(|_| invalid("rest.base_url", format!("invalid URL: {}", self.rest.base_url)))?;

        let plan = self.network_plan()?;

        let priorities = Priorities {
            allow: self.priorities.allow,
            drop: self.priorities.drop,
            arp: self.priorities.arp,
            miss: self.priorities.miss,
        };
        if !priorities.is_strictly_ordered() {
            return Err(invalid(
                "priorities",
                "must satisfy allow > drop > arp > miss",
            ));
        }

        if self.cookies.base == self.cookies.policy {
            return Err(invalid(
                "cookies",
                "base and policy cookies must be distinct",
            ));
        }

        Ok(ControllerConfig {
            rest: RestSettings {
                base_url,
                timeout: Duration::from_secs(self.rest.timeout_secs),
                retry: RetryPolicy::new(
                    self.rest.retry_attempts,
                    Duration::from_millis(self.rest.retry_delay_ms),
                ),
            },
            plan,
            priorities,
            cookies: CookieTags {
                base: self.cookies.base,
                policy: self.cookies.policy,
            },
            bootstrap: BootstrapSettings {
                max_attempts: self.bootstrap.max_attempts,
                delay: Duration::from_secs(self.bootstrap.delay_secs),
            },
            l2_capacity: self.controller.l2_capacity.max(1),
            topology_refresh: self
                .controller
                .topology_refresh_secs
                .map(Duration::from_secs),
            interlan_override: self.controller.interlan_override,
        })
    }

    /// The startup allowed-pair list; empty entries are rejected.
    pub fn initial_pairs(&self) -> Result<Vec<AllowedPair>, ConfigError> {
        self.policy
            .pairs
            .iter()
            .map(|entry| {
                AllowedPair::new(&entry.src, &entry.dst).ok_or_else(|| {
                    invalid("policy.pairs", "src and dst must be non-empty")
                })
            })
            .collect()
    }

    fn network_plan(&self) -> Result<NetworkPlan, ConfigError> {
        let n = &self.networks;
        let lan1 = parse_net("networks.lan1", &n.lan1)?;
        let lan2 = parse_net("networks.lan2", &n.lan2)?;
        let transit = parse_net("networks.transit", &n.transit)?;
        let lan1_gateway = parse_cidr("networks.lan1_gateway", &n.lan1_gateway)?;
        let lan2_gateway = parse_cidr("networks.lan2_gateway", &n.lan2_gateway)?;
        let transit_a = parse_cidr("networks.transit_a", &n.transit_a)?;
        let transit_b = parse_cidr("networks.transit_b", &n.transit_b)?;

        if lan1 == lan2 {
            return Err(invalid("networks", "lan1 and lan2 must be distinct"));
        }
        check_within("networks.lan1_gateway", lan1_gateway.addr, lan1)?;
        check_within("networks.lan2_gateway", lan2_gateway.addr, lan2)?;
        check_within("networks.transit_a", transit_a.addr, transit)?;
        check_within("networks.transit_b", transit_b.addr, transit)?;
        if n.transit_marker.trim().is_empty() {
            return Err(invalid("networks.transit_marker", "must be non-empty"));
        }

        Ok(NetworkPlan {
            lan1,
            lan1_gateway,
            lan2,
            lan2_gateway,
            transit,
            transit_a,
            transit_b,
            transit_marker: n.transit_marker.trim().to_owned(),
        })
    }
}

fn parse_net(field: &str, value: &str) -> Result<Ipv4Network, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(field, format!("invalid IPv4 network: {value}")))
}

fn parse_cidr(field: &str, value: &str) -> Result<CidrAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(field, format!("invalid CIDR address: {value}")))
}

fn check_within(field: &str, addr: Ipv4Addr, net: Ipv4Network) -> Result<(), ConfigError> {
    if net.contains(addr) {
        Ok(())
    } else {
        Err(invalid(field, format!("{addr} is not inside {net}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn from_toml(body: &str) -> FileConfig {
        Figment::new()
            .merge(Serialized::defaults(FileConfig::default()))
            .merge(Toml::string(body))
            .extract()
            .unwrap()
    }

    #[test]
    fn defaults_describe_the_reference_deployment() {
        let config = from_toml("").to_controller_config().unwrap();
        assert_eq!(config.rest.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.plan.transit_marker, "vxlan");
        assert_eq!(config.priorities.allow, 80);
        assert_eq!(config.cookies.policy, 0x0A11_0ED);
        assert_eq!(config.bootstrap.max_attempts, 10);
        assert_eq!(config.topology_refresh, None);
        assert!(!config.interlan_override);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config = from_toml(
            r#"
            [rest]
            base_url = "http://10.9.9.9:9090"

            [controller]
            topology_refresh_secs = 30
            "#,
        )
        .to_controller_config()
        .unwrap();
        assert_eq!(config.rest.base_url.as_str(), "http://10.9.9.9:9090/");
        assert_eq!(config.topology_refresh, Some(Duration::from_secs(30)));
        // Untouched sections keep their defaults.
        assert_eq!(config.priorities.drop, 70);
    }

    #[test]
    fn misordered_priorities_are_rejected() {
        let err = from_toml(
            r#"
            [priorities]
            allow = 70
            drop = 70
            "#,
        )
        .to_controller_config()
        .unwrap_err();
        assert!(err.to_string().contains("priorities"));
    }

    #[test]
    fn gateway_outside_its_lan_is_rejected() {
        let err = from_toml(
            r#"
            [networks]
            lan1_gateway = "10.0.9.254/24"
            "#,
        )
        .to_controller_config()
        .unwrap_err();
        assert!(err.to_string().contains("lan1_gateway"));
    }

    #[test]
    fn identical_cookies_are_rejected() {
        let err = from_toml(
            r#"
            [cookies]
            base = 7
            policy = 7
            "#,
        )
        .to_controller_config()
        .unwrap_err();
        assert!(err.to_string().contains("cookies"));
    }

    #[test]
    fn initial_pairs_parse_and_reject_empties() {
        let config = from_toml(
            r#"
            [[policy.pairs]]
            src = "10.0.1.5"
            dst = "10.0.2.7"
            "#,
        );
        let pairs = config.initial_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].src(), "10.0.1.5");

        let bad = from_toml(
            r#"
            [[policy.pairs]]
            src = ""
            dst = "10.0.2.7"
            "#,
        );
        assert!(bad.initial_pairs().is_err());
    }

    #[test]
    fn load_reads_an_explicit_file_path() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[networks]\ntransit_marker = \"gre\"").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.networks.transit_marker, "gre");
    }
}
