// ── Flow rule construction and installation ──
//
// One place renders every rule the controller installs, so priorities
// and cookies cannot drift between call sites. Policy rules carry the
// policy cookie and are the only rules a policy resync deletes; the
// plumbing below stays untouched across resyncs.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::config::{CookieTags, NetworkPlan, Priorities};
use crate::conn::SwitchHandle;
use crate::model::{
    COOKIE_MASK_ALL, EthType, FlowActions, FlowIntent, FlowMatch, FlowMod, Ipv4Selector, MacAddr,
    PortRef, RouterPorts, SwitchRole,
};

/// ARP requests for a router's own addresses are lifted to the controller.
pub const ARP_CAPTURE_PRIO: u16 = 550;
/// ARP targeting the transit segment goes to the controller.
pub const TRANSIT_ARP_PRIO: u16 = 250;
/// Traffic for a router's own LAN is delivered out the LAN port.
pub const LAN_DELIVER_PRIO: u16 = 40;
/// Transit-to-transit IPv4 uses the normal pipeline.
pub const TRANSIT_NORMAL_PRIO: u16 = 36;
/// Remaining IPv4 destined to the transit segment is inspected.
pub const TRANSIT_INSPECT_PRIO: u16 = 2;
/// Learned unicast forwarding on access switches.
pub const L2_UNICAST_PRIO: u16 = 1;

#[derive(Debug, Clone)]
pub struct FlowProgrammer {
    priorities: Priorities,
    cookies: CookieTags,
    plan: NetworkPlan,
    interlan_override: bool,
}

impl FlowProgrammer {
    pub fn new(
        priorities: Priorities,
        cookies: CookieTags,
        plan: NetworkPlan,
        interlan_override: bool,
    ) -> Self {
        Self {
            priorities,
            cookies,
            plan,
            interlan_override,
        }
    }

    pub fn cookies(&self) -> CookieTags {
        self.cookies
    }

    fn install(&self, switch: &SwitchHandle, intent: FlowIntent) {
        debug!(
            dpid = %switch.dpid,
            priority = intent.priority,
            cookie = format_args!("{:#x}", intent.cookie),
            "installing flow"
        );
        switch.send_flow_mod(FlowMod::Add(intent));
    }

    /// Delete every rule tagged with `cookie`, across all tables.
    pub fn remove_by_cookie(&self, switch: &SwitchHandle, cookie: u64) {
        debug!(dpid = %switch.dpid, cookie = format_args!("{cookie:#x}"), "flushing cookie scope");
        switch.send_flow_mod(FlowMod::DeleteByCookie {
            table: None,
            cookie,
            cookie_mask: COOKIE_MASK_ALL,
        });
    }

    // ── Baseline plumbing ───────────────────────────────────────────

    /// Table-miss and ARP flood appropriate to the switch role.
    pub fn install_base_flows(&self, switch: &SwitchHandle, role: SwitchRole) {
        // Routers fall back to their normal pipeline on a miss; access
        // switches punt the first packet up for L2 learning.
        let miss_target = match role {
            SwitchRole::Router => PortRef::Normal,
            SwitchRole::Access => PortRef::Controller,
        };
        self.install(
            switch,
            FlowIntent {
                table: 0,
                priority: self.priorities.miss,
                cookie: self.cookies.base,
                matches: FlowMatch::default(),
                actions: FlowActions::output(miss_target),
            },
        );
        self.install(
            switch,
            FlowIntent {
                table: 0,
                priority: self.priorities.arp,
                cookie: self.cookies.base,
                matches: FlowMatch::default().eth_type(EthType::Arp),
                actions: FlowActions::output(PortRef::Flood),
            },
        );
    }

    /// Transit-segment plumbing on a bootstrapped router.
    pub fn transit_rules(&self, ports: &RouterPorts) -> Vec<FlowIntent> {
        let transit = self.plan.transit;
        let mut rules = vec![
            // Transit-to-transit IP rides the normal pipeline.
            FlowIntent {
                table: 0,
                priority: TRANSIT_NORMAL_PRIO,
                cookie: self.cookies.base,
                matches: FlowMatch::default()
                    .eth_type(EthType::Ipv4)
                    .ipv4_src(Ipv4Selector::Net(transit))
                    .ipv4_dst(Ipv4Selector::Net(transit)),
                actions: FlowActions::output(PortRef::Normal),
            },
            // ARP targeting the transit segment is resolved by the controller.
            FlowIntent {
                table: 0,
                priority: TRANSIT_ARP_PRIO,
                cookie: self.cookies.base,
                matches: FlowMatch::default()
                    .eth_type(EthType::Arp)
                    .arp_tpa(Ipv4Selector::Net(transit)),
                actions: FlowActions::output(PortRef::Controller),
            },
            // Remaining IP towards the transit segment gets inspected.
            FlowIntent {
                table: 0,
                priority: TRANSIT_INSPECT_PRIO,
                cookie: self.cookies.base,
                matches: FlowMatch::default()
                    .eth_type(EthType::Ipv4)
                    .ipv4_dst(Ipv4Selector::Net(transit)),
                actions: FlowActions::output(PortRef::Controller),
            },
        ];

        // Optional override: steer own-LAN traffic straight out the LAN
        // port instead of the normal pipeline.
        if self.interlan_override {
            rules.push(FlowIntent {
                table: 0,
                priority: LAN_DELIVER_PRIO,
                cookie: self.cookies.base,
                matches: FlowMatch::default()
                    .eth_type(EthType::Ipv4)
                    .ipv4_dst(Ipv4Selector::Net(ports.lan_cidr)),
                actions: FlowActions::output(PortRef::Physical(ports.lan_port)),
            });
        }
        rules
    }

    pub fn install_transit_flows(&self, switch: &SwitchHandle, ports: &RouterPorts) {
        for rule in self.transit_rules(ports) {
            self.install(switch, rule);
        }
    }

    /// Lift ARP requests for the router's own addresses (LAN gateway and
    /// transit endpoint) to the controller.
    pub fn install_arp_capture(&self, switch: &SwitchHandle, gateway: Ipv4Addr, transit: Ipv4Addr) {
        for addr in [gateway, transit] {
            self.install(
                switch,
                FlowIntent {
                    table: 0,
                    priority: ARP_CAPTURE_PRIO,
                    cookie: self.cookies.base,
                    matches: FlowMatch::default()
                        .eth_type(EthType::Arp)
                        .arp_tpa(Ipv4Selector::Host(addr)),
                    actions: FlowActions::output(PortRef::Controller),
                },
            );
        }
    }

    // ── Policy rules ────────────────────────────────────────────────

    pub fn allow_rule(&self, src: Ipv4Addr, dst: Ipv4Addr) -> FlowIntent {
        FlowIntent {
            table: 0,
            priority: self.priorities.allow,
            cookie: self.cookies.policy,
            matches: FlowMatch::default()
                .eth_type(EthType::Ipv4)
                .ipv4_src(Ipv4Selector::Host(src))
                .ipv4_dst(Ipv4Selector::Host(dst)),
            actions: FlowActions::output(PortRef::Normal),
        }
    }

    pub fn drop_rule(&self, src: ipnetwork::Ipv4Network, dst: ipnetwork::Ipv4Network) -> FlowIntent {
        FlowIntent {
            table: 0,
            priority: self.priorities.drop,
            cookie: self.cookies.policy,
            matches: FlowMatch::default()
                .eth_type(EthType::Ipv4)
                .ipv4_src(Ipv4Selector::Net(src))
                .ipv4_dst(Ipv4Selector::Net(dst)),
            actions: FlowActions::Drop,
        }
    }

    pub fn install_policy_rule(&self, switch: &SwitchHandle, intent: FlowIntent) {
        self.install(switch, intent);
    }

    // ── L2 learning ─────────────────────────────────────────────────

    /// Exact-flow shortcut so future frames of this conversation bypass
    /// the controller.
    pub fn l2_unicast(
        &self,
        in_port: u32,
        eth_src: MacAddr,
        eth_dst: MacAddr,
        out_port: u32,
    ) -> FlowIntent {
        FlowIntent {
            table: 0,
            priority: L2_UNICAST_PRIO,
            cookie: self.cookies.base,
            matches: FlowMatch::default()
                .in_port(in_port)
                .eth_src(eth_src)
                .eth_dst(eth_dst),
            actions: FlowActions::output(PortRef::Physical(out_port)),
        }
    }

    pub fn install_l2_unicast(
        &self,
        switch: &SwitchHandle,
        in_port: u32,
        eth_src: MacAddr,
        eth_dst: MacAddr,
        out_port: u32,
    ) {
        let intent = self.l2_unicast(in_port, eth_src, eth_dst, out_port);
        self.install(switch, intent);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn programmer() -> FlowProgrammer {
        FlowProgrammer::new(
            Priorities::default(),
            CookieTags::default(),
            NetworkPlan::default(),
            false,
        )
    }

    fn router_ports() -> RouterPorts {
        RouterPorts {
            lan_port: 1,
            lan_mac: "aa:bb:cc:dd:ee:01".parse().unwrap(),
            transit_port: 2,
            lan_cidr: "10.0.1.0/24".parse().unwrap(),
        }
    }

    #[test]
    fn allow_outranks_drop_outranks_miss() {
        let p = programmer();
        let allow = p.allow_rule("10.0.1.5".parse().unwrap(), "10.0.2.7".parse().unwrap());
        let drop = p.drop_rule("10.0.1.0/24".parse().unwrap(), "10.0.2.0/24".parse().unwrap());
        assert!(allow.priority > drop.priority);
        assert!(drop.priority > Priorities::default().miss);
    }

    #[test]
    fn policy_rules_share_the_policy_cookie() {
        let p = programmer();
        let allow = p.allow_rule("10.0.1.5".parse().unwrap(), "10.0.2.7".parse().unwrap());
        let drop = p.drop_rule("10.0.1.0/24".parse().unwrap(), "10.0.2.0/24".parse().unwrap());
        assert_eq!(allow.cookie, CookieTags::default().policy);
        assert_eq!(drop.cookie, CookieTags::default().policy);
        assert_ne!(allow.cookie, CookieTags::default().base);
    }

    #[test]
    fn drop_rule_is_explicit_not_empty_actions() {
        let p = programmer();
        let drop = p.drop_rule("10.0.1.0/24".parse().unwrap(), "10.0.2.0/24".parse().unwrap());
        assert_eq!(drop.actions, FlowActions::Drop);
        assert_ne!(drop.actions, FlowActions::Apply(Vec::new()));
    }

    #[test]
    fn transit_rules_skip_lan_deliver_by_default() {
        let p = programmer();
        let rules = p.transit_rules(&router_ports());
        let prios: Vec<u16> = rules.iter().map(|r| r.priority).collect();
        assert_eq!(
            prios,
            vec![TRANSIT_NORMAL_PRIO, TRANSIT_ARP_PRIO, TRANSIT_INSPECT_PRIO]
        );
    }

    #[test]
    fn interlan_override_adds_lan_deliver_rule() {
        let p = FlowProgrammer::new(
            Priorities::default(),
            CookieTags::default(),
            NetworkPlan::default(),
            true,
        );
        let rules = p.transit_rules(&router_ports());
        let deliver = rules
            .iter()
            .find(|r| r.priority == LAN_DELIVER_PRIO)
            .expect("lan deliver rule");
        assert_eq!(
            deliver.actions,
            FlowActions::output(PortRef::Physical(router_ports().lan_port))
        );
    }

    #[test]
    fn l2_unicast_sits_above_table_miss_only() {
        let p = programmer();
        let src: MacAddr = "aa:bb:cc:dd:ee:01".parse().unwrap();
        let dst: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let rule = p.l2_unicast(1, src, dst, 3);
        assert_eq!(rule.priority, L2_UNICAST_PRIO);
        assert!(rule.priority > Priorities::default().miss);
        assert!(rule.priority < Priorities::default().arp);
        assert_eq!(rule.matches.in_port, Some(1));
        assert_eq!(rule.matches.eth_src, Some(src));
    }
}
