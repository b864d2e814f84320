// ── Policy engine ──
//
// Renders the allowed-pair list into flow rules on access switches.
// Resync is delete-then-install within the policy cookie scope, so a
// resync can never leave stale ALLOWs behind, and the baseline DROPs
// are reinstalled in the same pass.

use std::net::Ipv4Addr;

use tracing::{debug, info};

use flowgrid_api::Dpid;

use crate::config::{LanId, NetworkPlan};
use crate::flows::FlowProgrammer;
use crate::model::SwitchRole;
use crate::state::ControllerState;

/// A pair that parsed to in-scope IPv4 hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPair {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    plan: NetworkPlan,
}

impl PolicyEngine {
    pub fn new(plan: NetworkPlan) -> Self {
        Self { plan }
    }

    /// The subset of configured pairs that resolve to managed hosts.
    ///
    /// Pairs that fail to parse or fall outside the LANs are skipped
    /// with a debug log; they stay configured but render nothing.
    pub fn accepted_pairs(&self, state: &ControllerState) -> Vec<ResolvedPair> {
        state
            .allowed_pairs()
            .iter()
            .filter_map(|pair| {
                let src: Ipv4Addr = match pair.src().parse() {
                    Ok(addr) => addr,
                    Err(_) => {
                        debug!(%pair, "skipping pair with unparsable source");
                        return None;
                    }
                };
                let dst: Ipv4Addr = match pair.dst().parse() {
                    Ok(addr) => addr,
                    Err(_) => {
                        debug!(%pair, "skipping pair with unparsable destination");
                        return None;
                    }
                };
                if !self.plan.pair_in_scope(src, dst) {
                    debug!(%pair, "skipping pair outside managed networks");
                    return None;
                }
                Some(ResolvedPair { src, dst })
            })
            .collect()
    }

    /// Rebuild the policy-cookie rules on every switch in `targets`.
    ///
    /// Routers only get their policy scope flushed (their filtering
    /// happens on the access side); access switches get one ALLOW per
    /// accepted pair plus the two directional cross-LAN DROPs.
    pub fn synchronize<'a, I>(
        &self,
        state: &ControllerState,
        flows: &FlowProgrammer,
        targets: I,
    ) where
        I: IntoIterator<Item = &'a Dpid>,
    {
        let pairs = self.accepted_pairs(state);

        for dpid in targets {
            let Some(switch) = state.handle(*dpid) else {
                debug!(%dpid, "skipping policy sync; switch not connected");
                continue;
            };

            flows.remove_by_cookie(switch, flows.cookies().policy);
            if state.role(*dpid) == SwitchRole::Router {
                continue;
            }

            for pair in &pairs {
                flows.install_policy_rule(switch, flows.allow_rule(pair.src, pair.dst));
            }
            flows.install_policy_rule(
                switch,
                flows.drop_rule(self.plan.lan(LanId::Lan1), self.plan.lan(LanId::Lan2)),
            );
            flows.install_policy_rule(
                switch,
                flows.drop_rule(self.plan.lan(LanId::Lan2), self.plan.lan(LanId::Lan1)),
            );
            info!(%dpid, allows = pairs.len(), "policy synchronized");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::model::AllowedPair;
    use std::collections::BTreeSet;

    fn state_with_pairs(pairs: &[(&str, &str)]) -> ControllerState {
        let mut state = ControllerState::new();
        let set: BTreeSet<AllowedPair> = pairs
            .iter()
            .filter_map(|(s, d)| AllowedPair::new(s, d))
            .collect();
        state.replace_allowed_pairs(set);
        state
    }

    #[test]
    fn accepted_pairs_filters_unparsable_and_out_of_scope() {
        let engine = PolicyEngine::new(NetworkPlan::default());
        let state = state_with_pairs(&[
            ("10.0.1.5", "10.0.2.7"),
            ("not-an-ip", "10.0.2.7"),
            ("10.0.1.5", "192.168.9.9"),
        ]);

        let accepted = engine.accepted_pairs(&state);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].src, "10.0.1.5".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn same_lan_pairs_are_in_scope() {
        let engine = PolicyEngine::new(NetworkPlan::default());
        let state = state_with_pairs(&[("10.0.1.5", "10.0.1.6")]);
        assert_eq!(engine.accepted_pairs(&state).len(), 1);
    }

    #[test]
    fn reverse_direction_is_not_implied() {
        let engine = PolicyEngine::new(NetworkPlan::default());
        let state = state_with_pairs(&[("10.0.1.5", "10.0.2.7")]);
        let accepted = engine.accepted_pairs(&state);
        assert_eq!(accepted.len(), 1);
        // Only the configured direction is rendered.
        assert_eq!(accepted[0].src, "10.0.1.5".parse::<Ipv4Addr>().unwrap());
        assert_eq!(accepted[0].dst, "10.0.2.7".parse::<Ipv4Addr>().unwrap());
    }
}
