// ── L2 learning table ──
//
// Per-switch MAC -> port maps with a hard capacity. Insertion order
// doubles as recency: learning an existing MAC moves it to the back,
// and the front entry is evicted when a switch hits capacity, so a
// MAC-flooding host cannot grow the table without bound.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use flowgrid_api::Dpid;

use crate::model::MacAddr;

#[derive(Debug)]
pub struct L2LearningTable {
    capacity: usize,
    tables: HashMap<Dpid, IndexMap<MacAddr, u32>>,
}

impl L2LearningTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tables: HashMap::new(),
        }
    }

    /// Record that `mac` was seen on `port` of `dpid`.
    ///
    /// Returns the previous port when the MAC moved.
    pub fn learn(&mut self, dpid: Dpid, mac: MacAddr, port: u32) -> Option<u32> {
        let table = self.tables.entry(dpid).or_default();

        let previous = table.shift_remove(&mac);
        if previous.is_none() && table.len() >= self.capacity {
            if let Some((evicted, _)) = table.shift_remove_index(0) {
                trace!(%dpid, %evicted, "evicting oldest learned MAC");
            }
        }
        table.insert(mac, port);

        match previous {
            Some(old) if old != port => Some(old),
            _ => None,
        }
    }

    pub fn lookup(&self, dpid: Dpid, mac: MacAddr) -> Option<u32> {
        self.tables.get(&dpid)?.get(&mac).copied()
    }

    /// Drop everything learned on a switch, e.g. after a disconnect.
    pub fn forget_switch(&mut self, dpid: Dpid) {
        self.tables.remove(&dpid);
    }

    pub fn len(&self, dpid: Dpid) -> usize {
        self.tables.get(&dpid).map_or(0, IndexMap::len)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr([0xaa, 0, 0, 0, 0, last])
    }

    #[test]
    fn learn_and_lookup() {
        let mut table = L2LearningTable::new(8);
        table.learn(Dpid(1), mac(1), 3);
        assert_eq!(table.lookup(Dpid(1), mac(1)), Some(3));
        assert_eq!(table.lookup(Dpid(2), mac(1)), None);
    }

    #[test]
    fn relearning_reports_the_move() {
        let mut table = L2LearningTable::new(8);
        table.learn(Dpid(1), mac(1), 3);
        assert_eq!(table.learn(Dpid(1), mac(1), 3), None);
        assert_eq!(table.learn(Dpid(1), mac(1), 5), Some(3));
    }

    #[test]
    fn capacity_evicts_least_recently_learned() {
        let mut table = L2LearningTable::new(2);
        table.learn(Dpid(1), mac(1), 1);
        table.learn(Dpid(1), mac(2), 2);
        // Refresh mac(1) so mac(2) is now the oldest.
        table.learn(Dpid(1), mac(1), 1);
        table.learn(Dpid(1), mac(3), 3);

        assert_eq!(table.lookup(Dpid(1), mac(2)), None);
        assert_eq!(table.lookup(Dpid(1), mac(1)), Some(1));
        assert_eq!(table.lookup(Dpid(1), mac(3)), Some(3));
        assert_eq!(table.len(Dpid(1)), 2);
    }

    #[test]
    fn tables_are_per_switch() {
        let mut table = L2LearningTable::new(1);
        table.learn(Dpid(1), mac(1), 1);
        table.learn(Dpid(2), mac(2), 2);
        assert_eq!(table.lookup(Dpid(1), mac(1)), Some(1));
        assert_eq!(table.lookup(Dpid(2), mac(2)), Some(2));

        table.forget_switch(Dpid(1));
        assert_eq!(table.lookup(Dpid(1), mac(1)), None);
    }
}
