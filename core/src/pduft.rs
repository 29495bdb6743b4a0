//! PDU Forwarding Table (§4.7): per "normal" IPCP, destination address →
//! outgoing lower flow. Keyed exactly like the teacher's `ConnectionMap`
//! (`driver/src/connection_map.rs`) but by a 64-bit address instead of a
//! `(protocol, port)` tuple, and non-owning: the table never keeps a flow
//! alive by itself.

use hashbrown::HashMap;

/// Non-owning reference to the flow a PDUFT entry forwards through.
/// Identified by port-id rather than a pointer: dereferencing still goes
/// through the DM's flow-by-port table, so a stale entry (flow already
/// destroyed) is simply a failed lookup, never a dangling pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonOwningFlowRef(pub u16);

#[derive(Default)]
pub struct Pduft {
    entries: HashMap<u64, NonOwningFlowRef>,
}

impl Pduft {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Replaces any prior entry for `addr`.
    pub fn set(&mut self, addr: u64, flow: NonOwningFlowRef) {
        self.entries.insert(addr, flow);
    }

    pub fn del_addr(&mut self, addr: u64) -> Option<NonOwningFlowRef> {
        self.entries.remove(&addr)
    }

    pub fn lookup(&self, addr: u64) -> Option<NonOwningFlowRef> {
        self.entries.get(&addr).copied()
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn flush_by_flow(&mut self, flow: NonOwningFlowRef) {
        self.entries.retain(|_, v| *v != flow);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_del_restores_prior_state() {
        let mut t = Pduft::new();
        assert!(t.is_empty());
        t.set(42, NonOwningFlowRef(7));
        assert_eq!(t.lookup(42), Some(NonOwningFlowRef(7)));
        t.del_addr(42);
        assert!(t.is_empty());
    }

    #[test]
    fn set_replaces_prior_entry_for_same_address() {
        let mut t = Pduft::new();
        t.set(42, NonOwningFlowRef(1));
        t.set(42, NonOwningFlowRef(2));
        assert_eq!(t.lookup(42), Some(NonOwningFlowRef(2)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn flush_by_flow_removes_every_matching_entry() {
        let mut t = Pduft::new();
        t.set(1, NonOwningFlowRef(9));
        t.set(2, NonOwningFlowRef(9));
        t.set(3, NonOwningFlowRef(5));
        t.flush_by_flow(NonOwningFlowRef(9));
        assert_eq!(t.len(), 1);
        assert_eq!(t.lookup(3), Some(NonOwningFlowRef(5)));
    }
}
