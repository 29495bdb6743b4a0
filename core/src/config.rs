//! Tunables named explicitly in the spec, plain struct + `Default` — the
//! teacher doesn't reach for a builder crate for its handful of constants
//! either (see `driver/src/common.rs`), so neither do we.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// Minimum post-deallocation lifetime granted to a flow whose CWQ/RTXQ
    /// still hold data (§4.3).
    pub flow_del_wait_ms: u64,
    /// Upqueue byte budget per control device (§4.4).
    pub upqueue_byte_budget: usize,
    /// Blocking timeout for `upqueue.append(maysleep=true)` (§5).
    pub upqueue_append_timeout_ms: u64,
    /// Bound on a flow's closed-window queue (§4.6).
    pub max_cwq_len: usize,
    /// Bound on a flow's retransmission queue (§4.6).
    pub max_rtxq_len: usize,
    /// Reclaim timeout for flows created but never bound to an I/O device
    /// (§4.3).
    pub unbound_flow_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            flow_del_wait_ms: 4_000,
            upqueue_byte_budget: 16 * 1024,
            upqueue_append_timeout_ms: 5,
            max_cwq_len: 64,
            max_rtxq_len: 64,
            unbound_flow_timeout_ms: 3_000,
        }
    }
}
