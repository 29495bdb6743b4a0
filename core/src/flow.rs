//! Flow (§3): the bidirectional data-transfer relationship between two
//! applications (or between an upper and a lower IPCP), carrying its own
//! DTP state.

use alloc::string::String;

use crate::control_device::ControlDeviceId;
use crate::dtp::DtpState;

/// Mutually exclusive by construction — the teacher's union-via-pointer
/// idiom (`upper.rc` xor `upper.ipcp`, §8) is instead a sum type here, so
/// "both set" is unrepresentable rather than merely disallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upper {
    NeverBound,
    ControlDevice(ControlDeviceId),
    Ipcp(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Pending,
    Allocated,
    Deallocated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlowFlags {
    pub initiator: bool,
    pub del_postponed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSpec {
    pub best_effort: bool,
    pub in_order_delivery: bool,
    pub retransmission_control: bool,
}

impl FlowSpec {
    pub fn best_effort() -> Self {
        Self {
            best_effort: true,
            in_order_delivery: false,
            retransmission_control: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    pub max_cwq_len: usize,
    pub max_rtxq_len: usize,
}

pub struct Flow {
    pub local_port: u16,
    pub local_cep: u16,
    pub remote_port: u16,
    pub remote_cep: u16,
    pub remote_addr: u64,
    /// Strong reference: retained on the lower IPCP at flow creation,
    /// released exactly once at flow destruction.
    pub lower_ipcp_id: u16,
    pub upper: Upper,
    pub qos_id: u8,
    pub spec: FlowSpec,
    pub config: FlowConfig,
    pub dtp: DtpState,
    pub state: FlowState,
    pub flags: FlowFlags,
    pub uid: u64,
    pub expires: Option<u64>,
    /// §4.3: the clock reading this flow was created at, so the unbound-flow
    /// reaper can tell how long it has sat in `Upper::NeverBound`.
    pub created_at_ms: u64,
    pub dif_name: String,
    pub local_appl: String,
    pub remote_appl: String,
}

impl Flow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_port: u16,
        local_cep: u16,
        lower_ipcp_id: u16,
        uid: u64,
        spec: FlowSpec,
        config: FlowConfig,
        dif_name: String,
        local_appl: String,
        remote_appl: String,
        initiator: bool,
        now_ms: u64,
    ) -> Self {
        Self {
            local_port,
            local_cep,
            remote_port: 0,
            remote_cep: 0,
            remote_addr: 0,
            lower_ipcp_id,
            upper: Upper::NeverBound,
            qos_id: 0,
            spec,
            dtp: DtpState::new(
                spec.in_order_delivery || spec.retransmission_control,
                spec.in_order_delivery && !spec.retransmission_control,
            ),
            state: FlowState::Pending,
            flags: FlowFlags {
                initiator,
                del_postponed: false,
            },
            uid,
            expires: None,
            created_at_ms: now_ms,
            dif_name,
            local_appl,
            remote_appl,
        }
    }

    pub fn has_undrained_queues(&self) -> bool {
        !self.dtp.cwq.is_empty() || !self.dtp.rtxq.is_empty()
    }
}
