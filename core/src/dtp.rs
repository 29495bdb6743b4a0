//! Data Transfer Protocol engine (§4.6, §8 scenario 5, §9): per-flow
//! sender/receiver state for a "normal" IPCP. Reordering and retransmission
//! policy are left as the named, explicit extension points §9 calls for
//! rather than replicated placeholder behavior — this engine currently
//! delivers every non-duplicate PDU immediately.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use ripc_wire::pci::{ConnId, FcBody, Pci, FLAG_DRF, PDU_TYPE_DT, PDU_TYPE_FC, PDU_TYPE_MGMT};

use crate::config::CoreConfig;
use crate::pduft::{NonOwningFlowRef, Pduft};

/// A PDU queued on the CWQ or RTXQ: header plus payload, since both queues
/// may need to re-derive or resend the exact bytes once queued.
#[derive(Debug, Clone)]
pub struct Pdu {
    pub pci: Pci,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveClass {
    Duplicate,
    GapFill,
    InOrder,
    OutOfOrder,
}

pub struct DtpState {
    pub next_seq_num_to_send: u64,
    pub snd_lwe: u64,
    pub snd_rwe: u64,
    pub last_seq_num_sent: u64,
    pub rcv_lwe: u64,
    pub rcv_rwe: u64,
    pub max_seq_num_rcvd: u64,
    pub cwq: VecDeque<Pdu>,
    pub rtxq: VecDeque<Pdu>,
    /// Our own outgoing control-PDU sequence counter; bumped each time
    /// `receive` emits an `FC` PDU.
    pub ctrl_seq: u64,
    /// The peer's control-sequence number last observed on an incoming
    /// `FC` PDU, echoed back as `last_ctrl_seq_num_rcvd` (§4.6).
    pub last_ctrl_seq_num_rcvd: u64,
    pub drf_pending: bool,
    /// Windowed flow control on/off; when off every PDU is sent immediately
    /// regardless of `snd_rwe`.
    pub window_control: bool,
    /// §4.6: RX flow control is enabled but retransmission control is not,
    /// so every non-duplicate delivery echoes an `FC` PDU back to the
    /// sender instead of relying on piggy-backed acks.
    pub rx_flow_control_only: bool,
    pub sender_expires_at_ms: Option<u64>,
    pub receiver_expires_at_ms: Option<u64>,
    pub srtt_ms: u64,
    pub rttvar_ms: u64,
    pub tx_pdus: u64,
    pub tx_bytes: u64,
    pub rx_pdus: u64,
    pub rx_bytes: u64,
}

impl DtpState {
    pub fn new(window_control: bool, rx_flow_control_only: bool) -> Self {
        Self {
            next_seq_num_to_send: 0,
            snd_lwe: 0,
            snd_rwe: u64::MAX,
            last_seq_num_sent: 0,
            rcv_lwe: 0,
            rcv_rwe: u64::MAX,
            max_seq_num_rcvd: 0,
            cwq: VecDeque::new(),
            rtxq: VecDeque::new(),
            ctrl_seq: 0,
            last_ctrl_seq_num_rcvd: 0,
            drf_pending: true,
            window_control,
            rx_flow_control_only,
            sender_expires_at_ms: None,
            receiver_expires_at_ms: None,
            srtt_ms: 0,
            rttvar_ms: 0,
            tx_pdus: 0,
            tx_bytes: 0,
            rx_pdus: 0,
            rx_bytes: 0,
        }
    }

    fn next_seqnum(&mut self) -> u64 {
        let seq = self.next_seq_num_to_send;
        self.next_seq_num_to_send += 1;
        seq
    }

    /// Placeholder inactivity timeout per §4.6: `3 x (MPL + R + A)`.
    fn sender_timeout_ms() -> u64 {
        1_000
    }

    /// Placeholder per §4.6: `2/3 x 2 x (MPL + R + A)`.
    fn receiver_timeout_ms() -> u64 {
        1_333
    }
}

/// Outcome of a send attempt: either the PDU was handed off to the lower
/// flow, or window control closed it onto the CWQ (nothing to transmit
/// yet), or it was dropped because the CWQ was already full.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Transmit(NonOwningFlowRef, Vec<u8>),
    QueuedOnCwq,
    DroppedCwqFull,
    NoRoute,
}

/// §4.6 send path. `dst_cep`/`src_cep` and the flow's QoS-id identify the
/// connection; `local_addr`/`remote_addr` select the loopback-vs-PDUFT
/// path.
#[allow(clippy::too_many_arguments)]
pub fn send(
    state: &mut DtpState,
    pduft: &Pduft,
    local_addr: u64,
    remote_addr: u64,
    qos_id: u8,
    dst_cep: u16,
    src_cep: u16,
    payload: &[u8],
    cfg: &CoreConfig,
    now_ms: u64,
) -> SendOutcome {
    let route = if remote_addr != local_addr {
        match pduft.lookup(remote_addr) {
            Some(flow) => Some(flow),
            None => return SendOutcome::NoRoute,
        }
    } else {
        None
    };

    let seqnum = state.next_seqnum();
    let mut pci = Pci {
        dst_addr: remote_addr,
        src_addr: local_addr,
        conn_id: ConnId {
            qos_id,
            dst_cep,
            src_cep,
        },
        pdu_type: PDU_TYPE_DT,
        pdu_flags: 0,
        seqnum,
    };
    pci.set_drf(state.drf_pending);
    state.drf_pending = false;

    let transmit_now = if state.window_control {
        seqnum <= state.snd_rwe
    } else {
        true
    };

    state.sender_expires_at_ms = Some(now_ms + DtpState::sender_timeout_ms());

    if transmit_now {
        state.snd_lwe = seqnum;
        state.last_seq_num_sent = seqnum;
        state.tx_pdus += 1;
        state.tx_bytes += payload.len() as u64;
        let mut bytes = Vec::with_capacity(pci.as_bytes().len() + payload.len());
        bytes.extend_from_slice(pci.as_bytes());
        bytes.extend_from_slice(payload);
        let flow = route.unwrap_or(NonOwningFlowRef(0));
        SendOutcome::Transmit(flow, bytes)
    } else if state.cwq.len() < cfg.max_cwq_len {
        state.cwq.push_back(Pdu {
            pci,
            payload: payload.to_vec(),
        });
        SendOutcome::QueuedOnCwq
    } else {
        log::warn!("dtp: cwq full, dropping pdu seqnum={}", seqnum);
        SendOutcome::DroppedCwqFull
    }
}

/// Classifies an incoming `DT` PDU per §4.6, without mutating receiver
/// state (the caller applies the state transition once it has decided
/// whether to also deliver the payload).
pub fn classify(state: &DtpState, seqnum: u64) -> ReceiveClass {
    if seqnum < state.rcv_lwe {
        ReceiveClass::Duplicate
    } else if seqnum <= state.max_seq_num_rcvd {
        ReceiveClass::GapFill
    } else if seqnum == state.max_seq_num_rcvd + 1 {
        ReceiveClass::InOrder
    } else {
        ReceiveClass::OutOfOrder
    }
}

/// Outcome of [`receive`]: whether to deliver the payload upward, and the
/// `FC` PDU to hand the lower IPCP's `sdu_write`, if RX flow control
/// without retransmission control calls for one.
pub struct ReceiveOutcome {
    pub deliver: bool,
    pub control_pdu: Option<(NonOwningFlowRef, Vec<u8>)>,
}

/// Builds the `FC` reply for a just-delivered PDU: addresses and CEPs
/// swapped from the triggering `Pci` since this PDU goes back to its
/// sender, routed the same way `send` resolves a destination address.
fn build_control_pdu(state: &mut DtpState, pci: &Pci, pduft: &Pduft) -> Option<(NonOwningFlowRef, Vec<u8>)> {
    let flow = if pci.src_addr != pci.dst_addr {
        pduft.lookup(pci.src_addr)?
    } else {
        NonOwningFlowRef(0)
    };

    let reply_pci = Pci {
        dst_addr: pci.src_addr,
        src_addr: pci.dst_addr,
        conn_id: ConnId {
            qos_id: pci.conn_id.qos_id,
            dst_cep: pci.conn_id.src_cep,
            src_cep: pci.conn_id.dst_cep,
        },
        pdu_type: PDU_TYPE_FC,
        pdu_flags: 0,
        seqnum: state.ctrl_seq,
    };
    let body = FcBody {
        last_ctrl_seq_num_rcvd: state.last_ctrl_seq_num_rcvd,
        new_rwe: state.rcv_rwe,
        new_lwe: state.rcv_lwe,
        my_rwe: state.snd_rwe,
        my_lwe: state.snd_lwe,
    };
    state.ctrl_seq += 1;

    let mut bytes = Vec::with_capacity(reply_pci.as_bytes().len() + body.as_bytes().len());
    bytes.extend_from_slice(reply_pci.as_bytes());
    bytes.extend_from_slice(body.as_bytes());
    Some((flow, bytes))
}

/// §4.6 receive path for one `DT` PDU.
pub fn receive(state: &mut DtpState, pci: &Pci, payload_len: usize, pduft: &Pduft, now_ms: u64) -> ReceiveOutcome {
    state.receiver_expires_at_ms = None;
    state.rx_pdus += 1;
    state.rx_bytes += payload_len as u64;

    if pci.has_drf() {
        state.cwq.clear();
        state.rtxq.clear();
        state.rcv_lwe = pci.seqnum + 1;
        state.max_seq_num_rcvd = pci.seqnum;
        state.receiver_expires_at_ms = Some(now_ms + DtpState::receiver_timeout_ms());
        let control_pdu = if state.rx_flow_control_only {
            build_control_pdu(state, pci, pduft)
        } else {
            None
        };
        return ReceiveOutcome { deliver: true, control_pdu };
    }

    let class = classify(state, pci.seqnum);
    let deliver = match class {
        ReceiveClass::Duplicate => false,
        ReceiveClass::GapFill => {
            state.rcv_lwe = pci.seqnum + 1;
            true
        }
        ReceiveClass::InOrder => {
            state.max_seq_num_rcvd = pci.seqnum;
            state.rcv_lwe = pci.seqnum + 1;
            true
        }
        ReceiveClass::OutOfOrder => {
            state.max_seq_num_rcvd = pci.seqnum;
            state.rcv_lwe = pci.seqnum + 1;
            true
        }
    };

    state.receiver_expires_at_ms = Some(now_ms + DtpState::receiver_timeout_ms());
    let control_pdu = if deliver && state.rx_flow_control_only {
        build_control_pdu(state, pci, pduft)
    } else {
        None
    };
    ReceiveOutcome { deliver, control_pdu }
}

/// §4.6 "Management PDUs": mgmt-SDU egress by destination address (via
/// PDUFT) or by an explicit local lower port-id (no routing).
pub enum MgmtRoute {
    ByAddress(u64),
    ByLocalPort(u16),
}

/// Frames `payload` behind a `pdu_type = MGMT` `Pci` and resolves the
/// lower flow to hand it to, per [`MgmtRoute`].
pub fn send_mgmt(pduft: &Pduft, local_addr: u64, route: MgmtRoute, payload: &[u8]) -> SendOutcome {
    let (dst_addr, flow) = match route {
        MgmtRoute::ByLocalPort(port) => (0, NonOwningFlowRef(port)),
        MgmtRoute::ByAddress(dst_addr) => match pduft.lookup(dst_addr) {
            Some(flow) => (dst_addr, flow),
            None => return SendOutcome::NoRoute,
        },
    };

    let pci = Pci {
        dst_addr,
        src_addr: local_addr,
        conn_id: ConnId {
            qos_id: 0,
            dst_cep: 0,
            src_cep: 0,
        },
        pdu_type: PDU_TYPE_MGMT,
        pdu_flags: 0,
        seqnum: 0,
    };
    let mut bytes = Vec::with_capacity(pci.as_bytes().len() + payload.len());
    bytes.extend_from_slice(pci.as_bytes());
    bytes.extend_from_slice(payload);
    SendOutcome::Transmit(flow, bytes)
}

/// §4.6 "sender-inactivity-timer fire": reset to a fresh DRF run and
/// discard both queues. A conservative reading of §9's open question:
/// the flow itself is left intact for user space, only its DTP sequencing
/// state is reset.
pub fn sender_inactivity_fire(state: &mut DtpState) {
    state.drf_pending = true;
    state.next_seq_num_to_send = 0;
    state.last_seq_num_sent = 0;
    state.snd_lwe = 0;
    state.cwq.clear();
    state.rtxq.clear();
    state.sender_expires_at_ms = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_dt_pdus_are_both_classified_as_duplicate_and_state_is_unchanged() {
        let mut state = DtpState::new(false, false);
        state.rcv_lwe = 6;
        state.max_seq_num_rcvd = 5;
        let pci = Pci {
            dst_addr: 1,
            src_addr: 2,
            conn_id: ConnId {
                qos_id: 0,
                dst_cep: 1,
                src_cep: 2,
            },
            pdu_type: PDU_TYPE_DT,
            pdu_flags: 0,
            seqnum: 5,
        };
        assert_eq!(classify(&state, 5), ReceiveClass::Duplicate);
        let pduft = Pduft::new();
        let delivered_first = receive(&mut state, &pci, 0, &pduft, 0).deliver;
        let snapshot_lwe = state.rcv_lwe;
        let snapshot_max = state.max_seq_num_rcvd;
        let delivered_second = receive(&mut state, &pci, 0, &pduft, 0).deliver;
        assert!(!delivered_first);
        assert!(!delivered_second);
        assert_eq!(state.rcv_lwe, snapshot_lwe);
        assert_eq!(state.max_seq_num_rcvd, snapshot_max);
    }

    #[test]
    fn in_order_pdu_advances_receive_window() {
        let mut state = DtpState::new(false, false);
        state.rcv_lwe = 1;
        state.max_seq_num_rcvd = 0;
        let pci = Pci {
            dst_addr: 1,
            src_addr: 2,
            conn_id: ConnId {
                qos_id: 0,
                dst_cep: 1,
                src_cep: 2,
            },
            pdu_type: PDU_TYPE_DT,
            pdu_flags: 0,
            seqnum: 1,
        };
        let pduft = Pduft::new();
        assert!(receive(&mut state, &pci, 0, &pduft, 0).deliver);
        assert_eq!(state.rcv_lwe, 2);
        assert_eq!(state.max_seq_num_rcvd, 1);
    }

    #[test]
    fn drf_flushes_reassembly_and_resets_window() {
        let mut state = DtpState::new(false, false);
        state.cwq.push_back(Pdu {
            pci: Pci {
                dst_addr: 0,
                src_addr: 0,
                conn_id: ConnId {
                    qos_id: 0,
                    dst_cep: 0,
                    src_cep: 0,
                },
                pdu_type: PDU_TYPE_DT,
                pdu_flags: 0,
                seqnum: 0,
            },
            payload: Vec::new(),
        });
        let mut pci = Pci {
            dst_addr: 1,
            src_addr: 2,
            conn_id: ConnId {
                qos_id: 0,
                dst_cep: 1,
                src_cep: 2,
            },
            pdu_type: PDU_TYPE_DT,
            pdu_flags: 0,
            seqnum: 42,
        };
        pci.set_drf(true);
        let pduft = Pduft::new();
        assert!(receive(&mut state, &pci, 0, &pduft, 0).deliver);
        assert!(state.cwq.is_empty());
        assert_eq!(state.rcv_lwe, 43);
    }

    #[test]
    fn windowed_send_past_rwe_queues_on_cwq_instead_of_transmitting() {
        let mut state = DtpState::new(true, false);
        state.snd_rwe = 0;
        let pduft = Pduft::new();
        let cfg = CoreConfig::default();
        let outcome = send(&mut state, &pduft, 1, 1, 0, 1, 2, b"hi", &cfg, 0);
        assert_eq!(outcome, SendOutcome::QueuedOnCwq);
        assert_eq!(state.cwq.len(), 1);
    }

    #[test]
    fn send_to_unknown_remote_address_with_no_route_is_dropped() {
        let mut state = DtpState::new(false, false);
        let pduft = Pduft::new();
        let cfg = CoreConfig::default();
        let outcome = send(&mut state, &pduft, 1, 99, 0, 1, 2, b"hi", &cfg, 0);
        assert_eq!(outcome, SendOutcome::NoRoute);
    }
}
