//! Events delivered to userspace through the control device's upqueue, one
//! `read()` per event. Mirrors the teacher's `protocol::info::Info`
//! TLV-builder idiom (`[type: u8][body]`, built with [`crate::buf::Writer`]
//! instead of the teacher's per-field `PushBytes` trait, which never had to
//! carry variable-length names).

use alloc::string::String;
use alloc::vec::Vec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::buf::{Reader, Writer};
use crate::WireError;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
#[rustfmt::skip]
pub enum EventType {
    IpcpCreateResp     = 0,
    IpcpConfigGetResp  = 1,
    StatsResp          = 2,
    ApplRegisterResp   = 3,
    FaReqArrived        = 4,
    FaRespArrived       = 5,
    UipcpFaReqArrived   = 6,
    UipcpFaRespArrived  = 7,
    FlowStatsResp       = 8,
    FlowFetchResp       = 9,
    RegFetchResp        = 10,
    IpcpUpdate          = 11,
    IpcpQosSupportedResp = 12,
    LogLine             = 13,
    FaReqResp            = 14,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum IpcpUpdateKind {
    Add = 0,
    Del = 1,
    Update = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpCreateResp {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpConfigGetResp {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsResp {
    pub tx_pdus: u64,
    pub rx_pdus: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplRegisterResp {
    pub response: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaReqArrived {
    pub port_id: u16,
    pub dif_name: String,
    pub local_appl: String,
    pub remote_appl: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaRespArrived {
    pub port_id: u16,
    pub response: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpFaReqArrived {
    pub event_id: u32,
    pub dif_name: String,
    pub local_appl: String,
    pub remote_appl: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpFaRespArrived {
    pub port_id: u16,
    pub response: u8,
    pub remote_port: u16,
    pub remote_addr: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStatsResp {
    pub port_id: u16,
    pub tx_pdus: u64,
    pub rx_pdus: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFetchResp {
    pub port_id: u16,
    pub remote_port: u16,
    pub remote_addr: u64,
    pub end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegFetchResp {
    pub appl_name: String,
    pub pending: bool,
    pub end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpUpdate {
    pub kind: IpcpUpdateKind,
    pub ipcp_id: u16,
    pub dif_name: String,
    pub dif_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpQosSupportedResp {
    pub supported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: u8,
    pub line: String,
}

/// Synchronous acknowledgement of a `FaReq` write, carrying the port-id the
/// initiator should track while the allocation is pending (§4.5 step 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaReqResp {
    pub port_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    IpcpCreateResp(IpcpCreateResp),
    IpcpConfigGetResp(IpcpConfigGetResp),
    StatsResp(StatsResp),
    ApplRegisterResp(ApplRegisterResp),
    FaReqArrived(FaReqArrived),
    FaRespArrived(FaRespArrived),
    UipcpFaReqArrived(UipcpFaReqArrived),
    UipcpFaRespArrived(UipcpFaRespArrived),
    FlowStatsResp(FlowStatsResp),
    FlowFetchResp(FlowFetchResp),
    RegFetchResp(RegFetchResp),
    IpcpUpdate(IpcpUpdate),
    IpcpQosSupportedResp(IpcpQosSupportedResp),
    LogLine(LogLine),
    FaReqResp(FaReqResp),
}

impl Event {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(32);
        match self {
            Event::IpcpCreateResp(e) => {
                w.u8(EventType::IpcpCreateResp as u8).u16(e.ipcp_id);
            }
            Event::IpcpConfigGetResp(e) => {
                w.u8(EventType::IpcpConfigGetResp as u8).str(&e.value);
            }
            Event::StatsResp(e) => {
                w.u8(EventType::StatsResp as u8)
                    .u64(e.tx_pdus)
                    .u64(e.rx_pdus)
                    .u64(e.tx_bytes)
                    .u64(e.rx_bytes);
            }
            Event::ApplRegisterResp(e) => {
                w.u8(EventType::ApplRegisterResp as u8).u8(e.response);
            }
            Event::FaReqArrived(e) => {
                w.u8(EventType::FaReqArrived as u8)
                    .u16(e.port_id)
                    .str(&e.dif_name)
                    .str(&e.local_appl)
                    .str(&e.remote_appl);
            }
            Event::FaRespArrived(e) => {
                w.u8(EventType::FaRespArrived as u8)
                    .u16(e.port_id)
                    .u8(e.response);
            }
            Event::UipcpFaReqArrived(e) => {
                w.u8(EventType::UipcpFaReqArrived as u8)
                    .u32(e.event_id)
                    .str(&e.dif_name)
                    .str(&e.local_appl)
                    .str(&e.remote_appl);
            }
            Event::UipcpFaRespArrived(e) => {
                w.u8(EventType::UipcpFaRespArrived as u8)
                    .u16(e.port_id)
                    .u8(e.response)
                    .u16(e.remote_port)
                    .u64(e.remote_addr);
            }
            Event::FlowStatsResp(e) => {
                w.u8(EventType::FlowStatsResp as u8)
                    .u16(e.port_id)
                    .u64(e.tx_pdus)
                    .u64(e.rx_pdus);
            }
            Event::FlowFetchResp(e) => {
                w.u8(EventType::FlowFetchResp as u8)
                    .u16(e.port_id)
                    .u16(e.remote_port)
                    .u64(e.remote_addr)
                    .u8(e.end as u8);
            }
            Event::RegFetchResp(e) => {
                w.u8(EventType::RegFetchResp as u8)
                    .str(&e.appl_name)
                    .u8(e.pending as u8)
                    .u8(e.end as u8);
            }
            Event::IpcpUpdate(e) => {
                w.u8(EventType::IpcpUpdate as u8)
                    .u8(e.kind as u8)
                    .u16(e.ipcp_id)
                    .str(&e.dif_name)
                    .str(&e.dif_type);
            }
            Event::IpcpQosSupportedResp(e) => {
                w.u8(EventType::IpcpQosSupportedResp as u8)
                    .u8(e.supported as u8);
            }
            Event::LogLine(e) => {
                w.u8(EventType::LogLine as u8).u8(e.level).str(&e.line);
            }
            Event::FaReqResp(e) => {
                w.u8(EventType::FaReqResp as u8).u16(e.port_id);
            }
        }
        w.into_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Event, WireError> {
        if bytes.is_empty() {
            return Err(WireError::Truncated);
        }
        let event_type = EventType::from_u8(bytes[0]).ok_or(WireError::UnknownType(bytes[0]))?;
        let mut r = Reader::new(&bytes[1..]);
        Ok(match event_type {
            EventType::IpcpCreateResp => Event::IpcpCreateResp(IpcpCreateResp {
                ipcp_id: r.u16()?,
            }),
            EventType::IpcpConfigGetResp => {
                Event::IpcpConfigGetResp(IpcpConfigGetResp { value: r.str()? })
            }
            EventType::StatsResp => Event::StatsResp(StatsResp {
                tx_pdus: r.u64()?,
                rx_pdus: r.u64()?,
                tx_bytes: r.u64()?,
                rx_bytes: r.u64()?,
            }),
            EventType::ApplRegisterResp => {
                Event::ApplRegisterResp(ApplRegisterResp { response: r.u8()? })
            }
            EventType::FaReqArrived => Event::FaReqArrived(FaReqArrived {
                port_id: r.u16()?,
                dif_name: r.str()?,
                local_appl: r.str()?,
                remote_appl: r.str()?,
            }),
            EventType::FaRespArrived => Event::FaRespArrived(FaRespArrived {
                port_id: r.u16()?,
                response: r.u8()?,
            }),
            EventType::UipcpFaReqArrived => Event::UipcpFaReqArrived(UipcpFaReqArrived {
                event_id: r.u32()?,
                dif_name: r.str()?,
                local_appl: r.str()?,
                remote_appl: r.str()?,
            }),
            EventType::UipcpFaRespArrived => Event::UipcpFaRespArrived(UipcpFaRespArrived {
                port_id: r.u16()?,
                response: r.u8()?,
                remote_port: r.u16()?,
                remote_addr: r.u64()?,
            }),
            EventType::FlowStatsResp => Event::FlowStatsResp(FlowStatsResp {
                port_id: r.u16()?,
                tx_pdus: r.u64()?,
                rx_pdus: r.u64()?,
            }),
            EventType::FlowFetchResp => Event::FlowFetchResp(FlowFetchResp {
                port_id: r.u16()?,
                remote_port: r.u16()?,
                remote_addr: r.u64()?,
                end: r.u8()? != 0,
            }),
            EventType::RegFetchResp => Event::RegFetchResp(RegFetchResp {
                appl_name: r.str()?,
                pending: r.u8()? != 0,
                end: r.u8()? != 0,
            }),
            EventType::IpcpUpdate => Event::IpcpUpdate(IpcpUpdate {
                kind: IpcpUpdateKind::from_u8(r.u8()?).ok_or(WireError::UnknownType(0xFF))?,
                ipcp_id: r.u16()?,
                dif_name: r.str()?,
                dif_type: r.str()?,
            }),
            EventType::IpcpQosSupportedResp => {
                Event::IpcpQosSupportedResp(IpcpQosSupportedResp {
                    supported: r.u8()? != 0,
                })
            }
            EventType::LogLine => Event::LogLine(LogLine {
                level: r.u8()?,
                line: r.str()?,
            }),
            EventType::FaReqResp => Event::FaReqResp(FaReqResp { port_id: r.u16()? }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fa_req_arrived_round_trips() {
        let ev = Event::FaReqArrived(FaReqArrived {
            port_id: 7,
            dif_name: "d1".into(),
            local_appl: "a".into(),
            remote_appl: "b".into(),
        });
        let bytes = ev.encode();
        assert_eq!(Event::decode(&bytes).unwrap(), ev);
    }

    #[test]
    fn ipcp_update_round_trips() {
        let ev = Event::IpcpUpdate(IpcpUpdate {
            kind: IpcpUpdateKind::Add,
            ipcp_id: 3,
            dif_name: "d1".into(),
            dif_type: "shim-eth".into(),
        });
        let bytes = ev.encode();
        assert_eq!(Event::decode(&bytes).unwrap(), ev);
    }

    #[test]
    fn flow_fetch_resp_end_marker_round_trips() {
        let ev = Event::FlowFetchResp(FlowFetchResp {
            port_id: 0,
            remote_port: 0,
            remote_addr: 0,
            end: true,
        });
        let bytes = ev.encode();
        assert_eq!(Event::decode(&bytes).unwrap(), ev);
    }
}
