//! Requests written to the control device, app/uipcp → kernel. One message
//! per `write()` call: `[type: u8][body]`, exactly the framing
//! `protocol::command` uses, generalized with [`crate::buf::Reader`] so a
//! body can carry DIF/application names instead of only fixed integers.

use alloc::string::String;
use alloc::vec::Vec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::buf::Reader;
use crate::WireError;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
#[rustfmt::skip]
pub enum MessageType {
    IpcpCreate            = 0,
    IpcpDestroy           = 1,
    IpcpConfig            = 2,
    IpcpConfigGet         = 3,
    UipcpSet              = 4,
    UipcpWait             = 5,
    Stats                 = 6,
    ApplRegister          = 7,
    ApplMove              = 8,
    FaReq                 = 9,
    FaResp                = 10,
    UipcpFaReqArrived     = 11,
    UipcpFaRespArrived    = 12,
    FlowDealloc           = 13,
    FlowStatsReq          = 14,
    FlowCfgUpdate         = 15,
    IpcpPduftSet          = 16,
    IpcpPduftDel          = 17,
    IpcpPduftFlush        = 18,
    FlowFetch             = 19,
    RegFetch              = 20,
    IpcpQosSupported      = 21,
    IpcpSchedWrr          = 22,
    IpcpSchedPfifo        = 23,
    ChangeFlags           = 24,
}

pub fn parse_type(bytes: &[u8]) -> Result<MessageType, WireError> {
    if bytes.is_empty() {
        return Err(WireError::Truncated);
    }
    MessageType::from_u8(bytes[0]).ok_or(WireError::UnknownType(bytes[0]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpCreate {
    pub name: String,
    pub dif_name: String,
    pub dif_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpDestroy {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpConfig {
    pub ipcp_id: u16,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpConfigGet {
    pub ipcp_id: u16,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpSet {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpWait {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReq {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplRegister {
    pub dif_name: String,
    pub appl_name: String,
    pub reg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplMove {
    pub appl_name: String,
    pub new_ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaReq {
    pub dif_name: String,
    pub local_appl: String,
    pub remote_appl: String,
    pub qos_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaResp {
    pub port_id: u16,
    pub event_id: u32,
    pub response: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpFaReqArrived {
    pub dif_name: String,
    pub local_appl: String,
    pub remote_appl: String,
    pub remote_addr: u64,
    pub remote_port: u16,
    pub remote_cep: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UipcpFaRespArrived {
    pub local_port: u16,
    pub response: u8,
    pub remote_port: u16,
    pub remote_addr: u64,
    pub remote_cep: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowDealloc {
    pub port_id: u16,
    pub uid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStatsReq {
    pub port_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowCfgUpdate {
    pub port_id: u16,
    pub max_cwq_len: u16,
    pub max_rtxq_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpPduftSet {
    pub ipcp_id: u16,
    pub dst_addr: u64,
    pub local_port_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpPduftDel {
    pub ipcp_id: u16,
    pub dst_addr: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpPduftFlush {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFetch {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegFetch {
    pub ipcp_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpQosSupported {
    pub ipcp_id: u16,
    pub qos_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpSchedWrr {
    pub ipcp_id: u16,
    pub weights: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpSchedPfifo {
    pub ipcp_id: u16,
    pub levels: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFlags {
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    IpcpCreate(IpcpCreate),
    IpcpDestroy(IpcpDestroy),
    IpcpConfig(IpcpConfig),
    IpcpConfigGet(IpcpConfigGet),
    UipcpSet(UipcpSet),
    UipcpWait(UipcpWait),
    Stats(StatsReq),
    ApplRegister(ApplRegister),
    ApplMove(ApplMove),
    FaReq(FaReq),
    FaResp(FaResp),
    UipcpFaReqArrived(UipcpFaReqArrived),
    UipcpFaRespArrived(UipcpFaRespArrived),
    FlowDealloc(FlowDealloc),
    FlowStatsReq(FlowStatsReq),
    FlowCfgUpdate(FlowCfgUpdate),
    IpcpPduftSet(IpcpPduftSet),
    IpcpPduftDel(IpcpPduftDel),
    IpcpPduftFlush(IpcpPduftFlush),
    FlowFetch(FlowFetch),
    RegFetch(RegFetch),
    IpcpQosSupported(IpcpQosSupported),
    IpcpSchedWrr(IpcpSchedWrr),
    IpcpSchedPfifo(IpcpSchedPfifo),
    ChangeFlags(ChangeFlags),
}

impl Request {
    /// Parses one full message (type byte included) from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Request, WireError> {
        let msg_type = parse_type(bytes)?;
        let mut r = Reader::new(&bytes[1..]);
        Ok(match msg_type {
            MessageType::IpcpCreate => Request::IpcpCreate(IpcpCreate {
                name: r.str()?,
                dif_name: r.str()?,
                dif_type: r.str()?,
            }),
            MessageType::IpcpDestroy => Request::IpcpDestroy(IpcpDestroy {
                ipcp_id: r.u16()?,
            }),
            MessageType::IpcpConfig => Request::IpcpConfig(IpcpConfig {
                ipcp_id: r.u16()?,
                key: r.str()?,
                value: r.str()?,
            }),
            MessageType::IpcpConfigGet => Request::IpcpConfigGet(IpcpConfigGet {
                ipcp_id: r.u16()?,
                key: r.str()?,
            }),
            MessageType::UipcpSet => Request::UipcpSet(UipcpSet {
                ipcp_id: r.u16()?,
            }),
            MessageType::UipcpWait => Request::UipcpWait(UipcpWait {
                ipcp_id: r.u16()?,
            }),
            MessageType::Stats => Request::Stats(StatsReq {
                ipcp_id: r.u16()?,
            }),
            MessageType::ApplRegister => Request::ApplRegister(ApplRegister {
                dif_name: r.str()?,
                appl_name: r.str()?,
                reg: r.u8()? != 0,
            }),
            MessageType::ApplMove => Request::ApplMove(ApplMove {
                appl_name: r.str()?,
                new_ipcp_id: r.u16()?,
            }),
            MessageType::FaReq => Request::FaReq(FaReq {
                dif_name: r.str()?,
                local_appl: r.str()?,
                remote_appl: r.str()?,
                qos_id: r.u8()?,
            }),
            MessageType::FaResp => Request::FaResp(FaResp {
                port_id: r.u16()?,
                event_id: r.u32()?,
                response: r.u8()?,
            }),
            MessageType::UipcpFaReqArrived => Request::UipcpFaReqArrived(UipcpFaReqArrived {
                dif_name: r.str()?,
                local_appl: r.str()?,
                remote_appl: r.str()?,
                remote_addr: r.u64()?,
                remote_port: r.u16()?,
                remote_cep: r.u16()?,
            }),
            MessageType::UipcpFaRespArrived => Request::UipcpFaRespArrived(UipcpFaRespArrived {
                local_port: r.u16()?,
                response: r.u8()?,
                remote_port: r.u16()?,
                remote_addr: r.u64()?,
                remote_cep: r.u16()?,
            }),
            MessageType::FlowDealloc => Request::FlowDealloc(FlowDealloc {
                port_id: r.u16()?,
                uid: r.u64()?,
            }),
            MessageType::FlowStatsReq => Request::FlowStatsReq(FlowStatsReq {
                port_id: r.u16()?,
            }),
            MessageType::FlowCfgUpdate => Request::FlowCfgUpdate(FlowCfgUpdate {
                port_id: r.u16()?,
                max_cwq_len: r.u16()?,
                max_rtxq_len: r.u16()?,
            }),
            MessageType::IpcpPduftSet => Request::IpcpPduftSet(IpcpPduftSet {
                ipcp_id: r.u16()?,
                dst_addr: r.u64()?,
                local_port_id: r.u16()?,
            }),
            MessageType::IpcpPduftDel => Request::IpcpPduftDel(IpcpPduftDel {
                ipcp_id: r.u16()?,
                dst_addr: r.u64()?,
            }),
            MessageType::IpcpPduftFlush => Request::IpcpPduftFlush(IpcpPduftFlush {
                ipcp_id: r.u16()?,
            }),
            MessageType::FlowFetch => Request::FlowFetch(FlowFetch {
                ipcp_id: r.u16()?,
            }),
            MessageType::RegFetch => Request::RegFetch(RegFetch {
                ipcp_id: r.u16()?,
            }),
            MessageType::IpcpQosSupported => Request::IpcpQosSupported(IpcpQosSupported {
                ipcp_id: r.u16()?,
                qos_id: r.u8()?,
            }),
            MessageType::IpcpSchedWrr => {
                let ipcp_id = r.u16()?;
                let count = r.u16()? as usize;
                let mut weights = Vec::with_capacity(count);
                for _ in 0..count {
                    weights.push(r.u16()?);
                }
                Request::IpcpSchedWrr(IpcpSchedWrr { ipcp_id, weights })
            }
            MessageType::IpcpSchedPfifo => Request::IpcpSchedPfifo(IpcpSchedPfifo {
                ipcp_id: r.u16()?,
                levels: r.u8()?,
            }),
            MessageType::ChangeFlags => Request::ChangeFlags(ChangeFlags { flags: r.u32()? }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf::Writer;

    #[test]
    fn ipcp_create_round_trips() {
        let mut w = Writer::with_capacity(32);
        w.u8(MessageType::IpcpCreate as u8);
        w.str("nx");
        w.str("d1");
        w.str("normal");
        let bytes = w.into_vec();
        let req = Request::decode(&bytes).unwrap();
        assert_eq!(
            req,
            Request::IpcpCreate(IpcpCreate {
                name: "nx".into(),
                dif_name: "d1".into(),
                dif_type: "normal".into(),
            })
        );
    }

    #[test]
    fn truncated_message_is_an_error() {
        let bytes = [MessageType::FlowDealloc as u8, 1, 2];
        assert_eq!(Request::decode(&bytes), Err(WireError::Truncated));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let bytes = [200u8];
        assert_eq!(Request::decode(&bytes), Err(WireError::UnknownType(200)));
    }
}
