// On-wire PDU Control Information header, one per PDU exchanged between
// normal IPCPs. Same fixed-layout-struct-plus-pointer-cast idiom the
// teacher uses for `protocol::command::{Verdict, UpdateV4, UpdateV6}` —
// appropriate here too since every field is a plain integer and this is
// the DTP send/receive hot path.

use num_derive::FromPrimitive;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum PduType {
    Dt = 0x01,
    Mgmt = 0x40,
    Fc = 0x41,
}

pub const PDU_TYPE_DT: u16 = 0x8001;
pub const PDU_TYPE_MGMT: u16 = 0xC040;
pub const PDU_TYPE_FC: u16 = 0xC001;

pub const FLAG_DRF: u8 = 0x01;

#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ConnId {
    pub qos_id: u8,
    pub dst_cep: u16,
    pub src_cep: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pci {
    pub dst_addr: u64,
    pub src_addr: u64,
    pub conn_id: ConnId,
    pub pdu_type: u16,
    pub pdu_flags: u8,
    pub seqnum: u64,
}

impl Pci {
    pub fn has_drf(&self) -> bool {
        self.pdu_flags & FLAG_DRF != 0
    }

    pub fn set_drf(&mut self, drf: bool) {
        if drf {
            self.pdu_flags |= FLAG_DRF;
        } else {
            self.pdu_flags &= !FLAG_DRF;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        let ptr = self as *const Pci as *const u8;
        unsafe { core::slice::from_raw_parts(ptr, core::mem::size_of::<Pci>()) }
    }

    pub fn parse(bytes: &[u8]) -> Option<&Pci> {
        if bytes.len() < core::mem::size_of::<Pci>() {
            return None;
        }
        let ptr: *const u8 = &bytes[0];
        let t_ptr = ptr as *const Pci;
        unsafe { t_ptr.as_ref() }
    }
}

/// Body of a control-only `FC` PDU (§4.6): carried after `Pci` whenever RX
/// flow control is enabled without retransmission control, or echoed back
/// on the management path's same framing.
#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FcBody {
    pub last_ctrl_seq_num_rcvd: u64,
    pub new_rwe: u64,
    pub new_lwe: u64,
    pub my_rwe: u64,
    pub my_lwe: u64,
}

impl FcBody {
    pub fn as_bytes(&self) -> &[u8] {
        let ptr = self as *const FcBody as *const u8;
        unsafe { core::slice::from_raw_parts(ptr, core::mem::size_of::<FcBody>()) }
    }

    pub fn parse(bytes: &[u8]) -> Option<&FcBody> {
        if bytes.len() < core::mem::size_of::<FcBody>() {
            return None;
        }
        let ptr: *const u8 = &bytes[0];
        let t_ptr = ptr as *const FcBody;
        unsafe { t_ptr.as_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fc_body_round_trips_through_bytes() {
        let body = FcBody {
            last_ctrl_seq_num_rcvd: 3,
            new_rwe: 10,
            new_lwe: 4,
            my_rwe: 20,
            my_lwe: 5,
        };
        let bytes = body.as_bytes().to_vec();
        let parsed = FcBody::parse(&bytes).unwrap();
        assert_eq!(*parsed, body);
    }

    #[test]
    fn round_trips_through_bytes() {
        let pci = Pci {
            dst_addr: 42,
            src_addr: 7,
            conn_id: ConnId {
                qos_id: 0,
                dst_cep: 100,
                src_cep: 200,
            },
            pdu_type: PDU_TYPE_DT,
            pdu_flags: FLAG_DRF,
            seqnum: 9001,
        };
        let bytes = pci.as_bytes().to_vec();
        let parsed = Pci::parse(&bytes).unwrap();
        assert_eq!(*parsed, pci);
        assert!(parsed.has_drf());
    }
}
