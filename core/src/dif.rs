//! Distributed IPC Facility (§3): created on the first IPCP that names it,
//! shared by reference, destroyed when the last IPCP leaves.

use alloc::string::String;

#[derive(Debug, Clone)]
pub struct Dif {
    pub name: String,
    pub dif_type: String,
    pub max_pdu_size: u32,
    pub max_pdu_life_ms: u32,
}

impl Dif {
    pub fn new(name: impl Into<String>, dif_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dif_type: dif_type.into(),
            max_pdu_size: 8192,
            max_pdu_life_ms: 60_000,
        }
    }
}
