//! IPCP Factory Registry (§3, §4.1, §9): a process-wide set of named
//! factories, one per DIF type, each supplying a constructor and an
//! operations vtable. A factory's owning module is reference-held for the
//! lifetime of every IPCP it creates; the critical ordering from §4.1 is
//! "never release the module before its code has finished running" — the
//! destructor call and the owner release are two separate steps the
//! caller (`DataModel::destroy_ipcp`) must sequence correctly, which is why
//! `release_owner` takes no IPCP reference and does nothing but drop the
//! count.

use alloc::string::String;

use hashbrown::HashMap;
use ripc_sync::fast_mutex::FastMutex;

use crate::error::{CoreError, CoreResult};
use crate::flow::FlowSpec;
use crate::ipcp::Ipcp;
use crate::refcount::{Refcounted, ReleaseOutcome};

/// Function-pointer vtable over the capability set of a DIF-type plug-in
/// (§6, §9). `create`/`destroy`/`sdu_write`/`sdu_rx` are mandatory; the rest
/// mirror the optional plug-in methods §6 lists. Because these are typed
/// Rust `fn` items rather than a C vtable of raw pointers, there is no
/// "null function pointer" state to guard against at the type level — a
/// factory either supplies an optional method or the field is `None`, so
/// the §9 "null vtable" panic case cannot arise from this registry; a
/// factory author who needs to signal "unsupported" returns
/// `CoreError::NotImpl` from a method it does implement instead.
pub struct Ops {
    pub create: fn(&mut Ipcp) -> CoreResult<()>,
    pub destroy: fn(&mut Ipcp),
    pub sdu_write: fn(&Ipcp, &[u8]) -> CoreResult<()>,
    pub sdu_rx: fn(&mut Ipcp, &[u8]) -> CoreResult<()>,
    pub flow_init: Option<fn(&mut Ipcp, port_id: u16) -> CoreResult<()>>,
    pub flow_allocate_req: Option<fn(&mut Ipcp, port_id: u16, spec: FlowSpec) -> CoreResult<()>>,
    pub flow_allocate_resp: Option<fn(&mut Ipcp, port_id: u16, accept: bool) -> CoreResult<()>>,
    pub flow_deallocated: Option<fn(&mut Ipcp, port_id: u16)>,
    pub flow_cfg_update: Option<fn(&mut Ipcp, port_id: u16) -> CoreResult<()>>,
    pub appl_register: Option<fn(&mut Ipcp, appl_name: &str, reg: bool) -> CoreResult<()>>,
    pub config: Option<fn(&mut Ipcp, key: &str, value: &str) -> CoreResult<()>>,
    pub config_get: Option<fn(&Ipcp, key: &str) -> CoreResult<String>>,
    pub qos_supported: Option<fn(&Ipcp, qos_id: u8) -> bool>,
    pub pduft_set: Option<fn(&mut Ipcp, addr: u64, port_id: u16) -> CoreResult<()>>,
    pub pduft_del: Option<fn(&mut Ipcp, addr: u64) -> CoreResult<()>>,
    pub pduft_flush: Option<fn(&mut Ipcp) -> CoreResult<()>>,
    pub pduft_flush_by_flow: Option<fn(&mut Ipcp, port_id: u16) -> CoreResult<()>>,
    pub sched_config: Option<fn(&mut Ipcp, levels_or_weights: &[u16]) -> CoreResult<()>>,
}

pub struct Factory {
    pub name: String,
    pub ops: Ops,
    owner: Refcounted<()>,
}

impl Factory {
    /// Retains the owning module on behalf of a newly created IPCP.
    pub fn retain_owner(&self) {
        self.owner.retain();
    }

    /// Releases the reference a destroyed IPCP held. Must be called only
    /// after that IPCP's `ops.destroy` has returned.
    pub fn release_owner(&self) -> ReleaseOutcome {
        self.owner.release()
    }
}

#[derive(Default)]
pub struct FactoryRegistry {
    factories: FastMutex<HashMap<String, Factory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: FastMutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, ops: Ops) -> CoreResult<()> {
        let name = name.into();
        let mut guard = self.factories.lock();
        if guard.contains_key(&name) {
            return Err(CoreError::InvalidArg);
        }
        guard.insert(
            name.clone(),
            Factory {
                name,
                ops,
                owner: Refcounted::new(()),
            },
        );
        Ok(())
    }

    /// Fails with `Busy` while any IPCP still holds this factory's owner
    /// reference beyond the registry's own.
    pub fn unregister(&self, name: &str) -> CoreResult<()> {
        let mut guard = self.factories.lock();
        let factory = guard.get(name).ok_or(CoreError::NotFound)?;
        match factory.release_owner() {
            ReleaseOutcome::Dropped => {
                guard.remove(name);
                Ok(())
            }
            ReleaseOutcome::Retained => {
                factory.retain_owner();
                Err(CoreError::Busy)
            }
        }
    }

    pub fn with_factory<R>(&self, name: &str, f: impl FnOnce(&Factory) -> R) -> CoreResult<R> {
        let guard = self.factories.lock();
        let factory = guard.get(name).ok_or(CoreError::NotFound)?;
        Ok(f(factory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_ops() -> Ops {
        Ops {
            create: |_| Ok(()),
            destroy: |_| {},
            sdu_write: |_, _| Ok(()),
            sdu_rx: |_, _| Ok(()),
            flow_init: None,
            flow_allocate_req: None,
            flow_allocate_resp: None,
            flow_deallocated: None,
            flow_cfg_update: None,
            appl_register: None,
            config: None,
            config_get: None,
            qos_supported: None,
            pduft_set: None,
            pduft_del: None,
            pduft_flush: None,
            pduft_flush_by_flow: None,
            sched_config: None,
        }
    }

    #[test]
    fn register_then_unregister_with_no_ipcps_succeeds() {
        let reg = FactoryRegistry::new();
        reg.register("normal", noop_ops()).unwrap();
        reg.unregister("normal").unwrap();
        assert_eq!(reg.unregister("normal"), Err(CoreError::NotFound));
    }

    #[test]
    fn unregister_while_an_ipcp_holds_the_owner_fails_busy() {
        let reg = FactoryRegistry::new();
        reg.register("normal", noop_ops()).unwrap();
        reg.with_factory("normal", |f| f.retain_owner()).unwrap();
        assert_eq!(reg.unregister("normal"), Err(CoreError::Busy));
        assert!(reg.with_factory("normal", |_| ()).is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let reg = FactoryRegistry::new();
        reg.register("normal", noop_ops()).unwrap();
        assert_eq!(reg.register("normal", noop_ops()), Err(CoreError::InvalidArg));
    }
}
