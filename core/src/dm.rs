//! Data Model (§3, §4.1): the per-namespace container for every IPCP,
//! flow, DIF, registered application, id bitmap, table, lock, and
//! deferred-work queue. Lock order follows §4.1 exactly: DIF < IPCP < flow
//! < per-IPCP registered-applications < per-device upqueue.

use alloc::collections::BTreeMap as Map;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use ripc_sync::fast_mutex::FastMutex;
use ripc_sync::rw_spin_lock::RwSpinLock;
use ripc_sync::spin_lock::SpinLock;

use crate::appl::{ApplState, RegisteredAppl};
use crate::config::CoreConfig;
use crate::control_device::{ControlDevice, ControlDeviceId, NamespaceId, RegView};
use crate::deferred::DeferredQueue;
use crate::dif::Dif;
use crate::error::{CoreError, CoreResult};
use crate::factory::FactoryRegistry;
use crate::flow::Flow;
use crate::id_alloc::{CepIdBitmap, IpcpIdBitmap, PortIdBitmap};
use crate::ipcp::Ipcp;
use crate::putqueue::PutQueue;
use crate::refcount::{Refcounted, ReleaseOutcome};
use ripc_wire::event::{Event, IpcpUpdate, IpcpUpdateKind};

pub struct DataModel {
    pub namespace: NamespaceId,
    pub config: CoreConfig,

    ipcp_ids: SpinLock<IpcpIdBitmap>,
    port_ids: SpinLock<PortIdBitmap>,
    cep_ids: SpinLock<CepIdBitmap>,

    ipcps: SpinLock<HashMap<u16, Refcounted<Ipcp>>>,
    difs: SpinLock<HashMap<String, Refcounted<Dif>>>,

    flows_by_port: RwSpinLock<HashMap<u16, Refcounted<Flow>>>,
    cep_to_port: RwSpinLock<HashMap<u16, u16>>,

    appls: SpinLock<Map<(u16, String), RegisteredAppl>>,

    control_devices: FastMutex<HashMap<ControlDeviceId, ControlDevice>>,
    next_device_id: AtomicU64,
    next_flow_uid: AtomicU64,

    pub put_queue: PutQueue<Flow>,
    pub appl_removal_queue: DeferredQueue<RegisteredAppl>,
    pub flow_removal_queue: DeferredQueue<Flow>,
}

impl DataModel {
    pub fn new(namespace: NamespaceId, config: CoreConfig) -> Self {
        Self {
            namespace,
            config,
            ipcp_ids: SpinLock::new(IpcpIdBitmap::new()),
            port_ids: SpinLock::new(PortIdBitmap::new()),
            cep_ids: SpinLock::new(CepIdBitmap::new()),
            ipcps: SpinLock::new(HashMap::new()),
            difs: SpinLock::new(HashMap::new()),
            flows_by_port: RwSpinLock::new(HashMap::new()),
            cep_to_port: RwSpinLock::new(HashMap::new()),
            appls: SpinLock::new(Map::new()),
            control_devices: FastMutex::new(HashMap::new()),
            next_device_id: AtomicU64::new(1),
            next_flow_uid: AtomicU64::new(1),
            put_queue: PutQueue::new(),
            appl_removal_queue: DeferredQueue::new(),
            flow_removal_queue: DeferredQueue::new(),
        }
    }

    // -- DIFs -------------------------------------------------------------

    fn get_or_create_dif(&self, name: &str, dif_type: &str) -> () {
        let mut guard = self.difs.lock();
        if let Some(dif) = guard.get(name) {
            dif.retain();
        } else {
            guard.insert(String::from(name), Refcounted::new(Dif::new(name, dif_type)));
        }
    }

    fn release_dif(&self, name: &str) {
        let mut guard = self.difs.lock();
        if let Some(dif) = guard.get(name) {
            if dif.release() == ReleaseOutcome::Dropped {
                guard.remove(name);
            }
        }
    }

    // -- IPCPs --------------------------------------------------------------

    pub fn create_ipcp(
        &self,
        name: String,
        dif_name: String,
        dif_type: String,
        factories: &FactoryRegistry,
    ) -> CoreResult<u16> {
        factories.with_factory(&dif_type, |factory| factory.retain_owner())?;

        let id = match self.ipcp_ids.lock().alloc() {
            Ok(id) => id,
            Err(e) => {
                factories
                    .with_factory(&dif_type, |f| f.release_owner())
                    .ok();
                return Err(e);
            }
        };

        self.get_or_create_dif(&dif_name, &dif_type);

        let mut ipcp = Ipcp::new(id, name, dif_name, dif_type.clone(), dif_type.clone());
        let create_result = factories.with_factory(&ipcp.dif_type, |factory| (factory.ops.create)(&mut ipcp));
        if create_result.is_err() || create_result.as_ref().map(|r| r.is_err()).unwrap_or(true) {
            self.ipcp_ids.lock().free(id);
            self.release_dif(&ipcp.dif_name);
            factories.with_factory(&ipcp.dif_type, |f| f.release_owner()).ok();
            return Err(CoreError::InvalidArg);
        }

        self.ipcps.lock().insert(id, Refcounted::new(ipcp));
        log::debug!("ipcp {} created in dif {:?}", id, dif_type);
        self.broadcast_ipcp_update(IpcpUpdateKind::Add, id);
        Ok(id)
    }

    /// §3/§9: marks the IPCP a zombie, tears down its registered
    /// applications and bound flows, and releases the table's own hold on
    /// it. The factory destructor only actually runs once every flow that
    /// was still retaining this IPCP (§9: "Flow owns a strong reference to
    /// its lower IPCP") has let go too -- if any are still draining through
    /// the put-queue's grace period, teardown completes later, from
    /// [`DataModel::expire_put_queue`] or a later `flow_dealloc`.
    pub fn destroy_ipcp(&self, id: u16, factories: &FactoryRegistry, now_ms: u64) -> CoreResult<()> {
        {
            let mut guard = self.ipcps.lock();
            let ipcp = guard.get_mut(&id).ok_or(CoreError::NotFound)?;
            ipcp.mark_zombie();
            ipcp.pduft.flush();
        }

        self.broadcast_ipcp_update(IpcpUpdateKind::Del, id);

        let stolen_appls: Vec<String> = self
            .appls
            .lock()
            .keys()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, name)| name.clone())
            .collect();
        for appl_name in stolen_appls {
            self.appl_unregister(id, &appl_name).ok();
        }

        let bound_flows: Vec<(u16, u64)> = self
            .flows_by_port
            .read_lock()
            .values()
            .filter(|flow| flow.lower_ipcp_id == id)
            .map(|flow| (flow.local_port, flow.uid))
            .collect();
        for (port, uid) in bound_flows {
            self.flow_dealloc(port, uid, now_ms, factories).ok();
        }

        self.release_ipcp(id, factories);
        Ok(())
    }

    /// Releases one reference on an IPCP; once it reaches zero, detaches it
    /// from the table and runs the factory destructor exactly once (§3).
    fn release_ipcp(&self, id: u16, factories: &FactoryRegistry) {
        let mut guard = self.ipcps.lock();
        let dropped = if let Some(ipcp) = guard.get(&id) {
            if ipcp.release() == ReleaseOutcome::Dropped {
                guard.remove(&id)
            } else {
                None
            }
        } else {
            None
        };
        drop(guard);
        if let Some(removed) = dropped {
            self.finish_ipcp_teardown(removed.into_inner(), factories);
        }
    }

    fn finish_ipcp_teardown(&self, mut ipcp: Ipcp, factories: &FactoryRegistry) {
        let factory_name = ipcp.factory_name.clone();
        factories
            .with_factory(&factory_name, |factory| (factory.ops.destroy)(&mut ipcp))
            .ok();
        factories
            .with_factory(&factory_name, |factory| factory.release_owner())
            .ok();
        self.release_dif(&ipcp.dif_name);
        self.ipcp_ids.lock().free(ipcp.id);
        log::debug!("ipcp {} destroyed", ipcp.id);
    }

    /// §9: a flow takes this when it stores `lower_ipcp_id` (in
    /// `insert_flow`); released once, exactly once, when that flow is
    /// finally reclaimed (not merely postponed into the put-queue).
    pub fn retain_ipcp(&self, id: u16) -> CoreResult<()> {
        let guard = self.ipcps.lock();
        let ipcp = guard.get(&id).ok_or(CoreError::NotFound)?;
        ipcp.retain();
        Ok(())
    }

    pub fn ipcp_is_zombie(&self, id: u16) -> CoreResult<bool> {
        let guard = self.ipcps.lock();
        Ok(guard.get(&id).ok_or(CoreError::NotFound)?.zombie)
    }

    pub fn with_ipcp_mut<R>(&self, id: u16, f: impl FnOnce(&mut Ipcp) -> R) -> CoreResult<R> {
        let mut guard = self.ipcps.lock();
        let ipcp = guard.get_mut(&id).ok_or(CoreError::NotFound)?;
        Ok(f(ipcp))
    }

    pub fn ipcp_count(&self) -> usize {
        self.ipcps.lock().len()
    }

    pub fn ipcp_ids_snapshot(&self) -> Vec<u16> {
        self.ipcps.lock().keys().copied().collect()
    }

    /// §4.5 step 1: picks the first non-zombie member of `dif_name` to host
    /// a new flow allocation.
    pub fn find_ipcp_by_dif(&self, dif_name: &str) -> CoreResult<u16> {
        self.ipcps
            .lock()
            .values()
            .find(|ipcp| !ipcp.zombie && ipcp.dif_name == dif_name)
            .map(|ipcp| ipcp.id)
            .ok_or(CoreError::NotFound)
    }

    pub fn set_uipcp(&self, ipcp_id: u16, device_id: ControlDeviceId) -> CoreResult<()> {
        self.with_ipcp_mut(ipcp_id, |ipcp| ipcp.uipcp = Some(device_id))
    }

    pub fn ipcp_uipcp(&self, ipcp_id: u16) -> CoreResult<Option<ControlDeviceId>> {
        self.with_ipcp_mut(ipcp_id, |ipcp| ipcp.uipcp)
    }

    /// Reverse lookup used when a `uipcp`-reflected request arrives on a
    /// control device: which IPCP does this device manage?
    pub fn ipcp_by_uipcp_device(&self, device_id: ControlDeviceId) -> Option<u16> {
        self.ipcps
            .lock()
            .values()
            .find(|ipcp| ipcp.uipcp == Some(device_id))
            .map(|ipcp| ipcp.id)
    }

    // -- Registered applications ---------------------------------------

    pub fn appl_register(
        &self,
        ipcp_id: u16,
        appl_name: String,
        device_id: ControlDeviceId,
        needs_uipcp: bool,
    ) -> CoreResult<()> {
        if self.ipcp_is_zombie(ipcp_id)? {
            return Err(CoreError::InvalidArg);
        }
        self.with_ipcp_mut(ipcp_id, |ipcp| ipcp.registered_appls.push(appl_name.clone()))?;
        let appl = RegisteredAppl::new(appl_name.clone(), ipcp_id, device_id, needs_uipcp);
        self.appls.lock().insert((ipcp_id, appl_name), appl);
        Ok(())
    }

    pub fn appl_complete(&self, ipcp_id: u16, appl_name: &str) -> CoreResult<()> {
        let mut guard = self.appls.lock();
        let appl = guard
            .get_mut(&(ipcp_id, String::from(appl_name)))
            .ok_or(CoreError::NotFound)?;
        appl.state = ApplState::Complete;
        Ok(())
    }

    /// Last-reference removal always runs in process context (§4.3); the
    /// caller drains [`DataModel::appl_removal_queue`] there.
    pub fn appl_unregister(&self, ipcp_id: u16, appl_name: &str) -> CoreResult<()> {
        let removed = self
            .appls
            .lock()
            .remove(&(ipcp_id, String::from(appl_name)))
            .ok_or(CoreError::NotFound)?;
        self.with_ipcp_mut(ipcp_id, |ipcp| {
            ipcp.registered_appls.retain(|n| n != appl_name);
        })
        .ok();
        self.appl_removal_queue.push(removed);
        Ok(())
    }

    /// §4.5 step 2: resolves the control device a previously registered
    /// application should be notified through.
    pub fn appl_owner(&self, ipcp_id: u16, appl_name: &str) -> CoreResult<ControlDeviceId> {
        let guard = self.appls.lock();
        guard
            .get(&(ipcp_id, String::from(appl_name)))
            .map(|appl| appl.owning_device)
            .ok_or(CoreError::NotFound)
    }

    pub fn appl_views(&self, ipcp_id: u16) -> Vec<RegView> {
        self.appls
            .lock()
            .iter()
            .filter(|(key, _)| key.0 == ipcp_id)
            .map(|(_, appl)| RegView {
                appl_name: appl.name.clone(),
                pending: appl.state == ApplState::Pending,
            })
            .collect()
    }

    // -- Flows --------------------------------------------------------------

    pub fn alloc_flow_ids(&self) -> CoreResult<(u16, u16)> {
        let port = self.port_ids.lock().alloc()?;
        let cep = match self.cep_ids.lock().alloc() {
            Ok(cep) => cep,
            Err(e) => {
                self.port_ids.lock().free(port);
                return Err(e);
            }
        };
        Ok((port, cep))
    }

    pub fn next_flow_uid(&self) -> u64 {
        self.next_flow_uid.fetch_add(1, Ordering::AcqRel)
    }

    /// §9: retains the flow's lower IPCP (see [`DataModel::retain_ipcp`])
    /// before publishing the flow into the table.
    pub fn insert_flow(&self, flow: Flow) {
        let port = flow.local_port;
        let cep = flow.local_cep;
        self.retain_ipcp(flow.lower_ipcp_id).ok();
        self.cep_to_port.write_lock().insert(cep, port);
        self.flows_by_port.write_lock().insert(port, Refcounted::new(flow));
    }

    pub fn with_flow_mut<R>(&self, port: u16, f: impl FnOnce(&mut Flow) -> R) -> CoreResult<R> {
        let mut guard = self.flows_by_port.write_lock();
        let flow = guard.get_mut(&port).ok_or(CoreError::NotFound)?;
        Ok(f(flow))
    }

    pub fn flow_uid(&self, port: u16) -> CoreResult<u64> {
        let guard = self.flows_by_port.read_lock();
        Ok(guard.get(&port).ok_or(CoreError::NotFound)?.uid)
    }

    pub fn flow_state(&self, port: u16) -> CoreResult<crate::flow::FlowState> {
        let guard = self.flows_by_port.read_lock();
        Ok(guard.get(&port).ok_or(CoreError::NotFound)?.state)
    }

    pub fn flow_upper(&self, port: u16) -> CoreResult<crate::flow::Upper> {
        let guard = self.flows_by_port.read_lock();
        Ok(guard.get(&port).ok_or(CoreError::NotFound)?.upper)
    }

    /// §4.5 step 4 / step 3 accept path: records the peer endpoint once the
    /// other side has answered, and advances the flow out of PENDING.
    pub fn flow_mark_allocated(&self, port: u16, remote_port: u16, remote_cep: u16, remote_addr: u64) -> CoreResult<()> {
        self.with_flow_mut(port, |flow| {
            flow.state = crate::flow::FlowState::Allocated;
            flow.remote_port = remote_port;
            flow.remote_cep = remote_cep;
            flow.remote_addr = remote_addr;
        })
    }

    pub fn set_flow_upper(&self, port: u16, upper: crate::flow::Upper) -> CoreResult<()> {
        self.with_flow_mut(port, |flow| flow.upper = upper)
    }

    /// §4.5: optionally binds an upper IPCP onto an allocated flow, taking
    /// the weak shortcut on the flow's lower IPCP (§9 cyclic-reference
    /// design).
    pub fn bind_upper_ipcp(&self, port: u16, upper_ipcp_id: u16) -> CoreResult<()> {
        let lower_ipcp_id = self.with_flow_mut(port, |flow| {
            flow.upper = crate::flow::Upper::Ipcp(upper_ipcp_id);
            flow.lower_ipcp_id
        })?;
        self.with_ipcp_mut(lower_ipcp_id, |ipcp| ipcp.bind_shortcut(upper_ipcp_id))
    }

    /// §4.5 port-id reuse race: ignore a stale `flow_dealloc` whose `uid`
    /// no longer matches the live flow occupying that port.
    pub fn flow_dealloc(&self, port: u16, uid: u64, now_ms: u64, factories: &FactoryRegistry) -> CoreResult<()> {
        let released = {
            let mut guard = self.flows_by_port.write_lock();
            match guard.get(&port) {
                Some(flow) if flow.uid == uid => guard.remove(&port),
                Some(_) => return Err(CoreError::NotFound),
                None => return Err(CoreError::NotFound),
            }
        };
        if let Some(flow) = released {
            self.cep_to_port.write_lock().remove(&flow.local_cep);
            self.retire_flow(flow, now_ms, factories);
        }
        Ok(())
    }

    /// Two-phase destruction (§3 Flow lifecycle): if the flow is still
    /// ALLOCATED with non-empty CWQ/RTXQ, grant the post-deallocation
    /// grace period via the put-queue instead of freeing ids immediately.
    /// Only the immediate path releases the flow's strong hold on its
    /// lower IPCP (§9) -- a postponed flow is still alive, just queued.
    fn retire_flow(&self, flow: Refcounted<Flow>, now_ms: u64, factories: &FactoryRegistry) {
        use crate::flow::FlowState;

        if flow.state == FlowState::Allocated && flow.has_undrained_queues() && !flow.flags.del_postponed {
            let expires = now_ms + self.config.flow_del_wait_ms;
            let uid = flow.uid;
            let mut postponed = flow.into_inner();
            postponed.flags.del_postponed = true;
            postponed.expires = Some(expires);
            self.put_queue.insert(expires, uid, postponed);
            return;
        }

        let lower_ipcp_id = flow.lower_ipcp_id;
        self.port_ids.lock().free(flow.local_port);
        self.cep_ids.lock().free(flow.local_cep);
        self.flow_removal_queue.push(flow.into_inner());
        self.release_ipcp(lower_ipcp_id, factories);
    }

    /// Aggregates per-flow DTP counters across every flow still hosted on
    /// `ipcp_id`, for `Stats`.
    pub fn ipcp_stats(&self, ipcp_id: u16) -> (u64, u64, u64, u64) {
        let guard = self.flows_by_port.read_lock();
        guard
            .values()
            .filter(|flow| flow.lower_ipcp_id == ipcp_id)
            .fold((0, 0, 0, 0), |(tx_p, rx_p, tx_b, rx_b), flow| {
                (
                    tx_p + flow.dtp.tx_pdus,
                    rx_p + flow.dtp.rx_pdus,
                    tx_b + flow.dtp.tx_bytes,
                    rx_b + flow.dtp.rx_bytes,
                )
            })
    }

    /// Per-flow counters, for `FlowStatsReq`.
    pub fn flow_stats(&self, port: u16) -> CoreResult<(u64, u64)> {
        let guard = self.flows_by_port.read_lock();
        let flow = guard.get(&port).ok_or(CoreError::NotFound)?;
        Ok((flow.dtp.tx_pdus, flow.dtp.rx_pdus))
    }

    pub fn flow_views(&self, ipcp_id: u16) -> Vec<crate::control_device::FlowView> {
        self.flows_by_port
            .read_lock()
            .values()
            .filter(|flow| flow.lower_ipcp_id == ipcp_id)
            .map(|flow| crate::control_device::FlowView {
                port_id: flow.local_port,
                remote_port: flow.remote_port,
                remote_addr: flow.remote_addr,
            })
            .collect()
    }

    /// Runs the put-queue's due entries (§4.3): the embedding module calls
    /// this from its DM-wide timer, armed to [`PutQueue::arm_to_head`].
    /// Each reclaimed flow releases its strong hold on its lower IPCP
    /// (§9), possibly completing that IPCP's deferred `destroy_ipcp`.
    pub fn expire_put_queue(&self, now_ms: u64, factories: &FactoryRegistry) {
        for (_, flow) in self.put_queue.expire_up_to(now_ms) {
            let lower_ipcp_id = flow.lower_ipcp_id;
            self.port_ids.lock().free(flow.local_port);
            self.cep_ids.lock().free(flow.local_cep);
            self.flow_removal_queue.push(flow);
            self.release_ipcp(lower_ipcp_id, factories);
        }
    }

    /// §4.3: reclaims flows that were created but never bound to an I/O
    /// device (`Upper::NeverBound`) once `unbound_flow_timeout_ms` has
    /// elapsed -- a separate deferred-removal mechanism from the put-queue,
    /// which only grants a grace period to an already-deallocated flow.
    /// The embedding module is expected to call this periodically, same as
    /// [`DataModel::expire_put_queue`].
    pub fn reap_unbound_flows(&self, now_ms: u64, factories: &FactoryRegistry) {
        let stale: Vec<(u16, u64)> = self
            .flows_by_port
            .read_lock()
            .values()
            .filter(|flow| {
                flow.upper == crate::flow::Upper::NeverBound
                    && now_ms.saturating_sub(flow.created_at_ms) >= self.config.unbound_flow_timeout_ms
            })
            .map(|flow| (flow.local_port, flow.uid))
            .collect();
        for (port, uid) in stale {
            self.flow_dealloc(port, uid, now_ms, factories).ok();
        }
    }

    // -- Control devices ------------------------------------------------

    pub fn open_control_device(&self) -> ControlDeviceId {
        let id = self.next_device_id.fetch_add(1, Ordering::AcqRel);
        let dev = ControlDevice::new(id, self.namespace, self.config.upqueue_byte_budget);
        self.control_devices.lock().insert(id, dev);
        id
    }

    pub fn close_control_device(&self, id: ControlDeviceId) {
        self.control_devices.lock().remove(&id);
    }

    pub fn with_device_mut<R>(&self, id: ControlDeviceId, f: impl FnOnce(&mut ControlDevice) -> R) -> CoreResult<R> {
        let mut guard = self.control_devices.lock();
        let dev = guard.get_mut(&id).ok_or(CoreError::BadFd)?;
        Ok(f(dev))
    }

    /// Looks up the DIF name/type an IPCP currently carries, for the
    /// `IpcpUpdate` broadcasts that must report them (§8 scenario 1).
    /// Empty strings only if the id is already gone by the time this runs.
    fn ipcp_dif_info(&self, ipcp_id: u16) -> (String, String) {
        self.ipcps
            .lock()
            .get(&ipcp_id)
            .map(|ipcp| (ipcp.dif_name.clone(), ipcp.dif_type.clone()))
            .unwrap_or_default()
    }

    pub fn subscribe_ipcps(&self, id: ControlDeviceId) -> CoreResult<()> {
        let ipcp_ids = self.ipcp_ids_snapshot();
        self.with_device_mut(id, |dev| dev.subscriptions.ipcps = true)?;
        for ipcp_id in ipcp_ids {
            let (dif_name, dif_type) = self.ipcp_dif_info(ipcp_id);
            let ev = Event::IpcpUpdate(IpcpUpdate {
                kind: IpcpUpdateKind::Add,
                ipcp_id,
                dif_name,
                dif_type,
            });
            self.with_device_mut(id, |dev| {
                dev.upqueue.append(ev.encode(), false, || {}, 0).ok();
            })?;
        }
        Ok(())
    }

    fn broadcast_ipcp_update(&self, kind: IpcpUpdateKind, ipcp_id: u16) {
        let (dif_name, dif_type) = self.ipcp_dif_info(ipcp_id);
        let ev = Event::IpcpUpdate(IpcpUpdate {
            kind,
            ipcp_id,
            dif_name,
            dif_type,
        });
        let bytes = ev.encode();
        let mut guard = self.control_devices.lock();
        for dev in guard.values_mut() {
            if dev.subscriptions.ipcps {
                dev.upqueue.append(bytes.clone(), false, || {}, 0).ok();
            }
        }
    }
}
