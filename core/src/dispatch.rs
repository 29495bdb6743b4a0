//! Request Dispatcher (§4, §6): routes one decoded [`ripc_wire::request::Request`]
//! from a control device's `write()` to the data model, the flow allocation
//! engine, or a DIF-type's `Ops` hooks, and hands back the event(s) the
//! caller should deliver. Grounded in the teacher's `device.rs::write()`
//! giant match over `CommandType`, restructured here as a match over the
//! already-typed [`Request`] enum instead of a raw command byte.

use alloc::string::String;
use alloc::vec::Vec;

use ripc_wire::event::{self as wev, Event};
use ripc_wire::request::Request;

use crate::control_device::{require_admin, Capability, ControlDeviceId, FetchCursor};
use crate::dm::DataModel;
use crate::error::{CoreError, CoreResult};
use crate::factory::FactoryRegistry;
use crate::fap;
use crate::pduft::NonOwningFlowRef;

/// Dispatches one request and returns the `(device, event)` pairs to
/// append to those devices' upqueues — usually just `device_id` itself,
/// but flow allocation reflects to a second device's `uipcp`, and
/// `IpcpCreate`/`IpcpDestroy` additionally fan out to every subscriber.
pub fn dispatch(
    dm: &DataModel,
    factories: &FactoryRegistry,
    device_id: ControlDeviceId,
    cap: Capability,
    now_ms: u64,
    req: Request,
) -> CoreResult<Vec<(ControlDeviceId, Event)>> {
    match req {
        Request::IpcpCreate(r) => {
            require_admin(cap)?;
            let id = dm.create_ipcp(r.name, r.dif_name, r.dif_type, factories)?;
            Ok(alloc::vec![(
                device_id,
                Event::IpcpCreateResp(wev::IpcpCreateResp { ipcp_id: id })
            )])
        }
        Request::IpcpDestroy(r) => {
            require_admin(cap)?;
            dm.destroy_ipcp(r.ipcp_id, factories, now_ms)?;
            Ok(Vec::new())
        }
        Request::IpcpConfig(r) => {
            require_admin(cap)?;
            let dif_type = dm.with_ipcp_mut(r.ipcp_id, |ipcp| ipcp.dif_type.clone())?;
            let hook = factories.with_factory(&dif_type, |factory| factory.ops.config)?;
            match hook {
                Some(hook) => dm.with_ipcp_mut(r.ipcp_id, |ipcp| hook(ipcp, &r.key, &r.value))??,
                None => return Err(CoreError::NotImpl),
            }
            Ok(Vec::new())
        }
        Request::IpcpConfigGet(r) => {
            let dif_type = dm.with_ipcp_mut(r.ipcp_id, |ipcp| ipcp.dif_type.clone())?;
            let hook = factories.with_factory(&dif_type, |factory| factory.ops.config_get)?;
            let value = match hook {
                Some(hook) => dm.with_ipcp_mut(r.ipcp_id, |ipcp| hook(ipcp, &r.key))??,
                None => return Err(CoreError::NotImpl),
            };
            Ok(alloc::vec![(
                device_id,
                Event::IpcpConfigGetResp(wev::IpcpConfigGetResp { value })
            )])
        }
        Request::UipcpSet(r) => {
            require_admin(cap)?;
            dm.set_uipcp(r.ipcp_id, device_id)?;
            Ok(Vec::new())
        }
        Request::UipcpWait(r) => {
            // No in-crate scheduler to block on; the caller retries until
            // this stops returning `NotFound` (§4.1's uipcp-attach race).
            match dm.ipcp_uipcp(r.ipcp_id)? {
                Some(_) => Ok(Vec::new()),
                None => Err(CoreError::NotFound),
            }
        }
        Request::Stats(r) => {
            let (tx_pdus, rx_pdus, tx_bytes, rx_bytes) = dm.ipcp_stats(r.ipcp_id);
            Ok(alloc::vec![(
                device_id,
                Event::StatsResp(wev::StatsResp {
                    tx_pdus,
                    rx_pdus,
                    tx_bytes,
                    rx_bytes,
                })
            )])
        }
        Request::ApplRegister(r) => {
            if r.reg {
                let ipcp_id = dm.find_ipcp_by_dif(&r.dif_name)?;
                let dif_type = dm.with_ipcp_mut(ipcp_id, |ipcp| ipcp.dif_type.clone())?;
                let needs_uipcp = dm.ipcp_uipcp(ipcp_id)?.is_some();
                dm.appl_register(ipcp_id, r.appl_name.clone(), device_id, needs_uipcp)?;
                if needs_uipcp {
                    let hook = factories.with_factory(&dif_type, |factory| factory.ops.appl_register)?;
                    if let Some(hook) = hook {
                        dm.with_ipcp_mut(ipcp_id, |ipcp| hook(ipcp, &r.appl_name, true))??;
                    }
                } else {
                    dm.appl_complete(ipcp_id, &r.appl_name)?;
                }
            } else {
                let ipcp_id = dm.find_ipcp_by_dif(&r.dif_name)?;
                dm.appl_unregister(ipcp_id, &r.appl_name)?;
            }
            Ok(alloc::vec![(
                device_id,
                Event::ApplRegisterResp(wev::ApplRegisterResp { response: 0 })
            )])
        }
        Request::ApplMove(_r) => Err(CoreError::NotImpl),
        Request::FaReq(r) => fap::fa_req(dm, factories, device_id, &r, now_ms),
        Request::FaResp(r) => fap::fa_resp(dm, factories, &r, now_ms),
        Request::UipcpFaReqArrived(r) => fap::fa_req_arrived(dm, device_id, &r, now_ms),
        Request::UipcpFaRespArrived(r) => fap::fa_resp_arrived(dm, factories, &r, now_ms),
        Request::FlowDealloc(r) => {
            dm.flow_dealloc(r.port_id, r.uid, now_ms, factories)?;
            Ok(Vec::new())
        }
        Request::FlowStatsReq(r) => {
            let (tx_pdus, rx_pdus) = dm.flow_stats(r.port_id)?;
            Ok(alloc::vec![(
                device_id,
                Event::FlowStatsResp(wev::FlowStatsResp {
                    port_id: r.port_id,
                    tx_pdus,
                    rx_pdus,
                })
            )])
        }
        Request::FlowCfgUpdate(r) => {
            dm.with_flow_mut(r.port_id, |flow| {
                flow.config.max_cwq_len = r.max_cwq_len as usize;
                flow.config.max_rtxq_len = r.max_rtxq_len as usize;
            })?;
            Ok(Vec::new())
        }
        Request::IpcpPduftSet(r) => {
            require_admin(cap)?;
            // §4.7: a zombie IPCP accepts no new PDUFT entries.
            if dm.ipcp_is_zombie(r.ipcp_id)? {
                return Err(CoreError::InvalidArg);
            }
            // §4.7: set requires the bound upper IPCP to equal the
            // requesting IPCP -- the referenced flow must actually be
            // hosting this IPCP as its upper, not some other one.
            if dm.flow_upper(r.local_port_id)? != crate::flow::Upper::Ipcp(r.ipcp_id) {
                return Err(CoreError::InvalidArg);
            }
            dm.with_ipcp_mut(r.ipcp_id, |ipcp| {
                ipcp.pduft.set(r.dst_addr, NonOwningFlowRef(r.local_port_id))
            })?;
            Ok(Vec::new())
        }
        Request::IpcpPduftDel(r) => {
            require_admin(cap)?;
            let _ = dm.with_ipcp_mut(r.ipcp_id, |ipcp| ipcp.pduft.del_addr(r.dst_addr))?;
            Ok(Vec::new())
        }
        Request::IpcpPduftFlush(r) => {
            require_admin(cap)?;
            dm.with_ipcp_mut(r.ipcp_id, |ipcp| ipcp.pduft.flush())?;
            Ok(Vec::new())
        }
        Request::FlowFetch(r) => {
            let ev = flow_fetch_next(dm, device_id, r.ipcp_id)?;
            Ok(alloc::vec![(device_id, ev)])
        }
        Request::RegFetch(r) => {
            let ev = reg_fetch_next(dm, device_id, r.ipcp_id)?;
            Ok(alloc::vec![(device_id, ev)])
        }
        Request::IpcpQosSupported(r) => {
            let dif_type = dm.with_ipcp_mut(r.ipcp_id, |ipcp| ipcp.dif_type.clone())?;
            let hook = factories.with_factory(&dif_type, |factory| factory.ops.qos_supported)?;
            let supported = match hook {
                Some(hook) => dm.with_ipcp_mut(r.ipcp_id, |ipcp| hook(ipcp, r.qos_id))?,
                None => false,
            };
            Ok(alloc::vec![(
                device_id,
                Event::IpcpQosSupportedResp(wev::IpcpQosSupportedResp { supported })
            )])
        }
        Request::IpcpSchedWrr(r) => {
            require_admin(cap)?;
            apply_sched(dm, factories, r.ipcp_id, &r.weights)?;
            Ok(Vec::new())
        }
        Request::IpcpSchedPfifo(r) => {
            require_admin(cap)?;
            apply_sched(dm, factories, r.ipcp_id, &[r.levels as u16])?;
            Ok(Vec::new())
        }
        Request::ChangeFlags(r) => {
            if r.flags & 1 != 0 {
                dm.subscribe_ipcps(device_id)?;
            } else {
                dm.with_device_mut(device_id, |dev| dev.subscriptions.ipcps = false)?;
            }
            Ok(Vec::new())
        }
    }
}

fn apply_sched(dm: &DataModel, factories: &FactoryRegistry, ipcp_id: u16, values: &[u16]) -> CoreResult<()> {
    let dif_type = dm.with_ipcp_mut(ipcp_id, |ipcp| ipcp.dif_type.clone())?;
    let hook = factories.with_factory(&dif_type, |factory| factory.ops.sched_config)?;
    match hook {
        Some(hook) => dm.with_ipcp_mut(ipcp_id, |ipcp| hook(ipcp, values))??,
        None => return Err(CoreError::NotImpl),
    }
    Ok(())
}

fn flow_fetch_next(dm: &DataModel, device_id: ControlDeviceId, ipcp_id: u16) -> CoreResult<Event> {
    let needs_init = dm.with_device_mut(device_id, |dev| dev.flow_fetch.is_none())?;
    if needs_init {
        let views = dm.flow_views(ipcp_id);
        dm.with_device_mut(device_id, |dev| dev.flow_fetch = Some(FetchCursor::new(views)))?;
    }
    dm.with_device_mut(device_id, |dev| {
        let cursor = dev.flow_fetch.as_mut().expect("just initialized above");
        match cursor.next() {
            Some(view) => Event::FlowFetchResp(wev::FlowFetchResp {
                port_id: view.port_id,
                remote_port: view.remote_port,
                remote_addr: view.remote_addr,
                end: false,
            }),
            None => {
                dev.flow_fetch = None;
                Event::FlowFetchResp(wev::FlowFetchResp {
                    port_id: 0,
                    remote_port: 0,
                    remote_addr: 0,
                    end: true,
                })
            }
        }
    })
}

fn reg_fetch_next(dm: &DataModel, device_id: ControlDeviceId, ipcp_id: u16) -> CoreResult<Event> {
    let needs_init = dm.with_device_mut(device_id, |dev| dev.reg_fetch.is_none())?;
    if needs_init {
        let views = dm.appl_views(ipcp_id);
        dm.with_device_mut(device_id, |dev| dev.reg_fetch = Some(FetchCursor::new(views)))?;
    }
    dm.with_device_mut(device_id, |dev| {
        let cursor = dev.reg_fetch.as_mut().expect("just initialized above");
        match cursor.next() {
            Some(view) => Event::RegFetchResp(wev::RegFetchResp {
                appl_name: view.appl_name,
                pending: view.pending,
                end: false,
            }),
            None => {
                dev.reg_fetch = None;
                Event::RegFetchResp(wev::RegFetchResp {
                    appl_name: String::new(),
                    pending: false,
                    end: true,
                })
            }
        }
    })
}
