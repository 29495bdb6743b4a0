//! Flow Allocation Protocol Engine (§4.5): the four-step handshake between
//! two applications, mediated by the kernel on both ends and reflected out
//! to each side's `uipcp` (or, for a shim DIF with no user-space peer,
//! answered directly through the IPCP's own `Ops` hooks).
//!
//! Each entry point takes the parsed wire request and returns the set of
//! `(device, event)` pairs the caller should append to those devices'
//! upqueues — this engine never touches a device's upqueue directly, it
//! only decides who hears what.

use alloc::vec::Vec;

use ripc_wire::event as wev;
use ripc_wire::request as wreq;

use crate::control_device::ControlDeviceId;
use crate::dm::DataModel;
use crate::error::{CoreError, CoreResult};
use crate::factory::FactoryRegistry;
use crate::flow::{Flow, FlowConfig, FlowSpec, FlowState, Upper};

fn flow_config(dm: &DataModel) -> FlowConfig {
    FlowConfig {
        max_cwq_len: dm.config.max_cwq_len,
        max_rtxq_len: dm.config.max_rtxq_len,
    }
}

/// Step 1: a local application asks to allocate a flow. Allocates the
/// port/cep pair and either reflects the request to the IPCP's `uipcp` or,
/// for a shim DIF, hands it to the IPCP's own `flow_allocate_req` hook.
pub fn fa_req(
    dm: &DataModel,
    factories: &FactoryRegistry,
    requesting_device: ControlDeviceId,
    req: &wreq::FaReq,
    now_ms: u64,
) -> CoreResult<Vec<(ControlDeviceId, wev::Event)>> {
    let ipcp_id = dm.find_ipcp_by_dif(&req.dif_name)?;
    let (port, cep) = dm.alloc_flow_ids()?;
    let uid = dm.next_flow_uid();

    let mut flow = Flow::new(
        port,
        cep,
        ipcp_id,
        uid,
        FlowSpec::best_effort(),
        flow_config(dm),
        req.dif_name.clone(),
        req.local_appl.clone(),
        req.remote_appl.clone(),
        true,
        now_ms,
    );
    flow.qos_id = req.qos_id;
    flow.upper = Upper::ControlDevice(requesting_device);
    dm.insert_flow(flow);

    let mut out = Vec::new();
    out.push((
        requesting_device,
        wev::Event::FaReqResp(wev::FaReqResp { port_id: port }),
    ));

    match dm.ipcp_uipcp(ipcp_id)? {
        Some(uipcp_device) => {
            out.push((
                uipcp_device,
                wev::Event::UipcpFaReqArrived(wev::UipcpFaReqArrived {
                    event_id: port as u32,
                    dif_name: req.dif_name.clone(),
                    local_appl: req.local_appl.clone(),
                    remote_appl: req.remote_appl.clone(),
                }),
            ));
        }
        None => {
            let dif_type = dm.with_ipcp_mut(ipcp_id, |ipcp| ipcp.dif_type.clone())?;
            let hook = factories.with_factory(&dif_type, |factory| factory.ops.flow_allocate_req)?;
            match hook {
                Some(hook) => {
                    let spec = FlowSpec::best_effort();
                    dm.with_ipcp_mut(ipcp_id, |ipcp| hook(ipcp, port, spec))??;
                }
                None => {
                    dm.flow_dealloc(port, uid, now_ms, factories).ok();
                    return Err(CoreError::NotImpl);
                }
            }
        }
    }

    Ok(out)
}

/// Step 2, reflected side: a `uipcp` reports that a flow request arrived
/// from the network for one of its locally registered applications.
pub fn fa_req_arrived(
    dm: &DataModel,
    source_device: ControlDeviceId,
    req: &wreq::UipcpFaReqArrived,
    now_ms: u64,
) -> CoreResult<Vec<(ControlDeviceId, wev::Event)>> {
    let ipcp_id = dm.ipcp_by_uipcp_device(source_device).ok_or(CoreError::NotFound)?;
    let owner_device = dm.appl_owner(ipcp_id, &req.local_appl)?;

    let (port, cep) = dm.alloc_flow_ids()?;
    let uid = dm.next_flow_uid();

    let mut flow = Flow::new(
        port,
        cep,
        ipcp_id,
        uid,
        FlowSpec::best_effort(),
        flow_config(dm),
        req.dif_name.clone(),
        req.local_appl.clone(),
        req.remote_appl.clone(),
        false,
        now_ms,
    );
    flow.remote_port = req.remote_port;
    flow.remote_cep = req.remote_cep;
    flow.remote_addr = req.remote_addr;
    flow.upper = Upper::ControlDevice(owner_device);
    dm.insert_flow(flow);

    Ok(alloc::vec![(
        owner_device,
        wev::Event::FaReqArrived(wev::FaReqArrived {
            port_id: port,
            dif_name: req.dif_name.clone(),
            local_appl: req.local_appl.clone(),
            remote_appl: req.remote_appl.clone(),
        }),
    )])
}

/// Step 3: the responding application accepts or rejects a pending flow.
pub fn fa_resp(
    dm: &DataModel,
    factories: &FactoryRegistry,
    req: &wreq::FaResp,
    now_ms: u64,
) -> CoreResult<Vec<(ControlDeviceId, wev::Event)>> {
    if dm.flow_state(req.port_id)? != FlowState::Pending {
        return Err(CoreError::InvalidArg);
    }
    let uid = dm.flow_uid(req.port_id)?;
    let ipcp_id = dm.with_flow_mut(req.port_id, |f| f.lower_ipcp_id)?;
    let (remote_port, remote_addr) = dm.with_flow_mut(req.port_id, |f| (f.remote_port, f.remote_addr))?;

    let accept = req.response == 0;
    if accept {
        dm.with_flow_mut(req.port_id, |f| f.state = FlowState::Allocated)?;
    } else {
        dm.flow_dealloc(req.port_id, uid, now_ms, factories)?;
    }

    let mut out = Vec::new();
    match dm.ipcp_uipcp(ipcp_id)? {
        Some(uipcp_device) => {
            out.push((
                uipcp_device,
                wev::Event::UipcpFaRespArrived(wev::UipcpFaRespArrived {
                    port_id: req.port_id,
                    response: req.response,
                    remote_port,
                    remote_addr,
                }),
            ));
        }
        None => {
            let dif_type = dm.with_ipcp_mut(ipcp_id, |ipcp| ipcp.dif_type.clone())?;
            let hook = factories.with_factory(&dif_type, |factory| factory.ops.flow_allocate_resp)?;
            if let Some(hook) = hook {
                dm.with_ipcp_mut(ipcp_id, |ipcp| hook(ipcp, req.port_id, accept))??;
            }
        }
    }

    Ok(out)
}

/// Step 4, reflected side: a `uipcp` reports the peer's accept/reject
/// decision back to the local flow-allocation initiator.
pub fn fa_resp_arrived(
    dm: &DataModel,
    factories: &FactoryRegistry,
    req: &wreq::UipcpFaRespArrived,
    now_ms: u64,
) -> CoreResult<Vec<(ControlDeviceId, wev::Event)>> {
    if dm.flow_state(req.local_port)? != FlowState::Pending {
        return Err(CoreError::InvalidArg);
    }
    let flags = dm.with_flow_mut(req.local_port, |f| f.flags)?;
    if !flags.initiator {
        return Err(CoreError::InvalidArg);
    }

    let upper = dm.flow_upper(req.local_port)?;
    let mut out = Vec::new();

    if req.response == 0 {
        dm.flow_mark_allocated(req.local_port, req.remote_port, req.remote_cep, req.remote_addr)?;
    } else {
        let uid = dm.flow_uid(req.local_port)?;
        dm.flow_dealloc(req.local_port, uid, now_ms, factories)?;
    }

    if let Upper::ControlDevice(dev) = upper {
        out.push((
            dev,
            wev::Event::FaRespArrived(wev::FaRespArrived {
                port_id: req.local_port,
                response: req.response,
            }),
        ));
    }

    Ok(out)
}
