//! End-to-end scenarios from the spec's testable-properties section: each
//! test drives the dispatcher the way a real control-device `write()`
//! would, then inspects the resulting events and Data Model state.

use ripc_core::config::CoreConfig;
use ripc_core::control_device::Capability;
use ripc_core::dispatch::dispatch;
use ripc_core::dm::DataModel;
use ripc_core::error::CoreError;
use ripc_core::factory::{FactoryRegistry, Ops};
use ripc_core::flow::FlowSpec;
use ripc_wire::event::{Event, IpcpUpdateKind};
use ripc_wire::request::{
    ApplRegister, FaReq, FlowDealloc, IpcpCreate, IpcpDestroy, Request, UipcpFaRespArrived,
};

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

fn registry_with_normal() -> FactoryRegistry {
    let reg = FactoryRegistry::new();
    reg.register("normal", noop_ops()).unwrap();
    reg
}

fn setup() -> (DataModel, FactoryRegistry) {
    (DataModel::new(0, CoreConfig::default()), registry_with_normal())
}

#[test]
fn create_destroy_ipcp_broadcasts_to_subscribers() {
    let (dm, factories) = setup();
    let subscriber = dm.open_control_device();
    dispatch(
        &dm,
        &factories,
        subscriber,
        Capability::Admin,
        0,
        Request::ChangeFlags(ripc_wire::request::ChangeFlags { flags: 1 }),
    )
    .unwrap();

    let caller = dm.open_control_device();
    let events = dispatch(
        &dm,
        &factories,
        caller,
        Capability::Admin,
        0,
        Request::IpcpCreate(IpcpCreate {
            name: "nx".into(),
            dif_name: "d1".into(),
            dif_type: "normal".into(),
        }),
    )
    .unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].1 {
        Event::IpcpCreateResp(r) => assert_eq!(r.ipcp_id, 0),
        other => panic!("unexpected event {:?}", other),
    }

    let raw = dm
        .with_device_mut(subscriber, |dev| dev.upqueue.read_one(usize::MAX))
        .unwrap()
        .unwrap()
        .unwrap();
    match Event::decode(&raw).unwrap() {
        Event::IpcpUpdate(u) => {
            assert_eq!(u.kind, IpcpUpdateKind::Add);
            assert_eq!(u.ipcp_id, 0);
            assert_eq!(u.dif_name, "d1");
            assert_eq!(u.dif_type, "normal");
        }
        other => panic!("unexpected event {:?}", other),
    }

    dispatch(
        &dm,
        &factories,
        caller,
        Capability::Admin,
        0,
        Request::IpcpDestroy(IpcpDestroy { ipcp_id: 0 }),
    )
    .unwrap();

    let raw = dm
        .with_device_mut(subscriber, |dev| dev.upqueue.read_one(usize::MAX))
        .unwrap()
        .unwrap()
        .unwrap();
    match Event::decode(&raw).unwrap() {
        Event::IpcpUpdate(u) => {
            assert_eq!(u.kind, IpcpUpdateKind::Del);
            assert_eq!(u.ipcp_id, 0);
            assert_eq!(u.dif_name, "d1");
            assert_eq!(u.dif_type, "normal");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn app_register_without_uipcp_completes_immediately() {
    let (dm, factories) = setup();
    let caller = dm.open_control_device();
    dm.create_ipcp("nx".into(), "d1".into(), "normal".into(), &factories)
        .unwrap();

    let events = dispatch(
        &dm,
        &factories,
        caller,
        Capability::None,
        0,
        Request::ApplRegister(ApplRegister {
            dif_name: "d1".into(),
            appl_name: "alice".into(),
            reg: true,
        }),
    )
    .unwrap();
    match &events[0].1 {
        Event::ApplRegisterResp(r) => assert_eq!(r.response, 0),
        other => panic!("unexpected event {:?}", other),
    }

    let views = dm.appl_views(0);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].appl_name, "alice");
    assert!(!views[0].pending);
}

/// Flow allocation happy path (§8 scenario 3): an application on device A
/// requests a flow; the kernel reflects it to the IPCP's uipcp; the uipcp
/// answers with a positive `UipcpFaRespArrived`; device A sees the final
/// `FaRespArrived`, and the flow shows up allocated via `FlowFetch`.
#[test]
fn flow_allocation_happy_path_reflects_through_uipcp() {
    let (dm, factories) = setup();
    dm.create_ipcp("nx".into(), "d1".into(), "normal".into(), &factories)
        .unwrap();

    let uipcp_device = dm.open_control_device();
    dm.set_uipcp(0, uipcp_device).unwrap();

    let device_a = dm.open_control_device();
    let events = dispatch(
        &dm,
        &factories,
        device_a,
        Capability::None,
        0,
        Request::FaReq(FaReq {
            dif_name: "d1".into(),
            local_appl: "alice".into(),
            remote_appl: "bob".into(),
            qos_id: 0,
        }),
    )
    .unwrap();

    let port = match &events[0].1 {
        Event::FaReqResp(r) => r.port_id,
        other => panic!("unexpected event {:?}", other),
    };
    assert!(events
        .iter()
        .any(|(dev, ev)| *dev == uipcp_device && matches!(ev, Event::UipcpFaReqArrived(_))));

    let events = dispatch(
        &dm,
        &factories,
        uipcp_device,
        Capability::None,
        0,
        Request::UipcpFaRespArrived(UipcpFaRespArrived {
            local_port: port,
            response: 0,
            remote_port: 7,
            remote_addr: 42,
            remote_cep: 1,
        }),
    )
    .unwrap();

    assert_eq!(events.len(), 1);
    match &events[0] {
        (dev, Event::FaRespArrived(r)) => {
            assert_eq!(*dev, device_a);
            assert_eq!(r.port_id, port);
            assert_eq!(r.response, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let views = dm.flow_views(0);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].port_id, port);
    assert_eq!(views[0].remote_port, 7);
    assert_eq!(views[0].remote_addr, 42);
    assert_eq!(
        dm.flow_state(port).unwrap(),
        ripc_core::flow::FlowState::Allocated
    );
}

/// Port-id reuse race (§8 scenario 4): a stale `FlowDealloc` referencing a
/// torn-down flow's old `uid` must not touch the new flow reusing its port.
#[test]
fn stale_flow_dealloc_with_old_uid_is_ignored() {
    let (dm, factories) = setup();
    dm.create_ipcp("nx".into(), "d1".into(), "normal".into(), &factories)
        .unwrap();
    let device = dm.open_control_device();

    let events = dispatch(
        &dm,
        &factories,
        device,
        Capability::None,
        0,
        Request::FaReq(FaReq {
            dif_name: "d1".into(),
            local_appl: "alice".into(),
            remote_appl: "bob".into(),
            qos_id: 0,
        }),
    )
    .unwrap();
    let port = match &events[0].1 {
        Event::FaReqResp(r) => r.port_id,
        other => panic!("unexpected event {:?}", other),
    };
    let old_uid = dm.flow_uid(port).unwrap();

    dispatch(
        &dm,
        &factories,
        device,
        Capability::None,
        0,
        Request::FlowDealloc(FlowDealloc { port_id: port, uid: old_uid }),
    )
    .unwrap();

    // A new flow happens to reuse the same port.
    let events = dispatch(
        &dm,
        &factories,
        device,
        Capability::None,
        0,
        Request::FaReq(FaReq {
            dif_name: "d1".into(),
            local_appl: "carol".into(),
            remote_appl: "dave".into(),
            qos_id: 0,
        }),
    )
    .unwrap();
    let new_port = match &events[0].1 {
        Event::FaReqResp(r) => r.port_id,
        other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(new_port, port, "port bitmap should recycle the freed id");

    let result = dispatch(
        &dm,
        &factories,
        device,
        Capability::None,
        0,
        Request::FlowDealloc(FlowDealloc { port_id: port, uid: old_uid }),
    );
    assert_eq!(result, Err(CoreError::NotFound));
    assert_eq!(
        dm.flow_state(new_port).unwrap(),
        ripc_core::flow::FlowState::Pending
    );
}

/// Postponed flow delete (§8 scenario 6): dropping the last reference to
/// an ALLOCATED flow whose CWQ is non-empty defers the removal via the
/// put-queue instead of freeing the port-id immediately.
#[test]
fn flow_with_pending_cwq_is_postponed_then_reclaimed_by_put_queue() {
    use ripc_core::flow::{Flow, FlowConfig, Upper};

    let cfg = CoreConfig::default();
    let dm = DataModel::new(0, cfg);
    let (port, cep) = dm.alloc_flow_ids().unwrap();
    let uid = dm.next_flow_uid();
    let mut flow = Flow::new(
        port,
        cep,
        0,
        uid,
        FlowSpec {
            best_effort: false,
            in_order_delivery: true,
            retransmission_control: false,
        },
        FlowConfig {
            max_cwq_len: cfg.max_cwq_len,
            max_rtxq_len: cfg.max_rtxq_len,
        },
        "d1".into(),
        "alice".into(),
        "bob".into(),
        true,
        0,
    );
    flow.state = ripc_core::flow::FlowState::Allocated;
    flow.upper = Upper::NeverBound;
    for _ in 0..3 {
        flow.dtp.cwq.push_back(ripc_core::dtp::Pdu {
            pci: ripc_wire::pci::Pci {
                dst_addr: 0,
                src_addr: 0,
                conn_id: ripc_wire::pci::ConnId {
                    qos_id: 0,
                    dst_cep: 0,
                    src_cep: 0,
                },
                pdu_type: ripc_wire::pci::PDU_TYPE_DT,
                pdu_flags: 0,
                seqnum: 0,
            },
            payload: Vec::new(),
        });
    }
    dm.insert_flow(flow);

    let factories = registry_with_normal();
    dm.flow_dealloc(port, uid, 0, &factories).unwrap();

    // Port-id is still held: the put-queue grants a grace period, so the
    // next allocation must skip past it.
    let (port2, _) = dm.alloc_flow_ids().unwrap();
    assert_ne!(port2, port, "port should remain reserved during the grace period");

    dm.expire_put_queue(cfg.flow_del_wait_ms + 1, &factories);

    let (reclaimed_port, _) = dm.alloc_flow_ids().unwrap();
    assert_eq!(reclaimed_port, port, "port should be free once the grace period elapses");
}

/// Unbound-flow timeout (§4.3): a flow left in `Upper::NeverBound` past
/// `unbound_flow_timeout_ms` is reclaimed by the separate unbound-flow
/// reaper, distinct from the put-queue's post-deallocation grace period.
#[test]
fn unbound_flow_is_reclaimed_after_its_timeout() {
    use ripc_core::flow::{Flow, FlowConfig, Upper};

    let cfg = CoreConfig::default();
    let dm = DataModel::new(0, cfg);
    let factories = registry_with_normal();
    dm.create_ipcp("nx".into(), "d1".into(), "normal".into(), &factories)
        .unwrap();

    let (port, cep) = dm.alloc_flow_ids().unwrap();
    let uid = dm.next_flow_uid();
    let mut flow = Flow::new(
        port,
        cep,
        0,
        uid,
        FlowSpec::best_effort(),
        FlowConfig {
            max_cwq_len: cfg.max_cwq_len,
            max_rtxq_len: cfg.max_rtxq_len,
        },
        "d1".into(),
        "alice".into(),
        "bob".into(),
        true,
        0,
    );
    flow.upper = Upper::NeverBound;
    dm.insert_flow(flow);

    dm.reap_unbound_flows(cfg.unbound_flow_timeout_ms - 1, &factories);
    assert_eq!(
        dm.flow_state(port).unwrap(),
        ripc_core::flow::FlowState::Pending,
        "not yet past its deadline"
    );

    dm.reap_unbound_flows(cfg.unbound_flow_timeout_ms, &factories);
    assert_eq!(dm.flow_state(port), Err(CoreError::NotFound));
}
