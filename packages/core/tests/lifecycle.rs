//! Component lifecycle: hook slots, effect mount/cleanup discipline, and
//! unmount ordering.

use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wavedom_core::prelude::*;
use wavedom_core::FRONTEND_UPDATE_TYPE;

type Log = Rc<RefCell<Vec<String>>>;

fn update(ts: i64) -> VDomFrontendUpdate {
    VDomFrontendUpdate {
        update_type: FRONTEND_UPDATE_TYPE.to_string(),
        ts,
        blockid: "b1".to_string(),
        ..Default::default()
    }
}

fn logging_component(root: &mut VDomRoot, name: &'static str, log: Log) {
    root.register_component(name, move |scope, props| {
        let log = log.clone();
        scope.use_effect(Some(vec![]), move |_root| {
            log.borrow_mut().push(format!("{name}-mount"));
            let log = log.clone();
            Some(Box::new(move |_root: &mut VDomRoot| {
                log.borrow_mut().push(format!("{name}-cleanup"));
            }))
        });
        Some(VDomElem::new("div").children(props.children.clone()))
    });
}

#[test]
fn effect_runs_once_and_cleans_up_once_on_unmount() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut root = VDomRoot::new("b1");
    logging_component(&mut root, "leaf", log.clone());

    root.set_root_elem(VDomElem::new("div").child(VDomElem::new("leaf")));
    let _ = root.render_update(update(1));
    let _ = root.render_update(update(2));
    assert_eq!(*log.borrow(), vec!["leaf-mount".to_string()]);

    root.set_root_elem(VDomElem::new("div"));
    let _ = root.render_update(update(3));
    assert_eq!(
        *log.borrow(),
        vec!["leaf-mount".to_string(), "leaf-cleanup".to_string()]
    );

    // a later cycle does not re-run the cleanup
    let _ = root.render_update(update(4));
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn child_cleanup_runs_before_parent_cleanup() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut root = VDomRoot::new("b1");
    logging_component(&mut root, "leaf", log.clone());
    logging_component(&mut root, "holder", log.clone());

    root.set_root_elem(VDomElem::new("holder").child(VDomElem::new("leaf")));
    let _ = root.render_update(update(1));
    assert_eq!(
        *log.borrow(),
        vec!["holder-mount".to_string(), "leaf-mount".to_string()]
    );

    root.set_root_elem(VDomElem::new("div"));
    let _ = root.render_update(update(2));
    assert_eq!(
        log.borrow()[2..],
        ["leaf-cleanup".to_string(), "holder-cleanup".to_string()]
    );
}

#[test]
fn dependency_change_reruns_cleanup_then_mount() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut root = VDomRoot::new("b1");
    let log2 = log.clone();
    root.register_component("watcher", move |scope, _props| {
        let n = scope.use_atom("n");
        let log = log2.clone();
        let dep = n.clone();
        scope.use_effect(Some(vec![n]), move |_root| {
            log.borrow_mut().push(format!("mount-{dep}"));
            let log = log.clone();
            let dep = dep.clone();
            Some(Box::new(move |_root: &mut VDomRoot| {
                log.borrow_mut().push(format!("cleanup-{dep}"));
            }))
        });
        Some(VDomElem::new("div"))
    });
    root.set_root_elem(VDomElem::new("watcher"));

    let _ = root.render_update(update(1));
    root.set_atom_val("n", json!(1), true);
    let _ = root.render_update(update(2));

    assert_eq!(
        *log.borrow(),
        vec![
            "mount-null".to_string(),
            "cleanup-null".to_string(),
            "mount-1".to_string()
        ]
    );
}

#[test]
fn effect_writing_an_atom_triggers_a_second_pass() {
    let mut root = VDomRoot::new("b1");
    root.register_component("app", |scope, _props| {
        let ready = scope.use_atom("ready");
        scope.use_effect(Some(vec![]), |root| {
            root.set_atom_val("ready", json!(true), true);
            None
        });
        let label = if ready == json!(true) { "ready" } else { "loading" };
        Some(VDomElem::text(label))
    });
    root.set_root_elem(VDomElem::new("app"));

    let reply = root.render_update(update(1));

    // the committed tree reflects the post-effect state within one cycle
    let app = root.root_component().unwrap();
    let text_id = app.comp.clone().unwrap();
    assert_eq!(root.component(&text_id).unwrap().text, "ready");
    assert!(reply
        .transferelems
        .iter()
        .any(|te| te.tag == "#text" && te.text == "ready"));
    assert_eq!(reply.statesync[0].atom, "ready");
}

#[test]
fn runaway_effect_loop_is_reported_and_stopped() {
    let mut root = VDomRoot::new("b1");
    root.register_component("spinner", |scope, _props| {
        let n = scope.use_atom("n").as_i64().unwrap_or(0);
        // no deps: the effect re-runs every pass and keeps dirtying the atom
        scope.use_effect(None, move |root| {
            root.set_atom_val("n", json!(n + 1), true);
            None
        });
        Some(VDomElem::text(n.to_string()))
    });
    root.set_root_elem(VDomElem::new("spinner"));

    let reply = root.render_update(update(1));
    assert!(reply
        .messages
        .iter()
        .any(|m| m.messagetype == "error" && m.message.contains("did not settle")));
}

#[test]
fn state_hook_round_trips_through_a_handler() {
    let mut root = VDomRoot::new("b1");
    root.register_component("toggle", |scope, _props| {
        let (on, set_on) = scope.use_state(json!(false));
        let on_bool = on == json!(true);
        Some(
            VDomElem::new("div")
                .handler("onClick", move |root, _event| {
                    set_on.set(root, json!(true));
                })
                .child(VDomElem::text(if on_bool { "on" } else { "off" })),
        )
    });
    root.set_root_elem(VDomElem::new("toggle"));

    let _ = root.render_update(update(1));
    let div_id = root.root_component().unwrap().comp.clone().unwrap();
    let text_id = root.component(&div_id).unwrap().children.clone().unwrap()[0].clone();
    assert_eq!(root.component(&text_id).unwrap().text, "off");

    let mut upd = update(2);
    upd.events.push(VDomEvent {
        waveid: Some(div_id.clone()),
        eventtype: "onClick".to_string(),
        eventdata: serde_json::Value::Null,
    });
    let _ = root.render_update(upd);
    let text_id = root.component(&div_id).unwrap().children.clone().unwrap()[0].clone();
    assert_eq!(root.component(&text_id).unwrap().text, "on");
}

#[test]
fn hook_kind_mismatch_is_reported_but_render_continues() {
    let flip = Rc::new(Cell::new(false));
    let flip2 = flip.clone();
    let mut root = VDomRoot::new("b1");
    root.register_component("sneaky", move |scope, _props| {
        if flip2.get() {
            let _ = scope.use_atom("a");
        } else {
            let _ = scope.use_state(json!(0));
        }
        Some(VDomElem::new("div"))
    });
    root.set_root_elem(VDomElem::new("sneaky"));

    let first = root.render_update(update(1));
    assert!(first.messages.is_empty());

    flip.set(true);
    let second = root.render_update(update(2));
    assert!(second
        .messages
        .iter()
        .any(|m| m.message.contains("changed kind")));
    // the tree still committed
    assert!(root.root_component().is_some());
}

#[test]
fn unmounted_components_leave_the_map_and_atom_backrefs() {
    let mut root = VDomRoot::new("b1");
    root.register_component("reader", |scope, _props| {
        let _ = scope.use_atom("shared");
        Some(VDomElem::new("div"))
    });
    root.set_root_elem(VDomElem::new("div").child(VDomElem::new("reader")));
    let _ = root.render_update(update(1));

    let reader_id = root.root_component().unwrap().children.clone().unwrap()[0].clone();
    assert!(root.component(&reader_id).is_some());

    root.set_root_elem(VDomElem::new("div"));
    let _ = root.render_update(update(2));
    assert!(root.component(&reader_id).is_none());

    // a later write to the atom no longer schedules the dead component
    root.set_atom_val("shared", json!(1), true);
    let reply = root.render_update(update(3));
    assert_eq!(reply.statesync.len(), 1);
    assert!(reply.renderupdates.is_empty());
}
