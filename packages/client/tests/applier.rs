//! Applier behavior against payloads produced by a real backend root.

use serde_json::json;
use wavedom_core::prelude::*;
use wavedom_core::{event_data, VDomRenderUpdate, FRONTEND_UPDATE_TYPE};
use wavedom_client::{Applier, ClientElem, DomBridge, NoopBridge};

fn update(ts: i64) -> VDomFrontendUpdate {
    VDomFrontendUpdate {
        update_type: FRONTEND_UPDATE_TYPE.to_string(),
        ts,
        blockid: "b1".to_string(),
        ..Default::default()
    }
}

fn counter_root() -> VDomRoot {
    let mut root = VDomRoot::new("b1");
    root.register_component("counter", |scope, _props| {
        let n = scope.use_atom("n").as_i64().unwrap_or(0);
        Some(
            VDomElem::new("div")
                .handler("onClick", |root, _event| {
                    let n = root.get_atom_val("n").as_i64().unwrap_or(0);
                    root.set_atom_val("n", json!(n + 1), true);
                })
                .child(VDomElem::text(n.to_string())),
        )
    });
    root.set_root_elem(VDomElem::new("counter"));
    root
}

fn text_of(elem: &ClientElem) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(el: &ClientElem, out: &mut Vec<String>) {
        if el.tag == "#text" {
            out.push(el.text.clone());
        }
        for c in &el.children {
            walk(c, out);
        }
    }
    walk(elem, &mut out);
    out
}

#[test]
fn root_update_materializes_the_mirror() {
    let mut backend = counter_root();
    let reply = backend.render_update(update(1));

    let mut applier = Applier::new("b1", "ref-root");
    applier.apply(&reply, &mut NoopBridge);

    let root = applier.root().expect("mirror root");
    assert_eq!(root.waveid, reply.renderupdates[0].vdom.as_ref().unwrap().waveid);
    assert_eq!(root.tag, "counter");
    assert_eq!(text_of(root), vec!["0".to_string()]);
}

#[test]
fn child_replace_mutates_in_place_and_bumps_the_parent() {
    let mut backend = counter_root();
    let first = backend.render_update(update(1));
    let mut applier = Applier::new("b1", "ref-root");
    applier.apply(&first, &mut NoopBridge);

    let div_id = backend.root_component().unwrap().comp.clone().unwrap();
    let div_version = applier.version(&div_id).unwrap();

    let mut upd = update(2);
    upd.events.push(VDomEvent {
        waveid: Some(div_id.clone()),
        eventtype: "onClick".to_string(),
        eventdata: event_data::click(),
    });
    let second = backend.render_update(upd);
    applier.apply(&second, &mut NoopBridge);

    let root = applier.root().unwrap();
    assert_eq!(text_of(root), vec!["1".to_string()]);
    assert!(applier.version(&div_id).unwrap() > div_version);
    assert_eq!(applier.atom_val("n"), json!(1));
}

#[test]
fn keyed_reorder_round_trips_through_sparse_updates() {
    let mut backend = VDomRoot::new("b1");
    backend.set_root_elem(
        VDomElem::new("div").children(
            ["a", "b", "c"]
                .iter()
                .map(|k| VDomElem::new("item").key(*k).child(VDomElem::text(*k))),
        ),
    );
    let first = backend.render_update(update(1));
    let mut applier = Applier::new("b1", "ref-root");
    applier.apply(&first, &mut NoopBridge);
    assert_eq!(text_of(applier.root().unwrap()), vec!["a", "b", "c"]);

    backend.set_root_elem(
        VDomElem::new("div").children(
            ["c", "a", "b"]
                .iter()
                .map(|k| VDomElem::new("item").key(*k).child(VDomElem::text(*k))),
        ),
    );
    let second = backend.render_update(update(2));
    applier.apply(&second, &mut NoopBridge);
    assert_eq!(text_of(applier.root().unwrap()), vec!["c", "a", "b"]);
}

#[test]
fn state_sync_bumps_binding_consumers() {
    let mut backend = VDomRoot::new("b1");
    backend.set_root_elem(
        VDomElem::new("div").child(VDomElem::new("wave:text").bind("text", "msg")),
    );
    backend.set_atom_val("msg", json!("hello"), true);
    let first = backend.render_update(update(1));

    let mut applier = Applier::new("b1", "ref-root");
    applier.apply(&first, &mut NoopBridge);

    let wt_id = {
        let root = applier.root().unwrap();
        root.children[0].waveid.clone()
    };
    let v0 = applier.version(&wt_id).unwrap();
    let wt = applier.elem(&wt_id).unwrap();
    assert_eq!(applier.resolved_prop(wt, "text"), Some(json!("hello")));

    backend.set_atom_val("msg", json!("world"), true);
    let second = backend.render_update(update(2));
    applier.apply(&second, &mut NoopBridge);

    assert!(applier.version(&wt_id).unwrap() > v0);
    let wt = applier.elem(&wt_id).unwrap();
    assert_eq!(applier.resolved_prop(wt, "text"), Some(json!("world")));
}

#[test]
fn protocol_errors_skip_without_disturbing_the_tree() {
    let mut backend = counter_root();
    let mut reply = backend.render_update(update(1));

    // malformed trailing updates: unknown type, unknown parent, bad index
    reply.renderupdates.push(VDomRenderUpdate {
        updatetype: "explode".to_string(),
        ..Default::default()
    });
    reply.renderupdates.push(VDomRenderUpdate {
        updatetype: "remove".to_string(),
        waveid: Some("missing-parent".to_string()),
        index: Some(0),
        ..Default::default()
    });

    let mut applier = Applier::new("b1", "ref-root");
    applier.apply(&reply, &mut NoopBridge);
    assert_eq!(text_of(applier.root().unwrap()), vec!["0".to_string()]);
}

#[test]
fn focus_ref_operation_reaches_the_bridge() {
    #[derive(Default)]
    struct RecordingBridge {
        focused: Vec<Option<String>>,
    }
    impl DomBridge for RecordingBridge {
        fn focus(&mut self, elem: Option<&ClientElem>) {
            self.focused.push(elem.map(|e| e.waveid.clone()));
        }
    }

    let mut backend = VDomRoot::new("b1");
    backend.register_component("input", |scope, _props| {
        let r = scope.use_vdom_ref(false);
        let refid = r.refid.clone();
        scope.use_effect(Some(vec![]), move |root| {
            root.focus_ref(refid.clone());
            None
        });
        Some(VDomElem::new("textarea").vref(&r))
    });
    backend.set_root_elem(VDomElem::new("input"));
    let reply = backend.render_update(update(1));
    assert_eq!(reply.refoperations.len(), 1);
    assert_eq!(reply.refoperations[0].op, "focus");

    let mut applier = Applier::new("b1", "ref-root");
    let mut bridge = RecordingBridge::default();
    applier.apply(&reply, &mut bridge);

    let textarea_id = backend.root_component().unwrap().comp.clone().unwrap();
    assert_eq!(bridge.focused, vec![Some(textarea_id)]);

    // the mounted ref reports hascurrent on the next payload
    let refupdates = applier.take_ref_updates(&mut bridge);
    assert_eq!(refupdates.len(), 1);
    assert!(refupdates[0].hascurrent);

    // and only once
    assert!(applier.take_ref_updates(&mut bridge).is_empty());
}

#[test]
fn synthetic_root_ref_focus_passes_none() {
    let mut backend = VDomRoot::new("b1");
    backend.set_root_elem(VDomElem::new("div"));
    backend.focus_ref("ref-root");
    let reply = backend.render_update(update(1));

    #[derive(Default)]
    struct RecordingBridge {
        root_focus: usize,
    }
    impl DomBridge for RecordingBridge {
        fn focus(&mut self, elem: Option<&ClientElem>) {
            if elem.is_none() {
                self.root_focus += 1;
            }
        }
    }

    let mut applier = Applier::new("b1", "ref-root");
    let mut bridge = RecordingBridge::default();
    applier.apply(&reply, &mut bridge);
    assert_eq!(bridge.root_focus, 1);
}
