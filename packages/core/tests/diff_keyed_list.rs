//! Keyed and unkeyed child diffing: identity preservation, reorders as
//! moves, and duplicate-key fallback.

use wavedom_core::prelude::*;
use wavedom_core::FRONTEND_UPDATE_TYPE;

fn update(ts: i64) -> VDomFrontendUpdate {
    VDomFrontendUpdate {
        update_type: FRONTEND_UPDATE_TYPE.to_string(),
        ts,
        blockid: "b1".to_string(),
        ..Default::default()
    }
}

fn keyed_list(keys: &[&str]) -> VDomElem {
    VDomElem::new("div").children(keys.iter().map(|k| VDomElem::new("item").key(*k)))
}

#[test]
fn keyed_reorder_preserves_waveids_and_moves_one_node() {
    let mut root = VDomRoot::new("b1");
    root.set_root_elem(keyed_list(&["a", "b", "c"]));
    let _ = root.render_update(update(1));

    let parent = root.root_component().unwrap().waveid.clone();
    let before = root.root_component().unwrap().children.clone().unwrap();
    assert_eq!(before.len(), 3);

    root.set_root_elem(keyed_list(&["c", "a", "b"]));
    let reply = root.render_update(update(2));

    let after = root.root_component().unwrap().children.clone().unwrap();
    assert_eq!(after[0], before[2]);
    assert_eq!(after[1], before[0]);
    assert_eq!(after[2], before[1]);

    // a reorder is expressed as a move, not three fresh creations
    assert_eq!(reply.renderupdates.len(), 2);
    assert_eq!(reply.renderupdates[0].updatetype, "remove");
    assert_eq!(reply.renderupdates[0].waveid.as_deref(), Some(parent.as_str()));
    assert_eq!(reply.renderupdates[0].index, Some(2));
    assert_eq!(reply.renderupdates[1].updatetype, "insert");
    assert_eq!(reply.renderupdates[1].index, Some(0));
    assert_eq!(
        reply.renderupdates[1].vdom.as_ref().unwrap().waveid,
        before[2]
    );

    // no item was recreated, so no item transfer nodes are re-sent
    assert!(!reply.transferelems.iter().any(|te| te.tag == "item"));
}

#[test]
fn removed_children_unmount_and_new_children_append() {
    let mut root = VDomRoot::new("b1");
    root.set_root_elem(keyed_list(&["a", "b"]));
    let _ = root.render_update(update(1));
    let before = root.root_component().unwrap().children.clone().unwrap();

    root.set_root_elem(keyed_list(&["b", "d"]));
    let reply = root.render_update(update(2));
    let after = root.root_component().unwrap().children.clone().unwrap();

    // b survives, a is gone, d is fresh
    assert_eq!(after[0], before[1]);
    assert_ne!(after[1], before[0]);
    assert!(root.component(&before[0]).is_none());

    let kinds: Vec<&str> = reply
        .renderupdates
        .iter()
        .map(|ru| ru.updatetype.as_str())
        .collect();
    assert_eq!(kinds, vec!["remove", "append"]);
}

#[test]
fn unkeyed_children_match_by_tag_and_slot() {
    let mut root = VDomRoot::new("b1");
    root.set_root_elem(
        VDomElem::new("div")
            .child(VDomElem::new("span"))
            .child(VDomElem::new("p")),
    );
    let _ = root.render_update(update(1));
    let before = root.root_component().unwrap().children.clone().unwrap();

    // same shape: both children keep their identity
    root.set_root_elem(
        VDomElem::new("div")
            .child(VDomElem::new("span"))
            .child(VDomElem::new("p")),
    );
    let _ = root.render_update(update(2));
    let after = root.root_component().unwrap().children.clone().unwrap();
    assert_eq!(before, after);

    // a different tag in slot 0 rebuilds that child only
    root.set_root_elem(
        VDomElem::new("div")
            .child(VDomElem::new("b"))
            .child(VDomElem::new("p")),
    );
    let _ = root.render_update(update(3));
    let rebuilt = root.root_component().unwrap().children.clone().unwrap();
    assert_ne!(rebuilt[0], after[0]);
    assert_eq!(rebuilt[1], after[1]);
}

#[test]
fn duplicate_keys_first_wins_then_index_fallback() {
    let mut root = VDomRoot::new("b1");
    root.set_root_elem(
        VDomElem::new("div")
            .child(VDomElem::new("item").key("x"))
            .child(VDomElem::new("item").key("x")),
    );
    let _ = root.render_update(update(1));
    let before = root.root_component().unwrap().children.clone().unwrap();
    assert_eq!(before.len(), 2);

    root.set_root_elem(
        VDomElem::new("div")
            .child(VDomElem::new("item").key("x"))
            .child(VDomElem::new("item").key("x")),
    );
    let _ = root.render_update(update(2));
    let after = root.root_component().unwrap().children.clone().unwrap();

    // the first duplicate claims the keyed match; the second falls back to
    // its slot and still finds its prior component
    assert_eq!(before, after);
}

#[test]
fn tag_change_at_same_key_rebuilds_the_component() {
    let mut root = VDomRoot::new("b1");
    root.set_root_elem(VDomElem::new("div").child(VDomElem::new("span").key("k")));
    let _ = root.render_update(update(1));
    let before = root.root_component().unwrap().children.clone().unwrap();

    root.set_root_elem(VDomElem::new("div").child(VDomElem::new("p").key("k")));
    let _ = root.render_update(update(2));
    let after = root.root_component().unwrap().children.clone().unwrap();

    assert_ne!(before[0], after[0]);
    assert!(root.component(&before[0]).is_none());
}
