//! Full frontend↔backend cycles through a loopback transport: scheduling
//! policy, in-flight semantics, and disposal absorption.

use async_trait::async_trait;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration as StdDuration;
use tokio::time::{sleep, Duration};
use wavedom_client::{NoopBridge, TransportError, VDomModel, VDomModelConfig, VDomTransport};
use wavedom_core::prelude::*;
use wavedom_core::event_data;

#[derive(Clone, Default)]
struct Stats {
    calls: Rc<Cell<usize>>,
    concurrent: Rc<Cell<usize>>,
    max_concurrent: Rc<Cell<usize>>,
}

struct Loopback {
    root: Rc<RefCell<VDomRoot>>,
    stats: Stats,
    delay: Duration,
}

#[async_trait(?Send)]
impl VDomTransport for Loopback {
    async fn render_update(
        &self,
        cmd: VDomFrontendUpdate,
    ) -> Result<VDomBackendUpdate, TransportError> {
        self.stats.calls.set(self.stats.calls.get() + 1);
        self.stats.concurrent.set(self.stats.concurrent.get() + 1);
        self.stats
            .max_concurrent
            .set(self.stats.max_concurrent.get().max(self.stats.concurrent.get()));
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let reply = self.root.borrow_mut().render_update(cmd);
        self.stats.concurrent.set(self.stats.concurrent.get() - 1);
        Ok(reply)
    }

    async fn wait_for_route(
        &self,
        _route: &str,
        _within: StdDuration,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

fn counter_backend() -> Rc<RefCell<VDomRoot>> {
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
    Rc::new(RefCell::new(root))
}

fn meta() -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert("vdom:route".to_string(), json!("proc:test"));
    m
}

fn mirror_texts(applier: &wavedom_client::Applier) -> Vec<String> {
    fn walk(el: &wavedom_client::ClientElem, out: &mut Vec<String>) {
        if el.tag == "#text" {
            out.push(el.text.clone());
        }
        for c in &el.children {
            walk(c, out);
        }
    }
    let mut out = Vec::new();
    if let Some(root) = applier.root() {
        walk(root, &mut out);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn counter_round_trip_updates_the_mirror() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::ZERO,
            };
            let (model, handle) =
                VDomModel::new(VDomModelConfig::new("vdom", "b1", meta()), transport).unwrap();
            let applier = model.applier();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            sleep(Duration::from_millis(50)).await;
            assert_eq!(stats.calls.get(), 1);
            assert_eq!(mirror_texts(&applier.borrow()), vec!["0".to_string()]);

            let div_id = backend.borrow().root_component().unwrap().comp.clone().unwrap();
            handle.send_event(Some(div_id), "onClick", event_data::click());

            sleep(Duration::from_millis(200)).await;
            assert_eq!(stats.calls.get(), 2);
            assert_eq!(mirror_texts(&applier.borrow()), vec!["1".to_string()]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn ten_queued_updates_produce_one_dispatch() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::ZERO,
            };
            let (model, handle) =
                VDomModel::new(VDomModelConfig::new("vdom", "b1", meta()), transport).unwrap();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            sleep(Duration::from_millis(150)).await;
            let baseline = stats.calls.get();

            for _ in 0..10 {
                handle.queue_update(false);
                sleep(Duration::from_millis(2)).await;
            }
            sleep(Duration::from_millis(500)).await;
            assert_eq!(stats.calls.get(), baseline + 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn quick_update_during_flight_merges_and_follows_up() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::from_millis(200),
            };
            let (model, handle) =
                VDomModel::new(VDomModelConfig::new("vdom", "b1", meta()), transport).unwrap();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            // the initial sync is in flight for 200ms
            sleep(Duration::from_millis(50)).await;
            assert_eq!(stats.calls.get(), 1);

            handle.queue_update(true);
            sleep(Duration::from_millis(50)).await;
            // no parallel request
            assert_eq!(stats.calls.get(), 1);

            sleep(Duration::from_millis(300)).await;
            assert_eq!(stats.calls.get(), 2);
            assert_eq!(stats.max_concurrent.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn route_gone_mid_request_discards_the_reply_and_closes_once() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::from_millis(200),
            };
            let closes = Rc::new(Cell::new(0usize));
            let closes2 = closes.clone();
            let cfg = VDomModelConfig::new("vdom", "b1", meta())
                .on_close(move || closes2.set(closes2.get() + 1));
            let (model, handle) = VDomModel::new(cfg, transport).unwrap();
            let applier = model.applier();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            // the initial request is in flight; the route dies under it
            sleep(Duration::from_millis(50)).await;
            assert_eq!(stats.calls.get(), 1);
            handle.notify_route_gone();

            sleep(Duration::from_millis(500)).await;
            // reply discarded, no further requests, closed exactly once
            assert!(applier.borrow().root().is_none());
            assert_eq!(stats.calls.get(), 1);
            assert_eq!(closes.get(), 1);

            // disposal is absorbing
            handle.queue_update(true);
            sleep(Duration::from_millis(500)).await;
            assert_eq!(stats.calls.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn persist_flag_suppresses_host_close() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::ZERO,
            };
            let mut m = meta();
            m.insert("vdom:persist".to_string(), json!(true));
            let closes = Rc::new(Cell::new(0usize));
            let closes2 = closes.clone();
            let cfg = VDomModelConfig::new("vdom", "b1", m)
                .on_close(move || closes2.set(closes2.get() + 1));
            let (model, handle) = VDomModel::new(cfg, transport).unwrap();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            sleep(Duration::from_millis(50)).await;
            handle.notify_route_gone();
            sleep(Duration::from_millis(100)).await;
            assert_eq!(closes.get(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn host_dispose_sends_a_final_dispose_update() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend = counter_backend();
            let stats = Stats::default();
            let transport = Loopback {
                root: backend.clone(),
                stats: stats.clone(),
                delay: Duration::ZERO,
            };
            let (model, handle) =
                VDomModel::new(VDomModelConfig::new("vdom", "b1", meta()), transport).unwrap();
            tokio::task::spawn_local(model.run(Box::new(NoopBridge)));

            sleep(Duration::from_millis(50)).await;
            assert!(!backend.borrow().is_disposed());

            handle.dispose();
            sleep(Duration::from_millis(50)).await;
            assert!(backend.borrow().is_disposed());
            assert_eq!(backend.borrow().component_count(), 0);
        })
        .await;
}
