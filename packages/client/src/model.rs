//! The model: one driver task per block, owning the mirror and the request
//! loop.
//!
//! Everything is single-threaded cooperative. The loop selects over the host
//! message channel, the pending-dispatch timer, and the at-most-one in-flight
//! RPC future; disposal is absorbing, and a reply that lands after disposal
//! is discarded by dropping the in-flight future.

use crate::applier::{Applier, DomBridge};
use crate::route::{RouteManager, ROUTE_WAIT_OUTER, ROUTE_WAIT_PROTO};
use crate::scheduler::{
    FireDecision, UpdateScheduler, DEFAULT_MAX_NORMAL_UPDATE_INTERVAL, DEFAULT_UPDATE_DELAY,
};
use crate::transport::{TransportError, VDomTransport};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use serde_json::Value;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use tokio::time::{sleep_until, Duration, Instant};
use wavedom_core::{
    now_ts, VDomBackendUpdate, VDomEvent, VDomFrontendUpdate, VDomRenderContext,
    FRONTEND_UPDATE_TYPE,
};

/// Model construction faults.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The block metadata carries no backend route under the expected key.
    #[error("block metadata has no route under {0:?}")]
    MissingRoute(String),
}

/// Host→model messages.
#[derive(Debug)]
pub enum ModelMsg {
    /// A captured user event; queues a normal update.
    Event {
        waveid: Option<String>,
        eventtype: String,
        eventdata: Value,
    },
    /// Explicit update request.
    QueueUpdate { quick: bool, delay: Duration },
    /// Display-surface change.
    SetContext {
        focused: bool,
        width: i32,
        height: i32,
        background: bool,
    },
    /// Backend fire-and-forget wakeup; queues a quick update.
    AsyncInitiation,
    /// The backend route is gone.
    RouteGone,
    /// Host-driven teardown.
    Dispose,
}

/// Cheap cloneable sender half used by host glue.
#[derive(Clone)]
pub struct VDomModelHandle {
    tx: UnboundedSender<ModelMsg>,
}

impl VDomModelHandle {
    /// Report a user event captured on a mounted element (or a global event
    /// with no target id).
    pub fn send_event(
        &self,
        waveid: Option<String>,
        eventtype: impl Into<String>,
        eventdata: Value,
    ) {
        let _ = self.tx.unbounded_send(ModelMsg::Event {
            waveid,
            eventtype: eventtype.into(),
            eventdata,
        });
    }

    /// Ask for a render request with the default delay.
    pub fn queue_update(&self, quick: bool) {
        self.queue_update_with_delay(quick, DEFAULT_UPDATE_DELAY);
    }

    /// Ask for a render request with an explicit delay.
    pub fn queue_update_with_delay(&self, quick: bool, delay: Duration) {
        let _ = self
            .tx
            .unbounded_send(ModelMsg::QueueUpdate { quick, delay });
    }

    /// Report display-surface changes (focus, size, background state).
    pub fn set_context(&self, focused: bool, width: i32, height: i32, background: bool) {
        let _ = self.tx.unbounded_send(ModelMsg::SetContext {
            focused,
            width,
            height,
            background,
        });
    }

    /// Deliver a backend `vdomasyncinitiation` notice.
    pub fn notify_async_initiation(&self) {
        let _ = self.tx.unbounded_send(ModelMsg::AsyncInitiation);
    }

    /// Deliver the scoped `route:gone` lifecycle event.
    pub fn notify_route_gone(&self) {
        let _ = self.tx.unbounded_send(ModelMsg::RouteGone);
    }

    /// Tear the model down from the host side.
    pub fn dispose(&self) {
        let _ = self.tx.unbounded_send(ModelMsg::Dispose);
    }
}

/// Construction parameters for a model.
pub struct VDomModelConfig {
    pub view: String,
    pub blockid: String,
    pub meta: serde_json::Map<String, Value>,
    pub max_normal_update_interval: Duration,
    pub default_delay: Duration,
    /// Invoked (at most once) when route loss should close the host surface.
    pub on_close: Option<Box<dyn Fn()>>,
}

impl VDomModelConfig {
    pub fn new(
        view: impl Into<String>,
        blockid: impl Into<String>,
        meta: serde_json::Map<String, Value>,
    ) -> Self {
        VDomModelConfig {
            view: view.into(),
            blockid: blockid.into(),
            meta,
            max_normal_update_interval: DEFAULT_MAX_NORMAL_UPDATE_INTERVAL,
            default_delay: DEFAULT_UPDATE_DELAY,
            on_close: None,
        }
    }

    pub fn on_close(mut self, f: impl Fn() + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }
}

enum Action {
    None,
    Dispose,
    RouteGone,
}

enum RouteOutcome {
    Confirmed,
    Lost,
    Disposed,
}

type InFlight = Pin<Box<dyn Future<Output = Result<VDomBackendUpdate, TransportError>>>>;

/// One block's frontend model.
pub struct VDomModel<T: VDomTransport + 'static> {
    transport: Rc<T>,
    applier: Rc<RefCell<Applier>>,
    scheduler: UpdateScheduler,
    route: RouteManager,
    rx: UnboundedReceiver<ModelMsg>,
    pending_events: Vec<VDomEvent>,
    context: VDomRenderContext,
    blockid: String,
    rootrefid: String,
    default_delay: Duration,
    resync_needed: bool,
    on_close: Option<Box<dyn Fn()>>,
    close_notified: bool,
}

impl<T: VDomTransport + 'static> VDomModel<T> {
    /// Build a model and its handle. Fails when the block metadata names no
    /// backend route.
    pub fn new(cfg: VDomModelConfig, transport: T) -> Result<(Self, VDomModelHandle), ModelError> {
        let route = RouteManager::from_meta(&cfg.view, &cfg.meta)?;
        let (tx, rx) = unbounded();
        let rootrefid = format!("ref-root-{}", uuid::Uuid::new_v4());
        let context = VDomRenderContext {
            blockid: cfg.blockid.clone(),
            rootrefid: rootrefid.clone(),
            ..Default::default()
        };
        let model = VDomModel {
            transport: Rc::new(transport),
            applier: Rc::new(RefCell::new(Applier::new(
                cfg.blockid.clone(),
                rootrefid.clone(),
            ))),
            scheduler: UpdateScheduler::new(cfg.max_normal_update_interval),
            route,
            rx,
            pending_events: Vec::new(),
            context,
            blockid: cfg.blockid,
            rootrefid,
            default_delay: cfg.default_delay,
            resync_needed: true,
            on_close: cfg.on_close,
            close_notified: false,
        };
        Ok((model, VDomModelHandle { tx }))
    }

    /// Shared handle to the mirror state, for the rendering layer. Grab it
    /// before [`run`](Self::run).
    pub fn applier(&self) -> Rc<RefCell<Applier>> {
        self.applier.clone()
    }

    /// Drive the model until disposal.
    pub async fn run(mut self, mut bridge: Box<dyn DomBridge>) {
        match self.confirm_route().await {
            RouteOutcome::Confirmed => {}
            RouteOutcome::Lost => {
                // never confirmed, or gone while resolving: fatal for the model
                self.route.mark_gone();
                self.scheduler.dispose();
                self.notify_close();
                return;
            }
            RouteOutcome::Disposed => {
                self.scheduler.dispose();
                return;
            }
        }
        self.route.confirm();
        self.scheduler.route_confirmed = true;
        self.scheduler
            .queue_update(Instant::now(), true, Duration::ZERO);

        let mut in_flight: Option<InFlight> = None;

        loop {
            let deadline = self.scheduler.next_deadline();
            let sleep_to = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let action = tokio::select! {
                biased;
                msg = self.rx.next() => match msg {
                    Some(msg) => self.handle_msg(msg),
                    None => Action::Dispose,
                },
                res = async { in_flight.as_mut().expect("in-flight guard").await },
                        if in_flight.is_some() => {
                    in_flight = None;
                    self.on_reply(res, bridge.as_mut());
                    Action::None
                }
                _ = sleep_until(sleep_to), if deadline.is_some() => {
                    if self.scheduler.on_fire() == FireDecision::Dispatch {
                        let payload = self.build_payload(false, bridge.as_mut());
                        let transport = self.transport.clone();
                        in_flight = Some(Box::pin(async move {
                            transport.render_update(payload).await
                        }));
                    }
                    Action::None
                }
            };

            match action {
                Action::None => {}
                Action::Dispose => {
                    // cancel anything outstanding, tell the backend, stop
                    in_flight = None;
                    self.scheduler.dispose();
                    let payload = self.build_payload(true, bridge.as_mut());
                    if let Err(err) = self.transport.render_update(payload).await {
                        tracing::debug!(blockid = %self.blockid, "dispose notice failed: {err}");
                    }
                    return;
                }
                Action::RouteGone => {
                    // outstanding replies are discarded; no further requests
                    in_flight = None;
                    self.route.mark_gone();
                    self.scheduler.dispose();
                    self.notify_close();
                    return;
                }
            }
        }
    }

    async fn confirm_route(&mut self) -> RouteOutcome {
        let transport = self.transport.clone();
        let route = self.route.route().to_string();
        let mut wait = Box::pin(tokio::time::timeout(ROUTE_WAIT_OUTER, async move {
            transport.wait_for_route(&route, ROUTE_WAIT_PROTO).await
        }));
        loop {
            tokio::select! {
                biased;
                msg = self.rx.next() => match msg {
                    Some(ModelMsg::RouteGone) => return RouteOutcome::Lost,
                    Some(ModelMsg::Dispose) | None => return RouteOutcome::Disposed,
                    Some(other) => {
                        let _ = self.handle_msg(other);
                    }
                },
                res = &mut wait => {
                    return match res {
                        Ok(Ok(())) => RouteOutcome::Confirmed,
                        _ => RouteOutcome::Lost,
                    };
                }
            }
        }
    }

    fn handle_msg(&mut self, msg: ModelMsg) -> Action {
        match msg {
            ModelMsg::Event {
                waveid,
                eventtype,
                eventdata,
            } => {
                if !self.scheduler.is_disposed() {
                    self.pending_events.push(VDomEvent {
                        waveid,
                        eventtype,
                        eventdata,
                    });
                    self.scheduler
                        .queue_update(Instant::now(), false, self.default_delay);
                }
                Action::None
            }
            ModelMsg::QueueUpdate { quick, delay } => {
                self.scheduler.queue_update(Instant::now(), quick, delay);
                Action::None
            }
            ModelMsg::SetContext {
                focused,
                width,
                height,
                background,
            } => {
                self.context.focused = focused;
                self.context.width = width;
                self.context.height = height;
                self.context.background = background;
                self.scheduler
                    .queue_update(Instant::now(), false, self.default_delay);
                Action::None
            }
            ModelMsg::AsyncInitiation => {
                self.scheduler
                    .queue_update(Instant::now(), true, Duration::ZERO);
                Action::None
            }
            ModelMsg::RouteGone => Action::RouteGone,
            ModelMsg::Dispose => Action::Dispose,
        }
    }

    fn on_reply(
        &mut self,
        res: Result<VDomBackendUpdate, TransportError>,
        bridge: &mut dyn DomBridge,
    ) {
        match res {
            Ok(update) => {
                self.applier.borrow_mut().apply(&update, bridge);
                self.resync_needed = false;
            }
            Err(err) => {
                tracing::error!(blockid = %self.blockid, "render update failed: {err}");
            }
        }
        if self.scheduler.on_complete(Instant::now()) {
            self.scheduler
                .queue_update(Instant::now(), true, Duration::ZERO);
        }
    }

    fn build_payload(&mut self, dispose: bool, bridge: &mut dyn DomBridge) -> VDomFrontendUpdate {
        let mut rendercontext = self.context.clone();
        rendercontext.blockid = self.blockid.clone();
        rendercontext.rootrefid = self.rootrefid.clone();
        VDomFrontendUpdate {
            update_type: FRONTEND_UPDATE_TYPE.to_string(),
            ts: now_ts(),
            blockid: self.blockid.clone(),
            rendercontext,
            dispose,
            resync: self.resync_needed && !dispose,
            events: std::mem::take(&mut self.pending_events),
            refupdates: self.applier.borrow_mut().take_ref_updates(bridge),
        }
    }

    fn notify_close(&mut self) {
        if self.route.persist() || self.close_notified {
            return;
        }
        self.close_notified = true;
        if let Some(close) = &self.on_close {
            close();
        }
    }
}
