//! The per-instance scheduler loop (`spec.md` §5): one cooperative
//! round over every coroutine hosted in this process, draining
//! renderer traffic and the cross-instance move buffer in between.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use purc_config::RuntimeConfig;
use purc_dom::{DomSink, Element, Fetcher, RendererMessageKind, RendererTransport};
use purc_variant::{Atom, Variant};
use tracing::{debug, trace, warn};

use crate::atom::msg_atom;
use crate::coroutine::{Coroutine, CoroutineState, ExitPhase};
use crate::error::{RuntimeError, RuntimeResult};
use crate::exception::{resolve_exception, ExceptionOutcome};
use crate::fetcher_adapter::FetcherAdapter;
use crate::message::{Message, MessageType, MoveBuffer, Target};
use crate::observer::{StageMask, StateMask};
use crate::renderer_bridge::RendererBridge;
use crate::verbs;

/// One hosting process's worth of coroutines, sharing a DOM sink, a
/// renderer connection, and a move-buffer for cross-instance traffic
/// (`spec.md` §2, §6).
pub struct Scheduler {
    config: RuntimeConfig,
    dom: Arc<dyn DomSink>,
    renderer: RendererBridge,
    move_buffer: MoveBuffer,
    fetcher: Option<FetcherAdapter>,
    coroutines: IndexMap<Atom, Coroutine>,
    next_numeric_id: u64,
    started_at: Instant,
    last_idle_broadcast_ms: Option<u64>,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig, dom: Arc<dyn DomSink>, transport: Arc<dyn RendererTransport>) -> Self {
        let capacity = config.heap.move_buffer_capacity;
        Self {
            config,
            dom,
            renderer: RendererBridge::new(transport),
            move_buffer: MoveBuffer::new(capacity),
            fetcher: None,
            coroutines: IndexMap::new(),
            next_numeric_id: 1,
            started_at: Instant::now(),
            last_idle_broadcast_ms: None,
        }
    }

    /// Attaches the URL-loading collaborator `spec.md` §4.8 names;
    /// without one, the `request` verb fails with `NotSupported`.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(FetcherAdapter::new(fetcher));
        self
    }

    /// Opens a second renderer connection to this instance
    /// (`SPEC_FULL.md` §10): until it too drops, a lost connection is
    /// reported as `rdrState:lostDuplicate` rather than `connLost`.
    pub fn add_renderer_connection(&mut self, transport: Arc<dyn RendererTransport>) {
        self.renderer.add_connection(transport);
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Creates a new root coroutine over `vdom_root` and enqueues it
    /// in the `READY` state.
    pub fn spawn(&mut self, endpoint: &str, vdom_root: Arc<Element>, parent_curator: Option<Atom>) -> Atom {
        let numeric_id = self.next_numeric_id;
        self.next_numeric_id += 1;
        let mut co = Coroutine::new(endpoint, numeric_id, vdom_root, parent_curator);
        co.root_dom = Some(self.dom.root());
        let id = co.id;
        debug!(coroutine = %id, "spawned coroutine");
        self.coroutines.insert(id, co);
        // `spec.md` §6's launch API attaches a page to every scheduled
        // coroutine; the `Response` to this request posts
        // `rdrState:pageLoaded` once it's drained (`drain_renderer`).
        let _ = self.renderer.register_window(id, Variant::Null);
        id
    }

    pub fn coroutine(&self, id: Atom) -> Option<&Coroutine> {
        self.coroutines.get(&id)
    }

    pub fn coroutine_mut(&mut self, id: Atom) -> Option<&mut Coroutine> {
        self.coroutines.get_mut(&id)
    }

    pub fn is_quiescent(&self) -> bool {
        self.coroutines.is_empty()
    }

    /// Runs ticks until every coroutine has exited or is blocked on a
    /// wait nothing in this tick can satisfy (used by tests and by a
    /// host that just wants to drive one program to completion).
    pub fn run_to_completion(&mut self, max_ticks: u64) -> RuntimeResult<()> {
        for _ in 0..max_ticks {
            let progressed = self.tick()?;
            if self.is_quiescent() {
                return Ok(());
            }
            if !progressed {
                // Nothing left to do except wait out a `sleep`; fast
                // forward rather than spin, since tests run with a
                // synthetic clock-free loop.
                continue;
            }
        }
        Ok(())
    }

    /// One scheduling round: renderer traffic, move-buffer routing,
    /// one step per ready coroutine, then message/observer dispatch
    /// and idle broadcast. Returns whether any coroutine made forward
    /// progress this round.
    pub fn tick(&mut self) -> RuntimeResult<bool> {
        let now = self.now_ms();
        self.drain_renderer(now);
        self.drain_move_buffer();
        self.drain_fetcher();

        let mut progressed = false;
        let ids: Vec<Atom> = self.coroutines.keys().copied().collect();
        for id in ids {
            if self.step_coroutine(id, now)? {
                progressed = true;
            }
        }
        self.broadcast_idle_if_due(now);
        self.reap_exited();
        Ok(progressed)
    }

    fn step_coroutine(&mut self, id: Atom, now: u64) -> RuntimeResult<bool> {
        self.dispatch_pending_messages(id);

        let Some(co) = self.coroutines.get_mut(&id) else {
            return Ok(false);
        };

        if co.state == CoroutineState::Exited {
            return Ok(false);
        }

        // Deferred observer tasks (idle broadcasts, inbox matches)
        // drain every tick regardless of an outstanding `sleep`
        // deadline — only the frame's own forward step waits on that
        // (`spec.md` §8 scenario 4: an idle observer must still fire
        // while the coroutine sleeps).
        let drained_a_task = co.drain_one_pending_task().is_some();

        if let Some(deadline) = co.stopped_deadline_ms {
            if now < deadline {
                return Ok(drained_a_task);
            }
        }

        let dom = self.dom.clone();
        let result = verbs::execute_one_step(co, dom.as_ref(), &self.renderer, now, self.fetcher.as_ref());
        let mut step_failed = false;
        match result {
            Ok(()) => {
                co.state = CoroutineState::Running;
            }
            Err(err) if err.is_again() => {
                return Ok(false);
            }
            Err(RuntimeError::NotReady(_)) => {
                co.state = CoroutineState::Stopped;
                return Ok(false);
            }
            Err(err) => {
                co.raise(&err, None);
                step_failed = true;
            }
        }

        if co.except_flag {
            match resolve_exception(co, dom.as_ref(), &self.renderer) {
                ExceptionOutcome::Terminated => co.exited_flag = true,
                // `spec.md` §8 scenario 3: a caught exception lets the
                // coroutine "proceed" rather than re-attempting the
                // same element forever — advance past the frame whose
                // step just failed.
                ExceptionOutcome::Recovered if step_failed => {
                    co.top_frame_mut().next_step = crate::frame::NextStep::OnPopping;
                }
                ExceptionOutcome::Recovered => {}
            }
        }

        if co.exited_flag && co.exit_phase == ExitPhase::NotExiting {
            co.begin_exit();
        }
        if co.exit_phase == ExitPhase::AwaitingLastMsg && co.pump_exit() {
            co.state = CoroutineState::Exited;
            self.notify_curator(id);
        }

        Ok(true)
    }

    /// Drains this coroutine's inbox, dispatching each message against
    /// its intrinsic observers inline and queuing hvml-observer matches
    /// as a deferred task (`SPEC_FULL.md` §10).
    fn dispatch_pending_messages(&mut self, id: Atom) {
        let Some(co) = self.coroutines.get_mut(&id) else {
            return;
        };
        let stage = if co.is_first_run() {
            StageMask::FIRST_RUN
        } else {
            StageMask::OBSERVING
        };
        let state = match co.state {
            CoroutineState::Ready => StateMask::READY,
            CoroutineState::Observing => StateMask::OBSERVING,
            CoroutineState::Stopped => StateMask::STOPPED,
            _ => StateMask::all_states(),
        };

        while let Some(msg) = co.inbox.get() {
            if msg.msg_type == MessageType::LastMsg {
                co.inbox.prepend(msg);
                break;
            }
            if let Some(observer_id) = co.intr_observers.find_intr_match(&msg, stage, state) {
                co.intr_observers.invoke_by_id(observer_id, &msg);
                continue;
            }
            if let Some(observer_id) = co.hvml_observers.find_hvml_match(&msg, stage, state) {
                if let Some(body) = co.observe_bodies.get(&observer_id).cloned() {
                    co.pending_tasks.push_back(crate::coroutine::ObserverTask {
                        observer_id,
                        msg: msg.clone(),
                    });
                    trace!(coroutine = %id, observer_id, tag = %body.tag, "queued hvml observer task");
                }
                continue;
            }
            // Unmatched: park it back as void priority so a later
            // registration still has a chance to see it.
            co.inbox.append(Message {
                msg_type: MessageType::Void,
                ..msg
            });
            break;
        }
    }

    fn broadcast_idle_if_due(&mut self, now: u64) {
        let timeout = self.config.scheduler.idle_event_timeout_ms;
        let due = self
            .last_idle_broadcast_ms
            .map(|last| now.saturating_sub(last) >= timeout)
            .unwrap_or(true);
        if !due {
            return;
        }
        let idle_type = msg_atom("idle", None);
        for co in self.coroutines.values_mut() {
            if co.is_idle_eligible(idle_type) {
                let identity = co.identity();
                co.inbox.append(Message::event(co.numeric_id, "idle", None, identity, Variant::Null));
            }
        }
        self.last_idle_broadcast_ms = Some(now);
    }

    /// Drains unsolicited/reply traffic from every renderer connection.
    /// A `ConnectionLost` message retires that connection and
    /// broadcasts `rdrState:lostDuplicate` (other connections remain)
    /// or `rdrState:connLost` (that was the last one) to every
    /// coroutine bound to it, per `spec.md` §4.8, then runs the
    /// reconnection re-election `SPEC_FULL.md` §10 describes.
    fn drain_renderer(&mut self, _now: u64) {
        while let Some((idx, msg)) = self.renderer.try_recv_any() {
            match msg.kind {
                RendererMessageKind::ConnectionLost => {
                    self.renderer.remove_connection(idx);
                    let remaining = self.renderer.connection_count();
                    let sub_type = if remaining > 0 { "lostDuplicate" } else { "connLost" };
                    warn!(remaining, sub_type, "renderer connection lost");
                    let bound = self.renderer.bound_coroutines();
                    for id in &bound {
                        if let Some(co) = self.coroutines.get_mut(id) {
                            let identity = co.identity();
                            co.inbox.prepend(Message::event(
                                co.numeric_id,
                                "rdrState",
                                Some(sub_type),
                                identity,
                                Variant::Null,
                            ));
                        }
                    }
                    if remaining == 0 {
                        self.renderer.elect_reconnect_leader(&bound);
                    }
                }
                RendererMessageKind::Response => {
                    let dom_handle = self.dom.root();
                    if let Some(co_id) = self.renderer.complete_pending(msg.request_id, dom_handle) {
                        if let Some(co) = self.coroutines.get_mut(&co_id) {
                            let _ = self.renderer.load(co, self.dom.as_ref());
                            let identity = co.identity();
                            co.inbox.append(Message::event(
                                co.numeric_id,
                                "rdrState",
                                Some("pageLoaded"),
                                identity,
                                Variant::Null,
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Routes every fetch that completed since the last tick into its
    /// originating coroutine's inbox (`spec.md` §5: a step never
    /// blocks on I/O, so the result always arrives as a later message).
    fn drain_fetcher(&mut self) {
        let Some(fetcher) = &self.fetcher else { return };
        for msg in fetcher.drain_completed() {
            if let Some((_, co)) = self
                .coroutines
                .iter_mut()
                .find(|(_, co)| co.numeric_id == msg.target_value)
            {
                co.inbox.append(msg);
            }
        }
    }

    fn drain_move_buffer(&mut self) {
        while let Some(msg) = self.move_buffer.take_away() {
            if msg.target != Target::Coroutine {
                continue;
            }
            if let Some((_, co)) = self
                .coroutines
                .iter_mut()
                .find(|(_, co)| co.numeric_id == msg.target_value)
            {
                co.inbox.append(msg);
            }
        }
    }

    /// Posts a cross-instance message without blocking; rejected
    /// immediately if the buffer is full (Open Question 3, `spec.md`
    /// §9 — no retry).
    pub fn post_cross_instance(&self, msg: Message) -> RuntimeResult<()> {
        self.move_buffer.post(msg)
    }

    /// `spec.md` §4.5 / §8 scenario 2: posts `callState:success` (or
    /// `callState:except`) carrying the child's result, then
    /// `corState:exited`, in that order, each exactly once.
    fn notify_curator(&mut self, child_id: Atom) {
        let Some(co) = self.coroutines.get(&child_id) else {
            return;
        };
        let Some(curator_id) = co.parent_curator else {
            return;
        };
        let numeric_id = co.numeric_id;
        let child_identity = Variant::make_string(child_id.to_string());
        let call_state = if co.terminated {
            let except_name = co
                .except
                .as_ref()
                .map(|e| e.error_except.to_string())
                .unwrap_or_default();
            (Some("except"), Variant::make_string(except_name))
        } else {
            (Some("success"), co.result.clone().unwrap_or(Variant::Null))
        };

        if let Some(curator) = self.coroutines.get_mut(&curator_id) {
            curator.inbox.append(Message {
                msg_type: MessageType::Response,
                target: Target::Coroutine,
                target_value: curator.numeric_id,
                source_uri: Arc::from(""),
                event_type: msg_atom("callState", None),
                sub_type: call_state.0.map(Arc::from),
                request_id: numeric_id,
                element_value: child_identity.clone(),
                data: call_state.1,
            });
            curator.inbox.append(Message {
                msg_type: MessageType::Response,
                target: Target::Coroutine,
                target_value: curator.numeric_id,
                source_uri: Arc::from(""),
                event_type: msg_atom("corState", None),
                sub_type: Some(Arc::from("exited")),
                request_id: numeric_id,
                element_value: child_identity,
                data: Variant::Null,
            });
        }
    }

    fn reap_exited(&mut self) {
        self.coroutines.retain(|_, co| co.state != CoroutineState::Exited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purc_dom::{vdom, InMemoryDom, LoopbackRenderer};

    fn scheduler() -> Scheduler {
        Scheduler::new(
            RuntimeConfig::default(),
            Arc::new(InMemoryDom::new()),
            Arc::new(LoopbackRenderer::new()),
        )
    }

    #[test]
    fn a_program_that_only_exits_reaches_quiescence() {
        let mut sched = scheduler();
        let root = Arc::new(vdom::parse(r#"<exit with="42"/>"#).unwrap());
        sched.spawn("main", root, None);
        sched.run_to_completion(100).unwrap();
        assert!(sched.is_quiescent());
    }

    #[test]
    fn an_uncaught_exception_still_drains_to_quiescence() {
        let mut sched = scheduler();
        let root = Arc::new(vdom::parse(r#"<body><p>hi</p></body>"#).unwrap());
        let id = sched.spawn("main", root, None);
        sched.run_to_completion(100).unwrap();
        assert!(sched.coroutine(id).is_none() || sched.is_quiescent());
    }
}
