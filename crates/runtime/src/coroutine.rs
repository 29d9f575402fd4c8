//! The coroutine: a call stack of frames, an inbox, a state machine,
//! and the child-result/cancellation bookkeeping a curator and the
//! scheduler both need (`spec.md` §3, §4.5).

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use purc_dom::{DomHandle, Element};
use purc_variant::{Atom, Variant};

use crate::atom::coroutine_atom;
use crate::error::RuntimeError;
use crate::frame::{Frame, NextStep};
use crate::message::{Message, MessageType, MsgQueue};
use crate::observer::{HandleOutcome, ObserverRegistry};

/// `spec.md` §4.5's coroutine state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    Ready,
    Running,
    Stopped,
    Observing,
    Exited,
}

/// `spec.md` §4.3: "Stage: FIRST-RUN until the top frame pops, then
/// OBSERVING."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStage {
    FirstRun,
    Observing,
}

/// A coroutine-level exception object (`spec.md` §4.7): the error
/// code, its mapped except-atom, the vDOM element responsible, an
/// optional info payload, and a diagnostic backtrace.
#[derive(Debug, Clone)]
pub struct Exception {
    pub error_except: Atom,
    pub responsible_element: Option<Arc<Element>>,
    pub info: Variant,
    pub backtrace: Vec<String>,
}

/// Bookkeeping for one child coroutine a curator is waiting on.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub child_id: Atom,
    pub completed: bool,
}

/// A deferred hvml-observer invocation (`SPEC_FULL.md` §10): "an event
/// matched" is decoupled from "the element tree actually re-entered
/// the matching frame" by queuing the match and draining one per tick.
pub struct ObserverTask {
    pub observer_id: u64,
    pub msg: Message,
}

/// `spec.md` §4.6: tunables that travel with a wait, not with the
/// scheduler's global configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPhase {
    NotExiting,
    /// A synthetic `lastMsg` has been posted to this coroutine's own
    /// inbox; the coroutine is not destroyed until it round-trips.
    AwaitingLastMsg,
    Done,
}

type CancelHook = Box<dyn FnMut()>;

/// One coroutine: the unit of cooperative scheduling `spec.md` §2 and
/// §4.5 describe.
pub struct Coroutine {
    pub id: Atom,
    pub numeric_id: u64,
    pub parent_curator: Option<Atom>,
    pub stack: Vec<Frame>,
    pub state: CoroutineState,
    pub stage: CoroutineStage,
    pub inbox: MsgQueue,
    pub intr_observers: ObserverRegistry,
    pub hvml_observers: ObserverRegistry,
    pub pending_tasks: VecDeque<ObserverTask>,
    pub except: Option<Exception>,
    /// `stack.except` in `spec.md` §4.7: set while an exception is
    /// being matched against `catch`/`except`, cleared on recovery.
    pub except_flag: bool,
    pub exited_flag: bool,
    pub terminated: bool,
    pub timeout_flag: bool,
    pub stopped_deadline_ms: Option<u64>,
    /// Set while a `request` verb (`spec.md` §4.8) is awaiting its
    /// fetcher response; cleared once the matching message arrives.
    pub pending_request_id: Option<u64>,
    pub cancel_hooks: Vec<CancelHook>,
    pub result: Option<Variant>,
    pub val_from_return_or_exit: Option<Variant>,
    pub children: Vec<ChildRecord>,
    pub exit_phase: ExitPhase,
    pub root_dom: Option<DomHandle>,
    /// `observe`'s reaction body, keyed by the observer id it was
    /// registered under, so a drained [`ObserverTask`] knows which
    /// element tree to push back onto the stack (`SPEC_FULL.md` §10).
    pub observe_bodies: IndexMap<u64, Arc<Element>>,
}

impl Coroutine {
    pub fn new(endpoint: &str, numeric_id: u64, vdom_root: Arc<Element>, parent_curator: Option<Atom>) -> Self {
        let id = coroutine_atom(endpoint, numeric_id);
        let root_frame = Frame::root(vdom_root, None, Variant::Null);
        Self {
            id,
            numeric_id,
            parent_curator,
            stack: vec![root_frame],
            state: CoroutineState::Ready,
            stage: CoroutineStage::FirstRun,
            inbox: MsgQueue::new(),
            intr_observers: ObserverRegistry::new(),
            hvml_observers: ObserverRegistry::new(),
            pending_tasks: VecDeque::new(),
            except: None,
            except_flag: false,
            exited_flag: false,
            terminated: false,
            timeout_flag: false,
            stopped_deadline_ms: None,
            pending_request_id: None,
            cancel_hooks: Vec::new(),
            result: None,
            val_from_return_or_exit: None,
            children: Vec::new(),
            exit_phase: ExitPhase::NotExiting,
            root_dom: None,
            observe_bodies: IndexMap::new(),
        }
    }

    pub fn identity(&self) -> Variant {
        Variant::make_string(self.id.to_string())
    }

    pub fn top_frame(&self) -> &Frame {
        self.stack.last().expect("coroutine stack is never empty while alive")
    }

    pub fn top_frame_mut(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("coroutine stack is never empty while alive")
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.stack.push(frame);
    }

    /// Pops the top frame, running its `cleanup` via the caller (the
    /// scheduler's verb dispatch owns that, since `cleanup` is
    /// tag-specific). Transitions stage to `Observing` once the root
    /// frame pops.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        let popped = self.stack.pop();
        if self.stack.is_empty() {
            self.stage = CoroutineStage::Observing;
        }
        popped
    }

    pub fn is_first_run(&self) -> bool {
        matches!(self.stage, CoroutineStage::FirstRun)
    }

    /// `notify_to_stop`: fires every registered cancel hook once, in
    /// reverse registration order (`spec.md` §4.6, §5).
    pub fn notify_to_stop(&mut self) {
        while let Some(mut hook) = self.cancel_hooks.pop() {
            hook();
        }
    }

    pub fn register_cancel_hook(&mut self, hook: CancelHook) {
        self.cancel_hooks.push(hook);
    }

    /// Raises a runtime error as this coroutine's current exception,
    /// setting `except_flag` so the scheduler's post-step check in
    /// `crate::exception` begins catch/except matching.
    pub fn raise(&mut self, err: &RuntimeError, responsible: Option<Arc<Element>>) {
        if err.is_again() {
            return;
        }
        self.except = Some(Exception {
            error_except: err.except_atom(),
            responsible_element: responsible,
            info: Variant::make_string(err.to_string()),
            backtrace: Vec::new(),
        });
        self.except_flag = true;
    }

    pub fn clear_exception(&mut self) {
        self.except = None;
        self.except_flag = false;
    }

    /// `return`/`exit`: sets the coroutine's result and marks it for
    /// EXITED processing (`spec.md` §4.7).
    pub fn set_exit_value(&mut self, value: Variant) {
        self.val_from_return_or_exit = Some(value.clone());
        self.result = Some(value);
        self.exited_flag = true;
    }

    /// Starts the two-phase drain-before-destroy protocol
    /// (`SPEC_FULL.md` §10): posts a synthetic `lastMsg` to this
    /// coroutine's own inbox.
    pub fn begin_exit(&mut self) {
        if self.exit_phase == ExitPhase::NotExiting {
            self.inbox.append(Message::last_msg(self.numeric_id));
            self.exit_phase = ExitPhase::AwaitingLastMsg;
        }
    }

    /// Drains one message from the inbox looking for the synthetic
    /// `lastMsg`; `MsgQueue::get` always returns `LastMsg`-typed
    /// messages first, so this completes on the very next call once
    /// `begin_exit` has run. Returns `true` once the protocol is done
    /// and the coroutine may actually be torn down.
    pub fn pump_exit(&mut self) -> bool {
        match self.exit_phase {
            ExitPhase::Done => true,
            ExitPhase::NotExiting => false,
            ExitPhase::AwaitingLastMsg => {
                if let Some(msg) = self.inbox.get() {
                    if msg.msg_type == MessageType::LastMsg {
                        self.exit_phase = ExitPhase::Done;
                        return true;
                    }
                    self.inbox.prepend(msg);
                }
                false
            }
        }
    }

    pub fn has_no_observers(&self) -> bool {
        self.intr_observers.is_empty() && self.hvml_observers.is_empty()
    }

    pub fn is_idle_eligible(&self, idle_event_type: Atom) -> bool {
        let identity = self.identity();
        self.intr_observers.observes_idle(&identity, idle_event_type)
            || self.hvml_observers.observes_idle(&identity, idle_event_type)
    }

    /// Drains one pending deferred observer task, if any, invoking its
    /// observer's handler and, if the observer is an `observe` element,
    /// pushing its reaction body onto the stack so the coroutine
    /// actually runs it on the next step. This is the per-tick "one
    /// task at a time" pump `SPEC_FULL.md` §10 describes.
    pub fn drain_one_pending_task(&mut self) -> Option<HandleOutcome> {
        let task = self.pending_tasks.pop_front()?;
        let outcome = self.hvml_observers.invoke_by_id(task.observer_id, &task.msg)?;
        if let Some(body) = self.observe_bodies.get(&task.observer_id).cloned() {
            let top = self.top_frame();
            let anchor = top.symbols.anchor.clone();
            let edom = top.edom_element;
            let mut frame = Frame::child(body, edom, top, anchor);
            frame.symbols.colon = Some(task.msg.data.clone());
            // Skip `after-pushed`'s tag dispatch (this element is an
            // `observe`, which would just re-register itself); jump
            // straight to running its children as the reaction.
            frame.next_step = NextStep::SelectChild;
            self.push_frame(frame);
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_coroutine() -> Coroutine {
        Coroutine::new("test", 1, Arc::new(Element::new("hvml")), None)
    }

    #[test]
    fn new_coroutine_starts_ready_with_one_root_frame() {
        let co = make_coroutine();
        assert_eq!(co.state, CoroutineState::Ready);
        assert!(co.is_first_run());
        assert_eq!(co.stack.len(), 1);
    }

    #[test]
    fn popping_the_root_frame_flips_stage_to_observing() {
        let mut co = make_coroutine();
        co.pop_frame();
        assert!(!co.is_first_run());
        assert!(co.stack.is_empty());
    }

    #[test]
    fn cancel_hooks_fire_once_each_in_reverse_order() {
        let mut co = make_coroutine();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        co.register_cancel_hook(Box::new(move || o1.lock().push(1)));
        co.register_cancel_hook(Box::new(move || o2.lock().push(2)));
        co.notify_to_stop();
        assert_eq!(*order.lock(), vec![2, 1]);
        assert!(co.cancel_hooks.is_empty());
        co.notify_to_stop();
        assert_eq!(*order.lock(), vec![2, 1]);
    }

    #[test]
    fn begin_exit_then_pump_completes_on_the_first_call() {
        let mut co = make_coroutine();
        co.begin_exit();
        assert_eq!(co.exit_phase, ExitPhase::AwaitingLastMsg);
        assert!(co.pump_exit());
        assert_eq!(co.exit_phase, ExitPhase::Done);
    }

    #[test]
    fn raise_sets_except_flag_unless_the_error_is_again() {
        let mut co = make_coroutine();
        co.raise(&RuntimeError::Again, None);
        assert!(!co.except_flag);
        co.raise(&RuntimeError::exception("BadName"), None);
        assert!(co.except_flag);
        assert_eq!(co.except.as_ref().unwrap().error_except.to_string(), "BadName");
    }
}
