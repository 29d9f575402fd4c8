//! The observer registry: per-coroutine interest lists keyed by
//! `(observed-value, event-type, sub-type)` (`spec.md` §3, §4.3).

use bitflags::bitflags;
use purc_variant::{Atom, Variant};
use regex::Regex;

use crate::message::Message;

bitflags! {
    /// Which run stage(s) an observer is eligible during. `spec.md`
    /// §3 names these; `SPEC_FULL.md` §10 supplements the exact
    /// matching rule (a bitwise-AND against the event's current stage,
    /// grounded on `is_match_default` in the original C scheduler).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageMask: u8 {
        const FIRST_RUN = 0b01;
        const OBSERVING = 0b10;
    }
}

bitflags! {
    /// Which coroutine state(s) an observer is eligible during.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateMask: u8 {
        const READY = 0b001;
        const OBSERVING = 0b010;
        const STOPPED = 0b100;
    }
}

impl StageMask {
    pub fn all_stages() -> Self {
        StageMask::FIRST_RUN | StageMask::OBSERVING
    }
}

impl StateMask {
    pub fn all_states() -> Self {
        StateMask::READY | StateMask::OBSERVING | StateMask::STOPPED
    }
}

/// Who created the observer: the runtime itself (`yield`-style
/// primitives) or the HVML program (`observe` elements). `spec.md`
/// §4.3 keeps these in separate lists so intrinsic observers are
/// always tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverSource {
    Intrinsic,
    Hvml,
}

/// A literal sub-type or a regex pattern over it (`spec.md` §3).
#[derive(Clone)]
pub enum SubTypePattern {
    Literal(std::sync::Arc<str>),
    Regex(Regex),
}

impl SubTypePattern {
    pub fn matches(&self, sub_type: &str) -> bool {
        match self {
            SubTypePattern::Literal(lit) => &**lit == sub_type,
            SubTypePattern::Regex(re) => re.is_match(sub_type),
        }
    }
}

impl std::fmt::Debug for SubTypePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubTypePattern::Literal(s) => write!(f, "Literal({s})"),
            SubTypePattern::Regex(re) => write!(f, "Regex({re})"),
        }
    }
}

/// What running an observer's handler against a matched message
/// decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The event was consumed; if `auto_remove` is set, revoke.
    Handled,
    /// Not actually applicable despite the default predicate matching;
    /// re-append the message for another observer to try.
    Unhandled,
}

pub type ObserverHandler = Box<dyn FnMut(&Message) -> HandleOutcome>;

/// A registered interest in `(observed, event-type, sub-type)` on one
/// coroutine (`spec.md` §3).
pub struct Observer {
    pub id: u64,
    pub source: ObserverSource,
    pub allowed_stages: StageMask,
    pub allowed_states: StateMask,
    pub observed: Variant,
    pub event_type: Atom,
    pub sub_type: Option<SubTypePattern>,
    /// Opaque vDOM position of the `observe`/`yield` element that
    /// created this observer, used only for diagnostics.
    pub scope_vdom_pos: u64,
    pub auto_remove: bool,
    pub timestamp_ms: u64,
    handler: ObserverHandler,
    on_revoke: Option<Box<dyn FnOnce()>>,
}

impl Observer {
    /// The default match predicate `spec.md` §4.3 specifies: exact
    /// event-type match, sub-type literal-or-regex match, and
    /// observed-value equivalence (native `did_matched` or structural).
    pub fn matches(&self, msg: &Message, stage: StageMask, state: StateMask) -> bool {
        if !self.allowed_stages.intersects(stage) || !self.allowed_states.intersects(state) {
            return false;
        }
        if self.event_type != msg.event_type {
            return false;
        }
        let sub_type_ok = match (&self.sub_type, &msg.sub_type) {
            (None, _) => true,
            (Some(pattern), Some(sub)) => pattern.matches(sub),
            (Some(_), None) => false,
        };
        if !sub_type_ok {
            return false;
        }
        observed_is_equivalent(&self.observed, &msg.element_value)
    }

    pub fn invoke(&mut self, msg: &Message) -> HandleOutcome {
        (self.handler)(msg)
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(on_revoke) = self.on_revoke.take() {
            on_revoke();
        }
    }
}

/// `observed_is_equivalent`: native `did_matched` in either direction,
/// else structural equality — `spec.md` §4.3.
pub fn observed_is_equivalent(observed: &Variant, candidate: &Variant) -> bool {
    observed.did_matched(candidate) || candidate.did_matched(observed) || observed == candidate
}

/// Builder for a new [`Observer`]; registered into an
/// [`ObserverRegistry`] which assigns its id.
pub struct ObserverBuilder {
    source: ObserverSource,
    allowed_stages: StageMask,
    allowed_states: StateMask,
    observed: Variant,
    event_type: Atom,
    sub_type: Option<SubTypePattern>,
    scope_vdom_pos: u64,
    auto_remove: bool,
    timestamp_ms: u64,
    handler: ObserverHandler,
    on_revoke: Option<Box<dyn FnOnce()>>,
}

impl ObserverBuilder {
    pub fn new(
        source: ObserverSource,
        observed: Variant,
        event_type: Atom,
        handler: ObserverHandler,
    ) -> Self {
        Self {
            source,
            allowed_stages: StageMask::all_stages(),
            allowed_states: StateMask::all_states(),
            observed,
            event_type,
            sub_type: None,
            scope_vdom_pos: 0,
            auto_remove: false,
            timestamp_ms: 0,
            handler,
            on_revoke: None,
        }
    }

    pub fn sub_type(mut self, pattern: SubTypePattern) -> Self {
        self.sub_type = Some(pattern);
        self
    }

    pub fn stages(mut self, mask: StageMask) -> Self {
        self.allowed_stages = mask;
        self
    }

    pub fn states(mut self, mask: StateMask) -> Self {
        self.allowed_states = mask;
        self
    }

    pub fn auto_remove(mut self, v: bool) -> Self {
        self.auto_remove = v;
        self
    }

    pub fn scope_vdom_pos(mut self, pos: u64) -> Self {
        self.scope_vdom_pos = pos;
        self
    }

    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = ts;
        self
    }

    pub fn on_revoke(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_revoke = Some(Box::new(f));
        self
    }
}

/// The two observer lists `spec.md` §4.3 gives each coroutine:
/// intrinsic (runtime-internal) and hvml (user-visible). Intrinsic
/// observers are always tried first.
#[derive(Default)]
pub struct ObserverRegistry {
    intr: Vec<Observer>,
    hvml: Vec<Observer>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builder: ObserverBuilder) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let observer = Observer {
            id,
            source: builder.source,
            allowed_stages: builder.allowed_stages,
            allowed_states: builder.allowed_states,
            observed: builder.observed,
            event_type: builder.event_type,
            sub_type: builder.sub_type,
            scope_vdom_pos: builder.scope_vdom_pos,
            auto_remove: builder.auto_remove,
            timestamp_ms: builder.timestamp_ms,
            handler: builder.handler,
            on_revoke: builder.on_revoke,
        };
        match observer.source {
            ObserverSource::Intrinsic => self.intr.push(observer),
            ObserverSource::Hvml => self.hvml.push(observer),
        }
        id
    }

    /// Revokes an observer by id, running its `on_revoke` callback (if
    /// any) as it's dropped. Returns `true` if an observer was found.
    pub fn revoke(&mut self, id: u64) -> bool {
        if let Some(pos) = self.intr.iter().position(|o| o.id == id) {
            self.intr.remove(pos);
            return true;
        }
        if let Some(pos) = self.hvml.iter().position(|o| o.id == id) {
            self.hvml.remove(pos);
            return true;
        }
        false
    }

    pub fn revoke_all(&mut self) {
        self.intr.clear();
        self.hvml.clear();
    }

    /// Finds the first matching observer (intrinsic lists before
    /// hvml lists, per `spec.md` §4.3) and runs its handler. Matched
    /// observers with `auto_remove` set are revoked afterward.
    pub fn dispatch(&mut self, msg: &Message, stage: StageMask, state: StateMask) -> HandleOutcome {
        if let Some(outcome) = Self::dispatch_list(&mut self.intr, msg, stage, state) {
            return outcome;
        }
        Self::dispatch_list(&mut self.hvml, msg, stage, state).unwrap_or(HandleOutcome::Unhandled)
    }

    fn dispatch_list(
        list: &mut Vec<Observer>,
        msg: &Message,
        stage: StageMask,
        state: StateMask,
    ) -> Option<HandleOutcome> {
        let pos = list.iter().position(|o| o.matches(msg, stage, state))?;
        let outcome = list[pos].invoke(msg);
        if list[pos].auto_remove {
            list.remove(pos);
        }
        Some(outcome)
    }

    pub fn is_empty(&self) -> bool {
        self.intr.is_empty() && self.hvml.is_empty()
    }

    pub fn intr_len(&self) -> usize {
        self.intr.len()
    }

    pub fn hvml_len(&self) -> usize {
        self.hvml.len()
    }

    /// `spec.md` §4.3: "the 'observe idle' flag ... is set exactly
    /// when at least one observer watches the coroutine's own hvml
    /// identity for the `idle` event."
    pub fn observes_idle(&self, own_identity: &Variant, idle_event_type: Atom) -> bool {
        self.hvml.iter().chain(self.intr.iter()).any(|o| {
            o.event_type == idle_event_type && observed_is_equivalent(&o.observed, own_identity)
        })
    }

    pub fn find_id_matching(&self, msg: &Message, stage: StageMask, state: StateMask) -> Option<u64> {
        self.intr
            .iter()
            .chain(self.hvml.iter())
            .find(|o| o.matches(msg, stage, state))
            .map(|o| o.id)
    }

    /// Matches against intrinsic observers only — these run their
    /// handler inline from event dispatch.
    pub fn find_intr_match(&self, msg: &Message, stage: StageMask, state: StateMask) -> Option<u64> {
        self.intr.iter().find(|o| o.matches(msg, stage, state)).map(|o| o.id)
    }

    /// Matches against hvml observers only — these are queued as a
    /// deferred task (`SPEC_FULL.md` §10) rather than invoked inline.
    pub fn find_hvml_match(&self, msg: &Message, stage: StageMask, state: StateMask) -> Option<u64> {
        self.hvml.iter().find(|o| o.matches(msg, stage, state)).map(|o| o.id)
    }

    /// Invokes a specific observer by id (found earlier via
    /// `find_intr_match`/`find_hvml_match`), revoking it afterward if
    /// `auto_remove` is set.
    pub fn invoke_by_id(&mut self, id: u64, msg: &Message) -> Option<HandleOutcome> {
        for list in [&mut self.intr, &mut self.hvml] {
            if let Some(pos) = list.iter().position(|o| o.id == id) {
                let outcome = list[pos].invoke(msg);
                if list[pos].auto_remove {
                    list.remove(pos);
                }
                return Some(outcome);
            }
        }
        None
    }
}
