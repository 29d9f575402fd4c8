//! Typed messages, the per-coroutine inbox, and the cross-instance
//! move-buffer (`spec.md` §3, §4.2).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use purc_variant::{Atom, Variant};

use crate::atom::msg_atom;
use crate::error::{RuntimeError, RuntimeResult};

/// `spec.md` §3: "type ∈ {request, response, event, void}", extended
/// by the `last-msg` sentinel type `spec.md` §6 names and the
/// two-phase drain protocol in `SPEC_FULL.md` §10 gives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageType {
    /// Lowest priority: drained only once nothing else is pending.
    Void,
    Event,
    Request,
    /// Highest priority: a coroutine always observes replies to its
    /// own outstanding requests first.
    Response,
    LastMsg,
}

/// `spec.md` §3: "target (session / workspace / window / widget / DOM
/// / instance / coroutine / user)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Session,
    Workspace,
    Window,
    Widget,
    Dom,
    Instance,
    Coroutine,
    User,
}

/// One message. Heap-allocated in spirit (it owns its payload
/// variants directly; a `Message` is moved, not shared, between
/// queues — matching `spec.md` §3's "move ownership between queues").
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: MessageType,
    pub target: Target,
    pub target_value: u64,
    pub source_uri: Arc<str>,
    pub event_type: Atom,
    pub sub_type: Option<Arc<str>>,
    pub request_id: u64,
    pub element_value: Variant,
    pub data: Variant,
}

impl Message {
    pub fn event(
        target_value: u64,
        event_type: &str,
        sub_type: Option<&str>,
        element_value: Variant,
        data: Variant,
    ) -> Self {
        Self {
            msg_type: MessageType::Event,
            target: Target::Coroutine,
            target_value,
            source_uri: Arc::from(""),
            event_type: msg_atom(event_type, None),
            sub_type: sub_type.map(Arc::from),
            request_id: 0,
            element_value,
            data,
        }
    }

    pub fn last_msg(target_value: u64) -> Self {
        Self {
            msg_type: MessageType::LastMsg,
            target: Target::Coroutine,
            target_value,
            source_uri: Arc::from(""),
            event_type: msg_atom("lastMsg", None),
            sub_type: None,
            request_id: 0,
            element_value: Variant::Null,
            data: Variant::Null,
        }
    }

    /// `"type:sub-type"`, matching `spec.md` §3's event-name shape.
    pub fn event_name(&self) -> String {
        match &self.sub_type {
            Some(sub) => format!("{}:{}", self.event_type, sub),
            None => self.event_type.to_string(),
        }
    }

    fn priority_class(&self) -> MessageType {
        self.msg_type
    }
}

/// Per-coroutine inbox. `get` preserves the priority order `spec.md`
/// §4.2 specifies: response > request > event > void (last-msg is
/// drained above all of those — it only appears once the coroutine is
/// already tearing down, per `SPEC_FULL.md` §10).
#[derive(Default)]
pub struct MsgQueue {
    last_msg: VecDeque<Message>,
    response: VecDeque<Message>,
    request: VecDeque<Message>,
    event: VecDeque<Message>,
    void: VecDeque<Message>,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_for(&mut self, class: MessageType) -> &mut VecDeque<Message> {
        match class {
            MessageType::LastMsg => &mut self.last_msg,
            MessageType::Response => &mut self.response,
            MessageType::Request => &mut self.request,
            MessageType::Event => &mut self.event,
            MessageType::Void => &mut self.void,
        }
    }

    /// `O(1)` tail insert, classified by the message's own type.
    pub fn append(&mut self, msg: Message) {
        self.queue_for(msg.priority_class()).push_back(msg);
    }

    /// Urgent re-insertion at the head of its class, e.g. an event
    /// observed-but-unmatched that must be retried first next pass.
    pub fn prepend(&mut self, msg: Message) {
        self.queue_for(msg.priority_class()).push_front(msg);
    }

    /// Takes the highest-priority pending message, if any.
    pub fn get(&mut self) -> Option<Message> {
        self.last_msg
            .pop_front()
            .or_else(|| self.response.pop_front())
            .or_else(|| self.request.pop_front())
            .or_else(|| self.event.pop_front())
            .or_else(|| self.void.pop_front())
    }

    /// Lookahead used by synchronous waits: finds (without removing)
    /// a pending event matching `request_id`/`element_value`/
    /// `event_name`, then removes and returns it.
    pub fn get_event_by_element(
        &mut self,
        request_id: u64,
        element_value: &Variant,
        event_name: &str,
    ) -> Option<Message> {
        let pos = self.event.iter().position(|m| {
            m.request_id == request_id
                && &m.element_value == element_value
                && m.event_name() == event_name
        })?;
        self.event.remove(pos)
    }

    /// Finds and removes the `Response` carrying `request_id`,
    /// wherever it sits in the response queue — used by the `request`
    /// verb to poll for its fetch's reply without disturbing other
    /// pending responses.
    pub fn take_response(&mut self, request_id: u64) -> Option<Message> {
        let pos = self.response.iter().position(|m| m.request_id == request_id)?;
        self.response.remove(pos)
    }

    pub fn is_empty(&self) -> bool {
        self.last_msg.is_empty()
            && self.response.is_empty()
            && self.request.is_empty()
            && self.event.is_empty()
            && self.void.is_empty()
    }

    pub fn len(&self) -> usize {
        self.last_msg.len() + self.response.len() + self.request.len() + self.event.len() + self.void.len()
    }
}

/// Process-wide, thread-safe FIFO used to deliver messages between
/// instances (`spec.md` §3, §6). Reading takes ownership; capacity is
/// bounded (`spec.md` §6: "default 64 slots per instance").
pub struct MoveBuffer {
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
}

impl MoveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Non-blocking send. Rejects with [`RuntimeError::MoveBufferFull`]
    /// at capacity rather than retrying (Open Question 3, `spec.md` §9).
    pub fn post(&self, msg: Message) -> RuntimeResult<()> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(RuntimeError::MoveBufferFull);
        }
        queue.push_back(msg);
        Ok(())
    }

    /// Non-blocking take; `None` if nothing is pending.
    pub fn take_away(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_prefers_response_over_request_over_event_over_void() {
        let mut q = MsgQueue::new();
        q.append(Message::event(1, "idle", None, Variant::Null, Variant::Null));
        q.append(Message {
            msg_type: MessageType::Void,
            ..Message::event(1, "void", None, Variant::Null, Variant::Null)
        });
        q.append(Message {
            msg_type: MessageType::Request,
            ..Message::event(1, "req", None, Variant::Null, Variant::Null)
        });
        q.append(Message {
            msg_type: MessageType::Response,
            ..Message::event(1, "resp", None, Variant::Null, Variant::Null)
        });

        assert_eq!(q.get().unwrap().event_type.to_string(), "resp");
        assert_eq!(q.get().unwrap().event_type.to_string(), "req");
        assert_eq!(q.get().unwrap().event_type.to_string(), "idle");
        assert_eq!(q.get().unwrap().event_type.to_string(), "void");
        assert!(q.get().is_none());
    }

    #[test]
    fn last_msg_drains_before_everything_else() {
        let mut q = MsgQueue::new();
        q.append(Message {
            msg_type: MessageType::Response,
            ..Message::event(1, "resp", None, Variant::Null, Variant::Null)
        });
        q.append(Message::last_msg(1));
        assert_eq!(q.get().unwrap().msg_type, MessageType::LastMsg);
    }

    #[test]
    fn prepend_takes_priority_within_its_own_class() {
        let mut q = MsgQueue::new();
        q.append(Message::event(1, "first", None, Variant::Null, Variant::Null));
        q.prepend(Message::event(1, "urgent", None, Variant::Null, Variant::Null));
        assert_eq!(q.get().unwrap().event_type.to_string(), "urgent");
    }

    #[test]
    fn get_event_by_element_finds_and_removes_a_matching_lookahead() {
        let mut q = MsgQueue::new();
        let target = Variant::make_string("el");
        q.append(Message::event(1, "change", None, target.clone(), Variant::Null));
        q.append(Message::event(1, "other", None, Variant::make_string("x"), Variant::Null));
        let found = q.get_event_by_element(0, &target, "change").unwrap();
        assert_eq!(found.event_name(), "change");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn move_buffer_rejects_sends_once_full_but_keeps_draining() {
        let buf = MoveBuffer::new(1);
        buf.post(Message::last_msg(1)).unwrap();
        assert!(matches!(
            buf.post(Message::last_msg(2)),
            Err(RuntimeError::MoveBufferFull)
        ));
        assert!(buf.take_away().is_some());
        assert!(buf.post(Message::last_msg(3)).is_ok());
    }
}
