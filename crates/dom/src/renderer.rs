//! The renderer wire protocol (`pcrdr`), modeled as a bidirectional
//! message channel — `spec.md` §1 scopes the actual wire encoding out
//! as a black-box collaborator.

use std::collections::VecDeque;

use parking_lot::Mutex;
use purc_variant::Variant;

use crate::dom::DomHandle;
use crate::error::DomResult;

/// What a renderer request asks for, or what an unsolicited message
/// from the renderer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererMessageKind {
    CreatePlainWindow,
    CreateWidget,
    Load,
    Revoke,
    /// A reply to an earlier request, carrying its `request_id`.
    Response,
    /// The renderer end of the connection went away.
    ConnectionLost,
}

/// One message crossing the renderer connection in either direction.
#[derive(Debug, Clone)]
pub struct RendererMessage {
    pub kind: RendererMessageKind,
    pub request_id: u64,
    pub dom_handle: Option<DomHandle>,
    pub payload: Variant,
}

impl RendererMessage {
    pub fn request(kind: RendererMessageKind, request_id: u64, payload: Variant) -> Self {
        Self {
            kind,
            request_id,
            dom_handle: None,
            payload,
        }
    }

    pub fn response(request_id: u64, payload: Variant) -> Self {
        Self {
            kind: RendererMessageKind::Response,
            request_id,
            dom_handle: None,
            payload,
        }
    }

    pub fn connection_lost() -> Self {
        Self {
            kind: RendererMessageKind::ConnectionLost,
            request_id: 0,
            dom_handle: None,
            payload: Variant::Null,
        }
    }
}

/// A non-blocking, bidirectional channel to a renderer process.
///
/// Sends are fire-and-forget (`post`); replies and unsolicited
/// messages are drained with `try_recv` on the scheduler's own tick,
/// never awaited inline from a step — per `spec.md` §5, no step may
/// block on I/O.
pub trait RendererTransport: Send + Sync {
    fn post(&self, message: RendererMessage) -> DomResult<()>;
    fn try_recv(&self) -> Option<RendererMessage>;
    fn is_connected(&self) -> bool;
    fn close(&self);
}

/// An in-process renderer stub: every request is immediately answered
/// with a synthesized success response carrying a freshly allocated
/// DOM handle. Used by tests and by a hosting instance with no real
/// renderer attached.
pub struct LoopbackRenderer {
    inbound: Mutex<VecDeque<RendererMessage>>,
    connected: std::sync::atomic::AtomicBool,
}

impl Default for LoopbackRenderer {
    fn default() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            connected: std::sync::atomic::AtomicBool::new(true),
        }
    }
}

impl LoopbackRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/host hook: simulates the renderer process disappearing.
    pub fn simulate_disconnect(&self) {
        self.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.inbound.lock().push_back(RendererMessage::connection_lost());
    }
}

impl RendererTransport for LoopbackRenderer {
    fn post(&self, message: RendererMessage) -> DomResult<()> {
        if !self.is_connected() {
            return Err(crate::error::DomError::ConnectionClosed);
        }
        match message.kind {
            RendererMessageKind::CreatePlainWindow | RendererMessageKind::CreateWidget => {
                self.inbound
                    .lock()
                    .push_back(RendererMessage::response(message.request_id, Variant::Null));
            }
            RendererMessageKind::Load | RendererMessageKind::Revoke => {
                self.inbound
                    .lock()
                    .push_back(RendererMessage::response(message.request_id, Variant::Null));
            }
            RendererMessageKind::Response | RendererMessageKind::ConnectionLost => {}
        }
        Ok(())
    }

    fn try_recv(&self) -> Option<RendererMessage> {
        self.inbound.lock().pop_front()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_answers_create_plain_window_with_a_response() {
        let renderer = LoopbackRenderer::new();
        renderer
            .post(RendererMessage::request(
                RendererMessageKind::CreatePlainWindow,
                7,
                Variant::Null,
            ))
            .unwrap();
        let reply = renderer.try_recv().unwrap();
        assert_eq!(reply.kind, RendererMessageKind::Response);
        assert_eq!(reply.request_id, 7);
    }

    #[test]
    fn disconnect_surfaces_connection_lost_then_rejects_posts() {
        let renderer = LoopbackRenderer::new();
        renderer.simulate_disconnect();
        assert!(!renderer.is_connected());
        let msg = renderer.try_recv().unwrap();
        assert_eq!(msg.kind, RendererMessageKind::ConnectionLost);
        assert!(renderer
            .post(RendererMessage::request(
                RendererMessageKind::Load,
                1,
                Variant::Null
            ))
            .is_err());
    }
}
