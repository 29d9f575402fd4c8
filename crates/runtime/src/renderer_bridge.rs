//! Bridges coroutines to the renderer connection: page/window binding
//! bookkeeping, and the connection-loss/reconnection protocol
//! `SPEC_FULL.md` §10 supplements the core spec with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use purc_dom::{DomHandle, DomSink, RendererMessage, RendererMessageKind, RendererTransport};
use purc_variant::{Atom, Variant};

use crate::coroutine::Coroutine;
use crate::error::RuntimeResult;

/// One coroutine's registration against the renderer: the window/
/// widget handle the renderer assigned it, and the request id that
/// created it (used to recognize the matching response).
#[derive(Debug, Clone)]
pub struct RendererConnBinding {
    pub coroutine_id: Atom,
    pub dom_handle: DomHandle,
    pub create_request_id: u64,
}

/// Owns every renderer connection this instance has open and the set
/// of coroutines currently bound to windows/widgets over them. More
/// than one connection can be live at once (`SPEC_FULL.md` §10); that
/// is what lets a dropped connection be told apart from the instance's
/// last one going away.
pub struct RendererBridge {
    connections: Vec<Arc<dyn RendererTransport>>,
    bindings: Vec<RendererConnBinding>,
    /// Requests sent via `register_window` awaiting their `Response`,
    /// keyed by request id so the scheduler can tell which coroutine
    /// a reply completes (`spec.md` §4.8's `register` operation).
    pending_registrations: IndexMap<u64, Atom>,
    next_request_id: AtomicU64,
    /// The coroutine chosen to re-create windows after a reconnection,
    /// per `SPEC_FULL.md` §10's re-election rule: the longest-bound
    /// surviving coroutine leads.
    reconnect_leader: Option<Atom>,
}

impl RendererBridge {
    pub fn new(transport: Arc<dyn RendererTransport>) -> Self {
        Self {
            connections: vec![transport],
            bindings: Vec::new(),
            pending_registrations: IndexMap::new(),
            next_request_id: AtomicU64::new(1),
            reconnect_leader: None,
        }
    }

    fn fresh_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Opens a second (or further) connection to this instance. Used
    /// by a host that accepts more than one renderer at once, and by
    /// tests exercising the `lostDuplicate` half of `spec.md` §8
    /// scenario 5.
    pub fn add_connection(&mut self, transport: Arc<dyn RendererTransport>) {
        self.connections.push(transport);
    }

    /// How many renderer connections are currently open. `drain_renderer`
    /// consults this after retiring a dead one to decide between
    /// `rdrState:lostDuplicate` (others remain) and `rdrState:connLost`
    /// (none do), per `spec.md` §4.8.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Retires the connection at `index` (its `ConnectionLost` has
    /// already been drained).
    pub fn remove_connection(&mut self, index: usize) {
        if index < self.connections.len() {
            self.connections.remove(index);
        }
    }

    /// Polls every open connection for unsolicited/reply traffic,
    /// returning the first one found along with the index of the
    /// connection it arrived on.
    pub fn try_recv_any(&self) -> Option<(usize, RendererMessage)> {
        for (idx, conn) in self.connections.iter().enumerate() {
            if let Some(msg) = conn.try_recv() {
                return Some((idx, msg));
            }
        }
        None
    }

    /// Registers a new plain window for `coroutine_id`, returning the
    /// request id whose `Response` will carry the assigned handle.
    pub fn register_window(&mut self, coroutine_id: Atom, payload: Variant) -> RuntimeResult<u64> {
        let request_id = self.fresh_request_id();
        if let Some(leader) = self.connections.first() {
            leader.post(RendererMessage::request(
                RendererMessageKind::CreatePlainWindow,
                request_id,
                payload,
            ))?;
        }
        self.pending_registrations.insert(request_id, coroutine_id);
        if self.reconnect_leader.is_none() {
            self.reconnect_leader = Some(coroutine_id);
        }
        Ok(request_id)
    }

    /// Completes a pending `register_window` once the renderer's
    /// response names the assigned handle.
    pub fn complete_registration(&mut self, coroutine_id: Atom, request_id: u64, dom_handle: DomHandle) {
        self.bindings.push(RendererConnBinding {
            coroutine_id,
            dom_handle,
            create_request_id: request_id,
        });
    }

    /// Resolves a `Response` message against the pending registration
    /// it answers, binding the coroutine to `dom_handle` and returning
    /// its id so the caller can post `rdrState:pageLoaded`. `None` if
    /// `request_id` doesn't match an outstanding registration (e.g. a
    /// `Load`/`Revoke` response, which carries no further bookkeeping).
    pub fn complete_pending(&mut self, request_id: u64, dom_handle: DomHandle) -> Option<Atom> {
        let coroutine_id = self.pending_registrations.shift_remove(&request_id)?;
        self.complete_registration(coroutine_id, request_id, dom_handle);
        Some(coroutine_id)
    }

    pub fn revoke(&mut self, coroutine_id: Atom) -> RuntimeResult<()> {
        self.bindings.retain(|b| b.coroutine_id != coroutine_id);
        if self.reconnect_leader == Some(coroutine_id) {
            self.reconnect_leader = self.bindings.first().map(|b| b.coroutine_id);
        }
        if let Some(leader) = self.connections.first() {
            leader.post(RendererMessage::request(
                RendererMessageKind::Revoke,
                self.fresh_request_id(),
                Variant::Null,
            ))?;
        }
        Ok(())
    }

    pub fn bound_coroutines(&self) -> Vec<Atom> {
        self.bindings.iter().map(|b| b.coroutine_id).collect()
    }

    /// After a connection loss, the surviving binding that was
    /// registered first re-issues the window/widget creation requests
    /// once the transport reconnects (`SPEC_FULL.md` §10). Returns the
    /// elected leader, if any binding survives.
    pub fn elect_reconnect_leader(&mut self, bound: &[Atom]) -> Option<Atom> {
        self.reconnect_leader = bound.first().copied();
        self.reconnect_leader
    }

    /// Serializes the document and posts a `Load` message to every
    /// open connection, tagged with `handle` — the mutation-sync half
    /// of `spec.md` §4.8's "translates each mutation into a renderer
    /// protocol message tagged with the DOM handle".
    fn sync_handle(&self, dom: &dyn DomSink, handle: DomHandle) -> purc_dom::DomResult<()> {
        let document = dom.serialize(dom.root())?;
        for conn in &self.connections {
            conn.post(RendererMessage {
                kind: RendererMessageKind::Load,
                request_id: self.fresh_request_id(),
                dom_handle: Some(handle),
                payload: Variant::make_string(document.clone()),
            })?;
        }
        Ok(())
    }

    /// `spec.md` §4.8's `load(co, connection)` operation: sends the
    /// coroutine's whole serialized DOM to every connected renderer.
    pub fn load(&self, co: &Coroutine, dom: &dyn DomSink) -> purc_dom::DomResult<()> {
        let Some(handle) = co.root_dom else {
            return Ok(());
        };
        self.sync_handle(dom, handle)
    }

    /// Appends a child under `parent` and pushes the refreshed DOM to
    /// every renderer connection, so a verb never mutates the page
    /// behind the bridge's back.
    pub fn append_child(&self, dom: &dyn DomSink, parent: DomHandle, tag: &str) -> purc_dom::DomResult<DomHandle> {
        let handle = dom.append_child(parent, tag)?;
        let _ = self.sync_handle(dom, handle);
        Ok(handle)
    }

    /// Appends content to `handle` and pushes the refreshed DOM to
    /// every renderer connection.
    pub fn append_content(&self, dom: &dyn DomSink, handle: DomHandle, text: &str) -> purc_dom::DomResult<()> {
        dom.append_content(handle, text)?;
        let _ = self.sync_handle(dom, handle);
        Ok(())
    }
}
