//! Built-in element ("verb") dispatch.
//!
//! `spec.md` §4.4 describes a per-tag operation table (`after-pushed`,
//! `select-child`, `on-popping`, `content`, `cleanup`). A `match` over
//! tag names plays that table here rather than a `dyn` vtable per
//! element: `spec.md` §9's design notes call an explicit state machine
//! a valid modern substitute for the original's per-tag function
//! pointers, and a flat match keeps the borrow shape of one step
//! (frame + coroutine + dom all mutably touched together) tractable.

use std::sync::Arc;

use purc_dom::{DomSink, Element};
use purc_variant::Variant;

use crate::atom::msg_atom;
use crate::coroutine::Coroutine;
use crate::error::{RuntimeError, RuntimeResult};
use crate::fetcher_adapter::FetcherAdapter;
use crate::frame::{stringify_for_dom, Frame, NextStep};
use crate::observer::{ObserverBuilder, ObserverSource, StageMask, StateMask, SubTypePattern};
use crate::renderer_bridge::RendererBridge;

/// Runs one step of the current top frame. Mutates `co`'s stack
/// directly; DOM mutations go through `renderer` so a connected
/// renderer stays in sync (`spec.md` §4.8). The caller
/// (`crate::scheduler`) decides what to do next based on the
/// coroutine's resulting state (`exited_flag`, `except_flag`, an unmet
/// `sleep`/`observe` wait, ...).
pub fn execute_one_step(
    co: &mut Coroutine,
    dom: &dyn DomSink,
    renderer: &RendererBridge,
    now_ms: u64,
    fetcher: Option<&FetcherAdapter>,
) -> RuntimeResult<()> {
    let next_step = co.top_frame().next_step;
    match next_step {
        NextStep::AfterPushed => after_pushed(co, dom, renderer, now_ms, fetcher),
        NextStep::SelectChild => select_child(co),
        NextStep::OnPopping => on_popping(co, dom),
        NextStep::Rerun => after_pushed(co, dom, renderer, now_ms, fetcher),
    }
}

fn after_pushed(
    co: &mut Coroutine,
    dom: &dyn DomSink,
    renderer: &RendererBridge,
    now_ms: u64,
    fetcher: Option<&FetcherAdapter>,
) -> RuntimeResult<()> {
    let tag = co.top_frame().element.tag.clone();
    co.top_frame_mut().evaluate_attributes()?;
    ensure_edom_element(co, dom, renderer, &tag)?;

    match &*tag {
        "exit" => {
            let value = co
                .top_frame()
                .evaluated_attrs
                .get("with")
                .cloned()
                .unwrap_or(Variant::Null);
            co.set_exit_value(value);
            co.top_frame_mut().next_step = NextStep::OnPopping;
        }
        "observe" => {
            register_observe(co)?;
            co.top_frame_mut().next_step = NextStep::OnPopping;
        }
        "sleep" => {
            let ms = co
                .top_frame()
                .attr_str("for")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            if co.stopped_deadline_ms.is_none() {
                co.stopped_deadline_ms = Some(now_ms + ms);
                return Err(RuntimeError::not_ready("sleep has not elapsed"));
            }
            co.stopped_deadline_ms = None;
            co.top_frame_mut().next_step = NextStep::OnPopping;
        }
        "catch" => {
            // `catch` is only consulted by `crate::exception` while
            // unwinding; on the normal forward path it contributes no
            // output and is skipped, matching `spec.md` §4.7.
            co.top_frame_mut().next_step = NextStep::OnPopping;
        }
        "request" => {
            run_request(co, fetcher)?;
            co.top_frame_mut().next_step = NextStep::OnPopping;
        }
        _ => {
            if let Some(content) = content_text(co) {
                if let Some(anchor) = co.top_frame().edom_element {
                    renderer.append_content(dom, anchor, &content)?;
                }
            }
            co.top_frame_mut().next_step = NextStep::SelectChild;
        }
    }
    Ok(())
}

fn content_text(co: &Coroutine) -> Option<String> {
    match &co.top_frame().evaluated_content {
        Variant::Null => None,
        other => Some(stringify_for_dom(other)),
    }
}

/// Materializes this frame's own DOM anchor by appending a child under
/// the parent frame's anchor, unless this is the root frame (whose
/// anchor was supplied by the caller that started the coroutine).
fn ensure_edom_element(co: &mut Coroutine, dom: &dyn DomSink, renderer: &RendererBridge, tag: &str) -> RuntimeResult<()> {
    if co.top_frame().edom_element.is_some() || co.stack.len() == 1 {
        if co.top_frame().edom_element.is_none() {
            if let Some(root) = co.root_dom {
                co.top_frame_mut().edom_element = Some(root);
            }
        }
        return Ok(());
    }
    let parent_anchor = co.stack[co.stack.len() - 2].edom_element;
    if let Some(parent) = parent_anchor {
        let handle = renderer.append_child(dom, parent, tag)?;
        co.top_frame_mut().edom_element = Some(handle);
    }
    Ok(())
}

fn select_child(co: &mut Coroutine) -> RuntimeResult<()> {
    loop {
        let frame = co.top_frame_mut();
        let idx = frame.child_index;
        let Some(child) = frame.element.children.get(idx).cloned() else {
            frame.next_step = NextStep::OnPopping;
            return Ok(());
        };
        frame.child_index += 1;
        if &*child.tag == "catch" {
            continue;
        }
        let parent = co.top_frame();
        let anchor = parent.symbols.anchor.clone();
        let child_frame = Frame::child(Arc::new(child), None, parent, anchor);
        co.push_frame(child_frame);
        return Ok(());
    }
}

fn on_popping(co: &mut Coroutine, _dom: &dyn DomSink) -> RuntimeResult<()> {
    if let Some(popped) = co.pop_frame() {
        if let Some(parent) = co.stack.last_mut() {
            parent.symbols.content = popped.evaluated_content;
        }
    }
    Ok(())
}

/// `request on="<url>"`: wraps [`FetcherAdapter`] as a request-id-
/// bearing await (`spec.md` §4.8). The first pass starts the fetch and
/// yields with `NotReady`; later passes poll the inbox for the
/// matching response and, once it arrives, assign its payload to `:`.
fn run_request(co: &mut Coroutine, fetcher: Option<&FetcherAdapter>) -> RuntimeResult<()> {
    if let Some(request_id) = co.pending_request_id {
        let Some(msg) = co.inbox.take_response(request_id) else {
            return Err(RuntimeError::not_ready("awaiting fetch response"));
        };
        co.pending_request_id = None;
        co.top_frame_mut().symbols.colon = Some(msg.data);
        return Ok(());
    }

    let url = co
        .top_frame()
        .attr_str("on")
        .ok_or_else(|| RuntimeError::wrong_args("`request` requires an `on` attribute"))?;
    let fetcher = fetcher.ok_or_else(|| RuntimeError::NotSupported("no fetcher attached to this instance".into()))?;
    let request_id = fetcher.start(&url, co.numeric_id)?;
    co.pending_request_id = Some(request_id);
    Err(RuntimeError::not_ready("fetch in flight"))
}

/// `observe for="event" on="$observed"`: registers an hvml observer
/// whose match just queues a deferred task (`SPEC_FULL.md` §10); the
/// element's own children become that task's reaction body.
fn register_observe(co: &mut Coroutine) -> RuntimeResult<()> {
    let frame = co.top_frame();
    let event_type_name = frame
        .attr_str("for")
        .ok_or_else(|| RuntimeError::wrong_args("`observe` requires a `for` attribute"))?;
    let (event_name, sub_type) = match event_type_name.split_once(':') {
        Some((ty, sub)) => (ty.to_string(), Some(sub.to_string())),
        None => (event_type_name, None),
    };
    let observed = frame
        .evaluated_attrs
        .get("on")
        .cloned()
        .unwrap_or_else(|| co.identity());
    let body = frame.element.clone();
    // The atom carries only the bare type; sub-type matching goes
    // through `SubTypePattern` below so a regex sub-type can match a
    // family of events that all share one type atom.
    let event_type = msg_atom(&event_name, None);

    let mut builder = ObserverBuilder::new(
        ObserverSource::Hvml,
        observed,
        event_type,
        Box::new(|_msg| crate::observer::HandleOutcome::Handled),
    )
    .stages(StageMask::all_stages())
    .states(StateMask::all_states());
    if let Some(sub) = sub_type {
        builder = builder.sub_type(SubTypePattern::Literal(Arc::from(sub.as_str())));
    }
    let id = co.hvml_observers.register(builder);
    co.observe_bodies.insert(id, body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use purc_dom::{AttrOp, Attribute, Expr, InMemoryDom, LoopbackRenderer};

    fn push_root(co: &mut Coroutine, dom: &InMemoryDom) {
        co.root_dom = Some(dom.root());
        co.top_frame_mut().edom_element = Some(dom.root());
    }

    fn renderer() -> RendererBridge {
        RendererBridge::new(Arc::new(LoopbackRenderer::new()))
    }

    #[test]
    fn exit_with_literal_sets_the_coroutine_result() {
        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut element = Element::new("exit");
        element.attrs.insert(
            Arc::from("with"),
            Attribute {
                op: AttrOp::Assign,
                expr: Expr::Literal(Variant::make_number(42.0)),
            },
        );
        let mut co = Coroutine::new("t", 1, Arc::new(element), None);
        push_root(&mut co, &dom);
        execute_one_step(&mut co, &dom, &rb, 0, None).unwrap();
        assert_eq!(co.result, Some(Variant::make_number(42.0)));
        assert!(co.exited_flag);
    }

    #[test]
    fn body_with_text_content_appends_to_the_dom() {
        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut element = Element::new("p");
        element.content = Some(Expr::literal_string("hello"));
        let mut co = Coroutine::new("t", 1, Arc::new(element), None);
        push_root(&mut co, &dom);
        execute_one_step(&mut co, &dom, &rb, 0, None).unwrap();
        assert_eq!(dom.serialize(dom.root()).unwrap(), "<#document>hello</#document>");
    }

    #[test]
    fn select_child_skips_catch_siblings() {
        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut root = Element::new("body");
        root.children.push(Element::new("catch"));
        root.children.push(Element::new("p"));
        let mut co = Coroutine::new("t", 1, Arc::new(root), None);
        push_root(&mut co, &dom);
        execute_one_step(&mut co, &dom, &rb, 0, None).unwrap();
        execute_one_step(&mut co, &dom, &rb, 0, None).unwrap();
        assert_eq!(co.stack.len(), 2);
        assert_eq!(&*co.top_frame().element.tag, "p");
    }

    #[test]
    fn sleep_requests_a_wait_once_then_proceeds() {
        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut element = Element::new("sleep");
        element.attrs.insert(
            Arc::from("for"),
            Attribute {
                op: AttrOp::Assign,
                expr: Expr::literal_string("10"),
            },
        );
        let mut co = Coroutine::new("t", 1, Arc::new(element), None);
        push_root(&mut co, &dom);
        assert!(execute_one_step(&mut co, &dom, &rb, 0, None).is_err());
        assert_eq!(co.stopped_deadline_ms, Some(10));
        execute_one_step(&mut co, &dom, &rb, 0, None).unwrap();
        assert!(co.stopped_deadline_ms.is_none());
    }

    #[test]
    fn request_without_a_fetcher_fails_not_supported() {
        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut element = Element::new("request");
        element.attrs.insert(
            Arc::from("on"),
            Attribute {
                op: AttrOp::Assign,
                expr: Expr::literal_string("https://example.test/x"),
            },
        );
        let mut co = Coroutine::new("t", 1, Arc::new(element), None);
        push_root(&mut co, &dom);
        let err = execute_one_step(&mut co, &dom, &rb, 0, None).unwrap_err();
        assert!(matches!(err, RuntimeError::NotSupported(_)));
    }

    #[test]
    fn request_yields_then_resolves_once_the_response_lands_in_the_inbox() {
        use crate::fetcher_adapter::FetcherAdapter;
        use purc_dom::{FetchCallback, FetchId, FetchOutcome, Fetcher};
        use std::sync::atomic::{AtomicU64, Ordering};

        struct ImmediateFetcher {
            next_id: AtomicU64,
        }
        impl Fetcher for ImmediateFetcher {
            fn fetch_async(&self, url: &str, on_complete: FetchCallback) -> purc_dom::DomResult<FetchId> {
                let id = FetchId(self.next_id.fetch_add(1, Ordering::Relaxed));
                on_complete(FetchOutcome::Success {
                    content_type: "text/plain".to_string(),
                    body: Variant::make_string(url.to_string()),
                });
                Ok(id)
            }
            fn cancel(&self, _id: FetchId) {}
        }

        let dom = InMemoryDom::new();
        let rb = renderer();
        let mut element = Element::new("request");
        element.attrs.insert(
            Arc::from("on"),
            Attribute {
                op: AttrOp::Assign,
                expr: Expr::literal_string("https://example.test/x"),
            },
        );
        let mut co = Coroutine::new("t", 1, Arc::new(element), None);
        push_root(&mut co, &dom);
        let fetcher = FetcherAdapter::new(Arc::new(ImmediateFetcher {
            next_id: AtomicU64::new(1),
        }));

        assert!(execute_one_step(&mut co, &dom, &rb, 0, Some(&fetcher)).is_err());
        assert!(co.pending_request_id.is_some());

        for msg in fetcher.drain_completed() {
            co.inbox.append(msg);
        }
        execute_one_step(&mut co, &dom, &rb, 0, Some(&fetcher)).unwrap();
        assert!(co.pending_request_id.is_none());
        assert!(co.top_frame().symbols.colon.is_some());
    }
}
