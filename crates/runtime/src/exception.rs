//! Exception/error matching (`spec.md` §4.7): after a failed step, walk
//! frames from innermost outward looking for a matching `catch`
//! sibling or an ancestor's `except`/`error` recovery template.

use purc_dom::{DomSink, Element, Expr};
use purc_variant::{Atom, Variant};

use crate::coroutine::Coroutine;
use crate::frame::{eval_expr, stringify_for_dom};
use crate::renderer_bridge::RendererBridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// No exception pending, or it was matched and cleared.
    Recovered,
    /// Nothing matched anywhere up the stack: the coroutine is marked
    /// `terminated` and should proceed to EXITED processing.
    Terminated,
}

/// Runs the post-step exception-matching process `spec.md` §4.7
/// describes. A no-op if the coroutine has no pending exception.
/// Recovery content is appended through `renderer` so a connected
/// renderer learns about it too (`spec.md` §4.8).
pub fn resolve_exception(co: &mut Coroutine, dom: &dyn DomSink, renderer: &RendererBridge) -> ExceptionOutcome {
    let Some(exception) = co.except.clone() else {
        return ExceptionOutcome::Recovered;
    };

    for idx in (0..co.stack.len()).rev() {
        if let Some(template) = co.stack[idx]
            .except_templates
            .get(&exception.error_except)
            .or_else(|| co.stack[idx].error_templates.get(&exception.error_except))
            .cloned()
        {
            let content = template.eval(&co.stack[idx].symbols);
            if let Some(anchor) = co.stack[idx].edom_element {
                let _ = renderer.append_content(dom, anchor, &stringify_for_dom(&content));
            }
            co.clear_exception();
            return ExceptionOutcome::Recovered;
        }

        if let Some(catch_el) = find_matching_catch(&co.stack[idx].element, exception.error_except)
        {
            if let Some(content_expr) = &catch_el.content {
                let content = eval_expr(content_expr, &co.stack[idx].symbols);
                if let Some(anchor) = co.stack[idx].edom_element {
                    let _ = renderer.append_content(dom, anchor, &stringify_for_dom(&content));
                }
            }
            co.clear_exception();
            return ExceptionOutcome::Recovered;
        }
    }

    co.terminated = true;
    ExceptionOutcome::Terminated
}

/// Open Question 2 of `spec.md` §9, resolved in `SPEC_FULL.md` §11:
/// all `catch` siblings at a level are visited, in document order,
/// until the first one whose `for` selector matches.
fn find_matching_catch(element: &Element, except_atom: Atom) -> Option<&Element> {
    element
        .children
        .iter()
        .find(|child| &*child.tag == "catch" && catch_matches(child, except_atom))
}

fn catch_matches(catch_el: &Element, except_atom: Atom) -> bool {
    match catch_el.attr("for") {
        None => true,
        Some(attr) => match &attr.expr {
            Expr::Literal(Variant::String(selector)) => selector
                .split(|c: char| c == '|' || c == ',')
                .map(|s| s.trim())
                .any(|name| name == "*" || name == except_atom.to_string()),
            _ => true,
        },
    }
}
