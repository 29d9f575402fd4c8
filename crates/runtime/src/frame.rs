//! The stack frame: one pushed execution context for one vDOM element
//! (`spec.md` §3, §4.4).

use std::sync::Arc;

use indexmap::IndexMap;
use purc_dom::{AttrOp, DomHandle, Element, Expr};
use purc_variant::{Atom, Variant};

use crate::error::{RuntimeError, RuntimeResult};

/// The seven per-frame context symbols `spec.md` §4.4 names.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// `<`: the "input" value inherited from the parent frame.
    pub input: Variant,
    /// `@`: the frame's DOM anchor, materialized as a native variant.
    pub anchor: Variant,
    /// `!`: a fresh empty object scratchpad.
    pub scratch: Variant,
    /// `%`: an unsigned counter starting at 0.
    pub counter: u64,
    /// `^`: the evaluated content value.
    pub content: Variant,
    /// `:`, undefined until assigned by the verb.
    pub colon: Option<Variant>,
    /// `=`, undefined until assigned by the verb.
    pub equal: Option<Variant>,
}

impl SymbolTable {
    pub fn for_root(anchor: Variant) -> Self {
        Self {
            input: Variant::Null,
            anchor,
            scratch: Variant::make_empty_object(),
            counter: 0,
            content: Variant::Null,
            colon: None,
            equal: None,
        }
    }

    /// A child frame inherits `<` from the parent's evaluated content
    /// (or input, if the parent has none yet), and gets its own fresh
    /// `!`/`%`/`:`/`=` slots per `spec.md` §4.4.
    pub fn for_child(parent: &SymbolTable, anchor: Variant) -> Self {
        Self {
            input: parent.content.clone(),
            anchor,
            scratch: Variant::make_empty_object(),
            counter: 0,
            content: Variant::Null,
            colon: None,
            equal: None,
        }
    }

    pub fn lookup(&self, symbol: char) -> Option<Variant> {
        match symbol {
            '<' => Some(self.input.clone()),
            '@' => Some(self.anchor.clone()),
            '!' => Some(self.scratch.clone()),
            '%' => Some(Variant::make_ulong_int(self.counter)),
            '^' => Some(self.content.clone()),
            ':' => self.colon.clone(),
            '=' => self.equal.clone(),
            _ => None,
        }
    }
}

/// A thin wrapper around a single (possibly shared) expression node,
/// used as a content producer at exception recovery or post-error
/// points (`spec.md` §3, "Template").
#[derive(Debug, Clone)]
pub struct Template {
    pub expr: Arc<Expr>,
}

impl Template {
    pub fn new(expr: Expr) -> Self {
        Self { expr: Arc::new(expr) }
    }

    pub fn eval(&self, symbols: &SymbolTable) -> Variant {
        eval_expr(&self.expr, symbols)
    }
}

/// Resolves an [`Expr`] against a frame's symbol table. `Named` refs
/// are looked up in the `!` scratchpad object, matching the "a `!`
/// scratchpad holds verb-assigned working state" contract of
/// `spec.md` §4.4; an unresolved name evaluates to `Null` rather than
/// failing, since the full VCM evaluator (out of this runtime's core
/// scope) would normally have already validated the reference.
pub fn eval_expr(expr: &Expr, symbols: &SymbolTable) -> Variant {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Symbol(sym) => symbols.lookup(*sym).unwrap_or(Variant::Null),
        Expr::Named(name) => symbols.scratch.object_get(name).unwrap_or(Variant::Null),
    }
}

/// Applies an attribute combine operator (`spec.md` §4.4) against an
/// optional current value and the freshly evaluated right operand.
pub fn combine(op: AttrOp, current: Option<&Variant>, rhs: Variant) -> RuntimeResult<Variant> {
    match op {
        AttrOp::Assign | AttrOp::Displace => Ok(rhs),
        AttrOp::Merge => match (current, &rhs) {
            (Some(Variant::Object(lhs)), Variant::Object(rhs_obj)) => {
                for (k, v) in rhs_obj.read().iter() {
                    lhs.mutate(|m| {
                        m.insert(k.clone(), v.clone());
                    });
                }
                Ok(Variant::Object(lhs.clone()))
            }
            _ => Ok(rhs),
        },
        AttrOp::Add | AttrOp::Subtract | AttrOp::Multiply => {
            let lhs = numeric(current.unwrap_or(&Variant::make_number(0.0)))?;
            let rhs_n = numeric(&rhs)?;
            let result = match op {
                AttrOp::Add => lhs + rhs_n,
                AttrOp::Subtract => lhs - rhs_n,
                AttrOp::Multiply => lhs * rhs_n,
                _ => unreachable!(),
            };
            Ok(Variant::make_number(result))
        }
        AttrOp::Append | AttrOp::Prepend | AttrOp::StringJoin => {
            let lhs_s = current.map(stringify).unwrap_or_default();
            let rhs_s = stringify(&rhs);
            let joined = match op {
                AttrOp::Append | AttrOp::StringJoin => format!("{lhs_s}{rhs_s}"),
                AttrOp::Prepend => format!("{rhs_s}{lhs_s}"),
                _ => unreachable!(),
            };
            Ok(Variant::make_string(joined))
        }
    }
}

fn numeric(v: &Variant) -> RuntimeResult<f64> {
    match v {
        Variant::Number(n) => Ok(*n),
        Variant::LongInt(n) => Ok(*n as f64),
        Variant::ULongInt(n) => Ok(*n as f64),
        other => Err(RuntimeError::invalid_value(format!(
            "expected a numeric value, found {}",
            other.type_name()
        ))),
    }
}

/// Renders a variant as DOM-appendable text. Used both for ordinary
/// content and for expanding `catch`/`except` recovery templates into
/// the live DOM.
pub fn stringify_for_dom(v: &Variant) -> String {
    stringify(v)
}

fn stringify(v: &Variant) -> String {
    match v {
        Variant::String(s) => s.to_string(),
        other => format!("{other:?}"),
    }
}

/// Which step function the scheduler should call next for a frame,
/// per the per-tag operation table in `spec.md` §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    AfterPushed,
    SelectChild,
    OnPopping,
    Rerun,
}

/// One entry of a coroutine's call stack: one active HVML element.
pub struct Frame {
    pub element: Arc<Element>,
    pub edom_element: Option<DomHandle>,
    pub symbols: SymbolTable,
    pub evaluated_attrs: IndexMap<Arc<str>, Variant>,
    pub evaluated_content: Variant,
    /// `except` recovery templates: exception atom → content template.
    pub except_templates: IndexMap<Atom, Template>,
    /// `error` recovery templates: error atom → content template.
    pub error_templates: IndexMap<Atom, Template>,
    pub next_step: NextStep,
    pub child_index: usize,
    pub silently: bool,
}

impl Frame {
    pub fn root(element: Arc<Element>, edom_element: Option<DomHandle>, anchor: Variant) -> Self {
        Self {
            element,
            edom_element,
            symbols: SymbolTable::for_root(anchor),
            evaluated_attrs: IndexMap::new(),
            evaluated_content: Variant::Null,
            except_templates: IndexMap::new(),
            error_templates: IndexMap::new(),
            next_step: NextStep::AfterPushed,
            child_index: 0,
            silently: false,
        }
    }

    pub fn child(
        element: Arc<Element>,
        edom_element: Option<DomHandle>,
        parent: &Frame,
        anchor: Variant,
    ) -> Self {
        Self {
            element,
            edom_element,
            symbols: SymbolTable::for_child(&parent.symbols, anchor),
            evaluated_attrs: IndexMap::new(),
            evaluated_content: Variant::Null,
            except_templates: IndexMap::new(),
            error_templates: IndexMap::new(),
            next_step: NextStep::AfterPushed,
            child_index: 0,
            silently: parent.silently,
        }
    }

    /// Evaluates every attribute on this frame's element against its
    /// combine operator, populating `evaluated_attrs`.
    pub fn evaluate_attributes(&mut self) -> RuntimeResult<()> {
        let element = self.element.clone();
        for (name, attr) in element.attrs.iter() {
            let rhs = eval_expr(&attr.expr, &self.symbols);
            let current = self.evaluated_attrs.get(name).cloned();
            let value = combine(attr.op, current.as_ref(), rhs)?;
            self.evaluated_attrs.insert(name.clone(), value);
        }
        if let Some(content_expr) = &element.content {
            self.symbols.content = eval_expr(content_expr, &self.symbols);
            self.evaluated_content = self.symbols.content.clone();
        }
        Ok(())
    }

    pub fn attr_str(&self, name: &str) -> Option<String> {
        match self.evaluated_attrs.get(name)? {
            Variant::String(s) => Some(s.to_string()),
            other => Some(format!("{other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purc_dom::Element;

    #[test]
    fn assign_returns_the_right_operand() {
        let v = combine(AttrOp::Assign, None, Variant::make_number(3.0)).unwrap();
        assert_eq!(v, Variant::make_number(3.0));
    }

    #[test]
    fn add_combines_numerically() {
        let v = combine(AttrOp::Add, Some(&Variant::make_number(2.0)), Variant::make_number(3.0)).unwrap();
        assert_eq!(v, Variant::make_number(5.0));
    }

    #[test]
    fn append_joins_as_strings() {
        let v = combine(
            AttrOp::Append,
            Some(&Variant::make_string("a")),
            Variant::make_string("b"),
        )
        .unwrap();
        assert_eq!(v, Variant::make_string("ab"));
    }

    #[test]
    fn child_frame_inherits_parent_content_as_input() {
        let root = Frame::root(Arc::new(Element::new("hvml")), None, Variant::Null);
        let mut root = root;
        root.symbols.content = Variant::make_string("from-parent");
        let child = Frame::child(Arc::new(Element::new("body")), None, &root, Variant::Null);
        assert_eq!(child.symbols.input, Variant::make_string("from-parent"));
    }

    #[test]
    fn evaluate_attributes_resolves_literal_expressions() {
        let mut element = Element::new("exit");
        element.attrs.insert(
            Arc::from("with"),
            purc_dom::Attribute {
                op: AttrOp::Assign,
                expr: Expr::Literal(Variant::make_number(42.0)),
            },
        );
        let mut frame = Frame::root(Arc::new(element), None, Variant::Null);
        frame.evaluate_attributes().unwrap();
        assert_eq!(frame.evaluated_attrs.get("with"), Some(&Variant::make_number(42.0)));
    }
}
