//! The live output document ("edom") that verbs mutate.
//!
//! `spec.md` §1 scopes the HTML/DOM tree engine out as a black-box
//! collaborator reached only through append/remove/set-attribute/
//! serialize operations. [`DomSink`] is that narrow interface; every
//! mutation also goes through [`crate::renderer::RendererBridge`] so a
//! connected renderer stays in sync, per `spec.md` §4.8.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock as PLRwLock;

use crate::error::{DomError, DomResult};

/// Opaque handle to one live DOM node. Cheap to copy; stable for the
/// node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomHandle(u64);

impl DomHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

struct DomNode {
    tag: String,
    attrs: IndexMap<String, String>,
    content: Option<String>,
    children: Vec<DomHandle>,
    parent: Option<DomHandle>,
}

/// The black-box DOM operations `spec.md` §4.8 names: append/displace/
/// remove a child, set an attribute, append content, and serialize the
/// whole tree.
pub trait DomSink: Send + Sync {
    fn append_child(&self, parent: DomHandle, tag: &str) -> DomResult<DomHandle>;
    fn displace_child(&self, parent: DomHandle, index: usize, tag: &str) -> DomResult<DomHandle>;
    fn remove(&self, handle: DomHandle) -> DomResult<()>;
    fn set_attribute(&self, handle: DomHandle, name: &str, value: &str) -> DomResult<()>;
    fn append_content(&self, handle: DomHandle, text: &str) -> DomResult<()>;
    fn serialize(&self, handle: DomHandle) -> DomResult<String>;
    fn root(&self) -> DomHandle;
}

/// A simple in-memory [`DomSink`], sufficient for a hosting instance
/// with no connected renderer (or for tests): an arena of nodes keyed
/// by a monotonically increasing handle.
pub struct InMemoryDom {
    nodes: PLRwLock<IndexMap<DomHandle, DomNode>>,
    next_id: AtomicU64,
    root: DomHandle,
}

impl Default for InMemoryDom {
    fn default() -> Self {
        let root = DomHandle(0);
        let mut nodes = IndexMap::new();
        nodes.insert(
            root,
            DomNode {
                tag: "#document".to_string(),
                attrs: IndexMap::new(),
                content: None,
                children: Vec::new(),
                parent: None,
            },
        );
        Self {
            nodes: PLRwLock::new(nodes),
            next_id: AtomicU64::new(1),
            root,
        }
    }
}

impl InMemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_handle(&self) -> DomHandle {
        DomHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn serialize_node(&self, handle: DomHandle, out: &mut String) -> DomResult<()> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(&handle)
            .ok_or_else(|| DomError::NoSuchElement(format!("{}", handle.as_u64())))?;
        out.push('<');
        out.push_str(&node.tag);
        for (name, value) in &node.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        out.push('>');
        if let Some(content) = &node.content {
            out.push_str(content);
        }
        let children = node.children.clone();
        drop(nodes);
        for child in children {
            self.serialize_node(child, out)?;
        }
        out.push_str("</");
        out.push_str(&self.nodes.read()[&handle].tag);
        out.push('>');
        Ok(())
    }
}

impl DomSink for InMemoryDom {
    fn append_child(&self, parent: DomHandle, tag: &str) -> DomResult<DomHandle> {
        let handle = self.fresh_handle();
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&parent) {
            return Err(DomError::NoSuchElement(format!("{}", parent.as_u64())));
        }
        nodes.insert(
            handle,
            DomNode {
                tag: tag.to_string(),
                attrs: IndexMap::new(),
                content: None,
                children: Vec::new(),
                parent: Some(parent),
            },
        );
        nodes
            .get_mut(&parent)
            .expect("checked above")
            .children
            .push(handle);
        Ok(handle)
    }

    fn displace_child(&self, parent: DomHandle, index: usize, tag: &str) -> DomResult<DomHandle> {
        let handle = self.fresh_handle();
        let mut nodes = self.nodes.write();
        let old = {
            let parent_node = nodes
                .get_mut(&parent)
                .ok_or_else(|| DomError::NoSuchElement(format!("{}", parent.as_u64())))?;
            if index >= parent_node.children.len() {
                return Err(DomError::NoSuchElement(format!("child index {index}")));
            }
            std::mem::replace(&mut parent_node.children[index], handle)
        };
        nodes.swap_remove(&old);
        nodes.insert(
            handle,
            DomNode {
                tag: tag.to_string(),
                attrs: IndexMap::new(),
                content: None,
                children: Vec::new(),
                parent: Some(parent),
            },
        );
        Ok(handle)
    }

    fn remove(&self, handle: DomHandle) -> DomResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .swap_remove(&handle)
            .ok_or_else(|| DomError::NoSuchElement(format!("{}", handle.as_u64())))?;
        if let Some(parent) = node.parent {
            if let Some(parent_node) = nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != handle);
            }
        }
        Ok(())
    }

    fn set_attribute(&self, handle: DomHandle, name: &str, value: &str) -> DomResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&handle)
            .ok_or_else(|| DomError::NoSuchElement(format!("{}", handle.as_u64())))?;
        node.attrs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn append_content(&self, handle: DomHandle, text: &str) -> DomResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&handle)
            .ok_or_else(|| DomError::NoSuchElement(format!("{}", handle.as_u64())))?;
        node.content.get_or_insert_with(String::new).push_str(text);
        Ok(())
    }

    fn serialize(&self, handle: DomHandle) -> DomResult<String> {
        let mut out = String::new();
        self.serialize_node(handle, &mut out)?;
        Ok(out)
    }

    fn root(&self) -> DomHandle {
        self.root
    }
}
