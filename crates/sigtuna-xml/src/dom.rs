#![forbid(unsafe_code)]

//! Owned, mutable XML tree over an index arena.
//!
//! `roxmltree` gives us a fast read-only parse; the encryption engine needs
//! to splice nodes in and out of a document, so the parsed tree is copied
//! into this arena once and mutated through `NodeId` handles.  Namespace
//! declarations are stored on the element that carries them, which lets
//! [`in_scope_namespaces`](Document::in_scope_namespaces) recover the scope
//! of any node by walking its ancestor chain.

use sigtuna_core::{Error, Result};
use std::collections::HashMap;

/// Handle to a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A namespace declaration (`xmlns="…"` or `xmlns:prefix="…"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// `None` for the default namespace.
    pub prefix: Option<String>,
    pub uri: String,
}

/// An element attribute.  Namespace declarations are not attributes here;
/// they live in [`NsDecl`] lists.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
    pub value: String,
}

#[derive(Debug)]
pub(crate) struct ElementData {
    pub(crate) ns: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) local: String,
    pub(crate) attrs: Vec<Attribute>,
    pub(crate) ns_decls: Vec<NsDecl>,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Root,
    Element(ElementData),
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned XML document.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Create an empty document containing only the root container node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse an XML document from text.
    pub fn parse(text: &str) -> Result<Self> {
        let parsed =
            roxmltree::Document::parse(text).map_err(|e| Error::XmlParse(e.to_string()))?;
        let mut doc = Self::new();
        let root = doc.root();
        let scope = HashMap::new();
        for child in parsed.root().children() {
            if child.is_element() {
                let id = doc.convert_node(child, &scope);
                doc.append_child(root, id);
            }
        }
        if doc.document_element().is_none() {
            return Err(Error::XmlParse("document has no root element".into()));
        }
        Ok(doc)
    }

    /// Copy a `roxmltree` node (recursively) into this arena.
    ///
    /// `parent_scope` maps in-scope prefixes to URIs at the insertion point;
    /// only declarations that change that scope are recorded on the element.
    pub(crate) fn convert_node(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        parent_scope: &HashMap<Option<String>, String>,
    ) -> NodeId {
        if node.is_text() {
            return self.create_text(node.text().unwrap_or(""));
        }

        let ns = node.tag_name().namespace().map(|s| s.to_owned());
        let prefix = ns
            .as_deref()
            .and_then(|uri| node.lookup_prefix(uri))
            .filter(|p| !p.is_empty())
            .map(|p| p.to_owned());
        let id = self.create_element(ns.as_deref(), prefix.as_deref(), node.tag_name().name());

        // Record only the declarations that differ from the inherited scope.
        // roxmltree reports the implicit xml binding; it is never written out.
        let mut scope = parent_scope.clone();
        for nsd in node.namespaces() {
            if nsd.name() == Some("xml") {
                continue;
            }
            let key = nsd.name().map(|p| p.to_owned());
            if scope.get(&key).map(|u| u.as_str()) != Some(nsd.uri()) {
                self.declare_namespace(id, nsd.name(), nsd.uri());
                scope.insert(key, nsd.uri().to_owned());
            }
        }

        for attr in node.attributes() {
            let attr_ns = attr.namespace().map(|s| s.to_owned());
            let attr_prefix = attr_ns
                .as_deref()
                .and_then(|uri| node.lookup_prefix(uri))
                .filter(|p| !p.is_empty())
                .map(|p| p.to_owned());
            self.push_attribute(
                id,
                Attribute {
                    ns: attr_ns,
                    prefix: attr_prefix,
                    local: attr.name().to_owned(),
                    value: attr.value().to_owned(),
                },
            );
        }

        for child in node.children() {
            if child.is_element() || child.is_text() {
                let child_id = self.convert_node(child, &scope);
                self.append_child(id, child_id);
            }
        }
        id
    }

    // ── Node creation ────────────────────────────────────────────────

    /// Create a detached element node.
    pub fn create_element(
        &mut self,
        ns: Option<&str>,
        prefix: Option<&str>,
        local: &str,
    ) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            ns: ns.map(|s| s.to_owned()),
            prefix: prefix.map(|s| s.to_owned()),
            local: local.to_owned(),
            attrs: Vec::new(),
            ns_decls: Vec::new(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_owned()))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    // ── Structure ────────────────────────────────────────────────────

    /// The root container node (not an element).
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The document element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Detach a node from its parent, leaving it free-standing.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Replace `old` with the node sequence `new`, at `old`'s position in
    /// its parent.  Fails if `old` has no parent.
    pub fn replace_with(&mut self, old: NodeId, new: &[NodeId]) -> Result<()> {
        let parent = self.nodes[old.0]
            .parent
            .ok_or_else(|| Error::XmlParse("cannot replace a detached node".into()))?;
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == old)
            .ok_or_else(|| Error::XmlParse("node not found in its parent".into()))?;
        self.nodes[old.0].parent = None;
        self.nodes[parent.0].children.remove(pos);
        for (i, id) in new.iter().enumerate() {
            self.detach(*id);
            self.nodes[id.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(pos + i, *id);
        }
        Ok(())
    }

    /// Remove all children of a node.
    pub fn remove_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// All nodes of the subtree rooted at `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            for child in self.nodes[next.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element(_))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Text(_))
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(&e.local),
            _ => None,
        }
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => e.ns.as_deref(),
            _ => None,
        }
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => e.prefix.as_deref(),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Concatenated text content of the subtree rooted at `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(t) = self.text(node) {
                out.push_str(t);
            }
        }
        out
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => &e.attrs,
            _ => &[],
        }
    }

    /// Look up an attribute by namespace and local name.
    pub fn attribute(&self, id: NodeId, ns: Option<&str>, local: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.ns.as_deref() == ns && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Set (or overwrite) an attribute.
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        ns: Option<&str>,
        prefix: Option<&str>,
        local: &str,
        value: &str,
    ) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if let Some(existing) = e
                .attrs
                .iter_mut()
                .find(|a| a.ns.as_deref() == ns && a.local == local)
            {
                existing.value = value.to_owned();
                return;
            }
            e.attrs.push(Attribute {
                ns: ns.map(|s| s.to_owned()),
                prefix: prefix.map(|s| s.to_owned()),
                local: local.to_owned(),
                value: value.to_owned(),
            });
        }
    }

    fn push_attribute(&mut self, id: NodeId, attr: Attribute) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            e.attrs.push(attr);
        }
    }

    /// Namespace declarations carried directly on this element.
    pub fn ns_decls(&self, id: NodeId) -> &[NsDecl] {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => &e.ns_decls,
            _ => &[],
        }
    }

    /// Declare a namespace on this element.  Re-declaring a prefix replaces
    /// the previous binding.
    pub fn declare_namespace(&mut self, id: NodeId, prefix: Option<&str>, uri: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if let Some(existing) = e
                .ns_decls
                .iter_mut()
                .find(|d| d.prefix.as_deref() == prefix)
            {
                existing.uri = uri.to_owned();
                return;
            }
            e.ns_decls.push(NsDecl {
                prefix: prefix.map(|s| s.to_owned()),
                uri: uri.to_owned(),
            });
        }
    }

    /// Every namespace declaration in scope at `id`, closest ancestor wins.
    ///
    /// The walk starts at `id` itself and proceeds to the root, skipping any
    /// declaration whose prefix was already bound by a closer node.
    pub fn in_scope_namespaces(&self, id: NodeId) -> Vec<NsDecl> {
        let mut seen: Vec<Option<&str>> = Vec::new();
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            for decl in self.ns_decls(node) {
                if !seen.contains(&decl.prefix.as_deref()) {
                    seen.push(decl.prefix.as_deref());
                    out.push(decl.clone());
                }
            }
            cursor = self.parent(node);
        }
        out
    }

    /// Resolve a prefix (or the default namespace for `None`) at `id`.
    pub fn lookup_namespace_uri(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            for decl in self.ns_decls(node) {
                if decl.prefix.as_deref() == prefix {
                    return Some(&decl.uri);
                }
            }
            cursor = self.parent(node);
        }
        None
    }

    // ── Search helpers ───────────────────────────────────────────────

    /// First direct child element with the given namespace and local name.
    pub fn find_child(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.namespace(*c) == Some(ns) && self.local_name(*c) == Some(local))
    }

    /// All descendant elements (including `id` itself) with the given
    /// namespace and local name, in document order.
    pub fn find_descendants(&self, id: NodeId, ns: &str, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.namespace(*n) == Some(ns) && self.local_name(*n) == Some(local))
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_navigate() {
        let doc = Document::parse("<a><b>text</b><c/></a>").unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(doc.local_name(root), Some("a"));
        let children = doc.children(root);
        assert_eq!(children.len(), 2);
        let b = children[0];
        assert_eq!(doc.local_name(b), Some("b"));
        assert_eq!(doc.text_content(b), "text");
    }

    #[test]
    fn test_namespace_scope_walk() {
        let doc = Document::parse(
            r#"<a xmlns:p="urn:p"><b xmlns:q="urn:q"><c/></b></a>"#,
        )
        .unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let c = doc.children(b)[0];
        let scope = doc.in_scope_namespaces(c);
        assert!(scope.iter().any(|d| d.prefix.as_deref() == Some("p") && d.uri == "urn:p"));
        assert!(scope.iter().any(|d| d.prefix.as_deref() == Some("q") && d.uri == "urn:q"));
        assert_eq!(doc.lookup_namespace_uri(c, Some("p")), Some("urn:p"));
        assert_eq!(doc.lookup_namespace_uri(c, Some("x")), None);
    }

    #[test]
    fn test_shadowed_declaration() {
        let doc = Document::parse(
            r#"<a xmlns:p="urn:outer"><b xmlns:p="urn:inner"><c/></b></a>"#,
        )
        .unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let c = doc.children(b)[0];
        let scope = doc.in_scope_namespaces(c);
        let p: Vec<_> = scope
            .iter()
            .filter(|d| d.prefix.as_deref() == Some("p"))
            .collect();
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].uri, "urn:inner");
    }

    #[test]
    fn test_replace_with_sequence() {
        let mut doc = Document::parse("<a><b/><c/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let x = doc.create_element(None, None, "x");
        let y = doc.create_element(None, None, "y");
        doc.replace_with(b, &[x, y]).unwrap();
        let names: Vec<_> = doc
            .children(a)
            .iter()
            .map(|c| doc.local_name(*c).unwrap().to_owned())
            .collect();
        assert_eq!(names, ["x", "y", "c"]);
        assert_eq!(doc.parent(x), Some(a));
        assert_eq!(doc.parent(b), None);
    }

    #[test]
    fn test_replace_detached_node_fails() {
        let mut doc = Document::new();
        let orphan = doc.create_element(None, None, "x");
        let other = doc.create_element(None, None, "y");
        assert!(doc.replace_with(orphan, &[other]).is_err());
    }

    #[test]
    fn test_set_attribute_overwrites() {
        let mut doc = Document::new();
        let el = doc.create_element(None, None, "e");
        doc.set_attribute(el, None, None, "Id", "one");
        doc.set_attribute(el, None, None, "Id", "two");
        assert_eq!(doc.attribute(el, None, "Id"), Some("two"));
        assert_eq!(doc.attributes(el).len(), 1);
    }
}
