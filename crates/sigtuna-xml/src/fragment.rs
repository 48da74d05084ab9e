#![forbid(unsafe_code)]

//! Subtree serialization and context-aware fragment parsing.
//!
//! Encryption replaces a subtree with octets and decryption has to turn
//! those octets back into nodes.  The octets alone are not a well-formed
//! document: the serialized subtree may use namespace prefixes that were
//! declared on ancestors of the original element.  [`deserialize`] therefore
//! wraps the octets in a synthetic `<fragment>` element carrying every
//! namespace declaration in scope at the context node, parses the result,
//! and returns the wrapper's children converted into the target document.

use crate::dom::{Document, NodeId};
use crate::escape::{escape_attr, escape_text};
use sigtuna_core::{Error, Result};
use std::collections::HashMap;

/// Serialize an element subtree to UTF-8 octets.
pub fn serialize_element(doc: &Document, id: NodeId) -> Result<Vec<u8>> {
    if !doc.is_element(id) {
        return Err(Error::FragmentParse(
            "serialization target is not an element".into(),
        ));
    }
    let mut out = String::new();
    write_node(doc, id, &mut out);
    Ok(out.into_bytes())
}

/// Serialize all children of an element, in order, to UTF-8 octets.
pub fn serialize_children(doc: &Document, id: NodeId) -> Result<Vec<u8>> {
    if !doc.is_element(id) {
        return Err(Error::FragmentParse(
            "serialization target is not an element".into(),
        ));
    }
    let mut out = String::new();
    for child in doc.children(id) {
        write_node(doc, *child, &mut out);
    }
    Ok(out.into_bytes())
}

/// Parse octets into a node sequence, resolving namespace prefixes against
/// the declarations in scope at `context`.
///
/// The returned nodes are detached; the caller splices them into place.
/// Declarations the fragment inherits from the context are not duplicated
/// onto the returned elements.
pub fn deserialize(doc: &mut Document, context: NodeId, octets: &[u8]) -> Result<Vec<NodeId>> {
    let content = std::str::from_utf8(octets)
        .map_err(|e| Error::FragmentParse(format!("fragment is not valid UTF-8: {e}")))?;

    let mut wrapper = String::from("<fragment");
    for decl in doc.in_scope_namespaces(context) {
        match decl.prefix.as_deref() {
            // The xml and xmlns prefixes are bound implicitly.
            Some("xml") | Some("xmlns") => continue,
            Some(p) => {
                wrapper.push_str(&format!(" xmlns:{}=\"{}\"", p, escape_attr(&decl.uri)));
            }
            None => {
                wrapper.push_str(&format!(" xmlns=\"{}\"", escape_attr(&decl.uri)));
            }
        }
    }
    wrapper.push('>');
    wrapper.push_str(content);
    wrapper.push_str("</fragment>");

    let parsed = roxmltree::Document::parse(&wrapper)
        .map_err(|e| Error::FragmentParse(e.to_string()))?;
    let wrapper_el = parsed.root_element();

    let mut scope: HashMap<Option<String>, String> = HashMap::new();
    for nsd in wrapper_el.namespaces() {
        scope.insert(nsd.name().map(|p| p.to_owned()), nsd.uri().to_owned());
    }

    let mut out = Vec::new();
    for child in wrapper_el.children() {
        if child.is_element() || child.is_text() {
            out.push(doc.convert_node(child, &scope));
        }
    }
    Ok(out)
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    if let Some(text) = doc.text(id) {
        out.push_str(&escape_text(text));
        return;
    }
    if !doc.is_element(id) {
        return;
    }

    let name = qualified_name(doc.prefix(id), doc.local_name(id).unwrap_or(""));
    out.push('<');
    out.push_str(&name);
    for decl in doc.ns_decls(id) {
        match decl.prefix.as_deref() {
            Some(p) => out.push_str(&format!(" xmlns:{}=\"{}\"", p, escape_attr(&decl.uri))),
            None => out.push_str(&format!(" xmlns=\"{}\"", escape_attr(&decl.uri))),
        }
    }
    for attr in doc.attributes(id) {
        let attr_name = qualified_name(attr.prefix.as_deref(), &attr.local);
        out.push_str(&format!(" {}=\"{}\"", attr_name, escape_attr(&attr.value)));
    }

    let children = doc.children(id);
    if children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in children {
        write_node(doc, *child, out);
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn qualified_name(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_owned(),
    }
}
