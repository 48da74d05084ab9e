#![forbid(unsafe_code)]

//! Owned XML tree abstraction for the Sigtuna XML Encryption library.
//!
//! Parsing goes through `roxmltree`; the parsed tree is converted into an
//! owned arena (`dom::Document`) that supports the mutation the encryption
//! engine needs: node creation, child splicing and namespace-scope walking.
//! The `fragment` module serializes subtrees to octets and re-parses them
//! against a namespace-inheriting context node.

pub mod dom;
pub mod escape;
pub mod fragment;

pub use dom::{Document, NodeId};
