#![forbid(unsafe_code)]

//! Cryptographic primitives for XML Encryption.
//!
//! Data ciphers produce and consume the XML Encryption octet framing
//! (`IV || ciphertext`); key wrap and key transport operate on raw key
//! octets.  All lookups go through [`registry::AlgorithmRegistry`], which
//! maps algorithm URIs to implementations and their parameters.

pub mod cipher;
pub mod keytransport;
pub mod keywrap;
pub mod registry;

pub use registry::{AlgorithmRegistry, CipherSpec};
