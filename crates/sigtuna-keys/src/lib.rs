#![forbid(unsafe_code)]

//! Key model and key resolution for XML Encryption.
//!
//! This crate is XML-free: the encryption layer extracts lookup hints from
//! `KeyInfo` structures and hands them to a [`resolver::KeyResolver`], which
//! produces keys from whatever backing store the application provides.

pub mod key;
pub mod resolver;

pub use key::{Key, KeyData, KeyUsage};
pub use resolver::{KeyInfoHint, KeyResolver, KeyStore};
