#![forbid(unsafe_code)]

//! XML Encryption (W3C xmlenc-core) for Sigtuna.
//!
//! [`engine::XmlCipher`] drives element and content encryption, decryption,
//! and key wrap/unwrap.  The `model` module holds the `EncryptedData` /
//! `EncryptedKey` structure types and their marshal/unmarshal code.

pub mod engine;
pub mod model;

pub use engine::{Mode, XmlCipher};
pub use model::{
    CipherData, CipherReference, EncryptedData, EncryptedKey, EncryptedType, EncryptionMethod,
    EncryptionProperties, EncryptionProperty, KeyInfo, ReferenceList,
};
