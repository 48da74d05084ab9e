#![forbid(unsafe_code)]

//! Key resolution from `KeyInfo` hints.

use crate::key::{Key, KeyData, KeyUsage};
use sigtuna_core::{Error, Result};

/// Lookup hints extracted from a `KeyInfo` structure.
///
/// Only `KeyName` values carry over; certificates and other `KeyInfo`
/// children are opaque to resolution.
#[derive(Debug, Clone, Default)]
pub struct KeyInfoHint {
    pub key_names: Vec<String>,
}

impl KeyInfoHint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            key_names: vec![name.into()],
        }
    }
}

/// Resolves decryption keys the engine was not handed directly.
pub trait KeyResolver: Send + Sync {
    /// Resolve a key for the given hint, or fail with `KeyResolution`.
    fn resolve(&self, hint: &KeyInfoHint) -> Result<Key>;
}

/// A named in-memory key store.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: Vec<Key>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.name.as_deref() == Some(name))
    }

    pub fn find_by_usage(&self, usage: KeyUsage) -> Option<&Key> {
        self.keys
            .iter()
            .find(|k| k.usage == usage || k.usage == KeyUsage::Any)
    }

    pub fn find_rsa_private(&self) -> Option<&Key> {
        self.keys.iter().find(|k| {
            matches!(
                &k.data,
                KeyData::Rsa {
                    private: Some(_),
                    ..
                }
            )
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyResolver for KeyStore {
    fn resolve(&self, hint: &KeyInfoHint) -> Result<Key> {
        for name in &hint.key_names {
            if let Some(key) = self.find_by_name(name) {
                return Ok(key.clone());
            }
        }
        Err(Error::KeyResolution(format!(
            "no key matched names {:?}",
            hint.key_names
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_name() {
        let mut store = KeyStore::new();
        store.add_key(Key::aes(vec![1u8; 16]).with_name("alpha"));
        store.add_key(Key::aes(vec![2u8; 16]).with_name("beta"));

        let key = store.resolve(&KeyInfoHint::named("beta")).unwrap();
        assert_eq!(key.symmetric_key_bytes(), Some(&[2u8; 16][..]));
    }

    #[test]
    fn test_resolve_unknown_name_fails() {
        let store = KeyStore::new();
        let err = store.resolve(&KeyInfoHint::named("missing")).unwrap_err();
        assert!(matches!(err, Error::KeyResolution(_)));
    }

    #[test]
    fn test_first_matching_name_wins() {
        let mut store = KeyStore::new();
        store.add_key(Key::aes(vec![9u8; 16]).with_name("shared"));
        let hint = KeyInfoHint {
            key_names: vec!["absent".into(), "shared".into()],
        };
        assert!(store.resolve(&hint).is_ok());
    }
}
