#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs to implementations and parameters.
//!
//! Data ciphers and key-encryption algorithms are looked up separately: a
//! key wrap URI is not a valid data cipher URI and vice versa.  A registry
//! may carry a provider hint naming the preferred backend; all algorithms
//! here are backed by the RustCrypto implementations, so the hint is
//! recorded for diagnostics rather than dispatch.

use crate::cipher::{self, DataCipher};
use crate::keytransport::{self, KeyTransport, OaepParams};
use crate::keywrap::{self, KeyWrap};
use sigtuna_core::{algorithm, Error, Result};

/// Static parameters of a data cipher algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub uri: &'static str,
    /// Key length in octets.
    pub key_bytes: usize,
    /// Cipher block length in octets.
    pub block_bytes: usize,
    /// IV length in octets.
    pub iv_bytes: usize,
}

/// Central lookup for cryptographic algorithms.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmRegistry {
    provider: Option<String>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a provider hint overriding the default backend name.
    pub fn with_provider(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_owned()),
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Look up a data cipher by URI.
    pub fn data_cipher(&self, uri: &str) -> Result<Box<dyn DataCipher>> {
        cipher::from_uri(uri)
    }

    /// Look up a key wrap algorithm by URI.
    pub fn key_wrap(&self, uri: &str) -> Result<Box<dyn KeyWrap>> {
        keywrap::from_uri(uri)
    }

    /// Look up a key transport algorithm by URI.
    pub fn key_transport(&self, uri: &str) -> Result<Box<dyn KeyTransport>> {
        keytransport::from_uri(uri)
    }

    /// Look up a key transport algorithm with explicit OAEP parameters.
    pub fn key_transport_with_params(
        &self,
        uri: &str,
        params: OaepParams,
    ) -> Result<Box<dyn KeyTransport>> {
        keytransport::from_uri_with_params(uri, params)
    }

    /// Static parameters of a data cipher algorithm.
    pub fn cipher_spec(uri: &str) -> Result<CipherSpec> {
        match uri {
            algorithm::TRIPLEDES_CBC => Ok(CipherSpec {
                uri: algorithm::TRIPLEDES_CBC,
                key_bytes: 24,
                block_bytes: 8,
                iv_bytes: 8,
            }),
            algorithm::AES128_CBC => Ok(CipherSpec {
                uri: algorithm::AES128_CBC,
                key_bytes: 16,
                block_bytes: 16,
                iv_bytes: 16,
            }),
            algorithm::AES192_CBC => Ok(CipherSpec {
                uri: algorithm::AES192_CBC,
                key_bytes: 24,
                block_bytes: 16,
                iv_bytes: 16,
            }),
            algorithm::AES256_CBC => Ok(CipherSpec {
                uri: algorithm::AES256_CBC,
                key_bytes: 32,
                block_bytes: 16,
                iv_bytes: 16,
            }),
            _ => Err(Error::UnsupportedAlgorithm(format!("data cipher: {uri}"))),
        }
    }
}
