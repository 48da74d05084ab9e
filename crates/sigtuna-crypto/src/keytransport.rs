#![forbid(unsafe_code)]

//! RSA key transport (PKCS#1 v1.5 and OAEP with MGF1/SHA-1).

use sigtuna_core::{algorithm, Error, Result};

/// A public-key transport algorithm for `EncryptedKey` payloads.
pub trait KeyTransport: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>>;
}

/// RSA-OAEP parameters carried on an `EncryptionMethod`.
#[derive(Debug, Clone, Default)]
pub struct OaepParams {
    /// DigestMethod URI for the OAEP label hash (default SHA-1).
    pub digest_uri: Option<String>,
    /// OAEPparams content, base64-decoded.
    pub label: Option<Vec<u8>>,
}

/// Create a key transport algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn KeyTransport>> {
    from_uri_with_params(uri, OaepParams::default())
}

/// Create a key transport algorithm with explicit OAEP parameters.
pub fn from_uri_with_params(uri: &str, params: OaepParams) -> Result<Box<dyn KeyTransport>> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP => Ok(Box::new(RsaOaepTransport { params })),
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransport for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>> {
        use rsa::Pkcs1v15Encrypt;
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::CipherOperation(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>> {
        use rsa::Pkcs1v15Encrypt;
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::CipherOperation(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

struct RsaOaepTransport {
    params: OaepParams,
}

/// Build the OAEP padding for a given label digest.
///
/// `rsa-oaep-mgf1p` fixes MGF1 to SHA-1; the DigestMethod only selects the
/// label hash.
macro_rules! oaep_padding {
    ($digest:ty, $label:expr) => {{
        let mut padding = rsa::Oaep::new_with_mgf_hash::<$digest, sha1::Sha1>();
        padding.label = $label.clone();
        padding
    }};
}

impl RsaOaepTransport {
    fn digest(&self) -> &str {
        match self.params.digest_uri.as_deref() {
            Some(algorithm::SHA256) => "sha256",
            Some(algorithm::SHA512) => "sha512",
            _ => "sha1",
        }
    }

    /// The OAEPparams octets as the label string the `rsa` crate takes.
    /// Non-UTF-8 labels cannot be represented through that API.
    fn label(&self) -> Result<Option<String>> {
        match &self.params.label {
            Some(bytes) => std::str::from_utf8(bytes)
                .map(|s| Some(s.to_owned()))
                .map_err(|_| {
                    Error::CipherOperation("OAEPparams label is not valid UTF-8".into())
                }),
            None => Ok(None),
        }
    }
}

impl KeyTransport for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_OAEP
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let label = self.label()?;
        let result = match self.digest() {
            "sha256" => {
                public_key.encrypt(&mut rng, oaep_padding!(sha2::Sha256, label), key_data)
            }
            "sha512" => {
                public_key.encrypt(&mut rng, oaep_padding!(sha2::Sha512, label), key_data)
            }
            _ => public_key.encrypt(&mut rng, oaep_padding!(sha1::Sha1, label), key_data),
        };
        result.map_err(|e| Error::CipherOperation(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>> {
        let label = self.label()?;
        let result = match self.digest() {
            "sha256" => private_key.decrypt(oaep_padding!(sha2::Sha256, label), encrypted),
            "sha512" => private_key.decrypt(oaep_padding!(sha2::Sha512, label), encrypted),
            _ => private_key.decrypt(oaep_padding!(sha1::Sha1, label), encrypted),
        };
        result.map_err(|e| Error::CipherOperation(format!("RSA-OAEP decrypt: {e}")))
    }
}
