#![forbid(unsafe_code)]

//! Key types.

/// Intended usage of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
    Wrap,
    Unwrap,
    Any,
}

/// The underlying key material.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Aes(Vec<u8>),
    Des3(Vec<u8>),
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { private, .. } => {
                if private.is_some() {
                    write!(f, "RSA private+public key")
                } else {
                    write!(f, "RSA public key")
                }
            }
            Self::Aes(k) => write!(f, "AES key ({} bytes)", k.len()),
            Self::Des3(_) => write!(f, "3DES key"),
        }
    }
}

/// A key with an optional lookup name.
#[derive(Debug, Clone)]
pub struct Key {
    pub name: Option<String>,
    pub data: KeyData,
    pub usage: KeyUsage,
}

impl Key {
    pub fn new(data: KeyData, usage: KeyUsage) -> Self {
        Self {
            name: None,
            data,
            usage,
        }
    }

    /// An AES key usable for any operation.
    pub fn aes(bytes: Vec<u8>) -> Self {
        Self::new(KeyData::Aes(bytes), KeyUsage::Any)
    }

    /// A 3DES key usable for any operation.
    pub fn tripledes(bytes: Vec<u8>) -> Self {
        Self::new(KeyData::Des3(bytes), KeyUsage::Any)
    }

    /// An RSA key pair usable for any operation.
    pub fn rsa(private: rsa::RsaPrivateKey) -> Self {
        let public = rsa::RsaPublicKey::from(&private);
        Self::new(
            KeyData::Rsa {
                private: Some(private),
                public,
            },
            KeyUsage::Any,
        )
    }

    /// An RSA public key (encrypt/wrap only).
    pub fn rsa_public(public: rsa::RsaPublicKey) -> Self {
        Self::new(
            KeyData::Rsa {
                private: None,
                public,
            },
            KeyUsage::Encrypt,
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Raw symmetric key octets (AES or 3DES).
    pub fn symmetric_key_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            KeyData::Aes(k) | KeyData::Des3(k) => Some(k),
            _ => None,
        }
    }

    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            KeyData::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }

    pub fn rsa_private_key(&self) -> Option<&rsa::RsaPrivateKey> {
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => Some(pk),
            _ => None,
        }
    }
}
