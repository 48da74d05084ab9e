#![forbid(unsafe_code)]

//! Block data ciphers (AES-CBC, 3DES-CBC).
//!
//! `encrypt` emits the XML Encryption framing: a fresh random IV followed
//! by the CBC ciphertext.  `decrypt` splits the IV off by the cipher's IV
//! size and strips the block padding afterwards.

use sigtuna_core::{algorithm, Error, Result};

/// A symmetric cipher usable for `EncryptedData` payloads.
pub trait DataCipher: Send {
    fn uri(&self) -> &'static str;
    /// Key length in octets.
    fn key_size(&self) -> usize;
    /// IV length in octets (equals the block size for CBC modes).
    fn iv_size(&self) -> usize;
    /// Encrypt, returning `IV || ciphertext`.
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    /// Decrypt `IV || ciphertext`, returning the unpadded plaintext.
    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;
}

/// Create a data cipher from its algorithm URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DataCipher>> {
    match uri {
        algorithm::AES128_CBC => Ok(Box::new(AesCbc {
            key_size: 16,
            uri: algorithm::AES128_CBC,
        })),
        algorithm::AES192_CBC => Ok(Box::new(AesCbc {
            key_size: 24,
            uri: algorithm::AES192_CBC,
        })),
        algorithm::AES256_CBC => Ok(Box::new(AesCbc {
            key_size: 32,
            uri: algorithm::AES256_CBC,
        })),
        algorithm::TRIPLEDES_CBC => Ok(Box::new(TripleDesCbc)),
        _ => Err(Error::UnsupportedAlgorithm(format!("data cipher: {uri}"))),
    }
}

// ── AES-CBC ──────────────────────────────────────────────────────────

struct AesCbc {
    key_size: usize,
    uri: &'static str,
}

impl DataCipher for AesCbc {
    fn uri(&self) -> &'static str {
        self.uri
    }
    fn key_size(&self) -> usize {
        self.key_size
    }
    fn iv_size(&self) -> usize {
        16
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        use rand::RngCore;

        if key.len() != self.key_size {
            return Err(Error::CipherOperation(format!(
                "expected {} byte key, got {}",
                self.key_size,
                key.len()
            )));
        }

        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);

        // Padding is applied here, so the cipher runs with NoPadding.
        let mut buf = pad_block(plaintext, 16);
        let buf_len = buf.len();

        macro_rules! do_encrypt {
            ($aes:ty) => {{
                let enc = cbc::Encryptor::<$aes>::new_from_slices(key, &iv)
                    .map_err(|e| Error::CipherOperation(format!("AES-CBC init: {e}")))?;
                enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, buf_len)
                    .map_err(|e| Error::CipherOperation(format!("AES-CBC encrypt: {e}")))?;
            }};
        }

        match self.key_size {
            16 => do_encrypt!(aes::Aes128),
            24 => do_encrypt!(aes::Aes192),
            32 => do_encrypt!(aes::Aes256),
            _ => return Err(Error::CipherOperation("unsupported AES key size".into())),
        }

        let mut result = Vec::with_capacity(16 + buf.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&buf);
        Ok(result)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};

        if key.len() != self.key_size {
            return Err(Error::CipherOperation(format!(
                "expected {} byte key, got {}",
                self.key_size,
                key.len()
            )));
        }
        if data.len() < 32 || data.len() % 16 != 0 {
            return Err(Error::CipherOperation(
                "AES-CBC data length invalid".into(),
            ));
        }

        let iv = &data[..16];
        let mut buf = data[16..].to_vec();

        macro_rules! do_decrypt {
            ($aes:ty) => {{
                let dec = cbc::Decryptor::<$aes>::new_from_slices(key, iv)
                    .map_err(|e| Error::CipherOperation(format!("AES-CBC init: {e}")))?;
                dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
                    .map_err(|e| Error::CipherOperation(format!("AES-CBC decrypt: {e}")))?;
            }};
        }

        match self.key_size {
            16 => do_decrypt!(aes::Aes128),
            24 => do_decrypt!(aes::Aes192),
            32 => do_decrypt!(aes::Aes256),
            _ => return Err(Error::CipherOperation("unsupported AES key size".into())),
        }

        strip_padding(&buf, 16)
    }
}

// ── 3DES-CBC ─────────────────────────────────────────────────────────

struct TripleDesCbc;

impl DataCipher for TripleDesCbc {
    fn uri(&self) -> &'static str {
        algorithm::TRIPLEDES_CBC
    }
    fn key_size(&self) -> usize {
        24
    }
    fn iv_size(&self) -> usize {
        8
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        use rand::RngCore;

        if key.len() != 24 {
            return Err(Error::CipherOperation(format!(
                "3DES key must be 24 bytes, got {}",
                key.len()
            )));
        }

        let mut iv = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buf = pad_block(plaintext, 8);
        let buf_len = buf.len();

        let enc = cbc::Encryptor::<des::TdesEde3>::new_from_slices(key, &iv)
            .map_err(|e| Error::CipherOperation(format!("3DES init: {e}")))?;
        enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, buf_len)
            .map_err(|e| Error::CipherOperation(format!("3DES encrypt: {e}")))?;

        let mut result = Vec::with_capacity(8 + buf.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&buf);
        Ok(result)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};

        if key.len() != 24 {
            return Err(Error::CipherOperation(format!(
                "3DES key must be 24 bytes, got {}",
                key.len()
            )));
        }
        if data.len() < 16 || data.len() % 8 != 0 {
            return Err(Error::CipherOperation("3DES data length invalid".into()));
        }

        let iv = &data[..8];
        let mut buf = data[8..].to_vec();

        let dec = cbc::Decryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map_err(|e| Error::CipherOperation(format!("3DES init: {e}")))?;
        dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|e| Error::CipherOperation(format!("3DES decrypt: {e}")))?;

        strip_padding(&buf, 8)
    }
}

// ── Block padding ────────────────────────────────────────────────────

fn pad_block(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Strip XML Encryption block padding.
///
/// Only the final byte carries the padding length; the filler bytes may be
/// arbitrary (ISO 10126 style), so only the length byte is checked.  PKCS#7
/// output satisfies this as well.
fn strip_padding(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let pad_len = match data.last() {
        Some(b) => *b as usize,
        None => return Ok(Vec::new()),
    };
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::CipherOperation("invalid block padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}
