#![forbid(unsafe_code)]

//! Symmetric key wrap (AES-KW per RFC 3394, 3DES-KW per RFC 3217).

use aes_kw::Kek;
use sigtuna_core::{algorithm, Error, Result};

/// A key wrap algorithm for `EncryptedKey` payloads with a symmetric KEK.
pub trait KeyWrap: Send {
    fn uri(&self) -> &'static str;
    /// KEK length in octets.
    fn kek_size(&self) -> usize;
    fn wrap(&self, kek: &[u8], key_data: &[u8]) -> Result<Vec<u8>>;
    fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>>;
}

/// Create a key wrap algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn KeyWrap>> {
    match uri {
        algorithm::KW_AES128 => Ok(Box::new(AesKeyWrap {
            kek_size: 16,
            uri: algorithm::KW_AES128,
        })),
        algorithm::KW_AES192 => Ok(Box::new(AesKeyWrap {
            kek_size: 24,
            uri: algorithm::KW_AES192,
        })),
        algorithm::KW_AES256 => Ok(Box::new(AesKeyWrap {
            kek_size: 32,
            uri: algorithm::KW_AES256,
        })),
        algorithm::KW_TRIPLEDES => Ok(Box::new(TripleDesKeyWrap)),
        _ => Err(Error::UnsupportedAlgorithm(format!("key wrap: {uri}"))),
    }
}

// ── AES key wrap ─────────────────────────────────────────────────────

struct AesKeyWrap {
    kek_size: usize,
    uri: &'static str,
}

impl KeyWrap for AesKeyWrap {
    fn uri(&self) -> &'static str {
        self.uri
    }
    fn kek_size(&self) -> usize {
        self.kek_size
    }

    fn wrap(&self, kek_bytes: &[u8], key_data: &[u8]) -> Result<Vec<u8>> {
        if kek_bytes.len() != self.kek_size {
            return Err(Error::CipherOperation(format!(
                "expected {} byte KEK, got {}",
                self.kek_size,
                kek_bytes.len()
            )));
        }
        let mut out = vec![0u8; key_data.len() + 8];
        macro_rules! do_wrap {
            ($aes:ty) => {{
                let kek = Kek::<$aes>::new(kek_bytes.into());
                kek.wrap(key_data, &mut out)
                    .map_err(|e| Error::CipherOperation(format!("AES-KW wrap: {e}")))?;
            }};
        }
        match self.kek_size {
            16 => do_wrap!(aes::Aes128),
            24 => do_wrap!(aes::Aes192),
            32 => do_wrap!(aes::Aes256),
            _ => return Err(Error::CipherOperation("unsupported KEK size".into())),
        }
        Ok(out)
    }

    fn unwrap(&self, kek_bytes: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        if kek_bytes.len() != self.kek_size {
            return Err(Error::CipherOperation(format!(
                "expected {} byte KEK, got {}",
                self.kek_size,
                kek_bytes.len()
            )));
        }
        if wrapped.len() < 16 {
            return Err(Error::CipherOperation("wrapped key too short".into()));
        }
        let mut out = vec![0u8; wrapped.len() - 8];
        macro_rules! do_unwrap {
            ($aes:ty) => {{
                let kek = Kek::<$aes>::new(kek_bytes.into());
                kek.unwrap(wrapped, &mut out)
                    .map_err(|e| Error::CipherOperation(format!("AES-KW unwrap: {e}")))?;
            }};
        }
        match self.kek_size {
            16 => do_unwrap!(aes::Aes128),
            24 => do_unwrap!(aes::Aes192),
            32 => do_unwrap!(aes::Aes256),
            _ => return Err(Error::CipherOperation("unsupported KEK size".into())),
        }
        Ok(out)
    }
}

// ── CMS 3DES key wrap ────────────────────────────────────────────────

struct TripleDesKeyWrap;

/// Fixed IV for the outer 3DES-CBC pass (RFC 3217 section 3.2).
const TDES_KW_IV: [u8; 8] = [0x4a, 0xdd, 0xa2, 0x2c, 0x79, 0xe8, 0x21, 0x05];

impl KeyWrap for TripleDesKeyWrap {
    fn uri(&self) -> &'static str {
        algorithm::KW_TRIPLEDES
    }
    fn kek_size(&self) -> usize {
        24
    }

    fn wrap(&self, kek: &[u8], key_data: &[u8]) -> Result<Vec<u8>> {
        use rand::RngCore;
        use sha1::Digest;

        if kek.len() != 24 {
            return Err(Error::CipherOperation(format!(
                "expected 24 byte 3DES KEK, got {}",
                kek.len()
            )));
        }

        // WKCKS = key || first 8 bytes of SHA-1(key)
        let hash = sha1::Sha1::digest(key_data);
        let mut wkcks = Vec::with_capacity(key_data.len() + 8);
        wkcks.extend_from_slice(key_data);
        wkcks.extend_from_slice(&hash[..8]);

        let mut iv = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut iv);

        // Inner pass with the random IV, then reverse and encrypt again
        // with the fixed IV.
        let inner = tdes_cbc_raw_encrypt(kek, &iv, &wkcks)?;
        let mut outer_input = Vec::with_capacity(8 + inner.len());
        outer_input.extend_from_slice(&iv);
        outer_input.extend_from_slice(&inner);
        outer_input.reverse();

        tdes_cbc_raw_encrypt(kek, &TDES_KW_IV, &outer_input)
    }

    fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        use sha1::Digest;

        if kek.len() != 24 {
            return Err(Error::CipherOperation(format!(
                "expected 24 byte 3DES KEK, got {}",
                kek.len()
            )));
        }
        if wrapped.len() < 16 {
            return Err(Error::CipherOperation(
                "3DES-KW wrapped data too short".into(),
            ));
        }

        let mut outer = tdes_cbc_raw_decrypt(kek, &TDES_KW_IV, wrapped)?;
        outer.reverse();

        if outer.len() < 16 {
            return Err(Error::CipherOperation(
                "3DES-KW unwrapped data too short".into(),
            ));
        }
        let iv: [u8; 8] = outer[..8]
            .try_into()
            .map_err(|_| Error::CipherOperation("invalid 3DES-KW IV length".into()))?;
        let wkcks = tdes_cbc_raw_decrypt(kek, &iv, &outer[8..])?;

        if wkcks.len() < 8 {
            return Err(Error::CipherOperation(
                "3DES-KW data too short for checksum".into(),
            ));
        }
        let (key_data, checksum) = wkcks.split_at(wkcks.len() - 8);
        let hash = sha1::Sha1::digest(key_data);
        if checksum != &hash[..8] {
            return Err(Error::CipherOperation(
                "3DES-KW key checksum mismatch".into(),
            ));
        }
        Ok(key_data.to_vec())
    }
}

fn tdes_cbc_raw_encrypt(key: &[u8], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};

    if data.len() % 8 != 0 {
        return Err(Error::CipherOperation(
            "3DES-KW data not block-aligned".into(),
        ));
    }
    let enc = cbc::Encryptor::<des::TdesEde3>::new(key.into(), iv.into());
    let mut buf = data.to_vec();
    let len = buf.len();
    enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
        .map_err(|e| Error::CipherOperation(format!("3DES-CBC encrypt: {e}")))?;
    Ok(buf)
}

fn tdes_cbc_raw_decrypt(key: &[u8], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};

    let dec = cbc::Decryptor::<des::TdesEde3>::new(key.into(), iv.into());
    let mut buf = data.to_vec();
    let out = dec
        .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
        .map_err(|e| Error::CipherOperation(format!("3DES-CBC decrypt: {e}")))?;
    Ok(out.to_vec())
}
