#![forbid(unsafe_code)]

//! The XML cipher engine.
//!
//! An [`XmlCipher`] is constructed for one algorithm (or none, for
//! decrypt-only use), initialized into an operation mode with a key, and
//! then drives element encryption, decryption and key wrap/unwrap against
//! a [`Document`].  Re-initializing resets the engine, so one instance can
//! be reused across operations.

use crate::model::{
    self, CipherData, CipherReference, EncryptedData, EncryptedKey, EncryptionMethod, KeyInfo,
    NO_VALUE_YET,
};
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_crypto::keytransport::OaepParams;
use sigtuna_crypto::AlgorithmRegistry;
use sigtuna_keys::{Key, KeyData, KeyInfoHint, KeyResolver};
use sigtuna_xml::{fragment, Document, NodeId};

/// Operation mode set at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
    Wrap,
    Unwrap,
}

/// The XML Encryption engine.
pub struct XmlCipher {
    registry: AlgorithmRegistry,
    algorithm: Option<String>,
    mode: Option<Mode>,
    key: Option<Key>,
    kek: Option<Key>,
    resolver: Option<Box<dyn KeyResolver>>,
    encrypted_data: Option<EncryptedData>,
    encrypted_key: Option<EncryptedKey>,
}

impl XmlCipher {
    /// Create an engine for the given algorithm URI.
    ///
    /// The URI must name a data cipher, key wrap or key transport algorithm
    /// known to the registry.
    pub fn new(algorithm_uri: &str) -> Result<Self> {
        Self::with_registry(algorithm_uri, AlgorithmRegistry::new())
    }

    /// Create an engine with a provider hint overriding the default backend.
    pub fn with_provider(algorithm_uri: &str, provider: &str) -> Result<Self> {
        Self::with_registry(algorithm_uri, AlgorithmRegistry::with_provider(provider))
    }

    fn with_registry(algorithm_uri: &str, registry: AlgorithmRegistry) -> Result<Self> {
        validate_algorithm(&registry, algorithm_uri)?;
        Ok(Self {
            registry,
            algorithm: Some(algorithm_uri.to_owned()),
            mode: None,
            key: None,
            kek: None,
            resolver: None,
            encrypted_data: None,
            encrypted_key: None,
        })
    }

    /// Create an engine with no transformation.
    ///
    /// Such an engine can only decrypt or unwrap, taking the algorithm from
    /// the `EncryptionMethod` of the structure being processed.
    pub fn without_algorithm() -> Self {
        Self {
            registry: AlgorithmRegistry::new(),
            algorithm: None,
            mode: None,
            key: None,
            kek: None,
            resolver: None,
            encrypted_data: None,
            encrypted_key: None,
        }
    }

    /// Initialize the engine into an operation mode.
    ///
    /// Resets any state from previous operations.  For [`Mode::Encrypt`] and
    /// [`Mode::Wrap`] a fresh output template is created; its `KeyInfo` can
    /// be populated through [`add_key_name`](Self::add_key_name) and
    /// [`add_encrypted_key`](Self::add_encrypted_key) before encrypting.
    pub fn init(&mut self, mode: Mode, key: Option<Key>) {
        log::debug!("initializing XmlCipher in {mode:?} mode");
        self.mode = Some(mode);
        self.key = key;
        self.encrypted_data = None;
        self.encrypted_key = None;
        match mode {
            Mode::Encrypt => {
                self.encrypted_data = Some(EncryptedData {
                    base: self.template_base(),
                });
            }
            Mode::Wrap => {
                self.encrypted_key = Some(EncryptedKey {
                    base: self.template_base(),
                    ..Default::default()
                });
            }
            Mode::Decrypt | Mode::Unwrap => {}
        }
    }

    fn template_base(&self) -> crate::model::EncryptedType {
        crate::model::EncryptedType {
            encryption_method: self
                .algorithm
                .as_deref()
                .map(EncryptionMethod::new),
            cipher_data: CipherData::value(NO_VALUE_YET.to_vec()),
            ..Default::default()
        }
    }

    /// Set the key-encryption key used to unwrap session keys found in
    /// `KeyInfo` during decryption.
    pub fn set_kek(&mut self, key: Key) {
        self.kek = Some(key);
    }

    /// Set the resolver consulted when no key or KEK applies.
    pub fn set_key_resolver(&mut self, resolver: Box<dyn KeyResolver>) {
        self.resolver = Some(resolver);
    }

    /// The `EncryptedData` template (present in `Encrypt` mode).
    pub fn encrypted_data_template_mut(&mut self) -> Option<&mut EncryptedData> {
        self.encrypted_data.as_mut()
    }

    /// The `EncryptedKey` template (present in `Wrap` mode).
    pub fn encrypted_key_template_mut(&mut self) -> Option<&mut EncryptedKey> {
        self.encrypted_key.as_mut()
    }

    /// Add a `KeyName` to the active output template's `KeyInfo`.
    pub fn add_key_name(&mut self, name: &str) -> Result<()> {
        let key_info = self.active_key_info()?;
        key_info.key_names.push(name.to_owned());
        Ok(())
    }

    /// Nest a wrapped session key into the `EncryptedData` template's
    /// `KeyInfo`.
    pub fn add_encrypted_key(&mut self, ek: EncryptedKey) -> Result<()> {
        match self.mode {
            Some(Mode::Encrypt) => {}
            _ => {
                return Err(Error::InvalidMode(
                    "encrypted keys nest into the Encrypt template".into(),
                ))
            }
        }
        let key_info = self.active_key_info()?;
        key_info.encrypted_keys.push(ek);
        Ok(())
    }

    fn active_key_info(&mut self) -> Result<&mut KeyInfo> {
        let base = match self.mode {
            Some(Mode::Encrypt) => {
                self.encrypted_data
                    .as_mut()
                    .map(|ed| &mut ed.base)
                    .ok_or_else(|| Error::InvalidMode("cipher not initialized".into()))?
            }
            Some(Mode::Wrap) => {
                self.encrypted_key
                    .as_mut()
                    .map(|ek| &mut ek.base)
                    .ok_or_else(|| Error::InvalidMode("cipher not initialized".into()))?
            }
            Some(mode) => {
                return Err(Error::InvalidMode(format!(
                    "no output template in {mode:?} mode"
                )))
            }
            None => return Err(Error::InvalidMode("cipher not initialized".into())),
        };
        Ok(base.key_info.get_or_insert_with(KeyInfo::default))
    }

    // ── Encryption ───────────────────────────────────────────────────

    /// Encrypt an element into an `EncryptedData` structure without
    /// touching the tree.
    pub fn encrypt_to_structure(&mut self, doc: &Document, el: NodeId) -> Result<EncryptedData> {
        self.require_mode(Mode::Encrypt)?;
        log::debug!("encrypting element {:?}", doc.local_name(el));

        let octets = fragment::serialize_element(doc, el)?;
        self.encrypt_octets(&octets, ns::ENC_TYPE_ELEMENT)
    }

    /// Encrypt an element's content into an `EncryptedData` structure
    /// without touching the tree.
    pub fn encrypt_content_to_structure(
        &mut self,
        doc: &Document,
        el: NodeId,
    ) -> Result<EncryptedData> {
        self.require_mode(Mode::Encrypt)?;
        log::debug!("encrypting content of {:?}", doc.local_name(el));

        if doc.children(el).is_empty() {
            return Err(Error::EmptyContent(format!(
                "element {:?} has no content to encrypt",
                doc.local_name(el)
            )));
        }
        let octets = fragment::serialize_children(doc, el)?;
        self.encrypt_octets(&octets, ns::ENC_TYPE_CONTENT)
    }

    /// Encrypt an element and replace it with the resulting
    /// `xenc:EncryptedData`.  Returns the new element.
    pub fn encrypt_element(&mut self, doc: &mut Document, el: NodeId) -> Result<NodeId> {
        let ed = self.encrypt_to_structure(doc, el)?;
        let ed_el = model::marshal_encrypted_data(doc, &ed)?;
        doc.replace_with(el, &[ed_el])?;
        Ok(ed_el)
    }

    /// Encrypt the content of an element and replace that content with the
    /// resulting `xenc:EncryptedData`.  Returns the new element.
    pub fn encrypt_element_content(&mut self, doc: &mut Document, el: NodeId) -> Result<NodeId> {
        let ed = self.encrypt_content_to_structure(doc, el)?;
        let ed_el = model::marshal_encrypted_data(doc, &ed)?;
        doc.remove_children(el);
        doc.append_child(el, ed_el);
        Ok(ed_el)
    }

    /// Encrypt raw octets into an `EncryptedData` built from the active
    /// template.
    fn encrypt_octets(&mut self, octets: &[u8], type_uri: &str) -> Result<EncryptedData> {
        let algorithm = self.algorithm.clone().ok_or_else(|| {
            Error::MissingAlgorithm("encryption requires an algorithm at construction".into())
        })?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::KeyResolution("no encryption key set".into()))?;
        let key_bytes = key.symmetric_key_bytes().ok_or_else(|| {
            Error::CipherOperation("data encryption requires a symmetric key".into())
        })?;

        let cipher = self.registry.data_cipher(&algorithm)?;
        let ciphertext = cipher.encrypt(key_bytes, octets)?;

        let template = self
            .encrypted_data
            .as_ref()
            .ok_or_else(|| Error::InvalidMode("cipher not initialized".into()))?;
        let mut ed = template.clone();
        ed.base.type_uri = Some(type_uri.to_owned());
        ed.base.encryption_method = Some(EncryptionMethod::new(&algorithm));
        ed.base.cipher_data.set_value(ciphertext)?;
        Ok(ed)
    }

    // ── Decryption ───────────────────────────────────────────────────

    /// Decrypt an `xenc:EncryptedData` element to raw plaintext octets
    /// without touching the tree.
    pub fn decrypt_element_to_octets(&mut self, doc: &Document, el: NodeId) -> Result<Vec<u8>> {
        let ed = model::unmarshal_encrypted_data(doc, el)?;
        self.decrypt_to_octets(doc, &ed)
    }

    /// Decrypt an `xenc:EncryptedData` element and splice the recovered
    /// nodes into its place.  Returns the spliced nodes.
    pub fn decrypt_element(&mut self, doc: &mut Document, el: NodeId) -> Result<Vec<NodeId>> {
        self.require_mode(Mode::Decrypt)?;
        log::debug!("decrypting EncryptedData");

        let ed = model::unmarshal_encrypted_data(doc, el)?;
        let octets = self.decrypt_to_octets(doc, &ed)?;

        // Prefixes in the fragment resolve against the replacement point.
        let context = doc.parent(el).unwrap_or(el);
        let nodes = fragment::deserialize(doc, context, &octets)?;
        doc.replace_with(el, &nodes)?;
        Ok(nodes)
    }

    /// Decrypt the `xenc:EncryptedData` child holding an element's
    /// encrypted content.  Returns the spliced nodes.
    pub fn decrypt_element_content(
        &mut self,
        doc: &mut Document,
        el: NodeId,
    ) -> Result<Vec<NodeId>> {
        let ed_el = doc
            .find_child(el, ns::ENC, ns::node::ENCRYPTED_DATA)
            .ok_or_else(|| {
                Error::StructureParse(format!(
                    "element {:?} has no EncryptedData child",
                    doc.local_name(el)
                ))
            })?;
        self.decrypt_element(doc, ed_el)
    }

    /// Decrypt an unmarshaled `EncryptedData` to raw plaintext octets.
    pub fn decrypt_to_octets(&mut self, doc: &Document, ed: &EncryptedData) -> Result<Vec<u8>> {
        self.require_mode(Mode::Decrypt)?;

        let algorithm = self.effective_algorithm(ed.base.encryption_method.as_ref())?;
        let ciphertext = self.cipher_data_octets(doc, &ed.base.cipher_data)?;
        let key = self.resolve_data_key(doc, ed, &algorithm)?;
        let key_bytes = key.symmetric_key_bytes().ok_or_else(|| {
            Error::CipherOperation("data decryption requires a symmetric key".into())
        })?;

        let cipher = self.registry.data_cipher(&algorithm)?;
        cipher.decrypt(key_bytes, &ciphertext)
    }

    /// The key for a data decryption: the engine key if set, otherwise a
    /// session key unwrapped from `KeyInfo` with the KEK, otherwise the
    /// resolver.
    fn resolve_data_key(
        &self,
        doc: &Document,
        ed: &EncryptedData,
        data_algorithm: &str,
    ) -> Result<Key> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }

        if let Some(key_info) = &ed.base.key_info {
            if let Some(kek) = &self.kek {
                let mut last_err = None;
                for ek in &key_info.encrypted_keys {
                    match self.unwrap_with(doc, ek, kek) {
                        Ok(key_bytes) => {
                            return Ok(symmetric_key_for(data_algorithm, key_bytes))
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                if let Some(e) = last_err {
                    return Err(e);
                }
            }
            if let Some(resolver) = &self.resolver {
                if !key_info.key_names.is_empty() {
                    let hint = KeyInfoHint {
                        key_names: key_info.key_names.clone(),
                    };
                    return resolver.resolve(&hint);
                }
            }
        }

        Err(Error::KeyResolution(
            "no decryption key set, unwrappable or resolvable".into(),
        ))
    }

    // ── Key wrap / unwrap ────────────────────────────────────────────

    /// Wrap a key, producing an `EncryptedKey` built from the active
    /// template.  The engine key is the KEK.
    pub fn wrap_key(&mut self, key: &Key) -> Result<EncryptedKey> {
        self.require_mode(Mode::Wrap)?;
        log::debug!("wrapping key");

        let algorithm = self.algorithm.clone().ok_or_else(|| {
            Error::MissingAlgorithm("key wrap requires an algorithm at construction".into())
        })?;
        let kek = self
            .key
            .as_ref()
            .ok_or_else(|| Error::KeyResolution("no key-encryption key set".into()))?;
        let payload = key.symmetric_key_bytes().ok_or_else(|| {
            Error::CipherOperation("only symmetric keys can be wrapped".into())
        })?;

        let ciphertext = if let Ok(kw) = self.registry.key_wrap(&algorithm) {
            let kek_bytes = kek.symmetric_key_bytes().ok_or_else(|| {
                Error::CipherOperation("symmetric key wrap requires a symmetric KEK".into())
            })?;
            kw.wrap(kek_bytes, payload)?
        } else {
            let transport = self.registry.key_transport(&algorithm)?;
            let public = kek.rsa_public_key().ok_or_else(|| {
                Error::CipherOperation("key transport requires an RSA KEK".into())
            })?;
            transport.encrypt(public, payload)?
        };

        let template = self
            .encrypted_key
            .as_ref()
            .ok_or_else(|| Error::InvalidMode("cipher not initialized".into()))?;
        let mut ek = template.clone();
        ek.base.encryption_method = Some(EncryptionMethod::new(&algorithm));
        ek.base.cipher_data.set_value(ciphertext)?;
        Ok(ek)
    }

    /// Unwrap an `EncryptedKey`, returning a key packaged for
    /// `target_algorithm`.  The engine key (or, failing that, the KEK) is
    /// the key-encryption key; the resolver is the last resort.
    pub fn unwrap_key(
        &mut self,
        doc: &Document,
        ek: &EncryptedKey,
        target_algorithm: &str,
    ) -> Result<Key> {
        self.require_mode(Mode::Unwrap)?;
        log::debug!("unwrapping key for {target_algorithm}");

        // The target may be any known algorithm: a data cipher for session
        // keys, or a key wrap for a KEK wrapped under another KEK.  Its
        // family decides what kind of key the octets become.
        validate_algorithm(&self.registry, target_algorithm)?;

        if let Some(kek) = self.key.as_ref().or(self.kek.as_ref()) {
            let octets = self.unwrap_with(doc, ek, kek)?;
            return Ok(symmetric_key_for(target_algorithm, octets));
        }
        if let Some(resolver) = &self.resolver {
            if let Some(key_info) = &ek.base.key_info {
                if !key_info.key_names.is_empty() {
                    let hint = KeyInfoHint {
                        key_names: key_info.key_names.clone(),
                    };
                    let kek = resolver.resolve(&hint)?;
                    let octets = self.unwrap_with(doc, ek, &kek)?;
                    return Ok(symmetric_key_for(target_algorithm, octets));
                }
            }
        }
        Err(Error::KeyResolution(
            "no key-encryption key set or resolvable".into(),
        ))
    }

    fn unwrap_with(&self, doc: &Document, ek: &EncryptedKey, kek: &Key) -> Result<Vec<u8>> {
        let algorithm = self.effective_algorithm(ek.base.encryption_method.as_ref())?;
        let ciphertext = self.cipher_data_octets(doc, &ek.base.cipher_data)?;

        if let Ok(kw) = self.registry.key_wrap(&algorithm) {
            let kek_bytes = kek.symmetric_key_bytes().ok_or_else(|| {
                Error::CipherOperation("symmetric key unwrap requires a symmetric KEK".into())
            })?;
            return kw.unwrap(kek_bytes, &ciphertext);
        }

        let params = match ek.base.encryption_method.as_ref() {
            Some(method) => OaepParams {
                digest_uri: method.digest_algorithm.clone(),
                label: method.oaep_params.clone(),
            },
            None => OaepParams::default(),
        };
        let transport = self.registry.key_transport_with_params(&algorithm, params)?;
        let private = kek.rsa_private_key().ok_or_else(|| {
            Error::CipherOperation("key transport requires an RSA private KEK".into())
        })?;
        transport.decrypt(private, &ciphertext)
    }

    // ── Shared helpers ───────────────────────────────────────────────

    fn require_mode(&self, expected: Mode) -> Result<()> {
        match self.mode {
            Some(mode) if mode == expected => Ok(()),
            Some(mode) => Err(Error::InvalidMode(format!(
                "operation requires {expected:?} mode, cipher is in {mode:?} mode"
            ))),
            None => Err(Error::InvalidMode("cipher not initialized".into())),
        }
    }

    /// The algorithm for an operation: the structure's `EncryptionMethod`
    /// wins, the engine's construction-time algorithm is the fallback.
    fn effective_algorithm(&self, method: Option<&EncryptionMethod>) -> Result<String> {
        method
            .map(|m| m.algorithm.clone())
            .or_else(|| self.algorithm.clone())
            .ok_or_else(|| {
                Error::MissingAlgorithm(
                    "structure has no EncryptionMethod and no algorithm was set".into(),
                )
            })
    }

    /// The ciphertext octets of a `CipherData`, resolving a
    /// `CipherReference` if needed.
    fn cipher_data_octets(&self, doc: &Document, cipher_data: &CipherData) -> Result<Vec<u8>> {
        if let Some(bytes) = cipher_data.as_value() {
            return Ok(bytes.to_vec());
        }
        match cipher_data.as_reference() {
            Some(reference) => resolve_cipher_reference(doc, reference),
            None => Err(Error::StructureParse("empty CipherData".into())),
        }
    }
}

/// Resolve a same-document `CipherReference`.
///
/// The URI must be a bare fragment pointing at an element with a matching
/// `Id` attribute.  Transforms are applied in order; only the base64
/// transform is supported.  With no transforms the referenced text content
/// is taken as base64, matching `CipherValue` semantics.
fn resolve_cipher_reference(doc: &Document, reference: &CipherReference) -> Result<Vec<u8>> {
    let id = reference.uri.strip_prefix('#').ok_or_else(|| {
        Error::UnsupportedAlgorithm(format!(
            "cipher reference URI scheme: {}",
            reference.uri
        ))
    })?;

    let target = doc
        .descendants(doc.root())
        .into_iter()
        .find(|n| doc.attribute(*n, None, ns::attr::ID) == Some(id))
        .ok_or_else(|| {
            Error::StructureParse(format!("cipher reference target not found: #{id}"))
        })?;

    let text = doc.text_content(target);
    if reference.transforms.is_empty() {
        return model::decode_b64(&text);
    }
    let mut octets = text.into_bytes();
    for transform in &reference.transforms {
        match transform.as_str() {
            algorithm::BASE64 => {
                let text = String::from_utf8(octets)
                    .map_err(|e| Error::Base64(e.to_string()))?;
                octets = model::decode_b64(&text)?;
            }
            other => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "cipher reference transform: {other}"
                )))
            }
        }
    }
    Ok(octets)
}

/// Package unwrapped key octets as the key type the target algorithm
/// expects.
fn symmetric_key_for(target_algorithm: &str, key_bytes: Vec<u8>) -> Key {
    match target_algorithm {
        algorithm::TRIPLEDES_CBC | algorithm::KW_TRIPLEDES => {
            Key::new(KeyData::Des3(key_bytes), sigtuna_keys::KeyUsage::Decrypt)
        }
        _ => Key::new(KeyData::Aes(key_bytes), sigtuna_keys::KeyUsage::Decrypt),
    }
}

fn validate_algorithm(registry: &AlgorithmRegistry, uri: &str) -> Result<()> {
    if AlgorithmRegistry::cipher_spec(uri).is_ok()
        || registry.key_wrap(uri).is_ok()
        || registry.key_transport(uri).is_ok()
    {
        Ok(())
    } else {
        Err(Error::UnsupportedAlgorithm(uri.to_owned()))
    }
}
