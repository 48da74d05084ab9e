#![forbid(unsafe_code)]

//! `EncryptedData` / `EncryptedKey` structure model.
//!
//! The types here mirror the xenc schema: an `EncryptedType` base shared by
//! [`EncryptedData`] and [`EncryptedKey`], a [`CipherData`] that carries
//! either an inline `CipherValue` or a `CipherReference`, and the optional
//! `EncryptionMethod`, `KeyInfo` and `EncryptionProperties` children.
//! Marshal functions build detached element trees; unmarshal functions read
//! them back and fail with `StructureParse` on malformed input.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sigtuna_core::{ns, Error, Result};
use sigtuna_xml::{fragment, Document, NodeId};

/// Placeholder `CipherValue` content used in freshly initialized templates.
pub(crate) const NO_VALUE_YET: &[u8] = b"NO VALUE YET";

// ── Types ────────────────────────────────────────────────────────────

/// Fields shared by `EncryptedData` and `EncryptedKey`.
#[derive(Debug, Clone, Default)]
pub struct EncryptedType {
    pub id: Option<String>,
    pub type_uri: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub encryption_method: Option<EncryptionMethod>,
    pub key_info: Option<KeyInfo>,
    pub cipher_data: CipherData,
    pub encryption_properties: Option<EncryptionProperties>,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptedData {
    pub base: EncryptedType,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptedKey {
    pub base: EncryptedType,
    pub recipient: Option<String>,
    pub reference_list: Option<ReferenceList>,
    pub carried_key_name: Option<String>,
}

/// `EncryptionMethod` with its algorithm-specific parameters.
#[derive(Debug, Clone)]
pub struct EncryptionMethod {
    pub algorithm: String,
    /// `KeySize` child, in bits.
    pub key_size: Option<usize>,
    /// `OAEPparams` child, base64-decoded.
    pub oaep_params: Option<Vec<u8>>,
    /// `ds:DigestMethod` child algorithm.
    pub digest_algorithm: Option<String>,
}

impl EncryptionMethod {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            key_size: None,
            oaep_params: None,
            digest_algorithm: None,
        }
    }
}

/// The `KeyInfo` children the engine understands: key names for resolver
/// lookup and nested `EncryptedKey` structures carrying the session key.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    pub key_names: Vec<String>,
    pub encrypted_keys: Vec<EncryptedKey>,
}

impl KeyInfo {
    pub fn is_empty(&self) -> bool {
        self.key_names.is_empty() && self.encrypted_keys.is_empty()
    }
}

/// `CipherData` payload: exactly one of an inline value or a reference.
#[derive(Debug, Clone)]
pub enum CipherDataKind {
    /// Raw ciphertext octets (base64-decoded `CipherValue`).
    Value(Vec<u8>),
    Reference(CipherReference),
}

#[derive(Debug, Clone)]
pub struct CipherData {
    kind: CipherDataKind,
}

impl Default for CipherData {
    fn default() -> Self {
        Self::value(Vec::new())
    }
}

impl CipherData {
    pub fn value(bytes: Vec<u8>) -> Self {
        Self {
            kind: CipherDataKind::Value(bytes),
        }
    }

    pub fn reference(reference: CipherReference) -> Self {
        Self {
            kind: CipherDataKind::Reference(reference),
        }
    }

    pub fn kind(&self) -> &CipherDataKind {
        &self.kind
    }

    /// Replace the inline value.  Fails if this `CipherData` carries a
    /// reference.
    pub fn set_value(&mut self, bytes: Vec<u8>) -> Result<()> {
        match &mut self.kind {
            CipherDataKind::Value(v) => {
                *v = bytes;
                Ok(())
            }
            CipherDataKind::Reference(_) => Err(Error::TypeMismatch(
                "CipherData carries a CipherReference, not a CipherValue".into(),
            )),
        }
    }

    /// Replace the reference.  Fails if this `CipherData` carries an inline
    /// value.
    pub fn set_reference(&mut self, reference: CipherReference) -> Result<()> {
        match &mut self.kind {
            CipherDataKind::Reference(r) => {
                *r = reference;
                Ok(())
            }
            CipherDataKind::Value(_) => Err(Error::TypeMismatch(
                "CipherData carries a CipherValue, not a CipherReference".into(),
            )),
        }
    }

    pub fn as_value(&self) -> Option<&[u8]> {
        match &self.kind {
            CipherDataKind::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&CipherReference> {
        match &self.kind {
            CipherDataKind::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// `CipherReference`: a URI plus the transforms that recover the raw
/// ciphertext octets from the referenced data.
#[derive(Debug, Clone)]
pub struct CipherReference {
    pub uri: String,
    /// Transform algorithm URIs, applied in order.
    pub transforms: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptionProperties {
    pub id: Option<String>,
    pub properties: Vec<EncryptionProperty>,
}

/// A single `EncryptionProperty`.  Children are kept as a serialized
/// fragment since their schema is open.
#[derive(Debug, Clone, Default)]
pub struct EncryptionProperty {
    pub target: Option<String>,
    pub id: Option<String>,
    pub content: Vec<u8>,
}

/// `ReferenceList` pointing at the `EncryptedData`/`EncryptedKey` elements
/// a key applies to.
#[derive(Debug, Clone, Default)]
pub struct ReferenceList {
    pub data_references: Vec<String>,
    pub key_references: Vec<String>,
}

impl ReferenceList {
    pub fn is_empty(&self) -> bool {
        self.data_references.is_empty() && self.key_references.is_empty()
    }
}

// ── Marshal ──────────────────────────────────────────────────────────

/// Build a detached `xenc:EncryptedData` element tree.
pub fn marshal_encrypted_data(doc: &mut Document, ed: &EncryptedData) -> Result<NodeId> {
    let el = new_enc_element(doc, ns::node::ENCRYPTED_DATA);
    doc.declare_namespace(el, Some(ns::ENC_PREFIX), ns::ENC);
    marshal_encrypted_type(doc, el, &ed.base)?;
    Ok(el)
}

/// Build a detached `xenc:EncryptedKey` element tree.
pub fn marshal_encrypted_key(doc: &mut Document, ek: &EncryptedKey) -> Result<NodeId> {
    let el = new_enc_element(doc, ns::node::ENCRYPTED_KEY);
    doc.declare_namespace(el, Some(ns::ENC_PREFIX), ns::ENC);
    if let Some(recipient) = &ek.recipient {
        doc.set_attribute(el, None, None, ns::attr::RECIPIENT, recipient);
    }
    marshal_encrypted_type(doc, el, &ek.base)?;
    if let Some(refs) = &ek.reference_list {
        if !refs.is_empty() {
            let list = new_enc_element(doc, ns::node::REFERENCE_LIST);
            for uri in &refs.data_references {
                let r = new_enc_element(doc, ns::node::DATA_REFERENCE);
                doc.set_attribute(r, None, None, ns::attr::URI, uri);
                doc.append_child(list, r);
            }
            for uri in &refs.key_references {
                let r = new_enc_element(doc, ns::node::KEY_REFERENCE);
                doc.set_attribute(r, None, None, ns::attr::URI, uri);
                doc.append_child(list, r);
            }
            doc.append_child(el, list);
        }
    }
    if let Some(name) = &ek.carried_key_name {
        let ckn = new_enc_element(doc, ns::node::CARRIED_KEY_NAME);
        let text = doc.create_text(name);
        doc.append_child(ckn, text);
        doc.append_child(el, ckn);
    }
    Ok(el)
}

fn marshal_encrypted_type(doc: &mut Document, el: NodeId, base: &EncryptedType) -> Result<()> {
    if let Some(id) = &base.id {
        doc.set_attribute(el, None, None, ns::attr::ID, id);
    }
    if let Some(type_uri) = &base.type_uri {
        doc.set_attribute(el, None, None, ns::attr::TYPE, type_uri);
    }
    if let Some(mime) = &base.mime_type {
        doc.set_attribute(el, None, None, ns::attr::MIME_TYPE, mime);
    }
    if let Some(encoding) = &base.encoding {
        doc.set_attribute(el, None, None, ns::attr::ENCODING, encoding);
    }

    if let Some(method) = &base.encryption_method {
        let m = marshal_encryption_method(doc, method);
        doc.append_child(el, m);
    }
    if let Some(key_info) = &base.key_info {
        if !key_info.is_empty() {
            let ki = marshal_key_info(doc, key_info)?;
            doc.append_child(el, ki);
        }
    }

    let cd = new_enc_element(doc, ns::node::CIPHER_DATA);
    match base.cipher_data.kind() {
        CipherDataKind::Value(bytes) => {
            let cv = new_enc_element(doc, ns::node::CIPHER_VALUE);
            let text = doc.create_text(&BASE64.encode(bytes));
            doc.append_child(cv, text);
            doc.append_child(cd, cv);
        }
        CipherDataKind::Reference(reference) => {
            let cr = new_enc_element(doc, ns::node::CIPHER_REFERENCE);
            doc.set_attribute(cr, None, None, ns::attr::URI, &reference.uri);
            if !reference.transforms.is_empty() {
                let transforms = new_enc_element(doc, ns::node::TRANSFORMS);
                for algorithm in &reference.transforms {
                    let t =
                        doc.create_element(Some(ns::DSIG), Some(ns::DSIG_PREFIX), ns::node::TRANSFORM);
                    doc.declare_namespace(t, Some(ns::DSIG_PREFIX), ns::DSIG);
                    doc.set_attribute(t, None, None, ns::attr::ALGORITHM, algorithm);
                    doc.append_child(transforms, t);
                }
                doc.append_child(cr, transforms);
            }
            doc.append_child(cd, cr);
        }
    }
    doc.append_child(el, cd);

    if let Some(props) = &base.encryption_properties {
        let ep = marshal_encryption_properties(doc, props)?;
        doc.append_child(el, ep);
    }
    Ok(())
}

fn marshal_encryption_method(doc: &mut Document, method: &EncryptionMethod) -> NodeId {
    let el = new_enc_element(doc, ns::node::ENCRYPTION_METHOD);
    doc.set_attribute(el, None, None, ns::attr::ALGORITHM, &method.algorithm);
    if let Some(bits) = method.key_size {
        let ks = new_enc_element(doc, ns::node::KEY_SIZE);
        let text = doc.create_text(&bits.to_string());
        doc.append_child(ks, text);
        doc.append_child(el, ks);
    }
    if let Some(params) = &method.oaep_params {
        let op = new_enc_element(doc, ns::node::OAEP_PARAMS);
        let text = doc.create_text(&BASE64.encode(params));
        doc.append_child(op, text);
        doc.append_child(el, op);
    }
    if let Some(digest) = &method.digest_algorithm {
        let dm =
            doc.create_element(Some(ns::DSIG), Some(ns::DSIG_PREFIX), ns::node::DIGEST_METHOD);
        doc.declare_namespace(dm, Some(ns::DSIG_PREFIX), ns::DSIG);
        doc.set_attribute(dm, None, None, ns::attr::ALGORITHM, digest);
        doc.append_child(el, dm);
    }
    el
}

fn marshal_key_info(doc: &mut Document, key_info: &KeyInfo) -> Result<NodeId> {
    let el = doc.create_element(Some(ns::DSIG), Some(ns::DSIG_PREFIX), ns::node::KEY_INFO);
    doc.declare_namespace(el, Some(ns::DSIG_PREFIX), ns::DSIG);
    for name in &key_info.key_names {
        let kn = doc.create_element(Some(ns::DSIG), Some(ns::DSIG_PREFIX), ns::node::KEY_NAME);
        let text = doc.create_text(name);
        doc.append_child(kn, text);
        doc.append_child(el, kn);
    }
    for ek in &key_info.encrypted_keys {
        let ek_el = marshal_encrypted_key(doc, ek)?;
        doc.append_child(el, ek_el);
    }
    Ok(el)
}

fn marshal_encryption_properties(
    doc: &mut Document,
    props: &EncryptionProperties,
) -> Result<NodeId> {
    let el = new_enc_element(doc, ns::node::ENCRYPTION_PROPERTIES);
    if let Some(id) = &props.id {
        doc.set_attribute(el, None, None, ns::attr::ID, id);
    }
    for prop in &props.properties {
        let p = new_enc_element(doc, ns::node::ENCRYPTION_PROPERTY);
        if let Some(target) = &prop.target {
            doc.set_attribute(p, None, None, ns::attr::TARGET, target);
        }
        if let Some(id) = &prop.id {
            doc.set_attribute(p, None, None, ns::attr::ID, id);
        }
        if !prop.content.is_empty() {
            let children = fragment::deserialize(doc, p, &prop.content)?;
            for child in children {
                doc.append_child(p, child);
            }
        }
        doc.append_child(el, p);
    }
    Ok(el)
}

fn new_enc_element(doc: &mut Document, local: &str) -> NodeId {
    doc.create_element(Some(ns::ENC), Some(ns::ENC_PREFIX), local)
}

// ── Unmarshal ────────────────────────────────────────────────────────

/// Read an `xenc:EncryptedData` element into the model.
pub fn unmarshal_encrypted_data(doc: &Document, el: NodeId) -> Result<EncryptedData> {
    expect_enc_element(doc, el, ns::node::ENCRYPTED_DATA)?;
    Ok(EncryptedData {
        base: unmarshal_encrypted_type(doc, el)?,
    })
}

/// Read an `xenc:EncryptedKey` element into the model.
pub fn unmarshal_encrypted_key(doc: &Document, el: NodeId) -> Result<EncryptedKey> {
    expect_enc_element(doc, el, ns::node::ENCRYPTED_KEY)?;
    let base = unmarshal_encrypted_type(doc, el)?;

    let reference_list = doc
        .find_child(el, ns::ENC, ns::node::REFERENCE_LIST)
        .map(|list| {
            let mut refs = ReferenceList::default();
            for child in doc.children(list) {
                if doc.namespace(*child) != Some(ns::ENC) {
                    continue;
                }
                let uri = doc
                    .attribute(*child, None, ns::attr::URI)
                    .unwrap_or("")
                    .to_owned();
                match doc.local_name(*child) {
                    Some(ns::node::DATA_REFERENCE) => refs.data_references.push(uri),
                    Some(ns::node::KEY_REFERENCE) => refs.key_references.push(uri),
                    _ => {}
                }
            }
            refs
        });

    let carried_key_name = doc
        .find_child(el, ns::ENC, ns::node::CARRIED_KEY_NAME)
        .map(|n| doc.text_content(n));

    Ok(EncryptedKey {
        base,
        recipient: doc
            .attribute(el, None, ns::attr::RECIPIENT)
            .map(|s| s.to_owned()),
        reference_list,
        carried_key_name,
    })
}

fn unmarshal_encrypted_type(doc: &Document, el: NodeId) -> Result<EncryptedType> {
    let encryption_method = doc
        .find_child(el, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .map(|m| unmarshal_encryption_method(doc, m))
        .transpose()?;

    let key_info = doc
        .find_child(el, ns::DSIG, ns::node::KEY_INFO)
        .map(|ki| unmarshal_key_info(doc, ki))
        .transpose()?;

    let cipher_data = unmarshal_cipher_data(doc, el)?;

    let encryption_properties = doc
        .find_child(el, ns::ENC, ns::node::ENCRYPTION_PROPERTIES)
        .map(|ep| unmarshal_encryption_properties(doc, ep))
        .transpose()?;

    Ok(EncryptedType {
        id: doc.attribute(el, None, ns::attr::ID).map(|s| s.to_owned()),
        type_uri: doc
            .attribute(el, None, ns::attr::TYPE)
            .map(|s| s.to_owned()),
        mime_type: doc
            .attribute(el, None, ns::attr::MIME_TYPE)
            .map(|s| s.to_owned()),
        encoding: doc
            .attribute(el, None, ns::attr::ENCODING)
            .map(|s| s.to_owned()),
        encryption_method,
        key_info,
        cipher_data,
        encryption_properties,
    })
}

/// Select this structure's own `CipherData`.
///
/// A `KeyInfo` child may nest `EncryptedKey` structures, each with its own
/// `CipherData`, and `KeyInfo` precedes `CipherData` in the schema.  The
/// structure's own `CipherData` is therefore the last one in document
/// order under `el`.
fn unmarshal_cipher_data(doc: &Document, el: NodeId) -> Result<CipherData> {
    let candidates = doc.find_descendants(el, ns::ENC, ns::node::CIPHER_DATA);
    let cd = *candidates.last().ok_or_else(|| {
        Error::StructureParse("EncryptedType has no CipherData child".into())
    })?;

    if let Some(cv) = doc.find_child(cd, ns::ENC, ns::node::CIPHER_VALUE) {
        return Ok(CipherData::value(decode_b64(&doc.text_content(cv))?));
    }
    if let Some(cr) = doc.find_child(cd, ns::ENC, ns::node::CIPHER_REFERENCE) {
        let uri = doc
            .attribute(cr, None, ns::attr::URI)
            .ok_or_else(|| Error::StructureParse("CipherReference without URI".into()))?
            .to_owned();
        let mut transforms = Vec::new();
        if let Some(ts) = doc.find_child(cr, ns::ENC, ns::node::TRANSFORMS) {
            for t in doc.children(ts) {
                if doc.local_name(*t) == Some(ns::node::TRANSFORM) {
                    if let Some(algorithm) = doc.attribute(*t, None, ns::attr::ALGORITHM) {
                        transforms.push(algorithm.to_owned());
                    }
                }
            }
        }
        return Ok(CipherData::reference(CipherReference { uri, transforms }));
    }
    Err(Error::StructureParse(
        "CipherData has neither CipherValue nor CipherReference".into(),
    ))
}

fn unmarshal_encryption_method(doc: &Document, el: NodeId) -> Result<EncryptionMethod> {
    let algorithm = doc
        .attribute(el, None, ns::attr::ALGORITHM)
        .ok_or_else(|| Error::StructureParse("EncryptionMethod without Algorithm".into()))?
        .to_owned();

    let key_size = doc
        .find_child(el, ns::ENC, ns::node::KEY_SIZE)
        .map(|ks| {
            doc.text_content(ks).trim().parse::<usize>().map_err(|_| {
                Error::StructureParse("KeySize is not a valid integer".into())
            })
        })
        .transpose()?;

    let oaep_params = doc
        .find_child(el, ns::ENC, ns::node::OAEP_PARAMS)
        .map(|op| decode_b64(&doc.text_content(op)))
        .transpose()?;

    let digest_algorithm = doc
        .find_child(el, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|dm| doc.attribute(dm, None, ns::attr::ALGORITHM))
        .map(|s| s.to_owned());

    Ok(EncryptionMethod {
        algorithm,
        key_size,
        oaep_params,
        digest_algorithm,
    })
}

fn unmarshal_key_info(doc: &Document, el: NodeId) -> Result<KeyInfo> {
    let mut key_info = KeyInfo::default();
    for child in doc.children(el) {
        match (doc.namespace(*child), doc.local_name(*child)) {
            (Some(ns::DSIG), Some(ns::node::KEY_NAME)) => {
                key_info.key_names.push(doc.text_content(*child));
            }
            (Some(ns::ENC), Some(ns::node::ENCRYPTED_KEY)) => {
                key_info
                    .encrypted_keys
                    .push(unmarshal_encrypted_key(doc, *child)?);
            }
            _ => {}
        }
    }
    Ok(key_info)
}

fn unmarshal_encryption_properties(doc: &Document, el: NodeId) -> Result<EncryptionProperties> {
    let mut props = EncryptionProperties {
        id: doc.attribute(el, None, ns::attr::ID).map(|s| s.to_owned()),
        properties: Vec::new(),
    };
    for child in doc.children(el) {
        if doc.namespace(*child) == Some(ns::ENC)
            && doc.local_name(*child) == Some(ns::node::ENCRYPTION_PROPERTY)
        {
            props.properties.push(EncryptionProperty {
                target: doc
                    .attribute(*child, None, ns::attr::TARGET)
                    .map(|s| s.to_owned()),
                id: doc
                    .attribute(*child, None, ns::attr::ID)
                    .map(|s| s.to_owned()),
                content: fragment::serialize_children(doc, *child)?,
            });
        }
    }
    Ok(props)
}

fn expect_enc_element(doc: &Document, el: NodeId, local: &str) -> Result<()> {
    if doc.namespace(el) == Some(ns::ENC) && doc.local_name(el) == Some(local) {
        Ok(())
    } else {
        Err(Error::StructureParse(format!(
            "expected xenc:{local}, found {:?}",
            doc.local_name(el)
        )))
    }
}

/// Decode base64, ignoring the whitespace XML serializers are allowed to
/// insert into text content.
pub(crate) fn decode_b64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_core::algorithm;

    fn sample_encrypted_data() -> EncryptedData {
        EncryptedData {
            base: EncryptedType {
                id: Some("ed-1".into()),
                type_uri: Some(ns::ENC_TYPE_ELEMENT.into()),
                encryption_method: Some(EncryptionMethod::new(algorithm::AES128_CBC)),
                key_info: Some(KeyInfo {
                    key_names: vec!["session".into()],
                    encrypted_keys: Vec::new(),
                }),
                cipher_data: CipherData::value(vec![1, 2, 3, 4]),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_encrypted_data_marshal_unmarshal() {
        let mut doc = Document::new();
        let el = marshal_encrypted_data(&mut doc, &sample_encrypted_data()).unwrap();

        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        assert_eq!(parsed.base.id.as_deref(), Some("ed-1"));
        assert_eq!(parsed.base.type_uri.as_deref(), Some(ns::ENC_TYPE_ELEMENT));
        assert_eq!(
            parsed.base.encryption_method.unwrap().algorithm,
            algorithm::AES128_CBC
        );
        assert_eq!(parsed.base.key_info.unwrap().key_names, ["session"]);
        assert_eq!(parsed.base.cipher_data.as_value(), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn test_encrypted_key_marshal_unmarshal() {
        let ek = EncryptedKey {
            base: EncryptedType {
                encryption_method: Some(EncryptionMethod::new(algorithm::KW_AES128)),
                cipher_data: CipherData::value(vec![9u8; 24]),
                ..Default::default()
            },
            recipient: Some("bob".into()),
            reference_list: Some(ReferenceList {
                data_references: vec!["#ed-1".into()],
                key_references: Vec::new(),
            }),
            carried_key_name: Some("session".into()),
        };

        let mut doc = Document::new();
        let el = marshal_encrypted_key(&mut doc, &ek).unwrap();
        let parsed = unmarshal_encrypted_key(&doc, el).unwrap();
        assert_eq!(parsed.recipient.as_deref(), Some("bob"));
        assert_eq!(parsed.carried_key_name.as_deref(), Some("session"));
        assert_eq!(
            parsed.reference_list.unwrap().data_references,
            ["#ed-1"]
        );
        assert_eq!(parsed.base.cipher_data.as_value(), Some(&[9u8; 24][..]));
    }

    #[test]
    fn test_nested_encrypted_key_cipher_data_selection() {
        // The outer EncryptedData's own CipherData must win over the one
        // inside the nested EncryptedKey, which comes first in document
        // order.
        let ed = EncryptedData {
            base: EncryptedType {
                encryption_method: Some(EncryptionMethod::new(algorithm::AES128_CBC)),
                key_info: Some(KeyInfo {
                    key_names: Vec::new(),
                    encrypted_keys: vec![EncryptedKey {
                        base: EncryptedType {
                            encryption_method: Some(EncryptionMethod::new(algorithm::KW_AES128)),
                            cipher_data: CipherData::value(b"wrapped-key".to_vec()),
                            ..Default::default()
                        },
                        ..Default::default()
                    }],
                }),
                cipher_data: CipherData::value(b"outer-payload".to_vec()),
                ..Default::default()
            },
        };

        let mut doc = Document::new();
        let el = marshal_encrypted_data(&mut doc, &ed).unwrap();
        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        assert_eq!(
            parsed.base.cipher_data.as_value(),
            Some(&b"outer-payload"[..])
        );
        let ki = parsed.base.key_info.unwrap();
        assert_eq!(
            ki.encrypted_keys[0].base.cipher_data.as_value(),
            Some(&b"wrapped-key"[..])
        );
    }

    #[test]
    fn test_cipher_data_type_mismatch() {
        let mut cd = CipherData::value(vec![1]);
        assert!(cd.set_value(vec![2]).is_ok());
        let err = cd
            .set_reference(CipherReference {
                uri: "#x".into(),
                transforms: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));

        let mut cd = CipherData::reference(CipherReference {
            uri: "#x".into(),
            transforms: Vec::new(),
        });
        assert!(matches!(
            cd.set_value(vec![1]).unwrap_err(),
            Error::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_cipher_reference_round_trip() {
        let ed = EncryptedData {
            base: EncryptedType {
                cipher_data: CipherData::reference(CipherReference {
                    uri: "#payload".into(),
                    transforms: vec![algorithm::BASE64.into()],
                }),
                ..Default::default()
            },
        };
        let mut doc = Document::new();
        let el = marshal_encrypted_data(&mut doc, &ed).unwrap();
        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        let reference = parsed.base.cipher_data.as_reference().unwrap();
        assert_eq!(reference.uri, "#payload");
        assert_eq!(reference.transforms, [algorithm::BASE64]);
    }

    #[test]
    fn test_missing_cipher_data_rejected() {
        let mut doc = Document::new();
        let el = doc.create_element(Some(ns::ENC), Some(ns::ENC_PREFIX), ns::node::ENCRYPTED_DATA);
        doc.declare_namespace(el, Some(ns::ENC_PREFIX), ns::ENC);
        let err = unmarshal_encrypted_data(&doc, el).unwrap_err();
        assert!(matches!(err, Error::StructureParse(_)));
    }

    #[test]
    fn test_wrong_element_rejected() {
        let doc = Document::parse("<a/>").unwrap();
        let el = doc.document_element().unwrap();
        assert!(unmarshal_encrypted_data(&doc, el).is_err());
    }

    #[test]
    fn test_encryption_method_parameters() {
        let mut method = EncryptionMethod::new(algorithm::RSA_OAEP);
        method.key_size = Some(256);
        method.oaep_params = Some(vec![0xDE, 0xAD]);
        method.digest_algorithm = Some(algorithm::SHA256.into());

        let ed = EncryptedData {
            base: EncryptedType {
                encryption_method: Some(method),
                cipher_data: CipherData::value(vec![0]),
                ..Default::default()
            },
        };
        let mut doc = Document::new();
        let el = marshal_encrypted_data(&mut doc, &ed).unwrap();
        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        let method = parsed.base.encryption_method.unwrap();
        assert_eq!(method.key_size, Some(256));
        assert_eq!(method.oaep_params.as_deref(), Some(&[0xDE, 0xAD][..]));
        assert_eq!(method.digest_algorithm.as_deref(), Some(algorithm::SHA256));
    }

    #[test]
    fn test_encryption_properties_round_trip() {
        let ed = EncryptedData {
            base: EncryptedType {
                cipher_data: CipherData::value(vec![0]),
                encryption_properties: Some(EncryptionProperties {
                    id: Some("props".into()),
                    properties: vec![EncryptionProperty {
                        target: Some("#ed-1".into()),
                        id: None,
                        content: b"<note>timestamped</note>".to_vec(),
                    }],
                }),
                ..Default::default()
            },
        };
        let mut doc = Document::new();
        let el = marshal_encrypted_data(&mut doc, &ed).unwrap();
        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        let props = parsed.base.encryption_properties.unwrap();
        assert_eq!(props.id.as_deref(), Some("props"));
        assert_eq!(props.properties[0].target.as_deref(), Some("#ed-1"));
        assert_eq!(props.properties[0].content, b"<note>timestamped</note>");
    }

    #[test]
    fn test_cipher_value_with_whitespace() {
        let xml = format!(
            "<xenc:EncryptedData xmlns:xenc=\"{}\"><xenc:CipherData><xenc:CipherValue>AQID\n  BA==</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>",
            ns::ENC
        );
        let doc = Document::parse(&xml).unwrap();
        let el = doc.document_element().unwrap();
        let parsed = unmarshal_encrypted_data(&doc, el).unwrap();
        assert_eq!(parsed.base.cipher_data.as_value(), Some(&[1u8, 2, 3, 4][..]));
    }
}
