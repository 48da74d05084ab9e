//! End-to-end encryption round trips against real documents.

use sigtuna_core::{algorithm, ns, Error};
use sigtuna_enc::model::{marshal_encrypted_key, unmarshal_encrypted_key};
use sigtuna_enc::{Mode, XmlCipher};
use sigtuna_keys::{Key, KeyInfoHint, KeyResolver, KeyStore};
use sigtuna_xml::{fragment, Document};

const PURCHASE_ORDER: &str = r#"<PurchaseOrder xmlns="urn:example:po" xmlns:pay="urn:example:payment"><Items><Item code="001">bicycle</Item></Items><pay:Payment><pay:CardNumber>4019 2445 0277 5567</pay:CardNumber></pay:Payment></PurchaseOrder>"#;

fn render(doc: &Document) -> String {
    let root = doc.document_element().expect("document element");
    String::from_utf8(fragment::serialize_element(doc, root).expect("serialize")).expect("utf8")
}

#[test]
fn test_element_roundtrip_aes128() {
    let original = Document::parse(PURCHASE_ORDER).unwrap();
    let expected = render(&original);

    let key = Key::aes(vec![0x42u8; 16]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    assert_eq!(doc.namespace(ed_el), Some(ns::ENC));
    assert_eq!(doc.local_name(ed_el), Some(ns::node::ENCRYPTED_DATA));
    assert_eq!(
        doc.attribute(ed_el, None, ns::attr::TYPE),
        Some(ns::ENC_TYPE_ELEMENT)
    );
    let encrypted = render(&doc);
    assert!(!encrypted.contains("4019 2445"));

    cipher.init(Mode::Decrypt, Some(key));
    cipher.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(render(&doc), expected);
}

#[test]
fn test_element_roundtrip_survives_reserialization() {
    // The EncryptedData must be self-contained: serialize the whole
    // document to text, reparse, and decrypt the reparsed copy.
    let key = Key::aes(vec![0x17u8; 32]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES256_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    cipher.encrypt_element(&mut doc, payment).unwrap();

    let mut reparsed = Document::parse(&render(&doc)).unwrap();
    let root = reparsed.document_element().unwrap();
    let ed_el = reparsed.find_descendants(root, ns::ENC, ns::node::ENCRYPTED_DATA)[0];

    cipher.init(Mode::Decrypt, Some(key));
    let nodes = cipher.decrypt_element(&mut reparsed, ed_el).unwrap();
    assert_eq!(reparsed.local_name(nodes[0]), Some("Payment"));
    assert_eq!(reparsed.namespace(nodes[0]), Some("urn:example:payment"));
    assert!(render(&reparsed).contains("4019 2445 0277 5567"));
}

#[test]
fn test_element_roundtrip_aes192() {
    let original = Document::parse(PURCHASE_ORDER).unwrap();
    let expected = render(&original);

    let key = Key::aes(vec![0x5Eu8; 24]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES192_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    cipher.init(Mode::Decrypt, Some(key));
    cipher.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(render(&doc), expected);
}

#[test]
fn test_content_roundtrip_tripledes() {
    let original = Document::parse(PURCHASE_ORDER).unwrap();
    let expected = render(&original);

    let key = Key::tripledes(vec![0x2Au8; 24]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let items = doc.find_descendants(po, "urn:example:po", "Items")[0];

    let mut cipher = XmlCipher::new(algorithm::TRIPLEDES_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    let ed_el = cipher.encrypt_element_content(&mut doc, items).unwrap();

    assert_eq!(
        doc.attribute(ed_el, None, ns::attr::TYPE),
        Some(ns::ENC_TYPE_CONTENT)
    );
    // Items itself survives; its children are gone.
    assert_eq!(doc.children(items).len(), 1);
    assert!(!render(&doc).contains("bicycle"));

    cipher.init(Mode::Decrypt, Some(key));
    cipher.decrypt_element_content(&mut doc, items).unwrap();
    assert_eq!(render(&doc), expected);
}

#[test]
fn test_content_roundtrip_mixed_text_and_elements() {
    let source = "<doc>leading<a/>middle<b>deep</b>trailing</doc>";
    let key = Key::aes(vec![0x03u8; 16]);
    let mut doc = Document::parse(source).unwrap();
    let root = doc.document_element().unwrap();

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    cipher.encrypt_element_content(&mut doc, root).unwrap();

    cipher.init(Mode::Decrypt, Some(key));
    cipher.decrypt_element_content(&mut doc, root).unwrap();
    assert_eq!(render(&doc), source);
}

#[test]
fn test_wrapped_session_key_in_key_info() {
    // Session key wrapped under a KEK, nested in the EncryptedData's
    // KeyInfo; decryption side holds only the KEK.
    let kek = Key::aes(vec![0x55u8; 16]);
    let session = Key::aes(vec![0x99u8; 16]);

    let mut wrapper = XmlCipher::new(algorithm::KW_AES128).unwrap();
    wrapper.init(Mode::Wrap, Some(kek.clone()));
    let ek = wrapper.wrap_key(&session).unwrap();

    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(session));
    cipher.add_encrypted_key(ek).unwrap();
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    // KeyInfo precedes CipherData, so the nested EncryptedKey's CipherData
    // comes first in document order.
    let cipher_datas = doc.find_descendants(ed_el, ns::ENC, ns::node::CIPHER_DATA);
    assert_eq!(cipher_datas.len(), 2);

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, None);
    decryptor.set_kek(kek);
    let nodes = decryptor.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(doc.local_name(nodes[0]), Some("Payment"));
}

#[test]
fn test_rsa_oaep_key_transport_roundtrip() {
    let mut rng = rand::thread_rng();
    let private = rsa::RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
    let kek = Key::rsa(private);
    let session = vec![0xABu8; 24];

    let mut wrapper = XmlCipher::new(algorithm::RSA_OAEP).unwrap();
    wrapper.init(Mode::Wrap, Some(kek.clone()));
    let ek = wrapper.wrap_key(&Key::tripledes(session.clone())).unwrap();
    assert_eq!(
        ek.base.encryption_method.as_ref().map(|m| m.algorithm.as_str()),
        Some(algorithm::RSA_OAEP)
    );

    // Marshal and unmarshal the EncryptedKey before unwrapping.
    let mut doc = Document::new();
    let ek_el = marshal_encrypted_key(&mut doc, &ek).unwrap();
    let parsed = unmarshal_encrypted_key(&doc, ek_el).unwrap();

    let mut unwrapper = XmlCipher::without_algorithm();
    unwrapper.init(Mode::Unwrap, Some(kek));
    let unwrapped = unwrapper
        .unwrap_key(&doc, &parsed, algorithm::TRIPLEDES_CBC)
        .unwrap();
    assert_eq!(unwrapped.symmetric_key_bytes(), Some(&session[..]));
}

#[test]
fn test_rsa_pkcs1_key_transport_roundtrip() {
    let mut rng = rand::thread_rng();
    let private = rsa::RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
    let kek = Key::rsa(private);
    let session = vec![0xCDu8; 16];

    let mut wrapper = XmlCipher::new(algorithm::RSA_PKCS1).unwrap();
    wrapper.init(Mode::Wrap, Some(kek.clone()));
    let ek = wrapper.wrap_key(&Key::aes(session.clone())).unwrap();

    let doc = Document::new();
    let mut unwrapper = XmlCipher::without_algorithm();
    unwrapper.init(Mode::Unwrap, Some(kek));
    let unwrapped = unwrapper
        .unwrap_key(&doc, &ek, algorithm::AES128_CBC)
        .unwrap();
    assert_eq!(unwrapped.symmetric_key_bytes(), Some(&session[..]));
}

#[test]
fn test_key_resolver_by_key_name() {
    let key = Key::aes(vec![0x61u8; 16]).with_name("job-quill");

    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    cipher.add_key_name("job-quill").unwrap();
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    let mut store = KeyStore::new();
    store.add_key(Key::aes(vec![0x00u8; 16]).with_name("other"));
    store.add_key(key);

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, None);
    decryptor.set_key_resolver(Box::new(store));
    let nodes = decryptor.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(doc.local_name(nodes[0]), Some("Payment"));
}

#[test]
fn test_resolver_failure_surfaces_as_key_resolution() {
    struct NoKeys;
    impl KeyResolver for NoKeys {
        fn resolve(&self, hint: &KeyInfoHint) -> sigtuna_core::Result<Key> {
            Err(Error::KeyResolution(format!("nothing for {:?}", hint.key_names)))
        }
    }

    let key = Key::aes(vec![0x61u8; 16]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key));
    cipher.add_key_name("absent").unwrap();
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, None);
    decryptor.set_key_resolver(Box::new(NoKeys));
    let err = decryptor.decrypt_element(&mut doc, ed_el).unwrap_err();
    assert!(matches!(err, Error::KeyResolution(_)));
}

#[test]
fn test_decrypt_without_any_key_fails() {
    let key = Key::aes(vec![0x10u8; 16]);
    let mut doc = Document::parse(PURCHASE_ORDER).unwrap();
    let po = doc.document_element().unwrap();
    let payment = doc.find_descendants(po, "urn:example:payment", "Payment")[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key));
    let ed_el = cipher.encrypt_element(&mut doc, payment).unwrap();

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, None);
    let err = decryptor.decrypt_element(&mut doc, ed_el).unwrap_err();
    assert!(matches!(err, Error::KeyResolution(_)));
}

#[test]
fn test_decrypt_unknown_algorithm_fails() {
    let xml = format!(
        r#"<xenc:EncryptedData xmlns:xenc="{}"><xenc:EncryptionMethod Algorithm="urn:example:cipher"/><xenc:CipherData><xenc:CipherValue>AAAA</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#,
        ns::ENC
    );
    let mut doc = Document::parse(&xml).unwrap();
    let ed_el = doc.document_element().unwrap();

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, Some(Key::aes(vec![0u8; 16])));
    let err = decryptor.decrypt_element(&mut doc, ed_el).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
}

#[test]
fn test_decrypt_without_method_or_algorithm_fails() {
    let xml = format!(
        r#"<xenc:EncryptedData xmlns:xenc="{}"><xenc:CipherData><xenc:CipherValue>AAAA</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#,
        ns::ENC
    );
    let mut doc = Document::parse(&xml).unwrap();
    let ed_el = doc.document_element().unwrap();

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, Some(Key::aes(vec![0u8; 16])));
    let err = decryptor.decrypt_element(&mut doc, ed_el).unwrap_err();
    assert!(matches!(err, Error::MissingAlgorithm(_)));
}

#[test]
fn test_cipher_reference_same_document() {
    // Encrypt normally, then move the base64 ciphertext into a separate
    // element addressed through a CipherReference.
    let key = Key::aes(vec![0x31u8; 16]);
    let mut doc = Document::parse("<env><secret>payload</secret></env>").unwrap();
    let env = doc.document_element().unwrap();
    let secret = doc.children(env)[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    let ed_el = cipher.encrypt_element(&mut doc, secret).unwrap();

    let cd = doc.find_child(ed_el, ns::ENC, ns::node::CIPHER_DATA).unwrap();
    let cv = doc.find_child(cd, ns::ENC, ns::node::CIPHER_VALUE).unwrap();
    let b64 = doc.text_content(cv);

    let rewritten = format!(
        r##"<env><store Id="ct-1">{b64}</store><xenc:EncryptedData xmlns:xenc="{enc}" Type="{etype}"><xenc:EncryptionMethod Algorithm="{alg}"/><xenc:CipherData><xenc:CipherReference URI="#ct-1"><xenc:Transforms><ds:Transform xmlns:ds="{dsig}" Algorithm="{b64alg}"/></xenc:Transforms></xenc:CipherReference></xenc:CipherData></xenc:EncryptedData></env>"##,
        enc = ns::ENC,
        etype = ns::ENC_TYPE_ELEMENT,
        alg = algorithm::AES128_CBC,
        dsig = ns::DSIG,
        b64alg = algorithm::BASE64,
    );
    let mut doc = Document::parse(&rewritten).unwrap();
    let env = doc.document_element().unwrap();
    let ed_el = doc.find_child(env, ns::ENC, ns::node::ENCRYPTED_DATA).unwrap();

    let mut decryptor = XmlCipher::without_algorithm();
    decryptor.init(Mode::Decrypt, Some(key));
    let nodes = decryptor.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(doc.local_name(nodes[0]), Some("secret"));
    assert_eq!(doc.text_content(nodes[0]), "payload");
}

#[test]
fn test_wire_format_is_base64_iv_then_ciphertext() {
    let key = Key::aes(vec![0x77u8; 16]);
    let mut doc = Document::parse("<a><b>sixteen byte pt</b></a>").unwrap();
    let b = doc.children(doc.document_element().unwrap())[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key));
    let ed_el = cipher.encrypt_element(&mut doc, b).unwrap();

    let cd = doc.find_child(ed_el, ns::ENC, ns::node::CIPHER_DATA).unwrap();
    let cv = doc.find_child(cd, ns::ENC, ns::node::CIPHER_VALUE).unwrap();
    let raw = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(doc.text_content(cv))
            .expect("CipherValue is base64")
    };
    // <b>sixteen byte pt</b> is 22 octets: IV (16) + two padded blocks.
    assert_eq!(raw.len(), 16 + 32);
}

#[test]
fn test_wrap_key_roundtrip_all_kw_sizes() {
    let cases: &[(&str, usize)] = &[
        (algorithm::KW_AES128, 16),
        (algorithm::KW_AES192, 24),
        (algorithm::KW_AES256, 32),
    ];
    for &(uri, kek_size) in cases {
        let kek = Key::aes((0..kek_size).map(|i| i as u8).collect());
        let session: Vec<u8> = (0..16u8).rev().collect();

        let mut wrapper = XmlCipher::new(uri).unwrap();
        wrapper.init(Mode::Wrap, Some(kek.clone()));
        let ek = wrapper.wrap_key(&Key::aes(session.clone())).unwrap();

        let doc = Document::new();
        let mut unwrapper = XmlCipher::without_algorithm();
        unwrapper.init(Mode::Unwrap, Some(kek));
        let unwrapped = unwrapper
            .unwrap_key(&doc, &ek, algorithm::AES128_CBC)
            .unwrap();
        assert_eq!(unwrapped.symmetric_key_bytes(), Some(&session[..]), "{uri}");
    }
}

#[test]
fn test_unwrap_kek_wrapped_under_master_kek() {
    // Two-level wrap: the session key's KEK is itself wrapped under a
    // master KEK, so the first unwrap targets a key wrap algorithm.
    let master = Key::aes(vec![0x0Au8; 16]);
    let kek = Key::aes(vec![0x0Bu8; 16]);
    let session = Key::aes(vec![0x0Cu8; 16]);

    let mut wrapper = XmlCipher::new(algorithm::KW_AES128).unwrap();
    wrapper.init(Mode::Wrap, Some(master.clone()));
    let wrapped_kek = wrapper.wrap_key(&kek).unwrap();
    wrapper.init(Mode::Wrap, Some(kek.clone()));
    let wrapped_session = wrapper.wrap_key(&session).unwrap();

    let doc = Document::new();
    let mut unwrapper = XmlCipher::without_algorithm();
    unwrapper.init(Mode::Unwrap, Some(master));
    let recovered_kek = unwrapper
        .unwrap_key(&doc, &wrapped_kek, algorithm::KW_AES128)
        .unwrap();
    assert_eq!(
        recovered_kek.symmetric_key_bytes(),
        kek.symmetric_key_bytes()
    );

    unwrapper.init(Mode::Unwrap, Some(recovered_kek));
    let recovered = unwrapper
        .unwrap_key(&doc, &wrapped_session, algorithm::AES128_CBC)
        .unwrap();
    assert_eq!(recovered.symmetric_key_bytes(), session.symmetric_key_bytes());
}

#[test]
fn test_unwrap_with_wrong_kek_fails() {
    let kek = Key::aes(vec![0x01u8; 16]);
    let mut wrapper = XmlCipher::new(algorithm::KW_AES128).unwrap();
    wrapper.init(Mode::Wrap, Some(kek));
    let ek = wrapper.wrap_key(&Key::aes(vec![0x02u8; 16])).unwrap();

    let doc = Document::new();
    let mut unwrapper = XmlCipher::without_algorithm();
    unwrapper.init(Mode::Unwrap, Some(Key::aes(vec![0xFFu8; 16])));
    let err = unwrapper
        .unwrap_key(&doc, &ek, algorithm::AES128_CBC)
        .unwrap_err();
    assert!(matches!(err, Error::CipherOperation(_)));
}

#[test]
fn test_unwrap_with_unknown_target_algorithm_fails() {
    let kek = Key::aes(vec![0x01u8; 16]);
    let mut wrapper = XmlCipher::new(algorithm::KW_AES128).unwrap();
    wrapper.init(Mode::Wrap, Some(kek.clone()));
    let ek = wrapper.wrap_key(&Key::aes(vec![0x02u8; 16])).unwrap();

    let doc = Document::new();
    let mut unwrapper = XmlCipher::without_algorithm();
    unwrapper.init(Mode::Unwrap, Some(kek));
    let err = unwrapper
        .unwrap_key(&doc, &ek, "urn:example:target")
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
}

#[test]
fn test_template_id_survives_into_output() {
    let key = Key::aes(vec![0x2Bu8; 16]);
    let mut doc = Document::parse("<a><b>x</b></a>").unwrap();
    let b = doc.children(doc.document_element().unwrap())[0];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key));
    cipher
        .encrypted_data_template_mut()
        .expect("Encrypt template")
        .base
        .id = Some("ed-42".into());
    let ed_el = cipher.encrypt_element(&mut doc, b).unwrap();
    assert_eq!(doc.attribute(ed_el, None, ns::attr::ID), Some("ed-42"));
}

#[test]
fn test_encrypted_element_keeps_sibling_order() {
    let key = Key::aes(vec![0x08u8; 16]);
    let mut doc = Document::parse("<r><a/><target>x</target><c/></r>").unwrap();
    let r = doc.document_element().unwrap();
    let target = doc.children(r)[1];

    let mut cipher = XmlCipher::new(algorithm::AES128_CBC).unwrap();
    cipher.init(Mode::Encrypt, Some(key.clone()));
    let ed_el = cipher.encrypt_element(&mut doc, target).unwrap();
    assert_eq!(doc.children(r)[1], ed_el);

    cipher.init(Mode::Decrypt, Some(key));
    cipher.decrypt_element(&mut doc, ed_el).unwrap();
    assert_eq!(render(&doc), "<r><a/><target>x</target><c/></r>");
}
