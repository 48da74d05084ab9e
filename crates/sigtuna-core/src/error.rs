#![forbid(unsafe_code)]

/// Errors produced by the Sigtuna XML Encryption library.
///
/// Every failure is terminal for the current operation.  Cryptographic and
/// structural failures are not transient, so nothing here is ever retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was invoked without a matching `init`, or in the wrong
    /// operation mode.
    #[error("invalid cipher mode: {0}")]
    InvalidMode(String),

    /// An algorithm URI is not known to the registry.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// An operation needs a transformation that was never set at `init`.
    #[error("no transformation specified: {0}")]
    MissingAlgorithm(String),

    /// No decryption/unwrap key is configured or resolvable.
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// An `EncryptedData`/`EncryptedKey` element is structurally malformed.
    #[error("malformed encryption structure: {0}")]
    StructureParse(String),

    /// A serialized fragment could not be re-parsed.
    #[error("fragment parse error: {0}")]
    FragmentParse(String),

    /// Wraps any underlying cryptographic failure: bad key, bad padding,
    /// block-size violation, provider failure.
    #[error("cipher operation failed: {0}")]
    CipherOperation(String),

    /// Content encryption was requested on an element with no children.
    #[error("element has no content: {0}")]
    EmptyContent(String),

    /// The wrong `CipherData` payload variant was assigned.
    #[error("cipher data type mismatch: {0}")]
    TypeMismatch(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
