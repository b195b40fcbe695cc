//! Cipher key storage for crypto-shredding.
//!
//! Projections carrying personal data encrypt it per subject; erasure is
//! performed by deleting the subject's key rather than rewriting history.
//! The engine itself never touches keys; this is the contract a
//! personal-data-bearing projector's storage depends on.

use async_trait::async_trait;
use nutype::nutype;

use crate::errors::CipherKeyError;

/// Identifies the person/entity a cipher key belongs to.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct SubjectId(String);

/// An opaque symmetric key.
///
/// The engine never interprets key material; it is carried as bytes
/// between the store and whichever cipher the projection uses.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey(Vec<u8>);

impl CipherKey {
    /// Wraps raw key material.
    pub const fn new(material: Vec<u8>) -> Self {
        Self(material)
    }

    /// The raw key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CipherKey {
    // Key material stays out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Durable per-subject key storage.
#[async_trait]
pub trait CipherKeyStore: Send + Sync {
    /// Fetches the key for a subject.
    ///
    /// Fails with [`CipherKeyError::NotExists`] when no key is stored.
    /// After crypto-shredding, this is exactly what erasure looks like to
    /// a reader.
    async fn get(&self, subject: &SubjectId) -> Result<CipherKey, CipherKeyError>;

    /// Stores (or replaces) the key for a subject.
    async fn store(&self, subject: &SubjectId, key: CipherKey) -> Result<(), CipherKeyError>;

    /// Deletes the key for a subject, shredding everything encrypted
    /// under it.
    async fn remove(&self, subject: &SubjectId) -> Result<(), CipherKeyError>;
}
