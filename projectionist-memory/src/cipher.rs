//! In-memory cipher key store for crypto-shredding tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use projectionist::{CipherKey, CipherKeyError, CipherKeyStore, SubjectId};

/// In-memory [`CipherKeyStore`]. Clones share storage.
#[derive(Clone, Default)]
pub struct InMemoryCipherKeyStore {
    keys: Arc<RwLock<HashMap<SubjectId, CipherKey>>>,
}

impl InMemoryCipherKeyStore {
    /// Creates an empty key store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CipherKeyStore for InMemoryCipherKeyStore {
    async fn get(&self, subject: &SubjectId) -> Result<CipherKey, CipherKeyError> {
        let keys = self.keys.read().expect("RwLock poisoned");
        keys.get(subject)
            .cloned()
            .ok_or_else(|| CipherKeyError::NotExists(subject.to_string()))
    }

    async fn store(&self, subject: &SubjectId, key: CipherKey) -> Result<(), CipherKeyError> {
        let mut keys = self.keys.write().expect("RwLock poisoned");
        keys.insert(subject.clone(), key);
        Ok(())
    }

    async fn remove(&self, subject: &SubjectId) -> Result<(), CipherKeyError> {
        let mut keys = self.keys.write().expect("RwLock poisoned");
        keys.remove(subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(s: &str) -> SubjectId {
        SubjectId::try_new(s).unwrap()
    }

    #[tokio::test]
    async fn stored_keys_are_returned() {
        let store = InMemoryCipherKeyStore::new();
        store
            .store(&subject("alice"), CipherKey::new(vec![1, 2, 3]))
            .await
            .unwrap();

        let key = store.get(&subject("alice")).await.unwrap();
        assert_eq!(key.as_bytes(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn shredding_removes_the_key_for_good() {
        let store = InMemoryCipherKeyStore::new();
        store
            .store(&subject("alice"), CipherKey::new(vec![1, 2, 3]))
            .await
            .unwrap();

        store.remove(&subject("alice")).await.unwrap();
        assert!(matches!(
            store.get(&subject("alice")).await,
            Err(CipherKeyError::NotExists(_))
        ));
    }

    #[tokio::test]
    async fn missing_subjects_fail_with_not_exists() {
        let store = InMemoryCipherKeyStore::new();
        assert!(matches!(
            store.get(&subject("ghost")).await,
            Err(CipherKeyError::NotExists(_))
        ));
    }
}
