//! Blob storage for parse results, postings and raw source text.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// The blobs kept per parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blob {
    Source,
    ParseResult,
    Postings,
}

impl Blob {
    pub const ALL: [Blob; 3] = [Blob::Source, Blob::ParseResult, Blob::Postings];

    fn name(self) -> &'static str {
        match self {
            Blob::Source => "source",
            Blob::ParseResult => "parsed.json",
            Blob::Postings => "postings.json",
        }
    }

    pub fn key(self, index: &Uuid, document: &Uuid) -> String {
        format!("{index}/{document}/{}", self.name())
    }
}

pub trait ObjectStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Keeps blobs in a dedicated tree of the catalog database.
pub struct SledObjectStore {
    tree: sled::Tree,
}

impl SledObjectStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self { tree: db.open_tree("objects")? })
    }
}

impl ObjectStore for SledObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.tree.contains_key(key.as_bytes())?)
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ObjectStore) {
        assert_eq!(store.get("a/b").unwrap(), None);
        store.put("a/b", b"hello").unwrap();
        assert_eq!(store.get("a/b").unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(store.exists("a/b").unwrap());
        store.put("a/b", b"again").unwrap();
        assert_eq!(store.get("a/b").unwrap().as_deref(), Some(&b"again"[..]));
        store.delete("a/b").unwrap();
        store.delete("a/b").unwrap();
        assert!(!store.exists("a/b").unwrap());
    }

    #[test]
    fn blob_keys_are_namespaced() {
        let index = Uuid::nil();
        let doc = Uuid::from_u128(1);
        assert_eq!(
            Blob::Postings.key(&index, &doc),
            format!("{index}/{doc}/postings.json")
        );
        assert_ne!(Blob::Source.key(&index, &doc), Blob::ParseResult.key(&index, &doc));
    }

    #[test]
    fn memory_store() {
        let store = MemoryObjectStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn sled_store() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        exercise(&SledObjectStore::open(&db).unwrap());
    }
}
