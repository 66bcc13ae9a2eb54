//! The catalog: an embedded sled database with one tree per record kind.
//!
//! Keys are concatenations of 16-byte GUIDs (and, for terms, the term text),
//! so that "every row of index X" or "every row of document D in index X" is a
//! prefix scan. Values are bincode records.

use crate::error::{Error, Result};
use crate::index::{IndexRecord, ParsedDocument, SourceDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{Transactional, Tree};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const INDICES: &str = "indices";
pub(crate) const INDEX_NAMES: &str = "index_names";
pub(crate) const SOURCE_DOCS: &str = "source_docs";
pub(crate) const PARSED_DOCS: &str = "parsed_docs";
pub(crate) const TERMS: &str = "terms";
pub(crate) const TERM_DOCS: &str = "term_docs";
pub(crate) const DOC_TERMS: &str = "doc_terms";
/// `index ‖ source document` → parsed document GUID.
pub(crate) const SOURCE_PARSED: &str = "source_parsed";

pub(crate) const GUID_LEN: usize = 16;

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn catalog(&self) -> PathBuf {
        self.root.join("catalog")
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn decode_guid(tree: &'static str, bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| Error::Corrupt { tree, reason: e.to_string() })
}

/// Abort payload for failures inside a sled transaction closure.
pub(crate) fn abort(err: Error) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err)
}

pub(crate) fn key(parts: &[&Uuid]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.len() * GUID_LEN);
    for part in parts {
        key.extend_from_slice(part.as_bytes());
    }
    key
}

/// Trailing GUID of a composite key.
pub(crate) fn last_guid(tree: &'static str, key: &[u8]) -> Result<Uuid> {
    if key.len() < GUID_LEN {
        return Err(Error::Corrupt { tree, reason: format!("key of {} bytes", key.len()) });
    }
    decode_guid(tree, &key[key.len() - GUID_LEN..])
}

pub struct Catalog {
    db: sled::Db,
    pub(crate) indices: Tree,
    pub(crate) index_names: Tree,
    pub(crate) source_docs: Tree,
    pub(crate) parsed_docs: Tree,
    pub(crate) terms: Tree,
    pub(crate) term_docs: Tree,
    pub(crate) doc_terms: Tree,
    pub(crate) source_parsed: Tree,
}

impl Catalog {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            db: db.clone(),
            indices: db.open_tree(INDICES)?,
            index_names: db.open_tree(INDEX_NAMES)?,
            source_docs: db.open_tree(SOURCE_DOCS)?,
            parsed_docs: db.open_tree(PARSED_DOCS)?,
            terms: db.open_tree(TERMS)?,
            term_docs: db.open_tree(TERM_DOCS)?,
            doc_terms: db.open_tree(DOC_TERMS)?,
            source_parsed: db.open_tree(SOURCE_PARSED)?,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn create_index(&self, name: &str) -> Result<IndexRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingInput("index name"));
        }
        let record = IndexRecord { guid: Uuid::new_v4(), name: name.to_string(), created_utc: OffsetDateTime::now_utc() };
        let bytes = encode(&record)?;
        (&self.index_names, &self.indices).transaction(|(names, indices): &(TransactionalTree, TransactionalTree)| {
            if names.get(name.as_bytes())?.is_some() {
                return Err(abort(Error::IndexExists(name.to_string())));
            }
            names.insert(name.as_bytes(), &record.guid.as_bytes()[..])?;
            indices.insert(&record.guid.as_bytes()[..], bytes.clone())?;
            Ok(())
        })?;
        tracing::info!(index = %record.name, guid = %record.guid, "created index");
        Ok(record)
    }

    pub fn index(&self, guid: &Uuid) -> Result<Option<IndexRecord>> {
        match self.indices.get(guid.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Looks an index up by name first, then by GUID.
    pub fn resolve_index(&self, name_or_guid: &str) -> Result<IndexRecord> {
        let name_or_guid = name_or_guid.trim();
        if name_or_guid.is_empty() {
            return Err(Error::MissingInput("index"));
        }
        if let Some(guid) = self.index_names.get(name_or_guid.as_bytes())? {
            let guid = decode_guid(INDEX_NAMES, &guid)?;
            if let Some(record) = self.index(&guid)? {
                return Ok(record);
            }
        }
        if let Ok(guid) = Uuid::parse_str(name_or_guid) {
            if let Some(record) = self.index(&guid)? {
                return Ok(record);
            }
        }
        Err(Error::IndexNotFound(name_or_guid.to_string()))
    }

    pub fn list_indices(&self) -> Result<Vec<IndexRecord>> {
        let mut out = Vec::new();
        for entry in self.indices.iter() {
            let (_, bytes) = entry?;
            out.push(decode::<IndexRecord>(&bytes)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn source_document(&self, index: &Uuid, guid: &Uuid) -> Result<Option<SourceDocument>> {
        match self.source_docs.get(key(&[index, guid]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn parsed_document(&self, index: &Uuid, guid: &Uuid) -> Result<Option<ParsedDocument>> {
        match self.parsed_docs.get(key(&[index, guid]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Source documents of an index in key order.
    pub fn source_documents(&self, index: &Uuid) -> impl Iterator<Item = Result<SourceDocument>> {
        self.source_docs.scan_prefix(index.as_bytes()).map(|entry| {
            let (_, bytes) = entry?;
            decode(&bytes)
        })
    }

    pub fn parsed_documents(&self, index: &Uuid) -> impl Iterator<Item = Result<ParsedDocument>> {
        self.parsed_docs.scan_prefix(index.as_bytes()).map(|entry| {
            let (_, bytes) = entry?;
            decode(&bytes)
        })
    }

    pub fn parsed_document_guids(&self, index: &Uuid) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for entry in self.parsed_docs.scan_prefix(index.as_bytes()).keys() {
            out.push(last_guid(PARSED_DOCS, &entry?)?);
        }
        Ok(out)
    }

    pub fn parsed_for_source(&self, index: &Uuid, source: &Uuid) -> Result<Option<ParsedDocument>> {
        match self.source_parsed.get(key(&[index, source]))? {
            Some(bytes) => self.parsed_document(index, &decode_guid(SOURCE_PARSED, &bytes)?),
            None => Ok(None),
        }
    }
}

pub(crate) fn count_prefix(tree: &Tree, prefix: &[u8]) -> Result<u64> {
    let mut n = 0;
    for entry in tree.scan_prefix(prefix).keys() {
        entry?;
        n += 1;
    }
    Ok(n)
}
