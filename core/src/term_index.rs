//! The inverted index: index-scoped term→GUID mappings and (term, document)
//! associations.
//!
//! Term resolution is an insert-or-get. Outside a transaction it is a
//! compare-and-swap on the mapping key; inside the add transaction it is a
//! read followed by a write, which sled serializes. Either way the first
//! writer's GUID wins and every later writer reuses it.

use crate::error::{Error, Result};
use crate::index::TermDoc;
use crate::persist::{abort, decode, decode_guid, encode, key, last_guid, Catalog, DOC_TERMS, TERMS, TERM_DOCS};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Tree;
use std::collections::BTreeSet;
use uuid::Uuid;

fn term_key(index: &Uuid, term: &str) -> Vec<u8> {
    let mut k = index.as_bytes().to_vec();
    k.extend_from_slice(term.as_bytes());
    k
}

#[derive(Clone)]
pub struct TermIndex {
    terms: Tree,
    term_docs: Tree,
    doc_terms: Tree,
}

impl TermIndex {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            terms: catalog.terms.clone(),
            term_docs: catalog.term_docs.clone(),
            doc_terms: catalog.doc_terms.clone(),
        }
    }

    pub fn resolve(&self, index: &Uuid, term: &str) -> Result<Option<Uuid>> {
        match self.terms.get(term_key(index, term))? {
            Some(bytes) => Ok(Some(decode_guid(TERMS, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the term's GUID, minting one if the term is new to the index.
    pub fn upsert(&self, index: &Uuid, term: &str) -> Result<Uuid> {
        if term.is_empty() {
            return Err(Error::MissingInput("term"));
        }
        let k = term_key(index, term);
        let minted = Uuid::new_v4();
        match self.terms.compare_and_swap(&k, None as Option<&[u8]>, Some(&minted.as_bytes()[..]))? {
            Ok(()) => {
                tracing::debug!(term, guid = %minted, "minted term");
                Ok(minted)
            }
            Err(cas) => match cas.current {
                Some(existing) => decode_guid(TERMS, &existing),
                None => Err(Error::Corrupt { tree: TERMS, reason: "term vanished during upsert".into() }),
            },
        }
    }

    /// Parsed-document GUIDs associated with a term.
    pub fn documents(&self, index: &Uuid, term: &Uuid) -> Result<BTreeSet<Uuid>> {
        let mut out = BTreeSet::new();
        for k in self.term_docs.scan_prefix(key(&[index, term])).keys() {
            out.insert(last_guid(TERM_DOCS, &k?)?);
        }
        Ok(out)
    }

    pub fn associations(&self, index: &Uuid, term: &Uuid) -> Result<Vec<TermDoc>> {
        let mut out = Vec::new();
        for entry in self.term_docs.scan_prefix(key(&[index, term])).values() {
            out.push(decode(&entry?)?);
        }
        Ok(out)
    }

    pub fn contains(&self, index: &Uuid, term: &Uuid, parsed: &Uuid) -> Result<bool> {
        Ok(self.term_docs.contains_key(key(&[index, term, parsed]))?)
    }

    /// Term GUIDs associated with a parsed document.
    pub fn terms_of(&self, index: &Uuid, parsed: &Uuid) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for k in self.doc_terms.scan_prefix(key(&[index, parsed])).keys() {
            out.push(last_guid(DOC_TERMS, &k?)?);
        }
        Ok(out)
    }
}

/// Transactional insert-or-get. Returns the GUID and whether it was minted.
pub(crate) fn resolve_or_mint(
    terms: &TransactionalTree,
    index: &Uuid,
    term: &str,
) -> ConflictableTransactionResult<(Uuid, bool), Error> {
    let k = term_key(index, term);
    if let Some(existing) = terms.get(&k)? {
        return Ok((decode_guid(TERMS, &existing).map_err(abort)?, false));
    }
    let guid = Uuid::new_v4();
    terms.insert(k, &guid.as_bytes()[..])?;
    Ok((guid, true))
}

/// Records one association. Re-adding an existing (term, document) pair is a no-op.
pub(crate) fn associate(
    term_docs: &TransactionalTree,
    doc_terms: &TransactionalTree,
    row: &TermDoc,
) -> ConflictableTransactionResult<bool, Error> {
    let forward = key(&[&row.index_guid, &row.term_guid, &row.parsed_document_guid]);
    if term_docs.get(&forward)?.is_some() {
        return Ok(false);
    }
    term_docs.insert(forward, encode(row).map_err(abort)?)?;
    doc_terms.insert(key(&[&row.index_guid, &row.parsed_document_guid, &row.term_guid]), Vec::<u8>::new())?;
    Ok(true)
}

/// Writes the mappings and associations for every term of one document.
/// Returns the number of terms minted.
pub(crate) fn write_terms(
    terms: &TransactionalTree,
    term_docs: &TransactionalTree,
    doc_terms: &TransactionalTree,
    index: &Uuid,
    source: &Uuid,
    parsed: &Uuid,
    values: &[String],
) -> ConflictableTransactionResult<u64, Error> {
    let mut minted = 0;
    for value in values {
        let (term_guid, fresh) = resolve_or_mint(terms, index, value)?;
        if fresh {
            minted += 1;
        }
        let row = TermDoc {
            index_guid: *index,
            term_guid,
            source_document_guid: *source,
            parsed_document_guid: *parsed,
        };
        associate(term_docs, doc_terms, &row)?;
    }
    Ok(minted)
}

/// Removes every association of one parsed document. Term mappings stay.
pub(crate) fn remove_document_terms(
    term_docs: &TransactionalTree,
    doc_terms: &TransactionalTree,
    index: &Uuid,
    parsed: &Uuid,
    term_guids: &[Uuid],
) -> ConflictableTransactionResult<(), Error> {
    for term in term_guids {
        term_docs.remove(key(&[index, term, parsed]))?;
        doc_terms.remove(key(&[index, parsed, term]))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sled::Transactional;
    use std::sync::Arc;
    use std::thread;

    fn setup() -> (Catalog, TermIndex) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let catalog = Catalog::open(&db).unwrap();
        let terms = TermIndex::new(&catalog);
        (catalog, terms)
    }

    #[test]
    fn upsert_is_stable() {
        let (_c, t) = setup();
        let index = Uuid::new_v4();
        let first = t.upsert(&index, "rust").unwrap();
        assert_eq!(t.upsert(&index, "rust").unwrap(), first);
        assert_eq!(t.resolve(&index, "rust").unwrap(), Some(first));
        assert_eq!(t.resolve(&index, "Rust").unwrap(), None);
        assert!(t.upsert(&index, "").is_err());
    }

    #[test]
    fn terms_are_scoped_per_index() {
        let (_c, t) = setup();
        let a = t.upsert(&Uuid::new_v4(), "rust").unwrap();
        let b = t.upsert(&Uuid::new_v4(), "rust").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_first_writers_agree() {
        let (_c, t) = setup();
        let t = Arc::new(t);
        let index = Uuid::new_v4();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                thread::spawn(move || t.upsert(&index, "contended").unwrap())
            })
            .collect();
        let guids: BTreeSet<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(guids.len(), 1);
    }

    #[test]
    fn writes_and_removes_associations() {
        let (c, t) = setup();
        let index = Uuid::new_v4();
        let source = Uuid::new_v4();
        let parsed = Uuid::new_v4();
        let values = vec!["fox".to_string(), "dog".to_string()];

        let write = || {
            (&c.terms, &c.term_docs, &c.doc_terms)
                .transaction(|(terms, term_docs, doc_terms)| {
                    write_terms(terms, term_docs, doc_terms, &index, &source, &parsed, &values)
                })
                .map_err(Error::from)
        };
        assert_eq!(write().unwrap(), 2);
        // Adding the same document's terms again mints nothing and duplicates nothing.
        assert_eq!(write().unwrap(), 0);

        let fox = t.resolve(&index, "fox").unwrap().unwrap();
        assert_eq!(t.associations(&index, &fox).unwrap().len(), 1);
        assert!(t.contains(&index, &fox, &parsed).unwrap());
        assert_eq!(t.documents(&index, &fox).unwrap().into_iter().collect::<Vec<_>>(), vec![parsed]);

        let term_guids = t.terms_of(&index, &parsed).unwrap();
        assert_eq!(term_guids.len(), 2);
        (&c.term_docs, &c.doc_terms)
            .transaction(|(term_docs, doc_terms)| {
                remove_document_terms(term_docs, doc_terms, &index, &parsed, &term_guids)
            })
            .map_err(Error::from)
            .unwrap();
        assert!(!t.contains(&index, &fox, &parsed).unwrap());
        assert!(t.terms_of(&index, &parsed).unwrap().is_empty());
        assert_eq!(t.resolve(&index, "fox").unwrap(), Some(fox));
    }
}
