use crate::config::KomodoConfig;
use crate::enumerate::EnumerationEngine;
use crate::error::{Error, Result};
use crate::index::{
    DocumentInput, IndexRecord, IndexResult, IndexStats, ParseResult, ParsedDocument, PostingsResult, SourceDocument,
    Timestamps,
};
use crate::normalizer::Normalizer;
use crate::persist::{abort, count_prefix, encode, key, Catalog, IndexPaths};
use crate::postings::PostingsGenerator;
use crate::query::{EnumerationQuery, EnumerationResult, SearchQuery, SearchResult};
use crate::search::SearchEngine;
use crate::store::{Blob, ObjectStore, SledObjectStore};
use crate::term_index::{remove_document_terms, write_terms, TermIndex};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Transactional;
use std::fs::create_dir_all;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Owns the catalog, the object store and the indexing pipeline.
pub struct Komodo {
    config: KomodoConfig,
    catalog: Catalog,
    terms: TermIndex,
    objects: Arc<dyn ObjectStore>,
    normalizer: Normalizer,
    generator: PostingsGenerator,
}

impl Komodo {
    /// Opens (or creates) the catalog under `config.data_dir` and keeps blobs in it.
    pub fn open(config: KomodoConfig) -> Result<Self> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            let paths = IndexPaths::new(&config.data_dir);
            create_dir_all(&paths.root)?;
            sled::open(paths.catalog())?
        };
        let objects = Arc::new(SledObjectStore::open(&db)?);
        Self::with_object_store(config, db, objects)
    }

    pub fn with_object_store(config: KomodoConfig, db: sled::Db, objects: Arc<dyn ObjectStore>) -> Result<Self> {
        let catalog = Catalog::open(&db)?;
        let terms = TermIndex::new(&catalog);
        let normalizer = Normalizer::new(config.normalization.clone());
        let generator = PostingsGenerator::new(config.postings.clone());
        tracing::info!(data_dir = %config.data_dir.display(), temporary = config.temporary, "opened catalog");
        Ok(Self { config, catalog, terms, objects, normalizer, generator })
    }

    pub fn config(&self) -> &KomodoConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn term_index(&self) -> &TermIndex {
        &self.terms
    }

    pub fn flush(&self) -> Result<()> {
        self.catalog.flush()
    }

    pub fn create_index(&self, name: &str) -> Result<IndexRecord> {
        self.catalog.create_index(name)
    }

    pub fn get_index(&self, name_or_guid: &str) -> Result<IndexRecord> {
        self.catalog.resolve_index(name_or_guid)
    }

    pub fn list_indices(&self) -> Result<Vec<IndexRecord>> {
        self.catalog.list_indices()
    }

    /// Removes the index and every row and blob it owns, term mappings included.
    pub fn delete_index(&self, name_or_guid: &str) -> Result<()> {
        let index = self.catalog.resolve_index(name_or_guid)?;
        (&self.catalog.index_names, &self.catalog.indices).transaction(
            |(names, indices): &(TransactionalTree, TransactionalTree)| {
                names.remove(index.name.as_bytes())?;
                indices.remove(&index.guid.as_bytes()[..])?;
                Ok::<(), ConflictableTransactionError<Error>>(())
            },
        )?;

        for parsed in self.catalog.parsed_document_guids(&index.guid)? {
            self.discard_blobs(&index.guid, &parsed);
        }
        let prefix = index.guid.as_bytes();
        for tree in [
            &self.catalog.source_docs,
            &self.catalog.parsed_docs,
            &self.catalog.terms,
            &self.catalog.term_docs,
            &self.catalog.doc_terms,
            &self.catalog.source_parsed,
        ] {
            let mut batch = sled::Batch::default();
            for k in tree.scan_prefix(prefix).keys() {
                batch.remove(k?);
            }
            tree.apply_batch(batch)?;
        }
        tracing::info!(index = %index.name, guid = %index.guid, "deleted index");
        Ok(())
    }

    /// Normalizes, generates postings and persists one document. Catalog rows
    /// are written in a single transaction; blobs written before a failed
    /// transaction are deleted again.
    pub fn add(&self, index: &str, document: DocumentInput, parse_result: ParseResult) -> Result<IndexResult> {
        let mut time = Timestamps::begin();
        let index = self.catalog.resolve_index(index)?;
        if !parse_result.success {
            return Err(Error::ParseUnsuccessful);
        }
        let source_guid = document.guid.unwrap_or_else(Uuid::new_v4);
        if self.catalog.source_document(&index.guid, &source_guid)?.is_some() {
            return Err(Error::DocumentExists(source_guid));
        }

        let normalized = self.normalizer.normalize_parse_result(&parse_result)?;
        let postings = self.generator.generate(normalized);
        let original_json = serde_json::to_vec(&parse_result)?;
        let postings_json = serde_json::to_vec(&postings)?;

        let content_type = parse_result.document_type();
        let content_length = document
            .content_length
            .or_else(|| document.content.as_ref().map(|c| c.len() as u64))
            .unwrap_or(0);
        let now = OffsetDateTime::now_utc();
        let source = SourceDocument {
            guid: source_guid,
            index_guid: index.guid,
            name: document.name,
            title: document.title,
            source_url: document.source_url,
            content_type,
            content_length,
            metadata: document.metadata,
            created_utc: now,
        };
        let parsed = ParsedDocument {
            guid: Uuid::new_v4(),
            index_guid: index.guid,
            source_document_guid: source_guid,
            content_type,
            terms: postings.terms.len() as u64,
            postings: postings.postings.iter().map(|p| p.frequency).sum(),
            content_length: original_json.len() as u64,
            postings_length: postings_json.len() as u64,
            created_utc: now,
        };

        let mut blobs = vec![(Blob::ParseResult, original_json), (Blob::Postings, postings_json)];
        if let Some(content) = document.content {
            blobs.push((Blob::Source, content.into_bytes()));
        }
        for (blob, bytes) in &blobs {
            if let Err(e) = self.objects.put(&blob.key(&index.guid, &parsed.guid), bytes) {
                self.discard_blobs(&index.guid, &parsed.guid);
                return Err(e);
            }
        }

        let source_record = encode(&source)?;
        let parsed_record = encode(&parsed)?;
        let catalog = &self.catalog;
        let written = (
            &catalog.source_docs,
            &catalog.parsed_docs,
            &catalog.source_parsed,
            &catalog.terms,
            &catalog.term_docs,
            &catalog.doc_terms,
        )
            .transaction(|(sources, parseds, links, terms, term_docs, doc_terms)| {
                let source_key = key(&[&index.guid, &source_guid]);
                if sources.get(&source_key)?.is_some() {
                    return Err(abort(Error::DocumentExists(source_guid)));
                }
                sources.insert(source_key.clone(), source_record.clone())?;
                parseds.insert(key(&[&index.guid, &parsed.guid]), parsed_record.clone())?;
                links.insert(source_key, &parsed.guid.as_bytes()[..])?;
                write_terms(terms, term_docs, doc_terms, &index.guid, &source_guid, &parsed.guid, &postings.terms)
            });
        let terms_minted = match written {
            Ok(minted) => minted,
            Err(e) => {
                self.discard_blobs(&index.guid, &parsed.guid);
                return Err(e.into());
            }
        };

        time.finish();
        tracing::info!(
            index = %index.name,
            document = %source_guid,
            terms = parsed.terms,
            terms_minted,
            "added document"
        );
        Ok(IndexResult { success: true, time, source_document: source, parsed_document: parsed, terms_minted })
    }

    fn discard_blobs(&self, index: &Uuid, parsed: &Uuid) {
        for blob in Blob::ALL {
            if let Err(e) = self.objects.delete(&blob.key(index, parsed)) {
                tracing::warn!(%index, %parsed, ?blob, error = %e, "failed to delete blob");
            }
        }
    }

    pub fn get_document(&self, index: &str, guid: &Uuid) -> Result<SourceDocument> {
        let index = self.catalog.resolve_index(index)?;
        self.catalog.source_document(&index.guid, guid)?.ok_or(Error::DocumentNotFound(*guid))
    }

    fn parsed_for(&self, index: &str, source: &Uuid) -> Result<ParsedDocument> {
        let index = self.catalog.resolve_index(index)?;
        self.catalog.parsed_for_source(&index.guid, source)?.ok_or(Error::DocumentNotFound(*source))
    }

    fn blob(&self, parsed: &ParsedDocument, blob: Blob) -> Result<Option<Vec<u8>>> {
        self.objects.get(&blob.key(&parsed.index_guid, &parsed.guid))
    }

    /// The parse result exactly as it was received.
    pub fn get_parse_result(&self, index: &str, source: &Uuid) -> Result<ParseResult> {
        let parsed = self.parsed_for(index, source)?;
        let bytes = self.blob(&parsed, Blob::ParseResult)?.ok_or(Error::DocumentNotFound(*source))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn get_postings(&self, index: &str, source: &Uuid) -> Result<PostingsResult> {
        let parsed = self.parsed_for(index, source)?;
        let bytes = self.blob(&parsed, Blob::Postings)?.ok_or(Error::DocumentNotFound(*source))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn get_source_content(&self, index: &str, source: &Uuid) -> Result<Option<String>> {
        let parsed = self.parsed_for(index, source)?;
        match self.blob(&parsed, Blob::Source)? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// Deletes a document and its associations. Term mappings are kept.
    pub fn remove_document(&self, index: &str, source: &Uuid) -> Result<()> {
        let index = self.catalog.resolve_index(index)?;
        if self.catalog.source_document(&index.guid, source)?.is_none() {
            return Err(Error::DocumentNotFound(*source));
        }
        let parsed = self.catalog.parsed_for_source(&index.guid, source)?;
        let term_guids = match &parsed {
            Some(p) => self.terms.terms_of(&index.guid, &p.guid)?,
            None => Vec::new(),
        };
        let catalog = &self.catalog;
        (&catalog.source_docs, &catalog.parsed_docs, &catalog.source_parsed, &catalog.term_docs, &catalog.doc_terms)
            .transaction(|(sources, parseds, links, term_docs, doc_terms)| {
                sources.remove(key(&[&index.guid, source]))?;
                links.remove(key(&[&index.guid, source]))?;
                if let Some(p) = &parsed {
                    parseds.remove(key(&[&index.guid, &p.guid]))?;
                    remove_document_terms(term_docs, doc_terms, &index.guid, &p.guid, &term_guids)?;
                }
                Ok::<(), ConflictableTransactionError<Error>>(())
            })?;
        if let Some(p) = &parsed {
            self.discard_blobs(&index.guid, &p.guid);
        }
        tracing::info!(index = %index.name, document = %source, "removed document");
        Ok(())
    }

    pub fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResult> {
        let index = self.catalog.resolve_index(index)?;
        SearchEngine::new(
            &self.catalog,
            &self.terms,
            self.objects.as_ref(),
            &self.normalizer,
            &self.generator,
            &self.config.search,
        )
        .search(&index, query)
    }

    pub fn enumerate(&self, index: &str, query: &EnumerationQuery) -> Result<EnumerationResult> {
        let index = self.catalog.resolve_index(index)?;
        EnumerationEngine::new(&self.catalog, &self.config.search).enumerate(&index, query)
    }

    /// Aggregate counts for one index, or for all indices when `index` is `None`.
    pub fn stats(&self, index: Option<&str>) -> Result<IndexStats> {
        let indices = match index {
            Some(name) => vec![self.catalog.resolve_index(name)?],
            None => self.catalog.list_indices()?,
        };
        let mut stats = IndexStats { indices: indices.len() as u64, ..Default::default() };
        for index in &indices {
            let prefix = index.guid.as_bytes();
            stats.terms += count_prefix(&self.catalog.terms, prefix)?;
            stats.postings += count_prefix(&self.catalog.term_docs, prefix)?;
            for source in self.catalog.source_documents(&index.guid) {
                stats.source_documents += 1;
                stats.source_bytes += source?.content_length;
            }
            for parsed in self.catalog.parsed_documents(&index.guid) {
                let parsed = parsed?;
                stats.parsed_documents += 1;
                stats.parse_result_bytes += parsed.content_length;
                stats.postings_bytes += parsed.postings_length;
            }
        }
        Ok(stats)
    }
}
