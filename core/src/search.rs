//! Boolean term search with coverage scoring.
//!
//! Candidates are the parsed documents associated with every required term
//! and with none of the excluded terms (every document of the index when no
//! required term is given). They are walked in pages of `max_results`, one
//! candidate at a time, until `max_results` matches are accepted; the next
//! call resumes at the candidate after the last one evaluated. A timeout is
//! only honored between pages.
//!
//! Query terms are split into fragments exactly like indexed text. A term
//! matches a document when every one of its fragments does.

use crate::config::SearchSettings;
use crate::error::Result;
use crate::index::{DataNode, IndexRecord, ParseResult, PostingsResult, Timestamps};
use crate::normalizer::Normalizer;
use crate::persist::Catalog;
use crate::postings::PostingsGenerator;
use crate::query::{QueryClause, SearchMatch, SearchQuery, SearchResult};
use crate::store::{Blob, ObjectStore};
use crate::term_index::TermIndex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A query term and the GUIDs of its fragments; `None` if any fragment is
/// unknown to the index.
struct Resolved {
    guids: Option<Vec<Uuid>>,
}

pub struct SearchEngine<'a> {
    catalog: &'a Catalog,
    terms: &'a TermIndex,
    objects: &'a dyn ObjectStore,
    normalizer: &'a Normalizer,
    generator: &'a PostingsGenerator,
    settings: &'a SearchSettings,
}

fn coverage(hits: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}

fn aggregate(terms_score: Option<f64>, filters_score: Option<f64>) -> f64 {
    match (terms_score, filters_score) {
        (Some(t), Some(f)) => (t + f) / 2.0,
        (Some(t), None) => t,
        (None, Some(f)) => f,
        (None, None) => 1.0,
    }
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        catalog: &'a Catalog,
        terms: &'a TermIndex,
        objects: &'a dyn ObjectStore,
        normalizer: &'a Normalizer,
        generator: &'a PostingsGenerator,
        settings: &'a SearchSettings,
    ) -> Self {
        Self { catalog, terms, objects, normalizer, generator, settings }
    }

    /// Normalizes, fragments and resolves the terms of one clause. Terms
    /// left without fragments (stop words, punctuation, length filter) are
    /// dropped; unknown terms are reported as the caller wrote them.
    fn resolve(&self, index: &Uuid, clause: &QueryClause, not_found: &mut Vec<String>) -> Result<Vec<Resolved>> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for raw in &clause.terms {
            let Some(normalized) = self.normalizer.normalize_str(raw) else {
                continue;
            };
            let fragments: BTreeSet<String> = self.generator.fragments(&normalized).into_iter().collect();
            if fragments.is_empty() || !seen.insert(fragments.clone()) {
                continue;
            }
            let mut found = Vec::with_capacity(fragments.len());
            let mut known = true;
            for fragment in &fragments {
                match self.terms.resolve(index, fragment)? {
                    Some(guid) => found.push(guid),
                    None => known = false,
                }
            }
            let guids = known.then_some(found);
            let raw = raw.trim().to_string();
            if guids.is_none() && !not_found.contains(&raw) {
                not_found.push(raw);
            }
            out.push(Resolved { guids });
        }
        Ok(out)
    }

    /// Parsed documents containing every fragment.
    fn documents(&self, index: &Uuid, guids: &[Uuid]) -> Result<BTreeSet<Uuid>> {
        let mut set: Option<BTreeSet<Uuid>> = None;
        for guid in guids {
            let docs = self.terms.documents(index, guid)?;
            let next = match set {
                None => docs,
                Some(acc) => acc.intersection(&docs).copied().collect(),
            };
            if next.is_empty() {
                return Ok(next);
            }
            set = Some(next);
        }
        Ok(set.unwrap_or_default())
    }

    fn contains(&self, index: &Uuid, guids: &[Uuid], parsed: &Uuid) -> Result<bool> {
        for guid in guids {
            if !self.terms.contains(index, guid, parsed)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `None` when a required term is unknown, so nothing can match.
    fn candidates(&self, index: &Uuid, required: &[Resolved], exclude: &[Resolved]) -> Result<Option<Vec<Uuid>>> {
        let mut set: Option<BTreeSet<Uuid>> = None;
        for term in required {
            let Some(guids) = &term.guids else {
                return Ok(None);
            };
            let docs = self.documents(index, guids)?;
            let next = match set {
                None => docs,
                Some(acc) => acc.intersection(&docs).copied().collect(),
            };
            let empty = next.is_empty();
            set = Some(next);
            if empty {
                break;
            }
        }
        let mut set = match set {
            Some(set) => set,
            None => self.catalog.parsed_document_guids(index)?.into_iter().collect(),
        };
        for guids in exclude.iter().filter_map(|t| t.guids.as_deref()) {
            for doc in self.documents(index, guids)? {
                set.remove(&doc);
            }
        }
        Ok(Some(set.into_iter().collect()))
    }

    /// The normalized parse result, retained inside the stored postings.
    fn load_normalized(&self, index: &Uuid, parsed: &Uuid) -> Result<Option<ParseResult>> {
        match self.objects.get(&Blob::Postings.key(index, parsed))? {
            Some(bytes) => {
                let postings: PostingsResult = serde_json::from_slice(&bytes)?;
                Ok(Some(postings.parse_result))
            }
            None => {
                tracing::warn!(%index, %parsed, "postings missing from object store");
                Ok(None)
            }
        }
    }

    fn evaluate(
        &self,
        index: &Uuid,
        parsed_guid: &Uuid,
        query: &SearchQuery,
        optional: &[Resolved],
    ) -> Result<Option<SearchMatch>> {
        let Some(parsed) = self.catalog.parsed_document(index, parsed_guid)? else {
            return Ok(None);
        };

        let mut present = 0;
        for guids in optional.iter().filter_map(|t| t.guids.as_deref()) {
            if self.contains(index, guids, parsed_guid)? {
                present += 1;
            }
        }
        let terms_score = coverage(present, optional.len());

        let wants_content = !(query.required.filters.is_empty()
            && query.exclude.filters.is_empty()
            && query.optional.filters.is_empty());
        let parse_result = if wants_content {
            self.load_normalized(index, parsed_guid)?
        } else {
            None
        };
        // Html and Text shapes have no addressable fields, so no filter matches them.
        let nodes: &[DataNode] = parse_result.as_ref().and_then(|p| p.content.nodes()).unwrap_or(&[]);

        if !query.required.filters.iter().all(|f| f.matches_nodes(nodes, self.normalizer)) {
            return Ok(None);
        }
        if query.exclude.filters.iter().any(|f| f.matches_nodes(nodes, self.normalizer)) {
            return Ok(None);
        }
        let hits = query.optional.filters.iter().filter(|f| f.matches_nodes(nodes, self.normalizer)).count();
        let filters_score = coverage(hits, query.optional.filters.len());

        let (document, parsed_document) = if query.include_metadata {
            (self.catalog.source_document(index, &parsed.source_document_guid)?, Some(parsed.clone()))
        } else {
            (None, None)
        };

        Ok(Some(SearchMatch {
            source_document_guid: parsed.source_document_guid,
            parsed_document_guid: parsed.guid,
            terms_score,
            filters_score,
            aggregate_score: aggregate(terms_score, filters_score),
            document,
            parsed_document,
        }))
    }

    pub fn search(&self, index: &IndexRecord, query: &SearchQuery) -> Result<SearchResult> {
        let time = Timestamps::begin();
        for filter in query.required.filters.iter().chain(&query.optional.filters).chain(&query.exclude.filters) {
            filter.validate()?;
        }
        let max_results = self.settings.page_size(query.max_results);
        let deadline = query.timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut not_found = Vec::new();
        let required = self.resolve(&index.guid, &query.required, &mut not_found)?;
        let optional = self.resolve(&index.guid, &query.optional, &mut not_found)?;
        let exclude = self.resolve(&index.guid, &query.exclude, &mut not_found)?;

        let mut result = SearchResult {
            success: true,
            time,
            index_guid: index.guid,
            start_index: query.start_index,
            max_results,
            next_start_index: query.start_index,
            end_of_results: true,
            timed_out: false,
            terms_not_found: not_found,
            matches: Vec::new(),
        };

        let Some(candidates) = self.candidates(&index.guid, &required, &exclude)? else {
            result.time.finish();
            return Ok(result);
        };

        let total = candidates.len();
        let mut offset = query.start_index.min(total);
        let mut matches = Vec::new();
        while offset < total && matches.len() < max_results {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                result.timed_out = true;
                break;
            }
            let end = (offset + max_results).min(total);
            let page_start = offset;
            while offset < end && matches.len() < max_results {
                if let Some(m) = self.evaluate(&index.guid, &candidates[offset], query, &optional)? {
                    matches.push(m);
                }
                offset += 1;
            }
            tracing::debug!(index = %index.name, page_start, offset, accepted = matches.len(), "evaluated page");
        }

        // Stable: equal scores keep candidate order.
        matches.sort_by(|a: &SearchMatch, b: &SearchMatch| {
            b.aggregate_score.partial_cmp(&a.aggregate_score).unwrap_or(Ordering::Equal)
        });

        result.next_start_index = offset;
        result.end_of_results = offset >= total;
        result.matches = matches;
        result.time.finish();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_prefers_what_is_present() {
        assert_eq!(aggregate(Some(0.5), Some(1.0)), 0.75);
        assert_eq!(aggregate(Some(0.5), None), 0.5);
        assert_eq!(aggregate(None, Some(0.25)), 0.25);
        assert_eq!(aggregate(None, None), 1.0);
    }

    #[test]
    fn coverage_of_nothing_is_none() {
        assert_eq!(coverage(0, 0), None);
        assert_eq!(coverage(1, 2), Some(0.5));
    }
}
