//! Metadata-only listing of source documents.

use crate::config::SearchSettings;
use crate::error::Result;
use crate::index::{IndexRecord, Timestamps};
use crate::persist::Catalog;
use crate::query::{EnumerationQuery, EnumerationResult};

pub struct EnumerationEngine<'a> {
    catalog: &'a Catalog,
    settings: &'a SearchSettings,
}

impl<'a> EnumerationEngine<'a> {
    pub fn new(catalog: &'a Catalog, settings: &'a SearchSettings) -> Self {
        Self { catalog, settings }
    }

    /// Lists the source documents matching every filter, in catalog key order.
    pub fn enumerate(&self, index: &IndexRecord, query: &EnumerationQuery) -> Result<EnumerationResult> {
        let mut time = Timestamps::begin();
        for filter in &query.filters {
            filter.validate()?;
        }
        let max_results = self.settings.page_size(query.max_results);

        let mut total = 0;
        let mut records = Vec::new();
        for document in self.catalog.source_documents(&index.guid) {
            let document = document?;
            if !query.filters.iter().all(|f| f.matches_document(&document)) {
                continue;
            }
            if total >= query.start_index && records.len() < max_results {
                records.push(document);
            }
            total += 1;
        }

        let next_start_index = query.start_index.min(total) + records.len();
        time.finish();
        tracing::debug!(index = %index.name, total, returned = records.len(), "enumerated documents");
        Ok(EnumerationResult {
            success: true,
            time,
            index_guid: index.guid,
            start_index: query.start_index,
            max_results,
            total_records: total,
            next_start_index,
            end_of_results: next_start_index >= total,
            records,
        })
    }
}
