use crate::index::{ParsedDocument, SourceDocument, Timestamps};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCondition {
    Equals,
    NotEquals,
    Contains,
    ContainsNot,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    IsNull,
    IsNotNull,
}

/// A predicate over one addressable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub field: String,
    pub condition: FilterCondition,
    #[serde(default)]
    pub value: Option<String>,
}

impl SearchFilter {
    pub fn new(field: impl Into<String>, condition: FilterCondition, value: Option<&str>) -> Self {
        Self { field: field.into(), condition, value: value.map(str::to_string) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryClause {
    pub terms: Vec<String>,
    pub filters: Vec<SearchFilter>,
}

impl QueryClause {
    pub fn terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { terms: terms.into_iter().map(Into::into).collect(), filters: Vec::new() }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub required: QueryClause,
    pub optional: QueryClause,
    pub exclude: QueryClause,
    pub start_index: usize,
    pub max_results: usize,
    pub include_metadata: bool,
    /// Budget checked between pages; `None` means unbounded.
    pub timeout_ms: Option<u64>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            required: QueryClause::default(),
            optional: QueryClause::default(),
            exclude: QueryClause::default(),
            start_index: 0,
            max_results: 100,
            include_metadata: false,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub source_document_guid: Uuid,
    pub parsed_document_guid: Uuid,
    pub terms_score: Option<f64>,
    pub filters_score: Option<f64>,
    pub aggregate_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<SourceDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_document: Option<ParsedDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub success: bool,
    pub time: Timestamps,
    pub index_guid: Uuid,
    pub start_index: usize,
    pub max_results: usize,
    /// Candidate offset to resume from.
    pub next_start_index: usize,
    pub end_of_results: bool,
    pub timed_out: bool,
    pub terms_not_found: Vec<String>,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationQuery {
    pub start_index: usize,
    pub max_results: usize,
    /// Conjunction over source-document metadata fields.
    pub filters: Vec<SearchFilter>,
}

impl Default for EnumerationQuery {
    fn default() -> Self {
        Self { start_index: 0, max_results: 100, filters: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationResult {
    pub success: bool,
    pub time: Timestamps,
    pub index_guid: Uuid,
    pub start_index: usize,
    pub max_results: usize,
    /// Documents matching the filters, before pagination.
    pub total_records: usize,
    pub next_start_index: usize,
    pub end_of_results: bool,
    pub records: Vec<SourceDocument>,
}
