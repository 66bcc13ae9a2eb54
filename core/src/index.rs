use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Structural offset of a fragment within one document.
pub type Position = u64;

/// An atomic free-text unit with its occurrence count and positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub count: u64,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Token {
    pub fn new(value: impl Into<String>, position: Position) -> Self {
        Self { value: value.into(), count: 1, positions: vec![position] }
    }

    /// Folds `other` into `self`: counts are summed and positions become the
    /// sorted, deduplicated union. Both tokens must carry the same value.
    pub fn merge(&mut self, other: Token) {
        debug_assert_eq!(self.value, other.value);
        self.count += other.count;
        self.positions.extend(other.positions);
        self.positions.sort_unstable();
        self.positions.dedup();
    }
}

/// Merges tokens with equal values. Output is ordered by value.
pub fn merge_tokens<I>(tokens: I) -> Vec<Token>
where
    I: IntoIterator<Item = Token>,
{
    let mut merged: BTreeMap<String, Token> = BTreeMap::new();
    for mut token in tokens {
        match merged.get_mut(&token.value) {
            Some(existing) => existing.merge(token),
            None => {
                token.positions.sort_unstable();
                token.positions.dedup();
                merged.insert(token.value.clone(), token);
            }
        }
    }
    merged.into_values().collect()
}

/// One distinct term of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub term: String,
    /// Total occurrence count.
    pub frequency: u64,
    /// Deduplicated, ascending.
    pub positions: Vec<Position>,
}

impl From<Token> for Posting {
    fn from(token: Token) -> Self {
        let mut positions = token.positions;
        positions.sort_unstable();
        positions.dedup();
        Self { term: token.value, frequency: token.count, positions }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Object,
    Array,
    Timestamp,
    Integer,
    Long,
    Decimal,
    String,
    Boolean,
    Null,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Long | DataType::Decimal)
    }
}

/// A flattened (key path, value, type) unit produced by a structured parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNode {
    /// Dotted path, e.g. `person.address.city`.
    pub key: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl DataNode {
    pub fn new(key: impl Into<String>, data: Option<&str>, data_type: DataType) -> Self {
        Self { key: key.into(), data: data.map(str::to_string), data_type }
    }
}

/// Discrete text fields extracted from an HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlContent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub meta_keywords: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl HtmlContent {
    /// Text fields in tokenization order.
    pub fn fields(&self) -> [Option<&str>; 5] {
        [
            self.title.as_deref(),
            self.meta_description.as_deref(),
            self.meta_keywords.as_deref(),
            self.head.as_deref(),
            self.body.as_deref(),
        ]
    }

    pub fn fields_mut(&mut self) -> [&mut Option<String>; 5] {
        [
            &mut self.title,
            &mut self.meta_description,
            &mut self.meta_keywords,
            &mut self.head,
            &mut self.body,
        ]
    }
}

/// Flattened output of a JSON, SQL or XML parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredContent {
    #[serde(default)]
    pub nodes: Vec<DataNode>,
    /// Distinct key paths and their types.
    #[serde(default)]
    pub schema: BTreeMap<String, DataType>,
}

/// Pre-tokenized free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Html,
    Json,
    Sql,
    Text,
    Xml,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentType::Html => "html",
            DocumentType::Json => "json",
            DocumentType::Sql => "sql",
            DocumentType::Text => "text",
            DocumentType::Xml => "xml",
        };
        f.write_str(s)
    }
}

/// One variant per document shape a parser can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParsedContent {
    Html(HtmlContent),
    Json(StructuredContent),
    Sql(StructuredContent),
    Text(TextContent),
    Xml(StructuredContent),
}

impl ParsedContent {
    pub fn document_type(&self) -> DocumentType {
        match self {
            ParsedContent::Html(_) => DocumentType::Html,
            ParsedContent::Json(_) => DocumentType::Json,
            ParsedContent::Sql(_) => DocumentType::Sql,
            ParsedContent::Text(_) => DocumentType::Text,
            ParsedContent::Xml(_) => DocumentType::Xml,
        }
    }

    /// Flattened nodes, for the shapes that have addressable fields.
    pub fn nodes(&self) -> Option<&[DataNode]> {
        match self {
            ParsedContent::Json(s) | ParsedContent::Sql(s) | ParsedContent::Xml(s) => Some(&s.nodes),
            ParsedContent::Html(_) | ParsedContent::Text(_) => None,
        }
    }
}

/// Output of an upstream parser for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    #[serde(default = "default_true")]
    pub success: bool,
    pub content: ParsedContent,
}

fn default_true() -> bool {
    true
}

impl ParseResult {
    pub fn new(content: ParsedContent) -> Self {
        Self { success: true, content }
    }

    pub fn document_type(&self) -> DocumentType {
        self.content.document_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(with = "time::serde::rfc3339")]
    pub start_utc: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_utc: Option<OffsetDateTime>,
    pub total_ms: f64,
}

impl Timestamps {
    pub fn begin() -> Self {
        Self { start_utc: OffsetDateTime::now_utc(), end_utc: None, total_ms: 0.0 }
    }

    pub fn finish(&mut self) {
        let end = OffsetDateTime::now_utc();
        self.total_ms = (end - self.start_utc).as_seconds_f64() * 1000.0;
        self.end_utc = Some(end);
    }
}

/// Per-document output of postings generation. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingsResult {
    pub success: bool,
    pub time: Timestamps,
    /// Distinct term values, ascending.
    pub terms: Vec<String>,
    /// Sorted by descending position count.
    pub postings: Vec<Posting>,
    /// The normalized parse result the postings were generated from.
    pub parse_result: ParseResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub guid: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
}

/// Caller-supplied description of a document being added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub guid: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Raw source text, stored verbatim in the object store when present.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub guid: Uuid,
    pub index_guid: Uuid,
    pub name: Option<String>,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub content_type: DocumentType,
    pub content_length: u64,
    pub metadata: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
}

impl SourceDocument {
    /// Value of a metadata field addressed by an enumeration filter.
    /// Built-in fields shadow caller-supplied metadata keys.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "guid" => Some(self.guid.to_string()),
            "name" => self.name.clone(),
            "title" => self.title.clone(),
            "source_url" => self.source_url.clone(),
            "content_type" => Some(self.content_type.to_string()),
            "content_length" => Some(self.content_length.to_string()),
            "created_utc" => self
                .created_utc
                .format(&time::format_description::well_known::Rfc3339)
                .ok(),
            other => self.metadata.get(other).cloned(),
        }
    }
}

/// Parse-time metadata of a document. The body lives in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub guid: Uuid,
    pub index_guid: Uuid,
    pub source_document_guid: Uuid,
    pub content_type: DocumentType,
    pub terms: u64,
    pub postings: u64,
    /// Bytes of the stored normalized parse result.
    pub content_length: u64,
    /// Bytes of the stored postings result.
    pub postings_length: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
}

/// The inverted-index entry: one term occurring in one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermDoc {
    pub index_guid: Uuid,
    pub term_guid: Uuid,
    pub source_document_guid: Uuid,
    pub parsed_document_guid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    pub success: bool,
    pub time: Timestamps,
    pub source_document: SourceDocument,
    pub parsed_document: ParsedDocument,
    /// Terms that received a new GUID during this add.
    pub terms_minted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub indices: u64,
    pub source_documents: u64,
    pub parsed_documents: u64,
    pub terms: u64,
    pub postings: u64,
    pub source_bytes: u64,
    pub parse_result_bytes: u64,
    pub postings_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(value: &str, count: u64, positions: &[u64]) -> Token {
        Token { value: value.into(), count, positions: positions.to_vec() }
    }

    #[test]
    fn merge_sums_counts_and_dedups_positions() {
        let mut a = tok("fox", 2, &[3, 1]);
        a.merge(tok("fox", 1, &[1, 7]));
        assert_eq!(a.count, 3);
        assert_eq!(a.positions, vec![1, 3, 7]);
    }

    #[test]
    fn merge_is_commutative() {
        let ab = merge_tokens(vec![tok("a", 1, &[0, 4]), tok("b", 1, &[1]), tok("a", 2, &[4, 9])]);
        let ba = merge_tokens(vec![tok("a", 2, &[4, 9]), tok("b", 1, &[1]), tok("a", 1, &[0, 4])]);
        assert_eq!(ab, ba);
        assert_eq!(ab[0], tok("a", 3, &[0, 4, 9]));
    }

    #[test]
    fn parse_result_is_tagged_by_shape() {
        let json = r#"{"content":{"type":"json","nodes":[{"key":"name","data":"Ann","type":"String"}]}}"#;
        let pr: ParseResult = serde_json::from_str(json).unwrap();
        assert!(pr.success);
        assert_eq!(pr.document_type(), DocumentType::Json);
        assert_eq!(pr.content.nodes().unwrap().len(), 1);

        let bad = r#"{"content":{"type":"pdf"}}"#;
        assert!(serde_json::from_str::<ParseResult>(bad).is_err());
    }

    #[test]
    fn source_document_fields_fall_back_to_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("author".to_string(), "kim".to_string());
        let doc = SourceDocument {
            guid: Uuid::nil(),
            index_guid: Uuid::nil(),
            name: Some("a.json".into()),
            title: None,
            source_url: None,
            content_type: DocumentType::Json,
            content_length: 42,
            metadata,
            created_utc: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(doc.field("name").as_deref(), Some("a.json"));
        assert_eq!(doc.field("content_type").as_deref(), Some("json"));
        assert_eq!(doc.field("content_length").as_deref(), Some("42"));
        assert_eq!(doc.field("author").as_deref(), Some("kim"));
        assert_eq!(doc.field("title"), None);
    }
}
