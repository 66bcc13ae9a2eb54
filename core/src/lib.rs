//! Document indexing and search over an embedded sled catalog.
//!
//! Parsed documents are normalized, turned into positional postings and
//! written to an index-scoped inverted index. [`Komodo`] is the entry point.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod index;
pub mod komodo;
pub mod normalizer;
pub mod persist;
pub mod postings;
pub mod query;
pub mod search;
pub mod store;
pub mod term_index;

pub use config::{KomodoConfig, SearchSettings};
pub use error::{CollisionError, Error, Result};
pub use index::{
    DataNode, DataType, DocumentInput, DocumentType, HtmlContent, IndexRecord, IndexResult, IndexStats, ParseResult,
    ParsedContent, ParsedDocument, Posting, PostingsResult, SourceDocument, StructuredContent, TextContent, Token,
};
pub use komodo::Komodo;
pub use normalizer::{NormalizationOptions, Normalizer};
pub use postings::{PostingsGenerator, PostingsOptions};
pub use query::{
    EnumerationQuery, EnumerationResult, FilterCondition, QueryClause, SearchFilter, SearchMatch, SearchQuery,
    SearchResult,
};
pub use store::{Blob, MemoryObjectStore, ObjectStore, SledObjectStore};
