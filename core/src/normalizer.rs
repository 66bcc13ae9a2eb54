//! Pure, options-driven text normalization.
//!
//! Every operation takes its configuration from the [`Normalizer`] it is called
//! on and returns a transformed copy of the same shape. Each operation is
//! idempotent on its own: applying it twice yields the same value as applying
//! it once.

use crate::error::{CollisionError, Result};
use crate::index::{merge_tokens, DataNode, DataType, ParseResult, ParsedContent, StructuredContent, Token};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref SPACE_RUN: Regex = Regex::new(r" {2,}").expect("valid regex");
}

pub const DEFAULT_PUNCTUATION: &str = ";:,.?!\"'`()[]{}<>-_=+*&^%$#@~|\\/";

pub const DEFAULT_SPLIT_CHARACTERS: &[char] =
    &[' ', '\t', '\r', '\n', '\u{0c}', ',', ';', ':', '.', '!', '?'];

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Characters mapped to a plain space by whitespace reduction.
const WHITESPACE_CONTROLS: &[char] = &['\r', '\n', '\u{0c}', '\0', '\t'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationOptions {
    /// NFKC compatibility folding, applied before case folding.
    pub fold_unicode: bool,
    pub case_fold: bool,
    pub remove_punctuation: bool,
    pub remove_stop_words: bool,
    pub reduce_whitespace: bool,
    /// Case-fold DataNode and schema keys as well as values.
    pub normalize_keys: bool,
    pub punctuation: String,
    pub split_characters: Vec<char>,
    pub stop_words: BTreeSet<String>,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            fold_unicode: false,
            case_fold: true,
            remove_punctuation: true,
            remove_stop_words: true,
            reduce_whitespace: true,
            normalize_keys: false,
            punctuation: DEFAULT_PUNCTUATION.to_string(),
            split_characters: DEFAULT_SPLIT_CHARACTERS.to_vec(),
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl NormalizationOptions {
    /// Every operation switched off.
    pub fn disabled() -> Self {
        Self {
            fold_unicode: false,
            case_fold: false,
            remove_punctuation: false,
            remove_stop_words: false,
            reduce_whitespace: false,
            normalize_keys: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    options: NormalizationOptions,
    punctuation: HashSet<char>,
    split: HashSet<char>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizationOptions::default())
    }
}

impl Normalizer {
    pub fn new(options: NormalizationOptions) -> Self {
        // Whitespace in the punctuation set would make substitution non-idempotent.
        let punctuation = options.punctuation.chars().filter(|c| !c.is_whitespace()).collect();
        // Segments are rejoined with spaces, so a space must always split.
        let mut split: HashSet<char> = options.split_characters.iter().copied().collect();
        split.insert(' ');
        Self { options, punctuation, split }
    }

    pub fn options(&self) -> &NormalizationOptions {
        &self.options
    }

    pub fn fold_unicode(&self, value: &str) -> String {
        if !self.options.fold_unicode {
            return value.to_string();
        }
        value.nfkc().collect()
    }

    /// Lower-case and trim. Empty input, or input that trims to nothing, yields `None`.
    pub fn normalize_case(&self, value: &str) -> Option<String> {
        if value.is_empty() {
            return None;
        }
        if !self.options.case_fold {
            return Some(value.to_string());
        }
        let folded = value.to_lowercase();
        let trimmed = folded.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Substitutes a space for every punctuation character so adjacent words stay apart.
    pub fn remove_punctuation(&self, value: &str) -> String {
        if !self.options.remove_punctuation {
            return value.to_string();
        }
        value
            .chars()
            .map(|c| if self.punctuation.contains(&c) { ' ' } else { c })
            .collect()
    }

    /// Drops segments exactly equal to a stop word and rejoins the rest with single spaces.
    pub fn remove_stop_words(&self, value: &str) -> String {
        if !self.options.remove_stop_words {
            return value.to_string();
        }
        value
            .split(|c: char| self.split.contains(&c))
            .filter(|segment| !segment.is_empty() && !self.options.stop_words.contains(*segment))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn reduce_whitespace(&self, value: &str) -> String {
        if !self.options.reduce_whitespace {
            return value.to_string();
        }
        let spaced: String = value
            .chars()
            .map(|c| if WHITESPACE_CONTROLS.contains(&c) { ' ' } else { c })
            .collect();
        SPACE_RUN.replace_all(&spaced, " ").trim().to_string()
    }

    /// Runs every enabled operation in order: unicode, case, punctuation,
    /// stop words, whitespace. Returns `None` when nothing is left.
    pub fn normalize_str(&self, value: &str) -> Option<String> {
        let value = self.fold_unicode(value);
        let value = self.normalize_case(&value)?;
        let value = self.remove_punctuation(&value);
        let value = self.remove_stop_words(&value);
        let value = self.reduce_whitespace(&value);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn normalize_key(&self, key: &str) -> String {
        if !self.options.normalize_keys {
            return key.to_string();
        }
        self.fold_unicode(key).to_lowercase().trim().to_string()
    }

    /// Tokens are normalized as atomic units; a token that normalizes to nothing is dropped.
    pub fn normalize_token(&self, token: &Token) -> Option<Token> {
        let value = self.normalize_str(&token.value)?;
        Some(Token { value, count: token.count, positions: token.positions.clone() })
    }

    /// Normalizes each token, then merges tokens that now share a value.
    pub fn normalize_tokens(&self, tokens: &[Token]) -> Vec<Token> {
        merge_tokens(tokens.iter().filter_map(|t| self.normalize_token(t)))
    }

    /// Folds schema keys. Two distinct keys folding to the same key is an error.
    pub fn normalize_schema(
        &self,
        schema: &BTreeMap<String, DataType>,
    ) -> std::result::Result<BTreeMap<String, DataType>, CollisionError> {
        let mut folded: BTreeMap<String, (&str, DataType)> = BTreeMap::new();
        for (key, data_type) in schema {
            let normalized = self.normalize_key(key);
            if let Some((original, _)) = folded.get(&normalized) {
                return Err(CollisionError {
                    first: original.to_string(),
                    second: key.clone(),
                    folded: normalized,
                });
            }
            folded.insert(normalized, (key.as_str(), *data_type));
        }
        Ok(folded.into_iter().map(|(k, (_, t))| (k, t)).collect())
    }

    /// Only string values are rewritten; numbers, booleans and timestamps stay verbatim.
    pub fn normalize_nodes(&self, nodes: &[DataNode]) -> Vec<DataNode> {
        nodes
            .iter()
            .map(|node| DataNode {
                key: self.normalize_key(&node.key),
                data: match node.data_type {
                    DataType::String => node.data.as_deref().and_then(|d| self.normalize_str(d)),
                    _ => node.data.clone(),
                },
                data_type: node.data_type,
            })
            .collect()
    }

    fn normalize_structured(&self, content: &StructuredContent) -> Result<StructuredContent> {
        Ok(StructuredContent {
            nodes: self.normalize_nodes(&content.nodes),
            schema: self.normalize_schema(&content.schema)?,
        })
    }

    /// Returns a normalized copy; the input is left untouched.
    pub fn normalize_parse_result(&self, parse_result: &ParseResult) -> Result<ParseResult> {
        let content = match &parse_result.content {
            ParsedContent::Html(html) => {
                let mut html = html.clone();
                for field in html.fields_mut() {
                    *field = field.as_deref().and_then(|v| self.normalize_str(v));
                }
                ParsedContent::Html(html)
            }
            ParsedContent::Json(s) => ParsedContent::Json(self.normalize_structured(s)?),
            ParsedContent::Sql(s) => ParsedContent::Sql(self.normalize_structured(s)?),
            ParsedContent::Xml(s) => ParsedContent::Xml(self.normalize_structured(s)?),
            ParsedContent::Text(text) => {
                let mut text = text.clone();
                text.tokens = self.normalize_tokens(&text.tokens);
                ParsedContent::Text(text)
            }
        };
        Ok(ParseResult { success: parse_result.success, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{HtmlContent, TextContent};

    fn only(f: impl FnOnce(&mut NormalizationOptions)) -> Normalizer {
        let mut options = NormalizationOptions::disabled();
        f(&mut options);
        Normalizer::new(options)
    }

    #[test]
    fn case_folds_and_trims() {
        let n = only(|o| o.case_fold = true);
        assert_eq!(n.normalize_case("  Hello World "), Some("hello world".into()));
        assert_eq!(n.normalize_case(""), None);
        assert_eq!(n.normalize_case("   "), None);
    }

    #[test]
    fn case_is_noop_when_disabled() {
        let n = Normalizer::new(NormalizationOptions::disabled());
        assert_eq!(n.normalize_case(" MiXed "), Some(" MiXed ".into()));
    }

    #[test]
    fn punctuation_becomes_space() {
        let n = only(|o| o.remove_punctuation = true);
        assert_eq!(n.remove_punctuation("fox,dog.cat"), "fox dog cat");
    }

    #[test]
    fn punctuation_set_ignores_whitespace() {
        let n = only(|o| {
            o.remove_punctuation = true;
            o.punctuation = ", ".into();
        });
        assert_eq!(n.remove_punctuation("a, b"), "a  b");
    }

    #[test]
    fn stop_words_are_removed() {
        let n = only(|o| {
            o.remove_stop_words = true;
            o.stop_words = ["the".to_string()].into_iter().collect();
        });
        assert_eq!(n.remove_stop_words("the quick fox"), "quick fox");
        assert_eq!(n.remove_stop_words("The quick fox"), "The quick fox");
        assert_eq!(n.remove_stop_words("the the"), "");
    }

    #[test]
    fn whitespace_is_reduced() {
        let n = only(|o| o.reduce_whitespace = true);
        assert_eq!(n.reduce_whitespace(" a\t\tb\r\n c\0d\u{0c} "), "a b c d");
    }

    #[test]
    fn each_operation_is_idempotent() {
        let n = Normalizer::new(NormalizationOptions { fold_unicode: true, ..Default::default() });
        let inputs = [
            "  The Quick, brown FOX!! jumps\tover\r\nthe lazy dog.  ",
            "ﬁle Ⅳ café",
            "x,y the",
            "",
            "...",
        ];
        for input in inputs {
            let once = n.fold_unicode(input);
            assert_eq!(n.fold_unicode(&once), once);

            let once = n.normalize_case(input);
            assert_eq!(once.as_deref().and_then(|v| n.normalize_case(v)), once);

            let once = n.remove_punctuation(input);
            assert_eq!(n.remove_punctuation(&once), once);

            let once = n.remove_stop_words(input);
            assert_eq!(n.remove_stop_words(&once), once);

            let once = n.reduce_whitespace(input);
            assert_eq!(n.reduce_whitespace(&once), once);

            let once = n.normalize_str(input);
            assert_eq!(once.as_deref().and_then(|v| n.normalize_str(v)), once);
        }
    }

    #[test]
    fn default_pipeline() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_str("  The QUICK, brown fox!  "), Some("quick brown fox".into()));
        assert_eq!(n.normalize_str("the"), None);
    }

    #[test]
    fn schema_collision_is_an_error() {
        let n = Normalizer::new(NormalizationOptions { normalize_keys: true, ..Default::default() });
        let mut schema = BTreeMap::new();
        schema.insert("Name".to_string(), DataType::String);
        schema.insert("name".to_string(), DataType::String);
        let err = n.normalize_schema(&schema).unwrap_err();
        assert_eq!(err.folded, "name");
        assert_ne!(err.first, err.second);

        let mut schema = BTreeMap::new();
        schema.insert("Name".to_string(), DataType::String);
        schema.insert("Age".to_string(), DataType::Integer);
        let folded = n.normalize_schema(&schema).unwrap();
        assert_eq!(folded.get("age"), Some(&DataType::Integer));
    }

    #[test]
    fn schema_keys_untouched_without_key_normalization() {
        let n = Normalizer::default();
        let mut schema = BTreeMap::new();
        schema.insert("Name".to_string(), DataType::String);
        schema.insert("name".to_string(), DataType::String);
        assert_eq!(n.normalize_schema(&schema).unwrap().len(), 2);
    }

    #[test]
    fn nodes_only_rewrite_strings() {
        let n = Normalizer::default();
        let nodes = vec![
            DataNode::new("name", Some("The Big Cat"), DataType::String),
            DataNode::new("price", Some("2.50"), DataType::Decimal),
            DataNode::new("note", Some("the"), DataType::String),
        ];
        let out = n.normalize_nodes(&nodes);
        assert_eq!(out[0].data.as_deref(), Some("big cat"));
        assert_eq!(out[1].data.as_deref(), Some("2.50"));
        assert_eq!(out[2].data, None);
    }

    #[test]
    fn tokens_merge_after_folding() {
        let n = Normalizer::default();
        let tokens = vec![
            Token { value: "Fox".into(), count: 1, positions: vec![0] },
            Token { value: "fox".into(), count: 2, positions: vec![0, 5] },
            Token { value: "the".into(), count: 1, positions: vec![1] },
        ];
        let out = n.normalize_tokens(&tokens);
        assert_eq!(out, vec![Token { value: "fox".into(), count: 3, positions: vec![0, 5] }]);
    }

    #[test]
    fn parse_result_is_copied() {
        let n = Normalizer::default();
        let original = ParseResult::new(ParsedContent::Html(HtmlContent {
            title: Some("The Title".into()),
            body: Some("Hello, World".into()),
            ..Default::default()
        }));
        let normalized = n.normalize_parse_result(&original).unwrap();
        match &normalized.content {
            ParsedContent::Html(h) => {
                assert_eq!(h.title.as_deref(), Some("title"));
                assert_eq!(h.body.as_deref(), Some("hello world"));
            }
            other => panic!("unexpected shape {other:?}"),
        }
        match &original.content {
            ParsedContent::Html(h) => assert_eq!(h.title.as_deref(), Some("The Title")),
            other => panic!("unexpected shape {other:?}"),
        }

        let text = ParseResult::new(ParsedContent::Text(TextContent {
            tokens: vec![Token::new("Rust", 0)],
        }));
        let normalized = n.normalize_parse_result(&text).unwrap();
        assert_eq!(normalized.content, ParsedContent::Text(TextContent { tokens: vec![Token::new("rust", 0)] }));
    }
}
