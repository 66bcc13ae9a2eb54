//! Turns a normalized parse result into the terms and postings of one document.
//!
//! Positions come from a single counter per document. It starts at zero and
//! advances once for every fragment that survives the length filter, across
//! HTML fields and across structured nodes alike, so positions never repeat
//! within a document. Pre-tokenized text keeps the positions it arrived with.

use crate::index::{DataNode, ParseResult, ParsedContent, Position, Posting, PostingsResult, Timestamps, Token};
use crate::normalizer::{DEFAULT_PUNCTUATION, DEFAULT_SPLIT_CHARACTERS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingsOptions {
    pub split_characters: Vec<char>,
    /// Replace punctuation with spaces before splitting.
    pub remove_punctuation: bool,
    pub punctuation: String,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for PostingsOptions {
    fn default() -> Self {
        Self {
            split_characters: DEFAULT_SPLIT_CHARACTERS.to_vec(),
            remove_punctuation: false,
            punctuation: DEFAULT_PUNCTUATION.to_string(),
            min_token_length: 1,
            max_token_length: 64,
        }
    }
}

impl PostingsOptions {
    pub fn accepts_length(&self, len: usize) -> bool {
        self.min_token_length <= len && len <= self.max_token_length
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostingsGenerator {
    options: PostingsOptions,
}

/// Running state for one document.
#[derive(Default)]
struct Accumulator {
    next_position: Position,
    tokens: BTreeMap<String, Token>,
}

impl Accumulator {
    fn add(&mut self, token: Token) {
        match self.tokens.get_mut(&token.value) {
            Some(existing) => existing.merge(token),
            None => {
                self.tokens.insert(token.value.clone(), token);
            }
        }
    }

    fn add_fragment(&mut self, fragment: &str) {
        let position = self.next_position;
        self.next_position += 1;
        self.add(Token::new(fragment, position));
    }
}

impl PostingsGenerator {
    pub fn new(options: PostingsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PostingsOptions {
        &self.options
    }

    /// Splits `text` into fragments that pass the length filter, in order.
    pub fn fragments(&self, text: &str) -> Vec<String> {
        let stripped;
        let text = if self.options.remove_punctuation {
            let punctuation: HashSet<char> = self.options.punctuation.chars().collect();
            stripped = text
                .chars()
                .map(|c| if punctuation.contains(&c) { ' ' } else { c })
                .collect::<String>();
            stripped.as_str()
        } else {
            text
        };
        text.split(|c: char| self.options.split_characters.contains(&c))
            .map(str::trim)
            .filter(|f| !f.is_empty() && self.options.accepts_length(f.chars().count()))
            .map(str::to_string)
            .collect()
    }

    fn ingest_text(&self, acc: &mut Accumulator, text: &str) {
        for fragment in self.fragments(text) {
            acc.add_fragment(&fragment);
        }
    }

    fn ingest_nodes(&self, acc: &mut Accumulator, nodes: &[DataNode]) {
        for node in nodes {
            if let Some(data) = node.data.as_deref() {
                self.ingest_text(acc, data);
            }
        }
    }

    fn ingest_tokens(&self, acc: &mut Accumulator, tokens: &[Token]) {
        for token in tokens {
            let value = token.value.trim();
            if value.is_empty() || !self.options.accepts_length(value.chars().count()) {
                continue;
            }
            acc.add(Token { value: value.to_string(), count: token.count, positions: token.positions.clone() });
        }
    }

    /// Produces the postings for one already-normalized parse result, which
    /// is retained inside the output.
    pub fn generate(&self, parse_result: ParseResult) -> PostingsResult {
        let mut time = Timestamps::begin();
        let mut acc = Accumulator::default();

        match &parse_result.content {
            ParsedContent::Html(html) => {
                for field in html.fields().into_iter().flatten() {
                    self.ingest_text(&mut acc, field);
                }
            }
            ParsedContent::Json(s) | ParsedContent::Sql(s) | ParsedContent::Xml(s) => {
                self.ingest_nodes(&mut acc, &s.nodes)
            }
            ParsedContent::Text(text) => self.ingest_tokens(&mut acc, &text.tokens),
        }

        let terms: Vec<String> = acc.tokens.keys().cloned().collect();
        let mut postings: Vec<Posting> = acc.tokens.into_values().map(Posting::from).collect();
        // Stable sort keeps ascending term order among equal counts.
        postings.sort_by(|a, b| b.positions.len().cmp(&a.positions.len()));

        time.finish();
        tracing::debug!(terms = terms.len(), kind = %parse_result.document_type(), "generated postings");
        PostingsResult { success: true, time, terms, postings, parse_result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DataType, HtmlContent, StructuredContent, TextContent};
    use std::collections::BTreeSet;

    fn html(title: &str, body: &str) -> ParseResult {
        ParseResult::new(ParsedContent::Html(HtmlContent {
            title: Some(title.into()),
            body: Some(body.into()),
            ..Default::default()
        }))
    }

    fn posting<'a>(result: &'a PostingsResult, term: &str) -> &'a Posting {
        result.postings.iter().find(|p| p.term == term).expect("term present")
    }

    #[test]
    fn positions_continue_across_html_fields() {
        let result = PostingsGenerator::default().generate(html("rust search", "fast rust index"));
        assert_eq!(posting(&result, "rust").positions, vec![0, 3]);
        assert_eq!(posting(&result, "rust").frequency, 2);
        assert_eq!(posting(&result, "search").positions, vec![1]);
        assert_eq!(posting(&result, "index").positions, vec![4]);
        assert_eq!(result.postings[0].term, "rust");
    }

    #[test]
    fn positions_continue_across_nodes() {
        let pr = ParseResult::new(ParsedContent::Json(StructuredContent {
            nodes: vec![
                DataNode::new("a", Some("red fox"), DataType::String),
                DataNode::new("b", None, DataType::Null),
                DataNode::new("c", Some("fox"), DataType::String),
            ],
            ..Default::default()
        }));
        let result = PostingsGenerator::default().generate(pr);
        assert_eq!(posting(&result, "fox").positions, vec![1, 2]);
        assert_eq!(result.terms, vec!["fox".to_string(), "red".to_string()]);
    }

    #[test]
    fn length_filter_is_inclusive() {
        let generator = PostingsGenerator::new(PostingsOptions {
            min_token_length: 2,
            max_token_length: 4,
            ..Default::default()
        });
        let frags = generator.fragments("a ab abc abcd abcde");
        assert_eq!(frags, vec!["ab", "abc", "abcd"]);
        for len in 0..8 {
            assert_eq!(generator.options().accepts_length(len), (2..=4).contains(&len));
        }
    }

    #[test]
    fn punctuation_stripped_before_split() {
        let generator = PostingsGenerator::new(PostingsOptions {
            remove_punctuation: true,
            ..Default::default()
        });
        assert_eq!(generator.fragments("e-mail (draft)"), vec!["e", "mail", "draft"]);
    }

    #[test]
    fn text_tokens_keep_their_positions() {
        let pr = ParseResult::new(ParsedContent::Text(TextContent {
            tokens: vec![
                Token { value: "alpha".into(), count: 2, positions: vec![4, 9] },
                Token { value: "".into(), count: 1, positions: vec![1] },
                Token { value: "beta".into(), count: 1, positions: vec![2] },
            ],
        }));
        let result = PostingsGenerator::default().generate(pr);
        assert_eq!(posting(&result, "alpha").frequency, 2);
        assert_eq!(posting(&result, "alpha").positions, vec![4, 9]);
        assert_eq!(result.postings.len(), 2);
    }

    #[test]
    fn terms_match_postings_and_have_no_duplicates() {
        let result = PostingsGenerator::default().generate(html("a b a", "b c c c"));
        let from_postings: BTreeSet<&str> = result.postings.iter().map(|p| p.term.as_str()).collect();
        let terms: BTreeSet<&str> = result.terms.iter().map(String::as_str).collect();
        assert_eq!(from_postings, terms);
        assert_eq!(result.postings.len(), result.terms.len());
        let counts: Vec<usize> = result.postings.iter().map(|p| p.positions.len()).collect();
        let mut sorted = counts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
    }

    #[test]
    fn generation_is_deterministic() {
        let generator = PostingsGenerator::default();
        let a = generator.generate(html("one two", "two three one one"));
        let b = generator.generate(html("one two", "two three one one"));
        assert_eq!(a.postings, b.postings);
        assert_eq!(a.terms, b.terms);
    }

    #[test]
    fn parse_result_is_retained() {
        let pr = html("kept", "");
        let result = PostingsGenerator::default().generate(pr.clone());
        assert_eq!(result.parse_result, pr);
        assert!(result.success);
    }
}
