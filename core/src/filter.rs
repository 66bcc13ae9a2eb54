//! Filter predicate evaluation.

use crate::error::{Error, Result};
use crate::index::{DataNode, DataType, SourceDocument};
use crate::normalizer::Normalizer;
use crate::query::{FilterCondition, SearchFilter};
use std::cmp::Ordering;

/// Numbers compare numerically, anything else lexically.
fn compare(actual: &str, expected: &str) -> Option<Ordering> {
    match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(actual.cmp(expected)),
    }
}

fn both(actual: Option<&str>, expected: Option<&str>, f: impl FnOnce(&str, &str) -> bool) -> bool {
    match (actual, expected) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    }
}

impl FilterCondition {
    /// Conditions that can only compare against a concrete value. Equality
    /// accepts a missing value and compares against null.
    pub fn needs_value(self) -> bool {
        use FilterCondition::*;
        matches!(
            self,
            Contains
                | ContainsNot
                | StartsWith
                | EndsWith
                | GreaterThan
                | GreaterThanOrEqualTo
                | LessThan
                | LessThanOrEqualTo
        )
    }

    /// Evaluates the predicate. `None` stands for a null value.
    pub fn evaluate(self, actual: Option<&str>, expected: Option<&str>) -> bool {
        use FilterCondition::*;
        match self {
            IsNull => actual.is_none(),
            IsNotNull => actual.is_some(),
            Equals => actual == expected,
            NotEquals => actual != expected,
            ContainsNot => match (actual, expected) {
                (None, _) => true,
                (Some(a), Some(e)) => !a.contains(e),
                (Some(_), None) => false,
            },
            Contains => both(actual, expected, |a, e| a.contains(e)),
            StartsWith => both(actual, expected, |a, e| a.starts_with(e)),
            EndsWith => both(actual, expected, |a, e| a.ends_with(e)),
            GreaterThan => both(actual, expected, |a, e| compare(a, e) == Some(Ordering::Greater)),
            GreaterThanOrEqualTo => both(actual, expected, |a, e| {
                matches!(compare(a, e), Some(Ordering::Greater | Ordering::Equal))
            }),
            LessThan => both(actual, expected, |a, e| compare(a, e) == Some(Ordering::Less)),
            LessThanOrEqualTo => both(actual, expected, |a, e| {
                matches!(compare(a, e), Some(Ordering::Less | Ordering::Equal))
            }),
        }
    }
}

impl SearchFilter {
    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(Error::MissingInput("filter field"));
        }
        if self.condition.needs_value() && self.value.is_none() {
            return Err(Error::InvalidInput(format!("{:?} filter on {:?} needs a value", self.condition, self.field)));
        }
        Ok(())
    }

    /// True if any node addressed by the filter's field satisfies it. String
    /// values were normalized at index time, so the expected value is too.
    pub fn matches_nodes(&self, nodes: &[DataNode], normalizer: &Normalizer) -> bool {
        let field = normalizer.normalize_key(&self.field);
        let normalized = self.value.as_deref().and_then(|v| normalizer.normalize_str(v));
        nodes.iter().filter(|n| n.key == field).any(|node| {
            let expected = match node.data_type {
                DataType::String => normalized.as_deref(),
                _ => self.value.as_deref(),
            };
            self.condition.evaluate(node.data.as_deref(), expected)
        })
    }

    pub fn matches_document(&self, document: &SourceDocument) -> bool {
        self.condition.evaluate(document.field(&self.field).as_deref(), self.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterCondition::*;

    #[test]
    fn null_handling() {
        assert!(IsNull.evaluate(None, None));
        assert!(!IsNull.evaluate(Some("x"), None));
        assert!(IsNotNull.evaluate(Some(""), None));
        assert!(NotEquals.evaluate(None, Some("x")));
        assert!(ContainsNot.evaluate(None, Some("x")));
        assert!(!Contains.evaluate(None, Some("x")));
        assert!(!GreaterThan.evaluate(Some("3"), None));
    }

    #[test]
    fn string_predicates() {
        assert!(Equals.evaluate(Some("abc"), Some("abc")));
        assert!(Contains.evaluate(Some("abcdef"), Some("cd")));
        assert!(ContainsNot.evaluate(Some("abcdef"), Some("xy")));
        assert!(StartsWith.evaluate(Some("abcdef"), Some("ab")));
        assert!(EndsWith.evaluate(Some("abcdef"), Some("ef")));
        assert!(!EndsWith.evaluate(Some("abcdef"), Some("ab")));
    }

    #[test]
    fn numbers_compare_numerically() {
        assert!(GreaterThan.evaluate(Some("10"), Some("9")));
        assert!(LessThanOrEqualTo.evaluate(Some("2.5"), Some("2.50")));
        assert!(GreaterThanOrEqualTo.evaluate(Some("b"), Some("a")));
        assert!(LessThan.evaluate(Some("2024-01-01T00:00:00Z"), Some("2024-06-01T00:00:00Z")));
    }

    #[test]
    fn any_node_with_the_key_may_match() {
        let nodes = vec![
            DataNode::new("tags", Some("red"), DataType::String),
            DataNode::new("tags", Some("blue"), DataType::String),
            DataNode::new("age", Some("42"), DataType::Integer),
        ];
        let n = Normalizer::default();
        assert!(SearchFilter::new("tags", Equals, Some("Blue")).matches_nodes(&nodes, &n));
        assert!(!SearchFilter::new("tags", Equals, Some("green")).matches_nodes(&nodes, &n));
        assert!(SearchFilter::new("age", GreaterThan, Some("40")).matches_nodes(&nodes, &n));
        assert!(!SearchFilter::new("missing", IsNull, None).matches_nodes(&nodes, &n));
    }

    #[test]
    fn comparisons_need_a_value() {
        assert!(SearchFilter::new("age", Equals, None).validate().is_ok());
        assert!(SearchFilter::new("age", IsNull, None).validate().is_ok());
        assert!(matches!(SearchFilter::new("age", GreaterThan, None).validate(), Err(Error::InvalidInput(_))));
        assert!(matches!(SearchFilter::new(" ", Equals, Some("x")).validate(), Err(Error::MissingInput(_))));
    }
}
