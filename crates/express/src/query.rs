//! Query string parsing with repeated-key support.
//!
//! A key that appears once maps to a single value, a key that appears several
//! times maps to every value in order of appearance:
//!
//! ```
//! use micro_express::{ParsedQuery, QueryValue};
//!
//! let query = ParsedQuery::parse("tag=a&tag=b&q=hello+world");
//! assert_eq!(query.get_str("q"), Some("hello world"));
//! assert_eq!(query.get("tag"), Some(&QueryValue::Multiple(vec!["a".into(), "b".into()])));
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::warn;

/// The value(s) of one query key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// The first value.
    pub fn first(&self) -> &str {
        match self {
            QueryValue::Single(value) => value,
            QueryValue::Multiple(values) => values.first().map_or("", String::as_str),
        }
    }

    /// Every value, in order of appearance.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            QueryValue::Single(value) => std::slice::from_ref(value),
            QueryValue::Multiple(values) => values,
        };
        values.iter().map(String::as_str)
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = QueryValue::Multiple(vec![first, value]);
            }
            QueryValue::Multiple(values) => values.push(value),
        }
    }
}

/// A decoded query string keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    inner: HashMap<String, QueryValue>,
}

impl ParsedQuery {
    /// Parses a raw query string, without the leading `?`.
    ///
    /// Pairs are percent-decoded, `+` decodes to a space, and a key without
    /// `=` maps to an empty value.
    pub fn parse(raw: &str) -> Self {
        let mut inner = HashMap::new();
        if raw.is_empty() {
            return Self { inner };
        }

        let pairs = match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(cause = %e, "can't decode query string");
                return Self { inner };
            }
        };

        for (key, value) in pairs {
            match inner.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().push(value),
                Entry::Vacant(entry) => {
                    entry.insert(QueryValue::Single(value));
                }
            }
        }

        Self { inner }
    }

    /// The value(s) of `key`.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.inner.get(key)
    }

    /// The first value of `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(QueryValue::first)
    }

    /// Whether `key` appeared at all, with or without a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no key was given.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The keys and their values, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.inner.iter().map(|(key, value)| (key.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query() {
        assert!(ParsedQuery::parse("").is_empty());
    }

    #[test]
    fn single_values() {
        let query = ParsedQuery::parse("active=true&page=2");

        assert_eq!(query.len(), 2);
        assert_eq!(query.get("active"), Some(&QueryValue::Single("true".into())));
        assert_eq!(query.get_str("page"), Some("2"));
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn repeated_keys_collect_in_order() {
        let query = ParsedQuery::parse("a=1&b=x&a=2&a=3");

        assert_eq!(query.get("a").unwrap().values().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        assert_eq!(query.get_str("a"), Some("1"));
        assert_eq!(query.get_str("b"), Some("x"));

        let mut keys: Vec<_> = query.iter().map(|(key, value)| (key, value.values().count())).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![("a", 3), ("b", 1)]);
    }

    #[test]
    fn decodes_values() {
        let query = ParsedQuery::parse("name=J%C3%BCrgen&greeting=hello+there&flag");

        assert_eq!(query.get_str("name"), Some("Jürgen"));
        assert_eq!(query.get_str("greeting"), Some("hello there"));
        assert_eq!(query.get_str("flag"), Some(""));
        assert!(query.contains_key("flag"));
        assert!(!query.contains_key("missing"));
    }
}
