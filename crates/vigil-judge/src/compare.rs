//! Numeric comparison operators and tag-matching predicates.

use crate::error::ParseError;
use std::collections::HashMap;
use std::str::FromStr;

/// Tolerance used by `=` and `!=`.
pub const EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl FromStr for CompareOp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" | "eq" => Ok(Self::Equal),
            "!=" | "<>" | "ne" => Ok(Self::NotEqual),
            "<" | "lt" => Ok(Self::Less),
            "<=" | "lte" | "le" => Ok(Self::LessEqual),
            ">" | "gt" => Ok(Self::Greater),
            ">=" | "gte" | "ge" => Ok(Self::GreaterEqual),
            other => Err(ParseError::UnknownOperator(other.to_string())),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
        };
        f.write_str(s)
    }
}

impl CompareOp {
    /// Evaluates `left OP right`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_judge::compare::CompareOp;
    ///
    /// let eq: CompareOp = "=".parse().unwrap();
    /// assert!(eq.compare(0.1 + 0.2, 0.3));
    /// let gt: CompareOp = ">".parse().unwrap();
    /// assert!(!gt.compare(1.0, 1.0));
    /// ```
    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Equal => (left - right).abs() < EPSILON,
            Self::NotEqual => (left - right).abs() >= EPSILON,
            Self::Less => left < right,
            Self::LessEqual => left <= right,
            Self::Greater => left > right,
            Self::GreaterEqual => left >= right,
        }
    }
}

/// How a tag value is matched against a needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    Equal,
    NotEqual,
    Prefix,
    Suffix,
    Contains,
}

impl TagMatch {
    fn from_marker(marker: char) -> Option<Self> {
        match marker {
            '^' => Some(Self::Prefix),
            '$' => Some(Self::Suffix),
            '*' => Some(Self::Contains),
            '!' => Some(Self::NotEqual),
            _ => None,
        }
    }

    fn hit(self, value: &str, needle: &str) -> bool {
        match self {
            Self::Equal | Self::NotEqual => value == needle,
            Self::Prefix => value.starts_with(needle),
            Self::Suffix => value.ends_with(needle),
            Self::Contains => value.contains(needle),
        }
    }
}

/// A compiled tag filter such as `host^=web` or `idc!=[bj|sh]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPredicate {
    key: String,
    kind: TagMatch,
    needles: Vec<String>,
}

impl TagPredicate {
    /// Compiles a predicate from a key carrying an optional family marker
    /// (`^`, `$`, `*`, `!`, or a trailing `=`) and its operand.
    ///
    /// When `value` is empty and `key` holds a whole expression, the
    /// expression is split at its first `=`. A bracketed operand `[a|b]`
    /// matches any of the listed values.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use vigil_judge::compare::TagPredicate;
    ///
    /// let p = TagPredicate::compile("user^=[a|b]", "").unwrap();
    /// assert_eq!(p.key(), "user");
    /// let mut tags = HashMap::new();
    /// tags.insert("user".to_string(), "abc".to_string());
    /// assert!(p.matches(&tags));
    /// ```
    pub fn compile(key: &str, value: &str) -> Result<Self, ParseError> {
        let (mut key, value) = match key.split_once('=') {
            Some((k, rest)) if value.is_empty() && !rest.is_empty() => (k, rest),
            _ => (key, value),
        };
        key = key.trim();
        if let Some(stripped) = key.strip_suffix('=') {
            key = stripped;
        }

        let mut kind = TagMatch::Equal;
        if let Some(marker) = key.chars().last() {
            if let Some(k) = TagMatch::from_marker(marker) {
                kind = k;
                key = &key[..key.len() - marker.len_utf8()];
            }
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::TagFilter(format!("{key}={value}")));
        }

        let value = value.trim();
        let needles = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            Some(list) => list.split('|').map(|s| s.trim().to_string()).collect(),
            None => vec![value.to_string()],
        };

        Ok(Self {
            key: key.to_string(),
            kind,
            needles,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> TagMatch {
        self.kind
    }

    /// Matches a single tag value.
    pub fn matches_value(&self, value: &str) -> bool {
        if self.kind == TagMatch::NotEqual {
            if value.is_empty() && self.needles.iter().any(|n| !n.is_empty()) {
                return false;
            }
            return !self.needles.iter().any(|n| self.kind.hit(value, n));
        }
        self.needles.iter().any(|n| self.kind.hit(value, n))
    }

    /// Matches against a resolved tag set; an absent tag never matches.
    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        tags.get(&self.key)
            .is_some_and(|value| self.matches_value(value))
    }
}

/// Parses a comma separated tag filter string into predicates.
pub fn parse_tag_filters(text: &str) -> Result<Vec<TagPredicate>, ParseError> {
    let mut predicates = Vec::new();
    for expr in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = expr
            .split_once('=')
            .ok_or_else(|| ParseError::TagFilter(expr.to_string()))?;
        predicates.push(TagPredicate::compile(key, value)?);
    }
    Ok(predicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ordering_operators_are_exact() {
        let cases = [(1.0, 1.0), (1.0, 1.000001), (2.0, 1.0), (-3.0, 4.5)];
        for (a, b) in cases {
            assert_eq!(CompareOp::Less.compare(a, b), a < b);
            assert_eq!(CompareOp::LessEqual.compare(a, b), a <= b);
            assert_eq!(CompareOp::Greater.compare(a, b), a > b);
            assert_eq!(CompareOp::GreaterEqual.compare(a, b), a >= b);
        }
    }

    #[test]
    fn equality_uses_epsilon() {
        assert!(CompareOp::Equal.compare(1.0, 1.000_000_1));
        assert!(!CompareOp::Equal.compare(1.0, 1.0001));
        assert!(CompareOp::NotEqual.compare(1.0, 1.0001));
        assert!(!CompareOp::NotEqual.compare(1.0, 1.000_001));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert_eq!(
            "~=".parse::<CompareOp>(),
            Err(ParseError::UnknownOperator("~=".into()))
        );
        assert_eq!("gte".parse::<CompareOp>(), Ok(CompareOp::GreaterEqual));
    }

    #[test]
    fn prefix_list_matches_any_listed_prefix() {
        let p = TagPredicate::compile("user^=[a|b]", "").unwrap();
        assert_eq!(p.kind(), TagMatch::Prefix);
        assert!(p.matches_value("abc"));
        assert!(!p.matches_value("xyz"));
        assert!(p.matches_value("bcd"));
        assert!(!p.matches_value("cab"));
    }

    #[test]
    fn families_from_trailing_marker() {
        assert_eq!(TagPredicate::compile("a$", "x").unwrap().kind(), TagMatch::Suffix);
        assert_eq!(TagPredicate::compile("a*", "x").unwrap().kind(), TagMatch::Contains);
        assert_eq!(TagPredicate::compile("a!", "x").unwrap().kind(), TagMatch::NotEqual);
        assert_eq!(TagPredicate::compile("a=", "x").unwrap().kind(), TagMatch::Equal);
        assert_eq!(TagPredicate::compile("a", "x").unwrap().kind(), TagMatch::Equal);
    }

    #[test]
    fn suffix_and_contains() {
        let s = TagPredicate::compile("host$", "-db").unwrap();
        assert!(s.matches_value("bj-db"));
        assert!(!s.matches_value("db-bj"));
        let c = TagPredicate::compile("host*", "[web|api]").unwrap();
        assert!(c.matches_value("bj-web-01"));
        assert!(c.matches_value("api"));
        assert!(!c.matches_value("db"));
    }

    #[test]
    fn not_equal_list_matches_none() {
        let p = TagPredicate::compile("idc!", "[bj|sh]").unwrap();
        assert!(p.matches_value("gz"));
        assert!(!p.matches_value("bj"));
        assert!(!p.matches_value("sh"));
    }

    #[test]
    fn not_equal_rejects_empty_value() {
        let p = TagPredicate::compile("idc!", "bj").unwrap();
        assert!(!p.matches_value(""));
        assert!(p.matches_value("sh"));
    }

    #[test]
    fn missing_tag_never_matches() {
        let p = TagPredicate::compile("idc!", "bj").unwrap();
        assert!(!p.matches(&tags(&[("host", "a")])));
        assert!(p.matches(&tags(&[("idc", "sh")])));
    }

    #[test]
    fn parse_filter_string() {
        let preds = parse_tag_filters("host^=web, idc!=[bj|sh],endpoint=10.0.0.1").unwrap();
        assert_eq!(preds.len(), 3);
        assert_eq!(preds[0].key(), "host");
        assert_eq!(preds[1].kind(), TagMatch::NotEqual);
        assert_eq!(preds[2].key(), "endpoint");
        assert!(parse_tag_filters("").unwrap().is_empty());
        assert!(parse_tag_filters("host").is_err());
        assert!(parse_tag_filters("^=x").is_err());
    }
}
