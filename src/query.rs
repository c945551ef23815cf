use std::fmt;

use crate::dataset::Dataset;

// ------------- QueryPart -------------
/// A single `column` / `pattern` predicate. Patterns are matched case
/// insensitively and may carry one leading and/or one trailing `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPart {
    column: String,
    pattern: String,
}

impl QueryPart {
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            pattern: pattern.into(),
        }
    }
    pub fn column(&self) -> &str {
        &self.column
    }
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
    pub fn matcher(&self) -> Matcher {
        Matcher::parse(&self.pattern)
    }
    /// False when the column is unknown to the row or the cell is unset.
    pub fn matches(&self, dataset: &dyn Dataset) -> bool {
        match dataset.get(&self.column) {
            Ok(Some(value)) => self.matcher().accepts(&value),
            _ => false,
        }
    }
}
impl fmt::Display for QueryPart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.column, self.pattern)
    }
}

/// Conjunction of all parts; an empty slice accepts everything.
pub fn matches_all(parts: &[QueryPart], dataset: &dyn Dataset) -> bool {
    parts.iter().all(|p| p.matches(dataset))
}

// ------------- Matcher -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Matcher {
    pub fn parse(pattern: &str) -> Self {
        let (leading, rest) = match pattern.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let (trailing, literal) = match rest.strip_suffix('*') {
            Some(literal) => (true, literal),
            None => (false, rest),
        };
        let literal = literal.to_lowercase();
        match (leading, trailing) {
            (false, false) => Matcher::Exact(literal),
            (false, true) => Matcher::Prefix(literal),
            (true, false) => Matcher::Suffix(literal),
            (true, true) => Matcher::Contains(literal),
        }
    }
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            Matcher::Exact(s) => value == *s,
            Matcher::Prefix(s) => value.starts_with(s.as_str()),
            Matcher::Suffix(s) => value.ends_with(s.as_str()),
            Matcher::Contains(s) => value.contains(s.as_str()),
        }
    }
    pub fn literal(&self) -> &str {
        match self {
            Matcher::Exact(s) | Matcher::Prefix(s) | Matcher::Suffix(s) | Matcher::Contains(s) => s,
        }
    }
}

// ------------- Query -------------
/// A list of parts addressed to one named datasource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    datasource: String,
    parts: Vec<QueryPart>,
}

impl Query {
    pub fn new(datasource: impl Into<String>, parts: Vec<QueryPart>) -> Self {
        Self {
            datasource: datasource.into(),
            parts,
        }
    }
    pub fn datasource(&self) -> &str {
        &self.datasource
    }
    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }
    pub fn len(&self) -> usize {
        self.parts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, QueryPart> {
        self.parts.iter()
    }
}
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}[{}]", self.datasource, parts.join(", "))
    }
}
