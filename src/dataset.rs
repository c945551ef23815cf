use std::collections::HashSet;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;

use crate::error::{ColumnNotFound, Result, TributaryError};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref COLUMN_NAME: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z_0-9]*$").unwrap();
}

/// Column names declared in configuration must be plain identifiers.
pub fn is_valid_column_name(name: &str) -> bool {
    COLUMN_NAME.is_match(name)
}

// ------------- Schema -------------
/// An ordered sequence of unique column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
    lookup: HashSet<String, OtherHasher>,
}

impl Schema {
    /// Fails with a configuration error naming `owner` if a column appears twice.
    pub fn new(owner: &str, columns: Vec<String>) -> Result<Self> {
        let mut lookup = HashSet::<String, OtherHasher>::default();
        for column in &columns {
            if !lookup.insert(column.clone()) {
                return Err(TributaryError::config(
                    owner,
                    format!("Column \"{}\" is defined twice in schema", column),
                ));
            }
        }
        Ok(Self { columns, lookup })
    }
    pub fn contains(&self, column: &str) -> bool {
        self.lookup.contains(column)
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.columns.iter()
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    /// Columns of `self` that `other` lacks, in `self`'s order.
    pub fn missing_from(&self, other: &Schema) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !other.contains(c))
            .cloned()
            .collect()
    }
    /// Set equality, ignoring order.
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.lookup == other.lookup
    }
}
impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.columns.join(", "))
    }
}

// ------------- Dataset -------------
/// One logical, immutable row.
///
/// `get` distinguishes a column outside the schema (`Err`) from an unset
/// cell (`Ok(None)`). Keys are opaque and not guaranteed to be unique within
/// a result.
pub trait Dataset: fmt::Debug + Send + Sync {
    fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound>;
    fn key(&self) -> &str;
    /// Tag of the kind of source that produced the row, used together with
    /// the key to deduplicate merged search results.
    fn producer(&self) -> &'static str;
}

pub type Row = Arc<dyn Dataset>;

fn address(row: &Row) -> usize {
    Arc::as_ptr(row) as *const () as usize
}

// ------------- QueryResults -------------
pub trait QueryResults: Send + Sync {
    fn len(&self) -> usize;
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn to_vec(&self) -> Vec<Row> {
        self.iter().collect()
    }
}

pub type Results = Box<dyn QueryResults>;

/// A materialized list of rows.
#[derive(Debug, Default, Clone)]
pub struct QueryResultsList {
    rows: Vec<Row>,
}
impl QueryResultsList {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }
    pub fn boxed(self) -> Results {
        Box::new(self)
    }
}
impl From<Vec<Row>> for QueryResultsList {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}
impl QueryResults for QueryResultsList {
    fn len(&self) -> usize {
        self.rows.len()
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().cloned())
    }
}

pub fn no_results() -> Results {
    QueryResultsList::empty().boxed()
}

pub type Identity = Box<dyn Fn(&dyn Dataset) -> String + Send + Sync>;

fn producer_and_key(dataset: &dyn Dataset) -> String {
    format!("{}\u{1f}{}", dataset.producer(), dataset.key())
}

/// Rows deduplicated by a caller-supplied identity, first occurrence wins.
pub struct QueryResultsSet {
    rows: Vec<Row>,
    seen: HashSet<String, OtherHasher>,
    identity: Identity,
}
impl QueryResultsSet {
    /// Deduplicates on `(producer, key)`.
    pub fn new() -> Self {
        Self::with_identity(producer_and_key)
    }
    pub fn with_identity<F>(identity: F) -> Self
    where
        F: Fn(&dyn Dataset) -> String + Send + Sync + 'static,
    {
        Self {
            rows: Vec::new(),
            seen: HashSet::default(),
            identity: Box::new(identity),
        }
    }
    /// Returns false if an equal row was already present.
    pub fn add(&mut self, row: Row) -> bool {
        let id = (self.identity)(row.as_ref());
        if self.seen.insert(id) {
            self.rows.push(row);
            true
        } else {
            false
        }
    }
    pub fn add_all(&mut self, results: &dyn QueryResults) {
        for row in results.iter() {
            self.add(row);
        }
    }
}
impl Default for QueryResultsSet {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Debug for QueryResultsSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueryResultsSet").field("rows", &self.rows).finish()
    }
}
impl QueryResults for QueryResultsSet {
    fn len(&self) -> usize {
        self.rows.len()
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().cloned())
    }
}

/// Both result sets in order. A row object already yielded by the first
/// set is not yielded again by the second; equal keys on both sides survive.
///
/// Both sides are read once at construction and the rows are held, so row
/// identity stays stable while the union is alive.
pub struct QueryResultsUnion {
    rows: Vec<Row>,
}
impl QueryResultsUnion {
    pub fn new(first: Results, second: Results) -> Self {
        let mut rows: Vec<Row> = first.iter().collect();
        let in_first: HashSet<usize, OtherHasher> = rows.iter().map(address).collect();
        rows.extend(second.iter().filter(|r| !in_first.contains(&address(r))));
        Self { rows }
    }
}
impl QueryResults for QueryResultsUnion {
    fn len(&self) -> usize {
        self.rows.len()
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);
    impl Dataset for Plain {
        fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound> {
            Err(ColumnNotFound(column.to_string()))
        }
        fn key(&self) -> &str {
            self.0
        }
        fn producer(&self) -> &'static str {
            "plain"
        }
    }

    #[test]
    fn schema_rejects_duplicates() {
        let err = Schema::new("people", vec!["a".into(), "b".into(), "a".into()]).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
        assert!(err.to_string().contains("people"));
    }

    #[test]
    fn schema_set_equality_ignores_order() {
        let s1 = Schema::new("x", vec!["a".into(), "b".into()]).unwrap();
        let s2 = Schema::new("y", vec!["b".into(), "a".into()]).unwrap();
        let s3 = Schema::new("z", vec!["a".into(), "c".into()]).unwrap();
        assert!(s1.same_columns(&s2));
        assert!(!s1.same_columns(&s3));
        assert_eq!(s1.missing_from(&s3), vec!["b".to_string()]);
    }

    #[test]
    fn union_skips_identical_row_objects_only() {
        let shared: Row = Arc::new(Plain("k"));
        let twin: Row = Arc::new(Plain("k"));
        let first = QueryResultsList::new(vec![Arc::clone(&shared)]).boxed();
        let second = QueryResultsList::new(vec![Arc::clone(&shared), twin]).boxed();
        let union = QueryResultsUnion::new(first, second);
        assert_eq!(union.len(), 2);
        assert_eq!(union.iter().count(), 2);
    }

    #[test]
    fn column_names_are_identifiers() {
        assert!(is_valid_column_name("_Name2"));
        assert!(!is_valid_column_name("2name"));
        assert!(!is_valid_column_name("a-b"));
        assert!(!is_valid_column_name(""));
    }
}
