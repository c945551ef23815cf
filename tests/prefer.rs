mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TIMEOUT, column, keys, source, table};
use tributary::dataset::{Results, Schema};
use tributary::datasource::{Datasource, Source};
use tributary::error::{Result, TributaryError};
use tributary::prefer::PreferDatasource;
use tributary::query::QueryPart;

fn base() -> Source {
    source(table(
        "ldap",
        &["id", "Nachname"],
        &[
            ("1", &[Some("1"), Some("Müller")]),
            ("2", &[Some("2"), Some("Meier")]),
            ("3", &[Some("3"), Some("Mayer")]),
        ],
    ))
}

fn corrections() -> Source {
    source(table(
        "own",
        &["Nachname", "id"],
        &[("2", &[Some("Meyer"), Some("2")]), ("3", &[Some("Schmidt"), Some("3")])],
    ))
}

#[test]
fn override_rows_come_first() {
    let ds = PreferDatasource::new("main", base(), corrections()).unwrap();
    let found = ds.find(&[QueryPart::new("Nachname", "M*")], TIMEOUT).unwrap();
    assert_eq!(keys(found.as_ref()), ["2", "1"]);
    assert_eq!(
        column(found.as_ref(), "Nachname"),
        [Some("Meyer".to_string()), Some("Müller".to_string())]
    );
}

#[test]
fn ghost_keys_suppress_base_rows() {
    let ds = PreferDatasource::new("main", base(), corrections()).unwrap();
    // "3" is corrected to Schmidt, which no longer matches
    let found = ds.find(&[QueryPart::new("Nachname", "Mayer")], TIMEOUT).unwrap();
    assert_eq!(found.len(), 0);
    assert_eq!(found.iter().count(), 0);
}

#[test]
fn size_matches_iteration() {
    let ds = PreferDatasource::new("main", base(), corrections()).unwrap();
    for pattern in ["*", "M*", "*er", "Schmidt", "x"] {
        let found = ds.find(&[QueryPart::new("Nachname", pattern)], TIMEOUT).unwrap();
        assert_eq!(found.len(), found.iter().count(), "{pattern}");
    }
    let all: Vec<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
    let found = ds.datasets_by_key(&all, TIMEOUT).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(keys(found.as_ref()), ["2", "3", "1"]);
}

#[test]
fn duplicate_base_keys_are_all_suppressed() {
    let base = source(table(
        "base",
        &["id", "name"],
        &[("k", &[Some("k"), Some("a")]), ("k", &[Some("k"), Some("b")]), ("m", &[Some("m"), Some("c")])],
    ));
    let over = source(table("over", &["id", "name"], &[("k", &[Some("k"), Some("z")])]));
    let ds = PreferDatasource::new("p", base, over).unwrap();
    let found = ds.find(&[QueryPart::new("name", "*")], TIMEOUT).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(keys(found.as_ref()), ["k", "m"]);
}

#[test]
fn schemas_must_agree() {
    let other = source(table("other", &["id", "Vorname"], &[]));
    let err = PreferDatasource::new("main", base(), other).err().unwrap();
    assert!(err.is_config());
    let msg = err.to_string();
    assert!(msg.contains("Nachname") && msg.contains("Vorname"), "{msg}");
}

/// Answers `find` but fails every key lookup.
struct Flaky {
    inner: Source,
}

impl Datasource for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        self.inner.find(query, timeout)
    }
    fn datasets_by_key(&self, _keys: &[String], _timeout: Duration) -> Result<Results> {
        Err(TributaryError::backend("flaky", "connection reset"))
    }
    fn contents(&self, timeout: Duration) -> Result<Results> {
        self.inner.contents(timeout)
    }
}

#[test]
fn failed_ghost_fetch_is_an_error() {
    let over: Source = Arc::new(Flaky { inner: corrections() });
    let ds = PreferDatasource::new("main", base(), over).unwrap();
    let err = ds.find(&[QueryPart::new("Nachname", "M*")], TIMEOUT).err().unwrap();
    assert!(matches!(err, TributaryError::Backend { .. }));
    // no base rows, no key lookup
    assert!(ds.find(&[QueryPart::new("Nachname", "x")], TIMEOUT).unwrap().is_empty());
}
