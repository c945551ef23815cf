mod common;

use std::time::Duration;

use common::{Broken, TIMEOUT, column, keys, source, table};
use tributary::datasource::{Datasource, Source};
use tributary::error::TributaryError;
use tributary::overlay::{Mode, OverlayDatasource};
use tributary::query::QueryPart;
use tributary::registry::{SourceDesc, SourceMap};

fn mock() -> Source {
    source(table(
        "mock",
        &["column", "join"],
        &[("ds", &[Some("value"), Some("join")]), ("ds3", &[Some("value3"), Some("nojoin")])],
    ))
}

fn overlay(mode: &str, extra: Source) -> OverlayDatasource {
    let mode = Mode::parse("overlay", mode).unwrap();
    OverlayDatasource::new("overlay", mock(), extra, mode, vec![("join".into(), "join".into())]).unwrap()
}

#[test]
fn schema_and_lookup() {
    let extra = source(table("mock2", &["column2", "join"], &[("ds2", &[Some("value2"), Some("join")])]));
    let ds = overlay("so", extra);
    assert_eq!(ds.name(), "overlay");
    assert_eq!(ds.schema().columns(), ["column", "join", "column2"]);
    assert!(ds.contents(TIMEOUT).unwrap().is_empty());
    assert_eq!(ds.datasets_by_key(&["ds".into()], TIMEOUT).unwrap().len(), 1);
    assert_eq!(ds.datasets_by_key(&["ds3".into()], TIMEOUT).unwrap().len(), 1);
    assert_eq!(ds.find(&[QueryPart::new("column2", "value2")], TIMEOUT).unwrap().len(), 1);
    assert_eq!(ds.find(&[QueryPart::new("column", "value")], TIMEOUT).unwrap().len(), 1);
    assert!(ds.find(&[], TIMEOUT).unwrap().is_empty());
}

fn shared_column_overlay() -> Source {
    source(table(
        "mock2",
        &["column", "column2", "join"],
        &[("ds2", &[Some("value2"), Some("value4"), Some("join")])],
    ))
}

#[test]
fn overlay_wins_in_so_mode() {
    let ds = overlay("so", shared_column_overlay());
    assert!(ds.find(&[QueryPart::new("column", "foo")], TIMEOUT).unwrap().is_empty());
    let found = ds.find(&[QueryPart::new("column", "value2")], TIMEOUT).unwrap();
    assert_eq!(keys(found.as_ref()), ["ds"]);
    let row = found.iter().next().unwrap();
    assert_eq!(row.get("column").unwrap().as_deref(), Some("value2"));
    assert!(row.get("unknown").is_err());

    let unmatched = ds.datasets_by_key(&["ds3".into()], TIMEOUT).unwrap();
    assert_eq!(column(unmatched.as_ref(), "column"), [Some("value3".to_string())]);
    assert_eq!(column(unmatched.as_ref(), "column2"), [None::<String>]);
}

#[test]
fn source_wins_in_os_mode() {
    let ds = overlay("os", shared_column_overlay());
    assert!(ds.find(&[QueryPart::new("column", "value2")], TIMEOUT).unwrap().is_empty());
    let found = ds.find(&[QueryPart::new("column", "value")], TIMEOUT).unwrap();
    assert_eq!(keys(found.as_ref()), ["ds"]);
    assert_eq!(column(found.as_ref(), "column"), [Some("value".to_string())]);
    assert_eq!(column(found.as_ref(), "column2"), [Some("value4".to_string())]);
}

#[test]
fn lowercase_mode_treats_empty_as_unset() {
    let blank = || source(table("mock2", &["column", "join"], &[("ds2", &[Some(""), Some("join")])]));
    let strict = overlay("SO", blank());
    let lenient = overlay("So", blank());
    let key = ["ds".to_string()];
    let strict_rows = strict.datasets_by_key(&key, TIMEOUT).unwrap();
    let lenient_rows = lenient.datasets_by_key(&key, TIMEOUT).unwrap();
    assert_eq!(column(strict_rows.as_ref(), "column"), [Some(String::new())]);
    assert_eq!(column(lenient_rows.as_ref(), "column"), [Some("value".to_string())]);
}

#[test]
fn rows_found_on_both_sides_are_emitted_once() {
    // "column" is matched on both sides; "ds" qualifies through either of them
    let extra = source(table(
        "mock2",
        &["column", "join"],
        &[("o1", &[Some("value9"), Some("join")]), ("o2", &[Some("value7"), Some("other")])],
    ));
    let ds = overlay("os", extra);
    let found = ds.find(&[QueryPart::new("column", "value*")], TIMEOUT).unwrap();
    let mut found_keys = keys(found.as_ref());
    found_keys.sort();
    assert_eq!(found_keys, ["ds", "ds3"]);
}

#[test]
fn invalid_declarations_are_rejected() {
    let mut sources = SourceMap::default();
    sources.insert("mock".into(), mock());
    sources.insert("mock2".into(), source(table("mock2", &["column2"], &[])));
    let declare = |source: Option<&str>, over: Option<&str>, mode: Option<&str>, matches: Vec<Vec<&str>>| {
        let mut desc = SourceDesc::new("overlay", "overlay");
        desc.source = source.map(String::from);
        desc.overlay = over.map(String::from);
        desc.mode = mode.map(String::from);
        desc.matches = matches
            .into_iter()
            .map(|m| m.into_iter().map(String::from).collect())
            .collect();
        desc
    };
    let failing = [
        declare(Some("mock"), None, Some("so"), vec![vec!["column", "column2"]]),
        declare(None, Some("mock2"), Some("so"), vec![vec!["column", "column2"]]),
        declare(Some("mock"), Some("unknown"), Some("so"), vec![vec!["column", "column2"]]),
        declare(Some("mock"), Some("mock2"), None, vec![vec!["column", "column2"]]),
        declare(Some("mock"), Some("mock2"), Some("bla"), vec![vec!["column", "column2"]]),
        declare(Some("mock"), Some("mock2"), Some("so"), vec![]),
        declare(Some("mock"), Some("mock2"), Some("so"), vec![vec!["column"]]),
        declare(Some("mock"), Some("mock2"), Some("so"), vec![vec!["column", "unknown"]]),
        declare(Some("mock"), Some("mock2"), Some("so"), vec![vec!["unknown", "column2"]]),
    ];
    for desc in &failing {
        let err = OverlayDatasource::from_desc(desc, &sources).err().unwrap();
        assert!(err.is_config(), "{err}");
    }
    let ok = declare(Some("mock"), Some("mock2"), Some("oS"), vec![vec!["column", "column2"]]);
    assert!(OverlayDatasource::from_desc(&ok, &sources).is_ok());
}

#[test]
fn a_failing_overlay_leaves_source_rows_alone() {
    let ds = overlay("so", Broken::new("mock2", &["column2", "join"]));
    let found = ds.find(&[QueryPart::new("column", "value")], TIMEOUT).unwrap();
    assert_eq!(keys(found.as_ref()), ["ds"]);
    assert_eq!(column(found.as_ref(), "column2"), [None::<String>]);
    assert_eq!(ds.datasets_by_key(&["ds".into(), "ds3".into()], TIMEOUT).unwrap().len(), 2);
    assert!(ds.find(&[QueryPart::new("column2", "value2")], TIMEOUT).unwrap().is_empty());
}

#[test]
fn an_elapsed_deadline_is_a_timeout() {
    let extra = source(table("mock2", &["column2", "join"], &[("ds2", &[Some("value2"), Some("join")])]));
    let ds = overlay("so", extra);
    let err = ds.find(&[QueryPart::new("column", "value")], Duration::ZERO).err().unwrap();
    assert!(matches!(err, TributaryError::Timeout { ref datasource, .. } if datasource == "overlay"), "{err}");
    let found = ds.find(&[QueryPart::new("column", "value")], TIMEOUT).unwrap();
    assert_eq!(column(found.as_ref(), "column2"), [Some("value2".to_string())]);
}
