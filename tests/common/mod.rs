#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tributary::dataset::{QueryResults, Results, Schema};
use tributary::datasource::{Datasource, Source};
use tributary::error::{Result, TributaryError};
use tributary::query::QueryPart;
use tributary::ram::RamDatasource;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A literal table whose rows are given positionally; `None` leaves a cell unset.
pub fn table(name: &str, columns: &[&str], rows: &[(&str, &[Option<&str>])]) -> RamDatasource {
    let mut ram = RamDatasource::new(name, columns.iter().map(|c| c.to_string()).collect()).unwrap();
    for (key, values) in rows {
        let cells: Vec<(String, String)> = columns
            .iter()
            .zip(values.iter())
            .filter_map(|(c, v)| v.map(|v| (c.to_string(), v.to_string())))
            .collect();
        ram.insert(key, cells).unwrap();
    }
    ram
}

pub fn source(ram: RamDatasource) -> Source {
    Arc::new(ram)
}

/// The keys of all rows, in iteration order.
pub fn keys(results: &dyn QueryResults) -> Vec<String> {
    results.iter().map(|r| r.key().to_string()).collect()
}

/// One column of all rows, in iteration order.
pub fn column(results: &dyn QueryResults, name: &str) -> Vec<Option<String>> {
    results.iter().map(|r| r.get(name).unwrap()).collect()
}

/// A source whose every access fails, as an unreachable backend would.
pub struct Broken {
    name: String,
    schema: Schema,
}

impl Broken {
    pub fn new(name: &str, columns: &[&str]) -> Source {
        let schema = Schema::new(name, columns.iter().map(|c| c.to_string()).collect()).unwrap();
        Arc::new(Self { name: name.to_string(), schema })
    }
    fn failure(&self) -> TributaryError {
        TributaryError::backend(&self.name, "connection refused")
    }
}

impl Datasource for Broken {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.schema
    }
    fn find(&self, _query: &[QueryPart], _timeout: Duration) -> Result<Results> {
        Err(self.failure())
    }
    fn datasets_by_key(&self, _keys: &[String], _timeout: Duration) -> Result<Results> {
        Err(self.failure())
    }
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Err(self.failure())
    }
}
