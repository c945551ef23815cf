//! In-memory datasource, used for literal `conf` tables and as the row type
//! of other backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::dataset::{Dataset, OtherHasher, QueryResultsList, Results, Row, Schema, no_results};
use crate::datasource::Datasource;
use crate::error::{ColumnNotFound, Result, TributaryError};
use crate::query::{QueryPart, matches_all};
use crate::registry::{RowDesc, SourceDesc};

/// Joins the values of multi-column keys.
pub const KEY_SEPARATOR: &str = "£#%&|";

/// The row key built from the key columns; unset values contribute "".
pub fn compose_key<F>(key_columns: &[String], value: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    key_columns
        .iter()
        .map(|c| value(c).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

// ------------- RamDataset -------------
#[derive(Debug, Clone)]
pub struct RamDataset {
    schema: Arc<Schema>,
    values: HashMap<String, String, OtherHasher>,
    key: String,
    producer: &'static str,
}

impl RamDataset {
    pub fn new(schema: Arc<Schema>, key: impl Into<String>, values: HashMap<String, String, OtherHasher>) -> Self {
        Self {
            schema,
            values,
            key: key.into(),
            producer: "ram",
        }
    }
    pub fn with_producer(mut self, producer: &'static str) -> Self {
        self.producer = producer;
        self
    }
}

impl Dataset for RamDataset {
    fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound> {
        if !self.schema.contains(column) {
            return Err(ColumnNotFound(column.to_string()));
        }
        Ok(self.values.get(column).cloned())
    }
    fn key(&self) -> &str {
        &self.key
    }
    fn producer(&self) -> &'static str {
        self.producer
    }
}

// ------------- RamDatasource -------------
pub struct RamDatasource {
    name: String,
    schema: Arc<Schema>,
    rows: Vec<Row>,
}

impl RamDatasource {
    pub fn new(name: &str, columns: Vec<String>) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            schema: Arc::new(Schema::new(name, columns)?),
            rows: Vec::new(),
        })
    }
    /// Adds a row; columns not given are unset, unknown columns are rejected.
    pub fn insert<K, V>(&mut self, key: &str, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut cells = HashMap::<String, String, OtherHasher>::default();
        for (column, value) in values {
            let column = column.into();
            if !self.schema.contains(&column) {
                return Err(ColumnNotFound(column).into());
            }
            cells.insert(column, value.into());
        }
        self.rows.push(Arc::new(RamDataset::new(Arc::clone(&self.schema), key, cells)));
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A literal table: `SCHEMA`, `KEYS` and `DATA` rows. The key of a row
    /// is its `KEYS` values joined by [`KEY_SEPARATOR`]; a key column the row
    /// leaves unset contributes an empty string.
    pub fn from_desc(desc: &SourceDesc) -> Result<Self> {
        let name = desc.name()?;
        if desc.schema.is_empty() {
            return Err(TributaryError::config(name, "SCHEMA specification is missing or empty"));
        }
        if let Some(bad) = desc.schema.iter().find(|c| !crate::dataset::is_valid_column_name(c)) {
            return Err(TributaryError::config(name, format!("Illegal column name: \"{}\"", bad)));
        }
        let mut source = Self::new(name, desc.schema.clone())?;
        if desc.keys.is_empty() {
            return Err(TributaryError::config(name, "KEYS specification is missing or empty"));
        }
        if let Some(bad) = desc.keys.iter().find(|k| !source.schema.contains(k)) {
            return Err(TributaryError::config(name, format!("Key column \"{}\" is not in the schema", bad)));
        }
        for (index, row) in desc.data.iter().enumerate() {
            let cells: Vec<(String, String)> = match row {
                RowDesc::Ordered(values) => {
                    if values.len() > source.schema.len() {
                        return Err(TributaryError::config(
                            name,
                            format!("Row {} has more values than the schema has columns", index + 1),
                        ));
                    }
                    source.schema.iter().cloned().zip(values.iter().cloned()).collect()
                }
                RowDesc::Named(pairs) => pairs.clone(),
            };
            let key = compose_key(&desc.keys, |column| {
                cells.iter().find(|(c, _)| c == column).map(|(_, v)| v.clone())
            });
            source.insert(&key, cells).map_err(|e| TributaryError::config(name, e.to_string()))?;
        }
        Ok(source)
    }
}

impl Datasource for RamDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.schema
    }
    fn find(&self, query: &[QueryPart], _timeout: Duration) -> Result<Results> {
        if query.is_empty() || query.iter().any(|p| !self.schema.contains(p.column())) {
            return Ok(no_results());
        }
        let rows = self
            .rows
            .iter()
            .filter(|r| matches_all(query, r.as_ref()))
            .cloned()
            .collect::<Vec<_>>();
        Ok(QueryResultsList::new(rows).boxed())
    }
    fn datasets_by_key(&self, keys: &[String], _timeout: Duration) -> Result<Results> {
        let rows = self
            .rows
            .iter()
            .filter(|r| keys.iter().any(|k| k == r.key()))
            .cloned()
            .collect::<Vec<_>>();
        Ok(QueryResultsList::new(rows).boxed())
    }
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Ok(QueryResultsList::new(self.rows.clone()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> RamDatasource {
        let mut ram = RamDatasource::new("people", vec!["Vorname".into(), "Nachname".into()]).unwrap();
        ram.insert("1", [("Vorname", "Anna"), ("Nachname", "Müller")]).unwrap();
        ram.insert("2", [("Vorname", "Bernd")]).unwrap();
        ram
    }

    #[test]
    fn unset_cells_never_match() {
        let ram = people();
        let found = ram.find(&[QueryPart::new("Nachname", "*")], Duration::MAX).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn unknown_column_is_empty_not_error() {
        let ram = people();
        let found = ram.find(&[QueryPart::new("Ort", "x")], Duration::MAX).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn get_distinguishes_unset_from_unknown() {
        let ram = people();
        let row = ram.datasets_by_key(&["2".into()], Duration::MAX).unwrap().to_vec().remove(0);
        assert_eq!(row.get("Nachname"), Ok(None));
        assert!(row.get("Ort").is_err());
    }

    #[test]
    fn composite_keys_are_joined() {
        let mut desc = SourceDesc::new("t", "conf");
        desc.schema = vec!["a".into(), "b".into()];
        desc.keys = vec!["a".into(), "b".into()];
        desc.data = vec![RowDesc::Ordered(vec!["x".into(), "y".into()])];
        let ram = RamDatasource::from_desc(&desc).unwrap();
        let row = ram.contents(Duration::MAX).unwrap().to_vec().remove(0);
        assert_eq!(row.key(), format!("x{}y", KEY_SEPARATOR));
    }

    #[test]
    fn unset_key_values_contribute_nothing() {
        let mut desc = SourceDesc::new("t", "conf");
        desc.schema = vec!["a".into(), "b".into()];
        desc.keys = vec!["a".into(), "b".into()];
        desc.data = vec![RowDesc::Named(vec![("b".into(), "y".into())])];
        let ram = RamDatasource::from_desc(&desc).unwrap();
        let row = ram.contents(Duration::MAX).unwrap().to_vec().remove(0);
        assert_eq!(row.key(), format!("{}y", KEY_SEPARATOR));
        assert_eq!(row.get("a"), Ok(None));
    }
}
