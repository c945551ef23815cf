//! Computed pseudo-columns over the rows of any result.
//!
//! A [`ColumnTransformer`] is a shared handle. Views produced by
//! [`ColumnTransformer::transform_results`] evaluate on every access, so a
//! transform registered later also shows in views obtained earlier.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::dataset::{Dataset, OtherHasher, QueryResults, Results, Row};
use crate::error::ColumnNotFound;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([^}]*)\}").unwrap();
}

// ------------- Values -------------
/// What an expression may see of a row: its real columns, nothing else.
pub trait Values {
    /// True if the column exists, even if unset.
    fn has_value(&self, id: &str) -> bool;
    /// The value, or "" when unset or unknown.
    fn get_string(&self, id: &str) -> String;
    fn get_boolean(&self, id: &str) -> bool {
        self.get_string(id).eq_ignore_ascii_case("true")
    }
}

struct DatasetValues<'a>(&'a dyn Dataset);

impl Values for DatasetValues<'_> {
    fn has_value(&self, id: &str) -> bool {
        self.0.get(id).is_ok()
    }
    fn get_string(&self, id: &str) -> String {
        self.0.get(id).ok().flatten().unwrap_or_default()
    }
}

// ------------- ColumnFunction -------------
pub trait ColumnFunction: Send + Sync {
    fn evaluate(&self, values: &dyn Values) -> String;
}

impl<F> ColumnFunction for F
where
    F: Fn(&dyn Values) -> String + Send + Sync,
{
    fn evaluate(&self, values: &dyn Values) -> String {
        self(values)
    }
}

/// Text with `${column}` references, e.g. `"${Vorname} ${Nachname}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFunction {
    template: String,
}

impl TemplateFunction {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }
    pub fn columns(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.template)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }
}

impl ColumnFunction for TemplateFunction {
    fn evaluate(&self, values: &dyn Values) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| values.get_string(&caps[1]))
            .into_owned()
    }
}

// ------------- ColumnTransformer -------------
#[derive(Default)]
struct Table {
    columns: Vec<String>,
    functions: HashMap<String, Arc<dyn ColumnFunction>, OtherHasher>,
}

#[derive(Clone, Default)]
pub struct ColumnTransformer {
    table: Arc<RwLock<Table>>,
}

impl fmt::Debug for ColumnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ColumnTransformer").field("columns", &self.schema()).finish()
    }
}

impl ColumnTransformer {
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers or replaces the pseudo-column `column`.
    pub fn register<F: ColumnFunction + 'static>(&self, column: &str, function: F) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if table.functions.insert(column.to_string(), Arc::new(function)).is_none() {
            table.columns.push(column.to_string());
        }
    }
    pub fn has_pseudo_column(&self, column: &str) -> bool {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .functions
            .contains_key(column)
    }
    /// The pseudo-columns in registration order.
    pub fn schema(&self) -> Vec<String> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).columns.clone()
    }
    /// A pseudo-column is evaluated against `row`'s real columns; any other
    /// column is read from `row` as is.
    pub fn get(&self, column: &str, row: &dyn Dataset) -> Result<Option<String>, ColumnNotFound> {
        let function = self
            .table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .functions
            .get(column)
            .cloned();
        match function {
            Some(function) => Ok(Some(function.evaluate(&DatasetValues(row)))),
            None => row.get(column),
        }
    }
    pub fn transform(&self, row: Row) -> Row {
        Arc::new(TransformedDataset {
            transformer: self.clone(),
            row,
        })
    }
    pub fn transform_results(&self, results: Results) -> Results {
        Box::new(TransformedResults {
            transformer: self.clone(),
            results,
        })
    }
}

struct TransformedDataset {
    transformer: ColumnTransformer,
    row: Row,
}

impl fmt::Debug for TransformedDataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("TransformedDataset").field(&self.row).finish()
    }
}

impl Dataset for TransformedDataset {
    fn get(&self, column: &str) -> Result<Option<String>, ColumnNotFound> {
        self.transformer.get(column, self.row.as_ref())
    }
    fn key(&self) -> &str {
        self.row.key()
    }
    fn producer(&self) -> &'static str {
        self.row.producer()
    }
}

struct TransformedResults {
    transformer: ColumnTransformer,
    results: Results,
}

impl QueryResults for TransformedResults {
    fn len(&self) -> usize {
        self.results.len()
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.results.iter().map(|row| self.transformer.transform(row)))
    }
}
