//! Attaches the columns of a subordinate source to every row of a main source.
//!
//! The attached columns are exposed as `NAME__column`, where `NAME` is the
//! attached source's name. Each main row is joined with the first attached
//! row that matches on all `MATCH` pairs; a main row without a partner keeps
//! its place with all attached columns unset.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dataset::{Dataset, QueryResultsList, Results, Row, Schema, no_results};
use crate::datasource::{Datasource, Deadline, Source, degrade};
use crate::error::{ColumnNotFound, Result, TributaryError};
use crate::query::{QueryPart, matches_all};
use crate::registry::{SourceDesc, SourceMap};

pub const PREFIX_SEPARATOR: &str = "__";

/// The exact-match lookup for the partner of `row`: one part per pair, built
/// from the row's value in the `from` column. `None` if a value is unset.
pub(crate) fn match_query(
    composite: &str,
    row: &dyn Dataset,
    pairs: &[(String, String)],
    reversed: bool,
) -> Option<Vec<QueryPart>> {
    let mut query = Vec::with_capacity(pairs.len());
    for (column1, column2) in pairs {
        let (from, to) = if reversed { (column2, column1) } else { (column1, column2) };
        match row.get(from) {
            Ok(Some(value)) => query.push(QueryPart::new(to.as_str(), value)),
            Ok(None) => return None,
            Err(e) => {
                warn!(datasource = composite, error = %e, "match column missing from row");
                return None;
            }
        }
    }
    Some(query)
}

/// Checks both sides of every MATCH pair against the respective schema.
pub(crate) fn check_match_pairs(
    composite: &str,
    pairs: &[(String, String)],
    schema1: &Schema,
    schema2: &Schema,
) -> Result<()> {
    for (column1, column2) in pairs {
        if !schema1.contains(column1) {
            return Err(TributaryError::config(
                composite,
                format!("Column \"{}\" is not defined in the first source {}", column1, schema1),
            ));
        }
        if !schema2.contains(column2) {
            return Err(TributaryError::config(
                composite,
                format!("Column \"{}\" is not defined in the second source {}", column2, schema2),
            ));
        }
    }
    Ok(())
}

#[derive(Debug)]
struct Layout {
    schema: Schema,
    prefix: String,
}

// ------------- AttachedDataset -------------
#[derive(Debug)]
struct AttachedDataset {
    layout: Arc<Layout>,
    main: Row,
    attached: Option<Row>,
}

impl Dataset for AttachedDataset {
    fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound> {
        if !self.layout.schema.contains(column) {
            return Err(ColumnNotFound(column.to_string()));
        }
        match column.strip_prefix(self.layout.prefix.as_str()) {
            Some(attached_column) => match &self.attached {
                Some(row) => row.get(attached_column),
                None => Ok(None),
            },
            None => self.main.get(column),
        }
    }
    fn key(&self) -> &str {
        self.main.key()
    }
    fn producer(&self) -> &'static str {
        "attach"
    }
}

// ------------- AttachDatasource -------------
pub struct AttachDatasource {
    name: String,
    source1: Source,
    source2: Source,
    pairs: Vec<(String, String)>,
    layout: Arc<Layout>,
}

impl AttachDatasource {
    pub fn new(name: &str, source1: Source, source2: Source, pairs: Vec<(String, String)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(TributaryError::config(name, "At least one MATCH specification has to be made"));
        }
        check_match_pairs(name, &pairs, source1.schema(), source2.schema())?;
        let prefix = format!("{}{}", source2.name(), PREFIX_SEPARATOR);
        let mut columns = source1.schema().columns().to_vec();
        for column in source2.schema().iter() {
            let attached = format!("{}{}", prefix, column);
            if source1.schema().contains(&attached) {
                return Err(TributaryError::config(
                    name,
                    format!("Column \"{}\" of \"{}\" collides with an attached column", attached, source1.name()),
                ));
            }
            columns.push(attached);
        }
        let schema = Schema::new(name, columns)?;
        debug!(datasource = name, main = source1.name(), attached = source2.name(), columns = schema.len(), "attach");
        Ok(Self {
            name: name.to_string(),
            source1,
            source2,
            pairs,
            layout: Arc::new(Layout { schema, prefix }),
        })
    }

    pub fn from_desc(desc: &SourceDesc, sources: &SourceMap) -> Result<Self> {
        let name = desc.name()?;
        let source1 = desc.resolve(sources, desc.require(&desc.source, "SOURCE")?)?;
        let source2 = desc.resolve(sources, desc.require(&desc.attach, "ATTACH")?)?;
        Self::new(name, source1, source2, desc.match_pairs()?)
    }

    pub fn prefix(&self) -> &str {
        &self.layout.prefix
    }

    fn combine(&self, main: Row, attached: Option<Row>) -> Row {
        Arc::new(AttachedDataset {
            layout: Arc::clone(&self.layout),
            main,
            attached,
        })
    }

    /// One combined row per main row: the first partner passing `filter`, or
    /// none at all. A main row without partners is kept if it passes `filter`.
    fn attach_columns(&self, results: Results, filter: &[QueryPart], deadline: Deadline, operation: &'static str) -> Result<Results> {
        let mut combined = Vec::with_capacity(results.len());
        for main in results.iter() {
            let budget = deadline.budget(&self.name, operation)?;
            let partners = match match_query(&self.name, main.as_ref(), &self.pairs, false) {
                Some(query) => degrade(&self.name, self.source2.name(), self.source2.find(&query, budget)),
                None => no_results(),
            };
            if partners.is_empty() {
                let row = self.combine(main, None);
                if matches_all(filter, row.as_ref()) {
                    combined.push(row);
                }
                continue;
            }
            for partner in partners.iter() {
                let row = self.combine(Arc::clone(&main), Some(partner));
                if matches_all(filter, row.as_ref()) {
                    combined.push(row);
                    break;
                }
            }
        }
        Ok(QueryResultsList::new(combined).boxed())
    }

    /// Inner join driven from attached rows: every main row matching a partner.
    fn attach_columns_reversed(&self, results: Results, deadline: Deadline) -> Result<Results> {
        let mut combined = Vec::with_capacity(results.len());
        for partner in results.iter() {
            let budget = deadline.budget(&self.name, "find")?;
            let Some(query) = match_query(&self.name, partner.as_ref(), &self.pairs, true) else {
                continue;
            };
            let mains = degrade(&self.name, self.source1.name(), self.source1.find(&query, budget));
            for main in mains.iter() {
                combined.push(self.combine(main, Some(Arc::clone(&partner))));
            }
        }
        Ok(QueryResultsList::new(combined).boxed())
    }
}

impl Datasource for AttachDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.layout.schema
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        if query.is_empty() {
            return Ok(no_results());
        }
        let deadline = Deadline::after(timeout);
        let mut main_parts = Vec::new();
        let mut attached_parts = Vec::new();
        let mut attached_filter = Vec::new();
        for part in query {
            match part.column().strip_prefix(self.prefix()) {
                Some(column) => {
                    attached_parts.push(QueryPart::new(column, part.pattern()));
                    attached_filter.push(part.clone());
                }
                None => main_parts.push(part.clone()),
            }
        }
        if !main_parts.is_empty() {
            let results = degrade(&self.name, self.source1.name(), self.source1.find(&main_parts, timeout));
            self.attach_columns(results, &attached_filter, deadline, "find")
        } else {
            let results = degrade(&self.name, self.source2.name(), self.source2.find(&attached_parts, timeout));
            self.attach_columns_reversed(results, deadline)
        }
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        let deadline = Deadline::after(timeout);
        let results = degrade(&self.name, self.source1.name(), self.source1.datasets_by_key(keys, timeout));
        self.attach_columns(results, &[], deadline, "datasets_by_key")
    }
    /// Always empty.
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Ok(no_results())
    }
}
