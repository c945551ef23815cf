//! Reshapes the schema of another source with `DROP`, `ADD` and `RENAME`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::dataset::{Dataset, OtherHasher, QueryResults, Results, Row, Schema, is_valid_column_name, no_results};
use crate::datasource::{Datasource, Source};
use crate::error::{ColumnNotFound, Result, TributaryError};
use crate::query::QueryPart;
use crate::registry::{SourceDesc, SourceMap};

/// Where an exposed column that differs from the source's gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// The source column of another name.
    Mapped(String),
    /// Not backed by any source column; always unset.
    Synthetic,
}

#[derive(Debug)]
struct Layout {
    schema: Schema,
    mapping: HashMap<String, Mapping, OtherHasher>,
}

impl Layout {
    /// The source column behind `column`, `None` for synthetic columns.
    fn translate<'a>(&'a self, column: &'a str) -> Option<&'a str> {
        match self.mapping.get(column) {
            Some(Mapping::Mapped(old)) => Some(old),
            Some(Mapping::Synthetic) => None,
            None => Some(column),
        }
    }
}

// ------------- RenamedDataset -------------
#[derive(Debug)]
struct RenamedDataset {
    layout: Arc<Layout>,
    row: Row,
}

impl Dataset for RenamedDataset {
    fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound> {
        if !self.layout.schema.contains(column) {
            return Err(ColumnNotFound(column.to_string()));
        }
        match self.layout.translate(column) {
            Some(source_column) => self.row.get(source_column),
            None => Ok(None),
        }
    }
    fn key(&self) -> &str {
        self.row.key()
    }
    fn producer(&self) -> &'static str {
        "schema"
    }
}

struct RenamedResults {
    layout: Arc<Layout>,
    results: Results,
}

impl QueryResults for RenamedResults {
    fn len(&self) -> usize {
        self.results.len()
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.results.iter().map(|row| {
            Arc::new(RenamedDataset {
                layout: Arc::clone(&self.layout),
                row,
            }) as Row
        }))
    }
}

// ------------- SchemaDatasource -------------
pub struct SchemaDatasource {
    name: String,
    source: Source,
    layout: Arc<Layout>,
}

impl SchemaDatasource {
    /// Applies all drops, then all adds, then all renames.
    pub fn new(name: &str, source: Source, drop: &[String], add: &[String], rename: &[(String, String)]) -> Result<Self> {
        let source_schema = source.schema();
        let mut dropped: HashSet<String, OtherHasher> = HashSet::default();
        let mut added: Vec<String> = Vec::new();
        let mut mapping: HashMap<String, Mapping, OtherHasher> = HashMap::default();

        // source columns that DROP or RENAME take out of the schema
        let freed: HashSet<&str, OtherHasher> = drop
            .iter()
            .map(String::as_str)
            .chain(rename.iter().map(|(old, _)| old.as_str()))
            .collect();

        for column in drop {
            if !source_schema.contains(column) {
                return Err(TributaryError::config(
                    name,
                    format!("Column \"{}\" cannot be dropped: it is not in the schema of \"{}\"", column, source.name()),
                ));
            }
            dropped.insert(column.clone());
        }
        for column in add {
            if !is_valid_column_name(column) {
                return Err(TributaryError::config(name, format!("Illegal column name for ADD: \"{}\"", column)));
            }
            dropped.remove(column);
            added.push(column.clone());
        }
        for (old, new) in rename {
            if !source_schema.contains(old) {
                return Err(TributaryError::config(
                    name,
                    format!("Column \"{}\" cannot be renamed: it is not in the schema of \"{}\"", old, source.name()),
                ));
            }
            if !is_valid_column_name(new) {
                return Err(TributaryError::config(name, format!("Illegal column name for RENAME: \"{}\"", new)));
            }
            mapping.insert(new.clone(), Mapping::Mapped(old.clone()));
            dropped.insert(old.clone());
            if source_schema.contains(new) {
                // the renamed column takes the place of the source's own
                if !freed.contains(new.as_str()) {
                    return Err(TributaryError::config(name, format!("Column \"{}\" is defined twice in schema", new)));
                }
                dropped.insert(new.clone());
            }
            added.push(new.clone());
        }
        for column in &added {
            if !source_schema.contains(column) && !mapping.contains_key(column) {
                mapping.insert(column.clone(), Mapping::Synthetic);
            }
        }

        let mut columns: Vec<String> = source_schema
            .iter()
            .filter(|c| !dropped.contains(*c))
            .cloned()
            .collect();
        let mut listed: HashSet<String, OtherHasher> = columns.iter().cloned().collect();
        for column in added {
            if listed.insert(column.clone()) {
                columns.push(column);
            } else if !source_schema.contains(&column) || mapping.contains_key(&column) {
                return Err(TributaryError::config(name, format!("Column \"{}\" is defined twice in schema", column)));
            }
        }
        let schema = Schema::new(name, columns)?;
        debug!(datasource = name, source = source.name(), %schema, "schema");
        Ok(Self {
            name: name.to_string(),
            source,
            layout: Arc::new(Layout { schema, mapping }),
        })
    }

    pub fn from_desc(desc: &SourceDesc, sources: &SourceMap) -> Result<Self> {
        let name = desc.name()?;
        let source = desc.resolve(sources, desc.require(&desc.source, "SOURCE")?)?;
        Self::new(name, source, &desc.drop, &desc.add, &desc.rename_pairs()?)
    }

    pub fn mapping(&self, column: &str) -> Option<&Mapping> {
        self.layout.mapping.get(column)
    }

    fn wrap(&self, results: Results) -> Results {
        Box::new(RenamedResults {
            layout: Arc::clone(&self.layout),
            results,
        })
    }
}

impl Datasource for SchemaDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.layout.schema
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        let mut translated = Vec::with_capacity(query.len());
        for part in query {
            if !self.layout.schema.contains(part.column()) {
                return Ok(no_results());
            }
            match self.layout.translate(part.column()) {
                Some(column) => translated.push(QueryPart::new(column, part.pattern())),
                // a synthetic column never holds a value to match
                None => return Ok(no_results()),
            }
        }
        Ok(self.wrap(self.source.find(&translated, timeout)?))
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        Ok(self.wrap(self.source.datasets_by_key(keys, timeout)?))
    }
    fn contents(&self, timeout: Duration) -> Result<Results> {
        Ok(self.wrap(self.source.contents(timeout)?))
    }
}
