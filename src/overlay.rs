//! Overlays the rows of one source with the rows of another, column by column.
//!
//! Both sources contribute their columns under their own names. For a column
//! present in both, `MODE` decides which side is asked first: `SO` lets the
//! overlay win, `OS` the source. A lowercase second letter (`So`, `os`)
//! additionally treats an empty string on the winning side as unset.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::attach::{check_match_pairs, match_query};
use crate::dataset::{Dataset, OtherHasher, QueryResultsList, Results, Row, Schema, no_results};
use crate::datasource::{Datasource, Deadline, Source, degrade};
use crate::error::{ColumnNotFound, Result, TributaryError};
use crate::query::{QueryPart, matches_all};
use crate::registry::{SourceDesc, SourceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// The overlay wins (`SO`) rather than the source (`OS`).
    pub overlay_wins: bool,
    pub empty_is_unset: bool,
}

impl Mode {
    pub fn parse(datasource: &str, mode: &str) -> Result<Self> {
        let overlay_wins = match mode.to_lowercase().as_str() {
            "so" => true,
            "os" => false,
            _ => {
                return Err(TributaryError::config(
                    datasource,
                    format!("Incorrect MODE specification: MODE \"{}\" is not allowed", mode),
                ));
            }
        };
        let empty_is_unset = mode.chars().nth(1).is_some_and(|c| c.is_lowercase());
        Ok(Self { overlay_wins, empty_is_unset })
    }
}

#[derive(Debug)]
struct Layout {
    schema: Schema,
    schema1: Schema,
    schema2: Schema,
    mode: Mode,
}

// ------------- OverlaidDataset -------------
#[derive(Debug)]
struct OverlaidDataset {
    layout: Arc<Layout>,
    source: Row,
    overlay: Option<Row>,
}

impl Dataset for OverlaidDataset {
    fn get(&self, column: &str) -> std::result::Result<Option<String>, ColumnNotFound> {
        let layout = &self.layout;
        if !layout.schema.contains(column) {
            return Err(ColumnNotFound(column.to_string()));
        }
        let (priority, fallback, priority_schema) = if layout.mode.overlay_wins {
            (self.overlay.as_ref(), Some(&self.source), &layout.schema2)
        } else {
            (Some(&self.source), self.overlay.as_ref(), &layout.schema1)
        };
        if let Some(row) = priority.filter(|_| priority_schema.contains(column)) {
            let value = row.get(column)?;
            let value = value.filter(|v| !(layout.mode.empty_is_unset && v.is_empty()));
            if value.is_some() {
                return Ok(value);
            }
        }
        match fallback {
            Some(row) => Ok(row.get(column).unwrap_or(None)),
            None => Ok(None),
        }
    }
    fn key(&self) -> &str {
        self.source.key()
    }
    fn producer(&self) -> &'static str {
        "overlay"
    }
}

/// The part most likely to narrow a search: unstarred first, then the
/// longest literal, then the fewest stars.
pub(crate) fn most_restricting(parts: &[QueryPart]) -> Option<&QueryPart> {
    let mut best = parts.first()?;
    let mut best_stars = usize::MAX;
    let mut best_literal: isize = -1;
    for part in parts {
        let pattern = part.pattern();
        let length = pattern.chars().count();
        let mut stars = 0;
        if length > 0 && pattern.starts_with('*') {
            stars += 1;
        }
        if length > 1 && pattern.ends_with('*') {
            stars += 1;
        }
        let literal = (length - stars) as isize;
        if (stars == 0 && best_stars > 0) || literal > best_literal || (literal == best_literal && stars < best_stars) {
            best = part;
            best_stars = stars;
            best_literal = literal;
        }
    }
    Some(best)
}

// ------------- OverlayDatasource -------------
pub struct OverlayDatasource {
    name: String,
    source1: Source,
    source2: Source,
    pairs: Vec<(String, String)>,
    common_match_columns: HashSet<String, OtherHasher>,
    layout: Arc<Layout>,
}

impl OverlayDatasource {
    pub fn new(name: &str, source1: Source, source2: Source, mode: Mode, pairs: Vec<(String, String)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(TributaryError::config(name, "At least one MATCH specification has to be made"));
        }
        let schema1 = source1.schema().clone();
        let schema2 = source2.schema().clone();
        check_match_pairs(name, &pairs, &schema1, &schema2)?;
        let common_match_columns = pairs
            .iter()
            .filter(|(c1, c2)| c1 == c2)
            .map(|(c1, _)| c1.clone())
            .collect();
        let mut columns = schema1.columns().to_vec();
        columns.extend(schema2.missing_from(&schema1));
        let schema = Schema::new(name, columns)?;
        debug!(datasource = name, source = source1.name(), overlay = source2.name(), ?mode, "overlay");
        Ok(Self {
            name: name.to_string(),
            source1,
            source2,
            pairs,
            common_match_columns,
            layout: Arc::new(Layout { schema, schema1, schema2, mode }),
        })
    }

    pub fn from_desc(desc: &SourceDesc, sources: &SourceMap) -> Result<Self> {
        let name = desc.name()?;
        let mode = Mode::parse(name, desc.require(&desc.mode, "MODE")?)?;
        let source1 = desc.resolve(sources, desc.require(&desc.source, "SOURCE")?)?;
        let source2 = desc.resolve(sources, desc.require(&desc.overlay, "OVERLAY")?)?;
        Self::new(name, source1, source2, mode, desc.match_pairs()?)
    }

    fn combine(&self, source: Row, overlay: Option<Row>) -> Row {
        Arc::new(OverlaidDataset {
            layout: Arc::clone(&self.layout),
            source,
            overlay,
        })
    }

    fn overlay_columns(&self, results: Results, filter: &[QueryPart], deadline: Deadline, operation: &'static str) -> Result<Vec<Row>> {
        let mut combined = Vec::with_capacity(results.len());
        for source in results.iter() {
            let budget = deadline.budget(&self.name, operation)?;
            let partners = match match_query(&self.name, source.as_ref(), &self.pairs, false) {
                Some(query) => degrade(&self.name, self.source2.name(), self.source2.find(&query, budget)),
                None => no_results(),
            };
            if partners.is_empty() {
                let row = self.combine(source, None);
                if matches_all(filter, row.as_ref()) {
                    combined.push(row);
                }
                continue;
            }
            for partner in partners.iter() {
                let row = self.combine(Arc::clone(&source), Some(partner));
                if matches_all(filter, row.as_ref()) {
                    combined.push(row);
                    break;
                }
            }
        }
        Ok(combined)
    }

    fn overlay_columns_reversed(&self, results: Results, filter: &[QueryPart], deadline: Deadline) -> Result<Vec<Row>> {
        let mut combined = Vec::with_capacity(results.len());
        for overlay in results.iter() {
            let budget = deadline.budget(&self.name, "find")?;
            let Some(query) = match_query(&self.name, overlay.as_ref(), &self.pairs, true) else {
                continue;
            };
            let sources = degrade(&self.name, self.source1.name(), self.source1.find(&query, budget));
            for source in sources.iter() {
                let row = self.combine(source, Some(Arc::clone(&overlay)));
                if matches_all(filter, row.as_ref()) {
                    combined.push(row);
                }
            }
        }
        Ok(combined)
    }

    /// Only columns of both sides are constrained: search both with the most
    /// restricting part and rebuild the rows whose keys turn up on both sides.
    fn find_in_both(&self, query: &[QueryPart], restricting: QueryPart, deadline: Deadline) -> Result<Vec<Row>> {
        let restricting = [restricting];
        let budget = deadline.budget(&self.name, "find")?;
        let found1 = degrade(&self.name, self.source1.name(), self.source1.find(&restricting, budget));
        let results1 = self.overlay_columns(found1, query, deadline, "find")?;
        let budget = deadline.budget(&self.name, "find")?;
        let found2 = degrade(&self.name, self.source2.name(), self.source2.find(&restricting, budget));
        let results2 = self.overlay_columns_reversed(found2, query, deadline)?;

        let keys1: HashSet<&str, OtherHasher> = results1.iter().map(|r| r.key()).collect();
        let mut rows = Vec::with_capacity(results1.len() + results2.len());
        let mut duplicates: Vec<String> = Vec::new();
        for row in &results2 {
            if keys1.contains(row.key()) {
                duplicates.push(row.key().to_string());
            } else {
                rows.push(Arc::clone(row));
            }
        }
        if !duplicates.is_empty() {
            let budget = deadline.budget(&self.name, "find")?;
            let refetched = self.datasets_by_key(&duplicates, budget)?;
            rows.extend(refetched.iter().filter(|r| matches_all(query, r.as_ref())));
        }
        let duplicates: HashSet<&str, OtherHasher> = duplicates.iter().map(String::as_str).collect();
        rows.extend(results1.iter().filter(|r| !duplicates.contains(r.key())).cloned());
        Ok(rows)
    }
}

impl Datasource for OverlayDatasource {
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
        let (schema1, schema2) = (&self.layout.schema1, &self.layout.schema2);
        let mut only1 = Vec::new();
        let mut only2 = Vec::new();
        let mut both = Vec::new();
        for part in query {
            let column = part.column();
            if schema1.contains(column) {
                if schema2.contains(column) && !self.common_match_columns.contains(column) {
                    both.push(part.clone());
                } else {
                    only1.push(part.clone());
                }
            } else {
                only2.push(part.clone());
            }
        }

        let rows = if !only1.is_empty() {
            let found = degrade(&self.name, self.source1.name(), self.source1.find(&only1, timeout));
            let rest: Vec<QueryPart> = both.into_iter().chain(only2).collect();
            self.overlay_columns(found, &rest, deadline, "find")?
        } else if !only2.is_empty() {
            let found = degrade(&self.name, self.source2.name(), self.source2.find(&only2, timeout));
            self.overlay_columns_reversed(found, &both, deadline)?
        } else {
            match most_restricting(&both) {
                Some(part) => self.find_in_both(query, part.clone(), deadline)?,
                None => Vec::new(),
            }
        };
        Ok(QueryResultsList::new(rows).boxed())
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        let deadline = Deadline::after(timeout);
        let found = degrade(&self.name, self.source1.name(), self.source1.datasets_by_key(keys, timeout));
        let rows = self.overlay_columns(found, &[], deadline, "datasets_by_key")?;
        Ok(QueryResultsList::new(rows).boxed())
    }
    /// Always empty.
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Ok(no_results())
    }
}
