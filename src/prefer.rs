//! Lets the rows of an override source replace the rows of a base source
//! that carry the same key.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, trace};

use crate::dataset::{OtherHasher, QueryResults, Results, Row, Schema, no_results};
use crate::datasource::{Datasource, Deadline, Source};
use crate::error::{Result, TributaryError};
use crate::query::QueryPart;
use crate::registry::{SourceDesc, SourceMap};

// ------------- PreferredResults -------------
/// All override rows, then every base row whose key is not overridden.
/// Nothing is materialized; the size is fixed at construction.
pub struct PreferredResults {
    over: Results,
    base: Results,
    denylist: HashSet<String, OtherHasher>,
    size: usize,
}

impl PreferredResults {
    /// `ghosts` are the override rows stored under the base rows' keys,
    /// whether or not they satisfy the query that produced `over`.
    pub fn new(over: Results, base: Results, ghosts: &dyn QueryResults) -> Self {
        let mut counts: HashMap<String, usize, OtherHasher> = HashMap::default();
        for row in base.iter() {
            *counts.entry(row.key().to_string()).or_insert(0) += 1;
        }
        let mut size = base.len() + over.len();
        let mut denylist: HashSet<String, OtherHasher> = HashSet::default();
        for row in over.iter().chain(ghosts.iter()) {
            if let Some(count) = counts.get_mut(row.key()) {
                size -= *count;
                *count = 0;
                denylist.insert(row.key().to_string());
            }
        }
        Self { over, base, denylist, size }
    }
    /// The base keys suppressed by the override.
    pub fn denylist(&self) -> &HashSet<String, OtherHasher> {
        &self.denylist
    }
}

impl QueryResults for PreferredResults {
    fn len(&self) -> usize {
        self.size
    }
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(
            self.over
                .iter()
                .chain(self.base.iter().filter(|r| !self.denylist.contains(r.key()))),
        )
    }
}

// ------------- PreferDatasource -------------
pub struct PreferDatasource {
    name: String,
    source: Source,
    over: Source,
}

impl PreferDatasource {
    pub fn new(name: &str, source: Source, over: Source) -> Result<Self> {
        let missing_in_over = source.schema().missing_from(over.schema());
        let missing_in_source = over.schema().missing_from(source.schema());
        if !missing_in_over.is_empty() || !missing_in_source.is_empty() {
            return Err(TributaryError::config(
                name,
                format!(
                    "Schemas of \"{}\" and \"{}\" differ: missing in \"{}\" {:?}, missing in \"{}\" {:?}",
                    source.name(),
                    over.name(),
                    over.name(),
                    missing_in_over,
                    source.name(),
                    missing_in_source,
                ),
            ));
        }
        debug!(datasource = name, source = source.name(), over = over.name(), "prefer");
        Ok(Self {
            name: name.to_string(),
            source,
            over,
        })
    }

    pub fn from_desc(desc: &SourceDesc, sources: &SourceMap) -> Result<Self> {
        let name = desc.name()?;
        let source = desc.resolve(sources, desc.require(&desc.source, "SOURCE")?)?;
        let over = desc.resolve(sources, desc.require(&desc.over, "OVER")?)?;
        Self::new(name, source, over)
    }

    /// Every constituent call is needed for a correct merge, so failures propagate.
    fn prefer<F>(&self, timeout: Duration, operation: &'static str, access: F) -> Result<Results>
    where
        F: Fn(&Source, Duration) -> Result<Results>,
    {
        let deadline = Deadline::after(timeout);
        let over = access(&self.over, timeout)?;
        let base = access(&self.source, deadline.budget(&self.name, operation)?)?;
        let mut keys: Vec<String> = Vec::new();
        let mut seen: HashSet<&str, OtherHasher> = HashSet::default();
        let base_rows = base.to_vec();
        for row in &base_rows {
            if seen.insert(row.key()) {
                keys.push(row.key().to_string());
            }
        }
        let ghosts = if keys.is_empty() {
            no_results()
        } else {
            self.over.datasets_by_key(&keys, deadline.budget(&self.name, operation)?)?
        };
        let results = PreferredResults::new(over, base, ghosts.as_ref());
        trace!(datasource = %self.name, suppressed = results.denylist().len(), size = results.len(), "preferred");
        Ok(Box::new(results))
    }
}

impl Datasource for PreferDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        self.source.schema()
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        self.prefer(timeout, "find", |source, budget| source.find(query, budget))
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        self.prefer(timeout, "datasets_by_key", |source, budget| source.datasets_by_key(keys, budget))
    }
    /// Always empty.
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Ok(no_results())
    }
}
