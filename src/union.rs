use std::time::Duration;

use tracing::debug;

use crate::dataset::{QueryResultsUnion, Results, Schema, no_results};
use crate::datasource::{Datasource, Deadline, Source, degrade};
use crate::error::{Result, TributaryError};
use crate::query::QueryPart;
use crate::registry::{SourceDesc, SourceMap};

/// Both sources' rows; they must have the same set of columns.
pub struct UnionDatasource {
    name: String,
    source1: Source,
    source2: Source,
    schema: Schema,
}

impl UnionDatasource {
    pub fn new(name: &str, source1: Source, source2: Source) -> Result<Self> {
        if !source1.schema().same_columns(source2.schema()) {
            return Err(TributaryError::config(
                name,
                format!(
                    "Schemas of \"{}\" and \"{}\" differ: only in first {:?}, only in second {:?}",
                    source1.name(),
                    source2.name(),
                    source1.schema().missing_from(source2.schema()),
                    source2.schema().missing_from(source1.schema()),
                ),
            ));
        }
        let schema = source1.schema().clone();
        debug!(datasource = name, first = source1.name(), second = source2.name(), "union");
        Ok(Self {
            name: name.to_string(),
            source1,
            source2,
            schema,
        })
    }

    pub fn from_desc(desc: &SourceDesc, sources: &SourceMap) -> Result<Self> {
        let name = desc.name()?;
        let source1 = desc.resolve(sources, desc.require(&desc.source1, "SOURCE1")?)?;
        let source2 = desc.resolve(sources, desc.require(&desc.source2, "SOURCE2")?)?;
        Self::new(name, source1, source2)
    }

    fn both<F>(&self, timeout: Duration, operation: &'static str, access: F) -> Result<Results>
    where
        F: Fn(&Source, Duration) -> Result<Results>,
    {
        let deadline = Deadline::after(timeout);
        let first = degrade(&self.name, self.source1.name(), access(&self.source1, timeout));
        let budget = deadline.budget(&self.name, operation)?;
        let second = degrade(&self.name, self.source2.name(), access(&self.source2, budget));
        Ok(Box::new(QueryResultsUnion::new(first, second)))
    }
}

impl Datasource for UnionDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.schema
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        self.both(timeout, "find", |source, budget| source.find(query, budget))
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        self.both(timeout, "datasets_by_key", |source, budget| source.datasets_by_key(keys, budget))
    }
    /// Always empty.
    fn contents(&self, _timeout: Duration) -> Result<Results> {
        Ok(no_results())
    }
}
