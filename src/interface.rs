//! The entry point for applications: a built datasource graph together with
//! its search strategy, pseudo-columns and access options.
//!
//! A [`Federation`] is immutable once built apart from the pseudo-column
//! table, which may be extended at any time through [`Federation::transformer`].

use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::dataset::Results;
use crate::datasource::Source;
use crate::error::{Result, TributaryError};
use crate::query::Query;
use crate::registry::{Datasources, DatasourcesBuilder};
use crate::search::{self, SearchStrategy};
use crate::transform::{ColumnTransformer, TemplateFunction};

lazy_static! {
    static ref SEARCH_STRING: Regex = Regex::new(r"^\*?[^*]+\*?$").unwrap();
}

/// Options applied to every access made through the federation.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub timeout: Duration,
}
impl Default for QueryOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS) }
    }
}

pub struct Federation {
    datasources: Datasources,
    strategy: SearchStrategy,
    transformer: ColumnTransformer,
    options: QueryOptions,
}

impl Federation {
    pub fn new(datasources: Datasources, mut strategy: SearchStrategy, options: QueryOptions) -> Self {
        strategy.retain_known(&datasources);
        Self {
            datasources,
            strategy,
            transformer: ColumnTransformer::new(),
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_builder(config, DatasourcesBuilder::new())
    }

    /// Like [`Federation::from_config`], with additional datasource kinds or
    /// prebuilt datasources registered on `builder`.
    pub fn with_builder(config: &AppConfig, builder: DatasourcesBuilder) -> Self {
        let started = Instant::now();
        let datasources = builder.build(&config.datasource);
        let strategy = SearchStrategy::from_descs(&config.search);
        let federation = Self::new(datasources, strategy, QueryOptions { timeout: config.timeout() });
        for transform in &config.transform {
            federation
                .transformer
                .register(&transform.column, TemplateFunction::new(transform.template.as_str()));
        }
        info!(
            datasources = federation.datasources.len(),
            failures = federation.datasources.failures().len(),
            templates = federation.strategy.word_counts().count(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "federation built"
        );
        federation
    }

    pub fn datasources(&self) -> &Datasources {
        &self.datasources
    }
    pub fn strategy(&self) -> &SearchStrategy {
        &self.strategy
    }
    pub fn transformer(&self) -> &ColumnTransformer {
        &self.transformer
    }
    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn datasource(&self, name: &str) -> Result<&Source> {
        self.datasources
            .get(name)
            .ok_or_else(|| TributaryError::UnknownDatasource(name.to_string()))
    }

    /// The columns of `name` followed by the pseudo-columns it does not already have.
    pub fn columns_for(&self, name: &str) -> Result<Vec<String>> {
        let source = self.datasource(name)?;
        let mut columns = source.schema().columns().to_vec();
        for pseudo in self.transformer.schema() {
            if !source.schema().contains(&pseudo) {
                columns.push(pseudo);
            }
        }
        Ok(columns)
    }

    /// The columns of every datasource `text` would be searched in, in plan order.
    pub fn search_columns(&self, text: &str) -> Result<Vec<String>> {
        let mut columns: Vec<String> = Vec::new();
        for query in self.plan(text) {
            for column in self.columns_for(query.datasource())? {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        Ok(columns)
    }

    /// Runs a query whose patterns must each be a search string: a literal
    /// with at most one leading and one trailing `*`.
    pub fn find(&self, query: &Query) -> Result<Results> {
        let source = self.datasource(query.datasource())?;
        if let Some(part) = query.iter().find(|p| !SEARCH_STRING.is_match(p.pattern())) {
            return Err(TributaryError::InvalidSearchString(part.pattern().to_string()));
        }
        let results = source.find(query.parts(), self.options.timeout).inspect_err(|e| {
            warn!(datasource = query.datasource(), error = %e, "find failed");
        })?;
        Ok(self.transformed(results))
    }

    pub fn search(&self, text: &str) -> Result<Results> {
        let results = search::search(text, &self.strategy, &self.datasources, self.options.timeout)?;
        Ok(self.transformed(results))
    }

    /// The queries `text` would run, without running them.
    pub fn plan(&self, text: &str) -> Vec<Query> {
        search::plan(text, &self.strategy)
    }

    pub fn contents_of(&self, name: &str) -> Result<Results> {
        let results = self.datasource(name)?.contents(self.options.timeout)?;
        Ok(self.transformed(results))
    }

    pub fn datasets_by_key(&self, name: &str, keys: &[String]) -> Result<Results> {
        let results = self.datasource(name)?.datasets_by_key(keys, self.options.timeout)?;
        Ok(self.transformed(results))
    }

    /// Wraps `results` so that the configured pseudo-columns can be read.
    pub fn transformed(&self, results: Results) -> Results {
        self.transformer.transform_results(results)
    }
}
