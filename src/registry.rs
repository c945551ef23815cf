//! Builds the named datasource graph from declarations.
//!
//! Nodes are constructed in declaration order and may only reference nodes
//! declared before them. A node that fails to construct is logged, recorded
//! and skipped; the rest of the graph is still built. The finished
//! [`Datasources`] map is immutable.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::attach::AttachDatasource;
use crate::dataset::OtherHasher;
use crate::datasource::Source;
use crate::error::{Result, TributaryError};
use crate::overlay::OverlayDatasource;
use crate::prefer::PreferDatasource;
use crate::ram::RamDatasource;
use crate::schema::SchemaDatasource;
use crate::sqlite::SqliteDatasource;
use crate::union::UnionDatasource;

pub type SourceMap = HashMap<String, Source, OtherHasher>;

/// Constructs one node of a given `TYPE` from its declaration and the nodes built so far.
pub type Factory = Box<dyn Fn(&SourceDesc, &SourceMap) -> Result<Source> + Send + Sync>;

const UNNAMED: &str = "<unnamed>";

// ------------- SourceDesc -------------
/// One datasource declaration. Every key is optional at this level so that
/// a missing key is reported as an error of this node only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceDesc {
    #[serde(default, alias = "NAME")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "TYPE")]
    pub kind: Option<String>,
    #[serde(default, alias = "SOURCE")]
    pub source: Option<String>,
    #[serde(default, alias = "SOURCE1")]
    pub source1: Option<String>,
    #[serde(default, alias = "SOURCE2")]
    pub source2: Option<String>,
    #[serde(default, alias = "ATTACH")]
    pub attach: Option<String>,
    #[serde(default, alias = "OVERLAY")]
    pub overlay: Option<String>,
    #[serde(default, alias = "OVER")]
    pub over: Option<String>,
    #[serde(default, alias = "MODE")]
    pub mode: Option<String>,
    #[serde(default, rename = "match", alias = "MATCH")]
    pub matches: Vec<Vec<String>>,
    #[serde(default, alias = "DROP")]
    pub drop: Vec<String>,
    #[serde(default, alias = "ADD")]
    pub add: Vec<String>,
    #[serde(default, alias = "RENAME")]
    pub rename: Vec<Vec<String>>,
    // literal tables
    #[serde(default, alias = "SCHEMA")]
    pub schema: Vec<String>,
    #[serde(default, alias = "KEYS")]
    pub keys: Vec<String>,
    #[serde(default, alias = "DATA")]
    pub data: Vec<RowDesc>,
    // sqlite
    #[serde(default, alias = "PATH")]
    pub path: Option<String>,
    #[serde(default, alias = "TABLE")]
    pub table: Option<String>,
}

/// A literal row, either positional or as `(column, value)` pairs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RowDesc {
    Ordered(Vec<String>),
    Named(Vec<(String, String)>),
}

impl SourceDesc {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            kind: Some(kind.to_string()),
            ..Default::default()
        }
    }
    pub fn name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| TributaryError::config(UNNAMED, "NAME of datasource is missing"))
    }
    /// The node name for messages, even when NAME itself is missing.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED)
    }
    pub fn require<'a>(&self, value: &'a Option<String>, key: &str) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| {
            TributaryError::config(
                self.label(),
                format!("{} specification of datasource \"{}\" is missing", key, self.label()),
            )
        })
    }
    pub fn resolve(&self, sources: &SourceMap, reference: &str) -> Result<Source> {
        sources.get(reference).cloned().ok_or_else(|| {
            TributaryError::config(
                self.label(),
                format!(
                    "Referenced datasource \"{}\" is missing or defined incorrectly",
                    reference
                ),
            )
        })
    }
    /// The MATCH pairs; at least one is required and each must have two columns.
    pub fn match_pairs(&self) -> Result<Vec<(String, String)>> {
        if self.matches.is_empty() {
            return Err(TributaryError::config(
                self.label(),
                format!(
                    "At least one MATCH specification has to be made in datasource \"{}\"",
                    self.label()
                ),
            ));
        }
        self.pairs(&self.matches, "MATCH")
    }
    pub fn rename_pairs(&self) -> Result<Vec<(String, String)>> {
        self.pairs(&self.rename, "RENAME")
    }
    fn pairs(&self, lists: &[Vec<String>], key: &str) -> Result<Vec<(String, String)>> {
        lists
            .iter()
            .map(|pair| match pair.as_slice() {
                [first, second] => Ok((first.clone(), second.clone())),
                _ => Err(TributaryError::config(
                    self.label(),
                    format!("Incorrect {} specification in datasource \"{}\"", key, self.label()),
                )),
            })
            .collect()
    }
}

// ------------- Datasources -------------
/// The immutable name → datasource map produced by a build.
pub struct Datasources {
    sources: SourceMap,
    order: Vec<String>,
    failures: Vec<TributaryError>,
}

impl Datasources {
    pub fn builder() -> DatasourcesBuilder {
        DatasourcesBuilder::new()
    }
    /// Builds with the built-in kinds only.
    pub fn build(descs: &[SourceDesc]) -> Self {
        DatasourcesBuilder::new().build(descs)
    }
    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.get(name)
    }
    /// Names in construction order.
    pub fn names(&self) -> &[String] {
        &self.order
    }
    pub fn len(&self) -> usize {
        self.order.len()
    }
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
    /// Configuration errors of the nodes that were skipped.
    pub fn failures(&self) -> &[TributaryError] {
        &self.failures
    }
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.order.iter().filter_map(|n| self.sources.get(n))
    }
}

// ------------- DatasourcesBuilder -------------
pub struct DatasourcesBuilder {
    factories: HashMap<String, Factory, OtherHasher>,
    sources: SourceMap,
    order: Vec<String>,
    failures: Vec<TributaryError>,
}

impl DatasourcesBuilder {
    /// A builder that knows the built-in kinds `conf`, `sqlite`, `union`,
    /// `attach`, `overlay`, `prefer` and `schema`.
    pub fn new() -> Self {
        let builder = Self {
            factories: HashMap::default(),
            sources: HashMap::default(),
            order: Vec::new(),
            failures: Vec::new(),
        };
        builder
            .register_kind("conf", |desc, _| Ok(Arc::new(RamDatasource::from_desc(desc)?)))
            .register_kind("sqlite", |desc, _| Ok(Arc::new(SqliteDatasource::from_desc(desc)?)))
            .register_kind("union", |desc, sources| Ok(Arc::new(UnionDatasource::from_desc(desc, sources)?)))
            .register_kind("attach", |desc, sources| Ok(Arc::new(AttachDatasource::from_desc(desc, sources)?)))
            .register_kind("overlay", |desc, sources| Ok(Arc::new(OverlayDatasource::from_desc(desc, sources)?)))
            .register_kind("prefer", |desc, sources| Ok(Arc::new(PreferDatasource::from_desc(desc, sources)?)))
            .register_kind("schema", |desc, sources| Ok(Arc::new(SchemaDatasource::from_desc(desc, sources)?)))
    }
    /// Adds (or replaces) the factory for a `TYPE` tag, e.g. a directory-backed adapter.
    pub fn register_kind<F>(mut self, kind: &str, factory: F) -> Self
    where
        F: Fn(&SourceDesc, &SourceMap) -> Result<Source> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_lowercase(), Box::new(factory));
        self
    }
    /// Adds an already constructed datasource that later declarations may reference.
    pub fn register(mut self, source: Source) -> Self {
        let name = source.name().to_string();
        self.insert(name, source);
        self
    }
    pub fn build(mut self, descs: &[SourceDesc]) -> Datasources {
        for desc in descs {
            match self.construct(desc) {
                Ok((name, source)) => {
                    debug!(datasource = %name, columns = source.schema().len(), "datasource constructed");
                    self.insert(name, source);
                }
                Err(e) => {
                    error!(datasource = desc.label(), error = %e, "datasource could not be initialized");
                    self.failures.push(e);
                }
            }
        }
        Datasources {
            sources: self.sources,
            order: self.order,
            failures: self.failures,
        }
    }
    /// The new node together with the NAME it is registered under.
    fn construct(&self, desc: &SourceDesc) -> Result<(String, Source)> {
        let name = desc.name()?;
        let kind = desc.require(&desc.kind, "TYPE")?;
        if self.sources.contains_key(name) {
            return Err(TributaryError::config(name, "A datasource with this NAME is already defined"));
        }
        let factory = self.factories.get(&kind.to_lowercase()).ok_or_else(|| {
            TributaryError::config(name, format!("Unsupported datasource type: {}", kind))
        })?;
        let source = factory(desc, &self.sources)?;
        if source.name() != name {
            warn!(declared = name, constructed = source.name(), "datasource registered under its declared NAME");
        }
        Ok((name.to_string(), source))
    }
    fn insert(&mut self, name: String, source: Source) {
        if self.sources.insert(name.clone(), source).is_some() {
            self.failures.push(TributaryError::config(&name, "A datasource with this NAME is already defined"));
            warn!(datasource = %name, "duplicate datasource replaced");
        } else {
            self.order.push(name);
        }
    }
}

impl Default for DatasourcesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
