//! Free-text search with progressive relaxation.
//!
//! The search text is split into words. The strategy is asked for templates
//! registered for that many words; if there are none, trailing words are
//! left out one at a time until some word count has templates. Each template
//! of that word count is instantiated with the words and run, and all results
//! are merged without duplicates.

use std::collections::BTreeMap;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::dataset::{QueryResultsSet, Results};
use crate::datasource::{Deadline, degrade};
use crate::error::{Result, TributaryError};
use crate::query::{Query, QueryPart};
use crate::registry::Datasources;

lazy_static! {
    static ref WORD_PLACEHOLDER: Regex = Regex::new(r"\$\{word([0-9]+)\}").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[,\s]+").unwrap();
}

// ------------- SearchStrategy -------------
/// Query templates by the number of words they expect.
#[derive(Debug, Clone, Default)]
pub struct SearchStrategy {
    templates: BTreeMap<usize, Vec<Query>>,
}

/// One configured template.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDesc {
    #[serde(alias = "DATASOURCE")]
    pub datasource: String,
    /// Defaults to the highest `${wordN}` used by the parts.
    #[serde(default, alias = "WORDS")]
    pub words: Option<usize>,
    #[serde(default, alias = "QUERY")]
    pub query: Vec<(String, String)>,
}

impl SearchDesc {
    pub fn word_count(&self) -> usize {
        self.words.unwrap_or_else(|| {
            self.query
                .iter()
                .flat_map(|(_, pattern)| WORD_PLACEHOLDER.captures_iter(pattern))
                .filter_map(|c| c[1].parse::<usize>().ok())
                .max()
                .unwrap_or(0)
        })
    }
}

impl SearchStrategy {
    pub fn new() -> Self {
        Self::default()
    }
    /// Appends a template; templates of one word count keep their order.
    pub fn add(&mut self, words: usize, template: Query) {
        self.templates.entry(words).or_default().push(template);
    }
    pub fn templates(&self, words: usize) -> Option<&[Query]> {
        self.templates.get(&words).map(Vec::as_slice)
    }
    pub fn word_counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.templates.keys().copied()
    }
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
    pub fn from_descs(descs: &[SearchDesc]) -> Self {
        let mut strategy = Self::new();
        for desc in descs {
            let parts = desc
                .query
                .iter()
                .map(|(column, pattern)| QueryPart::new(column.as_str(), pattern.as_str()))
                .collect();
            strategy.add(desc.word_count(), Query::new(desc.datasource.as_str(), parts));
        }
        strategy
    }
    /// Drops templates addressed to datasources that do not exist.
    pub fn retain_known(&mut self, datasources: &Datasources) {
        for (words, templates) in self.templates.iter_mut() {
            templates.retain(|t| {
                let known = datasources.get(t.datasource()).is_some();
                if !known {
                    warn!(datasource = t.datasource(), words, "search template dropped");
                }
                known
            });
        }
        self.templates.retain(|_, templates| !templates.is_empty());
    }
}

/// Splits the text into search words. Commas separate words like spaces do,
/// `*` inside a word is removed and a trailing `*` or `.` marks a prefix search.
pub fn normalize(text: &str) -> Vec<String> {
    SEPARATORS
        .split(text)
        .filter_map(|word| {
            let prefix = word.ends_with('*') || word.ends_with('.');
            let word = word.strip_suffix('.').unwrap_or(word).replace('*', "");
            if word.is_empty() {
                None
            } else if prefix {
                Some(format!("{}*", word))
            } else {
                Some(word)
            }
        })
        .collect()
}

fn instantiate(template: &Query, words: &[String]) -> Query {
    let parts = template
        .iter()
        .map(|part| {
            // one pass, so a word containing "${word2}" stays literal
            let pattern = WORD_PLACEHOLDER.replace_all(part.pattern(), |caps: &Captures| {
                match caps[1].parse::<usize>() {
                    Ok(n) if n >= 1 && n <= words.len() => words[n - 1].clone(),
                    _ => caps[0].to_string(),
                }
            });
            QueryPart::new(part.column(), pattern.into_owned())
        })
        .collect();
    Query::new(template.datasource(), parts)
}

/// The queries to run for `text`; empty if no word count has templates.
pub fn plan(text: &str, strategy: &SearchStrategy) -> Vec<Query> {
    let words = normalize(text);
    let found = (0..=words.len())
        .rev()
        .find_map(|n| strategy.templates(n).map(|templates| (n, templates)));
    match found {
        Some((n, templates)) => templates.iter().map(|t| instantiate(t, &words[..n])).collect(),
        None => Vec::new(),
    }
}

/// Runs the plan for `text`. A query without parts asks for the contents of
/// its datasource. A failing datasource contributes nothing.
pub fn search(text: &str, strategy: &SearchStrategy, datasources: &Datasources, timeout: Duration) -> Result<Results> {
    let deadline = Deadline::after(timeout);
    let mut merged = QueryResultsSet::new();
    for query in plan(text, strategy) {
        let source = datasources
            .get(query.datasource())
            .ok_or_else(|| TributaryError::UnknownDatasource(query.datasource().to_string()))?;
        let budget = deadline.budget(query.datasource(), "search")?;
        let outcome = if query.is_empty() {
            source.contents(budget)
        } else {
            source.find(query.parts(), budget)
        };
        let results = degrade("search", source.name(), outcome);
        debug!(%query, rows = results.len(), "search query");
        merged.add_all(results.as_ref());
    }
    Ok(Box::new(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(normalize("Benkmann,Matthias"), vec!["Benkmann", "Matthias"]);
        assert_eq!(normalize("  Matth.  Ben*kmann* "), vec!["Matth*", "Benkmann*"]);
        assert_eq!(normalize("*** , ."), Vec::<String>::new());
    }

    #[test]
    fn dollars_in_words_are_not_substituted_again() {
        let template = Query::new("p", vec![QueryPart::new("a", "${word1}-${word2}-${word3}")]);
        let q = instantiate(&template, &["${word2}".into(), "x".into()]);
        assert_eq!(q.parts()[0].pattern(), "${word2}-x-${word3}");
    }

    #[test]
    fn word_count_defaults_to_highest_placeholder() {
        let desc = SearchDesc {
            datasource: "p".into(),
            words: None,
            query: vec![("a".into(), "${word2}".into()), ("b".into(), "${word1}*".into())],
        };
        assert_eq!(desc.word_count(), 2);
    }
}
