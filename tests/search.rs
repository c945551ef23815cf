mod common;

use common::{TIMEOUT, keys, table};
use std::sync::Arc;
use tributary::query::{Query, QueryPart};
use tributary::registry::{Datasources, DatasourcesBuilder};
use tributary::search::{SearchStrategy, plan, search};

fn template(datasource: &str, parts: &[(&str, &str)]) -> Query {
    Query::new(datasource, parts.iter().map(|(c, p)| QueryPart::new(*c, *p)).collect())
}

fn strategy() -> SearchStrategy {
    let mut strategy = SearchStrategy::new();
    strategy.add(1, template("people", &[("Nachname", "${word1}")]));
    strategy.add(1, template("people", &[("Mail", "${word1}")]));
    strategy.add(2, template("people", &[("Vorname", "${word1}"), ("Nachname", "${word2}")]));
    strategy
}

fn datasources() -> Datasources {
    let people = table(
        "people",
        &["Vorname", "Nachname", "Mail"],
        &[
            ("1", &[Some("Matthias"), Some("Benkmann"), Some("matthias.benkmann@example.org")]),
            ("2", &[Some("Anna"), Some("Benkmann"), Some("anna@example.org")]),
            ("3", &[Some("Bernd"), Some("Matthias"), None]),
        ],
    );
    DatasourcesBuilder::new().register(Arc::new(people)).build(&[])
}

#[test]
fn three_words_fall_back_to_two() {
    let queries = plan("Matthias Benkmann Extra", &strategy());
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].parts()[0].pattern(), "Matthias");
    assert_eq!(queries[0].parts()[1].pattern(), "Benkmann");
}

#[test]
fn no_templates_no_queries() {
    assert!(plan("a b c", &SearchStrategy::new()).is_empty());
    let mut only_two = SearchStrategy::new();
    only_two.add(2, template("people", &[("Vorname", "${word1}")]));
    assert!(plan("single", &only_two).is_empty());
}

#[test]
fn abbreviations_become_prefix_searches() {
    let queries = plan("Matth. Benk*", &strategy());
    assert_eq!(queries[0].parts()[0].pattern(), "Matth*");
    assert_eq!(queries[0].parts()[1].pattern(), "Benk*");
}

#[test]
fn results_of_all_templates_are_merged() {
    let found = search("matthias*", &strategy(), &datasources(), TIMEOUT).unwrap();
    // row 1 through its mail address, row 3 through its surname
    let mut found_keys = keys(found.as_ref());
    found_keys.sort();
    assert_eq!(found_keys, ["1", "3"]);

    let found = search("Benkmann", &strategy(), &datasources(), TIMEOUT).unwrap();
    let mut found_keys = keys(found.as_ref());
    found_keys.sort();
    assert_eq!(found_keys, ["1", "2"]);
}

#[test]
fn duplicates_across_templates_are_removed() {
    let mut strategy = SearchStrategy::new();
    strategy.add(1, template("people", &[("Nachname", "${word1}")]));
    strategy.add(1, template("people", &[("Nachname", "${word1}*")]));
    let found = search("Benkmann", &strategy, &datasources(), TIMEOUT).unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn template_without_parts_returns_contents() {
    let mut strategy = SearchStrategy::new();
    strategy.add(0, Query::new("people", Vec::new()));
    let found = search("", &strategy, &datasources(), TIMEOUT).unwrap();
    assert_eq!(found.len(), 3);
    // unmatched word counts relax down to zero words
    let found = search("anything at all", &strategy, &datasources(), TIMEOUT).unwrap();
    assert_eq!(found.len(), 3);
}
