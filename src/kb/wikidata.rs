//! Wikidata adapter.
//!
//! Property search goes through the `wbsearchentities` API; fact lookup goes
//! through the public SPARQL endpoint. Both are synchronous `ureq` calls with
//! a short timeout — the scheduler runs one session per thread, so blocking
//! here is fine.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::alist::{Alist, AttrValue, attr, is_var_name};
use crate::error::{FrankResult, KbError};

use super::{KnowledgeSource, PropertyRef, Trust};

const API_URL: &str = "https://www.wikidata.org/w/api.php";
const SPARQL_URL: &str = "https://query.wikidata.org/sparql";
const RESULT_LIMIT: usize = 100;

pub struct Wikidata {
    agent: ureq::Agent,
}

impl Default for Wikidata {
    fn default() -> Self {
        Self::new()
    }
}

impl Wikidata {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self { agent }
    }

    fn http_error(&self, err: ureq::Error) -> KbError {
        KbError::Http {
            source_name: "wikidata".into(),
            message: err.to_string(),
        }
    }

    fn parse_error(&self, message: &str) -> KbError {
        KbError::Parse {
            source_name: "wikidata".into(),
            message: message.to_string(),
        }
    }

    fn sparql(&self, query: &str) -> FrankResult<Vec<String>> {
        debug!(query, "wikidata sparql");
        let response = self
            .agent
            .get(SPARQL_URL)
            .query("format", "json")
            .query("query", query)
            .set("Accept", "application/sparql-results+json")
            .call()
            .map_err(|e| self.http_error(e))?;
        let body: Value = response
            .into_json()
            .map_err(|e| self.parse_error(&e.to_string()))?;
        let bindings = body["results"]["bindings"]
            .as_array()
            .ok_or_else(|| self.parse_error("missing results.bindings"))?;
        let mut values = Vec::new();
        for binding in bindings {
            if let Some(v) = binding["valueLabel"]["value"].as_str() {
                values.push(v.to_string());
            }
        }
        Ok(values)
    }
}

/// The slot constrains the query only when it holds a concrete string.
fn concrete(value: Option<&AttrValue>) -> Option<String> {
    match value {
        Some(AttrValue::Str(s)) if !s.trim().is_empty() && !is_var_name(s) => {
            Some(s.trim().to_string())
        }
        _ => None,
    }
}

/// Escape a literal for embedding in a SPARQL string.
fn sparql_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn facts_from_values(alist: &Alist, slot: &str, values: Vec<String>) -> Vec<Alist> {
    values
        .into_iter()
        .map(|value| {
            let mut ff = alist.copy(false);
            ff.set(slot, AttrValue::Str(value));
            ff.add_data_source("wikidata");
            ff
        })
        .collect()
}

impl KnowledgeSource for Wikidata {
    fn name(&self) -> &str {
        "wikidata"
    }

    fn trust(&self) -> Trust {
        Trust::Low
    }

    fn search_properties(&self, term: &str) -> FrankResult<Vec<PropertyRef>> {
        let response = self
            .agent
            .get(API_URL)
            .query("action", "wbsearchentities")
            .query("search", term)
            .query("language", "en")
            .query("type", "property")
            .query("format", "json")
            .call()
            .map_err(|e| self.http_error(e))?;
        let body: Value = response
            .into_json()
            .map_err(|e| self.parse_error(&e.to_string()))?;
        let hits = body["search"]
            .as_array()
            .ok_or_else(|| self.parse_error("missing search array"))?;

        let mut refs = Vec::new();
        for hit in hits {
            let (Some(id), Some(label)) = (hit["id"].as_str(), hit["label"].as_str()) else {
                continue;
            };
            // the API ranks by relevance; exact label matches outrank the rest
            let score = if label.eq_ignore_ascii_case(term) {
                1.0
            } else {
                0.5
            };
            refs.push(PropertyRef {
                id: id.to_string(),
                label: label.to_string(),
                score,
            });
        }
        Ok(refs)
    }

    fn find_property_values(&self, alist: &Alist, slot: &str) -> FrankResult<Vec<Alist>> {
        let property = match alist.get(attr::PROPERTY) {
            Some(AttrValue::Str(p)) if !p.is_empty() => p.clone(),
            _ => return Ok(Vec::new()),
        };

        // geopolitical membership queries come from the normalize strategy
        // with a pseudo-property instead of a P-id
        if let Some(class) = property.strip_prefix("__geopolitical:") {
            if slot != attr::SUBJECT {
                return Ok(Vec::new());
            }
            let Some(place) = concrete(alist.get(attr::OBJECT)) else {
                return Ok(Vec::new());
            };
            let class_id = match class {
                "country" => "Q6256",
                "continent" => "Q5107",
                _ => return Ok(Vec::new()),
            };
            let query = format!(
                "SELECT DISTINCT ?valueLabel WHERE {{ \
                   ?place rdfs:label \"{place}\"@en . \
                   ?value wdt:P31 wd:{class_id} . \
                   ?value wdt:P131*|wdt:P361* ?place . \
                   SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }} \
                 }} LIMIT {RESULT_LIMIT}",
                place = sparql_literal(&place),
            );
            return Ok(facts_from_values(alist, slot, self.sparql(&query)?));
        }

        if !property.starts_with('P') {
            // property must have been resolved to a P-id by search_properties
            return Ok(Vec::new());
        }

        let query = match slot {
            attr::OBJECT => {
                let Some(subject) = concrete(alist.get(attr::SUBJECT)) else {
                    return Ok(Vec::new());
                };
                format!(
                    "SELECT ?valueLabel WHERE {{ \
                       ?s rdfs:label \"{subject}\"@en . \
                       ?s wdt:{property} ?value . \
                       SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }} \
                     }} LIMIT {RESULT_LIMIT}",
                    subject = sparql_literal(&subject),
                )
            }
            attr::SUBJECT => {
                let Some(object) = concrete(alist.get(attr::OBJECT)) else {
                    return Ok(Vec::new());
                };
                format!(
                    "SELECT ?valueLabel WHERE {{ \
                       ?o rdfs:label \"{object}\"@en . \
                       ?value wdt:{property} ?o . \
                       SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }} \
                     }} LIMIT {RESULT_LIMIT}",
                    object = sparql_literal(&object),
                )
            }
            // point-in-time lookups are not expressible against this endpoint
            // without qualifier handling
            _ => return Ok(Vec::new()),
        };

        Ok(facts_from_values(alist, slot, self.sparql(&query)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparql_literal_escapes_quotes() {
        assert_eq!(sparql_literal("a \"b\""), "a \\\"b\\\"");
    }

    #[test]
    fn fact_alists_carry_the_source() {
        let mut q = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "United Kingdom", "p": "P36", "o": "?y"
        }))
        .unwrap();
        q.check_variables();
        let facts = facts_from_values(&q, attr::OBJECT, vec!["London".into()]);
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].get(attr::OBJECT),
            Some(&AttrValue::Str("London".into()))
        );
        assert!(facts[0].meta.data_sources.contains("wikidata"));
    }

    #[test]
    fn unresolved_property_is_not_queried() {
        let wd = Wikidata::new();
        let mut q = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "France", "p": "capital", "o": "?y"
        }))
        .unwrap();
        q.check_variables();
        // "capital" is not a P-id, so no network call is made
        assert!(wd.find_property_values(&q, attr::OBJECT).unwrap().is_empty());
    }
}
