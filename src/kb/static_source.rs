//! In-memory knowledge source backed by a fact table.
//!
//! Used by demos and tests in place of a live adapter, and as the
//! [`GeoProvider`] for the geospatial decomposition via its sub-location
//! table.

use std::collections::HashMap;

use crate::alist::{Alist, AttrValue, attr, is_var_name};
use crate::error::FrankResult;

use super::{GeoProvider, KnowledgeSource, PropertyRef, Trust};

#[derive(Debug, Clone)]
struct Fact {
    subject: String,
    property: String,
    object: String,
    time: Option<String>,
}

/// A fact-table source with declared trust and an optional declared prior.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    trust: Trust,
    prior: Option<f64>,
    facts: Vec<Fact>,
    sub_locations: HashMap<String, Vec<String>>,
}

impl StaticSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            trust: Trust::High,
            prior: None,
            facts: Vec::new(),
            sub_locations: HashMap::new(),
        }
    }

    pub fn with_trust(mut self, trust: Trust) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_prior(mut self, cov: f64) -> Self {
        self.prior = Some(cov);
        self
    }

    /// Add a timeless `(s, p, o)` fact.
    pub fn add_fact(&mut self, subject: &str, property: &str, object: &str) {
        self.facts.push(Fact {
            subject: subject.to_string(),
            property: property.to_string(),
            object: object.to_string(),
            time: None,
        });
    }

    /// Add a fact that holds at a specific time point.
    pub fn add_dated_fact(&mut self, subject: &str, property: &str, object: &str, time: &str) {
        self.facts.push(Fact {
            subject: subject.to_string(),
            property: property.to_string(),
            object: object.to_string(),
            time: Some(time.to_string()),
        });
    }

    /// Declare the constituent locations of a place.
    pub fn add_sub_locations<I, S>(&mut self, place: &str, locations: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_locations
            .entry(place.to_string())
            .or_default()
            .extend(locations.into_iter().map(Into::into));
    }
}

/// A slot value constrains the match only when it is a concrete string.
fn concrete(value: Option<&AttrValue>) -> Option<String> {
    match value {
        Some(AttrValue::Str(s)) if !s.trim().is_empty() && !is_var_name(s) => {
            Some(s.trim().to_string())
        }
        Some(AttrValue::Num(n)) => Some(crate::alist::format_number(*n)),
        _ => None,
    }
}

fn matches(want: &Option<String>, have: &str) -> bool {
    match want {
        Some(w) => w.eq_ignore_ascii_case(have),
        None => true,
    }
}

impl KnowledgeSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn trust(&self) -> Trust {
        self.trust
    }

    fn prior_cov(&self) -> Option<f64> {
        self.prior
    }

    fn search_properties(&self, term: &str) -> FrankResult<Vec<PropertyRef>> {
        let known = self
            .facts
            .iter()
            .any(|f| f.property.eq_ignore_ascii_case(term));
        if known {
            Ok(vec![PropertyRef {
                id: term.to_string(),
                label: term.to_string(),
                score: 1.0,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    fn find_property_values(&self, alist: &Alist, slot: &str) -> FrankResult<Vec<Alist>> {
        let property = match alist.get(attr::PROPERTY) {
            Some(AttrValue::Str(p)) if !p.is_empty() => p.clone(),
            _ => return Ok(Vec::new()),
        };
        let want_subject = concrete(alist.get(attr::SUBJECT));
        let want_object = concrete(alist.get(attr::OBJECT));
        let want_time = concrete(alist.get(attr::TIME));

        let mut found = Vec::new();
        for fact in &self.facts {
            if !fact.property.eq_ignore_ascii_case(&property) {
                continue;
            }
            let time_ok = match (&want_time, &fact.time) {
                (Some(w), Some(t)) => w == t,
                _ => true, // timeless facts answer dated queries and vice versa
            };
            let value = match slot {
                attr::SUBJECT if matches(&want_object, &fact.object) && time_ok => &fact.subject,
                attr::OBJECT if matches(&want_subject, &fact.subject) && time_ok => &fact.object,
                attr::TIME
                    if matches(&want_subject, &fact.subject)
                        && matches(&want_object, &fact.object) =>
                {
                    match &fact.time {
                        Some(t) => t,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let mut ff = alist.copy(false);
            ff.set(slot, AttrValue::Str(value.clone()));
            ff.add_data_source(&self.name);
            found.push(ff);
        }
        Ok(found)
    }
}

impl GeoProvider for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sub_locations(&self, place: &str) -> Vec<String> {
        self.sub_locations.get(place).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> StaticSource {
        let mut s = StaticSource::new("testdata");
        s.add_fact("United Kingdom", "capital", "London");
        s.add_fact("France", "capital", "Paris");
        s.add_dated_fact("Ghana", "population", "30000000", "2020");
        s.add_dated_fact("Ghana", "population", "31000000", "2021");
        s
    }

    fn query(s: &str, p: &str, o: &str) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": s, "p": p, "o": o
        }))
        .unwrap();
        a.check_variables();
        a
    }

    #[test]
    fn object_lookup_fills_the_slot() {
        let facts = source()
            .find_property_values(&query("United Kingdom", "capital", "?y"), attr::OBJECT)
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].get(attr::OBJECT),
            Some(&AttrValue::Str("London".into()))
        );
        assert!(facts[0].meta.data_sources.contains("testdata"));
    }

    #[test]
    fn subject_lookup_is_the_inverse() {
        let facts = source()
            .find_property_values(&query("?who", "capital", "Paris"), attr::SUBJECT)
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].get(attr::SUBJECT),
            Some(&AttrValue::Str("France".into()))
        );
    }

    #[test]
    fn dated_facts_respect_the_time_slot() {
        let mut q = query("Ghana", "population", "?y");
        q.set(attr::TIME, AttrValue::Str("2021".into()));
        let facts = source().find_property_values(&q, attr::OBJECT).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].get(attr::OBJECT),
            Some(&AttrValue::Str("31000000".into()))
        );
    }

    #[test]
    fn unknown_property_finds_nothing() {
        assert!(source()
            .search_properties("elevation")
            .unwrap()
            .is_empty());
        assert!(source()
            .find_property_values(&query("France", "elevation", "?y"), attr::OBJECT)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sub_location_table_backs_the_geo_provider() {
        let mut s = StaticSource::new("geonames");
        s.add_sub_locations("Scandinavia", ["Norway", "Sweden"]);
        assert_eq!(
            GeoProvider::sub_locations(&s, "Scandinavia"),
            vec!["Norway".to_string(), "Sweden".to_string()]
        );
        assert!(GeoProvider::sub_locations(&s, "Atlantis").is_empty());
    }
}
