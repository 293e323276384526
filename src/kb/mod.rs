//! Knowledge-source boundary.
//!
//! A [`KnowledgeSource`] answers two questions: which of its properties match
//! a predicate string (`search_properties`), and which facts instantiate a
//! given slot of an alist (`find_property_values`). Sources never mutate the
//! inference graph; they return fact alists that the resolution engine wires
//! in itself.
//!
//! Source faults (network, payload shape) surface as [`KbError`] — the engine
//! logs them and treats the source as having found nothing.

use crate::alist::Alist;
use crate::error::FrankResult;

pub mod static_source;
pub mod wikidata;

pub use static_source::StaticSource;
pub use wikidata::Wikidata;

/// How much a source's answers are trusted. Query contexts asking for high
/// trust skip low-trust sources entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Low,
    High,
}

impl Trust {
    pub fn as_str(self) -> &'static str {
        match self {
            Trust::Low => "low",
            Trust::High => "high",
        }
    }
}

/// A source-specific handle for a predicate, ranked by match quality.
#[derive(Debug, Clone)]
pub struct PropertyRef {
    /// Source-internal identifier (e.g. a Wikidata `P…` id).
    pub id: String,
    /// Human-readable label in the source.
    pub label: String,
    /// Match score in `[0, 1]`; only the top-scoring refs are queried.
    pub score: f64,
}

pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;

    fn trust(&self) -> Trust;

    /// Prior coefficient of variation declared by the source itself, if any.
    /// Sources without an opinion fall back to the engine-wide priors.
    fn prior_cov(&self) -> Option<f64> {
        None
    }

    /// Property handles in this source matching the given predicate string.
    fn search_properties(&self, term: &str) -> FrankResult<Vec<PropertyRef>>;

    /// Facts that instantiate `slot` (one of `s`, `o`, `t`) of the alist.
    /// Each returned alist is a copy of the query with the slot filled in and
    /// this source recorded in its data sources.
    fn find_property_values(&self, alist: &Alist, slot: &str) -> FrankResult<Vec<Alist>>;
}

/// Part-of geography used by the geospatial decomposition.
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Constituent locations of a place, empty when the place is unknown.
    fn sub_locations(&self, place: &str) -> Vec<String>;
}
