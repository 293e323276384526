//! Uncertainty model: per-source prior coefficients of variation and the
//! aggregate estimate written by every reducer.

use std::collections::HashMap;

use crate::alist::{Alist, AttrValue, attr};

/// Prior coefficient of variation per knowledge source.
#[derive(Debug, Clone)]
pub struct SourcePriors {
    priors: HashMap<String, f64>,
    default: f64,
}

impl Default for SourcePriors {
    fn default() -> Self {
        let mut priors = HashMap::new();
        priors.insert("wikidata".to_string(), 0.1);
        priors.insert("worldbank".to_string(), 0.05);
        priors.insert("geonames".to_string(), 0.1);
        priors.insert("conceptnet".to_string(), 0.3);
        Self {
            priors,
            default: 0.2,
        }
    }
}

impl SourcePriors {
    pub fn with_prior(mut self, source: &str, cov: f64) -> Self {
        self.priors.insert(source.to_string(), cov);
        self
    }

    /// Prior for a source; unknown sources get the default prior.
    pub fn prior(&self, source: &str) -> f64 {
        *self.priors.get(source).unwrap_or(&self.default)
    }
}

/// Aggregate uncertainty of a reduction over `children`.
///
/// Numeric aggregations average the child coefficients and shrink by
/// `1/sqrt(n)` (independent-ish errors partially cancel); non-numeric
/// aggregations carry the worst child coefficient forward unchanged.
pub fn estimate(children: &[Alist], all_numeric: bool, _op: &str) -> f64 {
    let covs: Vec<f64> = children
        .iter()
        .filter_map(|c| match c.get(attr::COV) {
            Some(AttrValue::Num(n)) => Some(*n),
            Some(AttrValue::Str(s)) => s.parse().ok(),
            _ => None,
        })
        .filter(|c| c.is_finite() && *c >= 0.0)
        .collect();
    if covs.is_empty() {
        return 0.0;
    }
    if all_numeric {
        let mean = covs.iter().sum::<f64>() / covs.len() as f64;
        mean / (covs.len() as f64).sqrt()
    } else {
        covs.iter().cloned().fold(0.0, f64::max)
    }
}
