//! Decomposition (map) strategies.
//!
//! A strategy inspects an alist and, when its precondition holds, produces a
//! decomposition triple: a map head summarizing the split, one or more reduce
//! nodes naming the operator that will recombine the children, and the
//! successor children themselves. The graph wires the triple in via
//! [`crate::graph::InferenceGraph::subdivide`].

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::alist::Alist;
use crate::config::EngineConfig;
use crate::kb::GeoProvider;

mod comparison;
mod geospatial;
mod normalize;
mod temporal;

pub use comparison::Comparison;
pub use geospatial::Geospatial;
pub use normalize::Normalize;
pub use temporal::Temporal;

/// Result of a successful decomposition.
#[derive(Debug)]
pub struct Decomposition {
    pub map_op_node: Alist,
    pub reduce_op_nodes: Vec<Alist>,
    pub successors: Vec<Alist>,
}

/// A decomposition strategy. Returning `None` means the precondition does not
/// hold for this alist; it is not an error.
pub trait Decompose: Send + Sync {
    fn name(&self) -> &'static str;
    fn decompose(&self, alist: &Alist) -> Option<Decomposition>;
}

/// Build the configured base strategies (everything except normalization,
/// which is forced separately when nested sub-queries are present), in a
/// shuffled order so no strategy is systematically preferred.
pub fn base_strategies(
    config: &EngineConfig,
    geo: Arc<dyn GeoProvider>,
) -> Vec<Box<dyn Decompose>> {
    let mut strategies: Vec<Box<dyn Decompose>> = Vec::new();
    for name in &config.base_decompositions {
        match name.as_str() {
            "temporal" => strategies.push(Box::new(Temporal::new(config))),
            "comparison" => strategies.push(Box::new(Comparison)),
            "geospatial" => strategies.push(Box::new(Geospatial::new(Arc::clone(&geo)))),
            other => tracing::warn!(strategy = other, "unknown decomposition strategy ignored"),
        }
    }
    strategies.shuffle(&mut rand::thread_rng());
    strategies
}
