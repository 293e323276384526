//! # frank
//!
//! A recursive question-answering engine: queries arrive as *alists*
//! (annotated lists), get decomposed into an inference graph of
//! sub-queries, resolved against knowledge sources, and aggregated back
//! up to an answer with an uncertainty estimate.
//!
//! ## Architecture
//!
//! - **Alist** (`alist`): attribute map with typed values, variables
//!   (`?` projection, `$` auxiliary, `#` nesting), and instantiation
//! - **Inference graph** (`graph`): arena-backed digraph of map/reduce
//!   node pairs joined by complement edges
//! - **Decomposition** (`map`): normalize / temporal / comparison /
//!   geospatial strategies
//! - **Reduction** (`reduce`): statically registered aggregation operators
//! - **Resolution** (`infer`): per-session engine stepping frontier nodes
//! - **Scheduling** (`launcher`): session loop, registry, timeout, answers
//! - **Knowledge sources** (`kb`): trait boundary, in-memory fact tables,
//!   a Wikidata adapter
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use frank::alist::Alist;
//! use frank::config::EngineConfig;
//! use frank::kb::StaticSource;
//! use frank::launcher::{Launcher, SessionRegistry};
//!
//! let mut kb = StaticSource::new("facts");
//! kb.add_fact("United Kingdom", "capital", "London");
//! let kb = Arc::new(kb);
//!
//! let launcher = Launcher::new(
//!     EngineConfig::default(),
//!     SessionRegistry::new(),
//!     vec![kb.clone()],
//!     kb,
//! );
//! let query = Alist::from_json_str(
//!     r#"{"h": "value", "s": "United Kingdom", "p": "capital", "o": "?y", "v": "?y"}"#,
//! ).unwrap();
//! let snapshot = launcher.start("capital of the UK", &query, "session-1");
//! println!("{}", snapshot.answer);
//! ```

pub mod alist;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod infer;
pub mod kb;
pub mod launcher;
pub mod map;
pub mod reduce;
pub mod regression;
pub mod uncertainty;

pub use error::{FrankError, FrankResult};
