//! Rich diagnostic error types for the frank engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Note that "not yet resolvable" conditions
//! (a reducer declining, a search finding nothing, a decomposition precondition
//! unmet) are *not* errors — they are expressed as `Option`/`bool` returns and
//! retried by the scheduler.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the frank engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source chains) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum FrankError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Query submission errors
// ---------------------------------------------------------------------------

/// Errors raised at query-submission time, before a session or graph exists.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query is not a JSON object")]
    #[diagnostic(
        code(frank::query::not_an_object),
        help(
            "A query alist is a JSON mapping with reserved keys, e.g. \
             {{\"h\": \"value\", \"s\": \"France\", \"p\": \"capital\", \
             \"o\": \"?y\", \"v\": \"?y\"}}."
        )
    )]
    NotAnObject,

    #[error("malformed query: {message}")]
    #[diagnostic(
        code(frank::query::malformed),
        help("Check the query JSON. {message}")
    )]
    Malformed { message: String },

    #[error("query JSON parse error: {source}")]
    #[diagnostic(
        code(frank::query::parse),
        help("The query string is not valid JSON.")
    )]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Inference graph errors
// ---------------------------------------------------------------------------

/// Structural invariant violations in the inference graph.
///
/// These are fatal for the *operation*: the graph is left unmodified and the
/// caller must not assume partial mutation occurred.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("no edge or complement edge between {source_id} and {target}")]
    #[diagnostic(
        code(frank::graph::missing_edge),
        help(
            "subdivide requires an existing edge (or complement pairing) between \
             the source and target nodes. The graph was not modified."
        )
    )]
    MissingEdge { source_id: String, target: String },

    #[error("node not found: {id}")]
    #[diagnostic(
        code(frank::graph::node_not_found),
        help("The alist id does not exist in this inference graph.")
    )]
    NodeNotFound { id: String },
}

// ---------------------------------------------------------------------------
// Knowledge-source errors
// ---------------------------------------------------------------------------

/// Failures at the knowledge-source boundary.
///
/// The resolution engine catches these at the search boundary, logs them, and
/// treats the source as having found nothing — other sources are still tried.
#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("HTTP request to {source_name} failed: {message}")]
    #[diagnostic(
        code(frank::kb::http),
        help("The knowledge source could not be reached. Check network connectivity.")
    )]
    Http {
        source_name: String,
        message: String,
    },

    #[error("response from {source_name} could not be parsed: {message}")]
    #[diagnostic(
        code(frank::kb::parse),
        help("The knowledge source returned an unexpected payload shape.")
    )]
    Parse {
        source_name: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Engine/session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(frank::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("config file error: {path}: {message}")]
    #[diagnostic(
        code(frank::engine::config_file),
        help("The configuration file could not be read or parsed as TOML.")
    )]
    ConfigFile { path: String, message: String },
}

/// Convenience alias for functions returning frank results.
pub type FrankResult<T> = std::result::Result<T, FrankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_converts_to_frank_error() {
        let err = QueryError::NotAnObject;
        let frank: FrankError = err.into();
        assert!(matches!(frank, FrankError::Query(QueryError::NotAnObject)));
    }

    #[test]
    fn graph_error_display_names_both_endpoints() {
        let err = GraphError::MissingEdge {
            source_id: "0".into(),
            target: "0_".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains('0'));
        assert!(msg.contains("0_"));
    }

    #[test]
    fn kb_error_converts_to_frank_error() {
        let err = KbError::Parse {
            source_name: "wikidata".into(),
            message: "missing field".into(),
        };
        let frank: FrankError = err.into();
        assert!(matches!(frank, FrankError::Kb(KbError::Parse { .. })));
    }
}
