//! Session scheduler.
//!
//! A [`Launcher`] runs one inference session per call (or per spawned
//! thread): it injects the query context, installs the root node, then loops
//! over the frontier preferring reducible nodes over unexplored ones, always
//! lowest cost first. The loop stops on heartbeat timeout, cooperative
//! cancellation through the shared [`SessionRegistry`], or a drained
//! frontier, and finalizes an [`AnswerSnapshot`] either way.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::alist::{Alist, AttrValue, State, attr};
use crate::config::EngineConfig;
use crate::context;
use crate::infer::Infer;
use crate::kb::{GeoProvider, KnowledgeSource};

/// The answer state of a session at some point in time.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSnapshot {
    pub answer: String,
    pub error_bar: f64,
    pub sources: String,
    pub elapsed_time: String,
    pub alist: Value,
}

pub const NO_ANSWER: &str = "No answer found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Cancel,
}

/// Per-session slot in the shared registry.
#[derive(Debug, Default)]
pub struct SessionEntry {
    pub command: Option<SessionCommand>,
    /// Latest graph export, refreshed on every snapshot.
    pub graph: Option<Value>,
    /// Best answer so far, refreshed on every propagation to the root.
    pub intermediate_answer: Option<AnswerSnapshot>,
    /// Set only when the session has finished.
    pub answer: Option<AnswerSnapshot>,
}

/// Shared map of session id → session entry. The registry is the only
/// process-wide shared state; cloning it is cheap and all clones observe the
/// same sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask a running session to stop after its current step.
    pub fn cancel(&self, session_id: &str) {
        self.inner.entry(session_id.to_string()).or_default().command =
            Some(SessionCommand::Cancel);
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.inner
            .get(session_id)
            .is_some_and(|entry| entry.command == Some(SessionCommand::Cancel))
    }

    /// Final answer, present only once the session finished.
    pub fn answer(&self, session_id: &str) -> Option<AnswerSnapshot> {
        self.inner.get(session_id)?.answer.clone()
    }

    pub fn intermediate_answer(&self, session_id: &str) -> Option<AnswerSnapshot> {
        self.inner.get(session_id)?.intermediate_answer.clone()
    }

    pub fn graph(&self, session_id: &str) -> Option<Value> {
        self.inner.get(session_id)?.graph.clone()
    }

    fn record(&self, session_id: &str, graph: Value, snapshot: AnswerSnapshot, is_final: bool) {
        let mut entry = self.inner.entry(session_id.to_string()).or_default();
        entry.graph = Some(graph);
        entry.intermediate_answer = Some(snapshot.clone());
        if is_final {
            entry.answer = Some(snapshot);
        }
    }
}

/// Round to the given number of significant digits.
fn sig_dig(x: f64, digits: usize) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return 0.0;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits as i32 - 1 - magnitude);
    (x * factor).round() / factor
}

#[derive(Clone)]
pub struct Launcher {
    config: EngineConfig,
    registry: SessionRegistry,
    sources: Vec<Arc<dyn KnowledgeSource>>,
    geo: Arc<dyn GeoProvider>,
}

impl Launcher {
    pub fn new(
        config: EngineConfig,
        registry: SessionRegistry,
        sources: Vec<Arc<dyn KnowledgeSource>>,
        geo: Arc<dyn GeoProvider>,
    ) -> Self {
        Self {
            config,
            registry,
            sources,
            geo,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run a session to completion on the calling thread.
    pub fn start(&self, question: &str, query: &Alist, session_id: &str) -> AnswerSnapshot {
        let started = Instant::now();
        info!(session = session_id, question, "session started");

        let mut infer = Infer::new(
            self.config.clone(),
            self.sources.clone(),
            Arc::clone(&self.geo),
        );
        infer.session_id = session_id.to_string();
        let mut root = query.clone();
        context::inject_query_context(&mut root);
        root.check_variables();
        infer.enqueue_root(&mut root);

        self.schedule(&mut infer, started)
    }

    /// Run a session on a background thread; the result lands in the
    /// registry under the returned session id.
    pub fn spawn(&self, question: &str, query: &Alist) -> String {
        let session_id = format!("{:016x}", rand::random::<u64>());
        let launcher = self.clone();
        let question = question.to_string();
        let query = query.clone();
        let id = session_id.clone();
        thread::spawn(move || {
            launcher.start(&question, &query, &id);
        });
        session_id
    }

    fn schedule(&self, infer: &mut Infer, started: Instant) -> AnswerSnapshot {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let idle_pause = Duration::from_millis(self.config.idle_pause_ms);
        loop {
            if self.registry.is_cancelled(&infer.session_id) {
                info!(session = %infer.session_id, "session cancelled");
                break;
            }
            if infer.last_heartbeat.elapsed() > timeout {
                info!(session = %infer.session_id, "session timed out");
                break;
            }

            // reducible nodes first: a value that can move toward the root
            // beats opening new branches
            let (reducible, _) = infer.graph.frontier(State::Reducible, None);
            let next = reducible
                .into_iter()
                .next()
                .or_else(|| infer.graph.frontier(State::Unexplored, None).0.into_iter().next());
            let Some(node) = next else {
                // frontier drained; one idle pause before finalizing, so a
                // cancel or late cache write can still land in interactive use
                thread::sleep(idle_pause);
                let (reducible, _) = infer.graph.frontier(State::Reducible, None);
                let (unexplored, _) = infer.graph.frontier(State::Unexplored, None);
                if reducible.is_empty() && unexplored.is_empty() {
                    break;
                }
                continue;
            };

            debug!(session = %infer.session_id, node = %node.id, cost = node.meta.cost, "scheduling");
            let propagated = infer.run_frank(&node);
            if !propagated.is_empty() {
                let snapshot = self.snapshot(infer, started);
                self.registry
                    .record(&infer.session_id, infer.graph.export(false), snapshot, false);
            }
        }

        let snapshot = self.snapshot(infer, started);
        self.registry
            .record(&infer.session_id, infer.graph.export(false), snapshot.clone(), true);
        info!(session = %infer.session_id, answer = %snapshot.answer, "session finished");
        snapshot
    }

    /// Build the answer snapshot from the latest root-complement propagation.
    fn snapshot(&self, infer: &Infer, started: Instant) -> AnswerSnapshot {
        let elapsed_time = format!("{}s", started.elapsed().as_secs());
        let Some(latest) = infer.propagated_alists.last() else {
            return AnswerSnapshot {
                answer: NO_ANSWER.into(),
                error_bar: 0.0,
                sources: String::new(),
                elapsed_time,
                alist: Value::Null,
            };
        };

        let answer = latest
            .projection_variable_names()
            .first()
            .and_then(|pv| latest.instantiation_value(pv))
            .or_else(|| latest.get(attr::OPVALUE).cloned())
            .map(|v| v.display_string())
            .unwrap_or_else(|| NO_ANSWER.into());
        let cov = latest
            .get(attr::COV)
            .and_then(|v| v.as_number())
            .unwrap_or(0.0);
        let numeric_answer = AttrValue::Str(answer.clone()).as_number().unwrap_or(0.0);
        let error_bar = sig_dig(cov * numeric_answer, self.config.errorbar_sigdig);

        AnswerSnapshot {
            answer,
            error_bar,
            sources: latest
                .meta
                .data_sources
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
            elapsed_time,
            alist: latest.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::StaticSource;
    use serde_json::json;

    fn launcher(source: StaticSource) -> Launcher {
        let source = Arc::new(source);
        let config = EngineConfig {
            timeout_secs: 5,
            idle_pause_ms: 10,
            ..EngineConfig::default()
        };
        Launcher::new(config, SessionRegistry::new(), vec![source.clone()], source)
    }

    fn query(s: &str, p: &str) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": s, "p": p, "o": "?y"
        }))
        .unwrap();
        a.check_variables();
        a
    }

    #[test]
    fn resolved_session_finalizes_the_answer() {
        let mut source = StaticSource::new("testdata");
        source.add_fact("France", "capital", "Paris");
        let launcher = launcher(source);
        let snapshot = launcher.start("capital of France", &query("France", "capital"), "s1");
        assert_eq!(snapshot.answer, "Paris");
        assert_eq!(snapshot.error_bar, 0.0);
        assert!(snapshot.sources.contains("testdata"));
        let final_answer = launcher.registry().answer("s1").unwrap();
        assert_eq!(final_answer.answer, "Paris");
        assert!(launcher.registry().graph("s1").is_some());
    }

    #[test]
    fn unanswerable_session_reports_no_answer() {
        let launcher = launcher(StaticSource::new("empty"));
        let snapshot = launcher.start("capital of Narnia", &query("Narnia", "capital"), "s2");
        assert_eq!(snapshot.answer, NO_ANSWER);
        assert_eq!(snapshot.error_bar, 0.0);
    }

    #[test]
    fn cancelled_session_stops_with_current_best() {
        let launcher = launcher(StaticSource::new("empty"));
        launcher.registry().cancel("s3");
        let snapshot = launcher.start("anything", &query("Narnia", "capital"), "s3");
        assert_eq!(snapshot.answer, NO_ANSWER);
        assert!(launcher.registry().answer("s3").is_some());
    }

    #[test]
    fn sig_dig_rounds_to_significant_digits() {
        assert_eq!(sig_dig(12345.0, 2), 12000.0);
        assert_eq!(sig_dig(0.04567, 2), 0.046);
        assert_eq!(sig_dig(0.0, 2), 0.0);
    }
}
