//! Resolution engine: one [`Infer`] per session.
//!
//! Each scheduling step takes a frontier node through the lifecycle
//! UNEXPLORED → EXPLORING → EXPLORED and, once its variables are
//! instantiated (by cross-propagation from its complement, by a knowledge
//! base search, or by aggregation of its children), marks the reduce side
//! REDUCIBLE and propagates values toward the root. Nodes that cannot be
//! instantiated are decomposed instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::alist::{Alist, AttrValue, NodeKind, State, attr, is_var_name};
use crate::config::EngineConfig;
use crate::context::{self, keys};
use crate::graph::{ComplementSide, InferenceGraph};
use crate::kb::{GeoProvider, KnowledgeSource, PropertyRef, Trust};
use crate::map::{self, Decompose, Decomposition, Normalize};
use crate::reduce;
use crate::uncertainty::SourcePriors;

pub struct Infer {
    pub graph: InferenceGraph,
    pub session_id: String,
    /// Updated on every step; the scheduler times out on staleness.
    pub last_heartbeat: Instant,
    /// Deepest node touched so far.
    pub max_depth: usize,
    /// Root-complement snapshots taken each time a value reached the root.
    pub propagated_alists: Vec<Alist>,
    config: EngineConfig,
    sources: Vec<Arc<dyn KnowledgeSource>>,
    strategies: Vec<Box<dyn Decompose>>,
    priors: SourcePriors,
    /// Per-session cache: predicate string → source-specific property refs.
    property_refs: HashMap<String, Vec<(PropertyRef, String)>>,
    /// Source-specific property id → original predicate string.
    reverse_property_refs: HashMap<String, String>,
}

impl Infer {
    pub fn new(
        config: EngineConfig,
        sources: Vec<Arc<dyn KnowledgeSource>>,
        geo: Arc<dyn GeoProvider>,
    ) -> Self {
        let strategies = map::base_strategies(&config, geo);
        let mut priors = SourcePriors::default();
        for source in &sources {
            if let Some(cov) = source.prior_cov() {
                priors = priors.with_prior(source.name(), cov);
            }
        }
        Self {
            graph: InferenceGraph::new(),
            session_id: "0".into(),
            last_heartbeat: Instant::now(),
            max_depth: 0,
            propagated_alists: Vec::new(),
            config,
            sources,
            strategies,
            priors,
            property_refs: HashMap::new(),
            reverse_property_refs: HashMap::new(),
        }
    }

    /// Install the root query node (and its reduce complement).
    pub fn enqueue_root(&mut self, alist: &mut Alist) {
        self.graph.add_alist(alist, true);
    }

    /// One resolution step for a frontier node. Returns the root-complement
    /// snapshots newly propagated by this step (empty when nothing reached
    /// the root).
    pub fn run_frank(&mut self, alist: &Alist) -> Vec<Alist> {
        self.last_heartbeat = Instant::now();
        self.max_depth = self.max_depth.max(alist.meta.depth);
        let mut alist = alist.clone();
        if alist.meta.state == State::Pruned {
            debug!(node = %alist.id, "ignoring pruned node");
            return Vec::new();
        }

        alist.meta.state = State::Exploring;
        self.graph.update(&alist);

        // inspect the complement: a value may already have arrived on the
        // other half of the pair
        let mut twin = self
            .graph
            .complements(&alist.id, ComplementSide::Any)
            .into_iter()
            .next()
            .and_then(|id| self.graph.alist(&id))
            .unwrap_or_else(|| alist.clone());
        twin.check_variables();

        let proj_instantiated = twin.projected_value().is_some();
        let mut opval_instantiated = twin.operation_variable_value().is_some();

        let default_projection = twin
            .projection_variable_names()
            .first()
            .is_some_and(|p| p == attr::PRJVAR);
        if proj_instantiated && !opval_instantiated {
            if default_projection || twin.is_all_instantiated() {
                self.cross_propagate(&alist.id, |node| {
                    if let Some(value) = node.projected_value() {
                        node.set(attr::OPVALUE, value);
                    }
                });
                opval_instantiated = true;
            }
        } else if !proj_instantiated
            && opval_instantiated
            && (default_projection || twin.is_all_instantiated())
        {
            self.cross_propagate(&alist.id, |node| {
                if let Some(value) = node.operation_variable_value() {
                    node.set(attr::PRJVAR, value);
                }
            });
        }

        let mut instantiated = proj_instantiated && opval_instantiated;

        // a root that is already instantiated still needs a data node below
        // it for aggregation to have something to chew on
        if instantiated && self.graph.edge_count() == 1 {
            let map_node = alist.copy(false);
            let mut reduce_node = alist.copy(false);
            reduce_node.meta.state = State::Reduced;
            reduce_node.check_variables();
            let mut data_node = alist.copy(false);
            data_node.meta.state = State::Reduced;
            data_node.check_variables();
            if let Err(err) =
                self.graph
                    .subdivide("0", "0_", map_node, vec![reduce_node], vec![data_node], true, true)
            {
                debug!(%err, "bootstrap subdivision failed");
            }
        }

        if !instantiated {
            instantiated = self.search_kb(&alist);
        }

        let mut propagated = Vec::new();
        if instantiated {
            alist.meta.state = State::Explored;
            self.graph.update(&alist);
            for id in self.graph.complements(&alist.id, ComplementSide::Any) {
                if let Some(node) = self.graph.node_mut(&id) {
                    node.meta.state = State::Reducible;
                }
            }

            let children = self.graph.child_ids(&alist.id, true);
            if children.is_empty() {
                if alist.id == "0" {
                    self.propagate("0_");
                } else if let Some(parent) = self.graph.parent_ids(&alist.id, true).first()
                    && let Some(sibling) = self.graph.child_ids(parent, true).first()
                {
                    self.propagate(&format!("{sibling}_"));
                }
            } else {
                for child in children {
                    for complement in self.graph.complements(&child, ComplementSide::Any) {
                        self.propagate(&complement);
                    }
                }
            }

            // did anything land on the root complement?
            if let Some(mut root_twin) = self.graph.alist("0_") {
                let reached_root = root_twin
                    .projection_variable_names()
                    .first()
                    .is_some_and(|p| root_twin.is_instantiated(p));
                if reached_root {
                    root_twin.meta.state = State::Reduced;
                    self.graph.update(&root_twin);
                    info!(answer = %root_twin, "intermediate answer");
                    propagated.push(root_twin.copy(true));
                    self.propagated_alists.push(root_twin.copy(true));
                }
            }
        } else {
            alist.meta.state = State::Explored;
            self.graph.update(&alist);
            self.decompose(&alist);
        }
        propagated
    }

    /// Apply `fill` to every complement of the node and propagate from each.
    fn cross_propagate(&mut self, id: &str, fill: impl Fn(&mut Alist)) {
        if id.ends_with('_') {
            return;
        }
        for complement in self.graph.complements(id, ComplementSide::Any) {
            if let Some(node) = self.graph.node_mut(&complement) {
                fill(node);
            }
            self.propagate(&complement);
        }
    }

    /// Search the configured knowledge sources for facts instantiating the
    /// alist. Found facts are wired in as an already-reduced lookup subtree.
    /// Returns false when nothing was found ("not yet", never an error).
    fn search_kb(&mut self, alist: &Alist) -> bool {
        self.last_heartbeat = Instant::now();
        // nested sub-queries must be normalized away before any search
        if !alist.uninstantiated_nesting_variables().is_empty() {
            return false;
        }
        debug!(node = %alist.id, %alist, "searching knowledge sources");

        let property = match alist.get(attr::PROPERTY) {
            Some(AttrValue::Str(p)) if !p.is_empty() => p.clone(),
            _ => return false,
        };

        // which slot are we trying to fill?
        let uninstantiated = alist.uninstantiated_attributes();
        let search_attr = [attr::SUBJECT, attr::OBJECT, attr::TIME]
            .into_iter()
            .find(|a| uninstantiated.iter().any(|u| u == a))
            .unwrap_or(attr::SUBJECT);
        let slot_var = match alist.get(search_attr) {
            Some(AttrValue::Var(v)) => Some(v.clone()),
            Some(AttrValue::Str(s)) if is_var_name(s) => Some(s.clone()),
            _ => None,
        };

        let require_high_trust =
            context::context_value(alist, keys::TRUST).as_deref() == Some("high");

        let mut found_facts: Vec<Alist> = Vec::new();
        let sources = self.sources.clone();
        for source in &sources {
            if require_high_trust && source.trust() != Trust::High {
                continue;
            }
            self.last_heartbeat = Instant::now();

            let mut search_alist = alist.copy(false);
            context::inject_retrieval_context(&mut search_alist, source.name());

            // pseudo-properties (e.g. geopolitical membership) bypass the
            // property-reference resolution entirely
            if property.starts_with("__") {
                match source.find_property_values(&search_alist, search_attr) {
                    Ok(facts) => found_facts.extend(facts),
                    Err(err) => warn!(source = source.name(), %err, "search failed"),
                }
                continue;
            }

            self.resolve_property_refs(&property, source.as_ref());
            let refs: Vec<PropertyRef> = self
                .property_refs
                .get(&property)
                .map(|refs| {
                    refs.iter()
                        .filter(|(_, src)| src == source.name())
                        .map(|(r, _)| r.clone())
                        .collect()
                })
                .unwrap_or_default();
            for property_ref in refs {
                self.last_heartbeat = Instant::now();
                search_alist.set(attr::PROPERTY, AttrValue::Str(property_ref.id.clone()));
                match source.find_property_values(&search_alist, search_attr) {
                    Ok(facts) => {
                        let hit = !facts.is_empty();
                        found_facts.extend(facts);
                        if hit {
                            break;
                        }
                    }
                    Err(err) => warn!(source = source.name(), %err, "search failed"),
                }
            }
        }

        if found_facts.is_empty() {
            return false;
        }
        self.last_heartbeat = Instant::now();

        let mut fact_nodes = Vec::new();
        for mut ff in found_facts {
            ff.set_op("value");
            if let Some(v) = alist.get(attr::OPVAR) {
                ff.set(attr::OPVAR, v.clone());
            }
            let value = ff.get(search_attr).cloned().unwrap_or(AttrValue::Empty);
            for opvar in ff.op_var_names() {
                ff.set(&opvar, value.clone());
            }
            ff.set(attr::OPVALUE, value.clone());
            if let Some(var) = &slot_var {
                ff.instantiate_variable(var, value.clone());
            }
            let source_name = ff.meta.data_sources.iter().next().cloned().unwrap_or_default();
            ff.set(attr::COV, AttrValue::Num(self.priors.prior(&source_name)));
            ff.set(attr::EXPLAIN, AttrValue::Empty);
            ff.meta.state = State::Reduced;
            ff.meta.kind = NodeKind::Fact;
            // report the fact under the predicate the user asked about
            if let Some(AttrValue::Str(p)) = ff.get(attr::PROPERTY).cloned()
                && let Some(original) = self.reverse_property_refs.get(&p)
            {
                ff.set(attr::PROPERTY, AttrValue::Str(original.clone()));
            }
            ff.check_variables();
            debug!(fact = %ff, "found");
            fact_nodes.push(ff);
        }

        let mut map_node = alist.copy(false);
        map_node.set_op("lookup");
        if let Some(v) = alist.get(attr::OPVAR) {
            map_node.set(attr::OPVAR, v.clone());
        }
        map_node.meta.kind = NodeKind::Hnode;
        map_node.check_variables();
        let mut reduce_node = alist.copy(false);
        reduce_node.set_op("list");
        reduce_node.meta.kind = NodeKind::Hnode;
        reduce_node.check_variables();

        match self.graph.subdivide(
            &alist.id,
            &format!("{}_", alist.id),
            map_node,
            vec![reduce_node],
            fact_nodes,
            true,
            true,
        ) {
            Ok(_) => true,
            Err(err) => {
                debug!(node = %alist.id, %err, "lookup subdivision failed");
                false
            }
        }
    }

    /// Populate the property-reference cache for a predicate/source pair,
    /// keeping only the top-scoring references.
    fn resolve_property_refs(&mut self, property: &str, source: &dyn KnowledgeSource) {
        let already_resolved = self
            .property_refs
            .get(property)
            .is_some_and(|refs| refs.iter().any(|(_, src)| src == source.name()));
        if already_resolved {
            return;
        }
        let mut props = match source.search_properties(property) {
            Ok(props) => props,
            Err(err) => {
                warn!(source = source.name(), %err, "property search failed");
                return;
            }
        };
        props.sort_by(|a, b| b.score.total_cmp(&a.score));
        let top_score = match props.first() {
            Some(p) => p.score,
            None => {
                self.property_refs.entry(property.to_string()).or_default();
                return;
            }
        };
        let entry = self.property_refs.entry(property.to_string()).or_default();
        for p in props {
            if p.score < top_score {
                break;
            }
            self.reverse_property_refs
                .insert(p.id.clone(), property.to_string());
            entry.push((p, source.name().to_string()));
        }
    }

    /// Strategies to try for an alist: normalization is forced whenever
    /// nested sub-queries remain, otherwise the base set in shuffled order.
    fn decompose(&mut self, alist: &Alist) {
        self.last_heartbeat = Instant::now();
        if alist.meta.depth + 1 > self.config.max_depth {
            debug!(node = %alist.id, depth = alist.meta.depth, "max depth reached");
            return;
        }
        if !alist.uninstantiated_nesting_variables().is_empty() {
            let result = Normalize.decompose(alist);
            self.wire_decomposition(alist, "normalize", result);
            return;
        }
        let mut order: Vec<usize> = (0..self.strategies.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        for i in order {
            let result = self.strategies[i].decompose(alist);
            let name = self.strategies[i].name();
            self.wire_decomposition(alist, name, result);
        }
    }

    fn wire_decomposition(&mut self, alist: &Alist, name: &str, result: Option<Decomposition>) {
        let Some(decomposition) = result else { return };
        match self.graph.subdivide(
            &alist.id,
            &format!("{}_", alist.id),
            decomposition.map_op_node,
            decomposition.reduce_op_nodes,
            decomposition.successors,
            false,
            false,
        ) {
            Ok(map_id) => info!(node = %alist.id, strategy = name, head = %map_id, "decomposed"),
            Err(err) => debug!(node = %alist.id, strategy = name, %err, "decomposition not wired"),
        }
    }

    /// Aggregate the reducible parents of a reduce node by its operator.
    /// Returns false when the node is not yet reducible.
    fn aggregate(&mut self, alist_id: &str) -> bool {
        self.last_heartbeat = Instant::now();
        let Some(alist) = self.graph.alist(alist_id) else {
            return false;
        };
        debug!(node = %alist.id, op = %alist.op(), "reducing");
        let Some(reduce_op) = reduce::lookup(&alist.op()) else {
            warn!(node = %alist.id, op = %alist.op(), "no reducer registered");
            return false;
        };

        let predecessors = self.graph.parent_alists(&alist.id);
        let reducibles: Vec<Alist> = predecessors
            .iter()
            .filter(|x| {
                matches!(x.meta.state, State::Reducible | State::Reduced) && x.op() != "comp"
            })
            .cloned()
            .collect();

        if reducibles.is_empty() {
            // a node whose own projection resolved elsewhere reduces to itself
            let mut node = alist;
            if let Some(value) = node.projected_value() {
                node.instantiate_variable(attr::OPVALUE, value);
                node.meta.state = State::Reduced;
                self.graph.update(&node);
                self.mark_complements_explored(&node.id);
                return true;
            }
            return false;
        }

        let unexplored = predecessors
            .iter()
            .filter(|x| x.meta.state == State::Unexplored)
            .count();
        if unexplored == predecessors.len() {
            return false;
        }

        let mut node = alist;
        if reduce_op.reduce(&mut node, &reducibles, &mut self.graph).is_none() {
            debug!(node = %node.id, "reduce not yet possible");
            return false;
        }

        for predecessor in &predecessors {
            for source in &predecessor.meta.data_sources {
                node.meta.data_sources.insert(source.clone());
            }
        }
        for r in &reducibles {
            if let Some(n) = self.graph.node_mut(&r.id) {
                n.meta.state = State::Reduced;
            }
        }
        if node.meta.state != State::Reduced {
            node.meta.state = State::Reducible; // rechecked when its own reduce node runs
            self.mark_complements_explored(&node.id);
        }
        self.graph.update(&node);
        debug!(node = %node.id, %node, "reduced");
        true
    }

    fn mark_complements_explored(&mut self, id: &str) {
        for complement in self.graph.complements(id, ComplementSide::Any) {
            if let Some(n) = self.graph.node_mut(&complement) {
                n.meta.state = State::Explored;
            }
        }
    }

    /// Push values toward the root: aggregate the starting node and walk the
    /// successor chain of every node that reduced, as a worklist rather than
    /// recursion (graphs can be rewritten mid-walk by the comp operator).
    pub fn propagate(&mut self, alist_id: &str) -> bool {
        self.last_heartbeat = Instant::now();
        debug!(node = alist_id, "propagating");
        let mut worklist = VecDeque::from([alist_id.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut first_result = None;
        while let Some(id) = worklist.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let reduced = self.aggregate(&id);
            if first_result.is_none() {
                first_result = Some(reduced);
            }
            if !reduced {
                continue;
            }
            for successor in self.graph.child_alists(&id) {
                // aggregation happens on reduce-side nodes only
                let next = if successor.id.contains('_') {
                    successor.id
                } else {
                    match self
                        .graph
                        .complements(&successor.id, ComplementSide::Any)
                        .into_iter()
                        .next()
                    {
                        Some(c) => c,
                        None => continue,
                    }
                };
                if !visited.contains(&next) {
                    worklist.push_back(next);
                }
            }
        }
        first_result.unwrap_or(false)
    }
}
