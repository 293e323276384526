//! The inference graph: a directed graph of alists with labeled edges.
//!
//! Nodes live in a stable arena; alist ids are strings encoding lineage
//! (`{depth+1}{parent_id}{ordinal}`, with a trailing `_` for the reduce-side
//! complement of a node pair). Edges carry three flags: `frontier` marks the
//! active search boundary, `hidden` preserves provenance after an edge is
//! subdivided, and `complement` pairs a map node with its reduce twin.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::all_simple_paths;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::Serialize;
use serde_json::{Value, json};

use crate::alist::{Alist, NodeKind, State};
use crate::error::GraphError;

/// Edge annotations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EdgeData {
    pub label: String,
    pub frontier: bool,
    pub hidden: bool,
    pub complement: bool,
}

impl EdgeData {
    pub fn labeled(label: &str) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Frontier complement edge: pairs a map node with its reduce twin.
    pub fn frontier_complement() -> Self {
        Self {
            frontier: true,
            complement: true,
            ..Default::default()
        }
    }

    /// Hidden complement edge: provenance link from a decomposition head to
    /// its reduce node.
    pub fn hidden_complement() -> Self {
        Self {
            hidden: true,
            complement: true,
            ..Default::default()
        }
    }
}

/// Which half of a complement pairing to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplementSide {
    Any,
    /// Outgoing complement edges of a map node.
    Map,
    /// Incoming complement edges of a reduce node.
    Reduce,
}

/// Directed graph of alists.
#[derive(Debug, Default)]
pub struct InferenceGraph {
    g: StableDiGraph<Alist, EdgeData>,
    ids: HashMap<String, NodeIndex>,
}

impl InferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.g.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.g.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Clone of the alist with the given id.
    pub fn alist(&self, id: &str) -> Option<Alist> {
        let idx = self.ids.get(id)?;
        self.g.node_weight(*idx).cloned()
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Alist> {
        let idx = self.ids.get(id)?;
        self.g.node_weight_mut(*idx)
    }

    /// Write a (possibly mutated) clone back into the arena.
    pub fn update(&mut self, alist: &Alist) {
        if let Some(idx) = self.ids.get(&alist.id) {
            self.g[*idx] = alist.clone();
        }
    }

    /// Insert or replace an alist. The first node added to an empty graph
    /// becomes the root and is forced to id `0`. With `create_complement`,
    /// a reduce-side twin (`id_`) is linked behind a frontier complement edge.
    pub fn add_alist(&mut self, alist: &mut Alist, create_complement: bool) {
        if self.g.node_count() == 0 {
            alist.id = "0".into();
        }
        self.upsert(alist);
        if create_complement {
            let mut twin = alist.copy(false);
            twin.id = format!("{}_", alist.id);
            twin.meta.is_map = false;
            twin.check_variables();
            self.upsert(&twin);
            self.set_edge(&alist.id.clone(), &twin.id.clone(), EdgeData::frontier_complement());
        }
    }

    fn upsert(&mut self, alist: &Alist) {
        if let Some(idx) = self.ids.get(&alist.id) {
            self.g[*idx] = alist.clone();
        } else {
            let idx = self.g.add_node(alist.clone());
            self.ids.insert(alist.id.clone(), idx);
        }
    }

    fn set_edge(&mut self, source: &str, target: &str, data: EdgeData) {
        let (Some(&s), Some(&t)) = (self.ids.get(source), self.ids.get(target)) else {
            return;
        };
        if let Some(edge) = self.g.find_edge(s, t) {
            self.g[edge] = data;
        } else {
            self.g.add_edge(s, t, data);
        }
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.ids.get(source), self.ids.get(target)) {
            (Some(&s), Some(&t)) => self.g.find_edge(s, t).is_some(),
            _ => false,
        }
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&EdgeData> {
        let (&s, &t) = (self.ids.get(source)?, self.ids.get(target)?);
        let edge = self.g.find_edge(s, t)?;
        self.g.edge_weight(edge)
    }

    fn edge_mut(&mut self, source: &str, target: &str) -> Option<&mut EdgeData> {
        let (&s, &t) = (self.ids.get(source)?, self.ids.get(target)?);
        let edge = self.g.find_edge(s, t)?;
        self.g.edge_weight_mut(edge)
    }

    /// Link a fresh child under a parent, assigning the child a lineage id
    /// `{parent_depth+1}{parent_id}{ordinal}` (bumped past collisions).
    /// Returns the assigned child id.
    pub fn link(
        &mut self,
        parent_id: &str,
        child: &mut Alist,
        label: &str,
    ) -> Result<String, GraphError> {
        let parent = self.alist(parent_id).ok_or_else(|| GraphError::NodeNotFound {
            id: parent_id.to_string(),
        })?;
        let siblings: HashSet<String> = self.child_ids(parent_id, true).into_iter().collect();
        child.meta.depth = parent.meta.depth + 1;
        let base = siblings.len() + 1;
        let mut ordinal = base;
        let mut cid = format!("{}{}{}", parent.meta.depth + 1, parent_id, ordinal);
        while siblings.contains(&cid) || self.contains(&cid) {
            ordinal += 1;
            cid = format!("{}{}{}", parent.meta.depth + 1, parent_id, ordinal);
        }
        child.id = cid.clone();
        self.upsert(child);
        self.set_edge(parent_id, &cid, EdgeData::labeled(label));
        Ok(cid)
    }

    /// Link two nodes keeping the child's id, upserting the child node and
    /// the edge annotations.
    pub fn link_with(&mut self, parent_id: &str, child: &Alist, data: EdgeData) {
        self.upsert(child);
        self.set_edge(parent_id, &child.id, data);
    }

    pub fn remove_link(&mut self, parent_id: &str, child_id: &str) {
        let (Some(&s), Some(&t)) = (self.ids.get(parent_id), self.ids.get(child_id)) else {
            return;
        };
        if let Some(edge) = self.g.find_edge(s, t) {
            self.g.remove_edge(edge);
        }
    }

    /// Parent ids; complement pairings excluded unless asked for.
    pub fn parent_ids(&self, id: &str, exclude_complement: bool) -> Vec<String> {
        let Some(&idx) = self.ids.get(id) else {
            return Vec::new();
        };
        self.g
            .neighbors_directed(idx, Direction::Incoming)
            .filter(|&p| {
                if !exclude_complement {
                    return true;
                }
                self.g
                    .find_edge(p, idx)
                    .and_then(|e| self.g.edge_weight(e))
                    .is_some_and(|d| !d.complement)
            })
            .map(|p| self.g[p].id.clone())
            .collect()
    }

    pub fn child_ids(&self, id: &str, exclude_complement: bool) -> Vec<String> {
        let Some(&idx) = self.ids.get(id) else {
            return Vec::new();
        };
        self.g
            .neighbors_directed(idx, Direction::Outgoing)
            .filter(|&c| {
                if !exclude_complement {
                    return true;
                }
                self.g
                    .find_edge(idx, c)
                    .and_then(|e| self.g.edge_weight(e))
                    .is_some_and(|d| !d.complement)
            })
            .map(|c| self.g[c].id.clone())
            .collect()
    }

    pub fn parent_alists(&self, id: &str) -> Vec<Alist> {
        self.parent_ids(id, true)
            .iter()
            .filter_map(|p| self.alist(p))
            .collect()
    }

    pub fn child_alists(&self, id: &str) -> Vec<Alist> {
        self.child_ids(id, true)
            .iter()
            .filter_map(|c| self.alist(c))
            .collect()
    }

    /// Complement partners of a node. A map node's partners sit behind its
    /// outgoing complement edges (only nodes without `_` in the id have a map
    /// side); a reduce node's partners sit behind incoming complement edges.
    pub fn complements(&self, id: &str, side: ComplementSide) -> Vec<String> {
        let mut found = Vec::new();
        if matches!(side, ComplementSide::Any | ComplementSide::Map) && !id.contains('_') {
            for child in self.child_ids(id, false) {
                if self.edge(id, &child).is_some_and(|d| d.complement) {
                    found.push(child);
                }
            }
        }
        if matches!(side, ComplementSide::Any | ComplementSide::Reduce) {
            for parent in self.parent_ids(id, false) {
                if self.edge(&parent, id).is_some_and(|d| d.complement) {
                    found.push(parent);
                }
            }
        }
        found
    }

    /// Frontier scan: endpoints of frontier edges whose state matches,
    /// split into (map nodes, reduce nodes) and sorted by ascending cost.
    /// With `advance`, matched nodes are moved to the new state in place.
    pub fn frontier(&mut self, state: State, advance: Option<State>) -> (Vec<Alist>, Vec<Alist>) {
        let frontier_pairs: Vec<(String, String)> = self
            .g
            .edge_indices()
            .filter(|&e| self.g[e].frontier)
            .filter_map(|e| self.g.edge_endpoints(e))
            .map(|(u, v)| (self.g[u].id.clone(), self.g[v].id.clone()))
            .collect();

        let mut map_nodes = Vec::new();
        let mut reduce_nodes = Vec::new();
        for (u, v) in frontier_pairs {
            for (id, bucket) in [(u, &mut map_nodes), (v, &mut reduce_nodes)] {
                let Some(node) = self.node_mut(&id) else { continue };
                if node.meta.state == state {
                    if let Some(next) = advance {
                        node.meta.state = next;
                    }
                    bucket.push(node.clone());
                }
            }
        }
        map_nodes.sort_by(|a, b| a.meta.cost.total_cmp(&b.meta.cost));
        reduce_nodes.sort_by(|a, b| a.meta.cost.total_cmp(&b.meta.cost));
        (map_nodes, reduce_nodes)
    }

    /// Subdivide the edge between a node pair to insert a decomposition:
    /// the existing edge is hidden, a map head is linked under the source,
    /// reduce nodes (`{map_id}_{n}_`) are wired map→reduce (hidden complement)
    /// and reduce→target, and each successor gets its own frontier complement
    /// twin feeding every reduce node (unless `no_reduce`, where successors
    /// feed the reduce nodes directly).
    ///
    /// Fails without modifying the graph when no edge joins the pair.
    /// Returns the id assigned to the map head.
    #[allow(clippy::too_many_arguments)]
    pub fn subdivide(
        &mut self,
        source_id: &str,
        target_id: &str,
        mut map_op_node: Alist,
        reduce_op_nodes: Vec<Alist>,
        successors: Vec<Alist>,
        successor_same_states: bool,
        successor_no_reduce: bool,
    ) -> Result<String, GraphError> {
        match self.edge_mut(source_id, target_id) {
            Some(edge) => edge.hidden = true,
            None => {
                return Err(GraphError::MissingEdge {
                    source_id: source_id.to_string(),
                    target: target_id.to_string(),
                });
            }
        }
        if let Some(node) = self.node_mut(source_id) {
            node.meta.is_frontier = false;
        }
        if let Some(node) = self.node_mut(target_id) {
            node.meta.is_frontier = false;
        }

        let map_id = self.link(source_id, &mut map_op_node, "")?;

        let mut reduce_ids = Vec::new();
        for (n, mut reduce) in reduce_op_nodes.into_iter().enumerate() {
            reduce.id = format!("{}_{}_", map_id, n + 1);
            reduce.meta.is_map = false;
            reduce.meta.kind = NodeKind::Hnode;
            self.link_with(&map_id, &reduce, EdgeData::hidden_complement());
            let target = self.alist(target_id).ok_or_else(|| GraphError::NodeNotFound {
                id: target_id.to_string(),
            })?;
            self.link_with(&reduce.id, &target, EdgeData::default());
            reduce_ids.push(reduce.id);
        }

        for mut succ in successors {
            succ.meta.is_frontier = true;
            let sid = self.link(&map_id, &mut succ, "")?;
            if successor_no_reduce {
                for rid in &reduce_ids {
                    let reduce = self.alist(rid).ok_or_else(|| GraphError::NodeNotFound {
                        id: rid.clone(),
                    })?;
                    self.link_with(&sid, &reduce, EdgeData::default());
                }
            } else {
                let mut twin = succ.copy(successor_same_states);
                twin.id = format!("{sid}_");
                twin.check_variables();
                twin.meta.is_map = false;
                twin.meta.is_frontier = true;
                self.link_with(&sid, &twin, EdgeData::frontier_complement());
                for rid in &reduce_ids {
                    let reduce = self.alist(rid).ok_or_else(|| GraphError::NodeNotFound {
                        id: rid.clone(),
                    })?;
                    self.link_with(&twin.id, &reduce, EdgeData::default());
                }
            }
        }
        Ok(map_id)
    }

    /// Remove a node pair's entire branch: every node on any simple path from
    /// the map-side node to each of its complement partners.
    pub fn prune(&mut self, id: &str) {
        let source = id.strip_suffix('_').unwrap_or(id).to_string();
        let targets = self.complements(id, ComplementSide::Any);
        let Some(&source_idx) = self.ids.get(&source) else {
            return;
        };
        let mut doomed: HashSet<NodeIndex> = HashSet::new();
        for target in targets {
            let Some(&target_idx) = self.ids.get(&target) else {
                continue;
            };
            for path in
                all_simple_paths::<Vec<NodeIndex>, _>(&self.g, source_idx, target_idx, 0, None)
            {
                doomed.extend(path);
            }
        }
        for idx in doomed {
            let removed = self.g.remove_node(idx);
            if let Some(alist) = removed {
                self.ids.remove(&alist.id);
            }
        }
    }

    /// Serialize nodes and edges for UI tools and session snapshots.
    pub fn export(&self, show_hidden_edges: bool) -> Value {
        let nodes: Vec<Value> = self
            .g
            .node_indices()
            .map(|i| self.g[i].to_json_with_meta())
            .collect();
        let edges: Vec<Value> = self
            .g
            .edge_indices()
            .filter(|&e| show_hidden_edges || !self.g[e].hidden)
            .filter_map(|e| {
                let (u, v) = self.g.edge_endpoints(e)?;
                let data = &self.g[e];
                Some(json!({
                    "source": self.g[u].id,
                    "target": self.g[v].id,
                    "label": data.label,
                    "frontier": data.frontier,
                    "hidden": data.hidden,
                    "complement": data.complement,
                }))
            })
            .collect();
        json!({ "nodes": nodes, "edges": edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alist::attr;
    use serde_json::json;

    fn query() -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "France", "p": "capital", "o": "?y"
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn child(op: &str) -> Alist {
        let mut a = query();
        a.set_op(op);
        a
    }

    #[test]
    fn root_gets_id_zero_and_complement_twin() {
        let mut g = InferenceGraph::new();
        let mut root = query();
        root.id = "999".into();
        g.add_alist(&mut root, true);
        assert_eq!(root.id, "0");
        assert!(g.contains("0"));
        assert!(g.contains("0_"));
        let edge = g.edge("0", "0_").unwrap();
        assert!(edge.frontier && edge.complement && !edge.hidden);
        assert!(!g.alist("0_").unwrap().meta.is_map);
    }

    #[test]
    fn link_assigns_lineage_ids() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        let first = g.link("0", &mut child("value"), "").unwrap();
        let second = g.link("0", &mut child("value"), "").unwrap();
        assert_eq!(first, "101");
        assert_eq!(second, "102");
        assert_eq!(g.alist(&first).unwrap().meta.depth, 1);
    }

    #[test]
    fn subdivide_requires_an_edge() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        let mut stray = child("value");
        stray.id = "x".into();
        g.add_alist(&mut stray, false);
        let err = g.subdivide("0", "x", child("lookup"), vec![child("value")], vec![], false, false);
        assert!(matches!(err, Err(GraphError::MissingEdge { .. })));
        // graph untouched
        assert!(!g.edge("0", "0_").unwrap().hidden);
    }

    #[test]
    fn subdivide_hides_edge_and_wires_complements() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        let map_id = g
            .subdivide(
                "0",
                "0_",
                child("temporal"),
                vec![child("value")],
                vec![child("value"), child("value")],
                false,
                false,
            )
            .unwrap();

        assert!(g.edge("0", "0_").unwrap().hidden);
        let reduce_id = format!("{map_id}_1_");
        assert!(g.contains(&reduce_id));
        assert!(g.edge(&map_id, &reduce_id).unwrap().hidden);
        assert!(g.edge(&map_id, &reduce_id).unwrap().complement);
        assert!(g.has_edge(&reduce_id, "0_"));

        // each successor carries its own frontier twin feeding the reduce node
        let successors: Vec<String> = g
            .child_ids(&map_id, true)
            .into_iter()
            .filter(|c| !c.ends_with('_'))
            .collect();
        assert_eq!(successors.len(), 2);
        for s in &successors {
            let twin = format!("{s}_");
            assert!(g.edge(s, &twin).unwrap().frontier);
            assert!(g.has_edge(&twin, &reduce_id));
        }
    }

    #[test]
    fn frontier_matches_state_and_sorts_by_cost() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        g.subdivide(
            "0",
            "0_",
            child("temporal"),
            vec![child("value")],
            vec![child("value"), child("value")],
            false,
            false,
        )
        .unwrap();
        // root pair already explored; only successor pairs remain
        g.node_mut("0").unwrap().meta.state = State::Explored;
        g.node_mut("0_").unwrap().meta.state = State::Explored;

        let (maps, reduces) = g.frontier(State::Unexplored, Some(State::Exploring));
        assert_eq!(maps.len(), 2);
        assert_eq!(reduces.len(), 2);
        assert!(maps.windows(2).all(|w| w[0].meta.cost <= w[1].meta.cost));
        for m in &maps {
            assert_eq!(g.alist(&m.id).unwrap().meta.state, State::Exploring);
        }
    }

    #[test]
    fn prune_removes_branch_between_complements() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        g.subdivide(
            "0",
            "0_",
            child("temporal"),
            vec![child("value")],
            vec![child("value")],
            false,
            false,
        )
        .unwrap();
        let before = g.node_count();
        let succ: Vec<String> = g
            .child_ids("101", true)
            .into_iter()
            .filter(|c| !c.ends_with('_'))
            .collect();
        g.prune(&succ[0]);
        assert!(g.node_count() < before);
        assert!(!g.contains(&succ[0]));
        assert!(!g.contains(&format!("{}_", succ[0])));
        assert!(g.contains("0"));
        assert!(g.contains("0_"));
    }

    #[test]
    fn export_can_hide_provenance_edges() {
        let mut g = InferenceGraph::new();
        g.add_alist(&mut query(), true);
        g.subdivide("0", "0_", child("temporal"), vec![child("value")], vec![child("value")], false, false)
            .unwrap();
        let all = g.export(true);
        let visible = g.export(false);
        let count = |v: &Value| v["edges"].as_array().unwrap().len();
        assert!(count(&visible) < count(&all));
    }
}
