//! Set-comprehension reducer. Intersects the value sets of parallel
//! normalization branches and, on a non-empty intersection, rewrites the
//! graph: the superseded branch children are pruned and a fresh sibling
//! subtree is linked in with exactly one child per intersection member.
//!
//! This is the only reducer with a side effect beyond the node it reduces.

use std::collections::BTreeSet;

use tracing::debug;

use crate::alist::{Alist, AttrValue, NodeKind, State, attr, is_var_name};
use crate::graph::{ComplementSide, EdgeData, InferenceGraph};

use super::{Reduce, encode_list};

pub struct Comp;

/// Value set of one branch: a JSON-list-shaped projection contributes its
/// elements, anything else contributes itself.
fn branch_values(node: &Alist) -> Option<BTreeSet<String>> {
    let value = node.projected_value()?;
    Some(match value.as_json_list() {
        Some(items) => items.iter().map(|v| v.display_string()).collect(),
        None => BTreeSet::from([value.display_string()]),
    })
}

impl Reduce for Comp {
    fn name(&self) -> &'static str {
        "comp"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        graph: &mut InferenceGraph,
    ) -> Option<()> {
        if children.is_empty() {
            return None;
        }

        let mut common: Option<BTreeSet<String>> = None;
        for child in children.iter().filter(|c| c.op() != "comp") {
            let values = branch_values(child)?;
            common = Some(match common {
                Some(acc) => acc.intersection(&values).cloned().collect(),
                None => values,
            });
        }
        let common = common?;
        if common.is_empty() {
            return None;
        }

        let members: Vec<String> = common.into_iter().collect();
        let joined = if members.len() == 1 {
            let only = &members[0];
            match AttrValue::Str(only.clone()).as_json_list() {
                // a single member that is itself a list stays list-shaped
                Some(items) => encode_list(&items),
                None => AttrValue::from(only.clone()),
            }
        } else {
            encode_list(
                &members
                    .iter()
                    .map(|m| AttrValue::from(m.clone()))
                    .collect::<Vec<_>>(),
            )
        };

        let opvar = node.op_var_names().into_iter().next()?;
        node.instantiate_variable(attr::OPVALUE, joined.clone());
        node.instantiate_variable(&opvar, joined.clone());

        // locate the normalized parent pair this branch hangs off
        let head_id = graph
            .complements(&node.id, ComplementSide::Reduce)
            .into_iter()
            .next()?;
        let parent_id = graph.parent_ids(&head_id, true).into_iter().next()?;
        let parent = graph.alist(&parent_id)?;
        let parent_twin_id = graph
            .complements(&parent_id, ComplementSide::Map)
            .into_iter()
            .next()?;
        let parent_twin = graph.alist(&parent_twin_id)?;
        let superseded = graph.child_ids(&head_id, true);

        // fresh sibling subtree applying the parent's own operation to the
        // intersection members
        let mut new_head = parent.copy(false);
        new_head.set(&opvar, AttrValue::Empty);
        if let Some(v) = parent.get(attr::OPVAR) {
            new_head.set(attr::OPVAR, v.clone());
        }
        new_head.meta.state = State::Explored;
        new_head.meta.data_sources = node.meta.data_sources.clone();
        new_head.meta.kind = NodeKind::Hnode;
        new_head.check_variables();
        new_head.instantiate_variable(&opvar, joined.clone());

        let mut new_reduce = parent.copy(false);
        new_reduce.set_op(&parent_twin.op());
        new_reduce.meta.data_sources = node.meta.data_sources.clone();
        new_reduce.meta.kind = NodeKind::Hnode;
        new_reduce.check_variables();
        new_reduce.instantiate_variable(&opvar, joined.clone());

        let template = new_head.copy(false);
        let child_opvar = match template.get(attr::OPVAR) {
            // argument-carrying forms like rank($x, k): children only take
            // the variable itself
            Some(AttrValue::List(items))
                if template.op_var_names().len() == 1 && items.len() > 1 =>
            {
                AttrValue::Var(template.op_var_names().remove(0))
            }
            Some(v) => v.clone(),
            None => AttrValue::Var(opvar.clone()),
        };
        let mut successors = Vec::new();
        for member in &members {
            let mut succ = template.copy(false);
            succ.set_op("value");
            succ.set(attr::OPVAR, child_opvar.clone());
            succ.set(&opvar, AttrValue::from(member.clone()));
            succ.instantiate_variable(&opvar, AttrValue::from(member.clone()));
            for reference in succ.variable_references(&opvar) {
                if reference != attr::OPVAR && is_var_name(&opvar) {
                    succ.set(&reference, AttrValue::from(member.clone()));
                }
            }
            succ.meta.data_sources = node.meta.data_sources.clone();
            succ.meta.kind = NodeKind::Znode;
            succ.check_variables();
            successors.push(succ);
        }

        let new_head_id = match graph.subdivide(
            &parent_id,
            &parent_twin_id,
            new_head,
            vec![new_reduce],
            successors,
            true,
            false,
        ) {
            Ok(id) => id,
            Err(err) => {
                debug!(node = %node.id, %err, "set-comprehension rewrite failed");
                return None;
            }
        };
        debug!(node = %node.id, head = %new_head_id, members = members.len(), "set-comp rewrite");

        // provenance link from the comp node to the branch it spawned
        if let Some(head) = graph.alist(&new_head_id) {
            graph.link_with(&node.id, &head, EdgeData::labeled("set-comp"));
        }

        // the intersection supersedes the enumerated branch children
        for old in superseded {
            if old != "0_" && old != new_head_id {
                graph.prune(&old);
            }
        }
        // the comp value must flow through the new branch, not directly up
        graph.remove_link(&node.id, &parent_twin_id);

        Some(())
    }
}
