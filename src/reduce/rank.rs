//! Rank reducer: pick the k-th value in descending order. Ranks are
//! 1-indexed from the top; negative ranks count from the bottom; out-of-range
//! ranks clamp to the nearest end.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, first_projection, set_cov, single_list_operand};

pub struct Rank;

/// Turn a 1-indexed (negative-from-end) rank into an index into a
/// descending-sorted slice of the given length.
fn rank_index(len: usize, k: i64) -> usize {
    let len = len as i64;
    let clamped = k.clamp(-len, len);
    let index = if clamped > 0 { clamped - 1 } else { clamped };
    if index >= 0 {
        index as usize
    } else {
        (len + index) as usize
    }
}

/// Second element of the operation-variable list: the rank argument.
fn rank_arg(node: &Alist) -> Option<i64> {
    match node.get(attr::OPVAR) {
        Some(AttrValue::List(items)) if items.len() == 2 => {
            items[1].as_number().map(|n| n as i64)
        }
        _ => None,
    }
}

impl Reduce for Rank {
    fn name(&self) -> &'static str {
        "rank"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let opvars = node.op_var_names();
        let result = if let (Some(k), Some(items)) = (rank_arg(node), single_list_operand(node, children))
        {
            let mut data: Vec<f64> = items.iter().filter_map(|v| v.as_number()).collect();
            if data.is_empty() {
                return None;
            }
            data.sort_by(|a, b| b.total_cmp(a));
            let result = AttrValue::Num(data[rank_index(data.len(), k)]);
            node.instantiate_variable(&opvars[0], result.clone());
            result
        } else if let (Some(k), 1, true) = (rank_arg(node), opvars.len(), !children.is_empty()) {
            // rank the children by their operand value; the winner's
            // projection becomes the answer
            let proj = first_projection(node)?;
            let mut data: Vec<(&Alist, f64)> = children
                .iter()
                .filter_map(|c| {
                    c.instantiation_value(&opvars[0])
                        .and_then(|v| v.as_number())
                        .map(|n| (c, n))
                })
                .collect();
            if data.is_empty() {
                return None;
            }
            data.sort_by(|a, b| b.1.total_cmp(&a.1));
            let (winner, value) = data[rank_index(data.len(), k)];
            node.instantiate_variable(&opvars[0], AttrValue::Num(value));
            winner.instantiation_value(&proj)?
        } else if children.len() == 1 && node.op() == children[0].op() {
            // single child carrying the same rank operation: pass through
            children[0].projected_value()?
        } else {
            return None;
        };

        commit(node, result);
        set_cov(node, children, true);
        Some(())
    }
}
