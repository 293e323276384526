//! String-prefix filter reducer: keep the values starting with the given
//! prefix, case-insensitively.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, encode_list, first_projection, set_cov, single_list_operand};

pub struct StartsWith;

fn prefix_arg(node: &Alist) -> Option<String> {
    match node.get(attr::OPVAR) {
        Some(AttrValue::List(items)) if items.len() == 2 => {
            Some(items[1].display_string().to_lowercase())
        }
        _ => None,
    }
}

impl Reduce for StartsWith {
    fn name(&self) -> &'static str {
        "startswith"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let opvars = node.op_var_names();
        let result = if let (Some(prefix), Some(items)) =
            (prefix_arg(node), single_list_operand(node, children))
        {
            let matches: Vec<AttrValue> = items
                .into_iter()
                .filter(|v| v.display_string().to_lowercase().starts_with(&prefix))
                .collect();
            if matches.is_empty() {
                return None;
            }
            let encoded = encode_list(&matches);
            node.instantiate_variable(&opvars[0], encoded.clone());
            encoded
        } else if let (Some(prefix), 1, true) =
            (prefix_arg(node), opvars.len(), !children.is_empty())
        {
            let proj = first_projection(node)?;
            let matching: Vec<&Alist> = children
                .iter()
                .filter(|c| {
                    c.instantiation_value(&opvars[0])
                        .is_some_and(|v| v.display_string().to_lowercase().starts_with(&prefix))
                })
                .collect();
            if matching.is_empty() {
                return None;
            }
            let values: Vec<AttrValue> = matching
                .iter()
                .filter_map(|c| c.instantiation_value(&opvars[0]))
                .collect();
            node.instantiate_variable(&opvars[0], encode_list(&values));
            let projections: Vec<AttrValue> = matching
                .iter()
                .filter_map(|c| c.instantiation_value(&proj))
                .collect();
            encode_list(&projections)
        } else if children.len() == 1 && node.op() == children[0].op() {
            children[0].projected_value()?
        } else {
            return None;
        };

        commit(node, result);
        set_cov(node, children, true);
        Some(())
    }
}
