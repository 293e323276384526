//! List and count reducers.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, encode_list, set_cov};

/// Gather every child value into a JSON-encoded list; children that already
/// hold list-shaped values are flattened.
pub struct List;

impl Reduce for List {
    fn name(&self) -> &'static str {
        "list"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        if children.is_empty() {
            return None;
        }
        let opvars = node.op_var_names();
        let mut data = Vec::new();
        for child in children {
            for ov in &opvars {
                let Some(value) = child.instantiation_value(ov) else {
                    continue;
                };
                match value.as_json_list() {
                    Some(items) => data.extend(items),
                    None => data.push(value),
                }
            }
        }
        let encoded = encode_list(&data);
        for ov in &opvars {
            node.instantiate_variable(ov, encoded.clone());
        }
        commit(node, encoded);
        set_cov(node, children, false);
        Some(())
    }
}

/// Count the children; a single child that itself resolved to a list counts
/// its elements instead.
pub struct Count;

impl Reduce for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        if children.is_empty() {
            return None;
        }
        let opvar = node.op_var_names().into_iter().next();
        let mut count = children.len();
        if children.len() == 1 && children[0].op() == "list" {
            let listed = opvar
                .as_deref()
                .and_then(|ov| children[0].instantiation_value(ov))
                .and_then(|v| v.as_json_list());
            if let Some(items) = listed {
                count = items.len();
            }
        }
        if let Some(ov) = opvar {
            node.instantiate_variable(&ov, AttrValue::Num(count as f64));
        }
        commit(node, AttrValue::Num(count as f64));
        set_cov(node, children, false);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(op: &str) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": op, "v": "$x", "s": "$x", "p": "type", "o": "country"
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn child(value: serde_json::Value) -> Alist {
        let mut c = node("value");
        c.instantiate_variable("$x", AttrValue::from_json(&value));
        c
    }

    #[test]
    fn list_flattens_nested_lists() {
        let mut g = InferenceGraph::new();
        let mut n = node("list");
        let children = vec![child(json!("[\"a\",\"b\"]")), child(json!("c"))];
        List.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(
            n.get(attr::OPVALUE),
            Some(&AttrValue::Str("[\"a\",\"b\",\"c\"]".into()))
        );
    }

    #[test]
    fn count_counts_children() {
        let mut g = InferenceGraph::new();
        let mut n = node("count");
        let children = vec![child(json!("a")), child(json!("b")), child(json!("c"))];
        Count.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(3.0)));
    }

    #[test]
    fn count_expands_a_single_list_child() {
        let mut g = InferenceGraph::new();
        let mut n = node("count");
        let mut list_child = node("list");
        list_child.instantiate_variable("$x", AttrValue::Str("[\"a\",\"b\",\"c\",\"d\"]".into()));
        Count.reduce(&mut n, &[list_child], &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(4.0)));
    }
}
