//! Comparison decomposition: split a comparison over multiple operation
//! variables into one child per operand, recombined by the comparison
//! operator itself.

use crate::alist::{Alist, AttrValue, Branch, NodeKind, State, attr};
use crate::context;

use super::{Decompose, Decomposition};

const COMPARISON_OPS: [&str; 5] = ["eq", "lt", "gt", "lte", "gte"];

pub struct Comparison;

impl Decompose for Comparison {
    fn name(&self) -> &'static str {
        "comparison"
    }

    fn decompose(&self, alist: &Alist) -> Option<Decomposition> {
        let op = alist.op();
        let opvars = alist.op_var_names();
        if !COMPARISON_OPS.contains(&op.as_str()) || opvars.len() < 2 {
            return None;
        }

        let mut head = alist.copy(false);
        head.set_op("compare");
        head.meta.cost = alist.meta.cost + 1.0;
        head.meta.branch = Branch::And;
        head.meta.state = State::Explored;
        head.meta.kind = NodeKind::Hnode;

        let mut reduce = head.copy(false);
        reduce.set_op(&op);

        let mut successors = Vec::new();
        for v in &opvars {
            let mut child = match alist.get(v) {
                Some(AttrValue::Nested(map)) => {
                    // operand is itself a sub-query
                    let mut child = Alist::new();
                    for (k, val) in map {
                        child.set(k, val.clone());
                    }
                    child
                }
                value => {
                    let mut child = Alist::new();
                    child.set_op("value");
                    child.set(attr::OPVAR, AttrValue::Var(v.clone()));
                    child.set(v, value.cloned().unwrap_or(AttrValue::Empty));
                    child
                }
            };
            child.meta.cost = head.meta.cost + 1.0;
            child.meta.kind = NodeKind::Znode;
            if let Some(cx) = head.get(attr::CONTEXT) {
                child.set(attr::CONTEXT, cx.clone());
            }
            context::flush(&mut child, &[attr::TIME]);
            child.check_variables();
            successors.push(child);
        }

        Some(Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requires_comparison_op_and_two_operands() {
        let mut single = Alist::from_json(&json!({"h": "gt", "v": "$x", "$x": 5})).unwrap();
        single.check_variables();
        assert!(Comparison.decompose(&single).is_none());

        let mut plain =
            Alist::from_json(&json!({"h": "sum", "v": ["$x", "$y"], "$x": 1, "$y": 2})).unwrap();
        plain.check_variables();
        assert!(Comparison.decompose(&plain).is_none());
    }

    #[test]
    fn literal_operands_become_value_children() {
        let mut a =
            Alist::from_json(&json!({"h": "lte", "v": ["$x", "$y"], "$x": 3, "$y": 9})).unwrap();
        a.check_variables();
        let d = Comparison.decompose(&a).unwrap();
        assert_eq!(d.map_op_node.op(), "compare");
        assert_eq!(d.reduce_op_nodes[0].op(), "lte");
        assert_eq!(d.successors.len(), 2);
        assert_eq!(d.successors[0].get("$x"), Some(&AttrValue::Num(3.0)));
    }

    #[test]
    fn nested_operands_become_sub_queries() {
        let mut a = Alist::from_json(&json!({
            "h": "gt", "v": ["?x", "?y"],
            "?x": {"h": "value", "v": "?a", "s": "France", "p": "population", "o": "?a"},
            "?y": {"h": "value", "v": "?b", "s": "Ghana", "p": "population", "o": "?b"}
        }))
        .unwrap();
        a.check_variables();
        let d = Comparison.decompose(&a).unwrap();
        assert_eq!(d.successors.len(), 2);
        assert_eq!(
            d.successors[0].get(attr::SUBJECT),
            Some(&AttrValue::Str("France".into()))
        );
    }
}
