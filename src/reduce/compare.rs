//! Relational reducers: eq/neq/lt/gt/lte/gte over exactly two operands,
//! yielding the strings `"true"`/`"false"`.

use std::cmp::Ordering;

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, last_child_value, set_cov};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CmpOp {
    pub const fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Neq => "neq",
            CmpOp::Lt => "lt",
            CmpOp::Gt => "gt",
            CmpOp::Lte => "lte",
            CmpOp::Gte => "gte",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Neq => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Lte => ordering != Ordering::Greater,
            CmpOp::Gte => ordering != Ordering::Less,
        }
    }
}

/// Numeric comparison when both operands are numbers, lexicographic
/// otherwise.
fn compare_values(a: &AttrValue, b: &AttrValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.display_string().cmp(&b.display_string()),
    }
}

pub struct Compare {
    op: CmpOp,
}

impl Compare {
    pub const fn new(op: CmpOp) -> Self {
        Self { op }
    }
}

impl Reduce for Compare {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let opvars = node.op_var_names();
        let operands: Vec<AttrValue> = opvars
            .iter()
            .filter_map(|ov| last_child_value(children, ov))
            .collect();

        let result = if operands.len() == 2 {
            for (ov, value) in opvars.iter().zip(&operands) {
                node.instantiate_variable(ov, value.clone());
            }
            let holds = self.op.holds(compare_values(&operands[0], &operands[1]));
            AttrValue::Str(holds.to_string())
        } else if children.len() == 1 && node.op() == children[0].op() {
            children[0].projected_value()?
        } else {
            return None;
        };

        commit(node, result);
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
            "h": op, "v": ["$x", "$y"], "$x": "", "$y": ""
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn operand(name: &str, value: serde_json::Value) -> Alist {
        let mut c = Alist::from_json(&json!({"h": "value", "v": name})).unwrap();
        c.check_variables();
        c.instantiate_variable(name, AttrValue::from_json(&value));
        c
    }

    #[test]
    fn lte_on_numbers() {
        let mut g = InferenceGraph::new();
        let mut n = node("lte");
        let children = vec![operand("$x", json!(3)), operand("$y", json!(9))];
        Compare::new(CmpOp::Lte).reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Str("true".into())));
    }

    #[test]
    fn gt_is_false_when_equal() {
        let mut g = InferenceGraph::new();
        let mut n = node("gt");
        let children = vec![operand("$x", json!(5)), operand("$y", json!(5))];
        Compare::new(CmpOp::Gt).reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Str("false".into())));
    }

    #[test]
    fn missing_operand_is_not_reducible() {
        let mut g = InferenceGraph::new();
        let mut n = node("eq");
        let children = vec![operand("$x", json!(5))];
        assert!(Compare::new(CmpOp::Eq).reduce(&mut n, &children, &mut g).is_none());
    }
}
