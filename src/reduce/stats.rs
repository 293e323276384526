//! Numeric aggregation operators: sum, product, min/max, mean, median, mode.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, first_projection, last_child_value, set_cov, single_list_operand};

/// Collect the operands of a numeric reducer. Three shapes are recognized:
/// multiple operation variables (one operand each, later children win),
/// a single child holding a JSON-list value, or one operand per child.
fn numeric_operands(node: &Alist, children: &[Alist], default: f64) -> Vec<f64> {
    let opvars = node.op_var_names();
    if opvars.len() > 1 {
        if children.is_empty() {
            return Vec::new();
        }
        return opvars
            .iter()
            .map(|ov| {
                last_child_value(children, ov)
                    .and_then(|v| v.as_number())
                    .unwrap_or(default)
            })
            .collect();
    }
    if let Some(items) = single_list_operand(node, children) {
        return items.iter().map(|v| v.as_number().unwrap_or(default)).collect();
    }
    let Some(opvar) = opvars.first() else {
        return Vec::new();
    };
    children
        .iter()
        .filter_map(|c| c.instantiation_value(opvar))
        .filter_map(|v| v.as_number())
        .collect()
}

fn commit_number(node: &mut Alist, children: &[Alist], result: f64) {
    for opvar in node.op_var_names() {
        if let Some(value) = last_child_value(children, &opvar) {
            node.instantiate_variable(&opvar, value);
        }
    }
    commit(node, AttrValue::Num(result));
    set_cov(node, children, true);
}

pub struct Sum;

impl Reduce for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let operands = numeric_operands(node, children, 0.0);
        if operands.is_empty() {
            return None;
        }
        commit_number(node, children, operands.iter().sum());
        Some(())
    }
}

pub struct Product;

impl Reduce for Product {
    fn name(&self) -> &'static str {
        "product"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let operands = numeric_operands(node, children, 1.0);
        if operands.is_empty() {
            return None;
        }
        commit_number(node, children, operands.iter().product());
        Some(())
    }
}

/// min and max share every shape, including the pick-extreme-child mode
/// that returns the chosen child's projection value.
pub struct Extreme {
    pick_max: bool,
    op_name: &'static str,
}

impl Extreme {
    pub const MIN: Extreme = Extreme {
        pick_max: false,
        op_name: "min",
    };
    pub const MAX: Extreme = Extreme {
        pick_max: true,
        op_name: "max",
    };

    fn better(&self, candidate: f64, best: f64) -> bool {
        if self.pick_max {
            candidate > best
        } else {
            candidate < best
        }
    }
}

impl Reduce for Extreme {
    fn name(&self) -> &'static str {
        self.op_name
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let opvars = node.op_var_names();
        let result = if opvars.len() > 1 || single_list_operand(node, children).is_some() {
            let operands = numeric_operands(node, children, 0.0);
            let mut best = *operands.first()?;
            for &x in &operands[1..] {
                if self.better(x, best) {
                    best = x;
                }
            }
            AttrValue::Num(best)
        } else {
            // pick the child with the extreme value; its projection becomes
            // the answer (first encountered wins on ties)
            let opvar = opvars.first()?;
            let mut best: Option<(f64, &Alist)> = None;
            for child in children {
                let Some(value) = child.instantiation_value(opvar).and_then(|v| v.as_number())
                else {
                    continue;
                };
                if best.is_none_or(|(b, _)| self.better(value, b)) {
                    best = Some((value, child));
                }
            }
            let (value, winner) = best?;
            node.instantiate_variable(opvar, AttrValue::Num(value));
            let proj = first_projection(node)?;
            winner
                .instantiation_value(&proj)
                .unwrap_or(AttrValue::Num(value))
        };
        commit(node, result);
        set_cov(node, children, true);
        Some(())
    }
}

pub struct Mean;

impl Reduce for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let operands = numeric_operands(node, children, 0.0);
        if operands.is_empty() {
            return None;
        }
        commit_number(node, children, operands.iter().sum::<f64>() / operands.len() as f64);
        Some(())
    }
}

pub struct Median;

impl Reduce for Median {
    fn name(&self) -> &'static str {
        "median"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let mut operands = numeric_operands(node, children, 0.0);
        if operands.is_empty() {
            return None;
        }
        operands.sort_by(f64::total_cmp);
        let mid = operands.len() / 2;
        let median = if operands.len() % 2 == 1 {
            operands[mid]
        } else {
            (operands[mid - 1] + operands[mid]) / 2.0
        };
        commit_number(node, children, median);
        Some(())
    }
}

pub struct Mode;

impl Reduce for Mode {
    fn name(&self) -> &'static str {
        "mode"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let opvar = node.op_var_names().into_iter().next()?;
        let values: Vec<AttrValue> = match single_list_operand(node, children) {
            Some(items) => items,
            None => children
                .iter()
                .filter_map(|c| c.instantiation_value(&opvar))
                .collect(),
        };
        if values.is_empty() {
            return None;
        }
        let mut counts: Vec<(String, AttrValue, usize)> = Vec::new();
        for v in &values {
            let key = v.display_string();
            match counts.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, n)) => *n += 1,
                None => counts.push((key, v.clone(), 1)),
            }
        }
        let best = counts.iter().map(|(_, _, n)| *n).max()?;
        let modal = counts.into_iter().find(|(_, _, n)| *n == best)?.1;
        node.instantiate_variable(&opvar, modal.clone());
        commit(node, modal);
        set_cov(node, children, false);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn multi_op(op: &str) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": op, "v": ["$x", "$y"], "$x": "", "$y": ""
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn operand_child(name: &str, value: f64) -> Alist {
        let mut c = Alist::from_json(&json!({"h": "value", "v": name})).unwrap();
        c.check_variables();
        c.instantiate_variable(name, AttrValue::Num(value));
        c
    }

    fn leaf(opvalue: f64) -> Alist {
        let mut c = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "x", "p": "population", "o": "?y"
        }))
        .unwrap();
        c.check_variables();
        c.instantiate_variable("?y", AttrValue::Num(opvalue));
        c
    }

    #[test]
    fn sum_of_two_operands() {
        let mut g = InferenceGraph::new();
        let mut n = multi_op("sum");
        let children = vec![operand_child("$x", 20000.0), operand_child("$y", 400000.0)];
        Sum.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(420000.0)));
    }

    #[test]
    fn product_of_two_operands() {
        let mut g = InferenceGraph::new();
        let mut n = multi_op("product");
        let children = vec![operand_child("$x", 3.0), operand_child("$y", 4.0)];
        Product.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(12.0)));
    }

    #[test]
    fn sum_over_child_values() {
        let mut g = InferenceGraph::new();
        let mut n = leaf(0.0);
        n.set_op("sum");
        let children = vec![leaf(1.0), leaf(2.0), leaf(3.0)];
        Sum.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(6.0)));
    }

    #[test]
    fn empty_operands_are_not_reducible() {
        let mut g = InferenceGraph::new();
        assert!(Sum.reduce(&mut multi_op("sum"), &[], &mut g).is_none());
        assert!(Mean.reduce(&mut multi_op("mean"), &[], &mut g).is_none());
        assert!(Extreme::MIN.reduce(&mut multi_op("min"), &[], &mut g).is_none());
    }

    #[test]
    fn min_picks_the_extreme_child_projection() {
        let mut g = InferenceGraph::new();
        let mut n = leaf(0.0);
        n.set_op("min");
        n.set(attr::OPVALUE, AttrValue::Empty);
        let children = vec![leaf(30.0), leaf(10.0), leaf(20.0)];
        Extreme::MIN.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(10.0)));
    }

    #[test]
    fn median_of_even_count() {
        let mut g = InferenceGraph::new();
        let mut n = leaf(0.0);
        n.set_op("median");
        n.set(attr::OPVALUE, AttrValue::Empty);
        let children = vec![leaf(1.0), leaf(9.0), leaf(3.0), leaf(5.0)];
        Median.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(4.0)));
    }
}
