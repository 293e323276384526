//! Default reducer when no aggregation operator was asked for: the mean of
//! numeric children, or the modal value when non-numeric answers dominate.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;

use super::{Reduce, commit, encode_list, set_cov};

pub struct Value;

impl Reduce for Value {
    fn name(&self) -> &'static str {
        "value"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let mut numbers = Vec::new();
        let mut others: Vec<String> = Vec::new();
        let mut in_order = Vec::new();
        for child in children {
            let op_value = match child.get(attr::OPVALUE) {
                Some(v) if !v.is_empty_like() => v.clone(),
                _ => continue,
            };
            // a JSON-list shaped value contributes each element
            let items = op_value.as_json_list().unwrap_or_else(|| vec![op_value]);
            for item in items {
                if let Some(n) = item.as_number() {
                    numbers.push(n);
                } else {
                    others.push(item.display_string());
                }
                in_order.push(item);
            }
        }

        let list_opvar = matches!(node.get(attr::OPVAR), Some(AttrValue::List(_)));
        let result = if list_opvar {
            if in_order.is_empty() {
                return None;
            }
            encode_list(&in_order)
        } else if numbers.len() >= others.len() && !numbers.is_empty() {
            let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
            let opvar = node.op_var_names().into_iter().next();
            // a mean over years must stay a year string
            let is_time_var = match (&opvar, node.get(attr::TIME)) {
                (Some(name), Some(AttrValue::Var(t))) => t == name,
                _ => false,
            };
            if is_time_var {
                AttrValue::Str((mean as i64).to_string())
            } else {
                AttrValue::Num(mean)
            }
        } else if !others.is_empty() {
            // modal value(s)
            let mut counts: Vec<(String, usize)> = Vec::new();
            for item in &others {
                match counts.iter_mut().find(|(k, _)| k == item) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((item.clone(), 1)),
                }
            }
            let best = counts.iter().map(|(_, n)| *n).max()?;
            let mut modal: Vec<AttrValue> = counts
                .into_iter()
                .filter(|(_, n)| *n == best)
                .map(|(k, _)| AttrValue::Str(k))
                .collect();
            if modal.len() == 1 {
                modal.remove(0)
            } else {
                encode_list(&modal)
            }
        } else {
            return None;
        };

        if let Some(opvar) = node.op_var_names().into_iter().next() {
            node.instantiate_variable(&opvar, result.clone());
        }
        commit(node, result);
        set_cov(node, children, numbers.len() == children.len());
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "France", "p": "population", "o": "?y"
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn child(opvalue: serde_json::Value) -> Alist {
        let mut c = node();
        c.set(attr::OPVALUE, AttrValue::from_json(&opvalue));
        c
    }

    #[test]
    fn no_children_is_not_reducible() {
        let mut g = InferenceGraph::new();
        assert!(Value.reduce(&mut node(), &[], &mut g).is_none());
    }

    #[test]
    fn numeric_children_average() {
        let mut g = InferenceGraph::new();
        let mut n = node();
        let children = vec![child(json!(10.0)), child(json!(20.0))];
        Value.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.instantiation_value("?y"), Some(AttrValue::Num(15.0)));
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(15.0)));
    }

    #[test]
    fn non_numeric_children_take_the_mode() {
        let mut g = InferenceGraph::new();
        let mut n = node();
        let children = vec![
            child(json!("Paris")),
            child(json!("Paris")),
            child(json!("Lyon")),
        ];
        Value.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Str("Paris".into())));
    }

    #[test]
    fn tied_modes_stay_a_list() {
        let mut g = InferenceGraph::new();
        let mut n = node();
        let children = vec![child(json!("Paris")), child(json!("Lyon"))];
        Value.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(
            n.get(attr::OPVALUE),
            Some(&AttrValue::Str("[\"Paris\",\"Lyon\"]".into()))
        );
    }

    #[test]
    fn list_shaped_values_contribute_elements() {
        let mut g = InferenceGraph::new();
        let mut n = node();
        let children = vec![child(json!("[4, 6]")), child(json!(5.0))];
        Value.reduce(&mut n, &children, &mut g).unwrap();
        assert_eq!(n.get(attr::OPVALUE), Some(&AttrValue::Num(5.0)));
    }
}
