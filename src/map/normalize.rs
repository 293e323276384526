//! Normalization decomposition: lift nested sub-queries out of an alist so
//! the outer query becomes flat. Handles four nesting forms: `$filter`
//! predicates, `$in` enumerations, `$is` bindings, and full sub-queries
//! (a nested mapping carrying its own `h`).

use crate::alist::{Alist, AttrMap, AttrValue, Branch, NodeKind, State, attr, is_var_name};
use crate::context;

use super::{Decompose, Decomposition};

const FILTER: &str = "$filter";
const IN: &str = "$in";
const IS: &str = "$is";

pub struct Normalize;

impl Normalize {
    /// Nesting variables that are actually referenced by another attribute.
    fn used_nesting_vars(alist: &Alist) -> Vec<(String, AttrMap)> {
        alist
            .uninstantiated_nesting_variables()
            .into_iter()
            .filter(|(name, _)| {
                alist.attributes().iter().any(|(_, v)| match v {
                    AttrValue::Var(n) | AttrValue::Str(n) => n == name,
                    AttrValue::List(items) => items
                        .iter()
                        .any(|i| matches!(i, AttrValue::Var(n) | AttrValue::Str(n) if n == name)),
                    _ => false,
                })
            })
            .collect()
    }

    /// Map head for the `$filter`/`$in` forms: the outer alist with the
    /// nesting variable promoted to operation variable.
    fn head_for(alist: &Alist, nest_attr: &str) -> Alist {
        let mut head = alist.copy(false);
        head.set_op("normalize");
        head.set(attr::OPVAR, AttrValue::Var(nest_attr.to_string()));
        head.remove(nest_attr);
        head.meta.cost = alist.meta.cost + 1.0;
        head.meta.branch = Branch::And;
        head.meta.state = State::Explored;
        head.meta.kind = NodeKind::Hnode;
        head.check_variables();
        head
    }

    fn filter_form(alist: &Alist, nest_attr: &str, clauses: &[AttrValue]) -> Decomposition {
        let head = Normalize::head_for(alist, nest_attr);
        let mut reduce = head.copy(false);
        reduce.set_op("comp");
        reduce.check_variables();

        // heuristic: type=country|continent plus a location clause collapses
        // to a single geopolitical membership lookup
        let mut geopolitical = None;
        let mut location = None;
        for clause in clauses {
            let AttrValue::Nested(map) = clause else { continue };
            let p = map.get(attr::PROPERTY).map(|v| v.display_string());
            let o = map.get(attr::OBJECT).map(|v| v.display_string());
            match (p.as_deref(), o) {
                (Some("type"), Some(obj)) if obj == "country" || obj == "continent" => {
                    geopolitical = Some(obj);
                }
                (Some("location"), Some(obj)) => location = Some(obj),
                _ => {}
            }
        }

        let mut successors = Vec::new();
        if let (Some(class), Some(place)) = (geopolitical, location) {
            let mut child = Alist::new();
            child.set_op("list");
            child.set(attr::OPVAR, AttrValue::Var(nest_attr.to_string()));
            child.set(attr::SUBJECT, AttrValue::Var(nest_attr.to_string()));
            child.set(
                attr::PROPERTY,
                AttrValue::Str(format!("__geopolitical:{class}")),
            );
            child.set(attr::OBJECT, AttrValue::Str(place));
            Normalize::finish_child(&mut child, &head, State::Unexplored);
            successors.push(child);
        } else {
            for clause in clauses {
                let AttrValue::Nested(map) = clause else { continue };
                let mut child = Alist::new();
                child.set_op("list");
                child.set(attr::OPVAR, AttrValue::Var(nest_attr.to_string()));
                child.set(attr::SUBJECT, AttrValue::Var(nest_attr.to_string()));
                for (k, v) in map {
                    child.set(k, v.clone());
                }
                Normalize::finish_child(&mut child, &head, State::Unexplored);
                successors.push(child);
            }
        }
        Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors,
        }
    }

    fn in_form(alist: &Alist, nest_attr: &str, listed: &AttrValue) -> Decomposition {
        let head = Normalize::head_for(alist, nest_attr);
        let mut reduce = head.copy(false);
        reduce.set_op("comp");
        reduce.check_variables();

        let items: Vec<String> = match listed {
            AttrValue::List(items) => items.iter().map(|v| v.display_string()).collect(),
            AttrValue::Str(s) => s.split(';').map(|x| x.trim().to_string()).collect(),
            other => vec![other.display_string()],
        };

        let mut successors = Vec::new();
        for item in items {
            let mut child = Alist::new();
            child.set_op("value");
            child.set(attr::OPVAR, AttrValue::Var(nest_attr.to_string()));
            child.set(nest_attr, AttrValue::Str(item));
            Normalize::finish_child(&mut child, &head, State::Unexplored);
            successors.push(child);
        }
        Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors,
        }
    }

    fn is_form(alist: &Alist, binding: &AttrValue) -> Decomposition {
        let mut head = Alist::new();
        head.set_op("normalize");
        let head_var = format!("?_x{}", head.attributes().len());
        head.set(attr::OPVAR, AttrValue::Var(head_var.clone()));
        head.set(&head_var, binding.clone());
        head.meta.state = State::Reducible;
        head.meta.cost += 1.0;
        head.meta.kind = NodeKind::Znode;
        head.check_variables();

        let mut reduce = alist.copy(false);
        reduce.set_op("value");
        reduce.check_variables();

        let mut successors = Vec::new();
        let is_binding_literal = !matches!(binding, AttrValue::Var(_));
        if is_binding_literal {
            // instantiation: create a pseudo leaf holding the bound value
            let mut child = Alist::new();
            child.set_op("value");
            let child_var = format!("?_x{}", head.attributes().len());
            child.set(attr::OPVAR, AttrValue::Var(child_var.clone()));
            child.set(&child_var, binding.clone());
            Normalize::finish_child(&mut child, &head, State::Reducible);
            successors.push(child);
        }
        Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors,
        }
    }

    fn subquery_form(alist: &Alist, nest_attr: &str, nested: &AttrMap) -> Decomposition {
        let mut head = alist.copy(false);
        head.set(attr::OPVAR, AttrValue::Var(nest_attr.to_string()));
        head.set_op("normalize");
        head.set(nest_attr, AttrValue::Empty);
        head.meta.cost = alist.meta.cost + 1.0;
        head.meta.state = State::Explored;
        head.meta.kind = NodeKind::Hnode;
        head.check_variables();

        let mut reduce = head.copy(false);
        reduce.set_op("comp");
        reduce.check_variables();

        let mut child = Alist::new();
        for (k, v) in nested {
            child.set(k, v.clone());
        }
        Normalize::finish_child(&mut child, &head, State::Unexplored);
        Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors: vec![child],
        }
    }

    fn finish_child(child: &mut Alist, head: &Alist, state: State) {
        child.meta.state = state;
        child.meta.cost = head.meta.cost + 1.0;
        child.meta.kind = NodeKind::Znode;
        if let Some(cx) = head.get(attr::CONTEXT) {
            child.set(attr::CONTEXT, cx.clone());
        }
        context::inject_query_context(child);
        child.check_variables();
    }
}

impl Decompose for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn decompose(&self, alist: &Alist) -> Option<Decomposition> {
        for (nest_attr, nested) in Normalize::used_nesting_vars(alist) {
            if let Some(AttrValue::List(clauses)) = nested.get(FILTER) {
                return Some(Normalize::filter_form(alist, &nest_attr, clauses));
            }
            if let Some(listed) = nested.get(IN) {
                return Some(Normalize::in_form(alist, &nest_attr, listed));
            }
            if let Some(binding) = nested.get(IS) {
                return Some(Normalize::is_form(alist, binding));
            }
            if nested.contains_key(attr::OP) {
                return Some(Normalize::subquery_form(alist, &nest_attr, &nested));
            }
        }
        None
    }
}
