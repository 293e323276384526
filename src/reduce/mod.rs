//! Reduction (aggregation) operators.
//!
//! A reducer combines the resolved children of a node into the node's own
//! value and uncertainty figure. Returning `None` means "not yet reducible" —
//! the scheduler will retry once more children resolve. Dispatch is a static
//! name table; an unknown operator name is reported by [`lookup`] as `None`,
//! never resolved dynamically.

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;
use crate::uncertainty;

mod comp;
mod compare;
mod list;
mod rank;
mod regress;
mod startswith;
mod stats;
mod value;

pub use compare::CmpOp;

/// A reduction operator.
pub trait Reduce: Send + Sync {
    fn name(&self) -> &'static str;

    /// Aggregate `children` into `node`, mutating it in place. `None` means
    /// the inputs are not sufficient yet. Only `comp` touches the graph.
    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        graph: &mut InferenceGraph,
    ) -> Option<()>;
}

/// Static operator table.
pub fn lookup(op: &str) -> Option<&'static dyn Reduce> {
    static VALUE: value::Value = value::Value;
    static SUM: stats::Sum = stats::Sum;
    static PRODUCT: stats::Product = stats::Product;
    static MIN: stats::Extreme = stats::Extreme::MIN;
    static MAX: stats::Extreme = stats::Extreme::MAX;
    static MEAN: stats::Mean = stats::Mean;
    static MEDIAN: stats::Median = stats::Median;
    static MODE: stats::Mode = stats::Mode;
    static COUNT: list::Count = list::Count;
    static LIST: list::List = list::List;
    static RANK: rank::Rank = rank::Rank;
    static STARTSWITH: startswith::StartsWith = startswith::StartsWith;
    static EQ: compare::Compare = compare::Compare::new(CmpOp::Eq);
    static NEQ: compare::Compare = compare::Compare::new(CmpOp::Neq);
    static LT: compare::Compare = compare::Compare::new(CmpOp::Lt);
    static GT: compare::Compare = compare::Compare::new(CmpOp::Gt);
    static LTE: compare::Compare = compare::Compare::new(CmpOp::Lte);
    static GTE: compare::Compare = compare::Compare::new(CmpOp::Gte);
    static COMP: comp::Comp = comp::Comp;
    static REGRESS: regress::Regress = regress::Regress;

    match op {
        "value" => Some(&VALUE),
        "sum" => Some(&SUM),
        "product" => Some(&PRODUCT),
        "min" => Some(&MIN),
        "max" => Some(&MAX),
        "mean" | "avg" => Some(&MEAN),
        "median" => Some(&MEDIAN),
        "mode" => Some(&MODE),
        "count" => Some(&COUNT),
        "list" => Some(&LIST),
        "rank" => Some(&RANK),
        "startswith" => Some(&STARTSWITH),
        "eq" => Some(&EQ),
        "neq" => Some(&NEQ),
        "lt" => Some(&LT),
        "gt" => Some(&GT),
        "lte" => Some(&LTE),
        "gte" => Some(&GTE),
        "comp" => Some(&COMP),
        // the Gaussian-process variant resolves to the same regression
        // collaborator boundary
        "regress" | "gpregress" => Some(&REGRESS),
        _ => None,
    }
}

// -- shared operand helpers -------------------------------------------------

/// First projection variable name of a node (the default one if synthesized).
pub(crate) fn first_projection(node: &Alist) -> Option<String> {
    node.projection_variable_names().into_iter().next()
}

/// The value a variable takes across children: later children win, matching
/// the engine's overwrite-on-revisit operand collection.
pub(crate) fn last_child_value(children: &[Alist], name: &str) -> Option<AttrValue> {
    children.iter().rev().find_map(|c| c.instantiation_value(name))
}

/// The single JSON-list operand shape: one operation variable, exactly one
/// child, and that child's value parses as a list.
pub(crate) fn single_list_operand(node: &Alist, children: &[Alist]) -> Option<Vec<AttrValue>> {
    let opvars = node.op_var_names();
    if opvars.len() == 1 && children.len() == 1 {
        children[0].instantiation_value(&opvars[0])?.as_json_list()
    } else {
        None
    }
}

/// Write the aggregated value into the node: projection variable (when one
/// exists) and the operation-value slot.
pub(crate) fn commit(node: &mut Alist, result: AttrValue) {
    if let Some(proj) = first_projection(node) {
        node.instantiate_variable(&proj, result.clone());
    }
    node.instantiate_variable(attr::OPVALUE, result);
}

/// Attach the aggregate uncertainty coefficient.
pub(crate) fn set_cov(node: &mut Alist, children: &[Alist], all_numeric: bool) {
    let cov = uncertainty::estimate(children, all_numeric, &node.op());
    node.instantiate_variable(attr::COV, AttrValue::Num(cov));
}

/// Encode values back into the JSON-list string shape used on the wire.
pub(crate) fn encode_list(values: &[AttrValue]) -> AttrValue {
    let json = serde_json::Value::Array(values.iter().map(|v| v.to_json()).collect());
    AttrValue::Str(json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_operator_is_not_dispatched() {
        assert!(lookup("summon").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn gpregress_aliases_regress() {
        assert_eq!(lookup("gpregress").unwrap().name(), lookup("regress").unwrap().name());
    }
}
