//! Regression reducer: fit the children's (time, value) pairs and predict
//! the value at the node's own time. The fitted function and data points are
//! recorded in the plot-data attribute for explanation rendering.

use serde_json::json;

use crate::alist::{Alist, AttrValue, attr};
use crate::graph::InferenceGraph;
use crate::regression;

use super::{Reduce, commit, set_cov};

pub struct Regress;

impl Reduce for Regress {
    fn name(&self) -> &'static str {
        "regress"
    }

    fn reduce(
        &self,
        node: &mut Alist,
        children: &[Alist],
        _graph: &mut InferenceGraph,
    ) -> Option<()> {
        let mut points = Vec::new();
        for child in children {
            let opvar = child.op_var_names().into_iter().next();
            let value = opvar
                .and_then(|ov| child.instantiation_value(&ov))
                .and_then(|v| v.as_number());
            let time = child
                .get(attr::TIME)
                .and_then(|t| t.as_number());
            if let (Some(t), Some(v)) = (time, value) {
                points.push((t, v));
            }
        }

        let x = node.get(attr::TIME).and_then(|t| t.as_number())?;
        let (prediction, coeffs) = regression::fit_and_predict(&points, x)?;

        let plot = json!({
            "function": coeffs,
            "data": points.iter().map(|(t, v)| json!([t, v])).collect::<Vec<_>>(),
            "prediction": [x, prediction],
        });
        node.set(attr::FNPLOT, AttrValue::Str(plot.to_string()));

        if let Some(opvar) = node.op_var_names().into_iter().next() {
            node.instantiate_variable(&opvar, AttrValue::Num(prediction));
        }
        commit(node, AttrValue::Num(prediction));
        set_cov(node, children, points.len() == children.len());
        Some(())
    }
}
