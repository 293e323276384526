//! Geospatial decomposition: replace a concrete subject by its constituent
//! locations and sum the children, e.g. a continent's population as the sum
//! over its countries.

use std::sync::Arc;

use crate::alist::{Alist, AttrValue, Branch, NodeKind, attr};
use crate::kb::GeoProvider;

use super::{Decompose, Decomposition};

pub struct Geospatial {
    geo: Arc<dyn GeoProvider>,
}

impl Geospatial {
    pub fn new(geo: Arc<dyn GeoProvider>) -> Self {
        Self { geo }
    }
}

impl Decompose for Geospatial {
    fn name(&self) -> &'static str {
        "geospatial"
    }

    fn decompose(&self, alist: &Alist) -> Option<Decomposition> {
        let subject = match alist.get(attr::SUBJECT) {
            Some(AttrValue::Str(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return None, // empty or variable subject
        };
        let sub_locations = self.geo.sub_locations(&subject);
        if sub_locations.is_empty() {
            return None;
        }

        let mut base = alist.clone();
        base.add_data_source(self.geo.name());

        let mut head = base.copy(false);
        head.set_op("geospatial");
        // more expensive than the other decompositions
        head.meta.cost = alist.meta.cost + 4.0;
        head.meta.branch = Branch::And;
        head.meta.kind = NodeKind::Hnode;

        let mut reduce = head.copy(false);
        reduce.set_op("sum");

        let mut successors = Vec::new();
        for location in sub_locations {
            let mut child = base.copy(false);
            child.set(attr::SUBJECT, AttrValue::Str(location));
            child.set_op("value");
            child.meta.cost = head.meta.cost + 1.0;
            child.meta.kind = NodeKind::Znode;
            if let Some(cx) = head.get(attr::CONTEXT) {
                child.set(attr::CONTEXT, cx.clone());
            }
            successors.push(child);
        }

        Some(Decomposition {
            map_op_node: head,
            reduce_op_nodes: vec![reduce],
            successors,
        })
    }
}
