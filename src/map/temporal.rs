//! Temporal decomposition: expand a dated query into a window of sibling
//! years whose values feed a regression, so the asked-for year can be
//! predicted even when no source covers it directly.

use chrono::{Datelike, Utc};

use crate::alist::{Alist, AttrValue, Branch, NodeKind, State, attr};
use crate::config::EngineConfig;
use crate::context::{self, keys};

use super::{Decompose, Decomposition};

pub struct Temporal {
    branching_factor: usize,
}

impl Temporal {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            branching_factor: config.temporal_branching_factor,
        }
    }

    fn year_child(head: &Alist, template: &Alist, year: i32) -> Alist {
        let mut child = template.copy(false);
        child.set(attr::TIME, AttrValue::Str(year.to_string()));
        child.set_op("value");
        child.meta.cost = head.meta.cost + 1.0;
        child.meta.kind = NodeKind::Znode;
        if let Some(cx) = head.get(attr::CONTEXT) {
            child.set(attr::CONTEXT, cx.clone());
        }
        context::flush(&mut child, &[attr::TIME]);
        child
    }
}

impl Decompose for Temporal {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn decompose(&self, alist: &Alist) -> Option<Decomposition> {
        let time = match alist.get(attr::TIME) {
            Some(AttrValue::Str(s)) if !s.trim().is_empty() => s.clone(),
            Some(AttrValue::Num(n)) => crate::alist::format_number(*n),
            _ => return None, // no time, or still a nesting variable
        };
        let parent_year: i32 = time.trim().parse().ok()?;
        let current_year = Utc::now().year();

        let mut branch_factor = self.branching_factor as i32;
        let mut reduce_op = "regress";
        // a high-accuracy context asks for more regression data points and a
        // gaussian-process fit
        if context::context_value(alist, keys::ACCURACY).as_deref() == Some("high") {
            if branch_factor <= 10 {
                branch_factor = 20;
            }
            reduce_op = "gpregress";
        }

        let mut head = alist.copy(false);
        context::flush(&mut head, &[attr::TIME]);
        head.set_op("temporal");
        head.meta.cost = alist.meta.cost + 2.0;
        head.meta.branch = Branch::And;
        head.meta.state = State::Explored;
        head.meta.kind = NodeKind::Hnode;

        let mut reduce = head.copy(false);
        reduce.set_op(reduce_op);

        let mut successors = Vec::new();
        let mut count = 0;
        if current_year - parent_year > branch_factor / 2 {
            // window straddles the asked-for year
            for i in 1..(branch_factor + 1) / 2 {
                successors.push(Temporal::year_child(&head, alist, parent_year + i));
                successors.push(Temporal::year_child(&head, alist, parent_year - i));
                count += 2;
            }
        } else if parent_year >= current_year {
            // future year: only history below the current year is observable
            for i in 1..branch_factor {
                successors.push(Temporal::year_child(&head, alist, current_year - i));
                count += 1;
            }
        }
        // backfill the window with earlier years
        for i in 1..(branch_factor - count) {
            successors.push(Temporal::year_child(&head, alist, parent_year - (count + i)));
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

    fn dated(t: &str) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "Ghana", "p": "population", "o": "?y", "t": t
        }))
        .unwrap();
        a.check_variables();
        a
    }

    fn temporal() -> Temporal {
        Temporal::new(&EngineConfig::default())
    }

    #[test]
    fn no_time_means_no_decomposition() {
        assert!(temporal().decompose(&dated("")).is_none());
        assert!(temporal().decompose(&dated("#d")).is_none());
    }

    #[test]
    fn historical_year_straddles_the_window() {
        let d = temporal().decompose(&dated("2010")).unwrap();
        assert_eq!(d.map_op_node.op(), "temporal");
        assert_eq!(d.map_op_node.meta.branch, Branch::And);
        assert_eq!(d.reduce_op_nodes[0].op(), "regress");
        let years: Vec<String> = d
            .successors
            .iter()
            .map(|c| c.get(attr::TIME).unwrap().display_string())
            .collect();
        assert!(years.contains(&"2011".to_string()));
        assert!(years.contains(&"2009".to_string()));
        assert!(!years.contains(&"2010".to_string()));
    }

    #[test]
    fn future_year_uses_only_observable_history() {
        let future = (Utc::now().year() + 2).to_string();
        let d = temporal().decompose(&dated(&future)).unwrap();
        let current = Utc::now().year();
        for child in &d.successors {
            let year: i32 = child.get(attr::TIME).unwrap().display_string().parse().unwrap();
            assert!(year < current);
        }
    }

    #[test]
    fn high_accuracy_widens_the_window_and_upgrades_the_fit() {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "Ghana", "p": "population", "o": "?y",
            "t": "2010", "cx": {"accuracy": "high"}
        }))
        .unwrap();
        a.check_variables();
        let d = temporal().decompose(&a).unwrap();
        assert_eq!(d.reduce_op_nodes[0].op(), "gpregress");
        assert!(d.successors.len() > 10);
    }

    #[test]
    fn children_are_leaf_value_queries() {
        let d = temporal().decompose(&dated("2005")).unwrap();
        for child in &d.successors {
            assert_eq!(child.op(), "value");
            assert_eq!(child.meta.kind, NodeKind::Znode);
            assert_eq!(child.meta.cost, d.map_op_node.meta.cost + 1.0);
        }
    }
}
