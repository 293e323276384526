//! Query context: a flat bag of hints carried in the `cx` attribute.
//!
//! Context keys bias resolution (source trust gating, regression accuracy,
//! time defaults) and can fill attributes the query left blank. When a
//! decomposition rewrites an attribute, the matching context hint must be
//! flushed so it cannot re-assert the old value further down the graph.

use chrono::{Datelike, Utc};

use crate::alist::{Alist, AttrMap, AttrValue, attr};

/// Well-known context keys.
pub mod keys {
    pub const TRUST: &str = "trust";
    pub const ACCURACY: &str = "accuracy";
    pub const SPEED: &str = "speed";
    pub const DATETIME: &str = "datetime";
    pub const DEVICE: &str = "device";
    pub const PLACE: &str = "place";
    pub const NATIONALITY: &str = "nationality";
}

/// Read the context bag of an alist, if any.
pub fn context_of(alist: &Alist) -> Option<&AttrMap> {
    match alist.get(attr::CONTEXT) {
        Some(AttrValue::Nested(map)) => Some(map),
        _ => None,
    }
}

/// String-valued context entry lookup.
pub fn context_value(alist: &Alist, key: &str) -> Option<String> {
    match context_of(alist)?.get(key) {
        Some(AttrValue::Str(s)) => Some(s.clone()),
        Some(AttrValue::Num(n)) => Some(crate::alist::format_number(*n)),
        _ => None,
    }
}

/// Fill attributes the query left blank from the context bag: an empty time
/// attribute takes the year of the context datetime, an empty subject takes
/// the context place.
pub fn inject_query_context(alist: &mut Alist) {
    let time_empty = alist.get(attr::TIME).is_none_or(|v| v.is_empty_like());
    if time_empty && let Some(dt) = context_value(alist, keys::DATETIME) {
        let year = dt
            .get(..4)
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().year().to_string());
        alist.set(attr::TIME, AttrValue::Str(year));
    }
    let subject_empty = alist.get(attr::SUBJECT).is_none_or(|v| v.is_empty_like());
    if subject_empty && let Some(place) = context_value(alist, keys::PLACE) {
        alist.set(attr::SUBJECT, AttrValue::Str(place));
    }
}

/// Specialize an alist for retrieval from a specific source: the nationality
/// hint narrows an empty subject when the source is a per-country statistical
/// database.
pub fn inject_retrieval_context(alist: &mut Alist, source_name: &str) {
    let subject_empty = alist.get(attr::SUBJECT).is_none_or(|v| v.is_empty_like());
    if subject_empty
        && source_name == "worldbank"
        && let Some(nationality) = context_value(alist, keys::NATIONALITY)
    {
        alist.set(attr::SUBJECT, AttrValue::Str(nationality));
    }
}

/// Drop context hints that shadow the given attributes. Needed after a
/// decomposition rewrites an attribute (e.g. the time of a temporal child)
/// so the stale query-time hint does not overwrite it again.
pub fn flush(alist: &mut Alist, attrs: &[&str]) {
    let Some(AttrValue::Nested(map)) = alist.get(attr::CONTEXT).cloned() else {
        return;
    };
    let mut map = map;
    for a in attrs {
        let key = match *a {
            attr::TIME => keys::DATETIME,
            attr::SUBJECT => keys::PLACE,
            other => other,
        };
        map.remove(key);
    }
    alist.set(attr::CONTEXT, AttrValue::Nested(map));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_context(cx: serde_json::Value) -> Alist {
        let mut a = Alist::from_json(&json!({
            "h": "value", "v": "?y", "s": "", "p": "population", "o": "?y", "cx": cx
        }))
        .unwrap();
        a.check_variables();
        a
    }

    #[test]
    fn datetime_fills_empty_time() {
        let mut a = with_context(json!({"datetime": "2019-07-01 00:00:00"}));
        inject_query_context(&mut a);
        assert_eq!(a.get(attr::TIME), Some(&AttrValue::Str("2019".into())));
    }

    #[test]
    fn place_fills_empty_subject() {
        let mut a = with_context(json!({"place": "Ghana"}));
        inject_query_context(&mut a);
        assert_eq!(a.get(attr::SUBJECT), Some(&AttrValue::Str("Ghana".into())));
    }

    #[test]
    fn flush_removes_shadowing_hint() {
        let mut a = with_context(json!({"datetime": "2019-07-01 00:00:00", "trust": "high"}));
        flush(&mut a, &[attr::TIME]);
        assert_eq!(context_value(&a, keys::DATETIME), None);
        assert_eq!(context_value(&a, keys::TRUST), Some("high".into()));
    }

    #[test]
    fn concrete_time_is_not_overwritten() {
        let mut a = with_context(json!({"datetime": "2019-07-01 00:00:00"}));
        a.set(attr::TIME, AttrValue::Str("1999".into()));
        inject_query_context(&mut a);
        assert_eq!(a.get(attr::TIME), Some(&AttrValue::Str("1999".into())));
    }
}
