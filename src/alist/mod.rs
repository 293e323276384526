//! Annotated list (alist): the atomic unit of query/answer state.
//!
//! An alist is a mapping of named attributes plus scheduling metadata. Attribute
//! values are a tagged enum — literals, variable references, lists, or nested
//! sub-queries — instead of the stringly-typed sniffing the wire format implies.
//! The three variable sigils (`?` projection, `$` auxiliary, `#` nesting) are
//! preserved on the wire and inside variable names.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde_json::{Map, Value, json};

use crate::error::QueryError;

/// Reserved attribute names.
///
/// The short keys are the observable wire format for queries and answers.
pub mod attr {
    pub const ID: &str = "id";
    pub const SUBJECT: &str = "s";
    pub const PROPERTY: &str = "p";
    pub const OBJECT: &str = "o";
    pub const TIME: &str = "t";
    pub const COV: &str = "u";
    pub const OP: &str = "h";
    pub const OPVAR: &str = "v";
    pub const EXPLAIN: &str = "xp";
    pub const FNPLOT: &str = "fp";
    pub const CONTEXT: &str = "cx";
    /// Operation value: holds the combined result of a reduction.
    pub const OPVALUE: &str = "__v__";
    /// Synthetic default projection variable.
    pub const PRJVAR: &str = "?__j__";
}

/// Variable sigils recognized at the start of attribute names and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// `?name` — designated "the answer" for the alist.
    Projection,
    /// `$name` — auxiliary variable shared between attributes.
    Auxiliary,
    /// `#name` — marks a nesting point for a compound sub-query.
    Nesting,
}

impl VarKind {
    pub fn sigil(self) -> char {
        match self {
            VarKind::Projection => '?',
            VarKind::Auxiliary => '$',
            VarKind::Nesting => '#',
        }
    }

    /// Classify a name by its leading sigil.
    pub fn of(name: &str) -> Option<VarKind> {
        match name.chars().next() {
            Some('?') => Some(VarKind::Projection),
            Some('$') => Some(VarKind::Auxiliary),
            Some('#') => Some(VarKind::Nesting),
            _ => None,
        }
    }
}

/// True if the name begins with one of the three variable sigils.
pub fn is_var_name(name: &str) -> bool {
    VarKind::of(name).is_some()
}

/// Attribute map: attribute name → tagged value.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A tagged attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// No value yet.
    Empty,
    /// String literal (never sigil-prefixed; those parse as `Var`).
    Str(String),
    /// Numeric literal.
    Num(f64),
    /// Reference to a variable by its sigil-prefixed name.
    Var(String),
    /// Ordered list of values.
    List(Vec<AttrValue>),
    /// Nested alist-shaped mapping (compound sub-query).
    Nested(AttrMap),
}

impl AttrValue {
    /// Convert a JSON value into a tagged attribute value.
    pub fn from_json(value: &Value) -> AttrValue {
        match value {
            Value::Null => AttrValue::Empty,
            Value::Bool(b) => AttrValue::Str(b.to_string()),
            Value::Number(n) => AttrValue::Num(n.as_f64().unwrap_or(0.0)),
            Value::String(s) if s.is_empty() => AttrValue::Empty,
            Value::String(s) if is_var_name(s) => AttrValue::Var(s.clone()),
            Value::String(s) => AttrValue::Str(s.clone()),
            Value::Array(items) => {
                AttrValue::List(items.iter().map(AttrValue::from_json).collect())
            }
            Value::Object(map) => {
                let mut nested = AttrMap::new();
                for (k, v) in map {
                    nested.insert(k.clone(), AttrValue::from_json(v));
                }
                AttrValue::Nested(nested)
            }
        }
    }

    /// Convert back to JSON, restoring the wire representation.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Empty => Value::String(String::new()),
            AttrValue::Str(s) => Value::String(s.clone()),
            AttrValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 9e15 {
                    json!(*n as i64)
                } else {
                    json!(n)
                }
            }
            AttrValue::Var(name) => Value::String(name.clone()),
            AttrValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            AttrValue::Nested(map) => {
                let mut obj = Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.to_json());
                }
                Value::Object(obj)
            }
        }
    }

    /// Numeric coercion: numbers directly, strings via parse.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Num(n) => Some(*n),
            AttrValue::Str(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Parse a JSON-encoded list out of this value: either a native list or a
    /// string of the form `"[...]"`. Returns `None` for anything else.
    pub fn as_json_list(&self) -> Option<Vec<AttrValue>> {
        match self {
            AttrValue::List(items) => Some(items.clone()),
            AttrValue::Str(s) if s.starts_with('[') && s.ends_with(']') => {
                let parsed: Value = serde_json::from_str(s).ok()?;
                match parsed {
                    Value::Array(items) => {
                        Some(items.iter().map(AttrValue::from_json).collect())
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// True for `Empty` or an all-whitespace string.
    pub fn is_empty_like(&self) -> bool {
        match self {
            AttrValue::Empty => true,
            AttrValue::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Human-readable rendering: numbers without a trailing `.0`, lists and
    /// nested maps as JSON, variables by name.
    pub fn display_string(&self) -> String {
        match self {
            AttrValue::Empty => String::new(),
            AttrValue::Str(s) => s.clone(),
            AttrValue::Num(n) => format_number(*n),
            AttrValue::Var(name) => name.clone(),
            AttrValue::List(_) | AttrValue::Nested(_) => self.to_json().to_string(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            AttrValue::Empty
        } else if is_var_name(s) {
            AttrValue::Var(s.to_string())
        } else {
            AttrValue::Str(s.to_string())
        }
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::from(s.as_str())
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

/// Format a float without a spurious fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Lifecycle metadata
// ---------------------------------------------------------------------------

/// Lifecycle state of an alist in the inference graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Excluded from scheduling (e.g. max depth reached).
    Ignored,
    Unexplored,
    Explored,
    Reducible,
    Pruned,
    Exploring,
    Reduced,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Ignored => "ignored",
            State::Unexplored => "unexplored",
            State::Explored => "explored",
            State::Reducible => "reducible",
            State::Pruned => "pruned",
            State::Exploring => "exploring",
            State::Reduced => "reduced",
        }
    }
}

/// Branch combination semantics for a decomposition head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Or,
    And,
}

/// Node kind in the inference graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf / fact-candidate node awaiting external resolution.
    Znode,
    /// Aggregation head.
    Hnode,
    /// Resolved external fact.
    Fact,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Znode => "znode",
            NodeKind::Hnode => "hnode",
            NodeKind::Fact => "fact",
        }
    }
}

/// Scheduling metadata, not user-visible as attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    /// Search priority; lower cost is explored first.
    pub cost: f64,
    pub depth: usize,
    pub state: State,
    pub branch: Branch,
    pub kind: NodeKind,
    /// Names of knowledge sources that contributed to this node's value.
    pub data_sources: BTreeSet<String>,
    /// True for the map (searching/decomposing) half of a node pair.
    pub is_map: bool,
    /// True while the node bounds the current search frontier.
    pub is_frontier: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            cost: 0.0,
            depth: 0,
            state: State::Unexplored,
            branch: Branch::Or,
            kind: NodeKind::Znode,
            data_sources: BTreeSet::new(),
            is_map: true,
            is_frontier: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Alist
// ---------------------------------------------------------------------------

/// An annotated list: one query/sub-query/partial-answer node.
#[derive(Debug, Clone, PartialEq)]
pub struct Alist {
    /// Hierarchical id string (`0` for the root; complements carry a trailing `_`).
    pub id: String,
    attributes: AttrMap,
    pub meta: Meta,
}

impl Default for Alist {
    fn default() -> Self {
        Self::new()
    }
}

impl Alist {
    /// Create an alist with the reserved attributes seeded empty.
    pub fn new() -> Self {
        let mut attributes = AttrMap::new();
        attributes.insert(attr::OP.into(), AttrValue::Str("value".into()));
        for key in [
            attr::SUBJECT,
            attr::PROPERTY,
            attr::OBJECT,
            attr::OPVAR,
            attr::TIME,
            attr::EXPLAIN,
            attr::FNPLOT,
            attr::CONTEXT,
        ] {
            attributes.insert(key.into(), AttrValue::Empty);
        }
        attributes.insert(attr::COV.into(), AttrValue::Num(0.0));
        Self {
            id: "0".into(),
            attributes,
            meta: Meta::default(),
        }
    }

    /// Parse a query alist from JSON, validating the reserved keys needed to
    /// schedule it. This is the only place malformed input is surfaced; by the
    /// time a session exists the query is known well-formed.
    pub fn from_json(value: &Value) -> Result<Alist, QueryError> {
        let obj = value.as_object().ok_or(QueryError::NotAnObject)?;
        let mut alist = Alist::new();
        for (k, v) in obj {
            if k == attr::ID {
                alist.id = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                continue;
            }
            alist.attributes.insert(k.clone(), AttrValue::from_json(v));
        }
        match alist.attributes.get(attr::OP) {
            Some(AttrValue::Str(_)) => {}
            _ => {
                return Err(QueryError::Malformed {
                    message: "missing or non-string operation code 'h'".into(),
                });
            }
        }
        if alist
            .attributes
            .get(attr::OPVAR)
            .is_none_or(|v| v.is_empty_like())
        {
            return Err(QueryError::Malformed {
                message: "missing operation variable 'v'".into(),
            });
        }
        Ok(alist)
    }

    /// Parse a query from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Alist, QueryError> {
        let value: Value =
            serde_json::from_str(text).map_err(|source| QueryError::Json { source })?;
        Alist::from_json(&value)
    }

    /// Attribute mapping as JSON (including the id).
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(attr::ID.into(), Value::String(self.id.clone()));
        for (k, v) in &self.attributes {
            obj.insert(k.clone(), v.to_json());
        }
        Value::Object(obj)
    }

    /// Attribute mapping plus flattened metadata, for UI export and snapshots.
    pub fn to_json_with_meta(&self) -> Value {
        let mut value = self.to_json();
        if let Value::Object(obj) = &mut value {
            obj.insert("cost".into(), json!(self.meta.cost));
            obj.insert("depth".into(), json!(self.meta.depth));
            obj.insert("state".into(), json!(self.meta.state.as_str()));
            obj.insert("node_type".into(), json!(self.meta.kind.as_str()));
            obj.insert("is_map".into(), json!(self.meta.is_map));
            obj.insert(
                "data_sources".into(),
                json!(self.meta.data_sources.iter().collect::<Vec<_>>()),
            );
        }
        value
    }

    // -- attribute access ---------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: &str, value: AttrValue) {
        if name == attr::ID {
            self.id = value.display_string();
            return;
        }
        self.attributes.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &AttrMap {
        &self.attributes
    }

    /// Operation code (`h`), lowercased.
    pub fn op(&self) -> String {
        match self.attributes.get(attr::OP) {
            Some(AttrValue::Str(s)) => s.to_ascii_lowercase(),
            _ => "value".into(),
        }
    }

    pub fn set_op(&mut self, op: &str) {
        self.attributes
            .insert(attr::OP.into(), AttrValue::Str(op.into()));
    }

    /// Variable names in the operation-variable attribute (`v`).
    pub fn op_var_names(&self) -> Vec<String> {
        match self.attributes.get(attr::OPVAR) {
            Some(AttrValue::Var(name)) => vec![name.clone()],
            Some(AttrValue::List(items)) => items
                .iter()
                .filter_map(|v| match v {
                    AttrValue::Var(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            Some(AttrValue::Str(s)) if is_var_name(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    // -- variable model -----------------------------------------------------

    /// All variable names appearing as attribute keys or values.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for (k, v) in &self.attributes {
            if is_var_name(k) {
                names.insert(k.clone());
            }
            if let AttrValue::Var(name) = v {
                names.insert(name.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Attribute names that are variables or hold variable references.
    fn variable_attr_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for (k, v) in &self.attributes {
            if is_var_name(k) || matches!(v, AttrValue::Var(_)) {
                names.insert(k.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Ensure every referenced variable exists as a key, synthesize the default
    /// projection variable when needed, and seed the operation-value slot.
    pub fn check_variables(&mut self) {
        for name in self.variable_names() {
            self.attributes
                .entry(name)
                .or_insert(AttrValue::Empty);
        }

        let op_vars = self.op_var_names();
        if self.projection_variable_names().is_empty() {
            if op_vars.len() > 1 {
                self.attributes
                    .insert(attr::PRJVAR.into(), AttrValue::Empty);
            } else if op_vars.len() == 1 {
                self.attributes
                    .insert(attr::PRJVAR.into(), AttrValue::Var(op_vars[0].clone()));
            }
        }

        self.attributes
            .entry(attr::OPVALUE.into())
            .or_insert(AttrValue::Empty);
    }

    /// True if the synthetic default projection variable is present.
    pub fn has_default_projection_variable(&self) -> bool {
        self.attributes.contains_key(attr::PRJVAR)
    }

    /// Create a template copy: fresh identity, reset cost/depth, metadata reset
    /// except the data-source set, and the default projection variable removed.
    pub fn copy(&self, same_state: bool) -> Alist {
        let mut attributes = self.attributes.clone();
        attributes.remove(attr::PRJVAR);
        let mut meta = self.meta.clone();
        meta.cost = 0.0;
        meta.depth = 0;
        meta.is_frontier = false;
        if !same_state {
            meta.state = State::Unexplored;
        }
        Alist {
            id: "0".into(),
            attributes,
            meta,
        }
    }

    /// True if the attribute's value, followed transitively through variable
    /// indirection, resolves to a non-empty literal.
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.is_instantiated_inner(name, &mut HashSet::new())
    }

    fn is_instantiated_inner(&self, name: &str, seen: &mut HashSet<String>) -> bool {
        if !seen.insert(name.to_string()) {
            return false; // cyclic variable reference
        }
        match self.attributes.get(name) {
            None | Some(AttrValue::Empty) => false,
            Some(AttrValue::Str(s)) => !s.trim().is_empty(),
            Some(AttrValue::Num(_)) => true,
            Some(AttrValue::Var(target)) => self.is_instantiated_inner(target, seen),
            Some(AttrValue::Nested(_)) => false,
            Some(AttrValue::List(items)) => !items.is_empty(),
        }
    }

    /// True if every variable in the alist is instantiated.
    pub fn is_all_instantiated(&self) -> bool {
        self.variable_names().iter().all(|v| self.is_instantiated(v))
    }

    /// Resolved value of an attribute: follows variable indirection until a
    /// non-variable value is reached. `None` for missing, empty, dangling, or
    /// nested-mapping values ("no value", not failure).
    pub fn instantiation_value(&self, name: &str) -> Option<AttrValue> {
        self.instantiation_value_inner(name, &mut HashSet::new())
    }

    fn instantiation_value_inner(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
    ) -> Option<AttrValue> {
        if !seen.insert(name.to_string()) {
            return None;
        }
        match self.attributes.get(name)? {
            AttrValue::Nested(_) | AttrValue::Empty => None,
            AttrValue::Var(target) => {
                let target = target.clone();
                self.instantiation_value_inner(&target, seen)
            }
            other => Some(other.clone()),
        }
    }

    /// Scalar value of the first projection variable, if resolved.
    pub fn projected_value(&self) -> Option<AttrValue> {
        let names = self.projection_variable_names();
        let value = self.instantiation_value(names.first()?)?;
        match value {
            AttrValue::List(_) | AttrValue::Nested(_) => None,
            other => Some(other),
        }
    }

    /// Combined operation value: the `__v__` slot if filled, else the values of
    /// all operation variables JSON-encoded as a list. `None` when any
    /// operation variable is still unresolved.
    pub fn operation_variable_value(&self) -> Option<AttrValue> {
        if let Some(v) = self.attributes.get(attr::OPVALUE)
            && !v.is_empty_like()
        {
            return Some(v.clone());
        }
        if let Some(AttrValue::List(_)) = self.attributes.get(attr::OPVAR) {
            let mut values = Vec::new();
            for name in self.op_var_names() {
                values.push(self.instantiation_value(&name)?);
            }
            if values.is_empty() {
                return None;
            }
            let encoded =
                Value::Array(values.iter().map(|v| v.to_json()).collect()).to_string();
            return Some(AttrValue::Str(encoded));
        }
        None
    }

    /// Attribute names whose value references the given variable.
    pub fn variable_references(&self, var_name: &str) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, v)| matches!(v, AttrValue::Var(name) if name == var_name))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Attribute names starting with the projection sigil.
    pub fn projection_variable_names(&self) -> Vec<String> {
        self.attributes
            .keys()
            .filter(|k| VarKind::of(k) == Some(VarKind::Projection))
            .cloned()
            .collect()
    }

    /// Variable-named attributes holding nested sub-queries, excluding the
    /// context bag. Non-empty means the alist must be normalized before search.
    pub fn uninstantiated_nesting_variables(&self) -> Vec<(String, AttrMap)> {
        self.attributes
            .iter()
            .filter(|(k, _)| is_var_name(k) && k.as_str() != attr::CONTEXT)
            .filter_map(|(k, v)| match v {
                AttrValue::Nested(map) => Some((k.clone(), map.clone())),
                _ => None,
            })
            .collect()
    }

    /// Variable attributes that resolved to a concrete value.
    pub fn instantiated_attributes(&self) -> Vec<(String, AttrValue)> {
        self.attributes
            .iter()
            .filter(|(k, _)| self.is_instantiated(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Variable attribute names that are still unresolved.
    pub fn uninstantiated_attributes(&self) -> Vec<String> {
        self.variable_attr_names()
            .into_iter()
            .filter(|name| !self.is_instantiated(name))
            .collect()
    }

    /// Instantiate a variable and every attribute that references it.
    ///
    /// Propagation is by textual equality against the variable name, not full
    /// unification: two unrelated attributes sharing a variable-shaped string
    /// will both be rewritten. This matches the documented engine behavior and
    /// is a known sharp edge.
    pub fn instantiate_variable(&mut self, name: &str, value: AttrValue) {
        self.attributes.insert(name.to_string(), value.clone());

        let referencing: Vec<String> = self
            .attributes
            .iter()
            .filter(|(k, v)| {
                is_var_name(k)
                    && match v {
                        AttrValue::Var(n) => n == name,
                        AttrValue::Str(s) => s == name,
                        _ => false,
                    }
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in referencing {
            self.attributes.insert(key, value.clone());
        }
    }

    /// Instantiate several variables positionally. A count mismatch is a no-op.
    pub fn instantiate_each(&mut self, names: &[String], values: &[AttrValue]) {
        let names: Vec<&String> = names.iter().filter(|n| is_var_name(n)).collect();
        if names.len() != values.len() {
            return;
        }
        for (name, value) in names.into_iter().zip(values) {
            self.instantiate_variable(name, value.clone());
        }
    }

    /// Record a contributing knowledge source.
    pub fn add_data_source(&mut self, name: &str) {
        self.meta.data_sources.insert(name.to_string());
    }
}

impl fmt::Display for Alist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
