//! Core type definitions: options, metadata and the value model.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::splice::{Reference, Splice};

/// Provenance information stamped on every value produced by an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Identifier of the input the value came from (file name, flag, ...).
    pub source: Option<String>,
}

impl Metadata {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

/// Fallback lookup for references that are missing from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolver {
    /// Process environment variables, keyed by the reference's raw path.
    Env,
    /// A fixed table of values.
    Static(IndexMap<String, String>),
}

impl Resolver {
    /// Look up `key`, returning its string value if this resolver knows it.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match self {
            Resolver::Env => std::env::var(key).ok(),
            Resolver::Static(values) => values.get(key).cloned(),
        }
    }
}

/// Settings threaded through every normalize, merge and lookup call.
///
/// Deserializable so that engine settings can be loaded alongside the rest of
/// an application's configuration; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Tag key under which record fields carry `name,option...` annotations.
    pub tag: String,

    /// Separator between path segments. With `:` as separator, references
    /// can not carry a `${path:default}` fallback.
    pub path_sep: char,

    /// Parse `${...}` references in string values.
    pub var_exp: bool,

    /// Metadata stamped on produced values.
    pub metadata: Option<Metadata>,

    /// Consulted in order when a reference is missing from the tree.
    pub resolvers: Vec<Resolver>,

    /// Bound on tree nesting and on reference evaluation depth.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tag: "config".to_string(),
            path_sep: '.',
            var_exp: false,
            metadata: None,
            resolvers: Vec::new(),
            max_depth: 256,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_path_sep(mut self, sep: char) -> Self {
        self.path_sep = sep;
        self
    }

    /// Enable or disable variable expansion.
    pub fn with_var_exp(mut self, enabled: bool) -> Self {
        self.var_exp = enabled;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub(crate) fn shared_metadata(&self) -> Option<Arc<Metadata>> {
        self.metadata.clone().map(Arc::new)
    }
}

/// Handle to a node inside a [`Config`](crate::Config) arena.
///
/// Handles are only meaningful for the configuration that produced them.
/// A slot released by a merge is reused under a new generation, so a stale
/// handle never addresses the node that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// Position of a value or node in its tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Node containing this value; `None` for a root or detached value.
    pub parent: Option<NodeId>,
    /// Field name, or the stringified index for array elements.
    pub field: String,
}

impl Context {
    pub fn new(parent: NodeId, field: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            field: field.into(),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }
}

/// The kind of a configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Nil,
    /// A nested mapping- or array-form node.
    Sub(NodeId),
    /// A string that is exactly one `${...}` reference.
    Ref(Reference),
    /// A string mixing literal text and references.
    Splice(Splice),
}

impl ValueKind {
    /// Short human-readable name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Uint(_) => "uint",
            ValueKind::Float(_) => "float",
            ValueKind::String(_) => "string",
            ValueKind::Nil => "nil",
            ValueKind::Sub(_) => "object",
            ValueKind::Ref(_) => "reference",
            ValueKind::Splice(_) => "splice",
        }
    }
}

/// A value in a configuration tree, with its position and provenance.
#[derive(Debug, Clone)]
pub struct Value {
    pub(crate) kind: ValueKind,
    pub(crate) ctx: Context,
    pub(crate) meta: Option<Arc<Metadata>>,
}

impl Value {
    pub fn new(kind: ValueKind, meta: Option<Arc<Metadata>>) -> Self {
        Self {
            kind,
            ctx: Context::detached(),
            meta,
        }
    }

    pub fn nil(meta: Option<Arc<Metadata>>) -> Self {
        Self::new(ValueKind::Nil, meta)
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.meta.as_deref()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind, ValueKind::Nil)
    }

    /// The sub-tree handle, if this value is a nested node.
    pub fn as_sub(&self) -> Option<NodeId> {
        match self.kind {
            ValueKind::Sub(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn source(&self) -> Option<String> {
        self.meta.as_ref().and_then(|m| m.source.clone())
    }
}

/// Children of a node: a mapping or an array, never both.
#[derive(Debug, Clone)]
pub enum Fields {
    Map(IndexMap<String, Value>),
    Array(Vec<Value>),
}

/// A node of the configuration tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) fields: Fields,
    pub(crate) ctx: Context,
    pub(crate) meta: Option<Arc<Metadata>>,
}

impl Node {
    pub(crate) fn map(meta: Option<Arc<Metadata>>) -> Self {
        Self {
            fields: Fields::Map(IndexMap::new()),
            ctx: Context::detached(),
            meta,
        }
    }

    pub(crate) fn array(items: Vec<Value>, meta: Option<Arc<Metadata>>) -> Self {
        Self {
            fields: Fields::Array(items),
            ctx: Context::detached(),
            meta,
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.meta.as_deref()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.fields, Fields::Array(_))
    }

    /// Mapping entries, if this is a mapping-form node.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match &self.fields {
            Fields::Map(map) => Some(map),
            Fields::Array(_) => None,
        }
    }

    /// Array items, if this is an array-form node.
    pub fn as_array(&self) -> Option<&[Value]> {
        match &self.fields {
            Fields::Array(items) => Some(items),
            Fields::Map(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.fields {
            Fields::Map(map) => map.len(),
            Fields::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child under a field name; numeric names index arrays.
    pub fn child(&self, field: &str) -> Option<&Value> {
        match &self.fields {
            Fields::Map(map) => map.get(field),
            Fields::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }
}
