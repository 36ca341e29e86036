//! Conversion of configuration trees into owned JSON values.
//!
//! Two renderings are provided:
//!
//! - [`Config::to_json`] shows the tree as stored. References and splices
//!   appear as their source text and a literal `${` in a plain string is
//!   written as `$${`, so the output can be normalized again with variable
//!   expansion enabled to get the same tree back.
//! - [`Config::materialize`] evaluates every reference against the tree and
//!   produces the effective configuration.
//!
//! # Depth Limiting
//!
//! A reference may point at one of its own ancestors, which would make the
//! resolved rendering infinite. Materialization therefore enforces
//! [`Options::max_depth`] and fails with `NestingTooDeep` beyond it.

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value as Json};

use crate::error::ConfigError;
use crate::tree::Config;
use crate::types::{Fields, NodeId, Options, Value, ValueKind};

impl Config {
    /// The tree as stored, with references left unevaluated.
    pub fn to_json(&self) -> Json {
        self.raw_node(self.root())
    }

    /// The effective configuration, with every reference evaluated.
    pub fn materialize(&self, opts: &Options) -> Result<Json, ConfigError> {
        self.resolved_node(self.root(), opts, 0)
    }

    fn raw_node(&self, id: NodeId) -> Json {
        match &self.at(id).fields {
            Fields::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.raw_value(v)))
                    .collect(),
            ),
            Fields::Array(items) => Json::Array(items.iter().map(|v| self.raw_value(v)).collect()),
        }
    }

    fn raw_value(&self, value: &Value) -> Json {
        match &value.kind {
            ValueKind::Sub(id) => self.raw_node(*id),
            ValueKind::Ref(reference) => Json::String(reference.source()),
            ValueKind::Splice(splice) => Json::String(splice.source().to_string()),
            ValueKind::String(s) => Json::String(s.replace("${", "$${")),
            other => scalar(other),
        }
    }

    fn resolved_node(&self, id: NodeId, opts: &Options, depth: usize) -> Result<Json, ConfigError> {
        if depth > opts.max_depth {
            return Err(ConfigError::NestingTooDeep {
                max_depth: opts.max_depth,
                at: self.location(&self.at(id).ctx, opts.path_sep, self.at(id).metadata()),
            });
        }

        match &self.at(id).fields {
            Fields::Map(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), self.resolved_value(value, opts, depth)?);
                }
                Ok(Json::Object(out))
            }
            Fields::Array(items) => items
                .iter()
                .map(|value| self.resolved_value(value, opts, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
        }
    }

    fn resolved_value(&self, value: &Value, opts: &Options, depth: usize) -> Result<Json, ConfigError> {
        match self.evaluate(value, opts)? {
            ValueKind::Sub(id) => self.resolved_node(id, opts, depth + 1),
            other => Ok(scalar(&other)),
        }
    }
}

/// JSON form of a leaf. Non-finite floats have no JSON form and become null.
fn scalar(kind: &ValueKind) -> Json {
    match kind {
        ValueKind::Bool(b) => Json::Bool(*b),
        ValueKind::Int(i) => Json::Number((*i).into()),
        ValueKind::Uint(u) => Json::Number((*u).into()),
        ValueKind::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        ValueKind::String(s) => Json::String(s.clone()),
        ValueKind::Nil | ValueKind::Sub(_) | ValueKind::Ref(_) | ValueKind::Splice(_) => Json::Null,
    }
}

/// Serializes the stored tree, as [`Config::to_json`] does.
impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
