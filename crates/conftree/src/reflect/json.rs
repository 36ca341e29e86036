//! `serde_json::Value` input.

use serde_json::Value;

use super::{Reflect, Shape};

impl Reflect for Value {
    fn reflect(&self) -> Shape<'_> {
        match self {
            Value::Null => Shape::Nil,
            Value::Bool(b) => Shape::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Shape::Unsigned(u)
                } else if let Some(i) = n.as_i64() {
                    Shape::Signed(i)
                } else if let Some(f) = n.as_f64() {
                    Shape::Float(f)
                } else {
                    Shape::Unsupported
                }
            }
            Value::String(s) => Shape::Str(s),
            Value::Array(items) => Shape::Seq(items.iter().map(|v| v as &dyn Reflect).collect()),
            Value::Object(map) => Shape::Map(
                map.iter()
                    .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                    .collect(),
            ),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "json null",
            Value::Bool(_) => "json bool",
            Value::Number(_) => "json number",
            Value::String(_) => "json string",
            Value::Array(_) => "json array",
            Value::Object(_) => "json object",
        }
    }
}
