//! `yaml_rust2::Yaml` input.

use yaml_rust2::Yaml;

use super::{Reflect, Shape};

impl Reflect for Yaml {
    fn reflect(&self) -> Shape<'_> {
        match self {
            Yaml::Null => Shape::Nil,
            Yaml::Boolean(b) => Shape::Bool(*b),
            Yaml::Integer(i) => Shape::Signed(*i),
            Yaml::Real(_) => self.as_f64().map_or(Shape::Unsupported, Shape::Float),
            Yaml::String(s) => Shape::Str(s),
            Yaml::Array(items) => Shape::Seq(items.iter().map(|v| v as &dyn Reflect).collect()),
            Yaml::Hash(hash) => Shape::Map(
                hash.iter()
                    .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                    .collect(),
            ),
            // Aliases are resolved by the loader; anything left over is invalid.
            Yaml::Alias(_) | Yaml::BadValue => Shape::Unsupported,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Yaml::Null => "yaml null",
            Yaml::Boolean(_) => "yaml bool",
            Yaml::Integer(_) => "yaml integer",
            Yaml::Real(_) => "yaml real",
            Yaml::String(_) => "yaml string",
            Yaml::Array(_) => "yaml array",
            Yaml::Hash(_) => "yaml hash",
            Yaml::Alias(_) => "yaml alias",
            Yaml::BadValue => "yaml bad value",
        }
    }
}
