//! Conversion of native inputs into canonical configuration trees.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::path::Path;
use crate::reflect::{Field, Reflect, Shape};
use crate::splice::{self, Expression};
use crate::tag::{field_name, parse_tag};
use crate::tree::Config;
use crate::types::{Context, Fields, Metadata, Node, NodeId, Options, Value, ValueKind};

/// Normalize `input` into a new configuration tree.
///
/// The input must reflect as a [`Config`], a mapping or a record; anything
/// else is `InvalidTopLevelType`. Within one call a field may be set once:
/// writing a second concrete value at the same path is `DuplicateKey`, while
/// a second Nil is dropped.
pub fn normalize<T: Reflect + ?Sized>(opts: &Options, input: &T) -> Result<Config, ConfigError> {
    debug!(type_name = input.type_name(), "normalizing configuration input");

    match input.reflect() {
        Shape::Config(cfg) => Ok(cfg.clone()),
        Shape::Record(fields) => {
            let mut cfg = Config::with_root(Node::map(opts.shared_metadata()));
            let root = cfg.root();
            Normalizer::new(opts, &mut cfg).record_into(root, &fields, 0)?;
            Ok(cfg)
        }
        Shape::Map(entries) => {
            let mut cfg = Config::with_root(Node::map(opts.shared_metadata()));
            let root = cfg.root();
            Normalizer::new(opts, &mut cfg).map_into(root, &entries, 0)?;
            Ok(cfg)
        }
        _ => Err(ConfigError::InvalidTopLevelType {
            type_name: input.type_name().to_string(),
        }),
    }
}

/// Normalize a single value into `cfg`'s arena, positioned at `ctx`.
///
/// The value is not inserted; callers place it with a path write.
pub(crate) fn normalize_value(
    opts: &Options,
    cfg: &mut Config,
    ctx: Context,
    input: &dyn Reflect,
) -> Result<Value, ConfigError> {
    Normalizer::new(opts, cfg).value(ctx, input, 1)
}

struct Normalizer<'a> {
    opts: &'a Options,
    meta: Option<Arc<Metadata>>,
    cfg: &'a mut Config,
}

impl<'a> Normalizer<'a> {
    fn new(opts: &'a Options, cfg: &'a mut Config) -> Self {
        Self {
            opts,
            meta: opts.shared_metadata(),
            cfg,
        }
    }

    fn record_into(&mut self, node: NodeId, fields: &[Field<'_>], depth: usize) -> Result<(), ConfigError> {
        for field in fields {
            let (tag_name, tag_opts) = parse_tag(field.tag_value(&self.opts.tag));
            if tag_opts.ignore {
                continue;
            }

            if tag_opts.squash {
                self.squash_into(node, field, depth)?;
            } else {
                let name = field_name(&tag_name, field.name());
                let sep = tag_opts.path_sep.unwrap_or(self.opts.path_sep);
                self.set_field(node, &name, sep, field.value(), depth)?;
            }
        }
        Ok(())
    }

    fn squash_into(&mut self, node: NodeId, field: &Field<'_>, depth: usize) -> Result<(), ConfigError> {
        match field.value().reflect() {
            Shape::Record(inner) => self.record_into(node, &inner, depth),
            Shape::Map(entries) => self.map_into(node, &entries, depth),
            Shape::Config(other) => self.config_into(node, other),
            _ => Err(ConfigError::SquashNeedsObject {
                field: field.name().to_string(),
                type_name: field.value().type_name().to_string(),
                at: self.cfg.location(&self.cfg.at(node).ctx, self.opts.path_sep, self.meta.as_deref()),
            }),
        }
    }

    fn map_into(
        &mut self,
        node: NodeId,
        entries: &[(&dyn Reflect, &dyn Reflect)],
        depth: usize,
    ) -> Result<(), ConfigError> {
        for (key, value) in entries {
            let Shape::Str(name) = key.reflect() else {
                return Err(ConfigError::KeyInvalidType {
                    type_name: key.type_name().to_string(),
                    at: self.cfg.location(&self.cfg.at(node).ctx, self.opts.path_sep, self.meta.as_deref()),
                });
            };
            self.set_field(node, name, self.opts.path_sep, *value, depth)?;
        }
        Ok(())
    }

    /// Copy the mapping fields of an existing tree into `node`.
    fn config_into(&mut self, node: NodeId, other: &Config) -> Result<(), ConfigError> {
        let Fields::Map(map) = &other.root_node().fields else {
            return Err(ConfigError::SquashNeedsObject {
                field: other.node_path(other.root(), self.opts.path_sep),
                type_name: "array".to_string(),
                at: self.cfg.location(&self.cfg.at(node).ctx, self.opts.path_sep, self.meta.as_deref()),
            });
        };
        for (name, value) in map {
            let copy = self.cfg.import(other, value, Context::new(node, name.clone()));
            Path::field(name, self.opts.path_sep).set_value(self.cfg, node, copy)?;
        }
        Ok(())
    }

    fn set_field(
        &mut self,
        node: NodeId,
        name: &str,
        sep: char,
        input: &dyn Reflect,
        depth: usize,
    ) -> Result<(), ConfigError> {
        let value = self.value(Context::new(node, name), input, depth + 1)?;
        Path::field(name, sep).set_value(self.cfg, node, value)
    }

    fn new_node(&mut self, node: Node, ctx: &Context) -> NodeId {
        let id = self.cfg.alloc(node);
        self.cfg.at_mut(id).ctx = ctx.clone();
        id
    }

    fn value(&mut self, ctx: Context, input: &dyn Reflect, depth: usize) -> Result<Value, ConfigError> {
        if depth > self.opts.max_depth {
            return Err(ConfigError::NestingTooDeep {
                max_depth: self.opts.max_depth,
                at: self.cfg.location(&ctx, self.opts.path_sep, self.meta.as_deref()),
            });
        }

        let kind = match input.reflect() {
            Shape::Duration(d) => ValueKind::String(format_duration(d)),
            Shape::Pattern(source) => ValueKind::String(source.to_string()),
            Shape::Bool(b) => ValueKind::Bool(b),
            Shape::Signed(i) => match u64::try_from(i) {
                Ok(u) => ValueKind::Uint(u),
                Err(_) => ValueKind::Int(i),
            },
            Shape::Unsigned(u) => ValueKind::Uint(u),
            Shape::Float(f) => ValueKind::Float(f),
            Shape::Str(s) => self.string(&ctx, s)?,
            Shape::Seq(items) => {
                let id = self.new_node(Node::array(Vec::new(), self.meta.clone()), &ctx);
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    values.push(self.value(Context::new(id, i.to_string()), *item, depth + 1)?);
                }
                self.cfg.at_mut(id).fields = Fields::Array(values);
                ValueKind::Sub(id)
            }
            Shape::Map(entries) => {
                let id = self.new_node(Node::map(self.meta.clone()), &ctx);
                self.map_into(id, &entries, depth)?;
                ValueKind::Sub(id)
            }
            Shape::Record(fields) => {
                let id = self.new_node(Node::map(self.meta.clone()), &ctx);
                self.record_into(id, &fields, depth)?;
                ValueKind::Sub(id)
            }
            Shape::Config(other) => ValueKind::Sub(self.cfg.import_node(other, other.root(), ctx.clone())),
            Shape::Nil => ValueKind::Nil,
            Shape::Unsupported => {
                return Err(ConfigError::UnsupportedInputType {
                    type_name: input.type_name().to_string(),
                    at: self.cfg.location(&ctx, self.opts.path_sep, self.meta.as_deref()),
                });
            }
        };

        Ok(Value {
            kind,
            ctx,
            meta: self.meta.clone(),
        })
    }

    fn string(&self, ctx: &Context, s: &str) -> Result<ValueKind, ConfigError> {
        if !self.opts.var_exp {
            return Ok(ValueKind::String(s.to_string()));
        }

        match splice::parse(s, self.opts.path_sep) {
            Ok(Expression::Constant(text)) => Ok(ValueKind::String(text)),
            Ok(Expression::Reference(reference)) => Ok(ValueKind::Ref(reference)),
            Ok(Expression::Splice(splice)) => Ok(ValueKind::Splice(splice)),
            Err(err) => Err(ConfigError::ParseSplice {
                input: s.to_string(),
                message: err.to_string(),
                at: self.cfg.location(ctx, self.opts.path_sep, self.meta.as_deref()),
            }),
        }
    }
}

/// Render a duration as hours, minutes and fractional seconds, e.g.
/// `1h2m3.5s`, `1m30s` or `0s`. Spans under a second use the largest of
/// `ms`, `µs` and `ns` that keeps the integer part non-zero.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{}h", hours);
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{}m", minutes);
    }
    let rest = u128::from(secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos());
    let _ = write!(out, "{}s", decimal(rest, 1_000_000_000));
    out
}

/// `value / unit` as a decimal without trailing zeros.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;

    struct Inner {
        x: u32,
    }

    impl Reflect for Inner {
        fn reflect(&self) -> Shape<'_> {
            Shape::Record(vec![Field::new("x", &self.x)])
        }
    }

    struct Outer {
        inner: Inner,
        name: String,
    }

    impl Reflect for Outer {
        fn reflect(&self) -> Shape<'_> {
            Shape::Record(vec![
                Field::new("Inner", &self.inner).tag("config", ",squash"),
                Field::new("Name", &self.name),
            ])
        }
    }

    fn get(cfg: &Config, path: &str) -> ValueKind {
        Path::parse(path, '.')
            .get_value(cfg, cfg.root())
            .unwrap()
            .kind()
            .clone()
    }

    #[test]
    fn test_integer_sign_fidelity() {
        let mut input = BTreeMap::new();
        input.insert("pos", 5i64);
        input.insert("neg", -5i64);
        input.insert("zero", 0i64);
        let cfg = normalize(&Options::default(), &input).unwrap();

        assert_eq!(get(&cfg, "pos"), ValueKind::Uint(5));
        assert_eq!(get(&cfg, "neg"), ValueKind::Int(-5));
        assert_eq!(get(&cfg, "zero"), ValueKind::Uint(0));

        let mut unsigned = BTreeMap::new();
        unsigned.insert("u", 5u64);
        let cfg = normalize(&Options::default(), &unsigned).unwrap();
        assert_eq!(get(&cfg, "u"), ValueKind::Uint(5));
    }

    #[test]
    fn test_squash_flattens() {
        let input = Outer {
            inner: Inner { x: 1 },
            name: "n".to_string(),
        };
        let cfg = normalize(&Options::default(), &input).unwrap();

        assert_eq!(get(&cfg, "x"), ValueKind::Uint(1));
        assert_eq!(get(&cfg, "name"), ValueKind::String("n".to_string()));
        assert!(cfg.root_node().child("inner").is_none());
    }

    #[test]
    fn test_squash_needs_object() {
        struct Bad {
            n: u32,
        }
        impl Reflect for Bad {
            fn reflect(&self) -> Shape<'_> {
                Shape::Record(vec![Field::new("n", &self.n).tag("config", ",squash")])
            }
        }

        let err = normalize(&Options::default(), &Bad { n: 1 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SquashNeedsObject);
    }

    #[test]
    fn test_invalid_top_level() {
        let err = normalize(&Options::default(), &42u32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopLevelType);

        let err = normalize(&Options::default(), &vec![1u32]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopLevelType);
    }

    #[test]
    fn test_invalid_key_type() {
        let mut input = BTreeMap::new();
        input.insert(1u32, "one");
        let err = normalize(&Options::default(), &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyInvalidType);
    }

    #[test]
    fn test_unsupported_leaf_carries_path() {
        let mut input = BTreeMap::new();
        input.insert("big", u128::MAX);
        let err = normalize(&Options::default(), &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedInputType);
        assert_eq!(err.location().unwrap().path, "big");
    }

    #[test]
    fn test_dotted_keys_nest() {
        let mut input = BTreeMap::new();
        input.insert("server.port", 80u16);
        input.insert("server.host", 0u16);
        let cfg = normalize(&Options::default(), &input).unwrap();
        assert_eq!(get(&cfg, "server.port"), ValueKind::Uint(80));
        assert!(cfg.root_node().child("server").unwrap().as_sub().is_some());
    }

    #[test]
    fn test_tag_pathsep_and_ignore() {
        struct Paths {
            log: String,
            secret: String,
        }

        impl Reflect for Paths {
            fn reflect(&self) -> Shape<'_> {
                Shape::Record(vec![
                    Field::new("Log", &self.log).tag("config", "output/file.name,pathsep=/"),
                    Field::new("Secret", &self.secret).tag("config", ",ignore"),
                ])
            }
        }

        let input = Paths {
            log: "app.log".to_string(),
            secret: "hunter2".to_string(),
        };
        let cfg = normalize(&Options::default(), &input).unwrap();

        let output = cfg.root_node().child("output").unwrap().as_sub().unwrap();
        assert_eq!(
            cfg.at(output).child("file.name").map(Value::kind),
            Some(&ValueKind::String("app.log".to_string()))
        );
        assert!(cfg.root_node().child("secret").is_none());
    }

    #[test]
    fn test_array_order_and_context() {
        let mut input = BTreeMap::new();
        input.insert("list", vec!["a", "b", "c"]);
        let cfg = normalize(&Options::default(), &input).unwrap();

        let list = cfg.root_node().child("list").unwrap().as_sub().unwrap();
        let items = cfg.at(list).as_array().unwrap();
        let fields: Vec<_> = items.iter().map(|v| v.context().field.as_str()).collect();
        assert_eq!(fields, vec!["0", "1", "2"]);
        let values: Vec<_> = items.iter().map(|v| v.kind().clone()).collect();
        assert_eq!(
            values,
            vec![
                ValueKind::String("a".to_string()),
                ValueKind::String("b".to_string()),
                ValueKind::String("c".to_string()),
            ]
        );
        assert!(items.iter().all(|v| v.context().parent == Some(list)));
        assert_eq!(cfg.path_of(items[2].context(), '.'), "list.2");
    }

    #[test]
    fn test_special_types_render_as_strings() {
        let mut input = BTreeMap::new();
        input.insert("pattern", regex::Regex::new("^a+b$").unwrap());
        let cfg = normalize(&Options::default(), &input).unwrap();
        assert_eq!(get(&cfg, "pattern"), ValueKind::String("^a+b$".to_string()));

        let mut input = BTreeMap::new();
        input.insert("timeout", Duration::from_millis(1500));
        let cfg = normalize(&Options::default(), &input).unwrap();
        assert_eq!(get(&cfg, "timeout"), ValueKind::String("1.5s".to_string()));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(12)), "12ns");
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_millis(3_723_500)), "1h2m3.5s");
    }

    #[test]
    fn test_strings_parsed_only_with_var_exp() {
        let mut input = BTreeMap::new();
        input.insert("a", "${b}");
        input.insert("c", "x-${b}");
        input.insert("d", "plain");

        let cfg = normalize(&Options::default(), &input).unwrap();
        assert_eq!(get(&cfg, "a"), ValueKind::String("${b}".to_string()));

        let cfg = normalize(&Options::default().with_var_exp(true), &input).unwrap();
        assert!(matches!(get(&cfg, "a"), ValueKind::Ref(_)));
        assert!(matches!(get(&cfg, "c"), ValueKind::Splice(_)));
        assert_eq!(get(&cfg, "d"), ValueKind::String("plain".to_string()));
    }

    #[test]
    fn test_malformed_reference() {
        let mut input = BTreeMap::new();
        input.insert("a", "${b");
        let err = normalize(&Options::default().with_var_exp(true), &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseSplice);
        assert_eq!(err.location().unwrap().path, "a");
    }

    #[test]
    fn test_metadata_is_stamped() {
        let mut input = BTreeMap::new();
        input.insert("a", 1u8);
        let opts = Options::default().with_metadata(Metadata::from_source("defaults.yml"));
        let cfg = normalize(&opts, &input).unwrap();

        let value = cfg.root_node().child("a").unwrap();
        assert_eq!(
            value.metadata().and_then(|m| m.source.as_deref()),
            Some("defaults.yml")
        );
        assert_eq!(
            cfg.root_node().metadata().and_then(|m| m.source.as_deref()),
            Some("defaults.yml")
        );
    }

    #[test]
    fn test_nesting_limit() {
        let input = serde_json::json!({"a": {"b": {"c": 1}}});
        let err = normalize(&Options::default().with_max_depth(2), &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NestingTooDeep);
        assert!(normalize(&Options::default().with_max_depth(3), &input).is_ok());
    }
}
