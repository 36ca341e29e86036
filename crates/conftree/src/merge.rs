//! Combining configuration trees.
//!
//! Merging walks the source tree and writes each field into the target:
//!
//! - a field absent from the target is copied in
//! - when both sides hold mapping nodes, the merge recurses into them
//! - anything else (scalars, arrays, references, Nil) replaces the target's
//!   value wholesale, so the later input wins
//!
//! Copied values keep their own metadata, so provenance survives the merge.
//! References are copied unevaluated and resolve against the merged tree.

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::normalize::normalize;
use crate::reflect::Reflect;
use crate::tree::Config;
use crate::types::{Context, Fields, NodeId, Options, Value};

/// Merge `source` into `target`. See [`Config::merge_config`].
pub fn merge(opts: &Options, target: &mut Config, source: &Config) -> Result<(), ConfigError> {
    target.merge_config(source, opts)
}

impl Config {
    /// Normalize `input` and merge the result into this tree.
    ///
    /// A normalization failure leaves the tree untouched.
    pub fn merge<T: Reflect + ?Sized>(&mut self, input: &T, opts: &Options) -> Result<(), ConfigError> {
        let other = normalize(opts, input)?;
        self.merge_config(&other, opts)
    }

    /// Merge several inputs in order; later inputs take precedence.
    ///
    /// All inputs are normalized before the first merge, so a malformed input
    /// leaves the tree untouched.
    pub fn merge_all<'a, I, T>(&mut self, inputs: I, opts: &Options) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = &'a T>,
        T: Reflect + ?Sized + 'a,
    {
        let normalized = inputs
            .into_iter()
            .map(|input| normalize(opts, input))
            .collect::<Result<Vec<_>, _>>()?;
        for other in &normalized {
            self.merge_config(other, opts)?;
        }
        Ok(())
    }

    /// Merge an already-normalized tree into this one.
    ///
    /// If either root is in array form the target's root is replaced by a
    /// copy of the source root.
    ///
    /// Exceeding [`Options::max_depth`] fails with `NestingTooDeep`; fields
    /// merged before the failing one stay merged.
    pub fn merge_config(&mut self, other: &Config, opts: &Options) -> Result<(), ConfigError> {
        debug!(
            fields = other.root_node().len(),
            source = other.root_node().metadata().and_then(|m| m.source.as_deref()),
            "merging configuration"
        );

        let root = self.root();
        if self.at(root).is_array() || other.root_node().is_array() {
            debug!("array-form root, replacing target root");
            self.replace_root(other);
            return Ok(());
        }
        self.merge_nodes(root, other, other.root(), opts, 0)
    }

    fn merge_nodes(
        &mut self,
        to: NodeId,
        src: &Config,
        from: NodeId,
        opts: &Options,
        depth: usize,
    ) -> Result<(), ConfigError> {
        if depth > opts.max_depth {
            return Err(ConfigError::NestingTooDeep {
                max_depth: opts.max_depth,
                at: self.location(&self.at(to).ctx, opts.path_sep, None),
            });
        }

        let Fields::Map(entries) = &src.at(from).fields else {
            return Ok(());
        };

        for (key, value) in entries {
            let source_node = value.as_sub().filter(|id| !src.at(*id).is_array());
            let target_node = self.at(to)
                .child(key)
                .and_then(Value::as_sub)
                .filter(|id| !self.at(*id).is_array());

            if let (Some(target_node), Some(source_node)) = (target_node, source_node) {
                trace!(field = %key, "merging nested object");
                self.merge_nodes(target_node, src, source_node, opts, depth + 1)?;
                continue;
            }

            trace!(field = %key, kind = value.kind().type_name(), "setting field");
            let copy = self.import(src, value, Context::new(to, key.clone()));
            let replaced = match &mut self.at_mut(to).fields {
                Fields::Map(map) => map.insert(key.clone(), copy),
                Fields::Array(_) => None,
            };
            if let Some(old) = replaced {
                self.release_value(&old);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Metadata, ValueKind};

    fn opts() -> Options {
        Options::default()
    }

    fn tree(value: serde_json::Value) -> Config {
        normalize(&opts(), &value).unwrap()
    }

    fn get<'a>(cfg: &'a Config, path: &str) -> &'a ValueKind {
        crate::path::Path::parse(path, '.')
            .get_value(cfg, cfg.root())
            .unwrap()
            .kind()
    }

    #[test]
    fn test_later_scalar_wins() {
        let mut cfg = tree(json!({"a": 1, "b": "keep"}));
        cfg.merge(&json!({"a": 2}), &opts()).unwrap();
        assert_eq!(get(&cfg, "a"), &ValueKind::Uint(2));
        assert_eq!(get(&cfg, "b"), &ValueKind::String("keep".to_string()));
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let mut cfg = tree(json!({"server": {"host": "localhost", "port": 80}}));
        cfg.merge(&json!({"server": {"port": 8080, "tls": true}}), &opts())
            .unwrap();

        assert_eq!(get(&cfg, "server.host"), &ValueKind::String("localhost".to_string()));
        assert_eq!(get(&cfg, "server.port"), &ValueKind::Uint(8080));
        assert_eq!(get(&cfg, "server.tls"), &ValueKind::Bool(true));

        let server = cfg.root_node().child("server").unwrap().as_sub().unwrap();
        let keys: Vec<&str> = cfg.at(server).as_map().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["host", "port", "tls"]);
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let mut cfg = tree(json!({"list": [1, 2, 3]}));
        cfg.merge(&json!({"list": ["x"]}), &opts()).unwrap();

        let list = cfg.root_node().child("list").unwrap().as_sub().unwrap();
        assert_eq!(cfg.at(list).len(), 1);
        assert_eq!(get(&cfg, "list.0"), &ValueKind::String("x".to_string()));
    }

    #[test]
    fn test_object_replaces_scalar_and_back() {
        let mut cfg = tree(json!({"a": 1}));
        cfg.merge(&json!({"a": {"b": 2}}), &opts()).unwrap();
        assert_eq!(get(&cfg, "a.b"), &ValueKind::Uint(2));

        cfg.merge(&json!({"a": "flat"}), &opts()).unwrap();
        assert_eq!(get(&cfg, "a"), &ValueKind::String("flat".to_string()));
        assert_eq!(cfg.live_nodes(), 1);
    }

    #[test]
    fn test_nil_overrides_earlier_value() {
        let mut cfg = tree(json!({"a": 1}));
        cfg.merge(&json!({"a": null}), &opts()).unwrap();
        assert_eq!(get(&cfg, "a"), &ValueKind::Nil);
    }

    #[test]
    fn test_merge_all_in_order() {
        let first = json!({"a": 1, "b": 1});
        let second = json!({"b": 2, "c": 2});
        let third = json!({"c": 3});

        let mut cfg = Config::new();
        cfg.merge_all([&first, &second, &third], &opts()).unwrap();
        assert_eq!(get(&cfg, "a"), &ValueKind::Uint(1));
        assert_eq!(get(&cfg, "b"), &ValueKind::Uint(2));
        assert_eq!(get(&cfg, "c"), &ValueKind::Uint(3));
    }

    #[test]
    fn test_merge_all_is_atomic_on_normalize_failure() {
        let good = json!({"a": 1});
        let bad = json!([1, 2]);
        let mut cfg = Config::new();
        let err = cfg.merge_all([&good, &bad], &opts()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopLevelType);
        assert!(cfg.root_node().is_empty());
    }

    #[test]
    fn test_provenance_survives_merge() {
        let mut cfg = normalize(
            &opts().with_metadata(Metadata::from_source("base.yml")),
            &json!({"a": 1, "b": 1}),
        )
        .unwrap();
        let overlay = opts().with_metadata(Metadata::from_source("override.yml"));
        cfg.merge(&json!({"b": 2}), &overlay).unwrap();

        let source = |field: &str| {
            cfg.root_node()
                .child(field)
                .and_then(|v| v.metadata())
                .and_then(|m| m.source.clone())
        };
        assert_eq!(source("a").as_deref(), Some("base.yml"));
        assert_eq!(source("b").as_deref(), Some("override.yml"));
    }

    #[test]
    fn test_merged_values_are_reparented() {
        let mut cfg = tree(json!({"x": 0}));
        cfg.merge(&json!({"server": {"port": 1}}), &opts()).unwrap();

        let port = crate::path::Path::parse("server.port", '.')
            .get_value(&cfg, cfg.root())
            .unwrap();
        assert_eq!(cfg.path_of(port.context(), '.'), "server.port");
    }

    #[test]
    fn test_depth_limit() {
        let mut cfg = tree(json!({"a": {"b": {"c": 1}}}));
        let err = cfg
            .merge_config(&tree(json!({"a": {"b": {"c": 2}}})), &opts().with_max_depth(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_record_inputs() {
        let mut base = BTreeMap::new();
        base.insert("level", "info");
        let mut cfg = normalize(&opts(), &base).unwrap();

        let mut overlay = BTreeMap::new();
        overlay.insert("level", "debug");
        merge(&opts(), &mut cfg, &normalize(&opts(), &overlay).unwrap()).unwrap();
        assert_eq!(get(&cfg, "level"), &ValueKind::String("debug".to_string()));
    }
}
