//! Path-based reads and writes on a configuration tree.
//!
//! Paths are split on [`Options::path_sep`] and always start at the root;
//! leading separators are ignored here. Raw reads return the stored
//! [`Value`]; everything else goes through [`Config::evaluate`], so
//! references are followed and splices are rendered.

use crate::error::ConfigError;
use crate::normalize::normalize_value;
use crate::path::Path;
use crate::reflect::Reflect;
use crate::tree::Config;
use crate::types::{Context, Options, Value, ValueKind};

impl Config {
    /// The stored value at `path`, without evaluating references.
    pub fn get(&self, path: &str, opts: &Options) -> Result<&Value, ConfigError> {
        Path::field(path, opts.path_sep).get_value(self, self.root())
    }

    /// The effective value at `path`.
    pub fn resolve(&self, path: &str, opts: &Options) -> Result<ValueKind, ConfigError> {
        let value = self.get(path, opts)?;
        self.evaluate(value, opts)
    }

    /// Whether `path` names a value. Nil placeholders count as present.
    pub fn has_field(&self, path: &str, opts: &Options) -> Result<bool, ConfigError> {
        match self.get(path, opts) {
            Ok(_) => Ok(true),
            Err(err) if err.is_missing() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Field names of the root, in insertion order. Empty for array roots.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root_node()
            .as_map()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }

    /// Number of fields or items at the root.
    pub fn len(&self) -> usize {
        self.root_node().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_node().is_empty()
    }

    pub fn is_array(&self) -> bool {
        self.root_node().is_array()
    }

    /// Normalize `input` and store it at `path`, replacing whatever was
    /// there. Missing intermediate objects are created.
    ///
    /// The input is normalized into a scratch tree first, so a failing input
    /// leaves this configuration untouched.
    pub fn set<T: Reflect + ?Sized>(&mut self, path: &str, input: &T, opts: &Options) -> Result<(), ConfigError> {
        let mut scratch = Config::new();
        let scratch_root = scratch.root();
        let staged = normalize_value(opts, &mut scratch, Context::new(scratch_root, path), &input)?;

        let root = self.root();
        let value = self.import(&scratch, &staged, Context::new(root, path));
        let handle = value.as_sub();
        let result = Path::field(path, opts.path_sep).replace_value(self, root, value);
        if let (Err(_), Some(id)) = (&result, handle) {
            self.release(id);
        }
        result
    }

    pub fn bool(&self, path: &str, opts: &Options) -> Result<bool, ConfigError> {
        let (value, resolved) = self.typed(path, opts)?;
        match resolved {
            ValueKind::Bool(b) => Ok(b),
            ValueKind::String(s) => s
                .parse()
                .map_err(|_| self.mismatch(value, opts, format!("can not parse '{}' as bool", s))),
            other => Err(self.mismatch(value, opts, format!("expected bool, found {}", other.type_name()))),
        }
    }

    /// Signed integer at `path`. Unsigned values that fit are accepted.
    pub fn int(&self, path: &str, opts: &Options) -> Result<i64, ConfigError> {
        let (value, resolved) = self.typed(path, opts)?;
        match resolved {
            ValueKind::Int(i) => Ok(i),
            ValueKind::Uint(u) => {
                i64::try_from(u).map_err(|_| self.mismatch(value, opts, format!("{} overflows int", u)))
            }
            ValueKind::String(s) => s
                .parse()
                .map_err(|_| self.mismatch(value, opts, format!("can not parse '{}' as int", s))),
            other => Err(self.mismatch(value, opts, format!("expected int, found {}", other.type_name()))),
        }
    }

    /// Unsigned integer at `path`. Non-negative signed values are accepted.
    pub fn uint(&self, path: &str, opts: &Options) -> Result<u64, ConfigError> {
        let (value, resolved) = self.typed(path, opts)?;
        match resolved {
            ValueKind::Uint(u) => Ok(u),
            ValueKind::Int(i) => {
                u64::try_from(i).map_err(|_| self.mismatch(value, opts, format!("{} is negative", i)))
            }
            ValueKind::String(s) => s
                .parse()
                .map_err(|_| self.mismatch(value, opts, format!("can not parse '{}' as uint", s))),
            other => Err(self.mismatch(value, opts, format!("expected uint, found {}", other.type_name()))),
        }
    }

    pub fn float(&self, path: &str, opts: &Options) -> Result<f64, ConfigError> {
        let (value, resolved) = self.typed(path, opts)?;
        match resolved {
            ValueKind::Float(f) => Ok(f),
            ValueKind::Int(i) => Ok(i as f64),
            ValueKind::Uint(u) => Ok(u as f64),
            ValueKind::String(s) => s
                .parse()
                .map_err(|_| self.mismatch(value, opts, format!("can not parse '{}' as float", s))),
            other => Err(self.mismatch(value, opts, format!("expected float, found {}", other.type_name()))),
        }
    }

    /// String at `path`. Scalars are rendered; Nil renders as `""`.
    pub fn string(&self, path: &str, opts: &Options) -> Result<String, ConfigError> {
        let (value, resolved) = self.typed(path, opts)?;
        self.render(&resolved, value, opts)
    }

    fn typed(&self, path: &str, opts: &Options) -> Result<(&Value, ValueKind), ConfigError> {
        let value = self.get(path, opts)?;
        Ok((value, self.evaluate(value, opts)?))
    }

    fn mismatch(&self, value: &Value, opts: &Options, message: String) -> ConfigError {
        ConfigError::TypeMismatch {
            message,
            at: self.location(&value.ctx, opts.path_sep, value.metadata()),
        }
    }
}
