//! Path parsing and path-based access into a configuration tree.
//!
//! A path is a list of field names joined by a single separator character,
//! e.g. `server.tls.cert`. Numeric segments index array-form nodes. Leading
//! separators make a path relative: `.port` names a sibling of the value that
//! contains the path, `..port` a sibling of its parent, and so on.

use std::fmt;

use crate::error::ConfigError;
use crate::tree::Config;
use crate::types::{Context, Fields, Node, NodeId, Value, ValueKind};

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    up: usize,
    segments: Vec<String>,
    sep: char,
}

impl Path {
    /// Parse `name`, honoring leading separators as relative markers.
    pub fn parse(name: &str, sep: char) -> Self {
        let trimmed = name.trim_start_matches(sep);
        let up = name[..name.len() - trimmed.len()].chars().count();
        Self {
            up,
            segments: split_segments(trimmed, sep),
            sep,
        }
    }

    /// Parse a field name. Leading separators are ignored, so the result is
    /// always relative to the node being written.
    pub fn field(name: &str, sep: char) -> Self {
        Self {
            up: 0,
            segments: split_segments(name, sep),
            sep,
        }
    }

    pub fn is_relative(&self) -> bool {
        self.up > 0
    }

    /// Number of leading separators; `0` for absolute paths.
    pub fn up(&self) -> usize {
        self.up
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Descend from `start` and return the value at this path.
    ///
    /// Fails with `Missing` on the first absent segment (a Nil placeholder on
    /// the way counts as absent) and with `TypeMismatch` when an intermediate
    /// value is not a node or an array is addressed by a non-numeric name.
    /// A `start` handle that no longer names a node of `cfg` is an
    /// `InvalidNode` error.
    pub fn get_value<'a>(&self, cfg: &'a Config, start: NodeId) -> Result<&'a Value, ConfigError> {
        let start_node = cfg.checked(start)?;
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(ConfigError::Missing {
                at: cfg.location(&start_node.ctx, self.sep, None),
            });
        };

        let mut node = start;
        for segment in parents {
            let value = self.child(cfg, node, segment)?;
            node = match &value.kind {
                ValueKind::Sub(id) => *id,
                ValueKind::Nil => {
                    return Err(ConfigError::Missing {
                        at: cfg.location(&value.ctx, self.sep, value.metadata()),
                    });
                }
                other => {
                    return Err(ConfigError::TypeMismatch {
                        message: format!("expected object, found {}", other.type_name()),
                        at: cfg.location(&value.ctx, self.sep, value.metadata()),
                    });
                }
            };
        }
        self.child(cfg, node, last)
    }

    /// Write `value` at this path below `start`, creating missing
    /// intermediate mapping nodes.
    ///
    /// The leaf obeys the duplicate-key rule: writing over an existing
    /// non-Nil value is a `DuplicateKey` error unless the new value is Nil, in
    /// which case the write is dropped. An existing Nil is a placeholder and
    /// is overwritten.
    pub fn set_value(&self, cfg: &mut Config, start: NodeId, value: Value) -> Result<(), ConfigError> {
        let slot = self.leaf_slot(cfg, start, &value)?;
        if let Some(existing) = slot.parent.and_then(|node| cfg.at(node).child(&slot.field)) {
            if !existing.is_nil() {
                if value.is_nil() {
                    return Ok(());
                }
                return Err(ConfigError::DuplicateKey {
                    at: cfg.location(&slot, self.sep, value.metadata()),
                });
            }
        }
        write_child(cfg, slot, value, self.sep)
    }

    /// Like [`set_value`](Self::set_value), but an existing value at the
    /// leaf is replaced.
    pub fn replace_value(&self, cfg: &mut Config, start: NodeId, value: Value) -> Result<(), ConfigError> {
        let slot = self.leaf_slot(cfg, start, &value)?;
        write_child(cfg, slot, value, self.sep)
    }

    fn leaf_slot(&self, cfg: &mut Config, start: NodeId, value: &Value) -> Result<Context, ConfigError> {
        let start_node = cfg.checked(start)?;
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(ConfigError::TypeMismatch {
                message: "can not set a value at an empty path".to_string(),
                at: cfg.location(&start_node.ctx, self.sep, value.metadata()),
            });
        };

        let mut node = start;
        for segment in parents {
            node = self.child_node_or_create(cfg, node, segment, value)?;
        }
        Ok(Context::new(node, last.clone()))
    }

    fn child<'a>(&self, cfg: &'a Config, node: NodeId, segment: &str) -> Result<&'a Value, ConfigError> {
        let n = cfg.at(node);
        let found = match &n.fields {
            Fields::Map(map) => map.get(segment),
            Fields::Array(items) => match segment.parse::<usize>() {
                Ok(index) => items.get(index),
                Err(_) => {
                    return Err(ConfigError::TypeMismatch {
                        message: format!("can not access array with field name '{}'", segment),
                        at: cfg.location(&Context::new(node, segment), self.sep, n.metadata()),
                    });
                }
            },
        };
        found.ok_or_else(|| ConfigError::Missing {
            at: cfg.location(&Context::new(node, segment), self.sep, n.metadata()),
        })
    }

    fn child_node_or_create(
        &self,
        cfg: &mut Config,
        node: NodeId,
        segment: &str,
        value: &Value,
    ) -> Result<NodeId, ConfigError> {
        if let Fields::Array(_) = cfg.at(node).fields {
            if segment.parse::<usize>().is_err() {
                return Err(ConfigError::TypeMismatch {
                    message: format!("can not access array with field name '{}'", segment),
                    at: cfg.location(&Context::new(node, segment), self.sep, value.metadata()),
                });
            }
        }

        match cfg.at(node).child(segment) {
            Some(existing) => match &existing.kind {
                ValueKind::Sub(id) => return Ok(*id),
                ValueKind::Nil => {}
                other => {
                    return Err(ConfigError::TypeMismatch {
                        message: format!("expected object, found {}", other.type_name()),
                        at: cfg.location(&existing.ctx, self.sep, existing.metadata()),
                    });
                }
            },
            None => {}
        }

        let id = cfg.alloc(Node::map(value.meta.clone()));
        let sub = Value::new(ValueKind::Sub(id), value.meta.clone());
        write_child(cfg, Context::new(node, segment), sub, self.sep)?;
        Ok(id)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.up {
            write!(f, "{}", self.sep)?;
        }
        write!(f, "{}", self.segments.join(&self.sep.to_string()))
    }
}

fn split_segments(name: &str, sep: char) -> Vec<String> {
    name.split(sep)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unconditionally store `value` in the slot named by `slot`. Array slots
/// past the end are padded with Nil.
pub(crate) fn write_child(cfg: &mut Config, slot: Context, value: Value, sep: char) -> Result<(), ConfigError> {
    let Some(node) = slot.parent else {
        return Err(ConfigError::TypeMismatch {
            message: "can not write a value without a parent".to_string(),
            at: cfg.location(&slot, sep, value.metadata()),
        });
    };

    let index = match cfg.at(node).fields {
        Fields::Map(_) => None,
        Fields::Array(_) => match slot.field.parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                return Err(ConfigError::TypeMismatch {
                    message: format!("can not access array with field name '{}'", slot.field),
                    at: cfg.location(&slot, sep, value.metadata()),
                });
            }
        },
    };

    let value = cfg.attach(value, slot.clone());
    let pad_meta = value.meta.clone();
    let replaced = match (&mut cfg.at_mut(node).fields, index) {
        (Fields::Map(map), _) => map.insert(slot.field, value),
        (Fields::Array(items), Some(index)) => {
            while items.len() < index {
                let mut pad = Value::nil(pad_meta.clone());
                pad.ctx = Context::new(node, items.len().to_string());
                items.push(pad);
            }
            if index == items.len() {
                items.push(value);
                None
            } else {
                Some(std::mem::replace(&mut items[index], value))
            }
        }
        (Fields::Array(_), None) => None,
    };

    if let Some(old) = replaced {
        cfg.release_value(&old);
    }
    Ok(())
}

/// Build a mapping from field name to value in a fresh node of `cfg`.
#[cfg(test)]
pub(crate) fn map_node(cfg: &mut Config, entries: Vec<(&str, Value)>) -> NodeId {
    let id = cfg.alloc(Node::map(None));
    let mut map = indexmap::IndexMap::new();
    for (k, v) in entries {
        let v = cfg.attach(v, Context::new(id, k));
        map.insert(k.to_string(), v);
    }
    cfg.at_mut(id).fields = Fields::Map(map);
    id
}
