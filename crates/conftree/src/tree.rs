//! The configuration tree arena.
//!
//! A [`Config`] owns every node of one tree in a flat arena. Values refer to
//! nested nodes by [`NodeId`] and nodes refer to their parent the same way, so
//! the upward links used for diagnostics and relative references never form
//! ownership cycles. Nodes displaced by a merge go back on a free list.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ConfigError, Location};
use crate::types::{Context, Fields, Metadata, Node, NodeId, Value, ValueKind};

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A canonical configuration tree.
#[derive(Debug, Clone)]
pub struct Config {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create an empty mapping-form configuration.
    pub fn new() -> Self {
        Self::with_root(Node::map(None))
    }

    /// Create an empty configuration whose root carries `metadata`.
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self::with_root(Node::map(Some(Arc::new(metadata))))
    }

    pub(crate) fn with_root(root: Node) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        self.at(self.root)
    }

    /// Look up a node by handle. Returns `None` for handles released by a
    /// merge or minted by another configuration.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Look up a node the caller handed in, failing on a stale handle.
    pub(crate) fn checked(&self, id: NodeId) -> Result<&Node, ConfigError> {
        self.node(id).ok_or(ConfigError::InvalidNode { node: id })
    }

    /// Number of nodes currently reachable or pending in the arena.
    pub fn live_nodes(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Node behind a handle minted by this arena.
    ///
    /// # Panics
    ///
    /// Panics on a stale handle. Handles from outside the crate go through
    /// [`Config::node`] or [`Config::checked`] instead.
    pub(crate) fn at(&self, id: NodeId) -> &Node {
        match self.node(id) {
            Some(node) => node,
            None => panic!("stale node handle {:?}", id),
        }
    }

    pub(crate) fn at_mut(&mut self, id: NodeId) -> &mut Node {
        match self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
        {
            Some(node) => node,
            None => panic!("stale node handle {:?}", id),
        }
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Return the sub-tree rooted at `id` to the free list.
    pub(crate) fn release(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let Some(slot) = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        let children: Vec<NodeId> = match &node.fields {
            Fields::Map(map) => map.values().filter_map(Value::as_sub).collect(),
            Fields::Array(items) => items.iter().filter_map(Value::as_sub).collect(),
        };
        for child in children {
            self.release(child);
        }
    }

    pub(crate) fn release_value(&mut self, value: &Value) {
        if let Some(id) = value.as_sub() {
            self.release(id);
        }
    }

    /// Place `value` at `ctx`, keeping a nested node's own context in sync.
    pub(crate) fn attach(&mut self, mut value: Value, ctx: Context) -> Value {
        if let Some(id) = value.as_sub() {
            self.at_mut(id).ctx = ctx.clone();
        }
        value.ctx = ctx;
        value
    }

    /// Deep-copy `value` from `src` into this arena, attached at `ctx`.
    pub(crate) fn import(&mut self, src: &Config, value: &Value, ctx: Context) -> Value {
        let kind = match &value.kind {
            ValueKind::Sub(id) => ValueKind::Sub(self.import_node(src, *id, ctx.clone())),
            other => other.clone(),
        };
        Value {
            kind,
            ctx,
            meta: value.meta.clone(),
        }
    }

    pub(crate) fn import_node(&mut self, src: &Config, src_id: NodeId, ctx: Context) -> NodeId {
        let src_node = src.at(src_id);
        let placeholder = match src_node.fields {
            Fields::Map(_) => Fields::Map(IndexMap::new()),
            Fields::Array(_) => Fields::Array(Vec::new()),
        };
        let id = self.alloc(Node {
            fields: placeholder,
            ctx,
            meta: src_node.meta.clone(),
        });

        let fields = match &src_node.fields {
            Fields::Map(map) => Fields::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.import(src, v, Context::new(id, k.clone()))))
                    .collect(),
            ),
            Fields::Array(items) => Fields::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.import(src, v, Context::new(id, i.to_string())))
                    .collect(),
            ),
        };
        self.at_mut(id).fields = fields;
        id
    }

    /// Replace the root's children with a deep copy of `src`'s root.
    pub(crate) fn replace_root(&mut self, src: &Config) {
        let root = self.root;
        let old: Vec<Value> = match &mut self.at_mut(root).fields {
            Fields::Map(map) => map.drain(..).map(|(_, v)| v).collect(),
            Fields::Array(items) => items.drain(..).collect(),
        };
        for value in &old {
            self.release_value(value);
        }

        let fields = match &src.root_node().fields {
            Fields::Map(map) => Fields::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.import(src, v, Context::new(root, k.clone()))))
                    .collect(),
            ),
            Fields::Array(items) => Fields::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.import(src, v, Context::new(root, i.to_string())))
                    .collect(),
            ),
        };
        self.at_mut(root).fields = fields;
    }

    /// Full path of the field described by `ctx`, rendered with `sep`.
    pub fn path_of(&self, ctx: &Context, sep: char) -> String {
        let mut segments = Vec::new();
        if ctx.parent.is_some() || !ctx.field.is_empty() {
            segments.push(ctx.field.as_str());
        }

        let mut current = ctx.parent;
        while let Some(id) = current {
            let Some(node) = self.node(id) else {
                break;
            };
            if node.ctx.parent.is_some() || !node.ctx.field.is_empty() {
                segments.push(node.ctx.field.as_str());
            }
            current = node.ctx.parent;
        }

        segments.reverse();
        segments.join(&sep.to_string())
    }

    /// Full path of a node, rendered with `sep`.
    pub fn node_path(&self, id: NodeId, sep: char) -> String {
        match self.node(id) {
            Some(node) => self.path_of(&node.ctx, sep),
            None => String::new(),
        }
    }

    pub(crate) fn location(&self, ctx: &Context, sep: char, meta: Option<&Metadata>) -> Location {
        let source = meta
            .or_else(|| ctx.parent.and_then(|p| self.node(p)).and_then(Node::metadata))
            .and_then(|m| m.source.clone());
        Location::new(self.path_of(ctx, sep), source)
    }

    /// The `up`-th ancestor of `id` (`0` is `id` itself).
    pub(crate) fn ancestor(&self, id: NodeId, up: usize) -> Option<NodeId> {
        let mut current = id;
        for _ in 0..up {
            current = self.node(current)?.ctx.parent?;
        }
        Some(current)
    }
}
