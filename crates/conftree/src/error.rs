//! Error types for normalization, merging, lookup and reference evaluation.

use std::fmt;

use thiserror::Error;

use crate::types::NodeId;

/// Where in a configuration tree an error occurred.
///
/// `path` is the full path of the offending field, rendered with the path
/// separator in effect. `source` is the provenance identifier from the
/// metadata of the value involved, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub source: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>, source: Option<String>) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>")?;
        } else {
            write!(f, "'{}'", self.path)?;
        }
        if let Some(source) = &self.source {
            write!(f, " (source: {})", source)?;
        }
        Ok(())
    }
}

/// The distinguishable error conditions.
///
/// Use [`ConfigError::kind`] to branch on a condition without matching on
/// every variant's payload; in particular `Missing` is usually not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTopLevelType,
    KeyInvalidType,
    SquashNeedsObject,
    DuplicateKey,
    UnsupportedInputType,
    Missing,
    TypeMismatch,
    ParseSplice,
    CircularReference,
    NestingTooDeep,
    InvalidNode,
    Serialize,
}

/// Errors raised by configuration operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Top-level input is not a configuration, mapping or record.
    #[error("Type {type_name} is not supported as top-level configuration input")]
    InvalidTopLevelType { type_name: String },

    /// A mapping key does not reflect as a string.
    #[error("Map key of type {type_name} can not be used as field name accessing {at}")]
    KeyInvalidType { type_name: String, at: Location },

    /// A field tagged `squash` is neither a mapping nor a record.
    #[error("Field '{field}' of type {type_name} can not be squashed, expected a mapping or record accessing {at}")]
    SquashNeedsObject {
        field: String,
        type_name: String,
        at: Location,
    },

    /// A concrete value was written twice at the same path.
    #[error("Duplicate field key accessing {at}")]
    DuplicateKey { at: Location },

    /// A leaf of unrecognized kind reached the primitive dispatch.
    #[error("Unsupported input type {type_name} accessing {at}")]
    UnsupportedInputType { type_name: String, at: Location },

    /// No value exists at the requested path.
    #[error("Missing field accessing {at}")]
    Missing { at: Location },

    /// A value had a different shape than the operation required.
    #[error("Type mismatch accessing {at}: {message}")]
    TypeMismatch { message: String, at: Location },

    /// A string's embedded reference syntax is malformed.
    #[error("Can not parse reference in {input:?} accessing {at}: {message}")]
    ParseSplice {
        input: String,
        message: String,
        at: Location,
    },

    /// Reference evaluation re-entered a value already being evaluated,
    /// or exceeded the evaluation depth bound.
    #[error("Circular reference detected accessing {at}")]
    CircularReference { at: Location },

    /// Configuration nesting exceeds the maximum depth.
    #[error("Config nesting too deep (max depth: {max_depth}) accessing {at}")]
    NestingTooDeep { max_depth: usize, at: Location },

    /// A node handle was released by a merge or minted by another
    /// configuration.
    #[error("Node handle {node:?} does not refer to a live node of this configuration")]
    InvalidNode { node: NodeId },

    /// A `Serialize` value could not be captured as configuration input.
    #[error("Can not serialize {type_name} as configuration input: {message}")]
    Serialize { type_name: String, message: String },
}

impl ConfigError {
    /// The condition this error represents.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::InvalidTopLevelType { .. } => ErrorKind::InvalidTopLevelType,
            ConfigError::KeyInvalidType { .. } => ErrorKind::KeyInvalidType,
            ConfigError::SquashNeedsObject { .. } => ErrorKind::SquashNeedsObject,
            ConfigError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ConfigError::UnsupportedInputType { .. } => ErrorKind::UnsupportedInputType,
            ConfigError::Missing { .. } => ErrorKind::Missing,
            ConfigError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ConfigError::ParseSplice { .. } => ErrorKind::ParseSplice,
            ConfigError::CircularReference { .. } => ErrorKind::CircularReference,
            ConfigError::NestingTooDeep { .. } => ErrorKind::NestingTooDeep,
            ConfigError::InvalidNode { .. } => ErrorKind::InvalidNode,
            ConfigError::Serialize { .. } => ErrorKind::Serialize,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::Missing`.
    pub fn is_missing(&self) -> bool {
        self.kind() == ErrorKind::Missing
    }

    /// The location the error refers to, if it has one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            ConfigError::InvalidTopLevelType { .. }
            | ConfigError::InvalidNode { .. }
            | ConfigError::Serialize { .. } => None,
            ConfigError::KeyInvalidType { at, .. }
            | ConfigError::SquashNeedsObject { at, .. }
            | ConfigError::DuplicateKey { at }
            | ConfigError::UnsupportedInputType { at, .. }
            | ConfigError::Missing { at }
            | ConfigError::TypeMismatch { at, .. }
            | ConfigError::ParseSplice { at, .. }
            | ConfigError::CircularReference { at }
            | ConfigError::NestingTooDeep { at, .. } => Some(at),
        }
    }
}
