//! Hierarchical configuration trees built from native values.
//!
//! This crate converts heterogeneous inputs (records, mappings, sequences,
//! parsed JSON or YAML documents) into a canonical tree, merges trees with
//! well-defined precedence, and resolves `${path}` references between fields
//! lazily, against the tree as it is when a value is read.
//!
//! # Key Features
//!
//! - **Sign fidelity**: non-negative integers are stored unsigned, negative
//!   ones signed, whatever their native type
//! - **Deep merges**: objects merge field by field, everything else is
//!   replaced by the later input
//! - **Provenance**: every value carries the [`Metadata`] of the input that
//!   produced it, and every error carries a [`Location`]
//! - **Late binding**: references see values merged after they were written
//!
//! # Architecture
//!
//! - [`Reflect`] describes an input value as a [`Shape`]; [`Serialized`]
//!   provides it for any `serde::Serialize` type
//! - [`normalize`] turns an input into a [`Config`]
//! - [`Config::merge`] folds further inputs into an existing tree
//! - [`Config::evaluate`] follows references and renders splices
//! - [`Config::materialize`] produces the effective tree as JSON
//!
//! # Example
//!
//! ```rust
//! use conftree::{Config, Options, ValueKind};
//! use serde_json::json;
//!
//! let opts = Options::default().with_var_exp(true);
//!
//! let mut cfg = Config::new();
//! cfg.merge(&json!({"server": {"host": "localhost", "port": 80}}), &opts)?;
//! cfg.merge(&json!({"server": {"port": 8080}, "url": "http://${server.host}:${server.port}"}), &opts)?;
//!
//! assert_eq!(cfg.resolve("server.port", &opts)?, ValueKind::Uint(8080));
//! assert_eq!(cfg.string("url", &opts)?, "http://localhost:8080");
//! # Ok::<(), conftree::ConfigError>(())
//! ```

mod access;
mod error;
mod materialize;
mod merge;
mod normalize;
mod path;
mod reflect;
mod splice;
mod tag;
mod tree;
mod types;

pub use error::{
    ConfigError,
    ErrorKind,
    Location,
};

pub use types::{
    Context,
    Fields,
    Metadata,
    Node,
    NodeId,
    Options,
    Resolver,
    Value,
    ValueKind,
};

pub use tree::Config;

pub use path::Path;

pub use splice::{
    Expression,
    ParseError,
    Piece,
    Reference,
    Splice,
    parse as parse_expression,
};

pub use tag::{
    TagOptions,
    field_name,
    parse_tag,
};

pub use reflect::{
    Field,
    Reflect,
    Serialized,
    Shape,
};

pub use normalize::{
    format_duration,
    normalize,
};

pub use merge::merge;
