//! Introspection of native inputs.
//!
//! Everything the normalizer needs to know about an input value goes through
//! [`Reflect::reflect`], which describes the value as a [`Shape`]. Records
//! list their fields along with their tag annotations, so the normalizer's
//! recursion never depends on concrete types.
//!
//! Types deriving `serde::Serialize` need no hand-written impl: wrap them in
//! [`Serialized`], or use [`Config::from_serialize`] and
//! [`Config::merge_serialize`]. A manual impl is only needed for `config`
//! tag options such as `pathsep=`.
//!
//! # Example
//!
//! ```rust
//! use conftree::{Field, Reflect, Shape};
//!
//! struct Server {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl Reflect for Server {
//!     fn reflect(&self) -> Shape<'_> {
//!         Shape::Record(vec![
//!             Field::new("host", &self.host).tag("config", "hostname"),
//!             Field::new("port", &self.port),
//!         ])
//!     }
//! }
//! ```

mod json;
mod serialized;
mod yaml;

pub use serialized::Serialized;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::BuildHasher;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::tree::Config;

/// How an input value presents itself to the normalizer.
pub enum Shape<'a> {
    /// An already-canonical tree.
    Config(&'a Config),
    /// A record with named, possibly tagged, fields.
    Record(Vec<Field<'a>>),
    /// Key/value entries. Keys must reflect as [`Shape::Str`].
    Map(Vec<(&'a dyn Reflect, &'a dyn Reflect)>),
    /// An ordered sequence.
    Seq(Vec<&'a dyn Reflect>),
    /// A time span, rendered as a duration string.
    Duration(Duration),
    /// A compiled pattern, rendered as its source text.
    Pattern(&'a str),
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Str(&'a str),
    /// An absent value.
    Nil,
    /// A value the normalizer can not represent.
    Unsupported,
}

/// A record field as seen by the normalizer.
pub struct Field<'a> {
    name: &'a str,
    tags: Vec<(&'a str, &'a str)>,
    value: &'a dyn Reflect,
}

impl<'a> Field<'a> {
    pub fn new(name: &'a str, value: &'a dyn Reflect) -> Self {
        Self {
            name,
            tags: Vec::new(),
            value,
        }
    }

    /// Attach an annotation `value` under tag key `key`.
    pub fn tag(mut self, key: &'a str, value: &'a str) -> Self {
        self.tags.push((key, value));
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn value(&self) -> &'a dyn Reflect {
        self.value
    }

    /// Annotation under `key`, or `""` when the field has none.
    pub fn tag_value(&self, key: &str) -> &'a str {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map_or("", |(_, v)| *v)
    }
}

/// Describe a value for normalization.
pub trait Reflect {
    fn reflect(&self) -> Shape<'_>;

    /// Name used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! reflect_signed {
    ($($t:ty),*) => {$(
        impl Reflect for $t {
            fn reflect(&self) -> Shape<'_> {
                Shape::Signed(i64::from(*self))
            }
        }
    )*};
}

macro_rules! reflect_unsigned {
    ($($t:ty),*) => {$(
        impl Reflect for $t {
            fn reflect(&self) -> Shape<'_> {
                Shape::Unsigned(u64::from(*self))
            }
        }
    )*};
}

reflect_signed!(i8, i16, i32, i64);
reflect_unsigned!(u8, u16, u32, u64);

impl Reflect for isize {
    fn reflect(&self) -> Shape<'_> {
        i64::try_from(*self).map_or(Shape::Unsupported, Shape::Signed)
    }
}

impl Reflect for usize {
    fn reflect(&self) -> Shape<'_> {
        u64::try_from(*self).map_or(Shape::Unsupported, Shape::Unsigned)
    }
}

impl Reflect for i128 {
    fn reflect(&self) -> Shape<'_> {
        i64::try_from(*self).map_or(Shape::Unsupported, Shape::Signed)
    }
}

impl Reflect for u128 {
    fn reflect(&self) -> Shape<'_> {
        u64::try_from(*self).map_or(Shape::Unsupported, Shape::Unsigned)
    }
}

impl Reflect for bool {
    fn reflect(&self) -> Shape<'_> {
        Shape::Bool(*self)
    }
}

impl Reflect for f32 {
    fn reflect(&self) -> Shape<'_> {
        Shape::Float(f64::from(*self))
    }
}

impl Reflect for f64 {
    fn reflect(&self) -> Shape<'_> {
        Shape::Float(*self)
    }
}

impl Reflect for str {
    fn reflect(&self) -> Shape<'_> {
        Shape::Str(self)
    }
}

impl Reflect for String {
    fn reflect(&self) -> Shape<'_> {
        Shape::Str(self)
    }
}

impl Reflect for Duration {
    fn reflect(&self) -> Shape<'_> {
        Shape::Duration(*self)
    }
}

impl Reflect for regex::Regex {
    fn reflect(&self) -> Shape<'_> {
        Shape::Pattern(self.as_str())
    }
}

impl Reflect for Config {
    fn reflect(&self) -> Shape<'_> {
        Shape::Config(self)
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn reflect(&self) -> Shape<'_> {
        match self {
            Some(value) => value.reflect(),
            None => Shape::Nil,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Some(value) => value.type_name(),
            None => std::any::type_name::<Self>(),
        }
    }
}

macro_rules! reflect_deref {
    ($($ptr:ident),*) => {$(
        impl<T: Reflect + ?Sized> Reflect for $ptr<T> {
            fn reflect(&self) -> Shape<'_> {
                (**self).reflect()
            }

            fn type_name(&self) -> &'static str {
                (**self).type_name()
            }
        }
    )*};
}

reflect_deref!(Box, Rc, Arc);

impl<T: Reflect + ?Sized> Reflect for &T {
    fn reflect(&self) -> Shape<'_> {
        (**self).reflect()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

impl<T: Reflect> Reflect for [T] {
    fn reflect(&self) -> Shape<'_> {
        Shape::Seq(self.iter().map(|v| v as &dyn Reflect).collect())
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn reflect(&self) -> Shape<'_> {
        self.as_slice().reflect()
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn reflect(&self) -> Shape<'_> {
        self.as_slice().reflect()
    }
}

impl<T: Reflect> Reflect for VecDeque<T> {
    fn reflect(&self) -> Shape<'_> {
        Shape::Seq(self.iter().map(|v| v as &dyn Reflect).collect())
    }
}

impl<K: Reflect, V: Reflect, S: BuildHasher> Reflect for HashMap<K, V, S> {
    fn reflect(&self) -> Shape<'_> {
        Shape::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                .collect(),
        )
    }
}

impl<K: Reflect, V: Reflect> Reflect for BTreeMap<K, V> {
    fn reflect(&self) -> Shape<'_> {
        Shape::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                .collect(),
        )
    }
}

impl<K: Reflect, V: Reflect, S: BuildHasher> Reflect for IndexMap<K, V, S> {
    fn reflect(&self) -> Shape<'_> {
        Shape::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                .collect(),
        )
    }
}
