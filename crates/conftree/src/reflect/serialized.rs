//! `Serialize` input.
//!
//! Any type implementing `serde::Serialize` can be normalized through
//! [`Serialized`]. The value is first captured into an owned tree of scalars,
//! mappings and sequences, which then reflects like any other input.
//!
//! Struct fields keep their serialized names, so serde attributes take the
//! place of `config` tags:
//!
//! - `#[serde(rename = "...")]` picks the field name, and a name containing
//!   the path separator still creates nested objects
//! - `#[serde(flatten)]` merges a nested struct into its parent, like `squash`
//! - `#[serde(skip)]` leaves a field out, like `ignore`
//!
//! # Example
//!
//! ```rust
//! use conftree::{Config, Options};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Server {
//!     #[serde(rename = "listen.port")]
//!     port: u16,
//!     #[serde(skip)]
//!     verbose: bool,
//! }
//!
//! let opts = Options::default();
//! let cfg = Config::from_serialize(&Server { port: 80, verbose: true }, &opts)?;
//! assert_eq!(cfg.uint("listen.port", &opts)?, 80);
//! assert!(!cfg.has_field("verbose", &opts)?);
//! # Ok::<(), conftree::ConfigError>(())
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde::ser;
use thiserror::Error;

use super::{Reflect, Shape};
use crate::error::ConfigError;
use crate::normalize::normalize;
use crate::tree::Config;
use crate::types::Options;

/// A value captured through its `Serialize` implementation.
pub struct Serialized {
    captured: Captured,
    type_name: &'static str,
}

impl Serialized {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, ConfigError> {
        let type_name = std::any::type_name::<T>();
        let captured = value
            .serialize(Capture)
            .map_err(|err| ConfigError::Serialize {
                type_name: type_name.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self { captured, type_name })
    }
}

impl Reflect for Serialized {
    fn reflect(&self) -> Shape<'_> {
        self.captured.reflect()
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Config {
    /// Normalize a `Serialize` value into a new configuration tree.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T, opts: &Options) -> Result<Config, ConfigError> {
        normalize(opts, &Serialized::new(value)?)
    }

    /// Merge a `Serialize` value into this tree, as [`Config::merge`] does.
    pub fn merge_serialize<T: Serialize + ?Sized>(&mut self, value: &T, opts: &Options) -> Result<(), ConfigError> {
        self.merge(&Serialized::new(value)?, opts)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Captured {
    Nil,
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Seq(Vec<Captured>),
    Map(Vec<(Captured, Captured)>),
    Unsupported(&'static str),
}

impl Reflect for Captured {
    fn reflect(&self) -> Shape<'_> {
        match self {
            Captured::Nil => Shape::Nil,
            Captured::Bool(b) => Shape::Bool(*b),
            Captured::Signed(i) => Shape::Signed(*i),
            Captured::Unsigned(u) => Shape::Unsigned(*u),
            Captured::Float(f) => Shape::Float(*f),
            Captured::Str(s) => Shape::Str(s),
            Captured::Duration(d) => Shape::Duration(*d),
            Captured::Seq(items) => Shape::Seq(items.iter().map(|v| v as &dyn Reflect).collect()),
            Captured::Map(entries) => Shape::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                    .collect(),
            ),
            Captured::Unsupported(_) => Shape::Unsupported,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Captured::Nil => "serialized unit",
            Captured::Bool(_) => "serialized bool",
            Captured::Signed(_) => "serialized signed integer",
            Captured::Unsigned(_) => "serialized unsigned integer",
            Captured::Float(_) => "serialized float",
            Captured::Str(_) => "serialized string",
            Captured::Duration(_) => "serialized duration",
            Captured::Seq(_) => "serialized sequence",
            Captured::Map(_) => "serialized map",
            Captured::Unsupported(name) => *name,
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct CaptureError(String);

impl ser::Error for CaptureError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CaptureError(msg.to_string())
    }
}

/// Serializer producing a [`Captured`] tree.
struct Capture;

impl ser::Serializer for Capture {
    type Ok = Captured;
    type Error = CaptureError;
    type SerializeSeq = SeqCapture;
    type SerializeTuple = SeqCapture;
    type SerializeTupleStruct = SeqCapture;
    type SerializeTupleVariant = TupleVariantCapture;
    type SerializeMap = MapCapture;
    type SerializeStruct = StructCapture;
    type SerializeStructVariant = StructVariantCapture;

    fn serialize_bool(self, v: bool) -> Result<Captured, CaptureError> {
        Ok(Captured::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Captured, CaptureError> {
        Ok(Captured::Signed(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Captured, CaptureError> {
        Ok(Captured::Signed(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Captured, CaptureError> {
        Ok(Captured::Signed(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Captured, CaptureError> {
        Ok(Captured::Signed(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Captured, CaptureError> {
        Ok(i64::try_from(v).map_or(Captured::Unsupported("i128"), Captured::Signed))
    }

    fn serialize_u8(self, v: u8) -> Result<Captured, CaptureError> {
        Ok(Captured::Unsigned(u64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Captured, CaptureError> {
        Ok(Captured::Unsigned(u64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Captured, CaptureError> {
        Ok(Captured::Unsigned(u64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Captured, CaptureError> {
        Ok(Captured::Unsigned(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Captured, CaptureError> {
        Ok(u64::try_from(v).map_or(Captured::Unsupported("u128"), Captured::Unsigned))
    }

    fn serialize_f32(self, v: f32) -> Result<Captured, CaptureError> {
        Ok(Captured::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Captured, CaptureError> {
        Ok(Captured::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Captured, CaptureError> {
        Ok(Captured::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Captured, CaptureError> {
        Ok(Captured::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Captured, CaptureError> {
        Ok(Captured::Seq(v.iter().map(|b| Captured::Unsigned(u64::from(*b))).collect()))
    }

    fn serialize_none(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Nil)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Captured, CaptureError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Nil)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Captured, CaptureError> {
        Ok(Captured::Nil)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Captured, CaptureError> {
        Ok(Captured::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Captured, CaptureError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Captured, CaptureError> {
        let inner = value.serialize(Capture)?;
        Ok(Captured::Map(vec![(Captured::Str(variant.to_string()), inner)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCapture, CaptureError> {
        Ok(SeqCapture {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCapture, CaptureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqCapture, CaptureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantCapture, CaptureError> {
        Ok(TupleVariantCapture {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCapture, CaptureError> {
        Ok(MapCapture {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<StructCapture, CaptureError> {
        Ok(StructCapture {
            name,
            entries: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructVariantCapture, CaptureError> {
        Ok(StructVariantCapture {
            variant,
            entries: Vec::with_capacity(len),
        })
    }
}

struct SeqCapture {
    items: Vec<Captured>,
}

impl ser::SerializeSeq for SeqCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.items.push(value.serialize(Capture)?);
        Ok(())
    }

    fn end(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CaptureError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Captured, CaptureError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CaptureError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Captured, CaptureError> {
        ser::SerializeSeq::end(self)
    }
}

struct TupleVariantCapture {
    variant: &'static str,
    items: Vec<Captured>,
}

impl ser::SerializeTupleVariant for TupleVariantCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.items.push(value.serialize(Capture)?);
        Ok(())
    }

    fn end(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Map(vec![(
            Captured::Str(self.variant.to_string()),
            Captured::Seq(self.items),
        )]))
    }
}

struct MapCapture {
    entries: Vec<(Captured, Captured)>,
    key: Option<Captured>,
}

impl ser::SerializeMap for MapCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), CaptureError> {
        self.key = Some(key.serialize(Capture)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CaptureError> {
        let Some(key) = self.key.take() else {
            return Err(CaptureError("map value serialized before its key".to_string()));
        };
        self.entries.push((key, value.serialize(Capture)?));
        Ok(())
    }

    fn end(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Map(self.entries))
    }
}

struct StructCapture {
    name: &'static str,
    entries: Vec<(Captured, Captured)>,
}

impl ser::SerializeStruct for StructCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), CaptureError> {
        self.entries
            .push((Captured::Str(key.to_string()), value.serialize(Capture)?));
        Ok(())
    }

    fn end(self) -> Result<Captured, CaptureError> {
        if self.name == "Duration" {
            if let Some(duration) = duration(&self.entries) {
                return Ok(Captured::Duration(duration));
            }
        }
        Ok(Captured::Map(self.entries))
    }
}

/// `std::time::Duration` serializes as a struct of `secs` and `nanos`.
fn duration(entries: &[(Captured, Captured)]) -> Option<Duration> {
    match entries {
        [
            (Captured::Str(secs_key), Captured::Unsigned(secs)),
            (Captured::Str(nanos_key), Captured::Unsigned(nanos)),
        ] if secs_key == "secs" && nanos_key == "nanos" => {
            let nanos = u32::try_from(*nanos).ok().filter(|n| *n < 1_000_000_000)?;
            Some(Duration::new(*secs, nanos))
        }
        _ => None,
    }
}

struct StructVariantCapture {
    variant: &'static str,
    entries: Vec<(Captured, Captured)>,
}

impl ser::SerializeStructVariant for StructVariantCapture {
    type Ok = Captured;
    type Error = CaptureError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), CaptureError> {
        self.entries
            .push((Captured::Str(key.to_string()), value.serialize(Capture)?));
        Ok(())
    }

    fn end(self) -> Result<Captured, CaptureError> {
        Ok(Captured::Map(vec![(
            Captured::Str(self.variant.to_string()),
            Captured::Map(self.entries),
        )]))
    }
}
