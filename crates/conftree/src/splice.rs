//! Variable references inside string values.
//!
//! With variable expansion enabled, strings are scanned for `${path}` tokens.
//! A token may carry a literal default, `${path:default}`, used when the path
//! is missing and no resolver knows it. `$${` writes a literal `${`.
//!
//! When the path separator is `:` the colon already separates path segments,
//! so `${a:b}` names the path `a:b` and tokens have no default.
//!
//! Parsing happens once at normalize time and produces an [`Expression`].
//! Evaluation happens at read time against the tree as it is then, so a
//! reference always sees the result of later merges.

use thiserror::Error;
use tracing::trace;

use crate::error::ConfigError;
use crate::path::Path;
use crate::tree::Config;
use crate::types::{NodeId, Options, Value, ValueKind};

/// A `${...}` token.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    path: Path,
    default: Option<String>,
    key: String,
    raw: String,
}

impl Reference {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Literal fallback from `${path:default}`.
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// The token as written, including the `${` and `}` markers.
    pub fn source(&self) -> String {
        format!("${{{}}}", self.raw)
    }

    /// Key handed to resolvers: the path text without relative markers.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// One fragment of a splice.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Literal(String),
    Ref(Reference),
}

/// A string mixing literal text with references.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pieces: Vec<Piece>,
    source: String,
}

impl Splice {
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// The string as written.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Classification of a parsed string.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// No references; holds the text with escapes applied.
    Constant(String),
    /// The whole string is one reference.
    Reference(Reference),
    /// Literal text and references interleaved.
    Splice(Splice),
}

/// A malformed reference token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

/// Scan `input` for reference tokens, interpreting paths with `sep`.
pub fn parse(input: &str, sep: char) -> Result<Expression, ParseError> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        literal.push_str(&rest[..dollar]);
        let offset = input.len() - rest.len() + dollar;
        let tail = &rest[dollar..];

        if let Some(after) = tail.strip_prefix("$${") {
            literal.push_str("${");
            rest = after;
            continue;
        }

        let Some(body_and_rest) = tail.strip_prefix("${") else {
            literal.push('$');
            rest = &tail[1..];
            continue;
        };

        let Some(end) = body_and_rest.find('}') else {
            return Err(ParseError {
                offset,
                message: "unterminated reference".to_string(),
            });
        };
        let body = &body_and_rest[..end];
        if body.contains("${") {
            return Err(ParseError {
                offset,
                message: "nested references are not supported".to_string(),
            });
        }

        let split = if sep == ':' { None } else { body.split_once(':') };
        let (path_text, default) = match split {
            Some((path, default)) => (path.trim(), Some(default.to_string())),
            None => (body.trim(), None),
        };
        let path = Path::parse(path_text, sep);
        if path.is_empty() {
            return Err(ParseError {
                offset,
                message: "empty reference".to_string(),
            });
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(Piece::Ref(Reference {
            path,
            default,
            key: path_text.trim_start_matches(sep).to_string(),
            raw: body.to_string(),
        }));
        rest = &body_and_rest[end + 1..];
    }
    literal.push_str(rest);

    if pieces.is_empty() {
        return Ok(Expression::Constant(literal));
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    if pieces.len() == 1 {
        if let Some(Piece::Ref(reference)) = pieces.pop() {
            return Ok(Expression::Reference(reference));
        }
    }
    Ok(Expression::Splice(Splice {
        pieces,
        source: input.to_string(),
    }))
}

/// Identity of a value under evaluation: its parent node and field.
type Frame = (Option<NodeId>, String);

impl Config {
    /// Effective value of `value`.
    ///
    /// References evaluate to the native kind of their target; splices always
    /// evaluate to a string. Other kinds are returned as they are. The result
    /// is never a `Ref` or `Splice`.
    pub fn evaluate(&self, value: &Value, opts: &Options) -> Result<ValueKind, ConfigError> {
        let mut stack = Vec::new();
        self.eval(value, opts, &mut stack)
    }

    fn eval(&self, value: &Value, opts: &Options, stack: &mut Vec<Frame>) -> Result<ValueKind, ConfigError> {
        match &value.kind {
            ValueKind::Ref(reference) => self.eval_reference(value, reference, opts, stack),
            ValueKind::Splice(splice) => {
                let mut out = String::new();
                for piece in &splice.pieces {
                    match piece {
                        Piece::Literal(text) => out.push_str(text),
                        Piece::Ref(reference) => {
                            let resolved = self.eval_reference(value, reference, opts, stack)?;
                            out.push_str(&self.render(&resolved, value, opts)?);
                        }
                    }
                }
                Ok(ValueKind::String(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn eval_reference(
        &self,
        holder: &Value,
        reference: &Reference,
        opts: &Options,
        stack: &mut Vec<Frame>,
    ) -> Result<ValueKind, ConfigError> {
        let frame = (holder.ctx.parent, holder.ctx.field.clone());
        if stack.len() >= opts.max_depth || stack.contains(&frame) {
            return Err(ConfigError::CircularReference {
                at: self.location(&holder.ctx, opts.path_sep, holder.metadata()),
            });
        }

        stack.push(frame);
        let result = self.lookup_reference(holder, reference, opts, stack);
        stack.pop();
        result
    }

    fn lookup_reference(
        &self,
        holder: &Value,
        reference: &Reference,
        opts: &Options,
        stack: &mut Vec<Frame>,
    ) -> Result<ValueKind, ConfigError> {
        let path = &reference.path;
        let start = if path.is_relative() {
            holder.ctx.parent.and_then(|p| self.ancestor(p, path.up() - 1))
        } else {
            Some(self.root())
        };

        let found = match start {
            Some(start) => path.get_value(self, start),
            None => Err(ConfigError::Missing {
                at: self.location(&holder.ctx, opts.path_sep, holder.metadata()),
            }),
        };

        match found {
            Ok(target) => {
                trace!(reference = %reference.source(), kind = target.kind.type_name(), "resolved reference");
                self.eval(target, opts, stack)
            }
            Err(err) if err.is_missing() => {
                for resolver in &opts.resolvers {
                    if let Some(found) = resolver.lookup(reference.key()) {
                        trace!(reference = %reference.source(), "resolved reference from resolver");
                        return Ok(ValueKind::String(found));
                    }
                }
                match &reference.default {
                    Some(default) => Ok(ValueKind::String(default.clone())),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// String rendering of an evaluated value, for splicing.
    pub(crate) fn render(&self, resolved: &ValueKind, holder: &Value, opts: &Options) -> Result<String, ConfigError> {
        match resolved {
            ValueKind::Bool(b) => Ok(b.to_string()),
            ValueKind::Int(i) => Ok(i.to_string()),
            ValueKind::Uint(u) => Ok(u.to_string()),
            ValueKind::Float(f) => Ok(f.to_string()),
            ValueKind::String(s) => Ok(s.clone()),
            ValueKind::Nil => Ok(String::new()),
            other => Err(ConfigError::TypeMismatch {
                message: format!("can not splice {} into a string", other.type_name()),
                at: self.location(&holder.ctx, opts.path_sep, holder.metadata()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Resolver;

    fn opts() -> Options {
        Options::default().with_var_exp(true)
    }

    fn expr_value(input: &str) -> Value {
        let kind = match parse(input, '.').unwrap() {
            Expression::Constant(s) => ValueKind::String(s),
            Expression::Reference(r) => ValueKind::Ref(r),
            Expression::Splice(s) => ValueKind::Splice(s),
        };
        Value::new(kind, None)
    }

    fn set(cfg: &mut Config, path: &str, value: Value) {
        let root = cfg.root();
        Path::parse(path, '.').set_value(cfg, root, value).unwrap();
    }

    fn resolve(cfg: &Config, path: &str) -> Result<ValueKind, ConfigError> {
        let value = Path::parse(path, '.').get_value(cfg, cfg.root())?;
        cfg.evaluate(value, &opts())
    }

    #[test]
    fn test_parse_constant() {
        assert_eq!(
            parse("plain text", '.').unwrap(),
            Expression::Constant("plain text".to_string())
        );
        assert_eq!(
            parse("costs $5", '.').unwrap(),
            Expression::Constant("costs $5".to_string())
        );
        assert_eq!(
            parse("$${HOME}", '.').unwrap(),
            Expression::Constant("${HOME}".to_string())
        );
    }

    #[test]
    fn test_parse_reference() {
        let Expression::Reference(r) = parse("${server.port}", '.').unwrap() else {
            panic!("expected reference");
        };
        assert_eq!(r.path().segments(), &["server", "port"]);
        assert_eq!(r.default_value(), None);
        assert_eq!(r.source(), "${server.port}");
    }

    #[test]
    fn test_parse_reference_with_default() {
        let Expression::Reference(r) = parse("${port:8080}", '.').unwrap() else {
            panic!("expected reference");
        };
        assert_eq!(r.path().segments(), &["port"]);
        assert_eq!(r.default_value(), Some("8080"));
    }

    #[test]
    fn test_colon_separator_has_no_default() {
        let Expression::Reference(r) = parse("${a:b}", ':').unwrap() else {
            panic!("expected reference");
        };
        assert_eq!(r.path().segments(), &["a", "b"]);
        assert_eq!(r.default_value(), None);
        assert_eq!(r.key(), "a:b");

        let mut cfg = Config::new();
        let root = cfg.root();
        Path::parse("a:b", ':')
            .set_value(&mut cfg, root, Value::new(ValueKind::Uint(5), None))
            .unwrap();
        let value = Value::new(ValueKind::Ref(r), None);
        let opts = opts().with_path_sep(':');
        Path::parse("c", ':').set_value(&mut cfg, root, value).unwrap();
        let stored = Path::parse("c", ':').get_value(&cfg, root).unwrap();
        assert_eq!(cfg.evaluate(stored, &opts).unwrap(), ValueKind::Uint(5));
    }

    #[test]
    fn test_parse_splice() {
        let Expression::Splice(s) = parse("http://${host}:${port}/", '.').unwrap() else {
            panic!("expected splice");
        };
        assert_eq!(s.pieces().len(), 5);
        assert_eq!(s.source(), "http://${host}:${port}/");
        assert!(matches!(&s.pieces()[0], Piece::Literal(t) if t == "http://"));
        assert!(matches!(&s.pieces()[4], Piece::Literal(t) if t == "/"));
    }

    #[test]
    fn test_parse_errors() {
        let err = parse("x ${a", '.').unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.message, "unterminated reference");

        assert_eq!(parse("${}", '.').unwrap_err().message, "empty reference");
        assert_eq!(
            parse("${a${b}}", '.').unwrap_err().message,
            "nested references are not supported"
        );
    }

    #[test]
    fn test_reference_preserves_type() {
        let mut cfg = Config::new();
        set(&mut cfg, "a", Value::new(ValueKind::Bool(true), None));
        set(&mut cfg, "b", expr_value("${a}"));
        assert_eq!(resolve(&cfg, "b").unwrap(), ValueKind::Bool(true));
    }

    #[test]
    fn test_splice_concatenates() {
        let mut cfg = Config::new();
        set(&mut cfg, "a", Value::new(ValueKind::String("x".to_string()), None));
        set(&mut cfg, "n", Value::new(ValueKind::Int(-3), None));
        set(&mut cfg, "b", expr_value("pre-${a}-post"));
        set(&mut cfg, "c", expr_value("${a}${n}"));
        assert_eq!(resolve(&cfg, "b").unwrap(), ValueKind::String("pre-x-post".to_string()));
        assert_eq!(resolve(&cfg, "c").unwrap(), ValueKind::String("x-3".to_string()));
    }

    #[test]
    fn test_reference_chain() {
        let mut cfg = Config::new();
        set(&mut cfg, "a", Value::new(ValueKind::Uint(1), None));
        set(&mut cfg, "b", expr_value("${a}"));
        set(&mut cfg, "c", expr_value("v${b}"));
        assert_eq!(resolve(&cfg, "c").unwrap(), ValueKind::String("v1".to_string()));
    }

    #[test]
    fn test_circular_reference_terminates() {
        let mut cfg = Config::new();
        set(&mut cfg, "a", expr_value("${b}"));
        set(&mut cfg, "b", expr_value("${a}"));
        set(&mut cfg, "c", expr_value("${c}"));

        assert_eq!(resolve(&cfg, "a").unwrap_err().kind(), ErrorKind::CircularReference);
        assert_eq!(resolve(&cfg, "b").unwrap_err().kind(), ErrorKind::CircularReference);
        assert_eq!(resolve(&cfg, "c").unwrap_err().kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_missing_reference_is_reported() {
        let mut cfg = Config::new();
        set(&mut cfg, "b", expr_value("${nope}"));
        let err = resolve(&cfg, "b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Missing);
        assert_eq!(err.location().unwrap().path, "nope");
    }

    #[test]
    fn test_default_and_resolvers() {
        let mut cfg = Config::new();
        set(&mut cfg, "a", expr_value("${missing:fallback}"));
        set(&mut cfg, "b", expr_value("${user.name}"));
        assert_eq!(resolve(&cfg, "a").unwrap(), ValueKind::String("fallback".to_string()));

        let table = [("user.name".to_string(), "alice".to_string())].into_iter().collect();
        let opts = opts().with_resolver(Resolver::Static(table));
        let value = Path::parse("b", '.').get_value(&cfg, cfg.root()).unwrap();
        assert_eq!(
            cfg.evaluate(value, &opts).unwrap(),
            ValueKind::String("alice".to_string())
        );
    }

    #[test]
    fn test_relative_reference() {
        let mut cfg = Config::new();
        set(&mut cfg, "name", Value::new(ValueKind::String("outer".to_string()), None));
        set(&mut cfg, "server.name", Value::new(ValueKind::String("inner".to_string()), None));
        set(&mut cfg, "server.sibling", expr_value("${.name}"));
        set(&mut cfg, "server.parent", expr_value("${..name}"));
        set(&mut cfg, "server.absolute", expr_value("${name}"));

        assert_eq!(resolve(&cfg, "server.sibling").unwrap(), ValueKind::String("inner".to_string()));
        assert_eq!(resolve(&cfg, "server.parent").unwrap(), ValueKind::String("outer".to_string()));
        assert_eq!(resolve(&cfg, "server.absolute").unwrap(), ValueKind::String("outer".to_string()));
    }

    #[test]
    fn test_splicing_object_is_type_mismatch() {
        let mut cfg = Config::new();
        set(&mut cfg, "server.port", Value::new(ValueKind::Uint(80), None));
        set(&mut cfg, "s", expr_value("at ${server}"));
        set(&mut cfg, "r", expr_value("${server}"));

        assert_eq!(resolve(&cfg, "s").unwrap_err().kind(), ErrorKind::TypeMismatch);
        assert!(matches!(resolve(&cfg, "r").unwrap(), ValueKind::Sub(_)));
    }

    #[test]
    fn test_evaluation_sees_later_mutation() {
        let mut cfg = Config::new();
        set(&mut cfg, "b", expr_value("${a}"));
        assert!(resolve(&cfg, "b").unwrap_err().is_missing());

        set(&mut cfg, "a", Value::new(ValueKind::Float(1.5), None));
        assert_eq!(resolve(&cfg, "b").unwrap(), ValueKind::Float(1.5));
    }
}
