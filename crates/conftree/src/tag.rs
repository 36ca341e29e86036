//! Field tag parsing.
//!
//! Record fields carry annotations of the form `name,option,option...` under
//! a tag key (see [`Options::tag`](crate::Options)). The name overrides the
//! field's own name when non-empty.
//!
//! ## Options
//!
//! - `squash` (alias `inline`): merge the field's children into the current
//!   level instead of nesting them
//! - `ignore`: skip the field
//! - `pathsep=<c>`: split this field's name on `<c>` instead of the
//!   configured separator
//!
//! Unknown options are logged and ignored.

use tracing::warn;

/// Result of parsing a field tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagOptions {
    pub squash: bool,
    pub ignore: bool,
    pub path_sep: Option<char>,
}

/// Split a tag into its name and options.
///
/// # Examples
///
/// - `"port"` → (`"port"`, no options)
/// - `",squash"` → (`""`, squash)
/// - `"a/b,pathsep=/"` → (`"a/b"`, separator `/`)
pub fn parse_tag(tag: &str) -> (String, TagOptions) {
    let mut parts = tag.split(',');
    let name = parts.next().unwrap_or_default().trim().to_string();
    let mut opts = TagOptions::default();

    for option in parts {
        let option = option.trim();
        match option {
            "" => {}
            "squash" | "inline" => opts.squash = true,
            "ignore" => opts.ignore = true,
            _ => match option.strip_prefix("pathsep=") {
                Some(sep) => {
                    let mut chars = sep.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => opts.path_sep = Some(c),
                        _ => warn!(tag, option, "pathsep expects exactly one character"),
                    }
                }
                None => warn!(tag, option, "ignoring unknown tag option"),
            },
        }
    }

    (name, opts)
}

/// Effective field name: the tag name if given, otherwise the lowercased
/// field name.
pub fn field_name(tag_name: &str, field: &str) -> String {
    if tag_name.is_empty() {
        field.to_lowercase()
    } else {
        tag_name.to_string()
    }
}
