//! Statement template compiler.
//!
//! A template mixes three placeholder kinds:
//! - `#table#`: the upstream query, inlined as a derived table `(<query>)`
//! - `$${<T><name>}$$`: an external variable, inlined as literal text
//! - `#{<column>}#`: an input column, replaced by a positional marker
//!
//! All three are recognised in one left-to-right scan. Text that gets
//! inlined (upstream query, variable values) is never rescanned, so a value
//! that happens to look like a placeholder stays as written.

use std::sync::LazyLock;

use dblooper_db::ParamStyle;
use regex::Regex;

use crate::errors::TemplateError;
use crate::variables::{VariableKind, VariableResolver};

/// Upstream query placeholder token.
pub const UPSTREAM_PLACEHOLDER: &str = "#table#";

/// Statement used when a job does not set one.
pub const DEFAULT_STATEMENT: &str = "SELECT * FROM #table#";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#table#|\$\$\{([SID])([^}]*)\}\$\$|#\{(.*?)\}#")
        .expect("valid template token regex")
});

/// One lexical piece of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    UpstreamQuery,
    Variable { kind: VariableKind, name: &'a str },
    Column(&'a str),
}

/// Split `template` into literal text and placeholders, in order.
#[must_use]
pub fn tokenize(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            segments.push(Segment::Literal(&template[last..whole.start()]));
        }
        last = whole.end();

        if let Some(name) = caps.get(3) {
            segments.push(Segment::Column(name.as_str()));
        } else if let (Some(tag), Some(name)) = (caps.get(1), caps.get(2)) {
            // The regex only admits S, I and D as tags.
            let kind = tag
                .as_str()
                .chars()
                .next()
                .and_then(VariableKind::from_tag)
                .unwrap_or(VariableKind::String);
            segments.push(Segment::Variable {
                kind,
                name: name.as_str(),
            });
        } else {
            segments.push(Segment::UpstreamQuery);
        }
    }

    if last < template.len() {
        segments.push(Segment::Literal(&template[last..]));
    }
    segments
}

/// Knobs for [`compile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Fail when the template has no `#table#` placeholder.
    pub require_upstream_placeholder: bool,
    /// Marker syntax of the target driver.
    pub param_style: ParamStyle,
}

/// A template ready to execute: SQL with positional markers plus the column
/// bound to each marker.
///
/// `column_refs` has one entry per marker, in marker order, so a column used
/// twice appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub sql: String,
    pub column_refs: Vec<String>,
}

impl CompiledStatement {
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.column_refs.len()
    }
}

/// Compile `template` into a [`CompiledStatement`].
///
/// # Errors
///
/// Returns [`TemplateError`] when the upstream placeholder is required but
/// absent, repeated, or present without an upstream query, and when a
/// variable is undefined or has the wrong type.
pub fn compile(
    template: &str,
    upstream_query: Option<&str>,
    resolver: &dyn VariableResolver,
    opts: &CompileOptions,
) -> Result<CompiledStatement, TemplateError> {
    let segments = tokenize(template);

    let upstream_count = segments
        .iter()
        .filter(|s| matches!(s, Segment::UpstreamQuery))
        .count();
    if upstream_count > 1 {
        return Err(TemplateError::DuplicateUpstreamPlaceholder(upstream_count));
    }
    if upstream_count == 0 && opts.require_upstream_placeholder {
        return Err(TemplateError::MissingUpstreamPlaceholder);
    }

    let mut sql = String::with_capacity(template.len());
    let mut column_refs = Vec::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => sql.push_str(text),
            Segment::UpstreamQuery => {
                let query = upstream_query.ok_or(TemplateError::NoUpstreamQuery)?;
                sql.push('(');
                sql.push_str(query);
                sql.push(')');
            }
            Segment::Variable { kind, name } => {
                let value = resolver
                    .resolve(name)
                    .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
                let text =
                    value
                        .render_as(kind)
                        .ok_or_else(|| TemplateError::VariableTypeMismatch {
                            name: name.to_string(),
                            expected: kind,
                            actual: value.kind(),
                        })?;
                sql.push_str(&text);
            }
            Segment::Column(name) => {
                sql.push_str(&opts.param_style.marker(column_refs.len()));
                column_refs.push(name.to_string());
            }
        }
    }

    Ok(CompiledStatement { sql, column_refs })
}

/// Column names referenced by `template`, in order, without compiling it.
///
/// Used to validate a statement against the input schema before any
/// upstream query or variable is available.
#[must_use]
pub fn column_references(template: &str) -> Vec<String> {
    tokenize(template)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Column(name) => Some(name.to_string()),
            _ => None,
        })
        .collect()
}
