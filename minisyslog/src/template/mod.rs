//! Output templates.
//!
//! A small Go-template-like language for turning a [`StructuredRecord`]
//! into one line of text:
//!
//! ```text
//! {{ .timestamp }} [{{ severity .severity }}] {{ yellow .hostname }} {{ or .app_name .tag | blue }}: {{ or .message .content }}
//! ```
//!
//! Supported syntax:
//! - `.name` looks up a record field; missing fields are empty, never errors
//! - `.` is the whole record
//! - `"quoted"`, `` `raw` ``, integer and `true`/`false` literals
//! - function calls `fn a b`, sub-pipelines `(fn a)`, pipes `a | fn b`
//! - `{{ if }} ... {{ else if }} ... {{ else }} ... {{ end }}`
//! - `{{- ` / ` -}}` whitespace trimming and `{{/* comments */}}`
//!
//! Templates are compiled once; unknown functions and wrong argument counts
//! are compile errors. Everything that can only be known per record (for
//! example `severity` applied to a text field) is a [`RenderError`].

mod exec;
mod funcs;
mod lexer;
mod parse;

use std::fmt;

use minisyslog_common::StructuredRecord;
use thiserror::Error;

use crate::style::Style;

pub use funcs::Func;

/// Template used when no override is configured.
pub const DEFAULT_TEMPLATE: &str = "{{ .timestamp }} [{{ severity .severity }}] {{ yellow .hostname }} {{ or .app_name .tag | blue }}: {{ or .message .content }}";

/// Line and column (both 1-based) in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    fn locate(src: &str, offset: usize) -> Self {
        let before = &src[..offset.min(src.len())];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rfind('\n')
            .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
            + 1;
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while compiling a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template:{position}: {message}")]
    Syntax { position: Position, message: String },

    #[error("template:{position}: function {name:?} not defined")]
    UnknownFunction { position: Position, name: String },

    #[error("template:{position}: wrong number of args for {name}: want {expected}, got {got}")]
    Arity {
        position: Position,
        name: &'static str,
        expected: String,
        got: usize,
    },
}

impl TemplateError {
    pub(crate) fn syntax(src: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position: Position::locate(src, offset),
            message: message.into(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Syntax { position, .. }
            | Self::UnknownFunction { position, .. }
            | Self::Arity { position, .. } => *position,
        }
    }
}

/// Errors raised while rendering one record.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{func}: expected integer argument, got {got}")]
    ExpectedInt { func: &'static str, got: &'static str },

    #[error("{func}: expected string argument, got {got}")]
    ExpectedString { func: &'static str, got: &'static str },

    #[error("{func}: incompatible types for comparison: {left} and {right}")]
    Incomparable {
        func: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("len: value of type {0} has no length")]
    NoLength(&'static str),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A compiled template.
///
/// Immutable after [`compile`](Self::compile); render it from as many places
/// as needed.
#[derive(Debug, Clone)]
pub struct TemplateProgram {
    source: String,
    nodes: Vec<parse::Node>,
    style: Style,
}

impl TemplateProgram {
    /// Compile `source` with the given presentation settings.
    pub fn compile(source: &str, style: Style) -> Result<Self, TemplateError> {
        let items = lexer::lex(source)?;
        let nodes = parse::parse(source, items)?;
        Ok(Self {
            source: source.to_string(),
            nodes,
            style,
        })
    }

    /// Compile the built-in template.
    pub fn default_with_style(style: Style) -> Self {
        // The built-in template is covered by tests; failing here is a bug.
        Self::compile(DEFAULT_TEMPLATE, style).expect("default template compiles")
    }

    /// Template source this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn style(&self) -> Style {
        self.style
    }

    /// Render one record without a trailing newline.
    pub fn render(&self, record: &StructuredRecord) -> Result<String, RenderError> {
        let mut out = String::new();
        exec::Context::new(record, self.style).run(&self.nodes, &mut out)?;
        Ok(out)
    }
}
