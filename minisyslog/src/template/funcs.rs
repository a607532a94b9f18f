//! Functions callable from templates.

use crate::style::Color;

/// A template function, resolved at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// Colored severity label.
    Severity,
    /// Plain severity label.
    SeverityName,
    /// Facility name.
    Facility,
    /// Terminal emphasis.
    Paint(Color),
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Print,
    /// Go-style formatting with `%s`, `%d`, `%v`, `%q` and widths.
    Printf,
    Len,
    Json,
}

impl Func {
    /// Names of every function, in the order they are documented.
    pub const NAMES: &'static [&'static str] = &[
        "severity",
        "severity_name",
        "facility",
        "bold",
        "red",
        "green",
        "yellow",
        "blue",
        "gray",
        "or",
        "and",
        "not",
        "eq",
        "ne",
        "lt",
        "le",
        "gt",
        "ge",
        "print",
        "printf",
        "len",
        "json",
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        if let Some(color) = Color::from_name(name) {
            return Some(Func::Paint(color));
        }
        match name {
            "severity" => Some(Func::Severity),
            "severity_name" => Some(Func::SeverityName),
            "facility" => Some(Func::Facility),
            "or" => Some(Func::Or),
            "and" => Some(Func::And),
            "not" => Some(Func::Not),
            "eq" => Some(Func::Eq),
            "ne" => Some(Func::Ne),
            "lt" => Some(Func::Lt),
            "le" => Some(Func::Le),
            "gt" => Some(Func::Gt),
            "ge" => Some(Func::Ge),
            "print" => Some(Func::Print),
            "printf" => Some(Func::Printf),
            "len" => Some(Func::Len),
            "json" => Some(Func::Json),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Severity => "severity",
            Func::SeverityName => "severity_name",
            Func::Facility => "facility",
            Func::Paint(Color::Bold) => "bold",
            Func::Paint(Color::Red) => "red",
            Func::Paint(Color::Green) => "green",
            Func::Paint(Color::Yellow) => "yellow",
            Func::Paint(Color::Blue) => "blue",
            Func::Paint(Color::Gray) => "gray",
            Func::Or => "or",
            Func::And => "and",
            Func::Not => "not",
            Func::Eq => "eq",
            Func::Ne => "ne",
            Func::Lt => "lt",
            Func::Le => "le",
            Func::Gt => "gt",
            Func::Ge => "ge",
            Func::Print => "print",
            Func::Printf => "printf",
            Func::Len => "len",
            Func::Json => "json",
        }
    }

    /// Accepted argument count as `(min, max)`; `None` means unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Func::Severity
            | Func::SeverityName
            | Func::Facility
            | Func::Paint(_)
            | Func::Not
            | Func::Len
            | Func::Json => (1, Some(1)),
            Func::Or | Func::And => (1, None),
            Func::Eq => (2, None),
            Func::Ne | Func::Lt | Func::Le | Func::Gt | Func::Ge => (2, Some(2)),
            Func::Print => (0, None),
            Func::Printf => (1, None),
        }
    }

    /// Human readable form of [`arity`](Self::arity) for error messages.
    pub fn expected_args(&self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => min.to_string(),
            (min, Some(max)) => format!("{} to {}", min, max),
            (min, None) => format!("at least {}", min),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.is_none_or(|max| count <= max)
    }
}
