//! Evaluates a compiled template against one record.

use std::borrow::Cow;
use std::cmp::Ordering;

use minisyslog_common::{FieldValue, Severity, StructuredRecord, facility_label, severity_label};

use super::RenderError;
use super::funcs::Func;
use super::parse::{Arg, Command, Literal, Node, Pipeline};
use crate::style::Style;

/// Runtime value. Borrows from the record and the compiled template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value<'a> {
    /// Lookup of a field the record doesn't have.
    Missing,
    Str(Cow<'a, str>),
    Int(i64),
    Bool(bool),
    /// The record itself (`.`).
    Record,
}

impl Value<'_> {
    /// Go-template truthiness: empty, zero, false and missing are false.
    fn truthy(&self, record: &StructuredRecord) -> bool {
        match self {
            Value::Missing => false,
            Value::Str(s) => !s.is_empty(),
            Value::Int(i) => *i != 0,
            Value::Bool(b) => *b,
            Value::Record => !record.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Record => "record",
        }
    }
}

pub(crate) struct Context<'a> {
    record: &'a StructuredRecord,
    style: Style,
}

impl<'a> Context<'a> {
    pub(crate) fn new(record: &'a StructuredRecord, style: Style) -> Self {
        Self { record, style }
    }

    pub(crate) fn run(&self, nodes: &'a [Node], out: &mut String) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline)?;
                    out.push_str(&self.stringify(&value)?);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (condition, body) in branches {
                        if self.pipeline(condition)?.truthy(self.record) {
                            taken = Some(body);
                            break;
                        }
                    }
                    self.run(taken.unwrap_or(otherwise), out)?;
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &'a Pipeline) -> Result<Value<'a>, RenderError> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, piped)?);
        }
        Ok(piped.unwrap_or(Value::Missing))
    }

    fn command(
        &self,
        command: &'a Command,
        piped: Option<Value<'a>>,
    ) -> Result<Value<'a>, RenderError> {
        match command {
            Command::Operand(arg) => self.arg(arg),
            Command::Call { func, args } => {
                let mut values = args
                    .iter()
                    .map(|arg| self.arg(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                self.call(*func, values)
            }
        }
    }

    fn arg(&self, arg: &'a Arg) -> Result<Value<'a>, RenderError> {
        Ok(match arg {
            Arg::Field(name) => match self.record.get(name) {
                Some(FieldValue::Int(i)) => Value::Int(*i),
                Some(FieldValue::Text(s)) => Value::Str(Cow::Borrowed(s)),
                None => Value::Missing,
            },
            Arg::Dot => Value::Record,
            Arg::Literal(Literal::Value(FieldValue::Int(i))) => Value::Int(*i),
            Arg::Literal(Literal::Value(FieldValue::Text(s))) => Value::Str(Cow::Borrowed(s)),
            Arg::Literal(Literal::Bool(b)) => Value::Bool(*b),
            Arg::Pipeline(pipeline) => self.pipeline(pipeline)?,
        })
    }

    /// Arity was checked at compile time, so indexing `args` is safe.
    fn call(&self, func: Func, args: Vec<Value<'a>>) -> Result<Value<'a>, RenderError> {
        match func {
            Func::Severity => {
                let code = expect_int(func, &args[0])?;
                Ok(Value::Str(match Severity::from_code(code) {
                    Some(severity) => Cow::Owned(self.style.severity(severity)),
                    None => severity_label(code),
                }))
            }
            Func::SeverityName => Ok(Value::Str(severity_label(expect_int(func, &args[0])?))),
            Func::Facility => Ok(Value::Str(facility_label(expect_int(func, &args[0])?))),
            Func::Paint(color) => {
                let text = self.stringify(&args[0])?;
                Ok(Value::Str(Cow::Owned(self.style.paint(color, &text))))
            }
            Func::Or => Ok(self.first_or_last(args, true)),
            Func::And => Ok(self.first_or_last(args, false)),
            Func::Not => Ok(Value::Bool(!args[0].truthy(self.record))),
            Func::Eq => {
                for other in &args[1..] {
                    if compare(func, &args[0], other)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Func::Ne => Ok(Value::Bool(!compare(func, &args[0], &args[1])?)),
            Func::Lt => Ok(Value::Bool(order(func, &args[0], &args[1])?.is_lt())),
            Func::Le => Ok(Value::Bool(order(func, &args[0], &args[1])?.is_le())),
            Func::Gt => Ok(Value::Bool(order(func, &args[0], &args[1])?.is_gt())),
            Func::Ge => Ok(Value::Bool(order(func, &args[0], &args[1])?.is_ge())),
            Func::Print => {
                let mut out = String::new();
                for (i, value) in args.iter().enumerate() {
                    // Like Go's fmt.Sprint: space only between two non-strings
                    if i > 0 && !is_stringish(&args[i - 1]) && !is_stringish(value) {
                        out.push(' ');
                    }
                    out.push_str(&self.stringify(value)?);
                }
                Ok(Value::Str(Cow::Owned(out)))
            }
            Func::Printf => {
                let format = match &args[0] {
                    Value::Str(s) => s.clone(),
                    other => {
                        return Err(RenderError::ExpectedString {
                            func: func.name(),
                            got: other.type_name(),
                        });
                    }
                };
                Ok(Value::Str(Cow::Owned(self.printf(&format, &args[1..])?)))
            }
            Func::Len => match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Record => Ok(Value::Int(self.record.len() as i64)),
                other => Err(RenderError::NoLength(other.type_name())),
            },
            Func::Json => {
                let encoded = match &args[0] {
                    Value::Missing => "null".to_string(),
                    Value::Str(s) => serde_json::to_string(s.as_ref())?,
                    Value::Int(i) => i.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Record => serde_json::to_string(self.record)?,
                };
                Ok(Value::Str(Cow::Owned(encoded)))
            }
        }
    }

    /// `or` returns the first truthy argument, `and` the first falsy one;
    /// otherwise both return the last argument.
    fn first_or_last(&self, args: Vec<Value<'a>>, want_truthy: bool) -> Value<'a> {
        let mut last = Value::Missing;
        for value in args {
            if value.truthy(self.record) == want_truthy {
                return value;
            }
            last = value;
        }
        last
    }

    /// Subset of Go's `fmt.Sprintf`: verbs `s`, `v`, `d`, `q`, an optional
    /// `-` flag and a width. Widths count characters.
    fn printf(&self, format: &str, args: &[Value<'_>]) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut args = args.iter();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.next_if_eq(&'%').is_some() {
                out.push('%');
                continue;
            }

            let left_align = chars.next_if_eq(&'-').is_some();
            let mut width = 0usize;
            while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                width = width * 10 + usize::from(digit as u8 - b'0');
            }

            let Some(verb) = chars.next() else {
                out.push_str("%!(NOVERB)");
                break;
            };

            let text = match (verb, args.next()) {
                (_, None) => format!("%!{}(MISSING)", verb),
                ('s' | 'v', Some(value)) => self.stringify(value)?,
                ('d', Some(value)) => expect_int(Func::Printf, value)?.to_string(),
                ('q', Some(value)) => serde_json::to_string(&self.stringify(value)?)?,
                (other, Some(value)) => format!("%!{}({})", other, self.stringify(value)?),
            };

            let padding = width.saturating_sub(text.chars().count());
            if left_align {
                out.push_str(&text);
                out.extend(std::iter::repeat_n(' ', padding));
            } else {
                out.extend(std::iter::repeat_n(' ', padding));
                out.push_str(&text);
            }
        }

        Ok(out)
    }

    fn stringify(&self, value: &Value<'_>) -> Result<String, RenderError> {
        Ok(match value {
            Value::Missing => String::new(),
            Value::Str(s) => s.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Record => serde_json::to_string(self.record)?,
        })
    }
}

fn is_stringish(value: &Value<'_>) -> bool {
    matches!(value, Value::Str(_) | Value::Missing)
}

fn expect_int(func: Func, value: &Value<'_>) -> Result<i64, RenderError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(RenderError::ExpectedInt {
            func: func.name(),
            got: other.type_name(),
        }),
    }
}

/// Ordering for `lt`/`le`/`gt`/`ge`: integers with integers, strings with
/// strings.
fn order(func: Func, left: &Value<'_>, right: &Value<'_>) -> Result<Ordering, RenderError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (a, b) => Err(RenderError::Incomparable {
            func: func.name(),
            left: a.type_name(),
            right: b.type_name(),
        }),
    }
}

fn compare(func: Func, left: &Value<'_>, right: &Value<'_>) -> Result<bool, RenderError> {
    match (left, right) {
        (Value::Missing, Value::Missing) | (Value::Record, Value::Record) => Ok(true),
        (Value::Missing, _) | (_, Value::Missing) => Ok(false),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (a, b) => Err(RenderError::Incomparable {
            func: func.name(),
            left: a.type_name(),
            right: b.type_name(),
        }),
    }
}
