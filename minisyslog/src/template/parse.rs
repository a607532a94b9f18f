//! Builds the node tree from lexed items.

use minisyslog_common::FieldValue;

use super::funcs::Func;
use super::lexer::{Item, Spanned, Token};
use super::{Position, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

/// Commands joined by `|`; never empty.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Operand(Arg),
    Call { func: Func, args: Vec<Arg> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Field(String),
    Dot,
    Literal(Literal),
    Pipeline(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Value(FieldValue),
    Bool(bool),
}

/// How a nested list ended.
enum Terminator {
    Else { offset: usize },
    ElseIf { condition: Pipeline, offset: usize },
    End { offset: usize },
}

pub(crate) fn parse(src: &str, items: Vec<Item>) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser {
        src,
        items: items.into_iter(),
    };
    let (nodes, terminator) = parser.parse_list()?;
    match terminator {
        None => Ok(nodes),
        Some(Terminator::End { offset }) => {
            Err(TemplateError::syntax(src, offset, "unexpected {{end}}"))
        }
        Some(Terminator::Else { offset } | Terminator::ElseIf { offset, .. }) => {
            Err(TemplateError::syntax(src, offset, "unexpected {{else}}"))
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    items: std::vec::IntoIter<Item>,
}

impl<'a> Parser<'a> {
    /// Parse nodes until input runs out or a control action closes the list.
    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<Terminator>), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let (tokens, offset) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, offset } => (tokens, offset),
            };

            match tokens.first().map(|t| &t.token) {
                Some(Token::Ident(word)) if word == "if" => {
                    let condition = self.parse_action_pipeline(&tokens[1..], offset)?;
                    nodes.push(self.parse_if(condition, offset)?);
                }
                Some(Token::Ident(word)) if word == "else" => {
                    let rest = &tokens[1..];
                    let terminator = match rest.first().map(|t| &t.token) {
                        None => Terminator::Else { offset },
                        Some(Token::Ident(word)) if word == "if" => Terminator::ElseIf {
                            condition: self.parse_action_pipeline(&rest[1..], offset)?,
                            offset,
                        },
                        Some(_) => {
                            return Err(TemplateError::syntax(
                                self.src,
                                rest[0].offset,
                                "unexpected token after else",
                            ));
                        }
                    };
                    return Ok((nodes, Some(terminator)));
                }
                Some(Token::Ident(word)) if word == "end" => {
                    if let Some(extra) = tokens.get(1) {
                        return Err(TemplateError::syntax(
                            self.src,
                            extra.offset,
                            "unexpected token after end",
                        ));
                    }
                    return Ok((nodes, Some(Terminator::End { offset })));
                }
                _ => {
                    let pipeline = self.parse_action_pipeline(&tokens, offset)?;
                    nodes.push(Node::Action(pipeline));
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_if(&mut self, condition: Pipeline, offset: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut condition = condition;

        loop {
            let (body, terminator) = self.parse_list()?;
            branches.push((condition, body));

            match terminator {
                Some(Terminator::End { .. }) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    });
                }
                Some(Terminator::ElseIf {
                    condition: next, ..
                }) => condition = next,
                Some(Terminator::Else { offset: else_offset }) => {
                    let (otherwise, terminator) = self.parse_list()?;
                    return match terminator {
                        Some(Terminator::End { .. }) => Ok(Node::If { branches, otherwise }),
                        Some(Terminator::Else { offset } | Terminator::ElseIf { offset, .. }) => {
                            Err(TemplateError::syntax(
                                self.src,
                                offset,
                                "expected {{end}} after {{else}}",
                            ))
                        }
                        None => Err(TemplateError::syntax(
                            self.src,
                            else_offset,
                            "unexpected EOF: missing {{end}}",
                        )),
                    };
                }
                None => {
                    return Err(TemplateError::syntax(
                        self.src,
                        offset,
                        "unexpected EOF: missing {{end}}",
                    ));
                }
            }
        }
    }

    /// Parse the whole token list of an action as one pipeline.
    fn parse_action_pipeline(
        &self,
        tokens: &[Spanned],
        offset: usize,
    ) -> Result<Pipeline, TemplateError> {
        if tokens.is_empty() {
            return Err(TemplateError::syntax(self.src, offset, "missing value for command"));
        }

        let mut cursor = Cursor {
            src: self.src,
            tokens,
            idx: 0,
        };
        let pipeline = cursor.pipeline(false)?;
        if let Some(extra) = cursor.peek() {
            return Err(TemplateError::syntax(
                self.src,
                extra.offset,
                format!("unexpected {}", extra.token.describe()),
            ));
        }
        Ok(pipeline)
    }
}

struct Cursor<'a, 't> {
    src: &'a str,
    tokens: &'t [Spanned],
    idx: usize,
}

impl<'a, 't> Cursor<'a, 't> {
    fn peek(&self) -> Option<&'t Spanned> {
        self.tokens.get(self.idx)
    }

    fn next(&mut self) -> Option<&'t Spanned> {
        let token = self.tokens.get(self.idx);
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    /// Offset of the last token, for errors at end of input.
    fn end_offset(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.offset)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(self.src, offset, message)
    }

    /// Parse commands separated by `|`. Inside parentheses the pipeline ends
    /// at the closing paren, which is left for the caller.
    fn pipeline(&mut self, in_parens: bool) -> Result<Pipeline, TemplateError> {
        let mut commands = Vec::new();

        loop {
            let first = commands.is_empty();
            commands.push(self.command(first)?);

            let Some(next) = self.peek() else {
                if in_parens {
                    return Err(self.error(self.end_offset(), "unclosed left paren"));
                }
                break;
            };

            match next.token {
                Token::Pipe => {
                    self.next();
                }
                Token::RParen if in_parens => break,
                _ => {
                    return Err(self.error(
                        next.offset,
                        format!("unexpected {}", next.token.describe()),
                    ));
                }
            }
        }

        Ok(Pipeline { commands })
    }

    fn command(&mut self, first: bool) -> Result<Command, TemplateError> {
        let Some(head) = self.next() else {
            return Err(self.error(self.end_offset(), "missing value for command"));
        };

        match &head.token {
            Token::Ident(name) => {
                let func = Func::lookup(name).ok_or_else(|| TemplateError::UnknownFunction {
                    position: Position::locate(self.src, head.offset),
                    name: name.clone(),
                })?;

                let mut args = Vec::new();
                while let Some(token) = self.peek() {
                    if matches!(token.token, Token::Pipe | Token::RParen) {
                        break;
                    }
                    self.next();
                    args.push(self.arg(token)?);
                }

                let count = args.len() + usize::from(!first);
                if !func.accepts(count) {
                    return Err(TemplateError::Arity {
                        position: Position::locate(self.src, head.offset),
                        name: func.name(),
                        expected: func.expected_args(),
                        got: count,
                    });
                }

                Ok(Command::Call { func, args })
            }
            Token::Pipe | Token::RParen => {
                Err(self.error(head.offset, "missing value for command"))
            }
            _ => {
                if !first {
                    return Err(self.error(
                        head.offset,
                        format!(
                            "non-executable command in pipeline stage: {}",
                            head.token.describe()
                        ),
                    ));
                }
                let operand = self.arg(head)?;
                match self.peek() {
                    Some(next) if !matches!(next.token, Token::Pipe | Token::RParen) => {
                        Err(self.error(
                            next.offset,
                            format!(
                                "can't give argument to non-function {}",
                                head.token.describe()
                            ),
                        ))
                    }
                    _ => Ok(Command::Operand(operand)),
                }
            }
        }
    }

    fn arg(&mut self, token: &'t Spanned) -> Result<Arg, TemplateError> {
        match &token.token {
            Token::Field(name) => Ok(Arg::Field(name.clone())),
            Token::Dot => Ok(Arg::Dot),
            Token::Str(s) => Ok(Arg::Literal(Literal::Value(FieldValue::Text(s.clone())))),
            Token::Int(i) => Ok(Arg::Literal(Literal::Value(FieldValue::Int(*i)))),
            Token::Bool(b) => Ok(Arg::Literal(Literal::Bool(*b))),
            Token::LParen => {
                let pipeline = self.pipeline(true)?;
                // pipeline(true) only returns Ok when the next token is ")"
                self.next();
                Ok(Arg::Pipeline(pipeline))
            }
            Token::Ident(name) => Err(self.error(
                token.offset,
                format!("function {:?} used as an argument; wrap the call in parentheses", name),
            )),
            Token::Pipe | Token::RParen => Err(self.error(
                token.offset,
                format!("unexpected {}", token.token.describe()),
            )),
        }
    }
}
