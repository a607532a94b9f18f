//! Splits template source into literal text and tokenized actions.

use super::TemplateError;

/// A token inside a `{{ }}` action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.name`
    Field(String),
    /// `.`
    Dot,
    Ident(String),
    Str(String),
    Int(i64),
    Bool(bool),
    LParen,
    RParen,
    Pipe,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Field(name) => format!("field .{}", name),
            Token::Dot => "\".\"".to_string(),
            Token::Ident(name) => format!("identifier {:?}", name),
            Token::Str(s) => format!("string {:?}", s),
            Token::Int(i) => format!("number {}", i),
            Token::Bool(b) => format!("boolean {}", b),
            Token::LParen => "\"(\"".to_string(),
            Token::RParen => "\")\"".to_string(),
            Token::Pipe => "\"|\"".to_string(),
        }
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action {
        tokens: Vec<Spanned>,
        /// Offset of the opening `{{`.
        offset: usize,
    },
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub(crate) fn lex(src: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next_text = false;

    while pos <= src.len() {
        let open = src[pos..].find(OPEN).map(|i| pos + i);
        let text_end = open.unwrap_or(src.len());
        let mut text = &src[pos..text_end];

        if trim_next_text {
            text = text.trim_start();
        }

        let Some(open) = open else {
            push_text(&mut items, text);
            break;
        };

        let mut cursor = open + OPEN.len();
        if trim_marker_at(src, cursor) {
            text = text.trim_end();
            cursor += 1;
        }
        push_text(&mut items, text);

        let rest = src[cursor..].trim_start();
        let after_ws = src.len() - rest.len();

        let (end, trim_right) = if rest.starts_with("/*") {
            lex_comment(src, open, after_ws)?
        } else {
            let (tokens, end, trim_right) = lex_action(src, open, cursor)?;
            items.push(Item::Action {
                tokens,
                offset: open,
            });
            (end, trim_right)
        };

        trim_next_text = trim_right;
        pos = end;
        if pos == src.len() {
            break;
        }
    }

    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str) {
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

/// `{{- ` trims preceding text; the dash must be followed by whitespace so
/// that `{{-3}}` still reads as a negative number.
fn trim_marker_at(src: &str, at: usize) -> bool {
    let mut chars = src[at..].chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Match ` -}}` or `}}` at `at`. Returns the offset past the delimiter and
/// whether it trims the following text.
fn close_at(src: &str, at: usize, preceded_by_ws: bool) -> Option<(usize, bool)> {
    let rest = &src[at..];
    if preceded_by_ws && rest.starts_with("-}}") {
        Some((at + 3, true))
    } else if rest.starts_with(CLOSE) {
        Some((at + CLOSE.len(), false))
    } else {
        None
    }
}

fn lex_comment(src: &str, open: usize, start: usize) -> Result<(usize, bool), TemplateError> {
    let body = &src[start + 2..];
    let Some(end) = body.find("*/") else {
        return Err(TemplateError::syntax(src, open, "unclosed comment"));
    };
    let after = start + 2 + end + 2;
    let rest = src[after..].trim_start();
    let close = src.len() - rest.len();

    close_at(src, close, close > after)
        .ok_or_else(|| TemplateError::syntax(src, open, "comment ends before closing delimiter"))
}

fn lex_action(
    src: &str,
    open: usize,
    start: usize,
) -> Result<(Vec<Spanned>, usize, bool), TemplateError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = start;

    loop {
        let ws_start = i;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(TemplateError::syntax(src, open, "unclosed action"));
        }
        if let Some((end, trim)) = close_at(src, i, i > ws_start) {
            return Ok((tokens, end, trim));
        }

        let offset = i;
        let c = bytes[i];
        let token = match c {
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'|' => {
                i += 1;
                Token::Pipe
            }
            b'.' => {
                i += 1;
                let name_end = scan_ident(bytes, i);
                if name_end == i {
                    Token::Dot
                } else {
                    let name = src[i..name_end].to_string();
                    i = name_end;
                    Token::Field(name)
                }
            }
            b'"' => {
                let (value, end) = lex_quoted(src, offset)?;
                i = end;
                Token::Str(value)
            }
            b'`' => {
                let Some(len) = src[i + 1..].find('`') else {
                    return Err(TemplateError::syntax(src, offset, "unterminated raw string"));
                };
                let value = src[i + 1..i + 1 + len].to_string();
                i += len + 2;
                Token::Str(value)
            }
            b'0'..=b'9' | b'-' => {
                let digits_start = if c == b'-' { i + 1 } else { i };
                let mut end = digits_start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == digits_start {
                    return Err(TemplateError::syntax(src, offset, "bad number syntax"));
                }
                let value = src[i..end]
                    .parse()
                    .map_err(|_| TemplateError::syntax(src, offset, "number out of range"))?;
                i = end;
                Token::Int(value)
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                let end = scan_ident(bytes, i);
                let word = &src[i..end];
                i = end;
                match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(TemplateError::syntax(
                    src,
                    offset,
                    format!("unexpected {:?} in action", ch),
                ));
            }
        };

        tokens.push(Spanned { token, offset });
    }
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end] == b'_' || bytes[end].is_ascii_alphanumeric()) {
        end += 1;
    }
    end
}

/// Read a double-quoted string starting at `start`.
fn lex_quoted(src: &str, start: usize) -> Result<(String, usize), TemplateError> {
    let mut value = String::new();
    let mut chars = src[start + 1..].char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, start + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => {
                    return Err(TemplateError::syntax(
                        src,
                        start,
                        format!("unknown escape sequence \\{}", other),
                    ));
                }
                None => break,
            },
            '\n' => break,
            _ => value.push(c),
        }
    }

    Err(TemplateError::syntax(src, start, "unterminated quoted string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(item: &Item) -> Vec<Token> {
        match item {
            Item::Action { tokens, .. } => tokens.iter().map(|s| s.token.clone()).collect(),
            Item::Text(t) => panic!("expected action, got text {:?}", t),
        }
    }

    #[test]
    fn test_text_only() {
        assert_eq!(lex("plain").unwrap(), vec![Item::Text("plain".into())]);
        assert!(lex("").unwrap().is_empty());
    }

    #[test]
    fn test_action_tokens() {
        let items = lex(r#"a {{ or .app_name .tag | blue }} b"#).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Item::Text("a ".into()));
        assert_eq!(
            tokens(&items[1]),
            vec![
                Token::Ident("or".into()),
                Token::Field("app_name".into()),
                Token::Field("tag".into()),
                Token::Pipe,
                Token::Ident("blue".into()),
            ]
        );
        assert_eq!(items[2], Item::Text(" b".into()));
    }

    #[test]
    fn test_literals() {
        let items = lex(r#"{{print "a\"b\n" `raw\n` -12 7 true false . (x)}}"#).unwrap();
        assert_eq!(
            tokens(&items[0]),
            vec![
                Token::Ident("print".into()),
                Token::Str("a\"b\n".into()),
                Token::Str("raw\\n".into()),
                Token::Int(-12),
                Token::Int(7),
                Token::Bool(true),
                Token::Bool(false),
                Token::Dot,
                Token::LParen,
                Token::Ident("x".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_close_delimiter_inside_string() {
        let items = lex(r#"{{ "}}" }}"#).unwrap();
        assert_eq!(tokens(&items[0]), vec![Token::Str("}}".into())]);
    }

    #[test]
    fn test_trim_markers() {
        let items = lex("a  \n {{- .x -}} \n b").unwrap();
        assert_eq!(items[0], Item::Text("a".into()));
        assert_eq!(tokens(&items[1]), vec![Token::Field("x".into())]);
        assert_eq!(items[2], Item::Text("b".into()));
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        let items = lex("a {{-3}}").unwrap();
        assert_eq!(items[0], Item::Text("a ".into()));
        assert_eq!(tokens(&items[1]), vec![Token::Int(-3)]);
    }

    #[test]
    fn test_comments_are_dropped() {
        let items = lex("a {{/* note }} */}} b {{- /* x */ -}} c").unwrap();
        assert_eq!(
            items,
            vec![
                Item::Text("a ".into()),
                Item::Text(" b".into()),
                Item::Text("c".into()),
            ]
        );
    }

    #[test]
    fn test_lex_errors() {
        assert!(lex("{{ .x").is_err());
        assert!(lex(r#"{{ "abc }}"#).is_err());
        assert!(lex("{{ `abc }}").is_err());
        assert!(lex("{{ # }}").is_err());
        assert!(lex("{{/* open").is_err());
        assert!(lex(r#"{{ "\q" }}"#).is_err());
        assert!(lex("{{ - }}").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = lex("line one\n  {{ .x ").unwrap_err();
        assert_eq!(err.to_string(), "template:2:3: unclosed action");
    }
}
