//! ASCII FBX reader
//!
//! Grammar, one node per line:
//!
//! ```text
//! Name: value, value, ... {
//!     Child: value
//!     Array: *3 {
//!         a: 1,2,3
//!     }
//! }
//! ```
//!
//! `;` starts a comment. A trailing comma continues a value list on the next
//! line. The version comes from `FBXHeaderExtension/FBXVersion`.

use super::document::{FbxDocument, FbxNode, Property};
use crate::error::LoadError;

/// Version assumed when the header does not declare one
const DEFAULT_VERSION: u32 = 7400;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Word(String),
    Str(String),
    Number(String),
    ArrayCount(usize),
    Comma,
    Open,
    Close,
    Newline,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> LoadError {
        LoadError::Parse(format!("line {}: {}", self.line, message))
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, start: usize, keep: F) -> &'a str {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if !keep(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        &self.source[start..end]
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, LoadError> {
        let mut tokens = Vec::new();
        while let Some((start, c)) = self.chars.next() {
            let token = match c {
                ' ' | '\t' | '\r' => continue,
                '\n' => {
                    self.line += 1;
                    Token::Newline
                }
                ';' => {
                    self.take_while(start, |c| c != '\n');
                    continue;
                }
                ',' => Token::Comma,
                '{' => Token::Open,
                '}' => Token::Close,
                '"' => {
                    let mut value = String::new();
                    let mut closed = false;
                    for (_, c) in self.chars.by_ref() {
                        if c == '"' {
                            closed = true;
                            break;
                        }
                        if c == '\n' {
                            self.line += 1;
                        }
                        value.push(c);
                    }
                    if !closed {
                        return Err(LoadError::IncompleteData(format!(
                            "line {}: unterminated string",
                            self.line
                        )));
                    }
                    Token::Str(value)
                }
                '*' => {
                    let digits = self.take_while(start + 1, |c| c.is_ascii_digit());
                    let count = digits
                        .parse()
                        .map_err(|_| self.error("array marker without a length"))?;
                    Token::ArrayCount(count)
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                    let text = self.take_while(start + c.len_utf8(), |c| {
                        c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '#')
                    });
                    Token::Number(format!("{c}{text}"))
                }
                c if c.is_alphabetic() || c == '_' => {
                    let word = self
                        .take_while(start + c.len_utf8(), |c| c.is_alphanumeric() || matches!(c, '_' | '|'));
                    let word = format!("{c}{word}");
                    if matches!(self.chars.peek(), Some(&(_, ':'))) {
                        self.chars.next();
                        Token::Key(word)
                    } else {
                        Token::Word(word)
                    }
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            tokens.push((token, self.line));
        }
        Ok(tokens)
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, line)| *line)
            .unwrap_or(0)
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> LoadError {
        LoadError::Parse(format!("line {}: {}", self.line(), message))
    }

    fn eof(&self, context: &str) -> LoadError {
        LoadError::IncompleteData(format!("file ended inside {context}"))
    }

    /// Parses nodes until `}` (nested) or end of input (top level)
    fn parse_nodes(&mut self, nested: bool) -> Result<Vec<FbxNode>, LoadError> {
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            match self.next() {
                Some(Token::Key(name)) => nodes.push(self.parse_node(name)?),
                Some(Token::Close) if nested => return Ok(nodes),
                None if nested => return Err(self.eof("a node block")),
                None => return Ok(nodes),
                Some(other) => return Err(self.error(format!("expected a node name, found {other:?}"))),
            }
        }
    }

    fn parse_node(&mut self, name: String) -> Result<FbxNode, LoadError> {
        let mut node = FbxNode::new(name);

        if let Some(Token::ArrayCount(count)) = self.peek().cloned() {
            self.pos += 1;
            node.properties.push(self.parse_array(count)?);
            return Ok(node);
        }

        node.properties = self.parse_values()?;
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            node.children = self.parse_nodes(true)?;
        }
        Ok(node)
    }

    /// Comma-separated values up to the end of the line
    fn parse_values(&mut self) -> Result<Vec<Property>, LoadError> {
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Str(_) | Token::Number(_) | Token::Word(_)) => {}
                _ => return Ok(values),
            }
            let value = match self.next() {
                Some(Token::Str(s)) => Property::String(s),
                Some(Token::Word(w)) => Property::String(w),
                Some(Token::Number(n)) => parse_number(&n).ok_or_else(|| self.error(format!("bad number '{n}'")))?,
                _ => return Ok(values),
            };
            values.push(value);
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                self.skip_newlines();
            } else {
                return Ok(values);
            }
        }
    }

    /// `*N { a: v, v, ... }`
    fn parse_array(&mut self, count: usize) -> Result<Property, LoadError> {
        self.skip_newlines();
        match self.next() {
            Some(Token::Open) => {}
            None => return Err(self.eof("an array")),
            Some(other) => return Err(self.error(format!("expected '{{' after array length, found {other:?}"))),
        }
        self.skip_newlines();
        let values = match self.next() {
            Some(Token::Key(key)) if key == "a" => self.parse_values()?,
            Some(Token::Close) => return Ok(Property::I64Array(Vec::new())),
            None => return Err(self.eof("an array")),
            Some(other) => return Err(self.error(format!("expected 'a:' in array, found {other:?}"))),
        };
        self.skip_newlines();
        match self.next() {
            Some(Token::Close) => {}
            None => return Err(self.eof("an array")),
            Some(other) => return Err(self.error(format!("expected '}}' closing array, found {other:?}"))),
        }

        if values.len() != count {
            log::warn!("ASCII array declares {} values but holds {}", count, values.len());
        }
        let all_integers = values.iter().all(|v| matches!(v, Property::I64(_)));
        if all_integers {
            Ok(Property::I64Array(
                values.iter().filter_map(Property::as_i64).collect(),
            ))
        } else {
            let floats: Option<Vec<f64>> = values.iter().map(Property::as_f64).collect();
            floats
                .map(Property::F64Array)
                .ok_or_else(|| self.error("array mixes numbers and strings"))
        }
    }
}

fn parse_number(text: &str) -> Option<Property> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Property::I64(int));
    }
    text.parse::<f64>().ok().map(Property::F64)
}

pub fn parse(bytes: &[u8]) -> Result<FbxDocument, LoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LoadError::Parse(format!("ASCII FBX is not valid UTF-8: {e}")))?;
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let roots = parser.parse_nodes(false)?;
    if roots.is_empty() {
        return Err(LoadError::Parse("no FBX nodes found".to_string()));
    }

    let version = roots
        .iter()
        .find(|n| n.name == "FBXHeaderExtension")
        .and_then(|header| header.child("FBXVersion"))
        .and_then(|v| v.property(0))
        .and_then(Property::as_i64)
        .map(|v| v as u32)
        .unwrap_or(DEFAULT_VERSION);

    log::debug!("ASCII FBX {} with {} top-level nodes", version, roots.len());
    Ok(FbxDocument { version, roots })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = r#"; FBX 7.4.0 project file
FBXHeaderExtension:  {
    FBXHeaderVersion: 1003
    FBXVersion: 7400
}
Objects:  {
    Geometry: 100, "Geometry::Cube", "Mesh" {
        Vertices: *6 {
            a: 0,1.5,-2,
            3,4e1,5
        }
        PolygonVertexIndex: *3 {
            a: 0,1,-3
        }
    }
}
Connections:  {
    C: "OO",100,0
}
"#;

    #[test]
    fn test_parse_nodes_and_arrays() {
        let document = parse(SNIPPET.as_bytes()).unwrap();
        assert_eq!(document.version, 7400);
        let geometry = document.root("Objects").unwrap().child("Geometry").unwrap();
        assert_eq!(geometry.property(0), Some(&Property::I64(100)));
        assert_eq!(geometry.property(2).and_then(Property::as_str), Some("Mesh"));
        assert_eq!(
            geometry.child_f64_vec("Vertices").unwrap(),
            vec![0.0, 1.5, -2.0, 3.0, 40.0, 5.0]
        );
        assert_eq!(geometry.child_i32_vec("PolygonVertexIndex").unwrap(), vec![0, 1, -3]);

        let connection = document.root("Connections").unwrap().child("C").unwrap();
        assert_eq!(connection.properties.len(), 3);
    }

    #[test]
    fn test_unclosed_block_is_incomplete() {
        let text = "Objects:  {\n    Geometry: 1, \"Geometry::A\", \"Mesh\" {\n";
        assert!(matches!(parse(text.as_bytes()), Err(LoadError::IncompleteData(_))));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(parse(b"@@@"), Err(LoadError::Parse(_))));
        assert!(matches!(parse(b""), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_words_become_strings() {
        let document = parse(b"Shading: Y\nCulling: \"CullingOff\"\n").unwrap();
        assert_eq!(document.roots[0].property(0), Some(&Property::String("Y".into())));
        assert_eq!(
            document.roots[1].property(0),
            Some(&Property::String("CullingOff".into()))
        );
    }
}
