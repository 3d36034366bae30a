//! Lexer for reference engine module source.
//!
//! Built on logos. Produces tokens with 1-based line/column spans; line and
//! column offsets are applied only when a position is reported.

use std::fmt;
use std::ops::Range;

use logos::{Lexer as LogosLexer, Logos};

/// Token of the module language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Keywords (must come before identifiers)
    #[token("import")]
    Import,

    #[token("export")]
    Export,

    #[token("from")]
    From,

    #[token("as")]
    As,

    #[token("with")]
    With,

    #[token("let")]
    Let,

    #[token("await")]
    Await,

    #[token("throw")]
    Throw,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("undefined")]
    Undefined,

    // Punctuation
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token("=")]
    Eq,

    #[token(":")]
    Colon,

    // Literals
    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, unescape)]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(String),
}

fn unescape(lex: &mut LogosLexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let escaped = match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other @ ('\\' | '"' | '\'') => other,
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Import => f.write_str("import"),
            Token::Export => f.write_str("export"),
            Token::From => f.write_str("from"),
            Token::As => f.write_str("as"),
            Token::With => f.write_str("with"),
            Token::Let => f.write_str("let"),
            Token::Await => f.write_str("await"),
            Token::Throw => f.write_str("throw"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Undefined => f.write_str("undefined"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Eq => f.write_str("="),
            Token::Colon => f.write_str(":"),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Identifier(name) => f.write_str(name),
        }
    }
}

/// Source location of a token, before offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Reported `(line, column)` after applying offsets.
    ///
    /// The column offset only shifts the first line.
    pub fn position(&self, line_offset: i32, column_offset: i32) -> (i64, i64) {
        let line = i64::from(self.line) + i64::from(line_offset);
        let column = if self.line == 1 {
            i64::from(self.column) + i64::from(column_offset)
        } else {
            i64::from(self.column)
        };
        (line, column)
    }
}

/// Compile-time error with the location it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Byte offset to line/column lookup.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            line_starts,
        }
    }

    fn span(&self, range: Range<usize>) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= range.start);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..range.start].chars().count() + 1;
        Span::new(range.start, range.end, line as u32, column as u32)
    }
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, SyntaxError> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = index.span(lexer.span());
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(SyntaxError::new(
                    format!("Invalid or unexpected token '{}'", lexer.slice()),
                    span,
                ))
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("import importer as"),
            vec![
                Token::Import,
                Token::Identifier("importer".to_string()),
                Token::As
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b" 'c\n'"#),
            vec![
                Token::String("a\"b".to_string()),
                Token::String("c\n".to_string())
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42 1.5"), vec![Token::Number(42.0), Token::Number(1.5)]);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(kinds("// nothing here\nlet"), vec![Token::Let]);
    }

    #[test]
    fn test_span_line_and_column() {
        let tokens = tokenize("let a = 1;\n  throw a;").unwrap();
        let (token, span) = &tokens[5];
        assert_eq!(*token, Token::Throw);
        assert_eq!((span.line, span.column), (2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("let a = #;").unwrap_err();
        assert!(err.message.contains('#'));
        assert_eq!((err.span.line, err.span.column), (1, 9));
    }

    #[test]
    fn test_position_offsets() {
        let first = Span::new(0, 1, 1, 5);
        assert_eq!(first.position(10, 3), (11, 8));
        let second = Span::new(20, 21, 2, 5);
        assert_eq!(second.position(10, 3), (12, 5));
    }
}
