//! Parser for reference engine module source
//!
//! Grammar:
//! ```text
//! module     := stmt*
//! stmt       := import | export | let | throw | await
//! import     := "import" STRING attributes? ";"
//!             | "import" "{" specifier ("," specifier)* ","? "}" "from" STRING attributes? ";"
//! specifier  := IDENT ("as" IDENT)?
//! attributes := "with" "{" (key ":" STRING ("," key ":" STRING)* ","?)? "}"
//! export     := "export" let
//! let        := "let" IDENT "=" expr ";"
//! throw      := "throw" expr ";"
//! await      := "await" expr ";"
//! expr       := "await" expr | NUMBER | STRING | "true" | "false" | "undefined" | IDENT
//! ```

use rustc_hash::FxHashSet;

use crate::module::ModuleRequest;

use super::lexer::{tokenize, Span, SyntaxError, Token};
use super::unit::{CompiledUnit, Expr, ImportBinding, Stmt};
use super::value::Value;

/// Compile module source into a [`CompiledUnit`].
pub fn parse(source: &str) -> Result<CompiledUnit, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_module()
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    unit: CompiledUnit,
    declared: FxHashSet<String>,
}

impl Parser {
    fn new(tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            unit: CompiledUnit::default(),
            declared: FxHashSet::default(),
        }
    }

    fn parse_module(mut self) -> Result<CompiledUnit, SyntaxError> {
        while self.peek().is_some() {
            self.parse_statement()?;
        }
        Ok(self.unit)
    }

    fn parse_statement(&mut self) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(Token::Import) => self.parse_import(),
            Some(Token::Export) => {
                self.advance();
                self.parse_let(true)
            }
            Some(Token::Let) => self.parse_let(false),
            Some(Token::Throw) => {
                self.advance();
                let value = self.parse_expr()?;
                self.expect(&Token::Semicolon)?;
                self.unit.body.push(Stmt::Throw(value));
                Ok(())
            }
            Some(Token::Await) => {
                let expr = self.parse_expr()?;
                self.expect(&Token::Semicolon)?;
                self.unit.body.push(Stmt::Expr(expr));
                Ok(())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_import(&mut self) -> Result<(), SyntaxError> {
        self.expect(&Token::Import)?;

        let mut bindings = Vec::new();
        if self.peek() == Some(&Token::LBrace) {
            self.advance();
            loop {
                if self.peek() == Some(&Token::RBrace) {
                    break;
                }
                let (imported, _) = self.expect_identifier()?;
                let local = if self.peek() == Some(&Token::As) {
                    self.advance();
                    self.expect_identifier()?
                } else {
                    (imported.clone(), self.previous_span())
                };
                bindings.push((imported, local));
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(&Token::RBrace)?;
            self.expect(&Token::From)?;
        }

        let specifier = self.expect_string()?;
        let attributes = if self.peek() == Some(&Token::With) {
            self.parse_attributes()?
        } else {
            Vec::new()
        };
        self.expect(&Token::Semicolon)?;

        self.unit.add_request(ModuleRequest {
            specifier: specifier.clone(),
            attributes,
        });
        for (imported, (local, span)) in bindings {
            self.declare(&local, span)?;
            self.unit.imports.push(ImportBinding {
                local,
                imported,
                specifier: specifier.clone(),
            });
        }
        Ok(())
    }

    fn parse_attributes(&mut self) -> Result<Vec<(String, String)>, SyntaxError> {
        self.expect(&Token::With)?;
        self.expect(&Token::LBrace)?;
        let mut attributes: Vec<(String, String)> = Vec::new();
        loop {
            let key = match self.peek() {
                Some(Token::RBrace) => break,
                Some(Token::Identifier(_)) => self.expect_identifier()?.0,
                Some(Token::String(_)) => self.expect_string()?,
                _ => return Err(self.unexpected()),
            };
            if attributes.iter().any(|(existing, _)| *existing == key) {
                return Err(SyntaxError::new(
                    format!("Import attribute has duplicate key '{}'", key),
                    self.previous_span(),
                ));
            }
            self.expect(&Token::Colon)?;
            let value = self.expect_string()?;
            attributes.push((key, value));
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(attributes)
    }

    fn parse_let(&mut self, export: bool) -> Result<(), SyntaxError> {
        self.expect(&Token::Let)?;
        let (name, span) = self.expect_identifier()?;
        self.declare(&name, span)?;
        if export {
            if self.unit.exports_name(&name) {
                return Err(SyntaxError::new(
                    format!("Duplicate export of '{}'", name),
                    span,
                ));
            }
            self.unit.exports.push(name.clone());
        }
        self.expect(&Token::Eq)?;
        let init = self.parse_expr()?;
        self.expect(&Token::Semicolon)?;
        self.unit.locals.push(name.clone());
        self.unit.body.push(Stmt::Let { name, init });
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        let expr = match self.peek() {
            Some(Token::Await) => {
                self.advance();
                self.unit.has_top_level_await = true;
                return Ok(Expr::Await(Box::new(self.parse_expr()?)));
            }
            Some(Token::Number(n)) => Expr::Literal(Value::Number(*n)),
            Some(Token::String(s)) => Expr::Literal(Value::String(s.clone())),
            Some(Token::True) => Expr::Literal(Value::Bool(true)),
            Some(Token::False) => Expr::Literal(Value::Bool(false)),
            Some(Token::Undefined) => Expr::Literal(Value::Undefined),
            Some(Token::Identifier(name)) => Expr::Identifier(name.clone()),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    fn declare(&mut self, name: &str, span: Span) -> Result<(), SyntaxError> {
        if !self.declared.insert(name.to_string()) {
            return Err(SyntaxError::new(
                format!("Identifier '{}' has already been declared", name),
                span,
            ));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            None => self.end_span(),
        }
    }

    fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some((_, span)) => *span,
            None => self.current_span(),
        }
    }

    fn end_span(&self) -> Span {
        match self.tokens.last() {
            Some((_, span)) => Span::new(span.end, span.end, span.line, span.column + 1),
            None => Span::new(0, 0, 1, 1),
        }
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(token) => SyntaxError::new(
                format!("Unexpected token '{}'", token),
                self.current_span(),
            ),
            None => SyntaxError::new("Unexpected end of input", self.end_span()),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SyntaxError> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            let mut err = self.unexpected();
            err.message = format!("{}, expected '{}'", err.message, expected);
            Err(err)
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Span), SyntaxError> {
        match self.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                let span = self.current_span();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_string(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(Token::String(value)) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected()),
        }
    }
}
