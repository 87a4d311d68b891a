// Modular parser for unit source files
// This module organizes the parser into logical components

use crate::{ParseError, SourceLocation};
use unibox_ast::*;
use unibox_lexer::{Lexer, Token, TokenSpan};

// Sub-modules for different parsing responsibilities
mod expressions;
mod items;
mod statements;
mod types;

pub struct Parser<'a> {
    pub(crate) tokens: Vec<TokenSpan>,
    pub(crate) current: usize,
    pub(crate) source: &'a str,
    pub(crate) file: String,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        Self::with_file("<input>", source)
    }

    pub fn with_file(file: &str, source: &'a str) -> Result<Self, ParseError> {
        let lexer = Lexer::new(source);
        let tokens: Result<Vec<_>, _> = lexer.collect();
        let tokens = tokens.map_err(|e| ParseError::LexerError {
            location: SourceLocation::from_span(file, source, e.span()),
        })?;

        Ok(Self {
            tokens,
            current: 0,
            source,
            file: file.to_string(),
        })
    }

    pub fn parse(&mut self) -> Result<SourceFile, ParseError> {
        let mut imports = Vec::new();
        let mut items = Vec::new();

        while self.check(&Token::Import) {
            imports.push(self.parse_import()?);
        }

        while !self.is_at_end() {
            if self.check(&Token::Fn) {
                items.push(Item::Function(self.parse_function()?));
            } else if self.check(&Token::Var) {
                items.push(Item::Var(self.parse_global(&Token::Var)?));
            } else if self.check(&Token::Const) {
                items.push(Item::Const(self.parse_global(&Token::Const)?));
            } else if self.check(&Token::Type) {
                items.push(self.parse_type_alias()?);
            } else if self.check(&Token::Struct) {
                items.push(self.parse_struct()?);
            } else if self.check(&Token::Import) {
                return Err(self.error("Imports must come before all declarations"));
            } else {
                return Err(self.error("Expected top-level item (fn, var, const, type, struct)"));
            }
        }
        Ok(SourceFile { imports, items })
    }

    // ==================== Helper Methods ====================

    pub(crate) fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &Token) -> bool {
        match self.peek() {
            Some(token) => std::mem::discriminant(token) == std::mem::discriminant(kind),
            None => false,
        }
    }

    pub(crate) fn advance(&mut self) -> Option<&TokenSpan> {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|t| &t.token)
    }

    pub(crate) fn previous(&self) -> Option<&TokenSpan> {
        self.current.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    /// Span of the last consumed token
    pub(crate) fn previous_span(&self) -> std::ops::Range<usize> {
        self.previous().map_or(0..0, |t| t.span.clone())
    }

    pub(crate) fn consume(&mut self, kind: &Token, message: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    pub(crate) fn consume_identifier(&mut self) -> Result<Ident, ParseError> {
        match self.tokens.get(self.current) {
            Some(TokenSpan {
                token: Token::Ident(name),
                span,
            }) => {
                let ident = Ident::new(name.clone(), span.clone());
                self.current += 1;
                Ok(ident)
            }
            _ => Err(self.error("Expected identifier")),
        }
    }

    pub(crate) fn error(&self, message: &str) -> ParseError {
        let (span, found) = match self.tokens.get(self.current) {
            Some(tok) => (tok.span.clone(), tok.token.describe()),
            None => (self.source.len()..self.source.len(), "end of file".to_string()),
        };

        ParseError::SyntaxError {
            location: SourceLocation::from_span(&self.file, self.source, span),
            message: format!("{}, found {}", message, found),
        }
    }

    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.consume(&Token::LBrace, "Expected '{'")?;
        let mut statements = Vec::new();

        while !self.check(&Token::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        self.consume(&Token::RBrace, "Expected '}'")?;

        Ok(Block { statements })
    }
}
