// Top-level item parsing: imports, functions, globals, type aliases, structs

use super::Parser;
use crate::ParseError;
use unibox_ast::*;
use unibox_lexer::{Token, TokenSpan};

impl<'a> Parser<'a> {
    pub(crate) fn parse_import(&mut self) -> Result<Import, ParseError> {
        self.consume(&Token::Import, "Expected 'import'")?;
        let start = self.previous_span().start;

        // import "lib/strings";  or  import s "lib/strings";
        let alias = if matches!(self.peek(), Some(Token::Ident(_))) {
            Some(self.consume_identifier()?)
        } else {
            None
        };

        let path = match self.tokens.get(self.current) {
            Some(TokenSpan {
                token: Token::StringLiteral(s),
                ..
            }) => {
                let path = s.clone();
                self.advance();
                path
            }
            _ => return Err(self.error("Expected import path string")),
        };
        if path.is_empty() {
            return Err(self.error("Import path must not be empty"));
        }

        self.consume(&Token::Semicolon, "Expected ';' after import")?;
        let end = self.previous_span().end;

        Ok(Import {
            alias,
            path,
            span: start..end,
        })
    }

    pub(crate) fn parse_function(&mut self) -> Result<Function, ParseError> {
        self.consume(&Token::Fn, "Expected 'fn'")?;
        let name = self.consume_identifier()?;

        self.consume(&Token::LParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let param_name = self.consume_identifier()?;
            self.consume(&Token::Colon, "Expected ':' after parameter name")?;
            let ty = self.parse_type()?;
            params.push(Param {
                name: param_name,
                ty,
            });

            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RParen, "Expected ')' after parameters")?;

        let return_type = if self.match_token(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Function {
            name,
            params,
            return_type,
            body,
        })
    }

    /// `var x: T = e;` or `const X = e;`
    pub(crate) fn parse_global(&mut self, keyword: &Token) -> Result<Global, ParseError> {
        self.consume(keyword, "Expected 'var' or 'const'")?;
        let is_const = matches!(keyword, Token::Const);
        let name = self.consume_identifier()?;

        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let value = if self.match_token(&Token::Eq) {
            Some(self.parse_expression()?)
        } else if is_const {
            return Err(self.error("Expected '=' in const declaration"));
        } else {
            None
        };

        self.consume(&Token::Semicolon, "Expected ';' after declaration")?;

        Ok(Global { name, ty, value })
    }

    pub(crate) fn parse_type_alias(&mut self) -> Result<Item, ParseError> {
        self.consume(&Token::Type, "Expected 'type'")?;
        let name = self.consume_identifier()?;
        self.consume(&Token::Eq, "Expected '=' after type name")?;
        let target = self.parse_type()?;
        self.consume(&Token::Semicolon, "Expected ';' after type alias")?;

        Ok(Item::TypeAlias(TypeAlias { name, target }))
    }

    pub(crate) fn parse_struct(&mut self) -> Result<Item, ParseError> {
        self.consume(&Token::Struct, "Expected 'struct'")?;
        let name = self.consume_identifier()?;
        self.consume(&Token::LBrace, "Expected '{' after struct name")?;

        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field_name = self.consume_identifier()?;
            self.consume(&Token::Colon, "Expected ':' after field name")?;
            let ty = self.parse_type()?;
            fields.push(Field {
                name: field_name,
                ty,
            });

            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RBrace, "Expected '}' after struct fields")?;

        Ok(Item::Struct(Struct { name, fields }))
    }
}
