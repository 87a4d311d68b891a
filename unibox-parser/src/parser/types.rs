// Type syntax: `int`, `pkg.Type`, `[T]`

use super::Parser;
use crate::ParseError;
use unibox_ast::*;
use unibox_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        if self.match_token(&Token::LBracket) {
            let inner = self.parse_type()?;
            self.consume(&Token::RBracket, "Expected ']' after slice element type")?;
            return Ok(TypeExpr::Slice(Box::new(inner)));
        }

        if !matches!(self.peek(), Some(Token::Ident(_))) {
            return Err(self.error("Expected type"));
        }
        let first = self.consume_identifier()?;

        if self.match_token(&Token::Dot) {
            let name = self.consume_identifier()?;
            return Ok(TypeExpr::Qualified {
                qualifier: first,
                name,
            });
        }

        Ok(TypeExpr::Named(first))
    }
}
