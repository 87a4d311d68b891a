// Statement parsing for unit source files

use super::Parser;
use crate::ParseError;
use unibox_ast::*;
use unibox_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        // Let statement: let x: T = expr;
        if self.match_token(&Token::Let) {
            let name = self.consume_identifier()?;

            let ty = if self.match_token(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };

            self.consume(&Token::Eq, "Expected '=' in let statement")?;
            let value = self.parse_expression()?;
            self.consume(&Token::Semicolon, "Expected ';' after let statement")?;

            return Ok(Statement::Let { name, ty, value });
        }

        // Return statement
        if self.match_token(&Token::Return) {
            let expr = if !self.check(&Token::Semicolon) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.consume(&Token::Semicolon, "Expected ';' after return")?;
            return Ok(Statement::Return(expr));
        }

        if self.check(&Token::If) {
            return Ok(Statement::If(self.parse_if()?));
        }

        if self.match_token(&Token::While) {
            let condition = self.parse_expression()?;
            let body = self.parse_block()?;
            return Ok(Statement::While { condition, body });
        }

        if self.check(&Token::LBrace) {
            return Ok(Statement::Block(self.parse_block()?));
        }

        // Expression statement or assignment
        let expr = self.parse_expression()?;
        if self.match_token(&Token::Eq) {
            if !matches!(
                expr,
                Expression::Ident(_) | Expression::Member { .. } | Expression::Index { .. }
            ) {
                return Err(self.error("Invalid assignment target"));
            }
            let value = self.parse_expression()?;
            self.consume(&Token::Semicolon, "Expected ';' after assignment")?;
            return Ok(Statement::Assign {
                target: expr,
                value,
            });
        }

        self.consume(&Token::Semicolon, "Expected ';' after expression")?;
        Ok(Statement::Expression(expr))
    }

    fn parse_if(&mut self) -> Result<IfStatement, ParseError> {
        self.consume(&Token::If, "Expected 'if'")?;
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;

        let else_branch = if self.match_token(&Token::Else) {
            if self.check(&Token::If) {
                Some(ElseBranch::If(Box::new(self.parse_if()?)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            None
        };

        Ok(IfStatement {
            condition,
            then_block,
            else_branch,
        })
    }
}
