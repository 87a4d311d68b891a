// Expression parsing for unit source files

use super::Parser;
use crate::ParseError;
use unibox_ast::*;
use unibox_lexer::{Token, TokenSpan};

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_and()?;

        while self.match_token(&Token::Or) {
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }

        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_equality()?;

        while self.match_token(&Token::And) {
            let right = self.parse_equality()?;
            expr = binary(expr, BinaryOp::And, right);
        }

        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_comparison()?;

        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_additive()?;

        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_multiplicative()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let op = match self.peek() {
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expression::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_token(&Token::LParen) {
                let args = self.parse_comma_list(&Token::RParen)?;
                self.consume(&Token::RParen, "Expected ')' after arguments")?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.match_token(&Token::Dot) {
                let member = self.consume_identifier()?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    member,
                };
            } else if self.match_token(&Token::LBracket) {
                let index = self.parse_expression()?;
                self.consume(&Token::RBracket, "Expected ']' after index")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let literal = match self.tokens.get(self.current) {
            Some(TokenSpan { token, .. }) => match token {
                Token::IntLiteral(n) => Some(Literal::Int(n.clone())),
                Token::FloatLiteral(n) => Some(Literal::Float(n.clone())),
                Token::StringLiteral(s) => Some(Literal::Str(s.clone())),
                Token::True => Some(Literal::Bool(true)),
                Token::False => Some(Literal::Bool(false)),
                _ => None,
            },
            None => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(Expression::Literal(literal));
        }

        if matches!(self.peek(), Some(Token::Ident(_))) {
            return Ok(Expression::Ident(self.consume_identifier()?));
        }

        if self.match_token(&Token::LParen) {
            let inner = self.parse_expression()?;
            self.consume(&Token::RParen, "Expected ')' after expression")?;
            return Ok(Expression::Paren(Box::new(inner)));
        }

        if self.match_token(&Token::LBracket) {
            let elements = self.parse_comma_list(&Token::RBracket)?;
            self.consume(&Token::RBracket, "Expected ']' after array elements")?;
            return Ok(Expression::Array(elements));
        }

        Err(self.error("Expected expression"))
    }

    /// Comma separated expressions up to (not including) `close`, trailing comma allowed
    fn parse_comma_list(&mut self, close: &Token) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_expression()?);
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        Ok(items)
    }
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}
