//! Recursive-descent parser: `expr := term (('+'|'-') term)*`,
//! `term := factor (('*'|'/') factor)*`, `factor := ('+'|'-') factor | primary`,
//! `primary := NUMBER | IDENT | '(' expr ')'`.

use super::ast::{BinOp, Expr, UnOp};
use super::lexer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError(pub String);

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input).map_err(|e| ParseError(e.0))?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect(&Token::End)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
                },
                Token::Minus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                },
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_factor()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                },
                Token::Slash => {
                    self.advance();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs));
                },
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Minus => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(inner)))
            },
            Token::Plus => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(Expr::Unary(UnOp::Pos, Box::new(inner)))
            },
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            },
            other => Err(ParseError(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_arithmetic() {
        let e = parse("a + b * 2").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Var("a".to_string())),
                Box::new(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Var("b".to_string())),
                    Box::new(Expr::Num(2.0))
                ))
            )
        );
    }

    #[test]
    fn parses_parentheses_and_unary_minus() {
        let e = parse("-(a - b) / 2").unwrap();
        assert!(matches!(e, Expr::Binary(BinOp::Div, _, _)));
    }

    #[test]
    fn rejects_function_calls() {
        assert!(parse("abs(a)").is_err());
    }

    #[test]
    fn rejects_comparisons() {
        assert!(parse("a > b").is_err());
    }
}
