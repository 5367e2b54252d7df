//! # Formula Parser
//!
//! Recursive descent over the lexer's token stream, evaluating as it goes.
//! Formula cells are tiny, so there is no intermediate tree.
//!
//! ```text
//! expression     --> additive
//! additive       --> multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative --> unary ( ("*" | "/") unary )*
//! unary          --> ("-" | "+") unary | primary
//! primary        --> NUMBER | "(" expression ")"
//! ```

use super::lexer::{Lexer, Token};
use super::EvalError;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a parser and advances to the first token.
    pub fn new(input: &'a str) -> Result<Self, EvalError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    /// Evaluates the whole input. Trailing tokens are an error.
    pub fn evaluate(&mut self) -> Result<f64, EvalError> {
        if self.current_token == Token::Eof {
            return Err(EvalError::UnexpectedEnd);
        }

        let value = self.parse_additive()?;

        match &self.current_token {
            Token::Eof => {}
            Token::RParen => return Err(EvalError::UnbalancedParentheses),
            other => {
                return Err(EvalError::UnexpectedToken {
                    found: other.describe(),
                })
            }
        }

        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite)
        }
    }

    fn advance(&mut self) -> Result<(), EvalError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn parse_additive(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            match self.current_token {
                Token::Plus => {
                    self.advance()?;
                    left += self.parse_multiplicative()?;
                }
                Token::Minus => {
                    self.advance()?;
                    left -= self.parse_multiplicative()?;
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_unary()?;

        loop {
            match self.current_token {
                Token::Star => {
                    self.advance()?;
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.advance()?;
                    let divisor = self.parse_unary()?;
                    if divisor == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    left /= divisor;
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<f64, EvalError> {
        match self.current_token {
            Token::Minus => {
                self.advance()?;
                Ok(-self.parse_unary()?)
            }
            Token::Plus => {
                self.advance()?;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<f64, EvalError> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(n)
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_additive()?;
                if self.current_token != Token::RParen {
                    return Err(EvalError::UnbalancedParentheses);
                }
                self.advance()?;
                Ok(inner)
            }
            Token::Eof => Err(EvalError::UnexpectedEnd),
            other => Err(EvalError::UnexpectedToken {
                found: other.describe(),
            }),
        }
    }
}
