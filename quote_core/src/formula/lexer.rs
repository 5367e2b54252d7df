//! # Formula Lexer
//!
//! Scans a substituted, normalised formula and produces tokens. Only the
//! arithmetic alphabet is accepted: digits, `.`, `+ - * /`, parentheses and
//! whitespace. Anything else is an [`EvalError::InvalidCharacter`], which is
//! what keeps formula cells from ever being more than arithmetic.

use std::iter::Peekable;
use std::str::Chars;

use super::EvalError;

/// Lexical tokens of the arithmetic grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Eof,
}

impl Token {
    /// Short text used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Eof => "end of formula".to_string(),
        }
    }
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Result<Token, EvalError> {
        self.skip_whitespace();

        match self.input.next() {
            Some('+') => Ok(Token::Plus),
            Some('-') => Ok(Token::Minus),
            Some('*') => Ok(Token::Star),
            Some('/') => Ok(Token::Slash),
            Some('(') => Ok(Token::LParen),
            Some(')') => Ok(Token::RParen),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.read_number(ch),
            Some(ch) => Err(EvalError::InvalidCharacter { ch }),
            None => Ok(Token::Eof),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    fn read_number(&mut self, first_char: char) -> Result<Token, EvalError> {
        let mut literal = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                literal.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvalError::InvalidNumber { literal })
    }
}
