// src/capability/expr.rs

//! Capability expressions.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! expr    := and ( ('|' | '||') and )*
//! and     := unary ( ('&' | '&&') unary )*
//! unary   := '!' unary | '(' expr ')' | name [ op value ]
//! op      := '=' | '==' | '!=' | '<' | '<=' | '>' | '>='
//! ```
//!
//! Values are integers, booleans, plain words or dotted versions
//! (`3.18.1`); a value may be double-quoted.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::set::{is_name_char, CapabilityValue, Capabilities};

/// Deepest allowed nesting of `!` and parentheses.
pub const MAX_NESTING: usize = 64;
/// Longest allowed expression, in tokens.
pub const MAX_TOKENS: usize = 1024;

/// Comparison operator in `name op value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// Parsed capability expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityExpr {
    /// Bare name: present and not `false`.
    Has(String),
    Compare {
        name: String,
        op: CompareOp,
        value: String,
    },
    Not(Box<CapabilityExpr>),
    And(Box<CapabilityExpr>, Box<CapabilityExpr>),
    Or(Box<CapabilityExpr>, Box<CapabilityExpr>),
}

/// Syntax error with the byte offset where it was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at position {position}")]
pub struct CapabilityParseError {
    pub position: usize,
    pub message: String,
}

impl CapabilityParseError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl CapabilityExpr {
    pub fn parse(input: &str) -> Result<Self, CapabilityParseError> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(CapabilityParseError::new(0, "empty capability expression"));
        }
        if let Some(tok) = tokens.get(MAX_TOKENS) {
            return Err(CapabilityParseError::new(
                tok.at,
                format!("expression longer than {MAX_TOKENS} tokens"),
            ));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            end: input.len(),
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(CapabilityParseError::new(
                tok.at,
                format!("unexpected {}", tok.kind),
            ));
        }
        Ok(expr)
    }

    /// Evaluate against a capability set.
    ///
    /// A comparison against a capability the set does not define is false.
    pub fn eval(&self, caps: &Capabilities) -> bool {
        match self {
            CapabilityExpr::Has(name) => caps.get(name).is_some_and(CapabilityValue::is_truthy),
            CapabilityExpr::Compare { name, op, value } => match caps.get(name) {
                Some(actual) => compare(actual, value).is_some_and(|ord| op.holds(ord)),
                None => false,
            },
            CapabilityExpr::Not(inner) => !inner.eval(caps),
            CapabilityExpr::And(a, b) => a.eval(caps) && b.eval(caps),
            CapabilityExpr::Or(a, b) => a.eval(caps) || b.eval(caps),
        }
    }
}

impl FromStr for CapabilityExpr {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityExpr::parse(s)
    }
}

/// Order the actual capability value relative to the expression's literal.
///
/// `None` means the two are not comparable (e.g. an integer capability
/// against a word); the comparison is then false.
fn compare(actual: &CapabilityValue, literal: &str) -> Option<Ordering> {
    match actual {
        CapabilityValue::Bool(b) => match CapabilityValue::parse(literal) {
            CapabilityValue::Bool(other) => Some(b.cmp(&other)),
            CapabilityValue::Int(n) => Some(i64::from(*b).cmp(&n)),
            CapabilityValue::Str(_) => None,
        },
        CapabilityValue::Int(n) => match literal.trim().parse::<i64>() {
            Ok(other) => Some(n.cmp(&other)),
            Err(_) if is_version(literal) => Some(compare_versions(&n.to_string(), literal)),
            Err(_) => None,
        },
        CapabilityValue::Str(s) => {
            if is_version(s) && is_version(literal) {
                Some(compare_versions(s, literal))
            } else {
                Some(s.to_ascii_lowercase().cmp(&literal.to_ascii_lowercase()))
            }
        }
    }
}

fn is_version(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty()
        && s.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Compare dotted versions numerically, padding the shorter with zeros.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.trim()
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Op(CompareOp),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{w}'"),
            TokenKind::Op(op) => write!(f, "'{op}'"),
            TokenKind::Not => f.write_str("'!'"),
            TokenKind::And => f.write_str("'&'"),
            TokenKind::Or => f.write_str("'|'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    at: usize,
}

fn is_word_char(c: char) -> bool {
    is_name_char(c) || matches!(c, '.' | '-' | '+')
}

fn lex(input: &str) -> Result<Vec<Token>, CapabilityParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '&' => {
                chars.next_if(|&(_, n)| n == '&');
                TokenKind::And
            }
            '|' => {
                chars.next_if(|&(_, n)| n == '|');
                TokenKind::Or
            }
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Ne)
                } else {
                    TokenKind::Not
                }
            }
            '=' => {
                chars.next_if(|&(_, n)| n == '=');
                TokenKind::Op(CompareOp::Eq)
            }
            '<' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Le)
                } else {
                    TokenKind::Op(CompareOp::Lt)
                }
            }
            '>' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Ge)
                } else {
                    TokenKind::Op(CompareOp::Gt)
                }
            }
            '"' => {
                let mut word = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '"' {
                        closed = true;
                        break;
                    }
                    word.push(n);
                }
                if !closed {
                    return Err(CapabilityParseError::new(at, "unterminated string"));
                }
                TokenKind::Word(word)
            }
            c if is_word_char(c) => {
                let mut word = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_word_char(n)) {
                    word.push(n);
                }
                TokenKind::Word(word)
            }
            other => {
                return Err(CapabilityParseError::new(
                    at,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        tokens.push(Token { kind, at });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    /// Current `!` / parenthesis nesting.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self, at: usize) -> Result<(), CapabilityParseError> {
        if self.depth >= MAX_NESTING {
            return Err(CapabilityParseError::new(
                at,
                format!("expression nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<CapabilityExpr, CapabilityParseError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = CapabilityExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<CapabilityExpr, CapabilityParseError> {
        let mut lhs = self.unary()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.unary()?;
            lhs = CapabilityExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<CapabilityExpr, CapabilityParseError> {
        let end = self.end;
        let tok = self
            .next()
            .ok_or_else(|| CapabilityParseError::new(end, "unexpected end of expression"))?;

        match tok.kind {
            TokenKind::Not => {
                self.descend(tok.at)?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(CapabilityExpr::Not(Box::new(inner)))
            }
            TokenKind::LParen => {
                self.descend(tok.at)?;
                let inner = self.expr()?;
                self.depth -= 1;
                if !self.eat(&TokenKind::RParen) {
                    let at = self.peek().map_or(end, |t| t.at);
                    return Err(CapabilityParseError::new(at, "expected ')'"));
                }
                Ok(inner)
            }
            TokenKind::Word(name) => {
                if !name.chars().all(is_name_char) {
                    return Err(CapabilityParseError::new(
                        tok.at,
                        format!("invalid capability name '{name}'"),
                    ));
                }
                let name = name.to_ascii_lowercase();

                let op = match self.peek() {
                    Some(Token {
                        kind: TokenKind::Op(op),
                        ..
                    }) => *op,
                    _ => return Ok(CapabilityExpr::Has(name)),
                };
                self.pos += 1;

                match self.next() {
                    Some(Token {
                        kind: TokenKind::Word(value),
                        ..
                    }) => Ok(CapabilityExpr::Compare { name, op, value }),
                    Some(other) => Err(CapabilityParseError::new(
                        other.at,
                        format!("expected a value after '{op}', found {}", other.kind),
                    )),
                    None => Err(CapabilityParseError::new(
                        end,
                        format!("expected a value after '{op}'"),
                    )),
                }
            }
            other => Err(CapabilityParseError::new(
                tok.at,
                format!("unexpected {other}"),
            )),
        }
    }
}
