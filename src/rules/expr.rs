//! Arithmetic expressions used in rule line templates.
//!
//! The grammar is deliberately tiny: numeric literals, `+ - * /`, unary signs,
//! parentheses and a fixed set of named amounts. Anything else is rejected
//! at parse time.
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | number | name | '(' expr ')'
//! ```

use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

use crate::tax::vat::VatSplit;

const MAX_DEPTH: usize = 32;

/// Named amounts an expression can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    AbsAmount,
    OriginalAmount,
    NetAmount,
    VatAmount,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ABS_AMOUNT" | "TOTAL" => Some(Variable::AbsAmount),
            "ORIGINAL_AMOUNT" => Some(Variable::OriginalAmount),
            "NET_AMOUNT" => Some(Variable::NetAmount),
            "VAT_AMOUNT" => Some(Variable::VatAmount),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::AbsAmount => "ABS_AMOUNT",
            Variable::OriginalAmount => "ORIGINAL_AMOUNT",
            Variable::NetAmount => "NET_AMOUNT",
            Variable::VatAmount => "VAT_AMOUNT",
        }
    }
}

/// Values bound to the named amounts while evaluating a rule
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext {
    pub abs_amount: BigDecimal,
    pub original_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub vat_amount: BigDecimal,
}

impl EvalContext {
    /// Bind the amounts for a signed transaction amount and an optional VAT rate in percent
    pub fn new(amount: &BigDecimal, vat_rate: Option<&BigDecimal>) -> Result<Self, ExprError> {
        let abs_amount = amount.abs();
        let (net_amount, vat_amount) = match vat_rate {
            Some(rate) => {
                let split = VatSplit::from_gross(abs_amount.clone(), rate)
                    .map_err(|e| ExprError::InvalidContext(e.to_string()))?;
                (split.net, split.vat)
            }
            None => (abs_amount.clone(), BigDecimal::from(0)),
        };

        Ok(Self {
            abs_amount,
            original_amount: amount.clone(),
            net_amount,
            vat_amount,
        })
    }

    fn value(&self, variable: Variable) -> &BigDecimal {
        match variable {
            Variable::AbsAmount => &self.abs_amount,
            Variable::OriginalAmount => &self.original_amount,
            Variable::NetAmount => &self.net_amount,
            Variable::VatAmount => &self.vat_amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(BigDecimal),
    Var(Variable),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse expression text. Blank text is the constant zero.
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Ok(Expr::Number(BigDecimal::from(0)));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr(0)?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    pub fn eval(&self, ctx: &EvalContext) -> Result<BigDecimal, ExprError> {
        match self {
            Expr::Number(value) => Ok(value.clone()),
            Expr::Var(variable) => Ok(ctx.value(*variable).clone()),
            Expr::Neg(inner) => Ok(-inner.eval(ctx)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(ctx)?;
                let rhs = rhs.eval(ctx)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == BigDecimal::from(0) {
                            return Err(ExprError::DivisionByZero);
                        }
                        Ok(lhs / rhs)
                    }
                }
            }
        }
    }
}

/// Parse and evaluate in one step
pub fn evaluate(text: &str, ctx: &EvalContext) -> Result<BigDecimal, ExprError> {
    Expr::parse(text)?.eval(ctx)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(BigDecimal),
    Name(Variable),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Name(v) => f.write_str(v.name()),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &text[start..end];
                let value = BigDecimal::from_str(literal)
                    .map_err(|_| ExprError::InvalidNumber(literal.to_string()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &text[start..end];
                let variable =
                    Variable::from_name(name).ok_or_else(|| ExprError::UnknownName(name.to_string()))?;
                tokens.push(Token::Name(variable));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut lhs = self.term(depth)?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut lhs = self.factor(depth)?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn factor(&mut self, depth: usize) -> Result<Expr, ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Name(variable)) => Ok(Expr::Var(variable)),
            Some(Token::Plus) => self.factor(depth + 1),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor(depth + 1)?))),
            Some(Token::LParen) => {
                let inner = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid evaluation context: {0}")]
    InvalidContext(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(amount: i64) -> EvalContext {
        EvalContext::new(&BigDecimal::from(amount), None).unwrap()
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let c = ctx(0);
        assert_eq!(evaluate("1 + 2 * 3", &c).unwrap(), BigDecimal::from(7));
        assert_eq!(evaluate("(1 + 2) * 3", &c).unwrap(), BigDecimal::from(9));
        assert_eq!(evaluate("10 - 4 - 3", &c).unwrap(), BigDecimal::from(3));
        assert_eq!(evaluate("-(2 + 3)", &c).unwrap(), BigDecimal::from(-5));
    }

    #[test]
    fn test_named_amounts() {
        let c = ctx(-125);
        assert_eq!(evaluate("ABS_AMOUNT", &c).unwrap(), BigDecimal::from(125));
        assert_eq!(evaluate("ORIGINAL_AMOUNT", &c).unwrap(), BigDecimal::from(-125));
        assert_eq!(evaluate("TOTAL / 1.25", &c).unwrap(), BigDecimal::from(100));
        assert_eq!(evaluate("VAT_AMOUNT", &c).unwrap(), BigDecimal::from(0));
    }

    #[test]
    fn test_vat_context() {
        let c = EvalContext::new(&BigDecimal::from(125), Some(&BigDecimal::from(25))).unwrap();
        assert_eq!(evaluate("NET_AMOUNT", &c).unwrap(), BigDecimal::from(100));
        assert_eq!(evaluate("VAT_AMOUNT", &c).unwrap(), BigDecimal::from(25));
    }

    #[test]
    fn test_blank_is_zero() {
        assert_eq!(evaluate("  ", &ctx(10)).unwrap(), BigDecimal::from(0));
    }

    #[test]
    fn test_rejects_anything_else() {
        let c = ctx(10);
        assert_eq!(
            evaluate("__import__('os')", &c).unwrap_err(),
            ExprError::UnknownName("__import__".to_string())
        );
        assert_eq!(evaluate("abs(-1)", &c).unwrap_err(), ExprError::UnknownName("abs".to_string()));
        assert_eq!(evaluate("2 ** 3", &c).unwrap_err(), ExprError::UnexpectedToken("*".to_string()));
        assert_eq!(evaluate("1;", &c).unwrap_err(), ExprError::UnexpectedChar(';'));
        assert_eq!(evaluate("(1 + 2", &c).unwrap_err(), ExprError::UnexpectedEnd);
        assert_eq!(evaluate("1.2.3", &c).unwrap_err(), ExprError::InvalidNumber("1.2.3".to_string()));
        assert_eq!(evaluate("1 2", &c).unwrap_err(), ExprError::UnexpectedToken("2".to_string()));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("ABS_AMOUNT / (1 - 1)", &ctx(5)).unwrap_err(), ExprError::DivisionByZero);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&deep, &ctx(1)).unwrap_err(), ExprError::TooDeep);
        let fine = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&fine, &ctx(1)).unwrap(), BigDecimal::from(1));
    }
}
