//! Arithmetic parser
//!
//! Grammar, with the usual precedence and left associativity:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := number | '(' expr ')'
//! ```

use crate::error::{FormulaError, FormulaResult};

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate to a double
    pub fn eval(&self) -> FormulaResult<f64> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Negate(inner) => Ok(-inner.eval()?),
            Expr::Binary { op, left, right } => {
                let l = left.eval()?;
                let r = right.eval()?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Subtract => Ok(l - r),
                    BinaryOp::Multiply => Ok(l * r),
                    BinaryOp::Divide => {
                        if r == 0.0 {
                            Err(FormulaError::DivisionByZero)
                        } else {
                            Ok(l / r)
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lexeme {
    Number(f64),
    Op(BinaryOp),
    Open,
    Close,
}

/// Split the input into positioned lexemes
fn lex(input: &str) -> FormulaResult<Vec<(Lexeme, usize)>> {
    let bytes = input.as_bytes();
    let mut lexemes = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let lexeme = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos += 1;
                continue;
            }
            b'+' => Lexeme::Op(BinaryOp::Add),
            b'-' => Lexeme::Op(BinaryOp::Subtract),
            b'*' => Lexeme::Op(BinaryOp::Multiply),
            b'/' => Lexeme::Op(BinaryOp::Divide),
            b'(' => Lexeme::Open,
            b')' => Lexeme::Close,
            b'0'..=b'9' | b'.' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                let text = &input[start..pos];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::parse(format!("invalid number '{}'", text), start))?;
                lexemes.push((Lexeme::Number(n), start));
                continue;
            }
            _ => {
                let found = input[pos..].chars().next().unwrap_or('?');
                return Err(FormulaError::parse(
                    format!("unexpected character '{}'", found),
                    pos,
                ));
            }
        };
        lexemes.push((lexeme, pos));
        pos += 1;
    }

    Ok(lexemes)
}

struct Parser {
    lexemes: Vec<(Lexeme, usize)>,
    index: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<Lexeme> {
        self.lexemes.get(self.index).map(|(l, _)| *l)
    }

    fn position(&self) -> usize {
        self.lexemes
            .get(self.index)
            .map(|(_, p)| *p)
            .unwrap_or(self.end)
    }

    fn expr(&mut self) -> FormulaResult<Expr> {
        let mut left = self.term()?;
        while let Some(Lexeme::Op(op @ (BinaryOp::Add | BinaryOp::Subtract))) = self.peek() {
            self.index += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut left = self.unary()?;
        while let Some(Lexeme::Op(op @ (BinaryOp::Multiply | BinaryOp::Divide))) = self.peek() {
            self.index += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        match self.peek() {
            Some(Lexeme::Op(BinaryOp::Subtract)) => {
                self.index += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Lexeme::Op(BinaryOp::Add)) => {
                self.index += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> FormulaResult<Expr> {
        let position = self.position();
        match self.peek() {
            Some(Lexeme::Number(n)) => {
                self.index += 1;
                Ok(Expr::Number(n))
            }
            Some(Lexeme::Open) => {
                self.index += 1;
                let inner = self.expr()?;
                if self.peek() != Some(Lexeme::Close) {
                    return Err(FormulaError::parse("expected ')'", self.position()));
                }
                self.index += 1;
                Ok(inner)
            }
            Some(other) => Err(FormulaError::parse(
                format!("unexpected {:?}", other),
                position,
            )),
            None => Err(FormulaError::parse("unexpected end of formula", position)),
        }
    }
}

/// Parse an arithmetic expression (tokens must already be substituted)
pub fn parse(input: &str) -> FormulaResult<Expr> {
    let lexemes = lex(input)?;
    if lexemes.is_empty() {
        return Err(FormulaError::parse("empty formula", 0));
    }

    let mut parser = Parser {
        lexemes,
        index: 0,
        end: input.len(),
    };
    let expr = parser.expr()?;
    if parser.index < parser.lexemes.len() {
        return Err(FormulaError::parse("unexpected trailing input", parser.position()));
    }
    Ok(expr)
}
