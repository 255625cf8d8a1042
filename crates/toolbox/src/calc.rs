//! Arithmetic expression evaluator backing the `calculate` tool.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('**' unary)?
//! primary := NUMBER | NAME | NAME '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `**` is right-associative and binds tighter than unary minus, so
//! `-2 ** 2` is `-4`. `%` takes the sign of the divisor.

use std::f64::consts;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected {0}")]
    UnexpectedToken(String),

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("{name}() takes {expected} argument(s) ({found} given)")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error")]
    Domain,

    #[error("expression nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Nesting limit for parentheses, unary signs and exponents.
pub const MAX_DEPTH: usize = 256;

/// Evaluate an expression such as `123 * 45 + 9` or `sqrt(2) * pi`.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::UnexpectedToken(token.to_string()));
    }
    finite(value)
}

/// Render a result: integral values without a fractional part.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Name(name) => write!(f, "name '{name}'"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::StarStar => f.write_str("'**'"),
            Self::Slash => f.write_str("'/'"),
            Self::Percent => f.write_str("'%'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when digits follow, so `2e` stays an error.
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
                continue;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::StarStar
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => return Err(CalcError::UnexpectedChar(other)),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), CalcError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(CalcError::UnexpectedToken(t.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value += self.term()?;
            } else if self.eat(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value *= self.unary()?;
            } else if self.eat(&Token::Slash) {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                value /= rhs;
            } else if self.eat(&Token::Percent) {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                value = floor_mod(value, rhs);
            } else {
                return Ok(value);
            }
        }
    }

    // Every level of nesting passes through here.
    fn unary(&mut self) -> Result<f64, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let value = if self.eat(&Token::Minus) {
            self.unary().map(|v| -v)
        } else if self.eat(&Token::Plus) {
            self.unary()
        } else {
            self.power()
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.unary()?;
            if base == 0.0 && exponent < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            finite(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Name(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, CalcError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                return Ok(args);
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, CalcError> {
    match name {
        "pi" => Ok(consts::PI),
        "e" => Ok(consts::E),
        "tau" => Ok(consts::TAU),
        _ => Err(CalcError::UnknownName(name.to_string())),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let value = match (name, args) {
        ("sqrt", [x]) => x.sqrt(),
        ("abs", [x]) => x.abs(),
        ("exp", [x]) => x.exp(),
        ("ln" | "log", [x]) => log(*x)?,
        ("log", [x, base]) => log(*x)? / log(*base)?,
        ("log10", [x]) => log(*x)? / consts::LN_10,
        ("log2", [x]) => log(*x)? / consts::LN_2,
        ("sin", [x]) => x.sin(),
        ("cos", [x]) => x.cos(),
        ("tan", [x]) => x.tan(),
        ("asin", [x]) => x.asin(),
        ("acos", [x]) => x.acos(),
        ("atan", [x]) => x.atan(),
        ("floor", [x]) => x.floor(),
        ("ceil", [x]) => x.ceil(),
        ("round", [x]) => x.round(),
        ("pow", [x, y]) => x.powf(*y),
        ("atan2", [y, x]) => y.atan2(*x),
        _ => {
            let expected = match name {
                "log" => "1 or 2",
                "pow" | "atan2" => "2",
                "sqrt" | "abs" | "exp" | "ln" | "log10" | "log2" | "sin" | "cos" | "tan"
                | "asin" | "acos" | "atan" | "floor" | "ceil" | "round" => "1",
                _ => return Err(CalcError::UnknownName(name.to_string())),
            };
            return Err(CalcError::Arity {
                name: name.to_string(),
                expected,
                found: args.len(),
            });
        }
    };
    finite(value)
}

fn log(x: f64) -> Result<f64, CalcError> {
    if x <= 0.0 {
        Err(CalcError::Domain)
    } else {
        Ok(x.ln())
    }
}

fn floor_mod(lhs: f64, rhs: f64) -> f64 {
    let r = lhs % rhs;
    if r != 0.0 && (r < 0.0) != (rhs < 0.0) {
        r + rhs
    } else {
        r
    }
}

fn finite(value: f64) -> Result<f64, CalcError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::Domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> f64 {
        evaluate(expr).unwrap()
    }

    fn close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("123 * 45 + 9"), 5544.0);
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("--3"), 3.0);
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("-7 % 3"), 2.0);
        assert_eq!(eval("7 % -3"), -2.0);
    }

    #[test]
    fn numbers() {
        assert_eq!(eval("1.5e3"), 1500.0);
        assert_eq!(eval(".5 + 1."), 1.5);
        assert!(matches!(evaluate("1.2.3"), Err(CalcError::InvalidNumber(_))));
    }

    #[test]
    fn constants_and_functions() {
        close(eval("pi"), consts::PI);
        close(eval("tau / 2"), consts::PI);
        close(eval("sqrt(16) + abs(-2)"), 6.0);
        close(eval("log(e)"), 1.0);
        close(eval("log(8, 2)"), 3.0);
        close(eval("log10(1000)"), 3.0);
        close(eval("log2(1024)"), 10.0);
        close(eval("sin(pi / 2)"), 1.0);
        close(eval("atan2(1, 1)"), consts::FRAC_PI_4);
        close(eval("pow(2, 10)"), 1024.0);
        close(eval("floor(2.7) + ceil(2.1) + round(2.5)"), 8.0);
    }

    #[test]
    fn errors() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("sqrt(-1)"), Err(CalcError::Domain));
        assert_eq!(evaluate("log(0)"), Err(CalcError::Domain));
        assert_eq!(evaluate("10 ** 400"), Err(CalcError::Domain));
        assert_eq!(evaluate("foo + 1"), Err(CalcError::UnknownName("foo".into())));
        assert_eq!(evaluate("foo(1)"), Err(CalcError::UnknownName("foo".into())));
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("2 $ 3"), Err(CalcError::UnexpectedChar('$')));
        assert!(matches!(evaluate("1 2"), Err(CalcError::UnexpectedToken(_))));
        assert!(matches!(
            evaluate("sqrt(1, 2)"),
            Err(CalcError::Arity { found: 2, .. })
        ));
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        close(eval(&nested), 1.0);
        close(eval(&format!("{}5", "-".repeat(100))), 5.0);

        assert_eq!(evaluate(&"(".repeat(10_000)), Err(CalcError::TooDeep));
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&deep), Err(CalcError::TooDeep));
        assert_eq!(evaluate(&"-".repeat(10_000)), Err(CalcError::TooDeep));
        assert_eq!(
            evaluate("2 ** ".repeat(1_000).trim_end_matches("** ")),
            Err(CalcError::TooDeep)
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(CalcError::DivisionByZero.to_string(), "division by zero");
        assert_eq!(
            CalcError::UnknownName("x".into()).to_string(),
            "name 'x' is not defined"
        );
    }

    #[test]
    fn formatting() {
        assert_eq!(format_number(5544.0), "5544");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }
}
