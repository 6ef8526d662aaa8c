//! Restricted boolean expressions for `when` clauses, hook conditions and
//! `assert_expr`.
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | cmp
//! cmp     := operand (op operand)?
//! op      := == | != | < | <= | > | >= | contains
//! operand := 'str' | "str" | number | true | false | null | ident | ${path} | "(" or ")"
//! ```
//!
//! Identifiers and `${path}` references (dotted paths allowed) resolve against
//! the supplied variables and keep their type; unresolved ones are `null`.
//! Placeholders inside quoted strings are substituted as text. Conditions are
//! evaluated unrendered so that substituted values never become syntax.
//! Nothing is ever executed.

use crate::errors::ConditionError;
use crate::model::Vars;
use crate::render;
use serde_json::Value;
use std::cmp::Ordering;

/// Parses and evaluates `expr`, returning its truthiness.
pub fn evaluate(expr: &str, vars: &Vars) -> Result<bool, ConditionError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(ConditionError::UnexpectedToken {
            found: tok.to_string(),
            expected: "end of expression".into(),
        });
    }
    Ok(truthy(&ast.eval(vars)))
}

/// Compares two values with one of the supported operators.
///
/// Numeric comparison applies when both sides read as numbers (including
/// numeric strings); otherwise strings are compared lexicographically.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Contains => contains(left, right),
        CmpOp::Eq => loosely_equal(left, right),
        CmpOp::Ne => !loosely_equal(left, right),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let Some(ord) = order(left, right) else {
                return false;
            };
            match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

impl CmpOp {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "contains" => CmpOp::Contains,
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Contains => "contains",
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a == b;
    }
    match (left, right) {
        (Value::String(a), b) | (b, Value::String(a)) if !b.is_string() && !b.is_null() => {
            *a == render::value_to_string(b)
        }
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        _ => Some(render::value_to_string(left).cmp(&render::value_to_string(right))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(&render::value_to_string(needle)),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => map.contains_key(&render::value_to_string(needle)),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CmpOp),
    Literal(Value),
    /// Quoted text holding `${..}` placeholders.
    Template(String),
    Ident(String),
    Ref(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::Literal(v) => write!(f, "{v}"),
            Token::Template(text) => write!(f, "'{text}'"),
            Token::Ident(name) => f.write_str(name),
            Token::Ref(path) => write!(f, "${{{path}}}"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let op = match (ch, next == Some('=')) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    ('>', true) => CmpOp::Ge,
                    _ => CmpOp::Gt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let c = chars[j].1;
                    if c == '\\' && j + 1 < chars.len() {
                        text.push(chars[j + 1].1);
                        j += 2;
                        continue;
                    }
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                    j += 1;
                }
                if !closed {
                    return Err(ConditionError::UnterminatedString { offset });
                }
                tokens.push(if render::contains_placeholder(&text) {
                    Token::Template(text)
                } else {
                    Token::Literal(Value::String(text))
                });
                i = j + 1;
            }
            '$' if next == Some('{') => {
                let body = &input[offset + 2..];
                let Some(len) = body.find('}') else {
                    return Err(ConditionError::UnexpectedEnd {
                        expected: "'}'".into(),
                    });
                };
                let path = body[..len].trim();
                if path.is_empty() {
                    return Err(ConditionError::UnexpectedToken {
                        found: "${}".into(),
                        expected: "a variable name".into(),
                    });
                }
                tokens.push(Token::Ref(path.to_string()));
                let end = offset + 2 + len + 1;
                while i < chars.len() && chars[i].0 < end {
                    i += 1;
                }
            }
            c if c.is_ascii_digit()
                || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) =>
            {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].1.is_ascii_digit() || matches!(chars[j].1, '.' | 'e' | 'E'))
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(input.len(), |(o, _)| *o);
                let text = &input[offset..end];
                let value = text
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| text.parse::<f64>().map(Value::from))
                    .map_err(|_| ConditionError::UnexpectedToken {
                        found: text.to_string(),
                        expected: "a number".into(),
                    })?;
                tokens.push(Token::Literal(value));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].1.is_alphanumeric() || matches!(chars[j].1, '_' | '.' | '-'))
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(input.len(), |(o, _)| *o);
                let word = &input[offset..end];
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "contains" => Token::Op(CmpOp::Contains),
                    _ => Token::Ident(word.to_string()),
                });
                i = j;
            }
            other => return Err(ConditionError::UnexpectedChar { ch: other, offset }),
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Template(String),
    Ident(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
}

impl Expr {
    fn eval(&self, vars: &Vars) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Template(text) => Value::String(render::render_str(text, vars)),
            Expr::Ident(name) => render::resolve(vars, name).cloned().unwrap_or(Value::Null),
            Expr::Not(inner) => Value::Bool(!truthy(&inner.eval(vars))),
            Expr::And(a, b) => Value::Bool(truthy(&a.eval(vars)) && truthy(&b.eval(vars))),
            Expr::Or(a, b) => Value::Bool(truthy(&a.eval(vars)) || truthy(&b.eval(vars))),
            Expr::Cmp(a, op, b) => Value::Bool(compare(*op, &a.eval(vars), &b.eval(vars))),
        }
    }
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
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expr::Cmp(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, ConditionError> {
        let expected = "an operand";
        match self.next() {
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::Template(text)) => Ok(Expr::Template(text)),
            Some(Token::Ident(name) | Token::Ref(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(ConditionError::UnexpectedToken {
                        found: tok.to_string(),
                        expected: "')'".into(),
                    }),
                    None => Err(ConditionError::UnexpectedEnd {
                        expected: "')'".into(),
                    }),
                }
            }
            Some(tok) => Err(ConditionError::UnexpectedToken {
                found: tok.to_string(),
                expected: expected.into(),
            }),
            None => Err(ConditionError::UnexpectedEnd {
                expected: expected.into(),
            }),
        }
    }
}
