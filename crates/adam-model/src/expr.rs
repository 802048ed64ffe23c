//! Row predicate language used by filters, conditions and cut rules.
//!
//! ```text
//! expr     := or
//! or       := and (("or" | "|" | "||") and)*
//! and      := unary (("and" | "&" | "&&") unary)*
//! unary    := "not" unary | "(" expr ")" | predicate
//! predicate:= operand op operand
//!           | operand "is" ["not"] "null"
//!           | operand ["not"] "in" "[" literal ("," literal)* "]"
//! ```
//!
//! A bare word on the left of a comparison is a target column; on the right
//! it is a string literal unless the left side is itself a literal.
//! Domain-qualified words (`DM.SEX`) are always column references.
//!
//! Cut predicates ([`Expr::parse_cut`]) may leave the left operand out
//! (`<18`, `>=18 and <65`), consist of a bare value (`M`, meaning equality),
//! or use interval notation (`[18,65)`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::column_ref::ColumnRef;
use crate::value::Literal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at position {position} in '{text}'")]
    UnexpectedChar {
        ch: char,
        position: usize,
        text: String,
    },
    #[error("unterminated string literal starting at position {position} in '{text}'")]
    UnterminatedString { position: usize, text: String },
    #[error("unexpected {found} at position {position} in '{text}'")]
    UnexpectedToken {
        found: String,
        position: usize,
        text: String,
    },
    #[error("unexpected end of expression '{text}'")]
    UnexpectedEnd { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Literal),
    /// The value being categorized, implicit in cut predicates.
    Subject,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(column) => write!(f, "{column}"),
            Operand::Literal(literal) => write!(f, "{literal}"),
            Operand::Subject => f.write_str("_"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    InList {
        operand: Operand,
        values: Vec<Literal>,
        negated: bool,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn parse(text: &str) -> Result<Expr, ExprError> {
        Parser::new(text, false)?.parse_all()
    }

    /// Parses a cut predicate, where the categorized value is implicit.
    pub fn parse_cut(text: &str) -> Result<Expr, ExprError> {
        if let Some(interval) = parse_interval(text) {
            return Ok(interval);
        }
        Parser::new(text, true)?.parse_all()
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// Every column referenced by the expression, in order of appearance.
    pub fn references(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        fn push<'a>(operand: &'a Operand, out: &mut Vec<&'a ColumnRef>) {
            if let Operand::Column(column) = operand {
                out.push(column);
            }
        }
        match self {
            Expr::Compare { left, right, .. } => {
                push(left, out);
                push(right, out);
            }
            Expr::IsNull { operand, .. } | Expr::InList { operand, .. } => push(operand, out),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_references(out);
                b.collect_references(out);
            }
            Expr::Not(inner) => inner.collect_references(out),
        }
    }

    /// True when the expression mentions the implicit cut subject.
    pub fn uses_subject(&self) -> bool {
        let is_subject = |operand: &Operand| matches!(operand, Operand::Subject);
        match self {
            Expr::Compare { left, right, .. } => is_subject(left) || is_subject(right),
            Expr::IsNull { operand, .. } | Expr::InList { operand, .. } => is_subject(operand),
            Expr::And(a, b) | Expr::Or(a, b) => a.uses_subject() || b.uses_subject(),
            Expr::Not(inner) => inner.uses_subject(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::IsNull { operand, negated } => {
                write!(f, "{operand} is {}null", if *negated { "not " } else { "" })
            }
            Expr::InList {
                operand,
                values,
                negated,
            } => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{operand} {}in [{}]",
                    if *negated { "not " } else { "" },
                    items.join(", ")
                )
            }
            Expr::And(a, b) => write!(f, "({a} and {b})"),
            Expr::Or(a, b) => write!(f, "({a} or {b})"),
            Expr::Not(inner) => write!(f, "not ({inner})"),
        }
    }
}

/// `[18,65)` style intervals; either bound may be left empty.
fn parse_interval(text: &str) -> Option<Expr> {
    let text = text.trim();
    let lower_inclusive = match text.chars().next()? {
        '[' => true,
        '(' => false,
        _ => return None,
    };
    let upper_inclusive = match text.chars().last()? {
        ']' => true,
        ')' => false,
        _ => return None,
    };
    let inner = text.get(1..text.len() - 1)?;
    let (low, high) = inner.split_once(',')?;
    let bound = |raw: &str| -> Option<Option<f64>> {
        let raw = raw.trim();
        if raw.is_empty() {
            Some(None)
        } else {
            raw.parse::<f64>().ok().map(Some)
        }
    };
    let low = bound(low)?;
    let high = bound(high)?;
    let compare = |op: CompareOp, value: f64| Expr::Compare {
        left: Operand::Subject,
        op,
        right: Operand::Literal(number_literal(value)),
    };
    let lower = low.map(|v| compare(if lower_inclusive { CompareOp::Ge } else { CompareOp::Gt }, v));
    let upper = high.map(|v| compare(if upper_inclusive { CompareOp::Le } else { CompareOp::Lt }, v));
    match (lower, upper) {
        (Some(lower), Some(upper)) => Some(lower.and(upper)),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn number_literal(value: f64) -> Literal {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Literal::Int(value as i64)
    } else {
        Literal::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Value(Literal),
    Op(CompareOp),
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(word) => format!("'{word}'"),
            Token::Value(literal) => format!("literal {literal}"),
            Token::Op(op) => format!("operator '{}'", op.symbol()),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::Is => "'is'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::In => "'in'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '&' | '|' => {
                i += 1;
                if chars.get(i) == Some(&c) {
                    i += 1;
                }
                if c == '&' { Token::And } else { Token::Or }
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('=', _) => (CompareOp::Eq, 1),
                    ('!', Some('=')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('<', Some('>')) => (CompareOp::Ne, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(ExprError::UnexpectedChar {
                            ch: c,
                            position: start,
                            text: text.to_string(),
                        });
                    }
                };
                i += width;
                Token::Op(op)
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExprError::UnterminatedString {
                                position: start,
                                text: text.to_string(),
                            });
                        }
                        Some('\\') if chars.get(i + 1) == Some(&quote) => {
                            value.push(quote);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                Token::Value(Literal::Str(value))
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                if let Ok(int) = raw.parse::<i64>() {
                    Token::Value(Literal::Int(int))
                } else if let Ok(float) = raw.parse::<f64>() {
                    Token::Value(Literal::Float(float))
                } else {
                    return Err(ExprError::UnexpectedToken {
                        found: format!("number '{raw}'"),
                        position: start,
                        text: text.to_string(),
                    });
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "is" => Token::Is,
                    "null" | "none" => Token::Null,
                    "in" => Token::In,
                    "true" => Token::Value(Literal::Bool(true)),
                    "false" => Token::Value(Literal::Bool(false)),
                    _ => Token::Word(word),
                }
            }
            other => {
                return Err(ExprError::UnexpectedChar {
                    ch: other,
                    position: start,
                    text: text.to_string(),
                });
            }
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    cut_mode: bool,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, cut_mode: bool) -> Result<Self, ExprError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        Ok(Self {
            text,
            tokens,
            pos: 0,
            cut_mode,
        })
    }

    fn parse_all(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_or()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some((position, token)) => Err(self.unexpected(*position, token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn next(&mut self) -> Result<(usize, Token), ExprError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ExprError::UnexpectedEnd {
                text: self.text.to_string(),
            })?;
        self.pos += 1;
        Ok(item)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        let (position, token) = self.next()?;
        if &token == expected {
            Ok(())
        } else {
            Err(self.unexpected(position, &token))
        }
    }

    fn unexpected(&self, position: usize, token: &Token) -> ExprError {
        ExprError::UnexpectedToken {
            found: token.describe(),
            position,
            text: self.text.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            expr = expr.or(right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            expr = expr.and(right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, ExprError> {
        let left = match self.peek() {
            Some(Token::Op(_) | Token::Is | Token::In) if self.cut_mode => Operand::Subject,
            _ => self.parse_left_operand()?,
        };

        match self.peek().cloned() {
            Some(Token::Op(op)) => {
                self.pos += 1;
                let right = self.parse_right_operand(&left)?;
                Ok(Expr::Compare { left, op, right })
            }
            Some(Token::Is) => {
                self.pos += 1;
                let negated = self.eat(&Token::Not);
                self.expect(&Token::Null)?;
                Ok(Expr::IsNull {
                    operand: left,
                    negated,
                })
            }
            Some(Token::In) => {
                self.pos += 1;
                let values = self.parse_list()?;
                Ok(Expr::InList {
                    operand: left,
                    values,
                    negated: false,
                })
            }
            Some(Token::Not) if self.tokens.get(self.pos + 1).map(|(_, t)| t) == Some(&Token::In) => {
                self.pos += 2;
                let values = self.parse_list()?;
                Ok(Expr::InList {
                    operand: left,
                    values,
                    negated: true,
                })
            }
            // A bare value in a cut rule means equality with the subject.
            _ if self.cut_mode => match left {
                Operand::Literal(_) => Ok(Expr::Compare {
                    left: Operand::Subject,
                    op: CompareOp::Eq,
                    right: left,
                }),
                _ => self.fail_here(),
            },
            _ => self.fail_here(),
        }
    }

    fn fail_here<T>(&self) -> Result<T, ExprError> {
        match self.tokens.get(self.pos) {
            Some((position, token)) => Err(self.unexpected(*position, token)),
            None => Err(ExprError::UnexpectedEnd {
                text: self.text.to_string(),
            }),
        }
    }

    fn parse_left_operand(&mut self) -> Result<Operand, ExprError> {
        let (position, token) = self.next()?;
        match token {
            Token::Value(literal) => Ok(Operand::Literal(literal)),
            Token::Word(word) if self.cut_mode && !word.contains('.') => {
                Ok(Operand::Literal(Literal::Str(word)))
            }
            Token::Word(word) => self.column(position, &word),
            other => Err(self.unexpected(position, &other)),
        }
    }

    fn parse_right_operand(&mut self, left: &Operand) -> Result<Operand, ExprError> {
        let (position, token) = self.next()?;
        match token {
            Token::Value(literal) => Ok(Operand::Literal(literal)),
            Token::Null => Ok(Operand::Literal(Literal::Null)),
            Token::Word(word) if word.contains('.') => self.column(position, &word),
            Token::Word(word) if matches!(left, Operand::Literal(_)) && !self.cut_mode => {
                self.column(position, &word)
            }
            Token::Word(word) => Ok(Operand::Literal(Literal::Str(word))),
            other => Err(self.unexpected(position, &other)),
        }
    }

    fn column(&self, position: usize, word: &str) -> Result<Operand, ExprError> {
        ColumnRef::parse(word)
            .map(Operand::Column)
            .map_err(|_| ExprError::UnexpectedToken {
                found: format!("'{word}'"),
                position,
                text: self.text.to_string(),
            })
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, ExprError> {
        let close = if self.eat(&Token::LBracket) {
            Token::RBracket
        } else {
            self.expect(&Token::LParen)?;
            Token::RParen
        };
        let mut values = Vec::new();
        loop {
            let (position, token) = self.next()?;
            match token {
                Token::Value(literal) => values.push(literal),
                Token::Word(word) => values.push(Literal::Str(word)),
                Token::Null => values.push(Literal::Null),
                ref t if *t == close && values.is_empty() => break,
                other => return Err(self.unexpected(position, &other)),
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&close)?;
            break;
        }
        Ok(values)
    }
}

/// A parsed filter or condition that keeps its source text for
/// serialization and messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    text: String,
    expr: Expr,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        Ok(Self {
            text: text.trim().to_string(),
            expr: Expr::parse(text)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn references(&self) -> Vec<&ColumnRef> {
        self.expr.references()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for Expression {
    type Error = ExprError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Expression> for String {
    fn from(value: Expression) -> Self {
        value.text
    }
}

/// A parsed cut predicate, keeping its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CutPredicate {
    text: String,
    expr: Expr,
}

impl CutPredicate {
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        Ok(Self {
            text: text.trim().to_string(),
            expr: Expr::parse_cut(text)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(domain: &str, column: &str) -> Operand {
        Operand::Column(ColumnRef::new(domain, column))
    }

    #[test]
    fn parses_comparison_with_string_literal() {
        let expr = Expr::parse("VS.VSTESTCD == 'HEIGHT'").expect("parse");
        assert_eq!(
            expr,
            Expr::Compare {
                left: col("VS", "VSTESTCD"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::from("HEIGHT")),
            }
        );
    }

    #[test]
    fn unquoted_right_hand_word_is_literal() {
        let expr = Expr::parse("VS.VSTESTCD = WEIGHT").expect("parse");
        assert_eq!(
            expr,
            Expr::Compare {
                left: col("VS", "VSTESTCD"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::from("WEIGHT")),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = Expr::parse("A == 1 or B == 2 and C == 3").expect("parse");
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn parses_null_checks_and_lists() {
        let expr = Expr::parse("EX.EXSTDTC is not null & EX.EXTRT not in ['PLACEBO', 'SCREEN']")
            .expect("parse");
        let Expr::And(left, right) = expr else {
            panic!("expected and");
        };
        assert_eq!(
            *left,
            Expr::IsNull {
                operand: col("EX", "EXSTDTC"),
                negated: true
            }
        );
        assert_eq!(
            *right,
            Expr::InList {
                operand: col("EX", "EXTRT"),
                values: vec![Literal::from("PLACEBO"), Literal::from("SCREEN")],
                negated: true,
            }
        );
    }

    #[test]
    fn references_in_order() {
        let expr = Expr::parse("not (DM.AGE >= 18 and ADSL.SAFFL == 'Y')").expect("parse");
        let refs: Vec<String> = expr.references().iter().map(ToString::to_string).collect();
        assert_eq!(refs, vec!["DM.AGE", "ADSL.SAFFL"]);
    }

    #[test]
    fn cut_with_implicit_subject() {
        let expr = Expr::parse_cut(">=18 and <65").expect("parse");
        assert_eq!(
            expr,
            Expr::Compare {
                left: Operand::Subject,
                op: CompareOp::Ge,
                right: Operand::Literal(Literal::Int(18)),
            }
            .and(Expr::Compare {
                left: Operand::Subject,
                op: CompareOp::Lt,
                right: Operand::Literal(Literal::Int(65)),
            })
        );
    }

    #[test]
    fn cut_bare_value_means_equality() {
        let expr = Expr::parse_cut("M").expect("parse");
        assert_eq!(
            expr,
            Expr::Compare {
                left: Operand::Subject,
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::from("M")),
            }
        );
    }

    #[test]
    fn cut_interval_notation() {
        let expr = Expr::parse_cut("[18,65)").expect("parse");
        assert_eq!(expr.to_string(), "(_ >= 18 and _ < 65)");
        let open = Expr::parse_cut("(65,]").expect("parse");
        assert_eq!(open.to_string(), "_ > 65");
    }

    #[test]
    fn reports_position_of_bad_token() {
        let err = Expr::parse("DM.AGE >= )").expect_err("should fail");
        assert_eq!(
            err,
            ExprError::UnexpectedToken {
                found: "')'".to_string(),
                position: 10,
                text: "DM.AGE >= )".to_string(),
            }
        );
        assert_eq!(Expr::parse("   "), Err(ExprError::Empty));
        assert!(matches!(
            Expr::parse("DM.SEX == 'M"),
            Err(ExprError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn expression_serde_keeps_text() {
        let expression: Expression =
            serde_json::from_str("\"DM.AGE > 18\"").expect("deserialize expression");
        assert_eq!(expression.text(), "DM.AGE > 18");
        assert_eq!(
            serde_json::to_string(&expression).expect("serialize"),
            "\"DM.AGE > 18\""
        );
    }
}
