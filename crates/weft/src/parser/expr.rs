//! Fragment expression parser using winnow.
//!
//! The default fragment engine compiles embedded code with this grammar:
//! integer and string literals, list literals, `$name` references, boolean
//! and comparison operators, `+`/`-`, `.` concatenation, `die EXPR`, and
//! builtin calls. An empty source stands for the current value, which is
//! what makes `<:/>` mean "the current element rendered as-is".

use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use super::error::ParseDiagnostic;

/// A compiled fragment expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Empty source: yields the current value unchanged.
    CurrentValue,
    /// Integer literal.
    Number(i64),
    /// Double-quoted string literal.
    Str(String),
    /// List literal: `[e1, e2, ...]`.
    List(Vec<Expr>),
    /// `$name` reference.
    Var(String),
    /// Unary operator application.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary operator application.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Builtin call: `name(args...)`.
    Call { name: String, args: Vec<Expr> },
    /// `die EXPR`: raise with the rendered message.
    Die(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    // String comparisons, Perl spelling.
    StrEq,
    StrNe,
    StrLt,
    StrLe,
    StrGt,
    StrGe,
    /// `cmp`: three-way string comparison yielding -1, 0, or 1.
    StrCmp,
    // Numeric comparisons.
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    /// `<=>`: three-way numeric comparison yielding -1, 0, or 1.
    NumCmp,
    Add,
    Sub,
    /// `.`: string concatenation.
    Concat,
}

/// Parse a fragment source into an expression.
pub fn parse_expr(source: &str) -> Result<Expr, ParseDiagnostic> {
    if source.trim().is_empty() {
        return Ok(Expr::CurrentValue);
    }
    let mut remaining = source;
    match full_expr(&mut remaining) {
        Ok(expr) if remaining.is_empty() => Ok(expr),
        Ok(_) => {
            let (line, column) = calculate_position(source, remaining);
            Err(ParseDiagnostic {
                line,
                column,
                message: format!(
                    "unexpected character in fragment: '{}'",
                    remaining.chars().next().unwrap_or('?')
                ),
            })
        }
        Err(e) => {
            let (line, column) = calculate_position(source, remaining);
            Err(ParseDiagnostic {
                line,
                column,
                message: format!("fragment parse error: {e}"),
            })
        }
    }
}

/// Calculate line and column from original input and remaining input.
fn calculate_position(original: &str, remaining: &str) -> (usize, usize) {
    let consumed = original.len() - remaining.len();
    let consumed_str = &original[..consumed];
    let line = consumed_str.chars().filter(|&c| c == '\n').count() + 1;
    let column = match consumed_str.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, column)
}

/// Parse a complete expression with surrounding whitespace.
fn full_expr(input: &mut &str) -> ModalResult<Expr> {
    delimited(ws, expr, ws).parse_next(input)
}

/// Parse optional whitespace.
fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    or_expr(input)
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = and_expr(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded((ws, "||", ws), and_expr)).parse_next(input)?;
    Ok(fold_binary(first, BinaryOp::Or, rest))
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = cmp_expr(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded((ws, "&&", ws), cmp_expr)).parse_next(input)?;
    Ok(fold_binary(first, BinaryOp::And, rest))
}

fn fold_binary(first: Expr, op: BinaryOp, rest: Vec<Expr>) -> Expr {
    rest.into_iter().fold(first, |lhs, rhs| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

/// Parse an optional single comparison. Comparisons do not chain.
fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let lhs = sum_expr(input)?;
    let tail: Option<(BinaryOp, Expr)> =
        opt((delimited(ws, cmp_op, ws), sum_expr)).parse_next(input)?;
    Ok(match tail {
        Some((op, rhs)) => Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        None => lhs,
    })
}

/// Parse a comparison operator. Symbolic forms are tried longest-first;
/// word forms require a word boundary.
fn cmp_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "<=>".value(BinaryOp::NumCmp),
        "==".value(BinaryOp::NumEq),
        "!=".value(BinaryOp::NumNe),
        "<=".value(BinaryOp::NumLe),
        ">=".value(BinaryOp::NumGe),
        "<".value(BinaryOp::NumLt),
        ">".value(BinaryOp::NumGt),
        word_cmp_op,
    ))
    .parse_next(input)
}

fn word_cmp_op(input: &mut &str) -> ModalResult<BinaryOp> {
    let word = identifier(input)?;
    let op = match word {
        "eq" => BinaryOp::StrEq,
        "ne" => BinaryOp::StrNe,
        "lt" => BinaryOp::StrLt,
        "le" => BinaryOp::StrLe,
        "gt" => BinaryOp::StrGt,
        "ge" => BinaryOp::StrGe,
        "cmp" => BinaryOp::StrCmp,
        _ => {
            return Err(winnow::error::ErrMode::Backtrack(
                winnow::error::ContextError::new(),
            ));
        }
    };
    Ok(op)
}

fn sum_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = concat_expr(input)?;
    let rest: Vec<(char, Expr)> = repeat(
        0..,
        (delimited(ws, alt(('+', '-')), ws), concat_expr),
    )
    .parse_next(input)?;
    Ok(rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op: if op == '+' { BinaryOp::Add } else { BinaryOp::Sub },
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }))
}

fn concat_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = unary_expr(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded((ws, '.', ws), unary_expr)).parse_next(input)?;
    Ok(fold_binary(first, BinaryOp::Concat, rest))
}

fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    alt((
        preceded(('!', ws), unary_expr).map(|operand| Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }),
        primary,
    ))
    .parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((die_expr, number, string, list, var_ref, call, paren)).parse_next(input)
}

/// Parse `die EXPR` (also reachable as the `die(...)` builtin via `call`).
fn die_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut probe = *input;
    let word = identifier(&mut probe)?;
    if word != "die" {
        return Err(winnow::error::ErrMode::Backtrack(
            winnow::error::ContextError::new(),
        ));
    }
    // `die(...)` parses as a call so that parens group the argument.
    if probe.trim_start().starts_with('(') {
        return Err(winnow::error::ErrMode::Backtrack(
            winnow::error::ContextError::new(),
        ));
    }
    *input = probe;
    preceded(ws, expr)
        .map(|e| Expr::Die(Box::new(e)))
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<Expr> {
    let negative = opt('-').parse_next(input)?.is_some();
    let digits: &str = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let value: i64 = digits.parse().map_err(|_| {
        winnow::error::ErrMode::Backtrack(winnow::error::ContextError::new())
    })?;
    Ok(Expr::Number(if negative { -value } else { value }))
}

/// Parse a double-quoted string with `\"`, `\\`, `\n`, `\t` escapes.
fn string(input: &mut &str) -> ModalResult<Expr> {
    '"'.parse_next(input)?;
    let mut out = String::new();
    loop {
        let c = any.parse_next(input)?;
        match c {
            '"' => return Ok(Expr::Str(out)),
            '\\' => {
                let escaped = any.parse_next(input)?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
}

fn list(input: &mut &str) -> ModalResult<Expr> {
    delimited(
        ('[', ws),
        separated(0.., expr, (ws, ',', ws)),
        (ws, ']'),
    )
    .map(Expr::List)
    .parse_next(input)
}

fn var_ref(input: &mut &str) -> ModalResult<Expr> {
    preceded('$', identifier)
        .map(|name| Expr::Var(name.to_string()))
        .parse_next(input)
}

fn call(input: &mut &str) -> ModalResult<Expr> {
    let name = identifier(input)?;
    let args: Vec<Expr> = delimited(
        (ws, '(', ws),
        separated(0.., expr, (ws, ',', ws)),
        (ws, ')'),
    )
    .parse_next(input)?;
    Ok(Expr::Call {
        name: name.to_string(),
        args,
    })
}

fn paren(input: &mut &str) -> ModalResult<Expr> {
    delimited(('(', ws), expr, (ws, ')')).parse_next(input)
}

/// Parse an identifier (must not start with a digit).
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    let ident: &str =
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    if !ident.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(winnow::error::ErrMode::Backtrack(
            winnow::error::ContextError::new(),
        ));
    }
    Ok(ident)
}
