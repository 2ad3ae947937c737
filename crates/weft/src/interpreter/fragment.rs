//! Fragment execution: the engine seam and the default expression engine.
//!
//! The core does not assume an embedded interpreter. It declares
//! [`FragmentEngine`] as the injection point for "execute this string as
//! code with these three contextual bindings" and ships [`ExprEngine`], a
//! small expression language, as the default. Hosts with a scripting engine
//! implement [`FragmentEngine`] and pass it to the processor builder.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::interpreter::error::FragmentError;
use crate::parser::{BinaryOp, Expr, UnaryOp, parse_expr};
use crate::types::{Params, Scratch, Value};

/// The three contextual inputs every fragment invocation receives: the
/// current value, the per-evaluation private scratchpad, and the current
/// parameter map.
pub struct FragmentCtx<'a> {
    /// The current value of the enclosing frame.
    pub value: &'a Value,
    /// Whether a per-element value is live. When it is, `$v` resolves to
    /// `value` instead of the parameter map.
    pub element: bool,
    /// Private data, shared across all scopes of one evaluation.
    pub scratch: &'a mut Scratch,
    /// The parameter map of the enclosing scope.
    pub params: &'a Params,
}

/// A compiled, callable code fragment.
pub trait Fragment: Send + Sync {
    /// Invoke the fragment. The returned value may be any shape; a raise is
    /// dispatched through the processor's error policy at the call site.
    fn call(&self, ctx: &mut FragmentCtx<'_>) -> Result<Value, FragmentError>;
}

/// Compiles fragment source text into callables.
///
/// Compilation is deferred until first use; results are memoized in the
/// shared cache under `(hash(source), namespace)` unless the processor
/// bypasses the cache.
pub trait FragmentEngine: Send + Sync {
    fn compile(&self, source: &str, namespace: &str) -> Result<Arc<dyn Fragment>, FragmentError>;
}

/// The default fragment engine: the expression mini-language.
///
/// The namespace identifier participates in the cache key but does not
/// change compilation; expressions have no namespace-level state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEngine;

impl FragmentEngine for ExprEngine {
    fn compile(&self, source: &str, _namespace: &str) -> Result<Arc<dyn Fragment>, FragmentError> {
        let expr = parse_expr(source).map_err(|e| FragmentError::Compile {
            message: e.to_string(),
        })?;
        Ok(Arc::new(ExprFragment { expr }))
    }
}

struct ExprFragment {
    expr: Expr,
}

impl Fragment for ExprFragment {
    fn call(&self, ctx: &mut FragmentCtx<'_>) -> Result<Value, FragmentError> {
        eval_expr(&self.expr, ctx)
    }
}

/// Perl-style booleans: `"1"` for true, `""` for false.
fn bool_value(b: bool) -> Value {
    Value::Scalar(if b { "1" } else { "" }.to_string())
}

/// Numeric coercion: parse the rendered text as i64, defaulting to 0.
fn to_num(v: &Value) -> i64 {
    v.render().trim().parse().unwrap_or(0)
}

fn ordering_value(ord: Ordering) -> Value {
    Value::Scalar(
        match ord {
            Ordering::Less => "-1",
            Ordering::Equal => "0",
            Ordering::Greater => "1",
        }
        .to_string(),
    )
}

fn raise(message: impl Into<String>) -> FragmentError {
    FragmentError::Raised {
        message: message.into(),
    }
}

fn eval_expr(expr: &Expr, ctx: &mut FragmentCtx<'_>) -> Result<Value, FragmentError> {
    match expr {
        Expr::CurrentValue => Ok(ctx.value.clone()),
        Expr::Number(n) => Ok(Value::Scalar(n.to_string())),
        Expr::Str(s) => Ok(Value::Scalar(s.clone())),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, ctx)?);
            }
            Ok(Value::List(values))
        }
        Expr::Var(name) => Ok(resolve_var(name, ctx)),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(bool_value(!value.is_truthy())),
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx),
        Expr::Call { name, args } => eval_call(name, args, ctx),
        Expr::Die(message) => {
            let message = eval_expr(message, ctx)?.render();
            Err(raise(message))
        }
    }
}

/// Resolve `$name`. `$v` is the conventional per-element variable: it reads
/// the current value whenever one is live, and the parameter map otherwise.
/// Unbound names resolve to Empty.
fn resolve_var(name: &str, ctx: &FragmentCtx<'_>) -> Value {
    if name == "v" && ctx.element {
        return ctx.value.clone();
    }
    ctx.params.get(name).cloned().unwrap_or(Value::Empty)
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut FragmentCtx<'_>,
) -> Result<Value, FragmentError> {
    // Boolean operators short-circuit and yield an operand, Perl-style.
    match op {
        BinaryOp::Or => {
            let l = eval_expr(lhs, ctx)?;
            return if l.is_truthy() { Ok(l) } else { eval_expr(rhs, ctx) };
        }
        BinaryOp::And => {
            let l = eval_expr(lhs, ctx)?;
            return if l.is_truthy() { eval_expr(rhs, ctx) } else { Ok(l) };
        }
        _ => {}
    }

    let l = eval_expr(lhs, ctx)?;
    let r = eval_expr(rhs, ctx)?;
    Ok(match op {
        BinaryOp::StrEq => bool_value(l.render() == r.render()),
        BinaryOp::StrNe => bool_value(l.render() != r.render()),
        BinaryOp::StrLt => bool_value(l.render() < r.render()),
        BinaryOp::StrLe => bool_value(l.render() <= r.render()),
        BinaryOp::StrGt => bool_value(l.render() > r.render()),
        BinaryOp::StrGe => bool_value(l.render() >= r.render()),
        BinaryOp::StrCmp => ordering_value(l.render().cmp(&r.render())),
        BinaryOp::NumEq => bool_value(to_num(&l) == to_num(&r)),
        BinaryOp::NumNe => bool_value(to_num(&l) != to_num(&r)),
        BinaryOp::NumLt => bool_value(to_num(&l) < to_num(&r)),
        BinaryOp::NumLe => bool_value(to_num(&l) <= to_num(&r)),
        BinaryOp::NumGt => bool_value(to_num(&l) > to_num(&r)),
        BinaryOp::NumGe => bool_value(to_num(&l) >= to_num(&r)),
        BinaryOp::NumCmp => ordering_value(to_num(&l).cmp(&to_num(&r))),
        BinaryOp::Add => Value::Scalar((to_num(&l) + to_num(&r)).to_string()),
        BinaryOp::Sub => Value::Scalar((to_num(&l) - to_num(&r)).to_string()),
        BinaryOp::Concat => Value::Scalar(format!("{}{}", l.render(), r.render())),
        BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
    })
}

fn eval_call(name: &str, args: &[Expr], ctx: &mut FragmentCtx<'_>) -> Result<Value, FragmentError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, ctx)?);
    }
    let arity = |n: usize| -> Result<(), FragmentError> {
        if values.len() == n {
            Ok(())
        } else {
            Err(raise(format!(
                "{name}() expects {n} argument{}, got {}",
                if n == 1 { "" } else { "s" },
                values.len()
            )))
        }
    };
    match name {
        "uc" => {
            arity(1)?;
            Ok(Value::Scalar(values[0].render().to_uppercase()))
        }
        "lc" => {
            arity(1)?;
            Ok(Value::Scalar(values[0].render().to_lowercase()))
        }
        "len" => {
            arity(1)?;
            let n = match &values[0] {
                Value::List(xs) => xs.len(),
                Value::Scalar(s) => s.chars().count(),
                Value::Empty => 0,
            };
            Ok(Value::Scalar(n.to_string()))
        }
        "join" => {
            arity(2)?;
            let sep = values[1].render();
            let joined = match &values[0] {
                Value::List(xs) => xs
                    .iter()
                    .map(Value::render)
                    .collect::<Vec<_>>()
                    .join(&sep),
                other => other.render(),
            };
            Ok(Value::Scalar(joined))
        }
        "defined" => {
            arity(1)?;
            Ok(bool_value(values[0] != Value::Empty))
        }
        "get" => {
            arity(1)?;
            let key = values[0].render();
            Ok(ctx.scratch.get(&key).cloned().unwrap_or(Value::Empty))
        }
        "set" => {
            arity(2)?;
            let key = values[0].render();
            ctx.scratch.set(key, values[1].clone());
            Ok(Value::Empty)
        }
        "bump" => {
            arity(1)?;
            let key = values[0].render();
            let next = ctx.scratch.get(&key).map(to_num).unwrap_or(0) + 1;
            ctx.scratch.set(key, Value::Scalar(next.to_string()));
            Ok(Value::Scalar(next.to_string()))
        }
        "die" => {
            arity(1)?;
            Err(raise(values[0].render()))
        }
        _ => Err(raise(format!("unknown function '{name}'"))),
    }
}
