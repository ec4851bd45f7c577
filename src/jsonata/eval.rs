//! Tree-walking evaluator
//!
//! Evaluation follows JSONata sequence semantics in simplified form:
//! arrays are sequences, path steps map over them and flatten one
//! level, empty sequences are "undefined" (`None`), and singleton
//! sequences unwrap to their single value.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Number, Value};

use super::parser::{BinOp, Expr};

type EvalResult = Result<Option<Value>, String>;

/// A user lambda closed over the variable bindings at its definition.
#[derive(Clone)]
struct Closure {
    params: Vec<String>,
    body: Expr,
    captured: HashMap<String, Binding>,
}

#[derive(Clone)]
enum Binding {
    Value(Value),
    Lambda(Closure),
}

struct Env<'a> {
    root: &'a Value,
    vars: HashMap<String, Binding>,
}

impl<'a> Env<'a> {
    fn child(&self, extra: HashMap<String, Binding>) -> Env<'a> {
        let mut vars = self.vars.clone();
        vars.extend(extra);
        Env {
            root: self.root,
            vars,
        }
    }
}

/// Evaluate `expr` against `input`.
pub fn evaluate(expr: &Expr, input: &Value) -> EvalResult {
    let env = Env {
        root: input,
        vars: HashMap::new(),
    };
    eval(expr, input, &env)
}

/// Normalize an f64 into a JSON number, collapsing integral values to
/// integers so schema validation sees the expected type.
fn num(value: f64) -> Result<Value, String> {
    if !value.is_finite() {
        return Err(format!("arithmetic produced a non-finite number ({})", value));
    }
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Ok(Value::Number(Number::from(value as i64)))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| "arithmetic produced an unrepresentable number".to_string())
    }
}

fn as_num(value: &Value) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("expected a number, found {}", type_name(value)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSONata effective-boolean rules.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Deep equality with numeric normalization (1 == 1.0).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Collapse a mapped sequence: empty is undefined, singletons unwrap.
fn seq_result(mut items: Vec<Value>) -> Option<Value> {
    match items.len() {
        0 => None,
        1 => Some(items.remove(0)),
        _ => Some(Value::Array(items)),
    }
}

fn concat_display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn eval(expr: &Expr, ctx: &Value, env: &Env) -> EvalResult {
    match expr {
        Expr::Null => Ok(Some(Value::Null)),
        Expr::Bool(b) => Ok(Some(Value::Bool(*b))),
        Expr::Num(n) => Ok(Some(num(*n)?)),
        Expr::Str(s) => Ok(Some(Value::String(s.clone()))),
        Expr::Field(name) => Ok(field_access(ctx, name)),
        Expr::Wildcard => Ok(wildcard(ctx)),
        Expr::Var(name) => match name.as_str() {
            "" => Ok(Some(ctx.clone())),
            "$" => Ok(Some(env.root.clone())),
            _ => match env.vars.get(name) {
                Some(Binding::Value(v)) => Ok(Some(v.clone())),
                Some(Binding::Lambda(_)) => {
                    Err(format!("variable ${} is a function, not a value", name))
                }
                None => Err(format!("unknown variable ${}", name)),
            },
        },
        Expr::Map(lhs, rhs) => {
            let base = eval(lhs, ctx, env)?;
            match base {
                None => Ok(None),
                Some(Value::Array(items)) => {
                    let mut out = Vec::new();
                    for item in &items {
                        if let Some(v) = eval(rhs, item, env)? {
                            match v {
                                Value::Array(inner) => out.extend(inner),
                                other => out.push(other),
                            }
                        }
                    }
                    Ok(seq_result(out))
                }
                Some(item) => eval(rhs, &item, env),
            }
        }
        Expr::Predicate(lhs, pred) => {
            let base = eval(lhs, ctx, env)?;
            match base {
                None => Ok(None),
                Some(Value::Array(items)) => {
                    let len = items.len() as i64;
                    let mut out = Vec::new();
                    for (i, item) in items.into_iter().enumerate() {
                        match eval(pred, &item, env)? {
                            Some(Value::Number(n)) => {
                                let idx = normalize_index(n.as_f64().unwrap_or(0.0), len);
                                if idx == Some(i as i64) {
                                    out.push(item);
                                }
                            }
                            other => {
                                if truthy(other.as_ref()) {
                                    out.push(item);
                                }
                            }
                        }
                    }
                    Ok(seq_result(out))
                }
                Some(item) => match eval(pred, &item, env)? {
                    Some(Value::Number(n)) => {
                        let idx = normalize_index(n.as_f64().unwrap_or(0.0), 1);
                        Ok(if idx == Some(0) { Some(item) } else { None })
                    }
                    other => Ok(if truthy(other.as_ref()) {
                        Some(item)
                    } else {
                        None
                    }),
                },
            }
        }
        Expr::Neg(inner) => match eval(inner, ctx, env)? {
            None => Ok(None),
            Some(v) => Ok(Some(num(-as_num(&v)?)?)),
        },
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, env),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            let c = eval(cond, ctx, env)?;
            if truthy(c.as_ref()) {
                eval(then, ctx, env)
            } else if let Some(e) = otherwise {
                eval(e, ctx, env)
            } else {
                Ok(None)
            }
        }
        Expr::Object(pairs) => {
            let mut out = Map::new();
            for (key_expr, value_expr) in pairs {
                let key = match eval(key_expr, ctx, env)? {
                    Some(Value::String(s)) => s,
                    Some(other) => {
                        return Err(format!(
                            "object key must be a string, found {}",
                            type_name(&other)
                        ))
                    }
                    None => continue,
                };
                // Undefined entries are omitted, matching JSONata
                if let Some(value) = eval(value_expr, ctx, env)? {
                    out.insert(key, value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Expr::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = eval(item, ctx, env)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Expr::Lambda { .. } => Err("a function literal is not a value".to_string()),
        Expr::Call { name, args } => eval_call(name, args, ctx, env),
    }
}

fn normalize_index(raw: f64, len: i64) -> Option<i64> {
    let idx = raw.floor() as i64;
    let idx = if idx < 0 { len + idx } else { idx };
    (0..len).contains(&idx).then_some(idx)
}

fn field_access(ctx: &Value, name: &str) -> Option<Value> {
    match ctx {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = field_access(item, name) {
                    match v {
                        Value::Array(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
            }
            seq_result(out)
        }
        _ => None,
    }
}

fn wildcard(ctx: &Value) -> Option<Value> {
    match ctx {
        Value::Object(map) => seq_result(map.values().cloned().collect()),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = wildcard(item) {
                    match v {
                        Value::Array(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
            }
            seq_result(out)
        }
        _ => None,
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &Value, env: &Env) -> EvalResult {
    match op {
        BinOp::And => {
            let l = eval(lhs, ctx, env)?;
            if !truthy(l.as_ref()) {
                return Ok(Some(Value::Bool(false)));
            }
            let r = eval(rhs, ctx, env)?;
            Ok(Some(Value::Bool(truthy(r.as_ref()))))
        }
        BinOp::Or => {
            let l = eval(lhs, ctx, env)?;
            if truthy(l.as_ref()) {
                return Ok(Some(Value::Bool(true)));
            }
            let r = eval(rhs, ctx, env)?;
            Ok(Some(Value::Bool(truthy(r.as_ref()))))
        }
        BinOp::Concat => {
            let l = eval(lhs, ctx, env)?;
            let r = eval(rhs, ctx, env)?;
            Ok(Some(Value::String(format!(
                "{}{}",
                concat_display(l.as_ref()),
                concat_display(r.as_ref())
            ))))
        }
        BinOp::Eq | BinOp::Ne => {
            let l = eval(lhs, ctx, env)?;
            let r = eval(rhs, ctx, env)?;
            let equal = match (l, r) {
                (Some(a), Some(b)) => values_equal(&a, &b),
                _ => false,
            };
            Ok(Some(Value::Bool(if op == BinOp::Eq { equal } else { !equal })))
        }
        BinOp::In => {
            let l = eval(lhs, ctx, env)?;
            let r = eval(rhs, ctx, env)?;
            let found = match (l, r) {
                (Some(needle), Some(Value::Array(hay))) => {
                    hay.iter().any(|v| values_equal(v, &needle))
                }
                (Some(needle), Some(single)) => values_equal(&single, &needle),
                _ => false,
            };
            Ok(Some(Value::Bool(found)))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = eval(lhs, ctx, env)?;
            let r = eval(rhs, ctx, env)?;
            let (a, b) = match (l, r) {
                (Some(a), Some(b)) => (a, b),
                _ => return Ok(None),
            };
            let ordering = match (&a, &b) {
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => {
                    let x = as_num(&a)?;
                    let y = as_num(&b)?;
                    x.partial_cmp(&y)
                        .ok_or_else(|| "numbers are not comparable".to_string())?
                }
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Some(Value::Bool(result)))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let l = eval(lhs, ctx, env)?;
            let r = eval(rhs, ctx, env)?;
            let (a, b) = match (l, r) {
                (Some(a), Some(b)) => (as_num(&a)?, as_num(&b)?),
                _ => return Ok(None),
            };
            let value = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    a / b
                }
                _ => {
                    if b == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    a % b
                }
            };
            Ok(Some(num(value)?))
        }
    }
}

/// An evaluated call argument: a value or a callable.
enum Arg {
    Value(Option<Value>),
    Lambda(Closure),
}

impl Arg {
    fn into_value(self, name: &str) -> Result<Option<Value>, String> {
        match self {
            Arg::Value(v) => Ok(v),
            Arg::Lambda(_) => Err(format!("${}: unexpected function argument", name)),
        }
    }
}

fn eval_args(args: &[Expr], ctx: &Value, env: &Env) -> Result<Vec<Arg>, String> {
    args.iter()
        .map(|arg| match arg {
            Expr::Lambda { params, body } => Ok(Arg::Lambda(Closure {
                params: params.clone(),
                body: (**body).clone(),
                captured: env.vars.clone(),
            })),
            Expr::Var(name) if env.vars.get(name).is_some_and(|b| matches!(b, Binding::Lambda(_))) => {
                match env.vars.get(name) {
                    Some(Binding::Lambda(c)) => Ok(Arg::Lambda(c.clone())),
                    _ => unreachable!(),
                }
            }
            other => Ok(Arg::Value(eval(other, ctx, env)?)),
        })
        .collect()
}

fn call_closure(closure: &Closure, args: Vec<Option<Value>>, ctx: &Value, env: &Env) -> EvalResult {
    let mut bindings = closure.captured.clone();
    for (param, arg) in closure.params.iter().zip(args) {
        if let Some(value) = arg {
            bindings.insert(param.clone(), Binding::Value(value));
        }
    }
    let child = Env {
        root: env.root,
        vars: bindings,
    };
    eval(&closure.body, ctx, &child)
}

/// Coerce a value to a sequence for the array builtins.
fn to_seq(value: Option<Value>) -> Option<Vec<Value>> {
    match value {
        None => None,
        Some(Value::Array(items)) => Some(items),
        Some(single) => Some(vec![single]),
    }
}

fn eval_call(name: &str, arg_exprs: &[Expr], ctx: &Value, env: &Env) -> EvalResult {
    let mut args = eval_args(arg_exprs, ctx, env)?;
    let argc = args.len();
    let arity = move |n: usize| -> Result<(), String> {
        if argc < n {
            Err(format!("${} expects at least {} argument(s)", name, n))
        } else {
            Ok(())
        }
    };

    match name {
        "map" => {
            arity(2)?;
            let func = match args.remove(1) {
                Arg::Lambda(c) => c,
                Arg::Value(_) => return Err("$map expects a function".to_string()),
            };
            let items = match to_seq(args.remove(0).into_value(name)?) {
                None => return Ok(None),
                Some(items) => items,
            };
            let whole = Value::Array(items.clone());
            let mut out = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let call_args = vec![
                    Some(item.clone()),
                    Some(Value::Number(i.into())),
                    Some(whole.clone()),
                ];
                if let Some(v) = call_closure(&func, call_args, &item, env)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        "filter" => {
            arity(2)?;
            let func = match args.remove(1) {
                Arg::Lambda(c) => c,
                Arg::Value(_) => return Err("$filter expects a function".to_string()),
            };
            let items = match to_seq(args.remove(0).into_value(name)?) {
                None => return Ok(None),
                Some(items) => items,
            };
            let whole = Value::Array(items.clone());
            let mut out = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let call_args = vec![
                    Some(item.clone()),
                    Some(Value::Number(i.into())),
                    Some(whole.clone()),
                ];
                let keep = call_closure(&func, call_args, &item, env)?;
                if truthy(keep.as_ref()) {
                    out.push(item);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        "sum" => {
            arity(1)?;
            let items = match to_seq(args.remove(0).into_value(name)?) {
                None => return Ok(None),
                Some(items) => items,
            };
            let mut total = 0.0;
            for item in &items {
                total += as_num(item)?;
            }
            Ok(Some(num(total)?))
        }
        "count" => {
            arity(1)?;
            let count = match args.remove(0).into_value(name)? {
                None => 0,
                Some(Value::Array(items)) => items.len(),
                Some(_) => 1,
            };
            Ok(Some(Value::Number(count.into())))
        }
        "distinct" => {
            arity(1)?;
            let items = match to_seq(args.remove(0).into_value(name)?) {
                None => return Ok(None),
                Some(items) => items,
            };
            let mut seen = Vec::new();
            let mut out = Vec::new();
            for item in items {
                let key = serde_json::to_string(&item).unwrap_or_default();
                if !seen.contains(&key) {
                    seen.push(key);
                    out.push(item);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        "lookup" => {
            arity(2)?;
            let key = match args.remove(1).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$lookup key must be a string".to_string()),
            };
            match args.remove(0).into_value(name)? {
                Some(Value::Object(map)) => Ok(map.get(&key).cloned()),
                Some(Value::Array(items)) => {
                    let mut out = Vec::new();
                    for item in items {
                        if let Value::Object(map) = item {
                            if let Some(v) = map.get(&key) {
                                out.push(v.clone());
                            }
                        }
                    }
                    Ok(seq_result(out))
                }
                _ => Ok(None),
            }
        }
        "append" => {
            arity(2)?;
            let b = args.remove(1).into_value(name)?;
            let a = args.remove(0).into_value(name)?;
            let mut out = to_seq(a).unwrap_or_default();
            out.extend(to_seq(b).unwrap_or_default());
            Ok(Some(Value::Array(out)))
        }
        "string" => {
            arity(1)?;
            match args.remove(0).into_value(name)? {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(Value::String(s))),
                Some(other) => Ok(Some(Value::String(
                    serde_json::to_string(&other).unwrap_or_default(),
                ))),
            }
        }
        "number" => {
            arity(1)?;
            match args.remove(0).into_value(name)? {
                None => Ok(None),
                Some(Value::Number(n)) => Ok(Some(Value::Number(n))),
                Some(Value::String(s)) => {
                    let parsed: f64 = s
                        .trim()
                        .parse()
                        .map_err(|_| format!("$number: cannot parse '{}'", s))?;
                    Ok(Some(num(parsed)?))
                }
                Some(Value::Bool(b)) => Ok(Some(Value::Number(u8::from(b).into()))),
                Some(other) => Err(format!("$number: cannot convert {}", type_name(&other))),
            }
        }
        "boolean" => {
            arity(1)?;
            let v = args.remove(0).into_value(name)?;
            Ok(Some(Value::Bool(truthy(v.as_ref()))))
        }
        "not" => {
            arity(1)?;
            let v = args.remove(0).into_value(name)?;
            Ok(Some(Value::Bool(!truthy(v.as_ref()))))
        }
        "exists" => {
            arity(1)?;
            let v = args.remove(0).into_value(name)?;
            Ok(Some(Value::Bool(v.is_some())))
        }
        "keys" => {
            arity(1)?;
            match args.remove(0).into_value(name)? {
                Some(Value::Object(map)) => Ok(Some(Value::Array(
                    map.keys().map(|k| Value::String(k.clone())).collect(),
                ))),
                _ => Ok(None),
            }
        }
        "uppercase" | "lowercase" | "trim" => {
            arity(1)?;
            let s = expect_string(args.remove(0).into_value(name)?, name)?;
            let s = match s {
                None => return Ok(None),
                Some(s) => s,
            };
            let out = match name {
                "uppercase" => s.to_uppercase(),
                "lowercase" => s.to_lowercase(),
                _ => s.split_whitespace().collect::<Vec<_>>().join(" "),
            };
            Ok(Some(Value::String(out)))
        }
        "length" => {
            arity(1)?;
            match expect_string(args.remove(0).into_value(name)?, name)? {
                None => Ok(None),
                Some(s) => Ok(Some(Value::Number(s.chars().count().into()))),
            }
        }
        "substring" => {
            arity(2)?;
            let start = match args.remove(1).into_value(name)? {
                Some(v) => as_num(&v)? as i64,
                None => 0,
            };
            let s = match expect_string(args.remove(0).into_value(name)?, name)? {
                None => return Ok(None),
                Some(s) => s,
            };
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let begin = if start < 0 { (len + start).max(0) } else { start.min(len) };
            let out: String = chars[begin as usize..].iter().collect();
            Ok(Some(Value::String(out)))
        }
        "split" => {
            arity(2)?;
            let sep = match args.remove(1).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$split separator must be a string".to_string()),
            };
            match expect_string(args.remove(0).into_value(name)?, name)? {
                None => Ok(None),
                Some(s) => Ok(Some(Value::Array(
                    s.split(&sep)
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ))),
            }
        }
        "join" => {
            arity(1)?;
            let sep = if args.len() > 1 {
                match args.remove(1).into_value(name)? {
                    Some(Value::String(s)) => s,
                    _ => return Err("$join separator must be a string".to_string()),
                }
            } else {
                String::new()
            };
            let items = match to_seq(args.remove(0).into_value(name)?) {
                None => return Ok(None),
                Some(items) => items,
            };
            let parts: Result<Vec<String>, String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(format!("$join: expected strings, found {}", type_name(other))),
                })
                .collect();
            Ok(Some(Value::String(parts?.join(&sep))))
        }
        "contains" => {
            arity(2)?;
            let pat = match args.remove(1).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$contains pattern must be a string".to_string()),
            };
            match expect_string(args.remove(0).into_value(name)?, name)? {
                None => Ok(None),
                Some(s) => Ok(Some(Value::Bool(s.contains(&pat)))),
            }
        }
        "match" => {
            arity(2)?;
            let pattern = match args.remove(1).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$match pattern must be a string".to_string()),
            };
            let re = Regex::new(&pattern)
                .map_err(|e| format!("$match: invalid pattern '{}': {}", pattern, e))?;
            let s = match expect_string(args.remove(0).into_value(name)?, name)? {
                None => return Ok(None),
                Some(s) => s,
            };
            let mut out = Vec::new();
            for caps in re.captures_iter(&s) {
                let whole = caps.get(0).unwrap();
                let index = s[..whole.start()].chars().count();
                let groups: Vec<Value> = caps
                    .iter()
                    .skip(1)
                    .map(|g| match g {
                        Some(m) => Value::String(m.as_str().to_string()),
                        None => Value::Null,
                    })
                    .collect();
                out.push(serde_json::json!({
                    "match": whole.as_str(),
                    "index": index,
                    "groups": groups,
                }));
            }
            Ok(Some(Value::Array(out)))
        }
        "replace" => {
            arity(3)?;
            let replacement = match args.remove(2).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$replace replacement must be a string".to_string()),
            };
            let pattern = match args.remove(1).into_value(name)? {
                Some(Value::String(s)) => s,
                _ => return Err("$replace pattern must be a string".to_string()),
            };
            let re = Regex::new(&pattern)
                .map_err(|e| format!("$replace: invalid pattern '{}': {}", pattern, e))?;
            match expect_string(args.remove(0).into_value(name)?, name)? {
                None => Ok(None),
                Some(s) => Ok(Some(Value::String(
                    re.replace_all(&s, replacement.as_str()).into_owned(),
                ))),
            }
        }
        "abs" | "floor" | "ceil" | "round" => {
            arity(1)?;
            match args.remove(0).into_value(name)? {
                None => Ok(None),
                Some(v) => {
                    let n = as_num(&v)?;
                    let out = match name {
                        "abs" => n.abs(),
                        "floor" => n.floor(),
                        "ceil" => n.ceil(),
                        _ => n.round(),
                    };
                    Ok(Some(num(out)?))
                }
            }
        }
        other => Err(format!("unknown function ${}", other)),
    }
}

fn expect_string(value: Option<Value>, func: &str) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!(
            "${}: expected a string, found {}",
            func,
            type_name(&other)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonata::{lexer::tokenize, parser::parse};
    use serde_json::json;

    fn run(src: &str, data: &Value) -> EvalResult {
        evaluate(&parse(tokenize(src).unwrap()).unwrap(), data)
    }

    #[test]
    fn undefined_propagates_through_arithmetic() {
        let data = json!({"a": 1});
        assert_eq!(run("missing + 1", &data).unwrap(), None);
    }

    #[test]
    fn object_omits_undefined_entries() {
        let data = json!({"a": 1});
        assert_eq!(
            run(r#"{"x": a, "y": missing}"#, &data).unwrap(),
            Some(json!({"x": 1}))
        );
    }

    #[test]
    fn singleton_sequences_unwrap() {
        let data = json!({"items": [{"n": 7}]});
        assert_eq!(run("items.n", &data).unwrap(), Some(json!(7)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let data = json!({"a": 1});
        assert!(run("a / 0", &data).is_err());
    }

    #[test]
    fn equality_normalizes_numbers() {
        let data = json!({"a": 1.0, "b": 1});
        assert_eq!(run("a = b", &data).unwrap(), Some(json!(true)));
    }

    #[test]
    fn in_operator() {
        let data = json!({"xs": [1, 2, 3]});
        assert_eq!(run("2 in xs", &data).unwrap(), Some(json!(true)));
        assert_eq!(run("9 in xs", &data).unwrap(), Some(json!(false)));
    }

    #[test]
    fn wildcard_collects_object_values() {
        let data = json!({"o": {"a": 1, "b": 2}});
        assert_eq!(run("o.*", &data).unwrap(), Some(json!([1, 2])));
    }
}
