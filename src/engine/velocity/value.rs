//! Runtime value semantics for the Velocity engine
//!
//! Values are plain `serde_json::Value`s. Rendering, equality and the
//! supported methods follow the Java behavior Velocity templates expect.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::parser::BinaryOp;

/// Truthiness of a condition. Unresolved, null, false, zero and empty
/// strings or collections are false.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Render a value the way Java's `toString` would
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(to_text).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}={}", k, to_text(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// `$value.name` property lookup
pub(crate) fn property(value: &Value, name: &str) -> Option<Value> {
    match (value, name) {
        (Value::Object(map), _) => map.get(name).cloned(),
        (Value::Array(items), "empty") => Some(Value::Bool(items.is_empty())),
        (Value::String(s), "empty") => Some(Value::Bool(s.is_empty())),
        _ => None,
    }
}

/// `$value[index]` lookup; negative list indexes count from the end
pub(crate) fn index(value: &Value, index: Option<&Value>) -> Option<Value> {
    match (value, index?) {
        (Value::Array(items), Value::Number(n)) => {
            let i = resolve_index(n.as_i64()?, items.len())?;
            items.get(i).cloned()
        }
        (Value::Object(map), key) => map.get(&to_text(key)).cloned(),
        _ => None,
    }
}

fn resolve_index(i: i64, len: usize) -> Option<usize> {
    if i < 0 {
        len.checked_sub(usize::try_from(i.unsigned_abs()).ok()?)
    } else {
        usize::try_from(i).ok().filter(|i| *i < len)
    }
}

fn int_arg(args: &[Value], idx: usize, method: &str) -> Result<i64, String> {
    args.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("{}() expects an integer argument", method))
}

/// Invoke a method. `Ok(None)` means the method does not exist for this
/// value (or returned null); `Err` is a failure inside the method.
pub(crate) fn call_method(
    value: &Value,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, String> {
    let text_arg = |idx: usize| args.get(idx).map(to_text).unwrap_or_default();

    let result = match (value, name, args.len()) {
        (_, "toString", 0) => Value::String(to_text(value)),
        (_, "equals", 1) => Value::Bool(equals(value, &args[0])),
        (_, "hashCode", 0) => return Ok(None),

        (Value::String(s), "length", 0) => Value::from(s.chars().count()),
        (Value::String(s), "isEmpty", 0) => Value::Bool(s.is_empty()),
        (Value::String(s), "toUpperCase", 0) => Value::String(s.to_uppercase()),
        (Value::String(s), "toLowerCase", 0) => Value::String(s.to_lowercase()),
        (Value::String(s), "trim", 0) => Value::String(s.trim().to_string()),
        (Value::String(s), "contains", 1) => Value::Bool(s.contains(&text_arg(0))),
        (Value::String(s), "startsWith", 1) => Value::Bool(s.starts_with(&text_arg(0))),
        (Value::String(s), "endsWith", 1) => Value::Bool(s.ends_with(&text_arg(0))),
        (Value::String(s), "replace", 2) => Value::String(s.replace(&text_arg(0), &text_arg(1))),
        (Value::String(s), "indexOf", 1) => {
            let needle = text_arg(0);
            let found = s
                .find(&needle)
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Value::from(found)
        }
        (Value::String(s), "substring", 1 | 2) => {
            let chars: Vec<char> = s.chars().collect();
            let begin = int_arg(args, 0, name)?;
            let end = if args.len() == 2 {
                int_arg(args, 1, name)?
            } else {
                chars.len() as i64
            };
            if begin < 0 || end < begin || end > chars.len() as i64 {
                return Err(format!(
                    "substring({}, {}) out of range for length {}",
                    begin,
                    end,
                    chars.len()
                ));
            }
            Value::String(chars[begin as usize..end as usize].iter().collect())
        }

        (Value::Array(items), "size", 0) => Value::from(items.len()),
        (Value::Array(items), "isEmpty", 0) => Value::Bool(items.is_empty()),
        (Value::Array(items), "contains", 1) => {
            Value::Bool(items.iter().any(|item| equals(item, &args[0])))
        }
        (Value::Array(items), "indexOf", 1) => {
            let found = items
                .iter()
                .position(|item| equals(item, &args[0]))
                .map_or(-1, |i| i as i64);
            Value::from(found)
        }
        (Value::Array(items), "get", 1) => {
            let i = int_arg(args, 0, name)?;
            let Some(item) = resolve_index(i, items.len()).and_then(|i| items.get(i)) else {
                return Err(format!(
                    "Index {} out of bounds for length {}",
                    i,
                    items.len()
                ));
            };
            item.clone()
        }

        (Value::Object(map), "size", 0) => Value::from(map.len()),
        (Value::Object(map), "isEmpty", 0) => Value::Bool(map.is_empty()),
        (Value::Object(map), "get", 1) => return Ok(map.get(&text_arg(0)).cloned()),
        (Value::Object(map), "containsKey", 1) => Value::Bool(map.contains_key(&text_arg(0))),
        (Value::Object(map), "keySet", 0) => {
            Value::Array(map.keys().cloned().map(Value::String).collect())
        }
        (Value::Object(map), "values", 0) => Value::Array(map.values().cloned().collect()),

        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Loose equality: numbers compare numerically, values of different types
/// compare by their text.
pub(crate) fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), Value::Bool(_))
        | (Value::String(_), Value::String(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => a == b,
        _ => to_text(a) == to_text(b),
    }
}

/// Ordering for `<`, `>`, `<=` and `>=`; `None` when the values do not compare.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

/// Arithmetic on two values. `+` concatenates when either side is a string.
pub(crate) fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    if op == BinaryOp::Add && (a.is_string() || b.is_string()) {
        return Ok(Value::String(format!("{}{}", to_text(a), to_text(b))));
    }

    let (Value::Number(x), Value::Number(y)) = (a, b) else {
        return Err(format!(
            "Cannot apply `{}` to {} and {}",
            op.symbol(),
            type_name(a),
            type_name(b)
        ));
    };

    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div | BinaryOp::Mod if y == 0 => return Err("Division by zero".to_string()),
            BinaryOp::Div => x.checked_div(y),
            BinaryOp::Mod => x.checked_rem(y),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::from(result));
        }
    }

    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Mod if y == 0.0 => return Err("Division by zero".to_string()),
        BinaryOp::Div => x / y,
        BinaryOp::Mod => x % y,
        _ => return Err(format!("`{}` is not an arithmetic operator", op.symbol())),
    };
    float(result)
}

pub(crate) fn negate(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) if i != i64::MIN => Ok(Value::from(-i)),
            _ => float(-n.as_f64().unwrap_or(0.0)),
        },
        other => Err(format!("Cannot negate {}", type_name(other))),
    }
}

fn float(value: f64) -> Result<Value, String> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| "Result is not a finite number".to_string())
}

/// One step of an assignment path such as `$a.b[0]`
#[derive(Debug)]
pub(crate) enum PathKey {
    Field(String),
    Item(Value),
}

/// Mutable child of a container, for walking assignment paths
pub(crate) fn child_mut<'v>(value: &'v mut Value, key: &PathKey) -> Option<&'v mut Value> {
    match (value, key) {
        (Value::Object(map), PathKey::Field(name)) => map.get_mut(name),
        (Value::Object(map), PathKey::Item(key)) => map.get_mut(&to_text(key)),
        (Value::Array(items), PathKey::Item(Value::Number(n))) => {
            let len = items.len();
            items.get_mut(resolve_index(n.as_i64()?, len)?)
        }
        _ => None,
    }
}

/// Store `new` under `key` inside `container`
pub(crate) fn set_child(container: &mut Value, key: &PathKey, new: Value) -> Result<(), String> {
    match (container, key) {
        (Value::Object(map), PathKey::Field(name)) => {
            map.insert(name.clone(), new);
            Ok(())
        }
        (Value::Object(map), PathKey::Item(key)) => {
            map.insert(to_text(key), new);
            Ok(())
        }
        (Value::Array(items), PathKey::Item(Value::Number(n))) => {
            let len = items.len();
            let slot = n
                .as_i64()
                .and_then(|i| resolve_index(i, len))
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| format!("Index {} out of bounds for length {}", n, len))?;
            *slot = new;
            Ok(())
        }
        (other, _) => Err(format!("Cannot assign into a {}", type_name(other))),
    }
}
