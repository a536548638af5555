//! Tree-walking evaluator for parsed condition expressions.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::parser::{BinaryOp, Expr, LogicalOp, UnaryOp};
use super::value::Value;
use super::ExpressionError;

/// Variable bindings visible to an expression.
pub type Bindings = HashMap<String, Value>;

/// Evaluates an expression against bound variables.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
        Expr::Reference(text) => Err(ExpressionError::UnresolvedReference(text.clone())),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, bindings)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.truthy()),
                UnaryOp::Negate => Value::Number(-value.to_number()),
                UnaryOp::Plus => Value::Number(value.to_number()),
            })
        }
        Expr::Logical { op, left, right } => {
            let left = evaluate(left, bindings)?;
            match (op, left.truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                _ => evaluate(right, bindings),
            }
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, bindings)?;
            let right = evaluate(right, bindings)?;
            Ok(apply_binary(*op, &left, &right))
        }
        Expr::Property { object, name } => {
            let object = evaluate(object, bindings)?;
            read_property(&object, name)
        }
        Expr::Call {
            object,
            method,
            args,
        } => {
            let receiver = evaluate(object, bindings)?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(&receiver, method, &args)
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt => Value::Bool(left.compare(right) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            left.compare(right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(left.compare(right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            left.compare(right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
    }
}

fn add(left: &Value, right: &Value) -> Value {
    let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_));
    if stringy(left) || stringy(right) {
        Value::Str(left.to_display_string() + &right.to_display_string())
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn read_property(object: &Value, name: &str) -> Result<Value, ExpressionError> {
    if object.is_nullish() {
        return Err(ExpressionError::NullReceiver {
            member: name.to_string(),
            receiver: object.type_name(),
        });
    }
    match (object, name) {
        (Value::Str(s), "length") => Ok(Value::Number(s.encode_utf16().count() as f64)),
        (Value::Array(items), "length") => Ok(Value::Number(items.len() as f64)),
        (Value::Object(map), "length") => Ok(Value::from_json(map.get("length"))),
        _ => Ok(Value::Undefined),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    if receiver.is_nullish() {
        return Err(ExpressionError::NullReceiver {
            member: method.to_string(),
            receiver: receiver.type_name(),
        });
    }

    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    let not_callable = || ExpressionError::NotCallable {
        method: method.to_string(),
        receiver: receiver.type_name(),
    };

    match (receiver, method) {
        (_, "toString") => Ok(Value::Str(receiver.to_display_string())),
        (Value::Str(s), "includes") => Ok(Value::Bool(s.contains(&arg(0).to_display_string()))),
        (Value::Str(s), "startsWith") => {
            Ok(Value::Bool(s.starts_with(&arg(0).to_display_string())))
        }
        (Value::Str(s), "endsWith") => Ok(Value::Bool(s.ends_with(&arg(0).to_display_string()))),
        (Value::Str(s), "indexOf") => {
            let needle = arg(0).to_display_string();
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].encode_utf16().count() as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(index))
        }
        (Value::Str(s), "toLowerCase") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "toUpperCase") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "trim") => Ok(Value::Str(s.trim().to_string())),
        (Value::Array(items), "includes") => {
            let needle = arg(0);
            Ok(Value::Bool(items.iter().any(|item| same_value_zero(item, &needle))))
        }
        (Value::Array(items), "indexOf") => {
            let needle = arg(0);
            let index = items
                .iter()
                .position(|item| item.strict_eq(&needle))
                .map(|i| i as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(index))
        }
        _ => Err(not_callable()),
    }
}

/// Equality used by `Array.includes`: strict, except NaN matches NaN.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_eq(b),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::{parse, Scope};
    use super::*;
    use std::collections::HashSet;

    fn eval_with(source: &str, bindings: Vec<(&str, Value)>) -> Result<Value, ExpressionError> {
        let bindings: Bindings = bindings
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let declared: HashSet<String> = bindings.keys().cloned().collect();
        let expr = parse(source, Scope::Variables(&declared))?;
        evaluate(&expr, &bindings)
    }

    fn eval(source: &str) -> Value {
        eval_with(source, vec![]).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2"), Value::Bool(true));
        assert_eq!(eval("'10' > 9"), Value::Bool(true));
        assert_eq!(eval("'b' >= 'a'"), Value::Bool(true));
        assert_eq!(eval("undefined < 1"), Value::Bool(false));
        assert_eq!(eval("1 == '1'"), Value::Bool(true));
        assert_eq!(eval("1 === '1'"), Value::Bool(false));
        assert_eq!(eval("null != undefined"), Value::Bool(false));
    }

    #[test]
    fn test_logical_short_circuit() {
        let v = vec![("__v0", Value::Undefined)];
        assert_eq!(
            eval_with("false && __v0.trim()", v.clone()).unwrap(),
            Value::Bool(false)
        );
        assert!(eval_with("true && __v0.trim()", v).is_err());
        assert_eq!(eval("0 || 'fallback'"), Value::Str("fallback".into()));
        assert_eq!(eval("!0"), Value::Bool(true));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval("7 % 4"), Value::Number(3.0));
        assert_eq!(eval("'a' + 1"), Value::Str("a1".into()));
        assert_eq!(eval("-'3' + 1"), Value::Number(-2.0));
    }

    #[test]
    fn test_string_methods() {
        let v = vec![("__v0", Value::Str("  Hello World ".into()))];
        assert_eq!(
            eval_with("__v0.trim().toLowerCase().startsWith('hello')", v.clone()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_with("__v0.includes('World')", v.clone()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval_with("__v0.length", v.clone()).unwrap(), Value::Number(14.0));
        assert_eq!(
            eval_with("__v0.indexOf('H')", v).unwrap(),
            Value::Number(2.0)
        );
    }

    #[test]
    fn test_array_methods() {
        let v = vec![(
            "__v0",
            Value::Array(vec![Value::Str("a".into()), Value::Number(2.0)]),
        )];
        assert_eq!(eval_with("__v0.includes(2)", v.clone()).unwrap(), Value::Bool(true));
        assert_eq!(eval_with("__v0.includes('2')", v.clone()).unwrap(), Value::Bool(false));
        assert_eq!(eval_with("__v0.length === 2", v.clone()).unwrap(), Value::Bool(true));
        assert_eq!(eval_with("__v0.indexOf('a')", v).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_methods_on_nullish_fail() {
        let v = vec![("__v0", Value::Undefined)];
        assert!(matches!(
            eval_with("__v0.includes('x')", v.clone()),
            Err(ExpressionError::NullReceiver { .. })
        ));
        assert!(eval_with("__v0.length", v).is_err());
    }

    #[test]
    fn test_string_method_on_number_fails() {
        let v = vec![("__v0", Value::Number(5.0))];
        assert!(matches!(
            eval_with("__v0.toLowerCase()", v.clone()),
            Err(ExpressionError::NotCallable { .. })
        ));
        assert_eq!(
            eval_with("__v0.toString() === '5'", v).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_bound_values_are_data() {
        let v = vec![("__v0", Value::Str("1 === 1 || true".into()))];
        assert_eq!(eval_with("__v0 === true", v).unwrap(), Value::Bool(false));
    }
}
