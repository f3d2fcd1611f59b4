//! Expression evaluation against a scope

use tracing::warn;

use crate::error::Span;
use crate::parser::ast::*;

use super::scope::Scope;
use super::value::Value;

/// Evaluate `expr`; missing data yields `Value::Undefined` and a warning
pub fn evaluate(expr: &Expr, span: &Span, scope: &Scope<'_>) -> Value {
    match expr {
        Expr::Identifier(id) => match scope.lookup(id.as_str()) {
            Some(value) => value.clone(),
            None => {
                warn!(identifier = %id, span = ?span, "identifier not found in context");
                Value::Undefined
            }
        },
        Expr::Literal(literal) => literal_value(literal),
        Expr::Member {
            object,
            property,
            computed,
        } => {
            let target = evaluate(&object.node, &object.span, scope);
            let key = match (&property.node, computed) {
                (Expr::Identifier(name), false) => Value::String(name.0.clone()),
                (Expr::Literal(literal), _) => literal_value(literal),
                (other, _) => evaluate(other, &property.span, scope),
            };
            // A missing object was already reported
            if target == Value::Undefined {
                return Value::Undefined;
            }
            target.property(&key).unwrap_or_else(|| {
                warn!(property = %key, kind = target.kind(), span = ?property.span, "property not found");
                Value::Undefined
            })
        }
        Expr::Unary { argument, .. } => {
            Value::Bool(!evaluate(&argument.node, &argument.span, scope).is_truthy())
        }
        Expr::Update {
            operator,
            prefix,
            argument,
        } => {
            // Scopes are immutable; only the expression's own value changes
            let current = evaluate(&argument.node, &argument.span, scope).to_number();
            if !prefix {
                return Value::Number(current);
            }
            Value::Number(match operator {
                UpdateOperator::Increment => current + 1.0,
                UpdateOperator::Decrement => current - 1.0,
            })
        }
        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let left = evaluate(&left.node, &left.span, scope);
            let right = evaluate(&right.node, &right.span, scope);
            binary(*operator, &left, &right)
        }
        Expr::Logical {
            operator,
            left,
            right,
        } => {
            let lhs = evaluate(&left.node, &left.span, scope);
            let short_circuits = match operator {
                LogicalOperator::And => !lhs.is_truthy(),
                LogicalOperator::Or => lhs.is_truthy(),
            };
            if short_circuits {
                lhs
            } else {
                evaluate(&right.node, &right.span, scope)
            }
        }
    }
}

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
    }
}

fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Value {
    use BinaryOperator::*;
    match operator {
        StrictEqual => Value::Bool(left.strict_equals(right)),
        StrictNotEqual => Value::Bool(!left.strict_equals(right)),
        Equal => Value::Bool(left.loose_equals(right)),
        NotEqual => Value::Bool(!left.loose_equals(right)),
        Less | LessOrEqual | Greater | GreaterOrEqual => Value::Bool(compare(operator, left, right)),
        Add => add(left, right),
        Subtract => Value::Number(left.to_number() - right.to_number()),
        Multiply => Value::Number(left.to_number() * right.to_number()),
        Divide => Value::Number(left.to_number() / right.to_number()),
        Remainder => Value::Number(left.to_number() % right.to_number()),
        BitAnd => int32(to_int32(left) & to_int32(right)),
        BitOr => int32(to_int32(left) | to_int32(right)),
        BitXor => int32(to_int32(left) ^ to_int32(right)),
        ShiftLeft => int32(to_int32(left).wrapping_shl(shift_count(right))),
        ShiftRight => int32(to_int32(left).wrapping_shr(shift_count(right))),
        UnsignedShiftRight => {
            Value::Number(f64::from(to_uint32(left).wrapping_shr(shift_count(right))))
        }
    }
}

/// Text if either side is non-numeric data, numeric sum otherwise
fn add(left: &Value, right: &Value) -> Value {
    let is_text = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if is_text(left) || is_text(right) {
        Value::String(format!("{left}{right}"))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(operator: BinaryOperator, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    // NaN compares false both ways
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        BinaryOperator::Less => ordering.is_lt(),
        BinaryOperator::LessOrEqual => ordering.is_le(),
        BinaryOperator::Greater => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn to_uint32(value: &Value) -> u32 {
    let n = value.to_number();
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn to_int32(value: &Value) -> i32 {
    to_uint32(value) as i32
}

fn shift_count(value: &Value) -> u32 {
    to_uint32(value) & 31
}

fn int32(n: i32) -> Value {
    Value::Number(f64::from(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    /// Evaluate the single inline expression of `source`
    fn eval(source: &str, context: serde_json::Value) -> Value {
        let root = parse(source).expect("should parse");
        let context = Value::from(context);
        let scope = Scope::root(&context);
        match &root.html[0].node {
            Node::Expression(expr) => evaluate(expr, &root.html[0].span, &scope),
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_member_chain() {
        let ctx = json!({"foo": {"bar": "foobar"}, "rows": [{"name": "a"}], "k": "bar"});
        assert_eq!(eval("{foo.bar}", ctx.clone()), Value::from("foobar"));
        assert_eq!(eval("{rows[0].name}", ctx.clone()), Value::from("a"));
        assert_eq!(eval("{foo[k]}", ctx.clone()), Value::from("foobar"));
        assert_eq!(eval("{foo['bar']}", ctx.clone()), Value::from("foobar"));
        assert_eq!(eval("{rows.length}", ctx), Value::Number(1.0));
    }

    #[test]
    fn test_missing_values_are_undefined() {
        assert_eq!(eval("{nope}", json!({})), Value::Undefined);
        assert_eq!(eval("{nope.deeper.still}", json!({})), Value::Undefined);
        assert_eq!(eval("{a.missing}", json!({"a": {}})), Value::Undefined);
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(eval("{1 + 2}", json!({})), Value::Number(3.0));
        assert_eq!(eval("{'n' + 1}", json!({})), Value::from("n1"));
        // right operand is the whole remainder
        assert_eq!(eval("{10 - 4 - 3}", json!({})), Value::Number(9.0));
        assert_eq!(eval("{7 % 4}", json!({})), Value::Number(3.0));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("{6 & 3}", json!({})), Value::Number(2.0));
        assert_eq!(eval("{1 << 4}", json!({})), Value::Number(16.0));
        assert_eq!(eval("{-1 >>> 28}", json!({})), Value::Number(15.0));
        assert_eq!(eval("{-16 >> 2}", json!({})), Value::Number(-4.0));
    }

    #[test]
    fn test_comparison_and_equality() {
        let ctx = json!({"n": 5, "s": "5"});
        assert_eq!(eval("{n === 5}", ctx.clone()), Value::Bool(true));
        assert_eq!(eval("{n === s}", ctx.clone()), Value::Bool(false));
        assert_eq!(eval("{n == s}", ctx.clone()), Value::Bool(true));
        assert_eq!(eval("{n >= 5}", ctx.clone()), Value::Bool(true));
        assert_eq!(eval("{'a' < 'b'}", ctx), Value::Bool(true));
    }

    #[test]
    fn test_logical_returns_operand() {
        let ctx = json!({"name": "", "fallback": "anon"});
        assert_eq!(eval("{name || fallback}", ctx.clone()), Value::from("anon"));
        assert_eq!(eval("{fallback && name}", ctx.clone()), Value::from(""));
        assert_eq!(eval("{!!fallback}", ctx), Value::Bool(true));
    }

    #[test]
    fn test_update_does_not_write_back() {
        let ctx = json!({"count": 2});
        assert_eq!(eval("{++count}", ctx.clone()), Value::Number(3.0));
        assert_eq!(eval("{count++}", ctx.clone()), Value::Number(2.0));
        assert_eq!(eval("{--count}", ctx), Value::Number(1.0));
    }
}
