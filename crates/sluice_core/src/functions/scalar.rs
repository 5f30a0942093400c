use super::{FunctionArgument, FunctionRegistry, Signature};
use crate::scalar::{DataType, Decimal, ScalarValue};
use crate::statistics::ErrorCode;

pub fn register_builtins(registry: &mut FunctionRegistry) {
    register_math(registry);
    register_string(registry);
    register_misc(registry);
}

fn register_math(registry: &mut FunctionRegistry) {
    registry.register_scalar(
        Signature::new(
            "abs",
            [FunctionArgument::required("value", DataType::Integer)],
            DataType::Integer,
        ),
        "Absolute value.",
        |args| match &args[0] {
            ScalarValue::Integer(v) => v
                .checked_abs()
                .map(ScalarValue::Integer)
                .ok_or(ErrorCode::Overflow),
            ScalarValue::Null => Ok(ScalarValue::Null),
            _ => Err(ErrorCode::InvalidArgument),
        },
    );
    registry.register_scalar(
        Signature::new(
            "abs",
            [FunctionArgument::required("value", DataType::Float)],
            DataType::Float,
        ),
        "Absolute value.",
        |args| match &args[0] {
            ScalarValue::Float(v) => Ok(ScalarValue::Float(v.abs())),
            ScalarValue::Null => Ok(ScalarValue::Null),
            _ => Err(ErrorCode::InvalidArgument),
        },
    );
    registry.register_scalar(
        Signature::new(
            "abs",
            [FunctionArgument::required("value", DataType::Numeric)],
            DataType::Numeric,
        ),
        "Absolute value.",
        |args| match &args[0] {
            ScalarValue::Numeric(v) => v
                .value
                .checked_abs()
                .map(|abs| ScalarValue::Numeric(Decimal::new(abs, v.scale)))
                .ok_or(ErrorCode::Overflow),
            ScalarValue::Null => Ok(ScalarValue::Null),
            _ => Err(ErrorCode::InvalidArgument),
        },
    );
    registry.register_scalar(
        Signature::new(
            "round",
            [
                FunctionArgument::required("value", DataType::Float),
                FunctionArgument::optional("digits", DataType::Integer, 0.into()),
            ],
            DataType::Float,
        ),
        "Round to a number of fractional digits.",
        |args| match (&args[0], &args[1]) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
            (ScalarValue::Float(v), ScalarValue::Integer(d)) => {
                let digits = i32::try_from(*d).map_err(|_| ErrorCode::InvalidArgument)?;
                let mul = 10f64.powi(digits);
                Ok(ScalarValue::Float((v * mul).round() / mul))
            }
            _ => Err(ErrorCode::InvalidArgument),
        },
    );
    registry.register_scalar(
        Signature::new(
            "round",
            [
                FunctionArgument::required("value", DataType::Numeric),
                FunctionArgument::optional("digits", DataType::Integer, 0.into()),
            ],
            DataType::Numeric,
        ),
        "Round to a number of fractional digits.",
        |args| match (&args[0], &args[1]) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
            (ScalarValue::Numeric(v), ScalarValue::Integer(d)) => {
                let digits = u8::try_from(*d).map_err(|_| ErrorCode::InvalidArgument)?;
                Ok(ScalarValue::Numeric(v.round(digits)))
            }
            _ => Err(ErrorCode::InvalidArgument),
        },
    );
}

/// Apply a string transform, passing nulls through.
fn map_str(
    value: &ScalarValue,
    f: impl Fn(&str) -> ScalarValue,
) -> Result<ScalarValue, ErrorCode> {
    match value {
        ScalarValue::String(s) => Ok(f(s)),
        ScalarValue::Null => Ok(ScalarValue::Null),
        _ => Err(ErrorCode::InvalidArgument),
    }
}

fn register_string(registry: &mut FunctionRegistry) {
    let one_string = || [FunctionArgument::required("value", DataType::String)];

    registry.register_scalar(
        Signature::new("lower", one_string(), DataType::String),
        "Convert to lowercase.",
        |args| map_str(&args[0], |s| s.to_lowercase().into()),
    );
    registry.register_scalar(
        Signature::new("upper", one_string(), DataType::String),
        "Convert to uppercase.",
        |args| map_str(&args[0], |s| s.to_uppercase().into()),
    );
    registry.register_scalar(
        Signature::new("trim", one_string(), DataType::String),
        "Remove leading and trailing whitespace.",
        |args| map_str(&args[0], |s| s.trim().into()),
    );
    registry.register_scalar(
        Signature::new("length", one_string(), DataType::Integer),
        "Number of characters in a string.",
        |args| map_str(&args[0], |s| ScalarValue::Integer(s.chars().count() as i64)),
    );
    registry.register_scalar(
        Signature::new(
            "substr",
            [
                FunctionArgument::required("value", DataType::String),
                FunctionArgument::required("start", DataType::Integer),
                FunctionArgument::optional("count", DataType::Integer, ScalarValue::Null),
            ],
            DataType::String,
        ),
        "Substring starting at a 1-based character position.",
        |args| {
            let (ScalarValue::String(s), ScalarValue::Integer(start)) = (&args[0], &args[1]) else {
                return match (&args[0], &args[1]) {
                    (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
                    _ => Err(ErrorCode::InvalidArgument),
                };
            };
            let skip = usize::try_from(start.saturating_sub(1).max(0)).unwrap_or(usize::MAX);
            let chars = s.chars().skip(skip);
            let out: String = match &args[2] {
                ScalarValue::Null => chars.collect(),
                ScalarValue::Integer(n) if *n >= 0 => {
                    chars.take(usize::try_from(*n).unwrap_or(usize::MAX)).collect()
                }
                _ => return Err(ErrorCode::InvalidArgument),
            };
            Ok(out.into())
        },
    );
    registry.register_scalar(
        Signature::new(
            "concat",
            [FunctionArgument::variadic("values", DataType::Any)],
            DataType::String,
        ),
        "Concatenate values as strings. Nulls are skipped.",
        |args| {
            let mut out = String::new();
            for arg in args.iter().filter(|a| !a.is_null()) {
                out.push_str(&arg.to_string());
            }
            Ok(out.into())
        },
    );
}

fn register_misc(registry: &mut FunctionRegistry) {
    registry.register_scalar(
        Signature::new(
            "coalesce",
            [FunctionArgument::variadic("values", DataType::Any)],
            DataType::Any,
        ),
        "First non-null argument.",
        |args| Ok(args.iter().find(|a| !a.is_null()).cloned().unwrap_or_default()),
    );
    registry.register_scalar(
        Signature::new(
            "ifnull",
            [
                FunctionArgument::required("value", DataType::Any),
                FunctionArgument::required("fallback", DataType::Any),
            ],
            DataType::Any,
        ),
        "Return the fallback if the value is null.",
        |args| {
            if args[0].is_null() {
                Ok(args[1].clone())
            } else {
                Ok(args[0].clone())
            }
        },
    );
    registry.register_scalar(
        Signature::new(
            "typeof",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::String,
        ),
        "Name of the value's type.",
        |args| Ok(args[0].datatype().to_string().into()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{ArgumentTypes, FunctionImpl};

    fn call(name: &str, args: &[ScalarValue]) -> Result<ScalarValue, ErrorCode> {
        let registry = FunctionRegistry::with_builtins();
        let types = ArgumentTypes::positional(args.iter().map(|a| a.datatype()));
        let f = registry.find(name, &types).unwrap();
        let bound = f
            .signature
            .bind_arguments(args, &[], |d| d.clone())
            .unwrap();
        match &f.implementation {
            FunctionImpl::Scalar(f) => f(&bound),
            FunctionImpl::Aggregate(_) => panic!("not a scalar function"),
        }
    }

    #[test]
    fn abs_overloads() {
        assert_eq!(Ok(ScalarValue::Integer(3)), call("abs", &[(-3).into()]));
        assert_eq!(Ok(ScalarValue::Float(1.5)), call("abs", &[(-1.5).into()]));
        assert_eq!(Err(ErrorCode::Overflow), call("abs", &[i64::MIN.into()]));
    }

    #[test]
    fn substr_start_bounds() {
        assert_eq!(Ok("bc".into()), call("substr", &["abc".into(), 2.into()]));
        assert_eq!(Ok("abc".into()), call("substr", &["abc".into(), 0.into()]));
        assert_eq!(Ok("abc".into()), call("substr", &["abc".into(), i64::MIN.into()]));
        assert_eq!(Ok("".into()), call("substr", &["abc".into(), i64::MAX.into()]));
    }

    #[test]
    fn round_default_digits() {
        assert_eq!(Ok(ScalarValue::Float(3.0)), call("round", &[2.6.into()]));
        assert_eq!(
            Ok(ScalarValue::Float(2.57)),
            call("round", &[2.567.into(), 2.into()])
        );
    }

    #[test]
    fn string_functions() {
        assert_eq!(Ok(ScalarValue::from("abc")), call("lower", &["AbC".into()]));
        assert_eq!(Ok(ScalarValue::Integer(4)), call("length", &["héllo"[..5].into()]));
        assert_eq!(Ok(ScalarValue::from("ell")), call("substr", &["hello".into(), 2.into(), 3.into()]));
        assert_eq!(Ok(ScalarValue::from("llo")), call("substr", &["hello".into(), 3.into()]));
        assert_eq!(
            Ok(ScalarValue::from("a1true")),
            call("concat", &["a".into(), 1.into(), ScalarValue::Null, true.into()])
        );
    }

    #[test]
    fn null_passthrough() {
        assert_eq!(Ok(ScalarValue::Null), call("upper", &[ScalarValue::Null]));
        assert_eq!(Ok(ScalarValue::from("x")), call("ifnull", &[ScalarValue::Null, "x".into()]));
    }
}
