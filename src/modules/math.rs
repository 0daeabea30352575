use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("math", "Mathematical functions");
    module.register_constant("pi", Value::Float(std::f64::consts::PI));
    module.register_constant("e", Value::Float(std::f64::consts::E));
    module.register_function("sqrt", sqrt, Some(1), "Square root");
    module.register_function("pow", pow, Some(2), "Raise base to exponent");
    module.register_function("floor", floor, Some(1), "Round down to integer");
    module.register_function("ceil", ceil, Some(1), "Round up to integer");
    module.register_function("round", round, Some(1), "Round to nearest integer");
    module.register_function("sin", sin, Some(1), "Sine of an angle in radians");
    module.register_function("cos", cos, Some(1), "Cosine of an angle in radians");
    module.register_function("tan", tan, Some(1), "Tangent of an angle in radians");
    module.register_function("log", log, Some(1), "Natural logarithm");
    module.register_function("exp", exp, Some(1), "e raised to the given power");
    module
}

fn number(function: &str, value: &Value) -> Result<f64, RuntimeError> {
    value
        .as_f64()
        .ok_or_else(|| RuntimeError::BuiltinTypeMismatch {
            builtin: function.to_string(),
            expected: "number".to_string(),
            type_name: value.type_name(),
        })
}

fn sqrt(args: &[Value]) -> Result<Value, RuntimeError> {
    let x = number("math.sqrt", &args[0])?;
    if x < 0.0 {
        return Err(RuntimeError::MathDomain {
            function: "math.sqrt".to_string(),
            reason: "negative operand".to_string(),
        });
    }
    Ok(Value::Float(x.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value, RuntimeError> {
    let base = number("math.pow", &args[0])?;
    let exponent = number("math.pow", &args[1])?;
    Ok(Value::Float(base.powf(exponent)))
}

fn floor(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(number("math.floor", &args[0])?.floor() as i64))
}

fn ceil(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(number("math.ceil", &args[0])?.ceil() as i64))
}

fn round(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(number("math.round", &args[0])?.round() as i64))
}

fn sin(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number("math.sin", &args[0])?.sin()))
}

fn cos(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number("math.cos", &args[0])?.cos()))
}

fn tan(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number("math.tan", &args[0])?.tan()))
}

fn log(args: &[Value]) -> Result<Value, RuntimeError> {
    let x = number("math.log", &args[0])?;
    if x <= 0.0 {
        return Err(RuntimeError::MathDomain {
            function: "math.log".to_string(),
            reason: "operand must be positive".to_string(),
        });
    }
    Ok(Value::Float(x.ln()))
}

fn exp(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number("math.exp", &args[0])?.exp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_of_negative_is_a_domain_error() {
        let err = sqrt(&[Value::Int(-1)]).expect_err("expected domain error");
        assert!(matches!(err, RuntimeError::MathDomain { .. }));
    }

    #[test]
    fn floor_and_ceil_return_integers() {
        assert!(floor(&[Value::Float(2.7)])
            .expect("floor")
            .loose_eq(&Value::Int(2)));
        assert!(ceil(&[Value::Float(2.1)])
            .expect("ceil")
            .loose_eq(&Value::Int(3)));
    }

    #[test]
    fn rejects_non_numeric_operands() {
        let err = sqrt(&[Value::Str("4".to_string())]).expect_err("expected type error");
        assert!(matches!(err, RuntimeError::BuiltinTypeMismatch { .. }));
    }
}
