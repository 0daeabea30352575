use serde_json::Value as JsonValue;

use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("json", "JSON encoding and decoding");
    module.register_function("stringify", stringify, Some(1), "Encode a value as JSON text");
    module.register_function("parse", parse, Some(1), "Decode JSON text into a value");
    module
}

fn stringify(args: &[Value]) -> Result<Value, RuntimeError> {
    let encoded = value_to_json(&args[0])?;
    let text = serde_json::to_string(&encoded).map_err(|error| RuntimeError::ConversionFailed {
        type_name: args[0].type_name(),
        value: args[0].to_display(),
        target: format!("json ({error})"),
    })?;
    Ok(Value::Str(text))
}

fn parse(args: &[Value]) -> Result<Value, RuntimeError> {
    let Value::Str(text) = &args[0] else {
        return Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "json.parse".to_string(),
            expected: "string".to_string(),
            type_name: args[0].type_name(),
        });
    };
    let decoded: JsonValue =
        serde_json::from_str(text).map_err(|error| RuntimeError::ConversionFailed {
            type_name: "string".to_string(),
            value: text.clone(),
            target: format!("json ({error})"),
        })?;
    json_to_value(&decoded)
}

fn value_to_json(value: &Value) -> Result<JsonValue, RuntimeError> {
    match value {
        Value::Int(v) => Ok(JsonValue::from(*v)),
        Value::Float(v) => serde_json::Number::from_f64(*v).map(JsonValue::Number).ok_or(
            RuntimeError::MathDomain {
                function: "json.stringify".to_string(),
                reason: "non-finite float".to_string(),
            },
        ),
        Value::Str(v) => Ok(JsonValue::String(v.clone())),
        Value::Bool(v) => Ok(JsonValue::Bool(*v)),
        Value::Null => Ok(JsonValue::Null),
        Value::Array(values) => {
            let mut elements = Vec::new();
            for element in values.borrow().iter() {
                elements.push(value_to_json(element)?);
            }
            Ok(JsonValue::Array(elements))
        }
        other => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "json.stringify".to_string(),
            expected: "arrays and primitives".to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn json_to_value(json: &JsonValue) -> Result<Value, RuntimeError> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(v) => Ok(Value::Bool(*v)),
        JsonValue::Number(number) => {
            if let Some(v) = number.as_i64() {
                Ok(Value::Int(v))
            } else {
                Ok(Value::Float(number.as_f64().unwrap_or(f64::NAN)))
            }
        }
        JsonValue::String(v) => Ok(Value::Str(v.clone())),
        JsonValue::Array(elements) => {
            let mut values = Vec::new();
            for element in elements {
                values.push(json_to_value(element)?);
            }
            Ok(Value::array(values))
        }
        // The value model carries no mapping type.
        JsonValue::Object(_) => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "json.parse".to_string(),
            expected: "arrays and primitives".to_string(),
            type_name: "object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arrays_of_primitives() {
        let original = Value::array(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Str("three".to_string()),
            Value::Bool(true),
            Value::Null,
        ]);
        let text = stringify(&[original.clone()]).expect("stringify");
        let parsed = parse(&[text]).expect("parse");
        assert!(parsed.loose_eq(&original));
    }

    #[test]
    fn json_objects_are_not_representable() {
        let err = parse(&[Value::Str("{\"a\": 1}".to_string())]).expect_err("expected failure");
        assert!(matches!(err, RuntimeError::BuiltinTypeMismatch { .. }));
    }

    #[test]
    fn parse_errors_name_the_offending_text() {
        let err = parse(&[Value::Str("not json".to_string())]).expect_err("expected failure");
        assert!(matches!(err, RuntimeError::ConversionFailed { .. }));
    }
}
