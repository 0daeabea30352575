use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("string", "String manipulation functions");
    module.register_function("length", length, Some(1), "Get string length");
    module.register_function("to_upper", to_upper, Some(1), "Convert to uppercase");
    module.register_function("to_lower", to_lower, Some(1), "Convert to lowercase");
    module.register_function("trim", trim, Some(1), "Trim surrounding whitespace");
    module.register_function("split", split, Some(2), "Split by delimiter into an array");
    module.register_function("join", join, Some(2), "Join array elements with a delimiter");
    module.register_function("replace", replace, Some(3), "Replace every occurrence of a substring");
    module.register_function("contains", contains, Some(2), "Check for a substring");
    module.register_function("starts_with", starts_with, Some(2), "Check for a prefix");
    module.register_function("ends_with", ends_with, Some(2), "Check for a suffix");
    module.register_function("index_of", index_of, Some(2), "Find a substring, -1 when absent");
    module.register_function("substring", substring, None, "Slice by character positions");
    module.register_function("repeat", repeat, Some(2), "Repeat a string");
    module.register_function("reverse", reverse, Some(1), "Reverse a string");
    module
}

fn text(function: &str, value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Str(text) => Ok(text.clone()),
        other => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: function.to_string(),
            expected: "string".to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn integer(function: &str, value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(v) => Ok(*v),
        other => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: function.to_string(),
            expected: "int".to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn length(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.length", &args[0])?;
    Ok(Value::Int(s.chars().count() as i64))
}

fn to_upper(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text("string.to_upper", &args[0])?.to_uppercase()))
}

fn to_lower(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text("string.to_lower", &args[0])?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text("string.trim", &args[0])?.trim().to_string()))
}

fn split(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.split", &args[0])?;
    let delimiter = text("string.split", &args[1])?;
    if delimiter.is_empty() {
        return Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "string.split".to_string(),
            expected: "non-empty delimiter".to_string(),
            type_name: "string".to_string(),
        });
    }
    let parts = s
        .split(&delimiter)
        .map(|part| Value::Str(part.to_string()))
        .collect();
    Ok(Value::array(parts))
}

fn join(args: &[Value]) -> Result<Value, RuntimeError> {
    let Value::Array(values) = &args[0] else {
        return Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "string.join".to_string(),
            expected: "array".to_string(),
            type_name: args[0].type_name(),
        });
    };
    let delimiter = text("string.join", &args[1])?;
    let joined = values
        .borrow()
        .iter()
        .map(Value::to_display)
        .collect::<Vec<_>>()
        .join(&delimiter);
    Ok(Value::Str(joined))
}

fn replace(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.replace", &args[0])?;
    let old = text("string.replace", &args[1])?;
    let new = text("string.replace", &args[2])?;
    Ok(Value::Str(s.replace(&old, &new)))
}

fn contains(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.contains", &args[0])?;
    let needle = text("string.contains", &args[1])?;
    Ok(Value::Bool(s.contains(&needle)))
}

fn starts_with(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.starts_with", &args[0])?;
    let prefix = text("string.starts_with", &args[1])?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn ends_with(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.ends_with", &args[0])?;
    let suffix = text("string.ends_with", &args[1])?;
    Ok(Value::Bool(s.ends_with(&suffix)))
}

fn index_of(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.index_of", &args[0])?;
    let needle = text("string.index_of", &args[1])?;
    match s.find(&needle) {
        Some(byte_index) => Ok(Value::Int(s[..byte_index].chars().count() as i64)),
        None => Ok(Value::Int(-1)),
    }
}

fn substring(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(RuntimeError::BuiltinArityMismatch {
            builtin: "string.substring".to_string(),
            expected: "2 or 3".to_string(),
            found: args.len(),
        });
    }
    let s = text("string.substring", &args[0])?;
    let start = integer("string.substring", &args[1])?.max(0) as usize;
    let chars: Vec<char> = s.chars().collect();
    let end = match args.get(2) {
        Some(value) => (integer("string.substring", value)?.max(0) as usize).min(chars.len()),
        None => chars.len(),
    };
    if start >= end {
        return Ok(Value::Str(String::new()));
    }
    Ok(Value::Str(chars[start..end].iter().collect()))
}

fn repeat(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = text("string.repeat", &args[0])?;
    let count = integer("string.repeat", &args[1])?;
    if count < 0 {
        return Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "string.repeat".to_string(),
            expected: "non-negative count".to_string(),
            type_name: "int".to_string(),
        });
    }
    Ok(Value::Str(s.repeat(count as usize)))
}

fn reverse(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(
        text("string.reverse", &args[0])?.chars().rev().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> Value {
        Value::Str(value.to_string())
    }

    #[test]
    fn splits_and_joins_round_trip() {
        let parts = split(&[s("a,b,c"), s(",")]).expect("split");
        assert_eq!(parts.to_display(), "[a, b, c]");
        let joined = join(&[parts, s("-")]).expect("join");
        assert_eq!(joined.to_display(), "a-b-c");
    }

    #[test]
    fn index_of_counts_characters_not_bytes() {
        let result = index_of(&[s("héllo"), s("llo")]).expect("index_of");
        assert!(result.loose_eq(&Value::Int(2)));
    }

    #[test]
    fn substring_accepts_two_or_three_arguments() {
        assert_eq!(
            substring(&[s("hello"), Value::Int(1)]).expect("2-arg").to_display(),
            "ello"
        );
        assert_eq!(
            substring(&[s("hello"), Value::Int(1), Value::Int(3)])
                .expect("3-arg")
                .to_display(),
            "el"
        );
        let err = substring(&[s("hello")]).expect_err("expected arity failure");
        assert!(matches!(err, RuntimeError::BuiltinArityMismatch { .. }));
    }

    #[test]
    fn repeat_rejects_negative_counts() {
        let err = repeat(&[s("ab"), Value::Int(-1)]).expect_err("expected failure");
        assert!(matches!(err, RuntimeError::BuiltinTypeMismatch { .. }));
    }
}
