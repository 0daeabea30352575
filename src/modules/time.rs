use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("time", "Clocks and sleeping");
    module.register_function("now", now, Some(0), "Seconds since the Unix epoch");
    module.register_function("millis", millis, Some(0), "Milliseconds since the Unix epoch");
    module.register_function("sleep", sleep, Some(1), "Block for the given number of seconds");
    module
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

fn now(_args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(since_epoch().as_secs_f64()))
}

fn millis(_args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(since_epoch().as_millis() as i64))
}

fn sleep(args: &[Value]) -> Result<Value, RuntimeError> {
    let seconds = args[0]
        .as_f64()
        .ok_or_else(|| RuntimeError::BuiltinTypeMismatch {
            builtin: "time.sleep".to_string(),
            expected: "number".to_string(),
            type_name: args[0].type_name(),
        })?;
    if seconds < 0.0 {
        return Err(RuntimeError::BuiltinTypeMismatch {
            builtin: "time.sleep".to_string(),
            expected: "non-negative number".to_string(),
            type_name: args[0].type_name(),
        });
    }
    std::thread::sleep(Duration::from_secs_f64(seconds));
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_positive() {
        let Value::Float(seconds) = now(&[]).expect("now") else {
            panic!("expected float");
        };
        assert!(seconds > 0.0);
    }

    #[test]
    fn sleep_rejects_negative_durations() {
        let err = sleep(&[Value::Float(-1.0)]).expect_err("expected failure");
        assert!(matches!(err, RuntimeError::BuiltinTypeMismatch { .. }));
    }
}
