use std::process::Command;

use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("os", "Operating system access");
    module.register_constant("name", Value::Str(std::env::consts::OS.to_string()));
    module.register_function("getenv", getenv, Some(1), "Read an environment variable");
    module.register_function("cwd", cwd, Some(0), "Current working directory");
    module.register_function("execute", execute, Some(1), "Run a shell command, returning its exit code");
    module
}

fn string_arg(function: &str, value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Str(text) => Ok(text.clone()),
        other => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: function.to_string(),
            expected: "string".to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn getenv(args: &[Value]) -> Result<Value, RuntimeError> {
    let name = string_arg("os.getenv", &args[0])?;
    match std::env::var(&name) {
        Ok(value) => Ok(Value::Str(value)),
        Err(_) => Ok(Value::Null),
    }
}

fn cwd(_args: &[Value]) -> Result<Value, RuntimeError> {
    let dir = std::env::current_dir().map_err(|error| RuntimeError::IoFailed {
        operation: "cwd".to_string(),
        path: ".".to_string(),
        reason: error.to_string(),
    })?;
    Ok(Value::Str(dir.display().to_string()))
}

/// Blocks until the command finishes; stdio is inherited from the host
/// process.
fn execute(args: &[Value]) -> Result<Value, RuntimeError> {
    let command = string_arg("os.execute", &args[0])?;

    #[cfg(windows)]
    let status = Command::new("cmd").args(["/C", &command]).status();
    #[cfg(not(windows))]
    let status = Command::new("sh").args(["-c", &command]).status();

    let status = status.map_err(|error| RuntimeError::IoFailed {
        operation: "execute".to_string(),
        path: command.clone(),
        reason: error.to_string(),
    })?;
    Ok(Value::Int(i64::from(status.code().unwrap_or(-1))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getenv_returns_null_for_unset_variables() {
        let result = getenv(&[Value::Str("HPL_SURELY_UNSET_VAR".to_string())]).expect("getenv");
        assert!(result.loose_eq(&Value::Null));
    }

    #[test]
    fn execute_reports_the_exit_code() {
        let result = execute(&[Value::Str("exit 3".to_string())]).expect("execute");
        assert!(result.loose_eq(&Value::Int(3)));
    }
}
