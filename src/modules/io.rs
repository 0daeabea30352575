use std::fs;

use crate::modules::Module;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

pub(crate) fn module() -> Module {
    let mut module = Module::new("io", "File input and output");
    module.register_function("read_file", read_file, Some(1), "Read a whole file as a string");
    module.register_function("write_file", write_file, Some(2), "Write a string to a file");
    module.register_function("append_file", append_file, Some(2), "Append a string to a file");
    module.register_function("file_exists", file_exists, Some(1), "Check whether a file exists");
    module.register_function("delete_file", delete_file, Some(1), "Delete a file");
    module
}

fn path_arg(function: &str, value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Str(path) => Ok(path.clone()),
        other => Err(RuntimeError::BuiltinTypeMismatch {
            builtin: function.to_string(),
            expected: "string path".to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn io_error(operation: &str, path: &str, error: std::io::Error) -> RuntimeError {
    RuntimeError::IoFailed {
        operation: operation.to_string(),
        path: path.to_string(),
        reason: error.to_string(),
    }
}

fn read_file(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = path_arg("io.read_file", &args[0])?;
    let content = fs::read_to_string(&path).map_err(|error| io_error("read", &path, error))?;
    Ok(Value::Str(content))
}

fn write_file(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = path_arg("io.write_file", &args[0])?;
    fs::write(&path, args[1].to_display()).map_err(|error| io_error("write", &path, error))?;
    Ok(Value::Null)
}

fn append_file(args: &[Value]) -> Result<Value, RuntimeError> {
    use std::io::Write;

    let path = path_arg("io.append_file", &args[0])?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|error| io_error("append", &path, error))?;
    file.write_all(args[1].to_display().as_bytes())
        .map_err(|error| io_error("append", &path, error))?;
    Ok(Value::Null)
}

fn file_exists(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = path_arg("io.file_exists", &args[0])?;
    Ok(Value::Bool(std::path::Path::new(&path).exists()))
}

fn delete_file(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = path_arg("io.delete_file", &args[0])?;
    fs::remove_file(&path).map_err(|error| io_error("delete", &path, error))?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_file_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.txt").display().to_string();

        write_file(&[Value::Str(path.clone()), Value::Str("hello".to_string())])
            .expect("write");
        append_file(&[Value::Str(path.clone()), Value::Str(" world".to_string())])
            .expect("append");
        let content = read_file(&[Value::Str(path.clone())]).expect("read");
        assert_eq!(content.to_display(), "hello world");

        assert!(file_exists(&[Value::Str(path.clone())])
            .expect("exists")
            .loose_eq(&Value::Bool(true)));
        delete_file(&[Value::Str(path.clone())]).expect("delete");
        assert!(file_exists(&[Value::Str(path)])
            .expect("exists")
            .loose_eq(&Value::Bool(false)));
    }

    #[test]
    fn reading_a_missing_file_is_an_io_error() {
        let err = read_file(&[Value::Str("/nonexistent/nope.txt".to_string())])
            .expect_err("expected io failure");
        assert!(matches!(err, RuntimeError::IoFailed { .. }));
    }
}
