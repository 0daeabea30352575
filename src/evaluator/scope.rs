use std::collections::HashMap;

use crate::runtime::value::Value;

/// Per-call local bindings. The second level of the chain is the evaluator's
/// process-wide global map.
pub(crate) type LocalScope = HashMap<String, Value>;

/// Resolution order is strictly local, then global.
pub(crate) fn lookup(
    locals: &LocalScope,
    globals: &HashMap<String, Value>,
    name: &str,
) -> Option<Value> {
    locals.get(name).or_else(|| globals.get(name)).cloned()
}

/// Writes prefer the level where the name already exists; a brand-new name
/// is created in the local scope.
pub(crate) fn store(
    locals: &mut LocalScope,
    globals: &mut HashMap<String, Value>,
    name: &str,
    value: Value,
) {
    if !locals.contains_key(name) && globals.contains_key(name) {
        globals.insert(name.to_string(), value);
    } else {
        locals.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals_on_read() {
        let mut locals = LocalScope::new();
        let mut globals = HashMap::new();
        globals.insert("x".to_string(), Value::Int(1));
        locals.insert("x".to_string(), Value::Int(2));
        let value = lookup(&locals, &globals, "x").expect("x should resolve");
        assert!(value.loose_eq(&Value::Int(2)));
    }

    #[test]
    fn writes_prefer_the_existing_level() {
        let mut locals = LocalScope::new();
        let mut globals = HashMap::new();
        globals.insert("g".to_string(), Value::Int(1));

        store(&mut locals, &mut globals, "g", Value::Int(5));
        assert!(globals["g"].loose_eq(&Value::Int(5)));
        assert!(!locals.contains_key("g"));

        store(&mut locals, &mut globals, "fresh", Value::Int(9));
        assert!(locals.contains_key("fresh"));
        assert!(!globals.contains_key("fresh"));
    }
}
