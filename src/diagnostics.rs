//! Failure snapshot consumed by the debug entry point.
//!
//! The evaluator captures one snapshot at the innermost frame the first
//! time an error surfaces, before unwinding pops the call stack. Rendering
//! stays out of the core; binaries decide what to show.

use std::collections::HashMap;
use std::fmt::Write;

use crate::runtime::value::Value;

#[derive(Debug, Clone)]
pub struct FailureSnapshot {
    pub error: String,
    /// Innermost frame last.
    pub call_stack: Vec<String>,
    pub locals: Vec<(String, String)>,
    pub globals: Vec<(String, String)>,
}

impl FailureSnapshot {
    pub(crate) fn capture(
        error: String,
        call_stack: &[String],
        locals: &HashMap<String, Value>,
        globals: &HashMap<String, Value>,
    ) -> Self {
        Self {
            error,
            call_stack: call_stack.to_vec(),
            locals: snapshot_scope(locals),
            globals: snapshot_scope(globals),
        }
    }

    pub fn render(&self, verbose: bool) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "Error: {}", self.error);
        if self.call_stack.is_empty() {
            let _ = writeln!(report, "Call stack: (empty)");
        } else {
            let _ = writeln!(report, "Call stack (innermost last):");
            for frame in &self.call_stack {
                let _ = writeln!(report, "  {frame}");
            }
        }
        if verbose {
            let _ = writeln!(report, "Locals:");
            render_scope(&mut report, &self.locals);
            let _ = writeln!(report, "Globals:");
            render_scope(&mut report, &self.globals);
        }
        report
    }
}

fn snapshot_scope(scope: &HashMap<String, Value>) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = scope
        .iter()
        .map(|(name, value)| (name.clone(), value.to_display()))
        .collect();
    entries.sort();
    entries
}

fn render_scope(report: &mut String, entries: &[(String, String)]) {
    if entries.is_empty() {
        let _ = writeln!(report, "  (empty)");
        return;
    }
    for (name, value) in entries {
        let _ = writeln!(report, "  {name} = {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_call_stack_innermost_last() {
        let snapshot = FailureSnapshot {
            error: "Division by zero".to_string(),
            call_stack: vec!["main()".to_string(), "Calc.div()".to_string()],
            locals: vec![("b".to_string(), "0".to_string())],
            globals: vec![],
        };
        let report = snapshot.render(false);
        let main_at = report.find("main()").expect("main frame");
        let div_at = report.find("Calc.div()").expect("div frame");
        assert!(main_at < div_at);
        assert!(!report.contains("Locals:"));
    }

    #[test]
    fn verbose_rendering_includes_scopes() {
        let snapshot = FailureSnapshot {
            error: "boom".to_string(),
            call_stack: vec!["main()".to_string()],
            locals: vec![("x".to_string(), "1".to_string())],
            globals: vec![("g".to_string(), "2".to_string())],
        };
        let report = snapshot.render(true);
        assert!(report.contains("x = 1"));
        assert!(report.contains("g = 2"));
    }
}
