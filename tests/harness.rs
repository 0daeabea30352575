use std::path::Path;

use anyhow::{Context, Result, ensure};

use hpl::document;
use hpl::evaluator::{BufferedConsole, Evaluator};
use hpl::modules::ModuleLoader;
use test_support::{Case, CaseClass, load_cases, normalize_output};

fn run_case_program(case: &Case) -> (Result<(), String>, String) {
    let loader = ModuleLoader::shared();
    loader.borrow_mut().set_script_dir(&case.dir);
    let search_paths = loader.borrow().search_paths();

    let document = match document::load_file(&case.program_path, &search_paths) {
        Ok(document) => document,
        Err(error) => return (Err(error.to_string()), String::new()),
    };

    let console = BufferedConsole::new();
    let mut evaluator = Evaluator::new(document, loader, Box::new(console.clone()));
    let result = evaluator.run().map_err(|error| error.to_string());
    (result, console.output())
}

fn check_case(case: &Case) -> Result<()> {
    match case.spec.class {
        CaseClass::RuntimeSuccess => {
            ensure!(
                case.spec.expected.exit_code == 0,
                "Case {} expected exit code must be 0 for runtime_success",
                case.name
            );
            let stdout_file = case
                .spec
                .expected
                .stdout_file
                .as_deref()
                .with_context(|| format!("Missing stdout_file in {}", case.name))?;
            let expected = case.read_text(stdout_file)?;

            let (result, output) = run_case_program(case);
            result.map_err(|error| {
                anyhow::anyhow!("Case {} failed unexpectedly: {error}", case.name)
            })?;
            assert_eq!(
                normalize_output(&output),
                normalize_output(&expected),
                "Output mismatch for {}",
                case.name
            );
        }
        CaseClass::FrontendError => {
            ensure!(
                case.spec.expected.exit_code == 1,
                "Case {} expected exit code must be 1 for frontend_error",
                case.name
            );
            let expected_file = case
                .spec
                .expected
                .stderr_contains_file
                .as_deref()
                .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
            let expected_error = case.read_text(expected_file)?;
            let expected_error = expected_error.trim();

            let loader = ModuleLoader::shared();
            loader.borrow_mut().set_script_dir(&case.dir);
            let search_paths = loader.borrow().search_paths();
            let result = document::load_file(&case.program_path, &search_paths);
            let error = match result {
                Err(error) => error.to_string(),
                Ok(_) => anyhow::bail!("Expected frontend error in {}, but loading succeeded", case.name),
            };
            ensure!(
                error.contains(expected_error),
                "Expected frontend error containing '{expected_error}' in {}, got '{error}'",
                case.name
            );
        }
        CaseClass::RuntimeError => {
            ensure!(
                case.spec.expected.exit_code == 1,
                "Case {} expected exit code must be 1 for runtime_error",
                case.name
            );
            let expected_file = case
                .spec
                .expected
                .stderr_contains_file
                .as_deref()
                .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
            let expected_error = case.read_text(expected_file)?;
            let expected_error = expected_error.trim();

            let (result, _) = run_case_program(case);
            let error = match result {
                Err(error) => error,
                Ok(()) => anyhow::bail!("Expected runtime error in {}, but it succeeded", case.name),
            };
            ensure!(
                error.contains(expected_error),
                "Expected runtime error containing '{expected_error}' in {}, got '{error}'",
                case.name
            );
        }
    }
    Ok(())
}

#[test]
fn runs_example_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in cases {
        check_case(&case)?;
    }
    Ok(())
}
