//! Outer document handling.
//!
//! A source file is a YAML mapping with `includes`, `imports`, `classes`,
//! `objects`, top-level arrow functions, and an optional `call` directive.
//! Before decoding, arrow-function values are rewritten into YAML literal
//! blocks so the decoder treats every body as an opaque string; after
//! decoding, includes are resolved and merged, and each body is lexed and
//! parsed into its AST.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_yaml::{Mapping, Value as YamlValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lexer;
use crate::parser;
use crate::runtime::object::{Function, HplClass};

const RESERVED_KEYS: [&str; 5] = ["includes", "imports", "classes", "objects", "call"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Reading {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("YAML syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Document root must be a mapping")]
    NotAMapping,
    #[error("In function '{name}': {reason}")]
    BadFunction { name: String, reason: String },
    #[error("Invalid object declaration '{name}': expected 'ClassName()', got '{declaration}'")]
    BadObjectDeclaration { name: String, declaration: String },
    #[error("Object '{object}' references unknown class '{class}'")]
    UnknownClass { object: String, class: String },
    #[error("Class '{class}' references unknown parent '{parent}'")]
    UnknownParent { class: String, parent: String },
    #[error("Invalid call directive '{directive}'")]
    BadCallDirective { directive: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub module: String,
    pub alias: Option<String>,
}

/// Call-directive arguments are parsed greedily: integer, then float, then
/// quoted string; anything else is an identifier resolved from globals at
/// run time.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallDirective {
    pub name: String,
    pub args: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDecl {
    pub name: String,
    pub class: String,
}

/// A fully loaded document: includes merged, bodies parsed, references
/// validated. Object declarations keep their source order so construction
/// order is deterministic.
#[derive(Debug)]
pub struct Document {
    pub classes: HashMap<String, Rc<HplClass>>,
    pub objects: Vec<ObjectDecl>,
    pub functions: HashMap<String, Rc<Function>>,
    pub imports: Vec<ImportEntry>,
    pub call: Option<CallDirective>,
}

pub fn load_file(path: &Path, search_paths: &[PathBuf]) -> Result<Document, DocumentError> {
    let mapping = load_mapping(path, search_paths)?;
    build_document(mapping)
}

pub fn load_str(
    source: &str,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> Result<Document, DocumentError> {
    let mapping = decode_mapping(source, base_dir, search_paths)?;
    build_document(mapping)
}

fn load_mapping(path: &Path, search_paths: &[PathBuf]) -> Result<Mapping, DocumentError> {
    let content = fs::read_to_string(path).map_err(|error| DocumentError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    })?;
    decode_mapping(&content, path.parent(), search_paths)
}

fn decode_mapping(
    source: &str,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> Result<Mapping, DocumentError> {
    let preprocessed = preprocess_functions(source);
    let decoded: YamlValue = serde_yaml::from_str(&preprocessed)?;
    let mut mapping = match decoded {
        YamlValue::Mapping(mapping) => mapping,
        // An empty file or one holding only comments decodes to null.
        YamlValue::Null => Mapping::new(),
        _ => return Err(DocumentError::NotAMapping),
    };
    resolve_includes(&mut mapping, base_dir, search_paths)?;
    Ok(mapping)
}

fn resolve_includes(
    mapping: &mut Mapping,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> Result<(), DocumentError> {
    let Some(YamlValue::Sequence(includes)) = mapping.get("includes").cloned() else {
        return Ok(());
    };
    for entry in includes {
        let YamlValue::String(include) = entry else {
            warn!("ignoring non-string include entry");
            continue;
        };
        match resolve_include_path(&include, base_dir, search_paths) {
            Some(include_path) => {
                debug!(include = %include_path.display(), "merging included document");
                let included = load_mapping(&include_path, search_paths)?;
                merge_included(mapping, &included);
            }
            None => warn!("include '{include}' not found in any search path"),
        }
    }
    Ok(())
}

/// Include resolution order: absolute path, then relative to the including
/// file, then the working directory, then each module search path entry.
fn resolve_include_path(
    include: &str,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> Option<PathBuf> {
    let include_path = Path::new(include);
    if include_path.is_absolute() {
        return include_path.exists().then(|| include_path.to_path_buf());
    }

    let mut candidates = Vec::new();
    if let Some(dir) = base_dir {
        candidates.push(dir.join(include));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(include));
    }
    for dir in search_paths {
        candidates.push(dir.join(include));
    }
    candidates.into_iter().find(|candidate| candidate.exists())
}

/// Merge an included document into the host: class and object maps union
/// key-by-key with existing keys winning, top-level functions import only
/// when absent, and import lists concatenate.
fn merge_included(main: &mut Mapping, include: &Mapping) {
    for section in ["classes", "objects"] {
        let Some(YamlValue::Mapping(incoming)) = include.get(section) else {
            continue;
        };
        if !main.contains_key(section) {
            main.insert(
                YamlValue::String(section.to_string()),
                YamlValue::Mapping(Mapping::new()),
            );
        }
        if let Some(YamlValue::Mapping(existing)) = main.get_mut(section) {
            for (key, value) in incoming {
                if !existing.contains_key(key) {
                    existing.insert(key.clone(), value.clone());
                }
            }
        }
    }

    for (key, value) in include {
        let YamlValue::String(name) = key else {
            continue;
        };
        if RESERVED_KEYS.contains(&name.as_str()) {
            continue;
        }
        if let YamlValue::String(text) = value {
            if text.contains("=>") && !main.contains_key(key) {
                main.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(YamlValue::Sequence(incoming)) = include.get("imports") {
        if !main.contains_key("imports") {
            main.insert(
                YamlValue::String("imports".to_string()),
                YamlValue::Sequence(Vec::new()),
            );
        }
        if let Some(YamlValue::Sequence(existing)) = main.get_mut("imports") {
            existing.extend(incoming.iter().cloned());
        }
    }
}

fn build_document(mapping: Mapping) -> Result<Document, DocumentError> {
    let mut document = Document {
        classes: HashMap::new(),
        objects: Vec::new(),
        functions: HashMap::new(),
        imports: Vec::new(),
        call: None,
    };

    for (key, value) in &mapping {
        let YamlValue::String(key) = key else {
            continue;
        };
        match key.as_str() {
            "includes" => {}
            "imports" => document.imports = parse_imports(value),
            "classes" => parse_classes(value, &mut document)?,
            "objects" => parse_objects(value, &mut document)?,
            "call" => {
                if let YamlValue::String(directive) = value {
                    document.call = Some(parse_call_directive(directive)?);
                }
            }
            name => {
                if let YamlValue::String(text) = value {
                    if text.contains("=>") {
                        document
                            .functions
                            .insert(name.to_string(), Rc::new(parse_function(name, text)?));
                    }
                }
            }
        }
    }

    validate(&document)?;
    Ok(document)
}

fn parse_imports(value: &YamlValue) -> Vec<ImportEntry> {
    let YamlValue::Sequence(entries) = value else {
        return Vec::new();
    };
    let mut imports = Vec::new();
    for entry in entries {
        match entry {
            YamlValue::String(module) => imports.push(ImportEntry {
                module: module.clone(),
                alias: None,
            }),
            YamlValue::Mapping(aliased) => {
                for (module, alias) in aliased {
                    if let (YamlValue::String(module), YamlValue::String(alias)) = (module, alias) {
                        imports.push(ImportEntry {
                            module: module.clone(),
                            alias: Some(alias.clone()),
                        });
                    }
                }
            }
            _ => warn!("ignoring malformed import entry"),
        }
    }
    imports
}

fn parse_classes(value: &YamlValue, document: &mut Document) -> Result<(), DocumentError> {
    let YamlValue::Mapping(classes) = value else {
        return Ok(());
    };
    for (class_name, class_def) in classes {
        let (YamlValue::String(class_name), YamlValue::Mapping(class_def)) = (class_name, class_def)
        else {
            continue;
        };
        let mut methods = HashMap::new();
        let mut parent = None;
        for (member_name, member) in class_def {
            let YamlValue::String(member_name) = member_name else {
                continue;
            };
            match (member_name.as_str(), member) {
                ("parent", YamlValue::String(parent_name)) => parent = Some(parent_name.clone()),
                (_, YamlValue::String(body)) => {
                    let context = format!("{class_name}.{member_name}");
                    methods.insert(
                        member_name.clone(),
                        Rc::new(parse_function(&context, body)?),
                    );
                }
                _ => continue,
            }
        }
        document.classes.insert(
            class_name.clone(),
            Rc::new(HplClass::new(class_name.clone(), parent, methods)),
        );
    }
    Ok(())
}

fn parse_objects(value: &YamlValue, document: &mut Document) -> Result<(), DocumentError> {
    let YamlValue::Mapping(objects) = value else {
        return Ok(());
    };
    for (object_name, declaration) in objects {
        let (YamlValue::String(object_name), YamlValue::String(declaration)) =
            (object_name, declaration)
        else {
            continue;
        };
        let declaration = declaration.trim();
        let class = match declaration.find('(') {
            Some(open) => {
                let inner = declaration
                    .strip_suffix(')')
                    .map(|rest| rest[open + 1..].trim());
                // Constructor arguments are not supported at this layer.
                match inner {
                    Some("") => declaration[..open].trim(),
                    _ => {
                        return Err(DocumentError::BadObjectDeclaration {
                            name: object_name.clone(),
                            declaration: declaration.to_string(),
                        });
                    }
                }
            }
            None => declaration,
        };
        if class.is_empty() {
            return Err(DocumentError::BadObjectDeclaration {
                name: object_name.clone(),
                declaration: declaration.to_string(),
            });
        }
        document.objects.push(ObjectDecl {
            name: object_name.clone(),
            class: class.to_string(),
        });
    }
    Ok(())
}

/// Parse one `(params) => { body }` string: split the parameter list, then
/// lex and parse the text between the first brace after the arrow and the
/// matching final brace.
fn parse_function(name: &str, text: &str) -> Result<Function, DocumentError> {
    let bad = |reason: &str| DocumentError::BadFunction {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let text = text.trim();
    let open = text.find('(').ok_or_else(|| bad("parameter list not found"))?;
    let close = text.find(')').ok_or_else(|| bad("unclosed parameter list"))?;
    if close < open {
        return Err(bad("unclosed parameter list"));
    }
    let params = text[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(str::to_string)
        .collect();

    let arrow = text[close..]
        .find("=>")
        .map(|offset| close + offset)
        .ok_or_else(|| bad("'=>' not found"))?;
    let body_open = text[arrow..]
        .find('{')
        .map(|offset| arrow + offset)
        .ok_or_else(|| bad("braces not found"))?;
    let body_close = text
        .rfind('}')
        .filter(|&index| index > body_open)
        .ok_or_else(|| bad("braces not found"))?;

    let body_source = &text[body_open + 1..body_close];
    let tokens = lexer::tokenize(body_source).map_err(|error| bad(&error.to_string()))?;
    let body = parser::parse_tokens(tokens).map_err(|error| bad(&error.to_string()))?;
    Ok(Function::new(params, body))
}

fn parse_call_directive(directive: &str) -> Result<CallDirective, DocumentError> {
    let bad = || DocumentError::BadCallDirective {
        directive: directive.to_string(),
    };

    let trimmed = directive.trim();
    let Some(open) = trimmed.find('(') else {
        if trimmed.is_empty() {
            return Err(bad());
        }
        return Ok(CallDirective {
            name: trimmed.to_string(),
            args: Vec::new(),
        });
    };

    if !trimmed.ends_with(')') {
        return Err(bad());
    }
    let name = trimmed[..open].trim();
    if name.is_empty() {
        return Err(bad());
    }
    let args = split_call_args(&trimmed[open + 1..trimmed.len() - 1])
        .iter()
        .map(|raw| parse_call_arg(raw.trim()))
        .collect();
    Ok(CallDirective {
        name: name.to_string(),
        args,
    })
}

/// Comma split that respects quoted strings, so `greet("a, b")` stays one
/// argument.
fn split_call_args(source: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in source.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_call_arg(raw: &str) -> CallArg {
    if let Ok(value) = raw.parse::<i64>() {
        return CallArg::Int(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return CallArg::Float(value);
    }
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return CallArg::Str(raw[1..raw.len() - 1].to_string());
        }
    }
    CallArg::Ident(raw.to_string())
}

fn validate(document: &Document) -> Result<(), DocumentError> {
    for class in document.classes.values() {
        if let Some(parent) = &class.parent {
            if !document.classes.contains_key(parent) {
                return Err(DocumentError::UnknownParent {
                    class: class.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }
    for object in &document.objects {
        if !document.classes.contains_key(&object.class) {
            return Err(DocumentError::UnknownClass {
                object: object.name.clone(),
                class: object.class.clone(),
            });
        }
    }
    Ok(())
}

struct ArrowHeader {
    indent_len: usize,
    name: String,
    value_start: usize,
}

/// Rewrite every `IDENT: (PARAMS) => {` region into a YAML literal block so
/// the decoder keeps the body as one opaque string. Brace balance is
/// tracked with string and comment state: braces and arrows inside string
/// literals or `#` comments never count.
pub(crate) fn preprocess_functions(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let Some(header) = match_arrow_header(line) else {
            out.push(line.to_string());
            i += 1;
            continue;
        };

        let indent = &line[..header.indent_len];
        out.push(format!("{indent}{}: |", header.name));
        out.push(format!("{indent}  {}", &line[header.value_start..]));

        let mut balance = BraceBalance::default();
        balance.feed(&line[header.value_start..]);
        i += 1;
        while balance.depth > 0 && i < lines.len() {
            out.push(format!("  {}", lines[i]));
            balance.feed(lines[i]);
            i += 1;
        }
    }

    let mut result = out.join("\n");
    if source.ends_with('\n') {
        result.push('\n');
    }
    result
}

fn match_arrow_header(line: &str) -> Option<ArrowHeader> {
    let indent_len = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    let rest = &line[indent_len..];

    let ident_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if ident_len == 0 || !rest.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return None;
    }

    let mut cursor = ident_len;
    if !rest[cursor..].starts_with(':') {
        return None;
    }
    cursor += 1;
    cursor += leading_spaces(&rest[cursor..]);
    if !rest[cursor..].starts_with('(') {
        return None;
    }
    let value_start = indent_len + cursor;

    let close = rest[cursor..].find(')')? + cursor;
    let mut after = close + 1;
    after += leading_spaces(&rest[after..]);
    if !rest[after..].starts_with("=>") {
        return None;
    }
    after += 2;
    after += leading_spaces(&rest[after..]);
    if !rest[after..].starts_with('{') {
        return None;
    }

    Some(ArrowHeader {
        indent_len,
        name: rest[..ident_len].to_string(),
        value_start,
    })
}

fn leading_spaces(text: &str) -> usize {
    text.find(|c: char| c != ' ').unwrap_or(text.len())
}

#[derive(Default)]
struct BraceBalance {
    depth: i32,
}

impl BraceBalance {
    fn feed(&mut self, line: &str) {
        let mut in_string = false;
        let mut escaped = false;
        for c in line.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '#' => break,
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn load(source: &str) -> Document {
        load_str(source, None, &[]).expect("document should load")
    }

    #[test]
    fn preprocessing_rewrites_arrow_functions_into_literal_blocks() {
        let source = indoc! {r#"
            main: () => {
              echo 1
            }
        "#};
        let preprocessed = preprocess_functions(source);
        assert!(preprocessed.starts_with("main: |"));
        assert!(preprocessed.contains("  () => {"));
    }

    #[test]
    fn loads_classes_objects_functions_imports_and_call() {
        let document = load(indoc! {r#"
            imports:
              - math
              - json: j
            classes:
              Greeter:
                greet: (n) => {
                  return "Hi " + n
                }
            objects:
              g: Greeter()
            main: () => {
              echo g.greet("Ada")
            }
            call: main
        "#});

        assert_eq!(
            document.imports,
            vec![
                ImportEntry {
                    module: "math".to_string(),
                    alias: None,
                },
                ImportEntry {
                    module: "json".to_string(),
                    alias: Some("j".to_string()),
                },
            ]
        );
        let greeter = &document.classes["Greeter"];
        assert_eq!(greeter.methods["greet"].params, vec!["n".to_string()]);
        assert_eq!(
            document.objects,
            vec![ObjectDecl {
                name: "g".to_string(),
                class: "Greeter".to_string(),
            }]
        );
        assert!(document.functions.contains_key("main"));
        assert_eq!(
            document.call,
            Some(CallDirective {
                name: "main".to_string(),
                args: Vec::new(),
            })
        );
    }

    #[test]
    fn braces_and_arrows_inside_strings_do_not_break_preprocessing() {
        let document = load(indoc! {r#"
            main: () => {
              echo "brace } and arrow => in a string"
            }
        "#});
        assert_eq!(document.functions["main"].body.len(), 1);
    }

    #[test]
    fn one_line_bodies_preprocess_cleanly() {
        let document = load("main: () => { echo 1 }\n");
        assert_eq!(document.functions["main"].body.len(), 1);
    }

    #[test]
    fn parses_call_directive_arguments_greedily() {
        let directive = parse_call_directive("add(5, 3.5, \"a, b\", x)").expect("directive");
        assert_eq!(directive.name, "add");
        assert_eq!(
            directive.args,
            vec![
                CallArg::Int(5),
                CallArg::Float(3.5),
                CallArg::Str("a, b".to_string()),
                CallArg::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_call_directive() {
        let err = parse_call_directive("add(5").expect_err("expected failure");
        assert!(matches!(err, DocumentError::BadCallDirective { .. }));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = load_str(
            indoc! {r#"
                classes:
                  Child:
                    parent: Missing
                    show: () => { echo 1 }
            "#},
            None,
            &[],
        )
        .expect_err("expected unknown parent failure");
        assert!(matches!(err, DocumentError::UnknownParent { .. }));
    }

    #[test]
    fn rejects_object_of_unknown_class() {
        let err = load_str("objects:\n  g: Missing()\n", None, &[])
            .expect_err("expected unknown class failure");
        assert!(matches!(err, DocumentError::UnknownClass { .. }));
    }

    #[test]
    fn rejects_constructor_arguments_in_object_declarations() {
        let err = load_str(
            indoc! {r#"
                classes:
                  C:
                    init: () => { this.x = 1 }
                objects:
                  c: C(42)
            "#},
            None,
            &[],
        )
        .expect_err("expected bad declaration failure");
        assert!(matches!(err, DocumentError::BadObjectDeclaration { .. }));
    }

    #[test]
    fn function_parse_errors_carry_positions() {
        let err = load_str("main: () => {\n  if (a :\n}\n", None, &[])
            .expect_err("expected body parse failure");
        let DocumentError::BadFunction { name, reason } = err else {
            panic!("expected BadFunction, got {err:?}");
        };
        assert_eq!(name, "main");
        assert!(reason.contains("line"));
    }

    #[test]
    fn merges_includes_with_existing_keys_winning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lib = dir.path().join("lib.hpl");
        std::fs::write(
            &lib,
            indoc! {r#"
                imports:
                  - math
                classes:
                  Base:
                    show: () => { echo "base" }
                  Extra:
                    show: () => { echo "extra" }
                helper: () => { return 1 }
                main: () => { echo "lib main" }
            "#},
        )
        .expect("write lib");

        let host = dir.path().join("host.hpl");
        std::fs::write(
            &host,
            indoc! {r#"
                includes:
                  - lib.hpl
                classes:
                  Base:
                    show: () => { echo "host" }
                main: () => { echo "host main" }
            "#},
        )
        .expect("write host");

        let document = load_file(&host, &[]).expect("load host");
        // Host definitions win; include-only entries are imported.
        assert!(document.classes.contains_key("Extra"));
        assert!(document.functions.contains_key("helper"));
        assert_eq!(document.imports.len(), 1);
        let base_show = &document.classes["Base"].methods["show"];
        let rendered = format!("{:?}", base_show.body);
        assert!(rendered.contains("host"));
        let main = format!("{:?}", document.functions["main"].body);
        assert!(main.contains("host main"));
    }

    #[test]
    fn missing_include_is_not_fatal() {
        let document = load(indoc! {r#"
            includes:
              - nowhere/missing.hpl
            main: () => { echo 1 }
        "#});
        assert!(document.functions.contains_key("main"));
    }
}
