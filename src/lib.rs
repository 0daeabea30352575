//! `hpl` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the AST (`ast`) for one
//!   arrow-function body; `document` handles the YAML outer form, includes,
//!   and the call directive
//! - runtime data model: `runtime` (values, objects, errors)
//! - execution: `evaluator` (tree-walk) over `modules` (stdlib + loader)
//! - `diagnostics` carries the failure snapshot the debug entry renders
pub mod ast;
pub(crate) mod builtins;
pub mod diagnostics;
pub mod document;
pub mod evaluator;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod runtime;
pub mod token;
