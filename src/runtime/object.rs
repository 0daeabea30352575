use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Statement;
use crate::runtime::value::Value;

/// A function body with its parameter names. Functions are not values; they
/// live in a class's method map, the document's top-level function map, or a
/// module's function registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

impl Function {
    pub fn new(params: Vec<String>, body: Vec<Statement>) -> Self {
        Self { params, body }
    }
}

#[derive(Debug)]
pub struct HplClass {
    pub name: String,
    pub parent: Option<String>,
    pub methods: HashMap<String, Rc<Function>>,
}

impl HplClass {
    pub fn new(name: String, parent: Option<String>, methods: HashMap<String, Rc<Function>>) -> Self {
        Self {
            name,
            parent,
            methods,
        }
    }

    pub fn method(&self, name: &str) -> Option<Rc<Function>> {
        self.methods.get(name).cloned()
    }
}

/// An object instance. Attributes are duck-typed: created on first
/// assignment, overwritable, never removed.
#[derive(Debug)]
pub struct HplObject {
    pub name: String,
    pub class: Rc<HplClass>,
    pub attributes: HashMap<String, Value>,
}

impl HplObject {
    pub fn new(name: String, class: Rc<HplClass>) -> Self {
        Self {
            name,
            class,
            attributes: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }
}
