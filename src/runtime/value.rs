use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::modules::Module;
use crate::runtime::object::HplObject;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<HplObject>>;

/// Runtime value model. Arrays and objects are shared heap handles; copying
/// a `Value` copies the handle, so aliasing behaves the way scripts expect.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Array(ArrayRef),
    Object(ObjectRef),
    Module(Rc<Module>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Object graphs can be cyclic; never recurse into them here.
        match self {
            Value::Int(value) => write!(f, "Int({value})"),
            Value::Float(value) => write!(f, "Float({value})"),
            Value::Str(value) => write!(f, "Str({value:?})"),
            Value::Bool(value) => write!(f, "Bool({value})"),
            Value::Null => write!(f, "Null"),
            Value::Array(values) => write!(f, "Array(len={})", values.borrow().len()),
            Value::Object(object) => write!(f, "Object({})", object.borrow().class_name()),
            Value::Module(module) => write!(f, "Module({})", module.name()),
        }
    }
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn object(object: HplObject) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    /// Type name as surfaced by `type()` and error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Null => "null".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(object) => object.borrow().class_name().to_string(),
            Value::Module(_) => "module".to_string(),
        }
    }

    /// The uniform display rule used by `echo`, `str()`, and string
    /// concatenation.
    pub fn to_display(&self) -> String {
        match self {
            Value::Int(value) => value.to_string(),
            Value::Float(value) => format_float(*value),
            Value::Str(value) => value.clone(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Null => "null".to_string(),
            Value::Array(values) => {
                let rendered = values
                    .borrow()
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{rendered}]")
            }
            Value::Object(object) => format!("<{} object>", object.borrow().class_name()),
            Value::Module(module) => format!("<module {}>", module.name()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view for mixed int/float arithmetic and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Equality as observed by `==` / `!=`: numeric across int and float,
    /// structural for arrays, identity for objects and modules, and `false`
    /// for mismatched kinds.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (left, right) => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Whole floats keep a trailing `.0` so int/float provenance stays visible
/// in echo output.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
