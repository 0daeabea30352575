//! Tree-walking evaluator.
//!
//! Execution pipeline:
//! run -> document imports -> object construction -> call dispatch
//! -> exec_block -> exec_statement -> eval_expression, which recurses back
//! through function and method calls.
//!
//! Control flow travels as a `Flow` completion value returned from every
//! statement entry point; runtime errors travel separately as `Result`, so
//! `try` can catch errors while being structurally unable to catch
//! return/break/continue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{AssignTarget, BinaryOperator, Expression, Statement, UnaryOperator};
use crate::builtins::Builtin;
use crate::diagnostics::FailureSnapshot;
use crate::document::{CallArg, CallDirective, Document, ImportEntry, ObjectDecl};
use crate::modules::{Module, ModuleLoader, ScriptProgram};
use crate::runtime::error::RuntimeError;
use crate::runtime::object::{Function, HplClass, HplObject};
use crate::runtime::value::{ObjectRef, Value};

mod console;
mod scope;

pub use console::{BufferedConsole, Console, StdConsole};
use scope::LocalScope;

/// Completion of a statement or block.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Evaluator {
    classes: HashMap<String, Rc<HplClass>>,
    functions: HashMap<String, Rc<Function>>,
    globals: HashMap<String, Value>,
    objects: Vec<ObjectDecl>,
    imports: Vec<ImportEntry>,
    call: Option<CallDirective>,
    loader: Rc<RefCell<ModuleLoader>>,
    console: Box<dyn Console>,
    current_obj: Option<ObjectRef>,
    call_stack: Vec<String>,
    failure: Option<FailureSnapshot>,
}

impl Evaluator {
    pub fn new(
        document: Document,
        loader: Rc<RefCell<ModuleLoader>>,
        console: Box<dyn Console>,
    ) -> Self {
        Self {
            classes: document.classes,
            functions: document.functions,
            globals: HashMap::new(),
            objects: document.objects,
            imports: document.imports,
            call: document.call,
            loader,
            console,
            current_obj: None,
            call_stack: Vec::new(),
            failure: None,
        }
    }

    /// Run the document: top-level imports, declared-object construction,
    /// then the call directive (or `main`, or nothing).
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let result = self.run_program();
        if let Err(error) = &result {
            self.note_failure(error, &LocalScope::new());
        }
        result
    }

    /// Snapshot captured at the innermost frame of the first error, if the
    /// last run failed.
    pub fn failure(&self) -> Option<&FailureSnapshot> {
        self.failure.as_ref()
    }

    fn run_program(&mut self) -> Result<(), RuntimeError> {
        self.process_document_imports()?;
        self.construct_declared_objects()?;

        let Some(directive) = self.call.take() else {
            if let Some(main) = self.functions.get("main").cloned() {
                self.run_function(&main, LocalScope::new(), "main()".to_string())?;
            }
            return Ok(());
        };

        let function = self.functions.get(&directive.name).cloned().ok_or_else(|| {
            RuntimeError::UndefinedFunction {
                name: directive.name.clone(),
            }
        })?;
        let mut args = Vec::with_capacity(directive.args.len());
        for arg in &directive.args {
            args.push(self.resolve_call_arg(arg)?);
        }
        let locals = bind_parameters(&function.params, args);
        self.run_function(&function, locals, format!("{}()", directive.name))?;
        Ok(())
    }

    fn resolve_call_arg(&self, arg: &CallArg) -> Result<Value, RuntimeError> {
        match arg {
            CallArg::Int(value) => Ok(Value::Int(*value)),
            CallArg::Float(value) => Ok(Value::Float(*value)),
            CallArg::Str(value) => Ok(Value::Str(value.clone())),
            CallArg::Ident(name) => {
                self.globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })
            }
        }
    }

    fn process_document_imports(&mut self) -> Result<(), RuntimeError> {
        for entry in std::mem::take(&mut self.imports) {
            self.import_module(&entry.module, entry.alias.as_deref())?;
        }
        Ok(())
    }

    fn import_module(&mut self, module: &str, alias: Option<&str>) -> Result<(), RuntimeError> {
        let loaded = ModuleLoader::load(&self.loader, module)?;
        self.globals
            .insert(alias.unwrap_or(module).to_string(), Value::Module(loaded));
        Ok(())
    }

    /// Declared objects are created first (so init bodies can see every
    /// sibling), then their zero-argument `init` methods run in declaration
    /// order.
    fn construct_declared_objects(&mut self) -> Result<(), RuntimeError> {
        let declarations = std::mem::take(&mut self.objects);
        let mut created = Vec::with_capacity(declarations.len());
        for declaration in &declarations {
            let class = self.classes.get(&declaration.class).cloned().ok_or_else(|| {
                RuntimeError::ClassNotFound {
                    name: declaration.class.clone(),
                }
            })?;
            let object = Rc::new(RefCell::new(HplObject::new(declaration.name.clone(), class)));
            self.globals
                .insert(declaration.name.clone(), Value::Object(object.clone()));
            created.push(object);
        }
        for object in created {
            let class = object.borrow().class.clone();
            if self.find_method(&class, "init").is_some() {
                self.invoke_method(object, "init", Vec::new())?;
            }
        }
        Ok(())
    }

    /// Wrap a loaded script document as a module: imports and objects are
    /// processed once, top-level functions become the function registry,
    /// and globals (objects plus imported modules) become constants.
    pub(crate) fn load_script_module(
        document: Document,
        name: &str,
        loader: Rc<RefCell<ModuleLoader>>,
    ) -> Result<Rc<Module>, RuntimeError> {
        let mut evaluator = Evaluator::new(document, loader.clone(), Box::new(StdConsole));
        evaluator
            .process_document_imports()
            .and_then(|_| evaluator.construct_declared_objects())
            .map_err(|error| RuntimeError::ImportFailed {
                module: name.to_string(),
                reason: error.to_string(),
            })?;

        let program = Rc::new(ScriptProgram {
            classes: evaluator.classes,
            functions: evaluator.functions,
            globals: evaluator.globals,
            loader,
        });
        let mut module = Module::new(name, format!("HPL module: {name}"));
        for (function_name, function) in &program.functions {
            module.register_script_function(function_name.clone(), function.clone(), program.clone());
        }
        for (constant_name, value) in &program.globals {
            module.register_constant(constant_name.clone(), value.clone());
        }
        Ok(Rc::new(module))
    }

    /// Execute one script-module function in a fresh evaluator over the
    /// module's shared definitions.
    pub(crate) fn call_module_function(
        program: &Rc<ScriptProgram>,
        function: &Rc<Function>,
        args: Vec<Value>,
        module_name: &str,
        function_name: &str,
    ) -> Result<Value, RuntimeError> {
        let mut evaluator = Evaluator {
            classes: program.classes.clone(),
            functions: program.functions.clone(),
            globals: program.globals.clone(),
            objects: Vec::new(),
            imports: Vec::new(),
            call: None,
            loader: program.loader.clone(),
            console: Box::new(StdConsole),
            current_obj: None,
            call_stack: Vec::new(),
            failure: None,
        };
        let locals = bind_parameters(&function.params, args);
        evaluator.run_function(function, locals, format!("{module_name}.{function_name}()"))
    }

    fn note_failure(&mut self, error: &RuntimeError, locals: &LocalScope) {
        if self.failure.is_none() {
            self.failure = Some(FailureSnapshot::capture(
                error.to_string(),
                &self.call_stack,
                locals,
                &self.globals,
            ));
        }
    }

    fn find_method(&self, class: &Rc<HplClass>, name: &str) -> Option<Rc<Function>> {
        let mut current = class.clone();
        loop {
            if let Some(method) = current.method(name) {
                return Some(method);
            }
            let parent = current.parent.clone()?;
            current = self.classes.get(&parent)?.clone();
        }
    }

    /// Method dispatch: walk the parent chain for the method, bind `this`
    /// and positional arguments, and restore `this` and the call stack on
    /// every exit path.
    fn invoke_method(
        &mut self,
        receiver: ObjectRef,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let class = receiver.borrow().class.clone();
        let Some(function) = self.find_method(&class, method) else {
            return Err(RuntimeError::MethodNotFound {
                method: method.to_string(),
                class: class.name.clone(),
            });
        };

        let mut locals = bind_parameters(&function.params, args);
        locals.insert("this".to_string(), Value::Object(receiver.clone()));
        let frame = format!("{}.{method}()", class.name);

        let previous = self.current_obj.replace(receiver);
        let result = self.run_function(&function, locals, frame);
        self.current_obj = previous;
        result
    }

    fn run_function(
        &mut self,
        function: &Function,
        mut locals: LocalScope,
        frame: String,
    ) -> Result<Value, RuntimeError> {
        self.call_stack.push(frame);
        let result = self.exec_function_body(function, &mut locals);
        if let Err(error) = &result {
            self.note_failure(error, &locals);
        }
        self.call_stack.pop();
        result
    }

    fn exec_function_body(
        &mut self,
        function: &Function,
        locals: &mut LocalScope,
    ) -> Result<Value, RuntimeError> {
        match self.exec_block(&function.body, locals)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
            Flow::Break => Err(RuntimeError::BreakOutsideLoop),
            Flow::Continue => Err(RuntimeError::ContinueOutsideLoop),
        }
    }

    fn exec_block(
        &mut self,
        body: &[Statement],
        locals: &mut LocalScope,
    ) -> Result<Flow, RuntimeError> {
        for statement in body {
            match self.exec_statement(statement, locals)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(
        &mut self,
        statement: &Statement,
        locals: &mut LocalScope,
    ) -> Result<Flow, RuntimeError> {
        match statement {
            Statement::Assign { target, value } => {
                let value = self.eval_expression(value, locals)?;
                match target {
                    AssignTarget::Name(name) => {
                        scope::store(locals, &mut self.globals, name, value);
                    }
                    AssignTarget::Property { receiver, name } => {
                        let receiver = self.eval_expression(receiver, locals)?;
                        let Value::Object(object) = &receiver else {
                            return Err(RuntimeError::PropertyAssignmentOnNonObject {
                                type_name: receiver.type_name(),
                            });
                        };
                        object.borrow_mut().attributes.insert(name.clone(), value);
                    }
                    AssignTarget::Index { array, index } => {
                        let array = self.eval_expression(array, locals)?;
                        let index = self.eval_expression(index, locals)?;
                        self.set_index(array, index, value)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expression) => self.eval_expression(expression, locals)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::Increment { name } => {
                self.increment_variable(name, locals)?;
                Ok(Flow::Normal)
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.eval_expression(condition, locals)?;
                if self.expect_condition(condition)? {
                    self.exec_block(then_body, locals)
                } else {
                    self.exec_block(else_body, locals)
                }
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                // init and step run in the enclosing scope; there is no
                // per-iteration scope.
                self.exec_statement(init, locals)?;
                loop {
                    let condition = self.eval_expression(condition, locals)?;
                    if !self.expect_condition(condition)? {
                        break;
                    }
                    match self.exec_block(body, locals)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.exec_statement(step, locals)?;
                }
                Ok(Flow::Normal)
            }
            Statement::While { condition, body } => {
                loop {
                    let condition = self.eval_expression(condition, locals)?;
                    if !self.expect_condition(condition)? {
                        break;
                    }
                    match self.exec_block(body, locals)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::TryCatch {
                try_body,
                error_name,
                catch_body,
                finally_body,
            } => {
                let outcome = match self.exec_block(try_body, locals) {
                    Ok(flow) => Ok(flow),
                    Err(error) => {
                        // The catch variable binds the error's message.
                        locals.insert(error_name.clone(), Value::Str(error.to_string()));
                        self.exec_block(catch_body, locals)
                    }
                };
                if let Some(finally_body) = finally_body {
                    match self.exec_block(finally_body, locals)? {
                        Flow::Normal => {}
                        // A signal raised by finally wins over the try result.
                        other => return Ok(other),
                    }
                }
                outcome
            }
            Statement::Echo(expression) => {
                let value = self.eval_expression(expression, locals)?;
                self.console.print_line(&value.to_display());
                Ok(Flow::Normal)
            }
            Statement::Throw(expression) => {
                let value = self.eval_expression(expression, locals)?;
                Err(RuntimeError::User {
                    message: value.to_display(),
                })
            }
            Statement::Import { module, alias } => {
                self.import_module(module, alias.as_deref())?;
                Ok(Flow::Normal)
            }
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
            Statement::Expr(expression) => {
                self.eval_expression(expression, locals)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_expression(
        &mut self,
        expression: &Expression,
        locals: &mut LocalScope,
    ) -> Result<Value, RuntimeError> {
        match expression {
            Expression::Int(value) => Ok(Value::Int(*value)),
            Expression::Float(value) => Ok(Value::Float(*value)),
            Expression::Str(value) => Ok(Value::Str(value.clone())),
            Expression::Bool(value) => Ok(Value::Bool(*value)),
            Expression::Null => Ok(Value::Null),
            Expression::Variable(name) => {
                if let Some(value) = scope::lookup(locals, &self.globals, name) {
                    return Ok(value);
                }
                if name == "this" {
                    // Bound in method locals; the evaluator-level receiver
                    // covers lookups from nested helper scopes.
                    if let Some(receiver) = &self.current_obj {
                        return Ok(Value::Object(receiver.clone()));
                    }
                    return Err(RuntimeError::ThisOutsideMethod);
                }
                Err(RuntimeError::UndefinedVariable { name: name.clone() })
            }
            Expression::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => {
                    let left = self.eval_expression(left, locals)?;
                    if !self.expect_logical_operand("&&", left)? {
                        return Ok(Value::Bool(false));
                    }
                    let right = self.eval_expression(right, locals)?;
                    Ok(Value::Bool(self.expect_logical_operand("&&", right)?))
                }
                BinaryOperator::Or => {
                    let left = self.eval_expression(left, locals)?;
                    if self.expect_logical_operand("||", left)? {
                        return Ok(Value::Bool(true));
                    }
                    let right = self.eval_expression(right, locals)?;
                    Ok(Value::Bool(self.expect_logical_operand("||", right)?))
                }
                _ => {
                    let left = self.eval_expression(left, locals)?;
                    let right = self.eval_expression(right, locals)?;
                    self.apply_binary(left, *op, right)
                }
            },
            Expression::UnaryOp { op, operand } => {
                let operand = self.eval_expression(operand, locals)?;
                match op {
                    UnaryOperator::Not => match operand {
                        Value::Bool(value) => Ok(Value::Bool(!value)),
                        other => Err(RuntimeError::NonBooleanOperand {
                            op: "!".to_string(),
                            type_name: other.type_name(),
                        }),
                    },
                }
            }
            Expression::PostfixIncrement { name } => self.increment_variable(name, locals),
            Expression::ArrayLiteral(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, locals)?);
                }
                Ok(Value::array(values))
            }
            Expression::Index { array, index } => {
                let array = self.eval_expression(array, locals)?;
                let index = self.eval_expression(index, locals)?;
                self.get_index(array, index)
            }
            Expression::FunctionCall { name, args } => {
                if self.classes.contains_key(name) {
                    let values = self.eval_args(args, locals)?;
                    return self.instantiate(name, values);
                }
                if let Some(builtin) = Builtin::from_name(name) {
                    let values = self.eval_args(args, locals)?;
                    return self.call_builtin(builtin, values);
                }
                if let Some(function) = self.functions.get(name).cloned() {
                    let values = self.eval_args(args, locals)?;
                    let bound = bind_parameters(&function.params, values);
                    return self.run_function(&function, bound, format!("{name}()"));
                }
                Err(RuntimeError::UndefinedFunction { name: name.clone() })
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval_expression(receiver, locals)?;
                match receiver {
                    Value::Object(object) => {
                        let values = self.eval_args(args, locals)?;
                        self.invoke_method(object, method, values)
                    }
                    Value::Module(module) => {
                        let values = self.eval_args(args, locals)?;
                        // Zero-argument calls fall back to constants so
                        // `m.pi()` and `m.pi` agree.
                        if values.is_empty() {
                            if let Some(constant) = module.constant(method) {
                                return Ok(constant);
                            }
                        }
                        module.call_function(method, values)
                    }
                    other => Err(RuntimeError::MethodCallOnNonObject {
                        method: method.clone(),
                        type_name: other.type_name(),
                    }),
                }
            }
            Expression::PropertyAccess { receiver, name } => {
                let receiver = self.eval_expression(receiver, locals)?;
                match receiver {
                    Value::Object(object) => {
                        let object = object.borrow();
                        object.attributes.get(name).cloned().ok_or_else(|| {
                            RuntimeError::PropertyNotFound {
                                property: name.clone(),
                                object: object.name.clone(),
                            }
                        })
                    }
                    Value::Module(module) => {
                        if let Some(constant) = module.constant(name) {
                            Ok(constant)
                        } else if module.has_function(name) {
                            // Functions are not values; they can only be
                            // called.
                            Err(RuntimeError::BareModuleFunction {
                                module: module.name().to_string(),
                                name: name.clone(),
                            })
                        } else {
                            Err(RuntimeError::ModuleMemberNotFound {
                                module: module.name().to_string(),
                                name: name.clone(),
                            })
                        }
                    }
                    other => Err(RuntimeError::PropertyAccessOnNonObject {
                        property: name.clone(),
                        type_name: other.type_name(),
                    }),
                }
            }
        }
    }

    fn eval_args(
        &mut self,
        args: &[Expression],
        locals: &mut LocalScope,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg, locals)?);
        }
        Ok(values)
    }

    fn instantiate(&mut self, class_name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let class = self.classes.get(class_name).cloned().ok_or_else(|| {
            RuntimeError::ClassNotFound {
                name: class_name.to_string(),
            }
        })?;
        let object = Rc::new(RefCell::new(HplObject::new(
            class_name.to_string(),
            class.clone(),
        )));
        if self.find_method(&class, "init").is_some() {
            self.invoke_method(object.clone(), "init", args)?;
        }
        Ok(Value::Object(object))
    }

    fn increment_variable(
        &mut self,
        name: &str,
        locals: &mut LocalScope,
    ) -> Result<Value, RuntimeError> {
        let Some(value) = scope::lookup(locals, &self.globals, name) else {
            return Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            });
        };
        let next = match &value {
            Value::Int(v) => Value::Int(v + 1),
            Value::Float(v) => Value::Float(v + 1.0),
            other => {
                return Err(RuntimeError::IncrementOnNonNumeric {
                    type_name: other.type_name(),
                });
            }
        };
        scope::store(locals, &mut self.globals, name, next);
        Ok(value)
    }

    fn expect_condition(&self, value: Value) -> Result<bool, RuntimeError> {
        match value {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::NonBooleanCondition {
                type_name: other.type_name(),
            }),
        }
    }

    fn expect_logical_operand(&self, op: &str, value: Value) -> Result<bool, RuntimeError> {
        match value {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::NonBooleanOperand {
                op: op.to_string(),
                type_name: other.type_name(),
            }),
        }
    }

    fn apply_binary(
        &self,
        left: Value,
        op: BinaryOperator,
        right: Value,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinaryOperator::Add => self.add_values(left, right),
            BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => {
                self.arithmetic(left, op, right)
            }
            BinaryOperator::Eq => Ok(Value::Bool(left.loose_eq(&right))),
            BinaryOperator::NotEq => Ok(Value::Bool(!left.loose_eq(&right))),
            BinaryOperator::Less
            | BinaryOperator::LessEq
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEq => self.compare(left, op, right),
            BinaryOperator::And | BinaryOperator::Or => {
                unreachable!("logical operators short-circuit in eval_expression")
            }
        }
    }

    /// `+` is numeric addition for two numbers and display-string
    /// concatenation for every other combination.
    fn add_values(&self, left: Value, right: Value) -> Result<Value, RuntimeError> {
        if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
            return Ok(Value::Int(a + b));
        }
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            return Ok(Value::Float(a + b));
        }
        Ok(Value::Str(format!(
            "{}{}",
            left.to_display(),
            right.to_display()
        )))
    }

    fn arithmetic(
        &self,
        left: Value,
        op: BinaryOperator,
        right: Value,
    ) -> Result<Value, RuntimeError> {
        self.expect_numeric(op, &left)?;
        self.expect_numeric(op, &right)?;

        if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
            return match op {
                BinaryOperator::Sub => Ok(Value::Int(a - b)),
                BinaryOperator::Mul => Ok(Value::Int(a * b)),
                BinaryOperator::Div if *b == 0 => Err(RuntimeError::DivisionByZero),
                // Integer division truncates toward zero.
                BinaryOperator::Div => Ok(Value::Int(a / b)),
                BinaryOperator::Mod if *b == 0 => Err(RuntimeError::ModuloByZero),
                BinaryOperator::Mod => Ok(Value::Int(a % b)),
                _ => unreachable!("arithmetic called with non-arithmetic operator"),
            };
        }

        let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
            unreachable!("operands checked numeric above");
        };
        match op {
            BinaryOperator::Sub => Ok(Value::Float(a - b)),
            BinaryOperator::Mul => Ok(Value::Float(a * b)),
            BinaryOperator::Div if b == 0.0 => Err(RuntimeError::DivisionByZero),
            BinaryOperator::Div => Ok(Value::Float(a / b)),
            BinaryOperator::Mod if b == 0.0 => Err(RuntimeError::ModuloByZero),
            BinaryOperator::Mod => Ok(Value::Float(a % b)),
            _ => unreachable!("arithmetic called with non-arithmetic operator"),
        }
    }

    fn expect_numeric(&self, op: BinaryOperator, value: &Value) -> Result<(), RuntimeError> {
        if value.is_numeric() {
            Ok(())
        } else {
            Err(RuntimeError::NonNumericOperand {
                op: op.symbol().to_string(),
                type_name: value.type_name(),
            })
        }
    }

    fn compare(
        &self,
        left: Value,
        op: BinaryOperator,
        right: Value,
    ) -> Result<Value, RuntimeError> {
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            return Ok(Value::Bool(match op {
                BinaryOperator::Less => a < b,
                BinaryOperator::LessEq => a <= b,
                BinaryOperator::Greater => a > b,
                BinaryOperator::GreaterEq => a >= b,
                _ => unreachable!("compare called with non-comparison operator"),
            }));
        }
        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            return Ok(Value::Bool(match op {
                BinaryOperator::Less => a < b,
                BinaryOperator::LessEq => a <= b,
                BinaryOperator::Greater => a > b,
                BinaryOperator::GreaterEq => a >= b,
                _ => unreachable!("compare called with non-comparison operator"),
            }));
        }
        Err(RuntimeError::IncomparableTypes {
            left: left.type_name(),
            right: right.type_name(),
        })
    }

    fn get_index(&self, target: Value, index: Value) -> Result<Value, RuntimeError> {
        match target {
            Value::Array(values) => {
                let values = values.borrow();
                let index = self.expect_index(index, values.len())?;
                Ok(values[index].clone())
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let index = self.expect_index(index, chars.len())?;
                Ok(Value::Str(chars[index].to_string()))
            }
            other => Err(RuntimeError::NotIndexable {
                type_name: other.type_name(),
            }),
        }
    }

    fn set_index(&self, target: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
        let Value::Array(values) = &target else {
            return Err(RuntimeError::NotIndexable {
                type_name: target.type_name(),
            });
        };
        let mut values = values.borrow_mut();
        let index = self.expect_index(index, values.len())?;
        values[index] = value;
        Ok(())
    }

    fn expect_index(&self, index: Value, len: usize) -> Result<usize, RuntimeError> {
        let index = match index {
            Value::Int(index) => index,
            other => {
                return Err(RuntimeError::NonIntegerIndex {
                    type_name: other.type_name(),
                });
            }
        };
        if index < 0 || index as usize >= len {
            return Err(RuntimeError::IndexOutOfBounds { index, len });
        }
        Ok(index as usize)
    }

    fn expect_builtin_arity(
        &self,
        builtin: Builtin,
        expected: usize,
        found: usize,
    ) -> Result<(), RuntimeError> {
        if found != expected {
            return Err(RuntimeError::BuiltinArityMismatch {
                builtin: builtin.name().to_string(),
                expected: expected.to_string(),
                found,
            });
        }
        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match builtin {
            Builtin::Echo => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                self.console.print_line(&args[0].to_display());
                Ok(Value::Null)
            }
            Builtin::Len => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                match &args[0] {
                    Value::Array(values) => Ok(Value::Int(values.borrow().len() as i64)),
                    Value::Str(text) => Ok(Value::Int(text.chars().count() as i64)),
                    other => Err(RuntimeError::BuiltinTypeMismatch {
                        builtin: "len".to_string(),
                        expected: "array or string".to_string(),
                        type_name: other.type_name(),
                    }),
                }
            }
            Builtin::Int => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                match &args[0] {
                    Value::Int(value) => Ok(Value::Int(*value)),
                    Value::Float(value) => Ok(Value::Int(*value as i64)),
                    Value::Bool(value) => Ok(Value::Int(i64::from(*value))),
                    Value::Str(text) => {
                        text.trim()
                            .parse::<i64>()
                            .map(Value::Int)
                            .map_err(|_| self.conversion_failed(&args[0], "int"))
                    }
                    _ => Err(self.conversion_failed(&args[0], "int")),
                }
            }
            Builtin::Float => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                match &args[0] {
                    Value::Int(value) => Ok(Value::Float(*value as f64)),
                    Value::Float(value) => Ok(Value::Float(*value)),
                    Value::Bool(value) => Ok(Value::Float(f64::from(u8::from(*value)))),
                    Value::Str(text) => {
                        text.trim()
                            .parse::<f64>()
                            .map(Value::Float)
                            .map_err(|_| self.conversion_failed(&args[0], "float"))
                    }
                    _ => Err(self.conversion_failed(&args[0], "float")),
                }
            }
            Builtin::Str => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                Ok(Value::Str(args[0].to_display()))
            }
            Builtin::Type => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                Ok(Value::Str(args[0].type_name()))
            }
            Builtin::Abs => {
                self.expect_builtin_arity(builtin, 1, args.len())?;
                match &args[0] {
                    Value::Int(value) => Ok(Value::Int(value.abs())),
                    Value::Float(value) => Ok(Value::Float(value.abs())),
                    other => Err(RuntimeError::BuiltinTypeMismatch {
                        builtin: "abs".to_string(),
                        expected: "number".to_string(),
                        type_name: other.type_name(),
                    }),
                }
            }
            Builtin::Max => self.fold_extremum("max", args, |a, b| a > b),
            Builtin::Min => self.fold_extremum("min", args, |a, b| a < b),
            Builtin::Range => self.build_range(args),
            Builtin::Input => {
                if args.len() > 1 {
                    return Err(RuntimeError::BuiltinArityMismatch {
                        builtin: "input".to_string(),
                        expected: "0 or 1".to_string(),
                        found: args.len(),
                    });
                }
                let prompt = match args.first() {
                    Some(Value::Str(prompt)) => Some(prompt.clone()),
                    Some(other) => {
                        return Err(RuntimeError::BuiltinTypeMismatch {
                            builtin: "input".to_string(),
                            expected: "string prompt".to_string(),
                            type_name: other.type_name(),
                        });
                    }
                    None => None,
                };
                let line = self.console.read_line(prompt.as_deref())?;
                Ok(Value::Str(line))
            }
        }
    }

    fn fold_extremum(
        &self,
        builtin: &str,
        args: Vec<Value>,
        keep_left: fn(f64, f64) -> bool,
    ) -> Result<Value, RuntimeError> {
        if args.is_empty() {
            return Err(RuntimeError::BuiltinArityMismatch {
                builtin: builtin.to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            });
        }
        let mut best: Option<(f64, &Value)> = None;
        for value in &args {
            let Some(numeric) = value.as_f64() else {
                return Err(RuntimeError::BuiltinTypeMismatch {
                    builtin: builtin.to_string(),
                    expected: "numbers".to_string(),
                    type_name: value.type_name(),
                });
            };
            best = match best {
                Some((current, _)) if !keep_left(numeric, current) => best,
                _ => Some((numeric, value)),
            };
        }
        let (_, value) = best.unwrap_or((0.0, &args[0]));
        Ok(value.clone())
    }

    fn build_range(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if args.is_empty() || args.len() > 3 {
            return Err(RuntimeError::BuiltinArityMismatch {
                builtin: "range".to_string(),
                expected: "1 to 3".to_string(),
                found: args.len(),
            });
        }
        let mut bounds = Vec::with_capacity(args.len());
        for value in &args {
            let Value::Int(bound) = value else {
                return Err(RuntimeError::BuiltinTypeMismatch {
                    builtin: "range".to_string(),
                    expected: "int".to_string(),
                    type_name: value.type_name(),
                });
            };
            bounds.push(*bound);
        }
        let (start, stop, step) = match bounds.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => unreachable!("range arity checked above"),
        };
        if step == 0 {
            return Err(RuntimeError::ZeroRangeStep);
        }

        let mut values = Vec::new();
        let mut current = start;
        while (step > 0 && current < stop) || (step < 0 && current > stop) {
            values.push(Value::Int(current));
            current += step;
        }
        Ok(Value::array(values))
    }

    fn conversion_failed(&self, value: &Value, target: &str) -> RuntimeError {
        RuntimeError::ConversionFailed {
            type_name: value.type_name(),
            value: value.to_display(),
            target: target.to_string(),
        }
    }
}

/// Positional binding for user functions and methods: extra arguments are
/// ignored, missing parameters become null.
fn bind_parameters(params: &[String], args: Vec<Value>) -> LocalScope {
    let mut locals = LocalScope::new();
    let mut args = args.into_iter();
    for param in params {
        locals.insert(param.clone(), args.next().unwrap_or(Value::Null));
    }
    locals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use indoc::indoc;

    fn try_run(source: &str) -> (Result<(), RuntimeError>, String, Option<FailureSnapshot>) {
        let document = document::load_str(source, None, &[]).expect("document should load");
        let console = BufferedConsole::new();
        let mut evaluator = Evaluator::new(
            document,
            ModuleLoader::shared(),
            Box::new(console.clone()),
        );
        let result = evaluator.run();
        (result, console.output(), evaluator.failure().cloned())
    }

    fn run(source: &str) -> String {
        let (result, output, _) = try_run(source);
        result.expect("program should run");
        output
    }

    fn run_err(source: &str) -> RuntimeError {
        let (result, _, _) = try_run(source);
        result.expect_err("expected runtime failure")
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let output = run(indoc! {"
            main: () => { echo 1 + 2 * 3 }
            call: main()
        "});
        assert_eq!(output, "7");
    }

    #[test]
    fn dispatches_method_calls_on_declared_objects() {
        let output = run(indoc! {r#"
            classes:
              C:
                greet: (n) => { return "Hi " + n }
            objects:
              c: C()
            main: () => { echo c.greet("Ada") }
            call: main()
        "#});
        assert_eq!(output, "Hi Ada");
    }

    #[test]
    fn call_directive_binds_positional_arguments() {
        let output = run(indoc! {r#"
            add: (a, b) => {
              echo "Adding " + a + " + " + b + " = " + (a + b)
              return a + b
            }
            call: add(5, 3)
        "#});
        assert_eq!(output, "Adding 5 + 3 = 8");
    }

    #[test]
    fn while_loop_honors_break_and_continue() {
        let output = run(indoc! {"
            main: () => {
              i = 0
              sum = 0
              while (i < 10) : {
                i++
                if (i == 3): continue
                if (i == 7): break
                sum = sum + i
              }
              echo sum
            }
            call: main()
        "});
        assert_eq!(output, "18");
    }

    #[test]
    fn inherited_methods_resolve_through_the_parent_chain() {
        let output = run(indoc! {r#"
            classes:
              BasePrinter:
                print: (s) => { echo s }
              MessagePrinter:
                parent: BasePrinter
                show: () => { this.print("Hello") }
            objects:
              printer: MessagePrinter()
            main: () => { printer.show() }
            call: main()
        "#});
        assert_eq!(output, "Hello");
    }

    #[test]
    fn try_catch_binds_the_error_message() {
        let output = run(indoc! {r#"
            main: () => {
              try : {
                x = 10 / 0
              } catch (e) : {
                echo "caught: " + e
              }
            }
            call: main()
        "#});
        assert_eq!(output, "caught: Division by zero");
    }

    #[test]
    fn property_chains_resolve_to_any_depth() {
        let output = run(indoc! {"
            classes:
              Inner:
                init: () => { this.c = 42 }
              Outer:
                init: () => { this.b = Inner() }
            objects:
              a: Outer()
            main: () => { echo a.b.c }
            call: main()
        "});
        assert_eq!(output, "42");
    }

    #[test]
    fn logical_operators_short_circuit() {
        let output = run(indoc! {r#"
            probe: () => {
              echo "probe"
              return true
            }
            main: () => {
              if (false && probe()) : { echo "and" }
              if (true || probe()) : { echo "or" }
            }
            call: main()
        "#});
        assert_eq!(output, "or");
    }

    #[test]
    fn logical_operators_do_not_coerce() {
        let err = run_err(indoc! {"
            main: () => { echo 1 && true }
            call: main()
        "});
        assert!(matches!(err, RuntimeError::NonBooleanOperand { .. }));
    }

    #[test]
    fn missing_arguments_become_null_and_extras_are_ignored() {
        let output = run(indoc! {"
            f: (a, b) => { echo b }
            main: () => {
              f(1)
              f(1, 2, 3)
            }
            call: main()
        "});
        assert_eq!(output, "null\n2");
    }

    #[test]
    fn locals_never_leak_into_the_caller() {
        let err = run_err(indoc! {"
            f: () => { x = 1 }
            main: () => {
              f()
              echo x
            }
            call: main()
        "});
        assert_eq!(
            err,
            RuntimeError::UndefinedVariable {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn attribute_writes_are_visible_after_return() {
        let output = run(indoc! {"
            classes:
              Box:
                fill: () => { this.v = 9 }
            objects:
              b: Box()
            main: () => {
              b.fill()
              echo b.v
            }
            call: main()
        "});
        assert_eq!(output, "9");
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let output = run(indoc! {"
            main: () => {
              echo 7 / 2
              echo -7 / 2
              echo 7 % 2
              echo (7 / 2) * 2 + 7 % 2
            }
            call: main()
        "});
        assert_eq!(output, "3\n-3\n1\n7");
    }

    #[test]
    fn mixed_int_float_arithmetic_promotes_to_float() {
        let output = run(indoc! {"
            main: () => {
              echo 1 + 0.5
              echo 4 * 0.5
            }
            call: main()
        "});
        assert_eq!(output, "1.5\n2.0");
    }

    #[test]
    fn plus_concatenates_display_strings_for_non_numeric_operands() {
        let output = run(indoc! {r#"
            main: () => {
              echo "" + true
              echo "" + null
              echo "" + [1, 2]
            }
            call: main()
        "#});
        assert_eq!(output, "true\nnull\n[1, 2]");
    }

    #[test]
    fn null_in_arithmetic_and_ordering_is_an_error() {
        let err = run_err("main: () => { echo null - 1 }\ncall: main()\n");
        assert!(matches!(err, RuntimeError::NonNumericOperand { .. }));

        let err = run_err("main: () => { echo null < 1 }\ncall: main()\n");
        assert!(matches!(err, RuntimeError::IncomparableTypes { .. }));
    }

    #[test]
    fn this_is_restored_after_nested_method_calls() {
        let output = run(indoc! {r#"
            classes:
              A:
                touch: (other) => {
                  other.poke()
                  this.tag = "a"
                }
              B:
                poke: () => { this.tag = "b" }
            objects:
              a: A()
              b: B()
            main: () => {
              a.touch(b)
              echo a.tag
              echo b.tag
            }
            call: main()
        "#});
        assert_eq!(output, "a\nb");
    }

    #[test]
    fn failure_snapshot_captures_the_innermost_chain() {
        let (result, _, failure) = try_run(indoc! {"
            classes:
              C:
                outer: () => { this.inner() }
                inner: () => { x = 1 / 0 }
            objects:
              c: C()
            main: () => { c.outer() }
            call: main()
        "});
        result.expect_err("expected division failure");
        let snapshot = failure.expect("snapshot should be captured");
        assert_eq!(
            snapshot.call_stack,
            vec![
                "main()".to_string(),
                "C.outer()".to_string(),
                "C.inner()".to_string(),
            ]
        );
        assert_eq!(snapshot.error, "Division by zero");
    }

    #[test]
    fn return_is_not_caught_by_try() {
        let output = run(indoc! {r#"
            f: () => {
              try : {
                return 5
              } catch (e) : {
                echo "caught"
              }
            }
            main: () => { echo f() }
            call: main()
        "#});
        assert_eq!(output, "5");
    }

    #[test]
    fn finally_runs_before_the_function_returns() {
        let output = run(indoc! {r#"
            f: () => {
              try : {
                return 1
              } catch (e) : {
                echo "caught"
              } finally : {
                echo "cleanup"
              }
            }
            main: () => { echo f() }
            call: main()
        "#});
        assert_eq!(output, "cleanup\n1");
    }

    #[test]
    fn throw_raises_a_catchable_user_error() {
        let output = run(indoc! {r#"
            main: () => {
              try : {
                throw "boom"
              } catch (e) : {
                echo "caught: " + e
              }
            }
            call: main()
        "#});
        assert_eq!(output, "caught: boom");
    }

    #[test]
    fn uncaught_throw_carries_the_message() {
        let err = run_err("main: () => { throw \"boom\" }\ncall: main()\n");
        assert_eq!(
            err,
            RuntimeError::User {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn arrays_are_shared_handles() {
        let output = run(indoc! {"
            main: () => {
              a = [1, 2]
              b = a
              b[0] = 9
              echo a[0]
            }
            call: main()
        "});
        assert_eq!(output, "9");
    }

    #[test]
    fn array_indexing_is_bounds_checked() {
        let err = run_err("main: () => { echo [1][1] }\ncall: main()\n");
        assert_eq!(err, RuntimeError::IndexOutOfBounds { index: 1, len: 1 });

        let err = run_err("main: () => { echo [1][-1] }\ncall: main()\n");
        assert_eq!(err, RuntimeError::IndexOutOfBounds { index: -1, len: 1 });
    }

    #[test]
    fn postfix_increment_returns_the_previous_value() {
        let output = run(indoc! {"
            main: () => {
              i = 5
              echo i++
              echo i
            }
            call: main()
        "});
        assert_eq!(output, "5\n6");
    }

    #[test]
    fn for_loop_runs_init_condition_and_step() {
        let output = run(indoc! {"
            main: () => {
              sum = 0
              for (i = 0; i < 3; i++) : {
                sum = sum + i
              }
              echo sum
            }
            call: main()
        "});
        assert_eq!(output, "3");
    }

    #[test]
    fn continue_in_a_for_loop_still_runs_the_step() {
        let output = run(indoc! {"
            main: () => {
              sum = 0
              for (i = 0; i < 5; i++) : {
                if (i == 2): continue
                sum = sum + i
              }
              echo sum
            }
            call: main()
        "});
        assert_eq!(output, "8");
    }

    #[test]
    fn imports_register_modules_under_their_alias() {
        let output = run(indoc! {"
            imports:
              - math: m
            main: () => {
              echo m.floor(2.7)
              echo m.pi > 3
            }
            call: main()
        "});
        assert_eq!(output, "2\ntrue");
    }

    #[test]
    fn import_statements_register_into_globals() {
        let output = run(indoc! {"
            main: () => {
              import string as s
              echo s.to_upper(\"hi\")
            }
            call: main()
        "});
        assert_eq!(output, "HI");
    }

    #[test]
    fn type_builtin_reports_class_names_for_objects() {
        let output = run(indoc! {"
            classes:
              Counter:
                init: () => { this.n = 0 }
            objects:
              c: Counter()
            main: () => {
              echo type(c)
              echo type(1)
              echo type(1.5)
              echo type(\"s\")
              echo type(true)
              echo type([1])
            }
            call: main()
        "});
        assert_eq!(output, "Counter\nint\nfloat\nstring\nboolean\narray");
    }

    #[test]
    fn call_directive_identifier_arguments_resolve_from_globals() {
        let output = run(indoc! {"
            classes:
              Counter:
                init: () => { this.n = 0 }
            objects:
              c: Counter()
            show: (x) => { echo type(x) }
            call: show(c)
        "});
        assert_eq!(output, "Counter");
    }

    #[test]
    fn method_not_found_names_the_class() {
        let err = run_err(indoc! {"
            classes:
              C:
                a: () => { return 1 }
            objects:
              c: C()
            main: () => { c.missing() }
            call: main()
        "});
        assert_eq!(
            err,
            RuntimeError::MethodNotFound {
                method: "missing".to_string(),
                class: "C".to_string()
            }
        );
    }

    #[test]
    fn unknown_attribute_names_the_object() {
        let err = run_err(indoc! {"
            classes:
              C:
                init: () => { this.x = 1 }
            objects:
              c: C()
            main: () => { echo c.missing }
            call: main()
        "});
        assert_eq!(
            err,
            RuntimeError::PropertyNotFound {
                property: "missing".to_string(),
                object: "c".to_string()
            }
        );
    }

    #[test]
    fn range_and_len_builtins_cooperate() {
        let output = run(indoc! {"
            main: () => {
              echo range(3)
              echo len(range(2, 8, 2))
              echo len(\"hello\")
            }
            call: main()
        "});
        assert_eq!(output, "[0, 1, 2]\n3\n5");
    }

    #[test]
    fn input_builtin_reads_from_the_console() {
        let source = indoc! {r#"
            main: () => {
              name = input()
              echo "Hi " + name
            }
            call: main()
        "#};
        let document = document::load_str(source, None, &[]).expect("document");
        let console = BufferedConsole::new();
        console.push_input("Ada");
        let mut evaluator = Evaluator::new(
            document,
            ModuleLoader::shared(),
            Box::new(console.clone()),
        );
        evaluator.run().expect("program should run");
        assert_eq!(console.output(), "Hi Ada");
    }

    #[test]
    fn runs_main_when_no_call_directive_is_present() {
        let output = run("main: () => { echo \"auto\" }\n");
        assert_eq!(output, "auto");
    }

    #[test]
    fn missing_call_target_is_an_error() {
        let err = run_err("main: () => { echo 1 }\ncall: nope()\n");
        assert_eq!(
            err,
            RuntimeError::UndefinedFunction {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn non_boolean_conditions_are_rejected() {
        let err = run_err("main: () => { if (1) : { echo 1 } }\ncall: main()\n");
        assert!(matches!(err, RuntimeError::NonBooleanCondition { .. }));
    }

    #[test]
    fn string_indexing_yields_single_characters() {
        let output = run("main: () => { echo \"abc\"[1] }\ncall: main()\n");
        assert_eq!(output, "b");
    }

    #[test]
    fn bare_module_functions_are_not_values() {
        let err = run_err(indoc! {"
            imports:
              - math
            main: () => { x = math.sqrt }
            call: main()
        "});
        assert!(matches!(err, RuntimeError::BareModuleFunction { .. }));
    }
}
