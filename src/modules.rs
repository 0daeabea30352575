//! Module system: a uniform registry of callables and constants exposed
//! under a module name, and a layered loader behind `import M`.
//!
//! Resolution order: built-in stdlib, host-registered native modules, then
//! a script file `M.hpl` on the search path. The evaluator consumes every
//! module through the same descriptor and never learns where it came from.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::document;
use crate::evaluator::Evaluator;
use crate::runtime::error::RuntimeError;
use crate::runtime::object::{Function, HplClass};
use crate::runtime::value::Value;

mod io;
mod json;
mod math;
mod os;
mod string;
mod time;

pub type NativeFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// One registered callable: a native function with an optional fixed arity,
/// or a script function executed against its defining module.
#[derive(Debug)]
pub enum ModuleFn {
    Native {
        callable: NativeFn,
        arity: Option<usize>,
        doc: &'static str,
    },
    Script {
        function: Rc<Function>,
        program: Rc<ScriptProgram>,
    },
}

/// The definitions of a script module, shared by all of its registered
/// functions. Each call runs in a fresh evaluator over these units; object
/// constants are shared handles, so their attribute state persists across
/// calls.
#[derive(Debug)]
pub struct ScriptProgram {
    pub(crate) classes: HashMap<String, Rc<HplClass>>,
    pub(crate) functions: HashMap<String, Rc<Function>>,
    pub(crate) globals: HashMap<String, Value>,
    pub(crate) loader: Rc<RefCell<ModuleLoader>>,
}

#[derive(Debug)]
pub struct Module {
    name: String,
    description: String,
    functions: HashMap<String, ModuleFn>,
    constants: HashMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            functions: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn register_function(
        &mut self,
        name: &str,
        callable: NativeFn,
        arity: Option<usize>,
        doc: &'static str,
    ) {
        self.functions.insert(
            name.to_string(),
            ModuleFn::Native {
                callable,
                arity,
                doc,
            },
        );
    }

    pub(crate) fn register_script_function(
        &mut self,
        name: String,
        function: Rc<Function>,
        program: Rc<ScriptProgram>,
    ) {
        self.functions
            .insert(name, ModuleFn::Script { function, program });
    }

    pub fn register_constant(&mut self, name: impl Into<String>, value: Value) {
        self.constants.insert(name.into(), value);
    }

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).cloned()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let Some(function) = self.functions.get(name) else {
            return Err(RuntimeError::ModuleMemberNotFound {
                module: self.name.clone(),
                name: name.to_string(),
            });
        };
        match function {
            ModuleFn::Native {
                callable, arity, ..
            } => {
                if let Some(expected) = arity {
                    if args.len() != *expected {
                        return Err(RuntimeError::FunctionArityMismatch {
                            name: format!("{}.{}", self.name, name),
                            expected: *expected,
                            found: args.len(),
                        });
                    }
                }
                callable(&args)
            }
            ModuleFn::Script { function, program } => {
                if args.len() != function.params.len() {
                    return Err(RuntimeError::FunctionArityMismatch {
                        name: format!("{}.{}", self.name, name),
                        expected: function.params.len(),
                        found: args.len(),
                    });
                }
                Evaluator::call_module_function(program, function, args, &self.name, name)
            }
        }
    }
}

/// Layered module resolver with a cache and circular-import detection.
#[derive(Debug)]
pub struct ModuleLoader {
    stdlib: HashMap<String, Rc<Module>>,
    host: HashMap<String, Rc<Module>>,
    cache: HashMap<String, Rc<Module>>,
    loading: HashSet<String>,
    search_paths: Vec<PathBuf>,
    script_dir: Option<PathBuf>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        let mut stdlib = HashMap::new();
        for module in [
            math::module(),
            io::module(),
            json::module(),
            os::module(),
            time::module(),
            string::module(),
        ] {
            stdlib.insert(module.name().to_string(), Rc::new(module));
        }
        Self {
            stdlib,
            host: HashMap::new(),
            cache: HashMap::new(),
            loading: HashSet::new(),
            search_paths: default_search_paths(),
            script_dir: None,
        }
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Directory of the script being run; searched first for includes and
    /// script modules.
    pub fn set_script_dir(&mut self, dir: impl Into<PathBuf>) {
        self.script_dir = Some(dir.into());
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.clone()
    }

    /// Host applications expose native Rust modules through this hook; they
    /// resolve after the stdlib and before script files.
    pub fn register_host_module(&mut self, module: Module) {
        self.host
            .insert(module.name().to_string(), Rc::new(module));
    }

    pub fn stdlib_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stdlib.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn load(loader: &Rc<RefCell<Self>>, name: &str) -> Result<Rc<Module>, RuntimeError> {
        if let Some(module) = loader.borrow().resolve_registered(name)? {
            return Ok(module);
        }

        let script = loader.borrow().find_script(name);
        let Some(path) = script else {
            let available = loader.borrow().stdlib_names().join(", ");
            return Err(RuntimeError::ImportFailed {
                module: name.to_string(),
                reason: format!("not found (available stdlib modules: {available})"),
            });
        };

        loader.borrow_mut().loading.insert(name.to_string());
        let result = Self::load_script_module(loader, name, &path);
        loader.borrow_mut().loading.remove(name);

        let module = result?;
        loader
            .borrow_mut()
            .cache
            .insert(name.to_string(), module.clone());
        Ok(module)
    }

    fn resolve_registered(&self, name: &str) -> Result<Option<Rc<Module>>, RuntimeError> {
        if self.loading.contains(name) {
            let mut chain: Vec<&str> = self.loading.iter().map(String::as_str).collect();
            chain.sort_unstable();
            return Err(RuntimeError::ImportFailed {
                module: name.to_string(),
                reason: format!(
                    "circular import detected (import chain: {} -> {name})",
                    chain.join(" -> ")
                ),
            });
        }
        if let Some(module) = self.cache.get(name) {
            debug!("module '{name}' found in cache");
            return Ok(Some(module.clone()));
        }
        if let Some(module) = self.stdlib.get(name) {
            debug!("module '{name}' loaded from stdlib");
            return Ok(Some(module.clone()));
        }
        if let Some(module) = self.host.get(name) {
            debug!("module '{name}' loaded from host registry");
            return Ok(Some(module.clone()));
        }
        Ok(None)
    }

    fn find_script(&self, name: &str) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &self.script_dir {
            dirs.push(dir.clone());
        }
        if let Ok(cwd) = env::current_dir() {
            dirs.push(cwd);
        }
        dirs.extend(self.search_paths.iter().cloned());

        for dir in dirs {
            let file = dir.join(format!("{name}.hpl"));
            if file.exists() {
                return Some(file);
            }
            let index = dir.join(name).join("index.hpl");
            if index.exists() {
                return Some(index);
            }
        }
        None
    }

    fn load_script_module(
        loader: &Rc<RefCell<Self>>,
        name: &str,
        path: &Path,
    ) -> Result<Rc<Module>, RuntimeError> {
        debug!(path = %path.display(), "loading script module '{name}'");
        let search_paths = loader.borrow().search_paths();
        let document =
            document::load_file(path, &search_paths).map_err(|error| RuntimeError::ImportFailed {
                module: name.to_string(),
                reason: error.to_string(),
            })?;
        Evaluator::load_script_module(document, name, loader.clone())
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Default package directory, also used by the package manager entry.
pub fn packages_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hpl").join("packages"))
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(raw) = env::var("HPL_MODULE_PATHS") {
        paths.extend(
            raw.split(':')
                .filter(|entry| !entry.is_empty())
                .map(PathBuf::from),
        );
    }
    if let Some(dir) = packages_dir() {
        paths.push(dir);
    }
    paths
}
