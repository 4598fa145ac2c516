//! The seam between the bootstrap and an embedded interpreter.
//!
//! [`Runtime`] lists the handful of lifecycle operations the bootstrap needs.
//! [`PythonRuntime`](crate::python::runtime::PythonRuntime) drives CPython
//! through pyo3; tests substitute a recording implementation to observe call
//! counts on every control path.

use std::path::PathBuf;

use crate::bootstrap::ProgramName;
use crate::config::{BootstrapConfig, ExtensionKind};
use crate::error::BootstrapError;

/// Where the code behind a registered module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSource {
    /// The `PyInit_model_module` symbol linked into the binary.
    Linked,
    /// A Python file executed as the module body on first import.
    Script(PathBuf),
}

/// A module to place in the interpreter's built-in module table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Logical name the module is registered under.
    pub name: String,
    /// Code behind the module.
    pub source: ExtensionSource,
}

impl ModuleSpec {
    /// Derive the registration for a configuration.
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        let source = match config.extension {
            ExtensionKind::Linked => ExtensionSource::Linked,
            ExtensionKind::Script => ExtensionSource::Script(config.module_script.clone()),
        };
        Self {
            name: config.module_name.clone(),
            source,
        }
    }
}

/// Lifecycle operations of an embedded interpreter.
///
/// The bootstrap calls these in a fixed order:
/// `register_builtin`, `set_program_name`, `initialize`, `import`,
/// `invoke_entry`, `release_program_name`, `finalize`. The last two run on
/// every path that got past `initialize`.
pub trait Runtime {
    /// Handle to an imported module.
    type Module;

    /// Add `spec` to the built-in module table. Must precede `initialize`.
    fn register_builtin(&mut self, spec: &ModuleSpec) -> Result<(), BootstrapError>;

    /// Record the invocation name for the interpreter's self-reporting.
    fn set_program_name(&mut self, name: &ProgramName);

    /// Start the interpreter. Failures here are the interpreter's own fatal exit.
    fn initialize(&mut self);

    /// Import a module by logical name.
    ///
    /// Implementations surface the interpreter's pending error on stderr
    /// before returning `Err`.
    fn import(&mut self, name: &str) -> Result<Self::Module, BootstrapError>;

    /// Call `function` on `module` with no arguments, consuming the handle.
    fn invoke_entry(&mut self, module: Self::Module, function: &str)
    -> Result<(), BootstrapError>;

    /// Give back the program name once the interpreter no longer needs it.
    fn release_program_name(&mut self, name: ProgramName) {
        drop(name);
    }

    /// Shut the interpreter down.
    fn finalize(&mut self);
}
