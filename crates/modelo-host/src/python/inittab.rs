//! Built-in module table registration.
//!
//! CPython resolves `import <name>` for built-in modules through a table of
//! `(name, init function)` pairs that must be filled in before the interpreter
//! starts. This module adds one entry per [`ModuleSpec`]:
//!
//! | Source | Init function |
//! |--------|---------------|
//! | [`ExtensionSource::Linked`] | `PyInit_model_module` from the Cython build (feature `linked-model`) |
//! | [`ExtensionSource::Script`] | [`init_script_module`], which executes the script as the module body |
//!
//! CPython keeps the name pointer for the lifetime of the process, so names
//! are leaked on registration.
//!
//! # Script Modules
//!
//! A script module is backed by a leaked single-phase `PyModuleDef`. The
//! script's source is read at registration time, so a missing file is a
//! registration failure rather than an import failure. Only one script module
//! can be registered per process.

use std::ffi::{CStr, CString};
use std::fs;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use pyo3::exceptions::PyImportError;
use pyo3::ffi;
use pyo3::prelude::*;
use tracing::debug;

use crate::error::BootstrapError;
use crate::runtime::{ExtensionSource, ModuleSpec};

/// Signature of a CPython module init function.
pub type ModuleInit = unsafe extern "C" fn() -> *mut ffi::PyObject;

#[cfg(feature = "linked-model")]
unsafe extern "C" {
    fn PyInit_model_module() -> *mut ffi::PyObject;
}

/// The init function of the linked model module, if this build has one.
#[must_use]
pub fn linked_init() -> Option<ModuleInit> {
    #[cfg(feature = "linked-model")]
    {
        Some(PyInit_model_module as ModuleInit)
    }
    #[cfg(not(feature = "linked-model"))]
    {
        None
    }
}

/// Add `spec` to the built-in module table.
///
/// # Errors
///
/// Returns [`BootstrapError::Registration`] if:
/// - The interpreter is already initialized
/// - The name contains a NUL byte
/// - `Linked` is requested without the `linked-model` feature
/// - The script cannot be read, or a script module is already registered
/// - CPython cannot grow the table
pub fn register(spec: &ModuleSpec) -> Result<(), BootstrapError> {
    // SAFETY: Py_IsInitialized only reads a flag and is valid at any time.
    if unsafe { ffi::Py_IsInitialized() } != 0 {
        return Err(BootstrapError::registration(
            &spec.name,
            "the interpreter is already initialized",
        ));
    }

    let init = match &spec.source {
        ExtensionSource::Linked => linked_init().ok_or_else(|| {
            BootstrapError::registration(
                &spec.name,
                "this binary was built without the `linked-model` feature",
            )
        })?,
        ExtensionSource::Script(path) => {
            prepare_script(&spec.name, path)?;
            init_script_module as ModuleInit
        }
    };

    let name = leak_name(&spec.name)?;
    debug!(module = %spec.name, source = ?spec.source, "appending to built-in module table");

    // SAFETY: the interpreter is not initialized (checked above) and `name`
    // is 'static, as CPython requires.
    let status = unsafe { ffi::PyImport_AppendInittab(name.as_ptr(), Some(init)) };
    if status == -1 {
        return Err(BootstrapError::registration(
            &spec.name,
            "CPython could not extend the built-in module table",
        ));
    }
    Ok(())
}

fn leak_name(name: &str) -> Result<&'static CStr, BootstrapError> {
    let c_name = CString::new(name)
        .map_err(|_| BootstrapError::registration(name, "module name contains a NUL byte"))?;
    Ok(Box::leak(c_name.into_boxed_c_str()))
}

/// A script registered as a built-in module.
struct ScriptModule {
    def: ModuleDef,
    file: String,
    code: String,
}

/// Owner of a leaked `PyModuleDef`.
struct ModuleDef(NonNull<ffi::PyModuleDef>);

// SAFETY: the definition is leaked, never touched from Rust after creation,
// and CPython only reads or writes it while holding the GIL.
unsafe impl Send for ModuleDef {}
unsafe impl Sync for ModuleDef {}

static SCRIPT_MODULE: OnceLock<ScriptModule> = OnceLock::new();

fn prepare_script(name: &str, path: &Path) -> Result<(), BootstrapError> {
    if SCRIPT_MODULE.get().is_some() {
        return Err(BootstrapError::registration(
            name,
            "a script module is already registered in this process",
        ));
    }

    let code = fs::read_to_string(path).map_err(|err| {
        BootstrapError::registration(name, format!("cannot read {}: {}", path.display(), err))
    })?;

    let def = Box::new(ffi::PyModuleDef {
        m_base: ffi::PyModuleDef_HEAD_INIT,
        m_name: leak_name(name)?.as_ptr(),
        m_doc: ptr::null(),
        m_size: -1,
        m_methods: ptr::null_mut(),
        m_slots: ptr::null_mut(),
        m_traverse: None,
        m_clear: None,
        m_free: None,
    });

    let script = ScriptModule {
        def: ModuleDef(NonNull::from(Box::leak(def))),
        file: path.display().to_string(),
        code,
    };

    SCRIPT_MODULE.set(script).map_err(|_| {
        BootstrapError::registration(name, "a script module is already registered in this process")
    })
}

/// Init function CPython calls when the script module is first imported.
///
/// # Safety
///
/// Must only be called by the interpreter's import machinery, with the GIL held.
pub unsafe extern "C" fn init_script_module() -> *mut ffi::PyObject {
    Python::attach(|py| match create_script_module(py) {
        Ok(module) => module.into_ptr(),
        Err(err) => {
            err.restore(py);
            ptr::null_mut()
        }
    })
}

fn create_script_module(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let script = SCRIPT_MODULE
        .get()
        .ok_or_else(|| PyImportError::new_err("no module script has been registered"))?;

    // SAFETY: the definition is leaked and lives for the rest of the process.
    let raw = unsafe { ffi::PyModule_Create2(script.def.0.as_ptr(), ffi::PYTHON_API_VERSION) };
    // SAFETY: PyModule_Create2 returns a new reference or NULL with an exception set.
    let module = unsafe { Bound::from_owned_ptr_or_err(py, raw) }?.downcast_into::<PyModule>()?;
    module.setattr("__file__", &script.file)?;

    // compile() keeps the script path in tracebacks
    let builtins = py.import("builtins")?;
    let code = builtins
        .getattr("compile")?
        .call1((&script.code, &script.file, "exec"))?;
    builtins.getattr("exec")?.call1((code, module.dict()))?;

    Ok(module)
}
