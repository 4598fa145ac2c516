//! CPython lifecycle management.
//!
//! [`PythonRuntime`] implements [`Runtime`] on top of pyo3. It drives the
//! interpreter explicitly rather than through pyo3's `auto-initialize`, because
//! the program name and home have to be set before start and the interpreter
//! has to be finalized at a known point.
//!
//! # Overview
//!
//! 1. **Registration** - Entries are added to the built-in module table
//!    ([`inittab`](crate::python::inittab)) while the interpreter is stopped
//! 2. **Configuration** - A `PyConfig` is filled with the program name and
//!    optional home
//! 3. **Interpreter Init** - `Py_InitializeFromConfig`, after which the GIL is
//!    released so pyo3 can attach on demand
//! 4. **Import / Call** - Through `Python::attach`
//! 5. **Finalize** - The main thread state is restored and `Py_FinalizeEx` runs
//!
//! # Thread Safety
//!
//! `PythonRuntime` is `!Send`: it holds the thread state saved after
//! initialization, which must be restored on the same thread.

use std::ffi::CString;
use std::mem::MaybeUninit;
use std::path::Path;
use std::ptr::NonNull;

use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use tracing::{debug, warn};

use crate::bootstrap::ProgramName;
use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::python::inittab;
use crate::runtime::{ModuleSpec, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Unstarted,
    Running,
    Finalized,
}

/// An embedded CPython interpreter.
///
/// # Example
///
/// ```rust,ignore
/// use modelo_host::{bootstrap, BootstrapConfig, Invocation, PythonRuntime};
///
/// let config = BootstrapConfig::from_env()?;
/// let mut runtime = PythonRuntime::new(&config)?;
/// let status = bootstrap::run(&mut runtime, &Invocation::from_env(), &config, &mut std::io::stderr());
/// ```
#[derive(Debug)]
pub struct PythonRuntime {
    python_home: Option<CString>,
    program_name: Option<CString>,
    lifecycle: Lifecycle,
    saved_thread: Option<NonNull<ffi::PyThreadState>>,
}

static_assertions::assert_not_impl_any!(PythonRuntime: Send, Sync);

impl PythonRuntime {
    /// Create a stopped runtime for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidConfig`] if `python_home` is not
    /// representable as a C string.
    pub fn new(config: &BootstrapConfig) -> Result<Self, BootstrapError> {
        let python_home = config
            .python_home
            .as_deref()
            .map(path_to_cstring)
            .transpose()?;

        Ok(Self {
            python_home,
            program_name: None,
            lifecycle: Lifecycle::Unstarted,
            saved_thread: None,
        })
    }

    /// Whether [`initialize`](Runtime::initialize) has run and
    /// [`finalize`](Runtime::finalize) has not.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }
}

impl Runtime for PythonRuntime {
    type Module = Py<PyModule>;

    fn register_builtin(&mut self, spec: &ModuleSpec) -> Result<(), BootstrapError> {
        if self.lifecycle != Lifecycle::Unstarted {
            return Err(BootstrapError::registration(
                &spec.name,
                "the interpreter has already been started",
            ));
        }
        inittab::register(spec)
    }

    fn set_program_name(&mut self, name: &ProgramName) {
        self.program_name = Some(name.as_c_str().to_owned());
    }

    fn initialize(&mut self) {
        if self.lifecycle != Lifecycle::Unstarted {
            warn!("interpreter initialization requested twice; ignoring");
            return;
        }

        // SAFETY: the interpreter is not running, so the config API may be
        // used freely; every pointer handed to CPython outlives the call.
        unsafe {
            let mut config = MaybeUninit::<ffi::PyConfig>::uninit();
            let config = config.as_mut_ptr();
            ffi::PyConfig_InitPythonConfig(config);

            if let Some(name) = &self.program_name {
                let status = ffi::PyConfig_SetBytesString(
                    config,
                    &raw mut (*config).program_name,
                    name.as_ptr(),
                );
                exit_on_exception(config, status);
            }

            if let Some(home) = &self.python_home {
                let status =
                    ffi::PyConfig_SetBytesString(config, &raw mut (*config).home, home.as_ptr());
                exit_on_exception(config, status);
            }

            let status = ffi::Py_InitializeFromConfig(config);
            ffi::PyConfig_Clear(config);
            if ffi::PyStatus_Exception(status) != 0 {
                ffi::Py_ExitStatusException(status);
            }

            // Initialization leaves the GIL held by this thread; release it so
            // Python::attach can take it when needed
            self.saved_thread = NonNull::new(ffi::PyEval_SaveThread());
        }

        self.lifecycle = Lifecycle::Running;
        debug!("Python interpreter initialized");
    }

    fn import(&mut self, name: &str) -> Result<Py<PyModule>, BootstrapError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(BootstrapError::Import {
                module: name.to_string(),
                message: "the interpreter is not running".to_string(),
            });
        }

        Python::attach(|py| match py.import(name) {
            Ok(module) => Ok(module.unbind()),
            Err(err) => {
                let message = err.to_string();
                err.print(py);
                Err(BootstrapError::Import {
                    module: name.to_string(),
                    message,
                })
            }
        })
    }

    fn invoke_entry(
        &mut self,
        module: Py<PyModule>,
        function: &str,
    ) -> Result<(), BootstrapError> {
        Python::attach(|py| {
            // The handle is dropped inside the closure, while attached
            let module = module.into_bound(py);
            let result = module
                .getattr(function)
                .and_then(|entry| entry.call0())
                .map(|_| ());

            result.map_err(|err| {
                let message = err.to_string();
                err.print(py);
                BootstrapError::Entry {
                    function: function.to_string(),
                    message,
                }
            })
        })
    }

    fn finalize(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            warn!(state = ?self.lifecycle, "finalize requested while the interpreter is not running; ignoring");
            return;
        }

        // SAFETY: the thread state was saved by `initialize` on this thread
        // (PythonRuntime is !Send), and no Python objects are held by Rust.
        unsafe {
            if let Some(thread) = self.saved_thread.take() {
                ffi::PyEval_RestoreThread(thread.as_ptr());
            }
            if ffi::Py_FinalizeEx() < 0 {
                warn!("interpreter reported an error while flushing buffered output");
            }
        }

        self.lifecycle = Lifecycle::Finalized;
        debug!("Python interpreter finalized");
    }
}

/// Clear `config` and exit through the interpreter if `status` is an error.
///
/// # Safety
///
/// `config` must point to an initialized `PyConfig`.
unsafe fn exit_on_exception(config: *mut ffi::PyConfig, status: ffi::PyStatus) {
    // SAFETY: upheld by the caller.
    unsafe {
        if ffi::PyStatus_Exception(status) != 0 {
            ffi::PyConfig_Clear(config);
            ffi::Py_ExitStatusException(status);
        }
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, BootstrapError> {
    let text = path.to_str().ok_or_else(|| {
        BootstrapError::InvalidConfig(format!("{} is not valid UTF-8", path.display()))
    })?;
    CString::new(text).map_err(|_| {
        BootstrapError::InvalidConfig(format!("{} contains a NUL byte", path.display()))
    })
}
