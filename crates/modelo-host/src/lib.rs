//! modelo-host: native host for the embedded `modelo_ia` prediction workflow.
//!
//! This crate starts a CPython interpreter inside the current process,
//! registers the prediction model's extension module in the interpreter's
//! built-in module table, imports it, calls its entry function, and shuts the
//! interpreter down again. The model itself lives in the extension module.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use modelo_host::{bootstrap, BootstrapConfig, Invocation, PythonRuntime};
//!
//! let config = BootstrapConfig::from_env()?;
//! let mut runtime = PythonRuntime::new(&config)?;
//! let status = bootstrap::run(
//!     &mut runtime,
//!     &Invocation::from_env(),
//!     &config,
//!     &mut std::io::stderr(),
//! );
//! std::process::exit(status.code().into());
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         modelo-host                           │
//! │                                                               │
//! │  BootstrapConfig ──► bootstrap::run ──► Session (drop = fini) │
//! │                            │                                  │
//! │                            ▼ Runtime trait                    │
//! │                      PythonRuntime                            │
//! └────────────────────────────┬──────────────────────────────────┘
//!                              │ PyO3 / pyo3::ffi
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Embedded CPython                          │
//! │                                                               │
//! │  inittab: modelo_ia ─► PyInit_model_module (linked)           │
//! │                    └─► script module (model_module.py)        │
//! │  modelo_ia.run_prediction_model_main()                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Exit Status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | The entry function ran (its result is not checked by default) |
//! | 1 | argv[0] undecodable, registration failed, import failed, or configuration invalid |
//!
//! # Modules
//!
//! - [`bootstrap`] - The lifecycle state machine
//! - [`runtime`] - The [`Runtime`] trait seam
//! - [`python`] - CPython implementation and built-in module registration

pub mod bootstrap;
mod config;
mod error;
pub mod python;
pub mod runtime;

// Re-export public API
//
// Bootstrap types
pub use bootstrap::{ExitStatus, Invocation, ProgramName, Stage};
// Configuration types
pub use config::{
    BootstrapConfig, BootstrapConfigBuilder, DEFAULT_LOG_LEVEL, ENTRY_FUNCTION, ExtensionKind,
    MODULE_NAME,
};
// Environment variable names
pub use config::{
    ENV_CHECK_ENTRY_RESULT, ENV_CONFIG_FILE, ENV_ENTRY_FUNCTION, ENV_EXTENSION, ENV_LOG_LEVEL,
    ENV_MODULE_NAME, ENV_MODULE_SCRIPT, ENV_PYTHON_HOME,
};
// Error types
pub use error::BootstrapError;
// Runtime types
pub use python::runtime::PythonRuntime;
pub use runtime::{ExtensionSource, ModuleSpec, Runtime};
