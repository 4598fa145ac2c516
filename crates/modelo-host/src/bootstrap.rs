//! The host bootstrap: one linear pass through the interpreter lifecycle.
//!
//! ```text
//! unstarted ─► name_decoded ─► module_registered ─► runtime_initialized
//!     │              │                                     │
//!     └─ exit 1      └─ exit 1                             ▼
//!   (decode)      (registration)                    module_imported ──┐
//!                                                          │          │ import failed
//!                                                          ▼          │
//!                                                   entry_invoked     │
//!                                                          │          │
//!                                                          ▼          ▼
//!                                                       finalized (exit 0 / 1)
//! ```
//!
//! Decode and registration failures happen before the interpreter exists and
//! return immediately. Everything after initialization runs inside a
//! [`Session`], whose `Drop` releases the program name and finalizes the
//! runtime exactly once on every path.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::fmt;
use std::io::Write;
use std::process::ExitCode;

use tracing::{debug, error, info, warn};

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::runtime::{ModuleSpec, Runtime};

/// Lifecycle stages of a bootstrap run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing has happened yet.
    Unstarted,
    /// argv[0] was decoded into a [`ProgramName`].
    NameDecoded,
    /// The module is in the built-in module table.
    ModuleRegistered,
    /// The interpreter is running.
    RuntimeInitialized,
    /// The module imported successfully.
    ModuleImported,
    /// The entry function was called.
    EntryInvoked,
    /// The interpreter has been shut down.
    Finalized,
}

impl Stage {
    /// Returns the snake_case name used in log events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Unstarted => "unstarted",
            Stage::NameDecoded => "name_decoded",
            Stage::ModuleRegistered => "module_registered",
            Stage::RuntimeInitialized => "runtime_initialized",
            Stage::ModuleImported => "module_imported",
            Stage::EntryInvoked => "entry_invoked",
            Stage::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process exit status of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exit code 0.
    Success,
    /// Exit code 1.
    Failure,
}

impl ExitStatus {
    /// Numeric exit code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// The decoded invocation name handed to the interpreter.
///
/// Holds the text twice: as a Rust string for logging and as a NUL-terminated
/// copy for the C API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramName {
    text: String,
    c_text: CString,
}

impl ProgramName {
    /// Decode argv[0].
    ///
    /// Decoding is strict: the argument must be valid Unicode in the platform
    /// encoding and must not contain NUL.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ProgramName`] if argv[0] is absent or cannot
    /// be decoded.
    pub fn decode(arg0: Option<&OsStr>) -> Result<Self, BootstrapError> {
        let arg0 =
            arg0.ok_or_else(|| BootstrapError::ProgramName("argv[0] is missing".to_string()))?;

        let text = arg0.to_str().ok_or_else(|| {
            BootstrapError::ProgramName(format!(
                "{:?} is not valid in the platform encoding",
                arg0
            ))
        })?;

        let c_text = CString::new(text).map_err(|_| {
            BootstrapError::ProgramName(format!("{:?} contains a NUL byte", text))
        })?;

        Ok(Self {
            text: text.to_string(),
            c_text,
        })
    }

    /// The decoded name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The decoded name as a C string.
    #[must_use]
    pub fn as_c_str(&self) -> &CStr {
        &self.c_text
    }
}

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The parts of the process invocation the bootstrap looks at.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// The zeroth argument, if the OS supplied one.
    pub argv0: Option<OsString>,
    /// Total argument count.
    pub argc: usize,
}

impl Invocation {
    /// Capture the current process's arguments.
    #[must_use]
    pub fn from_env() -> Self {
        let mut args = std::env::args_os();
        let argc = args.len();
        Self {
            argv0: args.next(),
            argc,
        }
    }

    /// Build an invocation with `argv0` as its only argument.
    #[must_use]
    pub fn new(argv0: impl Into<OsString>) -> Self {
        Self {
            argv0: Some(argv0.into()),
            argc: 1,
        }
    }
}

/// Run the bootstrap once against `runtime`.
///
/// Fixed diagnostic lines go to `diagnostics`; details go to the `tracing`
/// subscriber.
pub fn run<R, W>(
    runtime: &mut R,
    invocation: &Invocation,
    config: &BootstrapConfig,
    diagnostics: &mut W,
) -> ExitStatus
where
    R: Runtime,
    W: Write,
{
    debug!(stage = %Stage::Unstarted, argc = invocation.argc, "bootstrap starting");

    let program = match ProgramName::decode(invocation.argv0.as_deref()) {
        Ok(program) => program,
        Err(err) => {
            error!(error = %err, "argv[0] could not be decoded");
            report(
                diagnostics,
                format_args!(
                    "Fatal error: cannot decode argv[0], got {} arguments",
                    invocation.argc
                ),
            );
            return ExitStatus::Failure;
        }
    };
    debug!(stage = %Stage::NameDecoded, program = %program, "program name decoded");

    let spec = ModuleSpec::from_config(config);
    if let Err(err) = runtime.register_builtin(&spec) {
        error!(error = %err, "built-in module registration failed");
        report(
            diagnostics,
            format_args!("Error: could not extend in-built modules table"),
        );
        return ExitStatus::Failure;
    }
    debug!(stage = %Stage::ModuleRegistered, module = %spec.name, "module registered");

    let mut session = Session::start(runtime, program);
    let status = session.run_module(config, diagnostics);
    drop(session);

    info!(code = status.code(), "bootstrap finished");
    status
}

/// A started runtime plus the program name it was started with.
///
/// Dropping the session releases the name and finalizes the runtime.
struct Session<'r, R: Runtime> {
    runtime: &'r mut R,
    program: Option<ProgramName>,
}

impl<'r, R: Runtime> Session<'r, R> {
    fn start(runtime: &'r mut R, program: ProgramName) -> Self {
        runtime.set_program_name(&program);
        runtime.initialize();
        debug!(stage = %Stage::RuntimeInitialized, "interpreter initialized");

        Self {
            runtime,
            program: Some(program),
        }
    }

    fn run_module<W: Write>(&mut self, config: &BootstrapConfig, diagnostics: &mut W) -> ExitStatus {
        let module = match self.runtime.import(&config.module_name) {
            Ok(module) => module,
            Err(err) => {
                error!(error = %err, "module import failed");
                report(
                    diagnostics,
                    format_args!("Error: could not import module '{}'", config.module_name),
                );
                return ExitStatus::Failure;
            }
        };
        debug!(stage = %Stage::ModuleImported, module = %config.module_name, "module imported");

        let result = self.runtime.invoke_entry(module, &config.entry_function);
        debug!(stage = %Stage::EntryInvoked, function = %config.entry_function, "entry function returned");

        match result {
            Ok(()) => ExitStatus::Success,
            Err(err) if config.check_entry_result => {
                error!(error = %err, "entry function failed");
                report(
                    diagnostics,
                    format_args!("Error in Python code, exception was printed."),
                );
                ExitStatus::Failure
            }
            Err(err) => {
                warn!(error = %err, "entry function failed; result is not checked");
                ExitStatus::Success
            }
        }
    }
}

impl<R: Runtime> Drop for Session<'_, R> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.runtime.release_program_name(program);
        }
        self.runtime.finalize();
        debug!(stage = %Stage::Finalized, "interpreter finalized");
    }
}

// stderr is best effort; a closed stream must not change the exit status
fn report<W: Write>(diagnostics: &mut W, message: fmt::Arguments<'_>) {
    let _ = writeln!(diagnostics, "{message}");
    let _ = diagnostics.flush();
}
