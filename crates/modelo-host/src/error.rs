//! Error types for the modelo-host crate.
//!
//! This module defines [`BootstrapError`], the error type used throughout the
//! crate. Library functions return `Result<T, BootstrapError>`; the binary turns
//! them into diagnostic text and a process exit status.
//!
//! # Error Taxonomy
//!
//! | Variant | When | Runtime finalized? |
//! |---------|------|--------------------|
//! | [`ProgramName`](BootstrapError::ProgramName) | argv[0] missing or undecodable | never started |
//! | [`Registration`](BootstrapError::Registration) | built-in module table could not be extended | never started |
//! | [`Import`](BootstrapError::Import) | the registered module failed to import | yes |
//! | [`Entry`](BootstrapError::Entry) | the entry function raised or is missing | yes |
//! | [`InvalidConfig`](BootstrapError::InvalidConfig) / [`ConfigFile`](BootstrapError::ConfigFile) | configuration rejected | never started |

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for modelo-host operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BootstrapError {
    /// The invocation name could not be decoded into interpreter text.
    ///
    /// Raised before the interpreter exists, so no cleanup is performed.
    #[error("cannot decode argv[0]: {0}")]
    ProgramName(String),

    /// The extension module could not be added to the built-in module table.
    ///
    /// Common causes:
    /// - The module script does not exist or is not UTF-8
    /// - The binary was built without the `linked-model` feature
    /// - The interpreter was already initialized
    #[error("could not register module '{module}': {reason}")]
    Registration {
        /// Logical module name that was being registered.
        module: String,
        /// Why registration was refused.
        reason: String,
    },

    /// Importing the registered module failed.
    ///
    /// The interpreter's own exception text is printed to stderr before this
    /// error is returned; `message` carries its one-line summary.
    #[error("could not import module '{module}': {message}")]
    Import {
        /// Logical module name that was imported.
        module: String,
        /// Summary of the Python exception.
        message: String,
    },

    /// The entry function raised an exception or could not be looked up.
    #[error("entry function '{function}' failed: {message}")]
    Entry {
        /// Name of the entry function.
        function: String,
        /// Summary of the Python exception.
        message: String,
    },

    /// A configuration value was rejected during validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The JSON configuration file could not be parsed.
    #[error("Invalid configuration file {}: {source}", path.display())]
    ConfigFile {
        /// Path named by `MODELO_CONFIG`.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// I/O error while reading configuration or module sources.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    pub(crate) fn registration(module: &str, reason: impl Into<String>) -> Self {
        BootstrapError::Registration {
            module: module.to_string(),
            reason: reason.into(),
        }
    }
}

static_assertions::assert_impl_all!(BootstrapError: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_names_module() {
        let err = BootstrapError::Import {
            module: "modelo_ia".to_string(),
            message: "ModuleNotFoundError: No module named 'modelo_ia'".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("could not import module 'modelo_ia'"));
        assert!(text.contains("ModuleNotFoundError"));
    }

    #[test]
    fn test_registration_helper() {
        let err = BootstrapError::registration("modelo_ia", "interpreter already initialized");
        assert_eq!(
            err.to_string(),
            "could not register module 'modelo_ia': interpreter already initialized"
        );
    }

    #[test]
    fn test_config_file_error_keeps_source() {
        use std::error::Error as _;

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BootstrapError::ConfigFile {
            path: PathBuf::from("/etc/modelo.json"),
            source,
        };
        assert!(err.to_string().contains("/etc/modelo.json"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BootstrapError = io.into();
        assert!(matches!(err, BootstrapError::Io(_)));
    }
}
