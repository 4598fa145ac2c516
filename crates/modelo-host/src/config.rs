//! Configuration for the host bootstrap.
//!
//! [`BootstrapConfig`] names the module to register and import, the entry
//! function to call, where the extension comes from, and a few interpreter
//! and logging knobs. It is assembled from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`MODULE_NAME`], [`ENTRY_FUNCTION`], ...)
//! 2. A JSON file named by `MODELO_CONFIG`
//! 3. Individual `MODELO_*` environment variables
//!
//! # Example
//!
//! ```
//! use modelo_host::{BootstrapConfig, ExtensionKind};
//!
//! let config = BootstrapConfig::builder()
//!     .extension(ExtensionKind::Script)
//!     .module_script("model/src/model_module.py")
//!     .check_entry_result(true)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.module_name, "modelo_ia");
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

/// Logical name the extension module is registered and imported under.
pub const MODULE_NAME: &str = "modelo_ia";

/// Zero-argument function invoked on the imported module.
pub const ENTRY_FUNCTION: &str = "run_prediction_model_main";

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Path to a JSON configuration file.
pub const ENV_CONFIG_FILE: &str = "MODELO_CONFIG";
/// Overrides [`BootstrapConfig::module_name`].
pub const ENV_MODULE_NAME: &str = "MODELO_MODULE_NAME";
/// Overrides [`BootstrapConfig::entry_function`].
pub const ENV_ENTRY_FUNCTION: &str = "MODELO_ENTRY_FUNCTION";
/// Overrides [`BootstrapConfig::extension`] (`linked` or `script`).
pub const ENV_EXTENSION: &str = "MODELO_EXTENSION";
/// Overrides [`BootstrapConfig::module_script`].
pub const ENV_MODULE_SCRIPT: &str = "MODELO_MODULE_SCRIPT";
/// Overrides [`BootstrapConfig::python_home`].
pub const ENV_PYTHON_HOME: &str = "MODELO_PYTHON_HOME";
/// Overrides [`BootstrapConfig::check_entry_result`].
pub const ENV_CHECK_ENTRY_RESULT: &str = "MODELO_CHECK_ENTRY_RESULT";
/// Overrides [`BootstrapConfig::log_level`].
pub const ENV_LOG_LEVEL: &str = "MODELO_LOG_LEVEL";

/// Where the extension module's code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    /// The Cython-built `PyInit_model_module`, linked into the binary.
    ///
    /// Only available when built with the `linked-model` feature.
    Linked,
    /// A Python source file executed as the module body on import.
    Script,
}

impl ExtensionKind {
    /// Returns the configuration spelling of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionKind::Linked => "linked",
            ExtensionKind::Script => "script",
        }
    }
}

impl Default for ExtensionKind {
    fn default() -> Self {
        if cfg!(feature = "linked-model") {
            ExtensionKind::Linked
        } else {
            ExtensionKind::Script
        }
    }
}

impl std::str::FromStr for ExtensionKind {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linked" => Ok(ExtensionKind::Linked),
            "script" => Ok(ExtensionKind::Script),
            other => Err(BootstrapError::InvalidConfig(format!(
                "extension must be 'linked' or 'script', got '{other}'"
            ))),
        }
    }
}

/// Configuration for one bootstrap run.
///
/// Use [`BootstrapConfig::builder()`] for programmatic construction or
/// [`BootstrapConfig::from_env()`] to load the layered configuration.
///
/// # Validation
///
/// - `module_name` must be a dotted Python identifier (`pkg.module`)
/// - `entry_function` must be a Python identifier
/// - `python_home`, if set, must be valid UTF-8 without NUL bytes
/// - `log_level` must not be empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Name registered in the built-in module table and then imported.
    /// Default: `modelo_ia`
    pub module_name: String,

    /// Function looked up on the imported module and called with no arguments.
    /// Default: `run_prediction_model_main`
    pub entry_function: String,

    /// Source of the extension module.
    /// Default: `linked` with the `linked-model` feature, otherwise `script`
    pub extension: ExtensionKind,

    /// Python file used when `extension` is `script`.
    /// Default: `model_module.py`
    pub module_script: PathBuf,

    /// Interpreter home (stdlib prefix). `None` lets Python compute it.
    /// Default: None
    pub python_home: Option<PathBuf>,

    /// Whether an exception from the entry function fails the run.
    /// Default: false
    pub check_entry_result: bool,

    /// Log filter used when `RUST_LOG` is not set.
    /// Default: `warn`
    pub log_level: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            module_name: MODULE_NAME.to_string(),
            entry_function: ENTRY_FUNCTION.to_string(),
            extension: ExtensionKind::default(),
            module_script: PathBuf::from("model_module.py"),
            python_home: None,
            check_entry_result: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

static_assertions::assert_impl_all!(BootstrapConfig: Send, Sync);

impl BootstrapConfig {
    /// Create a new configuration builder starting from the defaults.
    #[must_use]
    pub fn builder() -> BootstrapConfigBuilder {
        BootstrapConfigBuilder::default()
    }

    /// Load the layered configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] or [`BootstrapError::ConfigFile`] if the
    /// file named by `MODELO_CONFIG` cannot be read or parsed, and
    /// [`BootstrapError::InvalidConfig`] if any value fails validation.
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the layered configuration using `lookup` for variable access.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Same as [`from_env()`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(name) = lookup(ENV_MODULE_NAME) {
            config.module_name = name;
        }
        if let Some(function) = lookup(ENV_ENTRY_FUNCTION) {
            config.entry_function = function;
        }
        if let Some(kind) = lookup(ENV_EXTENSION) {
            config.extension = kind.parse()?;
        }
        if let Some(script) = lookup(ENV_MODULE_SCRIPT) {
            config.module_script = PathBuf::from(script);
        }
        if let Some(home) = lookup(ENV_PYTHON_HOME) {
            config.python_home = Some(PathBuf::from(home));
        }
        if let Some(flag) = lookup(ENV_CHECK_ENTRY_RESULT) {
            config.check_entry_result = parse_flag(ENV_CHECK_ENTRY_RESULT, &flag)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file. Missing fields keep their defaults.
    ///
    /// The result is not validated; [`from_lookup()`](Self::from_lookup)
    /// validates after applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] if the file cannot be read and
    /// [`BootstrapError::ConfigFile`] if it is not valid JSON for this type.
    pub fn from_file(path: &Path) -> Result<Self, BootstrapError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| BootstrapError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if !is_module_path(&self.module_name) {
            return Err(BootstrapError::InvalidConfig(format!(
                "module_name must be a dotted Python identifier, got '{}'",
                self.module_name
            )));
        }

        if !is_identifier(&self.entry_function) {
            return Err(BootstrapError::InvalidConfig(format!(
                "entry_function must be a Python identifier, got '{}'",
                self.entry_function
            )));
        }

        if let Some(home) = &self.python_home {
            match home.to_str() {
                Some(text) if !text.contains('\0') => {}
                _ => {
                    return Err(BootstrapError::InvalidConfig(
                        "python_home must be valid UTF-8 without NUL bytes".to_string(),
                    ));
                }
            }
        }

        if self.log_level.trim().is_empty() {
            return Err(BootstrapError::InvalidConfig(
                "log_level must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`BootstrapConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct BootstrapConfigBuilder {
    config: BootstrapConfig,
}

impl BootstrapConfigBuilder {
    /// Set the logical module name (default: `modelo_ia`).
    #[must_use]
    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.config.module_name = name.into();
        self
    }

    /// Set the entry function name (default: `run_prediction_model_main`).
    #[must_use]
    pub fn entry_function(mut self, function: impl Into<String>) -> Self {
        self.config.entry_function = function.into();
        self
    }

    /// Set where the extension module comes from.
    #[must_use]
    pub fn extension(mut self, kind: ExtensionKind) -> Self {
        self.config.extension = kind;
        self
    }

    /// Set the Python file used for [`ExtensionKind::Script`].
    #[must_use]
    pub fn module_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.module_script = path.into();
        self
    }

    /// Set the interpreter home directory.
    #[must_use]
    pub fn python_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.python_home = Some(path.into());
        self
    }

    /// Fail the run when the entry function raises (default: false).
    #[must_use]
    pub fn check_entry_result(mut self, check: bool) -> Self {
        self.config.check_entry_result = check;
        self
    }

    /// Set the log filter used when `RUST_LOG` is not set (default: `warn`).
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidConfig`] if validation fails.
    pub fn build(self) -> Result<BootstrapConfig, BootstrapError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, BootstrapError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BootstrapError::InvalidConfig(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn is_module_path(name: &str) -> bool {
    name.split('.').all(is_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BootstrapConfig::default();
        assert_eq!(config.module_name, "modelo_ia");
        assert_eq!(config.entry_function, "run_prediction_model_main");
        assert_eq!(config.module_script, PathBuf::from("model_module.py"));
        assert!(config.python_home.is_none());
        assert!(!config.check_entry_result);
        assert_eq!(config.log_level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_extension_follows_feature() {
        #[cfg(feature = "linked-model")]
        assert_eq!(ExtensionKind::default(), ExtensionKind::Linked);
        #[cfg(not(feature = "linked-model"))]
        assert_eq!(ExtensionKind::default(), ExtensionKind::Script);
    }

    #[test]
    fn test_builder_chaining() {
        let config = BootstrapConfig::builder()
            .module_name("pkg.model")
            .entry_function("main")
            .extension(ExtensionKind::Script)
            .module_script("/opt/model.py")
            .python_home("/opt/python")
            .check_entry_result(true)
            .log_level("debug")
            .build()
            .unwrap();

        assert_eq!(config.module_name, "pkg.model");
        assert_eq!(config.entry_function, "main");
        assert_eq!(config.extension, ExtensionKind::Script);
        assert_eq!(config.module_script, PathBuf::from("/opt/model.py"));
        assert_eq!(config.python_home, Some(PathBuf::from("/opt/python")));
        assert!(config.check_entry_result);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_module_name() {
        for name in ["", "modelo ia", "1model", "pkg..mod", "pkg.", "mod\0"] {
            let result = BootstrapConfig::builder().module_name(name).build();
            assert!(result.is_err(), "accepted module name {name:?}");
            assert!(result.unwrap_err().to_string().contains("module_name"));
        }
    }

    #[test]
    fn test_invalid_entry_function() {
        let result = BootstrapConfig::builder().entry_function("run-main").build();
        assert!(result.unwrap_err().to_string().contains("entry_function"));

        let result = BootstrapConfig::builder().entry_function("a.b").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let result = BootstrapConfig::builder().log_level("  ").build();
        assert!(result.unwrap_err().to_string().contains("log_level"));
    }

    #[test]
    fn test_python_home_with_nul_rejected() {
        let result = BootstrapConfig::builder().python_home("/opt/py\0thon").build();
        assert!(result.unwrap_err().to_string().contains("python_home"));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("run_prediction_model_main"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("módulo"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(is_module_path("modelo_ia"));
        assert!(is_module_path("a.b.c"));
        assert!(!is_module_path(".a"));
    }

    #[test]
    fn test_from_lookup_without_variables_is_default() {
        let config = BootstrapConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, BootstrapConfig::default());
    }

    #[test]
    fn test_from_lookup_env_overrides() {
        let config = BootstrapConfig::from_lookup(lookup_from(&[
            (ENV_MODULE_NAME, "other_model"),
            (ENV_ENTRY_FUNCTION, "start"),
            (ENV_EXTENSION, "Script"),
            (ENV_MODULE_SCRIPT, "/srv/model.py"),
            (ENV_PYTHON_HOME, "/srv/python"),
            (ENV_CHECK_ENTRY_RESULT, "yes"),
            (ENV_LOG_LEVEL, "modelo_host=debug"),
        ]))
        .unwrap();

        assert_eq!(config.module_name, "other_model");
        assert_eq!(config.entry_function, "start");
        assert_eq!(config.extension, ExtensionKind::Script);
        assert_eq!(config.module_script, PathBuf::from("/srv/model.py"));
        assert_eq!(config.python_home, Some(PathBuf::from("/srv/python")));
        assert!(config.check_entry_result);
        assert_eq!(config.log_level, "modelo_host=debug");
    }

    #[test]
    fn test_from_lookup_empty_values_are_unset() {
        let config = BootstrapConfig::from_lookup(lookup_from(&[
            (ENV_MODULE_NAME, ""),
            (ENV_PYTHON_HOME, ""),
        ]))
        .unwrap();
        assert_eq!(config.module_name, MODULE_NAME);
        assert!(config.python_home.is_none());
    }

    #[test]
    fn test_from_lookup_rejects_bad_flag() {
        let err = BootstrapConfig::from_lookup(lookup_from(&[(ENV_CHECK_ENTRY_RESULT, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_CHECK_ENTRY_RESULT));
    }

    #[test]
    fn test_from_lookup_rejects_bad_extension() {
        let err =
            BootstrapConfig::from_lookup(lookup_from(&[(ENV_EXTENSION, "wheel")])).unwrap_err();
        assert!(err.to_string().contains("'wheel'"));
    }

    #[test]
    fn test_from_lookup_validates_overrides() {
        let err = BootstrapConfig::from_lookup(lookup_from(&[(ENV_MODULE_NAME, "not valid")]))
            .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"module_name": "from_file", "check_entry_result": true, "extension": "script"}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = BootstrapConfig::from_lookup(lookup_from(&[
            (ENV_CONFIG_FILE, path.as_str()),
            (ENV_CHECK_ENTRY_RESULT, "off"),
        ]))
        .unwrap();

        // file value kept, env value wins, untouched fields default
        assert_eq!(config.module_name, "from_file");
        assert!(!config.check_entry_result);
        assert_eq!(config.entry_function, ENTRY_FUNCTION);
    }

    #[test]
    fn test_config_file_unknown_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"module": "typo"}}"#).unwrap();

        let err = BootstrapConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, BootstrapError::ConfigFile { .. }));
    }

    #[test]
    fn test_config_file_missing() {
        let err = BootstrapConfig::from_file(Path::new("/nonexistent/modelo.json")).unwrap_err();
        assert!(matches!(err, BootstrapError::Io(_)));
    }

    #[test]
    fn test_config_serde_round_trip_uses_snake_case() {
        let config = BootstrapConfig::builder()
            .extension(ExtensionKind::Linked)
            .build()
            .unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["extension"], "linked");
        assert_eq!(json["module_name"], "modelo_ia");
    }
}
