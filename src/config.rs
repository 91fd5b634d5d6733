//! Database and pt-osc configuration.
//!
//! Loaded from a TOML file shaped like a single database entry:
//!
//! ```toml
//! database = "app_production"
//! username = "deploy"
//! password = "secret"
//!
//! [percona]
//! run_mode = "execute"
//! log = "log/pt_osc.log"
//! defaults-file = "config/my.cnf"
//! user = false
//! ```
//!
//! Keys under `[percona]` other than `run_mode` and `log` are flag overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OscError, OscResult};
use crate::flags::{Flag, FlagOptions, FlagSpecTable};

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "log/pt_osc.log";

/// Default configuration file used by the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "config/database.toml";

/// A scalar configuration or flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FlagValue {
    /// Truthiness used for boolean flags and the `execute` pseudo-flag.
    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Int(i) => *i != 0,
            FlagValue::Float(f) => *f != 0.0,
            FlagValue::Text(s) => {
                let s = s.trim();
                !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
            }
        }
    }

    /// Parse a CLI-supplied `value`, recognizing booleans and integers.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => FlagValue::Bool(true),
            "false" => FlagValue::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(FlagValue::Int)
                .unwrap_or_else(|_| FlagValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Float(x) => write!(f, "{}", x),
            FlagValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        FlagValue::Int(i)
    }
}

impl From<i32> for FlagValue {
    fn from(i: i32) -> Self {
        FlagValue::Int(i64::from(i))
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Text(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        FlagValue::Text(s)
    }
}

/// How accumulated ALTERs are dispatched at the end of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Emit the dry-run and execute command lines without running them.
    #[default]
    Print,
    /// Run pt-online-schema-change for every table.
    Execute,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Print => "print",
            RunMode::Execute => "execute",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "print" => Ok(RunMode::Print),
            "execute" => Ok(RunMode::Execute),
            other => Err(OscError::Configuration(format!(
                "Invalid run_mode '{}' specified in database config (expected print or execute)",
                other
            ))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[percona]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerconaConfig {
    /// Raw run mode; validated by [`PerconaConfig::run_mode`].
    #[serde(default)]
    pub run_mode: Option<String>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    /// Everything else: flag overrides keyed by flag name.
    #[serde(flatten)]
    pub overrides: BTreeMap<String, FlagValue>,
}

impl PerconaConfig {
    /// Validated run mode, `print` when unset.
    pub fn run_mode(&self) -> OscResult<RunMode> {
        match self.run_mode.as_deref() {
            None => Ok(RunMode::default()),
            Some(raw) => raw.parse(),
        }
    }

    pub fn with_run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode.as_str().to_string());
        self
    }

    pub fn with_override(mut self, flag: &str, value: impl Into<FlagValue>) -> Self {
        self.overrides.insert(flag.to_string(), value.into());
        self
    }

    /// Log path as configured, before absolutizing.
    pub fn log_path(&self) -> &Path {
        self.log.as_deref().unwrap_or(Path::new(DEFAULT_LOG_PATH))
    }

    /// Overrides restricted to flags present in `specs`.
    pub fn flag_overrides(&self, specs: &FlagSpecTable) -> FlagOptions {
        let mut options = FlagOptions::new();
        for (key, value) in &self.overrides {
            match key.parse::<Flag>() {
                Ok(flag) if specs.contains(flag) => options.set(flag, value.clone()),
                _ => {}
            }
        }
        options
    }
}

/// One database entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub percona: PerconaConfig,
}

impl DatabaseConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn percona(mut self, percona: PerconaConfig) -> Self {
        self.percona = percona;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> OscResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> OscResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OscError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Top-level value by key name, used by the config-lookup mutator.
    pub fn get(&self, key: &str) -> Option<FlagValue> {
        match key {
            "database" if !self.database.is_empty() => Some(self.database.clone().into()),
            "username" | "user" => self.username.clone().map(FlagValue::Text),
            "password" => self.password.clone().map(FlagValue::Text),
            "host" => self.host.clone().map(FlagValue::Text),
            "port" => self.port.map(|p| FlagValue::Int(i64::from(p))),
            "socket" => self.socket.clone().map(FlagValue::Text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg = DatabaseConfig::from_toml(
            r#"
database = "app"
username = "deploy"
password = "secret"
port = 3306

[percona]
run_mode = "execute"
log = "log/custom.log"
defaults-file = "config/my.cnf"
check-alter = false
chunk-size = 500
user = false
"#,
        )
        .unwrap();

        assert_eq!(cfg.database, "app");
        assert_eq!(cfg.get("username"), Some(FlagValue::Text("deploy".into())));
        assert_eq!(cfg.get("port"), Some(FlagValue::Int(3306)));
        assert_eq!(cfg.percona.run_mode().unwrap(), RunMode::Execute);
        assert_eq!(cfg.percona.log_path(), Path::new("log/custom.log"));
        assert_eq!(
            cfg.percona.overrides.get("check-alter"),
            Some(&FlagValue::Bool(false))
        );
        assert_eq!(
            cfg.percona.overrides.get("chunk-size"),
            Some(&FlagValue::Int(500))
        );
        assert!(!cfg.percona.overrides.contains_key("run_mode"));
    }

    #[test]
    fn test_run_mode_defaults_to_print() {
        let cfg = DatabaseConfig::from_toml("database = \"app\"").unwrap();
        assert_eq!(cfg.percona.run_mode().unwrap(), RunMode::Print);
        assert_eq!(cfg.percona.log_path(), Path::new(DEFAULT_LOG_PATH));
    }

    #[test]
    fn test_invalid_run_mode_is_configuration_error() {
        let cfg = DatabaseConfig::from_toml(
            r#"
database = "app"
[percona]
run_mode = "sometimes"
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.percona.run_mode(),
            Err(OscError::Configuration(_))
        ));
    }

    #[test]
    fn test_flag_overrides_drop_unknown_keys() {
        let percona = PerconaConfig::default()
            .with_override("chunk-size", 1000)
            .with_override("not-a-real-flag", "x");
        let options = percona.flag_overrides(&FlagSpecTable::standard());
        assert_eq!(options.get(Flag::ChunkSize), Some(&FlagValue::Int(1000)));
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn test_flag_value_truthiness() {
        assert!(FlagValue::Bool(true).is_truthy());
        assert!(!FlagValue::Text("false".into()).is_truthy());
        assert!(!FlagValue::Int(0).is_truthy());
        assert!(FlagValue::Text("yes".into()).is_truthy());
        assert_eq!(FlagValue::parse("42"), FlagValue::Int(42));
        assert_eq!(FlagValue::parse("false"), FlagValue::Bool(false));
        assert_eq!(FlagValue::parse("0.5"), FlagValue::Text("0.5".into()));
    }
}
