//! pt-online-schema-change flag whitelist.
//!
//! [`FlagSpecTable`] is the single whitelist of flags that may be forwarded
//! to the tool. Each entry's [`FlagSpec`] controls defaults, version gating,
//! boolean rendering and value mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{DatabaseConfig, FlagValue};
use crate::version::VersionRequirement;

/// Every flag the engine knows how to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Execute,
    DefaultsFile,
    RecursionMethod,
    CheckAlter,
    CheckUniqueKeyChange,
    CheckReplicationFilters,
    DropOldTable,
    AlterForeignKeysMethod,
    ChunkSize,
    ChunkTime,
    MaxLag,
    MaxLoad,
    CriticalLoad,
    Progress,
    Statistics,
    User,
    Password,
}

impl Flag {
    pub const ALL: [Flag; 17] = [
        Flag::Execute,
        Flag::DefaultsFile,
        Flag::RecursionMethod,
        Flag::CheckAlter,
        Flag::CheckUniqueKeyChange,
        Flag::CheckReplicationFilters,
        Flag::DropOldTable,
        Flag::AlterForeignKeysMethod,
        Flag::ChunkSize,
        Flag::ChunkTime,
        Flag::MaxLag,
        Flag::MaxLoad,
        Flag::CriticalLoad,
        Flag::Progress,
        Flag::Statistics,
        Flag::User,
        Flag::Password,
    ];

    /// Name as written on the command line, without the leading `--`.
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Execute => "execute",
            Flag::DefaultsFile => "defaults-file",
            Flag::RecursionMethod => "recursion-method",
            Flag::CheckAlter => "check-alter",
            Flag::CheckUniqueKeyChange => "check-unique-key-change",
            Flag::CheckReplicationFilters => "check-replication-filters",
            Flag::DropOldTable => "drop-old-table",
            Flag::AlterForeignKeysMethod => "alter-foreign-keys-method",
            Flag::ChunkSize => "chunk-size",
            Flag::ChunkTime => "chunk-time",
            Flag::MaxLag => "max-lag",
            Flag::MaxLoad => "max-load",
            Flag::CriticalLoad => "critical-load",
            Flag::Progress => "progress",
            Flag::Statistics => "statistics",
            Flag::User => "user",
            Flag::Password => "password",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = String;

    /// Accepts both `defaults-file` and `defaults_file`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim_start_matches("--").replace('_', "-");
        Flag::ALL
            .into_iter()
            .find(|flag| flag.as_str() == normalized)
            .ok_or_else(|| format!("unknown flag '{}'", s))
    }
}

/// Typed option map keyed by [`Flag`].
///
/// Iteration follows [`Flag`] declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagOptions {
    values: BTreeMap<Flag, FlagValue>,
}

impl FlagOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with only `execute` set.
    pub fn execute(execute: bool) -> Self {
        Self::new().with(Flag::Execute, execute)
    }

    pub fn with(mut self, flag: Flag, value: impl Into<FlagValue>) -> Self {
        self.set(flag, value.into());
        self
    }

    pub fn set(&mut self, flag: Flag, value: FlagValue) {
        self.values.insert(flag, value);
    }

    pub fn get(&self, flag: Flag) -> Option<&FlagValue> {
        self.values.get(&flag)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.values.contains_key(&flag)
    }

    pub fn remove(&mut self, flag: Flag) -> Option<FlagValue> {
        self.values.remove(&flag)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the `execute` pseudo-flag is truthy.
    pub fn is_execute(&self) -> bool {
        self.get(Flag::Execute).is_some_and(FlagValue::is_truthy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Flag, &FlagValue)> {
        self.values.iter().map(|(flag, value)| (*flag, value))
    }

    /// Build from string keys, silently dropping names that are not flags.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<FlagValue>,
    {
        let mut options = Self::new();
        for (key, value) in pairs {
            if let Ok(flag) = key.as_ref().parse::<Flag>() {
                options.set(flag, value.into());
            }
        }
        options
    }
}

/// Named transform applied to a resolved flag value before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutator {
    /// Resolve relative paths against the working directory.
    PathAbsolutize,
    /// Use the flag's default unless the tool is really executing.
    ExecuteGate,
    /// Fall back to a top-level database config key. An explicit `false`
    /// suppresses the flag. `key` defaults to the flag name.
    ConfigLookup { key: Option<&'static str> },
}

/// Everything a mutator may consult.
pub struct MutatorContext<'a> {
    pub flag: Flag,
    pub spec: &'a FlagSpec,
    /// Fully merged options (caller > config > default).
    pub options: &'a FlagOptions,
    pub config: &'a DatabaseConfig,
    pub cwd: &'a Path,
}

impl Mutator {
    /// Returns `None` when the flag should be omitted.
    pub fn apply(&self, value: Option<FlagValue>, ctx: &MutatorContext<'_>) -> Option<FlagValue> {
        match self {
            Mutator::PathAbsolutize => {
                value.map(|v| FlagValue::Text(make_path_absolute(&v.to_string(), ctx.cwd)))
            }
            Mutator::ExecuteGate => {
                if ctx.options.is_execute() {
                    value
                } else {
                    ctx.spec.default.clone()
                }
            }
            Mutator::ConfigLookup { key } => match value {
                Some(FlagValue::Bool(false)) => None,
                None => ctx.config.get(key.unwrap_or(ctx.flag.as_str())),
                other => other,
            },
        }
    }
}

/// Resolve `path` against `cwd` unless it is already absolute.
///
/// A leading `~/` is expanded to the home directory.
pub fn make_path_absolute(path: &str, cwd: &Path) -> String {
    let expanded: PathBuf = match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    };

    if expanded.is_absolute() {
        expanded.to_string_lossy().into_owned()
    } else {
        cwd.join(expanded).to_string_lossy().into_owned()
    }
}

/// Rendering rules for one flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSpec {
    pub default: Option<FlagValue>,
    pub version: Option<VersionRequirement>,
    pub boolean: bool,
    pub mutator: Option<Mutator>,
    /// Value must be redacted before logging.
    pub secret: bool,
}

impl FlagSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<FlagValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn version(mut self, requirement: VersionRequirement) -> Self {
        self.version = Some(requirement);
        self
    }

    pub fn boolean(mut self) -> Self {
        self.boolean = true;
        self
    }

    pub fn mutator(mut self, mutator: Mutator) -> Self {
        self.mutator = Some(mutator);
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Ordered whitelist of forwarded flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSpecTable {
    entries: Vec<(Flag, FlagSpec)>,
}

impl FlagSpecTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table used unless a caller supplies its own.
    pub fn standard() -> Self {
        Self::empty()
            .with(Flag::Execute, FlagSpec::new().default_value(false))
            .with(
                Flag::DefaultsFile,
                FlagSpec::new().mutator(Mutator::PathAbsolutize),
            )
            .with(
                Flag::RecursionMethod,
                FlagSpec::new().version(VersionRequirement::at_least(&[2, 1, 0])),
            )
            .with(
                Flag::CheckAlter,
                FlagSpec::new()
                    .boolean()
                    .default_value(true)
                    .mutator(Mutator::ExecuteGate),
            )
            .with(
                Flag::CheckUniqueKeyChange,
                FlagSpec::new()
                    .boolean()
                    .default_value(true)
                    .version(VersionRequirement::at_least(&[2, 2, 20])),
            )
            .with(Flag::CheckReplicationFilters, FlagSpec::new().boolean())
            .with(Flag::DropOldTable, FlagSpec::new().boolean())
            .with(Flag::AlterForeignKeysMethod, FlagSpec::new())
            .with(Flag::ChunkSize, FlagSpec::new())
            .with(Flag::ChunkTime, FlagSpec::new())
            .with(Flag::MaxLag, FlagSpec::new())
            .with(Flag::MaxLoad, FlagSpec::new())
            .with(Flag::CriticalLoad, FlagSpec::new())
            .with(Flag::Progress, FlagSpec::new())
            .with(Flag::Statistics, FlagSpec::new().boolean())
            .with(
                Flag::User,
                FlagSpec::new().mutator(Mutator::ConfigLookup {
                    key: Some("username"),
                }),
            )
            .with(
                Flag::Password,
                FlagSpec::new()
                    .mutator(Mutator::ConfigLookup { key: None })
                    .secret(),
            )
    }

    /// Add or replace an entry. Replacing keeps the original position.
    pub fn with(mut self, flag: Flag, spec: FlagSpec) -> Self {
        match self.entries.iter_mut().find(|(f, _)| *f == flag) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((flag, spec)),
        }
        self
    }

    pub fn without(mut self, flag: Flag) -> Self {
        self.entries.retain(|(f, _)| *f != flag);
        self
    }

    pub fn get(&self, flag: Flag) -> Option<&FlagSpec> {
        self.entries
            .iter()
            .find(|(f, _)| *f == flag)
            .map(|(_, spec)| spec)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.get(flag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Flag, &FlagSpec)> {
        self.entries.iter().map(|(flag, spec)| (*flag, spec))
    }

    /// Flags whose values must never reach a log.
    pub fn secret_flags(&self) -> impl Iterator<Item = Flag> + '_ {
        self.iter()
            .filter(|(_, spec)| spec.secret)
            .map(|(flag, _)| flag)
    }

    /// Keep only options for flags in this table.
    pub fn whitelist(&self, options: &FlagOptions) -> FlagOptions {
        let mut out = FlagOptions::new();
        for (flag, value) in options.iter() {
            if self.contains(flag) {
                out.set(flag, value.clone());
            }
        }
        out
    }
}
