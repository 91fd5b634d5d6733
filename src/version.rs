//! Installed tool version and version requirements.
//!
//! The version is queried once per process by running
//! `pt-online-schema-change --version` and cached; [`reset_tool_version`]
//! clears the cache.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::separated_list1,
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::command::PROGRAM;
use crate::error::{OscError, OscResult};
use crate::runner::ToolRunner;

/// A dotted numeric version such as `2.2.7`.
#[derive(Debug, Clone, Eq)]
pub struct ToolVersion {
    segments: Vec<u64>,
}

impl ToolVersion {
    pub fn new(segments: &[u64]) -> Self {
        Self {
            segments: segments.to_vec(),
        }
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Parse the text printed by `pt-online-schema-change --version`.
    pub fn from_tool_output(output: &str) -> OscResult<Self> {
        let trimmed = output.trim();
        let stripped = trimmed.strip_prefix(PROGRAM).unwrap_or(trimmed);
        stripped.trim().parse()
    }

    /// Upper bound used by the pessimistic `~>` operator.
    fn bump(&self) -> Self {
        let mut segments = self.segments.clone();
        if segments.len() > 1 {
            segments.pop();
        }
        if let Some(last) = segments.last_mut() {
            *last += 1;
        }
        Self { segments }
    }

    fn segment(&self, i: usize) -> u64 {
        self.segments.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for ToolVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToolVersion {
    /// Missing trailing segments compare as zero, so `2.1 == 2.1.0`.
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

fn parse_segments(input: &str) -> IResult<&str, Vec<u64>> {
    separated_list1(char('.'), map_res(digit1, str::parse::<u64>))(input)
}

impl FromStr for ToolVersion {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(delimited(multispace0, parse_segments, multispace0))(s)
            .map(|(_, segments)| ToolVersion { segments })
            .map_err(|_| OscError::VersionParse(format!("'{}' is not a version", s)))
    }
}

/// Comparison operator of a [`VersionRequirement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `~> 2.2` means `>= 2.2, < 3`.
    Pessimistic,
}

impl VersionOp {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionOp::Eq => "=",
            VersionOp::Ne => "!=",
            VersionOp::Gt => ">",
            VersionOp::Gte => ">=",
            VersionOp::Lt => "<",
            VersionOp::Lte => "<=",
            VersionOp::Pessimistic => "~>",
        }
    }
}

/// One `op version` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: VersionOp,
    pub version: ToolVersion,
}

impl VersionConstraint {
    pub fn matches(&self, v: &ToolVersion) -> bool {
        match self.op {
            VersionOp::Eq => v == &self.version,
            VersionOp::Ne => v != &self.version,
            VersionOp::Gt => v > &self.version,
            VersionOp::Gte => v >= &self.version,
            VersionOp::Lt => v < &self.version,
            VersionOp::Lte => v <= &self.version,
            VersionOp::Pessimistic => v >= &self.version && v < &self.version.bump(),
        }
    }
}

/// A comma-separated list of constraints, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    constraints: Vec<VersionConstraint>,
}

impl VersionRequirement {
    /// `>= segments`
    pub fn at_least(segments: &[u64]) -> Self {
        Self {
            constraints: vec![VersionConstraint {
                op: VersionOp::Gte,
                version: ToolVersion::new(segments),
            }],
        }
    }

    pub fn is_satisfied_by(&self, version: &ToolVersion) -> bool {
        self.constraints.iter().all(|c| c.matches(version))
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{} {}", c.op.as_str(), c.version))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

fn parse_op(input: &str) -> IResult<&str, VersionOp> {
    alt((
        value(VersionOp::Gte, tag(">=")),
        value(VersionOp::Lte, tag("<=")),
        value(VersionOp::Ne, tag("!=")),
        value(VersionOp::Pessimistic, tag("~>")),
        value(VersionOp::Gt, char('>')),
        value(VersionOp::Lt, char('<')),
        value(VersionOp::Eq, char('=')),
    ))(input)
}

/// `[op] version`, a bare version means `=`.
fn parse_constraint(input: &str) -> IResult<&str, VersionConstraint> {
    map(
        pair(
            delimited(multispace0, opt(parse_op), multispace0),
            parse_segments,
        ),
        |(op, segments)| VersionConstraint {
            op: op.unwrap_or(VersionOp::Eq),
            version: ToolVersion { segments },
        },
    )(input)
}

impl FromStr for VersionRequirement {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list = separated_list1(
            tuple((multispace0, char(','), multispace0)),
            parse_constraint,
        );
        all_consuming(delimited(multispace0, list, multispace0))(s)
            .map(|(_, constraints)| VersionRequirement { constraints })
            .map_err(|_| OscError::VersionParse(format!("'{}' is not a version requirement", s)))
    }
}

static TOOL_VERSION: Mutex<Option<ToolVersion>> = Mutex::new(None);

/// Installed pt-online-schema-change version, queried at most once.
///
/// The lock is held across the query so concurrent callers never run
/// the tool twice. Failures are not cached.
pub fn tool_version(runner: &dyn ToolRunner) -> OscResult<ToolVersion> {
    let mut cached = TOOL_VERSION
        .lock()
        .map_err(|_| OscError::VersionQuery("version cache poisoned".into()))?;
    if let Some(version) = cached.as_ref() {
        return Ok(version.clone());
    }

    let args = vec![PROGRAM.to_string(), "--version".to_string()];
    let output = runner
        .capture(&args)
        .map_err(|e| OscError::VersionQuery(e.to_string()))?;
    let version = ToolVersion::from_tool_output(&output)?;
    tracing::debug!(target: "pt-osc", %version, "detected tool version");
    *cached = Some(version.clone());
    Ok(version)
}

/// Forget the cached version.
pub fn reset_tool_version() {
    if let Ok(mut cached) = TOOL_VERSION.lock() {
        *cached = None;
    }
}

/// Where the migrator gets its tool version from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionSource {
    /// Ask the installed tool through the process-wide cache.
    #[default]
    Probe,
    /// Use a known version without running anything.
    Fixed(ToolVersion),
}

impl VersionSource {
    pub fn resolve(&self, runner: &dyn ToolRunner) -> OscResult<ToolVersion> {
        match self {
            VersionSource::Probe => tool_version(runner),
            VersionSource::Fixed(version) => Ok(version.clone()),
        }
    }
}
