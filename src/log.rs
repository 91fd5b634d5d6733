//! The pt-osc log file and command redaction.
//!
//! Lines look like `2024-01-01T12:00:00Z [pt-osc] INFO Running on app|users: ...`
//! and are mirrored as `tracing` events under the `pt-osc` target.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::Level;

use crate::error::OscResult;
use crate::shell;

pub const LOG_TAG: &str = "pt-osc";

/// Replaces secret flag values in anything logged.
pub const REDACTED: &str = "_hidden_";

const DEFAULT_SECRET_FLAGS: [&str; 1] = ["--password"];

/// Append-only, tagged line writer.
pub struct OscLog {
    sink: Box<dyn Write + Send>,
    path: Option<PathBuf>,
}

impl fmt::Debug for OscLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscLog").field("path", &self.path).finish()
    }
}

impl OscLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> OscResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Box::new(file),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(writer),
            path: None,
        }
    }

    /// Discards lines; they still reach `tracing`.
    pub fn discard() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&mut self, message: &str) -> OscResult<()> {
        tracing::info!(target: "pt-osc", "{}", message);
        self.write_line(Level::INFO, message)
    }

    pub fn error(&mut self, message: &str) -> OscResult<()> {
        tracing::error!(target: "pt-osc", "{}", message);
        self.write_line(Level::ERROR, message)
    }

    fn write_line(&mut self, level: Level, message: &str) -> OscResult<()> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writeln!(self.sink, "{} [{}] {} {}", timestamp, LOG_TAG, level, message)?;
        self.sink.flush()?;
        Ok(())
    }
}

/// Replace the token after each secret flag, and the value of
/// `--flag=value` forms. A trailing secret flag is left alone.
pub fn redact_args<S: AsRef<str>>(args: &[S], secret_flags: &[&str]) -> Vec<String> {
    let mut hide_next = false;
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            redact_word(arg, &mut hide_next, secret_flags).unwrap_or_else(|| arg.to_string())
        })
        .collect()
}

/// Replacement for `arg`, if it carries a secret.
fn redact_word(arg: &str, hide_next: &mut bool, secret_flags: &[&str]) -> Option<String> {
    if std::mem::take(hide_next) {
        return Some(REDACTED.to_string());
    }
    if secret_flags.contains(&arg) {
        *hide_next = true;
        return None;
    }
    secret_flags
        .iter()
        .find(|flag| arg.strip_prefix(**flag).is_some_and(|rest| rest.starts_with('=')))
        .map(|flag| format!("{}={}", flag, REDACTED))
}

/// Redact `--password` values from a shell command line.
pub fn sanitize_command(line: &str) -> String {
    sanitize_command_with(line, &DEFAULT_SECRET_FLAGS)
}

/// Redact the values of `secret_flags` from a shell command line.
///
/// The line is tokenized with the same quoting rules used to build it, so
/// quoted values are hidden whole. Only the secret words are rewritten;
/// the rest of the line is kept as written.
pub fn sanitize_command_with(line: &str, secret_flags: &[&str]) -> String {
    let words = match shell::split_words(line) {
        Ok(words) => words,
        Err(_) => return truncate_after_secret(line, secret_flags),
    };

    let mut out = String::with_capacity(line.len());
    let mut copied = 0;
    let mut hide_next = false;
    for word in &words {
        if let Some(replacement) = redact_word(&word.value, &mut hide_next, secret_flags) {
            out.push_str(&line[copied..word.start]);
            out.push_str(&replacement);
            copied = word.end();
        }
    }
    out.push_str(&line[copied..]);
    out
}

/// Fallback for lines that cannot be tokenized: drop everything after the
/// first secret flag.
fn truncate_after_secret(line: &str, secret_flags: &[&str]) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        for flag in secret_flags {
            let is_pair = word.strip_prefix(*flag).is_some_and(|rest| rest.starts_with('='));
            if is_pair {
                return format!("{} {}={}", words[..i].join(" "), flag, REDACTED)
                    .trim_start()
                    .to_string();
            }
            if word == flag && i + 1 < words.len() {
                return format!("{} {}", words[..=i].join(" "), REDACTED);
            }
        }
    }
    line.to_string()
}
