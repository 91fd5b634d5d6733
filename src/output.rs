//! Where migration progress and printed commands go.

use colored::*;

/// Rails-style `== <version> <name>: <message> ====` line, padded to 79
/// columns.
pub fn announcement(version: &str, name: &str, message: &str) -> String {
    let text = format!("{} {}: {}", version, name, message);
    let padding = 75usize.saturating_sub(text.chars().count());
    format!("== {} {}", text, "=".repeat(padding))
}

/// Sink for announcements and printed command lines.
pub trait Output {
    /// A formatted [`announcement`].
    fn announce(&mut self, line: &str);

    /// Free text, e.g. a command line to run by hand.
    fn write(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

/// Colored terminal output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOutput {
    quiet: bool,
    text: Stream,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress announcements and move printed commands to stderr, leaving
    /// stdout to the caller.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self.text = Stream::Stderr;
        self
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Where [`Output::write`] goes.
    pub fn text_stream(&self) -> Stream {
        self.text
    }
}

impl Output for ConsoleOutput {
    fn announce(&mut self, line: &str) {
        if !self.quiet {
            println!("{}", line.cyan().bold());
        }
    }

    fn write(&mut self, text: &str) {
        match self.text {
            Stream::Stdout => println!("{}", text),
            Stream::Stderr => eprintln!("{}", text),
        }
    }
}

/// Keeps everything in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingOutput {
    pub announcements: Vec<String>,
    pub written: Vec<String>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Output for RecordingOutput {
    fn announce(&mut self, line: &str) {
        self.announcements.push(line.to_string());
    }

    fn write(&mut self, text: &str) {
        self.written.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_padding() {
        let line = announcement("20240101120000", "AddAgeToUsers", "migrating");
        assert!(line.starts_with("== 20240101120000 AddAgeToUsers: migrating ="));
        assert_eq!(line.chars().count(), 79);

        let long = announcement("1", &"x".repeat(100), "migrated (0.0100s)");
        assert!(long.ends_with("migrated (0.0100s) "));
    }

    #[test]
    fn test_quiet_console_keeps_stdout_clear() {
        let loud = ConsoleOutput::new();
        assert!(!loud.is_quiet());
        assert_eq!(loud.text_stream(), Stream::Stdout);

        let quiet = ConsoleOutput::new().quiet();
        assert!(quiet.is_quiet());
        assert_eq!(quiet.text_stream(), Stream::Stderr);
    }
}
