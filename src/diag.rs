//! Compile Diagnostics
//!
//! This module collects the warnings and errors a compile emits. Messages
//! carry the script name plus a 1-based line and column, print to stderr as
//! they are reported, and stay queryable on the collector afterwards so a
//! driver can decide whether the compile as a whole failed.
//!
//! A single error never aborts the compile by itself; it marks the build
//! failed and parsing continues at the next recovery boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a reported message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Suppressible with the quiet flag; never fails the compile
    Warning,
    /// Always reported; fails the compile without aborting it
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
        }
    }
}

/// A source position retained for later reporting.
///
/// The scanner captures one of these before speculative lookahead so a
/// message can point at where a construct began rather than where the
/// scanner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// 1-based source line
    pub line: u32,
    /// 1-based source column
    pub col: u32,
}

impl Frame {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// One reported message with its source context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    pub frame: Frame,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.frame.line, self.frame.col, self.level, self.message
        )
    }
}

/// Callback invoked for every reported message
pub type DiagSink = Box<dyn FnMut(&Diagnostic) + Send>;

/// Collector for one compile's messages
#[derive(Default)]
pub struct Diagnostics {
    name: String,
    quiet: bool,
    printing: bool,
    entries: Vec<Diagnostic>,
    error_count: usize,
    sink: Option<DiagSink>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("name", &self.name)
            .field("quiet", &self.quiet)
            .field("entries", &self.entries.len())
            .field("errors", &self.error_count)
            .finish()
    }
}

impl Diagnostics {
    /// Create a collector for the named script.
    ///
    /// `quiet` suppresses warning output (the entries are still recorded);
    /// errors always print.
    pub fn new(name: impl Into<String>, quiet: bool) -> Self {
        Self {
            name: name.into(),
            quiet,
            printing: true,
            entries: Vec::new(),
            error_count: 0,
            sink: None,
        }
    }

    /// Observe every message as it is reported, in addition to (or, with
    /// a silent collector, instead of) stderr output.
    pub fn set_sink(&mut self, sink: DiagSink) {
        self.sink = Some(sink);
    }

    /// Disable all stderr output; entries are only collected.
    pub fn silent(name: impl Into<String>) -> Self {
        let mut d = Self::new(name, true);
        d.printing = false;
        d
    }

    /// The script name used as message context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Report a warning at the given position.
    pub fn warn_at(&mut self, frame: Frame, message: impl Into<String>) {
        self.push(Level::Warning, frame, message.into());
    }

    /// Report an error at the given position.
    pub fn error_at(&mut self, frame: Frame, message: impl Into<String>) {
        self.push(Level::Error, frame, message.into());
    }

    fn push(&mut self, level: Level, frame: Frame, message: String) {
        let entry = Diagnostic {
            level,
            frame,
            message,
        };
        let print = match level {
            Level::Warning => self.printing && !self.quiet,
            Level::Error => self.printing,
        };
        if print {
            eprintln!("{}:{}", self.name, entry);
        }
        if let Some(sink) = &mut self.sink {
            sink(&entry);
        }
        if level == Level::Error {
            self.error_count += 1;
        }
        self.entries.push(entry);
    }

    /// All recorded messages, in emission order
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of errors reported so far
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether any error was reported
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Messages of the given level
    pub fn of_level(&self, level: Level) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.level == level)
    }
}
