//! Compile Driver
//!
//! Wires the pipeline together: script bytes flow through the buffer and
//! scanner into the parser, the timing and flattening passes resolve the
//! event chain, and lowering emits the final [`Program`].
//!
//! One compile owns one buffer, one symbol table and one parse arena;
//! everything is dropped together on any return path. Multiple compiles
//! may run on separate threads, nothing is shared.

use crate::buffer::ScriptBuffer;
use crate::diag::{Diagnostic, Diagnostics};
use crate::lower::{self, LowerError};
use crate::names::NameRegistry;
use crate::parser::Parser;
use crate::program::Program;
use crate::timing;
use std::fmt;
use std::path::Path;

/// Knobs for one compiler instance
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Suppress warning output (warnings are still recorded)
    pub quiet_warnings: bool,
    /// No stderr output at all; diagnostics are only collected
    pub silent: bool,
    /// Seed for the noise-operator seed stream; fresh entropy when unset
    pub seed: Option<u64>,
}

impl CompilerOptions {
    pub fn quiet(mut self) -> Self {
        self.quiet_warnings = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Hard failure of a compile; no program results
#[derive(Debug)]
pub enum CompileError {
    /// Opening or reading the script failed before scanning could start
    Io(std::io::Error),
    /// The program exceeds an implementation limit
    TooLarge(LowerError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io(e) => write!(f, "script I/O failed: {}", e),
            CompileError::TooLarge(e) => write!(f, "program too large: {}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

/// A finished compile: the program plus everything reported on the way
#[derive(Debug)]
pub struct Compiled {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
    /// Errors were reported; the program exists but the build failed
    pub failed: bool,
}

/// A reusable compiler configuration
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    registry: NameRegistry,
    options: CompilerOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the runtime's own name tables instead of the defaults.
    pub fn with_registry(mut self, registry: NameRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Compile an in-memory script.
    pub fn compile_str(&self, name: &str, source: &str) -> Result<Compiled, CompileError> {
        self.compile_buffer(name, ScriptBuffer::from_str(source))
    }

    /// Compile a script from any byte stream.
    pub fn compile_reader(
        &self,
        name: &str,
        reader: impl std::io::Read + 'static,
    ) -> Result<Compiled, CompileError> {
        self.compile_buffer(name, ScriptBuffer::from_reader(reader))
    }

    /// Compile a script file; the file name becomes the program name.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Compiled, CompileError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let buffer = ScriptBuffer::open(path)?;
        self.compile_buffer(&name, buffer)
    }

    fn compile_buffer(&self, name: &str, buffer: ScriptBuffer) -> Result<Compiled, CompileError> {
        let diag = if self.options.silent {
            Diagnostics::silent(name)
        } else {
            Diagnostics::new(name, self.options.quiet_warnings)
        };

        let parser = Parser::new(buffer, &self.registry, diag);
        let mut out = parser.run();

        timing::time_graph(&mut out.graph, &out.options);
        timing::flatten_graph(&mut out.graph);

        let seed = self.options.seed.unwrap_or_else(rand::random);
        let mut diag = out.diag;
        let program = lower::lower(&mut out.graph, &out.options, name, seed, &mut diag)
            .map_err(CompileError::TooLarge)?;

        Ok(Compiled {
            failed: diag.has_errors(),
            diagnostics: diag.entries().to_vec(),
            program,
        })
    }
}

/// Compile an in-memory script with default settings.
pub fn compile_str(name: &str, source: &str) -> Result<Compiled, CompileError> {
    Compiler::new().compile_str(name, source)
}
