//! # Neume: A Score Compiler for Modular Synthesis
//!
//! > *"A neume is the written mark from which a melody is read. Here, a
//! > score script is the mark, and what is read out is a graph of
//! > oscillators, modulators and ramps scheduled in musical time."*
//!
//! `neume` compiles a small domain-specific language describing modular
//! audio synthesis scores. A script names oscillators, noise sources and
//! value lines; patches them into carrier/modulator graphs (amplitude,
//! frequency, phase and ring modulation); schedules state changes in
//! musical time; and hands a renderer everything it needs as a fully
//! resolved [`Program`].
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  source bytes                            │
//! │    buffer    circular refill, markers    │
//! │    scanner   filters, comments, undo     │
//! │    parser    scopes, operators, labels   │  (expr for numbers)
//! ├──────────────────────────────────────────┤
//! │  parse graph                             │
//! │    timing    defaults, groups, linking   │
//! │    flatten   composite chains spliced    │
//! ├──────────────────────────────────────────┤
//! │  lowering                                │
//! │    voices    allocation with reuse       │
//! │    graphs    traversal-ordered op lists  │
//! │    Program   events, ramps, id arrays    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use neume::prelude::*;
//!
//! // A 440 Hz carrier, phase-modulated, over one second.
//! let compiled = compile_str("intro", "W f440 a0.5 t1 p![ W r2 a0.3 ]")
//!     .expect("compile");
//!
//! let program = &compiled.program;
//! assert_eq!(program.duration_ms, 1000);
//! assert_eq!(program.voice_count, 1);
//! println!("{}", program.summary());
//! ```
//!
//! ## Script Syntax (informal)
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `W` `N` `L` | New wave / noise / line operator (also `O`, `E`) |
//! | `a c f r p t s w g l n v` | Parameter setters on the operator |
//! | `x{c=.. t=.. v=..}` | Ramp toward a goal value |
//! | `x!` + `[ … ]` | Modulator sublist (`~[` ring, `+[` append) |
//! | `< … >` | Duration group: unset times end together |
//! | `;` | Composite: extend the operator in place |
//! | `\|` | Time separator |
//! | `\num` / `\t` | Wait before the next event |
//! | `'name` / `:name` | Label an operator / re-reference it |
//! | `$name = …` | Numeric variable |
//! | `#` | Line comment; `Q` ends the script |
//!
//! ## Module Documentation
//!
//! - [`buffer`] - Circular script buffer with refill callbacks
//! - [`scanner`] - Filtered character stream, undo ring, positions
//! - [`expr`] - Operator-precedence numeric expressions
//! - [`parser`] - Recursive-descent script parser
//! - [`ast`] - Parse-graph arenas and node types
//! - [`timing`] - Timing defaults, duration groups, flattening
//! - [`lower`] - Voice/operator allocation, graph building
//! - [`program`] - The compiled output consumed by the runtime
//! - [`ramp`] - Value ramps with the four line shapes
//! - [`names`] - Runtime name tables, pitch names, pan keywords
//! - [`symtab`] - String interning and typed named items
//! - [`diag`] - Warnings and errors with source positions
//! - [`rng`] - Deterministic seed streams for noise operators
//! - [`compile`] - The driver tying the passes together
//! - [`validate`] - Structural checks over compiled programs
//! - [`schedule`] - Clock-driven event walker and operator state merge
//! - [`viz`] - Graphviz DOT export of voice graphs
//! - [`presets`] - A library of ready-to-compile scores
//! - [`kit`] - Score builder, test harness, doc generator

pub mod ast;
pub mod buffer;
pub mod compile;
pub mod diag;
pub mod expr;
pub mod kit;
pub mod lower;
pub mod names;
pub mod parser;
pub mod presets;
pub mod program;
pub mod ramp;
pub mod rng;
pub mod scanner;
pub mod schedule;
pub mod symtab;
pub mod timing;
pub mod validate;
pub mod viz;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ast::UseKind;
    pub use crate::compile::{compile_str, CompileError, Compiled, Compiler, CompilerOptions};
    pub use crate::diag::{Diagnostic, Frame, Level};
    pub use crate::names::{NameKind, NameRegistry};
    pub use crate::program::{
        Event, ObjectType, OpData, OpMods, OpRef, Program, ProgramMode, ProgramStats, VoData,
    };
    pub use crate::ramp::{LineShape, Ramp, RampCursor, RampFlags, DEFAULT_TIME_MS};
    pub use crate::validate::{validate, Violation};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
