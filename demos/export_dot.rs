//! Export DOT Example
//!
//! Compiles a score and prints its voice graphs as Graphviz DOT, ready
//! for `dot -Tsvg`.
//!
//! Run with: cargo run --example export_dot

use neume::prelude::*;
use neume::viz::{DotExporter, DotStyle};

fn main() {
    // A two-level FM stack with a ring amplitude modulator.
    let score = "W f220 a0.5 t2 f![ W r2 a1 p![ W r0.5 ] ] a!~[ W r7 a0.3 ]";

    let compiled = Compiler::new()
        .with_options(CompilerOptions::default().with_seed(1))
        .compile_str("dot-demo", score)
        .expect("compile");

    let style = if std::env::args().any(|a| a == "--plain") {
        DotStyle::plain()
    } else {
        DotStyle::default()
    };

    print!("{}", DotExporter::export(&compiled.program, &style));
}
