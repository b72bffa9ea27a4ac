//! Compile Score Example
//!
//! A minimal example showing the core Neume workflow.
//!
//! Run with: cargo run --example compile_score

use neume::prelude::*;

fn main() {
    // A short score: an FM bell over a noise swell, then a chord group.
    let score = "\
$root = 220\n\
W f$root a0.6 t1.5 f![ W r3.5 a2 ]\n\
\\0.5 N pk a0.2 t1\n\
\\1 < W fC4 t=1 W fE4 t=1 W fG4 t=1 >\n";

    // Compile with a fixed seed so repeated runs agree byte for byte.
    let compiler = Compiler::new().with_options(CompilerOptions::default().with_seed(42));
    let compiled = compiler.compile_str("demo", score).expect("compile");

    if compiled.failed {
        eprintln!("compile failed with {} diagnostics", compiled.diagnostics.len());
        std::process::exit(1);
    }

    // Report the results
    let p = &compiled.program;
    println!(
        "Compiled '{}': {} events, {} voices, {} operators",
        p.name,
        p.events.len(),
        p.voice_count,
        p.operator_count
    );
    println!("Duration: {} ms, nest depth {}", p.duration_ms, p.op_nest_depth);
}
