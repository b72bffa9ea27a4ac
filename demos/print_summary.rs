//! Print Summary Example
//!
//! Compiles a score file given on the command line (or a built-in one)
//! and prints the event-by-event program summary, plus the JSON form with
//! `--json`.
//!
//! Run with: cargo run --example print_summary -- path/to/score.nm

use neume::prelude::*;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut json = false;
    for arg in &mut args {
        if arg == "--json" {
            json = true;
        } else {
            path = Some(arg);
        }
    }

    let compiler = Compiler::new();
    let compiled = match path {
        Some(p) => compiler.compile_file(&p),
        None => compiler.compile_str("builtin", "W f440 a0.5 t1 ; t0.5 w=sqr"),
    };

    let compiled = match compiled {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", compiled.program.to_json().expect("serialize"));
    } else {
        print!("{}", compiled.program.summary());
    }

    if compiled.failed {
        std::process::exit(1);
    }
}
