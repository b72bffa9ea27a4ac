//! Program Visualization
//!
//! Exports a compiled program's voice graphs to Graphviz DOT for
//! debugging patches and documenting scores. Operators become nodes
//! (labelled with their type and id), modulator edges carry their use
//! kind, and each voice clusters its operators around the carrier.
//!
//! ```rust
//! use neume::prelude::*;
//! use neume::viz::{DotExporter, DotStyle};
//!
//! let compiled = compile_str("fm", "W f220 t1 f![ W r2 a1 ]").unwrap();
//! let dot = DotExporter::export(&compiled.program, &DotStyle::default());
//! assert!(dot.starts_with("digraph program"));
//! ```

use crate::ast::UseKind;
use crate::program::{ObjectType, Program};
use std::collections::HashMap;

/// Visual styling options for DOT export
#[derive(Debug, Clone)]
pub struct DotStyle {
    /// Graph direction: "TB" (top-bottom) or "LR" (left-right)
    pub rankdir: String,
    pub bg_color: String,
    pub node_shape: String,
    pub carrier_color: String,
    pub modulator_color: String,
    pub font_name: String,
    pub font_size: u32,
    /// Label edges with their modulation kind
    pub show_use_kinds: bool,
    /// Group each voice into a cluster
    pub cluster_voices: bool,
}

impl Default for DotStyle {
    fn default() -> Self {
        Self {
            rankdir: "TB".to_string(),
            bg_color: "#1e1e2e".to_string(),
            node_shape: "box".to_string(),
            carrier_color: "#89b4fa".to_string(),
            modulator_color: "#a6e3a1".to_string(),
            font_name: "Helvetica".to_string(),
            font_size: 11,
            show_use_kinds: true,
            cluster_voices: true,
        }
    }
}

impl DotStyle {
    /// A plain black-on-white style for documentation.
    pub fn plain() -> Self {
        Self {
            bg_color: "white".to_string(),
            carrier_color: "#dddddd".to_string(),
            modulator_color: "#ffffff".to_string(),
            ..Self::default()
        }
    }
}

/// Export compiled programs to Graphviz DOT format
pub struct DotExporter;

impl DotExporter {
    /// Export every voice graph of the program.
    pub fn export(program: &Program, style: &DotStyle) -> String {
        let mut dot = String::new();

        dot.push_str("digraph program {\n");
        dot.push_str(&format!("    rankdir={};\n", style.rankdir));
        dot.push_str(&format!("    bgcolor=\"{}\";\n", style.bg_color));
        dot.push_str(&format!(
            "    node [shape={}, style=filled, fontname=\"{}\", fontsize={}];\n",
            style.node_shape, style.font_name, style.font_size
        ));
        dot.push_str(&format!(
            "    edge [fontname=\"{}\", fontsize={}];\n",
            style.font_name,
            style.font_size.saturating_sub(2)
        ));
        dot.push('\n');

        // Operator labels come from the defining state changes.
        let mut op_types: HashMap<u32, ObjectType> = HashMap::new();
        for ev in &program.events {
            for od in &ev.op_data {
                op_types.entry(od.op_id).or_insert(od.object_type);
            }
        }

        // One subgraph per voice, from the last graph each voice carried.
        let mut voice_graphs: HashMap<u32, &crate::program::VoData> = HashMap::new();
        for ev in &program.events {
            if let Some(vd) = &ev.voice_data {
                voice_graphs.insert(ev.voice_id, vd);
            }
        }
        let mut voices: Vec<u32> = voice_graphs.keys().copied().collect();
        voices.sort_unstable();

        for v in voices {
            let vd = voice_graphs[&v];
            if style.cluster_voices {
                dot.push_str(&format!("    subgraph cluster_voice{} {{\n", v));
                dot.push_str(&format!("        label=\"voice {}\";\n", v));
            }
            for r in &vd.op_list {
                let ty = op_types
                    .get(&r.op_id)
                    .map(|t| t.name())
                    .unwrap_or("op");
                let color = if r.use_kind == UseKind::Carr {
                    &style.carrier_color
                } else {
                    &style.modulator_color
                };
                dot.push_str(&format!(
                    "        op{} [label=\"{} {}\", fillcolor=\"{}\"];\n",
                    r.op_id, ty, r.op_id, color
                ));
            }
            if style.cluster_voices {
                dot.push_str("    }\n");
            }
        }
        dot.push('\n');

        // Modulator edges from the final list state of each operator.
        let mut edges: HashMap<(u32, u32), UseKind> = HashMap::new();
        for ev in &program.events {
            for od in &ev.op_data {
                let Some(mods) = &od.mods else { continue };
                for (i, kind) in UseKind::MOD_KINDS.iter().enumerate() {
                    if let Some(ids) = mods.by_index(i) {
                        for &id in ids {
                            edges.insert((id, od.op_id), *kind);
                        }
                    }
                }
            }
        }
        let mut edge_list: Vec<((u32, u32), UseKind)> = edges.into_iter().collect();
        edge_list.sort_by_key(|&((from, to), _)| (from, to));

        for ((from, to), kind) in edge_list {
            if style.show_use_kinds {
                dot.push_str(&format!(
                    "    op{} -> op{} [label=\"{}\"];\n",
                    from,
                    to,
                    kind.name()
                ));
            } else {
                dot.push_str(&format!("    op{} -> op{};\n", from, to));
            }
        }

        dot.push_str("}\n");
        dot
    }
}

/// Renders a program's events as an ASCII timeline, one row per voice.
///
/// `#` marks an event, `=` sustained material, `.` silence. Good enough
/// to eyeball why a score sounds empty in its second half.
pub struct Timeline;

impl Timeline {
    pub fn render(program: &Program, width: usize) -> String {
        let width = width.max(8);
        let total = u64::from(program.duration_ms.max(1));
        let mut rows: Vec<Vec<u8>> =
            vec![vec![b'.'; width]; program.voice_count as usize];

        let mut abs: u64 = 0;
        for ev in &program.events {
            abs += u64::from(ev.wait_ms);
            let col = ((abs * (width as u64 - 1)) / total) as usize;
            let row = ev.voice_id as usize;
            if row >= rows.len() {
                continue;
            }
            let dur = ev
                .op_data
                .iter()
                .map(|od| u64::from(od.time_ms))
                .max()
                .unwrap_or(0);
            let end_col = (((abs + dur).min(total) * (width as u64 - 1)) / total) as usize;
            for c in col..=end_col.min(width - 1) {
                if rows[row][c] == b'.' {
                    rows[row][c] = b'=';
                }
            }
            rows[row][col] = b'#';
        }

        let mut out = String::new();
        out.push_str(&format!(
            "timeline '{}' ({} ms, {} voices)\n",
            program.name, program.duration_ms, program.voice_count
        ));
        for (v, row) in rows.iter().enumerate() {
            out.push_str(&format!("v{:<3} |", v));
            out.push_str(std::str::from_utf8(row).expect("ascii row"));
            out.push_str("|\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Compiler, CompilerOptions};

    fn compiled(src: &str) -> Program {
        Compiler::new()
            .with_options(CompilerOptions::default().silent().with_seed(5))
            .compile_str("viz", src)
            .unwrap()
            .program
    }

    #[test]
    fn test_export_structure() {
        let p = compiled("W f220 t1 f![ W r2 a1 ]");
        let dot = DotExporter::export(&p, &DotStyle::default());
        assert!(dot.starts_with("digraph program {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("subgraph cluster_voice0"));
        assert!(dot.contains("op0 [label=\"wave 0\""));
        assert!(dot.contains("op1 -> op0 [label=\"FM\"]"));
    }

    #[test]
    fn test_export_without_clusters() {
        let p = compiled("W f220 t1");
        let mut style = DotStyle::default();
        style.cluster_voices = false;
        style.show_use_kinds = false;
        let dot = DotExporter::export(&p, &style);
        assert!(!dot.contains("subgraph"));
        assert!(dot.contains("op0"));
    }

    #[test]
    fn test_export_multiple_voices() {
        let p = compiled("W f220 t1 \\0.1 W f440 t1");
        let dot = DotExporter::export(&p, &DotStyle::default());
        assert!(dot.contains("cluster_voice0"));
        assert!(dot.contains("cluster_voice1"));
    }

    #[test]
    fn test_edges_deduplicated_and_ordered() {
        let p = compiled("'m W f100 a![ 'x W r1 ]\n:m a![ :x ]");
        let dot = DotExporter::export(&p, &DotStyle::default());
        let count = dot.matches("-> op0").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_plain_style() {
        let style = DotStyle::plain();
        assert_eq!(style.bg_color, "white");
        let p = compiled("W t1");
        let dot = DotExporter::export(&p, &style);
        assert!(dot.contains("bgcolor=\"white\""));
    }

    #[test]
    fn test_timeline_rows_per_voice() {
        let p = compiled("W t=1 \\0.5 W t=1");
        let tl = Timeline::render(&p, 40);
        assert!(tl.contains("2 voices"));
        assert!(tl.contains("v0   |"));
        assert!(tl.contains("v1   |"));
        // The first voice starts sounding at column zero.
        let first_row = tl.lines().nth(1).unwrap();
        assert!(first_row.contains('#'));
    }

    #[test]
    fn test_timeline_marks_late_events() {
        let p = compiled("W t=2 \\1.9 W t=0.1");
        let tl = Timeline::render(&p, 40);
        let second_row = tl.lines().nth(2).unwrap();
        // The second voice's event sits deep into the row.
        let hash = second_row.find('#').unwrap();
        assert!(hash > 30, "{}", tl);
    }

    #[test]
    fn test_timeline_minimum_width() {
        let p = compiled("W t1");
        let tl = Timeline::render(&p, 0);
        assert!(tl.lines().nth(1).unwrap().len() >= 8);
    }
}
