//! Program Data
//!
//! The fully resolved output of a compile, consumed by the runtime. All
//! identifiers are dense integers: voices and operators are numbered in
//! first-appearance order, events carry non-negative accumulating waits,
//! and every voice's operator list is already in graph-traversal order so
//! the renderer can run it front to back.
//!
//! Everything here serializes; [`Program::to_json`] round-trips through
//! [`Program::from_json`].

use crate::ast::UseKind;
use crate::ramp::Ramp;
use crate::symtab::NameId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on voices per program
pub const MAX_VOICES: u32 = 1 << 16;

/// Hard cap on operators per program
pub const MAX_OPERATORS: u32 = u32::MAX;

/// Program-level mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramMode {
    /// Divide output amplitude by the voice count at render time; set
    /// unless the script chose its own amplitude multiplier
    pub amp_div_voices: bool,
}

/// What kind of signal source an operator renders as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Wave,
    Noise,
    Line,
}

impl ObjectType {
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Wave => "wave",
            ObjectType::Noise => "noise",
            ObjectType::Line => "line",
        }
    }
}

/// One entry of a voice's traversal-ordered operator list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRef {
    pub op_id: u32,
    pub use_kind: UseKind,
    /// Modulator nesting depth; the carrier sits at 0
    pub nest_level: u32,
}

/// Voice data attached to an event that changed the voice graph
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoData {
    pub op_list: Vec<OpRef>,
}

/// Modulator id arrays of one operator, by use kind.
///
/// `None` leaves the operator's previous list of that kind in place;
/// `Some` replaces it (append was already resolved at lowering).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpMods {
    pub camods: Option<Vec<u32>>,
    pub amods: Option<Vec<u32>>,
    pub ramods: Option<Vec<u32>>,
    pub fmods: Option<Vec<u32>>,
    pub rfmods: Option<Vec<u32>>,
    pub pmods: Option<Vec<u32>>,
    pub fpmods: Option<Vec<u32>>,
}

impl OpMods {
    /// Access by modulator-kind index (see [`UseKind::mod_index`]).
    pub fn by_index(&self, i: usize) -> &Option<Vec<u32>> {
        match i {
            0 => &self.camods,
            1 => &self.amods,
            2 => &self.ramods,
            3 => &self.fmods,
            4 => &self.rfmods,
            5 => &self.pmods,
            _ => &self.fpmods,
        }
    }

    pub fn by_index_mut(&mut self, i: usize) -> &mut Option<Vec<u32>> {
        match i {
            0 => &mut self.camods,
            1 => &mut self.amods,
            2 => &mut self.ramods,
            3 => &mut self.fmods,
            4 => &mut self.rfmods,
            5 => &mut self.pmods,
            _ => &mut self.fpmods,
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..7).all(|i| self.by_index(i).is_none())
    }
}

/// Per-event operator state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpData {
    pub op_id: u32,
    pub use_kind: UseKind,
    pub object_type: ObjectType,
    /// Bits from [`crate::ast::param`]: which parameters this event sets
    pub params: u32,
    pub time_ms: u32,
    pub silence_ms: u32,
    pub wave: Option<NameId>,
    pub noise: Option<NameId>,
    /// Noise seed, present on the defining event of stochastic operators
    pub seed: Option<u32>,
    pub freq: Option<Ramp>,
    pub freq2: Option<Ramp>,
    pub amp: Option<Ramp>,
    pub amp2: Option<Ramp>,
    pub pan: Option<Ramp>,
    pub phase: Option<Ramp>,
    /// Line value ramp of line-type operators
    pub line: Option<Ramp>,
    pub mods: Option<Box<OpMods>>,
}

/// One scheduled state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Delay after the previous event
    pub wait_ms: u32,
    pub voice_id: u32,
    /// Present when this event changed the voice's operator graph
    pub voice_data: Option<VoData>,
    pub op_data: Vec<OpData>,
}

/// A compiled score, ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub mode: ProgramMode,
    pub voice_count: u32,
    pub operator_count: u32,
    /// Deepest modulator nesting; sizes the renderer's scratch buffers
    pub op_nest_depth: u32,
    pub duration_ms: u32,
    pub events: Vec<Event>,
}

impl Program {
    /// Serialize to JSON (tooling and test fixtures).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> serde_json::Result<Program> {
        serde_json::from_str(s)
    }

    /// Write the print-summary: counts, duration, and one line per event
    /// with its voice, graph (when set) and touched operators.
    pub fn write_summary(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Program '{}': {} events, {} voices, {} operators, nest depth {}, duration {} ms",
            self.name,
            self.events.len(),
            self.voice_count,
            self.operator_count,
            self.op_nest_depth,
            self.duration_ms,
        )?;
        for ev in &self.events {
            write!(out, "  +{} ms: voice {}", ev.wait_ms, ev.voice_id)?;
            if let Some(vd) = &ev.voice_data {
                write!(out, ", graph [")?;
                for (i, r) in vd.op_list.iter().enumerate() {
                    if i > 0 {
                        write!(out, " ")?;
                    }
                    write!(out, "{}:{}/{}", r.op_id, r.use_kind.name(), r.nest_level)?;
                }
                write!(out, "]")?;
            }
            write!(out, ", ops [")?;
            for (i, od) in ev.op_data.iter().enumerate() {
                if i > 0 {
                    write!(out, " ")?;
                }
                write!(out, "{}", od.op_id)?;
            }
            writeln!(out, "]")?;
        }
        Ok(())
    }

    /// The summary as a string.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_summary(&mut s);
        s
    }

    /// Write the long form: the summary plus every operator state change
    /// with its parameters.
    pub fn write_details(&self, out: &mut impl fmt::Write) -> fmt::Result {
        self.write_summary(out)?;
        for (i, ev) in self.events.iter().enumerate() {
            for od in &ev.op_data {
                write!(
                    out,
                    "    ev {} op {} ({}, {}): t={} ms",
                    i,
                    od.op_id,
                    od.object_type.name(),
                    od.use_kind.name(),
                    od.time_ms,
                )?;
                if od.silence_ms > 0 {
                    write!(out, " s={} ms", od.silence_ms)?;
                }
                write_ramp(out, "f", &od.freq)?;
                write_ramp(out, "f!", &od.freq2)?;
                write_ramp(out, "a", &od.amp)?;
                write_ramp(out, "a!", &od.amp2)?;
                write_ramp(out, "c", &od.pan)?;
                write_ramp(out, "p", &od.phase)?;
                write_ramp(out, "v", &od.line)?;
                if let Some(mods) = &od.mods {
                    for (k, kind) in crate::ast::UseKind::MOD_KINDS.iter().enumerate() {
                        if let Some(ids) = mods.by_index(k) {
                            write!(out, " {}={:?}", kind.name(), ids)?;
                        }
                    }
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    /// The long form as a string.
    pub fn details(&self) -> String {
        let mut s = String::new();
        let _ = self.write_details(&mut s);
        s
    }

    /// Append another program after this one, `gap_ms` after this one's
    /// material ends. The appended program's voice and operator ids are
    /// shifted past this program's ranges; both halves keep their own
    /// graphs and seeds.
    pub fn append(&mut self, other: &Program, gap_ms: u32) {
        let voice_base = self.voice_count;
        let op_base = self.operator_count;

        let waits: u64 = self.events.iter().map(|e| u64::from(e.wait_ms)).sum();
        let lead = u64::from(self.duration_ms).saturating_sub(waits) as u32;

        for (i, ev) in other.events.iter().enumerate() {
            let mut ev = ev.clone();
            ev.voice_id += voice_base;
            if i == 0 {
                ev.wait_ms = ev.wait_ms.saturating_add(lead).saturating_add(gap_ms);
            }
            if let Some(vd) = &mut ev.voice_data {
                for r in &mut vd.op_list {
                    r.op_id += op_base;
                }
            }
            for od in &mut ev.op_data {
                od.op_id += op_base;
                if let Some(mods) = &mut od.mods {
                    for k in 0..7 {
                        if let Some(ids) = mods.by_index_mut(k) {
                            for id in ids {
                                *id += op_base;
                            }
                        }
                    }
                }
            }
            self.events.push(ev);
        }

        self.voice_count += other.voice_count;
        self.operator_count += other.operator_count;
        self.op_nest_depth = self.op_nest_depth.max(other.op_nest_depth);
        self.duration_ms = self
            .duration_ms
            .saturating_add(gap_ms)
            .saturating_add(other.duration_ms);
        self.mode.amp_div_voices = self.mode.amp_div_voices && other.mode.amp_div_voices;
    }

    /// Aggregate counts over the whole program.
    pub fn stats(&self) -> ProgramStats {
        let mut stats = ProgramStats::default();
        for ev in &self.events {
            stats.event_count += 1;
            if ev.voice_data.is_some() {
                stats.graph_rebuilds += 1;
            }
            for od in &ev.op_data {
                stats.op_changes += 1;
                match od.object_type {
                    ObjectType::Wave => stats.wave_ops += 1,
                    ObjectType::Noise => stats.noise_ops += 1,
                    ObjectType::Line => stats.line_ops += 1,
                }
                if let Some(mods) = &od.mods {
                    for i in 0..7 {
                        if let Some(ids) = mods.by_index(i) {
                            stats.mod_edges += ids.len();
                        }
                    }
                }
            }
        }
        stats
    }
}

fn write_ramp(out: &mut impl fmt::Write, tag: &str, ramp: &Option<Ramp>) -> fmt::Result {
    let Some(r) = ramp else {
        return Ok(());
    };
    write!(out, " {}=", tag)?;
    if r.flags.state {
        write!(out, "{}", r.v0)?;
        if r.flags.state_ratio {
            write!(out, "r")?;
        }
    }
    if r.flags.goal {
        write!(out, "~{}/{}({} ms)", r.shape.name(), r.vt, r.time_ms)?;
        if r.flags.goal_ratio {
            write!(out, "r")?;
        }
    }
    Ok(())
}

/// Aggregate counts of a program (see [`Program::stats`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramStats {
    pub event_count: usize,
    /// Operator state changes across all events
    pub op_changes: usize,
    pub wave_ops: usize,
    pub noise_ops: usize,
    pub line_ops: usize,
    /// Modulator edges across all emitted id arrays
    pub mod_edges: usize,
    /// Events that carried a rebuilt voice op list
    pub graph_rebuilds: usize,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_summary(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Program {
        Program {
            name: "sample".into(),
            mode: ProgramMode {
                amp_div_voices: true,
            },
            voice_count: 1,
            operator_count: 2,
            op_nest_depth: 1,
            duration_ms: 1500,
            events: vec![Event {
                wait_ms: 0,
                voice_id: 0,
                voice_data: Some(VoData {
                    op_list: vec![
                        OpRef {
                            op_id: 1,
                            use_kind: UseKind::Pm,
                            nest_level: 1,
                        },
                        OpRef {
                            op_id: 0,
                            use_kind: UseKind::Carr,
                            nest_level: 0,
                        },
                    ],
                }),
                op_data: vec![],
            }],
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let p = sample();
        let json = p.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_summary_contents() {
        let s = sample().summary();
        assert!(s.contains("1 events"));
        assert!(s.contains("duration 1500 ms"));
        assert!(s.contains("1:PM/1 0:CARR/0"));
    }

    #[test]
    fn test_opmods_indexing() {
        let mut m = OpMods::default();
        assert!(m.is_empty());
        *m.by_index_mut(3) = Some(vec![7]);
        assert_eq!(m.fmods, Some(vec![7]));
        assert!(!m.is_empty());
    }

    #[test]
    fn test_stats_counts_graph_rebuilds() {
        let p = sample();
        let stats = p.stats();
        assert_eq!(stats.event_count, 1);
        assert_eq!(stats.graph_rebuilds, 1);
        assert_eq!(stats.op_changes, 0);
    }

    #[test]
    fn test_details_include_summary() {
        let p = sample();
        let details = p.details();
        assert!(details.starts_with(&p.summary()));
    }

    #[test]
    fn test_append_shifts_ids_and_waits() {
        let mut a = sample();
        a.events[0].op_data.push(OpData {
            op_id: 0,
            use_kind: UseKind::Carr,
            object_type: ObjectType::Wave,
            params: 0,
            time_ms: 1500,
            silence_ms: 0,
            wave: Some(0),
            noise: None,
            seed: None,
            freq: None,
            freq2: None,
            amp: None,
            amp2: None,
            pan: None,
            phase: None,
            line: None,
            mods: None,
        });
        let b = sample();
        a.append(&b, 100);

        assert_eq!(a.voice_count, 2);
        assert_eq!(a.operator_count, 4);
        assert_eq!(a.duration_ms, 1500 + 100 + 1500);
        assert_eq!(a.events.len(), 2);
        let second = &a.events[1];
        assert_eq!(second.voice_id, 1);
        // Waits: the first half's trailing material plus the gap.
        assert_eq!(second.wait_ms, 1500 + 100);
        let vd = second.voice_data.as_ref().unwrap();
        assert_eq!(vd.op_list[0].op_id, 1 + 2);
        assert_eq!(vd.op_list[1].op_id, 0 + 2);
    }
}
