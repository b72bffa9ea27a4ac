//! Program Validation
//!
//! Structural checks over a compiled [`Program`], for runtimes that want
//! to assert a program before rendering it and for the compiler's own
//! round-trip tests. Validation never mutates; it reports every violation
//! it finds rather than stopping at the first.
//!
//! The checks mirror the guarantees lowering makes: dense ids inside the
//! declared counts, voice operator lists free of duplicates with a
//! carrier entry at nest level zero, modulator arrays referencing known
//! operators, nest levels within the declared maximum, and ramp flags
//! that form a coherent value description.

use crate::ast::UseKind;
use crate::program::{OpData, Program};
use crate::ramp::Ramp;
use std::fmt;

/// One violated program invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// An event names a voice at or beyond `voice_count`
    VoiceIdOutOfRange { event: usize, voice_id: u32 },
    /// An operator id at or beyond `operator_count`
    OpIdOutOfRange { event: usize, op_id: u32 },
    /// A voice op list names the same operator twice
    DuplicateInOpList { event: usize, op_id: u32 },
    /// A non-empty op list without a carrier entry
    MissingCarrier { event: usize },
    /// A carrier entry at a nest level other than zero
    CarrierNotAtRoot { event: usize, nest_level: u32 },
    /// A nest level beyond the program's declared maximum
    NestLevelTooDeep { event: usize, nest_level: u32 },
    /// A modulator array references an unknown operator id
    UnknownModId { event: usize, op_id: u32, referenced: u32 },
    /// A ramp with a goal-ratio or state-ratio but no matching value
    IncoherentRamp { event: usize, op_id: u32, what: &'static str },
    /// The declared duration is shorter than the accumulated waits
    DurationTooShort { declared: u32, waits: u64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::VoiceIdOutOfRange { event, voice_id } => {
                write!(f, "event {}: voice id {} out of range", event, voice_id)
            }
            Violation::OpIdOutOfRange { event, op_id } => {
                write!(f, "event {}: operator id {} out of range", event, op_id)
            }
            Violation::DuplicateInOpList { event, op_id } => {
                write!(f, "event {}: operator {} listed twice", event, op_id)
            }
            Violation::MissingCarrier { event } => {
                write!(f, "event {}: op list has no carrier", event)
            }
            Violation::CarrierNotAtRoot { event, nest_level } => {
                write!(f, "event {}: carrier at nest level {}", event, nest_level)
            }
            Violation::NestLevelTooDeep { event, nest_level } => {
                write!(f, "event {}: nest level {} beyond maximum", event, nest_level)
            }
            Violation::UnknownModId {
                event,
                op_id,
                referenced,
            } => write!(
                f,
                "event {}: operator {} references unknown id {}",
                event, op_id, referenced
            ),
            Violation::IncoherentRamp { event, op_id, what } => {
                write!(f, "event {}: operator {} has incoherent {} ramp", event, op_id, what)
            }
            Violation::DurationTooShort { declared, waits } => write!(
                f,
                "declared duration {} ms shorter than {} ms of waits",
                declared, waits
            ),
        }
    }
}

/// Check every invariant; an empty result means the program is sound.
pub fn validate(program: &Program) -> Vec<Violation> {
    let mut out = Vec::new();

    let mut waits: u64 = 0;
    for (i, ev) in program.events.iter().enumerate() {
        waits += u64::from(ev.wait_ms);

        if ev.voice_id >= program.voice_count {
            out.push(Violation::VoiceIdOutOfRange {
                event: i,
                voice_id: ev.voice_id,
            });
        }

        if let Some(vd) = &ev.voice_data {
            let mut seen = Vec::new();
            let mut carrier = None;
            for r in &vd.op_list {
                if r.op_id >= program.operator_count {
                    out.push(Violation::OpIdOutOfRange {
                        event: i,
                        op_id: r.op_id,
                    });
                }
                if seen.contains(&r.op_id) {
                    out.push(Violation::DuplicateInOpList {
                        event: i,
                        op_id: r.op_id,
                    });
                } else {
                    seen.push(r.op_id);
                }
                if r.use_kind == UseKind::Carr {
                    carrier = Some(r);
                }
                if r.nest_level > program.op_nest_depth {
                    out.push(Violation::NestLevelTooDeep {
                        event: i,
                        nest_level: r.nest_level,
                    });
                }
            }
            match carrier {
                Some(c) if c.nest_level != 0 => out.push(Violation::CarrierNotAtRoot {
                    event: i,
                    nest_level: c.nest_level,
                }),
                Some(_) => {}
                None if !vd.op_list.is_empty() => {
                    out.push(Violation::MissingCarrier { event: i })
                }
                None => {}
            }
        }

        for od in &ev.op_data {
            check_op(program, i, od, &mut out);
        }
    }

    if u64::from(program.duration_ms) < waits {
        out.push(Violation::DurationTooShort {
            declared: program.duration_ms,
            waits,
        });
    }

    out
}

fn check_op(program: &Program, event: usize, od: &OpData, out: &mut Vec<Violation>) {
    if od.op_id >= program.operator_count {
        out.push(Violation::OpIdOutOfRange {
            event,
            op_id: od.op_id,
        });
    }

    if let Some(mods) = &od.mods {
        for i in 0..7 {
            if let Some(ids) = mods.by_index(i) {
                for &id in ids {
                    if id >= program.operator_count {
                        out.push(Violation::UnknownModId {
                            event,
                            op_id: od.op_id,
                            referenced: id,
                        });
                    }
                }
            }
        }
    }

    let ramps: [(&'static str, &Option<Ramp>); 7] = [
        ("freq", &od.freq),
        ("freq2", &od.freq2),
        ("amp", &od.amp),
        ("amp2", &od.amp2),
        ("pan", &od.pan),
        ("phase", &od.phase),
        ("line", &od.line),
    ];
    for (what, ramp) in ramps {
        let Some(r) = ramp else { continue };
        let coherent = (!r.flags.state_ratio || r.flags.state)
            && (!r.flags.goal_ratio || r.flags.goal)
            && (!r.flags.time || r.flags.goal || r.flags.state)
            && r.is_set();
        if !coherent {
            out.push(Violation::IncoherentRamp {
                event,
                op_id: od.op_id,
                what,
            });
        }
    }
}
