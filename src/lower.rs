//! Parse-to-Program Lowering
//!
//! The last pass: walk the flattened event chain in order, allocate dense
//! voice and operator ids, emit per-event operator state changes, and
//! build each voice's graph-traversal operator list.
//!
//! Voice allocation scans existing slots for one whose material has
//! elapsed (and which no later event re-uses) before growing the vector;
//! objects already bound to a voice short-circuit the scan. Operator ids
//! key on each object's defining node, so re-references reuse the id.
//! Modulator sublists become id arrays: appends concatenate onto the
//! object's previous list of the kind, duplicates are dropped, and a
//! replacement equal to the previous array is elided. Whenever a list
//! (or the carrier) actually changed, the voice's operator list is
//! rebuilt by a depth-first walk over the seven typed arrays; a back
//! edge to an operator still on the walk's stack is a cycle, reported
//! once and skipped.

use crate::ast::{param, EvKey, ObjKind, OpKey, ParseGraph, ScriptOptions, UseKind};
use crate::diag::{Diagnostics, Frame};
use crate::program::{
    Event, ObjectType, OpData, OpMods, OpRef, Program, ProgramMode, VoData, MAX_OPERATORS,
    MAX_VOICES,
};
use crate::ramp::Ramp;
use crate::rng::SeedStream;
use std::collections::HashMap;
use std::fmt;

/// Hard failures of the lowering pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerError {
    TooManyVoices,
    TooManyOperators,
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::TooManyVoices => write!(f, "voice count exceeds {}", MAX_VOICES),
            LowerError::TooManyOperators => {
                write!(f, "operator count exceeds {}", MAX_OPERATORS)
            }
        }
    }
}

impl std::error::Error for LowerError {}

/// Voice allocation state
#[derive(Debug, Default)]
struct VoiceSlot {
    /// Absolute time the voice's current material ends
    end_abs_ms: u64,
    /// May not be recycled: a later event re-uses it
    later_used: bool,
    /// Current carrier operator id
    carrier: Option<u32>,
    /// A list or the carrier changed; rebuild the op list
    set_graph: bool,
}

/// Operator allocation state
#[derive(Debug, Default)]
struct OpSlot {
    /// Current modulator id arrays, one per kind (traversal order)
    lists: [Option<Vec<u32>>; 7],
    visited: bool,
    on_stack: bool,
}

/// Lower a timed, flattened parse graph into a [`Program`].
pub fn lower(
    g: &mut ParseGraph,
    opt: &ScriptOptions,
    name: &str,
    seed: u64,
    diag: &mut Diagnostics,
) -> Result<Program, LowerError> {
    Lowerer {
        g,
        opt,
        diag,
        voices: Vec::new(),
        op_slots: Vec::new(),
        obj_op: HashMap::new(),
        obj_voice: HashMap::new(),
        seeds: SeedStream::from_seed(seed),
        abs_ms: 0,
        max_nest: 0,
        cycle_reported: false,
    }
    .run(name)
}

struct Lowerer<'a> {
    g: &'a mut ParseGraph,
    opt: &'a ScriptOptions,
    diag: &'a mut Diagnostics,
    voices: Vec<VoiceSlot>,
    op_slots: Vec<OpSlot>,
    /// Object (defining node id) to program operator id
    obj_op: HashMap<u32, u32>,
    /// Object to the voice currently carrying it
    obj_voice: HashMap<u32, u32>,
    seeds: SeedStream,
    abs_ms: u64,
    max_nest: u32,
    cycle_reported: bool,
}

impl<'a> Lowerer<'a> {
    fn run(mut self, name: &str) -> Result<Program, LowerError> {
        let mut events = Vec::new();
        let chain: Vec<EvKey> = self.g.main_chain().collect();
        for ev_key in chain {
            self.abs_ms += u64::from(self.g.events[ev_key].wait_ms);
            events.push(self.lower_event(ev_key)?);
        }

        let mut duration = self.abs_ms;
        for slot in &self.voices {
            duration = duration.max(slot.end_abs_ms);
        }

        Ok(Program {
            name: name.to_string(),
            mode: ProgramMode {
                amp_div_voices: !self.opt.ampmult_set,
            },
            voice_count: self.voices.len() as u32,
            operator_count: self.op_slots.len() as u32,
            op_nest_depth: self.max_nest,
            duration_ms: duration as u32,
            events,
        })
    }

    fn lower_event(&mut self, ev_key: EvKey) -> Result<Event, LowerError> {
        let voice_id = self.voice_for(ev_key)?;

        // The root's resolved time also stands in for linked operators.
        let root = self.g.events[ev_key].root;
        let root_time = self.g.ops[root].time.ms;

        let objects = self.g.events[ev_key].objects.clone();
        let mut op_data = Vec::new();
        let mut dur_ms: u32 = 0;
        for opk in objects {
            if self.g.ops[opk].flags.multiple {
                let frame = Frame::default();
                self.diag.warn_at(
                    frame,
                    "extra operator in a multi-operator binding ignored",
                );
                continue;
            }
            let od = self.lower_op(opk, voice_id, root_time)?;
            if !self.g.ops[opk].time.linked {
                dur_ms = dur_ms.max(od.time_ms);
            }
            op_data.push(od);
        }

        // Carrier bookkeeping: a (re)defined root rebuilds the graph.
        if let Some(root_od) = op_data.first() {
            let is_root_carrier = !self.g.ops[root].flags.nested;
            if is_root_carrier {
                let slot = &mut self.voices[voice_id as usize];
                if slot.carrier != Some(root_od.op_id) {
                    slot.carrier = Some(root_od.op_id);
                    slot.set_graph = true;
                }
            }
        }

        let voice_data = if self.voices[voice_id as usize].set_graph {
            self.voices[voice_id as usize].set_graph = false;
            Some(self.build_voice_graph(voice_id))
        } else {
            None
        };

        if dur_ms > 0 {
            self.g.events[ev_key].flags.voice_set_dur = true;
            self.g.events[ev_key].dur_ms = dur_ms;
            let slot = &mut self.voices[voice_id as usize];
            slot.end_abs_ms = slot.end_abs_ms.max(self.abs_ms + u64::from(dur_ms));
        }

        Ok(Event {
            wait_ms: self.g.events[ev_key].wait_ms,
            voice_id,
            voice_data,
            op_data,
        })
    }

    /// The voice an event plays on: the object's existing voice, an
    /// expired slot, or a fresh one.
    fn voice_for(&mut self, ev_key: EvKey) -> Result<u32, LowerError> {
        let root = self.g.events[ev_key].root;
        let first = self.g.ops[root].first;
        let obj = self.g.ops[first].id;

        if let Some(&v) = self.obj_voice.get(&obj) {
            return Ok(v);
        }

        let recycled = self
            .voices
            .iter()
            .position(|s| !s.later_used && s.end_abs_ms <= self.abs_ms);
        let v = match recycled {
            Some(i) => {
                self.voices[i] = VoiceSlot::default();
                i as u32
            }
            None => {
                if self.voices.len() as u32 >= MAX_VOICES {
                    return Err(LowerError::TooManyVoices);
                }
                self.voices.push(VoiceSlot::default());
                (self.voices.len() - 1) as u32
            }
        };
        let def_ev = self.g.ops[first].event;
        self.voices[v as usize].later_used = self.g.events[def_ev].flags.voice_later_used;
        self.obj_voice.insert(obj, v);
        Ok(v)
    }

    /// The program id of an operator node's object, allocating on first
    /// definition.
    fn op_id_for(&mut self, opk: OpKey) -> Result<u32, LowerError> {
        let first = self.g.ops[opk].first;
        let obj = self.g.ops[first].id;
        if let Some(&id) = self.obj_op.get(&obj) {
            return Ok(id);
        }
        if self.op_slots.len() as u32 >= MAX_OPERATORS {
            return Err(LowerError::TooManyOperators);
        }
        let id = self.op_slots.len() as u32;
        self.op_slots.push(OpSlot::default());
        self.obj_op.insert(obj, id);
        Ok(id)
    }

    /// Emit one operator state change.
    fn lower_op(&mut self, opk: OpKey, voice_id: u32, root_time: u32) -> Result<OpData, LowerError> {
        let op_id = self.op_id_for(opk)?;
        let fresh = self.g.ops[opk].prev.is_none();
        let mut node = self.g.ops[opk].clone();

        if fresh {
            self.apply_defaults(&mut node);
        }

        // The script-level amplitude multiplier is baked into carrier
        // amplitudes here; modulator amplitudes stay raw.
        if !node.flags.nested && node.amp.is_set() {
            node.amp.v0 *= self.opt.ampmult as f32;
            node.amp.vt *= self.opt.ampmult as f32;
        }

        let time_ms = if node.time.linked {
            root_time
        } else {
            node.time.ms
        };

        let (object_type, wave, noise) = match node.kind {
            ObjKind::Wave { wave } => (ObjectType::Wave, Some(wave), None),
            ObjKind::Noise { noise } => (ObjectType::Noise, None, Some(noise)),
            ObjKind::Line => (ObjectType::Line, None, None),
        };
        let seed = if fresh && object_type == ObjectType::Noise {
            Some(self.seeds.next_seed())
        } else {
            None
        };

        let mods = self.lower_mod_lists(&node, op_id, voice_id)?;

        let first = self.g.ops[opk].first;
        let obj = self.g.ops[first].id;
        self.obj_voice.insert(obj, voice_id);

        Ok(OpData {
            op_id,
            use_kind: node.use_kind,
            object_type,
            params: node.params,
            time_ms,
            silence_ms: node.silence_ms,
            wave,
            noise,
            seed,
            freq: emit_ramp(&node.freq),
            freq2: emit_ramp(&node.freq2),
            amp: emit_ramp(&node.amp),
            amp2: emit_ramp(&node.amp2),
            pan: emit_ramp(&node.pan),
            phase: emit_ramp(&node.phase),
            line: emit_ramp(&node.line),
            mods,
        })
    }

    /// Initial values every defining node carries even when the script
    /// left them out.
    fn apply_defaults(&self, node: &mut crate::ast::OpNode) {
        match node.kind {
            ObjKind::Wave { .. } | ObjKind::Noise { .. } => {
                if matches!(node.kind, ObjKind::Wave { .. }) && !node.freq.flags.state {
                    if node.flags.nested {
                        node.freq.set_state(self.opt.def_relfreq as f32, true);
                    } else {
                        node.freq.set_state(self.opt.def_freq as f32, false);
                    }
                    node.params |= param::FREQ;
                }
                if !node.amp.flags.state {
                    node.amp.set_state(1.0, false);
                    node.params |= param::AMP;
                }
                if !node.flags.nested && !node.pan.flags.state {
                    node.pan.set_state(0.5, false);
                    node.params |= param::PAN;
                }
            }
            ObjKind::Line => {
                if !node.line.flags.state {
                    node.line.set_state(0.0, false);
                    node.params |= param::LINE;
                }
            }
        }
    }

    /// Convert the node's sublists into id arrays, applying append,
    /// duplicate removal and no-op elision against the object's previous
    /// lists.
    fn lower_mod_lists(
        &mut self,
        node: &crate::ast::OpNode,
        op_id: u32,
        voice_id: u32,
    ) -> Result<Option<Box<OpMods>>, LowerError> {
        if node.mods.is_empty() {
            return Ok(None);
        }
        let mut out = OpMods::default();
        let mut changed = false;
        for list in &node.mods {
            let idx = list
                .kind
                .mod_index()
                .expect("sublists never carry the carrier kind");

            let mut ids: Vec<u32> = Vec::with_capacity(list.ops.len());
            for &m in &list.ops {
                if self.g.ops[m].flags.multiple {
                    continue;
                }
                ids.push(self.op_id_for(m)?);
            }

            if list.append {
                let mut combined = self.op_slots[op_id as usize].lists[idx]
                    .clone()
                    .unwrap_or_default();
                combined.extend(ids);
                ids = combined;
            }
            dedup_in_order(&mut ids);

            if self.op_slots[op_id as usize].lists[idx].as_ref() == Some(&ids) {
                // Replacing a list with itself is not a change.
                continue;
            }
            self.op_slots[op_id as usize].lists[idx] = Some(ids.clone());
            *out.by_index_mut(idx) = Some(ids);
            changed = true;
        }
        if changed {
            self.voices[voice_id as usize].set_graph = true;
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Box::new(out)))
        }
    }

    /// Depth-first rebuild of a voice's traversal-ordered operator list.
    fn build_voice_graph(&mut self, voice_id: u32) -> VoData {
        for slot in &mut self.op_slots {
            slot.visited = false;
            slot.on_stack = false;
        }
        let mut op_list = Vec::new();
        if let Some(carrier) = self.voices[voice_id as usize].carrier {
            self.visit(carrier, UseKind::Carr, 0, &mut op_list);
        }
        VoData { op_list }
    }

    fn visit(&mut self, op_id: u32, use_kind: UseKind, level: u32, out: &mut Vec<OpRef>) {
        if self.op_slots[op_id as usize].on_stack {
            if !self.cycle_reported {
                self.cycle_reported = true;
                self.diag.error_at(
                    Frame::default(),
                    "circular references unsupported in operator graph",
                );
            }
            return;
        }
        if self.op_slots[op_id as usize].visited {
            return;
        }
        self.op_slots[op_id as usize].visited = true;
        self.op_slots[op_id as usize].on_stack = true;
        self.max_nest = self.max_nest.max(level);

        for (idx, kind) in UseKind::MOD_KINDS.iter().enumerate() {
            if let Some(ids) = self.op_slots[op_id as usize].lists[idx].clone() {
                for id in ids {
                    self.visit(id, *kind, level + 1, out);
                }
            }
        }

        self.op_slots[op_id as usize].on_stack = false;
        out.push(OpRef {
            op_id,
            use_kind,
            nest_level: level,
        });
    }
}

fn emit_ramp(ramp: &Ramp) -> Option<Ramp> {
    if ramp.is_set() {
        Some(*ramp)
    } else {
        None
    }
}

/// Remove duplicate ids, keeping first occurrences in order.
fn dedup_in_order(ids: &mut Vec<u32>) {
    let mut seen = Vec::new();
    ids.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });
}
