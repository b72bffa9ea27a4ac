//! Event Scheduling
//!
//! The consumption side of a [`Program`]: a clock-driven walker that
//! surfaces events as their waits elapse, and per-operator state that
//! merges each event's changes into the values a renderer reads. The
//! per-sample kernels stay outside this crate; what lives here is the
//! bookkeeping every renderer repeats: wait accumulation, voice graph
//! swaps, parameter merge, and list updates.
//!
//! The walker holds the ordering guarantee lowering makes: events come
//! out in emission order with non-negative, accumulating waits.

use crate::ast::UseKind;
use crate::program::{Event, ObjectType, OpData, OpRef, Program};
use crate::ramp::Ramp;

/// Merged state of one operator, updated event by event
#[derive(Debug, Clone, Default)]
pub struct OpState {
    pub object_type: Option<ObjectType>,
    pub time_ms: u32,
    pub silence_ms: u32,
    pub wave: Option<u32>,
    pub noise: Option<u32>,
    pub seed: Option<u32>,
    pub freq: Option<Ramp>,
    pub freq2: Option<Ramp>,
    pub amp: Option<Ramp>,
    pub amp2: Option<Ramp>,
    pub pan: Option<Ramp>,
    pub phase: Option<Ramp>,
    pub line: Option<Ramp>,
    /// Modulator id arrays by kind index (see [`UseKind::mod_index`])
    pub mods: [Vec<u32>; 7],
}

impl OpState {
    /// Merge one event's change into the running state. Absent fields
    /// leave their current values in place; present modulator arrays
    /// replace their kind's list.
    pub fn apply(&mut self, od: &OpData) {
        self.object_type = Some(od.object_type);
        self.time_ms = od.time_ms;
        if od.silence_ms > 0 {
            self.silence_ms = od.silence_ms;
        }
        if od.wave.is_some() {
            self.wave = od.wave;
        }
        if od.noise.is_some() {
            self.noise = od.noise;
        }
        if od.seed.is_some() {
            self.seed = od.seed;
        }
        merge_ramp(&mut self.freq, &od.freq);
        merge_ramp(&mut self.freq2, &od.freq2);
        merge_ramp(&mut self.amp, &od.amp);
        merge_ramp(&mut self.amp2, &od.amp2);
        merge_ramp(&mut self.pan, &od.pan);
        merge_ramp(&mut self.phase, &od.phase);
        merge_ramp(&mut self.line, &od.line);
        if let Some(mods) = &od.mods {
            for i in 0..7 {
                if let Some(ids) = mods.by_index(i) {
                    self.mods[i] = ids.clone();
                }
            }
        }
    }

    /// The modulator ids for one kind.
    pub fn mods_of(&self, kind: UseKind) -> &[u32] {
        match kind.mod_index() {
            Some(i) => &self.mods[i],
            None => &[],
        }
    }
}

/// A ramp update keeps the previous state value when the new change only
/// sets a goal; a renderer continues from where the old ramp left off.
fn merge_ramp(current: &mut Option<Ramp>, update: &Option<Ramp>) {
    let Some(new) = update else { return };
    let mut merged = *new;
    if let Some(old) = *current {
        if !new.flags.state && old.flags.state {
            merged.v0 = if old.flags.goal { old.vt } else { old.v0 };
            merged.flags.state = true;
            merged.flags.state_ratio = old.flags.state_ratio && !new.flags.goal_ratio;
        }
    }
    *current = Some(merged);
}

/// Per-voice playback state
#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    /// Traversal-ordered operator list, swapped on graph changes
    pub op_list: Vec<OpRef>,
    /// Absolute time the voice's material ends
    pub end_ms: u64,
}

/// Clock-driven walker over a program's events
#[derive(Debug)]
pub struct EventScheduler<'a> {
    program: &'a Program,
    next_event: usize,
    /// Absolute time of the next due event
    next_due_ms: u64,
    now_ms: u64,
    voices: Vec<VoiceState>,
    ops: Vec<OpState>,
}

impl<'a> EventScheduler<'a> {
    pub fn new(program: &'a Program) -> Self {
        let first_due = program.events.first().map(|e| u64::from(e.wait_ms));
        Self {
            program,
            next_event: 0,
            next_due_ms: first_due.unwrap_or(0),
            now_ms: 0,
            voices: vec![VoiceState::default(); program.voice_count as usize],
            ops: vec![OpState::default(); program.operator_count as usize],
        }
    }

    /// Current clock position.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Whether every event has fired.
    pub fn done(&self) -> bool {
        self.next_event >= self.program.events.len()
    }

    /// Time until the next event fires, if one remains.
    pub fn until_next_ms(&self) -> Option<u64> {
        if self.done() {
            None
        } else {
            Some(self.next_due_ms.saturating_sub(self.now_ms))
        }
    }

    /// Merged state of one operator.
    pub fn op(&self, op_id: u32) -> &OpState {
        &self.ops[op_id as usize]
    }

    /// Playback state of one voice.
    pub fn voice(&self, voice_id: u32) -> &VoiceState {
        &self.voices[voice_id as usize]
    }

    /// Voices whose material is still sounding at the current clock.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.end_ms > self.now_ms).count()
    }

    /// Advance the clock, applying every event that falls due. Returns
    /// the indices of the fired events, in order.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<usize> {
        let target = self.now_ms + delta_ms;
        let mut fired = Vec::new();
        while !self.done() && self.next_due_ms <= target {
            self.now_ms = self.next_due_ms;
            let index = self.next_event;
            let ev = self.program.events[index].clone();
            self.fire(&ev);
            fired.push(index);
            self.next_event += 1;
            if let Some(ev) = self.program.events.get(self.next_event) {
                self.next_due_ms += u64::from(ev.wait_ms);
            }
        }
        self.now_ms = target;
        fired
    }

    /// Run the whole program out, returning the number of events fired.
    pub fn run_to_end(&mut self) -> usize {
        let mut count = 0;
        while !self.done() {
            let remaining = self.until_next_ms().unwrap_or(0);
            count += self.advance(remaining.max(1)).len();
        }
        count
    }

    fn fire(&mut self, ev: &Event) {
        let mut end = self.now_ms;
        for od in &ev.op_data {
            self.ops[od.op_id as usize].apply(od);
            end = end.max(self.now_ms + u64::from(od.time_ms));
        }
        let voice = &mut self.voices[ev.voice_id as usize];
        if let Some(vd) = &ev.voice_data {
            voice.op_list = vd.op_list.clone();
        }
        voice.end_ms = voice.end_ms.max(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Compiler, CompilerOptions};
    use crate::ramp::RampFlags;

    fn program(src: &str) -> Program {
        Compiler::new()
            .with_options(CompilerOptions::default().silent().with_seed(2))
            .compile_str("sched", src)
            .unwrap()
            .program
    }

    #[test]
    fn test_events_fire_at_waits() {
        let p = program("W t=0.1 \\0.25 W t=0.1 \\0.25 W t=0.1");
        let mut s = EventScheduler::new(&p);
        assert_eq!(s.advance(0), vec![0]);
        assert_eq!(s.advance(100), Vec::<usize>::new());
        assert_eq!(s.advance(200), vec![1]);
        assert_eq!(s.until_next_ms(), Some(200));
        assert_eq!(s.advance(1000), vec![2]);
        assert!(s.done());
    }

    #[test]
    fn test_run_to_end_counts_all() {
        let p = program("W t1 \\0.5 W t1 ; t0.5 \\2 N wh t0.2");
        let mut s = EventScheduler::new(&p);
        assert_eq!(s.run_to_end(), p.events.len());
    }

    #[test]
    fn test_op_state_merges_updates() {
        let p = program("'a W f440 a0.5 t1\n\\0.2 :a a0.3");
        let mut s = EventScheduler::new(&p);
        s.advance(0);
        assert_eq!(s.op(0).amp.unwrap().v0, 0.5);
        assert_eq!(s.op(0).freq.unwrap().v0, 440.0);
        s.advance(200);
        // Amp updated; frequency untouched.
        assert_eq!(s.op(0).amp.unwrap().v0, 0.3);
        assert_eq!(s.op(0).freq.unwrap().v0, 440.0);
    }

    #[test]
    fn test_goal_only_update_continues_from_old_value() {
        let p = program("'a W f100 t1\n\\0.5 :a f{t=1 v=200}");
        let mut s = EventScheduler::new(&p);
        s.run_to_end();
        let freq = s.op(0).freq.unwrap();
        // The new ramp starts where the old state stood.
        assert!(freq.flags.state);
        assert_eq!(freq.v0, 100.0);
        assert_eq!(freq.vt, 200.0);
    }

    #[test]
    fn test_voice_graph_swap() {
        let p = program("'m W f100 a![ 'x W r1 ]\n\\0.1 :m a![ :x W r3 ]");
        let mut s = EventScheduler::new(&p);
        s.advance(0);
        assert_eq!(s.voice(0).op_list.len(), 2);
        s.advance(100);
        assert_eq!(s.voice(0).op_list.len(), 3);
        assert_eq!(s.op(0).mods_of(UseKind::Am).len(), 2);
    }

    #[test]
    fn test_active_voices_track_ends() {
        let p = program("W t=1 \\0.5 W t=1");
        let mut s = EventScheduler::new(&p);
        s.advance(0);
        assert_eq!(s.active_voices(), 1);
        s.advance(500);
        assert_eq!(s.active_voices(), 2);
        s.advance(600);
        // The first voice's second has 400 ms left.
        assert_eq!(s.active_voices(), 1);
        s.advance(1000);
        assert_eq!(s.active_voices(), 0);
    }

    #[test]
    fn test_empty_program() {
        let p = program("");
        let mut s = EventScheduler::new(&p);
        assert!(s.done());
        assert_eq!(s.advance(100), Vec::<usize>::new());
        assert_eq!(s.now_ms(), 100);
    }

    #[test]
    fn test_merge_ramp_keeps_ratio_state() {
        let mut current = None;
        let mut first = Ramp::default();
        first.set_state(2.0, true);
        merge_ramp(&mut current, &Some(first));
        assert!(current.unwrap().flags.state_ratio);

        let mut goal_only = Ramp {
            flags: RampFlags {
                goal: true,
                ..RampFlags::default()
            },
            vt: 4.0,
            time_ms: 100,
            ..Ramp::default()
        };
        goal_only.flags.goal_ratio = false;
        merge_ramp(&mut current, &Some(goal_only));
        let merged = current.unwrap();
        assert_eq!(merged.v0, 2.0);
        assert_eq!(merged.vt, 4.0);
        assert!(merged.flags.state);
    }
}
