//! Parse Graph
//!
//! The data half of the script parser: events, operators and modulator
//! sublists, stored in per-compile slotmap arenas. Cross-references are
//! keys into the arenas, never owning pointers; everything is freed
//! together when the compile (or the failed attempt) is dropped.
//!
//! Invariants the passes rely on:
//!
//! - An operator's `prev` chain is acyclic and walks strictly older events
//!   of the same object; `first` names the defining node.
//! - A composite chain hangs off `composite` and links through `next`, but
//!   none of its events sit in the main chain until the flattener splices
//!   them in.
//! - An event's `objects` list holds every operator node introduced by the
//!   event, root first.

use crate::ramp::{Ramp, DEFAULT_TIME_MS};
use crate::symtab::{NameId, SymId};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Key of a parse event node
    pub struct EvKey;
    /// Key of a parse operator node
    pub struct OpKey;
}

/// Role of an operator edge within a voice graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseKind {
    /// Root operator mixed into the output
    Carr,
    /// Compound amplitude modulation
    CAm,
    /// Amplitude modulation
    Am,
    /// Ring amplitude modulation
    RAm,
    /// Frequency modulation
    Fm,
    /// Ring frequency modulation
    RFm,
    /// Phase modulation
    Pm,
    /// Frequency-phase modulation
    FPm,
}

impl UseKind {
    /// The seven modulator kinds, in voice-graph traversal order.
    pub const MOD_KINDS: [UseKind; 7] = [
        UseKind::CAm,
        UseKind::Am,
        UseKind::RAm,
        UseKind::Fm,
        UseKind::RFm,
        UseKind::Pm,
        UseKind::FPm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UseKind::Carr => "CARR",
            UseKind::CAm => "cAM",
            UseKind::Am => "AM",
            UseKind::RAm => "rAM",
            UseKind::Fm => "FM",
            UseKind::RFm => "rFM",
            UseKind::Pm => "PM",
            UseKind::FPm => "fPM",
        }
    }

    /// Index into per-operator modulator array sets.
    pub fn mod_index(self) -> Option<usize> {
        UseKind::MOD_KINDS.iter().position(|&k| k == self)
    }
}

/// An operator's duration and how it was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSpec {
    pub ms: u32,
    /// Explicitly set in the script
    pub set: bool,
    /// "As long as the carrier"; resolved late
    pub linked: bool,
    /// Defaulted by the timing pass
    pub implicit: bool,
}

impl TimeSpec {
    /// Explicit time from the script.
    pub fn set_ms(&mut self, ms: u32) {
        self.ms = ms;
        self.set = true;
        self.linked = false;
        self.implicit = false;
    }

    /// Linked ("infinite") time: follow the carrier.
    pub fn set_linked(&mut self) {
        self.set = true;
        self.linked = true;
        self.implicit = false;
    }

    /// Default applied by the timing pass.
    pub fn set_default(&mut self, ms: u32) {
        if !self.set {
            self.ms = ms;
            self.implicit = true;
        }
    }
}

/// What kind of signal source an operator is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    /// Table-lookup oscillator
    Wave { wave: NameId },
    /// Noise generator
    Noise { noise: NameId },
    /// Value line (also the envelope form)
    Line,
}

/// Parameter-presence bits on an operator node
pub mod param {
    pub const TIME: u32 = 1 << 0;
    pub const SILENCE: u32 = 1 << 1;
    pub const WAVE: u32 = 1 << 2;
    pub const NOISE: u32 = 1 << 3;
    pub const FREQ: u32 = 1 << 4;
    pub const FREQ2: u32 = 1 << 5;
    pub const AMP: u32 = 1 << 6;
    pub const AMP2: u32 = 1 << 7;
    pub const PAN: u32 = 1 << 8;
    pub const PHASE: u32 = 1 << 9;
    pub const LINE: u32 = 1 << 10;
}

/// State bits of a parse operator node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpFlags {
    /// Defined inside a modulator sublist
    pub nested: bool,
    /// Has a composite chain of its own
    pub has_composite: bool,
    /// Extra operator in a multi-operator binding
    pub multiple: bool,
    /// Silence prefix already folded into the time
    pub silence_added: bool,
    /// A later event re-references this object
    pub later_used: bool,
    /// Re-activated as a carrier by a label reference
    pub add_carrier: bool,
}

/// One modulator sublist attached to an operator
#[derive(Debug, Clone, Default)]
pub struct ModList {
    pub kind: UseKind,
    /// Concatenate onto the object's previous list of this kind instead of
    /// replacing it
    pub append: bool,
    pub ops: Vec<OpKey>,
}

impl Default for UseKind {
    fn default() -> Self {
        UseKind::Carr
    }
}

/// A parse operator node; the central entity of the graph
#[derive(Debug, Clone)]
pub struct OpNode {
    /// Stable per-compile node id
    pub id: u32,
    /// Same object, previous event
    pub prev: Option<OpKey>,
    /// The object's defining node (self for a fresh definition)
    pub first: OpKey,
    /// Owning event
    pub event: EvKey,
    pub kind: ObjKind,
    /// Role at definition: carrier or the sublist kind it sits in
    pub use_kind: UseKind,
    pub time: TimeSpec,
    pub silence_ms: u32,
    pub freq: Ramp,
    pub freq2: Ramp,
    pub amp: Ramp,
    pub amp2: Ramp,
    pub pan: Ramp,
    pub phase: Ramp,
    /// Line value for [`ObjKind::Line`] operators
    pub line: Ramp,
    /// Bits from [`param`]: which parameters this node sets
    pub params: u32,
    pub flags: OpFlags,
    pub mods: Vec<ModList>,
    pub label: Option<SymId>,
}

/// State bits of a parse event node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags {
    /// The event determines its voice's duration
    pub voice_set_dur: bool,
    /// The event needs a fresh voice
    pub assign_voice: bool,
    /// The next event's wait grows by this event's duration
    pub add_wait_duration: bool,
    /// The voice is re-used by a later event and may not be recycled
    pub voice_later_used: bool,
}

/// A parse event node
#[derive(Debug, Clone)]
pub struct EventNode {
    /// Stable per-compile event id
    pub id: u32,
    /// Delay after the previous event in its chain
    pub wait_ms: u32,
    /// Root operator
    pub root: OpKey,
    /// Every operator node introduced by this event, root first
    pub objects: Vec<OpKey>,
    /// Main chain (within a composite chain: the next link)
    pub next: Option<EvKey>,
    /// Head of the composite side chain
    pub composite: Option<EvKey>,
    /// For a composite sub-event: the main event owning the chain
    pub parent_main: Option<EvKey>,
    /// On a group-closing event: the first event of the group
    pub dur_group_first: Option<EvKey>,
    pub flags: EventFlags,
    /// Longest operator time of the event; filled by the timing pass
    pub dur_ms: u32,
}

/// Script-level defaults the `S` settings state mutates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOptions {
    /// Amplitude multiplier applied to carriers
    pub ampmult: f64,
    /// Whether the script set `ampmult` itself
    pub ampmult_set: bool,
    /// Default frequency for new wave operators, Hz
    pub def_freq: f64,
    /// Default relative frequency for nested operators
    pub def_relfreq: f64,
    /// Default operator time
    pub def_time_ms: u32,
    /// A4 tuning used by pitch names, Hz
    pub a4_freq: f64,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            ampmult: 1.0,
            ampmult_set: false,
            def_freq: 440.0,
            def_relfreq: 1.0,
            def_time_ms: DEFAULT_TIME_MS,
            a4_freq: 440.0,
        }
    }
}

/// The full parse graph of one script
#[derive(Debug, Default)]
pub struct ParseGraph {
    pub events: SlotMap<EvKey, EventNode>,
    pub ops: SlotMap<OpKey, OpNode>,
    /// Head of the main event chain
    pub first: Option<EvKey>,
    /// Tail of the main event chain
    pub last: Option<EvKey>,
    next_ev_id: u32,
    next_op_id: u32,
}

impl ParseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event without linking it anywhere (composite links are
    /// attached by the caller).
    pub fn new_event(&mut self, wait_ms: u32) -> EvKey {
        let id = self.next_ev_id;
        self.next_ev_id += 1;
        self.events.insert(EventNode {
            id,
            wait_ms,
            root: OpKey::default(),
            objects: Vec::new(),
            next: None,
            composite: None,
            parent_main: None,
            dur_group_first: None,
            flags: EventFlags::default(),
            dur_ms: 0,
        })
    }

    /// Create an event and append it to the main chain.
    pub fn new_main_event(&mut self, wait_ms: u32) -> EvKey {
        let ev = self.new_event(wait_ms);
        match self.last {
            Some(last) => self.events[last].next = Some(ev),
            None => self.first = Some(ev),
        }
        self.last = Some(ev);
        ev
    }

    /// Create an operator node owned by `event`.
    ///
    /// With `prev` given, the node continues that object; its `first`
    /// back-reference is inherited and the object's defining node is
    /// marked later-used by the caller where that matters.
    pub fn new_op(
        &mut self,
        event: EvKey,
        kind: ObjKind,
        use_kind: UseKind,
        prev: Option<OpKey>,
    ) -> OpKey {
        let id = self.next_op_id;
        self.next_op_id += 1;
        let first = prev.map(|p| self.ops[p].first);
        let key = self.ops.insert(OpNode {
            id,
            prev,
            first: first.unwrap_or_default(),
            event,
            kind,
            use_kind,
            time: TimeSpec::default(),
            silence_ms: 0,
            freq: Ramp::default(),
            freq2: Ramp::default(),
            amp: Ramp::default(),
            amp2: Ramp::default(),
            pan: Ramp::default(),
            phase: Ramp::default(),
            line: Ramp::default(),
            params: 0,
            flags: OpFlags::default(),
            mods: Vec::new(),
            label: None,
        });
        if first.is_none() {
            self.ops[key].first = key;
        }
        self.events[event].objects.push(key);
        key
    }

    /// Number of events created
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of operator nodes created
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Walk the main event chain from the head.
    pub fn main_chain(&self) -> MainChain<'_> {
        MainChain {
            graph: self,
            cursor: self.first,
        }
    }
}

/// Iterator over the main event chain
pub struct MainChain<'a> {
    graph: &'a ParseGraph,
    cursor: Option<EvKey>,
}

impl<'a> Iterator for MainChain<'a> {
    type Item = EvKey;

    fn next(&mut self) -> Option<EvKey> {
        let key = self.cursor?;
        self.cursor = self.graph.events[key].next;
        Some(key)
    }
}

impl ParseGraph {
    /// A readable dump of the graph, for debugging parses and for test
    /// assertions that care about shape rather than one field.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for ev in self.main_chain() {
            self.dump_event(&mut out, ev, 0);
            let mut c = self.events[ev].composite;
            while let Some(k) = c {
                self.dump_event(&mut out, k, 1);
                c = self.events[k].next;
            }
        }
        out
    }

    fn dump_event(&self, out: &mut String, ev: EvKey, indent: usize) {
        let e = &self.events[ev];
        out.push_str(&"  ".repeat(indent));
        out.push_str(&format!("ev{} +{}ms", e.id, e.wait_ms));
        if e.dur_group_first.is_some() {
            out.push_str(" (closes group)");
        }
        out.push('\n');
        for &op in &e.objects {
            self.dump_op(out, op, indent + 1);
        }
    }

    fn dump_op(&self, out: &mut String, op: OpKey, indent: usize) {
        let o = &self.ops[op];
        out.push_str(&"  ".repeat(indent));
        let kind = match o.kind {
            ObjKind::Wave { wave } => format!("wave{}", wave),
            ObjKind::Noise { noise } => format!("noise{}", noise),
            ObjKind::Line => "line".to_string(),
        };
        out.push_str(&format!("op{} {} {}", o.id, kind, o.use_kind.name()));
        if o.time.set {
            out.push_str(&format!(" t={}ms", o.time.ms));
        } else if o.time.linked {
            out.push_str(" t=linked");
        }
        if o.prev.is_some() {
            out.push_str(" (cont)");
        }
        for list in &o.mods {
            out.push_str(&format!(
                " {}[{}{}]",
                list.kind.name(),
                list.ops.len(),
                if list.append { "+" } else { "" }
            ));
        }
        out.push('\n');
    }
}
