//! Script Parser
//!
//! Recursive descent over the nested scopes of a score script, driven by
//! one `parse_level` function that switches on the next meaningful
//! character. Scopes: the top level (each line starts a fresh sub-state),
//! `< ... >` duration groups, `[ ... ]` modulator sublists, and `@[ ... ]`
//! multi-operator bindings. Two sub-states live inside a level: `S`
//! absorbs default-value settings and an active operator absorbs
//! parameter tokens.
//!
//! Errors are non-fatal: an invalid character or rejected value produces
//! a diagnostic and parsing continues at the next boundary. The parser
//! builds the parse graph only; timing defaults, composite splicing and
//! id allocation are later passes.

use crate::ast::{
    param, EvKey, ModList, ObjKind, OpKey, ParseGraph, ScriptOptions, UseKind,
};
use crate::buffer::ScriptBuffer;
use crate::diag::Diagnostics;
use crate::expr::parse_number;
use crate::names::{self, NameRegistry};
use crate::ramp::{LineShape, Ramp};
use crate::scanner::{Scanner, CH_END};
use crate::symtab::{SymId, SymKind, SymTab};

/// Everything the parser hands to the later passes
pub struct ParseOutput {
    pub graph: ParseGraph,
    pub options: ScriptOptions,
    pub symtab: SymTab,
    pub diag: Diagnostics,
}

/// Kind of syntactic scope a level runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Top,
    Group,
    Nest,
    Bind,
}

/// A primed modulator-list attachment (`x!` was seen; `[` may follow)
#[derive(Debug, Clone, Copy)]
struct PendingList {
    op: OpKey,
    normal: UseKind,
    ring: UseKind,
}

/// Per-recursion parse state
struct Level {
    scope: Scope,
    use_kind: UseKind,
    /// Event the nested operators of a sublist belong to
    parent_event: Option<EvKey>,
    /// Current event receiving operators (top/group/bind)
    event: Option<EvKey>,
    /// Operator currently absorbing parameters
    op: Option<OpKey>,
    /// Most recent event created at this level
    last_event: Option<EvKey>,
    /// First event of the currently open duration group
    group_first: Option<EvKey>,
    /// Wait accumulated for the next event
    next_wait_ms: u32,
    pending_label: Option<SymId>,
    pending_list: Option<PendingList>,
    /// Operators collected by a sublist or binding
    list: Vec<OpKey>,
}

impl Level {
    fn new(scope: Scope, use_kind: UseKind, parent_event: Option<EvKey>) -> Self {
        Self {
            scope,
            use_kind,
            parent_event,
            event: None,
            op: None,
            last_event: None,
            group_first: None,
            next_wait_ms: 0,
            pending_label: None,
            pending_list: None,
            list: Vec::new(),
        }
    }
}

/// The script parser
pub struct Parser {
    sc: Scanner,
    g: ParseGraph,
    opt: ScriptOptions,
    /// Set by the `Q` end marker; unwinds every open level
    ended: bool,
}

impl Parser {
    /// Create a parser over a script buffer with the runtime's name
    /// tables registered.
    pub fn new(buffer: ScriptBuffer, registry: &NameRegistry, diag: Diagnostics) -> Self {
        let mut symtab = SymTab::new();
        registry.register(&mut symtab);
        Self {
            sc: Scanner::new(buffer, symtab, diag),
            g: ParseGraph::new(),
            opt: ScriptOptions::default(),
            ended: false,
        }
    }

    /// Parse the whole script into a parse graph.
    pub fn run(mut self) -> ParseOutput {
        let mut top = Level::new(Scope::Top, UseKind::Carr, None);
        self.parse_level(&mut top);
        let (symtab, diag) = self.sc.into_parts();
        ParseOutput {
            graph: self.g,
            options: self.opt,
            symtab,
            diag,
        }
    }

    /// One scope's worth of parsing; recurses for nested scopes.
    fn parse_level(&mut self, lv: &mut Level) {
        loop {
            if self.ended {
                return;
            }
            let c = self.sc.getc();
            match c {
                CH_END => {
                    if lv.scope == Scope::Nest || lv.scope == Scope::Bind {
                        let frame = self.sc.frame();
                        self.sc.diag().warn_at(frame, "missing ']' at end of script");
                    } else if lv.scope == Scope::Group {
                        let frame = self.sc.frame();
                        self.sc.diag().warn_at(frame, "missing '>' at end of script");
                    }
                    return;
                }
                b' ' => {}
                b'\n' => {
                    // A fresh line resets the sub-state at the top level.
                    if lv.scope == Scope::Top {
                        lv.op = None;
                        lv.pending_label = None;
                        lv.pending_list = None;
                    }
                }
                b'S' => {
                    lv.pending_list = None;
                    self.parse_settings();
                }
                b'W' | b'O' => {
                    let wave = self
                        .read_type_name(SymKind::Wave)
                        .unwrap_or(0);
                    self.make_operator(lv, ObjKind::Wave { wave });
                }
                b'N' => {
                    let noise = self
                        .read_type_name(SymKind::Noise)
                        .unwrap_or(0);
                    self.make_operator(lv, ObjKind::Noise { noise });
                }
                b'L' | b'E' => {
                    self.make_operator(lv, ObjKind::Line);
                    // An optional goal number may follow the constructor;
                    // anything else is left for the parameter tokens.
                    if self.sc.getc() != b' ' {
                        self.sc.ungetc();
                    }
                    let next = self.sc.getc();
                    self.sc.ungetc();
                    if matches!(next, b'0'..=b'9' | b'.' | b'(' | b'$') {
                        if let (Some(op), Some(v)) = (lv.op, self.num()) {
                            self.g.ops[op].line.set_goal(v as f32, false);
                            self.g.ops[op].params |= param::LINE;
                        }
                    }
                }
                b'Q' => {
                    self.ended = true;
                    return;
                }
                b'\\' => {
                    lv.pending_list = None;
                    self.parse_wait(lv);
                }
                b'\'' => {
                    lv.pending_list = None;
                    match self.sc.get_identifier() {
                        Some(id) => lv.pending_label = Some(id),
                        None => {
                            let frame = self.sc.frame();
                            self.sc
                                .diag()
                                .warn_at(frame, "expected a label name after '''");
                        }
                    }
                }
                b':' => {
                    lv.pending_list = None;
                    self.parse_label_ref(lv);
                }
                b'$' => {
                    lv.pending_list = None;
                    self.parse_var_assign();
                }
                b'<' => {
                    lv.pending_list = None;
                    let mut sub = Level::new(Scope::Group, lv.use_kind, None);
                    sub.next_wait_ms = std::mem::take(&mut lv.next_wait_ms);
                    self.parse_level(&mut sub);
                    self.close_open_group(&mut sub);
                    lv.last_event = sub.last_event.or(lv.last_event);
                    lv.op = None;
                    // The group acts as its own separator.
                    lv.group_first = None;
                }
                b'>' => {
                    if lv.scope == Scope::Group {
                        return;
                    }
                    let frame = self.sc.frame();
                    self.sc.diag().warn_at(frame, "unmatched '>'");
                }
                b'[' => {
                    self.enter_nest(lv, false, false);
                }
                b'~' => {
                    if self.sc.tryc(b'[') {
                        self.enter_nest(lv, true, false);
                    } else {
                        let frame = self.sc.frame();
                        self.sc.diag().warn_at(frame, "invalid character '~'");
                    }
                }
                b'+' => {
                    if self.sc.tryc(b'[') {
                        self.enter_nest(lv, false, true);
                    } else {
                        let frame = self.sc.frame();
                        self.sc.diag().warn_at(frame, "invalid character '+'");
                    }
                }
                b']' => {
                    if lv.scope == Scope::Nest || lv.scope == Scope::Bind {
                        return;
                    }
                    let frame = self.sc.frame();
                    self.sc.diag().warn_at(frame, "unmatched ']'");
                }
                b'@' => {
                    lv.pending_list = None;
                    if self.sc.tryc(b'[') {
                        self.parse_bind(lv);
                    } else {
                        let frame = self.sc.frame();
                        self.sc.diag().warn_at(frame, "expected '[' after '@'");
                    }
                }
                b';' => {
                    lv.pending_list = None;
                    match lv.op {
                        Some(op) => {
                            let next = self.begin_composite(op);
                            lv.op = Some(next);
                        }
                        None => {
                            let frame = self.sc.frame();
                            self.sc.diag().warn_at(frame, "';' without an operator");
                        }
                    }
                }
                b'|' => {
                    lv.pending_list = None;
                    self.close_open_group(lv);
                    lv.op = None;
                }
                b'a' | b'c' | b'f' | b'r' | b'p' | b't' | b's' | b'w' | b'g' | b'l' | b'n'
                | b'v'
                    if lv.op.is_some() =>
                {
                    self.parse_param(lv, c);
                }
                _ => {
                    lv.pending_list = None;
                    let frame = self.sc.frame();
                    self.sc.diag().warn_at(
                        frame,
                        format!("invalid character '{}' skipped", c as char),
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Numbers

    fn num(&mut self) -> Option<f64> {
        parse_number(&mut self.sc, None)
    }

    /// Number in frequency context: pitch names resolve.
    fn num_freq(&mut self) -> Option<f64> {
        let a4 = self.opt.a4_freq;
        let consts = move |name: &str| names::pitch_freq(name, a4);
        parse_number(&mut self.sc, Some(&consts))
    }

    /// Number in channel context: `L`/`C`/`R` resolve.
    fn num_pan(&mut self) -> Option<f64> {
        let consts = |name: &str| names::pan_value(name);
        parse_number(&mut self.sc, Some(&consts))
    }

    /// A time value in seconds, converted to milliseconds. Negative values
    /// are rejected with a diagnostic.
    fn time_ms(&mut self) -> Option<u32> {
        let v = self.num()?;
        if v < 0.0 {
            let frame = self.sc.frame();
            self.sc
                .diag()
                .warn_at(frame, "negative time value discarded");
            return None;
        }
        Some((v * 1000.0).round() as u32)
    }

    // ------------------------------------------------------------------
    // Statements

    /// The `S` settings sub-state: absorb default assignments until a
    /// character that is not a setting.
    fn parse_settings(&mut self) {
        loop {
            let c = self.sc.getc();
            match c {
                b' ' => {}
                b'a' => {
                    self.sc.tryc(b'=');
                    if let Some(v) = self.num() {
                        self.opt.ampmult = v;
                        self.opt.ampmult_set = true;
                    }
                }
                b'f' => {
                    self.sc.tryc(b'=');
                    if let Some(v) = self.num_freq() {
                        self.opt.def_freq = v;
                    }
                }
                b'r' => {
                    self.sc.tryc(b'=');
                    if let Some(v) = self.num() {
                        self.opt.def_relfreq = v;
                    }
                }
                b't' => {
                    self.sc.tryc(b'=');
                    if let Some(ms) = self.time_ms() {
                        self.opt.def_time_ms = ms;
                    }
                }
                b'n' => {
                    self.sc.tryc(b'=');
                    if let Some(v) = self.num_freq() {
                        self.opt.a4_freq = v;
                    }
                }
                _ => {
                    self.sc.ungetc();
                    return;
                }
            }
        }
    }

    /// `\<num>` adds wait before the next event; `\t` re-uses the previous
    /// event's duration instead.
    fn parse_wait(&mut self, lv: &mut Level) {
        if self.sc.tryc(b't') {
            match lv.last_event {
                Some(ev) => self.g.events[ev].flags.add_wait_duration = true,
                None => {
                    let frame = self.sc.frame();
                    self.sc
                        .diag()
                        .warn_at(frame, "'\\t' without a previous event");
                }
            }
            return;
        }
        match self.time_ms() {
            Some(ms) => lv.next_wait_ms = lv.next_wait_ms.saturating_add(ms),
            None => {
                let frame = self.sc.frame();
                self.sc
                    .diag()
                    .warn_at(frame, "expected a wait time after '\\'");
            }
        }
    }

    /// `$name = <num>` variable assignment.
    fn parse_var_assign(&mut self) {
        let Some(id) = self.sc.get_identifier() else {
            let frame = self.sc.frame();
            self.sc
                .diag()
                .warn_at(frame, "expected a variable name after '$'");
            return;
        };
        loop {
            let c = self.sc.getc();
            if c != b' ' {
                self.sc.ungetc();
                break;
            }
        }
        if !self.sc.tryc(b'=') {
            let frame = self.sc.frame();
            self.sc
                .diag()
                .warn_at(frame, "expected '=' in variable assignment");
            return;
        }
        loop {
            let c = self.sc.getc();
            if c != b' ' {
                self.sc.ungetc();
                break;
            }
        }
        match self.num() {
            Some(v) => self.sc.symtab().set_variable(id, v),
            None => {
                let frame = self.sc.frame();
                self.sc
                    .diag()
                    .warn_at(frame, "expected a value in variable assignment");
            }
        }
    }

    /// `:name` re-references a labeled operator and opens an event that
    /// updates it.
    fn parse_label_ref(&mut self, lv: &mut Level) {
        let Some(id) = self.sc.get_identifier() else {
            let frame = self.sc.frame();
            self.sc
                .diag()
                .warn_at(frame, "expected a label name after ':'");
            return;
        };
        let Some(target) = self.sc.symtab_ref().label(id) else {
            let name = self.sc.symtab_ref().name(id).to_string();
            let frame = self.sc.frame();
            self.sc
                .diag()
                .error_at(frame, format!("undefined label '{}'", name));
            return;
        };
        let first = self.g.ops[target].first;
        self.g.ops[first].flags.later_used = true;
        let def_ev = self.g.ops[first].event;
        self.g.events[def_ev].flags.voice_later_used = true;

        if lv.scope == Scope::Nest {
            // Inside a sublist the reference makes the existing object a
            // member of the list rather than opening a new event.
            let ev = lv
                .parent_event
                .expect("nest level always carries its parent event");
            let op = self.continue_object(ev, target);
            lv.list.push(op);
            lv.op = Some(op);
            return;
        }

        let ev = self.g.new_main_event(std::mem::take(&mut lv.next_wait_ms));
        let op = self.continue_object(ev, target);
        self.g.events[ev].root = op;
        if self.g.ops[first].use_kind == UseKind::Carr {
            self.g.ops[op].flags.add_carrier = true;
        }
        if lv.group_first.is_none() {
            lv.group_first = Some(ev);
        }
        lv.event = Some(ev);
        lv.last_event = Some(ev);
        lv.op = Some(op);
    }

    // ------------------------------------------------------------------
    // Operators and events

    /// Optional type name after a constructor letter (`W sin`, `N wh`).
    /// An identifier that is not in the table is rolled back so it can be
    /// read again as parameter tokens.
    fn read_type_name(&mut self, kind: SymKind) -> Option<crate::symtab::NameId> {
        let c = self.sc.getc();
        if c != b' ' {
            self.sc.ungetc();
        }
        let id = self.sc.get_identifier()?;
        if let Some(n) = self.sc.symtab_ref().name_id(id, kind) {
            return Some(n);
        }
        let len = self.sc.sym_len(id);
        self.sc.unget_identifier(len);
        None
    }

    /// Open a new event and operator for a constructor token.
    fn make_operator(&mut self, lv: &mut Level, kind: ObjKind) {
        lv.pending_list = None;
        let op = match lv.scope {
            Scope::Top | Scope::Group => {
                let ev = self.g.new_main_event(std::mem::take(&mut lv.next_wait_ms));
                let op = self.g.new_op(ev, kind, UseKind::Carr, None);
                self.g.events[ev].root = op;
                self.g.events[ev].flags.assign_voice = true;
                if lv.group_first.is_none() {
                    lv.group_first = Some(ev);
                }
                lv.event = Some(ev);
                lv.last_event = Some(ev);
                op
            }
            Scope::Nest => {
                let ev = lv
                    .parent_event
                    .expect("nest level always carries its parent event");
                let op = self.g.new_op(ev, kind, lv.use_kind, None);
                self.g.ops[op].flags.nested = true;
                lv.list.push(op);
                op
            }
            Scope::Bind => match lv.event {
                None => {
                    let ev = self.g.new_main_event(std::mem::take(&mut lv.next_wait_ms));
                    let op = self.g.new_op(ev, kind, UseKind::Carr, None);
                    self.g.events[ev].root = op;
                    self.g.events[ev].flags.assign_voice = true;
                    lv.event = Some(ev);
                    lv.last_event = Some(ev);
                    lv.list.push(op);
                    op
                }
                Some(ev) => {
                    let op = self.g.new_op(ev, kind, UseKind::Carr, None);
                    self.g.ops[op].flags.multiple = true;
                    lv.list.push(op);
                    op
                }
            },
        };
        if let Some(label) = lv.pending_label.take() {
            self.g.ops[op].label = Some(label);
            self.sc.symtab().set_label(label, op);
        }
        lv.op = Some(op);
    }

    /// A continuation node of an existing object in a new event.
    fn continue_object(&mut self, ev: EvKey, prev: OpKey) -> OpKey {
        let kind = self.g.ops[prev].kind;
        let use_kind = self.g.ops[prev].use_kind;
        let nested = self.g.ops[prev].flags.nested;
        let label = self.g.ops[prev].label;
        let op = self.g.new_op(ev, kind, use_kind, Some(prev));
        self.g.ops[op].flags.nested = nested;
        self.g.ops[op].label = label;
        if let Some(l) = label {
            self.sc.symtab().set_label(l, op);
        }
        op
    }

    /// `;` (or an implicit repeat of a parameter): extend the operator
    /// with a composite sub-event.
    fn begin_composite(&mut self, op: OpKey) -> OpKey {
        let ev = self.g.ops[op].event;
        let main_ev = self.g.events[ev].parent_main.unwrap_or(ev);

        let se = self.g.new_event(0);
        self.g.events[se].parent_main = Some(main_ev);
        match self.g.events[main_ev].composite {
            None => self.g.events[main_ev].composite = Some(se),
            Some(head) => {
                let mut tail = head;
                while let Some(next) = self.g.events[tail].next {
                    tail = next;
                }
                self.g.events[tail].next = Some(se);
            }
        }

        self.g.ops[op].flags.has_composite = true;
        let next = self.continue_object(se, op);
        self.g.events[se].root = next;
        next
    }

    /// A `[`-opened modulator sublist; `ring` selects the ring-modulation
    /// kind, `append` concatenates onto the object's previous list.
    fn enter_nest(&mut self, lv: &mut Level, ring: bool, append: bool) {
        let Some(pending) = lv.pending_list.take() else {
            let frame = self.sc.frame();
            self.sc
                .diag()
                .warn_at(frame, "modulator list without a preceding 'x!' parameter");
            return;
        };
        let kind = if ring { pending.ring } else { pending.normal };
        let mut sub = Level::new(Scope::Nest, kind, Some(self.g.ops[pending.op].event));
        self.parse_level(&mut sub);
        self.g.ops[pending.op].mods.push(ModList {
            kind,
            append,
            ops: sub.list,
        });
    }

    /// `@[ ... ]`: several operators bound as one object. The first is the
    /// object; the rest carry the multiple flag.
    fn parse_bind(&mut self, lv: &mut Level) {
        let mut sub = Level::new(Scope::Bind, lv.use_kind, None);
        sub.next_wait_ms = std::mem::take(&mut lv.next_wait_ms);
        self.parse_level(&mut sub);
        lv.event = sub.event.or(lv.event);
        lv.last_event = sub.last_event.or(lv.last_event);
        lv.op = sub.list.first().copied().or(lv.op);
        if let (Some(ev), None) = (sub.event, lv.group_first) {
            lv.group_first = Some(ev);
        }
    }

    /// Mark the open duration group closed at the most recent event.
    fn close_open_group(&mut self, lv: &mut Level) {
        if let (Some(first), Some(last)) = (lv.group_first.take(), lv.last_event) {
            self.g.events[last].dur_group_first = Some(first);
        }
    }

    // ------------------------------------------------------------------
    // Parameters

    /// Whether setting `bit` again on the operator must open an implicit
    /// composite first.
    fn composite_if_set(&mut self, lv: &mut Level, conflicting: bool) {
        if !conflicting {
            return;
        }
        if let Some(op) = lv.op {
            let next = self.begin_composite(op);
            lv.op = Some(next);
        }
    }

    /// One parameter token on the active operator.
    fn parse_param(&mut self, lv: &mut Level, letter: u8) {
        lv.pending_list = None;
        let excl = self.sc.tryc(b'!');
        self.sc.tryc(b'=');
        let op = lv.op.expect("parameter parsing requires an operator");

        match letter {
            b'w' => {
                // The value is consumed even when rejected, so recovery
                // resumes at the next token rather than inside this one.
                let name = self.ident_in(SymKind::Wave);
                if !matches!(self.g.ops[op].kind, ObjKind::Wave { .. }) {
                    self.reject_param("'w' on a non-wave operator");
                    return;
                }
                match name {
                    Some(n) => {
                        self.g.ops[op].kind = ObjKind::Wave { wave: n };
                        self.g.ops[op].params |= param::WAVE;
                    }
                    None => self.reject_param("unknown wave type"),
                }
            }
            b'n' => {
                let name = self.ident_in(SymKind::Noise);
                if !matches!(self.g.ops[op].kind, ObjKind::Noise { .. }) {
                    self.reject_param("'n' on a non-noise operator");
                    return;
                }
                match name {
                    Some(n) => {
                        self.g.ops[op].kind = ObjKind::Noise { noise: n };
                        self.g.ops[op].params |= param::NOISE;
                    }
                    None => self.reject_param("unknown noise type"),
                }
            }
            b'l' => {
                let name = self.ident_in(SymKind::LineShape);
                if self.g.ops[op].kind != ObjKind::Line {
                    self.reject_param("'l' on a non-line operator");
                    return;
                }
                match name {
                    Some(n) => {
                        let shape = LineShape::from_name_id(n).unwrap_or_default();
                        self.g.ops[op].line.set_shape(shape);
                        self.g.ops[op].params |= param::LINE;
                    }
                    None => self.reject_param("unknown line shape"),
                }
            }
            b't' => {
                if self.sc.tryc(b'i') {
                    self.composite_if_set(lv, self.g.ops[op].time.set);
                    let op = lv.op.unwrap_or(op);
                    self.g.ops[op].time.set_linked();
                    self.g.ops[op].params |= param::TIME;
                } else if let Some(ms) = self.time_ms() {
                    self.composite_if_set(lv, self.g.ops[op].time.set);
                    let op = lv.op.unwrap_or(op);
                    self.g.ops[op].time.set_ms(ms);
                    self.g.ops[op].params |= param::TIME;
                }
            }
            b's' => {
                if let Some(ms) = self.time_ms() {
                    self.composite_if_set(lv, self.g.ops[op].params & param::SILENCE != 0);
                    let op = lv.op.unwrap_or(op);
                    self.g.ops[op].silence_ms = ms;
                    self.g.ops[op].params |= param::SILENCE;
                }
            }
            b'g' => {
                let value = self.num();
                if self.g.ops[op].kind != ObjKind::Line {
                    self.reject_param("'g' on a non-line operator");
                    return;
                }
                if let Some(v) = value {
                    self.composite_if_set(lv, self.g.ops[op].line.flags.goal);
                    let op = lv.op.unwrap_or(op);
                    self.g.ops[op].line.set_goal(v as f32, false);
                    self.g.ops[op].params |= param::LINE;
                }
            }
            b'v' => {
                let value = self.num();
                if self.g.ops[op].kind != ObjKind::Line {
                    self.reject_param("'v' on a non-line operator");
                    return;
                }
                if let Some(v) = value {
                    self.composite_if_set(lv, self.g.ops[op].line.flags.state);
                    let op = lv.op.unwrap_or(op);
                    self.g.ops[op].line.set_state(v as f32, false);
                    self.g.ops[op].params |= param::LINE;
                }
            }
            b'a' => self.parse_value_param(lv, ValueParam::Amp, excl),
            b'c' => self.parse_value_param(lv, ValueParam::Pan, excl),
            b'f' => self.parse_value_param(lv, ValueParam::Freq, excl),
            b'r' => {
                if !self.g.ops[op].flags.nested {
                    // Consume the rejected value whichever form it takes.
                    if self.sc.tryc(b'{') {
                        let mut scratch = Ramp::default();
                        self.parse_ramp_block(&mut scratch, ValueParam::RelFreq, true);
                    } else {
                        let _ = self.num();
                    }
                    self.reject_param("relative frequency on a non-nested operator");
                    return;
                }
                self.parse_value_param(lv, ValueParam::RelFreq, excl);
            }
            b'p' => self.parse_value_param(lv, ValueParam::Phase, excl),
            _ => unreachable!("parse_param called for a non-parameter letter"),
        }
    }

    /// Value parameter with the number / ramp / secondary / list forms.
    fn parse_value_param(&mut self, lv: &mut Level, which: ValueParam, excl: bool) {
        let op = lv.op.expect("parameter parsing requires an operator");
        let ratio = which == ValueParam::RelFreq;

        if self.sc.tryc(b'{') {
            let conflict = {
                let ramp = self.target_ramp(op, which, excl);
                ramp.flags.goal
            };
            self.composite_if_set(lv, conflict);
            let op = lv.op.unwrap_or(op);
            let mut ramp = *self.target_ramp(op, which, excl);
            self.parse_ramp_block(&mut ramp, which, ratio);
            *self.target_ramp(op, which, excl) = ramp;
            self.g.ops[op].params |= which.param_bit(excl);
        } else {
            let value = match which {
                ValueParam::Freq => self.num_freq(),
                ValueParam::Pan => self.num_pan(),
                _ => self.num(),
            };
            if let Some(v) = value {
                if which == ValueParam::Phase && excl {
                    self.reject_param("phase has no secondary value");
                } else {
                    let conflict = self.target_ramp(op, which, excl).flags.state;
                    self.composite_if_set(lv, conflict);
                    let op = lv.op.unwrap_or(op);
                    self.target_ramp(op, which, excl).set_state(v as f32, ratio);
                    self.g.ops[op].params |= which.param_bit(excl);
                }
            }
        }

        if excl {
            if let Some((normal, ring)) = which.list_kinds() {
                lv.pending_list = Some(PendingList {
                    op: lv.op.unwrap_or(op),
                    normal,
                    ring,
                });
            }
        }
    }

    /// The ramp a value parameter form writes to.
    fn target_ramp(&mut self, op: OpKey, which: ValueParam, excl: bool) -> &mut Ramp {
        let node = &mut self.g.ops[op];
        match which {
            ValueParam::Amp => {
                if excl {
                    &mut node.amp2
                } else {
                    &mut node.amp
                }
            }
            ValueParam::Freq | ValueParam::RelFreq => {
                if excl {
                    &mut node.freq2
                } else {
                    &mut node.freq
                }
            }
            ValueParam::Pan => &mut node.pan,
            ValueParam::Phase => &mut node.phase,
        }
    }

    /// `{ c=<shape> t=<time> v=<goal> }` ramp block.
    fn parse_ramp_block(&mut self, ramp: &mut Ramp, which: ValueParam, ratio: bool) {
        loop {
            let c = self.sc.getc();
            match c {
                b' ' | b'\n' => {}
                b'}' => return,
                CH_END => {
                    let frame = self.sc.frame();
                    self.sc.diag().warn_at(frame, "missing '}' in ramp");
                    return;
                }
                b'c' => {
                    self.sc.tryc(b'=');
                    match self.ident_in(SymKind::LineShape) {
                        Some(n) => {
                            let shape = LineShape::from_name_id(n).unwrap_or_default();
                            ramp.set_shape(shape);
                        }
                        None => self.reject_param("unknown line shape in ramp"),
                    }
                }
                b't' => {
                    self.sc.tryc(b'=');
                    if let Some(ms) = self.time_ms() {
                        ramp.set_time(ms);
                    }
                }
                b'v' => {
                    self.sc.tryc(b'=');
                    let value = match which {
                        ValueParam::Freq => self.num_freq(),
                        ValueParam::Pan => self.num_pan(),
                        _ => self.num(),
                    };
                    if let Some(v) = value {
                        ramp.set_goal(v as f32, ratio);
                    }
                }
                _ => {
                    let frame = self.sc.frame();
                    self.sc.diag().warn_at(
                        frame,
                        format!("invalid character '{}' in ramp", c as char),
                    );
                }
            }
        }
    }

    /// Identifier looked up in a registered name table; unknown names are
    /// consumed (the caller reports).
    fn ident_in(&mut self, kind: SymKind) -> Option<crate::symtab::NameId> {
        let id = self.sc.get_identifier()?;
        self.sc.symtab_ref().name_id(id, kind)
    }

    fn reject_param(&mut self, message: &str) {
        let frame = self.sc.frame();
        self.sc.diag().warn_at(frame, message.to_string());
    }
}

/// Which value parameter a form addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueParam {
    Amp,
    Pan,
    Freq,
    RelFreq,
    Phase,
}

impl ValueParam {
    fn param_bit(self, excl: bool) -> u32 {
        match self {
            ValueParam::Amp => {
                if excl {
                    param::AMP2
                } else {
                    param::AMP
                }
            }
            ValueParam::Freq | ValueParam::RelFreq => {
                if excl {
                    param::FREQ2
                } else {
                    param::FREQ
                }
            }
            ValueParam::Pan => param::PAN,
            ValueParam::Phase => param::PHASE,
        }
    }

    /// `(normal, ring)` modulator kinds a `x![` form opens.
    fn list_kinds(self) -> Option<(UseKind, UseKind)> {
        match self {
            ValueParam::Amp => Some((UseKind::Am, UseKind::RAm)),
            ValueParam::Pan => Some((UseKind::CAm, UseKind::CAm)),
            ValueParam::Freq | ValueParam::RelFreq => Some((UseKind::Fm, UseKind::RFm)),
            ValueParam::Phase => Some((UseKind::Pm, UseKind::FPm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ObjKind;

    fn parse(src: &str) -> ParseOutput {
        let parser = Parser::new(
            ScriptBuffer::from_str(src),
            &NameRegistry::default(),
            Diagnostics::silent("test"),
        );
        parser.run()
    }

    #[test]
    fn test_single_event() {
        let out = parse("W f440 a0.5 t1");
        assert_eq!(out.graph.event_count(), 1);
        assert_eq!(out.graph.op_count(), 1);
        let ev = out.graph.first.unwrap();
        let op = out.graph.events[ev].root;
        let node = &out.graph.ops[op];
        assert_eq!(node.freq.v0, 440.0);
        assert!(node.freq.flags.state);
        assert_eq!(node.amp.v0, 0.5);
        assert_eq!(node.time.ms, 1000);
        assert!(node.time.set);
        assert!(out.diag.entries().is_empty());
    }

    #[test]
    fn test_wave_type_name() {
        let out = parse("W sqr f100");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.kind, ObjKind::Wave { wave: 1 });
        assert_eq!(node.freq.v0, 100.0);
    }

    #[test]
    fn test_wave_type_defaults_to_first() {
        let out = parse("W f100");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.kind, ObjKind::Wave { wave: 0 });
    }

    #[test]
    fn test_noise_event() {
        let out = parse("N pk a0.3");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.kind, ObjKind::Noise { noise: 1 });
    }

    #[test]
    fn test_composite_chain() {
        let out = parse("W f440 ; t0.5 w=sqr");
        assert_eq!(out.graph.op_count(), 2);
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 1);
        let e0 = main[0];
        let se = out.graph.events[e0].composite.expect("composite chain");
        let root = out.graph.events[e0].root;
        let sub = out.graph.events[se].root;
        assert_eq!(out.graph.ops[sub].prev, Some(root));
        assert_eq!(out.graph.ops[sub].kind, ObjKind::Wave { wave: 1 });
        assert_eq!(out.graph.ops[sub].time.ms, 500);
        assert!(out.graph.ops[root].flags.has_composite);
    }

    #[test]
    fn test_implicit_composite_on_repeat() {
        let out = parse("W t1 t2");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 1);
        assert!(out.graph.events[main[0]].composite.is_some());
        assert_eq!(out.graph.op_count(), 2);
    }

    #[test]
    fn test_modulator_sublist() {
        let out = parse("W f220 p!{c=lin t=2 v=1}[ W r1 a1 ]");
        let ev = out.graph.first.unwrap();
        let root = out.graph.events[ev].root;
        let node = &out.graph.ops[root];
        assert!(node.phase.flags.goal);
        assert_eq!(node.phase.vt, 1.0);
        assert_eq!(node.phase.time_ms, 2000);
        assert!(node.phase.flags.time);
        assert_eq!(node.mods.len(), 1);
        assert_eq!(node.mods[0].kind, UseKind::Pm);
        assert_eq!(node.mods[0].ops.len(), 1);
        let m = &out.graph.ops[node.mods[0].ops[0]];
        assert!(m.flags.nested);
        assert!(m.freq.flags.state_ratio);
        assert_eq!(m.freq.v0, 1.0);
        assert_eq!(m.amp.v0, 1.0);
        // Nested operators share the parent event.
        assert_eq!(m.event, ev);
        assert_eq!(out.graph.events[ev].objects.len(), 2);
    }

    #[test]
    fn test_ring_and_append_lists() {
        let out = parse("W a!~[ W r2 ] a!+[ W r3 ]");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.mods.len(), 2);
        assert_eq!(node.mods[0].kind, UseKind::RAm);
        assert!(!node.mods[0].append);
        assert_eq!(node.mods[1].kind, UseKind::Am);
        assert!(node.mods[1].append);
    }

    #[test]
    fn test_relative_freq_rejected_at_top() {
        let out = parse("W r2");
        assert!(!out.diag.entries().is_empty());
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert!(!node.freq.flags.state);
    }

    #[test]
    fn test_settings() {
        let out = parse("S a=0.25 f=220 t=2 n=432");
        assert_eq!(out.options.ampmult, 0.25);
        assert!(out.options.ampmult_set);
        assert_eq!(out.options.def_freq, 220.0);
        assert_eq!(out.options.def_time_ms, 2000);
        assert_eq!(out.options.a4_freq, 432.0);
    }

    #[test]
    fn test_settings_defaults() {
        let out = parse("W f100");
        assert!(!out.options.ampmult_set);
        assert_eq!(out.options.ampmult, 1.0);
    }

    #[test]
    fn test_wait_accumulates() {
        let out = parse("W t1 \\0.5 W t1");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 2);
        assert_eq!(out.graph.events[main[0]].wait_ms, 0);
        assert_eq!(out.graph.events[main[1]].wait_ms, 500);
    }

    #[test]
    fn test_wait_t_sets_flag() {
        let out = parse("W t1 \\t W t1");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert!(out.graph.events[main[0]].flags.add_wait_duration);
    }

    #[test]
    fn test_duration_group() {
        let out = parse("< W t=0.1 W t=0.5 >");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 2);
        assert_eq!(out.graph.events[main[1]].dur_group_first, Some(main[0]));
        assert_eq!(out.graph.events[main[0]].dur_group_first, None);
    }

    #[test]
    fn test_time_separator_groups() {
        let out = parse("W t1 W t2 | W t1");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 3);
        assert_eq!(out.graph.events[main[1]].dur_group_first, Some(main[0]));
        assert_eq!(out.graph.events[main[2]].dur_group_first, None);
    }

    #[test]
    fn test_labels() {
        let out = parse("'osc W f440\n:osc a0.8");
        assert_eq!(out.graph.event_count(), 2);
        let main: Vec<_> = out.graph.main_chain().collect();
        let first_op = out.graph.events[main[0]].root;
        let second_op = out.graph.events[main[1]].root;
        assert_eq!(out.graph.ops[second_op].prev, Some(first_op));
        assert_eq!(out.graph.ops[second_op].first, first_op);
        assert!(out.graph.ops[first_op].flags.later_used);
        assert!(out.graph.events[main[0]].flags.voice_later_used);
        assert!(out.graph.ops[second_op].flags.add_carrier);
        assert!(out.diag.entries().is_empty());
    }

    #[test]
    fn test_undefined_label_errors() {
        let out = parse(":ghost a0.8");
        assert!(out.diag.has_errors());
        assert_eq!(out.graph.event_count(), 0);
    }

    #[test]
    fn test_end_marker_stops_parse() {
        let out = parse("'c W f440  Q\n:c a0.8");
        assert_eq!(out.graph.event_count(), 1);
        // Nothing after Q is scanned, so no diagnostics either.
        assert!(!out.diag.has_errors());
    }

    #[test]
    fn test_variables() {
        let out = parse("$base = 110\nW f$base*2");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.freq.v0, 220.0);
    }

    #[test]
    fn test_pitch_name_in_freq() {
        let out = parse("W fA4");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.freq.v0, 440.0);
    }

    #[test]
    fn test_pan_keyword() {
        let out = parse("W cC");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.pan.v0, 0.5);
        assert!(node.pan.flags.state);
    }

    #[test]
    fn test_line_operator() {
        let out = parse("L 1 v0 l=exp t2");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.kind, ObjKind::Line);
        assert_eq!(node.line.vt, 1.0);
        assert_eq!(node.line.v0, 0.0);
        assert_eq!(node.line.shape, LineShape::Exp);
        assert_eq!(node.time.ms, 2000);
    }

    #[test]
    fn test_bind_scope_multiple() {
        let out = parse("@[ W f100 W f200 ]");
        assert_eq!(out.graph.event_count(), 1);
        assert_eq!(out.graph.op_count(), 2);
        let ev = out.graph.first.unwrap();
        let objs = &out.graph.events[ev].objects;
        assert!(!out.graph.ops[objs[0]].flags.multiple);
        assert!(out.graph.ops[objs[1]].flags.multiple);
    }

    #[test]
    fn test_unmatched_closers_diagnosed() {
        let out = parse("W f440 ]");
        assert!(!out.diag.entries().is_empty());
        let out = parse("W f440 >");
        assert!(!out.diag.entries().is_empty());
    }

    #[test]
    fn test_newline_resets_operator_state() {
        let out = parse("W f440\na0.5");
        // 'a' after the newline has no operator context.
        assert!(!out.diag.entries().is_empty());
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert!(!node.amp.flags.state);
    }

    #[test]
    fn test_secondary_values() {
        let out = parse("W f440 f!2 a!0.5");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.freq2.v0, 2.0);
        assert!(node.freq2.flags.state);
        assert_eq!(node.amp2.v0, 0.5);
    }

    #[test]
    fn test_silence_prefix() {
        let out = parse("W t1 s0.25");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.silence_ms, 250);
    }

    #[test]
    fn test_linked_time_request() {
        let out = parse("W f100 p![ W ti ]");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        let m = &out.graph.ops[node.mods[0].ops[0]];
        assert!(m.time.linked);
    }

    #[test]
    fn test_negative_time_rejected() {
        let out = parse("W t0-1");
        assert!(!out.diag.entries().is_empty());
        let ev = out.graph.first.unwrap();
        assert!(!out.graph.ops[out.graph.events[ev].root].time.set);
    }

    #[test]
    fn test_constructor_aliases() {
        // O is the legacy spelling of W, E of L.
        let out = parse("O sqr f100");
        let ev = out.graph.first.unwrap();
        assert_eq!(
            out.graph.ops[out.graph.events[ev].root].kind,
            ObjKind::Wave { wave: 1 }
        );

        let out = parse("E 1 t0.5");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.kind, ObjKind::Line);
        assert_eq!(node.line.vt, 1.0);
    }

    #[test]
    fn test_multiple_lists_different_kinds() {
        let out = parse("W f100 a![ W r1 ] f![ W r2 ] p![ W r3 ]");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        let kinds: Vec<UseKind> = node.mods.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![UseKind::Am, UseKind::Fm, UseKind::Pm]);
        assert_eq!(out.graph.events[ev].objects.len(), 4);
    }

    #[test]
    fn test_nested_sublists_recurse() {
        let out = parse("W f100 f![ W r2 p![ W r0.5 ] ]");
        let ev = out.graph.first.unwrap();
        let root = &out.graph.ops[out.graph.events[ev].root];
        let fm = &out.graph.ops[root.mods[0].ops[0]];
        assert_eq!(fm.mods.len(), 1);
        assert_eq!(fm.mods[0].kind, UseKind::Pm);
        let pm = &out.graph.ops[fm.mods[0].ops[0]];
        assert!(pm.flags.nested);
        assert_eq!(pm.freq.v0, 0.5);
    }

    #[test]
    fn test_label_reference_inside_sublist() {
        let out = parse("'a W f100 p![ 'b W r1 f![ :a ] ]");
        let ev = out.graph.first.unwrap();
        let root_key = out.graph.events[ev].root;
        let root = &out.graph.ops[root_key];
        let b = &out.graph.ops[root.mods[0].ops[0]];
        let back = &out.graph.ops[b.mods[0].ops[0]];
        // The back reference continues the labeled object.
        assert_eq!(back.first, root_key);
        assert!(root.flags.later_used);
    }

    #[test]
    fn test_implicit_composite_on_second_goal() {
        let out = parse("W a0 a{v=1} a{v=0}");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 1);
        // The second goal block opened a composite.
        assert!(out.graph.events[main[0]].composite.is_some());
    }

    #[test]
    fn test_crlf_input() {
        let out = parse("W f440\r\nW f220\r\n");
        assert_eq!(out.graph.event_count(), 2);
        assert!(out.diag.entries().is_empty());
    }

    #[test]
    fn test_comment_inside_event() {
        let out = parse("W f440 # set the carrier\na0.5");
        // The comment runs to end of line, so a0.5 lands on a fresh line
        // with no operator context.
        assert!(!out.diag.entries().is_empty());
    }

    #[test]
    fn test_settings_between_events() {
        let out = parse("W f100 t1\nS t=2\nW f200");
        assert_eq!(out.options.def_time_ms, 2000);
        let main: Vec<_> = out.graph.main_chain().collect();
        assert!(out.graph.ops[out.graph.events[main[1]].root].freq.flags.state);
    }

    #[test]
    fn test_wait_before_group() {
        let out = parse("\\0.5 < W t=0.1 >");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(out.graph.events[main[0]].wait_ms, 500);
    }

    #[test]
    fn test_second_composite_same_statement() {
        let out = parse("W t=0.1 ; t=0.2 ; t=0.3");
        let ev = out.graph.first.unwrap();
        let c1 = out.graph.events[ev].composite.unwrap();
        let c2 = out.graph.events[c1].next.unwrap();
        assert!(out.graph.events[c2].next.is_none());
        // Both links share the object.
        let root = out.graph.events[ev].root;
        assert_eq!(out.graph.ops[out.graph.events[c2].root].first, root);
    }

    #[test]
    fn test_label_rebinds_to_latest_node() {
        let out = parse("'a W f100 ; f200\n:a f300");
        let main: Vec<_> = out.graph.main_chain().collect();
        assert_eq!(main.len(), 2);
        // The reference continues the composite's node, not the original.
        let ref_op = out.graph.events[main[1]].root;
        let prev = out.graph.ops[ref_op].prev.unwrap();
        let ev0 = main[0];
        let c1 = out.graph.events[ev0].composite.unwrap();
        assert_eq!(prev, out.graph.events[c1].root);
    }

    #[test]
    fn test_pan_ramp_block() {
        let out = parse("W cL c{c=lin t=1 v=R}");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.pan.v0, 0.0);
        assert_eq!(node.pan.vt, 1.0);
        assert_eq!(node.pan.time_ms, 1000);
    }

    #[test]
    fn test_unknown_wave_name_rejected() {
        let out = parse("W f100 w=zzz");
        assert!(out
            .diag
            .entries()
            .iter()
            .any(|d| d.message.contains("unknown wave type")));
    }

    #[test]
    fn test_noise_param_on_wave_rejected() {
        let out = parse("W n=pk");
        assert!(out
            .diag
            .entries()
            .iter()
            .any(|d| d.message.contains("non-noise")));
    }

    #[test]
    fn test_line_params_on_wave_rejected() {
        let out = parse("W g1 v0 l=lin");
        assert_eq!(out.diag.entries().len(), 3);
    }

    #[test]
    fn test_variable_reassignment() {
        let out = parse("$x = 2\n$x = 3\nW f100*$x");
        let ev = out.graph.first.unwrap();
        assert_eq!(out.graph.ops[out.graph.events[ev].root].freq.v0, 300.0);
    }

    #[test]
    fn test_empty_script() {
        let out = parse("");
        assert_eq!(out.graph.event_count(), 0);
        assert!(out.diag.entries().is_empty());
    }

    #[test]
    fn test_comment_only_script() {
        let out = parse("# just a note to self\n# nothing else\n");
        assert_eq!(out.graph.event_count(), 0);
        assert!(out.diag.entries().is_empty());
    }

    #[test]
    fn test_empty_group_harmless() {
        let out = parse("< > W t1");
        assert_eq!(out.graph.event_count(), 1);
    }

    #[test]
    fn test_empty_sublist() {
        let out = parse("W f100 a![ ]");
        let ev = out.graph.first.unwrap();
        let node = &out.graph.ops[out.graph.events[ev].root];
        assert_eq!(node.mods.len(), 1);
        assert!(node.mods[0].ops.is_empty());
    }

    #[test]
    fn test_bare_sublist_without_param_rejected() {
        let out = parse("W f100 [ W r1 ]");
        assert!(out
            .diag
            .entries()
            .iter()
            .any(|d| d.message.contains("without a preceding")));
    }

    // ------------------------------------------------------------------
    // One test per parameter form

    fn root_node(out: &ParseOutput) -> &crate::ast::OpNode {
        let ev = out.graph.first.unwrap();
        &out.graph.ops[out.graph.events[ev].root]
    }

    #[test]
    fn test_form_amp_state() {
        let out = parse("W a0.7");
        assert_eq!(root_node(&out).amp.v0, 0.7);
        assert!(root_node(&out).amp.flags.state);
    }

    #[test]
    fn test_form_amp_goal_block() {
        let out = parse("W a{c=log t=0.5 v=0.2}");
        let amp = root_node(&out).amp;
        assert_eq!(amp.shape, LineShape::Log);
        assert_eq!(amp.time_ms, 500);
        assert_eq!(amp.vt, 0.2);
        assert!(amp.flags.goal && amp.flags.time && !amp.flags.state);
    }

    #[test]
    fn test_form_amp_secondary() {
        let out = parse("W a!0.4");
        assert_eq!(root_node(&out).amp2.v0, 0.4);
    }

    #[test]
    fn test_form_amp_secondary_ramp() {
        let out = parse("W a!{t=1 v=0.9}");
        let amp2 = root_node(&out).amp2;
        assert_eq!(amp2.vt, 0.9);
        assert!(amp2.flags.goal);
    }

    #[test]
    fn test_form_freq_state_and_secondary() {
        let out = parse("W f100 f!3");
        let node = root_node(&out);
        assert_eq!(node.freq.v0, 100.0);
        assert_eq!(node.freq2.v0, 3.0);
    }

    #[test]
    fn test_form_freq_goal_with_pitch() {
        let out = parse("W f{t=1 v=A5}");
        assert_eq!(root_node(&out).freq.vt, 880.0);
    }

    #[test]
    fn test_form_relfreq_state_and_ramp() {
        let out = parse("W p![ W r2 r{t=0.5 v=4} ]");
        let ev = out.graph.first.unwrap();
        let root = &out.graph.ops[out.graph.events[ev].root];
        let m = &out.graph.ops[root.mods[0].ops[0]];
        assert!(m.freq.flags.state_ratio);
        assert_eq!(m.freq.v0, 2.0);
        assert!(m.freq.flags.goal_ratio);
        assert_eq!(m.freq.vt, 4.0);
    }

    #[test]
    fn test_form_phase_state() {
        let out = parse("W p0.25");
        assert_eq!(root_node(&out).phase.v0, 0.25);
    }

    #[test]
    fn test_form_phase_secondary_value_rejected() {
        let out = parse("W p!0.5");
        assert!(out
            .diag
            .entries()
            .iter()
            .any(|d| d.message.contains("no secondary")));
    }

    #[test]
    fn test_form_pan_state_number() {
        let out = parse("W c0.25");
        assert_eq!(root_node(&out).pan.v0, 0.25);
    }

    #[test]
    fn test_form_pan_compound_list() {
        let out = parse("W c![ L 1 t0.5 ]");
        let node = root_node(&out);
        assert_eq!(node.mods[0].kind, UseKind::CAm);
    }

    #[test]
    fn test_form_time_and_linked() {
        let out = parse("W t1.25");
        assert_eq!(root_node(&out).time.ms, 1250);
        let out = parse("W p![ W ti ]");
        let ev = out.graph.first.unwrap();
        let root = &out.graph.ops[out.graph.events[ev].root];
        assert!(out.graph.ops[root.mods[0].ops[0]].time.linked);
    }

    #[test]
    fn test_form_silence() {
        let out = parse("W s0.1 t1");
        assert_eq!(root_node(&out).silence_ms, 100);
    }

    #[test]
    fn test_form_wave_param() {
        let out = parse("W w=tri");
        assert_eq!(root_node(&out).kind, ObjKind::Wave { wave: 2 });
    }

    #[test]
    fn test_form_noise_param() {
        let out = parse("N n=gs");
        assert_eq!(root_node(&out).kind, ObjKind::Noise { noise: 3 });
    }

    #[test]
    fn test_form_line_value_goal_shape() {
        let out = parse("L v0.2 g0.8 l=hold");
        let node = root_node(&out);
        assert_eq!(node.line.v0, 0.2);
        assert_eq!(node.line.vt, 0.8);
        assert_eq!(node.line.shape, LineShape::Hold);
    }

    #[test]
    fn test_form_equals_is_optional_everywhere() {
        let a = parse("W f440 a0.5 t1 s0.1");
        let b = parse("W f=440 a=0.5 t=1 s=0.1");
        let na = root_node(&a);
        let nb = root_node(&b);
        assert_eq!(na.freq.v0, nb.freq.v0);
        assert_eq!(na.amp.v0, nb.amp.v0);
        assert_eq!(na.time.ms, nb.time.ms);
        assert_eq!(na.silence_ms, nb.silence_ms);
    }

    #[test]
    fn test_form_expression_values() {
        let out = parse("W f110*2^2 a1/4 t6/4");
        let node = root_node(&out);
        assert_eq!(node.freq.v0, 440.0);
        assert_eq!(node.amp.v0, 0.25);
        assert_eq!(node.time.ms, 1500);
    }
}
