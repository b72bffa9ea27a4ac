//! Timing and Flattening Passes
//!
//! Two passes run between parsing and lowering.
//!
//! The timing pass walks the main event chain top-down and, per event:
//! defaults operator times and ramp durations, resolves linked time for
//! nested operators, folds silence prefixes into durations, applies
//! `\t`-style wait propagation, times composite chains (each link waits
//! out the previous one and extends its object's total time), and fills
//! duration groups so every member without an explicit time ends together
//! with the longest.
//!
//! The flattener then splices every composite chain into the main event
//! list, preserving relative waits on both sides. It runs after timing on
//! purpose: link durations must already be resolved to know where each
//! sub-event lands.

use crate::ast::{EvKey, OpKey, ParseGraph, ScriptOptions};

/// Run the timing pass over the whole graph (C6).
pub fn time_graph(g: &mut ParseGraph, opt: &ScriptOptions) {
    let mains: Vec<EvKey> = g.main_chain().collect();
    for ev in mains {
        time_event(g, opt, ev);
    }
}

fn time_event(g: &mut ParseGraph, opt: &ScriptOptions, ev: EvKey) {
    // Operators of the event itself. Nested operators are reached through
    // their parent's modulator lists; the root is timed first in case it
    // is itself a nested object's continuation.
    let root = g.events[ev].root;
    time_operator(g, opt, root);
    let objects = g.events[ev].objects.clone();
    for op in objects {
        if op != root && !g.ops[op].flags.nested {
            time_operator(g, opt, op);
        }
    }

    time_composites(g, opt, ev);

    if g.events[ev].dur_group_first.is_some() {
        time_dur_group(g, ev);
    }
}

/// Default one operator's time and ramp durations; recurse into its
/// modulator sublists.
fn time_operator(g: &mut ParseGraph, opt: &ScriptOptions, op: OpKey) {
    {
        let node = &mut g.ops[op];
        if node.flags.nested && !node.time.set {
            if node.flags.has_composite {
                // A nested operator with its own chain runs on its own
                // clock rather than the carrier's.
                node.time.set_default(opt.def_time_ms);
            } else {
                node.time.set_linked();
            }
        }
        if !node.time.linked {
            node.time.set_default(opt.def_time_ms);
            let t = node.time.ms;
            node.freq.default_time(t);
            node.freq2.default_time(t);
            node.amp.default_time(t);
            node.amp2.default_time(t);
            // pan's duration is deliberately left alone.
            if node.silence_ms > 0 && !node.flags.silence_added {
                node.time.ms = node.time.ms.saturating_add(node.silence_ms);
                node.flags.silence_added = true;
            }
        }
    }

    let ev = g.ops[op].event;
    if g.events[ev].flags.add_wait_duration {
        g.events[ev].flags.add_wait_duration = false;
        let t = g.ops[op].time.ms;
        if let Some(next) = g.events[ev].next {
            g.events[next].wait_ms = g.events[next].wait_ms.saturating_add(t);
        }
    }

    let sublist_ops: Vec<OpKey> = g.ops[op]
        .mods
        .iter()
        .flat_map(|m| m.ops.iter().copied())
        .collect();
    for m in sublist_ops {
        time_operator(g, opt, m);
    }
}

/// Time an event's composite chain and extend the continued object.
fn time_composites(g: &mut ParseGraph, opt: &ScriptOptions, ev: EvKey) {
    let Some(head) = g.events[ev].composite else {
        return;
    };

    let base = g.ops[g.events[head].root]
        .prev
        .expect("a composite link always continues an object");

    let mut se = head;
    let mut chain_linked = false;
    loop {
        let se_root = g.events[se].root;
        let prev = g.ops[se_root]
            .prev
            .expect("a composite link always continues an object");
        let prev_time = g.ops[prev].time;
        let prev_silence = g.ops[prev].silence_ms;

        g.events[se].wait_ms = g.events[se].wait_ms.saturating_add(prev_time.ms);

        let is_tail = g.events[se].next.is_none();
        if !g.ops[se_root].time.set {
            if g.ops[se_root].flags.nested && is_tail {
                g.ops[se_root].time.set_linked();
            } else {
                // Inherit the previous link's playing time.
                let node = &mut g.ops[se_root];
                node.time.ms = prev_time.ms.saturating_sub(prev_silence);
                node.time.implicit = true;
            }
        }
        time_operator(g, opt, se_root);
        chain_linked |= g.ops[se_root].time.linked;

        match g.events[se].next {
            Some(next) => se = next,
            None => break,
        }
    }

    // The chain extends its object's total time, now known exactly.
    let mut total = g.ops[base].time.ms;
    let mut cursor = Some(head);
    while let Some(k) = cursor {
        let r = g.events[k].root;
        if !g.ops[r].time.linked {
            total = total.saturating_add(g.ops[r].time.ms);
        }
        cursor = g.events[k].next;
    }
    let node = &mut g.ops[base];
    node.time.ms = total;
    node.time.set = true;
    node.time.linked = chain_linked && node.time.linked;
    node.time.implicit = false;
}

/// Fill a closed duration group: unset times stretch to the group's end,
/// and the event after the group waits the group's length out.
fn time_dur_group(g: &mut ParseGraph, closing: EvKey) {
    let first = g.events[closing]
        .dur_group_first
        .expect("called on the closing event of a group");

    let mut group = Vec::new();
    let mut k = first;
    loop {
        group.push(k);
        if k == closing {
            break;
        }
        k = g.events[k]
            .next
            .expect("a duration group lies on the main chain");
    }

    // Explicit times set the group's length; defaulted ones only count
    // when nothing in the group was set explicitly.
    let mut max_ms: u32 = 0;
    let mut max_any: u32 = 0;
    for &e in &group {
        for &op in &g.events[e].objects {
            let node = &g.ops[op];
            if node.time.linked {
                continue;
            }
            max_any = max_any.max(node.time.ms);
            if node.time.set {
                max_ms = max_ms.max(node.time.ms);
            }
        }
    }
    if max_ms == 0 {
        max_ms = max_any;
    }

    // Waits from each event to the group's last event.
    let mut remaining: u32 = group.iter().skip(1).map(|&e| g.events[e].wait_ms).sum();
    for (i, &e) in group.iter().enumerate() {
        let objects = g.events[e].objects.clone();
        for op in objects {
            let node = &mut g.ops[op];
            if !node.time.set && !node.time.linked {
                node.time.ms = max_ms.saturating_add(remaining);
                node.time.implicit = true;
            }
        }
        if i + 1 < group.len() {
            remaining -= g.events[group[i + 1]].wait_ms;
        }
    }

    if let Some(next) = g.events[closing].next {
        g.events[next].wait_ms = g.events[next].wait_ms.saturating_add(max_ms);
    }
}

/// Splice every composite chain into the main event list (C7).
pub fn flatten_graph(g: &mut ParseGraph) {
    let mains: Vec<EvKey> = g.main_chain().collect();
    for ev in mains {
        flatten_event(g, ev);
    }
    // The tail may have moved.
    let mut last = g.first;
    while let Some(k) = last {
        match g.events[k].next {
            Some(n) => last = Some(n),
            None => break,
        }
    }
    g.last = last;
}

/// Merge one event's composite chain into the main list, keeping both
/// sides' relative waits intact.
fn flatten_event(g: &mut ParseGraph, ev: EvKey) {
    let Some(head) = g.events[ev].composite.take() else {
        return;
    };

    // Absolute offsets from `ev`.
    let mut prev = ev;
    let mut prev_abs: u64 = 0;
    let mut se = g.events[ev].next;
    let mut se_abs: u64 = se.map(|k| u64::from(g.events[k].wait_ms)).unwrap_or(0);

    let mut ce = Some(head);
    let mut ce_abs: u64 = 0;
    while let Some(c) = ce {
        let next_ce = g.events[c].next;
        ce_abs += u64::from(g.events[c].wait_ms);

        // Walk past main events due strictly before this sub-event.
        while let Some(s) = se {
            if se_abs >= ce_abs {
                break;
            }
            prev = s;
            prev_abs = se_abs;
            se = g.events[s].next;
            if let Some(n) = se {
                se_abs += u64::from(g.events[n].wait_ms);
            }
        }

        g.events[c].wait_ms = (ce_abs - prev_abs) as u32;
        g.events[c].next = se;
        g.events[c].parent_main = None;
        g.events[prev].next = Some(c);
        if let Some(s) = se {
            g.events[s].wait_ms = (se_abs - ce_abs) as u32;
        }

        prev = c;
        prev_abs = ce_abs;
        ce = next_ce;
    }
}
