//! Value Ramps
//!
//! A ramp carries a scalar from a state value `v0` toward a goal `vt` over
//! a duration, using one of four shapes: `hold`, `lin`, and the ear-tuned
//! `exp`/`log` pair. The latter two are polynomials symmetrical around the
//! diagonal, not the mathematical exp/log; they approximate how level and
//! pitch glides are heard without the cost or the zero-crossing trouble of
//! true exponentials.
//!
//! Filling is stateless and cursor-based: writing N samples and then M
//! samples from the advanced position equals writing N+M samples in one
//! call. Positions at or past the duration yield the goal. When the ramp's
//! ratio flags are set, each output is multiplied by a parallel buffer
//! (the parent parameter the values are relative to).

use crate::symtab::NameId;
use serde::{Deserialize, Serialize};

/// Documented default ramp and operator duration in milliseconds
pub const DEFAULT_TIME_MS: u32 = 1000;

/// Ramp shape selector; indices match [`crate::names::LINE_NAMES`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineShape {
    /// Keep `v0` for the whole duration, `vt` after
    Hold,
    /// Straight interpolation
    #[default]
    Lin,
    /// Ear-tuned exponential rise: slow start, fast finish
    Exp,
    /// Ear-tuned logarithmic rise: fast start, slow finish
    Log,
}

impl LineShape {
    /// Shape from a registered line-shape table id.
    pub fn from_name_id(id: NameId) -> Option<Self> {
        match id {
            0 => Some(LineShape::Hold),
            1 => Some(LineShape::Lin),
            2 => Some(LineShape::Exp),
            3 => Some(LineShape::Log),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LineShape::Hold => "hold",
            LineShape::Lin => "lin",
            LineShape::Exp => "exp",
            LineShape::Log => "log",
        }
    }

    /// Normalized curve value at `t` in [0, 1].
    #[inline]
    pub fn value(self, t: f64) -> f64 {
        match self {
            LineShape::Hold => 0.0,
            LineShape::Lin => t,
            LineShape::Exp => exp_poly(t),
            LineShape::Log => 1.0 - exp_poly(1.0 - t),
        }
    }
}

/// The rising polynomial behind both ear-tuned shapes:
/// `2t^5 - 5t^4 + 4t^3`, monotone on [0, 1] with zero slope at 0.
#[inline]
fn exp_poly(t: f64) -> f64 {
    t * t * t * (t * (t * 2.0 - 5.0) + 4.0)
}

/// Validity and interpretation flags of a [`Ramp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RampFlags {
    /// `v0` is valid
    pub state: bool,
    /// `vt` and the shape are valid
    pub goal: bool,
    /// The duration was set explicitly
    pub time: bool,
    /// `v0` is a multiplier of a parent value, resolved at render time
    pub state_ratio: bool,
    /// `vt` is a multiplier of a parent value
    pub goal_ratio: bool,
}

/// A value ramp on one operator parameter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ramp {
    pub v0: f32,
    pub vt: f32,
    pub time_ms: u32,
    pub shape: LineShape,
    pub flags: RampFlags,
}

impl Ramp {
    /// Whether anything on this ramp was set.
    pub fn is_set(&self) -> bool {
        self.flags.state || self.flags.goal || self.flags.time
    }

    /// Set the initial value.
    pub fn set_state(&mut self, v: f32, ratio: bool) {
        self.v0 = v;
        self.flags.state = true;
        self.flags.state_ratio = ratio;
    }

    /// Set the goal value.
    pub fn set_goal(&mut self, v: f32, ratio: bool) {
        self.vt = v;
        self.flags.goal = true;
        self.flags.goal_ratio = ratio;
    }

    /// Set the shape (implies a goal is on the way).
    pub fn set_shape(&mut self, shape: LineShape) {
        self.shape = shape;
        self.flags.goal = true;
    }

    /// Set the duration explicitly.
    pub fn set_time(&mut self, ms: u32) {
        self.time_ms = ms;
        self.flags.time = true;
    }

    /// Default the duration when unset (the timing pass supplies the
    /// owning operator's time).
    pub fn default_time(&mut self, ms: u32) {
        if !self.flags.time {
            self.time_ms = ms;
        }
    }

    /// Fill `dst` with samples `pos .. pos + dst.len()` of a ramp lasting
    /// `time` samples. Sampling happens at interval midpoints, which makes
    /// the exp/log reversal law exact. With a `mult` buffer present and a
    /// ratio flag set, each sample is multiplied by its parallel entry.
    pub fn fill(&self, dst: &mut [f32], pos: u32, time: u32, mult: Option<&[f32]>) {
        let v0 = f64::from(self.v0);
        let vt = f64::from(self.vt);
        let span = vt - v0;
        for (i, out) in dst.iter_mut().enumerate() {
            let p = pos.saturating_add(i as u32);
            let v = if time == 0 || p >= time {
                vt
            } else {
                let t = (f64::from(p) + 0.5) / f64::from(time);
                v0 + span * self.shape.value(t)
            };
            *out = v as f32;
        }
        if self.flags.state_ratio || self.flags.goal_ratio {
            if let Some(mult) = mult {
                for (out, m) in dst.iter_mut().zip(mult) {
                    *out *= m;
                }
            }
        }
    }
}

/// A `(pos, time)` cursor over one ramp, for renderers that pull samples
/// in blocks.
///
/// The cursor owns the position bookkeeping; the fills stay stateless, so
/// pulling N then M samples lands exactly where one N+M pull would.
#[derive(Debug, Clone, Copy, Default)]
pub struct RampCursor {
    pos: u32,
    /// Total duration in samples
    time: u32,
}

impl RampCursor {
    pub fn new(time: u32) -> Self {
        Self { pos: 0, time }
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    /// Whether the ramp has played out.
    pub fn done(&self) -> bool {
        self.pos >= self.time
    }

    /// Samples left until the goal holds.
    pub fn remaining(&self) -> u32 {
        self.time.saturating_sub(self.pos)
    }

    /// Fill `dst` from the current position and advance past it.
    pub fn fill(&mut self, ramp: &Ramp, dst: &mut [f32], mult: Option<&[f32]>) {
        ramp.fill(dst, self.pos, self.time, mult);
        self.pos = self.pos.saturating_add(dst.len() as u32);
    }

    /// Restart at a new duration (a re-triggered ramp).
    pub fn reset(&mut self, time: u32) {
        self.pos = 0;
        self.time = time;
    }
}
