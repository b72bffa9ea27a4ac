//! Runtime Name Tables
//!
//! The runtime publishes the identifiers a script may use for wave types,
//! noise types, ramp shapes and math functions. This module carries the
//! default tables, registers them into a compile's symbol table, and
//! resolves the context-dependent named constants: pitch names such as
//! `C4` or `Df5` in frequency context and the `L`/`C`/`R` keywords in
//! channel context.
//!
//! The tables are read-only once a compile starts.

use crate::symtab::{NameId, SymKind, SymTab};
use serde::{Deserialize, Serialize};

/// Default wave type names, in table order
pub const WAVE_NAMES: &[&str] = &["sin", "sqr", "tri", "saw", "par", "hsin"];

/// Default noise type names, in table order
pub const NOISE_NAMES: &[&str] = &["wh", "pk", "br", "gs"];

/// Ramp shape names; indices match [`crate::ramp::LineShape`]
pub const LINE_NAMES: &[&str] = &["hold", "lin", "exp", "log"];

/// Math functions usable in expressions, in table order
pub const MATH_FUNC_NAMES: &[&str] = &[
    "abs", "sqrt", "exp", "log", "sin", "cos", "tan", "floor", "ceil", "round",
];

/// Kind selector for [`NameRegistry::names_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameKind {
    Wave,
    Noise,
    LineShape,
    MathFunc,
}

/// The name tables one compile resolves identifiers against
#[derive(Debug, Clone)]
pub struct NameRegistry {
    waves: Vec<String>,
    noises: Vec<String>,
    line_shapes: Vec<String>,
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self {
            waves: WAVE_NAMES.iter().map(|s| s.to_string()).collect(),
            noises: NOISE_NAMES.iter().map(|s| s.to_string()).collect(),
            line_shapes: LINE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NameRegistry {
    /// Replace the wave table (the runtime may publish its own).
    pub fn with_waves(mut self, names: &[&str]) -> Self {
        self.waves = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace the noise table.
    pub fn with_noises(mut self, names: &[&str]) -> Self {
        self.noises = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// The published names for a kind. Math functions are fixed; their ids
    /// feed [`apply_math_func`].
    pub fn names_for(&self, kind: NameKind) -> Vec<&str> {
        match kind {
            NameKind::Wave => self.waves.iter().map(|s| s.as_str()).collect(),
            NameKind::Noise => self.noises.iter().map(|s| s.as_str()).collect(),
            NameKind::LineShape => self.line_shapes.iter().map(|s| s.as_str()).collect(),
            NameKind::MathFunc => MATH_FUNC_NAMES.to_vec(),
        }
    }

    /// Bulk-register every table into the symbol table, once per compile.
    pub fn register(&self, symtab: &mut SymTab) {
        let waves: Vec<&str> = self.waves.iter().map(|s| s.as_str()).collect();
        symtab.register_names(SymKind::Wave, &waves);
        let noises: Vec<&str> = self.noises.iter().map(|s| s.as_str()).collect();
        symtab.register_names(SymKind::Noise, &noises);
        let shapes: Vec<&str> = self.line_shapes.iter().map(|s| s.as_str()).collect();
        symtab.register_names(SymKind::LineShape, &shapes);
        symtab.register_names(SymKind::MathFunc, MATH_FUNC_NAMES);
    }
}

/// Evaluate a registered math function by table id.
pub fn apply_math_func(id: NameId, x: f64) -> f64 {
    match id {
        0 => x.abs(),
        1 => x.sqrt(),
        2 => x.exp(),
        3 => x.ln(),
        4 => x.sin(),
        5 => x.cos(),
        6 => x.tan(),
        7 => x.floor(),
        8 => x.ceil(),
        9 => x.round(),
        _ => f64::NAN,
    }
}

/// Octave used when a pitch name leaves it out (`C` means `C4`)
pub const DEFAULT_OCTAVE: i32 = 4;

/// Resolve a pitch name (`C4`, `Df5`, `As3`, `Gss2`, `B`, ...) to a
/// frequency in Hz.
///
/// Letter `C`..`B`, up to two `s` (sharp) or `f` (flat) accidentals, then
/// an optional octave number ([`DEFAULT_OCTAVE`] when omitted). Equal
/// temperament around the given A4 frequency.
pub fn pitch_freq(name: &str, a4: f64) -> Option<f64> {
    let letter = name.bytes().next()?;
    let step: i32 = match letter {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return None,
    };
    let mut rest: &str = &name[1..];
    let mut accidental = 0i32;
    for _ in 0..2 {
        match rest.bytes().next() {
            Some(b's') if accidental >= 0 => {
                accidental += 1;
                rest = &rest[1..];
            }
            Some(b'f') if accidental <= 0 => {
                accidental -= 1;
                rest = &rest[1..];
            }
            _ => break,
        }
    }
    let octave: i32 = if rest.is_empty() {
        DEFAULT_OCTAVE
    } else {
        if !rest.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()?
    };
    // A4 sits at semitone index 57 counting from C0.
    let index = octave * 12 + step + accidental;
    Some(a4 * f64::powf(2.0, f64::from(index - 57) / 12.0))
}

/// Resolve a channel-mix keyword: left, center, right.
pub fn pan_value(name: &str) -> Option<f64> {
    match name {
        "L" => Some(0.0),
        "C" => Some(0.5),
        "R" => Some(1.0),
        _ => None,
    }
}

/// The nearest pitch name to a frequency, with the deviation in cents.
///
/// The inverse of [`pitch_freq`] up to rounding; used for labelling
/// frequencies in summaries and graph exports.
pub fn nearest_pitch(freq: f64, a4: f64) -> Option<(String, f64)> {
    if freq <= 0.0 || a4 <= 0.0 {
        return None;
    }
    let semis = 57.0 + 12.0 * (freq / a4).log2();
    let index = semis.round();
    let cents = (semis - index) * 100.0;
    let index = index as i64;
    if index < 0 {
        return None;
    }
    let octave = index / 12;
    let step = (index % 12) as usize;
    const NAMES: [&str; 12] = [
        "C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B",
    ];
    Some((format!("{}{}", NAMES[step], octave), cents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_register_all_kinds() {
        let mut st = SymTab::new();
        NameRegistry::default().register(&mut st);
        let sqr = st.intern("sqr");
        assert_eq!(st.name_id(sqr, SymKind::Wave), Some(1));
        let wh = st.intern("wh");
        assert_eq!(st.name_id(wh, SymKind::Noise), Some(0));
        let lin = st.intern("lin");
        assert_eq!(st.name_id(lin, SymKind::LineShape), Some(1));
        let sqrt = st.intern("sqrt");
        assert_eq!(st.name_id(sqrt, SymKind::MathFunc), Some(1));
    }

    #[test]
    fn test_custom_waves() {
        let reg = NameRegistry::default().with_waves(&["one", "two"]);
        assert_eq!(reg.names_for(NameKind::Wave), vec!["one", "two"]);
    }

    #[test]
    fn test_math_funcs() {
        assert_eq!(apply_math_func(0, -2.5), 2.5);
        assert_eq!(apply_math_func(1, 9.0), 3.0);
        assert_relative_eq!(apply_math_func(3, std::f64::consts::E), 1.0);
        assert_eq!(apply_math_func(9, 2.5), 3.0);
        assert!(apply_math_func(99, 1.0).is_nan());
    }

    #[test]
    fn test_pitch_a4_reference() {
        assert_relative_eq!(pitch_freq("A4", 440.0).unwrap(), 440.0);
    }

    #[test]
    fn test_pitch_octaves_and_accidentals() {
        assert_relative_eq!(pitch_freq("A5", 440.0).unwrap(), 880.0);
        assert_relative_eq!(pitch_freq("A3", 440.0).unwrap(), 220.0);
        assert_relative_eq!(pitch_freq("C4", 440.0).unwrap(), 261.625565, epsilon = 1e-5);
        // D flat and C sharp name the same key.
        assert_relative_eq!(
            pitch_freq("Df5", 440.0).unwrap(),
            pitch_freq("Cs5", 440.0).unwrap()
        );
    }

    #[test]
    fn test_pitch_respects_tuning() {
        assert_relative_eq!(pitch_freq("A4", 432.0).unwrap(), 432.0);
    }

    #[test]
    fn test_pitch_default_octave() {
        assert_relative_eq!(
            pitch_freq("A", 440.0).unwrap(),
            pitch_freq("A4", 440.0).unwrap()
        );
        assert_relative_eq!(
            pitch_freq("Cs", 440.0).unwrap(),
            pitch_freq("Cs4", 440.0).unwrap()
        );
    }

    #[test]
    fn test_pitch_double_accidentals() {
        // A double sharp lands a whole tone up.
        assert_relative_eq!(
            pitch_freq("Css4", 440.0).unwrap(),
            pitch_freq("D4", 440.0).unwrap()
        );
        assert_relative_eq!(
            pitch_freq("Eff4", 440.0).unwrap(),
            pitch_freq("D4", 440.0).unwrap()
        );
    }

    #[test]
    fn test_pitch_rejects_malformed() {
        assert_eq!(pitch_freq("H4", 440.0), None);
        assert_eq!(pitch_freq("Cx4", 440.0), None);
        assert_eq!(pitch_freq("Csf4", 440.0), None);
        assert_eq!(pitch_freq("C4x", 440.0), None);
        assert_eq!(pitch_freq("", 440.0), None);
    }

    #[test]
    fn test_pan_keywords() {
        assert_eq!(pan_value("L"), Some(0.0));
        assert_eq!(pan_value("C"), Some(0.5));
        assert_eq!(pan_value("R"), Some(1.0));
        assert_eq!(pan_value("X"), None);
    }

    #[test]
    fn test_nearest_pitch_roundtrip() {
        for name in ["A4", "C4", "Fs2", "B7", "Ds5"] {
            let freq = pitch_freq(name, 440.0).unwrap();
            let (back, cents) = nearest_pitch(freq, 440.0).unwrap();
            assert_eq!(back, name);
            assert!(cents.abs() < 0.01, "{}: {} cents", name, cents);
        }
    }

    #[test]
    fn test_nearest_pitch_deviation() {
        let (name, cents) = nearest_pitch(445.0, 440.0).unwrap();
        assert_eq!(name, "A4");
        assert!(cents > 0.0 && cents < 50.0);
    }

    #[test]
    fn test_nearest_pitch_rejects_nonpositive() {
        assert_eq!(nearest_pitch(0.0, 440.0), None);
        assert_eq!(nearest_pitch(-5.0, 440.0), None);
    }
}
