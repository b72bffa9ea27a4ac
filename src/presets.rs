//! Score Preset Library
//!
//! A collection of ready-to-compile example scores:
//! - Classic synthesis idioms (FM bells, drones, chords)
//! - Sound design textures built on noise and ring modulation
//! - Tutorial scores that introduce the language one token at a time
//!
//! Every preset here compiles cleanly with the default name tables; the
//! test suite holds that invariant.

/// Preset category for organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetCategory {
    /// Classic synthesis idioms
    Classic,
    /// Sound design and experimental textures
    SoundDesign,
    /// Educational scores for learning the language
    Tutorial,
    /// Percussive and rhythmic material
    Percussion,
}

/// A named score with its source text
#[derive(Debug, Clone)]
pub struct ScorePreset {
    /// Preset name
    pub name: String,
    /// Category
    pub category: PresetCategory,
    /// Description
    pub description: String,
    /// Tags for searching
    pub tags: Vec<String>,
    /// Difficulty level (1-5, for tutorials)
    pub difficulty: Option<u8>,
    /// The score source
    pub script: String,
}

impl ScorePreset {
    pub fn new(
        name: impl Into<String>,
        category: PresetCategory,
        script: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: String::new(),
            tags: Vec::new(),
            difficulty: None,
            script: script.into(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_difficulty(mut self, level: u8) -> Self {
        self.difficulty = Some(level.min(5));
        self
    }
}

/// Preset library containing all built-in scores
pub struct PresetLibrary;

impl PresetLibrary {
    /// All available presets.
    pub fn list() -> Vec<ScorePreset> {
        vec![
            // Classic synthesis
            ScorePreset::new(
                "FM Bell",
                PresetCategory::Classic,
                "W fA4 a0.6 t3 a{c=exp t=3 v=0} f![ W r3.5 a2 a{c=exp t=2 v=0} ]",
            )
            .with_description("A 3.5:1 FM bell with decaying modulation index")
            .with_tag("fm")
            .with_tag("bell"),
            ScorePreset::new(
                "Fifth Drone",
                PresetCategory::Classic,
                "W fC3 a0.3 t6\nW fG3 a0.25 t6\nW fC4 a0.15 t6",
            )
            .with_description("Three sustained voices on a root and fifth")
            .with_tag("drone")
            .with_tag("chord"),
            ScorePreset::new(
                "Chord Swell",
                PresetCategory::Classic,
                "< W fC4 a0 a{t=2 v=0.3} t=4 W fE4 a0 a{t=2 v=0.25} t=4 W fG4 a0 a{t=2 v=0.25} t=4 >",
            )
            .with_description("A grouped major triad fading in together")
            .with_tag("chord")
            .with_tag("group"),
            ScorePreset::new(
                "Vibrato Lead",
                PresetCategory::Classic,
                "W fA4 a0.5 t2 f!{c=lin t=2 v=8}~[ W sqr r6 a1 ]",
            )
            .with_description("Square-wave ring FM widening over two seconds")
            .with_tag("lead")
            .with_tag("vibrato"),
            // Sound design
            ScorePreset::new(
                "Metallic Ring",
                PresetCategory::SoundDesign,
                "W f200 a0.4 t2 a!~[ W r2.76 a1 ]",
            )
            .with_description("Inharmonic ring amplitude modulation")
            .with_tag("ring-mod")
            .with_tag("metallic"),
            ScorePreset::new(
                "Noise Swell",
                PresetCategory::SoundDesign,
                "N pk a0 t3 a{c=log t=2 v=0.5}",
            )
            .with_description("Pink noise rising on the ear-tuned log curve")
            .with_tag("noise")
            .with_tag("swell"),
            ScorePreset::new(
                "Evolving Stack",
                PresetCategory::SoundDesign,
                "W f110 a0.5 t4 f![ W r2 a1 p![ W r0.5 a0.8 ] ] ; t2 w=tri",
            )
            .with_description("Two-level FM/PM stack whose carrier morphs in place")
            .with_tag("fm")
            .with_tag("composite"),
            // Percussion
            ScorePreset::new(
                "Kick Line",
                PresetCategory::Percussion,
                "W f80 a0.9 t0.15 f{c=exp t=0.12 v=40} \\0.5 W f80 a0.9 t0.15 f{c=exp t=0.12 v=40} \\0.5 W f80 a0.9 t0.15 f{c=exp t=0.12 v=40}",
            )
            .with_description("Three pitch-dropping kicks half a second apart")
            .with_tag("kick")
            .with_tag("rhythm"),
            ScorePreset::new(
                "Noise Hat",
                PresetCategory::Percussion,
                "N wh a0.3 t0.05 \\0.25 N wh a0.2 t0.05 \\0.25 N wh a0.3 t0.05",
            )
            .with_description("A short white-noise hat pattern")
            .with_tag("hat")
            .with_tag("noise"),
            // Tutorials
            ScorePreset::new("First Tone", PresetCategory::Tutorial, "W f440 a0.5 t1")
                .with_description("One operator: frequency, amplitude, time")
                .with_tag("beginner")
                .with_difficulty(1),
            ScorePreset::new(
                "Two In A Row",
                PresetCategory::Tutorial,
                "W fC4 t0.5 \\0.5 W fE4 t0.5",
            )
            .with_description("Waits move time forward between events")
            .with_tag("beginner")
            .with_tag("timing")
            .with_difficulty(1),
            ScorePreset::new(
                "First Modulator",
                PresetCategory::Tutorial,
                "W f220 a0.5 t2 f![ W r1 a1 ]",
            )
            .with_description("A 1:1 frequency modulator in a sublist")
            .with_tag("fm")
            .with_difficulty(2),
            ScorePreset::new(
                "Label And Return",
                PresetCategory::Tutorial,
                "'voice W f330 a0.4 t2\n\\1 :voice a0.1",
            )
            .with_description("Labels let a later event update an operator")
            .with_tag("labels")
            .with_difficulty(3),
            ScorePreset::new(
                "Settings And Variables",
                PresetCategory::Tutorial,
                "S a=0.5 t=2\n$fifth = 1.5\nW f200 \\t W f200*$fifth",
            )
            .with_description("Script defaults and numeric variables")
            .with_tag("settings")
            .with_difficulty(3),
        ]
    }

    /// Presets in one category.
    pub fn by_category(category: PresetCategory) -> Vec<ScorePreset> {
        Self::list()
            .into_iter()
            .filter(|p| p.category == category)
            .collect()
    }

    /// Presets matching a tag.
    pub fn by_tag(tag: &str) -> Vec<ScorePreset> {
        Self::list()
            .into_iter()
            .filter(|p| p.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Look a preset up by name.
    pub fn get(name: &str) -> Option<ScorePreset> {
        Self::list().into_iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Compiler, CompilerOptions};
    use crate::validate::validate;

    fn compiler() -> Compiler {
        Compiler::new().with_options(CompilerOptions::default().silent().with_seed(11))
    }

    #[test]
    fn test_all_presets_compile_clean() {
        let compiler = compiler();
        for preset in PresetLibrary::list() {
            let compiled = compiler
                .compile_str(&preset.name, &preset.script)
                .unwrap_or_else(|e| panic!("{}: {}", preset.name, e));
            assert!(
                !compiled.failed && compiled.diagnostics.is_empty(),
                "{}: {:?}",
                preset.name,
                compiled.diagnostics
            );
            assert!(!compiled.program.events.is_empty(), "{}", preset.name);
        }
    }

    #[test]
    fn test_all_presets_validate() {
        let compiler = compiler();
        for preset in PresetLibrary::list() {
            let program = compiler
                .compile_str(&preset.name, &preset.script)
                .unwrap()
                .program;
            let violations = validate(&program);
            assert!(violations.is_empty(), "{}: {:?}", preset.name, violations);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let preset = PresetLibrary::get("FM Bell").unwrap();
        assert_eq!(preset.category, PresetCategory::Classic);
        assert!(PresetLibrary::get("Nonexistent").is_none());
    }

    #[test]
    fn test_by_category_and_tag() {
        assert!(!PresetLibrary::by_category(PresetCategory::Tutorial).is_empty());
        let fm = PresetLibrary::by_tag("fm");
        assert!(fm.iter().all(|p| p.tags.iter().any(|t| t == "fm")));
        assert!(!fm.is_empty());
    }

    #[test]
    fn test_tutorials_have_difficulty() {
        for p in PresetLibrary::by_category(PresetCategory::Tutorial) {
            assert!(p.difficulty.is_some(), "{}", p.name);
        }
    }
}
