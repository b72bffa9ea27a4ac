//! Score Development Kit
//!
//! Tooling for working with scores programmatically:
//! - [`ScoreBuilder`] assembles script text from typed calls, for tests,
//!   benches and generators that would otherwise concatenate strings
//! - [`TestHarness`] compiles a score and checks the results against
//!   declared expectations, collecting every failure
//! - [`DocGenerator`] renders the registered name tables and the token
//!   cheat sheet as Markdown or plain text

use crate::compile::{Compiler, CompilerOptions};
use crate::names::{NameKind, NameRegistry};
use crate::rng::SeedStream;
use crate::validate::validate;

/// Builds score text from typed calls.
///
/// The builder writes one statement per call; the result is ordinary
/// script text, so anything the builder cannot express can be appended
/// raw.
#[derive(Debug, Clone, Default)]
pub struct ScoreBuilder {
    script: String,
}

impl ScoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a wave operator event.
    pub fn wave(mut self, wave: &str) -> Self {
        self.script.push_str("W ");
        self.script.push_str(wave);
        self.script.push(' ');
        self
    }

    /// Begin a noise operator event.
    pub fn noise(mut self, noise: &str) -> Self {
        self.script.push_str("N ");
        self.script.push_str(noise);
        self.script.push(' ');
        self
    }

    /// Frequency in Hz or a pitch name.
    pub fn freq(mut self, value: impl std::fmt::Display) -> Self {
        self.script.push_str(&format!("f{} ", value));
        self
    }

    /// Amplitude.
    pub fn amp(mut self, value: f64) -> Self {
        self.script.push_str(&format!("a{} ", value));
        self
    }

    /// Duration in seconds.
    pub fn time(mut self, seconds: f64) -> Self {
        self.script.push_str(&format!("t{} ", seconds));
        self
    }

    /// Channel mix (0 left, 0.5 center, 1 right).
    pub fn pan(mut self, value: f64) -> Self {
        self.script.push_str(&format!("c{} ", value));
        self
    }

    /// Wait before the next event, in seconds.
    pub fn wait(mut self, seconds: f64) -> Self {
        self.script.push_str(&format!("\\{} ", seconds));
        self
    }

    /// A frequency modulator sublist built by `inner`.
    pub fn fm(self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.sublist("f![", inner)
    }

    /// An amplitude modulator sublist built by `inner`.
    pub fn am(self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.sublist("a![", inner)
    }

    /// A phase modulator sublist built by `inner`.
    pub fn pm(self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.sublist("p![", inner)
    }

    fn sublist(mut self, open: &str, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.script.push_str(open);
        self.script.push(' ');
        let nested = inner(ScoreBuilder::new());
        self.script.push_str(&nested.script);
        self.script.push_str("] ");
        self
    }

    /// Relative frequency ratio (inside sublists).
    pub fn ratio(mut self, value: f64) -> Self {
        self.script.push_str(&format!("r{} ", value));
        self
    }

    /// Silence prefix in seconds.
    pub fn silence(mut self, seconds: f64) -> Self {
        self.script.push_str(&format!("s{} ", seconds));
        self
    }

    /// Initial phase.
    pub fn phase(mut self, value: f64) -> Self {
        self.script.push_str(&format!("p{} ", value));
        self
    }

    /// An amplitude ramp toward `goal` over `seconds`.
    pub fn amp_ramp(mut self, shape: &str, seconds: f64, goal: f64) -> Self {
        self.script
            .push_str(&format!("a{{c={} t={} v={}}} ", shape, seconds, goal));
        self
    }

    /// A frequency ramp toward `goal` over `seconds`.
    pub fn freq_ramp(mut self, shape: &str, seconds: f64, goal: impl std::fmt::Display) -> Self {
        self.script
            .push_str(&format!("f{{c={} t={} v={}}} ", shape, seconds, goal));
        self
    }

    /// Label the next operator.
    pub fn label(mut self, name: &str) -> Self {
        self.script.push_str(&format!("'{} ", name));
        self
    }

    /// Begin an event re-referencing a labeled operator.
    pub fn reference(mut self, name: &str) -> Self {
        self.script.push_str(&format!(":{} ", name));
        self
    }

    /// Extend the current operator with a composite sub-event.
    pub fn composite(mut self) -> Self {
        self.script.push_str("; ");
        self
    }

    /// A ring amplitude modulator sublist.
    pub fn ring_am(self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.sublist("a!~[", inner)
    }

    /// Append to the operator's existing AM list.
    pub fn append_am(self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.sublist("a!+[", inner)
    }

    /// An `S` settings statement from (key, value) pairs.
    pub fn settings(mut self, pairs: &[(&str, f64)]) -> Self {
        self.script.push_str("S ");
        for (key, value) in pairs {
            self.script.push_str(&format!("{}={} ", key, value));
        }
        self
    }

    /// A `$name = value` variable assignment.
    pub fn variable(mut self, name: &str, value: f64) -> Self {
        self.script.push_str(&format!("${} = {}\n", name, value));
        self
    }

    /// A duration group built by `inner`.
    pub fn group(mut self, inner: impl FnOnce(ScoreBuilder) -> ScoreBuilder) -> Self {
        self.script.push_str("< ");
        let nested = inner(ScoreBuilder::new());
        self.script.push_str(&nested.script);
        self.script.push_str("> ");
        self
    }

    /// End the current line (resets the line sub-state).
    pub fn line_break(mut self) -> Self {
        self.script.push('\n');
        self
    }

    /// Append raw script text verbatim.
    pub fn raw(mut self, text: &str) -> Self {
        self.script.push_str(text);
        self.script.push(' ');
        self
    }

    /// The accumulated script text.
    pub fn build(self) -> String {
        self.script
    }
}

/// One failed expectation of a harness run
#[derive(Debug, Clone, PartialEq)]
pub struct TestFailure {
    pub check: String,
    pub detail: String,
}

/// Result of a harness run
#[derive(Debug)]
pub struct TestReport {
    pub name: String,
    pub failures: Vec<TestFailure>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compiles a score and checks it against declared expectations.
pub struct TestHarness {
    name: String,
    script: String,
    expect_clean: bool,
    expect_failed: Option<bool>,
    expect_voices: Option<u32>,
    expect_operators: Option<u32>,
    expect_events: Option<usize>,
    expect_duration_ms: Option<u32>,
    expect_valid: bool,
}

impl TestHarness {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            expect_clean: false,
            expect_failed: None,
            expect_voices: None,
            expect_operators: None,
            expect_events: None,
            expect_duration_ms: None,
            expect_valid: true,
        }
    }

    /// Expect no diagnostics at all.
    pub fn expect_clean(mut self) -> Self {
        self.expect_clean = true;
        self
    }

    /// Expect the build to fail (or not).
    pub fn expect_failed(mut self, failed: bool) -> Self {
        self.expect_failed = Some(failed);
        self
    }

    pub fn expect_voices(mut self, count: u32) -> Self {
        self.expect_voices = Some(count);
        self
    }

    pub fn expect_operators(mut self, count: u32) -> Self {
        self.expect_operators = Some(count);
        self
    }

    pub fn expect_events(mut self, count: usize) -> Self {
        self.expect_events = Some(count);
        self
    }

    pub fn expect_duration_ms(mut self, ms: u32) -> Self {
        self.expect_duration_ms = Some(ms);
        self
    }

    /// Skip the structural validation step.
    pub fn skip_validation(mut self) -> Self {
        self.expect_valid = false;
        self
    }

    /// Compile and evaluate every expectation.
    pub fn run(self) -> TestReport {
        let mut failures = Vec::new();
        let compiler =
            Compiler::new().with_options(CompilerOptions::default().silent().with_seed(0));

        let compiled = match compiler.compile_str(&self.name, &self.script) {
            Ok(c) => c,
            Err(e) => {
                failures.push(TestFailure {
                    check: "compile".into(),
                    detail: e.to_string(),
                });
                return TestReport {
                    name: self.name,
                    failures,
                };
            }
        };

        if self.expect_clean && !compiled.diagnostics.is_empty() {
            failures.push(TestFailure {
                check: "clean".into(),
                detail: format!("{} diagnostics", compiled.diagnostics.len()),
            });
        }
        if let Some(expected) = self.expect_failed {
            if compiled.failed != expected {
                failures.push(TestFailure {
                    check: "failed".into(),
                    detail: format!("expected {}, got {}", expected, compiled.failed),
                });
            }
        }
        let p = &compiled.program;
        if let Some(v) = self.expect_voices {
            if p.voice_count != v {
                failures.push(TestFailure {
                    check: "voices".into(),
                    detail: format!("expected {}, got {}", v, p.voice_count),
                });
            }
        }
        if let Some(o) = self.expect_operators {
            if p.operator_count != o {
                failures.push(TestFailure {
                    check: "operators".into(),
                    detail: format!("expected {}, got {}", o, p.operator_count),
                });
            }
        }
        if let Some(e) = self.expect_events {
            if p.events.len() != e {
                failures.push(TestFailure {
                    check: "events".into(),
                    detail: format!("expected {}, got {}", e, p.events.len()),
                });
            }
        }
        if let Some(d) = self.expect_duration_ms {
            if p.duration_ms != d {
                failures.push(TestFailure {
                    check: "duration".into(),
                    detail: format!("expected {} ms, got {} ms", d, p.duration_ms),
                });
            }
        }
        if self.expect_valid {
            for violation in validate(p) {
                failures.push(TestFailure {
                    check: "validate".into(),
                    detail: violation.to_string(),
                });
            }
        }

        TestReport {
            name: self.name,
            failures,
        }
    }
}

/// Generates random but well-formed scores from a seed.
///
/// Every seed yields the same script, so a failing case reproduces from
/// its seed alone. The robustness tests sweep a seed range and hold that
/// compilation never rejects a generated score and always yields a
/// structurally sound program.
#[derive(Debug)]
pub struct ScoreFuzzer {
    stream: SeedStream,
}

impl ScoreFuzzer {
    pub fn new(seed: u64) -> Self {
        Self {
            stream: SeedStream::from_seed(seed),
        }
    }

    fn pick(&mut self, bound: u64) -> u64 {
        self.stream.next_u64() % bound
    }

    fn small_num(&mut self) -> f64 {
        f64::from((self.pick(400) + 1) as u32) / 100.0
    }

    /// Generate a score with roughly `events` events.
    pub fn score(&mut self, events: usize) -> String {
        let mut out = String::new();
        for i in 0..events {
            if i > 0 && self.pick(2) == 0 {
                out.push_str(&format!("\\{} ", self.small_num()));
            }
            self.event(&mut out, 0);
            if self.pick(4) == 0 {
                out.push('\n');
            }
        }
        out
    }

    fn event(&mut self, out: &mut String, depth: usize) {
        match self.pick(3) {
            0 => out.push_str("W sin "),
            1 => out.push_str("W sqr "),
            _ => out.push_str("N wh "),
        }
        out.push_str(&format!("f{} ", (self.pick(900) + 50) as u32));
        out.push_str(&format!("a{} ", f64::from(self.pick(90) as u32 + 10) / 100.0));
        out.push_str(&format!("t{} ", self.small_num()));
        if self.pick(3) == 0 {
            out.push_str(&format!(
                "a{{c=exp t={} v=0}} ",
                self.small_num()
            ));
        }
        if depth < 2 && self.pick(3) == 0 {
            let open = match self.pick(3) {
                0 => "f![ ",
                1 => "a![ ",
                _ => "p![ ",
            };
            out.push_str(open);
            out.push_str("W ");
            out.push_str(&format!("r{} ", f64::from(self.pick(40) as u32 + 5) / 10.0));
            out.push_str(&format!("a{} ", f64::from(self.pick(20) as u32 + 1) / 10.0));
            if self.pick(2) == 0 {
                self.modulator(out, depth + 1);
            }
            out.push_str("] ");
        }
        if self.pick(5) == 0 {
            out.push_str(&format!("; t{} ", self.small_num()));
        }
    }

    fn modulator(&mut self, out: &mut String, depth: usize) {
        if depth >= 3 {
            return;
        }
        out.push_str("p![ W ");
        out.push_str(&format!("r{} ", f64::from(self.pick(30) as u32 + 1) / 10.0));
        out.push_str("] ");
    }
}

/// Output format for generated documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Markdown,
    PlainText,
}

/// Renders the language's reference documentation.
pub struct DocGenerator;

impl DocGenerator {
    /// Document a registry's name tables.
    pub fn name_tables(registry: &NameRegistry, format: DocFormat) -> String {
        let mut out = String::new();
        let sections = [
            ("Wave types", NameKind::Wave),
            ("Noise types", NameKind::Noise),
            ("Line shapes", NameKind::LineShape),
            ("Math functions", NameKind::MathFunc),
        ];
        for (title, kind) in sections {
            match format {
                DocFormat::Markdown => {
                    out.push_str(&format!("## {}\n\n", title));
                    for name in registry.names_for(kind) {
                        out.push_str(&format!("- `{}`\n", name));
                    }
                    out.push('\n');
                }
                DocFormat::PlainText => {
                    out.push_str(title);
                    out.push_str(": ");
                    out.push_str(&registry.names_for(kind).join(", "));
                    out.push('\n');
                }
            }
        }
        out
    }

    /// The token cheat sheet.
    pub fn token_reference(format: DocFormat) -> String {
        let rows: &[(&str, &str)] = &[
            ("W N L O E", "new wave / noise / line operator"),
            ("a c f r p t s w g l n v", "parameter setters"),
            ("x{c=.. t=.. v=..}", "ramp toward a goal"),
            ("x![ ... ]", "modulator sublist (~[ ring, +[ append)"),
            ("< ... >", "duration group"),
            (";", "composite: extend the operator in place"),
            ("|", "time separator"),
            ("\\num, \\t", "wait before the next event"),
            ("'name, :name", "label an operator / re-reference it"),
            ("$name = num", "numeric variable"),
            ("#", "line comment"),
            ("Q", "end of script"),
        ];
        let mut out = String::new();
        match format {
            DocFormat::Markdown => {
                out.push_str("| Token | Meaning |\n|-------|--------|\n");
                for (token, meaning) in rows {
                    out.push_str(&format!("| `{}` | {} |\n", token, meaning));
                }
            }
            DocFormat::PlainText => {
                for (token, meaning) in rows {
                    out.push_str(&format!("{:24} {}\n", token, meaning));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_simple_event() {
        let script = ScoreBuilder::new()
            .wave("sin")
            .freq(440)
            .amp(0.5)
            .time(1.0)
            .build();
        assert_eq!(script, "W sin f440 a0.5 t1 ");

        let report = TestHarness::new("builder", script)
            .expect_clean()
            .expect_voices(1)
            .expect_duration_ms(1000)
            .run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_builder_nested_modulators() {
        let script = ScoreBuilder::new()
            .wave("sin")
            .freq("A4")
            .time(2.0)
            .fm(|m| m.wave("sqr").ratio(2.0).amp(1.0))
            .build();
        let report = TestHarness::new("fm", script)
            .expect_clean()
            .expect_operators(2)
            .run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_builder_group_and_waits() {
        let script = ScoreBuilder::new()
            .group(|g| g.wave("sin").time(0.1).wave("sin").time(0.5))
            .build();
        let report = TestHarness::new("group", script)
            .expect_clean()
            .expect_duration_ms(500)
            .expect_voices(2)
            .run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_builder_full_surface() {
        let script = ScoreBuilder::new()
            .settings(&[("a", 0.5), ("t", 1.0)])
            .line_break()
            .variable("root", 110.0)
            .label("bass")
            .wave("saw")
            .freq("$root")
            .amp(0.8)
            .silence(0.1)
            .amp_ramp("exp", 0.9, 0.0)
            .ring_am(|m| m.wave("sin").ratio(3.0))
            .line_break()
            .wait(1.0)
            .reference("bass")
            .freq_ramp("lin", 0.5, 220)
            .build();
        let report = TestHarness::new("full", script).expect_clean().run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_builder_composite() {
        let script = ScoreBuilder::new()
            .wave("sin")
            .freq(440)
            .time(0.5)
            .composite()
            .time(0.5)
            .raw("w=sqr")
            .build();
        let report = TestHarness::new("composite", script)
            .expect_clean()
            .expect_events(2)
            .expect_duration_ms(1000)
            .run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_harness_reports_mismatch() {
        let report = TestHarness::new("bad", "W t1")
            .expect_voices(5)
            .run();
        assert!(!report.passed());
        assert_eq!(report.failures[0].check, "voices");
    }

    #[test]
    fn test_harness_expect_failed() {
        let report = TestHarness::new("undef", ":ghost a1")
            .expect_failed(true)
            .run();
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_doc_generator_markdown() {
        let docs = DocGenerator::name_tables(&NameRegistry::default(), DocFormat::Markdown);
        assert!(docs.contains("## Wave types"));
        assert!(docs.contains("- `sin`"));
        assert!(docs.contains("- `hold`"));
    }

    #[test]
    fn test_doc_generator_plain() {
        let docs = DocGenerator::name_tables(&NameRegistry::default(), DocFormat::PlainText);
        assert!(docs.contains("Noise types: wh, pk, br, gs"));
    }

    #[test]
    fn test_token_reference() {
        let md = DocGenerator::token_reference(DocFormat::Markdown);
        assert!(md.starts_with("| Token |"));
        let plain = DocGenerator::token_reference(DocFormat::PlainText);
        assert!(plain.contains("duration group"));
    }

    #[test]
    fn test_fuzzer_reproducible() {
        let a = ScoreFuzzer::new(99).score(6);
        let b = ScoreFuzzer::new(99).score(6);
        assert_eq!(a, b);
        let c = ScoreFuzzer::new(100).score(6);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fuzzed_scores_compile_clean() {
        let compiler =
            Compiler::new().with_options(CompilerOptions::default().silent().with_seed(0));
        for seed in 0..40 {
            let script = ScoreFuzzer::new(seed).score(8);
            let compiled = compiler
                .compile_str("fuzz", &script)
                .unwrap_or_else(|e| panic!("seed {}: {}\n{}", seed, e, script));
            assert!(
                !compiled.failed && compiled.diagnostics.is_empty(),
                "seed {}: {:?}\n{}",
                seed,
                compiled.diagnostics,
                script
            );
            let violations = validate(&compiled.program);
            assert!(
                violations.is_empty(),
                "seed {}: {:?}\n{}",
                seed,
                violations,
                script
            );
        }
    }

    #[test]
    fn test_fuzzed_compiles_deterministic() {
        let compiler =
            Compiler::new().with_options(CompilerOptions::default().silent().with_seed(7));
        for seed in 0..10 {
            let script = ScoreFuzzer::new(seed).score(5);
            let a = compiler.compile_str("fuzz", &script).unwrap();
            let b = compiler.compile_str("fuzz", &script).unwrap();
            assert_eq!(a.program, b.program, "seed {}", seed);
        }
    }
}
