//! Numeric Expressions
//!
//! An operator-precedence evaluator for the numbers appearing after
//! parameter letters and in `$name =` assignments. Precedence levels run
//! `SUB < ADT < MLT < POW < NUM`: parenthesized subexpression, `+ -`,
//! `* / %`, right-associative `^`, atom.
//!
//! Atoms are decimal literals, parenthesized subexpressions, sign
//! prefixes, `$name` variable references, math-function calls, and
//! identifiers resolved through a caller-supplied named-constant callback
//! (pitch names in frequency context, pan keywords in channel context).
//! A closing `)` followed directly by `(` multiplies (`3(2)(1)` is 6);
//! whitespace ends the expression outside parentheses.
//!
//! A return of `None` with no diagnostic means no expression was read;
//! infinite results are rejected with a diagnostic.

use crate::names;
use crate::scanner::{Scanner, WsLevel, CH_END};
use crate::symtab::{SymKind, SymValue};

/// Named-constant resolver supplied by the parse context
pub type ConstFn<'a> = &'a dyn Fn(&str) -> Option<f64>;

/// Binding levels, loosest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Sub,
    Adt,
    Mlt,
    Pow,
}

/// Parse one numeric expression from the scanner.
///
/// Whitespace folding is suppressed for the duration; outside parentheses
/// a space or line break terminates the expression.
pub fn parse_number(sc: &mut Scanner, consts: Option<ConstFn<'_>>) -> Option<f64> {
    let prev_ws = sc.set_ws(WsLevel::None);
    let value = expr(sc, consts, Level::Adt, false);
    sc.set_ws(prev_ws);

    if value.is_nan() {
        return None;
    }
    if value.is_infinite() {
        let frame = sc.frame();
        sc.diag()
            .warn_at(frame, "infinite number in expression; value discarded");
        return None;
    }
    Some(value)
}

fn skip_paren_space(sc: &mut Scanner) -> bool {
    let mut skipped = false;
    loop {
        let c = sc.getc();
        if c != b' ' && c != b'\t' && c != b'\n' {
            sc.ungetc();
            return skipped;
        }
        skipped = true;
    }
}

fn expr(sc: &mut Scanner, consts: Option<ConstFn<'_>>, level: Level, in_parens: bool) -> f64 {
    let mut acc = operand(sc, consts, in_parens);
    if acc.is_nan() {
        return f64::NAN;
    }

    loop {
        let mut had_ws = false;
        if in_parens {
            had_ws = skip_paren_space(sc);
        }
        let c = sc.getc();
        let (op_level, rhs_level) = match c {
            b'+' | b'-' => (Level::Adt, Level::Mlt),
            b'*' | b'/' | b'%' => (Level::Mlt, Level::Pow),
            b'^' => (Level::Pow, Level::Pow),
            // Juxtaposition: a parenthesized factor directly after the
            // previous value multiplies at MLT. Whitespace in between
            // ends the expression instead.
            b'(' if !had_ws => (Level::Mlt, Level::Sub),
            _ => {
                sc.ungetc();
                return acc;
            }
        };
        if op_level < level {
            sc.ungetc();
            return acc;
        }

        let rhs = if c == b'(' {
            paren(sc, consts)
        } else {
            expr(sc, consts, rhs_level, in_parens)
        };
        if rhs.is_nan() {
            let frame = sc.frame();
            sc.diag()
                .warn_at(frame, format!("expected a value after '{}'", c as char));
            return f64::NAN;
        }

        acc = match c {
            b'+' => acc + rhs,
            b'-' => acc - rhs,
            b'*' | b'(' => acc * rhs,
            b'/' => acc / rhs,
            b'%' => acc % rhs,
            b'^' => acc.powf(rhs),
            _ => unreachable!(),
        };
    }
}

/// A parenthesized subexpression; the opening `(` is already consumed.
fn paren(sc: &mut Scanner, consts: Option<ConstFn<'_>>) -> f64 {
    let value = expr(sc, consts, Level::Adt, true);
    skip_paren_space(sc);
    if !sc.tryc(b')') {
        let frame = sc.frame();
        sc.diag().warn_at(frame, "missing ')' in expression");
    }
    value
}

fn operand(sc: &mut Scanner, consts: Option<ConstFn<'_>>, in_parens: bool) -> f64 {
    if in_parens {
        skip_paren_space(sc);
    }
    let c = sc.getc();
    match c {
        b'0'..=b'9' | b'.' => {
            sc.ungetc();
            let (v, len) = sc.get_decimal();
            if len == 0 {
                // A lone '.' with no digits around it.
                sc.getc();
                return f64::NAN;
            }
            v
        }
        b'(' => paren(sc, consts),
        b'+' | b'-' => {
            let before = sc.scan_pos();
            let v = expr(sc, consts, Level::Adt, in_parens);
            if v.is_nan() {
                // Nothing after the sign: give the sign back (it may be
                // scope syntax such as `+[`).
                if sc.scan_pos() == before {
                    sc.ungetc();
                }
                return f64::NAN;
            }
            if c == b'-' {
                -v
            } else {
                v
            }
        }
        b'$' => {
            let Some(id) = sc.get_identifier() else {
                let frame = sc.frame();
                sc.diag().warn_at(frame, "expected a variable name after '$'");
                return f64::NAN;
            };
            match sc.symtab().variable(id) {
                SymValue::Number(v) => v,
                _ => {
                    let name = sc.symtab_ref().name(id).to_string();
                    let frame = sc.frame();
                    sc.diag()
                        .warn_at(frame, format!("variable '${}' has no numeric value", name));
                    f64::NAN
                }
            }
        }
        _ if c.is_ascii_alphabetic() || c == b'_' => {
            sc.ungetc();
            named(sc, consts)
        }
        CH_END => f64::NAN,
        _ => {
            sc.ungetc();
            f64::NAN
        }
    }
}

/// Math-function call or named constant.
fn named(sc: &mut Scanner, consts: Option<ConstFn<'_>>) -> f64 {
    let Some(id) = sc.get_identifier() else {
        return f64::NAN;
    };
    if let Some(func) = sc.symtab_ref().name_id(id, SymKind::MathFunc) {
        if sc.tryc(b'(') {
            let arg = paren(sc, consts);
            if arg.is_nan() {
                return f64::NAN;
            }
            return names::apply_math_func(func, arg);
        }
        // Fall through: the name may still be a constant in this context.
    }
    let name = sc.symtab_ref().name(id).to_string();
    if let Some(lookup) = consts {
        if let Some(v) = lookup(&name) {
            return v;
        }
    }
    let frame = sc.frame();
    sc.diag()
        .warn_at(frame, format!("unknown name '{}' in expression", name));
    f64::NAN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ScriptBuffer;
    use crate::diag::Diagnostics;
    use crate::names::NameRegistry;
    use crate::symtab::SymTab;

    fn scanner(src: &str) -> Scanner {
        let mut symtab = SymTab::new();
        NameRegistry::default().register(&mut symtab);
        Scanner::new(
            ScriptBuffer::from_str(src),
            symtab,
            Diagnostics::silent("test"),
        )
    }

    fn eval(src: &str) -> Option<f64> {
        let mut sc = scanner(src);
        parse_number(&mut sc, None)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("2+3*4"), Some(14.0));
        assert_eq!(eval("2*3+4"), Some(10.0));
        assert_eq!(eval("(1+2)*3"), Some(9.0));
    }

    #[test]
    fn test_power_right_assoc() {
        assert_eq!(eval("2^3^2"), Some(512.0));
    }

    #[test]
    fn test_modulo() {
        assert_eq!(eval("7%4"), Some(3.0));
    }

    #[test]
    fn test_juxtaposition() {
        assert_eq!(eval("2(3)"), Some(6.0));
        assert_eq!(eval("3(2)(1)"), Some(6.0));
    }

    #[test]
    fn test_whitespace_ends_expression() {
        let mut sc = scanner("2 (3)");
        assert_eq!(parse_number(&mut sc, None), Some(2.0));
        // The parenthesized part stays unread.
        assert_eq!(sc.getc(), b' ');
        assert_eq!(sc.getc(), b'(');
    }

    #[test]
    fn test_spaces_inside_parens() {
        assert_eq!(eval("( 1 + 2 )"), Some(3.0));
        assert_eq!(eval("(1 + 2)*3"), Some(9.0));
        // Outside parens the space after ')' ends the expression.
        assert_eq!(eval("( 1 + 2 ) * 3"), Some(3.0));
    }

    #[test]
    fn test_sign_prefix() {
        assert_eq!(eval("-5"), Some(-5.0));
        // The sign binds a whole ADT-level subexpression.
        assert_eq!(eval("-2+3"), Some(-5.0));
        assert_eq!(eval("+4"), Some(4.0));
    }

    #[test]
    fn test_division_by_zero_rejects() {
        let mut sc = scanner("3/0");
        assert_eq!(parse_number(&mut sc, None), None);
        assert!(!sc.diag().entries().is_empty());
    }

    #[test]
    fn test_no_expression_is_silent() {
        let mut sc = scanner("]");
        assert_eq!(parse_number(&mut sc, None), None);
        assert!(sc.diag().entries().is_empty());
        assert_eq!(sc.getc(), b']');
    }

    #[test]
    fn test_variable_reference() {
        let mut sc = scanner("$freq*2");
        let id = sc.symtab().intern("freq");
        sc.symtab().set_variable(id, 110.0);
        assert_eq!(parse_number(&mut sc, None), Some(220.0));
    }

    #[test]
    fn test_unset_variable_rejects() {
        let mut sc = scanner("$nothing");
        assert_eq!(parse_number(&mut sc, None), None);
        assert!(!sc.diag().entries().is_empty());
    }

    #[test]
    fn test_math_function() {
        assert_eq!(eval("abs(0-3)"), Some(3.0));
        assert_eq!(eval("sqrt(16)"), Some(4.0));
        assert_eq!(eval("floor(2.9)"), Some(2.0));
    }

    #[test]
    fn test_named_constant_callback() {
        let mut sc = scanner("C+0.5");
        let consts = |name: &str| match name {
            "L" => Some(0.0),
            "C" => Some(0.5),
            "R" => Some(1.0),
            _ => None,
        };
        assert_eq!(parse_number(&mut sc, Some(&consts)), Some(1.0));
    }

    #[test]
    fn test_unknown_name_rejects_with_diagnostic() {
        let mut sc = scanner("mystery");
        assert_eq!(parse_number(&mut sc, None), None);
        assert_eq!(sc.diag().entries().len(), 1);
    }

    #[test]
    fn test_decimal_forms() {
        assert_eq!(eval("0.5"), Some(0.5));
        assert_eq!(eval(".25"), Some(0.25));
        assert_eq!(eval("10."), Some(10.0));
    }

    #[test]
    fn test_nested_parens() {
        assert_eq!(eval("((2+3))*((1+1))"), Some(10.0));
    }

    #[test]
    fn test_mixed_precedence_chain() {
        assert_eq!(eval("1+2*3^2"), Some(19.0));
        assert_eq!(eval("2^2*3+1"), Some(13.0));
    }

    #[test]
    fn test_dangling_operator_warns() {
        let mut sc = scanner("2+");
        assert_eq!(parse_number(&mut sc, None), None);
        assert!(!sc.diag().entries().is_empty());
    }

    #[test]
    fn test_sign_restored_when_nothing_follows() {
        // The sign of scope syntax like `+[` must come back untouched.
        let mut sc = scanner("+[");
        assert_eq!(parse_number(&mut sc, None), None);
        assert_eq!(sc.getc(), b'+');
        assert_eq!(sc.getc(), b'[');
    }

    #[test]
    fn test_missing_close_paren_warns() {
        let mut sc = scanner("(1+2");
        assert_eq!(parse_number(&mut sc, None), Some(3.0));
        assert!(sc
            .diag()
            .entries()
            .iter()
            .any(|d| d.message.contains("missing ')'")));
    }

    #[test]
    fn test_math_function_inside_expression() {
        assert_eq!(eval("2*sqrt(9)+1"), Some(7.0));
    }

    #[test]
    fn test_constant_beats_unknown_function_form() {
        // A name without '(' falls through to the constant callback.
        let mut sc = scanner("Cs5");
        let consts = |name: &str| crate::names::pitch_freq(name, 440.0);
        let v = parse_number(&mut sc, Some(&consts)).unwrap();
        assert!((v - 554.365).abs() < 0.01);
    }
}
