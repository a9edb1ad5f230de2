//! Calculated-field formula evaluation.
//!
//! Formulas are restricted arithmetic over named numeric fields: `{key}` placeholders,
//! decimal literals, `+ - * /`, unary `+`/`-`, and parentheses. A formula is tokenized and
//! parsed by a small recursive-descent parser into an expression tree; nothing outside that
//! grammar can be expressed.
//!
//! Evaluation never fails hard. A formula whose operands are not all available, that does
//! not parse, or whose result is not finite evaluates to [`Evaluation::NotReady`]: technicians
//! type partial values all the time and the form must keep working.

use std::collections::BTreeSet;

use profiles::formula_placeholders;

use crate::constants::RESULT_DECIMAL_PLACES;
use crate::value::ValueMap;

/// Parenthesis / unary nesting limit.
const MAX_DEPTH: usize = 64;

/// Why a formula could not produce a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotReady {
    /// A referenced key is absent, blank, or not a finite number.
    MissingOperand(String),
    /// The formula does not match the arithmetic grammar.
    Malformed(String),
    /// The arithmetic produced an infinity or NaN (for example division by zero).
    NonFinite,
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReady::MissingOperand(key) => write!(f, "operand '{key}' is not available"),
            NotReady::Malformed(reason) => write!(f, "malformed formula: {reason}"),
            NotReady::NonFinite => f.write_str("result is not a finite number"),
        }
    }
}

/// Outcome of evaluating a formula.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// Result rounded to two decimal places.
    Ready(f64),
    NotReady(NotReady),
}

impl Evaluation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Evaluation::Ready(v) => Some(*v),
            Evaluation::NotReady(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Evaluation::Ready(_))
    }
}

/// Evaluate `formula` against `values`.
///
/// Every placeholder must resolve to a finite number before any arithmetic happens; there is
/// no partial substitution.
pub fn evaluate(formula: &str, values: &ValueMap) -> Evaluation {
    let expr = match Formula::parse(formula) {
        Ok(expr) => expr,
        Err(reason) => return Evaluation::NotReady(reason),
    };
    expr.evaluate(values)
}

/// Keys a formula depends on, in order of first appearance.
pub fn placeholders(formula: &str) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    formula_placeholders(formula)
        .into_iter()
        .filter(|key| seen.insert(*key))
        .collect()
}

/// A parsed formula, reusable across evaluations.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    root: Expr,
}

impl Formula {
    /// Tokenize and parse `formula`. Errors are always [`NotReady::Malformed`].
    pub fn parse(formula: &str) -> Result<Self, NotReady> {
        let tokens = tokenize(formula)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(NotReady::Malformed(format!("unexpected {token:?}")));
        }
        Ok(Self { root })
    }

    pub fn evaluate(&self, values: &ValueMap) -> Evaluation {
        let mut operands = Vec::new();
        self.root.operands(&mut operands);
        if let Some(missing) = operands.into_iter().find(|key| values.number(key).is_none()) {
            return Evaluation::NotReady(NotReady::MissingOperand(missing.to_owned()));
        }

        let raw = self.root.eval(values);
        match round_result(raw) {
            Some(v) => Evaluation::Ready(v),
            None => Evaluation::NotReady(NotReady::NonFinite),
        }
    }
}

fn round_result(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let factor = 10f64.powi(RESULT_DECIMAL_PLACES);
    let scaled = raw * factor;
    // Magnitudes this large carry no fractional digits to round.
    if !scaled.is_finite() {
        return Some(raw);
    }
    let rounded = scaled.round() / factor;
    // `+ 0.0` turns -0.0 into 0.0.
    rounded.is_finite().then_some(rounded + 0.0)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Operand(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
}

fn tokenize(formula: &str) -> Result<Vec<Token>, NotReady> {
    let mut tokens = Vec::new();
    let mut chars = formula.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '{' => {
                let rest = &formula[start + 1..];
                let close = rest
                    .find('}')
                    .ok_or_else(|| NotReady::Malformed("unterminated placeholder".into()))?;
                let key = rest[..close].trim();
                // Skip past the closing brace.
                while let Some((_, c)) = chars.next() {
                    if c == '}' {
                        break;
                    }
                }
                Token::Operand(key.to_owned())
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &formula[start..end];
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| NotReady::Malformed(format!("invalid number '{literal}'")))?;
                Token::Number(n)
            }
            other => {
                return Err(NotReady::Malformed(format!("unexpected character '{other}'")));
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(f64),
    Operand(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn operands<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Operand(key) => out.push(key),
            Expr::Negate(inner) => inner.operands(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.operands(out);
                rhs.operands(out);
            }
        }
    }

    /// IEEE semantics: division by zero yields an infinity or NaN, checked by the caller.
    fn eval(&self, values: &ValueMap) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Operand(key) => values.number(key).unwrap_or(f64::NAN),
            Expr::Negate(inner) => -inner.eval(values),
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (lhs.eval(values), rhs.eval(values));
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                }
            }
        }
    }
}

/// Grammar:
///
/// ```text
/// expression := term (('+' | '-') term)*
/// term       := unary (('*' | '/') unary)*
/// unary      := ('+' | '-') unary | primary
/// primary    := NUMBER | OPERAND | '(' expression ')'
/// ```
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), NotReady> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(NotReady::Malformed("formula is nested too deeply".into()));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, NotReady> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, NotReady> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, NotReady> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Negate(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, NotReady> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::Operand(key)) => Ok(Expr::Operand(key.clone())),
            Some(Token::LeftParen) => {
                self.descend()?;
                let inner = self.expression()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RightParen) => Ok(inner),
                    _ => Err(NotReady::Malformed("missing closing parenthesis".into())),
                }
            }
            Some(token) => Err(NotReady::Malformed(format!("unexpected {token:?}"))),
            None => Err(NotReady::Malformed("unexpected end of formula".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn values(pairs: &[(&str, FieldValue)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn subtracts_two_operands() {
        let v = values(&[("a", 5.0.into()), ("b", 3.0.into())]);
        assert_eq!(evaluate("{a} - {b}", &v), Evaluation::Ready(2.0));
    }

    #[test]
    fn missing_operand_is_not_ready() {
        let v = values(&[("b", 3.0.into())]);
        assert_eq!(
            evaluate("{a} - {b}", &v),
            Evaluation::NotReady(NotReady::MissingOperand("a".into()))
        );
    }

    #[test]
    fn zero_operands_are_ready() {
        let v = values(&[("a", 0.0.into()), ("b", 0.0.into())]);
        assert_eq!(evaluate("{a} - {b}", &v), Evaluation::Ready(0.0));
    }

    #[test]
    fn text_operands_parse_as_numbers() {
        let v = values(&[("a", "5".into()), ("b", " 2.5 ".into())]);
        assert_eq!(evaluate("{a} * {b}", &v), Evaluation::Ready(12.5));
    }

    #[test]
    fn non_numeric_text_is_not_ready() {
        let v = values(&[("a", "trace".into()), ("b", 1.0.into())]);
        assert!(matches!(
            evaluate("{a} + {b}", &v),
            Evaluation::NotReady(NotReady::MissingOperand(key)) if key == "a"
        ));
    }

    #[test]
    fn rounds_to_two_decimals() {
        let v = values(&[("bil_total", 1.5.into()), ("bil_direct", 0.3.into())]);
        assert_eq!(
            evaluate("{bil_total} - {bil_direct}", &v),
            Evaluation::Ready(1.2)
        );
        assert_eq!(evaluate("10 / 3", &ValueMap::new()), Evaluation::Ready(3.33));
        assert_eq!(evaluate("2 / 3", &ValueMap::new()), Evaluation::Ready(0.67));
    }

    #[test]
    fn respects_precedence_and_parentheses() {
        let empty = ValueMap::new();
        assert_eq!(evaluate("2 + 3 * 4", &empty), Evaluation::Ready(14.0));
        assert_eq!(evaluate("(2 + 3) * 4", &empty), Evaluation::Ready(20.0));
        assert_eq!(evaluate("10 - 4 - 3", &empty), Evaluation::Ready(3.0));
        assert_eq!(evaluate("24 / 4 / 2", &empty), Evaluation::Ready(3.0));
    }

    #[test]
    fn supports_unary_minus_on_negative_operands() {
        let v = values(&[("a", 5.0.into()), ("b", (-3.0).into())]);
        assert_eq!(evaluate("{a} - {b}", &v), Evaluation::Ready(8.0));
        assert_eq!(evaluate("-{a} + 1", &v), Evaluation::Ready(-4.0));
        assert_eq!(evaluate("-(2 * 3)", &v), Evaluation::Ready(-6.0));
    }

    #[test]
    fn division_by_zero_is_not_ready() {
        let v = values(&[("albumin", 4.0.into()), ("globulin", 0.0.into())]);
        assert_eq!(
            evaluate("{albumin} / {globulin}", &v),
            Evaluation::NotReady(NotReady::NonFinite)
        );
        assert_eq!(
            evaluate("0 / 0", &ValueMap::new()),
            Evaluation::NotReady(NotReady::NonFinite)
        );
    }

    #[test]
    fn padded_placeholders_name_the_trimmed_key() {
        let v = values(&[("albumin", 4.0.into()), ("globulin", 2.5.into())]);
        assert_eq!(
            evaluate("{ albumin } / {globulin }", &v),
            Evaluation::Ready(1.6)
        );
        assert_eq!(placeholders("{ albumin } / {albumin}"), vec!["albumin"]);
    }

    #[test]
    fn huge_finite_results_are_ready() {
        let v = values(&[("a", 1e308.into()), ("b", (-1.7e308).into())]);
        assert_eq!(evaluate("{a} * 1", &v), Evaluation::Ready(1e308));
        assert_eq!(evaluate("{b} / 1", &v), Evaluation::Ready(-1.7e308));
        assert_eq!(
            evaluate("{a} * 10", &v),
            Evaluation::NotReady(NotReady::NonFinite)
        );
    }

    #[test]
    fn negative_zero_is_normalised() {
        let result = evaluate("-0.001", &ValueMap::new());
        let value = result.value().expect("ready");
        assert_eq!(value, 0.0);
        assert!(value.is_sign_positive());
    }

    #[test]
    fn malformed_formulas_are_not_ready() {
        let v = values(&[("a", 1.0.into()), ("b", 2.0.into())]);
        for formula in [
            "{a} +",
            "{a} {b}",
            "({a} + {b}",
            "{a} + {b})",
            "{a",
            "1..2",
            "{a} ^ 2",
            "Math.sqrt({a})",
            "",
        ] {
            assert!(
                matches!(evaluate(formula, &v), Evaluation::NotReady(NotReady::Malformed(_))),
                "{formula:?} should be malformed"
            );
        }
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflow() {
        let formula = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(matches!(
            evaluate(&formula, &ValueMap::new()),
            Evaluation::NotReady(NotReady::Malformed(_))
        ));
        let negations = format!("{}1", "-".repeat(500));
        assert!(!evaluate(&negations, &ValueMap::new()).is_ready());
    }

    #[test]
    fn parsed_formula_is_reusable() {
        let formula = Formula::parse("{total_protein} - {albumin}").expect("parses");
        let first = values(&[("total_protein", 7.0.into()), ("albumin", 4.0.into())]);
        let second = values(&[("total_protein", 6.5.into()), ("albumin", 4.2.into())]);
        assert_eq!(formula.evaluate(&first), Evaluation::Ready(3.0));
        assert_eq!(formula.evaluate(&second), Evaluation::Ready(2.3));
    }

    #[test]
    fn placeholders_are_exposed_in_order() {
        assert_eq!(
            placeholders("{total_cholesterol} - {hdl} - {vldl}"),
            vec!["total_cholesterol", "hdl", "vldl"]
        );
        assert_eq!(placeholders("{a} * {a} + {b}"), vec!["a", "b"]);
    }
}
