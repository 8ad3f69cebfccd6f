//! Calibrator engine: uncalibrated ↔ calibrated conversion.
//!
//! All calibration problems are non-fatal. They append to the owning
//! item's warning list and yield `None` (or a pass-through value where the
//! contract says so); the caller decides what to do with an item that has
//! no calibrated result.

use serde::{Deserialize, Serialize};

use crate::value::{all_hold, Comparison, ValidRange, Value, ValueLookup};
use crate::Warnings;

/// One `c * x^e` term of a polynomial calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolyTerm {
    pub coefficient: f64,
    pub exponent: u32,
}

impl PolyTerm {
    #[must_use]
    pub fn new(coefficient: f64, exponent: u32) -> Self {
        PolyTerm {
            coefficient,
            exponent,
        }
    }
}

/// A `(raw, calibrated)` spline knot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

/// Bidirectional label↔integer table used by enumeration calibrators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTable {
    entries: Vec<(String, i64)>,
}

impl EnumTable {
    #[must_use]
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (S, i64)>) -> Self {
        EnumTable {
            entries: entries.into_iter().map(|(s, v)| (s.into(), v)).collect(),
        }
    }

    #[must_use]
    pub fn label_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(s, _)| s.as_str())
    }

    #[must_use]
    pub fn value_of(&self, label: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(s, _)| s == label)
            .map(|(_, v)| *v)
    }
}

/// A calibrator and its required inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Calibrator {
    /// `cal = Σ cᵢ·uncalⁱ`. Invertible up to degree 2.
    Polynomial { terms: Vec<PolyTerm> },
    /// Piecewise-linear knots; `extrapolate` permits results beyond the
    /// outer knots.
    Spline {
        points: Vec<SplinePoint>,
        extrapolate: bool,
    },
    /// Label↔integer mapping.
    Enumeration { table: EnumTable },
    /// Explicitly unsupported; passes values through unchanged.
    MathOperation,
}

impl Calibrator {
    /// Uncalibrated → calibrated (decode direction).
    pub fn calibrate(&self, uncal: &Value, item: &str, warnings: &mut Warnings) -> Option<Value> {
        match self {
            Calibrator::Polynomial { terms } => {
                if terms.is_empty() {
                    warnings.push(format!("{item} polynomial calibrator no terms specified"));
                    return None;
                }
                let x = numeric(uncal, item, warnings)?;
                let y: f64 = terms
                    .iter()
                    .map(|t| t.coefficient * x.powi(t.exponent as i32))
                    .sum();
                Some(Value::Double(y))
            }
            Calibrator::Spline {
                points,
                extrapolate,
            } => {
                if points.len() < 2 {
                    warnings.push(format!(
                        "{item} spline calibrator does not have at least 2 points"
                    ));
                    return None;
                }
                let x = numeric(uncal, item, warnings)?;
                match segment_for(points, x, |p| p.raw, *extrapolate) {
                    Some((a, b)) => Some(Value::Double(lerp(
                        x,
                        a.raw,
                        b.raw,
                        a.calibrated,
                        b.calibrated,
                        item,
                        warnings,
                    )?)),
                    None => {
                        warnings.push(format!(
                            "{item} does not extrapolate and does not bound uncalibrated value {x}"
                        ));
                        None
                    }
                }
            }
            Calibrator::Enumeration { table } => {
                let v = uncal.as_i64()?;
                match table.label_of(v) {
                    Some(label) => Some(Value::Text(label.to_string())),
                    None => {
                        warnings.push(format!("{item} no enumeration label for value {v}"));
                        None
                    }
                }
            }
            Calibrator::MathOperation => {
                warnings.push(format!(
                    "{item} math operation calibrators are not yet supported"
                ));
                Some(uncal.clone())
            }
        }
    }

    /// Calibrated → uncalibrated (encode direction).
    ///
    /// `valid_range` is the owning type's declared uncalibrated range, used
    /// only to disambiguate quadratic roots.
    pub fn uncalibrate(
        &self,
        cal: &Value,
        item: &str,
        valid_range: Option<&ValidRange>,
        warnings: &mut Warnings,
    ) -> Option<Value> {
        match self {
            Calibrator::Polynomial { terms } => {
                if terms.is_empty() {
                    warnings.push(format!("{item} polynomial calibrator no terms specified"));
                    return None;
                }
                let y = numeric(cal, item, warnings)?;
                invert_polynomial(terms, y, item, valid_range, warnings)
            }
            Calibrator::Spline {
                points,
                extrapolate,
            } => {
                if points.len() < 2 {
                    warnings.push(format!(
                        "{item} spline calibrator does not have at least 2 points"
                    ));
                    return None;
                }
                let y = numeric(cal, item, warnings)?;
                match segment_for(points, y, |p| p.calibrated, *extrapolate) {
                    Some((a, b)) => Some(Value::Double(lerp(
                        y,
                        a.calibrated,
                        b.calibrated,
                        a.raw,
                        b.raw,
                        item,
                        warnings,
                    )?)),
                    None => {
                        warnings.push(format!(
                            "{item} does not extrapolate and does not bound calibrated value {y}"
                        ));
                        None
                    }
                }
            }
            Calibrator::Enumeration { table } => match cal {
                Value::Text(label) => match table.value_of(label) {
                    Some(v) => Some(Value::Signed(v)),
                    None => {
                        warnings.push(format!("Invalid EU Enumeration value of '{label}'"));
                        None
                    }
                },
                // numeric input is taken as already uncalibrated
                _ => Some(cal.clone()),
            },
            Calibrator::MathOperation => {
                warnings.push(format!(
                    "{item} math operation calibrators are not yet supported"
                ));
                Some(cal.clone())
            }
        }
    }
}

/// A calibrator guarded by a condition on other items' current values.
/// Context calibrators are tried before the type's default calibrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCalibrator {
    pub condition: Vec<Comparison>,
    pub calibrator: Calibrator,
}

impl ContextCalibrator {
    #[must_use]
    pub fn applies(&self, lookup: &dyn ValueLookup) -> bool {
        all_hold(&self.condition, lookup)
    }
}

fn numeric(value: &Value, item: &str, warnings: &mut Warnings) -> Option<f64> {
    let v = value.as_f64();
    if v.is_none() {
        warnings.push(format!("{item} value '{value}' is not a usable number"));
    }
    v
}

fn invert_polynomial(
    terms: &[PolyTerm],
    y: f64,
    item: &str,
    valid_range: Option<&ValidRange>,
    warnings: &mut Warnings,
) -> Option<Value> {
    let degree = terms.iter().map(|t| t.exponent).max().unwrap_or(0);
    if degree > 2 {
        warnings.push(format!(
            "{item} exponent greater than 2 encountered; 2 is the maximum uncalibration exponent supported"
        ));
        return Some(Value::Double(y));
    }

    let mut c = [0f64; 3];
    for t in terms {
        c[t.exponent as usize] += t.coefficient;
    }

    if c[2] == 0.0 {
        if c[1] == 0.0 {
            // constant polynomial carries no information to invert
            if y == c[0] {
                return Some(Value::Double(0.0));
            }
            warnings.push(format!(
                "{item} constant calibrator cannot uncalibrate value {y}"
            ));
            return None;
        }
        return Some(Value::Double((y - c[0]) / c[1]));
    }

    let discriminant = c[1] * c[1] - 4.0 * c[2] * (c[0] - y);
    if discriminant < 0.0 {
        warnings.push(format!(
            "{item} no real roots exist to uncalibrate value {y}"
        ));
        return None;
    }
    let sq = discriminant.sqrt();
    let r1 = (-c[1] - sq) / (2.0 * c[2]);
    let r2 = (-c[1] + sq) / (2.0 * c[2]);
    Some(Value::Double(pick_root(r1, r2, valid_range)))
}

/// Root selection policy for quadratic inversion: a root inside the
/// declared uncalibrated valid range wins, then a non-negative root, then
/// the smaller root. Deterministic for identical inputs.
fn pick_root(r1: f64, r2: f64, valid_range: Option<&ValidRange>) -> f64 {
    let uncal_range = valid_range.filter(|r| !r.calibrated);
    let (in1, in2) = match uncal_range {
        Some(r) => (r.contains(r1), r.contains(r2)),
        None => (true, true),
    };
    match (in1, in2) {
        (true, false) => return r1,
        (false, true) => return r2,
        _ => {}
    }
    match (r1 >= 0.0, r2 >= 0.0) {
        (true, false) => r1,
        (false, true) => r2,
        _ => r1.min(r2),
    }
}

/// Find the knot pair enclosing `x` along the axis given by `key`, assuming
/// knots ordered along that axis. With extrapolation the outermost segment
/// is used for out-of-bounds input.
fn segment_for<F>(
    points: &[SplinePoint],
    x: f64,
    key: F,
    extrapolate: bool,
) -> Option<(&SplinePoint, &SplinePoint)>
where
    F: Fn(&SplinePoint) -> f64,
{
    for pair in points.windows(2) {
        let (lo, hi) = (key(&pair[0]), key(&pair[1]));
        if (lo..=hi).contains(&x) || (hi..=lo).contains(&x) {
            return Some((&pair[0], &pair[1]));
        }
    }
    if extrapolate {
        let first = (&points[0], &points[1]);
        let last = (&points[points.len() - 2], &points[points.len() - 1]);
        let ascending = key(first.0) <= key(last.1);
        return Some(if (x < key(first.0)) == ascending {
            first
        } else {
            last
        });
    }
    None
}

fn lerp(
    x: f64,
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    item: &str,
    warnings: &mut Warnings,
) -> Option<f64> {
    if x1 == x0 {
        if y0 == y1 {
            return Some(y0);
        }
        warnings.push(format!(
            "{item} spline segment is degenerate at {x0} and cannot map value {x}"
        ));
        return None;
    }
    Some(y0 + (x - x0) * (y1 - y0) / (x1 - x0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(coeffs: &[(f64, u32)]) -> Calibrator {
        Calibrator::Polynomial {
            terms: coeffs.iter().map(|&(c, e)| PolyTerm::new(c, e)).collect(),
        }
    }

    #[test]
    fn linear_polynomial_roundtrip() {
        // cal = 10 + 2*uncal
        let cal = poly(&[(10.0, 0), (2.0, 1)]);
        let mut w = Warnings::new();
        assert_eq!(
            cal.calibrate(&Value::Signed(5), "x", &mut w),
            Some(Value::Double(20.0))
        );
        assert_eq!(
            cal.uncalibrate(&Value::Double(20.0), "x", None, &mut w),
            Some(Value::Double(5.0))
        );
        assert!(w.is_empty());
    }

    #[test]
    fn quadratic_single_root() {
        // cal = 3 + 2*x + x^2; cal=2 has the double root x=-1
        let cal = poly(&[(3.0, 0), (2.0, 1), (1.0, 2)]);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(2.0), "x", None, &mut w);
        assert_eq!(zult, Some(Value::Double(-1.0)));
        assert!(w.is_empty());
    }

    #[test]
    fn quadratic_no_real_roots_warns() {
        let cal = poly(&[(3.0, 0), (2.0, 1), (1.0, 2)]);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(-1.0), "x", None, &mut w);
        assert_eq!(zult, None);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("no real roots"), "{}", w[0]);
    }

    #[test]
    fn quadratic_two_roots_prefers_non_negative() {
        // cal = x^2 - 4: cal=0 has roots -2 and 2
        let cal = poly(&[(-4.0, 0), (1.0, 2)]);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(0.0), "x", None, &mut w);
        assert_eq!(zult, Some(Value::Double(2.0)));
    }

    #[test]
    fn quadratic_two_roots_prefers_in_range() {
        // cal = x^2 - 3x: cal=0 has roots 0 and 3; range restricts to [2, 5]
        let cal = poly(&[(-3.0, 1), (1.0, 2)]);
        let range = ValidRange {
            calibrated: false,
            ..ValidRange::inclusive(2.0, 5.0)
        };
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(0.0), "x", Some(&range), &mut w);
        assert_eq!(zult, Some(Value::Double(3.0)));
    }

    #[test]
    fn quadratic_both_negative_picks_smaller() {
        // cal = x^2 + 5x + 6: cal=0 has roots -2 and -3
        let cal = poly(&[(6.0, 0), (5.0, 1), (1.0, 2)]);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(0.0), "x", None, &mut w);
        assert_eq!(zult, Some(Value::Double(-3.0)));
    }

    #[test]
    fn cubic_inversion_unsupported() {
        let cal = poly(&[(1.0, 3)]);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(8.0), "x", None, &mut w);
        assert_eq!(zult, Some(Value::Double(8.0)), "input passes through");
        assert_eq!(w.len(), 1);
        assert!(
            w[0].contains("maximum uncalibration exponent supported"),
            "{}",
            w[0]
        );
    }

    #[test]
    fn empty_polynomial_warns() {
        let cal = poly(&[]);
        let mut w = Warnings::new();
        assert_eq!(cal.calibrate(&Value::Signed(1), "x", &mut w), None);
        assert!(w[0].contains("no terms specified"), "{}", w[0]);
    }

    fn spline(points: &[(f64, f64)], extrapolate: bool) -> Calibrator {
        Calibrator::Spline {
            points: points
                .iter()
                .map(|&(raw, calibrated)| SplinePoint { raw, calibrated })
                .collect(),
            extrapolate,
        }
    }

    #[test]
    fn spline_interpolates_between_knots() {
        let cal = spline(&[(0.0, 0.0), (10.0, 100.0), (20.0, 150.0)], false);
        let mut w = Warnings::new();
        assert_eq!(
            cal.calibrate(&Value::Double(5.0), "x", &mut w),
            Some(Value::Double(50.0))
        );
        assert_eq!(
            cal.calibrate(&Value::Double(15.0), "x", &mut w),
            Some(Value::Double(125.0))
        );
        assert_eq!(
            cal.uncalibrate(&Value::Double(125.0), "x", None, &mut w),
            Some(Value::Double(15.0))
        );
        assert!(w.is_empty());
    }

    #[test]
    fn spline_out_of_bounds_without_extrapolation_warns() {
        let cal = spline(&[(0.0, 0.0), (10.0, 100.0)], false);
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Double(150.0), "x", None, &mut w);
        assert_eq!(zult, None);
        assert!(
            w[0].contains("does not extrapolate and does not bound calibrated value"),
            "{}",
            w[0]
        );
    }

    #[test]
    fn spline_extrapolates_when_allowed() {
        let cal = spline(&[(0.0, 0.0), (10.0, 100.0)], true);
        let mut w = Warnings::new();
        assert_eq!(
            cal.calibrate(&Value::Double(20.0), "x", &mut w),
            Some(Value::Double(200.0))
        );
        assert_eq!(
            cal.uncalibrate(&Value::Double(-50.0), "x", None, &mut w),
            Some(Value::Double(-5.0))
        );
        assert!(w.is_empty());
    }

    #[test]
    fn spline_with_one_point_warns() {
        let cal = spline(&[(0.0, 0.0)], false);
        let mut w = Warnings::new();
        assert_eq!(cal.calibrate(&Value::Double(0.0), "x", &mut w), None);
        assert!(w[0].contains("at least 2 points"), "{}", w[0]);
    }

    #[test]
    fn enumeration_both_directions() {
        let cal = Calibrator::Enumeration {
            table: EnumTable::new([("TEST", 1), ("NEGNUM", -2)]),
        };
        let mut w = Warnings::new();
        assert_eq!(
            cal.calibrate(&Value::Signed(-2), "x", &mut w),
            Some(Value::Text("NEGNUM".into()))
        );
        assert_eq!(
            cal.uncalibrate(&Value::Text("TEST".into()), "x", None, &mut w),
            Some(Value::Signed(1))
        );
        assert!(w.is_empty());
    }

    #[test]
    fn enumeration_unknown_label_warns() {
        let cal = Calibrator::Enumeration {
            table: EnumTable::new([("TEST", 1)]),
        };
        let mut w = Warnings::new();
        let zult = cal.uncalibrate(&Value::Text("BOGUS".into()), "x", None, &mut w);
        assert_eq!(zult, None);
        assert_eq!(w, vec!["Invalid EU Enumeration value of 'BOGUS'".to_string()]);
    }

    #[test]
    fn math_operation_passes_through_with_warning() {
        let cal = Calibrator::MathOperation;
        let mut w = Warnings::new();
        let zult = cal.calibrate(&Value::Double(7.0), "x", &mut w);
        assert_eq!(zult, Some(Value::Double(7.0)));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn context_calibrator_guard() {
        use crate::value::{CompareOp, NoLookup};
        let ctx = ContextCalibrator {
            condition: vec![Comparison::new("Mode", CompareOp::Eq, 1i64)],
            calibrator: Calibrator::MathOperation,
        };
        // unresolved guard never applies
        assert!(!ctx.applies(&NoLookup));
    }
}
