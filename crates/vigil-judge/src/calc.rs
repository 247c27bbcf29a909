//! Window calculations.
//!
//! Every calculation reduces a newest-first window of samples, a threshold
//! and a comparison operator to a representative value and a triggered flag.

use crate::compare::CompareOp;
use crate::error::{CalcError, ParseError};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcKind {
    All,
    Diff,
    DiffAvg,
    ADiff,
    ADiffAvg,
    RDiff,
    RDiffAvg,
    PDiff,
    PDiffAvg,
    Sum,
    Avg,
    Have,
}

impl FromStr for CalcKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "diff" => Ok(Self::Diff),
            "diffavg" => Ok(Self::DiffAvg),
            "adiff" => Ok(Self::ADiff),
            "adiffavg" => Ok(Self::ADiffAvg),
            "rdiff" => Ok(Self::RDiff),
            "rdiffavg" => Ok(Self::RDiffAvg),
            "pdiff" => Ok(Self::PDiff),
            "pdiffavg" => Ok(Self::PDiffAvg),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "have" => Ok(Self::Have),
            other => Err(ParseError::UnknownCalculation(other.to_string())),
        }
    }
}

impl std::fmt::Display for CalcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calculation {
    pub value: f64,
    pub triggered: bool,
}

impl Calculation {
    fn new(value: f64, triggered: bool) -> Self {
        Self { value, triggered }
    }
}

/// The four ways a difference series is derived from a window.
#[derive(Debug, Clone, Copy)]
enum DiffMode {
    /// `w[0] - w[i]`
    FromNewest,
    /// `|w[0] - w[i]|`
    AbsFromNewest,
    /// `w[i-1] - w[i]`
    Consecutive,
    /// `(w[i-1] - w[i]) / min(w[i-1], w[i]) * 100`
    Percent,
}

impl CalcKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Diff => "diff",
            Self::DiffAvg => "diffavg",
            Self::ADiff => "adiff",
            Self::ADiffAvg => "adiffavg",
            Self::RDiff => "rdiff",
            Self::RDiffAvg => "rdiffavg",
            Self::PDiff => "pdiff",
            Self::PDiffAvg => "pdiffavg",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Have => "have",
        }
    }

    /// Whether the calculation works on differences between samples and
    /// therefore needs one more raw sample than its configured window.
    pub fn is_difference(&self) -> bool {
        !matches!(self, Self::All | Self::Sum | Self::Avg | Self::Have)
    }

    /// Runs the calculation. `window[0]` is the most recent sample.
    pub fn calculate(
        &self,
        window: &[f64],
        threshold: f64,
        op: CompareOp,
        extra: Option<i64>,
    ) -> Result<Calculation, CalcError> {
        if window.is_empty() {
            return Err(CalcError::EmptyWindow);
        }
        match self {
            Self::All => Ok(calculate_all(window, threshold, op)),
            Self::Sum => {
                let sum: f64 = window.iter().sum();
                Ok(Calculation::new(sum, op.compare(sum, threshold)))
            }
            Self::Avg => {
                let avg = mean(window);
                Ok(Calculation::new(avg, op.compare(avg, threshold)))
            }
            Self::Have => {
                let need = extra.ok_or(CalcError::MissingArgument("have"))?;
                Ok(calculate_have(window, threshold, op, need))
            }
            Self::Diff => self.every(window, DiffMode::FromNewest, threshold, op),
            Self::ADiff => self.every(window, DiffMode::AbsFromNewest, threshold, op),
            Self::RDiff => self.every(window, DiffMode::Consecutive, threshold, op),
            Self::PDiff => self.every(window, DiffMode::Percent, threshold, op),
            Self::DiffAvg => self.average(window, DiffMode::FromNewest, threshold, op, false),
            Self::ADiffAvg => self.average(window, DiffMode::FromNewest, threshold, op, true),
            Self::RDiffAvg => self.average(window, DiffMode::Consecutive, threshold, op, false),
            Self::PDiffAvg => self.average(window, DiffMode::Percent, threshold, op, false),
        }
    }

    fn every(
        &self,
        window: &[f64],
        mode: DiffMode,
        threshold: f64,
        op: CompareOp,
    ) -> Result<Calculation, CalcError> {
        let diffs = differences(window, mode, self.name())?;
        let first_hit = diffs.iter().position(|d| op.compare(*d, threshold));
        let triggered = diffs.iter().all(|d| op.compare(*d, threshold));
        Ok(Calculation::new(diffs[first_hit.unwrap_or(0)], triggered))
    }

    fn average(
        &self,
        window: &[f64],
        mode: DiffMode,
        threshold: f64,
        op: CompareOp,
        absolute: bool,
    ) -> Result<Calculation, CalcError> {
        let diffs = differences(window, mode, self.name())?;
        let mut avg = mean(&diffs);
        if absolute {
            avg = avg.abs();
        }
        Ok(Calculation::new(avg, op.compare(avg, threshold)))
    }
}

/// Raw samples a window must hold for a calculation configured with
/// `limit` samples.
///
/// # Examples
///
/// ```
/// use vigil_judge::calc::{calculate_limit, CalcKind};
///
/// assert_eq!(calculate_limit(5, CalcKind::Diff), 6);
/// assert_eq!(calculate_limit(5, CalcKind::Avg), 5);
/// ```
pub fn calculate_limit(limit: usize, kind: CalcKind) -> usize {
    if kind.is_difference() {
        limit.saturating_add(1)
    } else {
        limit
    }
}

fn calculate_all(window: &[f64], threshold: f64, op: CompareOp) -> Calculation {
    match window.iter().find(|v| !op.compare(**v, threshold)) {
        Some(failed) => Calculation::new(*failed, false),
        None => Calculation::new(window[0], true),
    }
}

fn calculate_have(window: &[f64], threshold: f64, op: CompareOp, need: i64) -> Calculation {
    let count = window.iter().filter(|v| op.compare(**v, threshold)).count() as i64;
    let triggered = count >= need;
    let value = window
        .iter()
        .find(|v| op.compare(**v, threshold) == triggered)
        .copied()
        .unwrap_or(window[0]);
    Calculation::new(value, triggered)
}

fn differences(window: &[f64], mode: DiffMode, name: &'static str) -> Result<Vec<f64>, CalcError> {
    if window.len() < 2 {
        return Err(CalcError::NotEnoughSamples(name));
    }
    let mut diffs = Vec::with_capacity(window.len() - 1);
    for i in 1..window.len() {
        let d = match mode {
            DiffMode::FromNewest => window[0] - window[i],
            DiffMode::AbsFromNewest => (window[0] - window[i]).abs(),
            DiffMode::Consecutive => window[i - 1] - window[i],
            DiffMode::Percent => {
                let base = window[i - 1].min(window[i]);
                if base == 0.0 {
                    return Err(CalcError::ZeroDivisor { index: i });
                }
                (window[i - 1] - window[i]) / base * 100.0
            }
        };
        diffs.push(d);
    }
    Ok(diffs)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(kind: &str, window: &[f64], op: &str, threshold: f64) -> Calculation {
        let kind: CalcKind = kind.parse().unwrap();
        kind.calculate(window, threshold, op.parse().unwrap(), None)
            .unwrap()
    }

    #[test]
    fn all_reports_first_failing_sample() {
        assert_eq!(calc("all", &[5.0, 6.0, 7.0], ">", 4.0), Calculation::new(5.0, true));
        assert_eq!(calc("all", &[5.0, 3.0, 2.0], ">", 4.0), Calculation::new(3.0, false));
    }

    #[test]
    fn diff_reports_leftmost_satisfying_difference() {
        let c = calc("diff", &[9.0, 7.0, 5.0, 3.0], "<", 10.0);
        assert!(c.triggered);
        assert_eq!(c.value, 2.0);
    }

    #[test]
    fn diff_not_triggered_when_any_difference_fails() {
        // diffs: 1, 5, 8
        let c = calc("diff", &[10.0, 9.0, 5.0, 2.0], ">", 3.0);
        assert!(!c.triggered);
        assert_eq!(c.value, 5.0);
        // no difference satisfies: falls back to the first one
        let c = calc("diff", &[10.0, 9.0, 8.0], ">", 30.0);
        assert!(!c.triggered);
        assert_eq!(c.value, 1.0);
    }

    #[test]
    fn adiff_uses_absolute_differences() {
        let c = calc("adiff", &[1.0, 4.0, 6.0], ">=", 3.0);
        assert!(c.triggered);
        assert_eq!(c.value, 3.0);
    }

    #[test]
    fn rdiff_uses_consecutive_differences() {
        // consecutive diffs: 1, 4
        let c = calc("rdiff", &[10.0, 9.0, 5.0], ">", 0.5);
        assert!(c.triggered);
        assert_eq!(c.value, 1.0);
        let c = calc("rdiffavg", &[10.0, 9.0, 5.0], "=", 2.5);
        assert!(c.triggered);
        assert_eq!(c.value, 2.5);
    }

    #[test]
    fn pdiff_divides_by_smaller_sample() {
        // (150-100)/100*100 = 50, (100-50)/50*100 = 100
        let c = calc("pdiff", &[150.0, 100.0, 50.0], ">=", 50.0);
        assert!(c.triggered);
        assert_eq!(c.value, 50.0);
        let c = calc("pdiffavg", &[150.0, 100.0, 50.0], ">", 70.0);
        assert!(c.triggered);
        assert_eq!(c.value, 75.0);
    }

    #[test]
    fn pdiff_zero_divisor_is_an_error() {
        let err = CalcKind::PDiff
            .calculate(&[1.0, 0.0], 1.0, CompareOp::Greater, None)
            .unwrap_err();
        assert_eq!(err, CalcError::ZeroDivisor { index: 1 });
    }

    #[test]
    fn diffavg_and_adiffavg() {
        // diffs from newest: -2, -4
        let c = calc("diffavg", &[1.0, 3.0, 5.0], "<", 0.0);
        assert!(c.triggered);
        assert_eq!(c.value, -3.0);
        let c = calc("adiffavg", &[1.0, 3.0, 5.0], ">", 2.0);
        assert!(c.triggered);
        assert_eq!(c.value, 3.0);
    }

    #[test]
    fn sum_and_avg() {
        assert_eq!(calc("sum", &[1.0, 2.0, 3.0], ">=", 6.0), Calculation::new(6.0, true));
        assert_eq!(calc("avg", &[1.0, 2.0, 3.0], ">", 2.0), Calculation::new(2.0, false));
    }

    #[test]
    fn have_counts_satisfying_samples() {
        let window = [1.0, 8.0, 9.0, 2.0];
        let c = CalcKind::Have
            .calculate(&window, 5.0, CompareOp::Greater, Some(2))
            .unwrap();
        assert_eq!(c, Calculation::new(8.0, true));
        let c = CalcKind::Have
            .calculate(&window, 5.0, CompareOp::Greater, Some(3))
            .unwrap();
        assert_eq!(c, Calculation::new(1.0, false));
    }

    #[test]
    fn have_without_argument_is_a_distinct_error() {
        let err = CalcKind::Have
            .calculate(&[1.0], 0.0, CompareOp::Greater, None)
            .unwrap_err();
        assert_eq!(err, CalcError::MissingArgument("have"));
    }

    #[test]
    fn difference_kinds_need_two_samples() {
        let err = CalcKind::Diff
            .calculate(&[1.0], 0.0, CompareOp::Greater, None)
            .unwrap_err();
        assert_eq!(err, CalcError::NotEnoughSamples("diff"));
        assert_eq!(
            CalcKind::Sum.calculate(&[], 0.0, CompareOp::Greater, None),
            Err(CalcError::EmptyWindow)
        );
    }

    #[test]
    fn limits_for_every_kind() {
        for name in ["diff", "diffavg", "adiff", "adiffavg", "rdiff", "rdiffavg", "pdiff", "pdiffavg"] {
            let kind: CalcKind = name.parse().unwrap();
            assert_eq!(calculate_limit(3, kind), 4, "{name}");
        }
        for name in ["all", "sum", "avg", "have"] {
            let kind: CalcKind = name.parse().unwrap();
            assert_eq!(calculate_limit(3, kind), 3, "{name}");
        }
        assert!("median".parse::<CalcKind>().is_err());
    }
}
