use std::fmt;

use crate::constants::RecoveryReport;
use crate::recovery::MatchRecord;

fn count(report: &RecoveryReport, pred: impl Fn(&MatchRecord) -> bool) -> usize {
    report.values().filter(|r| pred(r)).count()
}

/// Completeness summary of a [`RecoveryReport`].
///
/// Display is compact by default; `{:#}` prints an aligned multi-line table:
///
/// ```text
/// Recovery summary
/// ----------------
/// orbits            : 12
/// in catalog        : 11
/// findable          : 10
/// point matched     : 9
/// line matched      : 9
/// ambiguous         : 1
/// mean completeness : 0.817
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryStats {
    pub orbits: usize,
    /// Orbits whose every fake was found in the raw catalog.
    pub catalog_complete: usize,
    pub findable: usize,
    /// Orbits with at least one matched cluster member.
    pub point_matched: usize,
    /// Orbits with at least one matching cluster track.
    pub line_matched: usize,
    pub ambiguous: usize,
    /// Mean over orbits of the best per-cluster line completeness.
    pub mean_line_completeness: f64,
}

impl RecoveryStats {
    /// `None` for an empty report.
    pub fn from_report(report: &RecoveryReport) -> Option<Self> {
        if report.is_empty() {
            return None;
        }
        Some(RecoveryStats {
            orbits: report.len(),
            catalog_complete: count(report, |r| r.catalog.is_complete()),
            findable: count(report, |r| r.kinematics.findable),
            point_matched: count(report, |r| r.best_point_match().is_some()),
            line_matched: count(report, |r| !r.line.is_empty()),
            ambiguous: count(report, |r| r.is_ambiguous()),
            mean_line_completeness: report
                .values()
                .map(|r| r.best_line_completeness())
                .sum::<f64>()
                / report.len() as f64,
        })
    }
}

impl fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Recovery summary")?;
            writeln!(f, "----------------")?;
            writeln!(f, "orbits            : {}", self.orbits)?;
            writeln!(f, "in catalog        : {}", self.catalog_complete)?;
            writeln!(f, "findable          : {}", self.findable)?;
            writeln!(f, "point matched     : {}", self.point_matched)?;
            writeln!(f, "line matched      : {}", self.line_matched)?;
            writeln!(f, "ambiguous         : {}", self.ambiguous)?;
            write!(f, "mean completeness : {:.3}", self.mean_line_completeness)
        } else {
            write!(
                f,
                "orbits={}, in_catalog={}, findable={}, point={}, line={}, ambiguous={}, completeness={:.3}",
                self.orbits,
                self.catalog_complete,
                self.findable,
                self.point_matched,
                self.line_matched,
                self.ambiguous,
                self.mean_line_completeness
            )
        }
    }
}
