use crate::error::{LTResult, LifeTableError};
use std::fmt;

/// Half-open age interval `[start, end)` in years. `end` is infinite for the
/// terminal (open-ended) age group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeInterval {
    pub start: f64,
    pub end: f64,
}

impl AgeInterval {
    pub fn new(start: f64, end: f64) -> LTResult<Self> {
        if !start.is_finite() || end.is_nan() || start >= end {
            return Err(LifeTableError::config(format!(
                "invalid age interval [{start}, {end}): start must be finite and below end"
            )));
        }
        Ok(Self { start, end })
    }

    /// Terminal interval `[start, ∞)`.
    pub fn open(start: f64) -> LTResult<Self> {
        Self::new(start, f64::INFINITY)
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_terminal(&self) -> bool {
        self.end.is_infinite()
    }

    /// Whether `other` lies entirely within this interval.
    pub fn covers(&self, other: &AgeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for AgeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_terminal() {
            write!(f, "age {}+", self.start)
        } else {
            write!(f, "age {}-{}", self.start, self.end)
        }
    }
}

/// Target sequence of age intervals for aggregation or disaggregation.
///
/// Holds the same invariants as the intervals of one life table group:
/// contiguous, ascending, and ending with an open-ended interval.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeMapping {
    intervals: Vec<AgeInterval>,
}

impl AgeMapping {
    pub fn new(intervals: Vec<AgeInterval>) -> LTResult<Self> {
        let issues = interval_issues(&intervals);
        if !issues.is_empty() {
            return Err(LifeTableError::config(format!(
                "invalid age mapping: {}",
                issues.join("; ")
            )));
        }
        Ok(Self { intervals })
    }

    /// Build from ascending start ages; the last interval is open-ended.
    ///
    /// # Example
    /// ```rust
    /// # use rslifetable::prelude::*;
    /// let mapping = AgeMapping::from_starts(&[0.0, 1.0, 5.0, 10.0])?;
    /// assert_eq!(mapping.len(), 4);
    /// assert!(mapping.intervals()[3].is_terminal());
    /// # LTResult::Ok(())
    /// ```
    pub fn from_starts(starts: &[f64]) -> LTResult<Self> {
        let ends = gen_age_end(starts)?;
        let intervals = starts
            .iter()
            .zip(ends)
            .map(|(&start, end)| AgeInterval::new(start, end))
            .collect::<LTResult<Vec<_>>>()?;
        Self::new(intervals)
    }

    /// Single-year groups `0-1, 1-2, …` closed by `terminal+`.
    pub fn single_year(terminal: u32) -> LTResult<Self> {
        let starts: Vec<f64> = (0..=terminal).map(f64::from).collect();
        Self::from_starts(&starts)
    }

    /// Standard abridged groups `0-1, 1-5, 5-10, …` closed by `terminal+`.
    ///
    /// `terminal` must be a multiple of 5 of at least 5. With `terminal = 105`
    /// this gives the usual 23 groups.
    pub fn abridged(terminal: u32) -> LTResult<Self> {
        if terminal < 5 || terminal % 5 != 0 {
            return Err(LifeTableError::config(format!(
                "abridged terminal age must be a multiple of 5 and at least 5, got {terminal}"
            )));
        }
        let mut starts = vec![0.0, 1.0];
        starts.extend((1..=terminal / 5).map(|k| f64::from(5 * k)));
        Self::from_starts(&starts)
    }

    pub fn intervals(&self) -> &[AgeInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn starts(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.start).collect()
    }
}

/// Derive interval end ages from ascending start ages, closing with infinity.
pub fn gen_age_end(starts: &[f64]) -> LTResult<Vec<f64>> {
    if starts.is_empty() {
        return Err(LifeTableError::config("no start ages supplied"));
    }
    if let Some(w) = starts.windows(2).find(|w| w[0] >= w[1]) {
        return Err(LifeTableError::config(format!(
            "start ages must be strictly ascending, found {} before {}",
            w[0], w[1]
        )));
    }
    let mut ends: Vec<f64> = starts[1..].to_vec();
    ends.push(f64::INFINITY);
    Ok(ends)
}

/// Interval lengths, infinite for the open-ended group.
pub fn gen_age_length(intervals: &[AgeInterval]) -> Vec<f64> {
    intervals.iter().map(AgeInterval::length).collect()
}

/// Contiguity and coverage problems of an interval sequence, empty when sound.
pub(crate) fn interval_issues(intervals: &[AgeInterval]) -> Vec<String> {
    let mut issues = Vec::new();
    let Some(last) = intervals.last() else {
        issues.push("no age intervals".to_string());
        return issues;
    };

    for pair in intervals.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.start < prev.start {
            issues.push(format!("ages not ascending: {next} follows {prev}"));
        } else if next.start == prev.start {
            issues.push(format!("duplicate interval starting at age {}", prev.start));
        } else if next.start > prev.end {
            issues.push(format!("gap between {prev} and {next}"));
        } else if next.start < prev.end {
            issues.push(format!("{prev} overlaps {next}"));
        }
    }
    if let Some(open) = intervals[..intervals.len() - 1]
        .iter()
        .find(|i| i.is_terminal())
    {
        issues.push(format!("open-ended {open} is not the last interval"));
    }
    if !last.is_terminal() {
        issues.push(format!("last interval {last} is not open-ended"));
    }
    issues
}

// ================================================
// UNIT TESTS
// ================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_basics() {
        let i = AgeInterval::new(1.0, 5.0).unwrap();
        assert_eq!(i.length(), 4.0);
        assert!(!i.is_terminal());
        assert_eq!(i.to_string(), "age 1-5");

        let t = AgeInterval::open(85.0).unwrap();
        assert!(t.is_terminal());
        assert!(t.length().is_infinite());
        assert_eq!(t.to_string(), "age 85+");
        assert!(t.covers(&AgeInterval::new(90.0, 95.0).unwrap()));

        assert!(AgeInterval::new(5.0, 5.0).is_err());
    }

    #[test]
    fn test_abridged_mapping() {
        let mapping = AgeMapping::abridged(105).unwrap();
        assert_eq!(mapping.len(), 23);
        let starts = mapping.starts();
        assert_eq!(&starts[..4], &[0.0, 1.0, 5.0, 10.0]);
        assert_eq!(*starts.last().unwrap(), 105.0);
        assert!(AgeMapping::abridged(103).is_err());
    }

    #[test]
    fn test_single_year_mapping() {
        let mapping = AgeMapping::single_year(110).unwrap();
        assert_eq!(mapping.len(), 111);
        assert_eq!(mapping.intervals()[110], AgeInterval::open(110.0).unwrap());
    }

    #[test]
    fn test_gen_age_end() {
        let ends = gen_age_end(&[0.0, 1.0, 5.0]).unwrap();
        assert_eq!(ends[..2], [1.0, 5.0]);
        assert!(ends[2].is_infinite());
        assert!(gen_age_end(&[0.0, 5.0, 1.0]).unwrap_err().is_config());

        let mapping = AgeMapping::from_starts(&[0.0, 1.0, 5.0]).unwrap();
        let lengths = gen_age_length(mapping.intervals());
        assert_eq!(lengths[..2], [1.0, 4.0]);
        assert!(lengths[2].is_infinite());
    }

    #[test]
    fn test_interval_issues_reports_each_problem() {
        let intervals = vec![
            AgeInterval::new(0.0, 1.0).unwrap(),
            AgeInterval::new(2.0, 5.0).unwrap(),
            AgeInterval::new(5.0, 10.0).unwrap(),
        ];
        let issues = interval_issues(&intervals);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("gap"));
        assert!(issues[1].contains("not open-ended"));
    }

    #[test]
    fn test_mapping_rejects_overlap() {
        let intervals = vec![
            AgeInterval::new(0.0, 5.0).unwrap(),
            AgeInterval::open(1.0).unwrap(),
        ];
        assert!(AgeMapping::new(intervals).unwrap_err().is_config());
    }
}
