/// A bag of closed 1D intervals, used to size the vacuum between groups of atoms.
#[derive(Debug, Clone, Default)]
pub struct Intervals {
    intervals: Vec<(f64, f64)>,
}

impl Intervals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut out = Self::new();
        for (start, end) in intervals {
            out.add_interval(start, end);
        }
        out
    }

    pub fn add_interval(&mut self, start: f64, end: f64) {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        self.intervals.push((lo, hi));
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Overlapping or touching intervals fused into disjoint blocks, sorted by start.
    pub fn merged(&self) -> Vec<(f64, f64)> {
        let mut sorted = self.intervals.clone();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged = Vec::new();
        if let Some(first) = sorted.first() {
            let mut current_start = first.0;
            let mut current_end = first.1;

            for next in sorted.iter().skip(1) {
                if next.0 <= current_end {
                    current_end = current_end.max(next.1);
                } else {
                    merged.push((current_start, current_end));
                    current_start = next.0;
                    current_end = next.1;
                }
            }
            merged.push((current_start, current_end));
        }
        merged
    }

    /// The widest empty span between two merged blocks, as (end of lower, start of upper).
    pub fn largest_gap(&self) -> Option<(f64, f64)> {
        self.merged()
            .windows(2)
            .map(|w| (w[0].1, w[1].0))
            .max_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
    }

    /// Width of [`largest_gap`](Self::largest_gap), zero when there is no gap.
    pub fn max_distance_between(&self) -> f64 {
        self.largest_gap().map(|(lo, hi)| hi - lo).unwrap_or(0.0)
    }

    /// Total length covered once overlaps are removed.
    pub fn total_length(&self) -> f64 {
        self.merged().iter().map(|(lo, hi)| hi - lo).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn merges_overlaps_and_reports_the_widest_gap() {
        let intervals =
            Intervals::from_intervals([(5.0, 6.0), (0.0, 2.0), (1.5, 3.0), (10.0, 11.0)]);
        assert_eq!(intervals.merged(), vec![(0.0, 3.0), (5.0, 6.0), (10.0, 11.0)]);
        assert_eq!(intervals.largest_gap(), Some((6.0, 10.0)));
        assert_relative_eq!(intervals.max_distance_between(), 4.0);
        assert_relative_eq!(intervals.total_length(), 5.0);
    }

    #[test]
    fn reversed_bounds_are_normalized() {
        let intervals = Intervals::from_intervals([(3.0, 1.0)]);
        assert_eq!(intervals.merged(), vec![(1.0, 3.0)]);
        assert_eq!(intervals.largest_gap(), None);
        assert_eq!(intervals.max_distance_between(), 0.0);
    }

    #[test]
    fn touching_intervals_leave_no_gap() {
        let intervals = Intervals::from_intervals([(0.0, 1.0), (1.0, 2.0), (4.0, 5.0)]);
        assert_eq!(intervals.merged(), vec![(0.0, 2.0), (4.0, 5.0)]);
        assert_eq!(intervals.largest_gap(), Some((2.0, 4.0)));
    }
}
