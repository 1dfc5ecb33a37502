//! Load Balancer Service
//!
//! Pure selection logic for picking a host by weight.
//! This service has NO I/O and no randomness of its own: callers pass the
//! random roll in, which keeps selection reproducible in tests.

/// Outcome of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Picked with probability proportional to weight.
    Weighted(usize),
    /// Every weight was zero; picked uniformly among all candidates.
    Fallback(usize),
}

impl Selection {
    pub fn index(&self) -> usize {
        match self {
            Selection::Weighted(i) | Selection::Fallback(i) => *i,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Selection::Fallback(_))
    }
}

/// Weighted random selection over a stable ordering of candidates.
///
/// Candidates with weight `<= 0` (or a non-finite weight) are never picked
/// while at least one candidate has a positive weight. Among the rest the
/// cumulative weights are laid out in input order and the roll is located
/// with a binary search, so equal rolls always give equal picks.
pub struct WeightedSelector;

impl WeightedSelector {
    /// Pick an index from `weights` given `roll` in `[0, 1)`.
    ///
    /// # Returns
    /// `None` only when `weights` is empty.
    ///
    /// # Example
    /// ```ignore
    /// let pick = WeightedSelector::pick(&[2.0, 0.0, 1.0], 0.5);
    /// assert_eq!(pick, Some(Selection::Weighted(0)));
    /// ```
    pub fn pick(weights: &[f64], roll: f64) -> Option<Selection> {
        if weights.is_empty() {
            return None;
        }
        let roll = if roll.is_finite() { roll.clamp(0.0, 1.0) } else { 0.0 };

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut indices = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for (i, w) in weights.iter().enumerate() {
            if Self::is_routable(*w) {
                total += *w;
                cumulative.push(total);
                indices.push(i);
            }
        }

        if indices.is_empty() {
            let i = ((roll * weights.len() as f64) as usize).min(weights.len() - 1);
            return Some(Selection::Fallback(i));
        }

        let target = roll * total;
        let pos = cumulative
            .partition_point(|c| *c <= target)
            .min(indices.len() - 1);
        Some(Selection::Weighted(indices[pos]))
    }

    /// Whether a weight makes its candidate eligible for weighted picks.
    pub fn is_routable(weight: f64) -> bool {
        weight.is_finite() && weight > 0.0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    // ===== Weighted Selection Tests =====

    #[test]
    fn test_pick_empty() {
        assert_eq!(WeightedSelector::pick(&[], 0.3), None);
    }

    #[test]
    fn test_pick_single() {
        assert_eq!(WeightedSelector::pick(&[3.0], 0.0), Some(Selection::Weighted(0)));
        assert_eq!(WeightedSelector::pick(&[3.0], 0.999), Some(Selection::Weighted(0)));
    }

    #[test]
    fn test_pick_boundaries() {
        // cumulative: [2, 2(skip), 3]
        let weights = [2.0, 0.0, 1.0];
        assert_eq!(WeightedSelector::pick(&weights, 0.0).unwrap().index(), 0);
        assert_eq!(WeightedSelector::pick(&weights, 0.66).unwrap().index(), 0);
        assert_eq!(WeightedSelector::pick(&weights, 0.67).unwrap().index(), 2);
        assert_eq!(WeightedSelector::pick(&weights, 0.9999).unwrap().index(), 2);
    }

    #[test]
    fn test_pick_roll_of_one_stays_in_range() {
        assert_eq!(WeightedSelector::pick(&[1.0, 1.0], 1.0).unwrap().index(), 1);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let weights = [2.0, 0.0, 1.0];
        let mut counts = [0usize; 3];
        let steps = 30_000;
        for step in 0..steps {
            let roll = step as f64 / steps as f64;
            counts[WeightedSelector::pick(&weights, roll).unwrap().index()] += 1;
        }
        assert_eq!(counts[1], 0);
        let ratio = counts[0] as f64 / counts[2] as f64;
        assert!((ratio - 2.0).abs() < 0.01, "ratio was {ratio}");
    }

    #[test]
    fn test_negative_and_nan_weights_skipped() {
        let weights = [-1.0, f64::NAN, 0.5];
        for roll in [0.0, 0.4, 0.99] {
            assert_eq!(
                WeightedSelector::pick(&weights, roll),
                Some(Selection::Weighted(2))
            );
        }
    }

    #[test]
    fn test_all_zero_falls_back_uniformly() {
        let weights = [0.0, 0.0, 0.0, 0.0];
        let picks: Vec<Selection> = [0.0, 0.26, 0.51, 0.99]
            .iter()
            .map(|r| WeightedSelector::pick(&weights, *r).unwrap())
            .collect();
        assert!(picks.iter().all(Selection::is_fallback));
        let indices: Vec<usize> = picks.iter().map(Selection::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deterministic_for_equal_rolls() {
        let weights = [1.0, 4.0, 2.5];
        for roll in [0.1, 0.5, 0.8] {
            assert_eq!(
                WeightedSelector::pick(&weights, roll),
                WeightedSelector::pick(&weights, roll)
            );
        }
    }
}
