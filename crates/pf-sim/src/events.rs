//! Sign-change detection over per-cell event signals.

use pf_core::sign;

/// Remembers the previous event signals and flags sign flips.
///
/// Signals are laid out `[event][cell]`, flattened event-major.
#[derive(Debug, Clone)]
pub struct EventTracker {
    n_events: usize,
    n_cells: usize,
    last: Option<Vec<f64>>,
    change: Vec<bool>,
}

impl EventTracker {
    pub fn new(n_events: usize, n_cells: usize) -> Self {
        Self {
            n_events,
            n_cells,
            last: None,
            change: vec![false; n_events * n_cells],
        }
    }

    /// Record `signals` and report whether any element changed sign.
    ///
    /// The first observation only records.
    pub fn observe(&mut self, signals: Vec<f64>) -> bool {
        debug_assert_eq!(signals.len(), self.n_events * self.n_cells);
        let fired = match &self.last {
            None => {
                self.change.fill(false);
                false
            }
            Some(prev) => {
                let mut any = false;
                for ((flag, &new), &old) in self.change.iter_mut().zip(&signals).zip(prev) {
                    *flag = sign(new) * sign(old) < 0.0;
                    any |= *flag;
                }
                any
            }
        };
        self.last = Some(signals);
        fired
    }

    /// Per-event, per-cell flags from the latest observation.
    pub fn changes(&self) -> Vec<Vec<bool>> {
        if self.n_cells == 0 {
            return vec![Vec::new(); self.n_events];
        }
        self.change
            .chunks(self.n_cells)
            .map(<[bool]>::to_vec)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_observation_is_silent() {
        let mut t = EventTracker::new(1, 2);
        assert!(!t.observe(vec![-1.0, 1.0]));
        assert_eq!(t.changes(), vec![vec![false, false]]);
    }

    #[test]
    fn flip_is_reported_per_cell() {
        let mut t = EventTracker::new(2, 2);
        t.observe(vec![1.0, 1.0, 0.5, 0.5]);
        assert!(t.observe(vec![1.0, -1.0, 0.5, 0.5]));
        assert_eq!(t.changes(), vec![vec![false, true], vec![false, false]]);
        assert!(!t.observe(vec![1.0, -2.0, 0.4, 0.4]));
    }

    #[test]
    fn touching_zero_is_not_a_flip() {
        let mut t = EventTracker::new(1, 1);
        t.observe(vec![1.0]);
        assert!(!t.observe(vec![0.0]));
        assert!(!t.observe(vec![-1.0]));
    }

    proptest! {
        #[test]
        fn any_strict_sign_flip_fires(a in 1e-9f64..1e3, b in 1e-9f64..1e3, neg_first in any::<bool>()) {
            let (first, second) = if neg_first { (-a, b) } else { (a, -b) };
            let mut t = EventTracker::new(1, 1);
            prop_assert!(!t.observe(vec![first]));
            prop_assert!(t.observe(vec![second]));
        }
    }
}
