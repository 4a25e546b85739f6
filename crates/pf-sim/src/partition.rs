//! Contiguous assignment of cells to workers.

use std::ops::Range;

use crate::error::{SimError, SimResult};

/// Maps each worker index to a contiguous, ordered range of cells.
///
/// Splits like an even array split: the first `n % w` workers take one extra
/// cell. The ranges are disjoint and cover `0..n_cells` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    ranges: Vec<Range<usize>>,
    n_cells: usize,
}

impl Partition {
    /// Split `n_cells` across `workers`, clamping the worker count to `n_cells`.
    pub fn split(n_cells: usize, workers: usize) -> SimResult<Self> {
        if n_cells == 0 {
            return Err(SimError::InvalidArg {
                what: "cannot partition an empty pack".into(),
            });
        }
        if workers == 0 {
            return Err(SimError::InvalidArg {
                what: "worker count must be at least 1".into(),
            });
        }
        let workers = workers.min(n_cells);
        let base = n_cells / workers;
        let extra = n_cells % workers;

        let mut ranges = Vec::with_capacity(workers);
        let mut start = 0;
        for w in 0..workers {
            let len = base + usize::from(w < extra);
            ranges.push(start..start + len);
            start += len;
        }
        Ok(Self { ranges, n_cells })
    }

    /// One worker owning every cell.
    pub fn single(n_cells: usize) -> SimResult<Self> {
        Self::split(n_cells, 1)
    }

    pub fn n_workers(&self) -> usize {
        self.ranges.len()
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn range(&self, worker: usize) -> Range<usize> {
        self.ranges[worker].clone()
    }

    /// The slice of a global per-cell array owned by `worker`.
    pub fn slice<'a, T>(&self, worker: usize, global: &'a [T]) -> &'a [T] {
        &global[self.range(worker)]
    }

    /// Copy a worker-local array back into its range of a global array.
    pub fn scatter<T: Copy>(&self, worker: usize, local: &[T], global: &mut [T]) {
        global[self.range(worker)].copy_from_slice(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uneven_split_front_loads_extra_cells() {
        let p = Partition::split(10, 3).unwrap();
        assert_eq!(p.ranges(), &[0..4, 4..7, 7..10]);
    }

    #[test]
    fn more_workers_than_cells_is_clamped() {
        let p = Partition::split(2, 8).unwrap();
        assert_eq!(p.n_workers(), 2);
        assert_eq!(p.ranges(), &[0..1, 1..2]);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(Partition::split(0, 2).is_err());
        assert!(Partition::split(4, 0).is_err());
    }

    #[test]
    fn scatter_writes_only_the_owned_range() {
        let p = Partition::split(5, 2).unwrap();
        let mut global = vec![0; 5];
        p.scatter(1, &[7, 8], &mut global);
        assert_eq!(global, vec![0, 0, 0, 7, 8]);
        assert_eq!(p.slice(0, &[1, 2, 3, 4, 5]), &[1, 2, 3]);
    }

    proptest! {
        #[test]
        fn ranges_cover_every_cell_once(n in 1usize..500, w in 1usize..64) {
            let p = Partition::split(n, w).unwrap();
            prop_assert_eq!(p.n_workers(), w.min(n));
            let mut next = 0;
            for r in p.ranges() {
                prop_assert_eq!(r.start, next);
                prop_assert!(!r.is_empty());
                next = r.end;
            }
            prop_assert_eq!(next, n);
            let lens: Vec<usize> = p.ranges().iter().map(|r| r.len()).collect();
            let (lo, hi) = (lens.iter().min().unwrap(), lens.iter().max().unwrap());
            prop_assert!(hi - lo <= 1);
        }
    }
}
