//! The coordinator's memoization table.

use crate::catalog::ItemCatalog;
use crate::error::{DknapError, Result};
use crate::protocol::{COORDINATOR, Capacity, Value};

/// State of one subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Capacity below the lightest item's weight; nothing fits.
    Base,
    /// Not yet computed by any worker.
    Unknown,
    /// Resolved by a worker.
    Known(Value),
}

impl Cell {
    /// The resolved value, if any.
    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Base => Some(0),
            Self::Unknown => None,
            Self::Known(value) => Some(*value),
        }
    }
}

/// Table of subproblem values for capacities `0..=target`.
///
/// Cells only ever move from `Unknown` to `Known`. Base and known cells are
/// never overwritten.
#[derive(Debug)]
pub struct SubproblemCache {
    cells: Vec<Cell>,
    cached: usize,
}

impl SubproblemCache {
    /// Allocate a table for `0..=target`, marking base cases.
    pub fn new(target: Capacity, catalog: &ItemCatalog) -> Result<Self> {
        let len = target.checked_add(1).ok_or(DknapError::FatalAllocation {
            what: "subproblem cache",
            cells: usize::MAX,
        })?;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| DknapError::FatalAllocation {
                what: "subproblem cache",
                cells: len,
            })?;

        // An empty catalog fits nothing at any capacity.
        let lightest = catalog.lightest_weight().unwrap_or(usize::MAX);
        cells.extend((0..len).map(|c| if c < lightest { Cell::Base } else { Cell::Unknown }));
        let cached = lightest.min(len);

        Ok(Self { cells, cached })
    }

    /// The cell for `capacity`, or `None` if it is outside the table.
    pub fn get(&self, capacity: Capacity) -> Option<Cell> {
        self.cells.get(capacity).copied()
    }

    /// Record a worker's result. Returns false if the cell was already resolved.
    pub fn record(&mut self, capacity: Capacity, value: Value) -> Result<bool> {
        let cell = self.cells.get_mut(capacity).ok_or_else(|| {
            DknapError::protocol(COORDINATOR, format!("capacity {} is outside the cache", capacity))
        })?;
        match cell {
            Cell::Unknown => {
                *cell = Cell::Known(value);
                self.cached += 1;
                Ok(true)
            }
            Cell::Base | Cell::Known(_) => Ok(false),
        }
    }

    /// Number of resolved cells (base and known).
    pub fn cached_count(&self) -> usize {
        self.cached
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.cached == self.cells.len()
    }

    /// Smallest unresolved capacity at or above `from`.
    pub fn next_unknown(&self, from: Capacity) -> Option<Capacity> {
        self.cells
            .get(from..)?
            .iter()
            .position(|cell| *cell == Cell::Unknown)
            .map(|offset| from + offset)
    }

    /// Resolved values for every capacity, or `None` if any cell is unknown.
    pub fn values(&self) -> Option<Vec<Value>> {
        self.cells.iter().map(Cell::value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;

    fn catalog(pairs: &[(usize, u64)]) -> ItemCatalog {
        ItemCatalog::new(pairs.iter().map(|&(w, v)| Item::new(w, v)).collect())
    }

    #[test]
    fn test_base_cells_below_lightest_weight() {
        let cache = SubproblemCache::new(5, &catalog(&[(2, 3)])).unwrap();
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.get(0), Some(Cell::Base));
        assert_eq!(cache.get(1), Some(Cell::Base));
        assert_eq!(cache.get(2), Some(Cell::Unknown));
        assert_eq!(cache.get(6), None);
        assert_eq!(cache.cached_count(), 2);
        assert_eq!(cache.next_unknown(0), Some(2));
    }

    #[test]
    fn test_empty_catalog_is_all_base() {
        let cache = SubproblemCache::new(4, &ItemCatalog::default()).unwrap();
        assert!(cache.is_full());
        assert_eq!(cache.values(), Some(vec![0; 5]));
        assert_eq!(cache.next_unknown(0), None);
    }

    #[test]
    fn test_lightest_heavier_than_target() {
        let cache = SubproblemCache::new(3, &catalog(&[(10, 1)])).unwrap();
        assert!(cache.is_full());
        assert_eq!(cache.cached_count(), 4);
    }

    #[test]
    fn test_zero_weight_item_leaves_capacity_zero_unknown() {
        let cache = SubproblemCache::new(0, &catalog(&[(0, 5), (1, 1)])).unwrap();
        assert_eq!(cache.get(0), Some(Cell::Unknown));
        assert_eq!(cache.cached_count(), 0);
    }

    #[test]
    fn test_record_is_monotonic() {
        let mut cache = SubproblemCache::new(3, &catalog(&[(1, 1)])).unwrap();
        assert_eq!(cache.cached_count(), 1);

        assert!(cache.record(1, 1).unwrap());
        assert!(!cache.record(1, 99).unwrap());
        assert!(!cache.record(0, 99).unwrap());
        assert_eq!(cache.get(1), Some(Cell::Known(1)));
        assert_eq!(cache.get(0), Some(Cell::Base));
        assert_eq!(cache.cached_count(), 2);
        assert!(cache.record(7, 1).is_err());
    }

    #[test]
    fn test_next_unknown_skips_resolved() {
        let mut cache = SubproblemCache::new(4, &catalog(&[(1, 1)])).unwrap();
        cache.record(2, 2).unwrap();
        assert_eq!(cache.next_unknown(0), Some(1));
        assert_eq!(cache.next_unknown(2), Some(3));
        assert_eq!(cache.next_unknown(5), None);
        assert_eq!(cache.next_unknown(99), None);
    }

    #[test]
    fn test_values_require_full_table() {
        let mut cache = SubproblemCache::new(1, &catalog(&[(1, 4)])).unwrap();
        assert_eq!(cache.values(), None);
        cache.record(1, 4).unwrap();
        assert_eq!(cache.values(), Some(vec![0, 4]));
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        let err = SubproblemCache::new(usize::MAX / 2, &catalog(&[(1, 1)])).unwrap_err();
        assert!(matches!(err, DknapError::FatalAllocation { .. }));
    }
}
