//! Single-process dynamic program used to check distributed results.

use crate::catalog::ItemCatalog;
use crate::error::{DknapError, Result};
use crate::protocol::{Capacity, Value};

/// Optimal values for every capacity in `0..=target`.
///
/// Uses the same recurrence as the workers: zero-weight items contribute
/// their value once, every other fitting item contributes through the best
/// smaller capacity.
pub fn solve_table(catalog: &ItemCatalog, target: Capacity) -> Result<Vec<Value>> {
    let len = target.checked_add(1).ok_or(DknapError::FatalAllocation {
        what: "reference table",
        cells: usize::MAX,
    })?;
    let mut table: Vec<Value> = Vec::new();
    table
        .try_reserve_exact(len)
        .map_err(|_| DknapError::FatalAllocation {
            what: "reference table",
            cells: len,
        })?;

    for capacity in 0..len {
        let overflow = || DknapError::ValueOverflow { capacity };
        let mut best: Value = 0;
        let mut free: Value = 0;
        for item in catalog.items().iter().take_while(|item| item.weight <= capacity) {
            if item.weight == 0 {
                free = free.checked_add(item.value).ok_or_else(overflow)?;
            } else {
                let candidate = table[capacity - item.weight]
                    .checked_add(item.value)
                    .ok_or_else(overflow)?;
                best = best.max(candidate);
            }
        }
        table.push(best.checked_add(free).ok_or_else(overflow)?);
    }

    Ok(table)
}

/// Optimal value at `target`.
pub fn solve(catalog: &ItemCatalog, target: Capacity) -> Result<Value> {
    let table = solve_table(catalog, target)?;
    Ok(table.last().copied().unwrap_or_default())
}

/// Compare a full table against the reference, reporting the first mismatch.
pub fn verify(catalog: &ItemCatalog, table: &[Value]) -> Result<()> {
    let Some(target) = table.len().checked_sub(1) else {
        return Ok(());
    };
    let expected = solve_table(catalog, target)?;
    match expected.iter().zip(table).position(|(e, a)| e != a) {
        Some(capacity) => Err(DknapError::VerificationFailed {
            capacity,
            expected: expected[capacity],
            actual: table[capacity],
        }),
        None => Ok(()),
    }
}
