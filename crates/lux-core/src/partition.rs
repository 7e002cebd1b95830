use thiserror::Error;

use crate::types::WorkRange;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("world size must be > 0")]
    EmptyWorld,
}

/// Splits `[0, items)` into `world` contiguous, disjoint ranges.
///
/// Every rank receives `items / world`; the last rank absorbs the remainder
/// of the integer division. Runs once, before any worker starts.
pub fn partition(items: u64, world: u32) -> Result<Vec<WorkRange>, PartitionError> {
    if world == 0 {
        return Err(PartitionError::EmptyWorld);
    }
    let world = u64::from(world);
    let share = items / world;
    let mut ranges = Vec::with_capacity(world as usize);
    for rank in 0..world {
        let start = share * rank;
        let end = if rank == world - 1 { items } else { start + share };
        ranges.push(WorkRange::new(start, end));
    }
    Ok(ranges)
}
