use serde::{Deserialize, Serialize};

/// Worker identity within a fixed-size world of `0..world` ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
    /// The static ring successor `(rank + 1) mod world`.
    pub fn ring_successor(self, world: u32) -> Rank {
        Rank((self.0 + 1) % world)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous span of work items, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRange {
    pub start: u64,
    pub end: u64,
}

impl WorkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, item: u64) -> bool {
        self.start <= item && item < self.end
    }

    /// Splits off the suffix that a donor hands to a requester.
    ///
    /// `cursor` is the donor's next uncomputed item. The donor keeps
    /// `[cursor, cursor + ceil(remaining/2))` (the odd leftover stays with
    /// the donor) and the returned range is the granted suffix. Returns
    /// `None` when fewer than two items remain, in which case the range
    /// cannot be split.
    pub fn split_for_grant(&self, cursor: u64) -> Option<WorkRange> {
        let remaining = self.end.saturating_sub(cursor);
        if remaining <= 1 {
            return None;
        }
        let split = cursor + remaining.div_ceil(2);
        Some(WorkRange::new(split, self.end))
    }
}

/// Bookkeeping for a sub-range granted to another worker, pending its return.
///
/// `return_at` is the global item index at which the borrower's results are
/// written back into the lender's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub borrower: Rank,
    pub return_at: u64,
    pub len: u64,
}

/// A linear-light color sample, each channel nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_successor_wraps() {
        assert_eq!(Rank(0).ring_successor(4), Rank(1));
        assert_eq!(Rank(3).ring_successor(4), Rank(0));
        assert_eq!(Rank(0).ring_successor(1), Rank(0));
    }

    #[test]
    fn clamp_bounds_channels() {
        let c = Rgb::new(-0.5, 0.5, 1.5).clamped();
        assert_eq!(c, Rgb::new(0.0, 0.5, 1.0));
    }
}
