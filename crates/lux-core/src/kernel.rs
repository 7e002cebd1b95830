use crate::types::Rgb;

/// The per-item compute boundary.
///
/// Implementations must be pure: for a fixed construction (scene, dimensions,
/// sample count, run seed) the result depends only on `item`, never on which
/// worker evaluates it or when. Cost is unbounded and data-dependent; that
/// variance is the reason the scheduler exists.
pub trait Kernel: Send + Sync + 'static {
    fn compute(&self, item: u64) -> Rgb;
}

impl<F> Kernel for F
where
    F: Fn(u64) -> Rgb + Send + Sync + 'static,
{
    fn compute(&self, item: u64) -> Rgb {
        self(item)
    }
}
