//! Initial-condition helpers for lattice automata.

use rand::Rng;

use crate::error::{EngineError, EngineResult};

/// `size` default activities with `value` at the centre cell.
pub fn init_simple<A: Default + Clone>(size: usize, value: A) -> Vec<A> {
    let mut cells = vec![A::default(); size];
    if let Some(centre) = cells.get_mut(size / 2) {
        *centre = value;
    }
    cells
}

/// Row-major `rows x cols` grid of default activities with `value` at the centre.
pub fn init_simple_2d<A: Default + Clone>(rows: usize, cols: usize, value: A) -> Vec<A> {
    let mut cells = vec![A::default(); rows * cols];
    if let Some(centre) = cells.get_mut((rows / 2) * cols + cols / 2) {
        *centre = value;
    }
    cells
}

/// `size` activities drawn uniformly from `0..k`.
///
/// With `randomized = Some(n)` only the `n` centre cells are random and the
/// rest hold `empty`. Fails when `n > size`.
pub fn init_random<R: Rng + ?Sized>(
    rng: &mut R,
    size: usize,
    k: u64,
    randomized: Option<usize>,
    empty: u64,
) -> EngineResult<Vec<u64>> {
    let randomized = randomized.unwrap_or(size);
    if randomized > size {
        return Err(EngineError::InitialConditionMismatch {
            expected: size,
            actual: randomized,
        });
    }
    let pad_left = (size - randomized) / 2;
    let pad_right = size - randomized - pad_left;

    let mut cells = Vec::with_capacity(size);
    cells.extend(std::iter::repeat(empty).take(pad_left));
    cells.extend((0..randomized).map(|_| rng.random_range(0..k.max(1))));
    cells.extend(std::iter::repeat(empty).take(pad_right));
    Ok(cells)
}
