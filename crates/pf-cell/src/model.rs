//! TransientModel trait for the continuous part of a cell.

use crate::error::CellResult;

/// A dynamic system x_dot = f(t, x) with vector-space state arithmetic.
pub trait TransientModel {
    type State: Clone;

    /// Compute state derivative dxdt = f(t, x).
    fn rhs(&self, t: f64, x: &Self::State) -> CellResult<Self::State>;

    /// Add two states element-wise: result = a + b.
    fn add(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// Scale a state by a scalar: result = scale * a.
    fn scale(&self, a: &Self::State, scale: f64) -> Self::State;
}
