//! Damped Newton iteration used for power-controlled terminal solves.

use crate::error::{CircuitError, CircuitResult};
use nalgebra::{DMatrix, DVector};

/// Newton solver configuration.
#[derive(Clone, Debug)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    /// Absolute tolerance on the residual norm (W for power solves)
    pub abs_tol: f64,
    /// Relative tolerance on the residual norm
    pub rel_tol: f64,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    pub max_line_search_iters: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-9,
            rel_tol: 1e-12,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
        }
    }
}

pub struct NewtonResult {
    pub x: DVector<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Newton solver with backtracking line search.
pub fn newton_solve<F, J>(
    x0: DVector<f64>,
    residual_fn: F,
    jacobian_fn: J,
    config: &NewtonConfig,
) -> CircuitResult<NewtonResult>
where
    F: Fn(&DVector<f64>) -> CircuitResult<DVector<f64>>,
    J: Fn(&DVector<f64>) -> CircuitResult<DMatrix<f64>>,
{
    let mut x = x0;
    let mut r = residual_fn(&x)?;
    let mut r_norm = r.norm();
    let r0_norm = r_norm;

    for iter in 0..config.max_iterations {
        if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(&x)?;
        let dx = jac
            .lu()
            .solve(&(-&r))
            .ok_or_else(|| CircuitError::ConvergenceFailed {
                what: format!("singular Jacobian at iteration {iter}"),
            })?;

        let mut alpha = 1.0;
        let mut x_new = &x + alpha * &dx;
        let mut r_new = residual_fn(&x_new)?;
        let mut r_new_norm = r_new.norm();

        for _ in 0..config.max_line_search_iters {
            if r_new_norm < r_norm {
                break;
            }
            alpha *= config.line_search_beta;
            x_new = &x + alpha * &dx;
            r_new = residual_fn(&x_new)?;
            r_new_norm = r_new.norm();
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;

        if alpha < 1e-10 {
            return Err(CircuitError::ConvergenceFailed {
                what: format!("line search stagnated at iteration {iter}"),
            });
        }
    }

    Err(CircuitError::ConvergenceFailed {
        what: format!(
            "maximum iterations {} reached, residual = {}",
            config.max_iterations, r_norm
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_small_root_of_power_balance() {
        // I * (4 - 0.1 I) = 10  ->  I = 2.7525... (small root)
        let residual = |x: &DVector<f64>| -> CircuitResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] * (4.0 - 0.1 * x[0]) - 10.0))
        };
        let jacobian = |x: &DVector<f64>| -> CircuitResult<DMatrix<f64>> {
            Ok(DMatrix::from_element(1, 1, 4.0 - 0.2 * x[0]))
        };

        let result = newton_solve(
            DVector::from_element(1, 2.5),
            residual,
            jacobian,
            &NewtonConfig::default(),
        )
        .unwrap();

        let expected = (4.0 - (16.0_f64 - 4.0).sqrt()) / 0.2;
        assert!((result.x[0] - expected).abs() < 1e-8);
    }
}
