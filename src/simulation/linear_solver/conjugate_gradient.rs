use log::{debug, warn};
use nalgebra::DVector;

use crate::{
    concurrency::{par_axpy, par_dot, par_iter_mut1},
    floating_type_mod::FT,
    linear_solver::{LinearOperator, Preconditioner},
};

/**
 * Preconditioned conjugate gradient solver for matrix-free operators.
 *
 * The iteration stops when `|r|^2 < tolerance^2 * |b|^2` or after `max_iterations` iterations. Reaching the
 * iteration limit is not an error; the best solution found so far is returned.
 */
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    tolerance: FT,
    max_iterations: usize,

    iterations: usize,
    error: FT,
}

impl ConjugateGradient {
    pub fn new(tolerance: FT, max_iterations: usize) -> Self {
        ConjugateGradient {
            tolerance,
            max_iterations,
            iterations: 0,
            error: 0.,
        }
    }

    pub fn set_tolerance(&mut self, tolerance: FT) {
        self.tolerance = tolerance;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    /**
     * Iterations used by the last solve. The iteration that reaches the tolerance is counted, so this is one
     * more than Eigen's `ConjugateGradient::iterations()` reports for a converged solve.
     */
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Relative residual `|r| / |b|` after the last solve.
    pub fn error(&self) -> FT {
        self.error
    }

    pub fn solve_with_guess<A, P>(&mut self, a: &A, precond: &P, b: &DVector<FT>, guess: &DVector<FT>) -> DVector<FT>
    where
        A: LinearOperator + ?Sized,
        P: Preconditioner + ?Sized,
    {
        let n = a.dim();
        assert_eq!(b.len(), n);
        assert_eq!(guess.len(), n);

        let mut x = guess.clone();

        let rhs_norm2 = par_dot(b.as_slice(), b.as_slice());
        if rhs_norm2 == 0. {
            x.fill(0.);
            self.iterations = 0;
            self.error = 0.;
            return x;
        }

        // r = b - A * x
        let mut residual = DVector::<FT>::zeros(n);
        a.apply(x.as_slice(), residual.as_mut_slice());
        par_iter_mut1(residual.as_mut_slice(), |i, r| {
            *r = b[i] - *r;
        });

        let threshold = FT::max(self.tolerance * self.tolerance * rhs_norm2, FT::MIN_POSITIVE);
        let mut residual_norm2 = par_dot(residual.as_slice(), residual.as_slice());
        if residual_norm2 < threshold {
            self.iterations = 0;
            self.error = (residual_norm2 / rhs_norm2).sqrt();
            return x;
        }

        let mut p = DVector::<FT>::zeros(n);
        precond.apply(residual.as_slice(), p.as_mut_slice());

        let mut z = DVector::<FT>::zeros(n);
        let mut tmp = DVector::<FT>::zeros(n);
        let mut abs_new = par_dot(residual.as_slice(), p.as_slice());

        let mut iteration = 0;
        while iteration < self.max_iterations {
            a.apply(p.as_slice(), tmp.as_mut_slice());

            let p_dot_ap = par_dot(p.as_slice(), tmp.as_slice());
            if p_dot_ap == 0. || !p_dot_ap.is_finite() {
                warn!("conjugate gradient breakdown after {} iterations (p.Ap = {})", iteration, p_dot_ap);
                break;
            }

            let alpha = abs_new / p_dot_ap;
            par_axpy(alpha, p.as_slice(), x.as_mut_slice());
            par_axpy(-alpha, tmp.as_slice(), residual.as_mut_slice());
            iteration += 1;

            residual_norm2 = par_dot(residual.as_slice(), residual.as_slice());
            if residual_norm2 < threshold {
                break;
            }

            precond.apply(residual.as_slice(), z.as_mut_slice());

            let abs_old = abs_new;
            abs_new = par_dot(residual.as_slice(), z.as_slice());
            if abs_old == 0. {
                break;
            }
            let beta = abs_new / abs_old;

            // p = z + beta * p
            par_iter_mut1(p.as_mut_slice(), |i, pi| {
                *pi = z[i] + beta * *pi;
            });
        }

        self.iterations = iteration;
        self.error = (residual_norm2 / rhs_norm2).sqrt();

        if residual_norm2 >= threshold {
            warn!(
                "conjugate gradient did not converge: {} iterations, relative residual {:e} (tolerance {:e})",
                self.iterations, self.error, self.tolerance
            );
        } else {
            debug!(
                "conjugate gradient converged: {} iterations, relative residual {:e}",
                self.iterations, self.error
            );
        }

        x
    }
}
