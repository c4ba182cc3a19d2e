use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::operator::LinearOperator;

// Fixed seed keeps the estimate deterministic run to run.
const START_SEED: u64 = 0x1f5a_11ce;

/// Estimates the largest eigenvalue of `A^T A` by power iteration.
///
/// Starts from a seeded random unit vector and repeatedly applies the forward
/// then adjoint operator, tracking the result norm as the eigenvalue estimate.
/// Stops when the relative change of the estimate falls below `tol` or after
/// `max_iter` rounds.
///
/// A zero operator yields `0.0`; callers seeding a step size as `1 / L` must
/// reject a non-positive estimate before dividing.
pub fn estimate_lipschitz(op: &dyn LinearOperator, tol: f64, max_iter: usize) -> f64 {
    let n = op.ncols();
    let mut rng = StdRng::seed_from_u64(START_SEED);
    let mut b: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let norm = l2_norm(&b);
    if norm > 0.0 {
        for v in &mut b {
            *v /= norm;
        }
    }

    let mut forward = vec![0.0; op.nrows()];
    let mut gram = vec![0.0; n];
    let mut estimate = 0.0;

    for iteration in 0..max_iter {
        op.apply(&b, &mut forward);
        op.apply_adjoint(&forward, &mut gram);

        let next = l2_norm(&gram);
        if next <= f64::MIN_POSITIVE {
            return 0.0;
        }
        for (bi, gi) in b.iter_mut().zip(gram.iter()) {
            *bi = gi / next;
        }
        if iteration > 0 && (next - estimate).abs() / next < tol {
            return next;
        }
        estimate = next;
    }

    estimate
}

fn l2_norm(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for &v in x {
        sum += v * v;
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DenseOperator;
    use faer_core::Parallelism;

    #[test]
    fn diagonal_gram_eigenvalues() {
        // A = diag(2, 1): A^T A has eigenvalues {4, 1}.
        let op =
            DenseOperator::from_row_major(2, 2, &[2.0, 0.0, 0.0, 1.0], Parallelism::None).unwrap();
        let l = estimate_lipschitz(&op, 1e-10, 1000);
        assert!((l - 4.0).abs() < 1e-6, "estimate {l} too far from 4");
    }

    #[test]
    fn zero_operator_reports_zero() {
        let op =
            DenseOperator::from_row_major(2, 2, &[0.0; 4], Parallelism::None).unwrap();
        assert_eq!(estimate_lipschitz(&op, 1e-8, 100), 0.0);
    }
}
