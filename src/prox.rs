use crate::partition::GroupPartition;

/// Unweighted penalty values recorded by the composite prox.
///
/// `group` is the post-threshold weighted sum over group norms; the two L1
/// values are the pre-threshold L1 norms of their regions. Callers multiply by
/// their own regularization weights when assembling the objective.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxPenalties {
    pub group: f64,
    pub first_l1: f64,
    pub second_l1: f64,
}

/// Projection onto the non-negative orthant: `x[i] = max(x[i], 0)`.
pub fn project_nonneg(x: &mut [f64]) {
    for v in x.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// Composite proximal operator: group-L2,1 soft-thresholding over the grouped
/// region, then elementwise soft-thresholding over the two flat L1 regions.
///
/// `thresholds` are the three penalty scalars already multiplied by the
/// current step size. Inputs in the flat regions are expected non-negative
/// (the caller projects first), so the soft-threshold is `max(v - t, 0)`.
///
/// Applied in place; returns the penalty bookkeeping values.
pub fn composite_prox(
    x: &mut [f64],
    thresholds: [f64; 3],
    partition: &GroupPartition,
) -> ProxPenalties {
    debug_assert_eq!(x.len(), partition.len());

    let mut penalties = ProxPenalties::default();
    let weights = partition.weights();

    for (k, &w) in weights.iter().enumerate() {
        let range = partition.group_range(k);
        let mut norm2 = 0.0;
        for &v in &x[range.clone()] {
            norm2 += v * v;
        }
        let norm = norm2.sqrt();
        let shrunk = (norm - thresholds[0] * w).max(0.0);
        penalties.group += w * shrunk;

        // An all-zero group must map to zero, not NaN.
        let denom = if norm == 0.0 { f64::MIN_POSITIVE } else { norm };
        let scale = shrunk / denom;
        for v in &mut x[range] {
            *v *= scale;
        }
    }

    for v in &mut x[partition.first_l1_range()] {
        penalties.first_l1 += v.abs();
        *v = (*v - thresholds[1]).max(0.0);
    }
    for v in &mut x[partition.second_l1_range()] {
        penalties.second_l1 += v.abs();
        *v = (*v - thresholds[2]).max(0.0);
    }

    penalties
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[test]
    fn nonneg_projection_clamps() {
        let mut x = [1.0, -2.0, 0.0, 3.5];
        project_nonneg(&mut x);
        assert_eq!(x, [1.0, 0.0, 0.0, 3.5]);
    }

    #[test]
    fn group_norm_is_soft_thresholded() {
        // Single group [0, 3) with weight 2, flat regions of one element each.
        let p = GroupPartition::new(vec![0, 3, 4, 5], vec![2.0]).unwrap();
        let mut x = [3.0, 0.0, 4.0, 1.0, 1.0];
        let input_norm = norm(&x[..3]);
        let pen = composite_prox(&mut x, [1.0, 0.0, 0.0], &p);
        let expected = (input_norm - 2.0).max(0.0);
        assert!((norm(&x[..3]) - expected).abs() < 1e-12);
        assert!((pen.group - 2.0 * expected).abs() < 1e-12);
        // Direction is preserved.
        assert!((x[0] / x[2] - 3.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn zero_group_stays_zero() {
        let p = GroupPartition::new(vec![0, 2, 3, 4], vec![1.0]).unwrap();
        let mut x = [0.0, 0.0, 1.0, 1.0];
        let pen = composite_prox(&mut x, [0.5, 0.0, 0.0], &p);
        assert_eq!(&x[..2], &[0.0, 0.0]);
        assert_eq!(pen.group, 0.0);
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn large_threshold_zeroes_group() {
        let p = GroupPartition::new(vec![0, 2, 3, 4], vec![1.0]).unwrap();
        let mut x = [0.3, 0.4, 1.0, 1.0];
        composite_prox(&mut x, [10.0, 0.0, 0.0], &p);
        assert_eq!(&x[..2], &[0.0, 0.0]);
    }

    #[test]
    fn flat_regions_threshold_exactly() {
        let p = GroupPartition::new(vec![0, 3, 5], vec![]).unwrap();
        let mut x = [0.0, 2.0, 0.1, 0.6, 0.2];
        let pen = composite_prox(&mut x, [0.0, 0.5, 0.3], &p);
        // First flat region [0, 3): max(v - 0.5, 0).
        assert!((x[0] - 0.0).abs() < 1e-15);
        assert!((x[1] - 1.5).abs() < 1e-15);
        assert!((x[2] - 0.0).abs() < 1e-15);
        // Second flat region [3, 5): max(v - 0.3, 0).
        assert!((x[3] - 0.3).abs() < 1e-15);
        assert!((x[4] - 0.0).abs() < 1e-15);
        // Penalties are the pre-threshold L1 norms.
        assert!((pen.first_l1 - 2.1).abs() < 1e-12);
        assert!((pen.second_l1 - 0.8).abs() < 1e-12);
    }
}
