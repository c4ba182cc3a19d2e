use core::fmt;
use core::ops::Range;

/// Partition of a coefficient vector into contiguous groups followed by two
/// flat L1 ranges.
///
/// Boundaries are strictly increasing and start at 0. The final three values
/// demarcate: end of the grouped region (= start of the first flat range),
/// start of the second flat range, and the total vector length. With `B`
/// boundaries there are `B - 3` groups, one weight per group.
#[derive(Debug, Clone)]
pub struct GroupPartition {
    boundaries: Vec<usize>,
    weights: Vec<f64>,
}

/// Validation errors for a GroupPartition.
#[derive(Debug, Clone)]
pub enum PartitionError {
    /// Fewer than 3 boundaries; the two flat ranges cannot be demarcated.
    TooFewBoundaries { actual: usize },
    /// boundaries[0] is not 0.
    FirstBoundary { value: usize },
    /// boundaries are not strictly increasing.
    NotIncreasing { pos: usize, prev: usize, next: usize },
    /// weights length does not match the group count.
    WeightCount { expected: usize, actual: usize },
    /// A group weight is negative or not finite.
    InvalidWeight { group: usize, value: f64 },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewBoundaries { actual } => {
                write!(f, "need at least 3 boundaries (got {actual})")
            }
            Self::FirstBoundary { value } => {
                write!(f, "boundaries must start at 0 (got {value})")
            }
            Self::NotIncreasing { pos, prev, next } => {
                write!(
                    f,
                    "boundaries not strictly increasing at position {pos}: {prev} >= {next}"
                )
            }
            Self::WeightCount { expected, actual } => {
                write!(f, "weights length {actual} does not match group count {expected}")
            }
            Self::InvalidWeight { group, value } => {
                write!(f, "weight for group {group} must be finite and >= 0 (got {value})")
            }
        }
    }
}

impl std::error::Error for PartitionError {}

impl GroupPartition {
    /// Creates a validated partition.
    ///
    /// Requirements:
    /// - `boundaries.len() >= 3`
    /// - `boundaries[0] == 0` and strictly increasing
    /// - `weights.len() == boundaries.len() - 3`
    /// - every weight finite and non-negative
    pub fn new(boundaries: Vec<usize>, weights: Vec<f64>) -> Result<Self, PartitionError> {
        if boundaries.len() < 3 {
            return Err(PartitionError::TooFewBoundaries {
                actual: boundaries.len(),
            });
        }
        if boundaries[0] != 0 {
            return Err(PartitionError::FirstBoundary {
                value: boundaries[0],
            });
        }
        for pos in 1..boundaries.len() {
            let prev = boundaries[pos - 1];
            let next = boundaries[pos];
            if prev >= next {
                return Err(PartitionError::NotIncreasing { pos, prev, next });
            }
        }
        let expected = boundaries.len() - 3;
        if weights.len() != expected {
            return Err(PartitionError::WeightCount {
                expected,
                actual: weights.len(),
            });
        }
        for (group, &value) in weights.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(PartitionError::InvalidWeight { group, value });
            }
        }

        Ok(Self {
            boundaries,
            weights,
        })
    }

    /// Total coefficient-vector length covered by the partition.
    pub fn len(&self) -> usize {
        *self.boundaries.last().unwrap()
    }

    /// Always false; a valid partition covers at least two coefficients.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of groups in the grouped region.
    pub fn num_groups(&self) -> usize {
        self.boundaries.len() - 3
    }

    /// Index range of group `k`.
    pub fn group_range(&self, k: usize) -> Range<usize> {
        self.boundaries[k]..self.boundaries[k + 1]
    }

    /// Index range of the first flat L1 region.
    pub fn first_l1_range(&self) -> Range<usize> {
        let b = &self.boundaries;
        b[b.len() - 3]..b[b.len() - 2]
    }

    /// Index range of the second flat L1 region.
    pub fn second_l1_range(&self) -> Range<usize> {
        let b = &self.boundaries;
        b[b.len() - 2]..b[b.len() - 1]
    }

    /// Per-group weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Boundary sequence.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_partition_ranges() {
        let p = GroupPartition::new(vec![0, 2, 5, 7, 9], vec![1.0, 0.5]).unwrap();
        assert_eq!(p.len(), 9);
        assert_eq!(p.num_groups(), 2);
        assert_eq!(p.group_range(0), 0..2);
        assert_eq!(p.group_range(1), 2..5);
        assert_eq!(p.first_l1_range(), 5..7);
        assert_eq!(p.second_l1_range(), 7..9);
    }

    #[test]
    fn zero_groups_is_valid() {
        let p = GroupPartition::new(vec![0, 3, 6], vec![]).unwrap();
        assert_eq!(p.num_groups(), 0);
        assert_eq!(p.first_l1_range(), 0..3);
        assert_eq!(p.second_l1_range(), 3..6);
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            GroupPartition::new(vec![0, 5], vec![]),
            Err(PartitionError::TooFewBoundaries { .. })
        ));
        assert!(matches!(
            GroupPartition::new(vec![1, 3, 6], vec![]),
            Err(PartitionError::FirstBoundary { .. })
        ));
        assert!(matches!(
            GroupPartition::new(vec![0, 3, 3, 6], vec![1.0]),
            Err(PartitionError::NotIncreasing { .. })
        ));
        assert!(matches!(
            GroupPartition::new(vec![0, 2, 4, 6], vec![]),
            Err(PartitionError::WeightCount { .. })
        ));
        assert!(matches!(
            GroupPartition::new(vec![0, 2, 4, 6], vec![-1.0]),
            Err(PartitionError::InvalidWeight { .. })
        ));
    }
}
