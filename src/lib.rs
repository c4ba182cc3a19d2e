//! Accelerated proximal-gradient solvers for non-negative least squares.
//!
//! This crate minimizes `0.5 * ||A x - y||^2` subject to `x >= 0`, optionally
//! with structured sparsity penalties (group-L2,1 over contiguous coefficient
//! groups plus two flat L1 terms over disjoint ranges). The iteration is a
//! forward-backward splitting with FISTA-style acceleration and an adaptive
//! backtracking line search; workspaces are allocated once and reused across
//! solves.
//!
//! How it works (high level):
//! - Take a gradient step at the extrapolation point and project (or prox)
//!   back onto the feasible set.
//! - Backtrack the step size until the quadratic majorizer bounds the true
//!   objective.
//! - Check the stopping criteria in a fixed order, then apply the momentum
//!   update.
//!
//! Calling it:
//! - Implement `LinearOperator` (or use `DenseOperator` / `CscOperator` /
//!   `FnOperator`).
//! - Create a `FistaSolver` sized to the operator and call one of its solve
//!   methods; inspect `SolverStats` for the termination reason.
//!
//! Example:
//! ```rust
//! use fista_nnls::{DenseOperator, FistaSolver, SolverOptions};
//! use faer_core::Parallelism;
//!
//! let op = DenseOperator::from_row_major(
//!     2,
//!     2,
//!     &[1.0, 0.0, 0.0, 1.0],
//!     Parallelism::None,
//! )
//! .unwrap();
//! let y = [2.0, 0.0];
//! let mut x = [0.0; 2];
//! let mut solver = FistaSolver::new(2, 2).unwrap();
//! let stats = solver
//!     .solve_nnls(&op, &y, &mut x, &SolverOptions::default(), None, None)
//!     .unwrap();
//! assert!((x[0] - 2.0).abs() < 1e-6);
//! assert!(stats.objective.is_finite());
//! ```

mod operator;
mod partition;
mod power;
mod prox;
mod report;
mod solver;

pub use operator::{CscOperator, DenseOperator, FnOperator, LinearOperator, OperatorError};
pub use partition::{GroupPartition, PartitionError};
pub use power::estimate_lipschitz;
pub use prox::{composite_prox, project_nonneg, ProxPenalties};
pub use report::{IterationRecord, Reporter, StdoutReporter};
pub use solver::{
    FistaSolver, SolveError, SolverError, SolverOptions, SolverStats, TerminationReason,
};
