use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::operator::LinearOperator;
use crate::partition::GroupPartition;
use crate::prox::{composite_prox, project_nonneg, ProxPenalties};
use crate::report::{emit_line, IterationRecord, Reporter, StdoutReporter};

/// Step-size shrink factor applied while backtracking.
const BACKTRACK_SHRINK: f64 = 0.9;

/// Errors while constructing the solver.
#[derive(Debug)]
pub enum SolverError {
    /// The problem has zero rows or columns.
    InvalidDimensions { nrows: usize, ncols: usize },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Errors specific to a solve call.
#[derive(Debug)]
pub enum SolveError {
    /// The operator shape does not match the solver dimensions.
    OperatorShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
    /// The measurement vector has the wrong length.
    MeasurementLen { expected: usize, actual: usize },
    /// The provided x has the wrong length.
    SolutionLen { expected: usize, actual: usize },
    /// The partition does not span the coefficient vector.
    PartitionLen { expected: usize, actual: usize },
    /// The supplied Lipschitz constant cannot seed a step size.
    NonPositiveLipschitz { value: f64 },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorShape {
                expected_rows,
                expected_cols,
                rows,
                cols,
            } => {
                write!(
                    f,
                    "operator shape {rows}x{cols} does not match solver {expected_rows}x{expected_cols}"
                )
            }
            Self::MeasurementLen { expected, actual } => {
                write!(f, "y length {actual} does not match expected {expected}")
            }
            Self::SolutionLen { expected, actual } => {
                write!(f, "x length {actual} does not match expected {expected}")
            }
            Self::PartitionLen { expected, actual } => {
                write!(
                    f,
                    "partition covers {actual} coefficients, expected {expected}"
                )
            }
            Self::NonPositiveLipschitz { value } => {
                write!(f, "lipschitz constant must be positive (got {value})")
            }
        }
    }
}

impl std::error::Error for SolveError {}

/// Why a solve stopped.
///
/// The criteria are evaluated in declaration order each iteration; the first
/// satisfied one wins. Reaching the iteration cap is a normal outcome, not a
/// failure. `Cancelled` is reported when a caller-supplied flag was raised at
/// an iteration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Absolute objective change below machine epsilon.
    AbsObjective,
    /// Relative objective change below `tol_fun`.
    RelObjective,
    /// Absolute solution change below machine epsilon.
    AbsSolution,
    /// Relative solution change below `tol_x`.
    RelSolution,
    /// Iteration cap reached.
    MaxIterations,
    /// Cooperative cancellation flag observed.
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::AbsObjective => "ABS_OBJ",
            Self::RelObjective => "REL_OBJ",
            Self::AbsSolution => "ABS_X",
            Self::RelSolution => "REL_X",
            Self::MaxIterations => "MAX_IT",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(tag)
    }
}

/// Options controlling a solve.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Stop when the relative objective change drops below this.
    pub tol_fun: f64,
    /// Stop when the relative solution change drops below this.
    pub tol_x: f64,
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Use the caller's x as the starting point instead of zeroing it.
    pub warm_start: bool,
    /// Emit per-iteration diagnostics to stdout by default.
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tol_fun: 1e-4,
            tol_x: 1e-9,
            max_iter: 100,
            warm_start: false,
            verbose: false,
        }
    }
}

/// Summary statistics for a finished solve.
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub reason: TerminationReason,
    pub iterations: usize,
    /// Final objective (smooth term plus weighted penalties).
    pub objective: f64,
    /// `||A x - y||` at the final iterate.
    pub residual_norm: f64,
    pub abs_obj: f64,
    pub rel_obj: f64,
    pub abs_x: f64,
    pub rel_x: f64,
    /// Step size in effect when the solve stopped.
    pub step_size: f64,
}

enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

enum ProxKind<'a> {
    NonNegative,
    Composite {
        partition: &'a GroupPartition,
        lambda: [f64; 3],
    },
}

enum StepRule {
    Backtracking,
    Constant { lipschitz: f64 },
}

/// Accelerated proximal-gradient solver for non-negative least squares,
/// optionally with group-L2,1 + L1 + L1 regularization.
///
/// Workspaces are sized at construction and reused across solves; a solve
/// itself allocates nothing.
pub struct FistaSolver {
    nrows: usize,
    ncols: usize,
    xhat: Vec<f64>,
    prev_x: Vec<f64>,
    grad: Vec<f64>,
    residual: Vec<f64>,
    forward: Vec<f64>,
}

impl FistaSolver {
    /// Create a solver for an `nrows x ncols` forward model.
    pub fn new(nrows: usize, ncols: usize) -> Result<Self, SolverError> {
        if nrows == 0 || ncols == 0 {
            return Err(SolverError::InvalidDimensions { nrows, ncols });
        }
        Ok(Self {
            nrows,
            ncols,
            xhat: vec![0.0; ncols],
            prev_x: vec![0.0; ncols],
            grad: vec![0.0; ncols],
            residual: vec![0.0; nrows],
            forward: vec![0.0; nrows],
        })
    }

    /// Measurement-space dimension.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Coefficient-space dimension.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Solve `min 0.5 ||A x - y||^2 s.t. x >= 0` in place with adaptive
    /// backtracking.
    ///
    /// With `warm_start` unset, `x` is zeroed and the initial residual is
    /// `-y` without applying the operator.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_nnls(
        &mut self,
        op: &dyn LinearOperator,
        y: &[f64],
        x: &mut [f64],
        options: &SolverOptions,
        reporter: Option<&mut dyn Reporter>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SolverStats, SolveError> {
        self.run(
            op,
            y,
            x,
            ProxKind::NonNegative,
            StepRule::Backtracking,
            options,
            reporter,
            cancel,
        )
    }

    /// Same as [`solve_nnls`](Self::solve_nnls) but with the step size held
    /// at `1 / lipschitz` and no backtracking.
    ///
    /// `lipschitz` is typically obtained from
    /// [`estimate_lipschitz`](crate::estimate_lipschitz); non-positive values
    /// are rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_nnls_constant_step(
        &mut self,
        op: &dyn LinearOperator,
        lipschitz: f64,
        y: &[f64],
        x: &mut [f64],
        options: &SolverOptions,
        reporter: Option<&mut dyn Reporter>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SolverStats, SolveError> {
        self.run(
            op,
            y,
            x,
            ProxKind::NonNegative,
            StepRule::Constant { lipschitz },
            options,
            reporter,
            cancel,
        )
    }

    /// Solve the composite problem
    /// `min 0.5 ||A x - y||^2 + l1 ||x_G||_{2,1} + l2 ||x_B||_1 + l3 ||x_C||_1
    /// s.t. x >= 0`, where the partition splits `x` into the grouped region
    /// `G` and the two flat regions `B` and `C`.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_group_lasso(
        &mut self,
        op: &dyn LinearOperator,
        y: &[f64],
        lambda: [f64; 3],
        partition: &GroupPartition,
        x: &mut [f64],
        options: &SolverOptions,
        reporter: Option<&mut dyn Reporter>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SolverStats, SolveError> {
        if partition.len() != self.ncols {
            return Err(SolveError::PartitionLen {
                expected: self.ncols,
                actual: partition.len(),
            });
        }
        self.run(
            op,
            y,
            x,
            ProxKind::Composite { partition, lambda },
            StepRule::Backtracking,
            options,
            reporter,
            cancel,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        op: &dyn LinearOperator,
        y: &[f64],
        x: &mut [f64],
        prox: ProxKind<'_>,
        step_rule: StepRule,
        options: &SolverOptions,
        reporter: Option<&mut dyn Reporter>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SolverStats, SolveError> {
        let m = self.nrows;
        let n = self.ncols;
        if op.nrows() != m || op.ncols() != n {
            return Err(SolveError::OperatorShape {
                expected_rows: m,
                expected_cols: n,
                rows: op.nrows(),
                cols: op.ncols(),
            });
        }
        if y.len() != m {
            return Err(SolveError::MeasurementLen {
                expected: m,
                actual: y.len(),
            });
        }
        if x.len() != n {
            return Err(SolveError::SolutionLen {
                expected: n,
                actual: x.len(),
            });
        }

        let mut reporter = ReporterSlot::new(reporter, options.verbose);
        let eps = f64::EPSILON;

        // Starting point and residual. A cold start skips the forward
        // application: A * 0 - y = -y.
        if options.warm_start {
            self.xhat.copy_from_slice(x);
            op.apply(&self.xhat, &mut self.residual);
            for (r, &yi) in self.residual.iter_mut().zip(y.iter()) {
                *r -= yi;
            }
        } else {
            x.fill(0.0);
            self.xhat.fill(0.0);
            for (r, &yi) in self.residual.iter_mut().zip(y.iter()) {
                *r = -yi;
            }
        }
        op.apply_adjoint(&self.residual, &mut self.grad);

        let mut prev_obj = 0.5 * dot(&self.residual, &self.residual);
        if options.warm_start {
            if let ProxKind::Composite { partition, lambda } = &prox {
                // Penalty bookkeeping at x0, evaluated through the prox with
                // unit thresholds.
                self.prev_x.copy_from_slice(&self.xhat);
                let pen = composite_prox(&mut self.prev_x, [1.0; 3], partition);
                prev_obj += lambda[0] * pen.group
                    + lambda[1] * pen.first_l1
                    + lambda[2] * pen.second_l1;
            }
        }
        self.prev_x.copy_from_slice(&self.xhat);
        let mut qfval = prev_obj;

        let mut mu = match step_rule {
            StepRule::Constant { lipschitz } => {
                if !(lipschitz > 0.0) || !lipschitz.is_finite() {
                    return Err(SolveError::NonPositiveLipschitz { value: lipschitz });
                }
                1.0 / lipschitz
            }
            StepRule::Backtracking => {
                // Seed from the local curvature along the initial gradient:
                // L = ||A g||^2 / ||g||^2, mu = 1.9 / L. A degenerate gradient
                // (zero measurements or zero operator) gets a unit step; the
                // first iteration then terminates on its own.
                let gnorm2 = dot(&self.grad, &self.grad);
                if gnorm2 <= f64::MIN_POSITIVE {
                    1.0
                } else {
                    op.apply(&self.grad, &mut self.forward);
                    let agnorm2 = dot(&self.forward, &self.forward);
                    if agnorm2 <= f64::MIN_POSITIVE {
                        1.0
                    } else {
                        1.9 * gnorm2 / agnorm2
                    }
                }
            }
        };
        let backtracking = matches!(step_rule, StepRule::Backtracking);

        let mut iteration = 1usize;
        let mut t_old = 1.0f64;

        loop {
            // Gradient step and prox at the extrapolation point.
            let mut penalties = gradient_step(x, &self.xhat, &self.grad, mu, &prox);

            // Quadratic majorizer around xhat.
            let (mut step_dot, mut step_norm2) = step_terms(x, &self.xhat, &self.grad);
            let mut q = qfval
                + step_dot
                + 0.5 / mu * step_norm2
                + weighted_penalty(&penalties, &prox);

            op.apply(x, &mut self.residual);
            for (r, &yi) in self.residual.iter_mut().zip(y.iter()) {
                *r -= yi;
            }
            let mut curr_obj =
                0.5 * dot(&self.residual, &self.residual) + weighted_penalty(&penalties, &prox);

            // Backtracking: shrink the step until the sufficient-decrease
            // condition holds.
            if backtracking {
                while curr_obj > q {
                    mu *= BACKTRACK_SHRINK;
                    penalties = gradient_step(x, &self.xhat, &self.grad, mu, &prox);
                    let terms = step_terms(x, &self.xhat, &self.grad);
                    step_dot = terms.0;
                    step_norm2 = terms.1;
                    q = qfval
                        + step_dot
                        + 0.5 / mu * step_norm2
                        + weighted_penalty(&penalties, &prox);
                    op.apply(x, &mut self.residual);
                    for (r, &yi) in self.residual.iter_mut().zip(y.iter()) {
                        *r -= yi;
                    }
                    curr_obj = 0.5 * dot(&self.residual, &self.residual)
                        + weighted_penalty(&penalties, &prox);
                }
            }

            // Stopping statistics, evaluated in a fixed order.
            let abs_obj = (curr_obj - prev_obj).abs();
            let rel_obj = abs_obj / curr_obj;
            let mut diff2 = 0.0;
            let mut xnorm2 = 0.0;
            for (xi, pi) in x.iter().zip(self.prev_x.iter()) {
                let d = xi - pi;
                diff2 += d * d;
                xnorm2 += xi * xi;
            }
            let abs_x = diff2.sqrt();
            let rel_x = abs_x / (xnorm2.sqrt() + eps);
            let residual_norm = dot(&self.residual, &self.residual).sqrt();

            if let Some(reporter) = reporter.as_mut() {
                reporter.on_iteration(&IterationRecord {
                    iteration,
                    residual_norm,
                    objective: curr_obj,
                    abs_obj,
                    rel_obj,
                    abs_x,
                    rel_x,
                    step_size: mu,
                });
            }

            let reason = if abs_obj < eps {
                Some(TerminationReason::AbsObjective)
            } else if rel_obj < options.tol_fun {
                Some(TerminationReason::RelObjective)
            } else if abs_x < eps {
                Some(TerminationReason::AbsSolution)
            } else if rel_x < options.tol_x {
                Some(TerminationReason::RelSolution)
            } else if iteration >= options.max_iter {
                Some(TerminationReason::MaxIterations)
            } else if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                Some(TerminationReason::Cancelled)
            } else {
                None
            };

            if let Some(reason) = reason {
                let stats = SolverStats {
                    reason,
                    iterations: iteration,
                    objective: curr_obj,
                    residual_norm,
                    abs_obj,
                    rel_obj,
                    abs_x,
                    rel_x,
                    step_size: mu,
                };
                return Ok(finish_stats(stats, options.verbose, &mut reporter));
            }

            // FISTA momentum: extrapolate past the accepted iterate.
            let t = 0.5 * (1.0 + (1.0 + 4.0 * t_old * t_old).sqrt());
            let beta = (t_old - 1.0) / t;
            for ((h, &xi), &pi) in self
                .xhat
                .iter_mut()
                .zip(x.iter())
                .zip(self.prev_x.iter())
            {
                *h = xi + beta * (xi - pi);
            }

            // Gradient at the new extrapolation point.
            op.apply(&self.xhat, &mut self.residual);
            for (r, &yi) in self.residual.iter_mut().zip(y.iter()) {
                *r -= yi;
            }
            op.apply_adjoint(&self.residual, &mut self.grad);

            iteration += 1;
            prev_obj = curr_obj;
            self.prev_x.copy_from_slice(x);
            t_old = t;
            qfval = 0.5 * dot(&self.residual, &self.residual);
        }
    }
}

/// `x = prox(xhat - mu * grad)`: clamp to the non-negative orthant, then for
/// the composite variant apply the group/L1 prox with step-scaled thresholds.
fn gradient_step(
    x: &mut [f64],
    xhat: &[f64],
    grad: &[f64],
    mu: f64,
    prox: &ProxKind<'_>,
) -> ProxPenalties {
    for ((xi, &h), &g) in x.iter_mut().zip(xhat.iter()).zip(grad.iter()) {
        *xi = h - mu * g;
    }
    project_nonneg(x);
    match prox {
        ProxKind::NonNegative => ProxPenalties::default(),
        ProxKind::Composite { partition, lambda } => composite_prox(
            x,
            [lambda[0] * mu, lambda[1] * mu, lambda[2] * mu],
            partition,
        ),
    }
}

/// Inner product of the step direction with the gradient, and the squared
/// step norm.
fn step_terms(x: &[f64], xhat: &[f64], grad: &[f64]) -> (f64, f64) {
    let mut step_dot = 0.0;
    let mut step_norm2 = 0.0;
    for ((&xi, &h), &g) in x.iter().zip(xhat.iter()).zip(grad.iter()) {
        let d = xi - h;
        step_dot += d * g;
        step_norm2 += d * d;
    }
    (step_dot, step_norm2)
}

fn weighted_penalty(penalties: &ProxPenalties, prox: &ProxKind<'_>) -> f64 {
    match prox {
        ProxKind::NonNegative => 0.0,
        ProxKind::Composite { lambda, .. } => {
            lambda[0] * penalties.group
                + lambda[1] * penalties.first_l1
                + lambda[2] * penalties.second_l1
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

fn finish_stats(
    stats: SolverStats,
    verbose: bool,
    reporter: &mut ReporterSlot<'_>,
) -> SolverStats {
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if verbose {
        emit_line(&format!("stopping criterion: {}", stats.reason));
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DenseOperator;
    use faer_core::Parallelism;

    fn identity(n: usize) -> DenseOperator {
        let mut elements = vec![0.0; n * n];
        for i in 0..n {
            elements[i * n + i] = 1.0;
        }
        DenseOperator::from_row_major(n, n, &elements, Parallelism::None).unwrap()
    }

    #[test]
    fn identity_scenario_recovers_measurements() {
        let op = identity(2);
        let y = [2.0, 0.0];
        let mut x = [0.0; 2];
        let mut solver = FistaSolver::new(2, 2).unwrap();
        let stats = solver
            .solve_nnls(&op, &y, &mut x, &SolverOptions::default(), None, None)
            .unwrap();
        assert!(
            matches!(
                stats.reason,
                TerminationReason::AbsObjective | TerminationReason::RelObjective
            ),
            "unexpected reason: {:?}",
            stats.reason
        );
        assert!((x[0] - 2.0).abs() < 1e-6);
        assert!(x[1].abs() < 1e-6);
    }

    #[test]
    fn zero_measurements_terminate_at_first_iteration() {
        let op = identity(3);
        let y = [0.0; 3];
        let mut x = [0.0; 3];
        let mut solver = FistaSolver::new(3, 3).unwrap();
        let stats = solver
            .solve_nnls(&op, &y, &mut x, &SolverOptions::default(), None, None)
            .unwrap();
        assert_eq!(stats.iterations, 1);
        assert!(matches!(
            stats.reason,
            TerminationReason::AbsObjective | TerminationReason::AbsSolution
        ));
        assert_eq!(x, [0.0; 3]);
    }

    #[test]
    fn dimension_mismatches_are_rejected() {
        let op = identity(2);
        let mut solver = FistaSolver::new(2, 2).unwrap();
        let mut x = [0.0; 2];
        assert!(matches!(
            solver.solve_nnls(&op, &[1.0], &mut x, &SolverOptions::default(), None, None),
            Err(SolveError::MeasurementLen { .. })
        ));
        let mut short_x = [0.0; 1];
        assert!(matches!(
            solver.solve_nnls(
                &op,
                &[1.0, 2.0],
                &mut short_x,
                &SolverOptions::default(),
                None,
                None
            ),
            Err(SolveError::SolutionLen { .. })
        ));
        let op3 = identity(3);
        assert!(matches!(
            solver.solve_nnls(
                &op3,
                &[1.0, 2.0],
                &mut x,
                &SolverOptions::default(),
                None,
                None
            ),
            Err(SolveError::OperatorShape { .. })
        ));
    }

    #[test]
    fn constant_step_rejects_degenerate_lipschitz() {
        let op = identity(2);
        let mut solver = FistaSolver::new(2, 2).unwrap();
        let mut x = [0.0; 2];
        assert!(matches!(
            solver.solve_nnls_constant_step(
                &op,
                0.0,
                &[1.0, 1.0],
                &mut x,
                &SolverOptions::default(),
                None,
                None
            ),
            Err(SolveError::NonPositiveLipschitz { .. })
        ));
    }
}
