//! [`maximize`] and the result it returns.
//!
//! One call checks the starting point, wraps the model in
//! [`ArgMinAdapter`], builds the L-BFGS variant named by
//! `opts.line_searcher`, runs argmin's executor and turns the final state
//! into an [`OptimOutcome`] reported in log-likelihood terms.
use argmin::core::{Executor, IterState, Solver, State, TerminationStatus};
#[cfg(feature = "obs_slog")]
use argmin::core::{CostFunction, Gradient};
use argmin_math::ArgminL2Norm;

use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{
        FnEvalMap, Grad, Theta,
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        likelihood::LogLikelihood,
        options::{LineSearcher, MLEOptions},
    },
};

type LbfgsState = IterState<Theta, Grad, (), (), (), f64>;

/// Result of a [`maximize`] run.
///
/// - `theta_hat`: best optimizer-space point, all entries finite.
/// - `value`: `ℓ(θ̂)`, the log-likelihood rather than the cost.
/// - `converged`: argmin reported a termination reason; `status` names it.
/// - `fn_evals`: argmin's counters, e.g. `cost_count`, `gradient_count`.
/// - `grad_norm`: L2 norm of the last cost gradient, when one was kept.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Read the best point, its log-likelihood and the run statistics out of
    /// a finished L-BFGS state.
    ///
    /// # Errors
    /// - [`OptError::MissingThetaHat`] when the run kept no best point.
    /// - [`OptError::InvalidThetaHat`] for a non-finite entry of θ̂.
    /// - [`OptError::NonFiniteCost`] for a non-finite best cost.
    fn from_state(mut state: LbfgsState) -> OptResult<Self> {
        let theta_hat = finite_theta_hat(state.take_best_param())?;
        let value = -state.get_best_cost();
        if !value.is_finite() {
            return Err(OptError::NonFiniteCost { value });
        }
        let (converged, status) = match state.get_termination_status() {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            reason => (true, format!("{reason:?}")),
        };
        Ok(OptimOutcome {
            theta_hat,
            value,
            converged,
            status,
            iterations: state.get_iter() as usize,
            fn_evals: state.get_func_counts().clone(),
            grad_norm: state.take_gradient().map(|g| g.l2_norm()),
        })
    }
}

/// Maximize `ℓ(θ)` from `theta0` with L-BFGS.
///
/// Parameters
/// ----------
/// - `f`: the model.
/// - `theta0`: starting point, validated by `f.check`.
/// - `data`: passed through to every `value`/`grad` call.
/// - `opts`: tolerances, line search, memory and verbosity.
///
/// Errors
/// ------
/// - Whatever `f.check` reports for `theta0`.
/// - Tolerances argmin refuses, via the builders.
/// - argmin runtime failures such as a line search that cannot make
///   progress, and fatal model errors raised mid-run.
/// - An outcome without a finite best point or value.
///
/// # Example
/// ```no_run
/// use ndarray::array;
/// use rust_carma::optimization::{
///     errors::OptResult,
///     loglik_optimizer::{maximize, LineSearcher, LogLikelihood, MLEOptions, Tolerances},
/// };
///
/// struct Quadratic;
/// impl LogLikelihood for Quadratic {
///     type Data = ();
///     fn value(&self, theta: &ndarray::Array1<f64>, _: &()) -> OptResult<f64> {
///         Ok(-theta.dot(theta))
///     }
///     fn check(&self, _: &ndarray::Array1<f64>, _: &()) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let tols = Tolerances::new(Some(1e-6), None, Some(200))?;
/// let opts = MLEOptions::new(tols, LineSearcher::HagerZhang, false, None)?;
/// let out = maximize(&Quadratic, array![0.1, -0.2, 0.3], &(), &opts)?;
/// println!("θ̂ = {:?}", out.theta_hat);
/// # Ok::<(), rust_carma::optimization::errors::OptError>(())
/// ```
pub fn maximize<F: LogLikelihood>(
    f: &F, theta0: Theta, data: &F::Data, opts: &MLEOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            execute(problem, build_optimizer_more_thuente(opts)?, theta0, opts)
        }
        LineSearcher::HagerZhang => {
            execute(problem, build_optimizer_hager_zhang(opts)?, theta0, opts)
        }
    }
}

// ---- Helper Methods ----

fn execute<'a, F, S>(
    problem: ArgMinAdapter<'a, F>, solver: S, theta0: Theta, opts: &MLEOptions,
) -> OptResult<OptimOutcome>
where
    F: LogLikelihood,
    S: Solver<ArgMinAdapter<'a, F>, LbfgsState> + Send + 'static,
{
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        report_start(&problem, &theta0)?;
    }
    let max_iter = opts.tols.max_iter;
    #[cfg_attr(not(feature = "obs_slog"), allow(unused_mut))]
    let mut executor = Executor::new(problem, solver).configure(|state| {
        let state = state.param(theta0);
        match max_iter {
            Some(n) => state.max_iters(n as u64),
            None => state,
        }
    });
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        executor = executor.add_observer(
            argmin_observer_slog::SlogLogger::term_noblock(),
            argmin::core::observers::ObserverMode::Always,
        );
    }
    let result = executor.run()?;
    OptimOutcome::from_state(result.state().clone())
}

#[cfg(feature = "obs_slog")]
fn report_start<F: LogLikelihood>(problem: &ArgMinAdapter<'_, F>, theta0: &Theta) -> OptResult<()> {
    let ln_like = -problem.cost(theta0)?;
    let grad_norm = problem.gradient(theta0).ok().map(|g| g.l2_norm());
    match grad_norm {
        Some(norm) => eprintln!("carma fit start: ln_like = {ln_like:.6}, ||grad|| = {norm:.6}"),
        None => eprintln!("carma fit start: ln_like = {ln_like:.6}"),
    }
    Ok(())
}

fn finite_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    let theta = theta_hat.ok_or(OptError::MissingThetaHat)?;
    if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(OptError::InvalidThetaHat {
            index,
            value,
            reason: "Parameter estimates must be finite.",
        });
    }
    Ok(theta)
}
