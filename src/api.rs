//! Closure-level entry points: build, sweep, extract in one call.

use crate::dual::Dual;
use crate::float::Float;
use crate::scalar::Scalar;
use crate::tape_stack::{StackGuard, StackThreadLocal, TapeStack};
use crate::var::Var;

/// Value and gradient of a scalar function `f : Rⁿ → R` by one forward
/// build and one reverse sweep.
///
/// ```
/// let (val, grad) = tapir::gradient(|x: &[tapir::Var<f64>]| x[0] * x[0] + x[1] * x[1], &[3.0, 4.0]);
/// assert!((val - 25.0).abs() < 1e-12);
/// assert!((grad[0] - 6.0).abs() < 1e-12);
/// assert!((grad[1] - 8.0).abs() < 1e-12);
/// ```
pub fn gradient<F: Float + StackThreadLocal>(
    f: impl FnOnce(&[Var<F>]) -> Var<F>,
    x: &[F],
) -> (F, Vec<F>) {
    let mut stack = TapeStack::with_capacity(x.len() * 10);
    gradient_in(&mut stack, f, x)
}

/// Like [`gradient`], reusing a caller-owned stack.
///
/// Resets the stack first, so the pools' capacity carries over between
/// calls — the intended shape for a sampler loop evaluating one
/// log-density gradient per iteration.
pub fn gradient_in<F: Float + StackThreadLocal>(
    stack: &mut TapeStack<F>,
    f: impl FnOnce(&[Var<F>]) -> Var<F>,
    x: &[F],
) -> (F, Vec<F>) {
    stack.reset();
    let inputs: Vec<Var<F>> = x
        .iter()
        .map(|&v| Var::from_parts(v, stack.push_leaf(v)))
        .collect();

    let _guard = StackGuard::new(&mut *stack);
    let output = f(&inputs);

    stack.sweep(output.id());
    let grad = inputs.iter().map(|v| stack.adjoint(v.id())).collect();
    (output.value(), grad)
}

/// Derivative of a univariate function via a forward-mode dual.
///
/// Generic over the scalar, so it nests: pass `Dual<f64>` values for a
/// second derivative, or reverse-mode handles for mixed mode.
pub fn derivative<T: Scalar>(f: impl FnOnce(Dual<T>) -> Dual<T>, x: T) -> (T, T) {
    let y = f(Dual::variable(x));
    (y.val, y.der)
}

/// Full Jacobian of `f : Rⁿ → Rᵐ` by one forward-mode pass per input.
///
/// Returns `(f(x), J)` with `J[i][j] = ∂fᵢ/∂xⱼ`.
pub fn jacobian<F: Float + Scalar>(
    f: impl Fn(&[Dual<F>]) -> Vec<Dual<F>>,
    x: &[F],
) -> (Vec<F>, Vec<Vec<F>>) {
    let n = x.len();

    let const_inputs: Vec<Dual<F>> = x.iter().map(|&xi| Dual::constant(xi)).collect();
    let const_outputs = f(&const_inputs);
    let m = const_outputs.len();
    let values: Vec<F> = const_outputs.iter().map(|d| d.val).collect();

    let mut jac = vec![vec![F::zero(); n]; m];
    for j in 0..n {
        let inputs: Vec<Dual<F>> = x
            .iter()
            .enumerate()
            .map(|(k, &xi)| {
                if k == j {
                    Dual::variable(xi)
                } else {
                    Dual::constant(xi)
                }
            })
            .collect();
        let outputs = f(&inputs);
        for (row, out) in jac.iter_mut().zip(outputs.iter()) {
            row[j] = out.der;
        }
    }

    (values, jac)
}
