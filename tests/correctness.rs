//! Cross-validation of reverse mode against forward mode and central
//! finite differences, plus forward-value determinism and NaN semantics.

use approx::assert_relative_eq;
use tapir::{gradient, Dual, Scalar, StackGuard, TapeStack, Var};

/// Lift an `f64` literal into any scalar.
fn c<T: Scalar>(v: f64) -> T {
    T::lift(<T::Float as num_traits::FromPrimitive>::from_f64(v).unwrap())
}

/// Central finite difference gradient, step 1e-6.
fn finite_diff_grad(f: impl Fn(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
    let h = 1e-6;
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        let mut xp = x.to_vec();
        let mut xm = x.to_vec();
        xp[i] += h;
        xm[i] -= h;
        grad[i] = (f(&xp) - f(&xm)) / (2.0 * h);
    }
    grad
}

/// Forward-mode gradient, one dual pass per variable.
fn forward_grad(f: impl Fn(&[Dual<f64>]) -> Dual<f64>, x: &[f64]) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            let inputs: Vec<Dual<f64>> = x
                .iter()
                .enumerate()
                .map(|(k, &xi)| {
                    if k == i {
                        Dual::variable(xi)
                    } else {
                        Dual::constant(xi)
                    }
                })
                .collect();
            f(&inputs).der
        })
        .collect()
}

fn rosenbrock<T: Scalar>(x: &[T]) -> T {
    let mut sum = T::zero();
    for i in 0..x.len() - 1 {
        let t1 = c::<T>(1.0) - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum = sum + t1 * t1 + c::<T>(100.0) * t2 * t2;
    }
    sum
}

fn trig_mix<T: Scalar>(x: &[T]) -> T {
    x[0].sin() * x[1].cos() + (x[0] * x[1]).exp().ln_1p() + x[1].sqrt()
}

fn log_density_like<T: Scalar>(x: &[T]) -> T {
    // Gaussian-ish negative log density with a softplus barrier.
    let mut lp = T::zero();
    for &xi in x {
        let pull = (xi - c::<T>(0.5)) / c::<T>(1.3);
        lp = lp - c::<T>(0.5) * pull * pull - (c::<T>(1.0) + (-xi).exp()).ln();
    }
    lp
}

fn cross_validate(
    f_dual: impl Fn(&[Dual<f64>]) -> Dual<f64>,
    f_rev: impl FnOnce(&[Var<f64>]) -> Var<f64>,
    f_f64: impl Fn(&[f64]) -> f64,
    x: &[f64],
    label: &str,
) {
    let fwd = forward_grad(&f_dual, x);
    let (val, rev) = gradient(f_rev, x);
    let fd = finite_diff_grad(&f_f64, x);

    // Forward and reverse must agree on the forward value exactly.
    assert_eq!(
        val.to_bits(),
        f_f64(x).to_bits(),
        "{label}: forward values diverge between modes"
    );

    for i in 0..x.len() {
        // Forward vs reverse: machine precision.
        assert!(
            (fwd[i] - rev[i]).abs() <= 1e-10 * fwd[i].abs().max(1e-12),
            "{label} fwd vs rev, component {i}: fwd={}, rev={}",
            fwd[i],
            rev[i]
        );
        // Reverse vs finite differences: 1e-4 relative.
        let scale = rev[i].abs().max(1.0);
        assert!(
            (rev[i] - fd[i]).abs() <= 1e-4 * scale,
            "{label} rev vs fd, component {i}: rev={}, fd={}",
            rev[i],
            fd[i]
        );
    }
}

#[test]
fn rosenbrock_cross_validates() {
    for x in [
        vec![1.5, 2.5],
        vec![-1.2, 1.0],
        vec![0.01, 0.02, 0.03],
        vec![80.0, 90.0, 70.0, 60.0],
    ] {
        cross_validate(
            |v| rosenbrock(v),
            |v| rosenbrock(v),
            |v| rosenbrock(v),
            &x,
            "rosenbrock",
        );
    }
}

#[test]
fn trig_mix_cross_validates() {
    for x in [vec![0.3, 1.7], vec![1.0, 0.04], vec![-2.0, 9.0]] {
        cross_validate(
            |v| trig_mix(v),
            |v| trig_mix(v),
            |v| trig_mix(v),
            &x,
            "trig_mix",
        );
    }
}

#[test]
fn log_density_cross_validates() {
    for x in [vec![0.5, -0.3, 1.2], vec![5.0, -4.0], vec![1e-3, 2e-3]] {
        cross_validate(
            |v| log_density_like(v),
            |v| log_density_like(v),
            |v| log_density_like(v),
            &x,
            "log_density",
        );
    }
}

// ── Spec scenario: c = a·b + sin(a) at (2, 3) ──

#[test]
fn product_plus_sine_scenario() {
    let (val, grad) = gradient(|v: &[Var<f64>]| v[0] * v[1] + v[0].sin(), &[2.0, 3.0]);
    assert_relative_eq!(val, 6.909297426825682, max_relative = 1e-12);
    assert_relative_eq!(grad[0], 3.0 + 2.0_f64.cos(), max_relative = 1e-12); // ≈ 2.5839
    assert_relative_eq!(grad[1], 2.0, max_relative = 1e-12);
}

// ── Determinism ──

#[test]
fn identical_graphs_give_bit_identical_values() {
    let build = || {
        let (val, grad) = gradient(
            |v: &[Var<f64>]| (v[0] * v[1]).sin() + v[0].exp() / v[1].sqrt(),
            &[0.7, 2.3],
        );
        (val.to_bits(), grad.iter().map(|g| g.to_bits()).collect::<Vec<_>>())
    };
    assert_eq!(build(), build());
}

// ── NaN / domain-error propagation ──

#[test]
fn log_of_negative_propagates_nan_without_panic() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::<f64>::new(-1.0);
    let y = x.ln();
    assert!(y.value().is_nan());

    let z = y * x;
    stack.sweep(z.id());
    assert!(stack.adjoint(x.id()).is_nan());
}

#[test]
fn nan_objective_yields_nan_adjoints_on_operands() {
    let (val, grad) = gradient(
        |v: &[Var<f64>]| {
            let w = v[0].ln() * v[1];
            w * w
        },
        &[-2.0, 3.0],
    );
    assert!(val.is_nan());
    assert!(grad[0].is_nan());
    assert!(grad[1].is_nan());
}

#[test]
fn division_by_zero_propagates_infinity() {
    let (val, grad) = gradient(|v: &[Var<f64>]| v[0] / (v[1] - 1.0), &[2.0, 1.0]);
    assert!(val.is_infinite());
    assert!(grad[0].is_infinite());
}
