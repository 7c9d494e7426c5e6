use approx::assert_relative_eq;
use tapir::{derivative, Dual};

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn check_forward_elemental(
    f_dual: impl Fn(Dual<f64>) -> Dual<f64>,
    f_f64: impl Fn(f64) -> f64,
    x: f64,
    tol: f64,
) {
    let (val, der) = derivative(&f_dual, x);
    assert_relative_eq!(val, f_f64(x), max_relative = 1e-12);
    assert_relative_eq!(der, finite_diff(&f_f64, x), max_relative = tol);
}

// ── Arithmetic ──

#[test]
fn add() {
    let d = Dual::variable(2.0) + Dual::variable(3.0);
    assert_relative_eq!(d.val, 5.0);
    assert_relative_eq!(d.der, 2.0);
}

#[test]
fn product_rule() {
    // d(x·x)/dx = 2x
    let x = Dual::variable(3.0);
    let d = x * x;
    assert_relative_eq!(d.val, 9.0);
    assert_relative_eq!(d.der, 6.0);
}

#[test]
fn quotient_rule() {
    // d(1/x)/dx = -1/x²
    let x = Dual::variable(2.0);
    let d = Dual::constant(1.0) / x;
    assert_relative_eq!(d.val, 0.5);
    assert_relative_eq!(d.der, -0.25);
}

#[test]
fn mixed_scalar_ops() {
    let x: Dual<f64> = Dual::variable(2.0);
    let d = 3.0 * x + 1.0;
    assert_relative_eq!(d.val, 7.0);
    assert_relative_eq!(d.der, 3.0);
}

// ── Elementals ──

#[test]
fn sin() { check_forward_elemental(|x| x.sin(), |x| x.sin(), 1.0, 1e-5); }

#[test]
fn cos() { check_forward_elemental(|x| x.cos(), |x| x.cos(), 1.0, 1e-5); }

#[test]
fn tan() { check_forward_elemental(|x| x.tan(), |x| x.tan(), 0.5, 1e-5); }

#[test]
fn exp() { check_forward_elemental(|x| x.exp(), |x| x.exp(), 1.0, 1e-5); }

#[test]
fn ln() { check_forward_elemental(|x| x.ln(), |x| x.ln(), 2.0, 1e-5); }

#[test]
fn sqrt() { check_forward_elemental(|x| x.sqrt(), |x| x.sqrt(), 4.0, 1e-5); }

#[test]
fn cbrt() { check_forward_elemental(|x| x.cbrt(), |x| x.cbrt(), 8.0, 1e-5); }

#[test]
fn recip() { check_forward_elemental(|x| x.recip(), |x| x.recip(), 2.5, 1e-5); }

#[test]
fn powi() { check_forward_elemental(|x| x.powi(3), |x| x.powi(3), 2.0, 1e-5); }

#[test]
fn tanh() { check_forward_elemental(|x| x.tanh(), |x| x.tanh(), 1.0, 1e-5); }

#[test]
fn asin() { check_forward_elemental(|x| x.asin(), |x| x.asin(), 0.5, 1e-5); }

#[test]
fn atan() { check_forward_elemental(|x| x.atan(), |x| x.atan(), 1.0, 1e-5); }

#[test]
fn sinh() { check_forward_elemental(|x| x.sinh(), |x| x.sinh(), 1.0, 1e-5); }

#[test]
fn cosh() { check_forward_elemental(|x| x.cosh(), |x| x.cosh(), 1.0, 1e-5); }

#[test]
fn ln_1p() { check_forward_elemental(|x| x.ln_1p(), |x| x.ln_1p(), 0.5, 1e-5); }

#[test]
fn exp_m1() { check_forward_elemental(|x| x.exp_m1(), |x| x.exp_m1(), 0.5, 1e-5); }

#[test]
fn powf_variable_exponent() {
    // d(x^c)/dx at x=2, c=3
    let x = Dual::variable(2.0);
    let d = x.powf(Dual::constant(3.0));
    assert_relative_eq!(d.val, 8.0);
    assert_relative_eq!(d.der, 12.0, max_relative = 1e-12);
}

#[test]
fn atan2_tangent() {
    let y = Dual::variable(1.0);
    let x = Dual::constant(2.0);
    let d = y.atan2(x);
    assert_relative_eq!(d.der, 2.0 / 5.0, max_relative = 1e-12);
}

#[test]
fn sin_cos_pair() {
    let x = Dual::variable(0.7);
    let (s, c) = x.sin_cos();
    assert_relative_eq!(s.der, 0.7_f64.cos(), max_relative = 1e-12);
    assert_relative_eq!(c.der, -(0.7_f64.sin()), max_relative = 1e-12);
}

// ── Compositions ──

#[test]
fn chain_rule() {
    // d sin(x²)/dx = 2x·cos(x²)
    let x_val: f64 = 1.3;
    let (_, der) = derivative(|x| (x * x).sin(), x_val);
    assert_relative_eq!(
        der,
        2.0 * x_val * (x_val * x_val).cos(),
        max_relative = 1e-12
    );
}

#[test]
fn logistic() {
    // σ(x) = 1/(1+e^-x), σ' = σ(1-σ)
    let x_val = 0.8;
    let (val, der) = derivative(|x| (Dual::constant(1.0) + (-x).exp()).recip(), x_val);
    assert_relative_eq!(der, val * (1.0 - val), max_relative = 1e-10);
}

#[test]
fn constant_has_zero_tangent() {
    let (val, der) = derivative(|x| x * Dual::constant(4.0) + Dual::constant(1.0), 2.5);
    assert_relative_eq!(val, 11.0);
    assert_relative_eq!(der, 4.0);
}
