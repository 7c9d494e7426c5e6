//! Reusing one tape across sweeps and across independent evaluations.

use approx::assert_relative_eq;
use tapir::{gradient_in, StackGuard, TapeStack, Var};

#[test]
fn two_objectives_sweep_independently() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(2.0);
    let y = Var::new(3.0);
    let f = x * x * y; // ∂f/∂x = 2xy = 12, ∂f/∂y = x² = 4
    let g = x + y * y; // ∂g/∂x = 1,        ∂g/∂y = 2y = 6

    stack.sweep(f.id());
    assert_relative_eq!(stack.adjoint(x.id()), 12.0, max_relative = 1e-12);
    assert_relative_eq!(stack.adjoint(y.id()), 4.0, max_relative = 1e-12);

    stack.zero_adjoints();
    stack.sweep(g.id());
    assert_relative_eq!(stack.adjoint(x.id()), 1.0, max_relative = 1e-12);
    assert_relative_eq!(stack.adjoint(y.id()), 6.0, max_relative = 1e-12);
}

#[test]
fn double_sweep_without_zeroing_double_counts() {
    // Documented caller contract: the engine accumulates, it does not
    // reset adjoints on its own.
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(3.0);
    let y = x * x;

    stack.sweep(y.id());
    assert_relative_eq!(stack.adjoint(x.id()), 6.0, max_relative = 1e-12);

    stack.sweep(y.id());
    assert_relative_eq!(stack.adjoint(x.id()), 12.0, max_relative = 1e-12);
}

#[test]
fn adjoints_are_zero_before_any_sweep() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(2.0);
    let y = x.exp() * x;
    assert_relative_eq!(stack.adjoint(x.id()), 0.0);
    assert_relative_eq!(stack.adjoint(y.id()), 0.0);
}

#[test]
fn gradient_in_reuses_capacity_across_iterations() {
    let mut stack = TapeStack::<f64>::with_capacity(64);

    let f = |v: &[Var<f64>]| v[0] * v[0] * v[1] + v[1].ln();

    let (_, g1) = gradient_in(&mut stack, f, &[2.0, 3.0]);
    assert_relative_eq!(g1[0], 12.0, max_relative = 1e-12);
    assert_relative_eq!(g1[1], 4.0 + 1.0 / 3.0, max_relative = 1e-12);

    let allocated = stack.allocated_bytes();

    // A sampler-style loop: same model, new points, no new allocation.
    for step in 1..6 {
        let x = [2.0 + step as f64 * 0.1, 3.0];
        let (_, g) = gradient_in(&mut stack, f, &x);
        assert_relative_eq!(g[0], 2.0 * x[0] * x[1], max_relative = 1e-12);
    }
    assert_eq!(stack.allocated_bytes(), allocated);
}

#[test]
fn diagnostics_enumerate_the_tape() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(2.0);
    let _y = x * x + x.sin();

    let entries: Vec<_> = stack.entries().collect();
    assert_eq!(entries.len(), stack.num_nodes());
    for (i, e) in entries.iter().enumerate() {
        assert_eq!(e.index as usize, i);
        assert_relative_eq!(e.adjoint, 0.0);
    }
    // Leaf first, in creation order.
    assert_relative_eq!(entries[0].value, 2.0);

    stack.validate().unwrap();
}
