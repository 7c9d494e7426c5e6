//! Nested-scope isolation and bulk-recovery behavior.

use approx::assert_relative_eq;
use tapir::{StackGuard, TapeError, TapeStack, Var};

/// Burn some nodes into the active tape.
fn build_inner(n: usize) -> Var<f64> {
    let mut acc = Var::new(0.5);
    for _ in 0..n {
        acc = acc * acc + acc.sin();
    }
    acc
}

#[test]
fn recovery_restores_counts_and_bytes() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(2.0);
    let _outer = x * x;

    let nodes_before = stack.num_nodes();
    let bytes_before = stack.used_bytes();

    stack.start_nested();
    build_inner(100);
    assert!(stack.num_nodes() > nodes_before);

    stack.recover_nested().unwrap();
    assert_eq!(stack.num_nodes(), nodes_before);
    assert_eq!(stack.used_bytes(), bytes_before);
}

#[test]
fn thousand_node_scope_recovers_exactly() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let _x = Var::new(1.0);
    let bytes_before = stack.used_bytes();

    stack.start_nested();
    let mut acc = Var::new(0.1);
    for _ in 0..999 {
        acc = acc + Var::constant(1.0) * acc;
    }
    assert!(stack.num_nodes() >= 1000);
    stack.recover_nested().unwrap();

    assert_eq!(stack.used_bytes(), bytes_before);
}

#[test]
fn recovered_memory_is_reused_without_growth() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    stack.start_nested();
    build_inner(500);
    stack.recover_nested().unwrap();

    let allocated = stack.allocated_bytes();

    // An equivalent scope must fit into the recovered region.
    stack.start_nested();
    build_inner(500);
    stack.recover_nested().unwrap();

    assert_eq!(stack.allocated_bytes(), allocated);
}

#[test]
fn scopes_nest_arbitrarily() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let _x = Var::new(1.0);
    let outer_nodes = stack.num_nodes();

    stack.start_nested();
    build_inner(10);
    let mid_nodes = stack.num_nodes();

    stack.start_nested();
    build_inner(10);
    assert_eq!(stack.nested_depth(), 2);

    stack.recover_nested().unwrap();
    assert_eq!(stack.num_nodes(), mid_nodes);

    stack.recover_nested().unwrap();
    assert_eq!(stack.num_nodes(), outer_nodes);
    assert_eq!(stack.nested_depth(), 0);
}

#[test]
fn inner_scope_does_not_disturb_outer_gradient() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(3.0);
    let y = x * x; // outer: y = x²

    // Discarded inner detour that also consumes x.
    stack.start_nested();
    let _ = x.sin() * x.exp();
    stack.recover_nested().unwrap();

    stack.sweep(y.id());
    assert_relative_eq!(stack.adjoint(x.id()), 6.0, max_relative = 1e-12);
}

#[test]
fn restricted_sweep_stops_at_mark() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let x = Var::new(2.0);
    let base = x * x; // below the mark

    let mark = stack.start_nested();
    let y = base * x; // above the mark: y = base·x

    stack.sweep_from(mark, y.id());
    // The restricted sweep propagates into `base` but never replays it.
    assert_relative_eq!(stack.adjoint(base.id()), 2.0, max_relative = 1e-12);
    assert_relative_eq!(stack.adjoint(x.id()), 4.0, max_relative = 1e-12);

    stack.recover_nested().unwrap();
}

#[test]
fn unmatched_recover_is_rejected() {
    let mut stack = TapeStack::<f64>::new();
    assert_eq!(stack.recover_nested(), Err(TapeError::NoNestedScope));
}

#[test]
fn stale_frame_is_rejected() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    let before = stack.mark();
    build_inner(5);
    stack.start_nested();
    build_inner(5);

    // Recovering *past* the open frame leaves it stale.
    stack.recover_to(before).unwrap();
    assert_eq!(stack.recover_nested(), Err(TapeError::StaleMark));
}

#[test]
fn stale_mark_is_rejected() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    build_inner(10);
    let mark = stack.mark();
    stack.reset();
    assert_eq!(stack.recover_to(mark), Err(TapeError::StaleMark));
}

#[test]
fn abandoned_scope_is_not_auto_recovered() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    stack.start_nested();
    build_inner(10);
    let nodes = stack.num_nodes();

    // Nothing implicit happens: the scope stays open and the nodes stay.
    assert_eq!(stack.nested_depth(), 1);
    assert_eq!(stack.num_nodes(), nodes);

    stack.recover_nested().unwrap();
    assert_eq!(stack.nested_depth(), 0);
}

#[test]
fn reset_clears_everything_including_frames() {
    let mut stack = TapeStack::<f64>::new();
    let _guard = StackGuard::new(&mut stack);

    build_inner(20);
    stack.start_nested();
    build_inner(20);

    stack.reset();
    assert_eq!(stack.num_nodes(), 0);
    assert_eq!(stack.used_bytes(), 0);
    assert_eq!(stack.nested_depth(), 0);
}
